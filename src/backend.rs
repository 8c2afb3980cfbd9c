// Copyright (c) 2026 xnu-machtraps Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The analysis session as seen by the extractor.
//!
//! Everything the extractor needs from the disassembler/emulator goes through
//! [`AnalysisBackend`]. The session state (cursor, emulation flags) lives
//! behind the trait object, so every operation takes `&mut self`.

use crate::error::BackendError;
use serde::Deserialize;
use serde_json::Value;

/// Classification of a cross reference.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefKind {
    Call,
    Code,
    Data,
    #[serde(other)]
    Unknown,
}

/// A cross reference to a symbol, as reported by `axtj`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub from: u64,
    #[serde(rename = "type")]
    pub kind: RefKind,
    // Name of the function containing `from`, when the backend knows it
    #[serde(default)]
    pub realname: Option<String>,
}

/// One decoded instruction, as reported by `aoj`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpInfo {
    #[serde(default)]
    pub addr: Option<u64>,
    pub opcode: String,
}

pub trait AnalysisBackend {
    /// Evaluate a math expression (symbols, `$$`, arithmetic) to a number.
    fn evaluate_to_value(&mut self, expr: &str) -> Result<u64, BackendError>;

    /// Run a command that answers in JSON and parse the answer.
    fn evaluate_to_json(&mut self, cmd: &str) -> Result<Value, BackendError>;

    fn set_config(&mut self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Initialize the emulator's register file.
    fn init_emulation(&mut self) -> Result<(), BackendError>;

    /// Map the emulator's stack/memory from the current session state.
    fn import_emulation_state(&mut self) -> Result<(), BackendError>;

    fn current_seek(&mut self) -> Result<u64, BackendError> {
        self.evaluate_to_value("$$")
    }

    /// Move the analysis cursor to an address or symbol expression.
    fn seek(&mut self, target: &str) -> Result<(), BackendError>;

    /// Undo the last seek.
    fn seek_undo(&mut self) -> Result<(), BackendError>;

    fn disassemble_at(&mut self, addr: u64) -> Result<OpInfo, BackendError>;

    /// Discover references by emulating the whole section under the cursor.
    fn analyze_section_refs(&mut self) -> Result<(), BackendError>;

    fn cross_references_to(&mut self, symbol: &str) -> Result<Vec<Reference>, BackendError>;

    /// Emulate from the cursor up to `addr` and return the value held by the
    /// `register`-th argument register when execution gets there.
    fn emulate_forward_to(&mut self, addr: u64, register: usize)
        -> Result<Option<u64>, BackendError>;

    /// Read a 32-bit value from emulated memory.
    fn read_u32(&mut self, addr: u64) -> Result<Option<u64>, BackendError>;
}
