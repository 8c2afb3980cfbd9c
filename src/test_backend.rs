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

//! In-memory `AnalysisBackend` for unit tests.

use crate::backend::{AnalysisBackend, OpInfo, RefKind, Reference};
use crate::error::{BackendError, TransportError};
use crate::utils::parse_number;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Default)]
pub struct FakeBackend {
    /// Opcode text by address; anything else disassembles as "invalid".
    pub ops: HashMap<u64, String>,
    pub symbols: HashMap<String, u64>,
    /// References returned before and after `analyze_section_refs`.
    pub refs: Vec<Reference>,
    pub refs_after_analysis: Vec<Reference>,
    /// Message pointer left in the argument register at each call site.
    pub emulation: HashMap<u64, u64>,
    pub memory: HashMap<u64, u64>,
    pub fail_emulation: bool,

    pub cursor: u64,
    pub seek_history: Vec<u64>,
    pub analyzed: bool,
    pub config: Vec<(String, String)>,
    pub emulation_inits: usize,
    pub disassembled: Vec<u64>,
    /// (start cursor, target) of every emulation run.
    pub emulated: Vec<(u64, u64)>,
    pub reads: Vec<u64>,
}

pub fn call_ref(from: u64, realname: &str) -> Reference {
    Reference {
        from,
        kind: RefKind::Call,
        realname: Some(realname.to_string()),
    }
}

impl AnalysisBackend for FakeBackend {
    fn evaluate_to_value(&mut self, expr: &str) -> Result<u64, BackendError> {
        if expr == "$$" {
            return Ok(self.cursor);
        }
        self.symbols
            .get(expr)
            .copied()
            .or_else(|| parse_number(expr))
            .ok_or(BackendError::NotANumber {
                command: format!("?v {}", expr),
                output: String::new(),
            })
    }

    fn evaluate_to_json(&mut self, _cmd: &str) -> Result<Value, BackendError> {
        Ok(Value::Null)
    }

    fn set_config(&mut self, key: &str, value: &str) -> Result<(), BackendError> {
        self.config.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn init_emulation(&mut self) -> Result<(), BackendError> {
        self.emulation_inits += 1;
        Ok(())
    }

    fn import_emulation_state(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn seek(&mut self, target: &str) -> Result<(), BackendError> {
        let addr = self.evaluate_to_value(target)?;
        self.seek_history.push(self.cursor);
        self.cursor = addr;
        Ok(())
    }

    fn seek_undo(&mut self) -> Result<(), BackendError> {
        if let Some(prev) = self.seek_history.pop() {
            self.cursor = prev;
        }
        Ok(())
    }

    fn disassemble_at(&mut self, addr: u64) -> Result<OpInfo, BackendError> {
        self.disassembled.push(addr);
        let opcode = self
            .ops
            .get(&addr)
            .cloned()
            .unwrap_or_else(|| "invalid".to_string());
        Ok(OpInfo {
            addr: Some(addr),
            opcode,
        })
    }

    fn analyze_section_refs(&mut self) -> Result<(), BackendError> {
        self.analyzed = true;
        Ok(())
    }

    fn cross_references_to(&mut self, _symbol: &str) -> Result<Vec<Reference>, BackendError> {
        if self.analyzed {
            Ok(self.refs_after_analysis.clone())
        } else {
            Ok(self.refs.clone())
        }
    }

    fn emulate_forward_to(
        &mut self,
        addr: u64,
        _register: usize,
    ) -> Result<Option<u64>, BackendError> {
        self.emulated.push((self.cursor, addr));
        if self.fail_emulation {
            return Err(TransportError::UnexpectedEof.into());
        }
        Ok(self.emulation.get(&addr).copied())
    }

    fn read_u32(&mut self, addr: u64) -> Result<Option<u64>, BackendError> {
        self.reads.push(addr);
        Ok(self.memory.get(&addr).copied())
    }
}
