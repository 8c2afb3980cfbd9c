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

//! Architecture and ABI knobs for the carver.
//!
//! The defaults describe arm64 `libsystem_kernel`: fixed 4-byte instructions,
//! the message pointer in x0 at the `mach_msg` call, and the trap number at
//! offset 0x14 of the message header (0x18 for the other header layout).

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CarveConfig {
    /// Flag of the dispatch function whose callers are the traps.
    pub dispatch_symbol: String,
    /// Flag space prefix rizin puts in front of symbol names.
    pub flag_prefix: String,
    /// Where the backward walk may stop, besides `ret` and `b `.
    pub boundary_pattern: String,
    pub instruction_stride: u64,
    /// Index of the argument register carrying the message pointer.
    pub message_register: usize,
    /// Primary and fallback offset of the trap number in the message.
    pub selector_offsets: [u64; 2],
}

impl Default for CarveConfig {
    fn default() -> Self {
        Self {
            dispatch_symbol: "sym._mach_msg".to_string(),
            flag_prefix: "sym.".to_string(),
            boundary_pattern: r"^b|^ret|^invalid".to_string(),
            instruction_stride: 4,
            message_register: 0,
            selector_offsets: [0x14, 0x18],
        }
    }
}

impl CarveConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: CarveConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instruction_stride == 0 {
            bail!("instruction_stride must be non-zero");
        }
        if self.dispatch_symbol.is_empty() {
            bail!("dispatch_symbol must not be empty");
        }
        Regex::new(&self.boundary_pattern)
            .with_context(|| format!("invalid boundary_pattern {:?}", self.boundary_pattern))?;
        Ok(())
    }

    /// Name prefix shared by the dispatch function and its own aliases,
    /// e.g. `_mach_msg` for `sym._mach_msg`.
    pub fn alias_prefix(&self) -> &str {
        self.dispatch_symbol
            .strip_prefix(&self.flag_prefix)
            .unwrap_or(&self.dispatch_symbol)
    }

    /// Flag naming the function whose symbol is `realname`.
    pub fn flag_for(&self, realname: &str) -> String {
        format!("{}{}", self.flag_prefix, realname)
    }
}
