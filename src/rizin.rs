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

/// `AnalysisBackend` on top of rizin's command language.
use crate::backend::{AnalysisBackend, OpInfo, Reference};
use crate::error::{BackendError, TransportError};
use crate::transport::{PipeTransport, SpawnOptions, SpawnTransport, Transport};
use crate::utils::parse_number;
use log::trace;
use serde_json::Value;

pub struct RizinBackend<T: Transport> {
    transport: T,
}

impl RizinBackend<Box<dyn Transport>> {
    /// Attach to the rizin session that launched us with `#!pipe`.
    pub fn open_session() -> Result<Self, TransportError> {
        let transport = PipeTransport::from_env()?;
        Ok(Self::new(Box::new(transport)))
    }

    /// Launch a private rizin on `opts.target`.
    pub fn spawn(opts: &SpawnOptions) -> Result<Self, TransportError> {
        let transport = SpawnTransport::spawn(opts)?;
        Ok(Self::new(Box::new(transport)))
    }
}

impl<T: Transport> RizinBackend<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run a command and return its raw text output.
    pub fn cmd(&mut self, cmd: &str) -> Result<String, BackendError> {
        trace!("rizin> {}", cmd);
        let out = self.transport.command(cmd)?;
        trace!("rizin< {:?}", out);
        Ok(out)
    }

    /// Run a JSON command and return the first element of the array it prints.
    fn first_of(&mut self, cmd: &str) -> Result<Value, BackendError> {
        match self.evaluate_to_json(cmd)? {
            Value::Array(mut items) if !items.is_empty() => Ok(items.swap_remove(0)),
            _ => Err(BackendError::EmptyResponse {
                command: cmd.to_string(),
            }),
        }
    }
}

impl<T: Transport> AnalysisBackend for RizinBackend<T> {
    fn evaluate_to_value(&mut self, expr: &str) -> Result<u64, BackendError> {
        let command = format!("?v {}", expr);
        let output = self.cmd(&command)?;
        parse_number(&output).ok_or(BackendError::NotANumber { command, output })
    }

    fn evaluate_to_json(&mut self, cmd: &str) -> Result<Value, BackendError> {
        let output = self.cmd(cmd)?;
        if output.trim().is_empty() {
            return Err(BackendError::EmptyResponse {
                command: cmd.to_string(),
            });
        }
        serde_json::from_str(&output).map_err(|error| BackendError::MalformedJson {
            command: cmd.to_string(),
            error,
        })
    }

    fn set_config(&mut self, key: &str, value: &str) -> Result<(), BackendError> {
        self.cmd(&format!("e {}={}", key, value)).map(|_| ())
    }

    fn init_emulation(&mut self) -> Result<(), BackendError> {
        self.cmd("aei").map(|_| ())
    }

    fn import_emulation_state(&mut self) -> Result<(), BackendError> {
        self.cmd("aeim").map(|_| ())
    }

    fn seek(&mut self, target: &str) -> Result<(), BackendError> {
        self.cmd(&format!("s {}", target)).map(|_| ())
    }

    fn seek_undo(&mut self) -> Result<(), BackendError> {
        self.cmd("shu").map(|_| ())
    }

    fn disassemble_at(&mut self, addr: u64) -> Result<OpInfo, BackendError> {
        let command = format!("aoj @ 0x{:x}", addr);
        let op = self.first_of(&command)?;
        serde_json::from_value(op).map_err(|error| BackendError::MalformedJson { command, error })
    }

    fn analyze_section_refs(&mut self) -> Result<(), BackendError> {
        self.cmd("aae $SS @ $S").map(|_| ())
    }

    fn cross_references_to(&mut self, symbol: &str) -> Result<Vec<Reference>, BackendError> {
        let command = format!("axtj @ {}", symbol);
        let refs = self.evaluate_to_json(&command)?;
        serde_json::from_value(refs).map_err(|error| BackendError::MalformedJson { command, error })
    }

    fn emulate_forward_to(
        &mut self,
        addr: u64,
        register: usize,
    ) -> Result<Option<u64>, BackendError> {
        // aefa prints one argument per line; keep the first column of the wanted row
        let out = self.cmd(&format!("aefa 0x{:08x}~[0]:{}", addr, register))?;
        Ok(parse_number(&out))
    }

    fn read_u32(&mut self, addr: u64) -> Result<Option<u64>, BackendError> {
        let command = format!("pv4j @ 0x{:x}", addr);
        let output = self.cmd(&command)?;
        // Unmapped memory prints nothing
        if output.trim().is_empty() {
            return Ok(None);
        }
        let value = match serde_json::from_str::<Value>(&output)
            .map_err(|error| BackendError::MalformedJson { command, error })?
        {
            Value::Array(items) => items.into_iter().next(),
            _ => None,
        };
        Ok(value.and_then(|v| v.get("value").and_then(Value::as_u64)))
    }
}
