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

//! Recover the trap number passed at a `mach_msg` call site.
//!
//! The trap stubs build a message on the stack and call `mach_msg` with its
//! address in the first argument register. We emulate the stub from the
//! nearest preceding control-flow boundary up to the call, then read the
//! number out of the message header in emulated memory.
//!
//! This is best effort. A wrong start point or an unmodeled side effect gives
//! a garbage pointer, and nothing here can tell.

use crate::backend::AnalysisBackend;
use crate::config::CarveConfig;
use crate::error::BackendError;
use crate::walker::InstructionWalker;
use log::{debug, warn};
use regex::Regex;
use std::ops::{Deref, DerefMut};

/// Puts the analysis cursor back where it was when the guard was taken,
/// however the carve ends.
struct SeekGuard<'a, B: AnalysisBackend + ?Sized> {
    backend: &'a mut B,
    saved: u64,
}

impl<'a, B: AnalysisBackend + ?Sized> SeekGuard<'a, B> {
    fn acquire(backend: &'a mut B) -> Result<Self, BackendError> {
        let saved = backend.current_seek()?;
        Ok(Self { backend, saved })
    }
}

impl<B: AnalysisBackend + ?Sized> Deref for SeekGuard<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        &*self.backend
    }
}

impl<B: AnalysisBackend + ?Sized> DerefMut for SeekGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut *self.backend
    }
}

impl<B: AnalysisBackend + ?Sized> Drop for SeekGuard<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.seek(&format!("0x{:x}", self.saved)) {
            warn!("failed to restore seek to 0x{:x}: {}", self.saved, e);
        }
    }
}

pub struct TrapCarver {
    walker: InstructionWalker,
    boundary: Regex,
    stride: u64,
    message_register: usize,
    selector_offsets: [u64; 2],
}

impl TrapCarver {
    pub fn new(config: &CarveConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            walker: InstructionWalker::new(config.instruction_stride),
            boundary: Regex::new(&config.boundary_pattern)?,
            stride: config.instruction_stride,
            message_register: config.message_register,
            selector_offsets: config.selector_offsets,
        })
    }

    /// Trap number passed to the dispatch call at `addr`, inside the function
    /// starting at `flag`. `None` when emulation or memory yields nothing.
    pub fn carve_trap_num<B: AnalysisBackend + ?Sized>(
        &self,
        backend: &mut B,
        addr: u64,
        flag: &str,
    ) -> Result<Option<u64>, BackendError> {
        let message = {
            let mut session = SeekGuard::acquire(&mut *backend)?;
            session.set_config("io.cache", "true")?;
            session.set_config("emu.write", "true")?;
            session.init_emulation()?;
            session.import_emulation_state()?;

            let min_addr = session.evaluate_to_value(flag)?;
            let emu_start = match addr.checked_sub(self.stride) {
                Some(prev) => {
                    self.walker
                        .walk_back_until(&mut *session, prev, &self.boundary, min_addr)?
                }
                None => min_addr,
            };
            debug!(
                "0x{:x}: emulating from 0x{:x} ({} at 0x{:x})",
                addr, emu_start, flag, min_addr
            );
            session.seek(&format!("0x{:x}", emu_start))?;
            session.emulate_forward_to(addr, self.message_register)?
        };

        let Some(message) = message else {
            debug!("0x{:x}: emulation produced no message pointer", addr);
            return Ok(None);
        };

        // Zero at the primary offset means the other header layout
        let [primary, fallback] = self.selector_offsets;
        let mut value = backend.read_u32(message.wrapping_add(primary))?;
        if value == Some(0) {
            value = backend.read_u32(message.wrapping_add(fallback))?;
        }
        Ok(value)
    }
}
