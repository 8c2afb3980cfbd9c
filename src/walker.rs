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

/// Backward search for a point where forward emulation can safely start.
use crate::backend::AnalysisBackend;
use crate::error::BackendError;
use log::trace;
use regex::Regex;
use std::sync::OnceLock;

/// `ret` and unconditional `b` always end the walk, whatever the caller asks for.
fn always_stop() -> &'static [Regex; 2] {
    static STOPS: OnceLock<[Regex; 2]> = OnceLock::new();
    STOPS.get_or_init(|| {
        [
            Regex::new(r"^ret").expect("literal pattern"),
            Regex::new(r"^b ").expect("literal pattern"),
        ]
    })
}

pub struct InstructionWalker {
    stride: u64,
}

impl InstructionWalker {
    pub fn new(stride: u64) -> Self {
        Self { stride }
    }

    /// Walk from `addr` down to `min_addr` (inclusive), one instruction at a
    /// time, and return the address just after the first instruction whose
    /// opcode matches `pattern`, `^ret` or `^b `. Returns `min_addr` when
    /// nothing in range matches.
    pub fn walk_back_until<B: AnalysisBackend + ?Sized>(
        &self,
        backend: &mut B,
        addr: u64,
        pattern: &Regex,
        min_addr: u64,
    ) -> Result<u64, BackendError> {
        let mut cursor = addr;
        while cursor >= min_addr {
            let op = backend.disassemble_at(cursor)?;
            if pattern.is_match(&op.opcode) || always_stop().iter().any(|re| re.is_match(&op.opcode))
            {
                trace!("boundary at 0x{:x}: {}", cursor, op.opcode);
                return Ok(cursor.saturating_add(self.stride));
            }
            match cursor.checked_sub(self.stride) {
                Some(prev) => cursor = prev,
                None => break,
            }
        }
        Ok(min_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_backend::FakeBackend;

    fn walk(fake: &mut FakeBackend, addr: u64, pattern: &str, min_addr: u64) -> u64 {
        let re = Regex::new(pattern).unwrap();
        InstructionWalker::new(4)
            .walk_back_until(fake, addr, &re, min_addr)
            .unwrap()
    }

    fn linear_code(base: u64, ops: &[&str]) -> FakeBackend {
        let mut fake = FakeBackend::default();
        for (i, op) in ops.iter().enumerate() {
            fake.ops.insert(base + 4 * i as u64, op.to_string());
        }
        fake
    }

    #[test]
    fn stops_after_matching_instruction() {
        // 0x100 ... 0x114; the ret at 0x108 is k = 3 steps back from 0x114
        let mut fake = linear_code(
            0x100,
            &["stp x29, x30, [sp, -0x10]!", "mov x29, sp", "ret", "mov w1, 3", "mov x0, sp", "mov w2, 0"],
        );
        assert_eq!(walk(&mut fake, 0x114, "^invalid", 0x100), 0x10c);
        assert_eq!(fake.disassembled, vec![0x114, 0x110, 0x10c, 0x108]);
    }

    #[test]
    fn caller_pattern_and_unconditional_branch_stop() {
        let mut fake = linear_code(0x100, &["nop", "bl sym.foo", "mov x0, x1"]);
        assert_eq!(walk(&mut fake, 0x108, "^b|^ret|^invalid", 0x100), 0x108);

        let mut fake = linear_code(0x100, &["nop", "b 0x200", "mov x0, x1"]);
        assert_eq!(walk(&mut fake, 0x108, "^invalid", 0x100), 0x108);

        // `bl` is not an unconditional branch on its own
        let mut fake = linear_code(0x100, &["nop", "bl sym.foo", "mov x0, x1"]);
        assert_eq!(walk(&mut fake, 0x108, "^invalid", 0x100), 0x100);
    }

    #[test]
    fn matching_instruction_at_start_address() {
        let mut fake = linear_code(0x100, &["nop", "ret"]);
        assert_eq!(walk(&mut fake, 0x104, "^invalid", 0x100), 0x108);
    }

    #[test]
    fn no_match_returns_min_addr() {
        let mut fake = linear_code(0x100, &["nop", "mov x1, x2", "add x0, x0, 1"]);
        assert_eq!(walk(&mut fake, 0x108, "^invalid", 0x100), 0x100);
        assert_eq!(fake.disassembled, vec![0x108, 0x104, 0x100]);
    }

    #[test]
    fn start_below_min_addr_inspects_nothing() {
        let mut fake = linear_code(0x100, &["ret"]);
        assert_eq!(walk(&mut fake, 0xfc, "^invalid", 0x100), 0x100);
        assert!(fake.disassembled.is_empty());
    }

    #[test]
    fn walk_stops_at_address_zero() {
        let mut fake = linear_code(0, &["nop", "nop"]);
        assert_eq!(walk(&mut fake, 4, "^invalid", 0), 0);
        assert_eq!(fake.disassembled, vec![4, 0]);
    }
}
