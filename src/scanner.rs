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

use crate::backend::{AnalysisBackend, RefKind, Reference};
use crate::config::CarveConfig;
use crate::error::BackendError;
use log::{debug, info};

/// Find the functions calling the dispatch symbol.
///
/// If the backend knows no references at all, the section holding the symbol
/// is analyzed once and the query repeated. `Ok(None)` means there are still
/// none, which ends the extraction. Otherwise the result holds only named CALL
/// references from outside the dispatch function's own aliases, in backend
/// order.
pub fn find_trap_callers<B: AnalysisBackend + ?Sized>(
    backend: &mut B,
    config: &CarveConfig,
) -> Result<Option<Vec<Reference>>, BackendError> {
    let symbol = config.dispatch_symbol.as_str();
    let mut refs = backend.cross_references_to(symbol)?;
    if refs.is_empty() {
        info!("no references to {}, analyzing its section", symbol);
        backend.seek(symbol)?;
        backend.analyze_section_refs()?;
        backend.seek_undo()?;
        refs = backend.cross_references_to(symbol)?;
    }
    if refs.is_empty() {
        return Ok(None);
    }

    let total = refs.len();
    let alias_prefix = config.alias_prefix();
    let callers: Vec<Reference> = refs
        .into_iter()
        .filter(|r| r.kind == RefKind::Call)
        .filter(|r| match r.realname.as_deref() {
            Some(name) => !name.starts_with(alias_prefix),
            None => false,
        })
        .collect();
    debug!(
        "{} of {} references to {} are trap callers",
        callers.len(),
        total,
        symbol
    );
    Ok(Some(callers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_backend::{call_ref, FakeBackend};

    #[test]
    fn keeps_named_calls_outside_dispatch() {
        let mut fake = FakeBackend::default();
        fake.refs = vec![
            call_ref(0x1000, "_mach_trap_foo"),
            Reference {
                from: 0x1100,
                kind: RefKind::Data,
                realname: Some("_mach_trap_data".to_string()),
            },
            Reference {
                from: 0x1200,
                kind: RefKind::Call,
                realname: None,
            },
            call_ref(0x1300, "_mach_msg_overwrite"),
            call_ref(0x1400, "_mach_msg"),
            call_ref(0x1500, "_task_self_trap"),
        ];
        let callers = find_trap_callers(&mut fake, &CarveConfig::default())
            .unwrap()
            .unwrap();
        let froms: Vec<u64> = callers.iter().map(|r| r.from).collect();
        assert_eq!(froms, vec![0x1000, 0x1500]);
        assert!(!fake.analyzed);
    }

    #[test]
    fn empty_query_triggers_one_analysis_pass() {
        let mut fake = FakeBackend::default();
        fake.cursor = 0x10;
        fake.symbols.insert("sym._mach_msg".to_string(), 0x2000);
        fake.refs_after_analysis = vec![call_ref(0x1000, "_mach_trap_foo")];
        let callers = find_trap_callers(&mut fake, &CarveConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(callers.len(), 1);
        assert!(fake.analyzed);
        assert_eq!(fake.cursor, 0x10);
    }

    #[test]
    fn still_empty_is_none() {
        let mut fake = FakeBackend::default();
        fake.symbols.insert("sym._mach_msg".to_string(), 0x2000);
        assert_eq!(
            find_trap_callers(&mut fake, &CarveConfig::default()).unwrap(),
            None
        );
        assert!(fake.analyzed);
    }

    #[test]
    fn only_filtered_refs_is_empty_not_none() {
        let mut fake = FakeBackend::default();
        fake.refs = vec![call_ref(0x1400, "_mach_msg_trap")];
        assert_eq!(
            find_trap_callers(&mut fake, &CarveConfig::default()).unwrap(),
            Some(vec![])
        );
    }
}
