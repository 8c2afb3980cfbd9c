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

/// One pass over the session: callers of the dispatch symbol, a carve per
/// call site, then the sorted table.
use crate::backend::AnalysisBackend;
use crate::carver::TrapCarver;
use crate::config::CarveConfig;
use crate::error::BackendError;
use crate::scanner::find_trap_callers;
use crate::trap_table::TrapTable;
use crate::utils::beautify_name;
use log::{debug, info};
use std::io::{self, Write};

pub struct TrapTableExtractor {
    config: CarveConfig,
    carver: TrapCarver,
}

impl TrapTableExtractor {
    pub fn new(config: CarveConfig) -> Result<Self, regex::Error> {
        let carver = TrapCarver::new(&config)?;
        Ok(Self { config, carver })
    }

    /// Diagnostic for a session where the dispatch symbol has no callers,
    /// e.g. `Cannot find refs to mach_msg!`. No table follows it.
    pub fn write_missing_refs<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(
            writer,
            "Cannot find refs to {}!",
            self.config.alias_prefix().trim_start_matches('_')
        )?;
        writer.flush()
    }

    /// `Ok(None)` when the dispatch symbol has no references at all.
    pub fn extract<B: AnalysisBackend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<Option<TrapTable>, BackendError> {
        let Some(callers) = find_trap_callers(backend, &self.config)? else {
            return Ok(None);
        };

        // Keyed by call site: a repeated address keeps its first slot but
        // takes the later name
        let mut sites: Vec<(u64, String)> = Vec::with_capacity(callers.len());
        for caller in callers {
            let Some(realname) = caller.realname else {
                continue;
            };
            match sites.iter_mut().find(|(addr, _)| *addr == caller.from) {
                Some(slot) => slot.1 = realname,
                None => sites.push((caller.from, realname)),
            }
        }

        let mut candidates = Vec::with_capacity(sites.len());
        for (addr, realname) in sites {
            let flag = self.config.flag_for(&realname);
            let num = self.carver.carve_trap_num(backend, addr, &flag)?;
            match num {
                Some(n) => debug!("0x{:x} {} -> {}", addr, realname, n),
                None => debug!("0x{:x} {} -> unresolved, dropped", addr, realname),
            }
            candidates.push((beautify_name(&realname).to_string(), num));
        }

        let table = TrapTable::assemble(candidates);
        info!("carved {} traps", table.len());
        Ok(Some(table))
    }
}
