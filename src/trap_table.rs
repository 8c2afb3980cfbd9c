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

use serde::Serialize;
use std::io;

/// One row of `traps.json`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TrapEntry {
    pub name: String,
    pub num: u64,
}

/// The trap table, ascending by trap number.
///
/// Format:
/// [
///     {
///         "name": "mach_reply_port",
///         "num": 26
///     },
///     ...
/// ]
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct TrapTable {
    entries: Vec<TrapEntry>,
}

impl TrapTable {
    /// Drop unresolved candidates and order the rest by number. Equal numbers
    /// keep the order they were found in.
    pub fn assemble<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<u64>)>,
    {
        let mut entries: Vec<TrapEntry> = candidates
            .into_iter()
            .filter_map(|(name, num)| num.map(|num| TrapEntry { name, num }))
            .collect();
        entries.sort_by_key(|e| e.num);
        Self { entries }
    }

    pub fn entries(&self) -> &[TrapEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty JSON with 4-space indentation and a trailing newline.
    pub fn write_json<W: io::Write>(&self, mut writer: W) -> serde_json::Result<()> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
        self.serialize(&mut ser)?;
        writer.write_all(b"\n").map_err(serde_json::Error::io)?;
        writer.flush().map_err(serde_json::Error::io)
    }

    pub fn to_json_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_json(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}
