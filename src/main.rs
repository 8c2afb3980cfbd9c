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

//! Regenerate `traps.json` for the XNU format parser.
//!
//! Open the dyld cache in rizin with only the kernel library loaded:
//!
//! ```text
//! RZ_DYLDCACHE_FILTER=libsystem_kernel rizin -e bin.usextr=false dyld_shared_cache_arm64e
//! ```
//!
//! then run `#!pipe xnu-machtraps > traps.json` from the rizin prompt, or let
//! the tool start rizin itself with `xnu-machtraps --spawn <cache>`.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use xnu_machtraps::logging::init_logging;
use xnu_machtraps::transport::{SpawnOptions, Transport};
use xnu_machtraps::{CarveConfig, RizinBackend, TrapTable, TrapTableExtractor};

#[derive(Parser, Debug)]
#[command(version, about = "Extract the mach trap table from libsystem_kernel with rizin")]
struct Args {
    /// Launch rizin on this file instead of attaching to the session that started us
    #[arg(long, value_name = "FILE")]
    spawn: Option<PathBuf>,

    /// rizin executable used with --spawn
    #[arg(long, default_value = "rizin")]
    rizin: String,

    /// Configuration passed to the spawned rizin (repeatable)
    #[arg(short = 'e', long = "eval", value_name = "KEY=VALUE", default_value = "bin.usextr=false")]
    evals: Vec<String>,

    /// dyld cache image filter for the spawned rizin; empty to load everything
    #[arg(long, default_value = "libsystem_kernel")]
    dyldcache_filter: String,

    /// JSON file overriding the architecture/ABI constants
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the table here instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Enable debug output
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    let _logger = init_logging(args.debug).context("starting logger")?;

    let config = match &args.config {
        Some(path) => CarveConfig::from_file(path)?,
        None => CarveConfig::default(),
    };
    let extractor = TrapTableExtractor::new(config).context("compiling boundary_pattern")?;

    let mut backend = connect(args)?;
    let Some(table) = extractor.extract(&mut backend).context("extracting traps")? else {
        // Plain diagnostic on stdout, no JSON
        extractor
            .write_missing_refs(io::stdout().lock())
            .context("writing to stdout")?;
        return Ok(ExitCode::FAILURE);
    };

    write_table(&table, args.output.as_ref())?;
    info!("wrote {} traps", table.len());
    Ok(ExitCode::SUCCESS)
}

fn connect(args: &Args) -> Result<RizinBackend<Box<dyn Transport>>> {
    match &args.spawn {
        Some(target) => {
            let opts = SpawnOptions {
                program: args.rizin.clone(),
                target: target.clone(),
                evals: args.evals.clone(),
                dyldcache_filter: Some(args.dyldcache_filter.clone()).filter(|f| !f.is_empty()),
            };
            RizinBackend::spawn(&opts)
                .with_context(|| format!("opening {} in {}", target.display(), args.rizin))
        }
        None => RizinBackend::open_session().context("attaching to the rizin session"),
    }
}

fn write_table(table: &TrapTable, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            table
                .write_json(BufWriter::new(file))
                .with_context(|| format!("writing {}", path.display()))
        }
        None => table
            .write_json(io::stdout().lock())
            .context("writing traps to stdout"),
    }
}
