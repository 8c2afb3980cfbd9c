// Crate root: declare modules and control visibility
pub mod backend;
pub mod carver;
pub mod config;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod rizin;
pub mod scanner;
pub mod transport;
pub mod trap_table;
pub mod utils;
pub mod walker;

#[cfg(test)]
mod test_backend;

// Re-export commonly used API from the library for binaries/tests
pub use backend::{AnalysisBackend, OpInfo, RefKind, Reference};
pub use config::CarveConfig;
pub use extractor::TrapTableExtractor;
pub use rizin::RizinBackend;
pub use trap_table::{TrapEntry, TrapTable};
pub use utils::beautify_name;
