//! CLI command implementations

pub mod cache;
pub mod config;
pub mod hydstra;
pub mod metrics;
pub mod spatial;
pub mod trace;

pub use cache::execute as cache;
pub use config::execute as config;
pub use hydstra::execute as hydstra;
pub use metrics::execute as metrics;
pub use spatial::execute as spatial;
pub use trace::execute as trace;

use crate::error::{LyraError, LyraResult};
use crate::source::{ByteSource, FileSource};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// The file given on the command line, else the configured one
fn file_source(
    flag: Option<PathBuf>,
    configured: Option<&PathBuf>,
    what: &'static str,
) -> LyraResult<Arc<dyn ByteSource>> {
    let path = flag
        .or_else(|| configured.cloned())
        .ok_or(LyraError::SourceNotConfigured(what))?;
    Ok(Arc::new(FileSource::new(path)))
}

/// Write a response body to stdout followed by a newline
fn emit(bytes: &[u8]) -> LyraResult<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(bytes)
        .and_then(|_| out.write_all(b"\n"))
        .and_then(|_| out.flush())
        .map_err(|e| LyraError::io("writing output", e))
}
