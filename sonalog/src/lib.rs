//! Indexed sidescan sonar log engine.
//!
//! This crate turns raw sonar log files into a time-addressable dataset.
//! Parsing of the two wire formats lives in `sonalog-core`; this crate adds
//! everything that touches the filesystem:
//!
//! ```text
//! log files ──► StreamScanner ──► TimeIndex ──► IndexStore (sidecar .slx)
//!                                     │
//!                   MultiFileSession ◄┘
//!                     │        │
//!                 line_at  lines_between ──► SidescanLine
//!                     │        │
//!                 ResultCache (payloads + lines, LRU)
//! ```
//!
//! A [`session::MultiFileSession`] opens any number of log files, loads or
//! rebuilds their sidecar indices, and answers timestamp queries across all
//! of them. Decoded payloads and reconstructed lines are cached with bounded
//! LRU maps so repeated queries over the same region stay cheap.
//!
//! ## Example
//!
//! ```no_run
//! use sonalog::session::MultiFileSession;
//! use sonalog_core::line::DisplayParams;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = MultiFileSession::open(&["survey1.log", "survey2.log"])?;
//! let params = session.default_params();
//! if let Some(start) = session.first_timestamp(None) {
//!     if let Some(line) = session.line_at(start, 20, &params)? {
//!         println!("{} samples at {}", line.samples.len(), line.timestamp_ms);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod index;
pub mod reconstruct;
pub mod scanner;
pub mod session;
pub mod synth;

pub use cache::ResultCache;
pub use index::{IndexError, IndexStore, LogSummary, TimeIndex};
pub use reconstruct::LineReconstructor;
pub use scanner::{ScanStatistics, StreamScanner};
pub use session::{LineIter, MultiFileSession, QueryError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
