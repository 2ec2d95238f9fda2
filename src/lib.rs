//! gitpulse - streaming git history engine
//!
//! Reads commit history straight from a repository's object database and
//! streams it in batches, with cooperative cancellation and incremental
//! continuation. Mutating operations are delegated to an installed `git`.
//!
//! ```no_run
//! use gitpulse::config::EngineConfig;
//! use gitpulse::models::{LoadRequest, ProgressEvent};
//! use gitpulse::session::SessionManager;
//!
//! # async fn demo() {
//! let manager = SessionManager::new(EngineConfig::default());
//! let mut load = manager.start_load(LoadRequest::new("/path/to/repo").limit(200));
//! while let Some(event) = load.events.recv().await {
//!     if let ProgressEvent::Data { commits, .. } = event {
//!         for commit in commits {
//!             println!("{} {}", commit.short_hash(), commit.summary);
//!         }
//!     }
//! }
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod git;
pub mod models;
pub mod server;
pub mod session;

#[cfg(test)]
mod test_support;

pub use error::{EngineError, EngineResult};
pub use models::{Branch, Commit, FileChange, FileStatus, LoadRequest, ProgressEvent, Stats};
