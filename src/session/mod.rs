//! Streaming load sessions
//!
//! A session walks one branch and streams its commits in batches:
//!
//! ```text
//! Idle -> Starting -> Emitting -> Completed
//!            |           |
//!            +-----------+-> Cancelled | Failed
//! ```
//!
//! Cancellation is cooperative. The flag is polled before `Start` and before
//! every batch, so a cancelled session stops within one batch and never emits
//! `End` or `Error`. A completed session leaves a [`LoadCursor`] behind that
//! lets a longer request on the same walk skip what was already delivered.

mod cancel;
mod cursor;
mod load;
mod manager;
mod sink;

pub use cancel::CancellationToken;
pub use cursor::{CursorKey, CursorStore, LoadCursor, LoadPlan};
pub use load::{LoadSession, SessionId, SessionOutcome, SessionState};
pub use manager::{LoadHandle, SessionManager};
pub use sink::{EventSink, FnSink};
