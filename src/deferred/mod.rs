//! Single-shot deferred values.
//!
//! A [`Deferred`] starts Pending and settles exactly once, either Fulfilled
//! with a value or Rejected with an error. Observers attached with
//! [`Deferred::on_settle`] are delivered through the deferred's
//! [`Scheduler`](crate::Scheduler), never on the caller's stack, whether they
//! were attached before or after settlement.
//!
//! ```text
//! Pending ──fulfill(v)──► Fulfilled(v)
//!    └─────reject(e)───► Rejected(e)
//! ```

mod deferred;
mod error;
mod outcome;
mod settled;

pub use deferred::Deferred;
pub use error::{SettleError, UnhandledRejection};
pub use outcome::{Outcome, State};
pub use settled::Settled;
