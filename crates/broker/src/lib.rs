//! Exclusive, queued access to one lazily opened resource handle.
//!
//! A [`HandleBroker`] owns at most one handle produced by a [`HandleSource`].
//! Callers never see the handle directly: they submit operations through
//! [`HandleBroker::borrow`], which run one at a time in submission order on a
//! dedicated worker task. The handle is opened on the first borrow, kept open
//! while work keeps arriving, and closed again after a quiet period so the
//! process does not pin an OS-level lock on the file.

mod broker;
mod error;
mod source;

pub use broker::{BrokerStats, DEFAULT_IDLE_CLOSE, HandleBroker, PendingBorrow};
pub use error::{BrokerError, Result};
pub use source::{FsSource, HandleSource, file_len, read_at};
