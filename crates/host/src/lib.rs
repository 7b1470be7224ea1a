//! Hosts one open binary document and the views attached to it.
//!
//! A [`Document`] wraps the resource's accessor and lifecycle events. A
//! [`DocumentSession`] attaches presentation views to it over
//! [`RpcChannel`](hexite_rpc::RpcChannel)s, answers their
//! [`ViewMessage`]s, and tells every view to reload when the resource changes
//! on disk.

mod document;
mod error;
pub mod protocol;
mod session;

pub use document::{Document, DocumentEvent, parse_base_address};
pub use error::{HostError, Result};
pub use protocol::{HostMessage, ViewMessage};
pub use session::{DocumentSession, ViewChannel, ViewHandler};
