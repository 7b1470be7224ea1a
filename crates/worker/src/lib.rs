//! Task spawning shared by hexite services.
//!
//! Every long-lived task in the workspace (broker workers, RPC handler tasks,
//! stream pumps) is started through [`spawn`] so it carries a [`TaskClass`]
//! in its trace events and attaches to whatever runtime is current.

mod class;
mod spawn;

pub use class::TaskClass;
pub use spawn::spawn;
