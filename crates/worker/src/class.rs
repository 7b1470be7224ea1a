/// Execution classes used to tag spawned tasks in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work that answers a peer request and is awaited by someone.
	Interactive,
	/// Long-lived loops: handle workers, stream pumps.
	Background,
	/// Tasks whose body is dominated by file I/O.
	Io,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::Io => "io",
		}
	}
}
