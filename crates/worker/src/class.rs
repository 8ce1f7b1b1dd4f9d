/// Execution classes used for host task scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Worker channel startup and readiness probes.
	Startup,
	/// Metadata recomputation; may block on filesystem reads.
	Refresh,
	/// Channel drain and teardown during host stop.
	Shutdown,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Startup => "startup",
			Self::Refresh => "refresh",
			Self::Shutdown => "shutdown",
		}
	}
}
