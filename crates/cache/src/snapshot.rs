/// How a snapshot came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
	/// No data source existed yet; "no entries" rather than "fetch failed".
	EmptySource,
	/// Built from a successful source read.
	Loaded,
	/// The very first read failed; nothing better has been published yet.
	LoadFailed,
}

/// Immutable published view of derived metadata.
///
/// Never mutated after publication; a refresh publishes a new one with a
/// strictly greater generation.
#[derive(Debug)]
pub struct Snapshot<R> {
	generation: u64,
	origin: SnapshotOrigin,
	entries: Vec<R>,
}

impl<R> Snapshot<R> {
	pub(crate) fn loaded(generation: u64, entries: Vec<R>) -> Self {
		Self {
			generation,
			origin: SnapshotOrigin::Loaded,
			entries,
		}
	}

	pub(crate) fn empty(generation: u64) -> Self {
		Self {
			generation,
			origin: SnapshotOrigin::EmptySource,
			entries: Vec::new(),
		}
	}

	pub(crate) fn failed(generation: u64) -> Self {
		Self {
			generation,
			origin: SnapshotOrigin::LoadFailed,
			entries: Vec::new(),
		}
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn origin(&self) -> SnapshotOrigin {
		self.origin
	}

	/// `true` when no data source existed when this snapshot was built.
	pub fn is_empty_source(&self) -> bool {
		self.origin == SnapshotOrigin::EmptySource
	}

	/// `true` when this is the placeholder published after a failed first load.
	pub fn is_load_failed(&self) -> bool {
		self.origin == SnapshotOrigin::LoadFailed
	}

	pub fn entries(&self) -> &[R] {
		&self.entries
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, R> {
		self.entries.iter()
	}
}

impl<'a, R> IntoIterator for &'a Snapshot<R> {
	type Item = &'a R;
	type IntoIter = std::slice::Iter<'a, R>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.iter()
	}
}
