//! Hot-reloadable metadata caches.
//!
//! # Mental model
//!
//! * A cache holds one immutable [`Snapshot`] behind an `ArcSwap`.
//! * Readers call `current()` and get an `Arc` they can keep as long as they
//!   like. Loading never takes a lock after the first publication.
//! * An external [`ChangeEvent`] marks the cache stale. The subscriber then
//!   recomputes a whole new snapshot from its [`SnapshotSource`] and swaps it
//!   in. Old readers keep their old `Arc`.
//! * Only one recompute runs per cache at a time. Signals that arrive while a
//!   recompute is in flight are folded into one follow-up pass.
//!
//! # Failure modes
//!
//! * A failing source leaves the previous snapshot published. The error is
//!   logged and kept as [`InvalidatingCache::last_error`]; readers never see it.
//! * A source with nothing to read yet (missing root, missing manifest)
//!   publishes an explicit empty snapshot, see [`Snapshot::is_empty_source`].
//! * A first load that fails publishes an empty placeholder marked
//!   [`SnapshotOrigin::LoadFailed`], so readers can tell it from an empty source.
//!
//! Two concrete caches are provided: [`ProxyMetadataCache`] (function and
//! proxy definitions under a script root, refreshed on file changes) and
//! [`AssemblyPolicyCache`] (runtime assembly policy, refreshed when the
//! compatibility flag in the injected [`Environment`] flips).

mod assembly;
mod changes;
mod env;
mod error;
mod invalidating;
mod proxy;
mod snapshot;

pub use assembly::{AssemblyPolicyCache, AssemblyPolicySource, COMPATIBILITY_MODE_FLAG, ResolutionPolicy, RuntimeAssembly};
pub use changes::{ChangeBus, ChangeEvent, ChangeScope, ChangeSubscriber, FileChangeKind, spawn_change_listener};
pub use env::{Environment, MapEnvironment, ProcessEnvironment};
pub use error::{MetadataRefreshError, Result};
pub use invalidating::{InvalidatingCache, RefreshOutcome, SnapshotSource};
pub use proxy::{
	BindingRecord, FileSystemResolver, FunctionRecord, MetadataRecord, MetadataResolver, MetadataSource, ProxyMetadataCache, ProxyRecord,
};
pub use snapshot::{Snapshot, SnapshotOrigin};
