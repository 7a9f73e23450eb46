//! The indexing coordinator for ChunkHound
//!
//! Drives the three-phase pipeline for a directory root: discover files on
//! disk, reconcile them against the store with the two-tier mtime/CRC32
//! change test, and apply the minimal set of deletions, additions, and
//! updates so that database state equals disk state on completion.
//! Embedding generation runs as a separate phase once chunking has left the
//! store consistent.

pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod outcome;

pub use coordinator::{DirectoryPlan, FileOp, IndexOptions, IndexingCoordinator};
pub use discovery::{discover, Candidate, DiscoveryOptions};
pub use error::{IndexingError, IndexingResult};
pub use outcome::{FileOutcome, IndexSummary, SkipReason};
