//! Task scheduling, file watching, and cross-process coordination
//!
//! All database access funnels through a single cooperative worker that
//! dequeues from a three-class priority queue: interactive searches stay
//! ahead of background indexing no matter how heavy the write storm.
//! A debounced recursive watcher and a periodic reconciliation loop feed
//! LOW-priority tasks; a small on-disk coordination file hands the
//! database between contending processes.

pub mod coordination;
pub mod error;
pub mod handle;
pub mod periodic;
pub mod queue;
pub mod task;
pub mod watcher;
pub mod worker;

pub use coordination::{spawn_handoff_monitor, CoordinationFile};
pub use error::{SchedulerError, SchedulerResult};
pub use handle::SchedulerHandle;
pub use periodic::spawn_periodic_scanner;
pub use queue::{TaskId, TaskQueue};
pub use task::{EngineStats, HealthReport, Priority, SemanticQuery, Task};
pub use watcher::FileWatcher;
pub use worker::{Worker, WorkerState};
