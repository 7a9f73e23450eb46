//! The priority queue serializing all writer access
//!
//! Three FIFO lanes, one per priority class. `recv` always drains HIGH
//! before MEDIUM before LOW, so an interactive search never waits behind
//! more than the one task already in flight.

use crate::task::{Priority, Task};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Identity a task keeps from submission through execution
///
/// Backed by the queue's own FIFO sequence counter, so the number that
/// orders a task within its priority class is the same one that names it
/// in logs; a submission seen at enqueue time can be followed to the
/// worker without any extra bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Position in the global submission order
    pub const fn sequence(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A task plus its scheduling metadata
pub struct ScheduledTask {
    pub task: Task,
    pub priority: Priority,
    /// Dropped unexecuted if this instant passes while queued
    pub deadline: Option<Instant>,
    /// Observed by the task at suspension points once running
    pub cancel: CancellationToken,
    /// Submission-ordered identity, printed in logs
    pub id: TaskId,
}

impl ScheduledTask {
    /// Whether the deadline elapsed while the task sat in the queue
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| d <= now) || self.cancel.is_cancelled()
    }
}

#[derive(Default)]
struct Lanes {
    high: VecDeque<ScheduledTask>,
    medium: VecDeque<ScheduledTask>,
    low: VecDeque<ScheduledTask>,
    next_seq: u64,
    closed: bool,
}

impl Lanes {
    fn lane_mut(&mut self, priority: Priority) -> &mut VecDeque<ScheduledTask> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Medium => &mut self.medium,
            Priority::Low => &mut self.low,
        }
    }

    fn pop(&mut self) -> Option<ScheduledTask> {
        self.high
            .pop_front()
            .or_else(|| self.medium.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }
}

/// Multi-producer, single-consumer priority queue
pub struct TaskQueue {
    lanes: Mutex<Lanes>,
    notify: Notify,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(Lanes::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a task at its default priority
    ///
    /// Returns the cancellation token for the task.
    pub fn submit(&self, task: Task) -> CancellationToken {
        let priority = task.default_priority();
        self.submit_with(task, priority, None)
    }

    /// Enqueue with explicit priority and optional deadline
    pub fn submit_with(
        &self,
        task: Task,
        priority: Priority,
        deadline: Option<Instant>,
    ) -> CancellationToken {
        let cancel = CancellationToken::new();
        {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            if lanes.closed {
                // A task submitted after close is dropped; its reply sender
                // goes with it and the caller observes WorkerGone
                cancel.cancel();
                return cancel;
            }
            let id = TaskId(lanes.next_seq);
            lanes.next_seq += 1;
            lanes.lane_mut(priority).push_back(ScheduledTask {
                task,
                priority,
                deadline,
                cancel: cancel.clone(),
                id,
            });
        }
        self.notify.notify_one();
        cancel
    }

    /// Wait for the next task, highest priority first, FIFO within a class
    pub async fn recv(&self) -> ScheduledTask {
        loop {
            if let Some(task) = self.try_recv() {
                return task;
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking dequeue, used by the shutdown drain
    pub fn try_recv(&self) -> Option<ScheduledTask> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.pop()
    }

    /// Non-blocking dequeue of HIGH-priority tasks only
    ///
    /// The worker uses this to service interactive work between the steps
    /// of a long-running background scan.
    pub fn try_recv_high(&self) -> Option<ScheduledTask> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.high.pop_front()
    }

    /// Pending task count across all lanes
    pub fn depth(&self) -> usize {
        let lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.len()
    }

    /// Stop accepting new tasks (shutdown path)
    pub fn close(&self) {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.closed = true;
    }

    /// Verify FIFO sequencing invariants in debug builds
    #[cfg(test)]
    fn lane_seqs(&self, priority: Priority) -> Vec<u64> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes
            .lane_mut(priority)
            .iter()
            .map(|t| t.id.sequence())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkhound_indexing::FileOp;
    use std::path::PathBuf;
    use std::time::Duration;

    fn low_task(name: &str) -> Task {
        Task::ProcessFile {
            path: PathBuf::from(name),
            op: FileOp::Modified,
        }
    }

    fn high_task() -> (Task, tokio::sync::oneshot::Receiver<crate::SchedulerResult<chunkhound_storage::SearchPage>>) {
        let (reply, rx) = tokio::sync::oneshot::channel();
        (
            Task::SearchRegex {
                request: chunkhound_storage::RegexSearchRequest {
                    pattern: "p".to_string(),
                    path_filter: None,
                    limit: 10,
                    offset: 0,
                    max_response_bytes: None,
                },
                reply,
            },
            rx,
        )
    }

    #[test]
    fn high_priority_jumps_ahead_of_low() {
        let queue = TaskQueue::new();
        queue.submit(low_task("a"));
        queue.submit(low_task("b"));
        let (task, _rx) = high_task();
        queue.submit(task);

        let first = queue.try_recv().unwrap();
        assert_eq!(first.priority, Priority::High);
        let second = queue.try_recv().unwrap();
        assert_eq!(second.priority, Priority::Low);
    }

    #[test]
    fn fifo_within_a_priority_class() {
        let queue = TaskQueue::new();
        queue.submit(low_task("first"));
        queue.submit(low_task("second"));
        queue.submit(low_task("third"));

        let seqs = queue.lane_seqs(Priority::Low);
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);

        let mut names = Vec::new();
        while let Some(scheduled) = queue.try_recv() {
            if let Task::ProcessFile { path, .. } = scheduled.task {
                names.push(path);
            }
        }
        assert_eq!(
            names,
            vec![
                PathBuf::from("first"),
                PathBuf::from("second"),
                PathBuf::from("third")
            ]
        );
    }

    #[test]
    fn task_ids_follow_submission_order_across_lanes() {
        let queue = TaskQueue::new();
        queue.submit(low_task("a"));
        let (task, _rx) = high_task();
        queue.submit(task);
        queue.submit(low_task("b"));

        // Dequeue order is priority-first, but ids record submission order
        let first = queue.try_recv().unwrap();
        assert_eq!(first.priority, Priority::High);
        assert_eq!(first.id.sequence(), 1);
        assert_eq!(queue.try_recv().unwrap().id.sequence(), 0);
        assert_eq!(queue.try_recv().unwrap().id.sequence(), 2);
    }

    #[test]
    fn task_id_displays_with_prefix() {
        let queue = TaskQueue::new();
        queue.submit(low_task("x"));
        let scheduled = queue.try_recv().unwrap();
        assert_eq!(scheduled.id.to_string(), "task-0");
    }

    #[test]
    fn depth_counts_all_lanes() {
        let queue = TaskQueue::new();
        assert_eq!(queue.depth(), 0);
        queue.submit(low_task("a"));
        let (task, _rx) = high_task();
        queue.submit(task);
        assert_eq!(queue.depth(), 2);
        queue.try_recv();
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn expired_deadline_is_detectable_at_dequeue() {
        let queue = TaskQueue::new();
        let past = Instant::now() - Duration::from_secs(1);
        queue.submit_with(low_task("stale"), Priority::Low, Some(past));

        let scheduled = queue.try_recv().unwrap();
        assert!(scheduled.expired(Instant::now()));
    }

    #[test]
    fn cancelled_token_marks_task_expired() {
        let queue = TaskQueue::new();
        let token = queue.submit(low_task("doomed"));
        token.cancel();

        let scheduled = queue.try_recv().unwrap();
        assert!(scheduled.expired(Instant::now()));
    }

    #[test]
    fn closed_queue_drops_submissions() {
        let queue = TaskQueue::new();
        queue.close();
        let token = queue.submit(low_task("late"));
        assert!(token.is_cancelled());
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn recv_wakes_on_submit() {
        let queue = std::sync::Arc::new(TaskQueue::new());
        let receiver = std::sync::Arc::clone(&queue);
        let handle = tokio::spawn(async move { receiver.recv().await.priority });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.submit(low_task("wake"));
        assert_eq!(handle.await.unwrap(), Priority::Low);
    }
}
