//! Logical-clock task scheduling and re-entrancy latches.
//!
//! The engine never sleeps or spawns timers. Delayed work is queued against a caller-supplied
//! clock and executed when [`crate::Engine::tick`] is called with a time at or past its due
//! time. Every task carries the engine generation it was scheduled under; tasks from an older
//! generation are discarded on pop.

use crate::sequencer::BatchId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Run a visibility propagation pass.
    Propagate,
    /// Overlap resolution, compaction and position locking after the first layout.
    Settle,
    /// Start applying the next queued mutation batch.
    ProcessQueue,
    /// Regular completion of a batch after it settled.
    FinishBatch(BatchId),
    /// Safety net for a batch that never finished.
    BatchTimeout(BatchId),
}

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey {
    due: Duration,
    seq: u64,
}

impl TaskKey {
    pub fn due(&self) -> Duration {
        self.due
    }
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    generation: u64,
    task: Task,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BTreeMap<TaskKey, Scheduled>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Duration, generation: u64, task: Task) -> TaskKey {
        let key = TaskKey {
            due,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.queue.insert(key, Scheduled { generation, task });
        key
    }

    pub fn cancel(&mut self, key: TaskKey) -> bool {
        self.queue.remove(&key).is_some()
    }

    /// Sequence number the next scheduled task will receive.
    pub fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Pops the earliest task due at `now` that was scheduled before `watermark`.
    ///
    /// Tasks scheduled while a tick is being processed therefore run on the following tick,
    /// even when they are already due.
    pub fn pop_due(&mut self, now: Duration, watermark: u64) -> Option<(u64, Task)> {
        let key = self
            .queue
            .keys()
            .take_while(|k| k.due <= now)
            .find(|k| k.seq < watermark)
            .copied()?;
        self.queue
            .remove(&key)
            .map(|s| (s.generation, s.task))
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.queue.keys().next().map(|k| k.due)
    }

    /// Tasks still queued for `generation`, in due order.
    pub fn pending(&self, generation: u64) -> impl Iterator<Item = Task> + '_ {
        self.queue
            .values()
            .filter(move |s| s.generation == generation)
            .map(|s| s.task)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A boolean flag that can be held by at most one [`LatchGuard`] at a time.
///
/// The flag is cleared when the guard drops, so it is reset on every exit path of the work
/// it protects.
#[derive(Debug, Clone, Default)]
pub struct Latch {
    held: Arc<AtomicBool>,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<LatchGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LatchGuard {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct LatchGuard {
    held: Arc<AtomicBool>,
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
