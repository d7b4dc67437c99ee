//! Thread-safe FIFO feeding slot threads.
//!
//! Built on `std::sync::mpsc` with the receiver shared behind a mutex:
//! producers enqueue through the sender, every slot thread competes on
//! the shared receiver, and `close` drops the sender so drained slots
//! observe a disconnected channel and exit. There is no sentinel value;
//! the closed channel is the shutdown signal.

use parking_lot::Mutex;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

pub struct TaskQueue<T> {
    sender: Mutex<Option<Sender<T>>>,
    receiver: Arc<Mutex<Receiver<T>>>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: Arc::new(Mutex::new(rx)),
        }
    }

    /// Enqueue a task. Returns `false` once the queue is closed.
    pub fn enqueue(&self, task: T) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(task).is_ok(),
            None => false,
        }
    }

    /// Take the next task, blocking in `tick`-sized intervals. Returns
    /// `None` exactly when the queue is closed and drained, so a slot
    /// loop of `while let Some(task) = queue.dequeue(tick)` terminates
    /// on `close` and never before.
    pub fn dequeue(&self, tick: Duration) -> Option<T> {
        loop {
            let result = self.receiver.lock().recv_timeout(tick);
            match result {
                Ok(task) => return Some(task),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Signal that no further tasks will arrive. Idempotent.
    pub fn close(&self) {
        self.sender.lock().take();
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TICK: Duration = Duration::from_millis(10);

    fn drain_with_slots(n_tasks: usize, n_slots: usize) -> Vec<usize> {
        let queue = Arc::new(TaskQueue::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..n_slots)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    while let Some(task) = queue.dequeue(TICK) {
                        seen.lock().push(task);
                    }
                })
            })
            .collect();

        for task in 0..n_tasks {
            assert!(queue.enqueue(task));
        }
        queue.close();
        for handle in handles {
            handle.join().unwrap();
        }

        Arc::try_unwrap(seen).ok().unwrap().into_inner()
    }

    #[test]
    fn every_task_is_delivered_exactly_once() {
        let n = 64;
        for slots in [1, n, 2 * n] {
            let mut seen = drain_with_slots(n, slots);
            seen.sort_unstable();
            assert_eq!(seen.len(), n, "slots={slots}");
            let unique: BTreeSet<_> = seen.iter().copied().collect();
            assert_eq!(unique.len(), n, "slots={slots}");
        }
    }

    #[test]
    fn close_unblocks_idle_slots() {
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let finished = Arc::clone(&finished);
                std::thread::spawn(move || {
                    assert!(queue.dequeue(TICK).is_none());
                    finished.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        queue.close();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn enqueue_after_close_is_rejected() {
        let queue = TaskQueue::new();
        assert!(queue.enqueue(1));
        queue.close();
        assert!(!queue.enqueue(2));
        // The item enqueued before close is still delivered.
        assert_eq!(queue.dequeue(TICK), Some(1));
        assert_eq!(queue.dequeue(TICK), None);
    }
}
