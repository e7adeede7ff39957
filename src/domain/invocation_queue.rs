use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn failed<E: std::fmt::Display>(error: E) -> Self {
        Self::Failed(error.to_string())
    }
}

pub type QueuedTask = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Failed(TaskError),
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// FIFO of deferred tasks. Any thread may push; one consumer drains with
/// [`InvocationQueue::invoke_all`]. The lock is never held while a task runs.
#[derive(Default)]
pub struct InvocationQueue {
    tasks: Mutex<Vec<QueuedTask>>,
    available: Condvar,
}

impl InvocationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&self, task: F)
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        self.lock().push(Box::new(task));
        self.available.notify_all();
    }

    /// Runs every task queued at the time of the call, in enqueue order.
    /// Tasks pushed while draining are left for the next call.
    pub fn invoke_all(&self) -> Vec<TaskOutcome> {
        let batch = std::mem::take(&mut *self.lock());

        batch
            .into_iter()
            .map(|task| match catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(())) => TaskOutcome::Completed,
                Ok(Err(error)) => TaskOutcome::Failed(error),
                Err(payload) => TaskOutcome::Failed(TaskError::Panicked(panic_message(&*payload))),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Blocks until at least one task is queued or `timeout` elapses.
    /// Returns whether tasks are pending.
    pub fn wait_for_tasks(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |tasks| tasks.is_empty())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !guard.is_empty()
    }

    // Tasks never run under the lock, so a poisoned buffer is still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<QueuedTask>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use super::{InvocationQueue, TaskError, TaskOutcome};

    #[test]
    fn runs_tasks_once_in_enqueue_order() {
        let queue = InvocationQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for value in 0..5 {
            let seen = Arc::clone(&seen);
            queue.push(move || {
                seen.lock().expect("lock").push(value);
                Ok(())
            });
        }
        assert_eq!(queue.len(), 5);

        let outcomes = queue.invoke_all();

        assert_eq!(outcomes, vec![TaskOutcome::Completed; 5]);
        assert_eq!(*seen.lock().expect("lock"), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert!(queue.invoke_all().is_empty());
        assert_eq!(seen.lock().expect("lock").len(), 5);
    }

    #[test]
    fn failing_task_does_not_stop_the_batch() {
        let queue = InvocationQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        queue.push(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        queue.push(|| Err(TaskError::failed("disk full")));
        queue.push(|| panic!("bad write"));
        let counter = Arc::clone(&ran);
        queue.push(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let outcomes = queue.invoke_all();

        assert_eq!(
            outcomes,
            vec![
                TaskOutcome::Completed,
                TaskOutcome::Failed(TaskError::Failed("disk full".to_string())),
                TaskOutcome::Failed(TaskError::Panicked("bad write".to_string())),
                TaskOutcome::Completed,
            ]
        );
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tasks_pushed_while_draining_run_on_the_next_drain() {
        let queue = Arc::new(InvocationQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let inner_queue = Arc::clone(&queue);
        let inner_ran = Arc::clone(&ran);
        queue.push(move || {
            let ran = Arc::clone(&inner_ran);
            inner_queue.push(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        assert_eq!(queue.invoke_all().len(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(!queue.is_empty());

        assert_eq!(queue.invoke_all().len(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_producers_never_lose_or_duplicate_tasks() {
        let queue = Arc::new(InvocationQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));
        let producers = 8;
        let per_producer = 250;

        let handles: Vec<_> = (0..producers)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let ran = Arc::clone(&ran);
                thread::spawn(move || {
                    for _ in 0..per_producer {
                        let ran = Arc::clone(&ran);
                        queue.push(move || {
                            ran.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        });
                    }
                })
            })
            .collect();

        let mut executed = 0;
        while executed < producers * per_producer {
            queue.wait_for_tasks(Duration::from_millis(50));
            executed += queue.invoke_all().len();
        }

        for handle in handles {
            handle.join().expect("producer should finish");
        }
        executed += queue.invoke_all().len();

        assert_eq!(executed, producers * per_producer);
        assert_eq!(ran.load(Ordering::SeqCst), producers * per_producer);
    }

    #[test]
    fn wait_for_tasks_times_out_on_empty_queue() {
        let queue = InvocationQueue::new();

        assert!(!queue.wait_for_tasks(Duration::from_millis(10)));
    }

    #[test]
    fn wait_for_tasks_wakes_on_push() {
        let queue = Arc::new(InvocationQueue::new());
        let producer = Arc::clone(&queue);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(|| Ok(()));
        });

        assert!(queue.wait_for_tasks(Duration::from_secs(5)));
        handle.join().expect("producer should finish");
    }
}
