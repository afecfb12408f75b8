use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task queue is closed")]
pub struct QueueClosed;

/// FIFO serializer: tasks run one at a time on a dedicated worker, strictly in
/// submission order. A task that panics is logged and the next one proceeds.
pub struct TaskQueue {
    sender: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
}

impl TaskQueue {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let label = name.to_string();
        let worker = thread::Builder::new().name(label.clone()).spawn(move || {
            while let Ok(task) = receiver.recv() {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    log::error!("task on queue {label} panicked");
                }
            }
        })?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn add<F>(&self, task: F) -> Result<(), QueueClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(QueueClosed)?;
        sender.send(Box::new(task)).map_err(|_| QueueClosed)
    }
}

impl Drop for TaskQueue {
    // Closing the channel lets the worker drain what is queued, then exit.
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TaskQueue;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_tasks_in_submission_order() {
        let queue = TaskQueue::new("test-queue").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..5 {
            let seen = Arc::clone(&seen);
            queue.add(move || seen.lock().unwrap().push(n)).unwrap();
        }
        drop(queue);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn panicking_task_does_not_block_the_next() {
        let queue = TaskQueue::new("test-queue").unwrap();
        let (tx, rx) = mpsc::channel();
        queue.add(|| panic!("boom")).unwrap();
        queue.add(move || tx.send("after").unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), "after");
    }
}
