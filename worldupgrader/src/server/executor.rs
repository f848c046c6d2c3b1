use std::{fmt, marker::PhantomData};

use crossbeam::channel::{self, Receiver, Sender};
use thiserror::Error;

/// A unit of work run on the logic thread with exclusive access to `C`.
pub type Task<C, E> = Box<dyn FnOnce(&mut C) -> Result<(), E> + Send>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("The task queue was dropped before the task could be enqueued")]
pub struct QueueClosed;

/// FIFO of tasks drained on the thread that owns it.
///
/// Any thread may enqueue through a [`TaskSender`], but only the owner can run
/// tasks. The queue is neither `Send` nor `Sync`, so draining it from another
/// thread does not compile.
pub struct TaskQueue<C, E> {
    sender: Sender<Task<C, E>>,
    receiver: Receiver<Task<C, E>>,
    _owner: PhantomData<*const ()>,
}

impl<C, E> TaskQueue<C, E> {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender,
            receiver,
            _owner: PhantomData,
        }
    }

    /// A handle producers on other threads can enqueue through.
    pub fn sender(&self) -> TaskSender<C, E> {
        TaskSender {
            sender: self.sender.clone(),
        }
    }

    pub fn enqueue(&self, task: Task<C, E>) {
        // Cannot fail, the receiver lives as long as the queue
        let _ = self.sender.send(task);
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Runs tasks until the queue is empty, including tasks enqueued while the
    /// drain is in progress. Stops at the first failing task and leaves the rest
    /// queued. Returns how many tasks ran.
    pub fn run_all_pending(&self, context: &mut C) -> Result<usize, E> {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task(context)?;
            ran += 1;
        }
        if ran > 0 {
            log::trace!("Drained {} tasks", ran);
        }
        Ok(ran)
    }
}

impl<C, E> Default for TaskQueue<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> fmt::Debug for TaskQueue<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Producer side of a [`TaskQueue`].
pub struct TaskSender<C, E> {
    sender: Sender<Task<C, E>>,
}

impl<C, E> TaskSender<C, E> {
    /// Queues `task`. It runs on the next drain, never immediately.
    pub fn enqueue(&self, task: Task<C, E>) -> Result<(), QueueClosed> {
        self.sender.send(task).map_err(|_| QueueClosed)
    }
}

impl<C, E> Clone for TaskSender<C, E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::{QueueClosed, TaskQueue};

    #[test]
    fn drain_runs_tasks_enqueued_during_the_drain() {
        let queue: TaskQueue<Vec<u32>, ()> = TaskQueue::new();
        let sender = queue.sender();
        queue.enqueue(Box::new(move |log: &mut Vec<u32>| {
            log.push(1);
            let inner = sender.clone();
            sender
                .enqueue(Box::new(move |log: &mut Vec<u32>| {
                    log.push(2);
                    inner
                        .enqueue(Box::new(|log: &mut Vec<u32>| {
                            log.push(3);
                            Ok(())
                        }))
                        .map_err(|_| ())
                }))
                .map_err(|_| ())
        }));

        let mut log = Vec::new();
        assert_eq!(queue.run_all_pending(&mut log), Ok(3));
        assert_eq!(log, vec![1, 2, 3]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn producers_on_other_threads_run_on_next_drain() {
        let queue: TaskQueue<u32, ()> = TaskQueue::new();
        let sender = queue.sender();
        thread::spawn(move || {
            for _ in 0..10 {
                sender
                    .enqueue(Box::new(|sum: &mut u32| {
                        *sum += 1;
                        Ok(())
                    }))
                    .unwrap();
            }
        })
        .join()
        .unwrap();

        assert_eq!(queue.pending(), 10);
        let mut sum = 0;
        assert_eq!(queue.run_all_pending(&mut sum), Ok(10));
        assert_eq!(sum, 10);
    }

    #[test]
    fn failing_task_stops_the_drain() {
        let queue: TaskQueue<u32, &'static str> = TaskQueue::new();
        queue.enqueue(Box::new(|n: &mut u32| {
            *n += 1;
            Ok(())
        }));
        queue.enqueue(Box::new(|_: &mut u32| Err("disk full")));
        queue.enqueue(Box::new(|n: &mut u32| {
            *n += 1;
            Ok(())
        }));

        let mut n = 0;
        assert_eq!(queue.run_all_pending(&mut n), Err("disk full"));
        assert_eq!(n, 1);
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.run_all_pending(&mut n), Ok(1));
    }

    #[test]
    fn sender_fails_once_queue_is_gone() {
        let queue: TaskQueue<(), ()> = TaskQueue::new();
        let sender = queue.sender();
        drop(queue);
        assert_eq!(sender.enqueue(Box::new(|_: &mut ()| Ok(()))), Err(QueueClosed));
    }
}
