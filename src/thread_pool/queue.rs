use super::Message;
use crate::error::{ErrorKind, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Unbounded FIFO of pending jobs with a completion barrier.
///
/// Every enqueued job bumps the unfinished count; `mark_done` lowers it and
/// `join` waits for it to reach zero.
pub struct JobQueue<J> {
    sender: Sender<Message<J>>,
    receiver: Receiver<Message<J>>,
    unfinished: Mutex<usize>,
    all_done: Condvar,
}

impl<J> JobQueue<J> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        JobQueue {
            sender,
            receiver,
            unfinished: Mutex::new(0),
            all_done: Condvar::new(),
        }
    }

    pub fn enqueue(&self, job: J) {
        // count first so a fast worker can never mark it done before it is counted
        *self.lock() += 1;
        // both ends live in self, the channel cannot be disconnected here
        let _ = self.sender.send(Message::Work(job));
    }

    /// Blocks until a job is available. Returns `None` once the queue is told
    /// to terminate.
    pub fn dequeue(&self) -> Option<J> {
        match self.receiver.recv() {
            Ok(Message::Work(job)) => Some(job),
            Ok(Message::Terminate) | Err(_) => None,
        }
    }

    /// Wakes `count` blocked consumers with a stop message. Stop messages are
    /// queued behind pending jobs and are not counted as unfinished work.
    pub fn terminate(&self, count: usize) {
        for _ in 0..count {
            let _ = self.sender.send(Message::Terminate);
        }
    }

    pub fn mark_done(&self) -> Result<()> {
        let mut unfinished = self.lock();
        if *unfinished == 0 {
            return Err(ErrorKind::UnbalancedDone.into());
        }
        *unfinished -= 1;
        if *unfinished == 0 {
            self.all_done.notify_all();
        }
        Ok(())
    }

    pub fn join(&self) {
        let mut unfinished = self.lock();
        while *unfinished > 0 {
            unfinished = self
                .all_done
                .wait(unfinished)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Jobs queued or running that were not marked done yet.
    pub fn unfinished(&self) -> usize {
        *self.lock()
    }

    /// Messages waiting in the channel.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // a plain counter cannot be left half updated
        self.unfinished.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<J> Default for JobQueue<J> {
    fn default() -> Self {
        JobQueue::new()
    }
}
