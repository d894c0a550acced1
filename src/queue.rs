use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::job::{Job, JobKey};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    active: HashSet<JobKey>,
    closed: bool,
}

/// FIFO of pending jobs plus the keys of jobs currently executing, under one
/// lock. A key is present in at most one of `pending ∪ active`.
#[derive(Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append unless an identical job is pending or running.
    pub fn enqueue(&self, job: Job) -> bool {
        let key = job.key();
        let mut st = self.lock();
        if st.active.contains(&key) || st.pending.iter().any(|j| j.key() == key) {
            tracing::debug!("queue: duplicate job rejected {:?}", key);
            return false;
        }
        st.pending.push_back(job);
        true
    }

    /// Pop the oldest pending job and mark it active. `None` when empty or
    /// after `close`.
    pub fn dequeue_next(&self) -> Option<Job> {
        let mut st = self.lock();
        if st.closed {
            return None;
        }
        let job = st.pending.pop_front()?;
        st.active.insert(job.key());
        Some(job)
    }

    pub fn complete_success(&self, job: &Job) {
        self.lock().active.remove(&job.key());
    }

    /// Move a failed job from active to the back of pending, keeping its
    /// attempt count.
    pub fn complete_failure(&self, job: Job) {
        let mut st = self.lock();
        st.active.remove(&job.key());
        st.pending.push_back(job);
    }

    /// Remove a pending job. Running jobs cannot be cancelled.
    pub fn cancel(&self, key: &JobKey) -> bool {
        let mut st = self.lock();
        match st.pending.iter().position(|j| &j.key() == key) {
            Some(idx) => {
                st.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, key: &JobKey) -> bool {
        self.lock().active.contains(key)
    }

    pub fn size(&self) -> usize {
        let st = self.lock();
        st.pending.len() + st.active.len()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.lock().active.len()
    }

    /// Stop handing out work; pending jobs stay in place.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_rejected_while_pending_or_active() {
        let q = JobQueue::new();
        assert!(q.enqueue(Job::upload("/l/a", "r/a")));
        assert!(!q.enqueue(Job::upload("/l/other", "r/a")));
        assert_eq!(q.size(), 1);

        let job = q.dequeue_next().unwrap();
        assert!(q.is_active(&job.key()));
        assert!(!q.enqueue(Job::upload("/l/a", "r/a")));
        assert_eq!(q.size(), 1);

        q.complete_success(&job);
        assert_eq!(q.size(), 0);
        assert!(q.enqueue(Job::upload("/l/a", "r/a")));
    }

    #[test]
    fn same_path_different_kind_is_distinct() {
        let q = JobQueue::new();
        assert!(q.enqueue(Job::upload("/l/a", "docs")));
        assert!(q.enqueue(Job::delete_dir("docs")));
        assert_eq!(q.size(), 2);
    }

    #[test]
    fn fifo_and_failure_goes_to_tail() {
        let q = JobQueue::new();
        q.enqueue(Job::delete_dir("a"));
        q.enqueue(Job::delete_dir("b"));
        let mut a = q.dequeue_next().unwrap();
        a.record_attempt();
        q.complete_failure(a);
        let b = q.dequeue_next().unwrap();
        assert_eq!(b.key(), JobKey::delete_dir("b"));
        let a_again = q.dequeue_next().unwrap();
        assert_eq!(a_again.key(), JobKey::delete_dir("a"));
        assert_eq!(a_again.attempts(), 1);
        assert!(q.dequeue_next().is_none());
    }

    #[test]
    fn cancel_only_pending() {
        let q = JobQueue::new();
        q.enqueue(Job::download("r/a", "/tmp/a"));
        q.enqueue(Job::download("r/b", "/tmp/b"));
        let running = q.dequeue_next().unwrap();
        assert!(!q.cancel(&running.key()));
        assert!(q.cancel(&JobKey::download("/tmp/b")));
        assert!(!q.cancel(&JobKey::download("/tmp/b")));
        assert_eq!(q.pending_len(), 0);
        assert_eq!(q.active_len(), 1);
    }

    #[test]
    fn closed_queue_hands_out_nothing() {
        let q = JobQueue::new();
        q.enqueue(Job::delete_dir("a"));
        q.close();
        assert!(q.is_closed());
        assert!(q.dequeue_next().is_none());
        assert_eq!(q.size(), 1);
    }
}
