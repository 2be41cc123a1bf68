//! Blocking primitives shared by the scheduler threads.
//!
//! Both primitives can be closed. Closing wakes every waiter and makes
//! further waits fail, which is how the schedulers are torn down.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Returned by waits on a closed primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug)]
struct SemaphoreState {
    count: i64,
    closed: bool,
}

/// Counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemaphoreState>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `initial` permits.
    pub fn new(initial: u32) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                count: i64::from(initial),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Blocks until a permit is available and takes it.
    pub fn acquire(&self) -> Result<(), Closed> {
        let mut state = lock(&self.state);
        loop {
            if state.closed {
                return Err(Closed);
            }
            if state.count > 0 {
                state.count -= 1;
                return Ok(());
            }
            state = match self.available.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Takes a permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut state = lock(&self.state);
        if !state.closed && state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    /// Returns one permit.
    pub fn release(&self) {
        let mut state = lock(&self.state);
        state.count += 1;
        self.available.notify_one();
    }

    /// Current number of permits.
    pub fn value(&self) -> i64 {
        lock(&self.state).count
    }

    /// Wakes every waiter; later acquires fail.
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// FIFO queue guarded by a mutex, with a "non-empty" condition.
#[derive(Debug)]
pub struct SafeQueue<T> {
    state: Mutex<QueueState<T>>,
    non_empty: Condvar,
}

impl<T> SafeQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            non_empty: Condvar::new(),
        }
    }

    /// Appends an item and wakes one waiter.
    pub fn push(&self, item: T) {
        let mut state = lock(&self.state);
        state.items.push_back(item);
        self.non_empty.notify_one();
    }

    /// Pops the head without blocking.
    pub fn pop(&self) -> Option<T> {
        lock(&self.state).items.pop_front()
    }

    /// Returns the number of queued items.
    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    /// Returns whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        lock(&self.state).items.is_empty()
    }

    /// Stable sort of the queued items.
    pub fn sort_by_key<K, F>(&self, key: F)
    where
        K: Ord,
        F: FnMut(&T) -> K,
    {
        lock(&self.state).items.make_contiguous().sort_by_key(key);
    }

    /// Runs `f` on the items while holding the lock.
    pub fn with_items<R>(&self, f: impl FnOnce(&mut VecDeque<T>) -> R) -> R {
        f(&mut lock(&self.state).items)
    }

    /// Waits up to `timeout` for the queue to become non-empty.
    ///
    /// Returns `Ok(true)` if items are available, `Ok(false)` on timeout.
    pub fn wait_non_empty(&self, timeout: Duration) -> Result<bool, Closed> {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.state);
        loop {
            if state.closed {
                return Err(Closed);
            }
            if !state.items.is_empty() {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            state = match self.non_empty.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Wakes every waiter; later waits fail. Queued items are kept.
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.non_empty.notify_all();
    }

    /// Returns a copy of the queued items, head first.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        lock(&self.state).items.iter().cloned().collect()
    }
}

impl<T> Default for SafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_queue_ordering() {
        let queue = SafeQueue::new();
        queue.push("a");
        queue.push("b");
        queue.push("c");

        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), Some("c"));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_sort_is_stable() {
        let queue = SafeQueue::new();
        queue.push((5, 'a'));
        queue.push((5, 'b'));
        queue.push((3, 'c'));
        queue.sort_by_key(|item| item.0);
        assert_eq!(queue.snapshot(), vec![(3, 'c'), (5, 'a'), (5, 'b')]);
    }

    #[test]
    fn test_wait_non_empty_times_out() {
        let queue: SafeQueue<u32> = SafeQueue::new();
        assert_eq!(queue.wait_non_empty(Duration::from_millis(5)), Ok(false));
    }

    #[test]
    fn test_wait_non_empty_wakes_on_push() {
        let queue = Arc::new(SafeQueue::new());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.push(1u32);
        });
        assert_eq!(queue.wait_non_empty(Duration::from_secs(5)), Ok(true));
        handle.join().unwrap();
    }

    #[test]
    fn test_closed_queue_fails_waits() {
        let queue: SafeQueue<u32> = SafeQueue::new();
        queue.close();
        assert_eq!(queue.wait_non_empty(Duration::from_secs(1)), Err(Closed));
    }

    #[test]
    fn test_semaphore_counts() {
        let sem = Semaphore::new(2);
        assert!(sem.acquire().is_ok());
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        sem.release();
        assert_eq!(sem.value(), 1);
    }

    #[test]
    fn test_close_wakes_blocked_acquire() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = Arc::clone(&sem);
        let handle = thread::spawn(move || waiter.acquire());
        thread::sleep(Duration::from_millis(10));
        sem.close();
        assert_eq!(handle.join().unwrap(), Err(Closed));
    }

    #[test]
    fn test_release_wakes_blocked_acquire() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = Arc::clone(&sem);
        let handle = thread::spawn(move || waiter.acquire());
        thread::sleep(Duration::from_millis(10));
        sem.release();
        assert_eq!(handle.join().unwrap(), Ok(()));
        assert_eq!(sem.value(), 0);
    }
}
