use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use base::Packet;

/// A FIFO protected by its own lock.  Every operation is atomic with
/// respect to the others; none of them blocks waiting for data.
#[derive(Debug)]
pub struct ConcurrentQueue<T> {
    items: Mutex<VecDeque<T>>,
}

pub type PacketQueue = ConcurrentQueue<Packet>;

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConcurrentQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        ConcurrentQueue {
            items: Mutex::new(VecDeque::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock cannot leave the deque
        // half-modified, so a poisoned lock is still usable.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: T) {
        self.guard().push_back(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.guard().pop_front()
    }

    /// Pops the front item only if `pred` accepts it.  Items behind
    /// the front are never examined, so a rejected front item blocks
    /// the queue until somebody else takes it.
    pub fn pop_if<F>(&self, pred: F) -> Option<T>
    where
        F: FnOnce(&T) -> bool,
    {
        let mut items = self.guard();
        match items.front() {
            Some(front) if pred(front) => items.pop_front(),
            _ => None,
        }
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

#[test]
fn test_fifo_order() {
    let q: ConcurrentQueue<u32> = ConcurrentQueue::new();
    assert!(q.is_empty());
    q.push(1);
    q.push(2);
    q.push(3);
    assert_eq!(q.len(), 3);
    assert_eq!(q.pop(), Some(1));
    assert_eq!(q.pop(), Some(2));
    assert_eq!(q.pop(), Some(3));
    assert_eq!(q.pop(), None);
}

#[test]
fn test_pop_if_only_looks_at_front() {
    let q: ConcurrentQueue<u32> = ConcurrentQueue::new();
    q.push(1);
    q.push(2);
    assert_eq!(q.pop_if(|n| *n == 2), None);
    assert_eq!(q.len(), 2);
    assert_eq!(q.pop_if(|n| *n == 1), Some(1));
    assert_eq!(q.pop_if(|n| *n == 2), Some(2));
    assert_eq!(q.pop_if(|_| true), None);
}

#[test]
fn test_clear() {
    let q: ConcurrentQueue<&str> = ConcurrentQueue::new();
    q.push("a");
    q.push("b");
    q.clear();
    assert!(q.is_empty());
}

#[test]
fn test_concurrent_producers() {
    use std::sync::Arc;
    use std::thread;

    let q: Arc<ConcurrentQueue<usize>> = Arc::new(ConcurrentQueue::new());
    let producers: Vec<_> = (0..4)
        .map(|t| {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..100 {
                    q.push(t * 1000 + i);
                }
            })
        })
        .collect();
    for p in producers {
        p.join().expect("producer thread should not panic");
    }
    assert_eq!(q.len(), 400);
    // Each producer's items keep their relative order.
    let mut last = [None; 4];
    while let Some(item) = q.pop() {
        let (t, i) = (item / 1000, item % 1000);
        if let Some(prev) = last[t] {
            assert!(i > prev);
        }
        last[t] = Some(i);
    }
}
