//! Unbounded FIFO of data awaiting delivery

use std::collections::VecDeque;
use std::sync::Mutex;

/// Ordered, unbounded buffer; items leave in arrival order exactly once
#[derive(Debug)]
pub struct IngressQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for IngressQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IngressQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove everything still waiting
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        let dropped = items.len();
        items.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = IngressQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 5);

        let drained: Vec<i32> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let queue = IngressQueue::new();
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.clear(), 2);
        assert!(queue.pop().is_none());
    }
}
