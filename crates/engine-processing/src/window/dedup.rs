use std::collections::{HashSet, VecDeque};

/// Recently admitted event ids. Once full, the oldest id is forgotten first.
#[derive(Debug)]
pub struct SeenEvents {
    capacity: usize,
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenEvents {
    /// A capacity of zero remembers nothing, so every id is new.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ids: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Remembers `id`. Returns false when it was already remembered.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.ids.contains(id) {
            return false;
        }

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_ids_are_rejected() {
        let mut seen = SeenEvents::new(10);
        assert!(seen.insert("e1"));
        assert!(seen.insert("e2"));
        assert!(!seen.insert("e1"));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn oldest_ids_are_evicted_at_capacity() {
        let mut seen = SeenEvents::new(2);
        assert!(seen.insert("e1"));
        assert!(seen.insert("e2"));
        assert!(seen.insert("e3"));
        assert_eq!(seen.len(), 2);

        assert!(!seen.insert("e3"));
        assert!(seen.insert("e1"));
    }

    #[test]
    fn zero_capacity_disables_tracking() {
        let mut seen = SeenEvents::new(0);
        assert!(seen.insert("e1"));
        assert!(seen.insert("e1"));
        assert!(seen.is_empty());
    }
}
