//! Bounded record of recently played clip names

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RecentHistory {
    capacity: usize,
    names: VecDeque<String>,
}

impl RecentHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            names: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Record a play, evicting the oldest entry past capacity
    pub fn push(&mut self, name: &str) {
        self.names.push_back(name.to_string());
        while self.names.len() > self.capacity {
            self.names.pop_front();
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest() {
        let mut h = RecentHistory::new(3);
        for name in ["a", "b", "c", "d"] {
            h.push(name);
        }
        assert_eq!(h.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
        assert!(!h.contains("a"));
        assert!(h.contains("d"));
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let mut h = RecentHistory::new(0);
        h.push("a");
        assert!(h.is_empty());
    }
}
