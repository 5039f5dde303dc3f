//! Sorted object sets
//!
//! Points-to sets are sorted, duplicate-free vectors of [`ObjectId`]:
//! - Insert: O(log n) search + O(n) shift (sets are small in practice)
//! - Contains: O(log n)
//! - Union: O(n + m) merge, reporting whether anything was added
//!
//! Iteration order is ascending id order, which keeps every consumer deterministic.

use crate::features::cpa::domain::ObjectId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectSet {
    elements: Vec<ObjectId>,
}

impl ObjectSet {
    #[inline]
    pub const fn new() -> Self {
        Self {
            elements: Vec::new(),
        }
    }

    #[inline]
    pub fn singleton(id: ObjectId) -> Self {
        Self { elements: vec![id] }
    }

    /// Insert one object; returns whether it was new
    pub fn insert(&mut self, id: ObjectId) -> bool {
        match self.elements.binary_search(&id) {
            Ok(_) => false,
            Err(pos) => {
                self.elements.insert(pos, id);
                true
            }
        }
    }

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.elements.binary_search(&id).is_ok()
    }

    /// Merge `other` into `self`; returns whether `self` grew
    pub fn union_with(&mut self, other: &ObjectSet) -> bool {
        if other.elements.is_empty() {
            return false;
        }
        if self.elements.is_empty() {
            self.elements = other.elements.clone();
            return true;
        }
        if other.is_subset(self) {
            return false;
        }

        let mut merged = Vec::with_capacity(self.elements.len() + other.elements.len());
        let (mut i, mut j) = (0, 0);
        while i < self.elements.len() && j < other.elements.len() {
            match self.elements[i].cmp(&other.elements[j]) {
                Ordering::Less => {
                    merged.push(self.elements[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    merged.push(other.elements[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    merged.push(self.elements[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&self.elements[i..]);
        merged.extend_from_slice(&other.elements[j..]);
        self.elements = merged;
        true
    }

    pub fn is_subset(&self, other: &ObjectSet) -> bool {
        if self.elements.len() > other.elements.len() {
            return false;
        }
        let mut j = 0;
        for id in &self.elements {
            while j < other.elements.len() && other.elements[j] < *id {
                j += 1;
            }
            if j == other.elements.len() || other.elements[j] != *id {
                return false;
            }
            j += 1;
        }
        true
    }

    /// Objects of `self` that are not in `seen`
    pub fn difference(&self, seen: &ObjectSet) -> Vec<ObjectId> {
        self.elements
            .iter()
            .copied()
            .filter(|id| !seen.contains(*id))
            .collect()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.elements.iter().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[ObjectId] {
        &self.elements
    }
}

impl FromIterator<ObjectId> for ObjectSet {
    fn from_iter<I: IntoIterator<Item = ObjectId>>(iter: I) -> Self {
        let mut elements: Vec<ObjectId> = iter.into_iter().collect();
        elements.sort_unstable();
        elements.dedup();
        Self { elements }
    }
}

impl<'a> IntoIterator for &'a ObjectSet {
    type Item = ObjectId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, ObjectId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u32]) -> ObjectSet {
        ids.iter().map(|&i| ObjectId(i)).collect()
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut s = ObjectSet::new();
        assert!(s.insert(ObjectId(5)));
        assert!(s.insert(ObjectId(1)));
        assert!(!s.insert(ObjectId(5)));
        assert_eq!(s.as_slice(), &[ObjectId(1), ObjectId(5)]);
    }

    #[test]
    fn test_union_reports_growth() {
        let mut a = set(&[1, 3, 5]);
        assert!(!a.union_with(&set(&[3])));
        assert!(!a.union_with(&ObjectSet::new()));
        assert!(a.union_with(&set(&[2, 3, 9])));
        assert_eq!(a, set(&[1, 2, 3, 5, 9]));
    }

    #[test]
    fn test_subset_and_difference() {
        assert!(set(&[2, 4]).is_subset(&set(&[1, 2, 3, 4])));
        assert!(!set(&[2, 5]).is_subset(&set(&[1, 2, 3, 4])));
        assert_eq!(
            set(&[1, 2, 3]).difference(&set(&[2])),
            vec![ObjectId(1), ObjectId(3)]
        );
    }
}
