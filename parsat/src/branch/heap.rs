//! Max-heap over variable activities.
use ordered_float::OrderedFloat;

use crate::lit::Var;

/// Activity values as used by the heap.
pub type Activities = [OrderedFloat<f64>];

/// A binary max-heap of variables ordered by an external activity array.
///
/// The activities are not stored in the heap itself, every operation that can change the heap
/// order takes the activity slice as an argument. This allows several heaps ordered by different
/// activities to coexist, as the mixed branching heuristic requires.
#[derive(Default)]
pub struct ActivityHeap {
    heap: Vec<Var>,
    position: Vec<Option<usize>>,
}

impl ActivityHeap {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        debug_assert!(!self.heap.iter().any(|&v| v.index() >= count));
        self.position.resize(count, None);
    }

    /// Whether the heap contains no variables.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether a variable is present in the heap.
    pub fn contains(&self, var: Var) -> bool {
        self.position[var.index()].is_some()
    }

    /// The variable with the highest activity.
    pub fn peek(&self) -> Option<Var> {
        self.heap.first().cloned()
    }

    /// Insert a variable into the heap if not already present.
    pub fn insert(&mut self, var: Var, activities: &Activities) {
        if self.position[var.index()].is_none() {
            let position = self.heap.len();
            self.position[var.index()] = Some(position);
            self.heap.push(var);
            self.sift_up(position, activities);
        }
    }

    /// Remove and return the variable with the highest activity.
    pub fn pop(&mut self, activities: &Activities) -> Option<Var> {
        if self.heap.is_empty() {
            None
        } else {
            let var = self.heap.swap_remove(0);
            if !self.heap.is_empty() {
                let top_var = self.heap[0];
                self.position[top_var.index()] = Some(0);
                self.sift_down(0, activities);
            }
            self.position[var.index()] = None;
            Some(var)
        }
    }

    /// Restore the heap property for a variable whose activity changed.
    pub fn update(&mut self, var: Var, activities: &Activities) {
        if let Some(pos) = self.position[var.index()] {
            self.sift_up(pos, activities);
            let pos = self.position[var.index()].unwrap();
            self.sift_down(pos, activities);
        }
    }

    /// Rebuild the heap from the given variables.
    pub fn rebuild(&mut self, vars: impl Iterator<Item = Var>, activities: &Activities) {
        for position in self.position.iter_mut() {
            *position = None;
        }
        self.heap.clear();
        for var in vars {
            self.insert(var, activities);
        }
    }

    /// Move a variable closer to the root until the heap property is satisfied.
    fn sift_up(&mut self, mut pos: usize, activities: &Activities) {
        let var = self.heap[pos];
        loop {
            if pos == 0 {
                return;
            }
            let parent_pos = (pos - 1) / 2;
            let parent_var = self.heap[parent_pos];
            if activities[parent_var.index()] >= activities[var.index()] {
                return;
            }
            self.position[var.index()] = Some(parent_pos);
            self.heap[parent_pos] = var;
            self.position[parent_var.index()] = Some(pos);
            self.heap[pos] = parent_var;
            pos = parent_pos;
        }
    }

    /// Move a variable away from the root until the heap property is satisfied.
    fn sift_down(&mut self, mut pos: usize, activities: &Activities) {
        let var = self.heap[pos];
        loop {
            let mut largest_pos = pos;
            let mut largest_var = var;

            let left_pos = pos * 2 + 1;
            if left_pos < self.heap.len() {
                let left_var = self.heap[left_pos];

                if activities[largest_var.index()] < activities[left_var.index()] {
                    largest_pos = left_pos;
                    largest_var = left_var;
                }
            }

            let right_pos = pos * 2 + 2;
            if right_pos < self.heap.len() {
                let right_var = self.heap[right_pos];

                if activities[largest_var.index()] < activities[right_var.index()] {
                    largest_pos = right_pos;
                    largest_var = right_var;
                }
            }

            if largest_pos == pos {
                return;
            }

            self.position[var.index()] = Some(largest_pos);
            self.heap[largest_pos] = var;
            self.position[largest_var.index()] = Some(pos);
            self.heap[pos] = largest_var;
            pos = largest_pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activities(values: &[f64]) -> Vec<OrderedFloat<f64>> {
        values.iter().map(|&v| OrderedFloat(v)).collect()
    }

    #[test]
    fn heap_sorts() {
        let act = activities(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let mut heap = ActivityHeap::default();
        heap.set_var_count(8);

        for i in 0..8 {
            heap.insert(Var::from_index((i * 5) % 8), &act);
        }

        for i in (0..8).rev() {
            assert_eq!(heap.pop(&act), Some(Var::from_index(i)));
        }
        assert_eq!(heap.pop(&act), None);
    }

    #[test]
    fn update_after_activity_change() {
        let mut act = activities(&[0.0, 1.0, 2.0, 3.0]);
        let mut heap = ActivityHeap::default();
        heap.set_var_count(4);

        for i in 0..4 {
            heap.insert(Var::from_index(i), &act);
        }

        act[0] = OrderedFloat(10.0);
        heap.update(Var::from_index(0), &act);
        assert_eq!(heap.peek(), Some(Var::from_index(0)));

        act[0] = OrderedFloat(0.5);
        heap.update(Var::from_index(0), &act);
        assert_eq!(heap.pop(&act), Some(Var::from_index(3)));
        assert_eq!(heap.pop(&act), Some(Var::from_index(2)));
        assert_eq!(heap.pop(&act), Some(Var::from_index(1)));
        assert_eq!(heap.pop(&act), Some(Var::from_index(0)));
    }
}
