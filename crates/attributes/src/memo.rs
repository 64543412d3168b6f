//! A cache whose whole contents expire the instant the frame number
//! changes, the way `Document`'s `render_tree_cache` is rebuilt lazily
//! behind a `Cell<bool>` dirty flag — here the "dirty" signal is simply
//! "this is a new frame".

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;

pub struct PerFrameMemoTable<K, V> {
    cached_frame_number: Cell<u64>,
    memo: RefCell<HashMap<K, V>>,
}

impl<K, V> PerFrameMemoTable<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cached_frame_number: Cell::new(u64::MAX),
            memo: RefCell::new(HashMap::new()),
        }
    }

    fn ensure_frame(&self, frame_number: u64) {
        if self.cached_frame_number.get() != frame_number {
            self.memo.borrow_mut().clear();
            self.cached_frame_number.set(frame_number);
        }
    }

    /// Returns the memoized value for `key` within `frame_number`,
    /// computing and storing it via `compute` on first access this
    /// frame.
    pub fn get_or_insert_with(
        &self,
        frame_number: u64,
        key: K,
        compute: impl FnOnce() -> V,
    ) -> V {
        self.ensure_frame(frame_number);
        if let Some(value) = self.memo.borrow().get(&key) {
            return value.clone();
        }
        let value = compute();
        self.memo.borrow_mut().insert(key, value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.memo.borrow().len()
    }
}

impl<K, V> Default for PerFrameMemoTable<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;

    #[test]
    fn recomputes_only_once_per_frame() {
        let table: PerFrameMemoTable<u32, u32> = PerFrameMemoTable::new();
        let calls = StdCell::new(0u32);

        let first = table.get_or_insert_with(1, 7, || {
            calls.set(calls.get() + 1);
            42
        });
        let second = table.get_or_insert_with(1, 7, || {
            calls.set(calls.get() + 1);
            99
        });

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn clears_entirely_on_new_frame() {
        let table: PerFrameMemoTable<u32, u32> = PerFrameMemoTable::new();
        table.get_or_insert_with(1, 7, || 42);
        assert_eq!(table.len(), 1);

        let recomputed = table.get_or_insert_with(2, 7, || 43);
        assert_eq!(recomputed, 43);
        assert_eq!(table.len(), 1);
    }
}
