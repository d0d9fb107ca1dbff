//! Lazy sequence abstraction used throughout the block store
//!
//! A [`Cursor`] is a finite, non-restartable sequence in the storage-engine
//! style: `advance` moves to the next element, `at` borrows the current one,
//! and `err` exposes a terminal error slot. Once a cursor reports an error it
//! yields no more values. Cursors that support repositioning expose their own
//! `seek` on the concrete type.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::{Fingerprint, MistError};

/// A lazy, finite sequence of items
pub trait Cursor {
    type Item;

    /// Move to the next element. Returns false when exhausted or errored.
    fn advance(&mut self) -> bool;

    /// Borrow the current element. Only valid after `advance` returned true.
    fn at(&self) -> &Self::Item;

    /// Terminal error slot. Non-empty means the cursor is dead.
    fn err(&self) -> Option<&MistError> {
        None
    }

    /// Move the terminal error out, leaving the cursor dead
    fn take_err(&mut self) -> Option<MistError> {
        None
    }
}

/// Cursor over an in-memory ordered slice
pub struct SliceCursor<'a, T> {
    items: &'a [T],
    idx: usize,
}

impl<'a, T> SliceCursor<'a, T> {
    pub fn new(items: &'a [T]) -> Self {
        Self { items, idx: 0 }
    }
}

impl<'a, T> Cursor for SliceCursor<'a, T> {
    type Item = T;

    fn advance(&mut self) -> bool {
        if self.idx < self.items.len() {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn at(&self) -> &T {
        &self.items[self.idx - 1]
    }
}

/// Wraps any cursor with single-element lookahead
pub struct PeekCursor<C: Cursor> {
    inner: C,
    current: Option<C::Item>,
    // Some(Some(_)): lookahead buffered; Some(None): inner known exhausted
    peeked: Option<Option<C::Item>>,
}

impl<C: Cursor> PeekCursor<C>
where
    C::Item: Clone,
{
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            current: None,
            peeked: None,
        }
    }

    /// Look at the next element without consuming it
    pub fn peek(&mut self) -> Option<&C::Item> {
        if self.peeked.is_none() {
            self.peeked = Some(if self.inner.advance() {
                Some(self.inner.at().clone())
            } else {
                None
            });
        }
        self.peeked.as_ref().unwrap().as_ref()
    }

    /// Take ownership of the current element. `at` is invalid until the
    /// next `advance`.
    pub fn take_at(&mut self) -> Option<C::Item> {
        self.current.take()
    }
}

impl<C: Cursor> Cursor for PeekCursor<C>
where
    C::Item: Clone,
{
    type Item = C::Item;

    fn advance(&mut self) -> bool {
        match self.peeked.take() {
            Some(Some(item)) => {
                self.current = Some(item);
                true
            }
            Some(None) => {
                self.current = None;
                false
            }
            None => {
                if self.inner.advance() {
                    self.current = Some(self.inner.at().clone());
                    true
                } else {
                    self.current = None;
                    false
                }
            }
        }
    }

    fn at(&self) -> &C::Item {
        self.current.as_ref().unwrap()
    }

    fn err(&self) -> Option<&MistError> {
        self.inner.err()
    }

    fn take_err(&mut self) -> Option<MistError> {
        self.inner.take_err()
    }
}

/// Projects each element of a cursor through a pure function
pub struct MapCursor<C: Cursor, F, U> {
    inner: C,
    f: F,
    current: Option<U>,
}

impl<C: Cursor, F, U> MapCursor<C, F, U>
where
    F: Fn(&C::Item) -> U,
{
    pub fn new(inner: C, f: F) -> Self {
        Self {
            inner,
            f,
            current: None,
        }
    }
}

impl<C: Cursor, F, U> Cursor for MapCursor<C, F, U>
where
    F: Fn(&C::Item) -> U,
{
    type Item = U;

    fn advance(&mut self) -> bool {
        if self.inner.advance() {
            self.current = Some((self.f)(self.inner.at()));
            true
        } else {
            self.current = None;
            false
        }
    }

    fn at(&self) -> &U {
        self.current.as_ref().unwrap()
    }

    fn err(&self) -> Option<&MistError> {
        self.inner.err()
    }

    fn take_err(&mut self) -> Option<MistError> {
        self.inner.take_err()
    }
}

/// Collapses adjacent equal elements by folding them into one output.
///
/// `project` converts the first element of a run into the accumulator,
/// `eq` decides whether the next input element belongs to the run, and
/// `fold` merges it in. Input must be ordered so duplicates are adjacent.
pub struct DedupCursor<C, B, E, P, F>
where
    C: Cursor,
    C::Item: Clone,
{
    inner: PeekCursor<C>,
    eq: E,
    project: P,
    fold: F,
    current: Option<B>,
}

impl<C, B, E, P, F> DedupCursor<C, B, E, P, F>
where
    C: Cursor,
    C::Item: Clone,
    E: Fn(&C::Item, &B) -> bool,
    P: Fn(C::Item) -> B,
    F: Fn(C::Item, B) -> B,
{
    pub fn new(inner: C, eq: E, project: P, fold: F) -> Self {
        Self {
            inner: PeekCursor::new(inner),
            eq,
            project,
            fold,
            current: None,
        }
    }
}

impl<C, B, E, P, F> Cursor for DedupCursor<C, B, E, P, F>
where
    C: Cursor,
    C::Item: Clone,
    E: Fn(&C::Item, &B) -> bool,
    P: Fn(C::Item) -> B,
    F: Fn(C::Item, B) -> B,
{
    type Item = B;

    fn advance(&mut self) -> bool {
        if !self.inner.advance() {
            self.current = None;
            return false;
        }
        let first = self.inner.take_at().unwrap();
        let mut acc = (self.project)(first);

        while let Some(next) = self.inner.peek() {
            if !(self.eq)(next, &acc) {
                break;
            }
            self.inner.advance();
            let item = self.inner.take_at().unwrap();
            acc = (self.fold)(item, acc);
        }

        self.current = Some(acc);
        true
    }

    fn at(&self) -> &B {
        self.current.as_ref().unwrap()
    }

    fn err(&self) -> Option<&MistError> {
        self.inner.err()
    }

    fn take_err(&mut self) -> Option<MistError> {
        self.inner.take_err()
    }
}

/// K-way merge of cursors each ordered ascending by the key function.
///
/// The heap breaks key ties by input index, so ordering is stable across
/// runs. An error in any input poisons the merge.
pub struct HeapCursor<C, K>
where
    C: Cursor,
    C::Item: Clone,
{
    children: Vec<PeekCursor<C>>,
    key: K,
    heap: BinaryHeap<Reverse<(Fingerprint, usize)>>,
    current: Option<C::Item>,
    failed: Option<usize>,
    primed: bool,
}

impl<C, K> HeapCursor<C, K>
where
    C: Cursor,
    C::Item: Clone,
    K: Fn(&C::Item) -> Fingerprint,
{
    pub fn new(inputs: Vec<C>, key: K) -> Self {
        Self {
            children: inputs.into_iter().map(PeekCursor::new).collect(),
            key,
            heap: BinaryHeap::new(),
            current: None,
            failed: None,
            primed: false,
        }
    }

    fn push_child(&mut self, idx: usize) {
        let key = {
            let key_fn = &self.key;
            self.children[idx].peek().map(|item| key_fn(item))
        };
        match key {
            Some(k) => self.heap.push(Reverse((k, idx))),
            None => {
                if self.children[idx].err().is_some() {
                    self.failed = Some(idx);
                }
            }
        }
    }

    fn prime(&mut self) {
        for idx in 0..self.children.len() {
            self.push_child(idx);
        }
        self.primed = true;
    }
}

impl<C, K> Cursor for HeapCursor<C, K>
where
    C: Cursor,
    C::Item: Clone,
    K: Fn(&C::Item) -> Fingerprint,
{
    type Item = C::Item;

    fn advance(&mut self) -> bool {
        if self.failed.is_some() {
            self.current = None;
            return false;
        }
        if !self.primed {
            self.prime();
            if self.failed.is_some() {
                self.current = None;
                return false;
            }
        }

        let Some(Reverse((_, idx))) = self.heap.pop() else {
            self.current = None;
            return false;
        };

        self.children[idx].advance();
        self.current = self.children[idx].take_at();
        // re-peek may surface a child failure; the item already taken is
        // still valid and the failure stops the merge on the next advance
        self.push_child(idx);
        self.current.is_some()
    }

    fn at(&self) -> &C::Item {
        self.current.as_ref().unwrap()
    }

    fn err(&self) -> Option<&MistError> {
        self.failed.and_then(|idx| self.children[idx].err())
    }

    fn take_err(&mut self) -> Option<MistError> {
        self.failed.and_then(|idx| self.children[idx].take_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_cursor() {
        let items = vec![1, 2, 3];
        let mut cursor = SliceCursor::new(&items);

        let mut seen = Vec::new();
        while cursor.advance() {
            seen.push(*cursor.at());
        }
        assert_eq!(seen, items);
        assert!(!cursor.advance());
        assert!(cursor.err().is_none());
    }

    #[test]
    fn test_peek_cursor() {
        let items = vec![10, 20];
        let mut cursor = PeekCursor::new(SliceCursor::new(&items));

        assert_eq!(cursor.peek(), Some(&10));
        assert_eq!(cursor.peek(), Some(&10));
        assert!(cursor.advance());
        assert_eq!(cursor.at(), &10);
        assert_eq!(cursor.peek(), Some(&20));
        assert!(cursor.advance());
        assert_eq!(cursor.at(), &20);
        assert_eq!(cursor.peek(), None);
        assert!(!cursor.advance());
    }

    #[test]
    fn test_map_cursor() {
        let items = vec![1u64, 2, 3];
        let mut cursor = MapCursor::new(SliceCursor::new(&items), |v| v * 10);

        let mut seen = Vec::new();
        while cursor.advance() {
            seen.push(*cursor.at());
        }
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[test]
    fn test_dedup_cursor_folds_runs() {
        // (key, weight) pairs with adjacent duplicate keys
        let items = vec![(1u64, 1u64), (1, 2), (2, 5), (3, 1), (3, 1), (3, 1)];
        let mut cursor = DedupCursor::new(
            SliceCursor::new(&items),
            |next: &(u64, u64), acc: &(u64, u64)| next.0 == acc.0,
            |first| first,
            |item, acc| (acc.0, acc.1 + item.1),
        );

        let mut seen = Vec::new();
        while cursor.advance() {
            seen.push(*cursor.at());
        }
        assert_eq!(seen, vec![(1, 3), (2, 5), (3, 3)]);
    }

    #[test]
    fn test_heap_cursor_merges_in_order() {
        let a = vec![1u64, 4, 7];
        let b = vec![2u64, 5, 8];
        let c = vec![3u64, 6, 9];
        let inputs = vec![
            SliceCursor::new(&a),
            SliceCursor::new(&b),
            SliceCursor::new(&c),
        ];
        let mut cursor = HeapCursor::new(inputs, |v| *v);

        let mut seen = Vec::new();
        while cursor.advance() {
            seen.push(*cursor.at());
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_heap_cursor_ties_break_by_input_index() {
        // duplicate keys across inputs: input 0's copy must win each tie
        let a = vec![(1u64, "a"), (2, "a")];
        let b = vec![(1u64, "b"), (2, "b")];
        let inputs = vec![SliceCursor::new(&a), SliceCursor::new(&b)];
        let mut cursor = HeapCursor::new(inputs, |v| v.0);

        let mut seen = Vec::new();
        while cursor.advance() {
            seen.push(*cursor.at());
        }
        assert_eq!(
            seen,
            vec![(1, "a"), (1, "b"), (2, "a"), (2, "b")]
        );
    }

    #[test]
    fn test_heap_cursor_empty_inputs() {
        let empty: Vec<u64> = Vec::new();
        let inputs = vec![SliceCursor::new(&empty), SliceCursor::new(&empty)];
        let mut cursor = HeapCursor::new(inputs, |v| *v);
        assert!(!cursor.advance());
    }
}
