//! The execution order of a [super::Lir]'s nodes, as a doubly linked list threaded through the
//! node arena.

use super::NodeIdx;
use index_vec::IndexVec;
use vob::Vob;

#[derive(Debug)]
pub(super) struct Range {
    first: Option<NodeIdx>,
    last: Option<NodeIdx>,
    prev: IndexVec<NodeIdx, Option<NodeIdx>>,
    next: IndexVec<NodeIdx, Option<NodeIdx>>,
    /// Which nodes are currently in the execution order?
    linked: Vob,
    len: usize,
}

impl Range {
    pub(super) fn new() -> Self {
        Self {
            first: None,
            last: None,
            prev: IndexVec::new(),
            next: IndexVec::new(),
            linked: Vob::new(),
            len: 0,
        }
    }

    /// Make room for nodes up to (but excluding) `len`.
    pub(super) fn grow(&mut self, len: usize) {
        while self.prev.len() < len {
            self.prev.push(None);
            self.next.push(None);
            self.linked.push(false);
        }
    }

    pub(super) fn first(&self) -> Option<NodeIdx> {
        self.first
    }

    pub(super) fn last(&self) -> Option<NodeIdx> {
        self.last
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    pub(super) fn contains(&self, idx: NodeIdx) -> bool {
        self.linked.get(usize::from(idx)).unwrap_or(false)
    }

    fn mark_linked(&mut self, idx: NodeIdx) {
        assert!(!self.contains(idx), "{idx} is already linked");
        self.linked.set(usize::from(idx), true);
        self.len += 1;
    }

    pub(super) fn link_first(&mut self, idx: NodeIdx) {
        match self.first {
            Some(first) => self.link_before(idx, first),
            None => {
                self.mark_linked(idx);
                self.first = Some(idx);
                self.last = Some(idx);
            }
        }
    }

    pub(super) fn link_last(&mut self, idx: NodeIdx) {
        match self.last {
            Some(last) => self.link_after(idx, last),
            None => self.link_first(idx),
        }
    }

    pub(super) fn link_before(&mut self, idx: NodeIdx, before: NodeIdx) {
        self.mark_linked(idx);
        let prev = self.prev[before];
        self.prev[idx] = prev;
        self.next[idx] = Some(before);
        self.prev[before] = Some(idx);
        match prev {
            Some(p) => self.next[p] = Some(idx),
            None => self.first = Some(idx),
        }
    }

    pub(super) fn link_after(&mut self, idx: NodeIdx, after: NodeIdx) {
        self.mark_linked(idx);
        let next = self.next[after];
        self.next[idx] = next;
        self.prev[idx] = Some(after);
        self.next[after] = Some(idx);
        match next {
            Some(n) => self.prev[n] = Some(idx),
            None => self.last = Some(idx),
        }
    }

    /// # Panics
    ///
    /// If `idx` is not linked.
    pub(super) fn unlink(&mut self, idx: NodeIdx) {
        assert!(self.contains(idx), "{idx} is not linked");
        let prev = self.prev[idx].take();
        let next = self.next[idx].take();
        match prev {
            Some(p) => self.next[p] = next,
            None => self.first = next,
        }
        match next {
            Some(n) => self.prev[n] = prev,
            None => self.last = prev,
        }
        self.linked.set(usize::from(idx), false);
        self.len -= 1;
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        std::iter::successors(self.first, |x| self.next[*x])
    }

    pub(super) fn iter_rev(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        std::iter::successors(self.last, |x| self.prev[*x])
    }
}
