// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! R-tree storage, insertion, deletion and search.
//!
//! Nodes live in an arena (`Vec<Node>`) and reference each other by index;
//! freed slots are recycled through a free list. Level 0 is the leaf level,
//! so levels of existing entries stay valid when the root grows.

use std::ops::ControlFlow;

use crate::error::{Error, Result};
use crate::rect::{Dims, Rect};
use crate::split::quadratic_partition;

/// Identifier stored in leaf entries.
pub type ItemId = i32;

/// Node fill bounds and forced-reinsertion share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RTreeParams {
    pub max_children: usize,
    pub min_children: usize,
    /// Percentage of an overflowing node's entries evicted for reinsertion
    /// instead of splitting. Zero disables forced reinsertion.
    pub reinsert_percent: u8,
}

impl RTreeParams {
    /// Fanout `max_children` with a 40 % minimum fill.
    pub fn with_max_children(max_children: usize) -> Self {
        let max_children = max_children.max(4);
        Self {
            max_children,
            min_children: (max_children * 2 / 5).max(2),
            reinsert_percent: 30,
        }
    }

    pub fn with_reinsert_percent(mut self, percent: u8) -> Self {
        self.reinsert_percent = percent.min(50);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_children < 4
            || self.min_children < 1
            || self.min_children * 2 > self.max_children + 1
        {
            return Err(Error::FillParameters {
                min: self.min_children,
                max: self.max_children,
            });
        }
        Ok(())
    }

    fn reinsert_count(&self) -> usize {
        let count = self.max_children * usize::from(self.reinsert_percent) / 100;
        // Never evict so much that the node drops below its minimum fill.
        count.min(self.max_children + 1 - self.min_children)
    }
}

impl Default for RTreeParams {
    fn default() -> Self {
        Self::with_max_children(16)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeIdx(usize);

impl NodeIdx {
    pub(crate) const fn new(i: usize) -> Self {
        Self(i)
    }

    pub(crate) const fn get(self) -> usize {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Child {
    Node(NodeIdx),
    Item(ItemId),
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct Branch {
    pub(crate) rect: Rect,
    pub(crate) child: Child,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Node {
    pub(crate) level: u32,
    pub(crate) branches: Vec<Branch>,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.level == 0
    }
}

/// Outcome of inserting into a subtree.
enum Insert {
    Done,
    Split(NodeIdx),
}

/// R-tree over `(Rect, ItemId)` pairs.
#[derive(Clone)]
pub struct RTree {
    pub(crate) dims: Dims,
    pub(crate) params: RTreeParams,
    pub(crate) nodes: Vec<Node>,
    pub(crate) free: Vec<usize>,
    pub(crate) root: NodeIdx,
    pub(crate) len: usize,
}

impl RTree {
    /// Creates an empty tree with default fill parameters.
    pub fn new(dims: Dims) -> Self {
        Self::with_params(dims, RTreeParams::default())
    }

    /// Creates an empty tree. Invalid fill bounds fall back to the defaults.
    pub fn with_params(dims: Dims, params: RTreeParams) -> Self {
        let params = if params.validate().is_ok() {
            params
        } else {
            RTreeParams::default()
        };
        Self {
            dims,
            params,
            nodes: vec![Node::default()],
            free: Vec::new(),
            root: NodeIdx::new(0),
            len: 0,
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn params(&self) -> RTreeParams {
        self.params
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of levels, counting the leaf level.
    pub fn height(&self) -> usize {
        self.nodes[self.root.get()].level as usize + 1
    }

    /// Drops every entry, keeping dimensionality and parameters.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::default());
        self.free.clear();
        self.root = NodeIdx::new(0);
        self.len = 0;
    }

    /// Minimal box covering every item, or the empty box.
    pub fn extent(&self) -> Rect {
        self.cover(self.root)
    }

    // --- Insertion ---

    /// Inserts `id` under `rect`.
    pub fn insert(&mut self, rect: Rect, id: ItemId) {
        let mut reinsert_allowed = vec![true; self.height()];
        let mut pending = vec![(
            Branch {
                rect,
                child: Child::Item(id),
            },
            0_u32,
        )];
        while let Some((branch, level)) = pending.pop() {
            self.insert_at_level(branch, level, &mut reinsert_allowed, &mut pending);
        }
        self.len += 1;
    }

    /// Places `branch` into a node at `level`, growing the root on split.
    fn insert_at_level(
        &mut self,
        branch: Branch,
        level: u32,
        reinsert_allowed: &mut Vec<bool>,
        pending: &mut Vec<(Branch, u32)>,
    ) {
        let root = self.root;
        if let Insert::Split(sibling) =
            self.insert_into(root, branch, level, reinsert_allowed, pending)
        {
            let level = self.nodes[root.get()].level + 1;
            let branches = vec![
                Branch {
                    rect: self.cover(root),
                    child: Child::Node(root),
                },
                Branch {
                    rect: self.cover(sibling),
                    child: Child::Node(sibling),
                },
            ];
            self.root = self.alloc(Node { level, branches });
            if reinsert_allowed.len() <= level as usize {
                reinsert_allowed.resize(level as usize + 1, true);
            }
        }
    }

    fn insert_into(
        &mut self,
        node: NodeIdx,
        branch: Branch,
        level: u32,
        reinsert_allowed: &mut Vec<bool>,
        pending: &mut Vec<(Branch, u32)>,
    ) -> Insert {
        if self.nodes[node.get()].level <= level {
            return self.add_branch(node, branch, reinsert_allowed, pending);
        }

        let Some((slot, child)) = self.choose_branch(node, &branch.rect) else {
            return self.add_branch(node, branch, reinsert_allowed, pending);
        };
        let outcome = self.insert_into(child, branch, level, reinsert_allowed, pending);
        // Recompute rather than extend: the child may have evicted entries.
        let cover = self.cover(child);
        self.nodes[node.get()].branches[slot].rect = cover;

        match outcome {
            Insert::Split(sibling) => {
                let rect = self.cover(sibling);
                let branch = Branch {
                    rect,
                    child: Child::Node(sibling),
                };
                self.add_branch(node, branch, reinsert_allowed, pending)
            }
            Insert::Done => Insert::Done,
        }
    }

    /// Picks the child needing the least enlargement; ties go to the smaller
    /// resulting box, then to the child with fewer entries.
    fn choose_branch(&self, node: NodeIdx, rect: &Rect) -> Option<(usize, NodeIdx)> {
        let mut best: Option<(usize, NodeIdx, f64, f64, usize)> = None;
        for (slot, branch) in self.nodes[node.get()].branches.iter().enumerate() {
            let Child::Node(child) = branch.child else {
                continue;
            };
            let grown = branch.rect.union(rect).measure(self.dims);
            let enlargement = grown - branch.rect.measure(self.dims);
            let fill = self.nodes[child.get()].branches.len();
            let better = match best {
                None => true,
                Some((_, _, best_enl, best_size, best_fill)) => {
                    enlargement < best_enl
                        || (enlargement == best_enl
                            && (grown < best_size || (grown == best_size && fill < best_fill)))
                }
            };
            if better {
                best = Some((slot, child, enlargement, grown, fill));
            }
        }
        best.map(|(slot, child, ..)| (slot, child))
    }

    /// Appends a branch and resolves overflow by forced reinsertion or split.
    fn add_branch(
        &mut self,
        node: NodeIdx,
        branch: Branch,
        reinsert_allowed: &mut [bool],
        pending: &mut Vec<(Branch, u32)>,
    ) -> Insert {
        let max_children = self.params.max_children;
        let n = &mut self.nodes[node.get()];
        n.branches.push(branch);
        if n.branches.len() <= max_children {
            return Insert::Done;
        }

        let level = n.level as usize;
        let reinsert_count = self.params.reinsert_count();
        if node != self.root
            && reinsert_count > 0
            && reinsert_allowed.get(level).copied().unwrap_or(false)
        {
            reinsert_allowed[level] = false;
            self.evict_farthest(node, reinsert_count, pending);
            return Insert::Done;
        }

        Insert::Split(self.split(node))
    }

    /// Removes the `count` entries whose centers lie farthest from the node
    /// center and queues them for reinsertion at the node's level.
    fn evict_farthest(&mut self, node: NodeIdx, count: usize, pending: &mut Vec<(Branch, u32)>) {
        let cover = self.cover(node);
        let axes = self.dims.count();
        let n = &mut self.nodes[node.get()];
        let distance = |b: &Branch| -> f64 {
            (0..axes)
                .map(|axis| (b.rect.center(axis) - cover.center(axis)).powi(2))
                .sum()
        };
        n.branches.sort_by(|a, b| {
            distance(a)
                .partial_cmp(&distance(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let keep = n.branches.len() - count;
        let level = n.level;
        // Closest evicted entries are reinserted first.
        for branch in n.branches.drain(keep..).rev() {
            pending.push((branch, level));
        }
    }

    fn split(&mut self, node: NodeIdx) -> NodeIdx {
        let branches = std::mem::take(&mut self.nodes[node.get()].branches);
        let (left, right) = quadratic_partition(branches, self.params.min_children, self.dims);
        let level = self.nodes[node.get()].level;
        self.nodes[node.get()].branches = left;
        self.alloc(Node {
            level,
            branches: right,
        })
    }

    // --- Deletion ---

    /// Removes the entry with exactly this box and id. Returns `false` if no
    /// such entry exists.
    pub fn remove(&mut self, rect: &Rect, id: ItemId) -> bool {
        let mut orphans: Vec<(Branch, u32)> = Vec::new();
        let root = self.root;
        if !self.remove_from(root, rect, id, &mut orphans) {
            return false;
        }
        self.len -= 1;

        if !orphans.is_empty() {
            let root_node = &self.nodes[self.root.get()];
            if !root_node.is_leaf() && root_node.branches.is_empty() {
                let top = orphans.iter().map(|(_, level)| *level).max().unwrap_or(0);
                self.nodes[self.root.get()].level = top;
            }
            // Higher subtrees first, so lower entries find a path down.
            orphans.sort_by_key(|(_, level)| *level);
            let mut no_reinsert = vec![false; self.height()];
            while let Some((branch, level)) = orphans.pop() {
                let mut pending = vec![(branch, level)];
                while let Some((branch, level)) = pending.pop() {
                    self.insert_at_level(branch, level, &mut no_reinsert, &mut pending);
                }
            }
        }

        self.collapse_root();
        true
    }

    fn remove_from(
        &mut self,
        node: NodeIdx,
        rect: &Rect,
        id: ItemId,
        orphans: &mut Vec<(Branch, u32)>,
    ) -> bool {
        let dims = self.dims;
        if self.nodes[node.get()].is_leaf() {
            let branches = &mut self.nodes[node.get()].branches;
            let found = branches
                .iter()
                .position(|b| b.child == Child::Item(id) && b.rect.same_as(rect, dims));
            return match found {
                Some(pos) => {
                    branches.remove(pos);
                    true
                }
                None => false,
            };
        }

        let count = self.nodes[node.get()].branches.len();
        for slot in 0..count {
            let branch = self.nodes[node.get()].branches[slot];
            let Child::Node(child) = branch.child else {
                continue;
            };
            if !branch.rect.contains(rect, dims) {
                continue;
            }
            if !self.remove_from(child, rect, id, orphans) {
                continue;
            }

            if self.nodes[child.get()].branches.len() >= self.params.min_children {
                let cover = self.cover(child);
                self.nodes[node.get()].branches[slot].rect = cover;
            } else {
                let Node { level, branches } = std::mem::take(&mut self.nodes[child.get()]);
                orphans.extend(branches.into_iter().map(|b| (b, level)));
                self.release(child);
                self.nodes[node.get()].branches.remove(slot);
            }
            return true;
        }
        false
    }

    /// Replaces a non-leaf root that has a single child by that child.
    fn collapse_root(&mut self) {
        loop {
            let root = &self.nodes[self.root.get()];
            if root.is_leaf() {
                return;
            }
            match root.branches.as_slice() {
                [only] => {
                    let Child::Node(child) = only.child else {
                        return;
                    };
                    let old = self.root;
                    self.root = child;
                    self.release(old);
                }
                [] => {
                    self.nodes[self.root.get()].level = 0;
                    return;
                }
                _ => return,
            }
        }
    }

    // --- Search ---

    /// Calls `visit` for every item whose box overlaps `rect`. The visitor
    /// stops the traversal by returning [`ControlFlow::Break`]. Returns the
    /// number of items visited.
    pub fn search<F>(&self, rect: &Rect, mut visit: F) -> usize
    where
        F: FnMut(ItemId, &Rect) -> ControlFlow<()>,
    {
        let mut hits = 0;
        let mut stack: Vec<(NodeIdx, usize)> = Vec::with_capacity(self.height() + 1);
        stack.push((self.root, 0));

        while let Some((node, next)) = stack.pop() {
            let branches = &self.nodes[node.get()].branches;
            let Some(branch) = branches.get(next) else {
                continue;
            };
            stack.push((node, next + 1));
            if !branch.rect.overlaps(rect, self.dims) {
                continue;
            }
            match branch.child {
                Child::Node(child) => stack.push((child, 0)),
                Child::Item(id) => {
                    hits += 1;
                    if visit(id, &branch.rect).is_break() {
                        break;
                    }
                }
            }
        }
        hits
    }

    /// Collects the ids of every item overlapping `rect`.
    pub fn search_ids(&self, rect: &Rect) -> Vec<ItemId> {
        let mut ids = Vec::new();
        self.search(rect, |id, _| {
            ids.push(id);
            ControlFlow::Continue(())
        });
        ids
    }

    /// Every `(rect, id)` pair in the tree, in storage order.
    pub fn items(&self) -> Vec<(Rect, ItemId)> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            for branch in &self.nodes[node.get()].branches {
                match branch.child {
                    Child::Node(child) => stack.push(child),
                    Child::Item(id) => out.push((branch.rect, id)),
                }
            }
        }
        out
    }

    // --- Validation ---

    /// Verifies the structural invariants: every non-leaf box is the minimal
    /// cover of its child, levels decrease by one, non-root nodes respect the
    /// fill bounds and the item count matches.
    pub fn check(&self) -> Result<()> {
        let mut items = 0;
        let mut stack = vec![(self.root, true)];
        while let Some((node, is_root)) = stack.pop() {
            let n = &self.nodes[node.get()];
            let fill = n.branches.len();
            if fill > self.params.max_children {
                return Err(Error::Inconsistent(format!("node {} overfull ({fill})", node.get())));
            }
            if !is_root && fill < self.params.min_children {
                return Err(Error::Inconsistent(format!("node {} underfull ({fill})", node.get())));
            }
            for branch in &n.branches {
                match branch.child {
                    Child::Item(_) if n.is_leaf() => items += 1,
                    Child::Node(child) if !n.is_leaf() => {
                        let child_node = &self.nodes[child.get()];
                        if child_node.level + 1 != n.level {
                            return Err(Error::Inconsistent(format!(
                                "child {} at level {} under level {}",
                                child.get(),
                                child_node.level,
                                n.level
                            )));
                        }
                        if !branch.rect.same_as(&self.cover(child), self.dims) {
                            return Err(Error::Inconsistent(format!(
                                "box of child {} is not its minimal cover",
                                child.get()
                            )));
                        }
                        stack.push((child, false));
                    }
                    _ => {
                        return Err(Error::Inconsistent(format!(
                            "entry kind does not match level {} of node {}",
                            n.level,
                            node.get()
                        )))
                    }
                }
            }
        }
        if items != self.len {
            return Err(Error::Inconsistent(format!(
                "{items} items reachable, {} recorded",
                self.len
            )));
        }
        Ok(())
    }

    // --- Arena helpers ---

    pub(crate) fn cover(&self, node: NodeIdx) -> Rect {
        self.nodes[node.get()]
            .branches
            .iter()
            .fold(Rect::empty(), |acc, b| acc.union(&b.rect))
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeIdx {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                NodeIdx::new(slot)
            }
            None => {
                self.nodes.push(node);
                NodeIdx::new(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, node: NodeIdx) {
        self.nodes[node.get()] = Node::default();
        self.free.push(node.get());
    }
}

impl std::fmt::Debug for RTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTree")
            .field("dims", &self.dims)
            .field("max_children", &self.params.max_children)
            .field("min_children", &self.params.min_children)
            .field("arena_nodes", &(self.nodes.len() - self.free.len()))
            .field("height", &self.height())
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
