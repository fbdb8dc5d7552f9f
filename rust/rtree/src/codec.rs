// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Portable serialization of a whole tree.
//!
//! Layout: dims (u8), max children (u16), min children (u16), reinsert
//! percent (u8), item count (u32), then nodes in pre-order. Each node is its
//! level (u32) and branch count (u16) followed by the branches: `2 * dims`
//! f64 box coordinates (mins then maxes) and either the child node inline or
//! an item id (i32) at leaf level.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::port::{get_u8, ByteOrder};
use crate::rect::{Dims, Rect};
use crate::tree::{Branch, Child, Node, NodeIdx, RTree, RTreeParams};

impl RTree {
    /// Appends the encoded tree to `buf`.
    pub fn write_to(&self, buf: &mut impl BufMut, order: ByteOrder) {
        buf.put_u8(self.dims.count() as u8);
        order.put_u16(buf, self.params.max_children as u16);
        order.put_u16(buf, self.params.min_children as u16);
        buf.put_u8(self.params.reinsert_percent);
        order.put_u32(buf, self.len as u32);
        self.write_node(self.root, buf, order);
    }

    fn write_node(&self, node: NodeIdx, buf: &mut impl BufMut, order: ByteOrder) {
        let n = &self.nodes[node.get()];
        order.put_u32(buf, n.level);
        order.put_u16(buf, n.branches.len() as u16);
        let axes = self.dims.count();
        for branch in &n.branches {
            for axis in 0..axes {
                order.put_f64(buf, branch.rect.min[axis]);
            }
            for axis in 0..axes {
                order.put_f64(buf, branch.rect.max[axis]);
            }
            match branch.child {
                Child::Node(child) => self.write_node(child, buf, order),
                Child::Item(id) => order.put_i32(buf, id),
            }
        }
    }

    /// Decodes a tree written by [`RTree::write_to`] and validates it.
    pub fn read_from(buf: &mut impl Buf, order: ByteOrder) -> Result<RTree> {
        let dims_byte = get_u8(buf)?;
        let dims = Dims::from_count(dims_byte).ok_or(Error::Dimensionality(dims_byte))?;
        let params = RTreeParams {
            max_children: usize::from(order.get_u16(buf)?),
            min_children: usize::from(order.get_u16(buf)?),
            reinsert_percent: get_u8(buf)?,
        };
        params.validate()?;
        let len = order.get_u32(buf)? as usize;

        let mut tree = RTree::with_params(dims, params);
        tree.nodes.clear();
        tree.len = len;
        tree.root = tree.read_node(buf, order, None)?;
        tree.check()?;
        Ok(tree)
    }

    fn read_node(
        &mut self,
        buf: &mut impl Buf,
        order: ByteOrder,
        parent_level: Option<u32>,
    ) -> Result<NodeIdx> {
        let level = order.get_u32(buf)?;
        if let Some(parent) = parent_level {
            if parent == 0 || level + 1 != parent {
                return Err(Error::Inconsistent(format!(
                    "node at level {level} under level {parent}"
                )));
            }
        }
        let count = usize::from(order.get_u16(buf)?);
        if count > self.params.max_children {
            return Err(Error::Inconsistent(format!("node with {count} branches")));
        }

        let axes = self.dims.count();
        let mut branches = Vec::with_capacity(count);
        for _ in 0..count {
            let mut rect = Rect::new_2d(0.0, 0.0, 0.0, 0.0);
            for axis in 0..axes {
                rect.min[axis] = order.get_f64(buf)?;
            }
            for axis in 0..axes {
                rect.max[axis] = order.get_f64(buf)?;
            }
            let child = if level == 0 {
                Child::Item(order.get_i32(buf)?)
            } else {
                Child::Node(self.read_node(buf, order, Some(level))?)
            };
            branches.push(Branch { rect, child });
        }
        Ok(self.alloc(Node { level, branches }))
    }
}
