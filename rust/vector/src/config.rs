// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Map configuration loaded from environment variables.

use topovec_rtree::{ByteOrder, RTreeParams};

/// Settings carried by every map handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConfig {
    /// Byte order of newly written sections.
    pub byte_order: ByteOrder,
    /// R-tree fanout; minimum fill is 40 % of it.
    pub rtree_max_children: usize,
    /// Share of an overflowing leaf reinserted before splitting, 0 disables.
    pub rtree_reinsert_percent: u8,
    /// Take the advisory lock for read-write opens.
    pub locking: bool,
    /// Maintain the category index on edits.
    pub update_cidx: bool,
    /// Progress event granularity in percent, 0 disables progress events.
    pub progress_step: u8,
}

impl MapConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            byte_order: std::env::var("TOPOVEC_BYTE_ORDER")
                .ok()
                .and_then(|v| parse_byte_order(&v))
                .unwrap_or(defaults.byte_order),
            rtree_max_children: std::env::var("TOPOVEC_RTREE_MAX_CHILDREN")
                .unwrap_or_else(|_| "16".into())
                .parse()
                .unwrap_or(16),
            rtree_reinsert_percent: std::env::var("TOPOVEC_RTREE_REINSERT_PERCENT")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .unwrap_or(30),
            locking: std::env::var("TOPOVEC_LOCKING")
                .ok()
                .and_then(|v| parse_switch(&v))
                .unwrap_or(defaults.locking),
            update_cidx: std::env::var("TOPOVEC_UPDATE_CIDX")
                .ok()
                .and_then(|v| parse_switch(&v))
                .unwrap_or(defaults.update_cidx),
            progress_step: std::env::var("TOPOVEC_PROGRESS_STEP")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),
        }
    }

    /// R-tree parameters for new stores.
    pub fn rtree_params(&self) -> RTreeParams {
        RTreeParams::with_max_children(self.rtree_max_children)
            .with_reinsert_percent(self.rtree_reinsert_percent)
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::native(),
            rtree_max_children: 16,
            rtree_reinsert_percent: 30,
            locking: true,
            update_cidx: true,
            progress_step: 10,
        }
    }
}

fn parse_byte_order(value: &str) -> Option<ByteOrder> {
    match value.trim().to_ascii_lowercase().as_str() {
        "native" => Some(ByteOrder::native()),
        "little" | "le" => Some(ByteOrder::Little),
        "big" | "be" => Some(ByteOrder::Big),
        _ => None,
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
