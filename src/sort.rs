use std::cmp::Ordering;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::tree::{NodeId, ResultTree};

/// The thirteen sortable result columns, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    HitCount,
    FileName,
    FileExt,
    FileSize,
    ExactSize,
    ContentHash,
    FilePath,
    UserNick,
    FreeSlots,
    TotalSlots,
    Address,
    HubName,
    HubAddress,
}

impl SortColumn {
    pub const ALL: [SortColumn; 13] = [
        SortColumn::HitCount,
        SortColumn::FileName,
        SortColumn::FileExt,
        SortColumn::FileSize,
        SortColumn::ExactSize,
        SortColumn::ContentHash,
        SortColumn::FilePath,
        SortColumn::UserNick,
        SortColumn::FreeSlots,
        SortColumn::TotalSlots,
        SortColumn::Address,
        SortColumn::HubName,
        SortColumn::HubAddress,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SortColumn::HitCount => "Count",
            SortColumn::FileName => "File",
            SortColumn::FileExt => "Ext",
            SortColumn::FileSize => "Size",
            SortColumn::ExactSize => "Exact size",
            SortColumn::ContentHash => "TTH",
            SortColumn::FilePath => "Path",
            SortColumn::UserNick => "Nick",
            SortColumn::FreeSlots => "Free slots",
            SortColumn::TotalSlots => "Total slots",
            SortColumn::Address => "IP",
            SortColumn::HubName => "Hub name",
            SortColumn::HubAddress => "Hub address",
        }
    }

    /// Within a content-identical group (and for exact-hash or directory
    /// searches) size, hash and hit count cannot discriminate, so those
    /// columns order by free slots instead.
    pub fn group_fallback(&self) -> SortColumn {
        match self {
            SortColumn::FileSize
            | SortColumn::ExactSize
            | SortColumn::ContentHash
            | SortColumn::HitCount => SortColumn::FreeSlots,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn toggled(&self) -> SortOrder {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

/// Worker budget for the bulk resort. Tests pin `workers` to 1 to force
/// the sequential path.
#[derive(Debug, Clone, Copy)]
pub struct SortConfig {
    pub workers: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Three-way comparison of two result nodes on one column. Ties are left
/// `Equal`; the stable sort and the upper-bound insertion position both
/// resolve them by insertion order, which keeps incremental insertion and
/// bulk resort observably identical.
pub fn compare(tree: &ResultTree, left: NodeId, right: NodeId, column: SortColumn) -> Ordering {
    let (Some(a), Some(b)) = (tree.record(left), tree.record(right)) else {
        return Ordering::Equal;
    };

    match column {
        SortColumn::HitCount => tree
            .hit_count(left)
            .cmp(&tree.hit_count(right))
            .then_with(|| a.size.cmp(&b.size))
            .then_with(|| a.free_slots.cmp(&b.free_slots)),
        SortColumn::FileName => caseless(a.file_name(), b.file_name()),
        SortColumn::FileExt => a.file_ext().cmp(&b.file_ext()),
        SortColumn::FileSize | SortColumn::ExactSize => a.size.cmp(&b.size),
        SortColumn::ContentHash => a.hash.cmp(&b.hash),
        SortColumn::FilePath => caseless(a.file_path(), b.file_path()),
        SortColumn::UserNick => caseless(&a.nick, &b.nick),
        SortColumn::FreeSlots | SortColumn::TotalSlots => {
            if a.free_slots == b.free_slots {
                a.total_slots.cmp(&b.total_slots)
            } else {
                a.free_slots.cmp(&b.free_slots)
            }
        }
        SortColumn::Address => a.bin_addr().cmp(&b.bin_addr()),
        SortColumn::HubName => caseless(&a.hub_name, &b.hub_name),
        SortColumn::HubAddress => a.hub_url.cmp(&b.hub_url),
    }
}

/// `compare` with the sort direction folded in: descending order flips
/// the operands rather than negating, so ties stay `Equal` either way.
pub fn directed_compare(
    tree: &ResultTree,
    left: NodeId,
    right: NodeId,
    column: SortColumn,
    order: SortOrder,
) -> Ordering {
    match order {
        SortOrder::Ascending => compare(tree, left, right, column),
        SortOrder::Descending => compare(tree, right, left, column),
    }
}

/// Insertion position for `item` in the already-sorted `children`: the
/// first index whose element compares greater, so equal items land after
/// their earlier-arrived peers.
pub fn sort_pos(
    tree: &ResultTree,
    children: &[NodeId],
    item: NodeId,
    column: SortColumn,
    order: SortOrder,
) -> usize {
    children
        .partition_point(|child| directed_compare(tree, *child, item, column, order) != Ordering::Greater)
}

fn caseless(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Below this length the parallel split is pure overhead.
const SEQUENTIAL_CUTOFF: usize = 1024;

pub fn sort_node_ids<F>(items: &mut [NodeId], workers: usize, ord: &F)
where
    F: Fn(NodeId, NodeId) -> Ordering + Sync,
{
    if items.len() <= 1 {
        return;
    }
    let mut scratch = items.to_vec();
    merge_sort(items, &mut scratch, workers.max(1), ord);
}

fn merge_sort<F>(items: &mut [NodeId], scratch: &mut [NodeId], workers: usize, ord: &F)
where
    F: Fn(NodeId, NodeId) -> Ordering + Sync,
{
    if workers <= 1 || items.len() < SEQUENTIAL_CUTOFF {
        items.sort_by(|a, b| ord(*a, *b));
        return;
    }

    let mid = items.len() / 2;
    {
        let (left, right) = items.split_at_mut(mid);
        let (scratch_left, scratch_right) = scratch.split_at_mut(mid);
        rayon::join(
            || merge_sort(left, scratch_left, workers / 2, ord),
            || merge_sort(right, scratch_right, workers - workers / 2, ord),
        );
    }
    merge(items, scratch, mid, ord);
}

fn merge<F>(items: &mut [NodeId], scratch: &mut [NodeId], mid: usize, ord: &F)
where
    F: Fn(NodeId, NodeId) -> Ordering + Sync,
{
    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < items.len() {
        // take left on ties to keep the merge stable
        if ord(items[j], items[i]) == Ordering::Less {
            scratch[k] = items[j];
            j += 1;
        } else {
            scratch[k] = items[i];
            i += 1;
        }
        k += 1;
    }
    while i < mid {
        scratch[k] = items[i];
        i += 1;
        k += 1;
    }
    while j < items.len() {
        scratch[k] = items[j];
        j += 1;
        k += 1;
    }
    items.copy_from_slice(scratch);
}
