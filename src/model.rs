use std::collections::VecDeque;

use log::{debug, trace};

use crate::filter::Blacklist;
use crate::query::SearchKind;
use crate::record::SearchRecord;
use crate::sort::{self, SortColumn, SortConfig, SortOrder};
use crate::tree::{NodeId, ResultTree};
use crate::util::format_size;

/// Per-invocation cap on staged records applied by the pump.
const PUMP_BATCH: usize = 16;

/// Tree mutations translated into the notification protocol the
/// presentation layer drains once per frame. `LayoutChanged` carries the
/// old-row to new-row permutation of the resorted parent so externally
/// held row positions can be remapped; `NodeId` handles themselves stay
/// valid across every resort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    RowsInserted { parent: NodeId, first: usize, last: usize },
    RowsRemoved { parent: NodeId, first: usize, last: usize },
    RowMoved { parent: NodeId, from: usize, to: usize },
    LayoutChanged { parent: NodeId, remap: Vec<usize> },
    DataChanged { node: NodeId },
    ExpandRequest { node: NodeId },
    Reset,
    UpdateStatus,
}

/// Result of applying one record to the tree. A dropped record is an
/// expected, counted outcome, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted(NodeId),
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    Backlog,
    Idle,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub results: u64,
    pub dropped: u64,
    pub unique: usize,
}

/// Live search-result model: deduplicated, grouped, incrementally sorted.
///
/// All mutation happens on the single owner context that holds the model;
/// the network side only ever touches the thread-safe inbox in
/// `ingest`. The bulk resort fans comparison work out to worker threads
/// but applies the result as one atomic child-list swap.
pub struct SearchModel {
    tree: ResultTree,
    pending: VecDeque<SearchRecord>,
    events: VecDeque<ViewEvent>,
    blacklist: Blacklist,
    sort_column: SortColumn,
    sort_order: SortOrder,
    sort_config: SortConfig,
    search_kind: SearchKind,
    strict_dedup: bool,
    results: u64,
    dropped: u64,
}

impl SearchModel {
    pub fn new(blacklist: Blacklist) -> Self {
        Self::with_sort_config(blacklist, SortConfig::default())
    }

    pub fn with_sort_config(blacklist: Blacklist, sort_config: SortConfig) -> Self {
        Self {
            tree: ResultTree::new(),
            pending: VecDeque::new(),
            events: VecDeque::new(),
            blacklist,
            sort_column: SortColumn::FileSize,
            sort_order: SortOrder::Descending,
            sort_config,
            search_kind: SearchKind::Keyword,
            strict_dedup: false,
            results: 0,
            dropped: 0,
        }
    }

    pub fn tree(&self) -> &ResultTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn sort_column(&self) -> SortColumn {
        self.sort_column
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn search_kind(&self) -> &SearchKind {
        &self.search_kind
    }

    pub fn set_search_kind(&mut self, kind: SearchKind) {
        self.search_kind = kind;
    }

    /// Strict mode also requires the source network address to match when
    /// deciding that two results are the same entry.
    pub fn set_strict_dedup(&mut self, strict: bool) {
        self.strict_dedup = strict;
    }

    pub fn counters(&self) -> Counters {
        Counters {
            results: self.results,
            dropped: self.dropped,
            unique: self.tree.child_count(self.tree.root()),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.tree.has_children(self.tree.root())
    }

    pub fn backlog(&self) -> usize {
        self.pending.len()
    }

    pub fn take_events(&mut self) -> Vec<ViewEvent> {
        self.events.drain(..).collect()
    }

    /// Stage an accepted record for the next pump tick. Returns whether
    /// the backlog now warrants an immediate wake: the threshold shrinks
    /// as the visible row count grows, because resorting and redrawing a
    /// large table is costlier and batches must stay small.
    pub fn append_task(&mut self, record: SearchRecord) -> bool {
        if !self.blacklist.allows(&record) {
            trace!("blacklisted result skipped: {}", record.path);
            return false;
        }

        self.pending.push_back(record);

        let rows = self.tree.child_count(self.tree.root());
        let threshold = if rows > 300 {
            15
        } else if rows > 100 {
            7
        } else if rows > 50 {
            3
        } else {
            1
        };

        self.pending.len() > threshold
    }

    /// Drain up to one batch of staged records into the tree. Callers
    /// reschedule while `Pump::Backlog` is reported; `Pump::Idle` ends
    /// the burst with a status refresh.
    pub fn process_tasks(&mut self) -> Pump {
        if self.pending.is_empty() {
            return Pump::Idle;
        }

        let mut ticker = PUMP_BATCH;
        while ticker > 0 {
            let Some(record) = self.pending.pop_front() else {
                break;
            };
            self.add_result(record);
            ticker -= 1;
        }

        if self.pending.is_empty() {
            self.events.push_back(ViewEvent::UpdateStatus);
            Pump::Idle
        } else {
            Pump::Backlog
        }
    }

    /// Insert one record: group by content hash, drop duplicates, keep
    /// the target's children sorted when it is expanded.
    pub fn add_result(&mut self, record: SearchRecord) -> Outcome {
        let root = self.tree.root();

        // a file result without a content hash cannot be grouped or
        // downloaded; count it as dropped rather than halting the pump
        if record.is_file() && record.hash.is_none() {
            self.dropped += 1;
            return Outcome::Dropped;
        }

        let mut parent = root;
        if record.is_file() {
            if let Some(hash) = &record.hash {
                if let Some(group) = self.tree.index_lookup(hash) {
                    parent = group;
                }
            }
        }

        if parent != root && self.tree.group_contains(parent, &record, self.strict_dedup) {
            self.dropped += 1;
            return Outcome::Dropped;
        }

        let is_file = record.is_file();
        let hash = record.hash;
        let item = self.tree.alloc(record);

        if parent == root && is_file {
            if let Some(hash) = hash {
                self.tree.index_insert(hash, item);
            }
        }

        self.insert_item(parent, item);

        // reveal groups of identical content as soon as they form
        if parent != root && self.tree.child_count(parent) == 1 && self.search_kind.is_exact() {
            self.events.push_back(ViewEvent::ExpandRequest { node: parent });
        }

        // hit-count order changes every time a group gains a member
        if parent != root && self.sort_column == SortColumn::HitCount {
            self.move_item(parent);
        }

        self.results += 1;
        Outcome::Inserted(item)
    }

    fn insert_item(&mut self, parent: NodeId, item: NodeId) {
        let root = self.tree.root();

        if parent != root {
            let parent_free = self.tree.record(parent).map_or(0, |r| r.free_slots);
            let item_free = self.tree.record(item).map_or(0, |r| r.free_slots);
            if item_free > parent_free {
                self.tree.swap_records(parent, item);
            }
        }

        if self.tree.is_expanded(parent) {
            let column = if parent != root || !matches!(self.search_kind, SearchKind::Keyword) {
                self.sort_column.group_fallback()
            } else {
                self.sort_column
            };

            let row = sort::sort_pos(
                &self.tree,
                self.tree.children(parent),
                item,
                column,
                self.sort_order,
            );
            let ok = self.tree.insert_child(parent, item, row);
            debug_assert!(ok);
            self.events.push_back(ViewEvent::RowsInserted {
                parent,
                first: row,
                last: row,
            });
        } else {
            // collapsed subtrees render a single summary row, so exact
            // placement waits until expansion
            self.tree.append_child(parent, item);
            if self.sort_column != SortColumn::HitCount {
                self.events.push_back(ViewEvent::DataChanged { node: parent });
            }
        }
    }

    fn move_item(&mut self, item: NodeId) {
        let root = self.tree.root();
        let from = self.tree.row_of(item);

        // scan the siblings with the item excluded; comparing the item
        // against itself would leave the list unpartitioned and the
        // binary search unsound
        let others: Vec<NodeId> = self
            .tree
            .children(root)
            .iter()
            .copied()
            .filter(|id| *id != item)
            .collect();
        let to = sort::sort_pos(&self.tree, &others, item, self.sort_column, self.sort_order);

        if to == from {
            self.events.push_back(ViewEvent::DataChanged { node: item });
            return;
        }

        let ok = self.tree.move_child(root, from, to);
        debug_assert!(ok);
        self.events.push_back(ViewEvent::RowMoved {
            parent: root,
            from,
            to,
        });
    }

    pub fn sort(&mut self, column: SortColumn, order: SortOrder) {
        self.sort_column = column;
        self.sort_order = order;
        debug!("sorting by {:?} {:?}", column, order);
        self.resort(self.tree.root(), column);
    }

    /// Bulk resort of one node's children. Comparison work fans out over
    /// the configured workers; the new order lands in the tree as a
    /// single swap, and the emitted remap maps each old row to its new
    /// position.
    fn resort(&mut self, parent: NodeId, column: SortColumn) {
        if !self.tree.has_children(parent) {
            return;
        }

        let old = self.tree.children(parent).to_vec();
        let mut sorted = old.clone();
        {
            let tree = &self.tree;
            let order = self.sort_order;
            sort::sort_node_ids(&mut sorted, self.sort_config.workers, &|l, r| {
                sort::directed_compare(tree, l, r, column, order)
            });
        }

        let mut new_pos = std::collections::HashMap::with_capacity(sorted.len());
        for (row, id) in sorted.iter().enumerate() {
            new_pos.insert(*id, row);
        }
        let remap: Vec<usize> = old.iter().map(|id| new_pos[id]).collect();

        self.tree.set_children(parent, sorted);
        self.events.push_back(ViewEvent::LayoutChanged { parent, remap });
    }

    /// Expanding a group re-sorts its members first; inside a group the
    /// active column falls back to free slots where it cannot
    /// discriminate.
    pub fn expand(&mut self, node: NodeId) {
        if self.tree.is_root(node) {
            return;
        }
        self.resort(node, self.sort_column.group_fallback());
        self.tree.set_expanded(node, true);
    }

    pub fn collapse(&mut self, node: NodeId) {
        if self.tree.is_root(node) {
            return;
        }
        self.tree.set_expanded(node, false);
    }

    /// Detach `count` children of `parent` starting at `row`. Returns
    /// false on an out-of-bounds span. Dedup-index entries of detached
    /// top-level file nodes are removed; a group shrunk to one member is
    /// deliberately not demoted back to a plain row.
    pub fn remove_rows(&mut self, parent: NodeId, row: usize, count: usize) -> bool {
        if count < 1 || row + count > self.tree.child_count(parent) {
            return false;
        }

        let parent_is_root = self.tree.is_root(parent);
        let mut nested = 0usize;

        for _ in 0..count {
            let Some(child) = self.tree.take_child(parent, row) else {
                return false;
            };

            if parent_is_root {
                if let Some(record) = self.tree.record(child) {
                    if record.is_file() {
                        if let Some(hash) = record.hash {
                            self.tree.index_remove(&hash);
                        }
                    }
                }
            }

            nested += self.tree.child_count(child);
        }

        self.events.push_back(ViewEvent::RowsRemoved {
            parent,
            first: row,
            last: row + count - 1,
        });

        self.results = self.results.saturating_sub((nested + count) as u64);
        if self.results == 0 {
            self.dropped = 0;
        }

        true
    }

    /// Discard the whole session: tree, index, staged queue, counters.
    pub fn clear(&mut self) {
        debug!(
            "clearing model: {} results, {} staged",
            self.results,
            self.pending.len()
        );
        self.tree.clear();
        self.pending.clear();
        self.results = 0;
        self.dropped = 0;
        self.events.push_back(ViewEvent::Reset);
        self.events.push_back(ViewEvent::UpdateStatus);
    }

    /// Display value for one cell. Group rows show their hit count in the
    /// count column; plain rows leave it blank.
    pub fn display_text(&self, node: NodeId, column: SortColumn) -> String {
        let Some(record) = self.tree.record(node) else {
            return String::new();
        };

        match column {
            SortColumn::HitCount => {
                if self.tree.has_children(node) {
                    self.tree.hit_count(node).to_string()
                } else {
                    String::new()
                }
            }
            SortColumn::FileName => record.file_name().to_string(),
            SortColumn::FileExt => record.file_ext(),
            SortColumn::FileSize => format_size(record.size),
            SortColumn::ExactSize => record.size.to_string(),
            SortColumn::ContentHash => record
                .hash
                .as_ref()
                .map(|hash| hash.to_base32())
                .unwrap_or_default(),
            SortColumn::FilePath => record.file_path().to_string(),
            SortColumn::UserNick => record.nick.clone(),
            SortColumn::FreeSlots => record.free_slots.to_string(),
            SortColumn::TotalSlots => record.total_slots.to_string(),
            SortColumn::Address => record.address.clone(),
            SortColumn::HubName => record.hub_name.clone(),
            SortColumn::HubAddress => record.hub_url.clone(),
        }
    }
}
