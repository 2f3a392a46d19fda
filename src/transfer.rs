use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::warn;

use crate::record::{ContentHash, UserId};
use crate::tree::{NodeId, ResultTree};

/// Failure reported by the external transfer queue for a single item.
#[derive(Debug, Clone)]
pub struct TransferError(pub String);

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transfer enqueue failed: {}", self.0)
    }
}

impl std::error::Error for TransferError {}

/// Narrow interface to the download subsystem.
pub trait TransferQueue {
    fn enqueue_download(
        &self,
        target: &Path,
        size: u64,
        hash: &ContentHash,
        user: &UserId,
    ) -> Result<(), TransferError>;

    fn enqueue_directory(
        &self,
        remote_path: &str,
        user: &UserId,
        target: &Path,
    ) -> Result<(), TransferError>;

    /// Local targets currently queued for this hash.
    fn targets_for(&self, hash: &ContentHash) -> Vec<PathBuf>;

    /// Cancel every queued target for this hash; returns what was removed.
    fn remove_by_hash(&self, hash: &ContentHash) -> Vec<PathBuf>;
}

/// Read-only oracle answering "is this content already shared locally".
pub trait ShareIndex {
    fn is_content_shared(&self, hash: &ContentHash) -> bool;
}

impl ShareIndex for HashSet<ContentHash> {
    fn is_content_shared(&self, hash: &ContentHash) -> bool {
        self.contains(hash)
    }
}

/// Queue a download for the result at `node`. File results also queue
/// every other source in the same group as an alternate for the same
/// target; one failing alternate never aborts the rest. Directory
/// results queue a directory fetch. Returns how many sources were
/// enqueued.
pub fn download(
    tree: &ResultTree,
    node: NodeId,
    target_dir: &Path,
    queue: &dyn TransferQueue,
) -> Result<usize, TransferError> {
    let Some(record) = tree.record(node) else {
        return Ok(0);
    };

    if record.is_dir() {
        queue.enqueue_directory(&record.path, &record.user, target_dir)?;
        return Ok(1);
    }

    let Some(hash) = &record.hash else {
        return Ok(0);
    };

    let target = target_dir.join(record.file_name());
    queue.enqueue_download(&target, record.size, hash, &record.user)?;
    let mut enqueued = 1;

    // alternates come from the whole group: either this node's children
    // or, for a grouped member, its siblings via the parent
    let group = if tree.has_children(node) {
        Some(node)
    } else {
        tree.parent(node).filter(|parent| !tree.is_root(*parent))
    };

    if let Some(group) = group {
        for member in group_members(tree, group) {
            if member == node {
                continue;
            }
            let Some(alt) = tree.record(member) else {
                continue;
            };
            let Some(alt_hash) = &alt.hash else {
                continue;
            };
            match queue.enqueue_download(&target, alt.size, alt_hash, &alt.user) {
                Ok(()) => enqueued += 1,
                Err(err) => {
                    warn!("alternate source skipped: {err}");
                    continue;
                }
            }
        }
    }

    Ok(enqueued)
}

/// Queue the whole remote directory containing the result.
pub fn download_whole(
    tree: &ResultTree,
    node: NodeId,
    target_dir: &Path,
    queue: &dyn TransferQueue,
) -> Result<(), TransferError> {
    let Some(record) = tree.record(node) else {
        return Ok(());
    };

    let remote = if record.is_file() {
        record.file_path()
    } else {
        record.path.as_str()
    };
    queue.enqueue_directory(remote, &record.user, target_dir)
}

fn group_members(tree: &ResultTree, group: NodeId) -> Vec<NodeId> {
    let mut members = vec![group];
    members.extend_from_slice(tree.children(group));
    members
}

/// In-memory queue used by the standalone binary and the test suite; a
/// real client wires its transfer subsystem in instead.
#[derive(Default)]
pub struct MemoryQueue {
    entries: Mutex<HashMap<ContentHash, Vec<PathBuf>>>,
    directories: Mutex<Vec<PathBuf>>,
    fail_users: Mutex<HashSet<UserId>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every enqueue for this user fail, for error-path tests.
    pub fn fail_for(&self, user: UserId) {
        self.fail_users
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(user);
    }

    pub fn directory_count(&self) -> usize {
        self.directories
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }
}

impl TransferQueue for MemoryQueue {
    fn enqueue_download(
        &self,
        target: &Path,
        _size: u64,
        hash: &ContentHash,
        user: &UserId,
    ) -> Result<(), TransferError> {
        let failing = self
            .fail_users
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .contains(user);
        if failing {
            return Err(TransferError(format!("no connection to {}", user.0)));
        }

        self.entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .entry(*hash)
            .or_default()
            .push(target.to_path_buf());
        Ok(())
    }

    fn enqueue_directory(
        &self,
        _remote_path: &str,
        _user: &UserId,
        target: &Path,
    ) -> Result<(), TransferError> {
        self.directories
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(target.to_path_buf());
        Ok(())
    }

    fn targets_for(&self, hash: &ContentHash) -> Vec<PathBuf> {
        self.entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(hash)
            .cloned()
            .unwrap_or_default()
    }

    fn remove_by_hash(&self, hash: &ContentHash) -> Vec<PathBuf> {
        self.entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(hash)
            .unwrap_or_default()
    }
}
