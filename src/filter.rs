use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;

use crate::record::{ContentHash, SearchRecord};

/// Locally configured blacklist applied before a record is staged for
/// insertion. Name patterns are globs matched against the full remote
/// path; hashes are matched exactly. Passed explicitly to the model so
/// tests never need global setup.
#[derive(Default)]
pub struct Blacklist {
    names: Option<GlobSet>,
    hashes: HashSet<ContentHash>,
}

impl Blacklist {
    pub fn new(patterns: &[String], hashes: Vec<ContentHash>) -> Result<Self, globset::Error> {
        let names = if patterns.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in patterns {
                let glob = GlobBuilder::new(pattern).case_insensitive(true).build()?;
                builder.add(glob);
            }
            Some(builder.build()?)
        };

        Ok(Self {
            names,
            hashes: hashes.into_iter().collect(),
        })
    }

    pub fn allows(&self, record: &SearchRecord) -> bool {
        if let Some(matcher) = &self.names {
            if matcher.is_match(&record.path) {
                return false;
            }
        }

        if let Some(hash) = &record.hash {
            if self.hashes.contains(hash) {
                return false;
            }
        }

        true
    }
}
