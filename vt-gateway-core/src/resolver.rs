//! Logical name to device address resolution over a [`TagMap`].

use crate::tagmap::{TagEntry, TagGroup, TagMap};
use serde::Serialize;

/// Outcome of a single-parameter lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a TagEntry),
    NotFound,
    /// The block has no groups at all.
    BlockUnmapped,
}

impl<'a> Lookup<'a> {
    #[inline]
    pub fn entry(self) -> Option<&'a TagEntry> {
        match self {
            Lookup::Found(e) => Some(e),
            _ => None,
        }
    }
}

/// Group key and parameter names, without addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub key: String,
    pub params: Vec<String>,
}

/// `Konfiguration_Detailtest/Strom` -> `Konfiguration_Detailtest`.
#[inline]
fn top_level(group: &str) -> Option<&str> {
    group.split_once('/').map(|(head, _)| head)
}

impl TagMap {
    /// Resolve `(block, group, param)`, parameter names compared case-insensitively.
    ///
    /// When the exact group has no such parameter and `group` carries a
    /// subgroup, the lookup is retried on the top-level group.
    pub fn resolve(&self, block: u16, group: &str, param: &str) -> Lookup<'_> {
        let Some(tags) = self.block(block) else {
            return Lookup::BlockUnmapped;
        };
        if let Some(entry) = tags.group(group).and_then(|g| g.get(param)) {
            return Lookup::Found(entry);
        }
        top_level(group)
            .and_then(|head| tags.group(head))
            .and_then(|g| g.get(param))
            .map_or(Lookup::NotFound, Lookup::Found)
    }

    /// Entries of `group`, falling back to the top-level group for subgroup keys.
    pub fn group_entries(&self, block: u16, group: &str) -> Option<&TagGroup> {
        let tags = self.block(block)?;
        tags.group(group)
            .or_else(|| top_level(group).and_then(|head| tags.group(head)))
    }

    /// Group keys and parameter names of `block`, in document order.
    pub fn block_groups(&self, block: u16) -> Vec<GroupInfo> {
        self.block(block)
            .map(|tags| {
                tags.groups()
                    .iter()
                    .map(|g| GroupInfo {
                        key: g.key().to_string(),
                        params: g.entries().iter().map(|e| e.param.clone()).collect(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
