use roxmltree::{Document, Node};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};
use tracing::{debug, info, warn};
use vt_gateway_error::{VTError, VTResult};

const MAPPINGS_ELEMENT: &str = "Mappings";
const MAPPING_ELEMENT: &str = "Mapping";
const SECTION_PREFIX: &str = "DB_";
const BLOCK_PREFIX: &str = "block";

/// One tag declaration: where a logical parameter lives on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEntry {
    /// Block number, `0` for global entries.
    pub block: u16,
    /// Group key, optionally `group/subgroup`.
    pub group_key: String,
    pub param: String,
    /// Device address (OPC UA node id text).
    pub address: String,
    pub data_type_id: Option<i32>,
    pub count: Option<i32>,
    pub memory_access_mode: Option<i32>,
}

impl TagEntry {
    /// Whether values for this entry travel as arrays.
    #[inline]
    pub fn is_array(&self) -> bool {
        self.count.is_some_and(|c| c > 1) || self.memory_access_mode == Some(1)
    }
}

/// Entries of one group, in document order, with a case-insensitive name index.
#[derive(Debug, Default, Clone)]
pub struct TagGroup {
    key: String,
    entries: Vec<TagEntry>,
    index: HashMap<String, usize>,
}

impl TagGroup {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn entries(&self) -> &[TagEntry] {
        &self.entries
    }

    /// Case-insensitive parameter lookup.
    pub fn get(&self, param: &str) -> Option<&TagEntry> {
        self.index
            .get(&param.to_lowercase())
            .and_then(|i| self.entries.get(*i))
    }

    /// Insert or replace. Returns the replaced entry when the name was already present.
    fn upsert(&mut self, entry: TagEntry) -> Option<TagEntry> {
        let name = entry.param.to_lowercase();
        match self.index.get(&name) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i], entry)),
            None => {
                self.index.insert(name, self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }
}

/// All groups of one block, in document order.
#[derive(Debug, Default, Clone)]
pub struct BlockTags {
    groups: Vec<TagGroup>,
    index: HashMap<String, usize>,
}

impl BlockTags {
    #[inline]
    pub fn groups(&self) -> &[TagGroup] {
        &self.groups
    }

    /// Exact (case-sensitive) group lookup.
    pub fn group(&self, key: &str) -> Option<&TagGroup> {
        self.index.get(key).and_then(|i| self.groups.get(*i))
    }

    /// Every entry of the block, group by group in document order.
    pub fn entries(&self) -> impl Iterator<Item = &TagEntry> + Clone {
        self.groups.iter().flat_map(|g| g.entries.iter())
    }

    fn group_mut(&mut self, key: &str) -> &mut TagGroup {
        let i = match self.index.get(key) {
            Some(&i) => i,
            None => {
                self.index.insert(key.to_string(), self.groups.len());
                self.groups.push(TagGroup::new(key));
                self.groups.len() - 1
            }
        };
        &mut self.groups[i]
    }
}

/// Immutable lookup table from (block, group, parameter) to device address.
///
/// Built once from the tag-definition document and shared read-only.
#[derive(Debug, Default, Clone)]
pub struct TagMap {
    blocks: BTreeMap<u16, BlockTags>,
    globals: TagGroup,
}

impl TagMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the document at `path`.
    ///
    /// A missing or malformed document yields an empty map: the gateway keeps
    /// running and every block reports `NoMappingForBlock`.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Tag document not readable, starting with empty mapping");
                return Self::empty();
            }
        };
        match Self::from_xml_str(&text) {
            Ok(map) => {
                info!(
                    path = %path.display(),
                    blocks = map.blocks.len(),
                    entries = map.entry_count(),
                    "Tag mapping loaded"
                );
                map
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Tag document malformed, starting with empty mapping");
                Self::empty()
            }
        }
    }

    /// Build from document text.
    pub fn from_xml_str(text: &str) -> VTResult<Self> {
        let doc = Document::parse(text).map_err(|e| VTError::Mapping(e.to_string()))?;
        let root = doc.root_element();
        let mappings = if root.has_tag_name(MAPPINGS_ELEMENT) {
            root
        } else {
            root.children()
                .find(|n| n.has_tag_name(MAPPINGS_ELEMENT))
                .ok_or_else(|| VTError::Mapping(format!("missing <{MAPPINGS_ELEMENT}> element")))?
        };

        let mut map = TagMap::default();
        for section in mappings.children().filter(Node::is_element) {
            if section.has_tag_name(MAPPING_ELEMENT) {
                if let Some(entry) = read_mapping(section, 0, "") {
                    if let Some(old) = map.globals.upsert(entry) {
                        warn!(param = %old.param, "Duplicate global tag, keeping the last one");
                    }
                }
                continue;
            }
            let group_key = group_key_from_section(section.tag_name().name());
            for block_node in section.children().filter(Node::is_element) {
                let Some(block) = block_number(block_node.tag_name().name()) else {
                    continue;
                };
                for mapping in block_node
                    .descendants()
                    .filter(|n| n.has_tag_name(MAPPING_ELEMENT))
                {
                    let key = match mapping.parent_element() {
                        Some(parent) if parent != block_node => {
                            format!("{}/{}", group_key, parent.tag_name().name())
                        }
                        _ => group_key.clone(),
                    };
                    let Some(entry) = read_mapping(mapping, block, &key) else {
                        continue;
                    };
                    map.insert(entry);
                }
            }
        }
        Ok(map)
    }

    fn insert(&mut self, entry: TagEntry) {
        let block = entry.block;
        let group = self.blocks.entry(block).or_default().group_mut(&entry.group_key);
        if let Some(old) = group.upsert(entry) {
            warn!(
                block,
                group = %old.group_key,
                param = %old.param,
                replaced = %old.address,
                "Duplicate tag, keeping the last one"
            );
        }
    }

    /// Tags of `block`, if the block has any.
    pub fn block(&self, block: u16) -> Option<&BlockTags> {
        self.blocks.get(&block).filter(|b| !b.groups.is_empty())
    }

    #[inline]
    pub fn has_block(&self, block: u16) -> bool {
        self.block(block).is_some()
    }

    pub fn blocks(&self) -> impl Iterator<Item = u16> + '_ {
        self.blocks.keys().copied()
    }

    /// Global (block-independent) entry by case-insensitive name.
    pub fn global(&self, name: &str) -> Option<&TagEntry> {
        self.globals.get(name)
    }

    pub fn entry_count(&self) -> usize {
        self.blocks
            .values()
            .flat_map(|b| b.groups.iter())
            .map(|g| g.entries.len())
            .sum::<usize>()
            + self.globals.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }
}

fn read_mapping(node: Node<'_, '_>, block: u16, group_key: &str) -> Option<TagEntry> {
    let label = node.attribute("Label").map(str::trim).unwrap_or_default();
    let address = node.attribute("NodeId").map(str::trim).unwrap_or_default();
    if label.is_empty() || address.is_empty() {
        debug!(block, group = group_key, "Skipping tag without label or address");
        return None;
    }
    let param = label.rsplit('.').next().unwrap_or(label).trim();
    if param.is_empty() {
        return None;
    }
    Some(TagEntry {
        block,
        group_key: group_key.to_string(),
        param: param.to_string(),
        address: address.to_string(),
        data_type_id: int_attribute(node, "DataTypeId"),
        count: int_attribute(node, "Count"),
        memory_access_mode: int_attribute(node, "MemoryAccessMode"),
    })
}

fn int_attribute(node: Node<'_, '_>, name: &str) -> Option<i32> {
    node.attribute(name).and_then(|v| v.trim().parse().ok())
}

/// `DB_Ventilkonfiguration_1-4` -> `Ventilkonfiguration`.
pub(crate) fn group_key_from_section(name: &str) -> String {
    let name = name.strip_prefix(SECTION_PREFIX).unwrap_or(name);
    let cut = name
        .match_indices('_')
        .map(|(i, _)| i)
        .find(|&i| is_block_range(&name[i + 1..]))
        .unwrap_or(name.len());
    name[..cut].to_string()
}

/// Matches a leading `<digits>-<digits>` token.
fn is_block_range(s: &str) -> bool {
    let Some((from, rest)) = s.split_once('-') else {
        return false;
    };
    let to_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    !from.is_empty() && from.bytes().all(|b| b.is_ascii_digit()) && to_len > 0
}

/// `Block3` -> `3`. Names not starting with `Block` are not block sections.
pub(crate) fn block_number(name: &str) -> Option<u16> {
    let head = name.get(..BLOCK_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(BLOCK_PREFIX) {
        return None;
    }
    let digits: String = name.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}
