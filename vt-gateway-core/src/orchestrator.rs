use crate::{
    codec::ValueCodec,
    command::{find_selector, find_trigger, trigger_values},
    link::DeviceLink,
    resolver::{GroupInfo, Lookup},
    tagmap::{TagEntry, TagGroup, TagMap},
    views::{GroupShape, GroupView},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vt_gateway_error::{SyncError, SyncResult};
use vt_gateway_sdk::{DeviceValue, Parameter};

pub const DEFAULT_SELECTOR_TOKEN: &str = "Ventilnummer";

/// Outcome of a best-effort group write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupWriteReport {
    pub written: Vec<String>,
    /// Values with no mapped parameter in the group.
    pub unmatched: Vec<String>,
    /// Values whose write the device refused or could not take.
    pub failed: Vec<String>,
}

impl GroupWriteReport {
    /// Every provided value was matched and written.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupData {
    pub key: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockData {
    pub block: u16,
    pub groups: Vec<GroupData>,
    /// Groups whose read failed.
    pub unavailable: Vec<String>,
}

/// Read/write/command entry point used by the outer layers and the pollers.
#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    tags: Arc<TagMap>,
    link: Arc<DeviceLink>,
    selector_token: String,
}

impl SyncOrchestrator {
    pub fn new(tags: Arc<TagMap>, link: Arc<DeviceLink>) -> Self {
        Self {
            tags,
            link,
            selector_token: DEFAULT_SELECTOR_TOKEN.to_string(),
        }
    }

    pub fn with_selector_token(mut self, token: impl Into<String>) -> Self {
        self.selector_token = token.into();
        self
    }

    #[inline]
    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    #[inline]
    pub fn link(&self) -> &Arc<DeviceLink> {
        &self.link
    }

    fn lookup(&self, block: u16, group: &str, param: &str) -> SyncResult<&TagEntry> {
        match self.tags.resolve(block, group, param) {
            Lookup::Found(entry) => Ok(entry),
            Lookup::NotFound => Err(SyncError::parameter_not_found(block, group, param)),
            Lookup::BlockUnmapped => Err(SyncError::NoMappingForBlock { block }),
        }
    }

    /// The group that group-level reads and writes both work against: the
    /// subgroup itself when mapped, else its top-level group as a whole.
    fn mapped_group(&self, block: u16, group: &str) -> SyncResult<&TagGroup> {
        if !self.tags.has_block(block) {
            return Err(SyncError::NoMappingForBlock { block });
        }
        self.tags
            .group_entries(block, group)
            .filter(|g| !g.entries().is_empty())
            .ok_or_else(|| SyncError::group_not_found(block, group))
    }

    async fn read_entry(&self, entry: &TagEntry) -> SyncResult<Parameter> {
        let raw = self.link.read_raw(&entry.address).await?;
        Ok(Parameter::new(&entry.param, ValueCodec::decode(&raw)).with_data_type(raw.type_name()))
    }

    /// The returned parameter carries `param` as given by the caller.
    pub async fn read_parameter(&self, block: u16, group: &str, param: &str) -> SyncResult<Parameter> {
        let entry = self.lookup(block, group, param)?;
        let mut parameter = self.read_entry(entry).await?;
        parameter.name = param.to_string();
        Ok(parameter)
    }

    /// Single attempt, no retry.
    pub async fn write_parameter(&self, block: u16, group: &str, param: &str, value: &str) -> SyncResult<()> {
        let entry = self.lookup(block, group, param)?;
        let encoded = ValueCodec::encode(value, Some(entry));
        self.link.write_raw(&entry.address, &encoded).await?;
        debug!(block, group, param, address = %entry.address, "Parameter written");
        Ok(())
    }

    /// All-or-nothing: the first failed read fails the whole group.
    pub async fn read_group(&self, block: u16, group: &str) -> SyncResult<Vec<Parameter>> {
        let entries = self.mapped_group(block, group)?.entries();
        if !self.link.is_connected() {
            return Err(SyncError::DeviceUnavailable);
        }
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(self.read_entry(entry).await?);
        }
        Ok(out)
    }

    /// Best-effort: every value is attempted independently and the report says
    /// which ones made it. Values match against the same entries [`read_group`]
    /// reads, so a name only mapped in another group is unmatched.
    ///
    /// [`read_group`]: Self::read_group
    pub async fn write_group(&self, block: u16, group: &str, values: &[Parameter]) -> SyncResult<GroupWriteReport> {
        let mapped = self.mapped_group(block, group)?;
        if !self.link.is_connected() {
            return Err(SyncError::DeviceUnavailable);
        }

        let mut report = GroupWriteReport::default();
        for value in values {
            let Some(entry) = mapped.get(&value.name) else {
                warn!(block, group, param = %value.name, "No mapped parameter, value skipped");
                report.unmatched.push(value.name.clone());
                continue;
            };
            let encoded = ValueCodec::encode(&value.value, Some(entry));
            match self.link.write_raw(&entry.address, &encoded).await {
                Ok(()) => report.written.push(value.name.clone()),
                Err(e) => {
                    warn!(block, group, param = %value.name, error = %e, "Group value write failed");
                    report.failed.push(value.name.clone());
                }
            }
        }
        Ok(report)
    }

    /// Optionally select the target with `payload`, then pulse the trigger
    /// parameter matched by `(test_type, action)`.
    pub async fn execute_command(
        &self,
        block: u16,
        test_type: &str,
        action: &str,
        payload: Option<&str>,
    ) -> SyncResult<()> {
        let tags = self
            .tags
            .block(block)
            .ok_or(SyncError::NoMappingForBlock { block })?;
        if !self.link.is_connected() {
            return Err(SyncError::DeviceUnavailable);
        }

        if let Some(payload) = payload {
            match find_selector(tags.entries(), &self.selector_token) {
                Some(selector) => {
                    let encoded = ValueCodec::encode(payload, Some(selector));
                    self.link.write_raw(&selector.address, &encoded).await?;
                    debug!(block, param = %selector.param, payload, "Command payload written");
                }
                None => debug!(block, token = %self.selector_token, "No selector parameter, payload ignored"),
            }
        }

        let (strategy, trigger) = find_trigger(tags.entries(), test_type, action).ok_or_else(|| {
            SyncError::CommandNotMapped {
                block,
                test_type: test_type.to_string(),
                action: action.to_string(),
            }
        })?;

        let mut last_err = None;
        for value in trigger_values(action) {
            match self.link.write_raw(&trigger.address, &value).await {
                Ok(()) => {
                    info!(
                        block,
                        test_type,
                        action,
                        param = %trigger.param,
                        strategy = ?strategy,
                        "Command triggered"
                    );
                    return Ok(());
                }
                Err(SyncError::DeviceUnavailable) => return Err(SyncError::DeviceUnavailable),
                Err(e) => {
                    debug!(block, param = %trigger.param, value = %value, error = %e, "Trigger representation rejected");
                    last_err = Some(e);
                }
            }
        }
        let reason = last_err.map(|e| e.to_string()).unwrap_or_default();
        warn!(block, test_type, action, param = %trigger.param, "Command trigger rejected in every representation");
        Err(SyncError::WriteFailed(format!(
            "trigger '{}' rejected: {reason}",
            trigger.param
        )))
    }

    /// Raw read of a device address outside the tag map.
    pub async fn read_address(&self, address: &str) -> SyncResult<DeviceValue> {
        self.link.read_raw(address).await
    }

    /// Every group of `block`; groups that fail to read are listed as unavailable.
    pub async fn read_block(&self, block: u16) -> SyncResult<BlockData> {
        let tags = self
            .tags
            .block(block)
            .ok_or(SyncError::NoMappingForBlock { block })?;
        if !self.link.is_connected() {
            return Err(SyncError::DeviceUnavailable);
        }
        let mut data = BlockData {
            block,
            groups: Vec::with_capacity(tags.groups().len()),
            unavailable: Vec::new(),
        };
        for group in tags.groups() {
            match self.read_group(block, group.key()).await {
                Ok(parameters) => data.groups.push(GroupData {
                    key: group.key().to_string(),
                    parameters,
                }),
                Err(e) => {
                    debug!(block, group = group.key(), error = %e, "Group unavailable");
                    data.unavailable.push(group.key().to_string());
                }
            }
        }
        Ok(data)
    }

    /// Mapping introspection, no device I/O.
    pub fn block_groups(&self, block: u16) -> SyncResult<Vec<GroupInfo>> {
        if !self.tags.has_block(block) {
            return Err(SyncError::NoMappingForBlock { block });
        }
        Ok(self.tags.block_groups(block))
    }

    pub async fn read_group_as<T: GroupShape>(&self, block: u16) -> SyncResult<GroupView<T>> {
        let params = self.read_group(block, T::GROUP).await?;
        Ok(T::populate(&params))
    }

    pub async fn write_group_from<T: GroupShape>(&self, block: u16, shape: &T) -> SyncResult<GroupWriteReport> {
        self.write_group(block, T::GROUP, &shape.to_parameters()).await
    }
}
