//! Heuristics that locate command parameters among a block's entries.

use crate::tagmap::TagEntry;
use vt_gateway_sdk::DeviceValue;

/// Ways a mapped parameter name can claim a `(test_type, action)` command.
///
/// Strategies are tried in [`CommandMatch::ORDER`]; a later strategy is only
/// consulted when no entry of the block satisfies an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMatch {
    /// Name is exactly `{test_type}_{action}`.
    Exact,
    /// Name contains `test_type` and ends with `_{action}`.
    TestTypeWithActionSuffix,
    /// Name ends with `_{action}`.
    ActionSuffix,
}

impl CommandMatch {
    pub const ORDER: [CommandMatch; 3] = [
        CommandMatch::Exact,
        CommandMatch::TestTypeWithActionSuffix,
        CommandMatch::ActionSuffix,
    ];

    /// Case-insensitive.
    pub fn matches(self, name: &str, test_type: &str, action: &str) -> bool {
        let name = name.to_lowercase();
        let test_type = test_type.to_lowercase();
        let suffix = format!("_{}", action.to_lowercase());
        match self {
            CommandMatch::Exact => name == format!("{test_type}{suffix}"),
            CommandMatch::TestTypeWithActionSuffix => {
                name.contains(&test_type) && name.ends_with(&suffix)
            }
            CommandMatch::ActionSuffix => name.ends_with(&suffix),
        }
    }
}

/// First entry claimed by the highest-priority strategy that claims any.
pub fn find_trigger<'a, I>(entries: I, test_type: &str, action: &str) -> Option<(CommandMatch, &'a TagEntry)>
where
    I: IntoIterator<Item = &'a TagEntry>,
    I::IntoIter: Clone,
{
    let entries = entries.into_iter();
    CommandMatch::ORDER.into_iter().find_map(|strategy| {
        entries
            .clone()
            .find(|e| strategy.matches(&e.param, test_type, action))
            .map(|e| (strategy, e))
    })
}

/// First entry whose name contains `token`, case-insensitive.
pub fn find_selector<'a, I>(entries: I, token: &str) -> Option<&'a TagEntry>
where
    I: IntoIterator<Item = &'a TagEntry>,
{
    let token = token.to_lowercase();
    entries
        .into_iter()
        .find(|e| e.param.to_lowercase().contains(&token))
}

/// Representations tried, in order, when pulsing a trigger.
pub fn trigger_values(action: &str) -> [DeviceValue; 3] {
    [
        DeviceValue::Int32(1),
        DeviceValue::Boolean(true),
        DeviceValue::String(action.to_string()),
    ]
}
