use serde::{Deserialize, Serialize};

/// A logical parameter value as exchanged with callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            data_type: None,
        }
    }

    pub fn with_data_type(mut self, data_type: Option<String>) -> Self {
        self.data_type = data_type;
        self
    }
}
