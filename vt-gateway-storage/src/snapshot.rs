use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};
use vt_gateway_sdk::{Parameter, SnapshotStore, StoreResult};

/// Snapshot store writing one JSON document per snapshot into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    dir: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDocument<'a> {
    name: String,
    block_index: u16,
    identifier: i64,
    counter: i64,
    created_at: DateTime<Utc>,
    comment: String,
    groups: BTreeMap<&'a str, &'a [Parameter]>,
}

impl JsonFileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Measurement id carried by the group, if any.
    ///
    /// `MessID` and `MessIDCurrent` win over other names containing `MessID`.
    pub fn measurement_id(parameters: &[Parameter]) -> Option<i64> {
        let exact = parameters.iter().find(|p| {
            p.name.eq_ignore_ascii_case("MessID") || p.name.eq_ignore_ascii_case("MessIDCurrent")
        });
        let candidate = exact.or_else(|| {
            parameters
                .iter()
                .find(|p| p.name.to_ascii_lowercase().contains("messid"))
        })?;
        parse_id(&candidate.value)
    }

    /// Stem used for both the document name and its file name.
    fn document_name(group: &str, at: DateTime<Utc>) -> String {
        format!(
            "{}_Auto_{}",
            group.replace('/', "_"),
            at.format("%Y-%m-%d_%H-%M-%S")
        )
    }
}

fn parse_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    #[instrument(name = "save-group-snapshot", skip(self, parameters), fields(count = parameters.len()))]
    async fn save_group_snapshot(
        &self,
        block: u16,
        group: &str,
        counter: i64,
        parameters: &[Parameter],
    ) -> StoreResult<()> {
        let created_at = Utc::now();
        let measurement_id = Self::measurement_id(parameters);
        let identifier = measurement_id.unwrap_or(counter);
        let name = Self::document_name(group, created_at);

        let mut groups = BTreeMap::new();
        groups.insert(group, parameters);
        let document = SnapshotDocument {
            name: name.clone(),
            block_index: block,
            identifier,
            counter,
            created_at,
            comment: format!(
                "Auto-saved on readiness change (DatenReady={counter}, MessID={identifier})"
            ),
            groups,
        };
        let body = serde_json::to_vec_pretty(&document)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = format!("{name}_{counter}.json");
        let target = self.dir.join(&file_name);
        let staging = self.dir.join(format!(".{file_name}.tmp"));
        tokio::fs::write(&staging, body).await?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        if measurement_id.is_none() {
            debug!(group, counter, "No measurement id in group, counter used as identifier");
        }
        info!(path = %target.display(), "Snapshot saved");
        Ok(())
    }
}
