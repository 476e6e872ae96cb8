//! Source-to-destination id translation tables and their artifacts.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{PipelineError, RecordKind};

/// A migrated record: its id in the source and in the destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TranslationEntry {
    #[serde(rename = "clerk")]
    pub source_id: String,
    #[serde(rename = "workos")]
    pub destination_id: String,
}

impl TranslationEntry {
    pub fn new(source_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: destination_id.into(),
        }
    }
}

/// Read-only lookup from source id to destination id for one record kind.
#[derive(Debug, Clone)]
pub struct TranslationTable {
    kind: RecordKind,
    entries: HashMap<String, String>,
}

impl TranslationTable {
    /// Build a table from entries.
    ///
    /// Repeated identical entries collapse; a source id mapped to two
    /// different destinations is an error.
    pub fn from_entries(
        kind: RecordKind,
        entries: impl IntoIterator<Item = TranslationEntry>,
    ) -> Result<Self, String> {
        let mut map = HashMap::new();
        for entry in entries {
            match map.entry(entry.source_id) {
                Entry::Vacant(slot) => {
                    slot.insert(entry.destination_id);
                }
                Entry::Occupied(slot) if *slot.get() == entry.destination_id => {}
                Entry::Occupied(slot) => {
                    return Err(format!(
                        "{} {} maps to both {} and {}",
                        kind,
                        slot.key(),
                        slot.get(),
                        entry.destination_id
                    ));
                }
            }
        }
        Ok(Self { kind, entries: map })
    }

    /// Parse artifact contents: a JSON array, or one JSON object per line.
    pub fn parse(kind: RecordKind, contents: &str) -> Result<Self, String> {
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Err("artifact is empty".to_string());
        }

        let entries: Vec<TranslationEntry> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed).map_err(|e| e.to_string())?
        } else {
            trimmed
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| {
                    serde_json::from_str(line.trim()).map_err(|e| format!("line {}: {}", i + 1, e))
                })
                .collect::<Result<_, _>>()?
        };

        Self::from_entries(kind, entries)
    }

    /// Load the artifact a previous job wrote.
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn load(kind: RecordKind, path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::Artifact {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let table = Self::parse(kind, &contents).map_err(|message| PipelineError::Artifact {
            path: path.to_path_buf(),
            message,
        })?;

        info!(%kind, entries = table.len(), "loaded translation table");
        Ok(table)
    }

    /// Destination id for a source id, if that record was migrated.
    pub fn lookup(&self, source_id: &str) -> Option<&str> {
        self.entries.get(source_id).map(String::as_str)
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write a job's translation artifact as a JSON array.
///
/// The file is written next to its final location and renamed into place.
pub async fn write_artifact(path: &Path, entries: &[TranslationEntry]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec_pretty(entries)?;
    let tmp_path = temporary_path(path);
    tokio::fs::write(&tmp_path, json).await?;
    tokio::fs::rename(&tmp_path, path).await?;

    debug!(path = %path.display(), entries = entries.len(), "wrote translation artifact");
    Ok(())
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_json_array() {
        let table = TranslationTable::parse(
            RecordKind::User,
            r#"[{"clerk":"user_a","workos":"user_01"},{"clerk":"user_b","workos":"user_02"}]"#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("user_b"), Some("user_02"));
        assert_eq!(table.lookup("user_c"), None);
    }

    #[test]
    fn test_parse_ndjson() {
        let table = TranslationTable::parse(
            RecordKind::Organization,
            "{\"clerk\":\"org_a\",\"workos\":\"org_01\"}\n\n{\"clerk\":\"org_b\",\"workos\":\"org_02\"}\n",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.kind(), RecordKind::Organization);
    }

    #[test]
    fn test_duplicate_entries() {
        let same = vec![
            TranslationEntry::new("user_a", "user_01"),
            TranslationEntry::new("user_a", "user_01"),
        ];
        let table = TranslationTable::from_entries(RecordKind::User, same).unwrap();
        assert_eq!(table.len(), 1);

        let conflicting = vec![
            TranslationEntry::new("user_a", "user_01"),
            TranslationEntry::new("user_a", "user_02"),
        ];
        let err = TranslationTable::from_entries(RecordKind::User, conflicting).unwrap_err();
        assert!(err.contains("user_a"));
    }

    #[test]
    fn test_many_sources_may_share_a_destination() {
        let entries = vec![
            TranslationEntry::new("user_a", "user_01"),
            TranslationEntry::new("user_b", "user_01"),
        ];
        let table = TranslationTable::from_entries(RecordKind::User, entries).unwrap();
        assert_eq!(table.lookup("user_a"), table.lookup("user_b"));
    }

    #[test]
    fn test_malformed_and_empty() {
        assert!(TranslationTable::parse(RecordKind::User, "").is_err());
        assert!(TranslationTable::parse(RecordKind::User, "[{\"clerk\":\"a\"}]").is_err());
        assert!(TranslationTable::parse(RecordKind::User, "{}\n").is_err());
    }

    #[tokio::test]
    async fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/users.json");
        let entries = vec![
            TranslationEntry::new("user_a", "user_01"),
            TranslationEntry::new("user_b", "user_02"),
        ];

        write_artifact(&path, &entries).await.unwrap();
        assert!(!dir.path().join("out/users.json.tmp").exists());

        let table = TranslationTable::load(RecordKind::User, &path).await.unwrap();
        assert_eq!(table.lookup("user_a"), Some("user_01"));
    }

    #[tokio::test]
    async fn test_load_missing_artifact() {
        let result = TranslationTable::load(RecordKind::User, "/nonexistent/users.json").await;
        assert!(matches!(result, Err(PipelineError::Artifact { .. })));
    }
}
