use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use drivefs_core::{Change, RawFileResource, RemoteFileRecord};

use crate::error::SyncError;

/// Account-level metadata needed before the first listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Id of the folder that becomes `/`.
    pub root_folder_id: String,
    /// Newest change id at the time of the call.
    #[serde(default, deserialize_with = "deserialize_opt_u64")]
    pub largest_change_id: Option<u64>,
}

/// One page of the full file listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    #[serde(default)]
    pub items: Vec<RawFileResource>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One entry of the change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    #[serde(rename = "id", deserialize_with = "deserialize_u64")]
    pub change_id: u64,
    pub file_id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub file: Option<RawFileResource>,
}

impl ChangeRecord {
    /// Translate into a snapshot change. Deleted entries, entries without a
    /// file body, and trashed files (unless kept) become removals.
    pub fn into_change(self, include_trashed: bool) -> Change {
        match self.file {
            Some(file) if !self.deleted && (include_trashed || !file.is_trashed()) => {
                Change::Upsert(RemoteFileRecord::from_raw(file))
            }
            _ => Change::Remove(self.file_id),
        }
    }
}

/// One page of the change feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePage {
    #[serde(default)]
    pub items: Vec<ChangeRecord>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_u64")]
    pub largest_change_id: Option<u64>,
}

/// Read-only access to a remote account's metadata.
///
/// Implementations page through results; callers pass back the token from
/// the previous page until none is returned.
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
    /// Root folder id and the newest change id.
    async fn about(&self) -> Result<AccountInfo, SyncError>;

    /// One page of the full listing.
    async fn list_files(&self, page_token: Option<&str>) -> Result<FilePage, SyncError>;

    /// One page of changes starting at `start_change_id` (inclusive).
    async fn list_changes(
        &self,
        start_change_id: u64,
        page_token: Option<&str>,
    ) -> Result<ChangePage, SyncError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "remote"
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Int64Repr {
    Number(u64),
    Text(String),
}

impl Int64Repr {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Int64Repr::Number(n) => Ok(n),
            Int64Repr::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid integer string: {:?}", s))),
        }
    }
}

// The remote encodes 64-bit integers as JSON strings.
fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Int64Repr::deserialize(deserializer)?.into_u64()
}

fn deserialize_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Int64Repr>::deserialize(deserializer)? {
        Some(repr) => repr.into_u64().map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_about_string_change_id() {
        let about: AccountInfo =
            serde_json::from_str(r#"{"rootFolderId": "0AabC", "largestChangeId": "4521"}"#)
                .unwrap();
        assert_eq!(about.root_folder_id, "0AabC");
        assert_eq!(about.largest_change_id, Some(4521));

        let about: AccountInfo = serde_json::from_str(r#"{"rootFolderId": "r"}"#).unwrap();
        assert_eq!(about.largest_change_id, None);
    }

    #[test]
    fn test_file_page_decoding() {
        let page: FilePage = serde_json::from_str(
            r#"{"items": [{"id": "a", "title": "Docs",
                "mimeType": "application/vnd.google-apps.folder",
                "parents": [{"id": "r", "isRoot": true}]}],
               "nextPageToken": "p2"}"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].is_folder());
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));

        let last: FilePage = serde_json::from_str("{}").unwrap();
        assert!(last.items.is_empty());
        assert!(last.next_page_token.is_none());
    }

    #[test]
    fn test_change_translation() {
        let page: ChangePage = serde_json::from_str(
            r#"{"items": [
                 {"id": "10", "fileId": "a", "deleted": true},
                 {"id": "11", "fileId": "b", "file": {"id": "b", "title": "x",
                   "labels": {"trashed": true}, "parents": [{"id": "r"}]}},
                 {"id": "12", "fileId": "c", "file": {"id": "c", "title": "y",
                   "parents": [{"id": "r"}]}}
               ],
               "largestChangeId": "12"}"#,
        )
        .unwrap();
        assert_eq!(page.largest_change_id, Some(12));

        let changes: Vec<Change> = page
            .items
            .iter()
            .cloned()
            .map(|c| c.into_change(false))
            .collect();
        assert_eq!(changes[0], Change::Remove("a".to_string()));
        assert_eq!(changes[1], Change::Remove("b".to_string()));
        assert!(matches!(&changes[2], Change::Upsert(r) if r.id() == "c"));

        let kept = page.items[1].clone().into_change(true);
        assert!(matches!(kept, Change::Upsert(r) if r.display_name() == "x"));
    }

    #[test]
    fn test_bad_change_id_rejected() {
        let result: Result<ChangeRecord, _> =
            serde_json::from_str(r#"{"id": "ten", "fileId": "a"}"#);
        assert!(result.is_err());
    }
}
