//! Remote file records.
//!
//! [`RawFileResource`] is the wire shape of one object returned by the remote
//! listing API. [`RemoteFileRecord`] is the validated, immutable snapshot the
//! rest of the crate works with.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::path::escape_name;

/// Type tag marking a folder.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Size reported for folders; the remote API has no folder size.
pub const FOLDER_SIZE: u64 = 4096;

/// Reference to one parent of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_root: Option<bool>,
}

impl ParentReference {
    pub fn new(id: impl Into<String>) -> Self {
        ParentReference {
            id: id.into(),
            is_root: None,
        }
    }
}

/// Label flags attached to a remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLabels {
    #[serde(default)]
    pub trashed: bool,
}

/// One remote object as returned by the listing API.
///
/// Only `id` is required; everything else is optional in the source data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFileResource {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub parents: Vec<ParentReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_viewed_by_me_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<FileLabels>,
}

/// The API encodes 64-bit sizes as decimal strings; accept both forms.
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Size>::deserialize(deserializer)? {
        Some(Size::Number(n)) => Some(n),
        Some(Size::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// The three timestamps carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampField {
    Accessed,
    Modified,
    Created,
}

impl TimestampField {
    /// Name of the raw field this timestamp is read from.
    pub fn field_name(&self) -> &'static str {
        match self {
            TimestampField::Accessed => "lastViewedByMeDate",
            TimestampField::Modified => "modifiedDate",
            TimestampField::Created => "createdDate",
        }
    }
}

impl RawFileResource {
    /// Parse a single resource from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }

    pub fn is_trashed(&self) -> bool {
        self.labels.as_ref().map(|l| l.trashed).unwrap_or(false)
    }

    fn raw_timestamp(&self, field: TimestampField) -> Option<&str> {
        match field {
            TimestampField::Accessed => self.last_viewed_by_me_date.as_deref(),
            TimestampField::Modified => self.modified_date.as_deref(),
            TimestampField::Created => self.created_date.as_deref(),
        }
    }

    /// Read and parse one timestamp; `None` if absent or unparsable.
    pub fn timestamp(&self, field: TimestampField) -> Option<DateTime<Utc>> {
        let raw = self.raw_timestamp(field)?;
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            warn!(
                id = %self.id,
                field = field.field_name(),
                value = raw,
                "unparsable timestamp, using current time"
            );
        }
        parsed
    }
}

/// Parse an ISO-8601 timestamp such as `2013-01-05T10:20:30.123Z`.
///
/// Offsets other than `Z` are honoured; a value without any offset is taken
/// as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Immutable metadata snapshot of one remote file or folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRecord {
    id: String,
    display_name: String,
    escaped_name: String,
    is_folder: bool,
    parent_ids: Vec<String>,
    size_bytes: u64,
    access_time: DateTime<Utc>,
    modify_time: DateTime<Utc>,
    create_time: DateTime<Utc>,
}

impl RemoteFileRecord {
    /// Build a record from raw API data, using the current time for any
    /// missing timestamp.
    pub fn from_raw(raw: RawFileResource) -> Self {
        Self::from_raw_at(raw, Utc::now())
    }

    /// Build a record from raw API data with an explicit fallback time.
    pub fn from_raw_at(raw: RawFileResource, now: DateTime<Utc>) -> Self {
        let is_folder = raw.is_folder();
        let access_time = raw.timestamp(TimestampField::Accessed).unwrap_or(now);
        let modify_time = raw.timestamp(TimestampField::Modified).unwrap_or(now);
        let create_time = raw.timestamp(TimestampField::Created).unwrap_or(now);

        let display_name = match raw.title {
            Some(title) if !title.is_empty() => title,
            _ => raw.id.clone(),
        };

        let mut parent_ids: Vec<String> = Vec::with_capacity(raw.parents.len());
        for parent in raw.parents {
            if !parent_ids.contains(&parent.id) {
                parent_ids.push(parent.id);
            }
        }

        let size_bytes = if is_folder {
            FOLDER_SIZE
        } else {
            raw.file_size.unwrap_or(0)
        };

        RemoteFileRecord {
            escaped_name: escape_name(&display_name),
            id: raw.id,
            display_name,
            is_folder,
            parent_ids,
            size_bytes,
            access_time,
            modify_time,
            create_time,
        }
    }

    /// The account root: a parentless folder known only by its id.
    pub fn root(id: impl Into<String>) -> Self {
        Self::from_raw(RawFileResource {
            id: id.into(),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            ..Default::default()
        })
    }

    /// Convenience constructor for a folder.
    pub fn folder(id: &str, name: &str, parents: &[&str]) -> Self {
        Self::from_raw(RawFileResource {
            id: id.to_string(),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            title: Some(name.to_string()),
            parents: parents.iter().map(|p| ParentReference::new(*p)).collect(),
            ..Default::default()
        })
    }

    /// Convenience constructor for a regular file.
    pub fn file(id: &str, name: &str, parents: &[&str], size: u64) -> Self {
        Self::from_raw(RawFileResource {
            id: id.to_string(),
            mime_type: Some("application/octet-stream".to_string()),
            title: Some(name.to_string()),
            file_size: Some(size),
            parents: parents.iter().map(|p| ParentReference::new(*p)).collect(),
            ..Default::default()
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Display name escaped for use as a single path segment.
    pub fn escaped_name(&self) -> &str {
        &self.escaped_name
    }

    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    pub fn parent_ids(&self) -> &[String] {
        &self.parent_ids
    }

    /// Number of parents; used for the hard-link count.
    pub fn parent_count(&self) -> usize {
        self.parent_ids.len()
    }

    pub fn has_parent(&self, id: &str) -> bool {
        self.parent_ids.iter().any(|p| p == id)
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn access_time(&self) -> DateTime<Utc> {
        self.access_time
    }

    pub fn modify_time(&self) -> DateTime<Utc> {
        self.modify_time
    }

    pub fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }
}

impl fmt::Display for RemoteFileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.display_name,
            self.id,
            if self.is_folder { "folder" } else { "file" }
        )
    }
}
