mod error;
pub mod path;
mod record;
mod resolver;
mod snapshot;
mod store;

pub use error::CoreError;
pub use path::{escape_name, normalize_path, unescape_name, ROOT_PATH};
pub use record::{
    parse_timestamp, FileLabels, ParentReference, RawFileResource, RemoteFileRecord,
    TimestampField, FOLDER_MIME_TYPE, FOLDER_SIZE,
};
pub use resolver::{NamespaceResolver, RebuildSummary, ResolverStats};
pub use snapshot::{Change, Snapshot, SnapshotCell};
pub use store::MetadataStore;
