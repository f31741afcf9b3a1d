mod archive;
mod cli;
mod config;
mod credentials;
mod error;
mod file_hash;
mod fs_utils;
mod history;
mod local_store;
mod logging;
mod metadata_index;
mod package;
mod project;
mod properties;
mod registry;
mod remote;
mod replace;
mod settings;
mod sync;

#[cfg(test)]
mod test_support;

// Re-export public APIs
pub use cli::{Cli, Commands};
pub use config::{
    Config, Editor, find_project_root, global_config_path, get_config_dir, get_manifest_path,
    get_source_dir, settings_path, CONFIG_FILENAME,
};
pub use credentials::{CredentialStore, Credentials, SecretStore, Session, password_key};
pub use error::{SyncError, classify_remote_error, is_auth_failure, is_authentication_error};
pub use history::{HistoryEntry, Outcome, filter_by_operation, log_entry, read_history, take_last};
pub use local_store::{LocalStore, LocalStoreEntry, SyncState, update_local_store, write_local_store};
pub use logging::init_logging;
pub use metadata_index::{IndexNode, IndexSelection, MetadataIndex};
pub use package::{Members, PackageDescriptor, PACKAGE_FILE_NAME, WILDCARD};
pub use project::{Project, ProjectOptions, Services};
pub use properties::{FileProperties, FileProperty, QueriedRecord, RetrievedProperties};
pub use registry::{BuiltinRegistry, MetadataType, TypeRegistry};
pub use remote::{
    ComponentMessage, Connector, DeployDetails, DeployOptions, DeployResult, DescribeSnapshot,
    Indexer, MetadataClient, RetrieveResult,
};
pub use replace::{ReplaceStats, replace_local_files};
pub use settings::{DebugSettings, ProjectSettings};
