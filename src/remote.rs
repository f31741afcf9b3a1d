//! Seams to the remote platform.
//!
//! The network client, the connector that authenticates it and the indexing
//! services live outside this crate; the synchronizer only talks to these traits.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::credentials::{Credentials, Session};
use crate::metadata_index::IndexNode;
use crate::package::PackageDescriptor;
use crate::properties::FileProperties;

/// Schema description of the org, stored as-is in config/.describe
pub type DescribeSnapshot = serde_json::Value;

/// Output of an unpackaged retrieve
#[derive(Debug, Clone)]
pub struct RetrieveResult {
    /// Directory the server output was unpacked into (`<dest>/unpackaged`)
    pub unpackaged_dir: PathBuf,
    pub file_properties: Vec<FileProperties>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOptions {
    pub rollback_on_error: bool,
    pub perform_retrieve: bool,
    pub single_package: bool,
    pub check_only: bool,
}

impl DeployOptions {
    /// Options used when compiling the project
    pub fn compile() -> Self {
        Self {
            rollback_on_error: true,
            perform_retrieve: true,
            single_package: true,
            check_only: false,
        }
    }
}

/// One component line of a deploy response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMessage {
    #[serde(default)]
    pub component_type: Option<String>,
    pub full_name: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub problem: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub column_number: Option<u32>,
    pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRetrieveResult {
    #[serde(default)]
    pub file_properties: Vec<FileProperties>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployDetails {
    #[serde(default)]
    pub component_failures: Vec<ComponentMessage>,
    #[serde(default)]
    pub component_successes: Vec<ComponentMessage>,
    #[serde(default)]
    pub retrieve_result: Option<DeployRetrieveResult>,
}

/// Raw deploy response handed back to the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub details: DeployDetails,
}

/// Authenticated client for one org connection
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn describe(&self) -> Result<DescribeSnapshot>;

    /// Retrieve the package into `dest`; the server output lands in `dest/unpackaged`
    async fn retrieve_unpackaged(
        &self,
        package: &PackageDescriptor,
        single_package: bool,
        dest: &Path,
    ) -> Result<RetrieveResult>;

    async fn deploy(&self, archive: Vec<u8>, options: DeployOptions) -> Result<DeployResult>;

    /// Session currently in use
    fn session(&self) -> Session;

    fn user_id(&self) -> Option<String>;

    fn namespace(&self) -> Option<String>;

    /// Refreshed sessions are pushed here; only the first call gets the receiver
    fn session_refreshes(&self) -> Option<mpsc::UnboundedReceiver<Session>>;

    /// Start streaming debug logs for the given users
    async fn subscribe_logs(&self, user_ids: &[String]) -> Result<()>;
}

/// Produces authenticated clients
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect, reusing `session` when it is still valid
    async fn connect(
        &self,
        credentials: &Credentials,
        session: Option<Session>,
    ) -> Result<Arc<dyn MetadataClient>>;
}

/// Builds the derived indexes kept in the config directory
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Snapshot of UI bundle metadata for config/.lightning
    async fn index_lightning(&self, client: &dyn MetadataClient) -> Result<serde_json::Value>;

    /// Server-wide metadata tree for the subscribed types
    async fn index_metadata(
        &self,
        client: &dyn MetadataClient,
        subscription: &[String],
    ) -> Result<Vec<IndexNode>>;
}
