//! In-memory stand-ins for the remote collaborators, used by unit tests.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::credentials::{Credentials, SecretStore, Session};
use crate::metadata_index::IndexNode;
use crate::package::{PACKAGE_FILE_NAME, PackageDescriptor};
use crate::project::Services;
use crate::properties::{FileProperties, RetrievedProperties};
use crate::registry::BuiltinRegistry;
use crate::remote::{
    Connector, DeployDetails, DeployOptions, DeployResult, DeployRetrieveResult,
    DescribeSnapshot, Indexer, MetadataClient, RetrieveResult,
};

#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
    replaced: Mutex<usize>,
}

impl MemorySecretStore {
    pub fn replace_count(&self) -> usize {
        *self.replaced.lock().unwrap()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.secrets.lock().unwrap().get(id).cloned())
    }

    fn store(&self, id: &str, secret: &str) -> Result<()> {
        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(id) {
            bail!("secret already exists: {}", id);
        }
        secrets.insert(id.to_string(), secret.to_string());
        Ok(())
    }

    fn replace(&self, id: &str, secret: &str) -> Result<()> {
        *self.replaced.lock().unwrap() += 1;
        self.secrets.lock().unwrap().insert(id.to_string(), secret.to_string());
        Ok(())
    }
}

/// A member the fake org holds
#[derive(Debug, Clone)]
pub struct FakeMember {
    pub type_name: String,
    pub full_name: String,
    pub file_name: String,
    pub content: String,
}

impl FakeMember {
    pub fn new(type_name: &str, full_name: &str, file_name: &str, content: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            full_name: full_name.to_string(),
            file_name: file_name.to_string(),
            content: content.to_string(),
        }
    }

    fn properties(&self) -> FileProperties {
        FileProperties::Retrieved(RetrievedProperties {
            id: format!("id-{}", self.full_name),
            full_name: self.full_name.clone(),
            file_name: format!("unpackaged/{}", self.file_name),
            type_name: self.type_name.clone(),
            last_modified_by_name: Some("Server User".to_string()),
            last_modified_date: Some("2024-01-01T00:00:00.000Z".to_string()),
            ..Default::default()
        })
    }
}

/// Fake org connection with programmable failures
pub struct FakeClient {
    pub members: Mutex<Vec<FakeMember>>,
    pub retrieve_error: Mutex<Option<String>>,
    pub describe_error: Mutex<Option<String>>,
    pub deploy_success: Mutex<bool>,
    pub retrieves: Mutex<Vec<PackageDescriptor>>,
    pub deployed_bytes: Mutex<Vec<usize>>,
    pub log_subscriptions: Mutex<Vec<Vec<String>>>,
    session: Session,
    refresh_tx: mpsc::UnboundedSender<Session>,
    refresh_rx: Mutex<Option<mpsc::UnboundedReceiver<Session>>>,
}

impl FakeClient {
    pub fn new(members: Vec<FakeMember>) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        Self {
            members: Mutex::new(members),
            retrieve_error: Mutex::new(None),
            describe_error: Mutex::new(None),
            deploy_success: Mutex::new(true),
            retrieves: Mutex::new(Vec::new()),
            deployed_bytes: Mutex::new(Vec::new()),
            log_subscriptions: Mutex::new(Vec::new()),
            session: Session {
                access_token: "00D!fake-token".to_string(),
                instance_url: "https://fake.example.com".to_string(),
            },
            refresh_tx,
            refresh_rx: Mutex::new(Some(refresh_rx)),
        }
    }

    pub fn fail_retrieve(&self, message: &str) {
        *self.retrieve_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_members(&self, members: Vec<FakeMember>) {
        *self.members.lock().unwrap() = members;
    }

    /// Push a refreshed session to whoever holds the receiver
    pub fn refresh_session(&self, session: Session) {
        let _ = self.refresh_tx.send(session);
    }

    fn subscribed(&self, package: &PackageDescriptor) -> Vec<FakeMember> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .filter(|m| package.get(&m.type_name).is_some_and(|members| members.contains(&m.full_name)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetadataClient for FakeClient {
    async fn describe(&self) -> Result<DescribeSnapshot> {
        if let Some(message) = self.describe_error.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }
        Ok(json!({ "sobjects": [{ "name": "Account" }, { "name": "Contact" }] }))
    }

    async fn retrieve_unpackaged(
        &self,
        package: &PackageDescriptor,
        _single_package: bool,
        dest: &Path,
    ) -> Result<RetrieveResult> {
        self.retrieves.lock().unwrap().push(package.clone());

        if let Some(message) = self.retrieve_error.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }

        let unpackaged_dir = dest.join("unpackaged");
        fs::create_dir_all(&unpackaged_dir)?;
        package.write(&unpackaged_dir.join(PACKAGE_FILE_NAME))?;

        let mut file_properties = vec![FileProperties::Retrieved(RetrievedProperties {
            full_name: PACKAGE_FILE_NAME.to_string(),
            file_name: format!("unpackaged/{}", PACKAGE_FILE_NAME),
            type_name: "Package".to_string(),
            ..Default::default()
        })];

        for member in self.subscribed(package) {
            let path = unpackaged_dir.join(&member.file_name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &member.content)?;
            file_properties.push(member.properties());
        }

        Ok(RetrieveResult { unpackaged_dir, file_properties })
    }

    async fn deploy(&self, archive: Vec<u8>, options: DeployOptions) -> Result<DeployResult> {
        self.deployed_bytes.lock().unwrap().push(archive.len());
        let success = *self.deploy_success.lock().unwrap();

        let retrieve_result = if options.perform_retrieve && success {
            let members = self.members.lock().unwrap().clone();
            Some(DeployRetrieveResult {
                file_properties: members.iter().map(FakeMember::properties).collect(),
            })
        }
        else {
            None
        };

        Ok(DeployResult {
            id: "0Af000000000001".to_string(),
            success,
            details: DeployDetails {
                component_failures: Vec::new(),
                component_successes: Vec::new(),
                retrieve_result,
            },
        })
    }

    fn session(&self) -> Session {
        self.session.clone()
    }

    fn user_id(&self) -> Option<String> {
        Some("005000000000001".to_string())
    }

    fn namespace(&self) -> Option<String> {
        None
    }

    fn session_refreshes(&self) -> Option<mpsc::UnboundedReceiver<Session>> {
        self.refresh_rx.lock().unwrap().take()
    }

    async fn subscribe_logs(&self, user_ids: &[String]) -> Result<()> {
        self.log_subscriptions.lock().unwrap().push(user_ids.to_vec());
        Ok(())
    }
}

pub struct FakeConnector {
    pub client: Arc<FakeClient>,
    pub connect_error: Mutex<Option<String>>,
    pub sessions_offered: Mutex<Vec<Option<Session>>>,
}

impl FakeConnector {
    pub fn new(client: Arc<FakeClient>) -> Self {
        Self {
            client,
            connect_error: Mutex::new(None),
            sessions_offered: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_with(&self, message: &str) {
        *self.connect_error.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _credentials: &Credentials,
        session: Option<Session>,
    ) -> Result<Arc<dyn MetadataClient>> {
        self.sessions_offered.lock().unwrap().push(session);

        if let Some(message) = self.connect_error.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }
        let client: Arc<dyn MetadataClient> = self.client.clone();
        Ok(client)
    }
}

#[derive(Default)]
pub struct FakeIndexer {
    pub nodes: Vec<IndexNode>,
    pub lightning_error: Option<String>,
}

#[async_trait]
impl Indexer for FakeIndexer {
    async fn index_lightning(&self, _client: &dyn MetadataClient) -> Result<serde_json::Value> {
        match &self.lightning_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(json!([])),
        }
    }

    async fn index_metadata(
        &self,
        _client: &dyn MetadataClient,
        _subscription: &[String],
    ) -> Result<Vec<IndexNode>> {
        Ok(self.nodes.clone())
    }
}

/// Wired-up fakes shared between a test and the project under test
pub struct Harness {
    pub client: Arc<FakeClient>,
    pub connector: Arc<FakeConnector>,
    pub secrets: Arc<MemorySecretStore>,
}

impl Harness {
    pub fn new(members: Vec<FakeMember>) -> Self {
        let client = Arc::new(FakeClient::new(members));
        Self {
            connector: Arc::new(FakeConnector::new(client.clone())),
            client,
            secrets: Arc::new(MemorySecretStore::default()),
        }
    }

    pub fn services(&self) -> Services {
        self.services_with_indexer(FakeIndexer::default())
    }

    pub fn services_with_indexer(&self, indexer: FakeIndexer) -> Services {
        Services {
            connector: self.connector.clone(),
            secrets: self.secrets.clone(),
            registry: Arc::new(BuiltinRegistry::standard()),
            indexer: Arc::new(indexer),
        }
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        username: "dev@example.com".to_string(),
        password: Some("hunter2".to_string()),
        environment: "sandbox".to_string(),
        login_url: None,
    }
}

pub fn sample_members() -> Vec<FakeMember> {
    vec![
        FakeMember::new("ApexClass", "Foo", "classes/Foo.cls", "public class Foo {}"),
        FakeMember::new("ApexClass", "Bar", "classes/Bar.cls", "public class Bar {}"),
        FakeMember::new("ApexPage", "Home", "pages/Home.page", "<apex:page/>"),
    ]
}

/// Lay out an on-disk project directory (src/ with a manifest) outside any workspace
pub fn write_external_project(root: &Path, package: &PackageDescriptor, files: &[(&str, &str)]) -> PathBuf {
    let source_root = root.join("src");
    fs::create_dir_all(&source_root).unwrap();
    package.write(&source_root.join(PACKAGE_FILE_NAME)).unwrap();

    for (file_name, content) in files {
        let path = source_root.join(file_name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    root.to_path_buf()
}
