//! Synchronization workflows on an initialized project.
//!
//! Every operation takes `&mut self`, so calls on one project are serialized.
//! Nothing here guards against two `Project` values for the same directory.

use anyhow::{Context, Result};
use std::fs;
use tracing::{info, warn};

use crate::archive::{self, ARCHIVE_FILE_NAME};
use crate::config::{self, DESCRIBE_FILE, LIGHTNING_FILE};
use crate::error::{SyncError, classify_remote_error};
use crate::fs_utils;
use crate::history::{self, HistoryEntry, Outcome};
use crate::local_store::{self, LocalStore};
use crate::metadata_index::{IndexSelection, MetadataIndex};
use crate::package::PackageDescriptor;
use crate::project::Project;
use crate::properties::{FileProperties, FileProperty};
use crate::remote::{DeployOptions, DeployResult};
use crate::replace;

/// Lightning indexing errors from orgs without that feature
const LIGHTNING_UNSUPPORTED: &[&str] = &["INVALID_TYPE", "not supported"];

fn normalize(properties: Vec<FileProperties>) -> Vec<FileProperty> {
    properties.into_iter().map(FileProperty::from).collect()
}

impl Project {
    fn record<T>(&self, operation: &str, result: &Result<T>, details: Vec<String>) {
        let outcome = if result.is_ok() { Outcome::Ok } else { Outcome::Failed };
        history::log_entry(&self.path, &HistoryEntry::new(operation, outcome, details));
    }

    /// Create the project directory from a fresh retrieve.
    ///
    /// Fails if the project directory exists. Any failure after the directory
    /// was created removes it again.
    pub async fn retrieve_and_write_to_disk(&mut self) -> Result<()> {
        if self.path.exists() {
            return Err(SyncError::DirectoryExists(self.path.clone()).into());
        }

        let result = self.retrieve_into_new_directory().await;
        self.record("retrieve", &result, vec![format!("types={}", self.subscription.len())]);

        if result.is_err() && self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to roll back project directory");
            }
        }

        result
    }

    async fn retrieve_into_new_directory(&mut self) -> Result<()> {
        if self.subscription.is_empty() {
            self.subscription = self.config.default_subscription.clone();
        }

        let package = match self.package.clone() {
            Some(package) => package,
            None => PackageDescriptor::from_subscription(&self.subscription, &self.config.api_version),
        };

        let client = match self.client.clone() {
            Some(client) => client,
            None => self.connect(None).await?,
        };

        self.describe = Some(client.describe().await.map_err(classify_remote_error)?);

        fs_utils::ensure_dir(&self.path)?;
        fs_utils::ensure_dir(&self.config_dir())?;

        let result = client
            .retrieve_unpackaged(&package, true, &self.path)
            .await
            .map_err(classify_remote_error)?;

        let source_dir = self.source_dir();
        fs::rename(&result.unpackaged_dir, &source_dir).with_context(|| {
            format!(
                "Failed to move {} to {}",
                result.unpackaged_dir.display(),
                source_dir.display()
            )
        })?;

        self.package = Some(package);
        self.assign_id();
        self.write_config().await?;
        self.write_local_store(result.file_properties)?;

        info!(project = %self.name, entries = self.local_store.len(), "Project retrieved");
        Ok(())
    }

    /// Replace the metadata root with a full retrieve of the subscription.
    ///
    /// The metadata root is emptied before files are copied in and is not
    /// restored if a later step fails.
    pub async fn refresh_from_server(&mut self) -> Result<()> {
        let result = self.refresh_source_tree().await;
        self.record("refresh", &result, vec![]);
        result
    }

    async fn refresh_source_tree(&mut self) -> Result<()> {
        let client = self.client()?;
        let package = self.require_package()?.clone();
        let source_dir = self.source_dir();

        let staging = tempfile::tempdir().context("Failed to create staging directory")?;
        let result = client
            .retrieve_unpackaged(&package, true, staging.path())
            .await
            .map_err(classify_remote_error)?;

        fs_utils::empty_directory(&source_dir)?;
        replace::replace_local_files(&result.unpackaged_dir, &source_dir, true)?;
        self.write_local_store(result.file_properties)?;
        self.index_lightning().await?;
        fs_utils::remove_empty_directories(&source_dir)?;

        info!(project = %self.name, entries = self.local_store.len(), "Refreshed from server");
        Ok(())
    }

    /// Refresh, then rebuild the describe snapshot and the org metadata index
    pub async fn clean(&mut self) -> Result<()> {
        let result = self.clean_steps().await;
        self.record("clean", &result, vec![]);
        result
    }

    async fn clean_steps(&mut self) -> Result<()> {
        self.refresh_source_tree().await?;
        self.refresh_describe().await?;
        self.index_metadata().await?;
        Ok(())
    }

    /// Deploy the metadata root and merge any returned file properties into the local store.
    ///
    /// The deploy result is returned as-is, whether or not the merge worked.
    pub async fn compile(&mut self) -> Result<DeployResult> {
        let result = self.deploy_source_tree().await;

        let details = match &result {
            Ok(deploy) => vec![
                format!("success={}", deploy.success),
                format!("failures={}", deploy.details.component_failures.len()),
            ],
            Err(_) => vec![],
        };
        self.record("compile", &result, details);

        result
    }

    async fn deploy_source_tree(&mut self) -> Result<DeployResult> {
        let client = self.client()?;

        let temp_dir = tempfile::tempdir().context("Failed to create archive directory")?;
        let archive_path = temp_dir.path().join(ARCHIVE_FILE_NAME);
        let files = archive::write_deploy_archive(&self.source_dir(), &archive_path, &self.config)?;

        let bytes = fs::read(&archive_path)
            .with_context(|| format!("Failed to read archive: {}", archive_path.display()))?;

        let deploy = client
            .deploy(bytes, DeployOptions::compile())
            .await
            .map_err(classify_remote_error)?;

        if let Some(retrieve) = &deploy.details.retrieve_result {
            if let Err(e) = self.update_local_store(retrieve.file_properties.clone()) {
                let message = format!("{:#}", e);
                warn!(error = %message, "Failed to merge deploy results into local store");
            }
        }

        info!(project = %self.name, files, success = deploy.success, "Compiled");
        Ok(deploy)
    }

    /// Make `package` the project contents: retrieve it, replace the metadata
    /// root with the result and reload the manifest.
    pub async fn edit(&mut self, package: PackageDescriptor) -> Result<()> {
        let types = package.type_names().len();
        let result = self.replace_contents(package).await;
        self.record("edit", &result, vec![format!("types={}", types)]);
        result
    }

    async fn replace_contents(&mut self, package: PackageDescriptor) -> Result<()> {
        let client = self.client()?;
        let source_dir = self.source_dir();

        let staging = tempfile::tempdir().context("Failed to create staging directory")?;
        let result = client
            .retrieve_unpackaged(&package, true, staging.path())
            .await
            .map_err(classify_remote_error)?;

        self.write_local_store(result.file_properties)?;
        fs_utils::empty_directory(&source_dir)?;
        replace::replace_local_files(&result.unpackaged_dir, &source_dir, true)?;

        self.package = Some(PackageDescriptor::from_file(&config::get_manifest_path(&self.path))?);
        fs_utils::remove_empty_directories(&source_dir)?;

        // hashes were taken before the new files landed
        self.local_store.record_hashes(&source_dir)?;
        self.local_store.save(&self.config_dir())?;

        Ok(())
    }

    /// Read the persisted local store
    pub fn get_local_store(&self) -> Result<LocalStore> {
        LocalStore::load(&self.config_dir())
    }

    /// Replace the local store with entries for `properties`
    pub fn write_local_store(&mut self, properties: Vec<FileProperties>) -> Result<()> {
        let source_dir = self.source_dir();
        self.local_store = local_store::write_local_store(
            &self.config_dir(),
            normalize(properties),
            self.services.registry.as_ref(),
            Some(&source_dir),
        )?;
        Ok(())
    }

    /// Merge entries for `properties` into the persisted local store
    pub fn update_local_store(&mut self, properties: Vec<FileProperties>) -> Result<()> {
        let source_dir = self.source_dir();
        self.local_store = local_store::update_local_store(
            &self.config_dir(),
            normalize(properties),
            self.services.registry.as_ref(),
            Some(&source_dir),
        )?;
        Ok(())
    }

    /// Keys of local files changed since they were last synced
    pub fn local_changes(&mut self) -> Result<Vec<String>> {
        let mut store = self.get_local_store()?;
        store.refresh_states(&self.source_dir())?;
        store.save(&self.config_dir())?;

        let dirty = store.dirty_keys();
        self.local_store = store;
        Ok(dirty)
    }

    /// The cached org metadata index with the selections of the project's
    /// package, or of `package` when given
    pub fn org_metadata_index_with_selections(
        &self,
        keyword: Option<&str>,
        package: Option<&PackageDescriptor>,
    ) -> Result<IndexSelection> {
        let package = match package {
            Some(package) => package,
            None => self.require_package()?,
        };

        MetadataIndex::load(&self.config_dir())?
            .with_selections(package, self.services.registry.as_ref(), keyword)
    }

    /// Rebuild config/.org_metadata from the server
    pub async fn index_metadata(&mut self) -> Result<()> {
        let client = self.client()?;
        let subscription = match &self.package {
            Some(package) => package.type_names(),
            None => self.subscription.clone(),
        };

        let nodes = self
            .services
            .indexer
            .index_metadata(client.as_ref(), &subscription)
            .await
            .context("Failed to index org metadata")?;

        MetadataIndex::new(nodes).save(&self.config_dir())?;
        self.org_metadata = Some(self.org_metadata_index_with_selections(None, None)?);
        Ok(())
    }

    /// Rebuild config/.lightning; orgs without the feature are skipped
    pub async fn index_lightning(&self) -> Result<()> {
        let client = self.client()?;

        match self.services.indexer.index_lightning(client.as_ref()).await {
            Ok(index) => fs_utils::write_json(&self.config_dir().join(LIGHTNING_FILE), &index)
                .context("Failed to write lightning index"),
            Err(e) => {
                let message = format!("{:#}", e);
                if LIGHTNING_UNSUPPORTED.iter().any(|s| message.contains(s)) {
                    warn!(error = %message, "Lightning indexing not supported by this org; skipped");
                    Ok(())
                }
                else {
                    Err(e.context("Failed to index lightning bundles"))
                }
            }
        }
    }

    /// Fetch and persist a fresh describe snapshot
    pub async fn refresh_describe(&mut self) -> Result<()> {
        let client = self.client()?;
        let describe = client.describe().await.map_err(classify_remote_error)?;

        fs_utils::write_json(&self.config_dir().join(DESCRIBE_FILE), &describe)
            .context("Failed to write describe snapshot")?;
        self.describe = Some(describe);
        Ok(())
    }
}
