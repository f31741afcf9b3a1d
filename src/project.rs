//! A local project mirroring one org: initialization and config bootstrap.
//!
//! A `Project` starts out in memory and becomes usable through
//! [`Project::initialize`], which takes one of three paths: a brand-new
//! project, a new project created from an existing directory, or a project
//! already on disk. Synchronization operations live in `sync.rs`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{self, Config, DESCRIBE_FILE};
use crate::credentials::{CredentialStore, Credentials, SecretStore, Session};
use crate::error::{SyncError, classify_remote_error, is_authentication_error};
use crate::fs_utils;
use crate::history::{self, HistoryEntry, Outcome};
use crate::local_store::LocalStore;
use crate::metadata_index::IndexSelection;
use crate::package::PackageDescriptor;
use crate::registry::TypeRegistry;
use crate::remote::{Connector, DescribeSnapshot, Indexer, MetadataClient};
use crate::settings::{self, DebugSettings, ProjectSettings};

/// External collaborators a project works through
#[derive(Clone)]
pub struct Services {
    pub connector: Arc<dyn Connector>,
    pub secrets: Arc<dyn SecretStore>,
    pub registry: Arc<dyn TypeRegistry>,
    pub indexer: Arc<dyn Indexer>,
}

/// How the caller identifies the project
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    /// Full project path; takes precedence over `workspace` + `name`
    pub path: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub name: Option<String>,
    /// Existing directory (with `src/package.xml`) a new project is created from
    pub origin: Option<PathBuf>,
    pub credentials: Option<Credentials>,
    /// Metadata types for a new project; empty means the configured default
    pub subscription: Vec<String>,
    /// Explicit package for a new project, instead of a wildcard subscription
    pub package: Option<PackageDescriptor>,
}

pub struct Project {
    pub(crate) path: PathBuf,
    pub(crate) workspace: PathBuf,
    pub(crate) name: String,
    named: bool,
    pub(crate) origin: Option<PathBuf>,
    pub(crate) id: Option<String>,
    pub(crate) config: Config,
    pub(crate) services: Services,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) subscription: Vec<String>,
    pub(crate) settings: Option<ProjectSettings>,
    pub(crate) package: Option<PackageDescriptor>,
    pub(crate) describe: Option<DescribeSnapshot>,
    pub(crate) local_store: LocalStore,
    pub(crate) org_metadata: Option<IndexSelection>,
    pub(crate) client: Option<Arc<dyn MetadataClient>>,
    initialized: bool,
    valid: bool,
    session_listener: Option<JoinHandle<()>>,
}

impl Project {
    /// Resolve where the project lives: `path`, else `workspace`/`name`
    /// (the configured default workspace when only a name is given), else
    /// the current directory.
    pub fn new(options: ProjectOptions, config: Config, services: Services) -> Result<Self> {
        let named = options.path.is_some() || options.name.is_some();

        let path = match (&options.path, &options.name) {
            (Some(path), _) => path.clone(),
            (None, Some(name)) => options
                .workspace
                .clone()
                .unwrap_or_else(|| config.default_workspace())
                .join(name),
            (None, None) => std::env::current_dir().context("Failed to get current directory")?,
        };

        let workspace = match (&options.path, &options.workspace) {
            (None, Some(workspace)) => workspace.clone(),
            _ => path.parent().map(Path::to_path_buf).unwrap_or_else(|| config.default_workspace()),
        };

        let name = options.name.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        Ok(Self {
            path,
            workspace,
            name,
            named,
            origin: options.origin,
            id: None,
            config,
            services,
            credentials: options.credentials,
            subscription: options.subscription,
            settings: None,
            package: options.package,
            describe: None,
            local_store: LocalStore::default(),
            org_metadata: None,
            client: None,
            initialized: false,
            valid: true,
            session_listener: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// False once the server rejected the stored credentials
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn settings(&self) -> Option<&ProjectSettings> {
        self.settings.as_ref()
    }

    pub fn package(&self) -> Option<&PackageDescriptor> {
        self.package.as_ref()
    }

    pub fn describe(&self) -> Option<&DescribeSnapshot> {
        self.describe.as_ref()
    }

    pub fn local_store(&self) -> &LocalStore {
        &self.local_store
    }

    pub fn org_metadata(&self) -> Option<&IndexSelection> {
        self.org_metadata.as_ref()
    }

    pub fn config_dir(&self) -> PathBuf {
        config::get_config_dir(&self.path)
    }

    pub fn source_dir(&self) -> PathBuf {
        config::get_source_dir(&self.path)
    }

    pub(crate) fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(&self.config_dir(), self.services.secrets.clone())
    }

    pub(crate) fn client(&self) -> Result<Arc<dyn MetadataClient>> {
        self.client.clone().ok_or_else(|| SyncError::NotConnected.into())
    }

    pub(crate) fn require_package(&self) -> Result<&PackageDescriptor> {
        self.package.as_ref().ok_or_else(|| SyncError::NotInitialized.into())
    }

    pub(crate) fn assign_id(&mut self) -> String {
        self.id.get_or_insert_with(|| Uuid::new_v4().to_string()).clone()
    }

    /// Initialize the project and return its id.
    ///
    /// `new_project` selects between creating a project (from scratch, or
    /// from `origin` when one was given) and opening one already on disk.
    pub async fn initialize(&mut self, new_project: bool) -> Result<String> {
        let result = match (new_project, self.origin.clone()) {
            (true, None) => self.init_new(),
            (true, Some(origin)) => self.init_from_existing_directory(&origin).await,
            (false, _) => self.open_existing().await,
        };

        let outcome = if result.is_ok() { Outcome::Ok } else { Outcome::Failed };
        history::log_entry(
            &self.path,
            &HistoryEntry::new("init", outcome, vec![format!("new={}", new_project)]),
        );

        result?;
        self.initialized = true;

        let id = self.id.clone().ok_or(SyncError::NotInitialized)?;
        info!(project = %self.name, id = %id, "Project initialized");
        Ok(id)
    }

    /// Brand-new project: nothing on disk yet beyond the workspace
    fn init_new(&mut self) -> Result<()> {
        if !self.named || self.name.trim().is_empty() {
            return Err(SyncError::MissingName.into());
        }
        if !self.credentials.as_ref().is_some_and(|c| !c.username.trim().is_empty()) {
            return Err(SyncError::MissingUsername.into());
        }
        if self.path.exists() {
            return Err(SyncError::DirectoryExists(self.path.clone()).into());
        }

        fs_utils::ensure_dir(&self.workspace)?;
        self.assign_id();
        Ok(())
    }

    async fn init_from_existing_directory(&mut self, origin: &Path) -> Result<()> {
        let source_dir = config::get_source_dir(origin);
        if !source_dir.is_dir() {
            return Err(SyncError::MissingMetadataRoot(origin.to_path_buf()).into());
        }
        if !config::get_manifest_path(origin).is_file() {
            return Err(SyncError::MissingManifest(origin.to_path_buf()).into());
        }
        if !self.credentials.as_ref().is_some_and(|c| !c.username.trim().is_empty()) {
            return Err(SyncError::MissingUsername.into());
        }

        let same_place = match (fs::canonicalize(origin), fs::canonicalize(&self.path)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };

        let copied = if same_place {
            false
        }
        else {
            if self.path.exists() {
                return Err(SyncError::DirectoryExists(self.path.clone()).into());
            }
            if fs_utils::is_within(&self.path, origin)? {
                return Err(SyncError::DestinationInsideOrigin(self.path.clone()).into());
            }
            fs_utils::ensure_dir(&self.workspace)?;
            if let Err(e) = fs_utils::copy_dir_all(origin, &self.path) {
                self.remove_copied_directory();
                return Err(e);
            }
            debug!(from = %origin.display(), to = %self.path.display(), "Copied project directory");
            true
        };

        let result = self.bootstrap_from_directory().await;

        if result.is_err() && copied {
            self.remove_copied_directory();
        }

        result
    }

    fn remove_copied_directory(&self) {
        if !self.path.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove copied project directory");
        }
    }

    async fn bootstrap_from_directory(&mut self) -> Result<()> {
        let client = self.connect(None).await?;
        self.describe = Some(client.describe().await.map_err(classify_remote_error)?);

        let package = PackageDescriptor::from_file(&config::get_manifest_path(&self.path))?;
        self.subscription = package.type_names();

        let staging = tempfile::tempdir().context("Failed to create staging directory")?;
        let result = client
            .retrieve_unpackaged(&package, true, staging.path())
            .await
            .map_err(classify_remote_error)?;
        drop(staging);

        self.package = Some(package);
        self.assign_id();
        self.write_config().await?;
        self.write_local_store(result.file_properties)?;

        Ok(())
    }

    async fn open_existing(&mut self) -> Result<()> {
        let marker = config::settings_path(&self.path);
        if !marker.is_file() {
            return Err(SyncError::NotAProject(marker).into());
        }

        let result = self.load_and_connect().await;

        if let Err(e) = &result {
            if is_authentication_error(e) {
                self.valid = false;
                if let Err(err) = self.credential_store().invalidate_session() {
                    warn!(error = %err, "Failed to invalidate cached session");
                }
                warn!(project = %self.name, "Stored credentials were rejected");
            }
        }

        result
    }

    async fn load_and_connect(&mut self) -> Result<()> {
        let config_dir = self.config_dir();
        let store = self.credential_store();

        self.package = Some(PackageDescriptor::from_file(&config::get_manifest_path(&self.path))?);

        let mut settings = ProjectSettings::load(&config_dir)?;
        if settings.password.is_none() {
            let password = store.password(&settings.id)?;
            settings = settings.with_password(password);
        }

        let session = store.load_session()?;
        if settings.password.is_none() && session.is_none() {
            return Err(SyncError::MissingPassword(settings.id.clone()).into());
        }

        self.id = Some(settings.id.clone());
        self.credentials = Some(settings.credentials());
        self.subscription = settings.subscription.clone();
        self.settings = Some(settings);

        let client = self.connect(session).await?;
        if let Err(e) = store.save_session(&client.session()) {
            warn!(error = %e, "Failed to persist refreshed session");
        }

        self.local_store = LocalStore::load(&config_dir)?;
        self.org_metadata = Some(self.org_metadata_index_with_selections(None, None)?);
        self.refresh_describe().await?;

        let debug_settings = DebugSettings::load(&config_dir)?;
        client
            .subscribe_logs(&debug_settings.users)
            .await
            .context("Failed to subscribe to remote logs")?;

        Ok(())
    }

    /// Connect with the current credentials and start listening for session refreshes
    pub(crate) async fn connect(&mut self, session: Option<Session>) -> Result<Arc<dyn MetadataClient>> {
        let credentials = self.credentials.clone().ok_or(SyncError::MissingUsername)?;

        let client = self
            .services
            .connector
            .connect(&credentials, session)
            .await
            .map_err(classify_remote_error)
            .context("Failed to connect to the server")?;

        self.start_session_listener(client.as_ref());
        self.client = Some(client.clone());
        Ok(client)
    }

    fn start_session_listener(&mut self, client: &dyn MetadataClient) {
        if let Some(previous) = self.session_listener.take() {
            previous.abort();
        }

        let Some(mut refreshes) = client.session_refreshes() else {
            return;
        };

        let config_dir = self.config_dir();
        let store = self.credential_store();

        self.session_listener = Some(tokio::spawn(async move {
            while let Some(session) = refreshes.recv().await {
                if !config_dir.is_dir() {
                    debug!("Session refreshed before the project was written; not cached");
                    continue;
                }
                match store.save_session(&session) {
                    Ok(()) => debug!("Cached refreshed session"),
                    Err(e) => warn!(error = %e, "Failed to cache refreshed session"),
                }
            }
        }));
    }

    /// Write settings, session, debug settings, editor config, describe snapshot,
    /// lightning index and password. Files written before a failing step stay on disk.
    pub(crate) async fn write_config(&mut self) -> Result<()> {
        let config_dir = self.config_dir();
        fs_utils::ensure_dir(&config_dir)?;

        let client = self.client()?;
        let id = self.id.clone().ok_or(SyncError::NotInitialized)?;
        let credentials = self.credentials.clone().ok_or(SyncError::MissingUsername)?;
        let store = self.credential_store();

        let settings = ProjectSettings {
            project_name: self.name.clone(),
            username: credentials.username.clone(),
            id: id.clone(),
            namespace: client.namespace(),
            environment: credentials.environment.clone(),
            login_url: credentials.login_url.clone(),
            workspace: self.workspace.clone(),
            subscription: self.subscription.clone(),
            password: credentials.password.clone(),
        };
        settings.save(&config_dir, !self.config.use_keychain)?;
        self.settings = Some(settings);

        store.save_session(&client.session())?;
        DebugSettings::for_user(client.user_id(), self.config.log_expiration_minutes).save(&config_dir)?;
        settings::write_editor_config(&self.path, &self.name, self.config.editor)?;

        let describe = match self.describe.clone() {
            Some(describe) => describe,
            None => client.describe().await.map_err(classify_remote_error)?,
        };
        fs_utils::write_json(&config_dir.join(DESCRIBE_FILE), &describe)
            .context("Failed to write describe snapshot")?;
        self.describe = Some(describe);

        self.index_lightning().await?;

        if self.config.use_keychain {
            if let Some(password) = &credentials.password {
                store.store_password(&id, password)?;
            }
        }

        debug!(project = %self.name, "Project config written");
        Ok(())
    }

    /// Switch to new credentials: drop the cached session, reconnect, then persist
    /// password, settings and session.
    pub async fn update_credentials(&mut self, credentials: Credentials) -> Result<()> {
        let config_dir = self.config_dir();
        let store = self.credential_store();
        let settings = self.settings.clone().ok_or(SyncError::NotInitialized)?;

        store.invalidate_session()?;
        self.credentials = Some(credentials.clone());

        let client = self.connect(None).await?;

        if self.config.use_keychain {
            if let Some(password) = &credentials.password {
                store.store_password(&settings.id, password)?;
            }
        }

        let settings = settings.with_credentials(&credentials);
        settings.save(&config_dir, !self.config.use_keychain)?;
        self.settings = Some(settings);

        store.save_session(&client.session())?;
        self.valid = true;

        info!(project = %self.name, username = %credentials.username, "Credentials updated");
        Ok(())
    }

    /// Save a settings snapshot with a new subscription
    pub fn update_subscription(&mut self, subscription: Vec<String>) -> Result<()> {
        let settings = self
            .settings
            .clone()
            .ok_or(SyncError::NotInitialized)?
            .with_subscription(subscription.clone());

        settings.save(&self.config_dir(), !self.config.use_keychain)?;
        self.settings = Some(settings);
        self.subscription = subscription;
        Ok(())
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        if let Some(listener) = self.session_listener.take() {
            listener.abort();
        }
    }
}
