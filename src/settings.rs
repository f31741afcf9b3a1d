use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{DEBUG_FILE, Editor, SETTINGS_FILE};
use crate::credentials::Credentials;
use crate::fs_utils;

/// Project settings persisted in config/.settings.
///
/// A loaded value is a snapshot: changes go through the `with_*` builders and
/// an explicit `save`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub project_name: String,
    pub username: String,
    pub id: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub environment: String,
    #[serde(default)]
    pub login_url: Option<String>,
    pub workspace: PathBuf,
    #[serde(default)]
    pub subscription: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProjectSettings {
    /// Load settings from a project config directory
    pub fn load(config_dir: &Path) -> Result<Self> {
        fs_utils::read_json(&config_dir.join(SETTINGS_FILE))
            .context("Failed to load project settings")
    }

    /// Save settings; the password is only written when `inline_password` is set
    pub fn save(&self, config_dir: &Path, inline_password: bool) -> Result<()> {
        let mut on_disk = self.clone();
        if !inline_password {
            on_disk.password = None;
        }

        fs_utils::write_json(&config_dir.join(SETTINGS_FILE), &on_disk)
            .context("Failed to save project settings")
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            environment: self.environment.clone(),
            login_url: self.login_url.clone(),
        }
    }

    pub fn with_password(self, password: Option<String>) -> Self {
        Self { password, ..self }
    }

    pub fn with_subscription(self, subscription: Vec<String>) -> Self {
        Self { subscription, ..self }
    }

    pub fn with_credentials(self, credentials: &Credentials) -> Self {
        Self {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            environment: credentials.environment.clone(),
            login_url: credentials.login_url.clone(),
            ..self
        }
    }
}

/// Log tracing preferences persisted in config/.debug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugSettings {
    /// User ids whose logs are subscribed to
    #[serde(default)]
    pub users: Vec<String>,
    /// Trace level per log category
    #[serde(default = "default_levels")]
    pub levels: BTreeMap<String, String>,
    /// Minutes until trace flags expire
    #[serde(default = "default_expiration")]
    pub expiration: u32,
}

fn default_expiration() -> u32 { 480 }

fn default_levels() -> BTreeMap<String, String> {
    [
        ("Apex_code", "DEBUG"),
        ("Apex_profiling", "INFO"),
        ("Callout", "INFO"),
        ("Db", "INFO"),
        ("System", "DEBUG"),
        ("Validation", "INFO"),
        ("Visualforce", "INFO"),
        ("Workflow", "INFO"),
    ]
    .iter()
    .map(|(category, level)| (category.to_string(), level.to_string()))
    .collect()
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            levels: default_levels(),
            expiration: default_expiration(),
        }
    }
}

impl DebugSettings {
    pub fn for_user(user_id: Option<String>, expiration: u32) -> Self {
        Self {
            users: user_id.into_iter().collect(),
            expiration,
            ..Default::default()
        }
    }

    /// Load debug settings, defaulting when the file is absent
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(DEBUG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        fs_utils::read_json(&path).context("Failed to load debug settings")
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        fs_utils::write_json(&config_dir.join(DEBUG_FILE), self)
            .context("Failed to save debug settings")
    }
}

/// Path of the editor project file, if the editor has one
pub fn editor_config_path(project_root: &Path, project_name: &str, editor: Editor) -> Option<PathBuf> {
    match editor {
        Editor::Sublime => Some(project_root.join(format!("{}.sublime-project", project_name))),
        Editor::Vscode => Some(project_root.join(".vscode").join("settings.json")),
        Editor::None => None,
    }
}

/// Write the editor project file at the project root
pub fn write_editor_config(project_root: &Path, project_name: &str, editor: Editor) -> Result<()> {
    let Some(path) = editor_config_path(project_root, project_name, editor) else {
        return Ok(());
    };

    let content = match editor {
        Editor::Sublime => json!({
            "folders": [{ "path": "." }],
            "settings": {
                "auto_complete_triggers": [
                    { "characters": ".", "selector": "source - comment" }
                ]
            }
        }),
        Editor::Vscode => json!({
            "files.exclude": {
                "config/.session": true,
                "config/.local_store": true
            },
            "files.associations": {
                "*.cls": "apex",
                "*.trigger": "apex"
            }
        }),
        Editor::None => return Ok(()),
    };

    fs_utils::write_json(&path, &content)
        .with_context(|| format!("Failed to write editor config: {}", path.display()))
}
