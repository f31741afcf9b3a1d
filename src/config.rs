use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = ".orgsync.toml";
pub const PROJECT_CONFIG_DIR: &str = "config";
pub const SOURCE_DIR: &str = "src";
pub const SETTINGS_FILE: &str = ".settings";
pub const SESSION_FILE: &str = ".session";
pub const DEBUG_FILE: &str = ".debug";
pub const LOCAL_STORE_FILE: &str = ".local_store";
pub const DESCRIBE_FILE: &str = ".describe";
pub const ORG_METADATA_FILE: &str = ".org_metadata";
pub const LIGHTNING_FILE: &str = ".lightning";
pub const HISTORY_FILE: &str = ".history";

const DEFAULT_WORKSPACE_DIR: &str = "orgsync-workspace";

/// Editor whose project file is written at the project root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Editor {
    #[default]
    Sublime,
    Vscode,
    None,
}

/// Tool configuration loaded from .orgsync.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directories; the first one is the default for new projects
    #[serde(default)]
    pub workspaces: Vec<PathBuf>,

    /// Metadata API version written into generated manifests
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Types subscribed when a new project does not name any
    #[serde(default = "default_subscription")]
    pub default_subscription: Vec<String>,

    /// Editor project file to generate
    #[serde(default)]
    pub editor: Editor,

    /// Keep passwords in the secret store instead of .settings
    #[serde(default = "default_use_keychain")]
    pub use_keychain: bool,

    /// Paths/patterns left out of the compile archive
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// Expiration written to new debug settings
    #[serde(default = "default_log_expiration")]
    pub log_expiration_minutes: u32,
}

fn default_api_version() -> String { "58.0".to_string() }
fn default_use_keychain() -> bool { true }
fn default_log_expiration() -> u32 { 480 }

fn default_subscription() -> Vec<String> {
    ["ApexClass", "ApexComponent", "ApexPage", "ApexTrigger", "StaticResource"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ignore() -> Vec<String> {
    vec![".DS_Store".to_string(), "*.swp".to_string(), "*~".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspaces: Vec::new(),
            api_version: default_api_version(),
            default_subscription: default_subscription(),
            editor: Editor::default(),
            use_keychain: default_use_keychain(),
            ignore: default_ignore(),
            log_expiration_minutes: default_log_expiration(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!(
                "Configuration file not found: {}\n\
                 Create a {} file or run without one to use the defaults.",
                config_path.display(),
                CONFIG_FILENAME
            );
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        }
        else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_version.trim().is_empty() {
            bail!("Configuration error: 'api_version' is empty");
        }
        if self.api_version.parse::<f32>().is_err() {
            bail!(
                "Configuration error: 'api_version' must look like \"58.0\", got '{}'",
                self.api_version
            );
        }

        if self.default_subscription.is_empty() {
            bail!("Configuration error: 'default_subscription' must name at least one metadata type");
        }

        for workspace in &self.workspaces {
            if workspace.as_os_str().is_empty() {
                bail!("Configuration error: empty path in 'workspaces' list");
            }
        }

        Ok(())
    }

    /// Workspace used when a new project does not name one
    pub fn default_workspace(&self) -> PathBuf {
        if let Some(first) = self.workspaces.first() {
            return first.clone();
        }

        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_WORKSPACE_DIR)
    }

    /// Check if a path relative to the metadata root is left out of archives
    pub fn should_ignore(&self, relative_path: &Path) -> bool {
        let path_str = relative_path.to_string_lossy();

        for pattern in &self.ignore {
            if let Ok(glob_pattern) = glob::Pattern::new(pattern) {
                if glob_pattern.matches(&path_str) {
                    return true;
                }
            }

            if path_str.starts_with(pattern.as_str()) {
                return true;
            }

            for component in relative_path.components() {
                if let std::path::Component::Normal(c) = component {
                    let name = c.to_string_lossy();
                    if name == *pattern {
                        return true;
                    }
                    if let Ok(glob_pattern) = glob::Pattern::new(pattern) {
                        if glob_pattern.matches(&name) {
                            return true;
                        }
                    }
                }
            }
        }

        false
    }
}

/// Path of the tool configuration in the user's home directory
pub fn global_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILENAME)
}

/// Find the project root by looking for config/.settings
pub fn find_project_root() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()
        .context("Failed to get current directory")?;

    let mut dir = current_dir.as_path();

    loop {
        if settings_path(dir).exists() {
            return Ok(dir.to_path_buf());
        }

        match dir.parent() {
            Some(parent) => dir = parent,
            None => bail!(
                "Could not find {}/{} in current directory or any parent directory.\n\
                 Run from within a project or pass --project.",
                PROJECT_CONFIG_DIR,
                SETTINGS_FILE
            ),
        }
    }
}

/// Get the project config directory (config/)
pub fn get_config_dir(root: &Path) -> PathBuf {
    root.join(PROJECT_CONFIG_DIR)
}

/// Get the metadata root (src/)
pub fn get_source_dir(root: &Path) -> PathBuf {
    root.join(SOURCE_DIR)
}

/// Get the manifest path (src/package.xml)
pub fn get_manifest_path(root: &Path) -> PathBuf {
    get_source_dir(root).join(crate::package::PACKAGE_FILE_NAME)
}

/// Get the settings marker path (config/.settings)
pub fn settings_path(root: &Path) -> PathBuf {
    get_config_dir(root).join(SETTINGS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(config.workspaces.is_empty());
        assert_eq!(config.api_version, "58.0");
        assert_eq!(config.default_subscription.len(), 5);
        assert!(config.default_subscription.contains(&"ApexClass".to_string()));
        assert_eq!(config.editor, Editor::Sublime);
        assert!(config.use_keychain);
        assert_eq!(config.log_expiration_minutes, 480);
    }

    #[test]
    fn test_config_load_success() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILENAME);

        let config_content = r#"
            workspaces = ["/tmp/ws"]
            api_version = "60.0"
            default_subscription = ["ApexClass"]
            editor = "vscode"
            use_keychain = false
            ignore = ["*.bak"]
        "#;

        fs::write(&config_path, config_content).unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.workspaces, vec![PathBuf::from("/tmp/ws")]);
        assert_eq!(config.api_version, "60.0");
        assert_eq!(config.default_subscription, vec!["ApexClass"]);
        assert_eq!(config.editor, Editor::Vscode);
        assert!(!config.use_keychain);
        assert_eq!(config.ignore, vec!["*.bak"]);
        assert_eq!(config.log_expiration_minutes, 480);
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILENAME);

        let result = Config::load(&config_path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_config_load_or_default_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_or_default(&temp_dir.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config.api_version, "58.0");
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILENAME);

        fs::write(&config_path, "invalid toml content {{{").unwrap();

        assert!(Config::load(&config_path).is_err());
    }

    #[test]
    fn test_config_validate_bad_api_version() {
        let config = Config {
            api_version: "latest".to_string(),
            ..Default::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("api_version"));
    }

    #[test]
    fn test_config_validate_empty_subscription() {
        let config = Config {
            default_subscription: vec![],
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_workspace_prefers_configured() {
        let config = Config {
            workspaces: vec![PathBuf::from("/work/a"), PathBuf::from("/work/b")],
            ..Default::default()
        };

        assert_eq!(config.default_workspace(), PathBuf::from("/work/a"));
    }

    #[test]
    fn test_default_workspace_fallback() {
        let config = Config::default();
        assert!(config.default_workspace().ends_with(DEFAULT_WORKSPACE_DIR));
    }

    #[test]
    fn test_should_ignore_defaults() {
        let config = Config::default();

        assert!(config.should_ignore(Path::new(".DS_Store")));
        assert!(config.should_ignore(Path::new("classes/.DS_Store")));
        assert!(config.should_ignore(Path::new("classes/Foo.cls.swp")));
        assert!(!config.should_ignore(Path::new("classes/Foo.cls")));
    }

    #[test]
    fn test_layout_paths() {
        let root = Path::new("/ws/Proj1");
        assert_eq!(get_config_dir(root), PathBuf::from("/ws/Proj1/config"));
        assert_eq!(get_source_dir(root), PathBuf::from("/ws/Proj1/src"));
        assert_eq!(get_manifest_path(root), PathBuf::from("/ws/Proj1/src/package.xml"));
        assert_eq!(settings_path(root), PathBuf::from("/ws/Proj1/config/.settings"));
    }

    #[test]
    fn test_find_project_root_in_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join(PROJECT_CONFIG_DIR)).unwrap();
        fs::write(settings_path(temp_dir.path()), "{}").unwrap();

        let subdir = temp_dir.path().join("src").join("classes");
        fs::create_dir_all(&subdir).unwrap();

        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(&subdir).unwrap();
        let root = find_project_root();
        std::env::set_current_dir(original).unwrap();

        let expected = temp_dir.path().canonicalize().unwrap();
        assert_eq!(root.unwrap().canonicalize().unwrap(), expected);
    }
}
