//! The local store: last-synced remote properties for every local file.
//!
//! Entries are keyed `fullName.suffix` (`Foo.cls`, `Sales/Pipeline.report`),
//! or `name.suffix` for query records that carry no full name.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::LOCAL_STORE_FILE;
use crate::file_hash;
use crate::fs_utils;
use crate::properties::FileProperty;
use crate::registry::{MetadataType, TypeRegistry};

/// Synchronization state of a local file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Matches what was last retrieved or deployed
    #[default]
    Clean,
    /// Changed on disk since the last sync
    Dirty,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Clean => "clean",
            SyncState::Dirty => "dirty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStoreEntry {
    pub id: String,
    pub full_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub created_by_id: Option<String>,
    #[serde(default)]
    pub created_by_name: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub last_modified_by_id: Option<String>,
    #[serde(default)]
    pub last_modified_by_name: Option<String>,
    #[serde(default)]
    pub last_modified_date: Option<String>,
    #[serde(default)]
    pub manageable_state: Option<String>,
    #[serde(default)]
    pub namespace_prefix: Option<String>,
    /// blake3 of the local file when the entry was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub mm_state: SyncState,
}

/// Mapping from local file key to its last-synced entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalStore {
    entries: BTreeMap<String, LocalStoreEntry>,
}

/// Resolve the metadata type of a property: explicit type name, then declared API type, then suffix
fn resolve_type(property: &FileProperty, registry: &dyn TypeRegistry) -> Option<MetadataType> {
    property.type_name.as_deref()
        .and_then(|name| registry.by_xml_name(name))
        .or_else(|| property.api_type.as_deref().and_then(|name| registry.by_api_name(name)))
        .or_else(|| property.suffix_hint().and_then(|suffix| registry.by_suffix(&suffix)))
}

fn entry_key(property: &FileProperty, metadata_type: &MetadataType) -> String {
    let suffix = metadata_type.suffix.clone().or_else(|| property.suffix_hint());

    match suffix {
        Some(suffix) => format!("{}.{}", property.key_name(), suffix),
        None => property.key_name().to_string(),
    }
}

/// Records carry no file name; derive it from the type's directory and suffix
fn entry_file_name(property: &FileProperty, metadata_type: &MetadataType) -> Option<String> {
    if let Some(file_name) = &property.file_name {
        return Some(file_name.clone());
    }

    metadata_type.suffix.as_ref().map(|suffix| {
        format!("{}/{}.{}", metadata_type.directory_name, property.key_name(), suffix)
    })
}

impl LocalStore {
    /// Load the store from a config directory; a missing file is an empty store
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(LOCAL_STORE_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        fs_utils::read_json(&path).context("Failed to load local store")
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        fs_utils::write_json(&config_dir.join(LOCAL_STORE_FILE), self)
            .context("Failed to save local store")
    }

    /// Build entries from file properties.
    ///
    /// The manifest and properties whose type cannot be resolved are skipped.
    /// With a `source_root`, each entry records the hash of its local file.
    pub fn from_properties<I>(properties: I, registry: &dyn TypeRegistry, source_root: Option<&Path>) -> Result<Self>
    where
        I: IntoIterator<Item = FileProperty>,
    {
        let mut store = Self::default();

        for property in properties {
            if property.is_manifest() {
                continue;
            }

            let Some(metadata_type) = resolve_type(&property, registry) else {
                warn!(
                    name = property.key_name(),
                    file = property.file_name.as_deref().unwrap_or("-"),
                    "Skipping local store entry with unresolved metadata type"
                );
                continue;
            };

            let key = entry_key(&property, &metadata_type);
            let file_name = entry_file_name(&property, &metadata_type);

            let content_hash = match (source_root, file_name.as_deref()) {
                (Some(root), Some(file_name)) => file_hash::hash_source_file(root, file_name)?,
                _ => None,
            };

            let entry = LocalStoreEntry {
                id: property.id,
                full_name: property.full_name.unwrap_or_else(|| property.name.clone()),
                name: property.name,
                file_name,
                type_name: metadata_type.xml_name,
                created_by_id: property.created_by_id,
                created_by_name: property.created_by_name,
                created_date: property.created_date,
                last_modified_by_id: property.last_modified_by_id,
                last_modified_by_name: property.last_modified_by_name,
                last_modified_date: property.last_modified_date,
                manageable_state: property.manageable_state,
                namespace_prefix: property.namespace_prefix,
                content_hash,
                mm_state: SyncState::Clean,
            };

            store.entries.insert(key, entry);
        }

        Ok(store)
    }

    /// Overwrite matching keys with `other`, keeping everything else
    pub fn merge(&mut self, other: LocalStore) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, key: &str) -> Option<&LocalStoreEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LocalStoreEntry)> {
        self.entries.iter()
    }

    /// Recompute sync states from file contents.
    /// Entries without a recorded hash are left alone. Returns the number of dirty entries.
    pub fn refresh_states(&mut self, source_root: &Path) -> Result<usize> {
        let mut dirty = 0;

        for (key, entry) in self.entries.iter_mut() {
            let (Some(recorded), Some(file_name)) = (&entry.content_hash, &entry.file_name) else {
                continue;
            };

            let current = file_hash::hash_source_file(source_root, file_name)?;
            entry.mm_state = if current.as_ref() == Some(recorded) {
                SyncState::Clean
            }
            else {
                debug!(key = %key, "Local file changed since last sync");
                dirty += 1;
                SyncState::Dirty
            };
        }

        Ok(dirty)
    }

    /// Record the current hash of every entry's file and mark it clean
    pub fn record_hashes(&mut self, source_root: &Path) -> Result<()> {
        for entry in self.entries.values_mut() {
            if let Some(file_name) = &entry.file_name {
                entry.content_hash = file_hash::hash_source_file(source_root, file_name)?;
                entry.mm_state = SyncState::Clean;
            }
        }
        Ok(())
    }

    /// Keys of entries currently marked dirty
    pub fn dirty_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.mm_state == SyncState::Dirty)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Replace the persisted store wholesale; used after full retrievals
pub fn write_local_store<I>(
    config_dir: &Path,
    properties: I,
    registry: &dyn TypeRegistry,
    source_root: Option<&Path>,
) -> Result<LocalStore>
where
    I: IntoIterator<Item = FileProperty>,
{
    let store = LocalStore::from_properties(properties, registry, source_root)?;
    store.save(config_dir)?;

    debug!(entries = store.len(), "Local store written");
    Ok(store)
}

/// Merge entries into the persisted store (read-modify-write); used after partial deploys
pub fn update_local_store<I>(
    config_dir: &Path,
    properties: I,
    registry: &dyn TypeRegistry,
    source_root: Option<&Path>,
) -> Result<LocalStore>
where
    I: IntoIterator<Item = FileProperty>,
{
    let mut store = LocalStore::load(config_dir)?;
    let updates = LocalStore::from_properties(properties, registry, source_root)?;
    let updated = updates.len();

    store.merge(updates);
    store.save(config_dir)?;

    debug!(updated, entries = store.len(), "Local store updated");
    Ok(store)
}
