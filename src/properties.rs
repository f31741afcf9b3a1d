//! File property records returned by the remote side.
//!
//! A retrieve hands back metadata-API file properties; API queries hand back
//! records with nested creator/modifier objects. Both are normalized into
//! [`FileProperty`] before they reach the local store.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::package::PACKAGE_FILE_NAME;

const RETRIEVE_ROOT_PREFIX: &str = "unpackaged/";
const META_SUFFIX: &str = "-meta.xml";

/// File properties from a retrieve or deploy result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedProperties {
    #[serde(default)]
    pub id: String,
    pub full_name: String,
    pub file_name: String,
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
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAttributes {
    #[serde(rename = "type")]
    pub type_name: String,
}

/// An API query record describing a metadata member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueriedRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "attributes", default)]
    pub attributes: Option<RecordAttributes>,
    #[serde(default)]
    pub namespace_prefix: Option<String>,
    #[serde(default)]
    pub manageable_state: Option<String>,
    #[serde(default)]
    pub created_by_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserRef>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub last_modified_by_id: Option<String>,
    #[serde(default)]
    pub last_modified_by: Option<UserRef>,
    #[serde(default)]
    pub last_modified_date: Option<String>,
}

/// The shapes a file property can arrive in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileProperties {
    Retrieved(RetrievedProperties),
    Record(QueriedRecord),
}

/// Canonical file property consumed by the local store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileProperty {
    pub id: String,
    /// Full member name, folder-qualified for folder types; absent on query records
    pub full_name: Option<String>,
    /// Leaf member name
    pub name: String,
    /// Path relative to the metadata root
    pub file_name: Option<String>,
    /// Metadata type named explicitly by the remote side
    pub type_name: Option<String>,
    /// Type the record declares in its API attributes
    pub api_type: Option<String>,
    pub created_by_id: Option<String>,
    pub created_by_name: Option<String>,
    pub created_date: Option<String>,
    pub last_modified_by_id: Option<String>,
    pub last_modified_by_name: Option<String>,
    pub last_modified_date: Option<String>,
    pub manageable_state: Option<String>,
    pub namespace_prefix: Option<String>,
}

impl From<FileProperties> for FileProperty {
    fn from(properties: FileProperties) -> Self {
        match properties {
            FileProperties::Retrieved(p) => {
                let name = p.full_name
                    .rsplit('/')
                    .next()
                    .unwrap_or(&p.full_name)
                    .to_string();
                let file_name = p.file_name
                    .strip_prefix(RETRIEVE_ROOT_PREFIX)
                    .unwrap_or(&p.file_name)
                    .to_string();

                FileProperty {
                    id: p.id,
                    full_name: Some(p.full_name),
                    name,
                    file_name: Some(file_name),
                    type_name: Some(p.type_name).filter(|t| !t.is_empty()),
                    api_type: None,
                    created_by_id: p.created_by_id,
                    created_by_name: p.created_by_name,
                    created_date: p.created_date,
                    last_modified_by_id: p.last_modified_by_id,
                    last_modified_by_name: p.last_modified_by_name,
                    last_modified_date: p.last_modified_date,
                    manageable_state: p.manageable_state,
                    namespace_prefix: p.namespace_prefix,
                }
            }
            FileProperties::Record(r) => FileProperty {
                id: r.id,
                full_name: None,
                name: r.name,
                file_name: None,
                type_name: None,
                api_type: r.attributes.map(|a| a.type_name),
                created_by_id: r.created_by_id,
                created_by_name: r.created_by.map(|u| u.name),
                created_date: r.created_date,
                last_modified_by_id: r.last_modified_by_id,
                last_modified_by_name: r.last_modified_by.map(|u| u.name),
                last_modified_date: r.last_modified_date,
                manageable_state: r.manageable_state,
                namespace_prefix: r.namespace_prefix,
            },
        }
    }
}

impl FileProperty {
    /// The root package manifest itself, which never gets a local store entry.
    /// A `package.xml` further down (a document, a static resource) is ordinary metadata.
    pub fn is_manifest(&self) -> bool {
        match self.file_name.as_deref() {
            Some(file_name) => {
                file_name.strip_prefix(RETRIEVE_ROOT_PREFIX).unwrap_or(file_name) == PACKAGE_FILE_NAME
            }
            None => self.type_name.as_deref() == Some("Package"),
        }
    }

    /// Suffix taken from the file name (`cls` for `classes/Foo.cls`)
    pub fn suffix_hint(&self) -> Option<String> {
        let file_name = self.file_name.as_deref()?;
        let file_name = file_name.strip_suffix(META_SUFFIX).unwrap_or(file_name);

        Path::new(file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
    }

    /// Name the local store key is built from
    pub fn key_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.name)
    }
}
