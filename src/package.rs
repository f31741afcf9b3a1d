use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::fs_utils;

pub const PACKAGE_FILE_NAME: &str = "package.xml";
pub const WILDCARD: &str = "*";
const METADATA_NAMESPACE: &str = "http://soap.sforce.com/2006/04/metadata";
const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Members subscribed for one metadata type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Members {
    /// Every member of the type (`*`)
    All,
    Explicit(BTreeSet<String>),
}

impl Members {
    pub fn is_all(&self) -> bool {
        matches!(self, Members::All)
    }

    pub fn contains(&self, member: &str) -> bool {
        match self {
            Members::All => true,
            Members::Explicit(members) => members.contains(member),
        }
    }

    /// Member names as written in the manifest
    pub fn names(&self) -> Vec<&str> {
        match self {
            Members::All => vec![WILDCARD],
            Members::Explicit(members) => members.iter().map(String::as_str).collect(),
        }
    }
}

/// The subscription manifest: metadata type name to subscribed members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    version: String,
    types: BTreeMap<String, Members>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "Package")]
struct PackageXml {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    xmlns: Option<String>,
    #[serde(rename = "types", default)]
    types: Vec<TypesXml>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TypesXml {
    #[serde(default)]
    members: Vec<String>,
    name: String,
}

impl PackageDescriptor {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            types: BTreeMap::new(),
        }
    }

    /// Wildcard subscription to every listed type
    pub fn from_subscription<S: AsRef<str>>(types: &[S], version: &str) -> Self {
        let mut package = Self::new(version);
        for type_name in types {
            package.subscribe_all(type_name.as_ref());
        }
        package
    }

    /// Parse manifest XML
    pub fn parse(xml: &str) -> Result<Self> {
        let parsed: PackageXml = quick_xml::de::from_str(xml)
            .context("Failed to parse package manifest")?;

        let mut package = Self::new(parsed.version.as_deref().unwrap_or_default());

        for entry in parsed.types {
            let name = entry.name.trim();
            if name.is_empty() {
                bail!("Package manifest contains a <types> entry without a name");
            }

            for member in &entry.members {
                package.add_member(name, member.trim());
            }
            if entry.members.is_empty() {
                package.types.entry(name.to_string())
                    .or_insert_with(|| Members::Explicit(BTreeSet::new()));
            }
        }

        Ok(package)
    }

    /// Read and parse a manifest file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read package manifest: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid package manifest: {}", path.display()))
    }

    /// Render the manifest as XML
    pub fn to_xml(&self) -> Result<String> {
        let document = PackageXml {
            xmlns: Some(METADATA_NAMESPACE.to_string()),
            types: self
                .types
                .iter()
                .map(|(name, members)| TypesXml {
                    members: members.names().into_iter().map(str::to_string).collect(),
                    name: name.clone(),
                })
                .collect(),
            version: if self.version.is_empty() { None } else { Some(self.version.clone()) },
        };

        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::new(&mut body);
        serializer.indent(' ', 4);
        document
            .serialize(serializer)
            .context("Failed to serialize package manifest")?;

        Ok(format!("{}{}\n", XML_DECLARATION, body))
    }

    /// Write the manifest file atomically
    pub fn write(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        fs_utils::atomic_write(path, xml.as_bytes())
            .with_context(|| format!("Failed to write package manifest: {}", path.display()))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, type_name: &str) -> Option<&Members> {
        self.types.get(type_name)
    }

    pub fn types(&self) -> impl Iterator<Item = (&String, &Members)> {
        self.types.iter()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Subscribe to every member of a type, dropping any explicit list
    pub fn subscribe_all(&mut self, type_name: &str) {
        self.types.insert(type_name.to_string(), Members::All);
    }

    /// Add one member; `*` switches the type to wildcard, and members of a wildcard type are implied
    pub fn add_member(&mut self, type_name: &str, member: &str) {
        if member == WILDCARD {
            if let Some(Members::Explicit(existing)) = self.types.get(type_name) {
                if !existing.is_empty() {
                    warn!(metadata_type = type_name, "Wildcard subscription replaces explicit members");
                }
            }
            self.subscribe_all(type_name);
            return;
        }

        match self.types.entry(type_name.to_string())
            .or_insert_with(|| Members::Explicit(BTreeSet::new()))
        {
            Members::All => {}
            Members::Explicit(members) => {
                members.insert(member.to_string());
            }
        }
    }

    /// Remove one member; the type is dropped once its list is empty.
    /// Returns whether anything changed.
    pub fn remove_member(&mut self, type_name: &str, member: &str) -> bool {
        let Some(Members::Explicit(members)) = self.types.get_mut(type_name) else {
            return false;
        };

        let removed = members.remove(member);
        if members.is_empty() {
            self.types.remove(type_name);
        }
        removed
    }

    /// Drop a type entirely
    pub fn unsubscribe(&mut self, type_name: &str) -> bool {
        self.types.remove(type_name).is_some()
    }
}
