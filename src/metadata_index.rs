//! Selectable tree of the metadata known to exist on the server.
//!
//! Node ids are dotted paths: `ApexClass`, `ApexClass.Foo`,
//! `Report.Sales.Pipeline`, `CustomObject.Account.fields.Name`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::config::ORG_METADATA_FILE;
use crate::error::SyncError;
use crate::fs_utils;
use crate::package::{Members, PackageDescriptor};
use crate::registry::{MetadataType, TypeRegistry};

/// Levels below a parent-type member that follow its selection (tag, then leaf)
const CHILD_SELECTION_DEPTH: usize = 2;

fn default_visibility() -> bool { true }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexNode {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_name: Option<String>,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub children: Vec<IndexNode>,
    #[serde(default)]
    pub select: bool,
    #[serde(default = "default_visibility")]
    pub visibility: bool,
}

impl IndexNode {
    pub fn new(id: &str, text: &str, xml_name: Option<&str>, level: u32) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            xml_name: xml_name.map(str::to_string),
            level,
            is_folder: false,
            children: Vec::new(),
            select: false,
            visibility: true,
        }
    }

    pub fn with_children(mut self, children: Vec<IndexNode>) -> Self {
        self.children = children;
        self
    }
}

/// The cached org metadata index (config/.org_metadata)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataIndex {
    nodes: Vec<IndexNode>,
}

/// Index annotated with selection and visibility flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSelection {
    pub nodes: Vec<IndexNode>,
    /// Ids the package descriptor resolved to
    pub selected_ids: BTreeSet<String>,
}

impl IndexSelection {
    pub fn find(&self, id: &str) -> Option<&IndexNode> {
        find_node(&self.nodes, id)
    }
}

fn find_node<'a>(nodes: &'a [IndexNode], id: &str) -> Option<&'a IndexNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.children, id) {
            return Some(found);
        }
    }
    None
}

/// Node id a subscribed member resolves to
fn member_id(metadata_type: &MetadataType, member: &str) -> String {
    if metadata_type.in_folder {
        return format!("{}.{}", metadata_type.xml_name, member.replace('/', "."));
    }

    if let (Some(parent), Some(tag)) = (&metadata_type.parent_xml_name, &metadata_type.tag_name) {
        if let Some((object, leaf)) = member.split_once('.') {
            return format!("{}.{}.{}.{}", parent, object, tag, leaf);
        }
    }

    format!("{}.{}", metadata_type.xml_name, member)
}

/// Ids of the topmost nodes carrying `xml_name`; their subtrees are covered by the selection depth
fn collect_type_roots(nodes: &[IndexNode], xml_name: &str, roots: &mut Vec<String>) {
    for node in nodes {
        if node.xml_name.as_deref() == Some(xml_name) {
            roots.push(node.id.clone());
        }
        else {
            collect_type_roots(&node.children, xml_name, roots);
        }
    }
}

/// Mark selections; `inherited` is how many more levels a selection above still reaches
fn apply_selection(nodes: &mut [IndexNode], targets: &BTreeMap<String, usize>, inherited: Option<usize>) {
    for node in nodes.iter_mut() {
        let own = targets.get(&node.id).copied();
        let reach = inherited.max(own);

        if reach.is_some() {
            node.select = true;
        }

        let below = reach.and_then(|depth| depth.checked_sub(1));
        apply_selection(&mut node.children, targets, below);
    }
}

/// Force ancestors of selected nodes to be selected; returns whether anything is selected
fn select_ancestors(nodes: &mut [IndexNode]) -> bool {
    let mut any = false;
    for node in nodes.iter_mut() {
        if select_ancestors(&mut node.children) {
            node.select = true;
        }
        any |= node.select;
    }
    any
}

/// Returns whether any node in the slice is visible
fn apply_visibility(nodes: &mut [IndexNode], keyword: Option<&str>) -> bool {
    let mut any = false;
    for node in nodes.iter_mut() {
        let child_visible = apply_visibility(&mut node.children, keyword);
        node.visibility = match keyword {
            Some(keyword) => child_visible || node.text.to_lowercase().contains(keyword),
            None => true,
        };
        any |= node.visibility;
    }
    any
}

impl MetadataIndex {
    pub fn new(nodes: Vec<IndexNode>) -> Self {
        Self { nodes }
    }

    /// Load the cached index; a missing file is an empty index
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(ORG_METADATA_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        fs_utils::read_json(&path).context("Failed to load org metadata index")
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        fs_utils::write_json(&config_dir.join(ORG_METADATA_FILE), self)
            .context("Failed to save org metadata index")
    }

    pub fn nodes(&self) -> &[IndexNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&IndexNode> {
        find_node(&self.nodes, id)
    }

    /// Annotate a copy of the index with the selections a package implies.
    ///
    /// Wildcard types select every node of that type along with its subtree,
    /// wherever it sits in the tree. Explicit members resolve to
    /// a single node, except members of parent types which also select the two
    /// levels below them. Ancestors of selected nodes end up selected. Any type
    /// the registry does not know fails the whole call.
    pub fn with_selections(
        &self,
        package: &PackageDescriptor,
        registry: &dyn TypeRegistry,
        keyword: Option<&str>,
    ) -> Result<IndexSelection> {
        let mut targets: BTreeMap<String, usize> = BTreeMap::new();

        for (type_name, members) in package.types() {
            let metadata_type = registry
                .by_xml_name(type_name)
                .ok_or_else(|| SyncError::UnknownMetadataType(type_name.clone()))?;

            match members {
                Members::All => {
                    let mut roots = Vec::new();
                    collect_type_roots(&self.nodes, type_name, &mut roots);
                    for id in roots {
                        targets.insert(id, usize::MAX);
                    }
                }
                Members::Explicit(names) => {
                    let depth = if metadata_type.has_children() { CHILD_SELECTION_DEPTH } else { 0 };
                    for member in names {
                        targets.insert(member_id(&metadata_type, member), depth);
                    }
                }
            }
        }

        let mut nodes = self.nodes.clone();
        for node in nodes.iter_mut() {
            clear_selection(node);
        }

        apply_selection(&mut nodes, &targets, None);
        select_ancestors(&mut nodes);

        let keyword = keyword
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty());
        apply_visibility(&mut nodes, keyword.as_deref());

        Ok(IndexSelection {
            nodes,
            selected_ids: targets.into_keys().collect(),
        })
    }
}

fn clear_selection(node: &mut IndexNode) {
    node.select = false;
    for child in node.children.iter_mut() {
        clear_selection(child);
    }
}
