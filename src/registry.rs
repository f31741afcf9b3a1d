/// Describes one metadata type: where its files live and how its members are addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataType {
    pub xml_name: String,
    /// File suffix without the dot (`cls` for ApexClass)
    pub suffix: Option<String>,
    pub directory_name: String,
    /// Members are addressed as `Folder/Member`
    pub in_folder: bool,
    /// Child types nested inside members of this type (fields under objects)
    pub child_xml_names: Vec<String>,
    /// Set on child types: the type whose members contain this one
    pub parent_xml_name: Option<String>,
    /// Set on child types: collection tag inside the parent (`fields`)
    pub tag_name: Option<String>,
}

impl MetadataType {
    pub fn new(xml_name: &str, suffix: Option<&str>, directory_name: &str) -> Self {
        Self {
            xml_name: xml_name.to_string(),
            suffix: suffix.map(str::to_string),
            directory_name: directory_name.to_string(),
            in_folder: false,
            child_xml_names: Vec::new(),
            parent_xml_name: None,
            tag_name: None,
        }
    }

    fn in_folder(mut self) -> Self {
        self.in_folder = true;
        self
    }

    fn with_children(mut self, children: &[&str]) -> Self {
        self.child_xml_names = children.iter().map(|c| c.to_string()).collect();
        self
    }

    fn child_of(mut self, parent: &str, tag: &str) -> Self {
        self.parent_xml_name = Some(parent.to_string());
        self.tag_name = Some(tag.to_string());
        self
    }

    pub fn has_children(&self) -> bool {
        !self.child_xml_names.is_empty()
    }
}

/// Lookup of metadata type descriptions
pub trait TypeRegistry: Send + Sync {
    fn by_xml_name(&self, xml_name: &str) -> Option<MetadataType>;

    fn by_suffix(&self, suffix: &str) -> Option<MetadataType>;

    /// Resolve the type name an API record declares for itself
    fn by_api_name(&self, api_name: &str) -> Option<MetadataType> {
        self.by_xml_name(api_name)
    }
}

/// Registry of the commonly used metadata types
#[derive(Debug, Clone)]
pub struct BuiltinRegistry {
    types: Vec<MetadataType>,
}

impl BuiltinRegistry {
    pub fn new(types: Vec<MetadataType>) -> Self {
        Self { types }
    }

    pub fn standard() -> Self {
        let types = vec![
            MetadataType::new("ApexClass", Some("cls"), "classes"),
            MetadataType::new("ApexComponent", Some("component"), "components"),
            MetadataType::new("ApexPage", Some("page"), "pages"),
            MetadataType::new("ApexTrigger", Some("trigger"), "triggers"),
            MetadataType::new("StaticResource", Some("resource"), "staticresources"),
            MetadataType::new("AuraDefinitionBundle", None, "aura"),
            MetadataType::new("Layout", Some("layout"), "layouts"),
            MetadataType::new("CustomTab", Some("tab"), "tabs"),
            MetadataType::new("CustomObject", Some("object"), "objects")
                .with_children(&["CustomField", "ListView", "RecordType", "ValidationRule"]),
            MetadataType::new("CustomField", None, "objects").child_of("CustomObject", "fields"),
            MetadataType::new("ListView", None, "objects").child_of("CustomObject", "listViews"),
            MetadataType::new("RecordType", None, "objects").child_of("CustomObject", "recordTypes"),
            MetadataType::new("ValidationRule", None, "objects").child_of("CustomObject", "validationRules"),
            MetadataType::new("CustomLabels", Some("labels"), "labels").with_children(&["CustomLabel"]),
            MetadataType::new("CustomLabel", None, "labels").child_of("CustomLabels", "labels"),
            MetadataType::new("Workflow", Some("workflow"), "workflows")
                .with_children(&["WorkflowRule", "WorkflowFieldUpdate"]),
            MetadataType::new("WorkflowRule", None, "workflows").child_of("Workflow", "rules"),
            MetadataType::new("WorkflowFieldUpdate", None, "workflows").child_of("Workflow", "fieldUpdates"),
            MetadataType::new("Report", Some("report"), "reports").in_folder(),
            MetadataType::new("Dashboard", Some("dashboard"), "dashboards").in_folder(),
            MetadataType::new("Document", None, "documents").in_folder(),
            MetadataType::new("EmailTemplate", Some("email"), "email").in_folder(),
        ];

        Self::new(types)
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TypeRegistry for BuiltinRegistry {
    fn by_xml_name(&self, xml_name: &str) -> Option<MetadataType> {
        self.types.iter().find(|t| t.xml_name == xml_name).cloned()
    }

    fn by_suffix(&self, suffix: &str) -> Option<MetadataType> {
        self.types
            .iter()
            .find(|t| t.suffix.as_deref() == Some(suffix))
            .cloned()
    }
}
