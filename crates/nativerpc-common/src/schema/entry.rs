use std::mem;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};

/// Width of one primitive in the flat layout, or `None` for composites.
///
/// `str`, `dict` and `list` occupy a fixed pointer-sized slot owning
/// variable-size heap storage.
pub fn primitive_size(name: &str) -> Option<usize> {
    let width = match name {
        "int" => mem::size_of::<i32>(),
        "float" => mem::size_of::<f32>(),
        "bool" => mem::size_of::<bool>(),
        "str" | "dict" | "list" => mem::size_of::<usize>(),
        _ => return None,
    };
    Some(width)
}

pub fn is_primitive(name: &str) -> bool {
    primitive_size(name).is_some()
}

/// A named type: one of the six primitives or a user-declared composite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassType {
    pub name: String,
    pub is_composite: bool,
    pub byte_size: usize,
}

impl ClassType {
    pub fn primitive(name: &str) -> Option<Self> {
        primitive_size(name).map(|byte_size| Self {
            name: name.to_string(),
            is_composite: false,
            byte_size,
        })
    }

    pub fn composite(name: impl Into<String>, byte_size: usize) -> Self {
        Self {
            name: name.into(),
            is_composite: true,
            byte_size,
        }
    }
}

/// One parsed schema declaration: either a field of a composite type or a
/// method of a service class.
///
/// This is the shape the external schema parser emits:
///
/// ```json
/// {"className": "Msg", "fieldName": "a", "fieldType": "int"}
/// {"className": "Calc", "methodName": "add", "methodRequest": "Msg", "methodResponse": "Msg"}
/// ```
///
/// `idNumber` is reserved for a future tagged wire form and defaults to −1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SchemaEntry {
    Method {
        #[serde(rename = "className")]
        class_name: String,
        #[serde(rename = "methodName")]
        method_name: String,
        #[serde(rename = "methodRequest")]
        request_type: String,
        #[serde(rename = "methodResponse")]
        response_type: String,
        #[serde(rename = "projectName", default)]
        project: String,
        #[serde(rename = "idNumber", default = "default_id")]
        id: i64,
    },
    Field {
        #[serde(rename = "className")]
        class_name: String,
        #[serde(rename = "fieldName")]
        field_name: String,
        #[serde(rename = "fieldType")]
        field_type: String,
        #[serde(rename = "projectName", default)]
        project: String,
        #[serde(rename = "idNumber", default = "default_id")]
        id: i64,
    },
}

fn default_id() -> i64 {
    -1
}

impl SchemaEntry {
    pub fn field(
        class_name: impl Into<String>,
        field_name: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        SchemaEntry::Field {
            class_name: class_name.into(),
            field_name: field_name.into(),
            field_type: field_type.into(),
            project: String::new(),
            id: -1,
        }
    }

    pub fn method(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        request_type: impl Into<String>,
        response_type: impl Into<String>,
    ) -> Self {
        SchemaEntry::Method {
            class_name: class_name.into(),
            method_name: method_name.into(),
            request_type: request_type.into(),
            response_type: response_type.into(),
            project: String::new(),
            id: -1,
        }
    }

    pub fn class_name(&self) -> &str {
        match self {
            SchemaEntry::Method { class_name, .. } => class_name,
            SchemaEntry::Field { class_name, .. } => class_name,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self, SchemaEntry::Method { .. })
    }
}

/// One slot of a composite layout: field name plus resolved type, in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    pub name: String,
    pub ty: ClassType,
}

/// One callable method, derived from the registry at construction time.
///
/// `method_index` is the position of the method within its class's method
/// list, stable in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodEntry {
    pub class_name: String,
    pub method_name: String,
    pub method_index: usize,
    pub request_type: ClassType,
    pub response_type: ClassType,
    pub id: i64,
}

impl MethodEntry {
    /// Route key as it appears in the request path.
    pub fn route(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }
}

/// Parses the external schema parser's JSON output into entries.
pub fn parse_schema_list(raw: &str) -> Result<Vec<SchemaEntry>> {
    let entries: Vec<SchemaEntry> = serde_json::from_str(raw)
        .map_err(|e| RpcError::Parse(format!("Bad schema list: {e}")))?;
    Ok(entries)
}

/// Loads and parses every schema file of a project.
pub fn load_project_schema(project_path: &Path) -> Result<Vec<SchemaEntry>> {
    let mut entries = Vec::new();
    for file in list_message_files(project_path)? {
        let raw = std::fs::read_to_string(&file)?;
        entries.extend(parse_schema_list(&raw)?);
    }
    Ok(entries)
}

/// Lists the parser-produced schema files for a project: every `.json` file
/// under `<project>/messages/`, in name order.
pub fn list_message_files(project_path: &Path) -> Result<Vec<PathBuf>> {
    let dir = project_path.join("messages");
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}
