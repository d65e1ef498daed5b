use serde::{Deserialize, Serialize};

/// Taint role of a profiled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLabel {
    Source,
    Sink,
    Sanitizer,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    /// -1 means unknown or irrelevant.
    #[serde(default = "default_index")]
    pub index: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_index() -> i32 {
    -1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Fully qualified name, e.g. `os.system`.
    pub name: String,
    #[serde(default)]
    pub label: SecurityLabel,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub returns_tainted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// e.g. `CWE-78`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryVersion {
    /// Range specifier (`>=2.0, <3.0`), a plain version, or `*`.
    pub version_spec: String,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryProfile {
    pub name: String,
    /// e.g. `pypi`, `npm`, `stdlib`
    pub ecosystem: String,
    #[serde(default)]
    pub versions: Vec<LibraryVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}
