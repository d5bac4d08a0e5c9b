//! Request bodies for the member mutation endpoints.

use serde::Deserialize;

/// Request body for adding a new member.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub name: String,
    /// Name of an existing record to attach the new member under
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub birth: Option<String>,
    #[serde(default)]
    pub death: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

/// Request body for editing a member.
///
/// Absent fields are left alone; an empty string clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMemberRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub birth: Option<String>,
    #[serde(default)]
    pub death: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    /// Spouse name: matched against existing records, otherwise stored as free
    /// text. Blank clears any pairing.
    #[serde(default)]
    pub spouse: Option<String>,
}

/// Query string for search endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Query string for the name autocomplete endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamesQuery {
    #[serde(default)]
    pub prefix: String,
}
