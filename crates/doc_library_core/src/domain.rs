//! crates/doc_library_core/src/domain.rs
//!
//! Defines the core data structures of the document library.
//! Records coming back from the backend are mapped into these types by the
//! adapters; the write-side structs describe exactly what the core sends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Records
//=========================================================================================

/// A top-level category grouping documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Either a URL or an inline `data:` payload.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The kinds of file a document can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Word,
    Text,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Word => "word",
            DocumentType::Text => "text",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentType::Pdf),
            "word" => Ok(DocumentType::Word),
            "text" => Ok(DocumentType::Text),
            other => Err(format!("unknown document type '{}'", other)),
        }
    }
}

/// A user-uploaded file record.
///
/// `content` holds the inline payload when `is_storage_file` is false and the
/// bucket's public URL when it is true. `file_size` is the decoded byte length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub content: String,
    pub is_storage_file: bool,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

//=========================================================================================
// Caller Input (what the view layer hands to the core)
//=========================================================================================

#[derive(Debug, Clone, Default)]
pub struct SubjectInput {
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub subject_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub doc_type: DocumentType,
    /// Inline `data:` payload of the file.
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct DocumentUpdateInput {
    pub name: String,
    pub description: Option<String>,
    pub doc_type: DocumentType,
    /// Replacement content. Only an inline `data:` payload replaces the file.
    pub content: Option<String>,
}

//=========================================================================================
// Write-side Records (what the core sends to the backend)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectDraft {
    pub name: String,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectChanges {
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentDraft {
    pub subject_id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub content: String,
    pub is_storage_file: bool,
    pub file_size: u64,
}

/// Content replacement for a document, written together with the metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredContent {
    pub content: String,
    pub is_storage_file: bool,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentChanges {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub content: Option<StoredContent>,
}

//=========================================================================================
// Authentication
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
}

/// The signed-in user together with the tokens the backend issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of a login attempt. Rejected credentials are reported here rather
/// than as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl LoginOutcome {
    pub fn accepted(token: String) -> Self {
        Self {
            success: true,
            message: "Login successful".to_string(),
            token: Some(token),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            token: None,
        }
    }
}

//=========================================================================================
// Preferences
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(format!("unknown theme '{}'", other)),
        }
    }
}
