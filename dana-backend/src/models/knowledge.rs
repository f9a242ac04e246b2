use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFile {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    #[serde(skip_serializing, default)]
    pub stored_path: String,
    /// Extracted text; only loaded for single-file reads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a freshly uploaded and extracted file
#[derive(Debug, Clone)]
pub struct NewKnowledgeFile {
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub stored_path: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateKnowledgeFileRequest {
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeSearchHit {
    pub id: i64,
    pub filename: String,
    pub file_type: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub snippet: String,
}
