//! Document collection domain types

use serde::{Deserialize, Serialize};

/// A backend-managed set of previously uploaded documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
    pub file_count: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
