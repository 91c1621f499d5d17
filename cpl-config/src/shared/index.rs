use serde::Deserialize;

use crate::shared::ValidationError;

/// Namespaces treated as content namespaces when none are configured: the main article
/// namespace only.
pub const DEFAULT_CONTENT_NAMESPACES: &[i32] = &[0];

/// Settings of the created pages index.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IndexConfig {
    /// Namespaces holding real articles. Pages elsewhere are never indexed.
    #[serde(default = "default_content_namespaces")]
    pub content_namespaces: Vec<i32>,
    /// When set, every index write is skipped. The index is allowed to go stale.
    #[serde(default)]
    pub read_only: bool,
    /// Schema holding the host's `page` and `revision` tables.
    #[serde(default = "default_source_schema")]
    pub source_schema: String,
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.content_namespaces.is_empty() {
            return Err(ValidationError::NoContentNamespaces);
        }

        if self.source_schema.trim().is_empty() {
            return Err(ValidationError::EmptySourceSchema);
        }

        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            content_namespaces: default_content_namespaces(),
            read_only: false,
            source_schema: default_source_schema(),
        }
    }
}

fn default_content_namespaces() -> Vec<i32> {
    DEFAULT_CONTENT_NAMESPACES.to_vec()
}

fn default_source_schema() -> String {
    "public".to_string()
}
