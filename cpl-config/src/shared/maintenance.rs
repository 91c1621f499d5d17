use serde::Deserialize;

use crate::Config;
use crate::shared::{IndexConfig, PgConnectionConfig, ValidationError};

/// Complete configuration of the maintenance binary.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking the database
/// password into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Database holding the host's page history and the index table.
    pub database: PgConnectionConfig,
    /// Index settings.
    #[serde(default)]
    pub index: IndexConfig,
}

impl MaintenanceConfig {
    /// Validates every configuration component.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.index.validate()
    }
}

impl Config for MaintenanceConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["index.content_namespaces"];
}
