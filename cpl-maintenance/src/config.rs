use cpl_config::load_config;
use cpl_config::shared::MaintenanceConfig;

use crate::error::{MaintenanceError, MaintenanceResult};

/// Loads and validates the maintenance configuration.
pub fn load_maintenance_config() -> MaintenanceResult<MaintenanceConfig> {
    let config = load_config::<MaintenanceConfig>().map_err(MaintenanceError::config)?;
    config.validate().map_err(MaintenanceError::config)?;

    Ok(config)
}
