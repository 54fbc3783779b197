use crate::utils::error::{FleetError, Result};
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(FleetError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(FleetError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(FleetError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(FleetError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

/// Worker ports must be non-empty, non-zero and pairwise distinct.
pub fn validate_port_list(field_name: &str, ports: &[u16]) -> Result<()> {
    if ports.is_empty() {
        return Err(FleetError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: "[]".to_string(),
            reason: "At least one port is required".to_string(),
        });
    }

    let mut seen = HashSet::with_capacity(ports.len());
    for &port in ports {
        if port == 0 {
            return Err(FleetError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: port.to_string(),
                reason: "Port 0 is not a fixed port".to_string(),
            });
        }
        if !seen.insert(port) {
            return Err(FleetError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: port.to_string(),
                reason: "Duplicate port; each worker needs its own".to_string(),
            });
        }
    }

    Ok(())
}
