use super::models::Config;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("backup.max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("Timeout must be positive: {field} = 0")]
    ZeroTimeout { field: String },

    #[error("Config entry at index {index} has an empty {field}")]
    BlankEntryField { index: usize, field: String },

    #[error("Duplicate config entry id '{entry_id}'")]
    DuplicateEntryId { entry_id: String },

    #[error("Device references non-existent config entry '{entry_id}'")]
    UnknownDeviceEntry { entry_id: String },

    #[error("http.user_agent must not be empty")]
    EmptyUserAgent,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_backup(config)?;
    validate_http(config)?;
    validate_entries(config)?;
    validate_devices(config)?;
    Ok(())
}

fn validate_backup(config: &Config) -> Result<(), ValidationError> {
    if config.backup.max_concurrency == 0 {
        return Err(ValidationError::InvalidConcurrency);
    }

    if config.backup.fetch_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "backup.fetch_timeout_secs".to_string(),
        });
    }

    Ok(())
}

fn validate_http(config: &Config) -> Result<(), ValidationError> {
    if config.http.connect_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "http.connect_timeout_secs".to_string(),
        });
    }

    if config.http.request_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "http.request_timeout_secs".to_string(),
        });
    }

    if config.http.user_agent.trim().is_empty() {
        return Err(ValidationError::EmptyUserAgent);
    }

    Ok(())
}

/// Entry ids must be present and unique; domains must be present
fn validate_entries(config: &Config) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for (index, entry) in config.entries.iter().enumerate() {
        if entry.entry_id.trim().is_empty() {
            return Err(ValidationError::BlankEntryField {
                index,
                field: "entry_id".to_string(),
            });
        }

        if entry.domain.trim().is_empty() {
            return Err(ValidationError::BlankEntryField {
                index,
                field: "domain".to_string(),
            });
        }

        if !seen.insert(entry.entry_id.as_str()) {
            return Err(ValidationError::DuplicateEntryId {
                entry_id: entry.entry_id.clone(),
            });
        }
    }

    Ok(())
}

fn validate_devices(config: &Config) -> Result<(), ValidationError> {
    let known: HashSet<&str> = config.entries.iter().map(|e| e.entry_id.as_str()).collect();

    for device in &config.devices {
        if !known.contains(device.config_entry_id.as_str()) {
            return Err(ValidationError::UnknownDeviceEntry {
                entry_id: device.config_entry_id.clone(),
            });
        }
    }

    Ok(())
}
