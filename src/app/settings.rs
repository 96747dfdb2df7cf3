use super::config::Config;
use std::collections::HashSet;
use thiserror::Error;

/// A single problem found in a configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("server.port must not be 0")]
    InvalidPort,

    #[error("server.maximum_active_downloads must be at least 1")]
    InvalidMaximumActiveDownloads,

    #[error("server.queue_interval_ms must be at least 1")]
    InvalidQueueInterval,

    #[error("at least one download profile is required")]
    NoProfiles,

    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },

    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("profile '{0}' has no command")]
    EmptyCommand(String),

    #[error("destination '{0}' has an empty path")]
    EmptyDestinationPath(String),
}

/// Validate a configuration, collecting every problem found
pub fn validate_config(config: &Config) -> Result<(), Vec<ConfigValidationError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ConfigValidationError::InvalidPort);
    }
    if config.server.maximum_active_downloads == 0 {
        errors.push(ConfigValidationError::InvalidMaximumActiveDownloads);
    }
    if config.server.queue_interval_ms == 0 {
        errors.push(ConfigValidationError::InvalidQueueInterval);
    }

    if config.profiles.is_empty() {
        errors.push(ConfigValidationError::NoProfiles);
    }

    let mut seen = HashSet::new();
    for profile in &config.profiles {
        check_name("profile", &profile.name, &mut seen, &mut errors);
        if profile.command.trim().is_empty() {
            errors.push(ConfigValidationError::EmptyCommand(profile.name.clone()));
        }
    }

    let mut seen = HashSet::new();
    for destination in &config.destinations {
        check_name("destination", &destination.name, &mut seen, &mut errors);
        if destination.path.as_os_str().is_empty() {
            errors.push(ConfigValidationError::EmptyDestinationPath(
                destination.name.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_name<'a>(
    kind: &'static str,
    name: &'a str,
    seen: &mut HashSet<&'a str>,
    errors: &mut Vec<ConfigValidationError>,
) {
    if name.trim().is_empty() {
        errors.push(ConfigValidationError::EmptyName { kind });
    } else if !seen.insert(name) {
        errors.push(ConfigValidationError::DuplicateName {
            kind,
            name: name.to_string(),
        });
    }
}
