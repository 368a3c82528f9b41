use super::{types::Config, ConfigError};
use crate::job::SplitMode;

/// Validate configuration
/// Currently validates:
/// - Default speed is finite and positive
/// - Default split length is not 0
/// - Engine timeout is not 0
/// - Output directory is set
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let speed = config.job.speed;
    if !speed.is_finite() || speed <= 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "job.speed must be a positive number, got {}",
            speed
        )));
    }

    if let SplitMode::Fixed { seconds: 0 } = config.job.split {
        return Err(ConfigError::ValidationError(
            "job.split segment length cannot be 0".to_string(),
        ));
    }

    if config.engine.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.output.dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "output.dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}
