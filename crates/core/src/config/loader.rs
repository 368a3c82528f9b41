use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment variable overrides, e.g. `AUDIORIP_JOB__SPEED=1.5`
pub const ENV_PREFIX: &str = "AUDIORIP_";

fn env() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    figment
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    extract(
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(env()),
    )
}

/// Load configuration from file if given, otherwise from defaults; environment
/// overrides apply either way
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => extract(Figment::from(Serialized::defaults(Config::default())).merge(env())),
    }
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[job]
speed = 2.0

[output]
dir = "out"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.job.speed, 2.0);
        assert_eq!(config.output.dir.to_str().unwrap(), "out");
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[engine]
timeout_secs = "soon"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/audiorip.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[engine]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[job]
downsample = true
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.engine.ffmpeg_path.to_str().unwrap(), "/opt/ffmpeg/bin/ffmpeg");
        assert!(config.job.downsample);
        // Untouched sections keep their defaults.
        assert_eq!(config.job.speed, 1.0);
        assert_eq!(config.engine.timeout_secs, 3600);
    }

    #[test]
    fn test_load_config_or_default_without_file() {
        let config = load_config_or_default(None).unwrap();
        assert_eq!(config.engine.ffmpeg_log_level, "info");
        assert!(!config.job.downsample);
    }
}
