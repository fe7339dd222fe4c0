use ::config::{Config, Environment, File};
use std::path::Path;
use tracing::{debug, info};

use super::settings::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Environment prefix, e.g. `REGIME__INFERENCE__MIN_CLARITY=0.5`
pub const ENV_PREFIX: &str = "REGIME";

/// Build the pipeline configuration: defaults, then the optional TOML file,
/// then `REGIME__*` environment overrides. The result is validated.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    if let Ok(env_file) = dotenvy::dotenv() {
        debug!("Loaded environment from {}", env_file.display());
    }

    let mut builder = Config::builder();
    if let Some(path) = path {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
        } else {
            debug!("Config file {} not found, using defaults", path.display());
        }
        builder = builder.add_source(File::from(path).required(false));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("clusterer.feature_columns")
            .with_list_parse_key("training.feature_columns")
            .with_list_parse_key("inference.feature_columns")
            .with_list_parse_key("decision.clarity_breakpoints")
            .with_list_parse_key("decision.position_scale")
            .try_parsing(true),
    );

    let config: PipelineConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| PipelineError::Config(e.to_string()))?;

    config.ensure_valid()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.clusterer.k, 2);
        assert_eq!(config.training.max_iter, 500);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regime.toml");
        fs::write(
            &path,
            r#"
[clusterer]
feature_columns = ["x", "y"]
window_size = 60

[decision]
transition_gate = 0.7
clarity_breakpoints = [0.5, 1.0]
position_scale = [0.25, 1.0]
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.clusterer.feature_columns, vec!["x", "y"]);
        assert_eq!(config.clusterer.window_size, 60);
        assert_eq!(config.clusterer.online_decay, 0.97);
        assert_eq!(config.decision.position_scale, vec![0.25, 1.0]);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regime.toml");
        fs::write(
            &path,
            "[decision]\nclarity_breakpoints = [0.5]\nposition_scale = [0.1, 1.0]\n",
        )
        .unwrap();

        assert!(matches!(load_config(Some(&path)), Err(PipelineError::Config(_))));
    }
}
