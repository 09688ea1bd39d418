//! Configuration loader for the flood pipeline.
//!
//! Reads the YAML pipeline configuration, expanding `${VAR}` and
//! `${VAR:-default}` references first, then applies `FLOOD_*` overrides.

use anyhow::{Context, Result};
use ingestion::PipelineConfig;
use std::fs;
use std::path::Path;

/// Load the pipeline configuration.
///
/// Without a file the defaults are used. Environment overrides are applied
/// in both cases; validation is left to the caller so command line flags
/// can still be layered on top.
pub fn load_pipeline_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read pipeline config from {:?}", path))?;
            let expanded = expand_env_vars(&content)?;
            PipelineConfig::from_yaml_str(&expanded)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid pipeline config in {:?}", path))?
        }
        None => PipelineConfig::default(),
    };

    config.apply_env_overrides();
    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve variable expression (supports VAR and VAR:-default syntax)
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("FLOOD_TEST_ROOT", "/srv/flood");
        let result = expand_env_vars("input_dir: ${FLOOD_TEST_ROOT}/raw").unwrap();
        assert_eq!(result, "input_dir: /srv/flood/raw");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("FLOOD_TEST_UNSET");
        let result = expand_env_vars("max_global_dimension: ${FLOOD_TEST_UNSET:-3000}").unwrap();
        assert_eq!(result, "max_global_dimension: 3000");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("FLOOD_TEST_REQUIRED");
        assert!(expand_env_vars("${FLOOD_TEST_REQUIRED}").is_err());
    }

    #[test]
    fn test_unclosed_substitution() {
        assert!(expand_env_vars("input_dir: ${FLOOD_TEST_ROOT").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        fs::write(
            &path,
            "input_dir: ${FLOOD_TEST_LOADER_ROOT:-/data}/raw\nmax_event_dimension: 1500\n",
        )
        .unwrap();

        let config = load_pipeline_config(Some(&path)).unwrap();
        assert_eq!(config.input_dir, Path::new("/data/raw"));
        assert_eq!(config.max_event_dimension, 1500);
    }

    #[test]
    fn test_missing_file() {
        let err = load_pipeline_config(Some(Path::new("/nonexistent/pipeline.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read pipeline config"));
    }
}
