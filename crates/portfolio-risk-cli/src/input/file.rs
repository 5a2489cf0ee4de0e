use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Read a JSON or YAML file (by extension) and deserialise into a typed struct.
pub fn read_config<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let value: T = if is_yaml(&canonical) {
        serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    } else {
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    };
    Ok(value)
}

/// Read a JSON file and deserialise into a typed struct.
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let value: T = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    Ok(value)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("yaml") | Some("yml")
    )
}

/// Resolve the path against the working directory and check it is a file.
pub fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_risk_core::analysis::AnalysisConfig;
    use std::io::Write;

    #[test]
    fn test_yaml_and_json_configs_agree() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("portfolio.yaml");
        let mut f = fs::File::create(&yaml_path).unwrap();
        writeln!(f, "weights:\n  VOO: 0.6\n  TLT: 0.4\nmarket_proxy: VOO\nrisk_free_rate: 0.03").unwrap();

        let json_path = dir.path().join("portfolio.json");
        fs::write(
            &json_path,
            r#"{"weights": {"VOO": 0.6, "TLT": 0.4}, "market_proxy": "VOO", "risk_free_rate": 0.03}"#,
        )
        .unwrap();

        let from_yaml: AnalysisConfig = read_config(yaml_path.to_str().unwrap()).unwrap();
        let from_json: AnalysisConfig = read_config(json_path.to_str().unwrap()).unwrap();
        assert_eq!(from_yaml.weights, from_json.weights);
        assert_eq!(from_yaml.market_proxy.as_deref(), Some("VOO"));
        assert_eq!(from_yaml.risk_free_rate, 0.03);
        assert_eq!(from_yaml.lookback_days, 1095);
    }

    #[test]
    fn test_demo_portfolio_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/portfolio.yaml");
        let config: AnalysisConfig = read_config(path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.weights.len(), 9);
        assert!((config.weights.total() - 1.0).abs() < 1e-4);
        assert_eq!(config.scenario_settings().scenarios().len(), 3);
    }

    #[test]
    fn test_missing_file() {
        let err = read_config::<AnalysisConfig>("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
