//! Configuration management module
//!
//! Loads and validates environment-based configuration. The predictor mode is
//! explicit so the synthetic stand-in can never be mistaken for the service.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::validation::UploadConstraints;

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid value for environment variable {0}")]
    ParseError(&'static str),

    #[error("Unknown PREDICTOR_MODE '{0}' (expected remote, synthetic or auto)")]
    UnknownMode(String),

    #[error("PREDICTOR_MODE=remote requires PREDICTION_API_URL")]
    MissingApiUrl,
}

/// Where analysis results come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictorMode {
    /// Live prediction service at `api_url`
    Remote { api_url: String },
    /// Locally fabricated results, for development and demos only
    Synthetic,
}

/// Prediction configuration settings
#[derive(Debug, Clone)]
pub struct PredictionSettings {
    pub mode: PredictorMode,
}

/// History configuration settings
#[derive(Debug, Clone)]
pub struct HistorySettings {
    /// Directory holding the history slot file
    pub dir: PathBuf,
}

/// Upload configuration settings
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_bytes: usize,
}

/// Synthetic predictor configuration settings
#[derive(Debug, Clone)]
pub struct SyntheticSettings {
    pub seed: Option<u64>,
    pub simulate_latency: bool,
}

/// Root configuration structure
#[derive(Debug, Clone)]
pub struct Settings {
    pub prediction: PredictionSettings,
    pub history: HistorySettings,
    pub upload: UploadSettings,
    pub synthetic: SyntheticSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_url = var("PREDICTION_API_URL");
        let mode = match var("PREDICTOR_MODE").as_deref().unwrap_or("auto") {
            "remote" => PredictorMode::Remote {
                api_url: api_url.ok_or(SettingsError::MissingApiUrl)?,
            },
            "synthetic" => PredictorMode::Synthetic,
            "auto" => match api_url {
                Some(api_url) => PredictorMode::Remote { api_url },
                None => PredictorMode::Synthetic,
            },
            other => return Err(SettingsError::UnknownMode(other.to_string())),
        };

        let max_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(v) => v.parse().map_err(|_| SettingsError::ParseError("MAX_UPLOAD_BYTES"))?,
            None => UploadConstraints::DEFAULT_MAX_BYTES,
        };

        let seed = match var("SYNTHETIC_SEED") {
            Some(v) => Some(v.parse().map_err(|_| SettingsError::ParseError("SYNTHETIC_SEED"))?),
            None => None,
        };

        let simulate_latency = var("SYNTHETIC_LATENCY")
            .unwrap_or_else(|| "true".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("SYNTHETIC_LATENCY"))?;

        Ok(Self {
            prediction: PredictionSettings { mode },
            history: HistorySettings {
                dir: var("HISTORY_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data")),
            },
            upload: UploadSettings { max_bytes },
            synthetic: SyntheticSettings {
                seed,
                simulate_latency,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_settings() {
        let settings = settings(&[]).unwrap();

        assert_eq!(settings.prediction.mode, PredictorMode::Synthetic);
        assert_eq!(settings.history.dir, PathBuf::from("./data"));
        assert_eq!(settings.upload.max_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.synthetic.seed, None);
        assert!(settings.synthetic.simulate_latency);
    }

    #[test]
    fn test_auto_mode_picks_remote_when_url_set() {
        let settings = settings(&[("PREDICTION_API_URL", "https://predict.example.org")]).unwrap();

        assert_eq!(
            settings.prediction.mode,
            PredictorMode::Remote {
                api_url: "https://predict.example.org".to_string()
            }
        );
    }

    #[test]
    fn test_blank_url_means_unset() {
        let settings = settings(&[("PREDICTION_API_URL", "  ")]).unwrap();
        assert_eq!(settings.prediction.mode, PredictorMode::Synthetic);
    }

    #[test]
    fn test_explicit_modes() {
        let synthetic = settings(&[
            ("PREDICTOR_MODE", "synthetic"),
            ("PREDICTION_API_URL", "https://predict.example.org"),
        ])
        .unwrap();
        assert_eq!(synthetic.prediction.mode, PredictorMode::Synthetic);

        assert!(matches!(
            settings(&[("PREDICTOR_MODE", "remote")]),
            Err(SettingsError::MissingApiUrl)
        ));
        assert!(matches!(
            settings(&[("PREDICTOR_MODE", "mock")]),
            Err(SettingsError::UnknownMode(_))
        ));
    }

    #[test]
    fn test_custom_settings() {
        let settings = settings(&[
            ("HISTORY_DIR", "/var/lib/malaria"),
            ("MAX_UPLOAD_BYTES", "2048"),
            ("SYNTHETIC_SEED", "17"),
            ("SYNTHETIC_LATENCY", "false"),
        ])
        .unwrap();

        assert_eq!(settings.history.dir, PathBuf::from("/var/lib/malaria"));
        assert_eq!(settings.upload.max_bytes, 2048);
        assert_eq!(settings.synthetic.seed, Some(17));
        assert!(!settings.synthetic.simulate_latency);
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(matches!(
            settings(&[("MAX_UPLOAD_BYTES", "ten")]),
            Err(SettingsError::ParseError("MAX_UPLOAD_BYTES"))
        ));
        assert!(matches!(
            settings(&[("SYNTHETIC_LATENCY", "sometimes")]),
            Err(SettingsError::ParseError("SYNTHETIC_LATENCY"))
        ));
    }
}
