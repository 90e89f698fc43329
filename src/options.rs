use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{components::Interpolation, errors::Result};

/// Per-dataset tuning knobs.
///
/// Every field is optional when deserialized; missing keys keep their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Window size in meters used by single point sampling. Must stay above zero.
    pub point_sample_size: f64,
    /// Source pixels read per output pixel before the driver is asked to decimate.
    pub read_oversampling: usize,
    pub default_interpolation: Interpolation,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            point_sample_size: 1e-4,
            read_oversampling: 2,
            default_interpolation: Interpolation::Nearest,
        }
    }
}

impl Options {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_keep_defaults() {
        let options = Options::from_json_str(r#"{ "read_oversampling": 4 }"#).unwrap();
        assert_eq!(options.read_oversampling, 4);
        assert_eq!(options.point_sample_size, 1e-4);
        assert_eq!(options.default_interpolation, Interpolation::Nearest);
    }

    #[test]
    fn interpolation_is_lowercase() {
        let options = Options::from_json_str(r#"{ "default_interpolation": "bilinear" }"#).unwrap();
        assert_eq!(options.default_interpolation, Interpolation::Bilinear);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "point_sample_size": 0.5 }}"#).unwrap();
        let options = Options::from_json_file(file.path()).unwrap();
        assert_eq!(options.point_sample_size, 0.5);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            Options::from_json_str("{ nope"),
            Err(crate::errors::GeodataError::ConfigError(_))
        ));
    }
}
