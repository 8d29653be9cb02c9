//! Codec option-tree loading.
//!
//! The codec is configured from a declarative JSON file. On top of
//! whatever the file says, the harness injects one fixed pair so every
//! engine collects the size and time figures the diagnostic records need.

use roibench_core::SetupError;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

/// Load the codec option tree, or start from an empty object when no file
/// is given, and inject the fixed metrics pair.
pub fn load_codec_options(path: Option<&Path>) -> Result<Value, SetupError> {
    let mut tree = match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| {
                SetupError::Config(format!("codec config {}: {e}", path.display()))
            })?;
            serde_json::from_str(&text).map_err(|e| {
                SetupError::Config(format!("codec config {}: {e}", path.display()))
            })?
        }
        None => json!({}),
    };

    let Value::Object(ref mut obj) = tree else {
        return Err(SetupError::Config(
            "codec config must be a JSON object".into(),
        ));
    };
    obj.insert("metrics".into(), json!({ "plugins": ["size", "time"] }));
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn injects_metrics_pair_into_empty_tree() {
        let tree = load_codec_options(None).unwrap();
        assert_eq!(tree["metrics"]["plugins"][0], "size");
        assert_eq!(tree["metrics"]["plugins"][1], "time");
    }

    #[test]
    fn file_options_are_preserved() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"lz4": {{"acceleration": 4}}}}"#).unwrap();

        let tree = load_codec_options(Some(file.path())).unwrap();
        assert_eq!(tree["lz4"]["acceleration"], 4);
        assert_eq!(tree["metrics"]["plugins"][1], "time");
    }

    #[test]
    fn non_object_tree_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["size", "time"]"#).unwrap();
        assert!(matches!(
            load_codec_options(Some(file.path())),
            Err(SetupError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            load_codec_options(Some(Path::new("/nonexistent/options.json"))),
            Err(SetupError::Config(_))
        ));
    }
}
