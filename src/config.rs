//! Engine configuration.

use crate::types::PublicInterfaceVersion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for rendering the generated script.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeOptions {
    /// Wrap the script in a function.
    pub as_function: bool,
    pub function_name: String,
    /// Parameter name → literal value it replaces in the script (e.g. a file path).
    pub function_params: Vec<(String, String)>,
}

impl CodeOptions {
    pub fn function_name(&self) -> &str {
        if self.function_name.is_empty() {
            "function"
        } else {
            &self.function_name
        }
    }
}

/// Configuration for a [`crate::StepsManager`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows per table included in sheet data sent to the host.
    /// Default: 1500
    pub preview_rows: usize,

    /// Fuse redundant chunks when generating code.
    /// Default: true
    pub optimize: bool,

    /// Verify state invariants after every step.
    /// Default: true
    pub check_invariants: bool,

    /// Version of the sheet functions formulas and generated code target.
    pub public_interface_version: PublicInterfaceVersion,

    /// Directory for saved analyses (None = saving disabled).
    pub analysis_dir: Option<PathBuf>,

    /// Loaded analyses kept in memory.
    /// Default: 32
    pub analysis_cache_size: usize,

    pub code_options: CodeOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preview_rows: 1500,
            optimize: true,
            check_invariants: true,
            public_interface_version: PublicInterfaceVersion::CURRENT,
            analysis_dir: None,
            analysis_cache_size: 32,
            code_options: CodeOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"optimize": false, "public_interface_version": 1}"#).unwrap();
        assert!(!config.optimize);
        assert!(config.check_invariants);
        assert_eq!(config.preview_rows, 1500);
        assert_eq!(config.public_interface_version, PublicInterfaceVersion::V1);
    }
}
