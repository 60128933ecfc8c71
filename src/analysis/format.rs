//! The saved form of an analysis.

use crate::error::{Result, SheetError};
use crate::steps::Params;
use crate::types::{PublicInterfaceVersion, StepId};
use serde::{Deserialize, Serialize};

/// Version written into new analyses.
pub const ANALYSIS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One saved step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    pub step_version: u32,
    pub step_type: String,
    #[serde(default)]
    pub step_id: Option<StepId>,
    #[serde(default)]
    pub params: Params,
}

impl StepData {
    pub fn new(step_type: &str, step_version: u32, params: Params) -> Self {
        StepData {
            step_version,
            step_type: step_type.to_string(),
            step_id: None,
            params,
        }
    }
}

/// A named list of steps that can be replayed on a fresh session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub version: String,
    #[serde(default = "legacy_interface_version")]
    pub public_interface_version: PublicInterfaceVersion,
    pub steps_data: Vec<StepData>,
}

/// Analyses saved before the version was recorded used the first function set.
fn legacy_interface_version() -> PublicInterfaceVersion {
    PublicInterfaceVersion::V1
}

impl Analysis {
    pub fn new(public_interface_version: PublicInterfaceVersion, steps_data: Vec<StepData>) -> Self {
        Analysis {
            version: ANALYSIS_VERSION.to_string(),
            public_interface_version,
            steps_data,
        }
    }

    /// Parse an analysis, accepting the legacy `steps` dictionary where each
    /// entry carries its params inline next to `step_type` and `step_version`.
    pub fn from_json(text: &str) -> Result<Analysis> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("steps_data").is_some() {
            return Ok(serde_json::from_value(value)?);
        }
        let steps = value
            .get("steps")
            .and_then(|s| s.as_object())
            .ok_or_else(|| SheetError::InvalidFormat("analysis has neither steps_data nor steps".into()))?;

        let mut keyed: Vec<(usize, &serde_json::Value)> = steps
            .iter()
            .map(|(k, v)| {
                k.parse::<usize>()
                    .map(|i| (i, v))
                    .map_err(|_| SheetError::InvalidFormat(format!("step key {} is not an index", k)))
            })
            .collect::<Result<_>>()?;
        keyed.sort_by_key(|(i, _)| *i);

        let mut steps_data = Vec::with_capacity(keyed.len());
        for (i, step) in keyed {
            let mut params = step
                .as_object()
                .cloned()
                .ok_or_else(|| SheetError::InvalidFormat(format!("step {} is not an object", i)))?;
            let step_type = params
                .remove("step_type")
                .and_then(|t| t.as_str().map(str::to_string))
                .ok_or_else(|| SheetError::InvalidFormat(format!("step {} has no step_type", i)))?;
            let step_version = params
                .remove("step_version")
                .and_then(|v| v.as_u64())
                .unwrap_or(1) as u32;
            let step_id = params
                .remove("step_id")
                .and_then(|v| v.as_str().map(|s| StepId(s.to_string())));
            steps_data.push(StepData {
                step_version,
                step_type,
                step_id,
                params,
            });
        }

        let public_interface_version = match value.get("public_interface_version") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => legacy_interface_version(),
        };
        Ok(Analysis {
            version: value
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or("0.0.0")
                .to_string(),
            public_interface_version,
            steps_data,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
