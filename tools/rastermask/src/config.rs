//! Batch job file for the `mask` subcommand.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use raster_core::{CellType, DEFAULT_NODATA};

/// One input/output pair. Optional fields fall back to the file-level
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEntry {
    pub input: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub default_value: Option<f64>,
    #[serde(default)]
    pub out_type: Option<CellType>,
}

/// Batch mask job file:
///
/// ```yaml
/// mask: watershed_mask
/// default_value: -9999
/// jobs:
///   - input: dem
///     output: dem_clipped
///   - input: landuse
///     out_type: uint8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskJobFile {
    pub mask: String,
    #[serde(default = "default_fill")]
    pub default_value: f64,
    #[serde(default)]
    pub out_type: Option<CellType>,
    pub jobs: Vec<JobEntry>,
}

fn default_fill() -> f64 {
    DEFAULT_NODATA
}

/// A mask-extraction job with every field resolved.
#[derive(Debug, Clone)]
pub struct MaskJob {
    pub input: String,
    pub output: String,
    pub default_value: f64,
    pub out_type: Option<CellType>,
}

impl MaskJobFile {
    /// Load a job file from YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: MaskJobFile = serde_yaml::from_str(&content)?;
        Ok(file)
    }

    /// Validate the job file.
    pub fn validate(&self) -> Result<()> {
        if self.mask.is_empty() {
            anyhow::bail!("mask name must not be empty");
        }
        if self.jobs.is_empty() {
            anyhow::bail!("at least one job must be specified");
        }
        for job in &self.jobs {
            if job.input.is_empty() {
                anyhow::bail!("job input name must not be empty");
            }
        }
        Ok(())
    }

    /// Expand entries into concrete jobs with defaults applied.
    pub fn resolve(&self) -> Vec<MaskJob> {
        self.jobs
            .iter()
            .map(|entry| MaskJob {
                input: entry.input.clone(),
                output: entry
                    .output
                    .clone()
                    .unwrap_or_else(|| format!("{}_masked", entry.input)),
                default_value: entry.default_value.unwrap_or(self.default_value),
                out_type: entry.out_type.or(self.out_type),
            })
            .collect()
    }
}
