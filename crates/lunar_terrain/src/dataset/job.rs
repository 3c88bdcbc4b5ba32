//! The fully materialized dataset job.
//!
//! A [`DatasetJob`] holds no unresolved randomness: every field, feature and case value is
//! stored, so a job read back from JSON replays exactly without touching a generator.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{CasePolicy, RenderingConfig};
use crate::error::{Error, Result};
use crate::sampling::RenderCase;
use crate::terrain::{FeatureField, FeatureKind};

/// File name of the serialized job at the dataset root.
pub const JOB_FILE: &str = "job.json";
/// File name of the case records inside each terrain directory.
pub const CASES_FILE: &str = "cases.json";

/// A base elevation tile as the mesh collaborator needs it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshInfo {
    pub path: PathBuf,
    /// File stem used to name output directories.
    pub stem: String,
    pub size_x: f64,
    pub size_y: f64,
}

/// Resampling applied to a base mesh to reach the requested ground resolution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleParameters {
    /// Source raster resolution, m/px.
    pub source_resolution: f64,
    /// Requested resolution, m/px.
    pub desired_resolution: f64,
    /// `source / desired`; above 1 the raster is oversampled.
    pub zoom_factor: f64,
}

impl ScaleParameters {
    pub fn new(source_resolution: f64, desired_resolution: Option<f64>) -> Result<Self> {
        if !(source_resolution.is_finite() && source_resolution > 0.0) {
            return Err(Error::Config(format!(
                "source resolution must be > 0, got {source_resolution}"
            )));
        }
        let desired_resolution = desired_resolution.unwrap_or(source_resolution);
        if !(desired_resolution.is_finite() && desired_resolution > 0.0) {
            return Err(Error::Config(format!(
                "desired spatial resolution must be > 0, got {desired_resolution}"
            )));
        }
        Ok(Self {
            source_resolution,
            desired_resolution,
            zoom_factor: source_resolution / desired_resolution,
        })
    }

    /// Raster size in pixels after resampling a tile of `size` meters.
    pub fn pixels(&self, size: f64) -> u64 {
        (size / self.desired_resolution).round().max(1.0) as u64
    }
}

/// One terrain realization: a base mesh, its feature fields and its render cases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainJob {
    pub mesh_index: usize,
    pub sample_index: usize,
    pub mesh: MeshInfo,
    pub scale: ScaleParameters,
    /// Seed of the stream the per-sample field parameters were drawn from.
    pub seed: u64,
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rock_field: Option<FeatureField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crater_field: Option<FeatureField>,
    pub cases: Vec<RenderCase>,
}

impl TerrainJob {
    pub fn field(&self, kind: FeatureKind) -> Option<&FeatureField> {
        match kind {
            FeatureKind::Rock => self.rock_field.as_ref(),
            FeatureKind::Crater => self.crater_field.as_ref(),
        }
    }

    /// Present fields, rocks first.
    pub fn fields(&self) -> impl Iterator<Item = &FeatureField> {
        self.rock_field.iter().chain(self.crater_field.iter())
    }

    pub fn completed_cases(&self) -> usize {
        self.cases.iter().filter(|c| c.is_rendered()).count()
    }

    /// `terrain_<NN>` label used in logs and directory names.
    pub fn label(&self) -> String {
        format!("{}/terrain_{:02}", self.mesh.stem, self.sample_index)
    }

    /// Write the case records of this terrain as JSON.
    pub fn write_cases<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut w, &self.cases)?;
        w.flush()?;
        Ok(())
    }
}

/// A dataset job with every random choice resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetJob {
    pub name: String,
    /// Master seed every stream of the job was derived from.
    pub seed: u64,
    pub output_dir: PathBuf,
    pub save_flag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    pub case_policy: CasePolicy,
    pub rendering: RenderingConfig,
    pub terrains: Vec<TerrainJob>,
}

impl DatasetJob {
    /// Total cases across all terrains: `meshes × samples × cases`.
    pub fn planned_cases(&self) -> usize {
        self.terrains.iter().map(|t| t.cases.len()).sum()
    }

    /// Cases for which the renderer has reported files.
    pub fn completed_cases(&self) -> usize {
        self.terrains.iter().map(TerrainJob::completed_cases).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_cases() == self.planned_cases()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Write the job as JSON to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut w = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut w, self)?;
        w.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Path of the serialized job inside the output directory.
    pub fn job_path(&self) -> PathBuf {
        self.output_dir.join(JOB_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_parameters_follow_resolution_ratio() {
        let scale = ScaleParameters::new(5.0, Some(0.5)).unwrap();
        assert_eq!(scale.zoom_factor, 10.0);
        assert_eq!(scale.pixels(400.0), 800);

        let identity = ScaleParameters::new(5.0, None).unwrap();
        assert_eq!(identity.zoom_factor, 1.0);
        assert_eq!(identity.desired_resolution, 5.0);

        assert!(ScaleParameters::new(5.0, Some(0.0)).unwrap_err().is_config());
        assert!(ScaleParameters::new(-1.0, None).unwrap_err().is_config());
    }

    #[test]
    fn malformed_job_json_is_a_config_error() {
        assert!(DatasetJob::from_json("{\"name\": 3}").unwrap_err().is_config());
    }
}
