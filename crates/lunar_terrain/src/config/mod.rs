//! Strongly-typed dataset configuration.
//!
//! The document is YAML with `!include` support and dotted-path overrides (see
//! [`loader::ConfigLoader`] and [`overrides::OverrideExpr`]). After merging it is deserialized
//! into [`DatasetConfig`] and validated once, before any generation starts.
use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sampling::{DistributionSpec, Trajectory};
use crate::terrain::{FeatureKind, HeightLaw, PlacementOptions};

pub mod loader;
pub mod overrides;

pub use loader::ConfigLoader;
pub use overrides::{OverrideExpr, PathSegment};

/// Ground resolution of a base raster when the mesh entry does not state one, in m/px.
pub const DEFAULT_SOURCE_RESOLUTION: f64 = 5.0;

/// Top-level job configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Master seed; every random stream of the job is derived from it.
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub rendering: RenderingConfig,
    pub base_mesh: BaseMeshConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub terrain: TerrainConfig,
    #[serde(default)]
    pub rendering_cases: RenderingCasesConfig,
}

impl DatasetConfig {
    /// Parse and validate a configuration from YAML text, without includes or overrides.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: DatasetConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_mesh.meshes.is_empty() {
            return Err(Error::Config("base_mesh.meshes is empty".into()));
        }
        for mesh in &self.base_mesh.meshes {
            if !(mesh.size_x > 0.0 && mesh.size_y > 0.0 && mesh.resolution > 0.0) {
                return Err(Error::Config(format!(
                    "mesh '{}' needs positive size_x, size_y and resolution",
                    mesh.path.display()
                )));
            }
        }
        if let Some(tiles) = &self.base_mesh.tiles {
            if let Some(bad) = tiles.iter().find(|&&t| t >= self.base_mesh.meshes.len()) {
                return Err(Error::Config(format!(
                    "base_mesh.tiles index {bad} out of range for {} meshes",
                    self.base_mesh.meshes.len()
                )));
            }
        }
        if self.terrain.samples == 0 {
            return Err(Error::Config("terrain.samples must be >= 1".into()));
        }
        if let Some(res) = self.terrain.desired_spatial_resolution {
            if !(res.is_finite() && res > 0.0) {
                return Err(Error::Config(format!(
                    "terrain.desired_spatial_resolution must be > 0, got {res}"
                )));
            }
        }
        for (kind, field) in self.terrain.fields() {
            field
                .validate()
                .map_err(|e| Error::Config(format!("terrain.{}: {e}", kind.file_stem())))?;
        }
        self.rendering_cases.validate()
    }

    /// Dataset name, falling back to `default`.
    pub fn name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(default)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraType {
    #[default]
    #[serde(rename = "ORTHO", alias = "ortho")]
    Ortho,
    #[serde(rename = "PERSP", alias = "persp")]
    Persp,
}

/// Settings for the rendering collaborator. Keys not named here are passed through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderingConfig {
    #[serde(default)]
    pub camera_type: CameraType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_x: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_y: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseMeshConfig {
    pub meshes: Vec<MeshEntry>,
    #[serde(default)]
    pub material: Option<String>,
    /// Subset of `meshes` to use, by index. All meshes when absent.
    #[serde(default)]
    pub tiles: Option<Vec<usize>>,
}

/// One base elevation tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshEntry {
    pub path: PathBuf,
    /// Tile size in meters.
    pub size_x: f64,
    pub size_y: f64,
    /// Source raster ground resolution in m/px.
    #[serde(default = "default_source_resolution")]
    pub resolution: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub save_flag: bool,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_flag: true,
            output_root: default_output_root(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    #[serde(default)]
    pub desired_spatial_resolution: Option<f64>,
    /// Independent terrain realizations per base mesh.
    #[serde(default = "default_one")]
    pub samples: usize,
    #[serde(default)]
    pub rock_field: Option<FieldConfig>,
    #[serde(default)]
    pub crater_field: Option<FieldConfig>,
}

impl TerrainConfig {
    /// Enabled field sections, rocks first.
    pub fn fields(&self) -> impl Iterator<Item = (FeatureKind, &FieldConfig)> {
        [
            (FeatureKind::Rock, self.rock_field.as_ref()),
            (FeatureKind::Crater, self.crater_field.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, field)| field.filter(|f| f.enabled).map(|f| (kind, f)))
    }
}

/// Rock or crater field section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shape catalog for the renderer (`procedural` or a directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rock_source: Option<String>,
    /// Smallest diameter placed, in meters.
    pub h_min: f64,
    /// Largest diameter of the size-frequency grid, in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_max: Option<f64>,
    /// Total CFA `k`, drawn once per terrain sample.
    #[serde(alias = "cfa", alias = "CFA")]
    pub density: DistributionSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_law: Option<HeightLaw>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_size: Option<u32>,
    /// Vertical jitter range `[min, max]` as a fraction of the diameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_shift: Option<[f64; 2]>,
}

impl FieldConfig {
    pub fn placement_options(&self, kind: FeatureKind) -> PlacementOptions {
        let mut options = PlacementOptions::for_kind(kind);
        if let Some(law) = self.height_law {
            options = options.with_height_law(law);
        }
        if let Some(size) = self.catalog_size {
            options = options.with_catalog_size(size);
        }
        if let Some([min, max]) = self.z_shift {
            options = options.with_z_shift(min, max);
        }
        options
    }

    fn validate(&self) -> Result<()> {
        if !(self.h_min.is_finite() && self.h_min > 0.0) {
            return Err(Error::Config(format!("h_min must be > 0, got {}", self.h_min)));
        }
        if let Some(h_max) = self.h_max {
            if !(h_max > self.h_min) {
                return Err(Error::Config(format!(
                    "h_max {h_max} must exceed h_min {}",
                    self.h_min
                )));
            }
        }
        self.density.validate()?;
        // The kind only picks defaults; both kinds validate the same way.
        self.placement_options(FeatureKind::Rock).validate()
    }
}

/// Whether the terrain samples of one base mesh share a case list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePolicy {
    /// Every terrain sample draws its own case list.
    #[default]
    PerSample,
    /// One case list per base mesh, reused by each of its terrain samples.
    Shared,
}

/// Where render cases come from: sampled `distributions`, or a recorded `trajectory`.
///
/// A trajectory gives one case per step and replaces both `cases` and `distributions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderingCasesConfig {
    #[serde(default = "default_one")]
    pub cases: usize,
    #[serde(default)]
    pub case_policy: CasePolicy,
    #[serde(default)]
    pub distributions: BTreeMap<String, DistributionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Trajectory>,
}

impl RenderingCasesConfig {
    /// Cases per terrain sample.
    pub fn case_count(&self) -> usize {
        self.trajectory.as_ref().map_or(self.cases, Trajectory::len)
    }

    fn validate(&self) -> Result<()> {
        if let Some(trajectory) = &self.trajectory {
            if !self.distributions.is_empty() {
                return Err(Error::Config(
                    "rendering_cases: trajectory and distributions are exclusive".into(),
                ));
            }
            return trajectory
                .validate()
                .map_err(|e| Error::Config(format!("rendering_cases.trajectory: {e}")));
        }
        for (axis, spec) in &self.distributions {
            spec.validate()
                .map_err(|e| Error::Config(format!("rendering_cases.distributions.{axis}: {e}")))?;
        }
        Ok(())
    }
}

impl Default for RenderingCasesConfig {
    fn default() -> Self {
        Self {
            cases: 1,
            case_policy: CasePolicy::default(),
            distributions: BTreeMap::new(),
            trajectory: None,
        }
    }
}

fn default_source_resolution() -> f64 {
    DEFAULT_SOURCE_RESOLUTION
}

fn default_true() -> bool {
    true
}

fn default_one() -> usize {
    1
}

fn default_output_root() -> PathBuf {
    PathBuf::from("tmp")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
name: highlands
seed: 7
rendering:
  camera_type: ORTHO
  resolution_x: 512
  resolution_y: 512
  device: GPU
base_mesh:
  meshes:
    - path: dems/tile_a.tif
      size_x: 400
      size_y: 300
    - path: dems/tile_b.tif
      size_x: 200
      size_y: 200
      resolution: 2.0
  material: Regolith7_MAT
output:
  save_flag: true
  output_root: out
terrain:
  desired_spatial_resolution: 0.5
  samples: 2
  rock_field:
    rock_source: procedural
    h_min: 0.8
    h_max: 8.0
    density: 0.05
  crater_field:
    h_min: 3.0
    h_max: 40.0
    cfa:
      type: uniform
      min: 0.1
      max: 0.2
rendering_cases:
  cases: 4
  distributions:
    sun/elevation:
      type: grid_list
      values: [5.0, 30.0]
    sun/azimuth:
      type: grid
      min: 0
      max: 180
      n_values: 2
    camera/z:
      type: normal
      mean: 120
      std: 5
"#;

    /// [`SAMPLE`] with its case distributions replaced by a three-step trajectory.
    pub(crate) fn sample_with_trajectory() -> String {
        let head = SAMPLE.split("rendering_cases:").next().unwrap_or_default();
        format!(
            "{head}rendering_cases:
  case_policy: shared
  trajectory:
    scene: {{sun_elevation: 0.14, sun_azimuth: 90.0}}
    trajectory:
      - {{camera_x: -10, camera_y: 0, camera_z: 30, camera_pitch: -1.2, camera_yaw: 0}}
      - {{camera_x: 0, camera_y: 0, camera_z: 20, camera_pitch: -1.3, camera_yaw: 0}}
      - {{camera_x: 10, camera_y: 0, camera_z: 10, camera_pitch: -1.4, camera_yaw: 0}}
"
        )
    }

    #[test]
    fn parses_full_document() {
        let config = DatasetConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.name_or("x"), "highlands");
        assert_eq!(config.seed, 7);
        assert_eq!(config.rendering.camera_type, CameraType::Ortho);
        assert_eq!(config.rendering.resolution_x, Some(512));
        assert_eq!(
            config.rendering.extra.get("device"),
            Some(&serde_json::Value::from("GPU"))
        );
        assert_eq!(config.base_mesh.meshes[0].resolution, DEFAULT_SOURCE_RESOLUTION);
        assert_eq!(config.base_mesh.meshes[1].resolution, 2.0);
        assert_eq!(config.terrain.samples, 2);

        let crater = config.terrain.crater_field.as_ref().unwrap();
        assert_eq!(crater.density, DistributionSpec::Uniform { min: 0.1, max: 0.2 });
        assert_eq!(
            config.rendering_cases.distributions["sun/azimuth"],
            DistributionSpec::GridList {
                values: vec![0.0, 180.0]
            }
        );
        assert_eq!(config.rendering_cases.case_policy, CasePolicy::PerSample);
        assert_eq!(config.terrain.fields().count(), 2);
    }

    #[test]
    fn field_options_fall_back_to_kind_defaults() {
        let config = DatasetConfig::from_yaml_str(SAMPLE).unwrap();
        let rocks = config.terrain.rock_field.as_ref().unwrap();
        assert_eq!(
            rocks.placement_options(FeatureKind::Rock),
            PlacementOptions::rocks()
        );
        let craters = config.terrain.crater_field.as_ref().unwrap();
        assert_eq!(
            craters.placement_options(FeatureKind::Crater).height_law,
            HeightLaw::CRATER
        );
    }

    #[test]
    fn rejects_bad_distribution_tags() {
        let text = SAMPLE.replace("type: normal", "type: lognormal");
        let err = DatasetConfig::from_yaml_str(&text).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("lognormal"));
    }

    #[test]
    fn rejects_inconsistent_sections() {
        let text = SAMPLE.replace("samples: 2", "samples: 0");
        assert!(DatasetConfig::from_yaml_str(&text).unwrap_err().is_config());

        let text = SAMPLE.replace("h_max: 8.0", "h_max: 0.5");
        assert!(DatasetConfig::from_yaml_str(&text).unwrap_err().is_config());

        let text = SAMPLE.replace("  material: Regolith7_MAT", "  tiles: [0, 5]");
        assert!(DatasetConfig::from_yaml_str(&text).unwrap_err().is_config());
    }

    #[test]
    fn trajectory_replaces_case_count() {
        let config = DatasetConfig::from_yaml_str(&sample_with_trajectory()).unwrap();
        let cases = &config.rendering_cases;
        assert!(cases.distributions.is_empty());
        assert_eq!(cases.trajectory.as_ref().map(|t| t.len()), Some(3));
        assert_eq!(cases.case_count(), 3);

        let defaults = DatasetConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(defaults.rendering_cases.case_count(), 4);
    }

    #[test]
    fn trajectory_excludes_distributions() {
        let text = sample_with_trajectory().replace(
            "  case_policy: shared\n",
            "  distributions:\n    sun/elevation: 10\n",
        );
        let err = DatasetConfig::from_yaml_str(&text).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("exclusive"));
    }

    #[test]
    fn disabled_fields_are_skipped() {
        let text = SAMPLE.replace("    rock_source: procedural", "    enabled: false");
        let config = DatasetConfig::from_yaml_str(&text).unwrap();
        let kinds: Vec<FeatureKind> = config.terrain.fields().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![FeatureKind::Crater]);
    }
}
