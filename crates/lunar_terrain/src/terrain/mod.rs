//! Statistical terrain features: size-frequency model, field placement and field tables.
use serde::{Deserialize, Serialize};

pub mod field;
pub mod placer;
pub mod size_frequency;

pub use field::{load_feature_table, read_feature_table, FeatureField, TABLE_COLUMNS};
pub use placer::{FieldPlacer, HeightLaw, PlacementOptions, DEFAULT_MAX_BATCHES};
pub use size_frequency::{footprint, SizeFrequencyModel, DEFAULT_MAX_DIAMETER};

/// Kind of surface feature a field holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Rock,
    Crater,
}

impl FeatureKind {
    /// Stem used for this kind's table file.
    pub fn file_stem(self) -> &'static str {
        match self {
            FeatureKind::Rock => "rock_field",
            FeatureKind::Crater => "crater_field",
        }
    }
}

/// A placed rock or crater. Lengths are in meters, angles in radians.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub x: f64,
    pub y: f64,
    pub diameter: f64,
    pub height: f64,
    /// Index into the shape catalog.
    #[serde(rename = "type")]
    pub type_index: u32,
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
    pub z_shift: f64,
}

impl Feature {
    /// Footprint `π/4·D²`.
    pub fn footprint(&self) -> f64 {
        footprint(self.diameter)
    }
}
