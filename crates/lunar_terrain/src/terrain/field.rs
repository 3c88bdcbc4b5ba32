//! A generated feature field and its fixed-column table form.
//!
//! The table has one header row followed by one row per feature, columns
//! `x,y,diameter,height,type,rot_x,rot_y,rot_z,z_shift`. Floats are written in their
//! shortest round-trip form, so reading a table back yields bit-identical features.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::terrain::placer::{FieldPlacer, PlacementOptions};
use crate::terrain::size_frequency::SizeFrequencyModel;
use crate::terrain::{Feature, FeatureKind};

/// Column order of the feature table.
pub const TABLE_COLUMNS: [&str; 9] = [
    "x", "y", "diameter", "height", "type", "rot_x", "rot_y", "rot_z", "z_shift",
];

/// Ordered features plus the parameters and seed that produced them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureField {
    kind: FeatureKind,
    target_cfa: f64,
    needed_cfa: f64,
    achieved_cfa: f64,
    size_x: f64,
    size_y: f64,
    origin_x: f64,
    origin_y: f64,
    d_min: f64,
    d_max: f64,
    seed: u64,
    batches: usize,
    options: PlacementOptions,
    features: Vec<Feature>,
}

impl FeatureField {
    pub(crate) fn new(
        placer: &FieldPlacer,
        model: &SizeFrequencyModel,
        seed: u64,
        achieved_cfa: f64,
        batches: usize,
        features: Vec<Feature>,
    ) -> Self {
        Self {
            kind: placer.kind,
            target_cfa: model.k(),
            needed_cfa: model.needed_cfa(),
            achieved_cfa,
            size_x: placer.extent.x,
            size_y: placer.extent.y,
            origin_x: placer.origin.x,
            origin_y: placer.origin.y,
            d_min: model.d_min(),
            d_max: model.d_max(),
            seed,
            batches,
            options: placer.options.clone(),
            features,
        }
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    /// Total coverage `k` the field was drawn for.
    pub fn target_cfa(&self) -> f64 {
        self.target_cfa
    }

    /// Coverage the placer stopped at: `k·exp(−q·d_min)`.
    pub fn needed_cfa(&self) -> f64 {
        self.needed_cfa
    }

    /// Coverage reached during placement.
    pub fn achieved_cfa(&self) -> f64 {
        self.achieved_cfa
    }

    /// Field size `(size_x, size_y)` in meters.
    pub fn size(&self) -> (f64, f64) {
        (self.size_x, self.size_y)
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.origin_y)
    }

    pub fn diameter_range(&self) -> (f64, f64) {
        (self.d_min, self.d_max)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn options(&self) -> &PlacementOptions {
        &self.options
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Coverage recomputed from the features: `Σ π/4·dᵢ² / area`.
    pub fn coverage(&self) -> f64 {
        let area = self.size_x * self.size_y;
        self.features.iter().map(|f| f.footprint() / area).sum()
    }

    /// Rebuild the placer this field came from, for regeneration from [`FeatureField::seed`].
    pub fn placer(&self) -> FieldPlacer {
        FieldPlacer::new(
            self.kind,
            self.target_cfa,
            glam::DVec2::new(self.size_x, self.size_y),
            self.d_min,
        )
        .with_max_diameter(self.d_max)
        .with_origin(glam::DVec2::new(self.origin_x, self.origin_y))
        .with_options(self.options.clone())
    }

    /// Write the feature table.
    pub fn write_table<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = BufWriter::new(writer);
        writeln!(w, "{}", TABLE_COLUMNS.join(","))?;
        for f in &self.features {
            writeln!(
                w,
                "{},{},{},{},{},{},{},{},{}",
                f.x, f.y, f.diameter, f.height, f.type_index, f.rot_x, f.rot_y, f.rot_z, f.z_shift
            )?;
        }
        w.flush()?;
        Ok(())
    }

    /// Write the feature table to `path`, creating parent directories.
    pub fn save_table(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_table(File::create(path)?)
    }
}

/// Read a feature table written by [`FeatureField::write_table`].
pub fn read_feature_table<R: BufRead>(reader: R) -> Result<Vec<Feature>> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| Error::Config("feature table is empty".into()))?;
    let columns: Vec<&str> = header.trim().split(',').map(str::trim).collect();
    if columns != TABLE_COLUMNS {
        return Err(Error::Config(format!(
            "feature table header {columns:?} does not match {TABLE_COLUMNS:?}"
        )));
    }

    let mut features = Vec::new();
    for (row, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        features.push(parse_row(&line).map_err(|e| {
            Error::Config(format!("feature table row {}: {e}", row + 1))
        })?);
    }
    Ok(features)
}

/// Read a feature table from `path`.
pub fn load_feature_table(path: impl AsRef<Path>) -> Result<Vec<Feature>> {
    read_feature_table(BufReader::new(File::open(path)?))
}

fn parse_row(line: &str) -> std::result::Result<Feature, String> {
    let cells: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if cells.len() != TABLE_COLUMNS.len() {
        return Err(format!(
            "expected {} columns, found {}",
            TABLE_COLUMNS.len(),
            cells.len()
        ));
    }
    let num = |i: usize| {
        cells[i]
            .parse::<f64>()
            .map_err(|e| format!("column '{}': {e}", TABLE_COLUMNS[i]))
    };
    let type_index = cells[4]
        .parse::<u32>()
        .map_err(|e| format!("column 'type': {e}"))?;
    Ok(Feature {
        x: num(0)?,
        y: num(1)?,
        diameter: num(2)?,
        height: num(3)?,
        type_index,
        rot_x: num(5)?,
        rot_y: num(6)?,
        rot_z: num(7)?,
        z_shift: num(8)?,
    })
}
