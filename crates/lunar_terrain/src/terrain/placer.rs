//! Coverage-driven placement of rocks and craters.
//!
//! Diameters are drawn in batches through [`SizeFrequencyModel::inverse_cdf`] until the pool
//! covers the coverage contributed by features at or above `d_min`. The leading samples of the
//! final batch are kept only while coverage stays at or under that target. Positions are
//! uniform over the field; overlap is accepted.
use std::f64::consts::TAU;

use glam::DVec2;
use rand::rngs::StdRng;
use rand::{Rng as RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::sampling::{rand01, uniform};
use crate::terrain::field::FeatureField;
use crate::terrain::size_frequency::{footprint, SizeFrequencyModel, DEFAULT_MAX_DIAMETER};
use crate::terrain::{Feature, FeatureKind};

/// Batch budget before a coverage target is declared unreachable.
pub const DEFAULT_MAX_BATCHES: usize = 10_000;
/// Field area, in square meters, per diameter drawn in one batch.
const AREA_PER_BATCH_SAMPLE: f64 = 100.0;
const MAX_BATCH_SIZE: usize = 1 << 20;

/// Height of a feature as a function of its diameter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum HeightLaw {
    /// `H = ratio·D`.
    Proportional { ratio: f64 },
    /// `H = r·D` with `r` uniform in `[min, max]`.
    UniformRatio { min: f64, max: f64 },
}

impl HeightLaw {
    /// Rocks: half the diameter.
    pub const ROCK: HeightLaw = HeightLaw::Proportional { ratio: 0.5 };
    /// Craters: depth of a fifth of the diameter.
    pub const CRATER: HeightLaw = HeightLaw::Proportional { ratio: 0.2 };

    pub fn height(&self, diameter: f64, rng: &mut dyn RngCore) -> f64 {
        match *self {
            HeightLaw::Proportional { ratio } => ratio * diameter,
            HeightLaw::UniformRatio { min, max } => uniform(rng, min, max) * diameter,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            HeightLaw::Proportional { ratio } if ratio.is_finite() && ratio >= 0.0 => Ok(()),
            HeightLaw::UniformRatio { min, max }
                if min.is_finite() && max.is_finite() && 0.0 <= min && min <= max =>
            {
                Ok(())
            }
            other => Err(Error::Config(format!("invalid height law {other:?}"))),
        }
    }
}

/// Per-feature attribute laws.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementOptions {
    pub height_law: HeightLaw,
    /// Shape catalog size; type indices are uniform in `0..catalog_size`.
    pub catalog_size: u32,
    /// Vertical jitter range as a fraction of the diameter.
    pub z_shift_min: f64,
    pub z_shift_max: f64,
}

impl PlacementOptions {
    pub fn rocks() -> Self {
        Self {
            height_law: HeightLaw::ROCK,
            catalog_size: 15,
            z_shift_min: -0.4,
            z_shift_max: 0.1,
        }
    }

    pub fn craters() -> Self {
        Self {
            height_law: HeightLaw::CRATER,
            catalog_size: 1,
            z_shift_min: 0.0,
            z_shift_max: 0.0,
        }
    }

    pub fn for_kind(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::Rock => Self::rocks(),
            FeatureKind::Crater => Self::craters(),
        }
    }

    pub fn with_height_law(mut self, law: HeightLaw) -> Self {
        self.height_law = law;
        self
    }

    pub fn with_catalog_size(mut self, catalog_size: u32) -> Self {
        self.catalog_size = catalog_size;
        self
    }

    pub fn with_z_shift(mut self, min: f64, max: f64) -> Self {
        self.z_shift_min = min;
        self.z_shift_max = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.height_law.validate()?;
        if self.catalog_size == 0 {
            return Err(Error::Config("catalog_size must be >= 1".into()));
        }
        if !(self.z_shift_min.is_finite()
            && self.z_shift_max.is_finite()
            && self.z_shift_min <= self.z_shift_max)
        {
            return Err(Error::Config(format!(
                "z_shift range [{}, {}] is invalid",
                self.z_shift_min, self.z_shift_max
            )));
        }
        Ok(())
    }
}

/// Places one field of features over a rectangle.
#[derive(Clone, Debug)]
pub struct FieldPlacer {
    pub kind: FeatureKind,
    /// Target cumulative fractional area.
    pub k: f64,
    /// Field size in meters.
    pub extent: DVec2,
    /// Lower-left corner of the field.
    pub origin: DVec2,
    pub d_min: f64,
    pub d_max: f64,
    pub options: PlacementOptions,
    pub max_batches: usize,
}

impl FieldPlacer {
    pub fn new(kind: FeatureKind, k: f64, extent: DVec2, d_min: f64) -> Self {
        Self {
            kind,
            k,
            extent,
            origin: DVec2::ZERO,
            d_min,
            d_max: DEFAULT_MAX_DIAMETER,
            options: PlacementOptions::for_kind(kind),
            max_batches: DEFAULT_MAX_BATCHES,
        }
    }

    pub fn with_max_diameter(mut self, d_max: f64) -> Self {
        self.d_max = d_max;
        self
    }

    pub fn with_origin(mut self, origin: DVec2) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_options(mut self, options: PlacementOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = max_batches;
        self
    }

    /// Number of diameters drawn per batch, scaled to the field area.
    pub fn batch_size(&self) -> usize {
        let n = (self.area() / AREA_PER_BATCH_SAMPLE).floor();
        if n.is_finite() && n >= 1.0 {
            (n as usize).min(MAX_BATCH_SIZE)
        } else {
            1
        }
    }

    pub fn area(&self) -> f64 {
        self.extent.x * self.extent.y
    }

    /// Generate the field from `seed`. The same placer and seed always give the same field.
    pub fn place(&self, seed: u64) -> Result<FeatureField> {
        if !(self.extent.is_finite() && self.extent.x > 0.0 && self.extent.y > 0.0) {
            return Err(Error::Domain(format!(
                "field extent must be > 0 in both components, got {}x{}",
                self.extent.x, self.extent.y
            )));
        }
        if !self.origin.is_finite() {
            return Err(Error::Domain("field origin must be finite".into()));
        }
        self.options.validate()?;
        let model = SizeFrequencyModel::new(self.k, self.d_min, self.d_max)?;

        let mut rng = StdRng::seed_from_u64(seed);
        let area = self.area();
        let needed = model.needed_cfa();
        let batch_size = self.batch_size();

        let mut diameters: Vec<f64> = Vec::new();
        let mut achieved = 0.0;
        let mut batches = 0;
        'batches: loop {
            if batches == self.max_batches {
                return Err(Error::CfaUnreachable {
                    target_cfa: needed,
                    achieved_cfa: achieved,
                    batches,
                    seed,
                });
            }
            batches += 1;

            let batch: Vec<f64> = (0..batch_size)
                .map(|_| model.inverse_cdf(rand01(&mut rng)))
                .collect();
            for d in batch {
                let contribution = footprint(d) / area;
                if achieved + contribution > needed {
                    break 'batches;
                }
                achieved += contribution;
                diameters.push(d);
                if achieved >= needed {
                    break 'batches;
                }
            }
        }

        if diameters.is_empty() {
            warn!(
                "{:?} field: first draw overshoots the needed CFA {:.3e} (seed {}).",
                self.kind, needed, seed
            );
            return Err(Error::Domain(format!(
                "no {:?} features generated: k={}, d_min={}, d_max={}, area={} m^2, \
                 needed CFA {:.3e}, seed {}",
                self.kind, self.k, self.d_min, self.d_max, area, needed, seed
            )));
        }

        let features: Vec<Feature> = diameters
            .into_iter()
            .map(|d| self.dress(d, &mut rng))
            .collect();

        info!(
            "{:?} field: {} features, CFA {:.3}% of target {:.3}% in {} batches (seed {}).",
            self.kind,
            features.len(),
            achieved * 100.0,
            needed * 100.0,
            batches,
            seed
        );

        Ok(FeatureField::new(self, &model, seed, achieved, batches, features))
    }

    fn dress(&self, diameter: f64, rng: &mut dyn RngCore) -> Feature {
        let x = self.origin.x + uniform(rng, 0.0, self.extent.x);
        let y = self.origin.y + uniform(rng, 0.0, self.extent.y);
        let height = self.options.height_law.height(diameter, rng);
        let catalog = self.options.catalog_size;
        let type_index = ((rand01(rng) * catalog as f64) as u32).min(catalog - 1);
        let rot_x = uniform(rng, 0.0, TAU);
        let rot_y = uniform(rng, 0.0, TAU);
        let rot_z = uniform(rng, 0.0, TAU);
        let z_shift = uniform(rng, self.options.z_shift_min, self.options.z_shift_max) * diameter;
        Feature {
            x,
            y,
            diameter,
            height,
            type_index,
            rot_x,
            rot_y,
            rot_z,
            z_shift,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rocks(k: f64, size: f64, d_min: f64) -> FieldPlacer {
        FieldPlacer::new(FeatureKind::Rock, k, DVec2::splat(size), d_min)
    }

    #[test]
    fn coverage_stays_within_one_feature_of_target() {
        let cases = [(0.02, 0.5, 1u64), (0.06, 0.6, 2), (0.15, 1.0, 3), (0.4, 2.0, 4)];
        for (k, d_min, seed) in cases {
            let placer = rocks(k, 200.0, d_min).with_max_diameter(10.0);
            let field = placer.place(seed).unwrap();
            let needed = field.needed_cfa();
            let achieved = field.coverage();
            assert!(achieved <= needed + 1e-12, "k={k}: {achieved} > {needed}");
            assert!(
                needed - achieved <= footprint(10.0) / placer.area(),
                "k={k}: undershoot {}",
                needed - achieved
            );
            assert!((achieved - field.achieved_cfa()).abs() < 1e-9);
        }
    }

    #[test]
    fn diameters_lie_in_bounds() {
        let field = rocks(0.1, 300.0, 0.8).with_max_diameter(6.0).place(5).unwrap();
        assert!(!field.features().is_empty());
        for f in field.features() {
            assert!((0.8..=6.0).contains(&f.diameter), "diameter {}", f.diameter);
        }
    }

    #[test]
    fn same_seed_gives_bit_identical_fields() {
        let placer = rocks(0.08, 250.0, 0.7).with_origin(DVec2::new(-125.0, -125.0));
        let a = placer.place(42).unwrap();
        let b = placer.place(42).unwrap();
        let c = placer.place(43).unwrap();
        assert_eq!(a.features(), b.features());
        assert_eq!(a.seed(), 42);
        assert_ne!(a.features(), c.features());
    }

    #[test]
    fn attributes_follow_their_laws() {
        let placer = rocks(0.1, 100.0, 0.5).with_origin(DVec2::new(10.0, -20.0));
        let field = placer.place(9).unwrap();
        for f in field.features() {
            assert!((10.0..110.0).contains(&f.x));
            assert!((-20.0..80.0).contains(&f.y));
            assert_eq!(f.height, 0.5 * f.diameter);
            assert!(f.type_index < 15);
            for angle in [f.rot_x, f.rot_y, f.rot_z] {
                assert!((0.0..TAU).contains(&angle));
            }
            assert!(f.z_shift >= -0.4 * f.diameter && f.z_shift <= 0.1 * f.diameter);
        }
    }

    #[test]
    fn craters_use_their_own_height_law() {
        let law = HeightLaw::UniformRatio { min: 0.1, max: 0.3 };
        let field = FieldPlacer::new(FeatureKind::Crater, 0.2, DVec2::new(400.0, 200.0), 2.0)
            .with_max_diameter(30.0)
            .with_options(PlacementOptions::craters().with_height_law(law))
            .place(17)
            .unwrap();
        assert_eq!(field.kind(), FeatureKind::Crater);
        for f in field.features() {
            assert!(f.height >= 0.1 * f.diameter && f.height <= 0.3 * f.diameter);
            assert_eq!(f.type_index, 0);
            assert_eq!(f.z_shift, 0.0);
        }
    }

    #[test]
    fn unreachable_target_exhausts_batch_budget() {
        let err = rocks(0.5, 100.0, 0.001)
            .with_max_diameter(0.002)
            .with_max_batches(10)
            .place(1)
            .unwrap_err();
        assert!(err.is_domain());
        assert!(matches!(err, Error::CfaUnreachable { batches: 10, seed: 1, .. }));
    }

    #[test]
    fn overshooting_first_draw_is_an_error() {
        // On 2x2 m even the smallest rock covers more than the needed CFA.
        let placer = rocks(0.1, 2.0, 1.5).with_max_diameter(5.0);
        for seed in [1u64, 2, 3] {
            let err = placer.place(seed).unwrap_err();
            assert!(err.is_domain());
            let message = err.to_string();
            assert!(message.contains("k=0.1"), "{message}");
            assert!(message.contains("d_min=1.5"), "{message}");
            assert!(message.contains("d_max=5"), "{message}");
            assert!(message.contains(&format!("seed {seed}")), "{message}");
        }
    }

    #[test]
    fn invalid_inputs_fail_fast() {
        assert!(rocks(0.0, 100.0, 0.5).place(0).unwrap_err().is_domain());
        assert!(rocks(0.1, 100.0, 200.0).place(0).unwrap_err().is_domain());
        assert!(FieldPlacer::new(FeatureKind::Rock, 0.1, DVec2::new(0.0, 10.0), 0.5)
            .place(0)
            .unwrap_err()
            .is_domain());
        assert!(rocks(0.1, 100.0, 0.5)
            .with_options(PlacementOptions::rocks().with_catalog_size(0))
            .place(0)
            .unwrap_err()
            .is_config());
    }

    #[test]
    fn batch_size_scales_with_area() {
        assert_eq!(rocks(0.1, 5.0, 0.5).batch_size(), 1);
        assert_eq!(rocks(0.1, 100.0, 0.5).batch_size(), 100);
        assert_eq!(rocks(0.1, 1000.0, 0.5).batch_size(), 10_000);
    }

    #[test]
    fn feature_count_matches_closed_form_expectation() {
        let placer = rocks(0.06, 1000.0, 0.6);
        let model = SizeFrequencyModel::new(0.06, 0.6, DEFAULT_MAX_DIAMETER).unwrap();
        let expected = model.needed_cfa() * placer.area() / model.mean_feature_area();

        let seeds = [11u64, 22, 33];
        let mean_count = seeds
            .iter()
            .map(|&s| placer.place(s).unwrap().features().len() as f64)
            .sum::<f64>()
            / seeds.len() as f64;

        let rel = (mean_count - expected).abs() / expected;
        assert!(rel < 0.05, "mean count {mean_count} vs expected {expected}");
    }
}
