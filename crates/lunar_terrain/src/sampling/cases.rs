//! Render-case enumeration.
//!
//! Turns a mapping of axis name to [`DistributionSpec`] into an ordered, fully concrete list
//! of [`RenderCase`]s. Axes are visited in name order, so a given seed always yields the same
//! list regardless of how the configuration document ordered its keys.
use std::collections::BTreeMap;

use rand::Rng as RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::sampling::distribution::DistributionSpec;

/// One concrete assignment of camera and illumination parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderCase {
    case_id: u32,
    values: BTreeMap<String, f64>,
    #[serde(default)]
    files: Vec<String>,
}

impl RenderCase {
    pub fn new(case_id: u32, values: BTreeMap<String, f64>) -> Self {
        Self {
            case_id,
            values,
            files: Vec::new(),
        }
    }

    /// Sequential id, starting at 1.
    pub fn case_id(&self) -> u32 {
        self.case_id
    }

    /// Sampled value for every axis.
    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    pub fn value(&self, axis: &str) -> Option<f64> {
        self.values.get(axis).copied()
    }

    /// Output files reported by the rendering collaborator.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_rendered(&self) -> bool {
        !self.files.is_empty()
    }

    /// Record the files produced for this case, replacing any earlier report.
    pub fn record_files(&mut self, files: Vec<String>) {
        self.files = files;
    }
}

/// How a case list is built from its axes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnumerationMode {
    /// No axes at all: a single default case.
    Default,
    /// Cartesian product over the grid axes, in name order, first axis varying fastest.
    Grid {
        sizes: Vec<(String, usize)>,
        total: usize,
    },
    /// Every case samples every axis independently.
    Independent,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaseEnumerator {
    /// Requested number of cases.
    pub cases: usize,
    /// Distribution per axis name.
    pub distributions: BTreeMap<String, DistributionSpec>,
}

impl CaseEnumerator {
    pub fn new(cases: usize, distributions: BTreeMap<String, DistributionSpec>) -> Self {
        Self {
            cases,
            distributions,
        }
    }

    /// Add or replace one axis (builder-style).
    pub fn with_axis(mut self, name: impl Into<String>, spec: DistributionSpec) -> Self {
        self.distributions.insert(name.into(), spec);
        self
    }

    /// Determine the enumeration mode and check the case count against it.
    pub fn mode(&self) -> Result<EnumerationMode> {
        if self.distributions.is_empty() {
            return Ok(EnumerationMode::Default);
        }

        let sizes: Vec<(String, usize)> = self
            .distributions
            .iter()
            .filter_map(|(name, spec)| spec.grid_len().map(|len| (name.clone(), len)))
            .collect();

        if sizes.is_empty() {
            if self.cases == 0 {
                return Err(Error::Config("rendering cases must be at least 1".into()));
            }
            return Ok(EnumerationMode::Independent);
        }

        let total = sizes
            .iter()
            .try_fold(1usize, |acc, (_, len)| acc.checked_mul(*len))
            .ok_or_else(|| Error::Config("grid product overflows".into()))?;
        if total != self.cases {
            return Err(Error::Config(format!(
                "cases = {} does not match the grid product {} of {:?}",
                self.cases, total, sizes
            )));
        }
        Ok(EnumerationMode::Grid { sizes, total })
    }

    /// Build the case list, drawing every non-grid axis from `rng`.
    pub fn enumerate(&self, rng: &mut dyn RngCore) -> Result<Vec<RenderCase>> {
        for (name, spec) in &self.distributions {
            spec.validate()
                .map_err(|e| Error::Config(format!("axis '{name}': {e}")))?;
        }

        let mode = self.mode()?;
        let cases = match &mode {
            EnumerationMode::Default => vec![RenderCase::new(1, BTreeMap::new())],
            EnumerationMode::Independent => (0..self.cases)
                .map(|i| self.draw_case(i, &BTreeMap::new(), rng))
                .collect::<Result<Vec<_>>>()?,
            EnumerationMode::Grid { sizes, total } => {
                info!("Grid enumeration over {:?}: {} cases.", sizes, total);
                (0..*total)
                    .map(|i| self.draw_case(i, &grid_indices(sizes, i), rng))
                    .collect::<Result<Vec<_>>>()?
            }
        };
        debug!("Enumerated {} render cases ({:?}).", cases.len(), mode);
        Ok(cases)
    }

    fn draw_case(
        &self,
        index: usize,
        grid: &BTreeMap<&str, usize>,
        rng: &mut dyn RngCore,
    ) -> Result<RenderCase> {
        let mut values = BTreeMap::new();
        for (name, spec) in &self.distributions {
            let value = spec
                .sample(rng, grid.get(name.as_str()).copied())
                .map_err(|e| Error::Config(format!("axis '{name}': {e}")))?;
            values.insert(name.clone(), value);
        }
        let case_id = u32::try_from(index + 1)
            .map_err(|_| Error::Config(format!("case index {index} exceeds u32")))?;
        Ok(RenderCase::new(case_id, values))
    }
}

/// Mixed-radix decomposition of a flat case index into one index per grid axis.
fn grid_indices(sizes: &[(String, usize)], index: usize) -> BTreeMap<&str, usize> {
    let mut base = 1;
    sizes
        .iter()
        .map(|(name, len)| {
            let i = (index / base) % len;
            base *= len;
            (name.as_str(), i)
        })
        .collect()
}
