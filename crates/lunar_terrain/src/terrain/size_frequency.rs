//! Size-frequency law for rocks and craters, inverted for sampling.
//!
//! The areal density follows the lunar regolith fit `P(D) = k·q·exp(−q·D)` with
//! `q = 0.5648 + 0.01285/k`, where `k` is the total cumulative fractional area (CFA).
//! The number density `N(D) = 4·P(D)/(π·D²)` is integrated on a log-spaced diameter grid
//! and the resulting CDF is inverted by interpolation.
use std::f64::consts::PI;

use tracing::debug;

use crate::error::{Error, Result};

/// Upper diameter bound used when the caller does not supply one, in meters.
pub const DEFAULT_MAX_DIAMETER: f64 = 100.0;
/// Number of points of the log-spaced diameter grid.
pub const DEFAULT_GRID_POINTS: usize = 1000;
/// CDF increments below this are numerical noise; the grid is cut there.
pub const CDF_NOISE_FLOOR: f64 = 1e-14;

const Q_INTERCEPT: f64 = 0.5648;
const Q_SLOPE: f64 = 0.01285;

/// Inverse-CDF sampler over feature diameter for a target coverage `k`.
#[derive(Clone, Debug)]
pub struct SizeFrequencyModel {
    k: f64,
    q: f64,
    d_min: f64,
    d_max: f64,
    diameters: Vec<f64>,
    number_density: Vec<f64>,
    cdf: Vec<f64>,
}

impl SizeFrequencyModel {
    /// Build the model on the default grid.
    pub fn new(k: f64, d_min: f64, d_max: f64) -> Result<Self> {
        Self::with_grid_points(k, d_min, d_max, DEFAULT_GRID_POINTS)
    }

    /// Build the model with [`DEFAULT_MAX_DIAMETER`] as upper bound.
    pub fn with_default_max(k: f64, d_min: f64) -> Result<Self> {
        Self::new(k, d_min, DEFAULT_MAX_DIAMETER)
    }

    pub fn with_grid_points(k: f64, d_min: f64, d_max: f64, points: usize) -> Result<Self> {
        validate(k, d_min, d_max)?;
        if points < 2 {
            return Err(Error::Domain(format!(
                "diameter grid needs at least 2 points, got {points}"
            )));
        }

        let q = Self::exponent_for(k);
        let diameters = log_space(d_min, d_max, points);
        let number_density: Vec<f64> = diameters
            .iter()
            .map(|&d| number_density(k, q, d))
            .collect();

        let mut cdf = Vec::with_capacity(points);
        cdf.push(0.0);
        for i in 1..points {
            let dd = diameters[i] - diameters[i - 1];
            let step = 0.5 * (number_density[i - 1] + number_density[i]) * dd;
            cdf.push(cdf[i - 1] + step);
        }

        let total = cdf[points - 1];
        if !total.is_finite() || total <= 0.0 {
            return Err(Error::Domain(format!(
                "number density integrates to {total} for k={k}, d_min={d_min}, d_max={d_max}"
            )));
        }
        for c in cdf.iter_mut() {
            *c /= total;
        }

        let keep = (1..points)
            .find(|&i| cdf[i] - cdf[i - 1] < CDF_NOISE_FLOOR)
            .unwrap_or(points);
        if keep < 2 {
            return Err(Error::Domain(format!(
                "diameter CDF is flat from d_min={d_min} (k={k}, d_max={d_max})"
            )));
        }

        let mut model = Self {
            k,
            q,
            d_min,
            d_max,
            diameters,
            number_density,
            cdf,
        };
        model.diameters.truncate(keep);
        model.number_density.truncate(keep);
        model.cdf.truncate(keep);

        debug!(
            "Size-frequency model k={k}, q={q:.5}, d=[{d_min}, {d_max}]: \
             {keep}/{points} grid points kept."
        );
        Ok(model)
    }

    /// Empirical exponent `q = 0.5648 + 0.01285/k`.
    pub fn exponent_for(k: f64) -> f64 {
        Q_INTERCEPT + Q_SLOPE / k
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn d_min(&self) -> f64 {
        self.d_min
    }

    pub fn d_max(&self) -> f64 {
        self.d_max
    }

    /// Grid points left after noise truncation.
    pub fn grid_len(&self) -> usize {
        self.diameters.len()
    }

    /// Largest diameter the sampler can return.
    pub fn effective_max(&self) -> f64 {
        self.diameters[self.diameters.len() - 1]
    }

    /// Coverage by features at or above `d`: `k·exp(−q·d)`.
    pub fn cfa_at(&self, d: f64) -> f64 {
        self.k * (-self.q * d).exp()
    }

    /// Coverage a field must reach, contributed by features at or above `d_min`.
    pub fn needed_cfa(&self) -> f64 {
        self.cfa_at(self.d_min)
    }

    /// Areal density `P(D) = k·q·exp(−q·D)`.
    pub fn area_density(&self, d: f64) -> f64 {
        area_density(self.k, self.q, d)
    }

    /// Number density `N(D) = 4·P(D)/(π·D²)`.
    pub fn number_density(&self, d: f64) -> f64 {
        number_density(self.k, self.q, d)
    }

    /// Diameter at cumulative probability `u`; `u` is clamped to `[0, 1]`.
    pub fn inverse_cdf(&self, u: f64) -> f64 {
        let u = if u.is_nan() { 0.0 } else { u.clamp(0.0, 1.0) };
        let last = self.cdf.len() - 1;
        if u <= self.cdf[0] {
            return self.diameters[0];
        }
        if u >= self.cdf[last] {
            return self.diameters[last];
        }

        let j = self.cdf.partition_point(|&c| c < u);
        let (c0, c1) = (self.cdf[j - 1], self.cdf[j]);
        let (d0, d1) = (self.diameters[j - 1], self.diameters[j]);
        let t = (u - c0) / (c1 - c0);
        (d0 + t * (d1 - d0)).clamp(d0, d1)
    }

    /// Expected footprint `π/4·D²` of one feature under the fitted law.
    pub fn mean_feature_area(&self) -> f64 {
        let mut area = 0.0;
        let mut count = 0.0;
        for i in 1..self.diameters.len() {
            let dd = self.diameters[i] - self.diameters[i - 1];
            let n0 = self.number_density[i - 1];
            let n1 = self.number_density[i];
            count += 0.5 * (n0 + n1) * dd;
            let a0 = footprint(self.diameters[i - 1]) * n0;
            let a1 = footprint(self.diameters[i]) * n1;
            area += 0.5 * (a0 + a1) * dd;
        }
        area / count
    }
}

/// Footprint area of a feature of diameter `d`.
#[inline]
pub fn footprint(d: f64) -> f64 {
    PI / 4.0 * d * d
}

fn area_density(k: f64, q: f64, d: f64) -> f64 {
    k * q * (-q * d).exp()
}

fn number_density(k: f64, q: f64, d: f64) -> f64 {
    4.0 * area_density(k, q, d) / (PI * d * d)
}

fn validate(k: f64, d_min: f64, d_max: f64) -> Result<()> {
    if !(k.is_finite() && k > 0.0 && k <= 1.0) {
        return Err(Error::Domain(format!("CFA k must lie in (0, 1], got {k}")));
    }
    if !(d_min.is_finite() && d_min > 0.0) {
        return Err(Error::Domain(format!("d_min must be > 0, got {d_min}")));
    }
    if !d_max.is_finite() || d_min >= d_max {
        return Err(Error::Domain(format!(
            "d_min must be < d_max, got d_min={d_min}, d_max={d_max}"
        )));
    }
    Ok(())
}

fn log_space(start: f64, end: f64, points: usize) -> Vec<f64> {
    let (a, b) = (start.ln(), end.ln());
    let step = (b - a) / (points - 1) as f64;
    let mut out: Vec<f64> = (0..points).map(|i| (a + step * i as f64).exp()).collect();
    out[0] = start;
    out[points - 1] = end;
    out
}
