//! Error types and result alias for the crate.
//!
//! This module defines [`enum@crate::error::Error`] and the crate-wide [Result] alias. Variants
//! cover malformed configuration, out-of-domain model parameters, an unreachable coverage target,
//! collaborator IO and rendering failures.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing configuration, distribution parameters, case counts or override paths.
    #[error("configuration error: {0}")]
    Config(String),

    /// Model parameters outside the domain of the size-frequency law.
    #[error("domain error: {0}")]
    Domain(String),

    /// The batch budget ran out before the coverage target was met.
    #[error(
        "domain error: CFA unreachable, target {target_cfa:.6} but reached {achieved_cfa:.6} \
         after {batches} batches (seed {seed})"
    )]
    CfaUnreachable {
        target_cfa: f64,
        achieved_cfa: f64,
        batches: usize,
        seed: u64,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure reported by the rendering collaborator for one case.
    #[error("rendering case {case_id} failed: {message}")]
    Render { case_id: u32, message: String },
}

impl Error {
    /// Returns true for [`Error::Domain`] and [`Error::CfaUnreachable`].
    pub fn is_domain(&self) -> bool {
        matches!(self, Error::Domain(_) | Error::CfaUnreachable { .. })
    }

    /// Returns true for [`Error::Config`].
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        if value.is_io() {
            return Error::Io(value.into());
        }
        Error::Config(value.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Error::Config(value.to_string())
    }
}
