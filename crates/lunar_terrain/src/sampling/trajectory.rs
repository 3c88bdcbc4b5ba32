//! Render cases taken from a recorded camera trajectory.
//!
//! A [`Trajectory`] lists camera poses step by step under one sun position. Each step becomes
//! one [`RenderCase`], in order, with ids starting at 1. Nothing is drawn at random.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::sampling::cases::RenderCase;

/// One camera pose along a trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub camera_x: f64,
    pub camera_y: f64,
    pub camera_z: f64,
    pub camera_pitch: f64,
    pub camera_yaw: f64,
}

/// Sun position shared by every step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryScene {
    pub sun_elevation: f64,
    pub sun_azimuth: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    #[serde(rename = "trajectory")]
    pub steps: Vec<TrajectoryStep>,
    pub scene: TrajectoryScene,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Config("trajectory has no steps".into()));
        }
        let scene = [self.scene.sun_elevation, self.scene.sun_azimuth];
        if !scene.iter().all(|v| v.is_finite()) {
            return Err(Error::Config(format!("trajectory scene {:?} is not finite", self.scene)));
        }
        for (i, step) in self.steps.iter().enumerate() {
            let pose = [
                step.camera_x,
                step.camera_y,
                step.camera_z,
                step.camera_pitch,
                step.camera_yaw,
            ];
            if !pose.iter().all(|v| v.is_finite()) {
                return Err(Error::Config(format!("trajectory step {i} is not finite")));
            }
        }
        Ok(())
    }

    /// One case per step, in trajectory order.
    pub fn cases(&self) -> Result<Vec<RenderCase>> {
        self.validate()?;
        let cases = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let case_id = u32::try_from(i + 1)
                    .map_err(|_| Error::Config(format!("trajectory step {i} exceeds u32")))?;
                let values = BTreeMap::from([
                    ("camera/x".to_owned(), step.camera_x),
                    ("camera/y".to_owned(), step.camera_y),
                    ("camera/z".to_owned(), step.camera_z),
                    ("camera/pitch".to_owned(), step.camera_pitch),
                    ("camera/yaw".to_owned(), step.camera_yaw),
                    ("sun/elevation".to_owned(), self.scene.sun_elevation),
                    ("sun/azimuth".to_owned(), self.scene.sun_azimuth),
                ]);
                Ok(RenderCase::new(case_id, values))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Trajectory yields {} render cases.", cases.len());
        Ok(cases)
    }
}
