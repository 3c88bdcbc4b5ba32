//! Planning and dispatch of a dataset job.
//!
//! [`DatasetOrchestrator::plan`] resolves every random choice up front: per terrain sample it
//! draws the field densities, places the enabled fields and enumerates the render cases, each
//! from its own stream derived from the master seed. [`render_job`] then walks the materialized
//! cases and hands them to a [`CaseRenderer`].
use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use glam::DVec2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::{CameraType, CasePolicy, DatasetConfig, MeshEntry};
use crate::dataset::events::{DatasetEvent, DatasetEventKind, EventSink};
use crate::dataset::job::{DatasetJob, MeshInfo, ScaleParameters, TerrainJob};
use crate::error::Result;
use crate::sampling::{derive_seed, CaseEnumerator, DistributionSpec, RenderCase, Stream};
use crate::terrain::{FeatureField, FeatureKind, FieldPlacer};

/// Dataset name used when the configuration has none.
pub const DEFAULT_DATASET_NAME: &str = "dataset";
/// Camera height for perspective cameras without a `camera/z` axis, in meters.
pub const DEFAULT_PERSP_HEIGHT: f64 = 100.0;

pub const AXIS_ORTHO_SCALE: &str = "camera/ortho_scale";
pub const AXIS_CAMERA_X: &str = "camera/x";
pub const AXIS_CAMERA_Y: &str = "camera/y";
pub const AXIS_CAMERA_Z: &str = "camera/z";
pub const AXIS_CAMERA_PITCH: &str = "camera/pitch";
pub const AXIS_CAMERA_YAW: &str = "camera/yaw";

/// Renders the cases of a planned job.
pub trait CaseRenderer {
    /// Called once per terrain before its first pending case, to build the scene.
    fn prepare_terrain(&mut self, _terrain: &TerrainJob) -> Result<()> {
        Ok(())
    }

    /// Render one case and return the names of the files produced.
    fn render(&mut self, terrain: &TerrainJob, case: &RenderCase) -> Result<Vec<String>>;
}

impl<F> CaseRenderer for F
where
    F: FnMut(&TerrainJob, &RenderCase) -> Result<Vec<String>>,
{
    fn render(&mut self, terrain: &TerrainJob, case: &RenderCase) -> Result<Vec<String>> {
        self(terrain, case)
    }
}

/// Turns a validated [`DatasetConfig`] into a [`DatasetJob`].
#[derive(Clone, Debug)]
pub struct DatasetOrchestrator {
    config: DatasetConfig,
}

impl DatasetOrchestrator {
    pub fn new(config: DatasetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        self.config.name_or(DEFAULT_DATASET_NAME)
    }

    /// `<output_root>/<name>`.
    pub fn output_dir(&self) -> PathBuf {
        self.config.output.output_root.join(self.name())
    }

    /// Selected base meshes with their index in the configured list.
    pub fn selected_meshes(&self) -> Vec<(usize, &MeshEntry)> {
        let meshes = &self.config.base_mesh.meshes;
        match &self.config.base_mesh.tiles {
            Some(tiles) => tiles.iter().map(|&i| (i, &meshes[i])).collect(),
            None => meshes.iter().enumerate().collect(),
        }
    }

    /// `meshes × samples × cases`.
    pub fn planned_cases(&self) -> usize {
        let per_sample = self.config.rendering_cases.case_count();
        self.selected_meshes().len() * self.config.terrain.samples * per_sample
    }

    /// Case distributions for `mesh`, completed with the camera axes the renderer needs.
    ///
    /// For an orthographic camera with a known image width, `camera/ortho_scale` is fixed to
    /// `resolution_x · desired_resolution`. Missing `camera/x` and `camera/y` axes become
    /// uniform over the mesh extent (centered on the origin) shrunk by a margin: half the ortho
    /// scale, or the camera height for a perspective camera. A perspective camera without a
    /// `camera/z` axis is fixed at [`DEFAULT_PERSP_HEIGHT`]. Missing pitch and yaw default to
    /// looking straight down.
    pub fn render_distributions(
        &self,
        mesh: &MeshInfo,
        scale: &ScaleParameters,
    ) -> BTreeMap<String, DistributionSpec> {
        let rendering = &self.config.rendering;
        let mut axes = self.config.rendering_cases.distributions.clone();

        if rendering.camera_type == CameraType::Ortho
            && self.config.terrain.desired_spatial_resolution.is_some()
        {
            if let Some(width) = rendering.resolution_x {
                axes.insert(
                    AXIS_ORTHO_SCALE.to_owned(),
                    DistributionSpec::fixed(f64::from(width) * scale.desired_resolution),
                );
            }
        }

        if rendering.camera_type == CameraType::Persp {
            axes.entry(AXIS_CAMERA_Z.to_owned())
                .or_insert_with(|| DistributionSpec::fixed(DEFAULT_PERSP_HEIGHT));
        }

        if !axes.contains_key(AXIS_CAMERA_X) || !axes.contains_key(AXIS_CAMERA_Y) {
            let margin = match rendering.camera_type {
                CameraType::Ortho => axes
                    .get(AXIS_ORTHO_SCALE)
                    .map_or(0.0, |s| s.nominal_max() / 2.0),
                CameraType::Persp => axes
                    .get(AXIS_CAMERA_Z)
                    .map_or(DEFAULT_PERSP_HEIGHT, DistributionSpec::nominal_max),
            };
            debug!(
                "Fitting camera x/y to mesh {} ({}x{} m, margin {margin} m).",
                mesh.stem, mesh.size_x, mesh.size_y
            );
            axes.insert(AXIS_CAMERA_X.to_owned(), span(mesh.size_x, margin, &mesh.stem));
            axes.insert(AXIS_CAMERA_Y.to_owned(), span(mesh.size_y, margin, &mesh.stem));
        }

        axes.entry(AXIS_CAMERA_PITCH.to_owned())
            .or_insert_with(|| DistributionSpec::fixed(-FRAC_PI_2));
        axes.entry(AXIS_CAMERA_YAW.to_owned())
            .or_insert_with(|| DistributionSpec::fixed(0.0));
        axes
    }

    /// Materialize the whole job.
    pub fn plan(&self, sink: &mut dyn EventSink) -> Result<DatasetJob> {
        let terrain = &self.config.terrain;
        let meshes = self.selected_meshes();
        let rendering_cases = &self.config.rendering_cases;
        let case_count = rendering_cases.case_count();
        let output_dir = self.output_dir();

        info!(
            "Planned cases {}: {} meshes x {} terrains x {} rendering cases.",
            self.planned_cases(),
            meshes.len(),
            terrain.samples,
            case_count
        );
        if sink.wants(DatasetEventKind::PlanStarted) {
            sink.send(DatasetEvent::PlanStarted {
                name: self.name().to_owned(),
                meshes: meshes.len(),
                samples: terrain.samples,
                cases_per_sample: case_count,
            });
        }

        let mut terrains = Vec::with_capacity(meshes.len() * terrain.samples);
        for (mesh_index, entry) in meshes {
            let mesh = mesh_info(entry);
            let scale =
                ScaleParameters::new(entry.resolution, terrain.desired_spatial_resolution)?;
            debug!(
                "Mesh {} resampled by {} to {}x{} px.",
                mesh.stem,
                scale.zoom_factor,
                scale.pixels(mesh.size_x),
                scale.pixels(mesh.size_y)
            );
            let enumerator =
                CaseEnumerator::new(case_count, self.render_distributions(&mesh, &scale));
            // Trajectory cases draw nothing, so every sample gets the same list.
            let shared_cases = match (&rendering_cases.trajectory, rendering_cases.case_policy) {
                (Some(trajectory), _) => Some(trajectory.cases()?),
                (None, CasePolicy::Shared) => Some(self.enumerate(&enumerator, mesh_index, 0)?),
                (None, CasePolicy::PerSample) => None,
            };

            for sample_index in 0..terrain.samples {
                let seed =
                    derive_seed(self.config.seed, mesh_index, sample_index, Stream::Terrain);
                let mut job = TerrainJob {
                    mesh_index,
                    sample_index,
                    mesh: mesh.clone(),
                    scale,
                    seed,
                    output_dir: terrain_dir(&output_dir, &mesh.stem, sample_index),
                    rock_field: None,
                    crater_field: None,
                    cases: Vec::new(),
                };

                let mut params = StdRng::seed_from_u64(seed);
                for (kind, field_config) in terrain.fields() {
                    let k = field_config.density.sample(&mut params, None)?;
                    let extent = DVec2::new(mesh.size_x, mesh.size_y);
                    let mut placer = FieldPlacer::new(kind, k, extent, field_config.h_min)
                        .with_origin(DVec2::new(-mesh.size_x / 2.0, -mesh.size_y / 2.0))
                        .with_options(field_config.placement_options(kind));
                    if let Some(h_max) = field_config.h_max {
                        placer = placer.with_max_diameter(h_max);
                    }
                    let stream = match kind {
                        FeatureKind::Rock => Stream::Rocks,
                        FeatureKind::Crater => Stream::Craters,
                    };
                    let field_seed =
                        derive_seed(self.config.seed, mesh_index, sample_index, stream);
                    let field = placer.place(field_seed)?;
                    self.report_field(sink, &job, &field);
                    match kind {
                        FeatureKind::Rock => job.rock_field = Some(field),
                        FeatureKind::Crater => job.crater_field = Some(field),
                    }
                }

                job.cases = match &shared_cases {
                    Some(cases) => cases.clone(),
                    None => self.enumerate(&enumerator, mesh_index, sample_index)?,
                };
                if sink.wants(DatasetEventKind::CasesEnumerated) {
                    sink.send(DatasetEvent::CasesEnumerated {
                        mesh_index,
                        sample_index,
                        cases: job.cases.len(),
                    });
                }
                terrains.push(job);
            }
        }

        let job = DatasetJob {
            name: self.name().to_owned(),
            seed: self.config.seed,
            output_dir,
            save_flag: self.config.output.save_flag,
            material: self.config.base_mesh.material.clone(),
            case_policy: self.config.rendering_cases.case_policy,
            rendering: self.config.rendering.clone(),
            terrains,
        };
        if sink.wants(DatasetEventKind::PlanFinished) {
            sink.send(DatasetEvent::PlanFinished {
                planned_cases: job.planned_cases(),
            });
        }
        Ok(job)
    }

    fn enumerate(
        &self,
        enumerator: &CaseEnumerator,
        mesh_index: usize,
        sample_index: usize,
    ) -> Result<Vec<RenderCase>> {
        let seed = derive_seed(self.config.seed, mesh_index, sample_index, Stream::Cases);
        enumerator.enumerate(&mut StdRng::seed_from_u64(seed))
    }

    fn report_field(&self, sink: &mut dyn EventSink, job: &TerrainJob, field: &FeatureField) {
        if sink.wants(DatasetEventKind::FieldGenerated) {
            sink.send(DatasetEvent::FieldGenerated {
                mesh_index: job.mesh_index,
                sample_index: job.sample_index,
                kind: field.kind(),
                features: field.len(),
                achieved_cfa: field.achieved_cfa(),
                needed_cfa: field.needed_cfa(),
                seed: field.seed(),
            });
        }
    }
}

/// Counts from one [`render_job`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub rendered: usize,
    pub skipped: usize,
    pub completed: usize,
    pub planned: usize,
    pub cancelled: bool,
}

/// Dispatch every pending case of `job` to `renderer`, in order.
///
/// Cases that already hold files are skipped, so a job reloaded from disk resumes where it
/// stopped. Raising `cancel` stops further dispatch; recorded results are kept. Renderer
/// errors are returned unchanged and leave the failing case pending.
pub fn render_job(
    job: &mut DatasetJob,
    renderer: &mut dyn CaseRenderer,
    cancel: &AtomicBool,
    sink: &mut dyn EventSink,
) -> Result<RenderSummary> {
    let mut summary = RenderSummary {
        completed: job.completed_cases(),
        planned: job.planned_cases(),
        ..RenderSummary::default()
    };

    for (t, terrain) in job.terrains.iter_mut().enumerate() {
        if terrain.completed_cases() == terrain.cases.len() {
            summary.skipped += terrain.cases.len();
            for case in &terrain.cases {
                emit_skip(sink, t, case.case_id());
            }
            continue;
        }
        if cancel.load(Ordering::Relaxed) {
            return Ok(cancelled(summary, sink));
        }
        info!("Preparing terrain {} ({} cases).", terrain.label(), terrain.cases.len());
        renderer.prepare_terrain(terrain)?;

        for i in 0..terrain.cases.len() {
            let case_id = terrain.cases[i].case_id();
            if terrain.cases[i].is_rendered() {
                summary.skipped += 1;
                emit_skip(sink, t, case_id);
                continue;
            }
            if cancel.load(Ordering::Relaxed) {
                return Ok(cancelled(summary, sink));
            }
            if sink.wants(DatasetEventKind::CaseStarted) {
                sink.send(DatasetEvent::CaseStarted {
                    terrain: t,
                    case_id,
                    output_dir: terrain.output_dir.clone(),
                });
            }

            let files = renderer.render(terrain, &terrain.cases[i])?;
            if files.is_empty() {
                warn!("Renderer produced no files for {} case {}.", terrain.label(), case_id);
                if sink.wants(DatasetEventKind::Warning) {
                    sink.send(DatasetEvent::Warning {
                        context: format!("{} case {case_id}", terrain.label()),
                        message: "renderer produced no files".into(),
                    });
                }
                continue;
            }

            summary.rendered += 1;
            summary.completed += 1;
            info!(
                "Progress {}/{}: {} case {}.",
                summary.completed,
                summary.planned,
                terrain.label(),
                case_id
            );
            if sink.wants(DatasetEventKind::CaseRendered) {
                sink.send(DatasetEvent::CaseRendered {
                    terrain: t,
                    case_id,
                    files: files.clone(),
                    completed: summary.completed,
                    planned: summary.planned,
                });
            }
            terrain.cases[i].record_files(files);
        }
    }

    info!(
        "Executed cases: {}/{} ({} rendered, {} skipped).",
        summary.completed, summary.planned, summary.rendered, summary.skipped
    );
    Ok(summary)
}

fn cancelled(mut summary: RenderSummary, sink: &mut dyn EventSink) -> RenderSummary {
    summary.cancelled = true;
    warn!(
        "Cancelled after {}/{} cases; remaining cases stay pending.",
        summary.completed, summary.planned
    );
    if sink.wants(DatasetEventKind::Cancelled) {
        sink.send(DatasetEvent::Cancelled {
            completed: summary.completed,
            planned: summary.planned,
        });
    }
    summary
}

fn emit_skip(sink: &mut dyn EventSink, terrain: usize, case_id: u32) {
    debug!("Skipping rendered case {case_id} of terrain {terrain}.");
    if sink.wants(DatasetEventKind::CaseSkipped) {
        sink.send(DatasetEvent::CaseSkipped { terrain, case_id });
    }
}

fn mesh_info(entry: &MeshEntry) -> MeshInfo {
    let stem = entry
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_owned());
    MeshInfo {
        path: entry.path.clone(),
        stem,
        size_x: entry.size_x,
        size_y: entry.size_y,
    }
}

/// `<output_dir>/mesh_<stem>/terrain_<NN>`.
pub fn terrain_dir(output_dir: &Path, stem: &str, sample_index: usize) -> PathBuf {
    output_dir
        .join(format!("mesh_{stem}"))
        .join(format!("terrain_{sample_index:02}"))
}

fn span(size: f64, margin: f64, stem: &str) -> DistributionSpec {
    let half = size / 2.0;
    if margin >= half {
        warn!("Camera margin {margin} m covers mesh {stem} ({size} m); centering the camera.");
        return DistributionSpec::fixed(0.0);
    }
    DistributionSpec::Uniform {
        min: -half + margin,
        max: half - margin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{sample_with_trajectory, SAMPLE};
    use crate::error::Error;
    use crate::dataset::events::VecSink;

    fn orchestrator(text: &str) -> DatasetOrchestrator {
        DatasetOrchestrator::new(DatasetConfig::from_yaml_str(text).unwrap()).unwrap()
    }

    fn planned(text: &str) -> DatasetJob {
        orchestrator(text).plan(&mut ()).unwrap()
    }

    #[test]
    fn plans_meshes_times_samples_times_cases() {
        let orch = orchestrator(SAMPLE);
        let mut sink = VecSink::new();
        let job = orch.plan(&mut sink).unwrap();

        assert_eq!(orch.planned_cases(), 2 * 2 * 4);
        assert_eq!(job.planned_cases(), 16);
        assert_eq!(job.completed_cases(), 0);
        assert_eq!(job.terrains.len(), 4);
        assert_eq!(sink.count(DatasetEventKind::FieldGenerated), 8);
        assert_eq!(sink.count(DatasetEventKind::CasesEnumerated), 4);
        assert_eq!(
            sink.as_slice().last(),
            Some(&DatasetEvent::PlanFinished { planned_cases: 16 })
        );

        let first = &job.terrains[0];
        assert_eq!(first.output_dir, PathBuf::from("out/highlands/mesh_tile_a/terrain_00"));
        assert_eq!(
            job.terrains[3].output_dir,
            PathBuf::from("out/highlands/mesh_tile_b/terrain_01")
        );
        assert_eq!(first.scale.zoom_factor, 10.0);
        assert_eq!(job.terrains[2].scale.zoom_factor, 4.0);
    }

    #[test]
    fn fields_are_centered_on_the_mesh() {
        let job = planned(SAMPLE);
        let terrain = &job.terrains[0];
        let rocks = terrain.field(FeatureKind::Rock).unwrap();
        assert_eq!(rocks.size(), (400.0, 300.0));
        assert_eq!(rocks.origin(), (-200.0, -150.0));
        assert_eq!(rocks.diameter_range(), (0.8, 8.0));
        assert_eq!(rocks.target_cfa(), 0.05);
        for f in rocks.features() {
            assert!((-200.0..200.0).contains(&f.x));
            assert!((-150.0..150.0).contains(&f.y));
        }
        let craters = terrain.field(FeatureKind::Crater).unwrap();
        assert!((0.1..=0.2).contains(&craters.target_cfa()));
    }

    #[test]
    fn samples_get_independent_fields_and_cases() {
        let job = planned(SAMPLE);
        let (a, b) = (&job.terrains[0], &job.terrains[1]);
        assert_ne!(a.seed, b.seed);
        assert_ne!(
            a.rock_field.as_ref().unwrap().features(),
            b.rock_field.as_ref().unwrap().features()
        );
        assert_ne!(a.cases, b.cases);
    }

    #[test]
    fn shared_policy_reuses_cases_per_mesh() {
        let text = SAMPLE.replace("  cases: 4\n", "  cases: 4\n  case_policy: shared\n");
        let job = planned(&text);
        assert_eq!(job.case_policy, CasePolicy::Shared);
        assert_eq!(job.terrains[0].cases, job.terrains[1].cases);
        assert_eq!(job.terrains[2].cases, job.terrains[3].cases);
        assert_ne!(
            job.terrains[0].rock_field.as_ref().unwrap().features(),
            job.terrains[1].rock_field.as_ref().unwrap().features()
        );
    }

    #[test]
    fn planning_is_reproducible_from_the_master_seed() {
        assert_eq!(planned(SAMPLE), planned(SAMPLE));
        let reseeded = planned(&SAMPLE.replace("seed: 7", "seed: 8"));
        assert_ne!(planned(SAMPLE).terrains[0].cases, reseeded.terrains[0].cases);
    }

    #[test]
    fn camera_axes_are_fitted_to_the_mesh() {
        let orch = orchestrator(SAMPLE);
        let job = orch.plan(&mut ()).unwrap();
        let terrain = &job.terrains[0];
        let axes = orch.render_distributions(&terrain.mesh, &terrain.scale);

        // 512 px at 0.5 m/px.
        assert_eq!(axes[AXIS_ORTHO_SCALE], DistributionSpec::fixed(256.0));
        assert_eq!(axes[AXIS_CAMERA_X], DistributionSpec::Uniform { min: -72.0, max: 72.0 });
        assert_eq!(axes[AXIS_CAMERA_Y], DistributionSpec::Uniform { min: -22.0, max: 22.0 });
        assert_eq!(axes[AXIS_CAMERA_PITCH], DistributionSpec::fixed(-FRAC_PI_2));
        assert_eq!(axes[AXIS_CAMERA_YAW], DistributionSpec::fixed(0.0));

        for case in &terrain.cases {
            assert_eq!(case.value(AXIS_ORTHO_SCALE), Some(256.0));
            let x = case.value(AXIS_CAMERA_X).unwrap();
            assert!((-72.0..=72.0).contains(&x));
        }

        // The second tile is smaller than the ortho footprint.
        let small = &job.terrains[2];
        let axes = orch.render_distributions(&small.mesh, &small.scale);
        assert_eq!(axes[AXIS_CAMERA_X], DistributionSpec::fixed(0.0));
    }

    #[test]
    fn perspective_margin_uses_camera_height() {
        let text = SAMPLE.replace("camera_type: ORTHO", "camera_type: PERSP");
        let orch = orchestrator(&text);
        let job = orch.plan(&mut ()).unwrap();
        let terrain = &job.terrains[0];
        let axes = orch.render_distributions(&terrain.mesh, &terrain.scale);
        assert!(!axes.contains_key(AXIS_ORTHO_SCALE));
        assert_eq!(axes[AXIS_CAMERA_X], DistributionSpec::Uniform { min: -80.0, max: 80.0 });
        assert_eq!(axes[AXIS_CAMERA_Y], DistributionSpec::Uniform { min: -30.0, max: 30.0 });
    }

    const CAMERA_Z: &str = "    camera/z:\n      type: normal\n      mean: 120\n      std: 5\n";

    #[test]
    fn perspective_camera_height_defaults_when_absent() {
        let text = SAMPLE
            .replace("camera_type: ORTHO", "camera_type: PERSP")
            .replace(CAMERA_Z, "");
        let orch = orchestrator(&text);
        let job = orch.plan(&mut ()).unwrap();
        let terrain = &job.terrains[0];
        let axes = orch.render_distributions(&terrain.mesh, &terrain.scale);
        assert_eq!(axes[AXIS_CAMERA_Z], DistributionSpec::fixed(DEFAULT_PERSP_HEIGHT));
        assert_eq!(axes[AXIS_CAMERA_X], DistributionSpec::Uniform { min: -100.0, max: 100.0 });
        assert_eq!(axes[AXIS_CAMERA_Y], DistributionSpec::Uniform { min: -50.0, max: 50.0 });
        for case in &terrain.cases {
            assert_eq!(case.value(AXIS_CAMERA_Z), Some(DEFAULT_PERSP_HEIGHT));
        }

        // Orthographic cameras get no injected height.
        let ortho = SAMPLE.replace(CAMERA_Z, "");
        let orch = orchestrator(&ortho);
        let axes = orch.render_distributions(&terrain.mesh, &terrain.scale);
        assert!(!axes.contains_key(AXIS_CAMERA_Z));
    }

    #[test]
    fn trajectory_cases_are_copied_to_every_sample() {
        let orch = orchestrator(&sample_with_trajectory());
        assert_eq!(orch.planned_cases(), 2 * 2 * 3);
        let mut sink = VecSink::new();
        let job = orch.plan(&mut sink).unwrap();
        assert_eq!(job.planned_cases(), 12);
        assert_eq!(
            sink.as_slice().first(),
            Some(&DatasetEvent::PlanStarted {
                name: "highlands".into(),
                meshes: 2,
                samples: 2,
                cases_per_sample: 3,
            })
        );

        let first = &job.terrains[0].cases;
        let ids: Vec<u32> = first.iter().map(RenderCase::case_id).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(first[2].value(AXIS_CAMERA_X), Some(10.0));
        assert_eq!(first[2].value(AXIS_CAMERA_Z), Some(10.0));
        assert_eq!(first[0].value("sun/azimuth"), Some(90.0));
        assert!(first[0].value(AXIS_ORTHO_SCALE).is_none());
        assert!(job.terrains.iter().all(|t| &t.cases == first));

        // Fields still come from the seed streams.
        assert_eq!(job.terrains[0].rock_field, planned(SAMPLE).terrains[0].rock_field);
    }

    #[test]
    fn grid_mismatch_fails_planning() {
        let text = SAMPLE.replace("  cases: 4\n", "  cases: 5\n");
        let err = orchestrator(&text).plan(&mut ()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn out_of_domain_density_fails_planning() {
        let text = SAMPLE.replace("density: 0.05", "density: 1.5");
        let err = orchestrator(&text).plan(&mut ()).unwrap_err();
        assert!(err.is_domain());
    }

    #[test]
    fn tile_selection_limits_meshes() {
        let text = SAMPLE.replace("  material: Regolith7_MAT", "  tiles: [1]");
        let job = planned(&text);
        assert_eq!(job.terrains.len(), 2);
        assert!(job.terrains.iter().all(|t| t.mesh_index == 1 && t.mesh.stem == "tile_b"));
    }

    #[test]
    fn serialized_job_replays_exactly() {
        let job = planned(SAMPLE);
        let json = job.to_json().unwrap();
        let replayed = DatasetJob::from_json(&json).unwrap();
        assert_eq!(replayed, job);
        assert_eq!(replayed.to_json().unwrap(), json);
    }

    fn case_files(terrain: &TerrainJob, case: &RenderCase) -> Result<Vec<String>> {
        Ok(vec![format!("{}/rgb_{:03}.png", terrain.label(), case.case_id())])
    }

    #[test]
    fn render_job_records_files_for_every_case() {
        let mut job = planned(SAMPLE);
        let mut sink = VecSink::new();
        let summary =
            render_job(&mut job, &mut case_files, &AtomicBool::new(false), &mut sink).unwrap();

        assert_eq!(summary.rendered, 16);
        assert_eq!(summary.completed, 16);
        assert!(!summary.cancelled);
        assert!(job.is_complete());
        assert_eq!(
            job.terrains[1].cases[2].files(),
            ["tile_a/terrain_01/rgb_003.png".to_owned()]
        );
        assert_eq!(sink.count(DatasetEventKind::CaseRendered), 16);
    }

    #[test]
    fn cancellation_stops_dispatch_and_resume_skips_done_cases() {
        let mut job = planned(SAMPLE);
        let cancel = AtomicBool::new(false);
        let mut calls = 0;
        let mut stop_after_five = |terrain: &TerrainJob, case: &RenderCase| {
            calls += 1;
            if calls == 5 {
                cancel.store(true, Ordering::Relaxed);
            }
            case_files(terrain, case)
        };
        let summary = render_job(&mut job, &mut stop_after_five, &cancel, &mut ()).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.completed, 5);
        assert_eq!(job.completed_cases(), 5);

        let mut resumed = DatasetJob::from_json(&job.to_json().unwrap()).unwrap();
        let mut sink = VecSink::new();
        let summary =
            render_job(&mut resumed, &mut case_files, &AtomicBool::new(false), &mut sink).unwrap();
        assert_eq!(summary.skipped, 5);
        assert_eq!(summary.rendered, 11);
        assert!(resumed.is_complete());
        assert_eq!(sink.count(DatasetEventKind::CaseSkipped), 5);
    }

    #[test]
    fn renderer_errors_propagate_and_leave_case_pending() {
        let mut job = planned(SAMPLE);
        let mut failing = |_: &TerrainJob, case: &RenderCase| -> Result<Vec<String>> {
            Err(Error::Render {
                case_id: case.case_id(),
                message: "engine crashed".into(),
            })
        };
        let err = render_job(&mut job, &mut failing, &AtomicBool::new(false), &mut ()).unwrap_err();
        assert!(matches!(err, Error::Render { case_id: 1, .. }));
        assert_eq!(job.completed_cases(), 0);
    }
}
