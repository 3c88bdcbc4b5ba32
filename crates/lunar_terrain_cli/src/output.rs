use std::fs::{self, File};
use std::path::{Path, PathBuf};

use glam::DVec2;
use lunar_terrain::dataset::{DatasetJob, CASES_FILE};
use lunar_terrain::error::{Error, Result};
use lunar_terrain::terrain::{load_feature_table, FeatureField, FeatureKind, FieldPlacer};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber honoring `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Write `job.json` plus, per terrain directory, the field tables and `cases.json`.
///
/// Returns the written paths in order.
pub fn write_job_artifacts(job: &DatasetJob) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for terrain in &job.terrains {
        fs::create_dir_all(&terrain.output_dir)?;
        for field in terrain.fields() {
            let path = terrain
                .output_dir
                .join(format!("{}.csv", field.kind().file_stem()));
            field.save_table(&path)?;
            debug!("Wrote {} features to {}", field.len(), path.display());
            written.push(path);
        }
        let path = terrain.output_dir.join(CASES_FILE);
        terrain.write_cases(File::create(&path)?)?;
        written.push(path);
    }

    let path = job.job_path();
    job.save(&path)?;
    info!(
        "Wrote job {} ({} terrains, {} cases) to {}",
        job.name,
        job.terrains.len(),
        job.planned_cases(),
        path.display()
    );
    written.push(path);
    Ok(written)
}

/// Placer for one field of `size_x × size_y` meters centered on the origin.
pub fn centered_placer(
    kind: FeatureKind,
    cfa: f64,
    size_x: f64,
    size_y: f64,
    h_min: f64,
    h_max: Option<f64>,
) -> FieldPlacer {
    let placer = FieldPlacer::new(kind, cfa, DVec2::new(size_x, size_y), h_min)
        .with_origin(DVec2::new(-size_x / 2.0, -size_y / 2.0));
    match h_max {
        Some(h_max) => placer.with_max_diameter(h_max),
        None => placer,
    }
}

/// Place one field from `seed` and write its table to `path`.
///
/// Nothing is written when placement fails.
pub fn write_field(placer: &FieldPlacer, seed: u64, path: &Path) -> Result<FeatureField> {
    let field = placer.place(seed)?;
    field.save_table(path)?;
    info!(
        "Wrote {} {:?} features (CFA {:.4}) to {}",
        field.len(),
        field.kind(),
        field.achieved_cfa(),
        path.display()
    );
    Ok(field)
}

/// Check that every field of `job` regenerates bit-identically from its stored seed, and that
/// tables already on disk match the job.
///
/// Returns the number of fields checked.
pub fn verify_job(job: &DatasetJob) -> Result<usize> {
    let mut checked = 0;
    for terrain in &job.terrains {
        for field in terrain.fields() {
            let context = format!("{} {:?} field", terrain.label(), field.kind());
            let regenerated = field.placer().place(field.seed())?;
            if &regenerated != field {
                return Err(Error::Domain(format!(
                    "{context} does not regenerate from seed {}",
                    field.seed()
                )));
            }

            let table = terrain
                .output_dir
                .join(format!("{}.csv", field.kind().file_stem()));
            if table.exists() {
                let features = load_feature_table(&table)?;
                if features.as_slice() != field.features() {
                    return Err(Error::Config(format!(
                        "{context}: {} differs from the job",
                        table.display()
                    )));
                }
            }
            checked += 1;
        }
    }
    info!("Verified {checked} fields of job {}", job.name);
    Ok(checked)
}

#[cfg(test)]
mod tests {
    use lunar_terrain::config::DatasetConfig;
    use lunar_terrain::dataset::DatasetOrchestrator;
    use tempfile::tempdir;

    use super::*;

    fn job_in(root: &std::path::Path) -> DatasetJob {
        let yaml = format!(
            r#"
name: smoke
seed: 3
base_mesh:
  meshes:
    - path: tiles/flat.tif
      size_x: 120
      size_y: 80
output:
  output_root: {}
terrain:
  samples: 2
  rock_field:
    h_min: 0.5
    h_max: 4.0
    density: 0.08
  crater_field:
    h_min: 2.0
    h_max: 20.0
    density: 0.15
rendering_cases:
  cases: 3
  distributions:
    sun/elevation:
      type: uniform
      min: 5
      max: 40
"#,
            root.display()
        );
        let config = DatasetConfig::from_yaml_str(&yaml).unwrap();
        DatasetOrchestrator::new(config).unwrap().plan(&mut ()).unwrap()
    }

    #[test]
    fn writes_tables_cases_and_job() {
        let dir = tempdir().unwrap();
        let job = job_in(dir.path());
        let written = write_job_artifacts(&job).unwrap();

        // Two terrains with two tables and one case file each, plus the job.
        assert_eq!(written.len(), 7);
        let terrain_dir = dir.path().join("smoke/mesh_flat/terrain_01");
        assert!(terrain_dir.join("rock_field.csv").is_file());
        assert!(terrain_dir.join("crater_field.csv").is_file());
        assert!(terrain_dir.join(CASES_FILE).is_file());

        let reloaded = DatasetJob::load(dir.path().join("smoke/job.json")).unwrap();
        assert_eq!(reloaded, job);
        assert_eq!(verify_job(&reloaded).unwrap(), 4);
    }

    #[test]
    fn writes_a_centered_standalone_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields/moon_rock_field.csv");
        let placer = centered_placer(FeatureKind::Rock, 0.08, 60.0, 40.0, 0.5, Some(4.0));
        let field = write_field(&placer, 12, &path).unwrap();

        assert!(!field.is_empty());
        assert_eq!(field.origin(), (-30.0, -20.0));
        assert_eq!(field.diameter_range(), (0.5, 4.0));
        for f in field.features() {
            assert!((-30.0..30.0).contains(&f.x));
            assert!((-20.0..20.0).contains(&f.y));
        }
        assert_eq!(load_feature_table(&path).unwrap(), field.features());
        assert_eq!(write_field(&placer, 12, &path).unwrap(), field);
    }

    #[test]
    fn failed_placement_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crater_field.csv");
        let placer = centered_placer(FeatureKind::Crater, 0.1, 2.0, 2.0, 1.5, Some(5.0));
        assert!(write_field(&placer, 1, &path).unwrap_err().is_domain());
        assert!(!path.exists());
    }

    #[test]
    fn verify_detects_edited_tables() {
        let dir = tempdir().unwrap();
        let job = job_in(dir.path());
        write_job_artifacts(&job).unwrap();

        let table = job.terrains[0].output_dir.join("rock_field.csv");
        let text = fs::read_to_string(&table).unwrap();
        let truncated: Vec<&str> = text.lines().take(2).collect();
        fs::write(&table, truncated.join("\n")).unwrap();

        assert!(verify_job(&job).unwrap_err().is_config());
    }
}
