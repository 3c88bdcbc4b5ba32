//! Dataset jobs: planning, serialization and dispatch to the rendering collaborator.
pub mod events;
pub mod job;
pub mod orchestrator;

pub use events::{DatasetEvent, DatasetEventKind, EventSink, FnSink, VecSink};
pub use job::{DatasetJob, MeshInfo, ScaleParameters, TerrainJob, CASES_FILE, JOB_FILE};
pub use orchestrator::{
    render_job, terrain_dir, CaseRenderer, DatasetOrchestrator, RenderSummary,
    DEFAULT_DATASET_NAME,
};
