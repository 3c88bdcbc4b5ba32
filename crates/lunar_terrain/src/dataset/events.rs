//! Event types and sinks for observing dataset planning and rendering.
//!
//! [`DatasetEvent`]s are emitted by [`crate::dataset::DatasetOrchestrator::plan`] and
//! [`crate::dataset::render_job`]. Sinks can skip building events they do not want through
//! [`EventSink::wants`].
use std::path::PathBuf;

use crate::terrain::FeatureKind;

/// Describes events emitted while planning or rendering a dataset job.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetEvent {
    /// Planning started.
    PlanStarted {
        name: String,
        meshes: usize,
        samples: usize,
        cases_per_sample: usize,
    },

    /// A feature field was generated for one terrain sample.
    FieldGenerated {
        mesh_index: usize,
        sample_index: usize,
        kind: FeatureKind,
        features: usize,
        achieved_cfa: f64,
        needed_cfa: f64,
        seed: u64,
    },

    /// The case list of one terrain sample was materialized.
    CasesEnumerated {
        mesh_index: usize,
        sample_index: usize,
        cases: usize,
    },

    /// Planning finished; every parameter of the job is now concrete.
    PlanFinished { planned_cases: usize },

    /// A case was handed to the renderer.
    CaseStarted {
        terrain: usize,
        case_id: u32,
        output_dir: PathBuf,
    },

    /// The renderer reported its files for a case.
    CaseRendered {
        terrain: usize,
        case_id: u32,
        files: Vec<String>,
        completed: usize,
        planned: usize,
    },

    /// A case already had files and was not dispatched again.
    CaseSkipped { terrain: usize, case_id: u32 },

    /// Dispatch stopped on the cancellation flag.
    Cancelled { completed: usize, planned: usize },

    /// Non-fatal warning.
    Warning { context: String, message: String },
}

/// Discriminant of [`DatasetEvent`], used to filter events before they are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetEventKind {
    PlanStarted,
    FieldGenerated,
    CasesEnumerated,
    PlanFinished,
    CaseStarted,
    CaseRendered,
    CaseSkipped,
    Cancelled,
    Warning,
}

impl DatasetEvent {
    pub fn kind(&self) -> DatasetEventKind {
        match self {
            DatasetEvent::PlanStarted { .. } => DatasetEventKind::PlanStarted,
            DatasetEvent::FieldGenerated { .. } => DatasetEventKind::FieldGenerated,
            DatasetEvent::CasesEnumerated { .. } => DatasetEventKind::CasesEnumerated,
            DatasetEvent::PlanFinished { .. } => DatasetEventKind::PlanFinished,
            DatasetEvent::CaseStarted { .. } => DatasetEventKind::CaseStarted,
            DatasetEvent::CaseRendered { .. } => DatasetEventKind::CaseRendered,
            DatasetEvent::CaseSkipped { .. } => DatasetEventKind::CaseSkipped,
            DatasetEvent::Cancelled { .. } => DatasetEventKind::Cancelled,
            DatasetEvent::Warning { .. } => DatasetEventKind::Warning,
        }
    }
}

/// A generic event sink that accepts [`DatasetEvent`]s.
pub trait EventSink {
    fn send(&mut self, event: DatasetEvent);

    /// Whether events of `kind` should be built and sent at all.
    #[inline]
    fn wants(&self, _kind: DatasetEventKind) -> bool {
        true
    }
}

/// A no-op event sink.
impl EventSink for () {
    #[inline]
    fn send(&mut self, _event: DatasetEvent) {}

    #[inline]
    fn wants(&self, _kind: DatasetEventKind) -> bool {
        false
    }
}

/// An event sink that forwards to a user-provided closure.
pub struct FnSink<F>
where
    F: FnMut(DatasetEvent),
{
    f: F,
}

impl<F> FnSink<F>
where
    F: FnMut(DatasetEvent),
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventSink for FnSink<F>
where
    F: FnMut(DatasetEvent),
{
    #[inline]
    fn send(&mut self, event: DatasetEvent) {
        (self.f)(event);
    }
}

/// An event sink that collects all events in a `Vec`.
#[derive(Default)]
pub struct VecSink {
    events: Vec<DatasetEvent>,
}

impl VecSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn into_inner(self) -> Vec<DatasetEvent> {
        self.events
    }

    pub fn as_slice(&self) -> &[DatasetEvent] {
        &self.events
    }

    /// Number of collected events of `kind`.
    pub fn count(&self, kind: DatasetEventKind) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for VecSink {
    #[inline]
    fn send(&mut self, event: DatasetEvent) {
        self.events.push(event);
    }
}
