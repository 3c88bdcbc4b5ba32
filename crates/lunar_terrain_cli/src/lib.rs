#![forbid(unsafe_code)]

mod output;

pub use output::{centered_placer, init_tracing, verify_job, write_field, write_job_artifacts};
