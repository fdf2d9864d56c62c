//! Core logic and abstractions for vsixpack.
//!
//! This crate defines the pipeline steps, their failure policies, the
//! configuration file, the toolchain and process-runner seams, and the
//! orchestration routine that packages and reinstalls an editor extension.

pub mod artifact;
pub mod command;
pub mod config;
pub mod constants;
pub mod error;
pub mod pipeline;
pub mod project;
pub mod runner;
pub mod runtime;
pub mod step;
pub mod toolchain;

pub use command::{CommandRef, PrimaryCommand};
pub use config::VsixpackConfig;
pub use error::StepError;
pub use pipeline::{Pipeline, PipelineReport, StepRecord, StepStatus};
pub use runner::{ProcessOutput, ProcessRunner};
pub use runtime::{RuntimeManager, RuntimeSpec};
pub use step::{OnFailure, PlannedStep, StepKind};
pub use toolchain::{ExecutionAction, StepContext, Toolchain};
