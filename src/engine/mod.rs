//! Engine module housing the end-to-end pipeline.
//!
//! `Pipeline` (`core`) owns a connector, a spectral processor and a trainer,
//! wires their channels together and exposes merged async event streams for
//! front ends such as the CLI.

pub mod core;

pub use self::core::{Pipeline, PipelineEvent};
