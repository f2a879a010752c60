// THEORY:
// This file is the main entry point for the `stereo_tracker` library crate. It
// defines the public API handed to the rig's runners: the two stereo pipelines
// (`StereoPipeline` for step-by-step synchronous use, `ParallelPipeline` for one
// async worker per sensor), their configuration and the per-frame
// `StereoReport`.
//
// The `core_modules` hold the individual hardware-shaped stages (divider,
// accumulator, tabulator, correspondence, depth). They are public so tests and
// tools can drive a single stage, but the pipelines are the intended interface.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod telemetry;

pub use config::{ConfigLoader, TrackerConfig};
pub use core_modules::coordinate::{Centroid, Coordinate, MAX_PLAYERS, PlayerCount, Resolution, Sample};
pub use core_modules::depth_estimator::{Calibration, DepthReading};
pub use error::{ConfigError, TrackerError};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{PipelineConfig, StereoFrame, StereoPipeline, StereoReport};
pub use telemetry::{LogConfig, init_logging};
