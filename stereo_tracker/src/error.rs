use thiserror::Error;

use crate::core_modules::frame_tabulator::TabulatorState;

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by the tracking pipeline.
///
/// Empty clusters, zero disparity, out-of-area samples and overlapping
/// tabulation requests are not errors; they are encoded in the output data.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("player count must be within 1..=4, got {0}")]
    InvalidPlayerCount(u8),

    #[error("player count can only change while accumulating (tabulator is {0:?})")]
    PlayerCountLocked(TabulatorState),

    #[error("tabulator is not accumulating (state {0:?})")]
    NotAccumulating(TabulatorState),

    #[error("division by zero submitted to the division unit")]
    DivisionByZero,

    #[error("numerator {numerator} does not fit in a {width_bits}-bit division unit")]
    OperandTooWide { numerator: u64, width_bits: u32 },

    #[error("division unit is busy with another request")]
    DivisionBusy,

    #[error("division did not complete within {budget} steps")]
    DivisionOverrun { budget: u64 },

    #[error("a {width_bits}-bit division unit is too narrow for this sensor, {required} bits required")]
    DivisionTooNarrow { width_bits: u32, required: u32 },

    #[error("tabulator faulted on a failed division and accepts no further frames")]
    TabulatorFaulted,

    #[error("stereo frames out of step: sensor A at frame {a}, sensor B at frame {b}")]
    FrameMismatch { a: u64, b: u64 },

    #[error("stereo frames disagree on player count: sensor A {a}, sensor B {b}")]
    PlayerCountMismatch { a: u8, b: u8 },

    #[error("sensor worker unavailable: {0}")]
    WorkerUnavailable(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
