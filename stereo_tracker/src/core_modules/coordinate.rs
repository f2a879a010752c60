// THEORY:
// The `coordinate` module holds the "dumb" data containers every other layer of
// the tracker speaks in. Nothing here knows about frames, clusters or sensors;
// it only describes a point on a sensor raster and the small, fixed vocabulary
// (slot count, player count, resolution) the streaming layers are built on.
//
// Key architectural principles:
// 1.  **Fixed Slots**: A frame never tracks more than `MAX_PLAYERS` players, so
//     every per-player collection downstream is a `[T; MAX_PLAYERS]` array. Slots
//     above the active player count still exist and hold defined values; they are
//     simply ignored by consumers.
// 2.  **Validated Player Count**: `PlayerCount` can only be built from 1..=4, which
//     removes a whole class of out-of-range indexing from the hot path.
// 3.  **Raster Bounds**: `Resolution` decides which samples are in the active area.
//     A sample outside it is treated exactly like a sample flagged not-valid.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TrackerError;

/// The number of cluster slots carried by every frame.
pub const MAX_PLAYERS: usize = 4;

/// A position on a sensor raster, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coordinate {
    pub x: u32,
    pub y: u32,
}

impl Coordinate {
    pub const ORIGIN: Coordinate = Coordinate { x: 0, y: 0 };

    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Manhattan (L1) distance between two raster positions.
    pub fn manhattan(&self, other: &Coordinate) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

/// One step of the detector's output stream: a raster position plus the
/// silhouette flag for that position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub coord: Coordinate,
    pub valid: bool,
}

impl Sample {
    pub fn new(x: u32, y: u32, valid: bool) -> Self {
        Self {
            coord: Coordinate::new(x, y),
            valid,
        }
    }

    pub fn valid(x: u32, y: u32) -> Self {
        Self::new(x, y, true)
    }

    pub fn invalid(x: u32, y: u32) -> Self {
        Self::new(x, y, false)
    }
}

/// The emitted mean position of one cluster slot.
pub type Centroid = Coordinate;

/// The active raster area of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        coord.x < self.width && coord.y < self.height
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// The number of players being tracked, always within 1..=MAX_PLAYERS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PlayerCount(u8);

impl PlayerCount {
    pub const ONE: PlayerCount = PlayerCount(1);
    pub const MAX: PlayerCount = PlayerCount(MAX_PLAYERS as u8);

    pub fn new(count: u8) -> Result<Self, TrackerError> {
        if (1..=MAX_PLAYERS as u8).contains(&count) {
            Ok(Self(count))
        } else {
            Err(TrackerError::InvalidPlayerCount(count))
        }
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for PlayerCount {
    type Error = TrackerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlayerCount> for u8 {
    fn from(value: PlayerCount) -> Self {
        value.0
    }
}

impl fmt::Display for PlayerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
