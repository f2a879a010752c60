// THEORY:
// The `DepthEstimator` is the last stage of the stereo path. It turns the
// horizontal offset of one player between the two sensors into a distance from
// the rig, using the pinhole stereo relation
//
//     depth = focal_length * baseline * pixel_density / disparity
//
// where `pixel_density = resolution_width / sensor_width` converts the disparity
// from pixels back into sensor units.
//
// Output contract:
// - Zero disparity has no defined depth and reports the sentinel `255`. It never
//   reaches the divider.
// - Any non-zero disparity reports `ceil(depth)`, which is always at least 1,
//   saturated to 254 so it can never collide with the sentinel.
// - The result never increases as disparity grows.
//
// The scale factor is fixed by calibration, so it is converted once into a
// 16-bit fixed-point integer. Every depth is then one integer ceiling division
// on the estimator's own `DivisionUnit`, with the same bounded latency as the
// centroid divisions. A 16-bit fraction reproduces the exact ceiling for every
// 12-bit disparity on the reference rig.

use serde::{Deserialize, Serialize};

use crate::core_modules::coordinate::MAX_PLAYERS;
use crate::core_modules::division_unit::DivisionUnit;
use crate::core_modules::stereo_correspondence::{Correspondence, MatchedPair};
use crate::error::TrackerError;

/// Fractional bits of the fixed-point depth scale.
const SCALE_FRACTION_BITS: u32 = 16;

/// Operand width of the depth divider. A full `u32` disparity shifted by the
/// fraction bits, plus the scale, fits in 64 bits.
pub const DEPTH_DIVISION_WIDTH_BITS: u32 = 64;

/// Fixed rig calibration. Lengths share one unit (inches on the reference rig);
/// the depth comes out in that unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Horizontal sensor resolution in pixels.
    pub resolution_width: f64,
    /// Physical width of the sensor.
    pub sensor_width: f64,
    pub focal_length: f64,
    /// Distance between the two sensors' optical centres.
    pub baseline_distance: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            resolution_width: 1280.0,
            sensor_width: 0.334646,
            focal_length: 0.1295276,
            baseline_distance: 6.0,
        }
    }
}

impl Calibration {
    pub fn pixel_density(&self) -> f64 {
        self.resolution_width / self.sensor_width
    }

    /// Depth times disparity: the constant numerator of the depth formula.
    pub fn depth_scale(&self) -> f64 {
        self.focal_length * self.baseline_distance * self.pixel_density()
    }
}

/// An 8-bit depth value. `UNDEFINED` means the depth could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepthReading(pub u8);

impl DepthReading {
    pub const UNDEFINED: DepthReading = DepthReading(u8::MAX);
    /// The largest depth that is a real measurement.
    pub const MAX_MEASURED: u8 = u8::MAX - 1;

    pub fn is_defined(&self) -> bool {
        *self != Self::UNDEFINED
    }

    pub fn value(&self) -> Option<u8> {
        self.is_defined().then_some(self.0)
    }
}

impl Default for DepthReading {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// Turns matched pairs into depth readings on its own division unit.
#[derive(Debug, Clone)]
pub struct DepthEstimator {
    /// `depth_scale * 2^SCALE_FRACTION_BITS`, rounded.
    scale_fixed: u64,
    divider: DivisionUnit,
}

impl DepthEstimator {
    pub fn new(calibration: Calibration) -> Self {
        // Float-to-int `as` saturates on a broken calibration.
        let scale_fixed = (calibration.depth_scale() * (1u64 << SCALE_FRACTION_BITS) as f64).round() as u64;
        Self {
            scale_fixed,
            divider: DivisionUnit::new(DEPTH_DIVISION_WIDTH_BITS),
        }
    }

    /// Steps one depth division may take.
    pub fn division_budget(&self) -> u64 {
        self.divider.latency()
    }

    /// Unsaturated `ceil(scale / disparity)`, or `None` for zero disparity.
    pub fn raw_depth(&mut self, x_a: u32, x_b: u32) -> Result<Option<u32>, TrackerError> {
        let disparity = x_a.abs_diff(x_b);
        if disparity == 0 {
            return Ok(None);
        }
        let denominator = (disparity as u64) << SCALE_FRACTION_BITS;
        let numerator = self.scale_fixed.saturating_add(denominator - 1);
        let budget = self.division_budget();
        let quotient = self.divider.divide(numerator, denominator, budget)?;
        // Only a zero scale can produce 0; a real disparity is never closer than 1.
        Ok(Some(quotient.clamp(1, u32::MAX as u64) as u32))
    }

    pub fn depth(&mut self, x_a: u32, x_b: u32) -> Result<DepthReading, TrackerError> {
        Ok(match self.raw_depth(x_a, x_b)? {
            None => DepthReading::UNDEFINED,
            Some(raw) => DepthReading(raw.min(DepthReading::MAX_MEASURED as u32) as u8),
        })
    }

    pub fn depth_of(&mut self, pair: &MatchedPair) -> Result<DepthReading, TrackerError> {
        self.depth(pair.x_a, pair.x_b)
    }

    /// One reading per sensor-A slot; unpaired slots are `UNDEFINED`.
    pub fn depths(&mut self, correspondence: &Correspondence) -> Result<[DepthReading; MAX_PLAYERS], TrackerError> {
        let mut readings = [DepthReading::UNDEFINED; MAX_PLAYERS];
        for (reading, pair) in readings.iter_mut().zip(correspondence.pairs.iter()) {
            if let Some(pair) = pair {
                *reading = self.depth_of(pair)?;
            }
        }
        Ok(readings)
    }
}

impl Default for DepthEstimator {
    fn default() -> Self {
        Self::new(Calibration::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_disparity_is_undefined() {
        let mut estimator = DepthEstimator::default();
        assert_eq!(estimator.depth(150, 150).unwrap(), DepthReading::UNDEFINED);
        assert_eq!(estimator.raw_depth(0, 0).unwrap(), None);
        assert_eq!(estimator.depth(7, 7).unwrap().value(), None);
    }

    #[test]
    fn reference_rig_values() {
        let mut estimator = DepthEstimator::default();
        // 0.1295276 * 6 * (1280 / 0.334646) = 2972.6..., / 10 -> 297.26 -> 298
        assert_eq!(estimator.raw_depth(100, 90).unwrap(), Some(298));
        assert_eq!(estimator.depth(100, 90).unwrap(), DepthReading(254));
        assert_eq!(estimator.raw_depth(500, 400).unwrap(), Some(30));
        assert_eq!(estimator.depth(500, 400).unwrap(), DepthReading(30));
        assert_eq!(estimator.raw_depth(1, 0).unwrap(), Some(2973));
    }

    #[test]
    fn fixed_point_division_matches_the_exact_ceiling() {
        let mut estimator = DepthEstimator::default();
        let scale = Calibration::default().depth_scale();
        for disparity in 1..=4095u32 {
            let expected = (scale / disparity as f64).ceil() as u32;
            assert_eq!(estimator.raw_depth(disparity, 0).unwrap(), Some(expected), "disparity {disparity}");
        }
    }

    #[test]
    fn full_width_disparity_is_symmetric_and_positive() {
        let mut estimator = DepthEstimator::default();
        assert_eq!(estimator.depth(0xFFF, 0).unwrap(), DepthReading(1));
        assert_eq!(estimator.depth(0, 0xFFF).unwrap(), DepthReading(1));
        assert_eq!(estimator.raw_depth(u32::MAX, 0).unwrap(), Some(1));
    }

    #[test]
    fn depth_never_increases_with_disparity() {
        let mut estimator = DepthEstimator::default();
        let mut previous = estimator.depth(0, 1).unwrap();
        for disparity in 2..=4095u32 {
            let current = estimator.depth(0, disparity).unwrap();
            assert!(current <= previous, "disparity {disparity}: {current:?} > {previous:?}");
            assert!(current.is_defined());
            previous = current;
        }
    }

    #[test]
    fn depths_align_with_sensor_a_slots() {
        let mut estimator = DepthEstimator::default();
        let mut correspondence = Correspondence::default();
        correspondence.pairs[1] = Some(MatchedPair {
            a_slot: 1,
            b_slot: 0,
            x_a: 500,
            x_b: 400,
        });
        let depths = estimator.depths(&correspondence).unwrap();
        assert_eq!(depths[0], DepthReading::UNDEFINED);
        assert_eq!(depths[1], DepthReading(30));
    }
}
