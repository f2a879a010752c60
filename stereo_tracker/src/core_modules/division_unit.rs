// THEORY:
// The `DivisionUnit` is the only suspending operation in the whole tracker. Both
// the centroid tabulation and the depth estimate need integer division, and
// both need to know, ahead of time, how long a division can take.
//
// Key architectural principles:
// 1.  **Bounded Latency**: The unit performs restoring long division, producing
//     exactly one quotient bit per `step()`. A `width_bits`-wide division is
//     therefore finished after exactly `width_bits` steps, regardless of the
//     operand values. Callers can budget for it and treat overrun as a defect.
// 2.  **One Request In Flight**: A unit holds a single division at a time. A second
//     `start` while busy is refused rather than queued; queueing is the caller's
//     job (see `FrameTabulator`).
// 3.  **Caller-Handled Zero**: A zero denominator is never a valid request. The
//     clustering layer reports an empty cluster as the origin before it ever
//     reaches this unit, so a zero here is a contract violation.
// 4.  **Per-Consumer Instance**: Each tabulator and each depth estimator owns its
//     own unit. There is no shared instance and therefore no lock.

use crate::error::TrackerError;

/// A bounded-latency, one-bit-per-step unsigned integer divider.
#[derive(Debug, Clone)]
pub struct DivisionUnit {
    width_bits: u32,
    job: Option<InFlight>,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    numerator: u64,
    denominator: u64,
    remainder: u128,
    quotient: u64,
    /// The next numerator bit to bring down. Counts down from `width_bits`.
    bits_left: u32,
}

impl DivisionUnit {
    /// Creates a divider for operands of at most `width_bits` bits (1..=64).
    pub fn new(width_bits: u32) -> Self {
        Self {
            width_bits: width_bits.clamp(1, 64),
            job: None,
        }
    }

    pub fn width_bits(&self) -> u32 {
        self.width_bits
    }

    /// The number of `step` calls a division takes, from `start` to result.
    pub fn latency(&self) -> u64 {
        self.width_bits as u64
    }

    pub fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    /// Loads a new division. Fails if a division is already in flight, the
    /// denominator is zero, or the numerator does not fit the unit's width.
    pub fn start(&mut self, numerator: u64, denominator: u64) -> Result<(), TrackerError> {
        if self.job.is_some() {
            return Err(TrackerError::DivisionBusy);
        }
        if denominator == 0 {
            return Err(TrackerError::DivisionByZero);
        }
        if self.width_bits < 64 && numerator >> self.width_bits != 0 {
            return Err(TrackerError::OperandTooWide {
                numerator,
                width_bits: self.width_bits,
            });
        }

        self.job = Some(InFlight {
            numerator,
            denominator,
            remainder: 0,
            quotient: 0,
            bits_left: self.width_bits,
        });
        Ok(())
    }

    /// Advances the in-flight division by one quotient bit. Returns the floor
    /// quotient on the step that completes it, `None` otherwise (including when
    /// the unit is idle).
    pub fn step(&mut self) -> Option<u64> {
        let job = self.job.as_mut()?;

        let bit_index = job.bits_left - 1;
        let next_bit = (job.numerator >> bit_index) & 1;
        job.remainder = (job.remainder << 1) | next_bit as u128;
        if job.remainder >= job.denominator as u128 {
            job.remainder -= job.denominator as u128;
            job.quotient |= 1 << bit_index;
        }
        job.bits_left -= 1;

        if job.bits_left == 0 {
            let quotient = job.quotient;
            self.job = None;
            Some(quotient)
        } else {
            None
        }
    }

    /// Runs a complete division, failing with `DivisionOverrun` if it has not
    /// produced a result within `budget` steps.
    pub fn divide(&mut self, numerator: u64, denominator: u64, budget: u64) -> Result<u64, TrackerError> {
        self.start(numerator, denominator)?;
        for _ in 0..budget {
            if let Some(quotient) = self.step() {
                return Ok(quotient);
            }
        }
        // Leave the unit usable for whoever handles the failure.
        self.job = None;
        Err(TrackerError::DivisionOverrun { budget })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_quotient_matches_native_division() {
        let mut unit = DivisionUnit::new(32);
        for (n, d) in [(0u64, 1u64), (7, 2), (100, 3), (1_178_726_400, 921_600), (4095, 4095), (1, 4095)] {
            let q = unit.divide(n, d, unit.latency()).unwrap();
            assert_eq!(q, n / d, "{n} / {d}");
        }
    }

    #[test]
    fn latency_does_not_depend_on_operands() {
        let mut unit = DivisionUnit::new(12);
        for (n, d) in [(0u64, 1u64), (4095, 1), (4095, 4095), (2048, 3)] {
            unit.start(n, d).unwrap();
            let mut steps = 0;
            let quotient = loop {
                steps += 1;
                if let Some(q) = unit.step() {
                    break q;
                }
            };
            assert_eq!(steps, 12);
            assert_eq!(quotient, n / d);
        }
    }

    #[test]
    fn rejects_second_request_while_busy() {
        let mut unit = DivisionUnit::new(16);
        unit.start(10, 3).unwrap();
        assert!(matches!(unit.start(20, 3), Err(TrackerError::DivisionBusy)));
        assert!(unit.is_busy());
    }

    #[test]
    fn rejects_zero_denominator_and_wide_numerator() {
        let mut unit = DivisionUnit::new(8);
        assert!(matches!(unit.start(10, 0), Err(TrackerError::DivisionByZero)));
        assert!(matches!(
            unit.start(256, 1),
            Err(TrackerError::OperandTooWide { numerator: 256, width_bits: 8 })
        ));
        assert!(!unit.is_busy());
    }

    #[test]
    fn short_budget_is_an_overrun() {
        let mut unit = DivisionUnit::new(32);
        let err = unit.divide(1000, 7, 31).unwrap_err();
        assert!(matches!(err, TrackerError::DivisionOverrun { budget: 31 }));
        assert!(!unit.is_busy());
    }

    #[test]
    fn full_width_unit_handles_large_operands() {
        let mut unit = DivisionUnit::new(64);
        let q = unit.divide(u64::MAX, 3, 64).unwrap();
        assert_eq!(q, u64::MAX / 3);
    }
}
