// THEORY:
// The `FrameTabulator` turns a streaming `CentroidAccumulator` into a frame-based
// producer of centroids. It owns the handshake that ends a frame: stop accepting
// samples, divide every non-empty cluster's sums by its count, publish the new
// centroids for exactly one step, then reset and start the next frame with those
// centroids as references.
//
// Key architectural principles:
// 1.  **Explicit State Machine**: The handshake is a `TabulatorState` enum advanced
//     one step at a time by `tick()`. Every operation checks the state first, so
//     "at most one tabulation in flight" is a property of the type, not of caller
//     discipline.
// 2.  **Reject, Don't Queue**: A tabulate request that arrives while a previous
//     tabulation is still freezing, dividing or emitting is rejected with a
//     `TabulateRequest::Rejected` outcome and logged. The in-flight tabulation is
//     untouched. Callers that want the request honoured simply ask again once the
//     emission has been observed.
// 3.  **Bounded Completion**: The tabulator owns one `DivisionUnit` and runs the
//     `2 * players` divisions back to back. `max_tabulation_ticks()` is a hard
//     upper bound; `tabulate()` turns exceeding it into a fatal `DivisionOverrun`.
// 4.  **Empty Is Origin**: A cluster that received no samples reports (0, 0), not
//     its previous centroid. It never reaches the divider.
// 5.  **Faults Are Terminal**: A division that fails or overruns leaves the frame
//     with a missing quotient. The tabulator moves to `Faulted` and refuses every
//     further sample, request and tick, so a partial frame is never published.

use tracing::{debug, error, trace, warn};

use crate::core_modules::centroid_accumulator::{Assignment, CentroidAccumulator, ClusterBank};
use crate::core_modules::coordinate::{Centroid, MAX_PLAYERS, PlayerCount, Resolution, Sample};
use crate::core_modules::division_unit::DivisionUnit;
use crate::error::TrackerError;

/// Width of the default division unit. Wide enough for a full 1280x720 frame of
/// 12-bit coordinates.
pub const DEFAULT_DIVISION_WIDTH_BITS: u32 = 32;

/// Bits needed for the widest sum a frame can produce: every raster position
/// reporting the largest coordinate into one slot.
pub fn required_division_bits(resolution: Resolution) -> u32 {
    let max_coord = resolution.width.max(resolution.height) as u128;
    let max_samples = resolution.width as u128 * resolution.height as u128;
    (128 - (max_coord * max_samples).leading_zeros()).max(1)
}

/// The handshake stage a tabulator is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabulatorState {
    /// Samples are being added to the current frame.
    Accumulating,
    /// A tabulate request was accepted; the next tick latches the frame.
    Freezing,
    /// Waiting for the division unit to finish every queued quotient.
    Dividing,
    /// New centroids are ready; the next tick publishes them and resets.
    Emitting,
    /// A division failed. Nothing further is accepted.
    Faulted,
}

/// The outcome of a tabulate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabulateRequest {
    Accepted,
    /// A tabulation was already in flight; nothing changed.
    Rejected { state: TabulatorState },
}

/// The outcome of offering a sample to the tabulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    Accumulated(Assignment),
    /// The tabulator is not accumulating; the sample does not count toward any frame.
    Refused { state: TabulatorState },
}

/// The published result of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCentroids {
    /// Zero-based index of the frame these centroids close.
    pub frame_index: u64,
    /// The player count latched when the frame was frozen.
    pub players: PlayerCount,
    /// One centroid per slot. Slots at or above `players` hold the origin.
    pub centroids: [Centroid; MAX_PLAYERS],
    /// Samples assigned to each slot during the frame.
    pub counts: [u32; MAX_PLAYERS],
}

impl FrameCentroids {
    /// The meaningful slots of this frame.
    pub fn active(&self) -> &[Centroid] {
        &self.centroids[..self.players.get()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy)]
struct DivisionJob {
    slot: usize,
    axis: Axis,
    numerator: u64,
    denominator: u64,
}

/// Fixed-capacity queue of the divisions a frame needs (two per slot).
#[derive(Debug, Clone, Default)]
struct JobQueue {
    jobs: [Option<DivisionJob>; 2 * MAX_PLAYERS],
    next: usize,
    len: usize,
}

impl JobQueue {
    fn push(&mut self, job: DivisionJob) {
        self.jobs[self.len] = Some(job);
        self.len += 1;
    }

    fn pop(&mut self) -> Option<DivisionJob> {
        if self.next >= self.len {
            return None;
        }
        let job = self.jobs[self.next].take();
        self.next += 1;
        job
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Accumulate/freeze/divide/emit state machine around one `CentroidAccumulator`.
#[derive(Debug, Clone)]
pub struct FrameTabulator {
    state: TabulatorState,
    accumulator: CentroidAccumulator,
    divider: DivisionUnit,
    players: PlayerCount,
    frame_index: u64,

    // --- In-flight tabulation ---
    /// Player count latched at freeze time.
    latched_players: PlayerCount,
    pending: [Centroid; MAX_PLAYERS],
    counts: [u32; MAX_PLAYERS],
    queue: JobQueue,
    current: Option<DivisionJob>,
}

impl FrameTabulator {
    pub fn new(resolution: Resolution, players: PlayerCount) -> Result<Self, TrackerError> {
        Self::with_division_width(resolution, players, DEFAULT_DIVISION_WIDTH_BITS)
    }

    /// Fails if `width_bits` cannot hold a full frame's sums for `resolution`.
    pub fn with_division_width(
        resolution: Resolution,
        players: PlayerCount,
        width_bits: u32,
    ) -> Result<Self, TrackerError> {
        let required = required_division_bits(resolution);
        if width_bits < required || width_bits > 64 {
            return Err(TrackerError::DivisionTooNarrow { width_bits, required });
        }

        Ok(Self {
            state: TabulatorState::Accumulating,
            accumulator: CentroidAccumulator::new(resolution),
            divider: DivisionUnit::new(width_bits),
            players,
            frame_index: 0,
            latched_players: players,
            pending: [Centroid::ORIGIN; MAX_PLAYERS],
            counts: [0; MAX_PLAYERS],
            queue: JobQueue::default(),
            current: None,
        })
    }

    pub fn state(&self) -> TabulatorState {
        self.state
    }

    pub fn players(&self) -> PlayerCount {
        self.players
    }

    /// Index of the frame currently being accumulated.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn accumulator(&self) -> &CentroidAccumulator {
        &self.accumulator
    }

    /// The centroids the current frame is being classified against.
    pub fn references(&self) -> &[Centroid; MAX_PLAYERS] {
        self.accumulator.references()
    }

    /// Upper bound on ticks from an accepted request to the emitting tick,
    /// inclusive: freeze, start of the first division, `latency` ticks per
    /// division (each result tick also starts the next one), emit.
    pub fn max_tabulation_ticks(&self) -> u64 {
        3 + 2 * self.players.get() as u64 * self.divider.latency()
    }

    /// Changes the number of tracked players. Only allowed between frames.
    pub fn set_player_count(&mut self, players: PlayerCount) -> Result<(), TrackerError> {
        if self.state != TabulatorState::Accumulating {
            return Err(TrackerError::PlayerCountLocked(self.state));
        }
        if players != self.players {
            debug!(from = %self.players, to = %players, frame = self.frame_index, "player count changed");
        }
        self.players = players;
        Ok(())
    }

    pub fn observe(&mut self, sample: &Sample) -> ObserveOutcome {
        if self.state != TabulatorState::Accumulating {
            return ObserveOutcome::Refused { state: self.state };
        }
        ObserveOutcome::Accumulated(self.accumulator.observe(sample, self.players))
    }

    /// Adds a partition bank built from `accumulator().classifier()`. Refused
    /// outside of accumulation, like `observe`.
    pub fn absorb(&mut self, partial: &ClusterBank) -> Result<(), TrackerError> {
        if self.state != TabulatorState::Accumulating {
            return Err(TrackerError::NotAccumulating(self.state));
        }
        self.accumulator.absorb(partial);
        Ok(())
    }

    pub fn request_tabulate(&mut self) -> TabulateRequest {
        if self.state == TabulatorState::Faulted {
            warn!(frame = self.frame_index, "tabulate request rejected, tabulator faulted");
            return TabulateRequest::Rejected { state: self.state };
        }
        if self.state != TabulatorState::Accumulating {
            warn!(state = ?self.state, frame = self.frame_index, "tabulate request rejected, tabulation in flight");
            return TabulateRequest::Rejected { state: self.state };
        }
        self.state = TabulatorState::Freezing;
        TabulateRequest::Accepted
    }

    /// Advances the handshake by one step. Returns the new centroids on the one
    /// step where they are published.
    pub fn tick(&mut self) -> Result<Option<FrameCentroids>, TrackerError> {
        match self.state {
            TabulatorState::Accumulating => Ok(None),
            TabulatorState::Freezing => {
                self.freeze();
                Ok(None)
            }
            TabulatorState::Dividing => {
                if let Err(err) = self.advance_division() {
                    self.fault(&err);
                    return Err(err);
                }
                Ok(None)
            }
            TabulatorState::Emitting => Ok(Some(self.emit())),
            TabulatorState::Faulted => Err(TrackerError::TabulatorFaulted),
        }
    }

    /// Requests a tabulation and drives it to emission, failing if it takes more
    /// than `budget` ticks. A rejected request is reported as `Ok(None)`, except
    /// on a faulted tabulator. Overrunning the budget faults the tabulator.
    pub fn tabulate(&mut self, budget: u64) -> Result<Option<FrameCentroids>, TrackerError> {
        if self.state == TabulatorState::Faulted {
            return Err(TrackerError::TabulatorFaulted);
        }
        if let TabulateRequest::Rejected { .. } = self.request_tabulate() {
            return Ok(None);
        }
        for _ in 0..budget {
            if let Some(frame) = self.tick()? {
                return Ok(Some(frame));
            }
        }
        let err = TrackerError::DivisionOverrun { budget };
        self.fault(&err);
        Err(err)
    }

    fn fault(&mut self, err: &TrackerError) {
        error!(frame = self.frame_index, state = ?self.state, %err, "tabulation failed, tabulator faulted");
        self.state = TabulatorState::Faulted;
        self.queue.clear();
        self.current = None;
    }

    fn freeze(&mut self) {
        self.latched_players = self.players;
        self.pending = [Centroid::ORIGIN; MAX_PLAYERS];
        self.counts = [0; MAX_PLAYERS];
        self.queue.clear();
        self.current = None;

        let bank = *self.accumulator.bank();
        for (slot, cluster) in bank.slots.iter().enumerate().take(self.latched_players.get()) {
            self.counts[slot] = cluster.count;
            if cluster.is_empty() {
                continue;
            }
            let denominator = cluster.count as u64;
            self.queue.push(DivisionJob {
                slot,
                axis: Axis::X,
                numerator: cluster.sum_x,
                denominator,
            });
            self.queue.push(DivisionJob {
                slot,
                axis: Axis::Y,
                numerator: cluster.sum_y,
                denominator,
            });
        }

        trace!(frame = self.frame_index, divisions = self.queue.len, "frame frozen");
        self.state = if self.queue.len == 0 {
            TabulatorState::Emitting
        } else {
            TabulatorState::Dividing
        };
    }

    fn advance_division(&mut self) -> Result<(), TrackerError> {
        if !self.divider.is_busy() {
            match self.queue.pop() {
                Some(job) => {
                    self.divider.start(job.numerator, job.denominator)?;
                    self.current = Some(job);
                    return Ok(());
                }
                None => {
                    self.state = TabulatorState::Emitting;
                    return Ok(());
                }
            }
        }

        if let Some(quotient) = self.divider.step() {
            if let Some(job) = self.current.take() {
                // Quotient of a coordinate mean never exceeds the coordinate range.
                let value = quotient as u32;
                match job.axis {
                    Axis::X => self.pending[job.slot].x = value,
                    Axis::Y => self.pending[job.slot].y = value,
                }
            }
            if let Some(next) = self.queue.pop() {
                self.divider.start(next.numerator, next.denominator)?;
                self.current = Some(next);
            } else {
                self.state = TabulatorState::Emitting;
            }
        }
        Ok(())
    }

    fn emit(&mut self) -> FrameCentroids {
        let frame = FrameCentroids {
            frame_index: self.frame_index,
            players: self.latched_players,
            centroids: self.pending,
            counts: self.counts,
        };
        debug!(frame = frame.frame_index, players = %frame.players, centroids = ?frame.active(), "frame tabulated");

        self.accumulator.reset(self.pending);
        self.frame_index += 1;
        self.state = TabulatorState::Accumulating;
        frame
    }
}
