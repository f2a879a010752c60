// THEORY:
// The `CentroidAccumulator` is the streaming clustering layer. It sees one
// detector sample at a time and has to decide, immediately and without looking
// back, which player that sample belongs to. It does this with a single-step
// nearest-centroid rule: the reference points are the centroids emitted at the
// end of the previous frame, and every valid sample is handed to the closest one.
//
// Key architectural principles:
// 1.  **Frozen References**: Distances are always measured against the reference
//     centroids held since the last emission, never against this frame's partial
//     sums. This makes classification a pure function of (sample, references),
//     which is what lets a frame be accumulated in any order.
// 2.  **Deterministic Tie-Break**: Candidates are scanned from slot 0 upward and the
//     best is only replaced on a strictly smaller Manhattan distance, so an exact
//     tie always resolves to the lowest slot index.
// 3.  **Partitioned Accumulation**: A `Classifier` is a `Copy` snapshot of the
//     references. Independent partitions of a frame can be classified into their
//     own `ClusterBank`s and merged afterwards with the same result as a single
//     sequential pass.
// 4.  **No Allocation**: Four fixed slots, summed in place. The hot path is a
//     handful of integer operations per sample.

use crate::core_modules::coordinate::{Centroid, Coordinate, MAX_PLAYERS, PlayerCount, Resolution, Sample};

/// Running sums for one cluster slot over the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterAccumulator {
    pub sum_x: u64,
    pub sum_y: u64,
    pub count: u32,
}

impl ClusterAccumulator {
    fn add(&mut self, coord: &Coordinate) {
        self.sum_x += coord.x as u64;
        self.sum_y += coord.y as u64;
        self.count += 1;
    }

    fn absorb(&mut self, other: &ClusterAccumulator) {
        self.sum_x += other.sum_x;
        self.sum_y += other.sum_y;
        self.count += other.count;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// The per-slot sums of a frame, or of one partition of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterBank {
    pub slots: [ClusterAccumulator; MAX_PLAYERS],
}

impl ClusterBank {
    pub fn merge(&mut self, other: &ClusterBank) {
        for (mine, theirs) in self.slots.iter_mut().zip(other.slots.iter()) {
            mine.absorb(theirs);
        }
    }

    pub fn total_count(&self) -> u64 {
        self.slots.iter().map(|s| s.count as u64).sum()
    }
}

/// What happened to a single observed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The sample was added to this cluster slot.
    Assigned(usize),
    /// The detector flagged the sample as not part of a silhouette.
    NotValid,
    /// The sample lies outside the sensor's active area and was treated as not valid.
    OutOfBounds,
}

/// A read-only snapshot of the reference centroids used to classify samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    references: [Centroid; MAX_PLAYERS],
    resolution: Resolution,
}

impl Classifier {
    pub fn new(references: [Centroid; MAX_PLAYERS], resolution: Resolution) -> Self {
        Self { references, resolution }
    }

    /// Returns the slot with the smallest Manhattan distance to `coord` among the
    /// first `players` references. Ties go to the lowest index.
    pub fn nearest_slot(&self, coord: &Coordinate, players: PlayerCount) -> usize {
        let mut best_slot = 0;
        let mut best_dist = coord.manhattan(&self.references[0]);

        for slot in 1..players.get() {
            let dist = coord.manhattan(&self.references[slot]);
            if dist < best_dist {
                best_dist = dist;
                best_slot = slot;
            }
        }

        best_slot
    }

    pub fn classify(&self, sample: &Sample, players: PlayerCount) -> Assignment {
        if !sample.valid {
            return Assignment::NotValid;
        }
        if !self.resolution.contains(&sample.coord) {
            return Assignment::OutOfBounds;
        }
        Assignment::Assigned(self.nearest_slot(&sample.coord, players))
    }

    /// Classifies a run of samples into a fresh bank. Used for partitioned passes.
    pub fn accumulate(&self, samples: &[Sample], players: PlayerCount) -> ClusterBank {
        let mut bank = ClusterBank::default();
        for sample in samples {
            if let Assignment::Assigned(slot) = self.classify(sample, players) {
                bank.slots[slot].add(&sample.coord);
            }
        }
        bank
    }

    pub fn references(&self) -> &[Centroid; MAX_PLAYERS] {
        &self.references
    }
}

/// Per-sensor streaming accumulator: reference centroids plus this frame's sums.
#[derive(Debug, Clone)]
pub struct CentroidAccumulator {
    classifier: Classifier,
    bank: ClusterBank,
}

impl CentroidAccumulator {
    /// Starts with every reference at the origin, as before the first tabulation.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            classifier: Classifier::new([Centroid::ORIGIN; MAX_PLAYERS], resolution),
            bank: ClusterBank::default(),
        }
    }

    pub fn observe(&mut self, sample: &Sample, players: PlayerCount) -> Assignment {
        let assignment = self.classifier.classify(sample, players);
        if let Assignment::Assigned(slot) = assignment {
            self.bank.slots[slot].add(&sample.coord);
        }
        assignment
    }

    /// Folds in a bank produced by `Classifier::accumulate` from this
    /// accumulator's own `classifier()` snapshot.
    pub fn absorb(&mut self, partial: &ClusterBank) {
        self.bank.merge(partial);
    }

    pub fn classifier(&self) -> Classifier {
        self.classifier
    }

    pub fn bank(&self) -> &ClusterBank {
        &self.bank
    }

    pub fn references(&self) -> &[Centroid; MAX_PLAYERS] {
        self.classifier.references()
    }

    pub fn resolution(&self) -> Resolution {
        self.classifier.resolution
    }

    /// Installs new reference centroids and zeroes every slot's sums. Called once
    /// per frame, when a tabulation has been emitted.
    pub fn reset(&mut self, references: [Centroid; MAX_PLAYERS]) {
        self.classifier.references = references;
        self.bank = ClusterBank::default();
    }
}
