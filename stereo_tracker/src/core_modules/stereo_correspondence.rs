// THEORY:
// `StereoCorrespondence` answers one question per frame: which of sensor A's
// players is which of sensor B's players? The rig's two sensors sit side by side
// on a horizontal baseline and are vertically aligned, so the same player lands
// at (nearly) the same row in both views while the column shifts with depth.
//
// Algorithm:
// 1.  **Barrier**: Both inputs must be emissions of the same frame index with the
//     same latched player count. Anything else is a pipeline fault.
// 2.  **Vertical Ranking**: Each sensor's active centroids are sorted by ascending
//     `y`. Equal rows keep slot order (stable sort), so the result is fully
//     deterministic.
// 3.  **Rank Pairing**: The k-th lowest centroid of A is paired with the k-th lowest
//     of B. The pairing is reported per sensor-A slot, so depth values line up
//     with sensor A's player slots.
//
// Known limitation: this assumes players occupy non-overlapping vertical bands.
// Two players at the same height can swap partners between frames. It is not a
// general assignment solver.

use crate::core_modules::coordinate::{Centroid, MAX_PLAYERS};
use crate::core_modules::frame_tabulator::FrameCentroids;
use crate::error::TrackerError;

/// One same-player pair across the two sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    pub a_slot: usize,
    pub b_slot: usize,
    pub x_a: u32,
    pub x_b: u32,
}

impl MatchedPair {
    pub fn disparity(&self) -> u32 {
        self.x_a.abs_diff(self.x_b)
    }
}

/// The pairing for one frame, indexed by sensor-A slot. Slots at or above the
/// player count are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Correspondence {
    pub pairs: [Option<MatchedPair>; MAX_PLAYERS],
}

impl Correspondence {
    pub fn active(&self) -> impl Iterator<Item = &MatchedPair> {
        self.pairs.iter().flatten()
    }
}

pub mod stereo_correspondence {
    use super::*;

    /// Pairs two emissions of the same frame by vertical rank.
    pub fn correspond(a: &FrameCentroids, b: &FrameCentroids) -> Result<Correspondence, TrackerError> {
        if a.frame_index != b.frame_index {
            return Err(TrackerError::FrameMismatch {
                a: a.frame_index,
                b: b.frame_index,
            });
        }
        if a.players != b.players {
            return Err(TrackerError::PlayerCountMismatch {
                a: a.players.into(),
                b: b.players.into(),
            });
        }

        Ok(match_by_vertical_rank(a.active(), b.active()))
    }

    /// Pairs equal-rank centroids after sorting each side by ascending `y`.
    /// Both slices must have the same length (the active player count).
    pub fn match_by_vertical_rank(a: &[Centroid], b: &[Centroid]) -> Correspondence {
        let count = a.len().min(b.len()).min(MAX_PLAYERS);
        let rank_a = rank_by_row(&a[..count]);
        let rank_b = rank_by_row(&b[..count]);

        let mut correspondence = Correspondence::default();
        for rank in 0..count {
            let a_slot = rank_a[rank];
            let b_slot = rank_b[rank];
            correspondence.pairs[a_slot] = Some(MatchedPair {
                a_slot,
                b_slot,
                x_a: a[a_slot].x,
                x_b: b[b_slot].x,
            });
        }
        correspondence
    }

    /// Slot indices ordered by ascending row; equal rows stay in slot order.
    fn rank_by_row(centroids: &[Centroid]) -> [usize; MAX_PLAYERS] {
        let mut order = [0, 1, 2, 3];
        let slots = &mut order[..centroids.len()];
        slots.sort_by_key(|&slot| centroids[slot].y);
        order
    }
}

#[cfg(test)]
mod tests {
    use super::stereo_correspondence::*;
    use super::*;
    use crate::core_modules::coordinate::{Coordinate, PlayerCount};

    fn frame(index: u64, points: &[(u32, u32)]) -> FrameCentroids {
        let mut centroids = [Coordinate::ORIGIN; MAX_PLAYERS];
        for (slot, (x, y)) in points.iter().enumerate() {
            centroids[slot] = Coordinate::new(*x, *y);
        }
        FrameCentroids {
            frame_index: index,
            players: PlayerCount::new(points.len() as u8).unwrap(),
            centroids,
            counts: [1; MAX_PLAYERS],
        }
    }

    #[test]
    fn four_players_pair_by_row_rank() {
        let a = frame(3, &[(300, 400), (100, 200), (200, 300), (400, 100)]);
        let b = frame(3, &[(198, 302), (399, 101), (95, 202), (298, 403)]);
        let matched = correspond(&a, &b).unwrap();

        let partner: Vec<usize> = matched.active().map(|p| p.b_slot).collect();
        // A rows 400,200,300,100 rank 3,1,2,0; B rows 302,101,202,403 rank 2,0,1,3.
        assert_eq!(partner, vec![3, 2, 0, 1]);
        assert_eq!(matched.pairs[0].unwrap().x_b, 298);
        assert_eq!(matched.pairs[3].unwrap().x_b, 399);
    }

    #[test]
    fn inactive_slots_are_empty() {
        let a = frame(0, &[(10, 10)]);
        let b = frame(0, &[(5, 11)]);
        let matched = correspond(&a, &b).unwrap();
        assert_eq!(matched.active().count(), 1);
        assert_eq!(matched.pairs[0].unwrap().disparity(), 5);
        assert!(matched.pairs[1..].iter().all(Option::is_none));
    }

    #[test]
    fn equal_rows_keep_slot_order() {
        let matched = match_by_vertical_rank(
            &[Coordinate::new(10, 50), Coordinate::new(90, 50)],
            &[Coordinate::new(5, 50), Coordinate::new(80, 50)],
        );
        assert_eq!(matched.pairs[0].unwrap().b_slot, 0);
        assert_eq!(matched.pairs[1].unwrap().b_slot, 1);
    }

    #[test]
    fn different_frames_are_refused() {
        let a = frame(1, &[(10, 10)]);
        let b = frame(2, &[(10, 10)]);
        assert!(matches!(correspond(&a, &b), Err(TrackerError::FrameMismatch { a: 1, b: 2 })));
    }

    #[test]
    fn different_player_counts_are_refused() {
        let a = frame(1, &[(10, 10), (20, 20)]);
        let b = frame(1, &[(10, 10)]);
        assert!(matches!(
            correspond(&a, &b),
            Err(TrackerError::PlayerCountMismatch { a: 2, b: 1 })
        ));
    }
}
