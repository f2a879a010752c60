// THEORY:
// A `SyntheticScene` stands in for the silhouette detector. Players are filled
// disks on the sensor raster that move by a fixed velocity every frame; the scene
// scans the raster with a stride and flags a sample valid when it falls inside any
// disk. The second sensor of the stereo rig sees every player shifted left by
// that player's disparity, which is how nearer players end up with larger
// horizontal offsets.
//
// It exists for the runner, the benches and the tracking tests: it produces the
// same `(x, y, valid)` stream the real detector would, with known ground truth.

use crate::core_modules::coordinate::{Coordinate, Resolution, Sample};
use crate::pipeline::StereoFrame;

/// Squared radius of the prototype's player disks.
pub const DEFAULT_RADIUS_SQ: i64 = 10;

/// One simulated player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenePlayer {
    /// Disk centre as seen by sensor A. May leave the raster.
    pub center: (i64, i64),
    /// Movement per frame.
    pub velocity: (i64, i64),
    pub radius_sq: i64,
    /// Horizontal offset of this player in sensor B, in pixels.
    pub disparity: i64,
}

impl ScenePlayer {
    pub fn new(x: i64, y: i64) -> Self {
        Self {
            center: (x, y),
            velocity: (0, 0),
            radius_sq: DEFAULT_RADIUS_SQ,
            disparity: 0,
        }
    }

    pub fn moving(mut self, dx: i64, dy: i64) -> Self {
        self.velocity = (dx, dy);
        self
    }

    pub fn with_radius_sq(mut self, radius_sq: i64) -> Self {
        self.radius_sq = radius_sq;
        self
    }

    pub fn with_disparity(mut self, disparity: i64) -> Self {
        self.disparity = disparity;
        self
    }

    fn covers(&self, x: i64, y: i64, shift: i64) -> bool {
        let dx = x - (self.center.0 - shift);
        let dy = y - self.center.1;
        dx * dx + dy * dy <= self.radius_sq
    }
}

/// A raster of moving disk-shaped players.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    resolution: Resolution,
    stride: u32,
    players: Vec<ScenePlayer>,
    frame: u64,
}

impl SyntheticScene {
    pub fn new(resolution: Resolution, stride: u32) -> Self {
        Self {
            resolution,
            stride: stride.max(1),
            players: Vec::new(),
            frame: 0,
        }
    }

    pub fn with_player(mut self, player: ScenePlayer) -> Self {
        self.players.push(player);
        self
    }

    pub fn players(&self) -> &[ScenePlayer] {
        &self.players
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Moves every player by its velocity.
    pub fn advance(&mut self) {
        for player in &mut self.players {
            player.center.0 += player.velocity.0;
            player.center.1 += player.velocity.1;
        }
        self.frame += 1;
    }

    /// The raster scan sensor A would produce for the current frame.
    pub fn sensor_a_samples(&self) -> Vec<Sample> {
        self.scan(false)
    }

    /// The raster scan sensor B would produce: every player shifted left by
    /// its disparity.
    pub fn sensor_b_samples(&self) -> Vec<Sample> {
        self.scan(true)
    }

    pub fn stereo_frame(&self) -> StereoFrame {
        StereoFrame {
            sensor_a: self.sensor_a_samples(),
            sensor_b: self.sensor_b_samples(),
        }
    }

    /// Floor mean of the raster positions covered by `player` in sensor A, the
    /// centroid a perfect single-player tracker would report.
    pub fn ground_truth(&self, player: &ScenePlayer) -> Option<Coordinate> {
        let (mut sum_x, mut sum_y, mut count) = (0u64, 0u64, 0u64);
        for sample in self.sensor_a_samples() {
            if player.covers(sample.coord.x as i64, sample.coord.y as i64, 0) {
                sum_x += sample.coord.x as u64;
                sum_y += sample.coord.y as u64;
                count += 1;
            }
        }
        (count > 0).then(|| Coordinate::new((sum_x / count) as u32, (sum_y / count) as u32))
    }

    fn scan(&self, shifted: bool) -> Vec<Sample> {
        let columns = self.resolution.width.div_ceil(self.stride) as usize;
        let rows = self.resolution.height.div_ceil(self.stride) as usize;
        let mut samples = Vec::with_capacity(columns * rows);

        for y in (0..self.resolution.height).step_by(self.stride as usize) {
            for x in (0..self.resolution.width).step_by(self.stride as usize) {
                let valid = self.players.iter().any(|p| {
                    let shift = if shifted { p.disparity } else { 0 };
                    p.covers(x as i64, y as i64, shift)
                });
                samples.push(Sample::new(x, y, valid));
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_covers_the_raster_with_stride() {
        let scene = SyntheticScene::new(Resolution::new(1280, 720), 4);
        let samples = scene.sensor_a_samples();
        assert_eq!(samples.len(), 320 * 180);
        assert!(samples.iter().all(|s| !s.valid));
        assert_eq!(samples.last().unwrap().coord, Coordinate::new(1276, 716));
    }

    #[test]
    fn disk_of_radius_sq_ten_has_37_pixels() {
        let scene = SyntheticScene::new(Resolution::new(100, 100), 1).with_player(ScenePlayer::new(20, 20));
        let valid = scene.sensor_a_samples().iter().filter(|s| s.valid).count();
        assert_eq!(valid, 37);
        assert_eq!(scene.ground_truth(&scene.players()[0]), Some(Coordinate::new(20, 20)));
    }

    #[test]
    fn sensor_b_sees_players_shifted_left() {
        let scene = SyntheticScene::new(Resolution::new(100, 100), 1)
            .with_player(ScenePlayer::new(50, 50).with_disparity(10));
        let b = scene.sensor_b_samples();
        assert!(b.iter().any(|s| s.valid && s.coord == Coordinate::new(40, 50)));
        assert!(!b.iter().any(|s| s.valid && s.coord == Coordinate::new(50, 50)));
    }

    #[test]
    fn advance_moves_players() {
        let mut scene = SyntheticScene::new(Resolution::new(100, 100), 1)
            .with_player(ScenePlayer::new(10, 10).moving(1, 1));
        scene.advance();
        assert_eq!(scene.players()[0].center, (11, 11));
        assert_eq!(scene.frame(), 1);
    }
}
