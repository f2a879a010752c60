// THEORY:
// The `pipeline` module is the top-level, synchronous API for the tracker. It
// wires the full stack for one stereo rig into a single object: two sensor
// channels (each a `FrameTabulator` with its own division unit), the frame
// barrier, vertical-rank correspondence and depth estimation.
//
// Stages per frame:
// 1.  **Configure**: The player count is an explicit argument of every frame and is
//     applied to both channels before any sample is seen, so the two sensors can
//     never disagree about it mid-frame.
// 2.  **Accumulate**: Each sensor's sample stream is fed into its own tabulator.
// 3.  **Tabulate**: Both tabulators are driven to emission within their declared
//     step bound. Exceeding it is fatal.
// 4.  **Barrier + Stereo**: The two emissions must close the same frame. They are
//     paired by vertical rank and each pair's disparity becomes a depth reading.

use tracing::{debug, instrument};

use crate::config::TrackerConfig;
use crate::core_modules::coordinate::{MAX_PLAYERS, PlayerCount, Resolution, Sample};
use crate::core_modules::depth_estimator::{Calibration, DepthEstimator, DepthReading};
use crate::core_modules::frame_tabulator::{FrameCentroids, FrameTabulator, TabulateRequest};
use crate::core_modules::stereo_correspondence::{Correspondence, stereo_correspondence};
use crate::error::TrackerError;

/// Configuration for the stereo pipelines.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub resolution: Resolution,
    pub calibration: Calibration,
    pub division_width_bits: u32,
    /// Players tracked until the first frame says otherwise.
    pub initial_players: PlayerCount,
    /// Frames with at least this many samples per sensor are accumulated in
    /// parallel partitions by `ParallelPipeline`.
    pub partition_threshold: usize,
    /// 0 means one partition per CPU.
    pub max_partitions: usize,
}

impl From<&TrackerConfig> for PipelineConfig {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            resolution: config.sensor,
            calibration: config.calibration,
            division_width_bits: config.tracking.division_width_bits,
            initial_players: config.tracking.players,
            partition_threshold: config.tracking.partition_threshold,
            max_partitions: config.tracking.max_partitions,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

/// The two detector streams of one frame.
#[derive(Debug, Clone, Default)]
pub struct StereoFrame {
    pub sensor_a: Vec<Sample>,
    pub sensor_b: Vec<Sample>,
}

/// The primary output of the pipeline for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StereoReport {
    pub frame_index: u64,
    pub players: PlayerCount,
    pub sensor_a: FrameCentroids,
    pub sensor_b: FrameCentroids,
    pub correspondence: Correspondence,
    /// One reading per sensor-A slot; inactive slots are `UNDEFINED`.
    pub depths: [DepthReading; MAX_PLAYERS],
}

impl StereoReport {
    pub fn active_depths(&self) -> &[DepthReading] {
        &self.depths[..self.players.get()]
    }
}

/// The stereo stage: barrier check, correspondence and depth for two emissions.
pub fn resolve_stereo(
    estimator: &mut DepthEstimator,
    sensor_a: FrameCentroids,
    sensor_b: FrameCentroids,
) -> Result<StereoReport, TrackerError> {
    let correspondence = stereo_correspondence::correspond(&sensor_a, &sensor_b)?;
    let depths = estimator.depths(&correspondence)?;
    debug!(frame = sensor_a.frame_index, depths = ?&depths[..sensor_a.players.get()], "stereo frame resolved");

    Ok(StereoReport {
        frame_index: sensor_a.frame_index,
        players: sensor_a.players,
        sensor_a,
        sensor_b,
        correspondence,
        depths,
    })
}

/// Drives one tabulator through a complete tabulation.
pub(crate) fn tabulate_channel(channel: &mut FrameTabulator) -> Result<FrameCentroids, TrackerError> {
    let budget = channel.max_tabulation_ticks();
    match channel.tabulate(budget)? {
        Some(frame) => Ok(frame),
        None => Err(TrackerError::NotAccumulating(channel.state())),
    }
}

/// The main, top-level struct for a two-sensor rig.
pub struct StereoPipeline {
    sensor_a: FrameTabulator,
    sensor_b: FrameTabulator,
    estimator: DepthEstimator,
    config: PipelineConfig,
    last_report: Option<StereoReport>,
}

impl StereoPipeline {
    /// Fails if the configured division width is too narrow for the sensor.
    pub fn new(config: PipelineConfig) -> Result<Self, TrackerError> {
        let sensor_a =
            FrameTabulator::with_division_width(config.resolution, config.initial_players, config.division_width_bits)?;
        let sensor_b = sensor_a.clone();
        Ok(Self {
            sensor_a,
            sensor_b,
            estimator: DepthEstimator::new(config.calibration),
            config,
            last_report: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Index of the next frame to be processed.
    pub fn frame_index(&self) -> u64 {
        self.sensor_a.frame_index()
    }

    #[instrument(level = "debug", skip_all, fields(frame = self.sensor_a.frame_index(), players = %players))]
    pub fn process_frame(&mut self, frame: &StereoFrame, players: PlayerCount) -> Result<StereoReport, TrackerError> {
        self.sensor_a.set_player_count(players)?;
        self.sensor_b.set_player_count(players)?;

        for sample in &frame.sensor_a {
            self.sensor_a.observe(sample);
        }
        for sample in &frame.sensor_b {
            self.sensor_b.observe(sample);
        }

        let emitted_a = tabulate_channel(&mut self.sensor_a)?;
        let emitted_b = tabulate_channel(&mut self.sensor_b)?;

        let report = resolve_stereo(&mut self.estimator, emitted_a, emitted_b)?;
        self.last_report = Some(report);
        Ok(report)
    }

    /// Step-level access for callers that drive a sensor sample by sample.
    pub fn sensor_a_mut(&mut self) -> &mut FrameTabulator {
        &mut self.sensor_a
    }

    pub fn sensor_b_mut(&mut self) -> &mut FrameTabulator {
        &mut self.sensor_b
    }

    /// Request tabulation on both sensors, as the frame-end pulse does.
    pub fn request_tabulate(&mut self) -> (TabulateRequest, TabulateRequest) {
        (self.sensor_a.request_tabulate(), self.sensor_b.request_tabulate())
    }

    pub fn get_last_report(&self) -> Option<&StereoReport> {
        self.last_report.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::coordinate::Coordinate;

    fn players(n: u8) -> PlayerCount {
        PlayerCount::new(n).unwrap()
    }

    #[test]
    fn one_player_stereo_frame() {
        let mut pipeline = StereoPipeline::new(PipelineConfig::default()).unwrap();
        let frame = StereoFrame {
            sensor_a: vec![Sample::valid(500, 100), Sample::valid(502, 102)],
            sensor_b: vec![Sample::valid(400, 100), Sample::valid(402, 102)],
        };
        let report = pipeline.process_frame(&frame, players(1)).unwrap();

        assert_eq!(report.frame_index, 0);
        assert_eq!(report.sensor_a.centroids[0], Coordinate::new(501, 101));
        assert_eq!(report.sensor_b.centroids[0], Coordinate::new(401, 101));
        assert_eq!(report.depths[0], DepthReading(30));
        assert!(report.depths[1..].iter().all(|d| !d.is_defined()));
        assert_eq!(pipeline.frame_index(), 1);
        assert_eq!(pipeline.get_last_report(), Some(&report));
    }

    #[test]
    fn empty_frame_reports_origin_and_undefined_depth() {
        let mut pipeline = StereoPipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline.process_frame(&StereoFrame::default(), players(2)).unwrap();
        assert_eq!(report.sensor_a.active(), &[Coordinate::ORIGIN, Coordinate::ORIGIN]);
        assert_eq!(report.active_depths(), &[DepthReading::UNDEFINED, DepthReading::UNDEFINED]);
    }

    #[test]
    fn narrow_division_width_is_rejected_up_front() {
        let config = PipelineConfig {
            division_width_bits: 16,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            StereoPipeline::new(config),
            Err(TrackerError::DivisionTooNarrow { width_bits: 16, required: 31 })
        ));
    }

    #[test]
    fn tabulation_in_flight_blocks_the_next_frame() {
        let mut pipeline = StereoPipeline::new(PipelineConfig::default()).unwrap();
        pipeline.request_tabulate();
        let err = pipeline.process_frame(&StereoFrame::default(), players(1)).unwrap_err();
        assert!(matches!(err, TrackerError::PlayerCountLocked(_)));
    }
}
