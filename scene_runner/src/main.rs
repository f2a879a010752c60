use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use stereo_tracker::core_modules::utils::image_helper::image_helper;
use stereo_tracker::core_modules::utils::synthetic_scene::{ScenePlayer, SyntheticScene};
use stereo_tracker::{
    ConfigLoader, ParallelPipeline, PipelineConfig, PlayerCount, Resolution, StereoPipeline, StereoReport,
    TrackerConfig, TrackerError, init_logging,
};
use tracing::{info, warn};

/// Runs the stereo tracker against a synthetic scene of moving players.
#[derive(Parser, Debug)]
#[command(name = "scene_runner", version, about)]
struct Args {
    /// TOML tracker configuration. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to simulate.
    #[arg(short, long, default_value_t = 60)]
    frames: u64,

    /// Players in the scene (1 to 4). Defaults to `tracking.players` from the config.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=4))]
    players: Option<u8>,

    /// Raster stride of the simulated detector.
    #[arg(short, long, default_value_t = 4)]
    stride: u32,

    /// Squared radius of every player disk.
    #[arg(long, default_value_t = 400)]
    radius_sq: i64,

    /// Write a PNG overlay of sensor A for every frame into this directory.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Use the single-threaded pipeline instead of the per-sensor workers.
    #[arg(long)]
    sequential: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Configuration & Logging ---
    let config = match &args.config {
        Some(path) => ConfigLoader::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    // --- 2. Scene & Pipeline ---
    let players = resolve_players(args.players, &config)?;
    let mut scene = build_scene(config.sensor, args.stride, players, args.radius_sq);
    let pipeline_config = PipelineConfig::from(&config);

    info!(
        resolution = %format!("{}x{}", config.sensor.width, config.sensor.height),
        players = %players,
        frames = args.frames,
        sequential = args.sequential,
        "starting scene"
    );

    let mut runner = if args.sequential {
        Runner::Sequential(StereoPipeline::new(pipeline_config)?)
    } else {
        Runner::Parallel(ParallelPipeline::new(pipeline_config)?)
    };

    // --- 3. Main Processing Loop ---
    let mut last_report = None;
    for index in 0..args.frames {
        if index > 0 {
            scene.advance();
        }
        let frame = scene.stereo_frame();
        let overlay_samples = args.output_dir.as_ref().map(|_| frame.sensor_a.clone());

        let report = match &mut runner {
            Runner::Sequential(pipeline) => pipeline.process_frame(&frame, players)?,
            Runner::Parallel(pipeline) => pipeline.process_frame(frame, players).await?,
        };

        info!(
            frame = report.frame_index,
            centroids_a = ?report.sensor_a.active(),
            centroids_b = ?report.sensor_b.active(),
            depths = ?report.active_depths().iter().map(|d| d.0).collect::<Vec<_>>(),
            "frame tracked"
        );

        // --- 4. Visualization ---
        if let (Some(dir), Some(samples)) = (&args.output_dir, overlay_samples) {
            let image = image_helper::render_overlay(config.sensor, &samples, report.sensor_a.active());
            let path = dir.join(format!("frame_{:05}.png", report.frame_index));
            image_helper::save(&path, &image).with_context(|| format!("writing {}", path.display()))?;
        }

        last_report = Some(report);
    }

    if let Runner::Parallel(pipeline) = runner {
        pipeline.shutdown().await;
    }

    if let Some(report) = last_report {
        summarize(&scene, &report);
    }
    Ok(())
}

/// The `--players` flag wins; without it the configured count is used.
fn resolve_players(flag: Option<u8>, config: &TrackerConfig) -> Result<PlayerCount, TrackerError> {
    match flag {
        Some(count) => PlayerCount::new(count),
        None => Ok(config.tracking.players),
    }
}

enum Runner {
    Sequential(StereoPipeline),
    Parallel(ParallelPipeline),
}

/// Up to four players spread over the raster, each moving in its own
/// direction and standing at its own distance from the rig.
fn build_scene(resolution: Resolution, stride: u32, players: PlayerCount, radius_sq: i64) -> SyntheticScene {
    let w = resolution.width as i64;
    let h = resolution.height as i64;
    let presets = [
        ScenePlayer::new(w / 5, h / 5).moving(3, 1).with_disparity(40),
        ScenePlayer::new(3 * w / 4, 2 * h / 5).moving(-2, 1).with_disparity(20),
        ScenePlayer::new(w / 2, 3 * h / 4).moving(1, -1).with_disparity(60),
        ScenePlayer::new(w / 3, 3 * h / 5).moving(-1, 0).with_disparity(100),
    ];

    presets
        .into_iter()
        .take(players.get())
        .fold(SyntheticScene::new(resolution, stride), |scene, player| {
            scene.with_player(player.with_radius_sq(radius_sq))
        })
}

/// Compares the last emitted centroids with where the players actually were.
fn summarize(scene: &SyntheticScene, report: &StereoReport) {
    for player in scene.players() {
        let Some(truth) = scene.ground_truth(player) else {
            warn!(center = ?player.center, "player left the raster");
            continue;
        };
        let nearest = report
            .sensor_a
            .active()
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.manhattan(&truth));
        if let Some((slot, centroid)) = nearest {
            info!(
                slot,
                truth = ?truth,
                tracked = ?centroid,
                error = centroid.manhattan(&truth),
                depth = report.depths[slot].0,
                "final position"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_players(n: u8) -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.tracking.players = PlayerCount::new(n).unwrap();
        config
    }

    #[test]
    fn configured_player_count_applies_without_the_flag() {
        let args = Args::try_parse_from(["scene_runner"]).unwrap();
        assert_eq!(args.players, None);

        let players = resolve_players(args.players, &config_with_players(3)).unwrap();
        assert_eq!(players.get(), 3);
    }

    #[test]
    fn player_flag_overrides_the_config() {
        let args = Args::try_parse_from(["scene_runner", "--players", "1"]).unwrap();
        let players = resolve_players(args.players, &config_with_players(3)).unwrap();
        assert_eq!(players.get(), 1);
    }

    #[test]
    fn player_flag_outside_one_to_four_is_rejected() {
        assert!(Args::try_parse_from(["scene_runner", "--players", "5"]).is_err());
        assert!(Args::try_parse_from(["scene_runner", "--players", "0"]).is_err());
    }
}
