use crate::core_modules::{
    centroid_accumulator::ClusterBank,
    coordinate::{PlayerCount, Sample},
    depth_estimator::DepthEstimator,
    frame_tabulator::{FrameCentroids, FrameTabulator},
};
use crate::error::TrackerError;
use crate::pipeline::{PipelineConfig, StereoFrame, StereoReport, resolve_stereo, tabulate_channel};
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, trace};

const WORKER_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    A,
    B,
}

type FrameResult = Result<FrameCentroids, TrackerError>;

pub struct SensorTask {
    pub samples: Arc<Vec<Sample>>,
    pub players: PlayerCount,
    pub result_sender: oneshot::Sender<FrameResult>,
}

/// One sensor channel running as its own task. The task owns the sensor's
/// tabulator, so nothing about it is shared or locked.
pub struct SensorWorker {
    task_sender: mpsc::Sender<SensorTask>,
    worker: tokio::task::JoinHandle<()>,
}

impl SensorWorker {
    /// Must be called from within a tokio runtime.
    pub fn spawn(sensor: Sensor, config: PipelineConfig) -> Result<Self, TrackerError> {
        let (task_sender, mut task_receiver) = mpsc::channel::<SensorTask>(WORKER_QUEUE_DEPTH);
        let mut channel =
            FrameTabulator::with_division_width(config.resolution, config.initial_players, config.division_width_bits)?;

        let worker = tokio::spawn(async move {
            while let Some(task) = task_receiver.recv().await {
                let result = Self::process_frame_worker(&mut channel, task.samples, task.players, &config).await;
                let _ = task.result_sender.send(result);
            }
            debug!(?sensor, frames = channel.frame_index(), "sensor worker stopped");
        });

        Ok(Self { task_sender, worker })
    }

    async fn process_frame_worker(
        channel: &mut FrameTabulator,
        samples: Arc<Vec<Sample>>,
        players: PlayerCount,
        config: &PipelineConfig,
    ) -> FrameResult {
        channel.set_player_count(players)?;

        let ranges = partition_ranges(samples.len(), partition_count(samples.len(), config));
        if ranges.len() > 1 {
            // Every partition classifies against the same frozen references.
            let classifier = channel.accumulator().classifier();
            let jobs = ranges.into_iter().map(|range| {
                let samples = Arc::clone(&samples);
                tokio::task::spawn_blocking(move || classifier.accumulate(&samples[range], players))
            });

            let banks: Vec<ClusterBank> = futures::future::join_all(jobs)
                .await
                .into_iter()
                .collect::<Result<_, _>>()
                .map_err(|_| TrackerError::WorkerUnavailable("accumulation partition failed"))?;
            trace!(partitions = banks.len(), "merging partitioned accumulation");
            for bank in &banks {
                channel.absorb(bank)?;
            }
        } else {
            for sample in samples.iter() {
                channel.observe(sample);
            }
        }

        tabulate_channel(channel)
    }

    /// Waits for room in this sensor's queue. Dropping the permit gives the
    /// slot back without sending anything.
    pub async fn reserve(&self) -> Result<mpsc::Permit<'_, SensorTask>, TrackerError> {
        self.task_sender
            .reserve()
            .await
            .map_err(|_| TrackerError::WorkerUnavailable("sensor worker stopped accepting frames"))
    }

    async fn shutdown(self) {
        drop(self.task_sender);
        let _ = self.worker.await;
    }
}

/// Hands a frame to a reserved queue slot. Never waits.
fn dispatch(
    permit: mpsc::Permit<'_, SensorTask>,
    samples: Vec<Sample>,
    players: PlayerCount,
) -> oneshot::Receiver<FrameResult> {
    let (result_sender, result_receiver) = oneshot::channel();
    permit.send(SensorTask {
        samples: Arc::new(samples),
        players,
        result_sender,
    });
    result_receiver
}

async fn receive(receiver: oneshot::Receiver<FrameResult>) -> FrameResult {
    receiver
        .await
        .map_err(|_| TrackerError::WorkerUnavailable("sensor worker dropped the frame"))?
}

fn partition_count(len: usize, config: &PipelineConfig) -> usize {
    if len < config.partition_threshold.max(1) {
        return 1;
    }
    let limit = if config.max_partitions == 0 {
        num_cpus::get()
    } else {
        config.max_partitions
    };
    limit.clamp(1, len)
}

fn partition_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return vec![0..0];
    }
    let chunk_len = len.div_ceil(parts.max(1));
    (0..len)
        .step_by(chunk_len)
        .map(|start| start..(start + chunk_len).min(len))
        .collect()
}

/// Stereo pipeline with one worker task per sensor. The stereo stage waits on
/// both sensors' emissions for the same frame before it runs.
pub struct ParallelPipeline {
    config: PipelineConfig,
    sensor_a: SensorWorker,
    sensor_b: SensorWorker,
    estimator: Mutex<DepthEstimator>,
    /// Keeps the two sensors' queues in the same frame order.
    submit_gate: Mutex<()>,
    frames_processed: AtomicU64,
}

impl ParallelPipeline {
    /// Must be called from within a tokio runtime. Fails if the configured
    /// division width is too narrow for the sensor.
    pub fn new(config: PipelineConfig) -> Result<Self, TrackerError> {
        Ok(Self {
            sensor_a: SensorWorker::spawn(Sensor::A, config.clone())?,
            sensor_b: SensorWorker::spawn(Sensor::B, config.clone())?,
            estimator: Mutex::new(DepthEstimator::new(config.calibration)),
            config,
            submit_gate: Mutex::new(()),
            frames_processed: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Safe to cancel: a frame reaches either both sensors or neither.
    pub async fn process_frame(&self, frame: StereoFrame, players: PlayerCount) -> Result<StereoReport, TrackerError> {
        let (pending_a, pending_b) = {
            let _gate = self.submit_gate.lock().await;
            // All waiting happens before the first send.
            let slot_a = self.sensor_a.reserve().await?;
            let slot_b = self.sensor_b.reserve().await?;
            (
                dispatch(slot_a, frame.sensor_a, players),
                dispatch(slot_b, frame.sensor_b, players),
            )
        };

        let (emitted_a, emitted_b) = futures::future::try_join(receive(pending_a), receive(pending_b)).await?;
        let report = resolve_stereo(&mut *self.estimator.lock().await, emitted_a, emitted_b)?;

        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    /// Stops both sensor workers after they finish any queued frames.
    pub async fn shutdown(self) {
        futures::join!(self.sensor_a.shutdown(), self.sensor_b.shutdown());
    }
}
