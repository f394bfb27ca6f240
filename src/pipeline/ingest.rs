use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;

use crate::config::{DetectorConfig, LivenessConfig, MontageConfig};
use crate::detect::Infer;
use crate::slot::FrameSlot;
use crate::transport::FrameHub;

use super::annotate;
use super::liveness::LivenessTracker;
use super::montage::MontageComposer;

const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Device id → latest annotated frame, in insertion order so montage tiles
/// keep a stable arrangement.
struct FrameCache {
    order: Vec<String>,
    frames: HashMap<String, Mat>,
}

impl FrameCache {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            frames: HashMap::new(),
        }
    }

    fn insert(&mut self, device_id: &str, frame: Mat) {
        if !self.frames.contains_key(device_id) {
            self.order.push(device_id.to_string());
        }
        self.frames.insert(device_id.to_string(), frame);
    }

    fn remove(&mut self, device_id: &str) {
        if self.frames.remove(device_id).is_some() {
            self.order.retain(|id| id != device_id);
        }
    }

    fn iter_ordered(&self) -> impl Iterator<Item = &Mat> {
        self.order.iter().filter_map(|id| self.frames.get(id))
    }
}

/// All mutable pipeline state. Owned by the ingestion thread alone; the
/// published montage leaves through the `FrameSlot`, nothing else is shared.
struct PipelineState {
    liveness: LivenessTracker,
    cache: FrameCache,
}

pub struct IngestLoop {
    hub: FrameHub,
    detector: Box<dyn Infer>,
    slot: Arc<FrameSlot>,
    active_devices: Arc<RwLock<Vec<String>>>,
    composer: MontageComposer,
    considered: Vec<String>,
    frame_width: i32,
    state: PipelineState,
}

impl IngestLoop {
    pub fn new(
        hub: FrameHub,
        detector: Box<dyn Infer>,
        slot: Arc<FrameSlot>,
        active_devices: Arc<RwLock<Vec<String>>>,
        detector_config: &DetectorConfig,
        montage: &MontageConfig,
        liveness: &LivenessConfig,
    ) -> Self {
        Self {
            hub,
            detector,
            slot,
            active_devices,
            composer: MontageComposer::new(
                montage.frame_width as i32,
                montage.tile_height as i32,
                montage.grid_width as usize,
                montage.grid_height as usize,
            ),
            considered: detector_config.considered_classes.clone(),
            frame_width: montage.frame_width as i32,
            state: PipelineState {
                liveness: LivenessTracker::new(liveness.active_window()),
                cache: FrameCache::new(),
            },
        }
    }

    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
        tokio::task::spawn_blocking(move || self.run(shutdown))
    }

    fn run(mut self, shutdown: Arc<AtomicBool>) {
        tracing::info!(classes = %self.considered.join(", "), "ingestion loop started");

        while !shutdown.load(Ordering::Relaxed) {
            let received = self.hub.recv_timeout(RECV_TIMEOUT);
            let now = Instant::now();

            if let Some(mut frame) = received {
                // Release the device before the heavy work; inference time
                // must never stall the sender's next frame.
                frame.acknowledge();
                self.handle_frame(frame.device_id, frame.jpeg, now);
            }

            self.sweep(now);
        }

        tracing::info!("ingestion loop stopped");
    }

    fn handle_frame(&mut self, device_id: String, jpeg: Vec<u8>, now: Instant) {
        if self.state.liveness.touch(&device_id, now) {
            tracing::info!(device = %device_id, "receiving frames from new device");
        }

        match self.annotate(&device_id, &jpeg) {
            Ok(Some((frame, _counts))) => {
                self.state.cache.insert(&device_id, frame);
                self.publish_device_list();
                self.recompose();
            }
            Ok(None) => {
                tracing::debug!(device = %device_id, "undecodable frame skipped");
                self.publish_device_list();
            }
            Err(e) => {
                tracing::warn!(device = %device_id, error = %e, "frame annotation failed");
                self.publish_device_list();
            }
        }
    }

    /// Decode, normalize, detect, box, and label one frame. `None` means the
    /// payload was not a decodable image; detector failures degrade to an
    /// unboxed frame with all-zero counts.
    fn annotate(
        &mut self,
        device_id: &str,
        jpeg: &[u8],
    ) -> opencv::Result<Option<(Mat, BTreeMap<String, u32>)>> {
        let raw = Mat::from_slice(jpeg)?;
        let decoded = imgcodecs::imdecode(&raw, imgcodecs::IMREAD_COLOR)?;
        if decoded.empty() {
            return Ok(None);
        }

        let mut frame = annotate::normalize_width(&decoded, self.frame_width)?;

        // Counts are rebuilt from zero for every frame.
        let mut counts: BTreeMap<String, u32> = self
            .considered
            .iter()
            .map(|class| (class.clone(), 0))
            .collect();

        match self.detector.infer(&frame) {
            Ok(detections) => {
                let bounds = frame.size()?;
                for det in &detections {
                    if let Some(count) = counts.get_mut(&det.class_name) {
                        *count += 1;
                        tracing::debug!(
                            device = %device_id,
                            class = %det.class_name,
                            confidence = format!("{:.2}", det.confidence),
                            "object detected"
                        );
                        annotate::draw_box(&mut frame, annotate::detection_rect(det, bounds))?;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(device = %device_id, error = %e, "inference failed");
            }
        }

        annotate::overlay_labels(&mut frame, device_id, &counts)?;
        Ok(Some((frame, counts)))
    }

    fn sweep(&mut self, now: Instant) {
        let evicted = self.state.liveness.sweep(now);
        if evicted.is_empty() {
            return;
        }

        for device_id in &evicted {
            tracing::info!(device = %device_id, "lost connection to device");
            self.state.cache.remove(device_id);
        }
        self.publish_device_list();
        self.recompose();
    }

    fn recompose(&self) {
        match self.composer.compose(self.state.cache.iter_ordered()) {
            Ok(Some(montage)) => self.slot.publish(montage),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "montage composition failed"),
        }
    }

    fn publish_device_list(&self) {
        let mut ids: Vec<String> = self
            .state
            .liveness
            .device_ids()
            .map(str::to_string)
            .collect();
        ids.sort();
        if let Ok(mut list) = self.active_devices.write() {
            *list = ids;
        }
    }
}
