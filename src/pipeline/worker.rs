//! The per-camera loop: capture, skip, detect, analyse, publish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::CameraConfig;
use crate::detect::DetectorGuard;
use crate::error::{CaptureError, PipelineError};
use crate::frame::{Frame, FrameSource};
use crate::pipeline::events::EventBus;
use crate::pipeline::metrics::{CameraStatus, ErrorEvent, ErrorKind, PipelineEvent, StatusEvent};
use crate::pipeline::processor::FrameProcessor;
use crate::pipeline::state::CameraState;
use crate::pipeline::throughput::FrameSkip;

/// Longest single sleep while backing off, so a stop request is noticed promptly.
const STOP_POLL: Duration = Duration::from_millis(20);

pub(crate) struct Worker {
    config: CameraConfig,
    source: Box<dyn FrameSource>,
    detector: DetectorGuard,
    processor: FrameProcessor,
    skip: FrameSkip,
    bus: Arc<EventBus>,
    state: Arc<Mutex<CameraState>>,
    stop: Arc<AtomicBool>,
}

impl Worker {
    pub(crate) fn new(
        config: CameraConfig,
        source: Box<dyn FrameSource>,
        detector: DetectorGuard,
        bus: Arc<EventBus>,
        state: Arc<Mutex<CameraState>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            processor: FrameProcessor::new(&config),
            skip: FrameSkip::new(config.frame_skip),
            config,
            source,
            detector,
            bus,
            state,
            stop,
        }
    }

    /// Run until stopped, the stream ends, or a fatal error. Returns the final status.
    pub(crate) fn run(mut self) -> CameraStatus {
        log::info!(
            "camera {} started (source {}, detector {})",
            self.config.id,
            self.source.name(),
            self.detector.name()
        );
        let status = match self.run_loop() {
            Ok(()) => CameraStatus::Stopped,
            Err(err) => {
                log::error!("camera {}: {}", self.config.id, err);
                let (kind, status) = match &err {
                    PipelineError::DetectorUnavailable { .. } => (ErrorKind::DetectorUnavailable, CameraStatus::Error),
                    PipelineError::Config(_) => (ErrorKind::Config, CameraStatus::Error),
                    _ => (ErrorKind::Capture, CameraStatus::Offline),
                };
                self.publish_error(kind, err.to_string());
                status
            }
        };

        self.source.close();
        self.processor.reset();
        self.set_status(status);
        log::info!("camera {} finished as {:?}", self.config.id, status);
        status
    }

    fn run_loop(&mut self) -> Result<(), PipelineError> {
        if self.with_retry("open", |source| source.open())?.is_none() {
            return Ok(());
        }
        self.set_status(CameraStatus::Live);

        while !self.stop_requested() {
            let frame = match self.with_retry("read", |source| source.next_frame())? {
                Some(Some(frame)) => frame,
                Some(None) => {
                    log::info!("camera {}: end of stream", self.config.id);
                    return Ok(());
                }
                None => return Ok(()),
            };
            if self.skip.should_process() {
                self.process(&frame)?;
            }
        }
        Ok(())
    }

    fn process(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        let detected = self.detector.detect(frame)?;
        if let Some(message) = &detected.error {
            self.publish_error(ErrorKind::Inference, format!("frame {}: {message}", frame.seq()));
        }

        let analysed_at = Instant::now();
        let output = self.processor.process(frame, &detected, analysed_at);
        log::debug!(
            "camera {} frame {}: detect {:?}, analyse {:?}, {} people",
            self.config.id,
            frame.seq(),
            detected.elapsed,
            analysed_at.elapsed(),
            output.envelope.metrics.total_people
        );
        self.set_status(if detected.failed {
            CameraStatus::Degraded
        } else {
            CameraStatus::Live
        });

        let hotspot = output.snapshot.grid.hottest();
        let event = PipelineEvent::Metrics(output.envelope.clone());
        self.lock_state().record(output.envelope, output.snapshot);
        self.bus.publish(&event);

        if let Some(alert) = output.alert {
            log::warn!(
                "camera {}: crowd density {} with {} people, densest cell {:?}",
                alert.camera_id,
                alert.risk_level,
                alert.count,
                hotspot
            );
            self.bus.publish(&PipelineEvent::Alert(alert));
        }
        Ok(())
    }

    /// Run a capture operation, retrying with exponential backoff.
    ///
    /// `Ok(None)` means a stop was requested while waiting.
    fn with_retry<T>(
        &mut self,
        what: &str,
        mut op: impl FnMut(&mut dyn FrameSource) -> Result<T, CaptureError>,
    ) -> Result<Option<T>, PipelineError> {
        let retry = self.config.capture_retry.clone();
        let mut attempt = 0;
        loop {
            match op(self.source.as_mut()) {
                Ok(value) => {
                    if attempt > 0 {
                        log::info!("camera {}: {what} recovered after {attempt} retries", self.config.id);
                    }
                    return Ok(Some(value));
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= retry.max_attempts {
                        return Err(PipelineError::CameraOffline {
                            camera_id: self.config.id.clone(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let delay = retry.delay(attempt);
                    log::warn!(
                        "camera {}: {what} failed ({attempt}/{}), retrying in {delay:?}: {err}",
                        self.config.id,
                        retry.max_attempts
                    );
                    self.publish_error(ErrorKind::Capture, err.to_string());
                    if !self.sleep_unless_stopped(delay) {
                        return Ok(None);
                    }
                    if matches!(err, CaptureError::Disconnected(_)) {
                        self.source.close();
                        if let Err(err) = self.source.open() {
                            log::debug!("camera {}: reopen failed: {err}", self.config.id);
                        }
                    }
                }
            }
        }
    }

    /// Sleep for `delay`; false if a stop arrived first.
    fn sleep_unless_stopped(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        while !self.stop_requested() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL));
        }
        false
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn set_status(&self, status: CameraStatus) {
        let changed = {
            let mut state = self.lock_state();
            let changed = state.status != status;
            state.status = status;
            changed
        };
        if changed {
            log::debug!("camera {} is {:?}", self.config.id, status);
            self.bus.publish(&PipelineEvent::Status(StatusEvent {
                camera_id: self.config.id.clone(),
                status,
                timestamp: Utc::now(),
            }));
        }
    }

    fn publish_error(&self, kind: ErrorKind, message: String) {
        self.bus.publish(&PipelineEvent::Error(ErrorEvent {
            camera_id: self.config.id.clone(),
            kind,
            message,
            timestamp: Utc::now(),
        }));
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CameraState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
