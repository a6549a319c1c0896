//! Starts, stops and answers queries about camera workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::config::CameraConfig;
use crate::detect::{Detector, DetectorGuard, ModelCache};
use crate::error::{ConfigError, PipelineError, Result};
use crate::frame::FrameSource;
use crate::pipeline::events::{EventBus, Subscription};
use crate::pipeline::metrics::{CameraStatus, FrameMetrics, PipelineEvent, StatusEvent};
use crate::pipeline::state::{CameraState, CrowdSnapshot, CurrentStats};
use crate::pipeline::worker::Worker;

/// Builds the detector for a camera in place of its configured selector.
pub type DetectorFactory = Box<dyn Fn(&CameraConfig) -> std::result::Result<Box<dyn Detector>, ConfigError> + Send + Sync>;

/// Builds the frame source for a camera in place of its configured source.
pub type SourceFactory = Box<dyn Fn(&CameraConfig) -> Box<dyn FrameSource> + Send + Sync>;

struct CameraHandle {
    config: CameraConfig,
    stop: Arc<AtomicBool>,
    done: Receiver<CameraStatus>,
    thread: JoinHandle<()>,
}

/// Owns every camera worker plus the state they share with readers.
///
/// There is no process-wide state: the model cache and event bus live here.
pub struct CameraRegistry {
    bus: Arc<EventBus>,
    models: ModelCache,
    detector_factory: Option<DetectorFactory>,
    source_factory: Option<SourceFactory>,
    running: Mutex<HashMap<String, CameraHandle>>,
    // Workers asked to stop and not yet reaped. A camera cannot restart while its entry is alive.
    stopping: Mutex<HashMap<String, CameraHandle>>,
    // Kept after a camera stops so its last-known-good values stay queryable.
    states: Mutex<HashMap<String, Arc<Mutex<CameraState>>>>,
}

impl Default for CameraRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self {
            bus: Arc::new(EventBus::new()),
            models: ModelCache::new(),
            detector_factory: None,
            source_factory: None,
            running: Mutex::new(HashMap::new()),
            stopping: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Use `factory` instead of each camera's `detector` setting.
    pub fn with_detector_factory(mut self, factory: DetectorFactory) -> Self {
        self.detector_factory = Some(factory);
        self
    }

    /// Use `factory` instead of each camera's `source` setting.
    pub fn with_source_factory(mut self, factory: SourceFactory) -> Self {
        self.source_factory = Some(factory);
        self
    }

    pub fn subscribe(&self, capacity: usize) -> Subscription {
        self.bus.subscribe(capacity)
    }

    pub fn models(&self) -> &ModelCache {
        &self.models
    }

    /// Start a worker for `config`. Starting a camera that is already running is a no-op.
    ///
    /// Fails with `StopPending` while a worker from an earlier timed-out stop
    /// is still alive, so one camera never has two workers.
    pub fn start(&self, config: CameraConfig) -> Result<()> {
        config.validate()?;
        let mut running = lock(&self.running);

        if let Some(handle) = running.get(&config.id) {
            if !handle.thread.is_finished() {
                if handle.config != config {
                    log::warn!("camera {} is already running; new settings ignored", config.id);
                }
                return Ok(());
            }
            if let Some(finished) = running.remove(&config.id) {
                reap(&config.id, finished);
            }
        }

        {
            let mut stopping = lock(&self.stopping);
            if stopping.get(&config.id).is_some_and(|old| !old.thread.is_finished()) {
                return Err(PipelineError::StopPending(config.id));
            }
            if let Some(old) = stopping.remove(&config.id) {
                reap(&config.id, old);
            }
        }

        let detector = match &self.detector_factory {
            Some(factory) => factory(&config)?,
            None => config.detector.build(config.detection_params(), &self.models)?,
        };
        let guard = DetectorGuard::new(detector, config.inference_timeout(), config.max_consecutive_failures);
        let source = match &self.source_factory {
            Some(factory) => factory(&config),
            None => config.source.build(&config.id),
        };

        let state = Arc::new(Mutex::new(CameraState::new(config.history_len)));
        lock(&self.states).insert(config.id.clone(), state.clone());

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = crossbeam_channel::bounded(1);
        let worker = Worker::new(config.clone(), source, guard, self.bus.clone(), state, stop.clone());

        self.bus.publish(&PipelineEvent::Status(StatusEvent {
            camera_id: config.id.clone(),
            status: CameraStatus::Starting,
            timestamp: Utc::now(),
        }));

        let thread = std::thread::Builder::new()
            .name(format!("crowdtrack-{}", config.id))
            .spawn(move || {
                let status = worker.run();
                let _ = done_tx.send(status);
            })
            .map_err(|source| PipelineError::Spawn {
                camera_id: config.id.clone(),
                source,
            })?;

        running.insert(
            config.id.clone(),
            CameraHandle {
                config,
                stop,
                done,
                thread,
            },
        );
        Ok(())
    }

    /// Stop a camera and wait for its worker. Stopping an idle or unknown camera is a no-op.
    ///
    /// A frame already in inference is finished first. If the worker does
    /// not finish within the camera's `stop_timeout`, `StopTimeout` is
    /// returned and the worker is kept as stopping: it exits at its next
    /// frame boundary, and calling `stop` again waits for it once more.
    pub fn stop(&self, camera_id: &str) -> Result<()> {
        let (stop, done, timeout) = {
            let mut running = lock(&self.running);
            let mut stopping = lock(&self.stopping);
            if let Some(handle) = running.remove(camera_id) {
                stopping.insert(camera_id.to_string(), handle);
            }
            let Some(handle) = stopping.get(camera_id) else {
                return Ok(());
            };
            (handle.stop.clone(), handle.done.clone(), handle.config.stop_timeout())
        };
        stop.store(true, Ordering::Release);

        match done.recv_timeout(timeout) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = lock(&self.stopping).remove(camera_id) {
                    reap(camera_id, handle);
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("camera {camera_id} did not stop within {timeout:?}; its worker is still exiting");
                Err(PipelineError::StopTimeout(camera_id.to_string(), timeout))
            }
        }
    }

    /// Stop every camera, returning the first failure.
    pub fn stop_all(&self) -> Result<()> {
        let mut ids: Vec<String> = lock(&self.running).keys().cloned().collect();
        ids.extend(lock(&self.stopping).keys().cloned());
        let mut first_err = None;
        for id in ids {
            if let Err(err) = self.stop(&id) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Whether a worker thread for `camera_id` is alive, including one still stopping.
    pub fn is_running(&self, camera_id: &str) -> bool {
        let alive = |handles: &HashMap<String, CameraHandle>| {
            handles.get(camera_id).is_some_and(|h| !h.thread.is_finished())
        };
        alive(&lock(&self.running)) || alive(&lock(&self.stopping))
    }

    /// Ids of every camera ever started, sorted.
    pub fn camera_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.states).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn status(&self, camera_id: &str) -> Result<CameraStatus> {
        Ok(lock(&*self.state(camera_id)?).status)
    }

    /// Latest metrics, status and how old the metrics are.
    pub fn current_stats(&self, camera_id: &str) -> Result<CurrentStats> {
        Ok(lock(&*self.state(camera_id)?).stats(camera_id))
    }

    /// Up to `n` most recent metrics, oldest first.
    pub fn history(&self, camera_id: &str, n: usize) -> Result<Vec<FrameMetrics>> {
        Ok(lock(&*self.state(camera_id)?).history.recent(n))
    }

    /// Groups, tracks and density grid of the latest processed frame.
    pub fn snapshot(&self, camera_id: &str) -> Result<Option<CrowdSnapshot>> {
        Ok(lock(&*self.state(camera_id)?).snapshot.clone())
    }

    fn state(&self, camera_id: &str) -> Result<Arc<Mutex<CameraState>>> {
        lock(&self.states)
            .get(camera_id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCamera(camera_id.to_string()).into())
    }
}

impl Drop for CameraRegistry {
    fn drop(&mut self) {
        if let Err(err) = self.stop_all() {
            log::warn!("shutdown: {err}");
        }
    }
}

fn reap(camera_id: &str, handle: CameraHandle) {
    if handle.thread.join().is_err() {
        log::error!("camera {camera_id} worker panicked");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
