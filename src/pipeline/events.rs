//! Fan-out of pipeline events to bounded subscriber queues.
//!
//! Publishing never blocks. A subscriber whose queue is full loses its
//! oldest unread event to make room, so slow consumers always see the most
//! recent state. A capacity of 1 is a plain latest-value hand-off.
//!
//! One bus is shared by every camera worker of a registry. Its lock is held
//! only for the non-blocking sends of a single publish, so a slow
//! subscriber or a busy camera never stalls another camera's worker.
//! Events from one camera reach each subscriber in publish order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::error::TransportError;
use crate::pipeline::metrics::PipelineEvent;

struct Subscriber {
    id: usize,
    tx: Sender<PipelineEvent>,
    // Publisher-side handle on the same queue, used to evict the oldest entry.
    evict: Receiver<PipelineEvent>,
    closed: Arc<AtomicBool>,
    evicted: u64,
}

/// Shared fan-out to every subscriber, one per registry.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with a queue of `capacity` events (at least 1).
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let closed = Arc::new(AtomicBool::new(false));
        self.lock().push(Subscriber {
            id,
            tx,
            evict: rx.clone(),
            closed: closed.clone(),
            evicted: 0,
        });
        Subscription { id, rx, closed }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: &PipelineEvent) {
        self.lock().retain_mut(|sub| {
            if sub.closed.load(Ordering::Acquire) {
                log::debug!("{}", TransportError::Disconnected(sub.id));
                return false;
            }
            let mut pending = event.clone();
            loop {
                match sub.tx.try_send(pending) {
                    Ok(()) => return true,
                    Err(TrySendError::Full(back)) => {
                        if sub.evict.try_recv().is_ok() {
                            sub.evicted += 1;
                            log::trace!("{} (total {})", TransportError::Evicted(sub.id), sub.evicted);
                        }
                        pending = back;
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        log::debug!("{}", TransportError::Disconnected(sub.id));
                        return false;
                    }
                }
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving end of one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: usize,
    rx: Receiver<PipelineEvent>,
    closed: Arc<AtomicBool>,
}

impl Subscription {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn try_recv(&self) -> Option<PipelineEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<PipelineEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything queued right now, oldest first.
    pub fn drain(&self) -> Vec<PipelineEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::metrics::{CameraStatus, StatusEvent};
    use chrono::Utc;

    fn status(camera: &str, status: CameraStatus) -> PipelineEvent {
        PipelineEvent::Status(StatusEvent {
            camera_id: camera.into(),
            status,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn test_latest_wins_with_capacity_one() {
        let bus = EventBus::new();
        let sub = bus.subscribe(1);
        bus.publish(&status("a", CameraStatus::Starting));
        bus.publish(&status("a", CameraStatus::Live));
        bus.publish(&status("a", CameraStatus::Stopped));

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], PipelineEvent::Status(s) if s.status == CameraStatus::Stopped));
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let bus = EventBus::new();
        let sub = bus.subscribe(2);
        for camera in ["a", "b", "c", "d"] {
            bus.publish(&status(camera, CameraStatus::Live));
        }
        let cameras: Vec<String> = sub.drain().iter().map(|e| e.camera_id().to_string()).collect();
        assert_eq!(cameras, vec!["c", "d"]);
    }

    #[test]
    fn test_every_subscriber_gets_a_copy() {
        let bus = EventBus::new();
        let a = bus.subscribe(4);
        let b = bus.subscribe(4);
        bus.publish(&status("x", CameraStatus::Live));
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_some());
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn test_concurrent_cameras_keep_their_own_order() {
        use crate::pipeline::metrics::{ErrorEvent, ErrorKind};

        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe(8);
        std::thread::scope(|scope| {
            for camera in 0..4 {
                let bus = Arc::clone(&bus);
                scope.spawn(move || {
                    for n in 0..500 {
                        bus.publish(&PipelineEvent::Error(ErrorEvent {
                            camera_id: format!("cam-{camera}"),
                            kind: ErrorKind::Capture,
                            message: n.to_string(),
                            timestamp: Utc::now(),
                        }));
                    }
                });
            }
        });

        let events = sub.drain();
        assert_eq!(events.len(), 8);
        for camera in 0..4 {
            let seen: Vec<u32> = events
                .iter()
                .filter_map(|e| match e {
                    PipelineEvent::Error(err) if err.camera_id == format!("cam-{camera}") => err.message.parse().ok(),
                    _ => None,
                })
                .collect();
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "cam-{camera}: {seen:?}");
        }
        // The most recent event survives eviction.
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::Error(err) if err.message == "499")));
    }

    #[test]
    fn test_dropped_subscription_is_removed() {
        let bus = EventBus::new();
        let keep = bus.subscribe(1);
        drop(bus.subscribe(1));
        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(&status("x", CameraStatus::Live));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_some());
    }
}
