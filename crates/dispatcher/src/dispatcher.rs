//! Dispatcher - public surface and lifecycle
//!
//! `CREATED -> RUNNING -> STOPPED`. The worker thread is spawned by the
//! constructor and joined by `stop()`; a stopped dispatcher cannot be
//! restarted.
//!
//! `stop()` is cooperative: it waits for the callback currently running on
//! the worker to return. A callback that never returns blocks `stop()`
//! forever.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use contracts::{
    DispatcherConfig, ErrorSink, EventCallback, EventPacket, FailurePolicy, Subscriber,
    SubscriberRef, SubscriberSpec,
};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::MetricsSnapshot;
use crate::queue::{event_queue, QueueMessage, QueueProducer};
use crate::registry::SubscriberRegistry;
use crate::worker::{self, Shared};

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatcherState {
    /// Worker alive, posts accepted
    Running = 0,
    /// `stop()` called; terminal
    Stopped = 1,
    /// Worker exited after a fail-fast callback failure
    Terminated = 2,
}

impl DispatcherState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopped,
            _ => Self::Terminated,
        }
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    event: String,
    template: Map<String, Value>,
    policy: FailurePolicy,
    error_sink: Option<ErrorSink>,
}

impl DispatcherBuilder {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            template: Map::new(),
            policy: FailurePolicy::default(),
            error_sink: None,
        }
    }

    /// Seed one default packet field
    pub fn template_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.template.insert(key.into(), value.into());
        self
    }

    /// Seed all default packet fields
    pub fn template(mut self, fields: Map<String, Value>) -> Self {
        self.template = fields;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Receive every callback failure
    pub fn error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Build the dispatcher and start its worker
    #[instrument(name = "dispatcher_builder_build", skip(self), fields(event = %self.event))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let template = EventPacket::template(self.event.clone(), &self.template);
        let shared = Arc::new(Shared {
            event: self.event,
            state: AtomicU8::new(DispatcherState::Running as u8),
            paused: AtomicBool::new(false),
            registry: SubscriberRegistry::new(),
            metrics: Default::default(),
            policy: self.policy,
            error_sink: self.error_sink,
        });

        let (producer, consumer) = event_queue();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("{}-dispatch", shared.event))
            .spawn(move || worker::run(&worker_shared, consumer))
            .map_err(|source| DispatcherError::Spawn {
                event: shared.event.clone(),
                source,
            })?;

        info!(policy = ?shared.policy, "Dispatcher started");

        Ok(Dispatcher {
            shared,
            template: Mutex::new(template),
            producer,
            worker: Mutex::new(Some(worker)),
        })
    }
}

/// Threaded event dispatcher
///
/// Posts are queued and delivered on a dedicated worker thread, in post
/// order, to the subscribers registered when each packet is delivered.
pub struct Dispatcher {
    shared: Arc<Shared>,
    /// Packet template; held across copy-and-enqueue to serialise posts
    template: Mutex<EventPacket>,
    producer: QueueProducer,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a dispatcher with default settings
    pub fn new(event: impl Into<String>) -> Result<Self, DispatcherError> {
        DispatcherBuilder::new(event).build()
    }

    pub fn builder(event: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(event)
    }

    /// Create a dispatcher from a validated configuration
    pub fn from_config(config: &DispatcherConfig) -> Result<Self, DispatcherError> {
        DispatcherBuilder::new(config.event.clone())
            .template(config.template.clone())
            .failure_policy(config.failure_policy)
            .build()
    }

    /// Event name
    pub fn event(&self) -> &str {
        &self.shared.event
    }

    /// Register (or replace) a named subscriber
    ///
    /// Ignored once the dispatcher has stopped.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        callback: EventCallback,
        cookie: Option<Value>,
    ) -> &Self {
        self.register(Subscriber::new(name, callback, cookie))
    }

    /// Remove a subscriber by name; unknown names are ignored
    pub fn unsubscribe(&self, name: &str) -> &Self {
        if self.shared.registry.remove(name) {
            debug!(event = %self.shared.event, subscriber = %name, "Unsubscribed");
        }
        self
    }

    /// Register a bare callback or a descriptor
    ///
    /// A descriptor without a callback is ignored.
    pub fn add_subscriber(&self, spec: impl Into<SubscriberSpec>) -> &Self {
        match spec.into().into_subscriber() {
            Some(subscriber) => self.register(subscriber),
            None => {
                debug!(event = %self.shared.event, "Descriptor without callback ignored");
                self
            }
        }
    }

    /// Remove by name, callback identity or descriptor
    pub fn remove_subscriber(&self, target: impl Into<SubscriberRef>) -> &Self {
        match target.into().resolved_name() {
            Some(name) => self.unsubscribe(&name),
            None => self,
        }
    }

    fn register(&self, subscriber: Subscriber) -> &Self {
        if self.shared.state() != DispatcherState::Running {
            warn!(
                event = %self.shared.event,
                subscriber = %subscriber.name,
                "Dispatcher not running, subscription ignored"
            );
            return self;
        }

        let name = subscriber.name.clone();
        let replaced = self.shared.registry.insert(subscriber);
        debug!(event = %self.shared.event, subscriber = %name, replaced, "Subscribed");
        self
    }

    /// Queue a payload for delivery
    pub fn post(&self, payload: impl Into<Value>) -> Result<&Self, DispatcherError> {
        self.post_with(payload, &Map::new())
    }

    /// Queue a payload with per-post packet overrides
    ///
    /// Never blocks on delivery. Fails once the dispatcher is stopped or
    /// its worker has terminated.
    pub fn post_with(
        &self,
        payload: impl Into<Value>,
        overrides: &Map<String, Value>,
    ) -> Result<&Self, DispatcherError> {
        self.ensure_running()?;

        let template = self
            .template
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut packet = template.clone();
        packet.apply_overrides(overrides);
        packet.payload = payload.into();

        // The worker may have exited after the check above; its state says why.
        self.producer
            .push(QueueMessage::Deliver(packet))
            .map_err(|_| self.rejection())?;
        drop(template);

        self.shared.metrics.inc_posted();
        observability::record_event_posted(&self.shared.event);
        Ok(self)
    }

    fn ensure_running(&self) -> Result<(), DispatcherError> {
        match self.shared.state() {
            DispatcherState::Running => Ok(()),
            _ => Err(self.rejection()),
        }
    }

    /// Error for a post the worker will never see
    fn rejection(&self) -> DispatcherError {
        let event = self.shared.event.clone();
        match self.shared.state() {
            DispatcherState::Stopped => DispatcherError::stopped(event),
            DispatcherState::Running | DispatcherState::Terminated => {
                DispatcherError::worker_terminated(event)
            }
        }
    }

    /// Drop every packet popped from now on until `unpause()`
    pub fn pause(&self) -> &Self {
        if !self.shared.paused.swap(true, Ordering::SeqCst) {
            debug!(event = %self.shared.event, "Paused");
        }
        self
    }

    /// Resume delivery; packets dropped while paused are not replayed
    pub fn unpause(&self) -> &Self {
        if self.shared.paused.swap(false, Ordering::SeqCst) {
            debug!(event = %self.shared.event, "Unpaused");
        }
        self
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.state() == DispatcherState::Running
    }

    pub fn state(&self) -> DispatcherState {
        self.shared.state()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Subscriber names in delivery order
    pub fn subscriber_names(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot(self.producer.len())
    }

    /// Stop the worker and clear all subscribers
    ///
    /// Only the first call has an effect. Blocks until the worker exits,
    /// except when called from a callback on the worker itself. A callback
    /// that never returns blocks this call indefinitely.
    #[instrument(name = "dispatcher_stop", skip(self), fields(event = %self.shared.event))]
    pub fn stop(&self) {
        let previous = self
            .shared
            .state
            .swap(DispatcherState::Stopped as u8, Ordering::SeqCst);
        if DispatcherState::from_u8(previous) == DispatcherState::Stopped {
            return;
        }

        // Fails only if the worker already exited.
        let _ = self.producer.push(QueueMessage::Shutdown);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if handle.thread().id() == thread::current().id() {
                // The worker skips the rest of the in-flight packet's
                // subscribers once it sees the stopped state.
                debug!("stop() called from the dispatch worker, not joining");
            } else if handle.join().is_err() {
                warn!("Dispatch worker panicked");
            }
        }

        let cleared = self.shared.registry.clear();
        info!(subscribers_cleared = cleared, "Dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("event", &self.shared.event)
            .field("state", &self.state())
            .field("paused", &self.is_paused())
            .field("subscribers", &self.subscriber_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{callback, fallible_callback, CallbackFailure, SubscriberDescriptor};
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(2);

    /// Callback forwarding every packet it receives into a channel
    fn collector() -> (EventCallback, mpsc::Receiver<EventPacket>) {
        let (tx, rx) = mpsc::channel();
        let cb = callback(move |packet| {
            let _ = tx.send(packet.clone());
        });
        (cb, rx)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_post_delivers_payload_and_dest() {
        let dispatcher = Dispatcher::new("e").unwrap();
        let (cb, rx) = collector();
        dispatcher.subscribe("a", cb, None);

        dispatcher.post("x").unwrap();

        let packet = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(packet.event, "e");
        assert_eq!(packet.payload, json!("x"));
        assert_eq!(packet.dest.as_deref(), Some("a"));
        dispatcher.stop();
    }

    #[test]
    fn test_delivery_preserves_post_order() {
        let dispatcher = Dispatcher::new("ordered").unwrap();
        let (cb, rx) = collector();
        dispatcher.subscribe("a", cb, None);

        for i in 0..200 {
            dispatcher.post(i).unwrap();
        }

        let received: Vec<Value> = (0..200)
            .map(|_| rx.recv_timeout(TIMEOUT).unwrap().payload)
            .collect();
        let expected: Vec<Value> = (0..200).map(|i| json!(i)).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_fan_out_sets_dest_and_cookie_per_subscriber() {
        let dispatcher = Dispatcher::new("fan").unwrap();
        let (tx, rx) = mpsc::channel();
        for (name, cookie) in [("a", json!(1)), ("b", json!({"k": "v"})), ("c", json!(null))] {
            let tx = tx.clone();
            dispatcher.subscribe(
                name,
                callback(move |packet| {
                    let _ = tx.send(packet.clone());
                }),
                Some(cookie),
            );
        }

        dispatcher.post("p").unwrap();

        let packets: Vec<EventPacket> = (0..3).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
        let dests: Vec<_> = packets.iter().map(|p| p.dest.clone().unwrap()).collect();
        assert_eq!(dests, vec!["a", "b", "c"]);
        assert_eq!(packets[0].cookie, Some(json!(1)));
        assert_eq!(packets[1].cookie, Some(json!({"k": "v"})));
        assert_eq!(packets[2].cookie, Some(json!(null)));
        assert!(packets.iter().all(|p| p.payload == json!("p")));
    }

    #[test]
    fn test_unsubscribed_before_post_is_excluded() {
        let dispatcher = Dispatcher::new("unsub").unwrap();
        let (cb_a, rx_a) = collector();
        let (cb_b, rx_b) = collector();
        dispatcher.subscribe("a", cb_a, None).subscribe("b", cb_b, None);

        dispatcher.unsubscribe("a").unsubscribe("never-registered");
        dispatcher.post(1).unwrap().post(2).unwrap();

        assert_eq!(rx_b.recv_timeout(TIMEOUT).unwrap().payload, json!(1));
        assert_eq!(rx_b.recv_timeout(TIMEOUT).unwrap().payload, json!(2));
        assert!(rx_a.try_recv().is_err());
        assert_eq!(dispatcher.subscriber_names(), vec!["b"]);
    }

    #[test]
    fn test_paused_packets_are_dropped_not_replayed() {
        let dispatcher = Dispatcher::new("pause").unwrap();
        let (cb, rx) = collector();
        dispatcher.subscribe("a", cb, None);

        dispatcher.pause();
        assert!(dispatcher.is_paused());
        dispatcher.post("p1").unwrap().post("p2").unwrap();
        assert!(wait_until(|| dispatcher.metrics().dropped_paused == 2));

        dispatcher.unpause().post("after").unwrap();

        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().payload, json!("after"));
        assert!(rx.try_recv().is_err());
        assert_eq!(dispatcher.metrics().delivered, 1);
    }

    #[test]
    fn test_null_payload_is_delivered() {
        let dispatcher = Dispatcher::new("null").unwrap();
        let (cb, rx) = collector();
        dispatcher.subscribe("a", cb, None);

        dispatcher.post(Value::Null).unwrap();

        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().payload, Value::Null);
    }

    #[test]
    fn test_stop_is_idempotent_and_rejects_posts() {
        let dispatcher = Dispatcher::new("stop").unwrap();
        let (cb, _rx) = collector();
        dispatcher.subscribe("a", cb, None);

        dispatcher.stop();
        dispatcher.stop();

        assert!(!dispatcher.is_running());
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(dispatcher.subscriber_count(), 0);
        assert!(matches!(
            dispatcher.post("late"),
            Err(DispatcherError::Stopped { .. })
        ));

        let (cb, _rx) = collector();
        dispatcher.subscribe("b", cb, None);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn test_fail_fast_terminates_worker() {
        let failures = Arc::new(Mutex::new(Vec::<CallbackFailure>::new()));
        let sink_failures = Arc::clone(&failures);
        let dispatcher = Dispatcher::builder("ff")
            .failure_policy(FailurePolicy::FailFast)
            .error_sink(Arc::new(move |f: &CallbackFailure| {
                sink_failures.lock().unwrap().push(f.clone());
            }))
            .build()
            .unwrap();
        let (cb_b, rx_b) = collector();
        dispatcher
            .subscribe("a", fallible_callback(|_| Err("broken".into())), None)
            .subscribe("b", cb_b, None);

        dispatcher.post(1).unwrap();

        assert!(wait_until(|| dispatcher.state() == DispatcherState::Terminated));
        assert!(rx_b.try_recv().is_err());
        assert!(matches!(
            dispatcher.post(2),
            Err(DispatcherError::WorkerTerminated { .. })
        ));

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].subscriber, "a");
        assert_eq!(failures[0].message, "broken");
        assert!(!failures[0].panicked);

        dispatcher.stop();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    #[test]
    fn test_isolate_keeps_delivering_after_panic() {
        let (fail_tx, fail_rx) = mpsc::channel();
        let dispatcher = Dispatcher::builder("iso")
            .failure_policy(FailurePolicy::Isolate)
            .error_sink(Arc::new(move |f: &CallbackFailure| {
                let _ = fail_tx.send(f.clone());
            }))
            .build()
            .unwrap();
        let (cb_b, rx_b) = collector();
        dispatcher
            .subscribe("a", callback(|_| panic!("subscriber exploded")), None)
            .subscribe("b", cb_b, None);

        dispatcher.post(1).unwrap().post(2).unwrap();

        assert_eq!(rx_b.recv_timeout(TIMEOUT).unwrap().payload, json!(1));
        assert_eq!(rx_b.recv_timeout(TIMEOUT).unwrap().payload, json!(2));
        let failure = fail_rx.recv_timeout(TIMEOUT).unwrap();
        assert!(failure.panicked);
        assert_eq!(failure.message, "subscriber exploded");
        assert!(dispatcher.is_running());
        assert!(wait_until(|| dispatcher.metrics().callback_failures == 2));
    }

    #[test]
    fn test_add_and_remove_by_callback_identity() {
        let dispatcher = Dispatcher::new("sugar").unwrap();
        let (cb, rx) = collector();

        dispatcher.add_subscriber(Arc::clone(&cb));
        dispatcher.add_subscriber(SubscriberDescriptor::new().name("no-callback"));
        assert_eq!(dispatcher.subscriber_names(), vec![contracts::callback_identity(&cb)]);

        dispatcher.post("one").unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().payload, json!("one"));

        dispatcher.remove_subscriber(Arc::clone(&cb));
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn test_add_and_remove_by_descriptor() {
        let dispatcher = Dispatcher::new("desc").unwrap();
        let (cb, rx) = collector();
        let descriptor = SubscriberDescriptor::new()
            .name("d")
            .callback(cb)
            .cookie(json!("ck"));

        dispatcher.add_subscriber(descriptor.clone());
        dispatcher.post(0).unwrap();
        let packet = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(packet.dest.as_deref(), Some("d"));
        assert_eq!(packet.cookie, Some(json!("ck")));

        dispatcher.remove_subscriber(descriptor);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let dispatcher = Arc::new(Dispatcher::new("reentrant").unwrap());
        let weak = Arc::downgrade(&dispatcher);
        let (tx, rx) = mpsc::channel();
        dispatcher.subscribe(
            "once",
            callback(move |packet| {
                if let Some(d) = weak.upgrade() {
                    d.unsubscribe("once");
                }
                let _ = tx.send(packet.payload.clone());
            }),
            None,
        );

        dispatcher.post(1).unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), json!(1));
        dispatcher.post(2).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn test_stop_from_callback_does_not_deadlock() {
        let dispatcher = Arc::new(Dispatcher::new("self-stop").unwrap());
        let weak = Arc::downgrade(&dispatcher);
        let (tx, rx) = mpsc::channel();
        dispatcher.subscribe(
            "stopper",
            callback(move |_| {
                if let Some(d) = weak.upgrade() {
                    d.stop();
                }
                let _ = tx.send(());
            }),
            None,
        );

        dispatcher.post("halt").unwrap();
        rx.recv_timeout(TIMEOUT).unwrap();
        assert!(!dispatcher.is_running());
    }

    #[test]
    fn test_stop_from_callback_skips_remaining_subscribers() {
        let dispatcher = Arc::new(Dispatcher::new("cut-short").unwrap());
        let weak = Arc::downgrade(&dispatcher);
        let (cb_after, rx_after) = collector();
        dispatcher
            .subscribe(
                "stopper",
                callback(move |_| {
                    if let Some(d) = weak.upgrade() {
                        d.stop();
                    }
                }),
                None,
            )
            .subscribe("after", cb_after, None);

        dispatcher.post("last").unwrap();

        assert!(wait_until(|| !dispatcher.is_running()));
        assert!(rx_after.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(dispatcher.metrics().delivered, 1);
    }

    #[test]
    fn test_packets_queued_behind_stop_are_discarded() {
        let dispatcher = Arc::new(Dispatcher::new("backlog").unwrap());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let (cb, rx) = collector();
        dispatcher
            .subscribe(
                "gate",
                callback(move |_| {
                    let _ = entered_tx.send(());
                    let _ = release_rx.lock().unwrap().recv_timeout(TIMEOUT);
                }),
                None,
            )
            .subscribe("sink", cb, None);

        dispatcher.post(1).unwrap().post(2).unwrap().post(3).unwrap();
        entered_rx.recv_timeout(TIMEOUT).unwrap();

        let stopper = {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || dispatcher.stop())
        };
        assert!(wait_until(|| dispatcher.state() == DispatcherState::Stopped));
        release_tx.send(()).unwrap();
        stopper.join().unwrap();

        let metrics = dispatcher.metrics();
        assert_eq!(metrics.posted, 3);
        assert_eq!(metrics.discarded, 2);
        assert_eq!(metrics.delivered, 1);
        assert!(rx.try_recv().is_err());
        assert!(entered_rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_joins_worker() {
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let dispatcher = Dispatcher::new("dropped").unwrap();
        {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            dispatcher.subscribe(
                "slow",
                callback(move |_| {
                    started.store(true, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(100));
                    finished.store(true, Ordering::SeqCst);
                }),
                None,
            );
        }

        dispatcher.post("go").unwrap();
        assert!(wait_until(|| started.load(Ordering::SeqCst)));

        drop(dispatcher);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_error_sink_keeps_worker_alive() {
        let dispatcher = Dispatcher::builder("sink-panic")
            .error_sink(Arc::new(|_: &CallbackFailure| panic!("sink exploded")))
            .build()
            .unwrap();
        let (cb_b, rx_b) = collector();
        dispatcher
            .subscribe("a", fallible_callback(|_| Err("broken".into())), None)
            .subscribe("b", cb_b, None);

        dispatcher.post(1).unwrap().post(2).unwrap();

        assert_eq!(rx_b.recv_timeout(TIMEOUT).unwrap().payload, json!(1));
        assert_eq!(rx_b.recv_timeout(TIMEOUT).unwrap().payload, json!(2));
        assert!(dispatcher.is_running());
        assert_eq!(dispatcher.state(), DispatcherState::Running);
        assert!(dispatcher.post(3).is_ok());
    }

    #[test]
    fn test_rejection_follows_state() {
        let stopped = Dispatcher::new("rejected-stop").unwrap();
        stopped.stop();
        assert!(matches!(stopped.rejection(), DispatcherError::Stopped { .. }));

        let failed = Dispatcher::builder("rejected-ff")
            .failure_policy(FailurePolicy::FailFast)
            .build()
            .unwrap();
        failed.subscribe("a", fallible_callback(|_| Err("broken".into())), None);
        failed.post(1).unwrap();
        assert!(wait_until(|| failed.state() == DispatcherState::Terminated));
        assert!(matches!(
            failed.rejection(),
            DispatcherError::WorkerTerminated { .. }
        ));
    }

    #[test]
    fn test_template_and_overrides_shape_packet() {
        let dispatcher = Dispatcher::builder("shaped")
            .template_field("source", "unit")
            .build()
            .unwrap();
        let (cb, rx) = collector();
        dispatcher.subscribe("a", cb, None);

        let overrides = json!({ "event": "renamed", "priority": 5 });
        dispatcher
            .post_with("x", overrides.as_object().unwrap())
            .unwrap();
        dispatcher.post("y").unwrap();

        let first = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(first.event, "renamed");
        assert_eq!(first.field("priority"), Some(&json!(5)));
        assert_eq!(first.field("source"), Some(&json!("unit")));

        let second = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(second.event, "shaped");
        assert_eq!(second.field("priority"), None);
    }

    #[test]
    fn test_from_config() {
        let mut config = DispatcherConfig::new("configured");
        config.failure_policy = FailurePolicy::FailFast;
        config.template.insert("zone".to_string(), json!("eu"));

        let dispatcher = Dispatcher::from_config(&config).unwrap();
        let (cb, rx) = collector();
        dispatcher.subscribe("a", cb, None);
        dispatcher.post(true).unwrap();

        let packet = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(packet.event, "configured");
        assert_eq!(packet.field("zone"), Some(&json!("eu")));
    }
}
