//! Dispatch worker - the loop that fans packets out to subscribers

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread;

use contracts::{CallbackFailure, ErrorSink, EventPacket, FailurePolicy, Subscriber};
use tracing::{debug, error, instrument, trace, warn};

use crate::dispatcher::DispatcherState;
use crate::metrics::DispatchMetrics;
use crate::queue::{QueueConsumer, QueueMessage};
use crate::registry::SubscriberRegistry;

/// State shared between a dispatcher and its worker
pub(crate) struct Shared {
    pub(crate) event: String,
    pub(crate) state: AtomicU8,
    pub(crate) paused: AtomicBool,
    pub(crate) registry: SubscriberRegistry,
    pub(crate) metrics: DispatchMetrics,
    pub(crate) policy: FailurePolicy,
    pub(crate) error_sink: Option<ErrorSink>,
}

impl Shared {
    pub(crate) fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// Worker loop
///
/// Exits on `Shutdown`, on a closed queue, when the dispatcher is no
/// longer running, or after a fail-fast callback failure.
#[instrument(name = "dispatch_worker_loop", skip(shared, consumer), fields(event = %shared.event))]
pub(crate) fn run(shared: &Shared, consumer: QueueConsumer) {
    let _guard = TerminateOnUnwind(shared);
    debug!("Dispatch worker started");

    let mut packet_count: u64 = 0;

    while let Some(message) = consumer.pop() {
        let packet = match message {
            QueueMessage::Deliver(packet) => packet,
            QueueMessage::Shutdown => break,
        };

        if shared.state() != DispatcherState::Running {
            discard(shared, 1);
            break;
        }

        if shared.paused.load(Ordering::SeqCst) {
            shared.metrics.inc_dropped_paused();
            observability::record_event_dropped(&packet.event);
            trace!(payload = %packet.payload, "Paused, packet dropped");
            continue;
        }

        packet_count += 1;
        if let Err(failure) = broadcast(shared, &packet) {
            error!(
                subscriber = %failure.subscriber,
                error = %failure.message,
                panicked = failure.panicked,
                "Callback failed, dispatch worker terminating"
            );
            mark_terminated(shared);
            break;
        }
    }

    let leftover = consumer
        .drain()
        .into_iter()
        .filter(|m| matches!(m, QueueMessage::Deliver(_)))
        .count();
    if leftover > 0 {
        discard(shared, leftover as u64);
    }

    debug!(packets = packet_count, "Dispatch worker stopped");
}

/// Only a running dispatcher becomes terminated; a concurrent stop() wins.
fn mark_terminated(shared: &Shared) {
    let _ = shared.state.compare_exchange(
        DispatcherState::Running as u8,
        DispatcherState::Terminated as u8,
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
}

/// Marks the dispatcher terminated if the worker unwinds
struct TerminateOnUnwind<'a>(&'a Shared);

impl Drop for TerminateOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            mark_terminated(self.0);
            error!(event = %self.0.event, "Dispatch worker panicked");
        }
    }
}

fn discard(shared: &Shared, count: u64) {
    shared.metrics.add_discarded(count);
    for _ in 0..count {
        observability::record_event_discarded(&shared.event);
    }
    debug!(count, "Queued packets discarded at shutdown");
}

/// Deliver one packet to a snapshot of the registry
///
/// Returns the failure that must stop the worker under `FailFast`.
fn broadcast(shared: &Shared, packet: &EventPacket) -> Result<(), CallbackFailure> {
    let subscribers = shared.registry.snapshot();

    for subscriber in &subscribers {
        // stop() from an earlier callback ends this packet's fan-out too
        if shared.state() != DispatcherState::Running {
            debug!("Dispatcher stopped mid-delivery, remaining subscribers skipped");
            return Ok(());
        }

        let addressed = packet.addressed_to(&subscriber.name, subscriber.cookie.as_ref());

        match invoke(subscriber, &addressed) {
            Ok(()) => {
                shared.metrics.inc_delivered();
                observability::record_event_delivered(&addressed.event, &subscriber.name);
            }
            Err(failure) => {
                shared.metrics.inc_callback_failures();
                observability::record_callback_failure(
                    &failure.event,
                    &failure.subscriber,
                    failure.panicked,
                );
                if let Some(sink) = &shared.error_sink {
                    report(sink, &failure);
                }

                match shared.policy {
                    FailurePolicy::FailFast => return Err(failure),
                    FailurePolicy::Isolate => {
                        warn!(
                            subscriber = %failure.subscriber,
                            error = %failure.message,
                            panicked = failure.panicked,
                            "Callback failed"
                        );
                    }
                }
            }
        }
    }

    trace!(subscribers = subscribers.len(), "Packet delivered");
    Ok(())
}

/// Hand a failure to the error sink; a panicking sink is logged and ignored
fn report(sink: &ErrorSink, failure: &CallbackFailure) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sink(failure))) {
        error!(
            subscriber = %failure.subscriber,
            error = %panic_message(payload.as_ref()),
            "Error sink panicked"
        );
    }
}

fn invoke(subscriber: &Subscriber, packet: &EventPacket) -> Result<(), CallbackFailure> {
    let failure = |message: String, panicked: bool| CallbackFailure {
        event: packet.event.clone(),
        subscriber: subscriber.name.clone(),
        message,
        panicked,
    };

    match panic::catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(packet))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(failure(e.to_string(), false)),
        Err(payload) => Err(failure(panic_message(payload.as_ref()), true)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
