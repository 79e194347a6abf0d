use crate::event::{Event, EventKind, Message, Sequence, queue::PriorityMessageQueue};
use fnv::FnvHashMap;
use futures::{FutureExt, future::BoxFuture};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, atomic::AtomicU64, atomic::Ordering};
use tracing::{debug, error};

pub type HandlerResult = Result<(), String>;
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;
pub type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Wrap a synchronous handler.
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(Event) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(move |event| futures::future::ready(f(event)).boxed())
}

/// Wrap an asynchronous handler.
pub fn async_handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

#[derive(Clone)]
struct Subscriber {
    priority: u8,
    seq: u64,
    handler: Handler,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Typed event bus.
///
/// `emit` invokes subscribers of the event's kind in descending priority (subscription
/// order within a band), awaiting asynchronous handlers before moving on. A failing
/// handler is logged and the remaining handlers still run. `emit_nowait` queues the
/// event for a later [`drain`](EventBus::drain) instead of dispatching inline.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: RwLock<FnvHashMap<EventKind, Vec<Subscriber>>>,
    queue: Mutex<PriorityMessageQueue>,
    seq: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, priority: u8, handler: Handler) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push(Subscriber {
                priority,
                seq,
                handler,
            });
    }

    /// Dispatch inline, awaiting every handler of this event's kind.
    pub async fn emit(&self, event: Event) {
        let mut subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        // Descending priority; the subscription sequence breaks ties FIFO
        subscribers.sort_by_key(|subscriber| (std::cmp::Reverse(subscriber.priority), subscriber.seq));

        for subscriber in subscribers {
            if let Err(reason) = (subscriber.handler)(event.clone()).await {
                error!(
                    kind = ?event.kind(),
                    priority = subscriber.priority,
                    %reason,
                    "event handler failed; continuing with remaining handlers"
                );
            }
        }
    }

    /// Queue the event for the next [`drain`](EventBus::drain) without awaiting anything.
    pub fn emit_nowait(&self, event: Event) {
        let seq = Sequence(self.seq.fetch_add(1, Ordering::Relaxed));
        let message = Message::new(event.time(), event.priority(), seq, event);
        self.queue.lock().push(message);
    }

    /// Dispatch all queued messages in `(time, -priority, seq)` order.
    pub async fn drain(&self) {
        loop {
            let Some(message) = self.queue.lock().pop() else {
                break;
            };
            debug!(kind = ?message.event.kind(), time = %message.time, "dispatching queued event");
            self.emit(message.event).await;
        }
    }

    pub fn queued_len(&self) -> usize {
        self.queue.lock().len()
    }
}
