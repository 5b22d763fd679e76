use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::client::{
    Acker, BrokerClient, Delivery, DeliveryStream, ExchangeKind, QueueHandle, QueueOptions,
    Settlement,
};
use crate::envelope::MessageEnvelope;
use crate::error::{BrokerError, Result};
use crate::reconnect::connect_with_retry;
use crate::settings::ConnectionSettings;
use crate::topic;

/// In-process message broker.
///
/// Implements the subset of AMQP semantics the services rely on: the default
/// exchange, direct/fanout/topic exchanges, durable and auto-delete queues,
/// per-consumer prefetch, requeue, dead-letter exchanges and persistent
/// messages surviving [`restart`](Self::restart).
///
/// Cloning is cheap; clones share the same broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

struct BrokerState {
    reachable: bool,
    queues: HashMap<String, QueueState>,
    exchanges: HashMap<String, ExchangeState>,
    clients: Vec<Weak<ClientShared>>,
    next_delivery_tag: u64,
    restarts: u64,
    dead_letter_capacity: usize,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            reachable: true,
            queues: HashMap::new(),
            exchanges: HashMap::new(),
            clients: Vec::new(),
            next_delivery_tag: 0,
            restarts: 0,
            dead_letter_capacity: InMemoryBroker::DEFAULT_DEAD_LETTER_CAPACITY,
        }
    }
}

struct QueueState {
    options: QueueOptions,
    ready: VecDeque<Ready>,
    unacked: usize,
    acked: u64,
    /// Most recent dead letters, bounded by the broker's capacity.
    dead_lettered: VecDeque<MessageEnvelope>,
    dead_letter_total: u64,
    consumers: usize,
    notify: Arc<Notify>,
}

impl QueueState {
    fn new(options: QueueOptions) -> Self {
        Self {
            options,
            ready: VecDeque::new(),
            unacked: 0,
            acked: 0,
            dead_lettered: VecDeque::new(),
            dead_letter_total: 0,
            consumers: 0,
            notify: Arc::new(Notify::new()),
        }
    }

    fn push_back(&mut self, envelope: MessageEnvelope) {
        self.ready.push_back(Ready {
            envelope,
            redelivered: false,
        });
        self.notify.notify_waiters();
    }

    fn push_front(&mut self, envelope: MessageEnvelope) {
        self.ready.push_front(Ready {
            envelope,
            redelivered: true,
        });
        self.notify.notify_waiters();
    }

    fn handle(&self, name: &str) -> QueueHandle {
        QueueHandle {
            name: name.to_string(),
            message_count: u32::try_from(self.ready.len()).unwrap_or(u32::MAX),
            consumer_count: u32::try_from(self.consumers).unwrap_or(u32::MAX),
        }
    }
}

struct Ready {
    envelope: MessageEnvelope,
    redelivered: bool,
}

struct ExchangeState {
    kind: ExchangeKind,
    durable: bool,
    bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    queue: String,
    routing_key: String,
}

impl BrokerState {
    fn route(&self, exchange: &str, routing_key: &str) -> Result<Vec<String>> {
        if exchange.is_empty() {
            return Ok(if self.queues.contains_key(routing_key) {
                vec![routing_key.to_string()]
            } else {
                Vec::new()
            });
        }

        let exchange_state = self
            .exchanges
            .get(exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?;

        let mut targets: Vec<String> = Vec::new();
        for binding in &exchange_state.bindings {
            let hit = match exchange_state.kind {
                ExchangeKind::Direct => binding.routing_key == routing_key,
                ExchangeKind::Fanout => true,
                ExchangeKind::Topic => topic::matches(&binding.routing_key, routing_key),
            };
            if hit && !targets.contains(&binding.queue) {
                targets.push(binding.queue.clone());
            }
        }
        Ok(targets)
    }

    fn deliver(&mut self, exchange: &str, routing_key: &str, mut envelope: MessageEnvelope) -> Result<usize> {
        let targets = self.route(exchange, routing_key)?;
        if targets.is_empty() {
            tracing::warn!(exchange, routing_key, "message is unroutable, dropping");
            return Ok(0);
        }

        envelope.exchange = exchange.to_string();
        envelope.routing_key = routing_key.to_string();
        for name in &targets {
            if let Some(queue) = self.queues.get_mut(name) {
                queue.push_back(envelope.clone());
            }
        }
        Ok(targets.len())
    }

    fn wake_all(&self) {
        for queue in self.queues.values() {
            queue.notify.notify_waiters();
        }
    }

    fn close_clients(&mut self) {
        for client in self.clients.drain(..) {
            if let Some(client) = client.upgrade() {
                client.close();
            }
        }
        self.wake_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBroker {
    /// Dead letters kept per queue unless configured otherwise.
    pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1000;

    /// Creates a new empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` dead letters per queue, dropping the oldest.
    pub fn with_dead_letter_capacity(self, capacity: usize) -> Self {
        self.lock().dead_letter_capacity = capacity;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        lock(&self.state)
    }

    /// Connects a client, retrying according to `settings`.
    pub async fn connect(&self, settings: &ConnectionSettings) -> Result<InMemoryClient> {
        let prefetch = settings.prefetch_count;
        connect_with_retry(settings, |_| std::future::ready(self.client(prefetch))).await
    }

    /// Connects a client with a single attempt.
    pub fn client(&self, prefetch_count: u16) -> Result<InMemoryClient> {
        let mut state = self.lock();
        if !state.reachable {
            return Err(BrokerError::Connection {
                attempts: 1,
                reason: "connection refused".to_string(),
            });
        }

        let shared = Arc::new(ClientShared::default());
        state.clients.retain(|c| c.strong_count() > 0);
        state.clients.push(Arc::downgrade(&shared));

        Ok(InMemoryClient {
            broker: self.clone(),
            shared,
            prefetch_count,
        })
    }

    /// Makes the broker reachable or not. Going unreachable drops every open
    /// connection.
    pub fn set_reachable(&self, reachable: bool) {
        let mut state = self.lock();
        state.reachable = reachable;
        if !reachable {
            tracing::warn!("in-memory broker unreachable, closing connections");
            state.close_clients();
        }
    }

    /// Simulates a broker restart.
    ///
    /// All connections are closed. Non-durable queues and exchanges are
    /// removed; durable queues keep only their persistent ready messages.
    pub fn restart(&self) {
        let mut state = self.lock();
        state.close_clients();
        state.restarts += 1;

        state.queues.retain(|_, queue| queue.options.durable);
        for queue in state.queues.values_mut() {
            queue.ready.retain(|ready| ready.envelope.persistent);
            queue.unacked = 0;
            queue.consumers = 0;
        }

        state.exchanges.retain(|_, exchange| exchange.durable);
        let BrokerState { queues, exchanges, .. } = &mut *state;
        for exchange in exchanges.values_mut() {
            exchange
                .bindings
                .retain(|binding| queues.contains_key(&binding.queue));
        }

        tracing::info!(restarts = state.restarts, "in-memory broker restarted");
    }

    pub fn queue_exists(&self, queue: &str) -> bool {
        self.lock().queues.contains_key(queue)
    }

    pub fn exchange_kind(&self, exchange: &str) -> Option<ExchangeKind> {
        self.lock().exchanges.get(exchange).map(|e| e.kind)
    }

    /// Queues bound to an exchange, with their binding keys.
    pub fn bindings(&self, exchange: &str) -> Vec<(String, String)> {
        self.lock()
            .exchanges
            .get(exchange)
            .map(|e| {
                e.bindings
                    .iter()
                    .map(|b| (b.queue.clone(), b.routing_key.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of ready (not yet delivered) messages.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.ready.len())
    }

    /// Number of delivered but unsettled messages.
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.unacked)
    }

    /// Number of acknowledged messages.
    pub fn acked_count(&self, queue: &str) -> u64 {
        self.lock().queues.get(queue).map_or(0, |q| q.acked)
    }

    pub fn consumer_count(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.consumers)
    }

    /// The most recent messages rejected from a queue without requeue,
    /// oldest first.
    pub fn dead_lettered(&self, queue: &str) -> Vec<MessageEnvelope> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.dead_lettered.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every message ever dead-lettered from a queue, including those no
    /// longer retained.
    pub fn dead_letter_total(&self, queue: &str) -> u64 {
        self.lock().queues.get(queue).map_or(0, |q| q.dead_letter_total)
    }

    /// Copies of the ready messages, in delivery order.
    pub fn peek(&self, queue: &str) -> Vec<MessageEnvelope> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|r| r.envelope.clone()).collect())
            .unwrap_or_default()
    }

    /// Removes and returns the ready messages.
    pub fn drain(&self, queue: &str) -> Vec<MessageEnvelope> {
        self.lock()
            .queues
            .get_mut(queue)
            .map(|q| q.ready.drain(..).map(|r| r.envelope).collect())
            .unwrap_or_default()
    }

    fn try_deliver(
        &self,
        client: &Arc<ClientShared>,
        queue: &str,
        permit: &mut Option<OwnedSemaphorePermit>,
    ) -> Result<Next> {
        let mut state = self.lock();
        if !client.is_open() {
            return Err(BrokerError::ChannelClosed);
        }

        let BrokerState {
            queues,
            next_delivery_tag,
            restarts,
            ..
        } = &mut *state;
        let queue_state = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

        let Some(ready) = queue_state.ready.pop_front() else {
            return Ok(Next::Empty(Arc::clone(&queue_state.notify)));
        };

        queue_state.unacked += 1;
        *next_delivery_tag += 1;
        let acker = MemoryAcker {
            broker: self.clone(),
            client: Arc::clone(client),
            queue: queue.to_string(),
            restarts: *restarts,
            _permit: permit.take(),
        };
        Ok(Next::Delivered(Delivery::new(
            ready.envelope,
            queue,
            *next_delivery_tag,
            ready.redelivered,
            Box::new(acker),
        )))
    }

    fn settle(&self, acker: &MemoryAcker, mut envelope: MessageEnvelope, settlement: Settlement) -> Result<()> {
        let mut state = self.lock();
        let current = state.restarts == acker.restarts;
        let open = acker.client.is_open();
        let capacity = state.dead_letter_capacity;

        let Some(queue) = state.queues.get_mut(&acker.queue) else {
            return Err(if open {
                BrokerError::QueueNotFound(acker.queue.clone())
            } else {
                BrokerError::ChannelClosed
            });
        };
        if current {
            queue.unacked = queue.unacked.saturating_sub(1);
        }

        if !open {
            // Unsettled messages go back to the queue when the channel closes.
            if current || (envelope.persistent && queue.options.durable) {
                queue.push_front(envelope);
            }
            return Err(BrokerError::ChannelClosed);
        }

        match settlement {
            Settlement::Ack => queue.acked += 1,
            Settlement::Requeue => queue.push_front(envelope),
            Settlement::Retry { retry_count } => {
                envelope.retry_count = retry_count;
                queue.push_back(envelope);
            }
            Settlement::DeadLetter => {
                queue.dead_letter_total += 1;
                if capacity > 0 {
                    if queue.dead_lettered.len() >= capacity {
                        queue.dead_lettered.pop_front();
                    }
                    queue.dead_lettered.push_back(envelope.clone());
                }
                if let Some(dlx) = queue.options.dead_letter_exchange.clone() {
                    let routing_key = envelope.routing_key.clone();
                    if let Err(e) = state.deliver(&dlx, &routing_key, envelope) {
                        tracing::warn!(queue = %acker.queue, dead_letter_exchange = %dlx, error = %e, "dead-letter routing failed, message discarded");
                    }
                }
            }
        }
        Ok(())
    }

    fn release_consumer(&self, queue: &str) {
        let mut state = self.lock();
        let remove = match state.queues.get_mut(queue) {
            Some(q) => {
                q.consumers = q.consumers.saturating_sub(1);
                q.options.auto_delete && q.consumers == 0
            }
            None => false,
        };

        if remove {
            state.queues.remove(queue);
            for exchange in state.exchanges.values_mut() {
                exchange.bindings.retain(|b| b.queue != queue);
            }
            tracing::debug!(queue, "auto-delete queue removed");
        }
    }
}

enum Next {
    Delivered(Delivery),
    Empty(Arc<Notify>),
}

#[derive(Default)]
struct ClientShared {
    closed: AtomicBool,
    semaphores: Mutex<Vec<Weak<Semaphore>>>,
}

impl ClientShared {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for semaphore in lock(&self.semaphores).drain(..) {
            if let Some(semaphore) = semaphore.upgrade() {
                semaphore.close();
            }
        }
    }
}

struct MemoryAcker {
    broker: InMemoryBroker,
    client: Arc<ClientShared>,
    queue: String,
    restarts: u64,
    _permit: Option<OwnedSemaphorePermit>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn settle(self: Box<Self>, envelope: MessageEnvelope, settlement: Settlement) -> Result<()> {
        self.broker.settle(&self, envelope, settlement)
    }

    fn abandon(self: Box<Self>, envelope: MessageEnvelope) {
        if let Err(e) = self.broker.settle(&self, envelope, Settlement::Requeue) {
            tracing::debug!(queue = %self.queue, error = %e, "abandoned delivery not requeued through the channel");
        }
    }
}

/// Decrements the consumer count of a queue when its stream is dropped.
struct ConsumerGuard {
    broker: InMemoryBroker,
    queue: String,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.broker.release_consumer(&self.queue);
    }
}

struct ConsumeState {
    broker: InMemoryBroker,
    client: Arc<ClientShared>,
    queue: String,
    permits: Arc<Semaphore>,
    done: bool,
    _guard: ConsumerGuard,
}

impl ConsumeState {
    async fn next_delivery(&mut self) -> Result<Delivery> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| BrokerError::ChannelClosed)?;
        let mut permit = Some(permit);

        loop {
            let notify = match self.broker.try_deliver(&self.client, &self.queue, &mut permit)? {
                Next::Delivered(delivery) => return Ok(delivery),
                Next::Empty(notify) => notify,
            };

            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Next::Delivered(delivery) =
                self.broker.try_deliver(&self.client, &self.queue, &mut permit)?
            {
                return Ok(delivery);
            }
            notified.await;
        }
    }
}

/// A connection to an [`InMemoryBroker`].
///
/// Clones share the connection: disconnecting one disconnects all.
#[derive(Clone)]
pub struct InMemoryClient {
    broker: InMemoryBroker,
    shared: Arc<ClientShared>,
    prefetch_count: u16,
}

impl std::fmt::Debug for InMemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryClient")
            .field("open", &self.shared.is_open())
            .field("prefetch_count", &self.prefetch_count)
            .finish_non_exhaustive()
    }
}

impl InMemoryClient {
    /// The broker this client is connected to.
    pub fn broker(&self) -> &InMemoryBroker {
        &self.broker
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.is_open() {
            Ok(())
        } else {
            Err(BrokerError::ChannelClosed)
        }
    }
}

#[async_trait]
impl BrokerClient for InMemoryClient {
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<QueueHandle> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(BrokerError::PreconditionFailed(
                "queue name must not be empty".to_string(),
            ));
        }

        let mut state = self.broker.lock();
        if let Some(existing) = state.queues.get(name) {
            if existing.options != options {
                return Err(BrokerError::PreconditionFailed(format!(
                    "queue {name:?} already declared with different options"
                )));
            }
            return Ok(existing.handle(name));
        }

        tracing::debug!(queue = name, durable = options.durable, "declaring queue");
        let queue = QueueState::new(options);
        let handle = queue.handle(name);
        state.queues.insert(name.to_string(), queue);
        Ok(handle)
    }

    async fn declare_exchange(&self, name: &str, kind: ExchangeKind, durable: bool) -> Result<()> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(BrokerError::PreconditionFailed(
                "the default exchange cannot be declared".to_string(),
            ));
        }

        let mut state = self.broker.lock();
        if let Some(existing) = state.exchanges.get(name) {
            if existing.kind != kind || existing.durable != durable {
                return Err(BrokerError::PreconditionFailed(format!(
                    "exchange {name:?} already declared as {} (durable: {})",
                    existing.kind, existing.durable
                )));
            }
            return Ok(());
        }

        tracing::debug!(exchange = name, %kind, durable, "declaring exchange");
        state.exchanges.insert(
            name.to_string(),
            ExchangeState {
                kind,
                durable,
                bindings: Vec::new(),
            },
        );
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.ensure_open()?;
        if exchange.is_empty() {
            return Err(BrokerError::PreconditionFailed(
                "queues cannot be bound to the default exchange".to_string(),
            ));
        }

        let mut state = self.broker.lock();
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::QueueNotFound(queue.to_string()));
        }
        let exchange_state = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?;

        let binding = Binding {
            queue: queue.to_string(),
            routing_key: routing_key.to_string(),
        };
        if !exchange_state.bindings.contains(&binding) {
            tracing::debug!(queue, exchange, routing_key, "binding queue");
            exchange_state.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, message: MessageEnvelope) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        state.deliver(exchange, routing_key, message)?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        self.ensure_open()?;
        {
            let mut state = self.broker.lock();
            let queue_state = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
            queue_state.consumers += 1;
        }

        let permits = match self.prefetch_count {
            0 => Semaphore::MAX_PERMITS,
            n => usize::from(n),
        };
        let permits = Arc::new(Semaphore::new(permits));
        lock(&self.shared.semaphores).push(Arc::downgrade(&permits));

        tracing::debug!(queue, consumer_tag, prefetch = self.prefetch_count, "consumer started");

        let state = ConsumeState {
            broker: self.broker.clone(),
            client: Arc::clone(&self.shared),
            queue: queue.to_string(),
            permits,
            done: false,
            _guard: ConsumerGuard {
                broker: self.broker.clone(),
                queue: queue.to_string(),
            },
        };

        let deliveries = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            let next = state.next_delivery().await;
            if next.is_err() {
                state.done = true;
            }
            Some((next, state))
        });
        Ok(Box::pin(deliveries))
    }

    async fn disconnect(&self) {
        if self.shared.is_open() {
            self.shared.close();
            self.broker.lock().wake_all();
            tracing::debug!("in-memory client disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.is_open()
    }
}
