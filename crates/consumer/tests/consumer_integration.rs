//! Integration tests: consumers running against the in-memory broker.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use broker::{BrokerClient, BrokerClientExt, InMemoryBroker, MessageEnvelope};
use common::{OrderId, ProductId};
use consumer::{
    ConsumerError, ConsumerSettings, FanoutConsumer, Handler, HandlerError, RetryPolicy,
    ServiceContext, ShutdownSignal,
};
use events::{OrderCreated, ProductUpdated};

const QUEUE: &str = "order_created_queue";

fn context(broker: &InMemoryBroker, service: &str, prefetch: u16, grace: Duration) -> ServiceContext {
    let client = broker.client(prefetch).unwrap();
    ServiceContext::new(service, Arc::new(client), ShutdownSignal::new()).with_settings(
        ConsumerSettings {
            retry: RetryPolicy::default(),
            shutdown_grace: grace,
        },
    )
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn order(order_id: i64) -> OrderCreated {
    OrderCreated::new(OrderId::new(order_id), ProductId::new(1), 2)
}

#[derive(Clone, Default)]
struct Recording {
    seen: Arc<Mutex<Vec<OrderCreated>>>,
}

#[async_trait]
impl Handler<OrderCreated> for Recording {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn handle(&self, event: OrderCreated, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct AlwaysFails {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Handler<OrderCreated> for AlwaysFails {
    fn name(&self) -> &'static str {
        "always_fails"
    }

    async fn handle(&self, _event: OrderCreated, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::failed("downstream unavailable"))
    }
}

#[derive(Clone, Default)]
struct Panics {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Handler<OrderCreated> for Panics {
    fn name(&self) -> &'static str {
        "panics"
    }

    async fn handle(&self, _event: OrderCreated, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("handler bug");
    }
}

#[derive(Clone)]
struct Slow {
    delay: Duration,
    started: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl Slow {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Arc::default(),
            finished: Arc::default(),
        }
    }
}

#[async_trait]
impl Handler<OrderCreated> for Slow {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn handle(&self, _event: OrderCreated, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        self.started.store(true, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
    done: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler<OrderCreated> for ConcurrencyProbe {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn handle(&self, _event: OrderCreated, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.done.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_successful_handler_acks_exactly_once() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "inventory", 10, Duration::from_secs(1));
    let handler = Recording::default();
    let seen = Arc::clone(&handler.seen);

    let running = tokio::spawn(ctx.consumer(QUEUE, handler).run());
    eventually("queue declared", || broker.consumer_count(QUEUE) == 1).await;

    let event = order(7);
    ctx.publisher().send(QUEUE, &event).await.unwrap();
    eventually("message acked", || broker.acked_count(QUEUE) == 1).await;

    assert_eq!(seen.lock().unwrap().as_slice(), &[event][..]);
    assert_eq!(broker.unacked_count(QUEUE), 0);
    assert_eq!(broker.queue_depth(QUEUE), 0);

    ctx.shutdown().trigger();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failing_handler_is_retried_then_dead_lettered() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "inventory", 10, Duration::from_secs(1));
    let handler = AlwaysFails::default();
    let calls = Arc::clone(&handler.calls);

    let running = tokio::spawn(ctx.consumer(QUEUE, handler).run());
    eventually("queue declared", || broker.consumer_count(QUEUE) == 1).await;

    ctx.publisher().send(QUEUE, &order(1)).await.unwrap();
    eventually("dead-lettered", || broker.dead_lettered(QUEUE).len() == 1).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(broker.dead_lettered(QUEUE)[0].retry_count, 3);
    assert_eq!(broker.acked_count(QUEUE), 0);
    assert_eq!(broker.queue_depth(QUEUE), 0);

    ctx.shutdown().trigger();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_message_is_dead_lettered_and_consumer_keeps_running() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "inventory", 10, Duration::from_secs(1));
    let handler = Recording::default();
    let seen = Arc::clone(&handler.seen);

    let running = tokio::spawn(ctx.consumer(QUEUE, handler).run());
    eventually("queue declared", || broker.consumer_count(QUEUE) == 1).await;

    ctx.client()
        .publish("", QUEUE, MessageEnvelope::json(br#"{"order_id":"one"}"#.to_vec()))
        .await
        .unwrap();
    eventually("dead-lettered", || broker.dead_lettered(QUEUE).len() == 1).await;
    assert_eq!(broker.dead_lettered(QUEUE)[0].retry_count, 3);
    assert!(seen.lock().unwrap().is_empty());

    ctx.publisher().send(QUEUE, &order(2)).await.unwrap();
    eventually("valid message handled", || broker.acked_count(QUEUE) == 1).await;
    assert_eq!(seen.lock().unwrap().len(), 1);

    ctx.shutdown().trigger();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_non_json_body_is_dead_lettered_and_consumer_keeps_running() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "inventory", 10, Duration::from_secs(1));
    let handler = Recording::default();
    let seen = Arc::clone(&handler.seen);

    let running = tokio::spawn(ctx.consumer(QUEUE, handler).run());
    eventually("queue declared", || broker.consumer_count(QUEUE) == 1).await;

    ctx.client()
        .publish("", QUEUE, MessageEnvelope::json(b"not json".to_vec()))
        .await
        .unwrap();
    eventually("dead-lettered", || broker.dead_lettered(QUEUE).len() == 1).await;
    let dead = &broker.dead_lettered(QUEUE)[0];
    assert_eq!(dead.body, b"not json");
    assert_eq!(dead.retry_count, 3);
    assert!(seen.lock().unwrap().is_empty());
    assert!(!running.is_finished());
    assert_eq!(broker.consumer_count(QUEUE), 1);

    ctx.publisher().send(QUEUE, &order(4)).await.unwrap();
    eventually("valid message handled", || broker.acked_count(QUEUE) == 1).await;
    assert_eq!(seen.lock().unwrap().len(), 1);

    ctx.shutdown().trigger();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_panicking_handler_counts_as_failure() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "inventory", 10, Duration::from_secs(1));
    let handler = Panics::default();
    let calls = Arc::clone(&handler.calls);

    let running = tokio::spawn(ctx.consumer(QUEUE, handler).run());
    eventually("queue declared", || broker.consumer_count(QUEUE) == 1).await;

    ctx.publisher().send(QUEUE, &order(3)).await.unwrap();
    eventually("dead-lettered", || broker.dead_lettered(QUEUE).len() == 1).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(broker.acked_count(QUEUE), 0);

    ctx.shutdown().trigger();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_requeues_handler_exceeding_grace() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "report", 10, Duration::from_millis(50));
    let handler = Slow::new(Duration::from_secs(30));
    let started = Arc::clone(&handler.started);
    let finished = Arc::clone(&handler.finished);

    let running = tokio::spawn(ctx.consumer(QUEUE, handler).run());
    eventually("queue declared", || broker.consumer_count(QUEUE) == 1).await;
    ctx.publisher().send(QUEUE, &order(4)).await.unwrap();
    eventually("handler started", || started.load(Ordering::SeqCst)).await;

    ctx.shutdown().trigger();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(!finished.load(Ordering::SeqCst));
    assert_eq!(broker.acked_count(QUEUE), 0);
    let requeued = broker.peek(QUEUE);
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].retry_count, 0);
    assert!(broker.dead_lettered(QUEUE).is_empty());
}

#[tokio::test]
async fn test_shutdown_acks_handler_finishing_within_grace() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "email", 10, Duration::from_secs(2));
    let handler = Slow::new(Duration::from_millis(100));
    let started = Arc::clone(&handler.started);

    let running = tokio::spawn(ctx.consumer(QUEUE, handler).run());
    eventually("queue declared", || broker.consumer_count(QUEUE) == 1).await;
    ctx.publisher().send(QUEUE, &order(5)).await.unwrap();
    eventually("handler started", || started.load(Ordering::SeqCst)).await;

    ctx.shutdown().trigger();
    running.await.unwrap().unwrap();

    assert_eq!(broker.acked_count(QUEUE), 1);
    assert_eq!(broker.queue_depth(QUEUE), 0);
}

#[tokio::test]
async fn test_concurrency_is_bounded_by_prefetch() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "inventory", 2, Duration::from_secs(1));
    let probe = ConcurrencyProbe::default();
    let max = Arc::clone(&probe.max);
    let done = Arc::clone(&probe.done);

    let running = tokio::spawn(ctx.consumer(QUEUE, probe).run());
    eventually("queue declared", || broker.consumer_count(QUEUE) == 1).await;
    for i in 0..6 {
        ctx.publisher().send(QUEUE, &order(i)).await.unwrap();
    }
    eventually("all handled", || done.load(Ordering::SeqCst) == 6).await;

    let max = max.load(Ordering::SeqCst);
    assert!(max <= 2, "observed {max} concurrent handlers");
    assert!(max >= 1);

    ctx.shutdown().trigger();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_loss_stops_consumer_with_error() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "inventory", 10, Duration::from_secs(1));

    let running = tokio::spawn(ctx.consumer(QUEUE, Recording::default()).run());
    eventually("queue declared", || broker.consumer_count(QUEUE) == 1).await;

    broker.set_reachable(false);

    let result = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ConsumerError::ConnectionLost { .. })));
}

#[derive(Clone, Default)]
struct ProductRecorder {
    seen: Arc<Mutex<Vec<ProductUpdated>>>,
}

#[async_trait]
impl Handler<ProductUpdated> for ProductRecorder {
    fn name(&self) -> &'static str {
        "product_recorder"
    }

    async fn handle(&self, event: ProductUpdated, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push(event);
        Ok(())
    }
}

#[tokio::test]
async fn test_fanout_delivers_to_every_subscribed_service() {
    let broker = InMemoryBroker::new();
    let services = ["cache", "search", "analytics"];
    let mut contexts = Vec::new();
    let mut recorders = Vec::new();
    let mut running = Vec::new();

    for service in services {
        let ctx = context(&broker, service, 10, Duration::from_secs(1));
        let recorder = ProductRecorder::default();
        recorders.push(Arc::clone(&recorder.seen));
        let consumer = ctx.fanout_consumer("product_updates", recorder).unwrap();
        assert_eq!(consumer.queue(), format!("{service}_product_updates_queue"));
        running.push(tokio::spawn(consumer.run()));
        contexts.push(ctx);
    }
    eventually("all queues bound", || broker.bindings("product_updates").len() == 3).await;

    let update = ProductUpdated::new(ProductId::new(1), "Widget", 42);
    contexts[0]
        .publisher()
        .broadcast("product_updates", &update)
        .await
        .unwrap();

    for service in services {
        let queue = format!("{service}_product_updates_queue");
        eventually("fanout copy acked", || broker.acked_count(&queue) == 1).await;
    }
    for seen in &recorders {
        assert_eq!(seen.lock().unwrap().as_slice(), &[update.clone()][..]);
    }

    for ctx in &contexts {
        ctx.shutdown().trigger();
    }
    for handle in running {
        handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_fanout_rejects_invalid_queue_names() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "cache", 10, Duration::from_secs(1));

    let same = FanoutConsumer::with_queue(ctx.clone(), "product_updates", "product_updates", ProductRecorder::default());
    assert!(matches!(same, Err(ConsumerError::InvalidQueue(_))));

    let empty = FanoutConsumer::with_queue(ctx.clone(), "product_updates", "", ProductRecorder::default());
    assert!(matches!(empty, Err(ConsumerError::InvalidQueue(_))));

    let no_exchange = FanoutConsumer::with_queue(ctx, "", "cache_queue", ProductRecorder::default());
    assert!(matches!(no_exchange, Err(ConsumerError::InvalidQueue(_))));
}

#[tokio::test]
async fn test_fanout_consumer_declares_durable_queue() {
    let broker = InMemoryBroker::new();
    let ctx = context(&broker, "search", 10, Duration::from_secs(1));

    let running = tokio::spawn(
        ctx.fanout_consumer("product_updates", ProductRecorder::default())
            .unwrap()
            .run(),
    );
    eventually("bound", || broker.bindings("product_updates").len() == 1).await;

    ctx.client().declare_durable_queue("search_product_updates_queue").await.unwrap();
    assert_eq!(
        broker.bindings("product_updates"),
        vec![("search_product_updates_queue".to_string(), String::new())]
    );

    ctx.shutdown().trigger();
    running.await.unwrap().unwrap();
}
