use broker::{BrokerClient, BrokerClientExt, InMemoryBroker, MessageEnvelope};
use criterion::{Criterion, criterion_group, criterion_main};
use futures_util::StreamExt;

fn envelope() -> MessageEnvelope {
    MessageEnvelope::json(br#"{"order_id":1,"product_id":1,"quantity":2}"#.to_vec())
}

fn bench_publish_default_exchange(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let broker = InMemoryBroker::new();
    let client = broker.client(10).unwrap();
    rt.block_on(client.declare_durable_queue("bench_queue")).unwrap();

    c.bench_function("broker/publish_default_exchange", |b| {
        b.iter(|| {
            rt.block_on(client.publish("", "bench_queue", envelope())).unwrap();
        });
        broker.drain("bench_queue");
    });
}

fn bench_publish_fanout_10_queues(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let broker = InMemoryBroker::new();
    let client = broker.client(10).unwrap();
    let queues: Vec<String> = (0..10).map(|i| format!("svc{i}_bench_queue")).collect();
    rt.block_on(async {
        for queue in &queues {
            client.subscribe_fanout(queue, "bench_fanout").await.unwrap();
        }
    });

    c.bench_function("broker/publish_fanout_10_queues", |b| {
        b.iter(|| {
            rt.block_on(client.publish("bench_fanout", "", envelope())).unwrap();
        });
        for queue in &queues {
            broker.drain(queue);
        }
    });
}

fn bench_publish_consume_ack(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("broker/publish_consume_ack_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let broker = InMemoryBroker::new();
                let client = broker.client(10).unwrap();
                client.declare_durable_queue("q").await.unwrap();
                let mut deliveries = client.consume("q", "bench").await.unwrap();

                for _ in 0..100 {
                    client.publish("", "q", envelope()).await.unwrap();
                    let delivery = deliveries.next().await.unwrap().unwrap();
                    delivery.ack().await.unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_publish_default_exchange,
    bench_publish_fanout_10_queues,
    bench_publish_consume_ack,
);
criterion_main!(benches);
