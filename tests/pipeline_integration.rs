//! End-to-end tests over the in-process broker
//!
//! raw message ──► gateway ──► store + display topic + exchange ──► consumer

use std::time::Duration;

use bytes::Bytes;
use drone_gateway::codec::canonical::{decode_record, parse_display};
use drone_gateway::config::{GatewayConfig, TransportBackend};
use drone_gateway::services::{Service, ServiceStatus};
use drone_gateway::transport::{InboundMessage, MemoryBroker, PubSub, TopicExchange};
use drone_gateway::{ConsumerNode, Gateway, Region, Transports};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

fn memory_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.transport.backend = TransportBackend::Memory;
    config.aggregator.enabled = false;
    config
}

async fn recv(rx: &mut mpsc::Receiver<InboundMessage>) -> InboundMessage {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

/// Poll until `check` holds or two seconds pass
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn publish_raw(broker: &MemoryBroker, region: &str, body: &str) {
    PubSub::publish(
        broker,
        &format!("drones/{}/dados", region),
        Bytes::from(body.to_string()),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_reading_reaches_store_and_both_sinks() {
    let broker = MemoryBroker::new();
    let gateway = Gateway::with_transports(memory_config(), Transports::memory(broker.clone()));
    gateway.start().await.unwrap();

    let (display_tx, mut display_rx) = mpsc::channel(8);
    let _display = PubSub::subscribe(&broker, "gateway/dados_processados/+", display_tx)
        .await
        .unwrap();
    let (record_tx, mut record_rx) = mpsc::channel(8);
    let _records = TopicExchange::bind(&broker, "gateway_dados_topic", "dados.*", record_tx)
        .await
        .unwrap();

    publish_raw(&broker, "norte", "1013.25-500.10-25.30-60.10").await;

    let display = recv(&mut display_rx).await;
    assert_eq!(display.topic, "gateway/dados_processados/norte");
    assert_eq!(display.payload_str(), "[norte | 25.30 | 60.10 | 1013.25 | 500.10]");
    let fields = parse_display(&display.payload_str()).unwrap();
    assert_eq!(fields.region, Region::Norte);

    let record = recv(&mut record_rx).await;
    assert_eq!(record.topic, "dados.norte");
    let reading = decode_record(&record.payload_str()).unwrap();
    assert_eq!(reading.pressure(), 1013.25);
    assert_eq!(reading.radiation(), 500.10);

    assert_eq!(gateway.store().count_region(Region::Norte), 1);
    let stats = gateway.stats().snapshot();
    assert_eq!(stats.decoded, 1);
    eventually(|| gateway.stats().snapshot().bus.ok == 1).await;

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_malformed_messages_are_counted_and_dropped() {
    let broker = MemoryBroker::new();
    let gateway = Gateway::with_transports(memory_config(), Transports::memory(broker.clone()));
    gateway.start().await.unwrap();

    let (display_tx, mut display_rx) = mpsc::channel(8);
    let _display = PubSub::subscribe(&broker, "gateway/#", display_tx).await.unwrap();

    publish_raw(&broker, "sul", "(1000.00; 300.50; 18.20)").await;
    publish_raw(&broker, "leste", "{990.10, abc, 30.00, 55.50}").await;
    publish_raw(&broker, "centro", "1-2-3-4").await;
    publish_raw(&broker, "oeste", "1005.00#450.25#22.75#65.00").await;

    // only the valid oeste reading is republished
    let display = recv(&mut display_rx).await;
    assert_eq!(display.topic, "gateway/dados_processados/oeste");

    eventually(|| gateway.stats().snapshot().received == 4).await;
    let stats = gateway.stats().snapshot();
    assert_eq!(stats.decoded, 1);
    assert_eq!(stats.decode_failures.total, 3);
    assert_eq!(stats.decode_failures.field_count_mismatch, 1);
    assert_eq!(stats.decode_failures.numeric_parse_failure, 1);
    assert_eq!(stats.decode_failures.unknown_region, 1);
    assert_eq!(gateway.store().count_all(), 1);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_failing_sink_does_not_block_the_other() {
    let pubsub = MemoryBroker::new();
    let exchange = MemoryBroker::new();
    let transports = Transports {
        pubsub: std::sync::Arc::new(pubsub.clone()),
        exchange: std::sync::Arc::new(exchange.clone()),
    };
    let gateway = Gateway::with_transports(memory_config(), transports);
    gateway.start().await.unwrap();

    let (display_tx, mut display_rx) = mpsc::channel(8);
    let _display = PubSub::subscribe(&pubsub, "gateway/#", display_tx).await.unwrap();

    exchange.disconnect();
    publish_raw(&pubsub, "leste", "{990.10, 410.00, 30.00, 55.50}").await;

    recv(&mut display_rx).await;
    eventually(|| gateway.stats().snapshot().bus.failed == 1).await;
    let stats = gateway.stats().snapshot();
    assert_eq!(stats.direct.ok, 1);
    assert_eq!(gateway.store().count_region(Region::Leste), 1);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_consumer_binding_selects_region() {
    let broker = MemoryBroker::new();
    let mut config = memory_config();
    let gateway = Gateway::with_transports(config.clone(), Transports::memory(broker.clone()));
    gateway.start().await.unwrap();

    config.consumer.binding = "norte".to_string();
    let norte_only = ConsumerNode::with_transports(&config, Transports::memory(broker.clone())).unwrap();
    config.consumer.binding = "#".to_string();
    let everything = ConsumerNode::with_transports(&config, Transports::memory(broker.clone())).unwrap();

    assert_eq!(norte_only.consumer().binding(), "dados.norte");
    norte_only.start().unwrap();
    everything.start().unwrap();
    eventually(|| {
        norte_only.consumer().status() == ServiceStatus::Running
            && everything.consumer().status() == ServiceStatus::Running
    })
    .await;

    publish_raw(&broker, "norte", "1013.25-500.10-25.30-60.10").await;
    publish_raw(&broker, "sul", "(1000.00; 300.50; 18.20; 70.00)").await;

    eventually(|| everything.consumer().consumed() == 2).await;
    eventually(|| norte_only.consumer().consumed() == 1).await;
    assert_eq!(norte_only.consumer().store().count_region(Region::Norte), 1);
    assert_eq!(norte_only.consumer().store().count_region(Region::Sul), 0);

    norte_only.services().shutdown().await;
    everything.services().shutdown().await;
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_services() {
    let broker = MemoryBroker::new();
    let mut config = memory_config();
    config.aggregator.enabled = true;
    let gateway = Gateway::with_transports(config, Transports::memory(broker.clone()));
    gateway.start().await.unwrap();

    eventually(|| gateway.services().is_healthy()).await;
    gateway.shutdown().await;

    for (name, status) in gateway.services().status() {
        assert_eq!(status, ServiceStatus::Stopped, "{} still running", name);
    }
    assert!(!PubSub::is_connected(&broker));
}
