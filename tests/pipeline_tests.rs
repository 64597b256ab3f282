//! Integration tests for the ingest → change feed → fan-out path

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use weather_telemetry::api::ConnectionHub;
use weather_telemetry::{
    fleet_events, ChangePipeline, DispatchConfig, EventType, MemoryBackend, TelemetryContext,
    WeatherEvent,
};

async fn drain(rx: &mut mpsc::Receiver<Vec<u8>>, expected: usize) -> Vec<WeatherEvent> {
    let mut events = Vec::new();
    while events.len() < expected {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(bytes)) => events.push(serde_json::from_slice(&bytes).unwrap()),
            _ => break,
        }
    }
    events
}

fn sorted_keys(list: &[WeatherEvent]) -> Vec<(String, String)> {
    let mut keys: Vec<(String, String)> = list
        .iter()
        .map(|e| (e.key().partition_key, e.key().sort_key))
        .collect();
    keys.sort();
    keys
}

#[tokio::test]
async fn test_every_session_receives_every_ingested_event() {
    let context = TelemetryContext::new(Arc::new(MemoryBackend::new()));
    let hub = Arc::new(ConnectionHub::new());

    let (id_a, mut rx_a) = hub.attach();
    let (id_b, mut rx_b) = hub.attach();
    context.sessions.register(&id_a).await.unwrap();
    context.sessions.register(&id_b).await.unwrap();

    let dispatcher = Arc::new(context.dispatcher(hub.clone(), DispatchConfig::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = tokio::spawn(ChangePipeline::new(dispatcher).run(context.store.subscribe_changes(), shutdown_rx));

    let events = fleet_events(1000, 10, chrono::Utc::now());
    let report = context.ingest.ingest_all(&events).await;
    assert_eq!(report.chunks, 2);
    assert!(report.is_complete());

    let received_a = drain(&mut rx_a, events.len()).await;
    let received_b = drain(&mut rx_b, events.len()).await;
    assert_eq!(sorted_keys(&received_a), sorted_keys(&events));
    assert_eq!(sorted_keys(&received_b), sorted_keys(&events));

    shutdown_tx.send(true).unwrap();
    pipeline.await.unwrap();
}

#[tokio::test]
async fn test_dead_session_does_not_block_live_one() {
    let context = TelemetryContext::new(Arc::new(MemoryBackend::new()));
    let hub = Arc::new(ConnectionHub::new());

    let (live, mut rx_live) = hub.attach();
    context.sessions.register(&live).await.unwrap();
    // Registered but never attached: every push to it fails
    context.sessions.register("conn_stale").await.unwrap();

    let dispatcher = context.dispatcher(hub.clone(), DispatchConfig::default());
    let event = WeatherEvent::at_unix(7, 100, EventType::WindDirection, 180.0).unwrap();

    let report = dispatcher.dispatch(&[event.clone()], Duration::from_secs(5)).await.unwrap();
    assert_eq!(report.jobs, 2);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);

    assert_eq!(drain(&mut rx_live, 1).await, vec![event]);
    // Stale sessions stay registered
    assert_eq!(context.sessions.list_active().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_full_connection_buffer_is_abandoned_at_budget() {
    let context = TelemetryContext::new(Arc::new(MemoryBackend::new()));
    let hub = Arc::new(ConnectionHub::with_buffer(1));

    // Nobody reads this receiver, so the second push waits forever
    let (id, _rx) = hub.attach();
    context.sessions.register(&id).await.unwrap();

    let dispatcher = context.dispatcher(
        hub.clone(),
        DispatchConfig {
            time_budget: Duration::from_secs(2),
            max_in_flight: 1,
        },
    );
    let events: Vec<WeatherEvent> = (0..3)
        .map(|secs| WeatherEvent::at_unix(1, secs, EventType::Pressure, 1000.0).unwrap())
        .collect();

    let report = dispatcher.dispatch_default(&events).await.unwrap();
    assert!(report.timed_out);
    assert_eq!(report.jobs, 3);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.abandoned, 2);
}
