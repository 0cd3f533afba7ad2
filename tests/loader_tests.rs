// Facade lifecycle: channel wiring, events, restart semantics, reset

mod common;

use common::{flow_message, global_message};
use flowstats::ingest::FeedError;
use flowstats::loader::{LoaderConfig, StatsEvent, StatsLoader};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::{Duration, sleep, timeout};

async fn next_event(rx: &mut broadcast::Receiver<StatsEvent>) -> StatsEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for stats event")
        .expect("events channel closed")
}

#[tokio::test]
async fn feed_delivers_messages_to_both_aggregators() {
    let loader = StatsLoader::new(LoaderConfig::default());
    let mut events = loader.subscribe();
    let feed = loader.start();

    feed.push_global(global_message(&[("m_cpu_util", "11.0")]))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, StatsEvent::GlobalUpdated);
    assert_eq!(loader.global_current()["m_cpu_util"], "11.0");

    feed.push_flow(flow_message(1, 1, json!({"s1": {"tx_pkts": {"0": 100}}})))
        .await
        .unwrap();
    feed.push_flow(flow_message(1, 2, json!({"s1": {"tx_pkts": {"0": 160}}})))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, StatsEvent::FlowUpdated);
    assert_eq!(next_event(&mut events).await, StatsEvent::FlowUpdated);

    let history = loader.history_for("s1").expect("stream tracked");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].tx_pkts[&0], 60);
    assert_eq!(loader.last_flow_stats_time(), 2.0);
    assert!(loader.history_for("nope").is_none());
}

#[tokio::test]
async fn discarded_messages_emit_no_events() {
    let loader = StatsLoader::new(LoaderConfig::default());
    let mut events = loader.subscribe();

    // Handlers are callable directly; the ingest task just forwards to them.
    loader.handle_global(&global_message(&[("m_rx_bps", "5")])); // no sentinel
    loader.handle_flow("{broken");
    loader.handle_flow(&flow_message(1, 1, json!({"s1": {"tx_pkts": {"0": 1}}})));
    loader.handle_flow(&flow_message(1, 1, json!({"s1": {"tx_pkts": {"0": 2}}}))); // dup

    assert_eq!(events.recv().await.unwrap(), StatsEvent::FlowUpdated);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn restart_replaces_the_feed_and_clears_state() {
    let loader = StatsLoader::new(LoaderConfig::default());
    let mut events = loader.subscribe();

    let first_feed = loader.start();
    first_feed
        .push_global(global_message(&[("m_cpu_util", "11.0")]))
        .await
        .unwrap();
    next_event(&mut events).await;

    let second_feed = loader.start();
    assert!(loader.global_current().is_empty());
    assert!(loader.flow_history().is_empty());
    assert_eq!(loader.last_flow_stats_time(), 0.0);

    // The replaced task's channels close once its abort lands.
    let mut closed = false;
    for _ in 0..200 {
        match first_feed.offer_global(global_message(&[("m_cpu_util", "1.0")])) {
            Err(FeedError::Closed) => {
                closed = true;
                break;
            }
            _ => sleep(Duration::from_millis(10)).await,
        }
    }
    assert!(closed, "old feed should close after restart");

    second_feed
        .push_global(global_message(&[("m_cpu_util", "22.0")]))
        .await
        .unwrap();
    next_event(&mut events).await;
    assert_eq!(loader.global_current()["m_cpu_util"], "22.0");
}

#[tokio::test]
async fn stop_closes_the_feed_but_keeps_state_readable() {
    let loader = StatsLoader::new(LoaderConfig::default());
    let mut events = loader.subscribe();
    let feed = loader.start();

    feed.push_global(global_message(&[("m_cpu_util", "7.5")]))
        .await
        .unwrap();
    next_event(&mut events).await;

    loader.stop();
    let mut closed = false;
    for _ in 0..200 {
        match feed.offer_global(global_message(&[("m_cpu_util", "8.0")])) {
            Err(FeedError::Closed) => {
                closed = true;
                break;
            }
            _ => sleep(Duration::from_millis(10)).await,
        }
    }
    assert!(closed, "feed should close after stop");
    assert_eq!(loader.global_current()["m_cpu_util"], "7.5");
}

#[tokio::test]
async fn reset_rebases_global_and_flow_together() {
    let loader = StatsLoader::new(LoaderConfig::default());
    loader.handle_global(&global_message(&[("m_cpu_util", "10.0")]));
    loader.handle_global(&global_message(&[("m_cpu_util", "20.0")]));
    loader.handle_flow(&flow_message(1, 1, json!({"s1": {"tx_pkts": {"0": 100}}})));
    loader.handle_flow(&flow_message(1, 2, json!({"s1": {"tx_pkts": {"0": 150}}})));

    loader.reset();

    assert_eq!(loader.global_shadow()["m_cpu_util"], "20.0");
    let history = loader.history_for("s1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].tx_pkts[&0], 50);

    // Same raw counters as before the reset: zero new traffic measured.
    loader.handle_flow(&flow_message(1, 3, json!({"s1": {"tx_pkts": {"0": 150}}})));
    let history = loader.history_for("s1").unwrap();
    assert_eq!(history.last().unwrap().tx_pkts[&0], 0);
}
