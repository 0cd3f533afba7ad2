// Capture replay tool: feeds a recorded message stream through the
// aggregation engine and dumps the final state as JSON.

use anyhow::Result;
use flowstats::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// One line of a capture file.
#[derive(Deserialize)]
struct CaptureRecord {
    channel: String,
    message: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamSummary {
    samples: usize,
    last: Option<models::FlowStatsSample>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplaySummary {
    global_current: models::GlobalSnapshot,
    global_shadow: models::GlobalSnapshot,
    last_flow_time: f64,
    streams: BTreeMap<String, StreamSummary>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app_config = if std::env::var("CONFIG_FILE").is_ok() {
        config::AppConfig::load()?
    } else {
        config::AppConfig::default()
    };

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: flowstats <capture.jsonl>"))?;

    let loader = loader::StatsLoader::new(app_config.loader_config());
    let mut events = loader.subscribe();
    let feed = loader.start();

    let pushed = Arc::new(AtomicU64::new(0));
    let progress = {
        let pushed = pushed.clone();
        let interval_secs = app_config.monitoring.stats_log_interval_secs;
        tokio::spawn(async move {
            let mut tick =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tick.tick().await;
            loop {
                tick.tick().await;
                tracing::info!(
                    messages_pushed = pushed.load(Ordering::Relaxed),
                    "replay progress"
                );
            }
        })
    };

    let file = std::fs::File::open(&path)?;
    for (lineno, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: CaptureRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "skipping malformed capture record");
                continue;
            }
        };
        let payload = record.message.to_string();
        let result = match record.channel.as_str() {
            "global" => feed.push_global(payload).await,
            "flow" => feed.push_flow(payload).await,
            other => {
                tracing::warn!(line = lineno + 1, channel = other, "skipping unknown channel");
                continue;
            }
        };
        if result.is_err() {
            anyhow::bail!("ingest task went away mid-replay");
        }
        pushed.fetch_add(1, Ordering::Relaxed);
    }

    // The consumer runs behind the channel; wait for the event stream to go
    // quiet before reading the final state.
    let mut applied: u64 = 0;
    loop {
        match tokio::time::timeout(tokio::time::Duration::from_millis(200), events.recv()).await {
            Ok(Ok(_)) => applied += 1,
            Ok(Err(broadcast::error::RecvError::Lagged(n))) => applied += n,
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            Err(_) => break,
        }
    }

    progress.abort();
    loader.stop();

    let streams = loader
        .flow_history()
        .into_iter()
        .map(|(key, samples)| {
            let summary = StreamSummary {
                samples: samples.len(),
                last: samples.last().cloned(),
            };
            (key, summary)
        })
        .collect();
    let summary = ReplaySummary {
        global_current: loader.global_current(),
        global_shadow: loader.global_shadow(),
        last_flow_time: loader.last_flow_stats_time(),
        streams,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    tracing::info!(
        messages_pushed = pushed.load(Ordering::Relaxed),
        updates_applied = applied,
        "replay complete"
    );
    Ok(())
}
