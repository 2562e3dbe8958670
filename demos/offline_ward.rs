// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline ward round example.
//!
//! Demonstrates:
//! 1. Installing the app shell and activating a cache version
//! 2. Reads served from the network, then from cache once the ward Wi-Fi drops
//! 3. Vitals recorded offline landing in the encrypted mutation queue
//! 4. Replay when connectivity returns, reported to open views
//! 5. A push notification and its click
//! 6. Displaying metrics
//!
//! The network and the remote table store are simulated in-process, so no
//! external services are needed.
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=ward_sync=debug cargo run --example offline_ward
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use ward_sync::{
    EngineConfig, FetchError, Fetcher, MutationOp, OfflineEngine, RemoteError, RemoteWriter,
    Request, ResponseSnapshot, WriteOutcome,
};

/// Simulated ward Wi-Fi: answers everything until switched off.
#[derive(Default)]
struct WardNetwork {
    down: AtomicBool,
}

#[async_trait]
impl Fetcher for WardNetwork {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, FetchError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(FetchError::Network("ward Wi-Fi unavailable".into()));
        }
        let body = match request.url.path() {
            "/" | "/index.html" => "<!doctype html><div id=app></div>".to_string(),
            path => format!("{{\"path\":\"{path}\",\"fetched\":true}}"),
        };
        Ok(ResponseSnapshot::new(200, body))
    }
}

/// Simulated remote table store that prints what it receives.
#[derive(Default)]
struct PrintingRemote {
    down: AtomicBool,
}

impl PrintingRemote {
    fn accept(&self, op: &str, table: &str, payload: &Value) -> Result<(), RemoteError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("remote unreachable".into()));
        }
        println!("   ⇢ remote {op} {table} {payload}");
        Ok(())
    }
}

#[async_trait]
impl RemoteWriter for PrintingRemote {
    async fn insert(&self, table: &str, payload: &Value) -> Result<(), RemoteError> {
        self.accept("insert", table, payload)
    }

    async fn update(
        &self,
        table: &str,
        key_field: &str,
        key_value: &Value,
        payload: &Value,
    ) -> Result<(), RemoteError> {
        self.accept(&format!("update where {key_field}={key_value}"), table, payload)
    }

    async fn upsert(&self, table: &str, payload: &Value) -> Result<(), RemoteError> {
        self.accept("upsert", table, payload)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ward_sync=info")),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║              ward-sync: Offline Ward Round                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Build, install and activate
    // ─────────────────────────────────────────────────────────────────────────
    let config = EngineConfig {
        app_origin: "https://ward.example.org".into(),
        data_host: Some("abc.supabase.co".into()),
        ..Default::default()
    };
    let network = Arc::new(WardNetwork::default());
    let remote = Arc::new(PrintingRemote::default());

    let engine = Arc::new(
        OfflineEngine::builder(config)
            .fetcher(network.clone())
            .remote(remote.clone())
            .build()
            .await?,
    );
    let mut messages = engine.subscribe();
    let view = engine
        .clients()
        .register("https://ward.example.org/patients/17".parse()?);

    engine.start().await?;
    engine.unlock("session-token-for-nurse-4").await?;
    println!("📦 Engine {} (view {view} attached)\n", engine.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Reads, online then offline
    // ─────────────────────────────────────────────────────────────────────────
    let vitals = Request::get("https://abc.supabase.co/rest/v1/vitals?patient=eq.17")?;
    if let Some(served) = engine.fetch(&vitals).await {
        println!("📡 Online read: {} from {}", served.response.status, served.source.as_str());
    }

    network.down.store(true, Ordering::SeqCst);
    remote.down.store(true, Ordering::SeqCst);
    engine.set_online(false).await;

    if let Some(served) = engine.fetch(&vitals).await {
        println!("📴 Offline read: {} from {}", served.response.status, served.source.as_str());
    }
    let chart = Request::navigation("https://ward.example.org/patients/17/chart")?;
    if let Some(served) = engine.fetch(&chart).await {
        println!("📴 Offline navigation: {} from {}\n", served.response.status, served.source.as_str());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Writes while offline
    // ─────────────────────────────────────────────────────────────────────────
    for (fc, spo2) in [(82, 97), (88, 95)] {
        let outcome = engine
            .write(
                "vitals",
                MutationOp::Insert,
                json!({"patient": 17, "fc": fc, "spo2": spo2}),
                Some("nurse-4".into()),
            )
            .await?;
        if let WriteOutcome::Queued(entry) = outcome {
            println!("📝 Queued {} {} ({})", entry.operation, entry.table, entry.id);
        }
    }
    engine
        .write(
            "medications",
            MutationOp::Update,
            json!({"id": "rx-9", "status": "administered"}),
            Some("nurse-4".into()),
        )
        .await?;
    println!("   {} mutations pending\n", engine.pending_count().await);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Reconnect and replay
    // ─────────────────────────────────────────────────────────────────────────
    network.down.store(false, Ordering::SeqCst);
    remote.down.store(false, Ordering::SeqCst);
    println!("🔌 Connectivity restored");
    if let Some(result) = engine.set_online(true).await {
        println!(
            "🔄 Replay: synced={} failed={} discarded={} in {:?}",
            result.synced, result.failed, result.discarded, result.duration
        );
    }
    while let Ok(message) = messages.try_recv() {
        println!("   ✉ view message: {}", serde_json::to_string(&message)?);
    }
    println!();

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Push notification
    // ─────────────────────────────────────────────────────────────────────────
    let push = br#"{"title":"Deterioration alert","body":"Bed 17 NEWS2 = 7","critical":true,"url":"/patients/17"}"#;
    if let Some(notification) = engine.handle_push(push).await {
        println!("🔔 {}: {}", notification.title, notification.body);
        if let Some(outcome) = engine.notification_click(&notification.url) {
            println!("   click → {outcome:?}\n");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics and shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("📊 Engine counters: {}", serde_json::to_string(&engine.metrics().snapshot())?);
    println!("📊 Facade metrics:");
    dump_metrics(&snapshotter);

    engine.shutdown().await;

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, counters and gauges first
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key
            .labels()
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };
        let rendered = match value {
            DebugValue::Counter(v) => format!("{v}"),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("count={} sum={:.4}", samples.len(), sum)
            }
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {line}");
    }
}
