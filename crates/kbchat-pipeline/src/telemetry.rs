//! Telemetry sinks.
//!
//! `record` never blocks and never fails: sinks that do I/O hand events to a
//! background task and drop them when it cannot keep up.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use kbchat_core::config::{expand_path, TelemetrySettings};
use kbchat_core::traits::TelemetrySink;
use kbchat_core::types::TelemetryEvent;

pub const TELEMETRY_TARGET: &str = "kbchat::telemetry";

/// Emits each event as a structured log record.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: &TelemetryEvent) {
        let intent = event.intent.as_ref().map(|i| i.label.as_str()).unwrap_or("none");
        tracing::info!(
            target: TELEMETRY_TARGET,
            session_id = event.session_id.as_deref().unwrap_or(""),
            language = %event.detected_language,
            intent,
            refused = event.refused,
            unsafe_content = event.unsafe_content,
            documents = event.documents_used.len(),
            response_length = event.response_length,
            top_score = event.search_quality.top_score,
            good_quality = event.search_quality.has_good_quality,
            used_fallback = event.used_fallback,
            processing_time_ms = event.processing_time_ms,
            error = event.error.as_deref().unwrap_or(""),
            channel = event.channel.as_deref().unwrap_or(""),
            "chat turn"
        );
    }
}

/// Appends events to a file as JSON lines from a background task.
pub struct JsonlSink {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl JsonlSink {
    /// Must be called inside a Tokio runtime.
    pub fn spawn(path: PathBuf, capacity: usize) -> (Self, TelemetryGuard) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let writer = tokio::spawn(write_lines(path, rx, stop_rx));
        (Self { tx }, TelemetryGuard { writer: Some((stop_tx, writer)) })
    }
}

/// Owns the background writer of a [`JsonlSink`].
///
/// Call [`TelemetryGuard::shutdown`] before the runtime goes away; it stops
/// intake and waits until every queued event is on disk.
#[must_use]
pub struct TelemetryGuard {
    writer: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl TelemetryGuard {
    /// Guard for sinks without a background writer.
    pub fn none() -> Self { Self { writer: None } }

    pub async fn shutdown(mut self) {
        let Some((stop, writer)) = self.writer.take() else { return };
        let _ = stop.send(());
        if let Err(e) = writer.await {
            tracing::warn!(error = %e, "telemetry writer did not finish cleanly");
        }
    }
}

async fn write_lines(path: PathBuf, mut rx: mpsc::Receiver<TelemetryEvent>, mut stop: oneshot::Receiver<()>) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!(error = %e, path = %path.display(), "cannot create telemetry directory");
        }
    }
    let mut file = match tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "cannot open telemetry file; events will be dropped");
            return;
        }
    };
    let mut stop_seen = false;
    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            signal = &mut stop, if !stop_seen => {
                stop_seen = true;
                // A dropped guard is not a shutdown request.
                if signal.is_ok() { rx.close(); }
                continue;
            }
        };
        // `None` once every sender is gone or, after `close`, once the queue is drained.
        let Some(event) = event else { break };
        let mut line = match serde_json::to_vec(&event) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %e, "cannot serialize telemetry event");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = file.write_all(&line).await {
            tracing::warn!(error = %e, "telemetry write failed");
            continue;
        }
        if let Err(e) = file.flush().await {
            tracing::warn!(error = %e, "telemetry flush failed");
        }
    }
}

impl TelemetrySink for JsonlSink {
    fn record(&self, event: &TelemetryEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => tracing::debug!("telemetry channel full; event dropped"),
            Err(mpsc::error::TrySendError::Closed(_)) => tracing::debug!("telemetry writer gone; event dropped"),
        }
    }
}

pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self { Self { sinks } }
}

impl TelemetrySink for FanoutSink {
    fn record(&self, event: &TelemetryEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, event: &TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Log sink, plus a JSON-lines file when `telemetry.jsonl_path` is set.
///
/// The guard must be shut down on exit or queued events are lost.
pub fn sink_from_settings(settings: &TelemetrySettings) -> (Arc<dyn TelemetrySink>, TelemetryGuard) {
    let Some(path) = settings.jsonl_path.as_deref().filter(|p| !p.trim().is_empty()) else {
        return (Arc::new(TracingSink), TelemetryGuard::none());
    };
    let path = expand_path(path);
    tracing::info!(path = %path.display(), "writing telemetry as JSON lines");
    let (jsonl, guard) = JsonlSink::spawn(path, settings.channel_capacity);
    (Arc::new(FanoutSink::new(vec![Arc::new(TracingSink), Arc::new(jsonl)])), guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbchat_core::types::SearchQuality;

    fn event(question: &str) -> TelemetryEvent {
        TelemetryEvent {
            timestamp: chrono::Utc::now(),
            session_id: Some("s-1".into()),
            question: question.into(),
            detected_language: "en".into(),
            intent: None,
            refused: false,
            unsafe_content: false,
            documents_used: vec!["vitality.pdf".into()],
            response_length: 42,
            search_quality: SearchQuality::default(),
            used_fallback: false,
            processing_time_ms: 7,
            error: None,
            channel: None,
        }
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::default());
        let b = Arc::new(MemorySink::default());
        let fanout = FanoutSink::new(vec![a.clone(), b.clone(), Arc::new(TracingSink)]);
        fanout.record(&event("q"));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events()[0].question, "q");
    }

    #[tokio::test]
    async fn jsonl_sink_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let (sink, guard) = JsonlSink::spawn(path.clone(), 8);
        sink.record(&event("first"));
        sink.record(&event("second"));
        guard.shutdown().await;

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: TelemetryEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.question, "second");
        assert!(lines[0].contains("\"documentsUsed\":[\"vitality.pdf\"]"));
    }

    #[test]
    fn shutdown_flushes_events_before_a_one_shot_runtime_exits() {
        let dir = tempfile::tempdir().unwrap();
        for run in 0..10 {
            let path = dir.path().join(format!("run-{run}.jsonl"));
            let settings = TelemetrySettings {
                jsonl_path: Some(path.to_string_lossy().to_string()),
                ..TelemetrySettings::default()
            };
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let (sink, guard) = sink_from_settings(&settings);
                sink.record(&event("only"));
                guard.shutdown().await;
            });
            drop(runtime);

            let body = std::fs::read_to_string(&path).unwrap();
            assert_eq!(body.lines().count(), 1, "run {run} lost its event");
        }
    }

    #[tokio::test]
    async fn events_after_shutdown_are_dropped_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let (sink, guard) = JsonlSink::spawn(path.clone(), 8);
        sink.record(&event("before"));
        guard.shutdown().await;
        sink.record(&event("after"));

        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body.lines().count(), 1);
        assert!(body.contains("\"question\":\"before\""));
    }

    #[tokio::test]
    async fn tracing_only_settings_need_no_shutdown_work() {
        let (sink, guard) = sink_from_settings(&TelemetrySettings::default());
        sink.record(&event("logged"));
        guard.shutdown().await;
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = JsonlSink { tx };
        sink.record(&event("kept"));
        sink.record(&event("dropped"));
        assert_eq!(rx.recv().await.unwrap().question, "kept");
        assert!(rx.try_recv().is_err());
    }
}
