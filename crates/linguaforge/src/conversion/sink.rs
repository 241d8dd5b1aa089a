//! Line-by-line delivery of converter output.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Receives converter output as it is produced. Implementations must not
/// block; they run on the task reading the pipe.
pub trait OutputSink: Send + Sync {
    fn on_stdout_line(&self, task_id: Uuid, line: &str);
    fn on_stderr_line(&self, task_id: Uuid, line: &str);
}

/// Discards output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl OutputSink for NoopSink {
    fn on_stdout_line(&self, _task_id: Uuid, _line: &str) {}
    fn on_stderr_line(&self, _task_id: Uuid, _line: &str) {}
}

/// Logs each line at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn on_stdout_line(&self, task_id: Uuid, line: &str) {
        tracing::debug!(task_id = %task_id, stream = "stdout", "{}", line);
    }

    fn on_stderr_line(&self, task_id: Uuid, line: &str) {
        tracing::debug!(task_id = %task_id, stream = "stderr", "{}", line);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of converter output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutputEvent {
    pub task_id: Uuid,
    pub stream: OutputStream,
    pub line: String,
    pub timestamp: DateTime<Utc>,
}

/// Fans output out to any number of subscribers.
#[derive(Clone)]
pub struct BroadcastSink {
    sender: Arc<broadcast::Sender<ConversionOutputEvent>>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversionOutputEvent> {
        self.sender.subscribe()
    }

    fn send(&self, task_id: Uuid, stream: OutputStream, line: &str) {
        // No receivers is fine
        let _ = self.sender.send(ConversionOutputEvent {
            task_id,
            stream,
            line: line.to_string(),
            timestamp: Utc::now(),
        });
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl OutputSink for BroadcastSink {
    fn on_stdout_line(&self, task_id: Uuid, line: &str) {
        self.send(task_id, OutputStream::Stdout, line);
    }

    fn on_stderr_line(&self, task_id: Uuid, line: &str) {
        self.send(task_id, OutputStream::Stderr, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_sink_delivers_lines_in_order() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        let task_id = Uuid::new_v4();

        sink.on_stdout_line(task_id, "Converting");
        sink.on_stderr_line(task_id, "WARNING: font");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.stream, OutputStream::Stdout);
        assert_eq!(first.line, "Converting");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.stream, OutputStream::Stderr);
        assert_eq!(second.task_id, task_id);
    }

    #[test]
    fn test_broadcast_sink_without_subscribers() {
        let sink = BroadcastSink::default();
        sink.on_stdout_line(Uuid::new_v4(), "nobody listening");
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = ConversionOutputEvent {
            task_id: Uuid::nil(),
            stream: OutputStream::Stderr,
            line: "x".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("taskId").is_some());
        assert_eq!(json["stream"], "stderr");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_sink_logs_lines_with_stream() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let task_id = Uuid::new_v4();
        tracing::subscriber::with_default(subscriber, || {
            TracingSink.on_stdout_line(task_id, "Converting");
            TracingSink.on_stderr_line(task_id, "Missing -srcLang parameter");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("stream=\"stdout\""));
        assert!(output.contains("Converting"));
        assert!(output.contains("stream=\"stderr\""));
        assert!(output.contains(&task_id.to_string()));
    }
}
