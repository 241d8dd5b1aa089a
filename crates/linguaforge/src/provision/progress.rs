use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::state::ProvisionState;

/// Events emitted while a project is provisioned.
#[derive(Debug, Clone)]
pub enum ProvisionEvent {
    State {
        state: ProvisionState,
    },
    AssetStored {
        draft_id: String,
        stored_rel_path: String,
    },
    Committed {
        project_id: Uuid,
    },
    Failed {
        state: ProvisionState,
        rolled_back: bool,
        error: String,
    },
}

pub trait ProvisionProgress: Send + Sync {
    fn report(&self, event: ProvisionEvent);
}

/// No-op reporter for tests and headless callers.
pub struct NoopProgress;

impl ProvisionProgress for NoopProgress {
    fn report(&self, _event: ProvisionEvent) {}
}

/// Serializable form of [`ProvisionEvent`] for UI bridges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionProgressEvent {
    /// Correlates events of one provisioning run.
    pub request_id: String,
    pub state: ProvisionState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bridges provisioning events onto a broadcast channel.
pub struct BroadcastProgress {
    request_id: String,
    sender: Arc<broadcast::Sender<ProvisionProgressEvent>>,
    current: std::sync::Mutex<ProvisionState>,
}

impl BroadcastProgress {
    pub fn new(request_id: &str, sender: Arc<broadcast::Sender<ProvisionProgressEvent>>) -> Self {
        Self {
            request_id: request_id.to_string(),
            sender,
            current: std::sync::Mutex::new(ProvisionState::Validating),
        }
    }

    /// Creates a reporter with its own channel and returns a receiver for it.
    pub fn channel(
        request_id: &str,
        capacity: usize,
    ) -> (Self, broadcast::Receiver<ProvisionProgressEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self::new(request_id, Arc::new(sender)), receiver)
    }

    fn current_state(&self) -> ProvisionState {
        self.current
            .lock()
            .map(|g| *g)
            .unwrap_or(ProvisionState::Validating)
    }

    fn event(&self, state: ProvisionState, message: String) -> ProvisionProgressEvent {
        ProvisionProgressEvent {
            request_id: self.request_id.clone(),
            state,
            message,
            timestamp: Utc::now(),
            draft_id: None,
            project_id: None,
            error: None,
        }
    }
}

impl ProvisionProgress for BroadcastProgress {
    fn report(&self, event: ProvisionEvent) {
        let payload = match event {
            ProvisionEvent::State { state } => {
                if let Ok(mut guard) = self.current.lock() {
                    *guard = state;
                }
                self.event(state, state.to_string())
            }
            ProvisionEvent::AssetStored {
                draft_id,
                stored_rel_path,
            } => ProvisionProgressEvent {
                draft_id: Some(draft_id),
                ..self.event(self.current_state(), format!("Stored {stored_rel_path}"))
            },
            ProvisionEvent::Committed { project_id } => ProvisionProgressEvent {
                project_id: Some(project_id),
                ..self.event(ProvisionState::Committed, "Project created".to_string())
            },
            ProvisionEvent::Failed {
                state,
                rolled_back,
                error,
            } => {
                let terminal = if rolled_back {
                    ProvisionState::RolledBack
                } else {
                    ProvisionState::Failed
                };
                ProvisionProgressEvent {
                    error: Some(error),
                    ..self.event(terminal, format!("Failed while {}", state.to_string().to_lowercase()))
                }
            }
        };
        // No receivers is fine
        let _ = self.sender.send(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_progress_tracks_state() {
        let (progress, mut rx) = BroadcastProgress::channel("req-1", 16);

        progress.report(ProvisionEvent::State {
            state: ProvisionState::IngestingAssets,
        });
        progress.report(ProvisionEvent::AssetStored {
            draft_id: "d1".into(),
            stored_rel_path: "Translations/a.docx".into(),
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.state, ProvisionState::IngestingAssets);
        assert_eq!(first.request_id, "req-1");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.state, ProvisionState::IngestingAssets);
        assert_eq!(second.draft_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn test_failure_maps_to_terminal_state() {
        let (progress, mut rx) = BroadcastProgress::channel("req-2", 4);
        progress.report(ProvisionEvent::Failed {
            state: ProvisionState::SeedingConversionJobs,
            rolled_back: true,
            error: "boom".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.state, ProvisionState::RolledBack);
        assert_eq!(event.error.as_deref(), Some("boom"));
        assert_eq!(event.message, "Failed while seeding conversion jobs");
    }
}
