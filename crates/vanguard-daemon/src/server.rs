//! Request handling for the IPC server.

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use vanguard_core::{ColorSource, Command, MirrorSnapshot, SourceRegistry};
use vanguard_ipc::{ErrorInfo, Method, Response, StatusChangedData};

/// Result of handling a request.
pub struct HandleResult {
    /// Answer for the client, `None` until the mirror runtime applied `command`
    pub response: Option<Result<Value, ErrorInfo>>,
    /// State change for the main loop to apply
    pub command: Option<Command>,
}

impl HandleResult {
    fn reply(response: Result<Value, ErrorInfo>) -> Self {
        Self { response: Some(response), command: None }
    }

    fn apply(command: Command) -> Self {
        Self { response: Some(Ok(json!({ "success": true }))), command: Some(command) }
    }

    fn apply_deferred(command: Command) -> Self {
        Self { response: None, command: Some(command) }
    }
}

/// Handle an IPC request against the latest mirror snapshot.
pub fn handle_request(
    method: &Method,
    snapshot: &MirrorSnapshot,
    registry: &SourceRegistry,
) -> HandleResult {
    match method {
        Method::GetStatus => {
            let mut status =
                serde_json::to_value(StatusChangedData::from(snapshot)).unwrap_or(json!({}));
            status["sources"] = json!(registry.len());
            HandleResult::reply(Ok(status))
        }

        Method::ListSources => HandleResult::reply(Ok(
            serde_json::to_value(registry.list_sources()).unwrap_or(json!([])),
        )),

        Method::SetEnabled { enabled } => {
            debug!(enabled, "Set enabled requested");
            HandleResult::apply_deferred(Command::SetEnabled { enabled: *enabled })
        }

        Method::SelectSource { source } => {
            // Producers may register the source after it is selected.
            debug!(?source, "Source selection requested");
            HandleResult::apply_deferred(Command::SelectSource { source: *source })
        }

        Method::UpdateSource { id, name, colors } => {
            if name.trim().is_empty() {
                return HandleResult::reply(Err(ErrorInfo::new(
                    400,
                    format!("Source {id} needs a name"),
                )));
            }
            HandleResult::apply(Command::UpdateSource {
                id: *id,
                name: name.clone(),
                colors: colors.clone(),
            })
        }

        Method::RemoveSource { id } => {
            if registry.contains(*id) {
                HandleResult::apply(Command::RemoveSource { id: *id })
            } else {
                HandleResult::reply(Err(ErrorInfo::new(404, format!("Source not found: {id}"))))
            }
        }

        // Normally answered per connection by the IPC server.
        Method::Subscribe { .. } | Method::Unsubscribe { .. } => {
            HandleResult::reply(Ok(json!({ "success": true })))
        }

        Method::Shutdown => HandleResult::apply(Command::Shutdown),
    }
}

/// Answer a deferred request with the mirror state once it was applied.
pub async fn reply_when_applied(
    id: u64,
    applied: oneshot::Receiver<MirrorSnapshot>,
    response_tx: mpsc::Sender<Response>,
) {
    let result = match applied.await {
        Ok(snapshot) => {
            Ok(serde_json::to_value(StatusChangedData::from(&snapshot)).unwrap_or(json!({})))
        }
        Err(_) => Err(ErrorInfo::new(503, "Mirror runtime stopped")),
    };
    let _ = response_tx.send(Response { id, result }).await;
}

#[cfg(test)]
mod tests {
    use vanguard_core::{Color, MirrorStatus, SourceId};

    use super::*;

    fn registry_with_gpu() -> SourceRegistry {
        let registry = SourceRegistry::new();
        registry.upsert(SourceId(0), "GPU", vec![Color::rgb(255, 0, 0)]).unwrap();
        registry
    }

    #[test]
    fn test_get_status() {
        let snapshot = MirrorSnapshot {
            status: MirrorStatus::Mirroring(SourceId(0)),
            enabled: true,
            selected_source: Some(SourceId(0)),
            last_color: Some(Color::rgb(255, 0, 0)),
            link_open: true,
        };

        let result = handle_request(&Method::GetStatus, &snapshot, &registry_with_gpu());
        let value = result.response.unwrap().unwrap();

        assert!(result.command.is_none());
        assert_eq!(value["status_text"], "Status: mirroring device 0");
        assert_eq!(value["enabled"], true);
        assert_eq!(value["link_open"], true);
        assert_eq!(value["sources"], 1);
    }

    #[test]
    fn test_list_sources() {
        let result =
            handle_request(&Method::ListSources, &MirrorSnapshot::default(), &registry_with_gpu());
        let value = result.response.unwrap().unwrap();

        assert_eq!(value[0]["id"], 0);
        assert_eq!(value[0]["name"], "GPU");
    }

    #[test]
    fn test_control_methods_return_commands() {
        let snapshot = MirrorSnapshot::default();
        let registry = registry_with_gpu();

        let result = handle_request(&Method::SetEnabled { enabled: false }, &snapshot, &registry);
        assert!(result.response.is_none());
        assert_eq!(result.command, Some(Command::SetEnabled { enabled: false }));

        let result = handle_request(&Method::SelectSource { source: None }, &snapshot, &registry);
        assert_eq!(result.command, Some(Command::SelectSource { source: None }));

        // Unknown sources can be selected ahead of registration.
        let result =
            handle_request(&Method::SelectSource { source: Some(SourceId(9)) }, &snapshot, &registry);
        assert!(result.response.is_none());
        assert_eq!(result.command, Some(Command::SelectSource { source: Some(SourceId(9)) }));

        let result = handle_request(&Method::Shutdown, &snapshot, &registry);
        assert!(result.response.unwrap().is_ok());
        assert_eq!(result.command, Some(Command::Shutdown));
    }

    #[test]
    fn test_update_source_requires_name() {
        let method =
            Method::UpdateSource { id: SourceId(1), name: " ".into(), colors: vec![Color::default()] };
        let result = handle_request(&method, &MirrorSnapshot::default(), &SourceRegistry::new());

        assert_eq!(result.response.unwrap().unwrap_err().code, 400);
        assert!(result.command.is_none());
    }

    #[test]
    fn test_remove_unknown_source() {
        let registry = registry_with_gpu();
        let snapshot = MirrorSnapshot::default();

        let result = handle_request(&Method::RemoveSource { id: SourceId(4) }, &snapshot, &registry);
        assert_eq!(result.response.unwrap().unwrap_err().code, 404);

        let result = handle_request(&Method::RemoveSource { id: SourceId(0) }, &snapshot, &registry);
        assert_eq!(result.command, Some(Command::RemoveSource { id: SourceId(0) }));
    }

    #[tokio::test]
    async fn test_reply_waits_for_applied_state() {
        let (applied, applied_rx) = oneshot::channel();
        let (response_tx, mut response_rx) = mpsc::channel(1);
        let reply = tokio::spawn(reply_when_applied(7, applied_rx, response_tx));

        assert!(response_rx.try_recv().is_err());

        let snapshot = MirrorSnapshot {
            status: MirrorStatus::Enabled,
            enabled: true,
            selected_source: Some(SourceId(1)),
            last_color: None,
            link_open: false,
        };
        applied.send(snapshot).unwrap();
        reply.await.unwrap();

        let response = response_rx.recv().await.unwrap();
        assert_eq!(response.id, 7);
        let value = response.result.unwrap();
        assert_eq!(value["enabled"], true);
        assert_eq!(value["status_text"], "Status: enabled");
    }

    #[tokio::test]
    async fn test_reply_reports_stopped_runtime() {
        let (applied, applied_rx) = oneshot::channel::<MirrorSnapshot>();
        let (response_tx, mut response_rx) = mpsc::channel(1);
        drop(applied);

        reply_when_applied(3, applied_rx, response_tx).await;

        let response = response_rx.recv().await.unwrap();
        assert_eq!(response.id, 3);
        assert_eq!(response.result.unwrap_err().code, 503);
    }
}
