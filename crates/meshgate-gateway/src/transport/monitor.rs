//! `/monitor`: unauthenticated diagnostic stream of the activity log.
//!
//! Read-only with respect to the mesh. The only accepted commands toggle or
//! query the monitor itself.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;

use crate::app_state::AppState;
use crate::obs::ActivityMonitor;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "command")]
enum MonitorCommand {
    Enable,
    Disable,
    Status,
}

pub async fn monitor_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_monitor(app, socket))
}

async fn run_monitor(app: AppState, mut socket: WebSocket) {
    let monitor = app.activity();
    let (history, mut rx) = monitor.subscribe();
    tracing::info!(subscribers = monitor.stats().subscribers, "monitor client connected");

    if !history.is_empty() && !send_json(&mut socket, &json!({ "type": "history", "events": history })).await {
        return;
    }

    loop {
        tokio::select! {
            ev = rx.recv() => match ev {
                Ok(event) => {
                    if !send_json(&mut socket, &json!({ "type": "event", "event": event })).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::debug!(skipped = n, "monitor client lagging"),
                Err(RecvError::Closed) => break,
            },

            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let Some(reply) = command_reply(&monitor, &text) else { continue };
                    if !send_json(&mut socket, &reply).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::info!("monitor client disconnected");
}

/// Apply a control command; unparseable input is ignored.
fn command_reply(monitor: &ActivityMonitor, text: &str) -> Option<Value> {
    let cmd: MonitorCommand = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring monitor message");
            return None;
        }
    };
    Some(match cmd {
        MonitorCommand::Enable => {
            monitor.enable();
            json!({ "type": "status", "enabled": true })
        }
        MonitorCommand::Disable => {
            monitor.disable();
            json!({ "type": "status", "enabled": false })
        }
        MonitorCommand::Status => {
            let mut v = serde_json::to_value(monitor.stats()).unwrap_or_else(|_| json!({}));
            if let Some(obj) = v.as_object_mut() {
                obj.insert("type".into(), json!("status"));
            }
            v
        }
    })
}

async fn send_json(socket: &mut WebSocket, v: &Value) -> bool {
    socket.send(Message::Text(v.to_string())).await.is_ok()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn commands_toggle_and_report() {
        let m = ActivityMonitor::new(false, 4);
        let r = command_reply(&m, r#"{"command":"enable"}"#).unwrap();
        assert_eq!(r["enabled"], true);
        assert!(m.is_enabled());

        let r = command_reply(&m, r#"{"command":"status"}"#).unwrap();
        assert_eq!(r["type"], "status");
        assert_eq!(r["maxBufferSize"], 4);

        command_reply(&m, r#"{"command":"disable"}"#).unwrap();
        assert!(!m.is_enabled());
        assert!(command_reply(&m, r#"{"command":"kick","memberId":"x"}"#).is_none());
    }
}
