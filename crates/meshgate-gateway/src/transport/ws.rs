//! Member WebSocket endpoint.
//!
//! Responsibilities:
//! - Refuse before upgrading: draining, rate guard (429), token admission (401)
//! - Bind the session, run the handshake window, then dispatch frames in
//!   arrival order
//! - Heartbeat probing and forced close on missing pongs
//! - Single writer task per transport fed by the session's outbound queue

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, timeout, Duration, Instant, MissedTickBehavior};
use tracing::Instrument;

use meshgate_core::error::MeshError;
use meshgate_core::protocol::frame::{types, Frame};

use crate::app_state::AppState;
use crate::realtime::{CloseReason, PreparedMsg, QoS, RouteCtx, Session};
use crate::services::{Admitted, HandshakeOutcome};
use crate::transport::codec::{decode, Inbound};

const INTERNAL_ERROR: u16 = 1011;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

pub async fn gateway_upgrade(
    State(app): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(q): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let metrics = app.metrics();

    if app.is_draining() {
        metrics.upgrades.inc(&[("result", "draining")]);
        return (StatusCode::SERVICE_UNAVAILABLE, "draining").into_response();
    }

    if let Err(retry_after) = app.guard().check(peer.ip()).await {
        metrics.upgrades.inc(&[("result", "rate_limited")]);
        tracing::warn!(peer = %peer, retry_after, "upgrade rate limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            "rate limited",
        )
            .into_response();
    }

    let admitted = match app.admission().admit(q.token.as_deref()).await {
        Ok(a) => a,
        Err(e @ MeshError::Admission(_)) => {
            metrics.upgrades.inc(&[("result", "unauthorized")]);
            tracing::warn!(peer = %peer, error = %e, "admission refused");
            app.activity().error(None, format!("connection rejected: {e}"), None);
            return (StatusCode::UNAUTHORIZED, e.client_code().as_str()).into_response();
        }
        Err(e) => {
            metrics.upgrades.inc(&[("result", "store_error")]);
            tracing::error!(peer = %peer, error = %e, "admission failed");
            return (StatusCode::SERVICE_UNAVAILABLE, e.client_code().as_str()).into_response();
        }
    };

    metrics.upgrades.inc(&[("result", "accepted")]);
    let max = app.cfg().gateway.max_frame_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| run_session(app, admitted, socket))
}

enum Flow {
    Continue,
    Close(Option<CloseReason>),
}

async fn run_session(app: AppState, admitted: Admitted, socket: WebSocket) {
    let gw = app.cfg().gateway.clone();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(gw.outbound_queue);
    let session = Arc::new(Session::new(
        admitted.member.id,
        admitted.realm.id,
        admitted.realm.realm_key,
        out_tx,
    ));
    let span = tracing::info_span!(
        "session",
        member_id = %session.member_id(),
        realm = %session.realm_key(),
        session_id = %session.id()
    );

    async move {
        // Subscribe before registering so a supersede can never be missed.
        let mut close_rx = session.close_signal();
        app.register(Arc::clone(&session));
        tracing::info!("member connected");

        let (mut ws_tx, mut ws_rx) = socket.split();
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if ws_tx.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        let ctx = RouteCtx::new(Arc::clone(&session));
        let heartbeat_timeout = Duration::from_millis(gw.heartbeat_timeout_ms);
        let ping_every = Duration::from_millis(gw.ping_interval_ms);
        let mut ping_tick = interval_at(Instant::now() + ping_every, ping_every);
        ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let handshake_deadline = sleep(Duration::from_millis(gw.handshake_timeout_ms));
        tokio::pin!(handshake_deadline);

        let reason = loop {
            tokio::select! {
                changed = close_rx.changed() => {
                    if changed.is_err() {
                        break None;
                    }
                    let requested = close_rx.borrow().clone();
                    if let Some(r) = requested {
                        break Some(r);
                    }
                }

                _ = &mut handshake_deadline, if !session.is_ready() => {
                    tracing::warn!("handshake window elapsed");
                    app.activity().error(Some(session.member_id()), "handshake timeout", None);
                    break Some(CloseReason::new(CloseReason::HANDSHAKE_TIMEOUT, "handshake timeout"));
                }

                _ = ping_tick.tick() => {
                    if session.since_heartbeat() > heartbeat_timeout {
                        tracing::warn!("heartbeat timeout");
                        break Some(CloseReason::new(CloseReason::HEARTBEAT_TIMEOUT, "heartbeat timeout"));
                    }
                    let _ = session.send_lossy(Message::Ping(Vec::new()));
                }

                incoming = ws_rx.next() => {
                    let Some(incoming) = incoming else { break None };
                    let msg = match incoming {
                        Ok(m) => m,
                        Err(e) => {
                            // Reserved bits (compression), oversize and framing errors land here.
                            let err = MeshError::ProtocolViolation(format!("transport: {e}"));
                            break violation(&app, &session, "transport", &err);
                        }
                    };
                    match on_message(&app, &session, &ctx, msg, gw.max_frame_bytes).await {
                        Flow::Continue => {}
                        Flow::Close(r) => break r,
                    }
                }
            }
        };

        app.release(&session).await;

        match reason {
            Some(r) => {
                tracing::info!(code = r.code, reason = %r.reason, "closing session");
                let frame = CloseFrame { code: r.code, reason: Cow::Owned(r.reason) };
                let write_timeout = gw.write_timeout_ms;
                if session.send_reliable(Message::Close(Some(frame)), write_timeout).await.is_err() {
                    writer.abort();
                } else if timeout(Duration::from_millis(write_timeout), writer).await.is_err() {
                    tracing::debug!("writer did not drain in time");
                }
            }
            None => writer.abort(),
        }
        tracing::info!("member disconnected");
    }
    .instrument(span)
    .await
}

async fn on_message(app: &AppState, session: &Arc<Session>, ctx: &RouteCtx, msg: Message, max_frame_bytes: usize) -> Flow {
    let frame = match decode(msg, max_frame_bytes) {
        Ok(Inbound::Frame { frame, .. }) => frame,
        // tungstenite answers pings itself.
        Ok(Inbound::Ping(_)) => return Flow::Continue,
        Ok(Inbound::Pong) => {
            session.touch_heartbeat();
            return Flow::Continue;
        }
        Ok(Inbound::Close) => return Flow::Close(None),
        Err(e) => return Flow::Close(violation(app, session, "decode", &e)),
    };

    app.activity().message(session.member_id(), &frame.frame_type);

    if !session.is_ready() {
        if frame.frame_type != types::MEMBER_HANDSHAKE {
            let e = MeshError::ProtocolViolation(format!(
                "expected {} before {}",
                types::MEMBER_HANDSHAKE,
                frame.frame_type
            ));
            return Flow::Close(violation(app, session, "handshake_required", &e));
        }
        return match app.handshake().complete(session, &frame).await {
            Ok(HandshakeOutcome::Accepted) | Ok(HandshakeOutcome::Rejected(_)) => Flow::Continue,
            Err(e) => {
                tracing::warn!(error = %e, "handshake ack not delivered");
                Flow::Close(Some(CloseReason::new(INTERNAL_ERROR, "handshake ack not delivered")))
            }
        };
    }

    if frame.frame_type == types::MEMBER_HANDSHAKE {
        send_error(app, session, &MeshError::BadRequest("handshake already completed".into())).await;
        return Flow::Continue;
    }

    let frame_type = frame.frame_type.clone();
    let started = StdInstant::now();
    let res = app.dispatcher().dispatch(ctx.clone(), frame).await;

    match res {
        Ok(()) => {
            app.metrics()
                .dispatch_duration
                .observe(&[("frame_type", frame_type.as_str())], started.elapsed());
            Flow::Continue
        }
        Err(e @ MeshError::ProtocolViolation(_)) => Flow::Close(violation(app, session, "unknown_type", &e)),
        Err(e) if e.is_terminal() => {
            tracing::error!(frame_type = %frame_type, error = %e, "terminal error while handling frame");
            send_error(app, session, &e).await;
            Flow::Close(Some(CloseReason::new(INTERNAL_ERROR, e.client_code().as_str())))
        }
        Err(e) => {
            if matches!(e, MeshError::Store(_)) {
                tracing::error!(frame_type = %frame_type, error = %e, "store failure while routing");
            } else {
                tracing::debug!(frame_type = %frame_type, error = %e, "frame rejected");
            }
            app.activity().error(Some(session.member_id()), e.to_string(), None);
            send_error(app, session, &e).await;
            Flow::Continue
        }
    }
}

/// Report a protocol violation to the peer and pick the close code.
fn violation(app: &AppState, session: &Session, reason: &'static str, err: &MeshError) -> Option<CloseReason> {
    tracing::warn!(reason, error = %err, "protocol violation");
    app.metrics().protocol_violations.inc(&[("reason", reason)]);
    app.activity().error(Some(session.member_id()), err.to_string(), None);
    if let Ok(prepared) = PreparedMsg::prepare(&error_frame(err)) {
        let _ = session.send_lossy(prepared.to_ws_message());
    }
    Some(CloseReason::new(CloseReason::PROTOCOL_ERROR, err.client_code().as_str()))
}

async fn send_error(app: &AppState, session: &Session, err: &MeshError) {
    let qos = QoS::Reliable { timeout_ms: app.cfg().gateway.write_timeout_ms };
    match PreparedMsg::prepare(&error_frame(err)) {
        Ok(p) => {
            if let Err(e) = session.send(&p, qos).await {
                tracing::debug!(error = %e, "error frame not delivered");
            }
        }
        Err(e) => tracing::error!(error = %e, "error frame encode failed"),
    }
}

fn error_frame(err: &MeshError) -> Frame {
    Frame::error(err.client_code().as_str(), err.to_string(), None)
}
