use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    Json,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Serialize;
use sync_core::clock::{self, ClockSample};
use sync_core::messages::{self, ControlMessage, StageMessage};
use sync_core::{Correction, PlaybackTarget};
use uuid::Uuid;

use crate::app_state::{SharedState, StagePeer};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    tracing::info!("stage connecting: {}", addr);
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

pub async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: SharedState) {
    let session_id = Uuid::new_v4().to_string();

    state.peers.insert(
        session_id.clone(),
        Arc::new(StagePeer {
            addr,
            offset_us: Default::default(),
            rtt_us: Default::default(),
        }),
    );

    let (mut sender, mut receiver) = socket.split();

    // Commands broadcast by the operator surface
    let mut rx = state.tx.subscribe();

    loop {
        tokio::select! {
            Ok(msg) = rx.recv() => {
                if send_binary(&mut sender, &msg).await.is_err() {
                    break;
                }
            }

            Some(Ok(frame)) = receiver.next() => {
                match frame {
                    Message::Binary(bytes) => {
                        match messages::decode::<StageMessage>(&bytes) {
                            Ok(msg) => {
                                let replies = handle_stage_message(msg, &state, &session_id);
                                let mut link_lost = false;
                                for reply in replies {
                                    if send_binary(&mut sender, &reply).await.is_err() {
                                        link_lost = true;
                                        break;
                                    }
                                }
                                if link_lost {
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(%err, "dropping malformed stage frame");
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            else => break,
        }
    }

    state.peers.remove(&session_id);

    // The stage link is the presentation session; no link, no session.
    state.sync.lock().unwrap().end_session();
    *state.epoch.write().unwrap() = None;
    tracing::info!("stage disconnected: {}", session_id);
}

async fn send_binary(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ControlMessage,
) -> Result<(), ()> {
    match messages::encode(msg) {
        Ok(bytes) => sender.send(Message::Binary(bytes)).await.map_err(|_| ()),
        Err(err) => {
            tracing::error!(%err, "failed to encode control message");
            Ok(())
        }
    }
}

/// Process one inbound stage message; returned messages go back on this
/// socket only (broadcasts use `state.tx`).
fn handle_stage_message(
    msg: StageMessage,
    state: &SharedState,
    session_id: &str,
) -> Vec<ControlMessage> {
    match msg {
        StageMessage::Join { stage_id } => {
            tracing::info!("stage joined: {} ({})", stage_id, session_id);

            let mut sync = state.sync.lock().unwrap();
            if sync.is_active() {
                // Late (re)join while a presentation is running: re-base the
                // stage from the session epoch, or the preview when paused.
                let playing = sync.preview().map(|p| !p.is_paused()).unwrap_or(false);
                let epoch = state.epoch.read().unwrap();
                let position = match (*epoch, playing) {
                    (Some(epoch), true) => epoch.projected_position(clock::system_time_s()),
                    _ => sync.preview().map(|p| p.position()).unwrap_or(0.0),
                };
                let mut replies = vec![ControlMessage::Seek {
                    position,
                    sent_at_ms: clock::wall_ms(),
                }];
                replies.push(if playing {
                    ControlMessage::Play
                } else {
                    ControlMessage::Pause
                });
                replies
            } else {
                sync.begin_session();
                Vec::new()
            }
        }

        StageMessage::TimeRequest { t0_ms, seq } => {
            let received_at_ms = clock::wall_ms();
            vec![ControlMessage::TimeResponse {
                t0_ms,
                received_at_ms,
                system_time: clock::system_time_s(),
                sent_at_ms: clock::wall_ms(),
                seq,
            }]
        }

        StageMessage::Status {
            duration,
            position,
            sent_at_ms,
        } => {
            let received = ClockSample::now();
            let correction = state
                .sync
                .lock()
                .unwrap()
                .on_status(duration, position, sent_at_ms, received);
            match correction {
                Some(Correction::Rate { rate, drift }) => {
                    tracing::debug!(rate, drift, "preview rate adjusted");
                }
                Some(Correction::Seek { target, drift }) => {
                    tracing::debug!(target, drift, "preview re-seeked after stall");
                }
                Some(Correction::Hold { .. }) | None => {}
            }
            Vec::new()
        }

        StageMessage::PlaybackState { position, playing } => {
            state
                .sync
                .lock()
                .unwrap()
                .mirror_playback_state(position, playing, ClockSample::now());
            Vec::new()
        }

        StageMessage::Telemetry { offset_ms, rtt_ms } => {
            if let Some(peer) = state.peers.get(session_id) {
                peer.offset_us
                    .store((offset_ms * 1000.0) as i64, Ordering::Relaxed);
                peer.rtt_us
                    .store((rtt_ms * 1000.0) as u64, Ordering::Relaxed);
            }
            Vec::new()
        }

        StageMessage::Ended => {
            tracing::info!("stage reached end of media ({})", session_id);
            state.sync.lock().unwrap().on_ended();
            *state.epoch.write().unwrap() = None;
            Vec::new()
        }
    }
}

#[derive(Serialize)]
pub struct SyncStatus {
    pub active: bool,
    pub playing: bool,
    pub position: f64,
    pub rate: f64,
    pub pattern: Option<String>,
    pub drift: Option<f64>,
    pub stages: usize,
}

/// GET /status — dashboard snapshot of the sync loop.
pub async fn status_handler(State(state): State<SharedState>) -> Json<SyncStatus> {
    let sync = state.sync.lock().unwrap();
    let preview = sync.preview();
    Json(SyncStatus {
        active: sync.is_active(),
        playing: preview.map(|p| !p.is_paused()).unwrap_or(false),
        position: preview.map(|p| p.position()).unwrap_or(0.0),
        rate: preview.map(|p| p.rate()).unwrap_or(1.0),
        pattern: sync.controller().map(|c| format!("{:?}", c.pattern())),
        drift: sync.controller().map(|c| c.last_drift()),
        stages: state.peers.len(),
    })
}
