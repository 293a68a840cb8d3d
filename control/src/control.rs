use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use sync_core::clock::{self, ClockSample, SessionEpoch};
use sync_core::messages::{ControlMessage, OperatorCommand};
use sync_core::PlaybackTarget;

use crate::app_state::SharedState;

/// Core command logic shared between REST and any future operator surface.
///
/// Every command first updates the local session (preview clock, controller
/// reset, epoch) and then fans out to the stage; the sync loop stays
/// suppressed until the stage confirms with its next status report.
pub fn process_operator_command(state: &SharedState, cmd: OperatorCommand) {
    let now = ClockSample::now();

    match cmd {
        OperatorCommand::Play => {
            {
                let mut sync = state.sync.lock().unwrap();
                sync.on_play(now);
                let start = sync.preview().map(|p| p.position()).unwrap_or(0.0);
                *state.epoch.write().unwrap() =
                    Some(SessionEpoch::begin(clock::system_time_s(), start));
            }
            let _ = state.tx.send(ControlMessage::Play);
        }
        OperatorCommand::Pause => {
            {
                let mut sync = state.sync.lock().unwrap();
                sync.on_pause(now);
                *state.epoch.write().unwrap() = None;
            }
            let _ = state.tx.send(ControlMessage::Pause);
        }
        OperatorCommand::Seek { position } => {
            if !position.is_finite() || position < 0.0 {
                tracing::warn!(position, "ignoring invalid seek");
                return;
            }
            {
                let mut sync = state.sync.lock().unwrap();
                sync.on_seek(position);
                let playing = sync.preview().map(|p| !p.is_paused()).unwrap_or(false);
                let mut epoch = state.epoch.write().unwrap();
                *epoch = playing.then(|| SessionEpoch::begin(clock::system_time_s(), position));
            }
            let _ = state.tx.send(ControlMessage::Seek {
                position,
                sent_at_ms: clock::wall_ms(),
            });
        }
        OperatorCommand::Volume { level } => {
            if !level.is_finite() {
                tracing::warn!(level, "ignoring invalid volume");
                return;
            }
            let level = level.clamp(0.0, 1.0);
            let _ = state.tx.send(ControlMessage::Volume { level });
        }
        OperatorCommand::Close => {
            {
                let mut sync = state.sync.lock().unwrap();
                sync.end_session();
                *state.epoch.write().unwrap() = None;
            }
            let _ = state.tx.send(ControlMessage::SessionClosed);
        }
    }
}

/// POST /control
pub async fn handle_control_command(
    State(state): State<SharedState>,
    Json(cmd): Json<OperatorCommand>,
) -> impl IntoResponse {
    tracing::debug!(?cmd, "operator command");
    process_operator_command(&state, cmd);
    StatusCode::OK
}
