use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use sync_core::clock::{self, ClockOffset, ClockReconciler};
use sync_core::messages::{self, ControlMessage, StageMessage};
use sync_core::{PlaybackTarget, PlayheadClock};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Handshake exchanges performed at session start.
const HANDSHAKE_BURST: usize = 5;

/// Client-side floor on status spacing (~30 Hz).
const STATUS_INTERVAL_MS: f64 = 1000.0 / 30.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stage=info,sync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let connect_addr =
        std::env::var("STAGE_SYNC_URL").unwrap_or_else(|_| "ws://127.0.0.1:3000/ws".into());
    let url = Url::parse(&connect_addr)?;

    // The renderer that would sit behind this playhead is out of scope;
    // the clock itself is what the sync loop needs.
    let duration: f64 = std::env::var("STAGE_MEDIA_DURATION")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300.0);

    let (ws_stream, _) = connect_async(url)
        .await
        .context("failed to connect to control surface")?;
    tracing::info!("connected to {}", connect_addr);

    let (mut write, mut read) = ws_stream.split();

    send_msg(
        &mut write,
        &StageMessage::Join {
            stage_id: format!("STAGE-{}", uuid::Uuid::new_v4()),
        },
    )
    .await?;

    // Clock handshake burst: measure offset and RTT against the control
    // surface's master clock.
    let mut offsets = Vec::with_capacity(HANDSHAKE_BURST);
    for seq in 0..HANDSHAKE_BURST as u8 {
        let t0 = clock::wall_ms();
        send_msg(&mut write, &StageMessage::TimeRequest { t0_ms: t0, seq }).await?;

        if let Some(Ok(Message::Binary(bytes))) = read.next().await {
            match messages::decode::<ControlMessage>(&bytes) {
                Ok(ControlMessage::TimeResponse {
                    t0_ms,
                    received_at_ms,
                    sent_at_ms,
                    ..
                }) => {
                    let t3 = clock::wall_ms();
                    let sample = ClockOffset::calculate(t0_ms, received_at_ms, sent_at_ms, t3);
                    tracing::info!(
                        "handshake #{}: rtt={:.1}ms offset={:.1}ms",
                        seq,
                        sample.rtt_ms,
                        sample.offset_ms
                    );
                    offsets.push(sample);
                }
                Ok(other) => tracing::debug!(?other, "out-of-band message during handshake"),
                Err(err) => tracing::warn!(%err, "dropping malformed control frame"),
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let offset_ms = ClockOffset::average(&offsets);
    let rtt_ms = if offsets.is_empty() {
        0.0
    } else {
        offsets.iter().map(|s| s.rtt_ms).sum::<f64>() / offsets.len() as f64
    };
    send_msg(&mut write, &StageMessage::Telemetry { offset_ms, rtt_ms }).await?;
    tracing::info!("clock handshake complete, mean offset {:.1}ms", offset_ms);

    let mut player = PlayheadClock::new(duration);
    let mut ticker = tokio::time::interval(Duration::from_millis(33));
    let mut last_status_mono = f64::NEG_INFINITY;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mono = clock::mono_ms();
                player.advance(mono);

                if player.ended() {
                    send_msg(&mut write, &StageMessage::Ended).await?;
                    tracing::info!("end of media");
                    break;
                }

                // Skip the report while paused or inside the send floor
                if !player.is_paused() && mono - last_status_mono > STATUS_INTERVAL_MS {
                    send_msg(&mut write, &StageMessage::Status {
                        duration: player.duration(),
                        position: player.position(),
                        sent_at_ms: clock::wall_ms(),
                    }).await?;
                    last_status_mono = mono;
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Binary(bytes))) => {
                        match messages::decode::<ControlMessage>(&bytes) {
                            Ok(cmd) => {
                                if apply_command(&mut player, cmd) {
                                    break;
                                }
                            }
                            Err(err) => tracing::warn!(%err, "dropping malformed control frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("control surface closed the link");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::error!(%err, "stage link failed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Apply one command to the playhead. Returns true when the session is
/// over and the renderer should shut down.
fn apply_command(player: &mut PlayheadClock, cmd: ControlMessage) -> bool {
    match cmd {
        ControlMessage::Play => {
            player.play(clock::mono_ms());
            tracing::info!("play");
        }
        ControlMessage::Pause => {
            player.pause(clock::mono_ms());
            tracing::info!("pause at {:.3}s", player.position());
        }
        ControlMessage::Seek {
            position,
            sent_at_ms,
        } => {
            // Compensate for command transit before landing the seek
            let now = clock::wall_ms();
            let adjusted =
                ClockReconciler::predict(player.duration(), position, sent_at_ms, now, now);
            player.seek(adjusted);
            tracing::info!("seek to {:.3}s", adjusted);
        }
        ControlMessage::Volume { level } => player.set_volume(level),
        ControlMessage::SessionClosed => {
            tracing::info!("session closed by operator");
            return true;
        }
        ControlMessage::TimeResponse { .. } => {}
    }
    false
}

async fn send_msg<S>(write: &mut S, msg: &StageMessage) -> anyhow::Result<()>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let bytes = messages::encode(msg)?;
    write.send(Message::Binary(bytes)).await?;
    Ok(())
}
