//! Outbound delivery pacing
//!
//! Slices synthesized unit audio into transport-sized frames and forwards
//! them in order, followed by an explicit end-of-turn marker so the client
//! can transition its playback state.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::speech::SynthesisUnit;

/// Small gap between frames; the client needs it to keep its buffer fed
/// without overflowing
const INTER_FRAME_DELAY: Duration = Duration::from_millis(10);

/// One outbound transport frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// PCM audio sized for the transport
    Audio(Vec<u8>),
    /// End-of-turn marker, sent after the last frame of the last unit
    EndOfTurn,
}

/// Forward ordered units as transport frames
///
/// Consumes units until the channel closes, then emits the end-of-turn
/// marker. Returns the number of audio frames sent.
pub async fn run_pacer(
    mut ordered_rx: mpsc::Receiver<SynthesisUnit>,
    frame_tx: mpsc::Sender<OutboundFrame>,
    chunk_bytes: usize,
    cancel: CancellationToken,
) -> usize {
    let chunk_bytes = chunk_bytes.max(2);
    let mut frames_sent = 0_usize;

    loop {
        let unit = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("pacer cancelled");
                return frames_sent;
            }
            unit = ordered_rx.recv() => unit,
        };

        let Some(unit) = unit else { break };
        let Some(audio) = unit.audio else { continue };

        tracing::debug!(index = unit.index, bytes = audio.len(), "pacing unit");

        for chunk in audio.chunks(chunk_bytes) {
            let send = tokio::select! {
                () = cancel.cancelled() => return frames_sent,
                send = frame_tx.send(OutboundFrame::Audio(chunk.to_vec())) => send,
            };
            if send.is_err() {
                tracing::debug!("frame consumer gone");
                return frames_sent;
            }
            frames_sent += 1;
            tokio::time::sleep(INTER_FRAME_DELAY).await;
        }
    }

    let _ = frame_tx.send(OutboundFrame::EndOfTurn).await;
    tracing::debug!(frames_sent, "turn delivery complete");
    frames_sent
}
