//! Synthesis scheduling and ordered reassembly
//!
//! Units are dispatched to the synthesis adapter the moment the segmenter
//! forms them, so unit *i+1* may finish before unit *i*. The ordering
//! buffer holds out-of-order completions and releases units only when
//! everything before them has been released; the invariant holds under
//! arbitrary completion ordering.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::tts::Synthesize;

use super::{SentenceSegmenter, SynthesisUnit};

/// Reorders completed units into strict index order
#[derive(Default)]
pub struct OrderingBuffer {
    next_index: usize,
    ready: BTreeMap<usize, SynthesisUnit>,
}

impl OrderingBuffer {
    /// Create a buffer expecting index 0 first
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a completed unit; returns every unit now deliverable, in order
    pub fn complete(&mut self, unit: SynthesisUnit) -> Vec<SynthesisUnit> {
        self.ready.insert(unit.index, unit);

        let mut deliverable = Vec::new();
        while let Some(unit) = self.ready.remove(&self.next_index) {
            deliverable.push(unit);
            self.next_index += 1;
        }
        deliverable
    }

    /// Completed units still waiting on a predecessor
    #[must_use]
    pub fn pending(&self) -> usize {
        self.ready.len()
    }
}

/// Consume the delta stream, fan out synthesis, deliver units in order
///
/// Runs until the delta channel closes and every dispatched unit has
/// completed, or until cancellation. Units whose synthesis returned `None`
/// are skipped in place: they advance the ordering without producing
/// audio, and a turn where every unit failed still terminates normally.
///
/// Returns the number of units delivered with audio.
pub async fn run_scheduler(
    synthesizer: Arc<dyn Synthesize>,
    mut delta_rx: mpsc::Receiver<String>,
    ordered_tx: mpsc::Sender<SynthesisUnit>,
    cancel: CancellationToken,
) -> usize {
    let mut segmenter = SentenceSegmenter::default();
    let mut buffer = OrderingBuffer::new();
    let (done_tx, mut done_rx) = mpsc::channel::<SynthesisUnit>(16);
    let mut outstanding = 0_usize;
    let mut deltas_open = true;
    let mut delivered = 0_usize;

    loop {
        if !deltas_open && outstanding == 0 {
            break;
        }

        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("synthesis scheduler cancelled");
                return delivered;
            }
            delta = delta_rx.recv(), if deltas_open => {
                match delta {
                    Some(delta) => {
                        for unit in segmenter.push(&delta) {
                            dispatch(&synthesizer, unit, &done_tx, &cancel);
                            outstanding += 1;
                        }
                    }
                    None => {
                        deltas_open = false;
                        if let Some(unit) = segmenter.flush() {
                            dispatch(&synthesizer, unit, &done_tx, &cancel);
                            outstanding += 1;
                        }
                    }
                }
            }
            unit = done_rx.recv(), if outstanding > 0 => {
                let Some(unit) = unit else { break };
                outstanding -= 1;
                for unit in buffer.complete(unit) {
                    if unit.audio.is_some() {
                        if ordered_tx.send(unit).await.is_err() {
                            tracing::debug!("ordered unit consumer gone");
                            return delivered;
                        }
                        delivered += 1;
                    } else {
                        tracing::warn!(index = unit.index, text = %unit.text, "skipping failed unit");
                    }
                }
            }
        }
    }

    tracing::debug!(delivered, "synthesis scheduler drained");
    delivered
}

/// Fire-and-forget synthesis of one unit
fn dispatch(
    synthesizer: &Arc<dyn Synthesize>,
    unit: SynthesisUnit,
    done_tx: &mpsc::Sender<SynthesisUnit>,
    cancel: &CancellationToken,
) {
    let synthesizer = Arc::clone(synthesizer);
    let done_tx = done_tx.clone();
    let cancel = cancel.clone();

    tokio::spawn(async move {
        let audio = tokio::select! {
            () = cancel.cancelled() => return,
            audio = synthesizer.synthesize(&unit.text) => audio,
        };
        let _ = done_tx
            .send(SynthesisUnit {
                audio,
                ..unit
            })
            .await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(index: usize, audio: Option<&[u8]>) -> SynthesisUnit {
        SynthesisUnit {
            index,
            text: format!("unit {index}"),
            audio: audio.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn in_order_completions_pass_straight_through() {
        let mut buffer = OrderingBuffer::new();
        assert_eq!(buffer.complete(unit(0, Some(b"a"))).len(), 1);
        assert_eq!(buffer.complete(unit(1, Some(b"b"))).len(), 1);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn out_of_order_completion_is_held_back() {
        let mut buffer = OrderingBuffer::new();

        // Unit 1 completes before unit 0: nothing deliverable yet
        assert!(buffer.complete(unit(1, Some(b"b"))).is_empty());
        assert_eq!(buffer.pending(), 1);

        // Unit 0 releases both, in index order
        let released = buffer.complete(unit(0, Some(b"a")));
        let indices: Vec<usize> = released.iter().map(|u| u.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn arbitrary_completion_order_releases_in_index_order() {
        let mut buffer = OrderingBuffer::new();
        let mut released = Vec::new();

        for index in [3, 1, 4, 0, 2] {
            released.extend(buffer.complete(unit(index, Some(b"x"))));
        }

        let indices: Vec<usize> = released.iter().map(|u| u.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn failed_units_still_advance_the_order() {
        let mut buffer = OrderingBuffer::new();

        assert!(buffer.complete(unit(1, Some(b"b"))).is_empty());
        // Unit 0 failed; it is still released (audio None) and unblocks unit 1
        let released = buffer.complete(unit(0, None));
        assert_eq!(released.len(), 2);
        assert!(released[0].audio.is_none());
        assert!(released[1].audio.is_some());
    }
}
