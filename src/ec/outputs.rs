//! Output Lanes
//!
//! The writable side of an operation. Every coded stripe is written to all
//! live outputs concurrently; the stripe counts as drained only once every
//! write, including any backpressure wait, has completed. End-of-stream and
//! errors are delivered at most once per lane.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};

use crate::domain::ports::BoxSink;
use crate::ec::context::{CodedStripe, OperationKind};
use crate::error::{Error, Result};
use crate::metrics::{self, OperationStats};

/// What an output receives from each stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Piece {
    /// The S bytes of one lane
    Lane(usize),
    /// The object bytes, padding removed
    Payload,
}

impl Piece {
    fn lane(&self) -> Option<usize> {
        match self {
            Piece::Lane(lane) => Some(*lane),
            Piece::Payload => None,
        }
    }
}

struct OutputLane {
    piece: Piece,
    sink: BoxSink,
    live: bool,
}

/// The set of outputs of one operation.
pub(crate) struct OutputLanes {
    kind: OperationKind,
    lanes: Vec<OutputLane>,
    stats: Arc<OperationStats>,
}

impl OutputLanes {
    pub(crate) fn new(kind: OperationKind, stats: Arc<OperationStats>) -> Self {
        Self {
            kind,
            lanes: Vec::new(),
            stats,
        }
    }

    pub(crate) fn push(&mut self, piece: Piece, sink: BoxSink) {
        self.lanes.push(OutputLane {
            piece,
            sink,
            live: true,
        });
    }

    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.lanes.iter().filter(|lane| lane.live).count()
    }

    /// Write one coded stripe to every live output.
    pub(crate) async fn drain(&mut self, stripe: Option<CodedStripe>) -> Result<()> {
        let Some(stripe) = stripe else {
            return Ok(());
        };

        let stats = &self.stats;
        let kind = self.kind.as_str();
        let writes = self.lanes.iter_mut().filter(|lane| lane.live).map(|lane| {
            let bytes = match lane.piece {
                Piece::Lane(index) => stripe.lane(index),
                Piece::Payload => stripe.payload(),
            };
            async move {
                let len = bytes.len();
                match lane.sink.write(bytes).await {
                    Ok(()) => {
                        stats.record_write(len);
                        metrics::global().record_write(kind, len);
                        Ok(())
                    }
                    Err(e) => {
                        lane.live = false;
                        Err(Error::downstream(lane.piece.lane(), e))
                    }
                }
            }
        });

        try_join_all(writes).await?;
        Ok(())
    }

    /// Signal end-of-stream to every live output.
    ///
    /// Every finish runs to completion before this returns. A lane leaves
    /// the live set once its own finish resolves, so when one fails the
    /// others have still received exactly one terminal signal. The first
    /// failure in lane order is returned.
    pub(crate) async fn finish_all(&mut self) -> Result<()> {
        let finishes = self.lanes.iter_mut().filter(|lane| lane.live).map(|lane| async move {
            let result = lane.sink.finish().await;
            lane.live = false;
            result.map_err(|e| Error::downstream(lane.piece.lane(), e))
        });
        join_all(finishes).await.into_iter().collect()
    }

    /// Deliver `err` to every output that is still live. Lanes that already
    /// finished, failed or were aborted are skipped, so repeat calls are
    /// harmless.
    pub(crate) async fn abort_all(&mut self, err: &Error) {
        let aborts = self.lanes.iter_mut().filter(|lane| lane.live).map(|lane| async move {
            lane.live = false;
            lane.sink.abort(err).await;
        });
        join_all(aborts).await;
    }
}
