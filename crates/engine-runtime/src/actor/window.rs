use crate::{
    actor::{
        Actor, ActorContext, ActorRef,
        messages::{WindowMsg, WriterMsg},
    },
    error::ActorError,
};
use async_trait::async_trait;
use engine_core::{clock::Clock, metrics::Metrics};
use engine_processing::window::{Admission, Windower, batch::Batch};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns one shard's windower and forwards closed batches, in close order, to
/// the shard's writer.
pub struct WindowActor {
    windower: Windower,
    writer: ActorRef<WriterMsg>,
    metrics: Metrics,
    clock: Arc<dyn Clock>,
}

impl WindowActor {
    pub fn new(
        windower: Windower,
        writer: ActorRef<WriterMsg>,
        metrics: Metrics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            windower,
            writer,
            metrics,
            clock,
        }
    }

    async fn forward(&self, closed: Vec<Batch>) -> Result<(), ActorError> {
        for batch in closed {
            debug!(writer = %self.writer.name(), batch_id = %batch.id(), "Handing off batch");
            self.writer.send(WriterMsg::Write(batch)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Actor<WindowMsg> for WindowActor {
    async fn handle(&mut self, msg: WindowMsg, ctx: &ActorContext) -> Result<(), ActorError> {
        let now = self.clock.now();
        let closed = match msg {
            WindowMsg::Admit(event) => match self.windower.admit(*event, now) {
                Admission::Accepted(closed) => closed,
                Admission::Duplicate => {
                    self.metrics.record_duplicate();
                    Vec::new()
                }
            },
            WindowMsg::Tick => self.windower.tick(now),
            WindowMsg::Drain => {
                let closed = self.windower.drain(now);
                info!(actor = ctx.name(), batches = closed.len(), "Drained open batches");
                closed
            }
        };

        self.forward(closed).await.map_err(|e| {
            ActorError::Halted(format!("writer {} unreachable: {e}", self.writer.name()))
        })
    }

    async fn on_stop(&mut self, ctx: &ActorContext) -> Result<(), ActorError> {
        if self.windower.open_batches() > 0 {
            warn!(
                actor = ctx.name(),
                batches = self.windower.open_batches(),
                records = self.windower.buffered_records(),
                "Mailbox closed with open batches, draining"
            );
            let closed = self.windower.drain(self.clock.now());
            self.forward(closed).await?;
        }
        Ok(())
    }
}
