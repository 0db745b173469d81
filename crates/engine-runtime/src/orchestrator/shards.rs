use crate::{
    actor::{
        ActorRef,
        messages::WindowMsg,
        spawn::spawn_actor,
        window::WindowActor,
        writer::WriterActor,
    },
    error::ActorError,
    orchestrator::dead_letters::DeadLetterRelay,
};
use engine_config::settings::PipelineSettings;
use engine_core::{clock::Clock, connectors::sink::StorageSink, metrics::Metrics};
use engine_processing::{router::FailureRouter, sink::writer::SinkWriter, window::Windower};
use model::{core::identifiers::PartitionKey, events::EnrichedEvent};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Picks the owning shard of a partition key. Stable across runs and
/// processes for the same shard count.
pub fn shard_of(key: &PartitionKey, shards: usize) -> usize {
    let digest = blake3::hash(key.as_str().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % shards.max(1) as u64) as usize
}

/// Sending side of every window shard.
#[derive(Clone)]
pub struct ShardRouter {
    windows: Vec<ActorRef<WindowMsg>>,
}

impl ShardRouter {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Sends the event to the window actor owning its key.
    pub async fn admit(&self, event: EnrichedEvent) -> Result<(), ActorError> {
        let shard = shard_of(&event.partition_key, self.windows.len());
        self.windows[shard]
            .send(WindowMsg::Admit(Box::new(event)))
            .await
    }

    /// Sends a tick to every shard without waiting on full mailboxes; a busy
    /// shard picks up the next tick.
    pub fn tick(&self) {
        for window in &self.windows {
            let _ = window.try_send(WindowMsg::Tick);
        }
    }

    /// Asks every shard to close its open batches.
    pub async fn drain(&self) {
        for window in &self.windows {
            if let Err(e) = window.send(WindowMsg::Drain).await {
                warn!(shard = %window.name(), error = %e, "Shard gone before drain");
            }
        }
    }
}

/// Running shard actors.
pub struct Shards {
    pub router: ShardRouter,
    pub windows: Vec<JoinHandle<()>>,
    pub writers: Vec<JoinHandle<()>>,
}

/// Spawns one writer actor and one window actor per shard, the window actor
/// holding the only handle to its writer.
pub fn spawn_shards(
    settings: &PipelineSettings,
    sink: Arc<dyn StorageSink>,
    dead_letters: DeadLetterRelay,
    metrics: Metrics,
    clock: Arc<dyn Clock>,
) -> Shards {
    let count = settings.runtime.shards.max(1);
    let capacity = settings.runtime.mailbox_capacity;
    let mut refs = Vec::with_capacity(count);
    let mut windows = Vec::with_capacity(count);
    let mut writers = Vec::with_capacity(count);

    for shard in 0..count {
        let writer = WriterActor::new(
            SinkWriter::new(sink.clone(), settings.runtime.write_timeout),
            FailureRouter::new(settings.retry.clone()),
            dead_letters.clone(),
            metrics.clone(),
            clock.clone(),
        );
        let (writer_ref, writer_handle) = spawn_actor(format!("writer-{shard}"), capacity, writer);

        let window = WindowActor::new(
            Windower::new(settings.window.clone()),
            writer_ref,
            metrics.clone(),
            clock.clone(),
        );
        let (window_ref, window_handle) = spawn_actor(format!("window-{shard}"), capacity, window);

        refs.push(window_ref);
        windows.push(window_handle);
        writers.push(writer_handle);
    }

    info!(shards = count, "Spawned window and writer shards");
    Shards {
        router: ShardRouter { windows: refs },
        windows,
        writers,
    }
}
