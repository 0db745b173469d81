use engine_processing::window::batch::Batch;
use model::events::EnrichedEvent;

/// Messages for a window shard actor.
#[derive(Debug)]
pub enum WindowMsg {
    /// An enriched event whose partition key this shard owns.
    Admit(Box<EnrichedEvent>),

    /// Periodic age check.
    Tick,

    /// Close every open batch and hand it to the writer.
    Drain,
}

/// Messages for a shard's writer actor.
#[derive(Debug)]
pub enum WriterMsg {
    /// A closed batch, delivered in close order.
    Write(Batch),
}
