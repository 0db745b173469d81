use crate::summary::PipelineSummary;
use engine_core::error::DeadLetterError;
use thiserror::Error;

/// Top-level errors for a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline halted: a terminal failure could not be dead-lettered or
    /// the drain did not finish in time. Carries the counts at halt time.
    #[error("Pipeline halted: {reason}")]
    Fatal {
        reason: String,
        summary: Box<PipelineSummary>,
    },

    /// Dead-letter emission failed; escalated to `Fatal` by the orchestrator.
    #[error("Dead-letter emission failed: {0}")]
    DeadLetter(#[from] DeadLetterError),

    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    /// A worker task panicked or was aborted.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Common error type for all actors in the engine.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Mailbox closed")]
    MailboxClosed,

    /// The actor cannot continue; its loop stops after this message.
    #[error("Actor halted: {0}")]
    Halted(String),
}
