//! Collaborator seams the pipeline runs against: the ingestion source, the
//! object store, the dead-letter channel and the reference-data lookup.

pub mod dead_letter;
pub mod lookup;
pub mod sink;
pub mod source;
