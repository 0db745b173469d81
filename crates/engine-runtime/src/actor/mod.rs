pub mod actor;
pub mod messages;
pub mod spawn;
pub mod window;
pub mod writer;

pub use actor::{Actor, ActorContext, ActorRef};
