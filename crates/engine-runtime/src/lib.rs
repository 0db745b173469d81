pub mod actor;
pub mod check;
pub mod error;
pub mod fatal;
pub mod orchestrator;
pub mod summary;

#[cfg(test)]
mod tests;
