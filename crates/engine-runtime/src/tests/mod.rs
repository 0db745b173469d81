pub mod fakes;
mod orchestrator;
