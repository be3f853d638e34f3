pub mod history;
pub mod orchestrator;
pub mod upload;
