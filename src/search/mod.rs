pub mod fuzzy;
pub mod orchestrator;
