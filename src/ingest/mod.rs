mod orchestrator;

pub use orchestrator::IngestOrchestrator;
