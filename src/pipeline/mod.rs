pub mod extract;
pub mod orchestrator; // Message Processing Orchestrator
pub mod triage;

pub use orchestrator::{MessagePipeline, PipelineIssue, PipelineResult, PipelineStep};
