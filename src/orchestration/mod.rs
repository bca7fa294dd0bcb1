pub mod pipeline_orchestrator;

pub use pipeline_orchestrator::{
    Delivery, OrchestratorStats, PipelineBoundaries, PipelineOrchestrator,
};
