//! Service layer driving workflows through their stages.

mod orchestration;
mod payload;
mod policy;

pub use orchestration::{
    CreateWorkflowRequest, OrchestrationError, OrchestrationResult, OrchestrationService,
    Pipeline,
};
pub use payload::build_payload;
pub use policy::{PartialPolicy, StagePolicies, StagePolicy, failed_blocking_gates};
