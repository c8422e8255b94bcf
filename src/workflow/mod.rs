pub mod verification;

pub use verification::{
    clamp_award, default_award, reassign_invalidation, verification_invalidation, CloseReason,
    VerificationWorkflow, WorkflowState,
};
