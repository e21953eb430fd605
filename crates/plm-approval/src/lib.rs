//! plm-approval
//!
//! The Approval state machine and its single choke-point gateway (§4.6).

pub mod gateway;
pub mod state_machine;

pub use gateway::ApprovalGateway;
pub use state_machine::{
    check_authorise, check_request_release, ApprovalRefusal, AuthoriseWrite, RequestReleaseWrite,
};
