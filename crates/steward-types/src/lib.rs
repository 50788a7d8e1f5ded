//! Steward Domain Types
//!
//! A Steward run turns one user request into a **task plan**: an ordered
//! list of steps, each delegated to a named worker. Some steps cannot
//! finish until a human has looked at what the worker proposes and
//! approved (possibly editing) or rejected it.
//!
//! # Key Concepts
//!
//! - **TaskPlan**: the ordered steps for one request plus an aggregate status.
//! - **Step**: one unit of work bound to a worker, with a monotonic status.
//! - **ApprovalRequest**: the proposal a human must decide on before a step
//!   can complete. Resolved exactly once, immutable afterwards.
//! - **RunRecord**: the lifecycle shape handed to run recorders.
//! - **Notification**: what the execution side tells the interaction side.
//!
//! # Design Principles
//!
//! 1. Step transitions only move forward. `advance` rejects anything else.
//! 2. A plan is `Completed` only when every step is `Completed`.
//! 3. The interaction side sees snapshots, never the live plan.

#![deny(unsafe_code)]

mod approval;
mod errors;
mod ids;
mod notification;
mod plan;
mod record;
mod status;

pub use approval::*;
pub use errors::*;
pub use ids::*;
pub use notification::*;
pub use plan::*;
pub use record::*;
pub use status::*;
