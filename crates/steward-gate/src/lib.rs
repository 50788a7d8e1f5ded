//! Approval Gates: suspend a step until a human decides.
//!
//! A gate is the one piece of state written from both sides of the
//! execution/interaction boundary. The execution side opens it and waits;
//! the interaction side resolves it. The handoff is a oneshot channel
//! guarded by a mutex, so exactly one resolution is ever observed.
//!
//! ## Invariants
//!
//! - A gate is resolved at most once; later attempts get
//!   [`GateError::AlreadyResolved`].
//! - At most one open gate per step; a second `open` gets
//!   [`GateError::GateAlreadyOpen`].
//! - Cancellation releases the waiter with [`GateOutcome::Cancelled`] and
//!   counts as a resolution for the purpose of the first rule.
//!
//! ## Components
//!
//! - [`ApprovalGate`]: the per-step decision slot
//! - [`GateHandle`]: what the suspended execution path awaits
//! - [`GateBoard`]: the per-run set of gates, keyed by step

#![deny(unsafe_code)]

pub mod board;
pub mod error;
pub mod gate;

pub use board::GateBoard;
pub use error::{GateError, GateResult};
pub use gate::{ApprovalGate, GateHandle, GateOutcome, GatePhase};
