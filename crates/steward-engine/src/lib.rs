//! Steward Engine - execution side of a Steward run
//!
//! The engine owns everything that happens on the execution thread: it asks
//! a [`Planner`] for a draft, validates it into a task plan, and walks the
//! plan step by step, delegating each step to a registered [`Worker`].
//!
//! # Key Concepts
//!
//! - **WorkerRegistry**: name → worker lookup, populated before any run.
//! - **WorkerOutcome**: a closed set of results: a payload, a request for
//!   human approval, or an error. Workers never touch plan state.
//! - **Orchestrator**: drives one plan. Suspends on approval gates without
//!   holding a thread, resumes when the interaction side decides.
//! - **RunRecorder**: optional persistence hook. Its failures are logged,
//!   never fatal.
//! - **NotificationBus**: ordered, lossless fan-out of notifications to every
//!   subscriber.
//!
//! # Design Principles
//!
//! 1. No automatic retry. A failed step fails its dependents by leaving them
//!    pending; independent steps still run.
//! 2. Every notification carries an owned snapshot.
//! 3. Cancellation is cooperative: an in-flight worker finishes, nothing new
//!    starts.

#![deny(unsafe_code)]

pub mod error;
pub mod events;
pub mod mocks;
pub mod orchestrator;
pub mod planner;
pub mod recorder;
pub mod registry;
pub mod settings;
pub mod tools;
pub mod worker;

pub use error::{OrchestratorError, OrchestratorResult, PlannerError, RecorderError, RegistryError};
pub use events::{NotificationBus, NotificationHub, ProgressSink, Subscription};
pub use mocks::{FailingWorker, GatedWorker, PanickingWorker, ScriptedWorker, StaticWorker};
pub use orchestrator::{Orchestrator, StepReport};
pub use planner::{Planner, StaticPlanner};
pub use recorder::{InMemoryRunRecorder, NoopRunRecorder, RunRecorder};
pub use registry::WorkerRegistry;
pub use settings::ExecutionSettings;
pub use tools::{NoTools, ToolError, ToolInvoker, ToolRequest, ToolResponse};
pub use worker::{Worker, WorkerContext, WorkerOutcome};
