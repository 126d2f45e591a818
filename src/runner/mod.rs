//! Stage execution: building invocations, running them, and retrying.

pub mod command;
pub mod invoker;
pub mod policy;
mod stage_runner;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{Invocation, SESSION_ENV_VAR, build_invocation, curriculum_for};
pub use invoker::{AttemptOutcome, ProcessInvoker, StageInvoker};
pub use policy::{FailureClassifier, RetryPolicy};
pub use stage_runner::StageRunner;
