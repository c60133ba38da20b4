pub mod builtin;
pub mod context;
pub mod executor;
pub mod invoker;
pub mod registry;
pub mod resolver;
pub mod tasks;

pub use context::{AbortHandle, RunContext};
pub use executor::{Executor, ItemResult, RunOptions, RunReport, SkippedConnection};
pub use invoker::{Invocation, Invoker};
pub use registry::StepRegistry;
pub use resolver::{Compatibility, SubtypeRegistry, TypeResolver};
pub use tasks::{BackgroundTask, TaskRegister};

use std::sync::Arc;

/// Build an executor over `registry` with a fresh task register.
pub fn executor(registry: StepRegistry, resolver: TypeResolver) -> Executor {
    let invoker = Invoker::new(Arc::new(registry), Arc::new(TaskRegister::new()));
    Executor::new(invoker, resolver)
}
