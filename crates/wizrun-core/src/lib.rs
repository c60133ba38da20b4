pub mod args;
pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod graph;
pub mod model;
pub mod progress;
pub mod traits;
pub mod types;
pub mod value;

pub use args::{Arg, ArgDef, ArgList, ArgSpec};
pub use config::WizrunConfig;
pub use error::{Result, WizardError};
pub use event::{EventBus, WizardEvent};
pub use graph::{Graph, Item, ItemKind, Port, PortRef, SharedGraph};
pub use model::ModelRegistry;
pub use progress::TracingProgress;
pub use traits::{DataModel, GraphLoader, ProgressSink, Step, StepContext};
pub use types::*;
pub use value::{Handle, Value};
