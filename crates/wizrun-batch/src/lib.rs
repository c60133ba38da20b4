pub mod description;
pub mod driver;
pub mod fileset;

pub use description::{BatchDescription, BatchInput, BatchRun, FileSetConfig, InputSource};
pub use driver::{BatchDriver, BatchReport, RunSummary};
pub use fileset::FileSet;
