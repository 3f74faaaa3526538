mod job;
pub use job::{JobDescriptor, JobKind};

mod params;
pub use params::{GenericScriptParams, NativeRunnerParams};

mod source;
pub use source::{GitRepository, ProjectSource};
