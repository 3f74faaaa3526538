//! Concrete downloaders and executors for relay jobs.
//!
//! [`ExecFactory`] is the [`relay_core::WorkloadFactory`] the agent binary plugs into the
//! scheduler.

pub mod download;
pub use download::{ArchiveDownloader, GitDownloader};

mod install;
pub use install::RunnerInstalls;

mod native;
pub use native::{DEFAULT_EXECUTABLES, NativeRunnerExecutor};

mod script;
pub use script::GenericScriptExecutor;

mod factory;
pub use factory::{ExecFactory, ExecSettings};

pub mod proc;
pub mod util;
