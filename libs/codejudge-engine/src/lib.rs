pub mod classifier;
pub mod error;
pub mod judge;
pub mod memory;
pub mod normalizer;
pub mod process;
pub mod reporter;
pub mod runner;
pub mod service;
pub mod store;
pub mod toolchain;
pub mod workspace;

pub use error::{EngineError, Result};
pub use judge::Judge;
pub use runner::{Executor, Preparation, RunnerLimits, ToolchainRunner};
pub use service::{Collaborators, JudgeService};
pub use toolchain::ToolchainRegistry;
pub use workspace::WorkspaceManager;
