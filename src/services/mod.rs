//! Application services: the stage pipeline, the iteration loop, and their
//! collaborators.

pub mod command_tracker;
pub mod context;
pub mod delivery;
pub mod multi_repo;
pub mod orchestrator;
pub mod prompts;
pub mod stage_runner;

pub use command_tracker::CommandTracker;
pub use delivery::{DeliveryLoop, DeliveryVerdict};
pub use multi_repo::MultiRepoManager;
pub use orchestrator::{Orchestrator, TaskInput};
pub use stage_runner::StageRunner;
