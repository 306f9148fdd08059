pub mod error;
pub mod mission;
pub mod navigate;
pub mod selectors;
pub mod steps;
pub mod verify;

pub use error::RunError;
pub use mission::{MissionRunner, RunOutcome, apply_corrections};
pub use selectors::{ActionIntent, Resolution, SelectorResolver};
pub use steps::StepEngine;
pub use verify::TripleChecker;
