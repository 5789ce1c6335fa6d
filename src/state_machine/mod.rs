mod job;
mod state;

pub use job::{FailureKind, Job, JobKind, JobStatus, JobUpdate, TargetType};
pub use state::{Event, SERVER_FAILURE_MESSAGE, StateMachine, TransitionError};
