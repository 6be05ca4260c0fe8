//! Job orchestration: the job state machine, the orchestrator that runs
//! jobs over a shared fetch pool, and the progress notification port

mod orchestrator;
mod pool;
mod progress;
mod state;

pub use orchestrator::{EntryUrl, Orchestrator};
pub use pool::{PauseFlag, SessionGate, WorkerPool};
pub use progress::{
    BroadcastNotifier, NullNotifier, ProgressEvent, ProgressNotifier, ProgressTopic,
};
pub use state::{JobStatus, JobType};
