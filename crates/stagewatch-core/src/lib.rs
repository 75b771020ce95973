pub mod condition;
pub mod config;
pub mod deps;
pub mod poller;
pub mod preset;
pub mod tracker;
pub mod waiter;

pub use condition::{Condition, ConditionSet, ConditionStatus};
pub use config::{BackoffStrategy, PollConfig};
pub use deps::DependencyMap;
pub use poller::{ConditionPoller, ResourceGetter, StageFailure};
pub use preset::{ServicePreset, service_stages};
pub use tracker::{RecordingTracker, Stage, StageBook, StageState, StageTracker, TrackerEvent};
pub use waiter::{Clock, ManualClock, OperationPoller, SystemClock, poll_until_done};

pub use stagewatch_error::{Error, ErrorKind, ErrorStatus, Result};
