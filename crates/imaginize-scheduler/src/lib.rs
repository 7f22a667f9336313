pub mod error;
pub mod scheduler;
pub mod types;

pub use error::{classify_status, ClassifiedError, ErrorClass, SchedulerError};
pub use scheduler::Scheduler;
pub use types::{CancellationToken, SchedulerConfig};
