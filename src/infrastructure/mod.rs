mod backoff;
mod task_manager;

pub use backoff::{BackoffTimer, DelayFn};
pub use task_manager::TaskManager;
