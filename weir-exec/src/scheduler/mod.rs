//! Task scheduling: the worker pool and the DAG controller.

pub mod dag;
mod pool;
mod task;

pub use dag::DagController;
pub use pool::TaskScheduler;
pub use task::{CancelHandle, CancellationSource, Task, TaskResult};
