//! # Kestrel Tasks
//!
//! Bounded background task queue for the Kestrel framework.
//!
//! Work submitted here is decoupled from the request that triggered it: the
//! submitter gets a [`TaskHandle`] back immediately, the task runs on a fixed
//! pool of blocking workers, and any error or panic is logged and reported to
//! completion callbacks instead of reaching the submitter.
//!
//! ```rust,no_run
//! use kestrel_tasks::{BackgroundQueue, QueueConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = BackgroundQueue::with_config(QueueConfig::new().with_workers(4));
//!
//!     queue.on_complete(|report| {
//!         println!("{} finished: {}", report.name, report.outcome);
//!     });
//!
//!     let handle = queue
//!         .submit("resize-image", || {
//!             // blocking work
//!             Ok(())
//!         })
//!         .unwrap();
//!     let _ = handle.id();
//!
//!     // Before exit, give in-flight work a chance to finish.
//!     queue.drain(Duration::from_secs(5)).await;
//! }
//! ```
//!
//! | Operation | Runs on | Takes a worker slot |
//! |-----------|---------|---------------------|
//! | [`BackgroundQueue::submit`] | blocking pool | yes |
//! | [`BackgroundQueue::submit_async`] | async runtime | no |
//! | [`BackgroundQueue::run_as_task`] | blocking pool | yes |
//! | [`BackgroundQueue::call`] | blocking pool, awaited | no |

#![doc(html_root_url = "https://docs.rs/kestrel-tasks/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod queue;
mod task;

pub use error::{TaskError, TaskResult};
pub use queue::{default_workers, BackgroundQueue, QueueConfig};
pub use task::{TaskHandle, TaskId, TaskOutcome, TaskReport, TaskStats};
