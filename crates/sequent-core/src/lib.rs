//! sequent-core
//!
//! A single-worker task execution service: tasks are submitted from any
//! thread, run strictly in submission order on one dedicated thread, and
//! report back through settle-once [`TaskFuture`]s.
//!
//! # モジュール構成
//! - **domain**: ids と状態 (ServiceState, FutureState)
//! - **future**: settle-once cell (TaskFuture / Promise)
//! - **queue**: FIFO queue + TaskRecord / PendingTask
//! - **worker**: the dedicated worker thread loop
//! - **service**: ExecService (submit, shutdown, invoke_all / invoke_any) と ServiceBuilder
//! - **interrupt**: cooperative interruption of the worker and of blocking waits
//! - **config / observability / error**: ambient pieces
//!
//! ```
//! use sequent_core::{ExecService, TaskResult};
//!
//! let service = ExecService::new().unwrap();
//! let a = service.submit(|| Ok("A")).unwrap();
//! let b = service.submit(|| -> TaskResult<String> { Err("nope".into()) }).unwrap();
//!
//! assert_eq!(a.wait().unwrap(), "A");
//! assert!(b.wait().is_err());
//!
//! service.shutdown();
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod future;
pub mod interrupt;
pub mod observability;
pub mod service;

mod queue;
mod sync;
mod worker;

pub use config::ServiceConfig;
pub use domain::{FutureState, ServiceState, TaskId};
pub use error::{ExecError, TaskError, TaskFailure, TaskResult};
pub use future::TaskFuture;
pub use observability::ServiceStats;
pub use queue::PendingTask;
pub use service::{ExecService, ServiceBuilder};
