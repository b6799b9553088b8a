pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod expire;
pub mod operation;
pub mod reconcile;
pub mod refresh;
pub mod repo;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use error::{LifecycleError, Result};
