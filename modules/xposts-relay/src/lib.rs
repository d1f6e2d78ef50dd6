pub mod backoff;
pub mod config;
pub mod cycle;
pub mod error;
pub mod filter;
pub mod notify;
pub mod poller;
pub mod scheduler;
pub mod seen_store;
pub mod source;

pub use config::{AccountDescriptor, Config, SinkConfig};
pub use cycle::{AccountWatcher, CycleStats};
pub use error::{RelayError, Result};
pub use scheduler::{CycleScheduler, NextRun};
pub use source::{JobSource, MasaSource};
