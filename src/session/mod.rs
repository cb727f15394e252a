//! Session bookkeeping for the Theia SDK.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, SessionLog, SessionStats,
    SharedSessionLog,
};
