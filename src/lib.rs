//! Feed aggregation with per-item read and bookmark state that survives
//! refreshes, restarts and other machines.

pub mod config;
pub mod feed;
pub mod store;
pub mod sync;
pub mod util;
