//! The NACM (RFC 8341) access-control engine: config ingest, session
//! state, the per-session rule cache, and the decision engine itself.

pub mod cache;
pub mod config;
pub mod engine;
pub mod state;

pub use cache::NacmCache;
pub use config::NacmConfig;
pub use engine::{Access, Engine};
pub use state::{AccessMode, EditOp, NacmState};
