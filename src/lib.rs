pub mod config;
pub mod context;
pub mod core;
pub mod daemon;
pub mod logging;
pub mod repo;
pub mod rpc;
pub mod serialization;
