//! # bbs-converger
//!
//! The process that owns the `converge_lock`. While it holds the lock it
//! periodically gathers a validated [`bbs::ConvergenceInput`], pruning
//! invalid LRP records as a side effect.

pub mod config;
pub mod worker;

pub use config::Config;
pub use worker::ConvergenceWorker;
