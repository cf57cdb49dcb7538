//! farmspool core: compiles a batch dependency tree into render-farm jobs.
//!
//! ```text
//!  BatchSource ──build──▶ JobGraph ──link/prune──▶ JobGraph ──submit──▶ FarmGateway
//!  (graph::*)            (dispatch::compiler)                (dispatch::dispatcher)
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod launcher;
pub mod release;
