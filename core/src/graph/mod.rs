//! Upstream batch trees.
//!
//! A batch is one (node, context, frames) unit of work produced by a node
//! graph. The compiler only needs read access through [`BatchSource`];
//! [`BatchTree`] is the in-memory arena used by the planner and by tests.

pub mod batch;
pub mod frames;
pub mod node;
pub mod plan;

pub use batch::{Batch, BatchId, BatchSource, BatchTree, Context, Frame, NodeId};
pub use frames::FrameList;
pub use node::{Node, NodeKind};
pub use plan::{plan, FrameMode, GraphSpec, InputSpec, NodeSpec, NodeType, Plan, PlanRequest};
