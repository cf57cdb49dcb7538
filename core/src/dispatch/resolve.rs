//! Picks the cheapest farm dependency primitive that keeps a job correct.

use std::collections::BTreeSet;

use serde::Serialize;

use super::{DependencyMode, JobKey};
use crate::graph::Frame;

pub type FrameSpan = (Frame, Frame);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    #[default]
    None,
    JobToJob,
    FrameToFrame,
    Scripted,
}

/// Upstream minus downstream bounds of a task pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FrameOffset {
    pub start: i64,
    pub end: i64,
}

/// Frame ranges at both ends of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFrames {
    pub upstream_job: JobKey,
    pub downstream: Option<FrameSpan>,
    pub upstream: Option<FrameSpan>,
}

impl EdgeFrames {
    pub fn offset(&self) -> Option<FrameOffset> {
        let (ds, de) = self.downstream?;
        let (us, ue) = self.upstream?;
        Some(FrameOffset {
            start: us - ds,
            end: ue - de,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DependencyPlan {
    pub kind: DependencyType,
    /// Declared frame offset. Auto mode sets it only when every edge shares
    /// one offset pair; explicit Job and Frame modes always declare one,
    /// falling back to zero.
    pub offset: Option<FrameOffset>,
}

/// Resolves the dependency declaration for one job.
///
/// `coverage` holds the frame spans of every task in the job.
pub fn resolve_dependency_type(
    mode: DependencyMode,
    edges: &[EdgeFrames],
    coverage: &[FrameSpan],
) -> DependencyPlan {
    if edges.is_empty() {
        return DependencyPlan::default();
    }

    match mode {
        DependencyMode::None => DependencyPlan::default(),
        DependencyMode::Job => DependencyPlan {
            kind: DependencyType::JobToJob,
            offset: Some(simple_frame_offset(edges).unwrap_or_default()),
        },
        DependencyMode::Frame => DependencyPlan {
            kind: DependencyType::FrameToFrame,
            offset: Some(simple_frame_offset(edges).unwrap_or_default()),
        },
        DependencyMode::Script => DependencyPlan {
            kind: DependencyType::Scripted,
            offset: None,
        },
        DependencyMode::Auto => {
            if let Some(offset) = simple_frame_offset(edges) {
                DependencyPlan {
                    kind: DependencyType::FrameToFrame,
                    offset: Some(offset),
                }
            } else if coverage_within_parents(edges, coverage) {
                DependencyPlan {
                    kind: DependencyType::FrameToFrame,
                    offset: None,
                }
            } else {
                DependencyPlan {
                    kind: DependencyType::Scripted,
                    offset: None,
                }
            }
        }
    }
}

/// The offset shared by every edge, if there is exactly one.
pub fn simple_frame_offset(edges: &[EdgeFrames]) -> Option<FrameOffset> {
    let first = edges.first()?.offset()?;
    for edge in &edges[1..] {
        if edge.offset()? != first {
            return None;
        }
    }
    Some(first)
}

/// True when, for every upstream job, the frames this job covers are a
/// subset of the frames covered by the upstream tasks it depends on.
pub fn coverage_within_parents(edges: &[EdgeFrames], coverage: &[FrameSpan]) -> bool {
    let mut parents: Vec<(JobKey, BTreeSet<Frame>)> = Vec::new();
    for edge in edges {
        let Some((start, end)) = edge.upstream else {
            return false;
        };
        let pos = match parents.iter().position(|(k, _)| *k == edge.upstream_job) {
            Some(pos) => pos,
            None => {
                parents.push((edge.upstream_job, BTreeSet::new()));
                parents.len() - 1
            }
        };
        parents[pos].1.extend(start..=end);
    }
    if parents.is_empty() {
        return false;
    }

    let covered: BTreeSet<Frame> = coverage.iter().flat_map(|&(s, e)| s..=e).collect();
    parents.iter().all(|(_, frames)| covered.is_subset(frames))
}
