use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::graph::Frame;

pub const JOB_COMPLETE: &str = "Job Complete";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    /// Task-wide percentage printed by the executor itself.
    Percent,
    MeshFrame,
    MeshVoxel,
    /// Percentage of the current frame, folded into the task range.
    FramePercent,
    Failure,
    FrameDone,
    FrameStart,
    Complete,
}

lazy_static! {
    static ref RULES: Vec<(Regex, Rule)> = [
        (r".*Progress: (\d+)%.*", Rule::Percent),
        (r".*ALF_PROGRESS\s*(\d+)%.*", Rule::Percent),
        (r".*Subdividing frame ([0-9]+) of ([0-9]+).*", Rule::MeshFrame),
        (r".*Processing voxel ([0-9]+) of ([0-9]+).*", Rule::MeshVoxel),
        (r"([0-9]+)% done", Rule::FramePercent),
        (r"error:.*", Rule::Failure),
        (r".*Rendering image.*:\s*([0-9]*\.[0-9]*)%.*", Rule::FramePercent),
        (r".*Rendering image...: done.*", Rule::FrameDone),
        (r".*Starting frame ([0-9]*).*", Rule::FrameStart),
        (r".*Closing log.*", Rule::Complete),
        (r".*Frame took.*", Rule::Complete),
    ]
    .into_iter()
    .map(|(pattern, rule)| (Regex::new(pattern).expect("progress rule is valid"), rule))
    .collect();
}

/// What one stdout line changed. Empty when no rule matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// The task should fail with this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ProgressUpdate {
    pub fn is_empty(&self) -> bool {
        self.progress.is_none() && self.status.is_none() && self.failure.is_none()
    }
}

/// Task progress over `start..=end`.
///
/// A single-frame task reports the tool progress unchanged.
pub fn overall_progress(start: Frame, end: Frame, current: Frame, tool: f64) -> f64 {
    if start == end {
        return tool.clamp(0.0, 100.0);
    }
    let total = (end - start + 1) as f64;
    let value = (1.0 / total) * tool + ((current - start) as f64 / total) * 100.0;
    value.clamp(0.0, 100.0)
}

/// Reads executor stdout for one farm task. Every rule matching a line is
/// applied, in table order.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    start: Frame,
    end: Frame,
    current_frame: Frame,
    tool_progress: f64,
    mesh_frame: f64,
    mesh_frames: f64,
}

impl ProgressTracker {
    pub fn new(start: Frame, end: Frame) -> Self {
        Self {
            start,
            end,
            current_frame: start,
            tool_progress: 0.0,
            mesh_frame: 0.0,
            mesh_frames: 0.0,
        }
    }

    pub fn current_frame(&self) -> Frame {
        self.current_frame
    }

    pub fn observe(&mut self, line: &str) -> ProgressUpdate {
        let mut update = ProgressUpdate::default();
        for (regex, rule) in RULES.iter() {
            if let Some(caps) = regex.captures(line) {
                self.apply(*rule, &caps, &mut update);
            }
        }
        update
    }

    fn apply(&mut self, rule: Rule, caps: &Captures<'_>, update: &mut ProgressUpdate) {
        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());
        match rule {
            Rule::Percent => {
                if let Some(value) = number(1) {
                    update.progress = Some(value.clamp(0.0, 100.0));
                }
            }
            Rule::MeshFrame => {
                let (Some(frame), Some(frames)) = (number(1), number(2)) else {
                    return;
                };
                if frames <= 0.0 {
                    return;
                }
                self.mesh_frame = frame - 1.0;
                self.mesh_frames = frames;
                update.progress = Some((self.mesh_frame / frames * 100.0).clamp(0.0, 100.0));
                update.status = Some(format!("Ply2Vrmesh: frame {}/{}", self.mesh_frame, frames));
            }
            Rule::MeshVoxel => {
                let (Some(voxel), Some(voxels)) = (number(1), number(2)) else {
                    return;
                };
                if voxels <= 0.0 || self.mesh_frames <= 0.0 {
                    return;
                }
                let voxel = voxel - 1.0;
                let value = (self.mesh_frame / self.mesh_frames
                    + (voxel / voxels) / self.mesh_frames)
                    * 100.0;
                update.progress = Some(value.clamp(0.0, 100.0));
                update.status = Some(format!(
                    "Ply2Vrmesh: Processing Voxel {voxel}/{voxels} @ frame {}/{}",
                    self.mesh_frame, self.mesh_frames
                ));
            }
            Rule::FramePercent => {
                if let Some(value) = number(1) {
                    self.tool_progress = value;
                    update.progress = Some(self.overall());
                }
            }
            Rule::FrameDone => {
                self.tool_progress = 100.0;
                update.progress = Some(self.overall());
            }
            Rule::Failure => {
                update.failure = Some(caps[0].to_string());
            }
            Rule::FrameStart => {
                if let Some(frame) = caps.get(1).and_then(|m| m.as_str().parse::<Frame>().ok()) {
                    self.current_frame = frame;
                    update.status = Some(format!("Rendering Frame - {frame}"));
                }
            }
            Rule::Complete => {
                update.status = Some(JOB_COMPLETE.to_string());
            }
        }
    }

    fn overall(&self) -> f64 {
        overall_progress(self.start, self.end, self.current_frame, self.tool_progress)
    }
}
