use std::collections::BTreeSet;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use super::Frame;
use crate::error::PlanError;

lazy_static! {
    static ref FRAME_ITEM: Regex =
        Regex::new(r"^(-?\d+)(?:\s*-\s*(-?\d+)(?:\s*x\s*(\d+))?)?$").expect("FRAME_ITEM is valid");
}

/// A parsed frame list such as `1-10,20,30-40x2`. Frames are sorted and unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameList(Vec<Frame>);

impl FrameList {
    pub fn parse(input: &str) -> Result<Self, PlanError> {
        let invalid = || PlanError::InvalidFrameList(input.to_string());
        let mut frames = BTreeSet::new();

        for item in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let caps = FRAME_ITEM.captures(item).ok_or_else(invalid)?;
            let start: Frame = caps[1].parse().map_err(|_| invalid())?;
            let end: Frame = match caps.get(2) {
                Some(m) => m.as_str().parse().map_err(|_| invalid())?,
                None => start,
            };
            let step: usize = match caps.get(3) {
                Some(m) => m.as_str().parse().map_err(|_| invalid())?,
                None => 1,
            };
            if end < start || step == 0 {
                return Err(invalid());
            }
            frames.extend((start..=end).step_by(step));
        }

        Ok(Self(frames.into_iter().collect()))
    }

    pub fn frames(&self) -> &[Frame] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Frame> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for FrameList {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
