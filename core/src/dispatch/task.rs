use crate::error::InvalidRangeError;
use crate::graph::{BatchId, Frame};

/// Numeric values accepted as frame numbers. Conversions are exact:
/// fractional or non-finite values are rejected, never rounded.
pub trait IntoFrame: Copy {
    fn into_frame(self) -> Result<Frame, InvalidRangeError>;
}

macro_rules! exact_frame {
    ($($t:ty),*) => {
        $(
            impl IntoFrame for $t {
                fn into_frame(self) -> Result<Frame, InvalidRangeError> {
                    Ok(Frame::from(self))
                }
            }
        )*
    };
}

exact_frame!(i8, i16, i32, i64, u8, u16, u32);

impl IntoFrame for f64 {
    fn into_frame(self) -> Result<Frame, InvalidRangeError> {
        if self.is_finite()
            && self.fract() == 0.0
            && self >= Frame::MIN as f64
            && self < Frame::MAX as f64
        {
            Ok(self as Frame)
        } else {
            Err(InvalidRangeError::NonIntegral(self))
        }
    }
}

impl IntoFrame for f32 {
    fn into_frame(self) -> Result<Frame, InvalidRangeError> {
        f64::from(self).into_frame()
    }
}

/// `start <= end`, and the inclusive frame count fits in a frame number.
fn check_range(start: Frame, end: Frame) -> Result<(), InvalidRangeError> {
    if end < start {
        return Err(InvalidRangeError::Inverted { start, end });
    }
    if end.checked_sub(start).and_then(|d| d.checked_add(1)).is_none() {
        return Err(InvalidRangeError::TooWide { start, end });
    }
    Ok(())
}

/// One farm-schedulable unit: a contiguous frame range from one batch.
///
/// The range is either fully absent (a placeholder) or `start <= end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    number: u32,
    start: Option<Frame>,
    end: Option<Frame>,
    batch: Option<BatchId>,
}

impl Task {
    pub fn new(number: u32, batch: Option<BatchId>) -> Self {
        Self {
            number,
            start: None,
            end: None,
            batch,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn batch(&self) -> Option<BatchId> {
        self.batch
    }

    pub fn start_frame(&self) -> Option<Frame> {
        self.start
    }

    pub fn end_frame(&self) -> Option<Frame> {
        self.end
    }

    pub fn frame_range(&self) -> Option<(Frame, Frame)> {
        self.start.zip(self.end)
    }

    pub fn is_placeholder(&self) -> bool {
        self.frame_range().is_none()
    }

    /// Number of frames covered, inclusive.
    pub fn span(&self) -> Option<i64> {
        self.frame_range()
            .map(|(s, e)| e.saturating_sub(s).saturating_add(1))
    }

    pub fn frames(&self) -> impl Iterator<Item = Frame> {
        let (start, end) = self.frame_range().unwrap_or((1, 0));
        start..=end
    }

    /// `"7"` or `"7-9"`, as written in a farm frame list.
    pub fn frame_token(&self) -> Option<String> {
        self.frame_range().map(|(s, e)| {
            if s == e {
                s.to_string()
            } else {
                format!("{s}-{e}")
            }
        })
    }

    pub fn set_frame_range<F: IntoFrame>(&mut self, start: F, end: F) -> Result<(), InvalidRangeError> {
        let start = start.into_frame()?;
        let end = end.into_frame()?;
        check_range(start, end)?;
        self.start = Some(start);
        self.end = Some(end);
        Ok(())
    }

    /// Sets the range from strictly sequential frames. An empty list clears it.
    pub fn set_frame_range_from_list<F: IntoFrame>(&mut self, frames: &[F]) -> Result<(), InvalidRangeError> {
        let frames = frames
            .iter()
            .map(|f| f.into_frame())
            .collect::<Result<Vec<_>, _>>()?;

        let (Some(&first), Some(&last)) = (frames.first(), frames.last()) else {
            self.clear_frame_range();
            return Ok(());
        };
        for pair in frames.windows(2) {
            if pair[0].checked_add(1) != Some(pair[1]) {
                return Err(InvalidRangeError::NotSequential {
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
        check_range(first, last)?;

        self.start = Some(first);
        self.end = Some(last);
        Ok(())
    }

    pub fn set_start_frame<F: IntoFrame>(&mut self, start: F) -> Result<(), InvalidRangeError> {
        let start = start.into_frame()?;
        if let Some(end) = self.end {
            check_range(start, end)?;
        }
        self.start = Some(start);
        Ok(())
    }

    pub fn set_end_frame<F: IntoFrame>(&mut self, end: F) -> Result<(), InvalidRangeError> {
        let end = end.into_frame()?;
        if let Some(start) = self.start {
            check_range(start, end)?;
        }
        self.end = Some(end);
        Ok(())
    }

    pub fn clear_frame_range(&mut self) {
        self.start = None;
        self.end = None;
    }

    /// Widens the range to include `start..=end`. Never narrows it.
    pub(crate) fn inherit_frame_range(&mut self, start: Frame, end: Frame) {
        match self.frame_range() {
            Some((s, e)) => {
                self.start = Some(s.min(start));
                self.end = Some(e.max(end));
            }
            None => {
                self.start = Some(start);
                self.end = Some(end);
            }
        }
    }
}
