use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::graph::Frame;

lazy_static! {
    static ref FRAME_TOKEN: Regex =
        Regex::new(r"(?i)<(STARTFRAME|ENDFRAME)(?:%([0-9]+))?>").expect("FRAME_TOKEN is valid");
}

/// Replaces `<STARTFRAME>` and `<ENDFRAME>` (case-insensitive) with the task
/// bounds. `<STARTFRAME%4>` zero-pads to four digits.
pub fn expand_frame_tokens(template: &str, start: Frame, end: Frame) -> String {
    FRAME_TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            let frame = if caps[1].eq_ignore_ascii_case("STARTFRAME") {
                start
            } else {
                end
            };
            let width = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .unwrap_or(0);
            format!("{frame:0width$}")
        })
        .into_owned()
}
