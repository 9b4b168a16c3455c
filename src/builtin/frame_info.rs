//! `frame_info`: logs the format of passing frames and forwards them.

use crate::error::Result;
use crate::frame::{format, Frame};
use crate::params::{Parameter, ParameterSet};
use crate::pipeline::{base_params, FilterNode, IoFilter, Node, NodeInit};

pub const CLASS: &str = "frame_info";

pub fn configure() -> ParameterSet {
    let mut p = base_params().with_description("Prints information about passing frames");
    p.define(
        "print_all",
        false,
        "Print info about every frame. If false, only frames after a format change are printed",
    );
    p.set_max_pipes(Some(1), Some(1));
    p
}

pub fn create(_init: NodeInit) -> Result<Box<dyn Node>> {
    Ok(Box::new(FilterNode::new(FrameInfo::default())))
}

#[derive(Debug, Default)]
pub struct FrameInfo {
    print_all: bool,
    last_frame: Option<Frame>,
    printed: usize,
}

impl FrameInfo {
    pub fn printed(&self) -> usize {
        self.printed
    }
}

/// Human-readable one-line summary of a frame.
pub fn describe(frame: &Frame) -> String {
    let name = format::format_name(frame.format());
    match frame {
        Frame::RawVideo(f) => {
            format!("Frame with format '{}', resolution {}", name, f.resolution())
        }
        Frame::CompressedVideo(f) => {
            format!("Frame with format '{}', resolution {}", name, f.resolution())
        }
        Frame::RawAudio(f) => format!(
            "Frame with format '{}', sampling rate {}Hz, {} channels",
            name,
            f.sampling_frequency(),
            f.channel_count()
        ),
    }
}

impl IoFilter for FrameInfo {
    fn set_param(&mut self, param: &Parameter) -> bool {
        if param.name == "print_all" {
            self.print_all = param.value.as_bool().unwrap_or(false);
            return true;
        }
        false
    }

    fn process(&mut self, frame: Frame) -> Result<Option<Frame>> {
        let changed = self
            .last_frame
            .as_ref()
            .map_or(true, |last| !last.same_format(&frame));
        if self.print_all || changed {
            tracing::info!("{}", describe(&frame));
            self.printed += 1;
        }
        self.last_frame = Some(frame.clone());
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::format::{RGB24, S16, Y8};
    use crate::frame::{RawAudioFrame, RawVideoFrame, Resolution};

    fn video(format: crate::frame::FormatId, w: usize) -> Frame {
        RawVideoFrame::create_empty(format, Resolution::new(w, 2), false)
            .unwrap()
            .into()
    }

    #[test]
    fn test_prints_only_on_change() {
        let mut info = FrameInfo::default();
        info.process(video(Y8, 4)).unwrap();
        info.process(video(Y8, 4)).unwrap();
        info.process(video(RGB24, 4)).unwrap();
        info.process(video(RGB24, 8)).unwrap();
        assert_eq!(info.printed(), 3);
    }

    #[test]
    fn test_print_all() {
        let mut info = FrameInfo::default();
        assert!(info.set_param(&Parameter::new("print_all", true)));
        info.process(video(Y8, 4)).unwrap();
        info.process(video(Y8, 4)).unwrap();
        assert_eq!(info.printed(), 2);
    }

    #[test]
    fn test_describe_audio() {
        let frame: Frame = RawAudioFrame::create_empty(S16, 2, 48_000, 10).unwrap().into();
        assert_eq!(
            describe(&frame),
            "Frame with format 's16', sampling rate 48000Hz, 2 channels"
        );
    }
}
