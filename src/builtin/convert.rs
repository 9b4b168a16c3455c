//! Built-in pixel format converters.
//!
//! - `rgb_swap`: RGB ↔ BGR channel order, 24 and 32 bit
//! - `rgb_to_y8`: packed RGB/BGR to 8-bit luma
//!
//! Both receive the negotiated pair through `format_in` / `format_out`.

use crate::error::{MediaFlowError, Result};
use crate::frame::format::{BGR24, BGRA32, RGB24, RGBA32, Y8};
use crate::frame::{format, FormatId, Frame, RawVideoFrame};
use crate::params::{ParamValue, ParameterSet};
use crate::pipeline::{base_params, FilterNode, IoFilter, Node, NodeInit, RegistryContext};

pub const RGB_SWAP: &str = "rgb_swap";
pub const RGB_TO_Y8: &str = "rgb_to_y8";

/// Converter pairs in registration order.
const SWAP_PAIRS: &[(FormatId, FormatId)] = &[
    (RGB24, BGR24),
    (BGR24, RGB24),
    (RGBA32, BGRA32),
    (BGRA32, RGBA32),
];

const LUMA_INPUTS: &[FormatId] = &[RGB24, BGR24, RGBA32, BGRA32];

pub fn register(ctx: &RegistryContext) {
    for &(input, output) in SWAP_PAIRS {
        ctx.register_converter(input, output, RGB_SWAP, create_swap, configure_swap);
    }
    for &input in LUMA_INPUTS {
        ctx.register_converter(input, Y8, RGB_TO_Y8, create_luma, configure_luma);
    }
}

fn converter_params(description: &str, inputs: &[FormatId], outputs: &[FormatId]) -> ParameterSet {
    let mut p = base_params().with_description(description);
    p.define("format_in", ParamValue::Format(FormatId::UNKNOWN), "Input format")
        .define("format_out", ParamValue::Format(FormatId::UNKNOWN), "Output format");
    p.set_input_formats(inputs.iter().copied());
    p.set_output_formats(outputs.iter().copied());
    p.set_max_pipes(Some(1), Some(1));
    p
}

pub fn configure_swap() -> ParameterSet {
    converter_params(
        "Swaps red and blue channels",
        &[RGB24, BGR24, RGBA32, BGRA32],
        &[RGB24, BGR24, RGBA32, BGRA32],
    )
}

pub fn configure_luma() -> ParameterSet {
    converter_params("Converts packed RGB to 8-bit luma", LUMA_INPUTS, &[Y8])
}

fn negotiated(init: &NodeInit) -> Result<(FormatId, FormatId)> {
    let input = init.params.get_format("format_in").unwrap_or_default();
    let output = init.params.get_format("format_out").unwrap_or_default();
    if !input.is_known() || !output.is_known() {
        return Err(MediaFlowError::init_failed(
            &init.class,
            "'format_in' and 'format_out' must name known formats",
        ));
    }
    Ok((input, output))
}

pub fn create_swap(init: NodeInit) -> Result<Box<dyn Node>> {
    let (input, output) = negotiated(&init)?;
    if !SWAP_PAIRS.contains(&(input, output)) {
        return Err(MediaFlowError::init_failed(
            RGB_SWAP,
            format!(
                "cannot convert {} to {}",
                format::format_name(input),
                format::format_name(output)
            ),
        ));
    }
    Ok(Box::new(FilterNode::new(RgbSwap::new(output))))
}

pub fn create_luma(init: NodeInit) -> Result<Box<dyn Node>> {
    let (input, output) = negotiated(&init)?;
    if !LUMA_INPUTS.contains(&input) || output != Y8 {
        return Err(MediaFlowError::init_failed(
            RGB_TO_Y8,
            format!("cannot convert {} to y8", format::format_name(input)),
        ));
    }
    Ok(Box::new(FilterNode::new(RgbToY8)))
}

/// Byte offsets of R, G, B and the pixel size.
fn channels(format: FormatId) -> Option<([usize; 3], usize)> {
    match format {
        RGB24 => Some(([0, 1, 2], 3)),
        BGR24 => Some(([2, 1, 0], 3)),
        RGBA32 => Some(([0, 1, 2], 4)),
        BGRA32 => Some(([2, 1, 0], 4)),
        _ => None,
    }
}

fn unsupported(frame: &Frame) -> MediaFlowError {
    MediaFlowError::Pipe(format!(
        "unexpected frame format {}",
        format::format_name(frame.format())
    ))
}

/// Allocate the output frame, inheriting geometry and timing.
fn output_frame(src: &RawVideoFrame, format: FormatId) -> Result<RawVideoFrame> {
    let pooled = src.planes().first().is_some_and(|p| p.is_pooled());
    let mut out = RawVideoFrame::create_empty(format, src.resolution(), pooled)
        .ok_or_else(|| MediaFlowError::Pipe("failed to allocate output frame".into()))?
        .with_interlace(src.interlace(), src.field_order());
    out.timestamp = src.timestamp;
    out.duration = src.duration;
    Ok(out)
}

pub struct RgbSwap {
    output: FormatId,
}

impl RgbSwap {
    pub fn new(output: FormatId) -> Self {
        Self { output }
    }
}

impl IoFilter for RgbSwap {
    fn process(&mut self, frame: Frame) -> Result<Option<Frame>> {
        let src = frame.as_raw_video().ok_or_else(|| unsupported(&frame))?;
        let (_, bpp) = channels(src.format()).ok_or_else(|| unsupported(&frame))?;
        let mut out = output_frame(src, self.output)?;

        let width = src.resolution().width;
        let (Some(sp), Some(dp)) = (src.plane(0), out.plane_mut(0)) else {
            return Err(unsupported(&frame));
        };
        let (src_line, dst_line) = (sp.line_size(), dp.line_size());
        let src_data = sp.data();
        let dst_data = dp.data_mut();
        for (s, d) in src_data
            .chunks(src_line)
            .zip(dst_data.chunks_mut(dst_line))
        {
            for (from, to) in s.chunks_exact(bpp).zip(d.chunks_exact_mut(bpp)).take(width) {
                to.copy_from_slice(from);
                to.swap(0, 2);
            }
        }
        Ok(Some(out.into()))
    }
}

pub struct RgbToY8;

impl IoFilter for RgbToY8 {
    fn process(&mut self, frame: Frame) -> Result<Option<Frame>> {
        let src = frame.as_raw_video().ok_or_else(|| unsupported(&frame))?;
        let (rgb, bpp) = channels(src.format()).ok_or_else(|| unsupported(&frame))?;
        let mut out = output_frame(src, Y8)?;

        let width = src.resolution().width;
        let (Some(sp), Some(dp)) = (src.plane(0), out.plane_mut(0)) else {
            return Err(unsupported(&frame));
        };
        let (src_line, dst_line) = (sp.line_size(), dp.line_size());
        for (s, d) in sp
            .data()
            .chunks(src_line)
            .zip(dp.data_mut().chunks_mut(dst_line))
        {
            for (px, y) in s.chunks_exact(bpp).zip(d.iter_mut()).take(width) {
                let (r, g, b) = (px[rgb[0]] as u32, px[rgb[1]] as u32, px[rgb[2]] as u32);
                // BT.601 weights in 8.8 fixed point
                *y = ((77 * r + 150 * g + 29 * b) >> 8) as u8;
            }
        }
        Ok(Some(out.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Resolution;

    fn frame(format: FormatId, data: &[u8]) -> Frame {
        RawVideoFrame::create_empty_with_data(format, Resolution::new(2, 1), data, false)
            .unwrap()
            .into()
    }

    #[test]
    fn test_swap() {
        let mut f = RgbSwap { output: BGR24 };
        let out = f.process(frame(RGB24, &[1, 2, 3, 4, 5, 6])).unwrap().unwrap();
        assert_eq!(out.format(), BGR24);
        assert_eq!(out.as_raw_video().unwrap().planes()[0].data(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_luma() {
        let mut f = RgbToY8;
        let out = f
            .process(frame(RGB24, &[255, 255, 255, 0, 0, 0]))
            .unwrap()
            .unwrap();
        assert_eq!(out.format(), Y8);
        assert_eq!(out.as_raw_video().unwrap().planes()[0].data(), &[255, 0]);
    }

    #[test]
    fn test_luma_rejects_y8_input() {
        let mut f = RgbToY8;
        assert!(f.process(frame(Y8, &[0, 0])).is_err());
    }

    #[test]
    fn test_registration() {
        let ctx = RegistryContext::new();
        register(&ctx);
        let list = ctx.converters().get_converters(RGB24, Y8);
        assert_eq!(list[0].class_id, RGB_TO_Y8);
        assert!(ctx.converters().is_converter_registered(BGRA32, RGBA32));
        assert!(ctx.modules().is_registered(RGB_SWAP));
    }
}
