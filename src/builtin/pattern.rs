//! `pattern`: test source producing a moving gradient at a fixed rate.

use crate::error::{MediaFlowError, Result};
use crate::frame::format::{BGR24, BGRA32, RGB24, RGBA32, Y8};
use crate::frame::{format, FormatId, RawVideoFrame, Resolution};
use crate::params::ParameterSet;
use crate::pipeline::{base_params, Node, NodeInit, NodeIo, StepOutcome};
use std::time::{Duration, Instant};

pub const CLASS: &str = "pattern";

/// Formats the generator can write.
pub const SUPPORTED: &[FormatId] = &[RGB24, BGR24, RGBA32, BGRA32, Y8];

pub fn configure() -> ParameterSet {
    let mut p = base_params().with_description("Generates a moving test pattern");
    p.define("resolution", Resolution::new(640, 480), "Output resolution")
        .define("format", RGB24, "Output format")
        .define("fps", 25.0, "Frames per second")
        .define("frames", 0, "Number of frames to generate, 0 for unlimited")
        .define("fixed", true, "Allocate frames from the shared memory pool");
    p.set_output_formats(SUPPORTED.iter().copied());
    p.set_max_pipes(Some(0), Some(1));
    p
}

pub fn create(init: NodeInit) -> Result<Box<dyn Node>> {
    let params = &init.params;
    let format = params
        .get_format("format")
        .ok_or_else(|| MediaFlowError::init_failed(CLASS, "invalid 'format'"))?;
    if !SUPPORTED.contains(&format) {
        return Err(MediaFlowError::init_failed(
            CLASS,
            format!("unsupported format '{}'", format::format_name(format)),
        ));
    }
    let resolution = params
        .get_resolution("resolution")
        .filter(|r| r.width > 0 && r.height > 0)
        .ok_or_else(|| MediaFlowError::init_failed(CLASS, "invalid 'resolution'"))?;
    let fps = params.get_float("fps").unwrap_or(25.0);
    if !(fps > 0.0 && fps.is_finite()) {
        return Err(MediaFlowError::init_failed(CLASS, "'fps' must be positive"));
    }
    let interval = Duration::try_from_secs_f64(1.0 / fps)
        .map_err(|_| MediaFlowError::init_failed(CLASS, format!("'fps' {} is too low", fps)))?;
    let limit = params.get_int("frames").unwrap_or(0).max(0) as u64;

    Ok(Box::new(PatternSource {
        format,
        resolution,
        interval,
        limit: (limit > 0).then_some(limit),
        fixed: params.get_bool("fixed").unwrap_or(true),
        produced: 0,
        started: None,
    }))
}

#[derive(Debug)]
pub struct PatternSource {
    format: FormatId,
    resolution: Resolution,
    interval: Duration,
    limit: Option<u64>,
    fixed: bool,
    produced: u64,
    started: Option<Instant>,
}

/// Presentation time of frame `n`, `None` when it does not fit a `Duration`.
fn frame_time(interval: Duration, n: u64) -> Option<Duration> {
    let nanos = interval.as_nanos().checked_mul(u128::from(n))?;
    let secs = u64::try_from(nanos / 1_000_000_000).ok()?;
    Some(Duration::new(secs, (nanos % 1_000_000_000) as u32))
}

/// Byte offsets of R, G, B inside a pixel, and the pixel size.
fn layout(format: FormatId) -> Option<([usize; 3], usize)> {
    match format {
        RGB24 => Some(([0, 1, 2], 3)),
        BGR24 => Some(([2, 1, 0], 3)),
        RGBA32 => Some(([0, 1, 2], 4)),
        BGRA32 => Some(([2, 1, 0], 4)),
        _ => None,
    }
}

/// Fill `frame` with the pattern for frame number `n`.
pub fn paint(frame: &mut RawVideoFrame, n: u64) {
    let format = frame.format();
    let Resolution { width, height } = frame.resolution();
    let shift = n as usize;
    let Some(plane) = frame.plane_mut(0) else {
        return;
    };
    let line_size = plane.line_size();
    let data = plane.data_mut();

    for y in 0..height {
        let Some(line) = data.get_mut(y * line_size..(y + 1) * line_size) else {
            break;
        };
        match layout(format) {
            Some((rgb, bpp)) => {
                for x in 0..width {
                    let px = &mut line[x * bpp..(x + 1) * bpp];
                    px[rgb[0]] = (x + shift) as u8;
                    px[rgb[1]] = (y + shift) as u8;
                    px[rgb[2]] = (x + y) as u8;
                    if bpp == 4 {
                        px[3] = 0xff;
                    }
                }
            }
            None => {
                for (x, px) in line.iter_mut().take(width).enumerate() {
                    *px = (x + y + shift) as u8;
                }
            }
        }
    }
}

impl Node for PatternSource {
    fn start(&mut self, _io: &mut NodeIo) -> Result<()> {
        tracing::info!(
            "Generating {} {} at {:.2} fps",
            self.resolution,
            format::format_name(self.format),
            1.0 / self.interval.as_secs_f64()
        );
        self.started = Some(Instant::now());
        Ok(())
    }

    fn step(&mut self, io: &mut NodeIo) -> Result<StepOutcome> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(StepOutcome::Finished);
        }

        let n = self.produced;
        let overflow = || MediaFlowError::node(CLASS, format!("frame {} timestamp overflows", n));
        let timestamp = frame_time(self.interval, n).ok_or_else(overflow)?;
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started.checked_add(timestamp).ok_or_else(overflow)?;
        let now = Instant::now();
        if due > now {
            // Wait at most one latency period per step.
            io.sleep((due - now).min(io.latency()));
            if Instant::now() < due {
                return Ok(StepOutcome::Continue);
            }
        }

        let mut frame = RawVideoFrame::create_empty(self.format, self.resolution, self.fixed)
            .ok_or_else(|| MediaFlowError::node(CLASS, "failed to allocate frame"))?;
        paint(&mut frame, self.produced);
        frame.timestamp = timestamp;
        frame.duration = Some(self.interval);

        io.push(0, frame.into());
        self.produced += 1;
        Ok(StepOutcome::Continue)
    }

    fn stop(&mut self, _io: &mut NodeIo) {
        tracing::debug!("Generated {} frames", self.produced);
    }
}
