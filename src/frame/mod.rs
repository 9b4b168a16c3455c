//! Frame/plane data model.
//!
//! Frames are the payload moving through pipes. A [`Frame`] is a cheap,
//! reference-counted handle over one of three variants:
//!
//! ```text
//! Frame ─┬─ RawVideo(Arc<RawVideoFrame>)         planes[] + resolution + interlace
//!        ├─ CompressedVideo(Arc<CompressedVideoFrame>)  bytes + resolution
//!        └─ RawAudio(Arc<RawAudioFrame>)         bytes + rate + channels
//! ```
//!
//! Once pushed into a pipe a frame is treated as immutable. A consumer that
//! wants to modify one goes through [`Frame::get_copy`] or the `make_mut_*`
//! helpers, which only copy when the payload is actually shared.

pub mod format;
pub mod plane;
pub mod pool;

pub use format::{FormatGroup, FormatId, FormatInfo, PlaneInfo};
pub use plane::{Plane, PlaneBuffer};
pub use pool::{FixedMemoryPool, PoolBlock, PoolStats};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Width × height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: usize,
    pub height: usize,
}

impl Resolution {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Parse `"800x600"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once(|c| c == 'x' || c == 'X')?;
        Some(Self::new(w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interlace {
    #[default]
    Progressive,
    Interlaced,
    Segmented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldOrder {
    #[default]
    None,
    TopFirst,
    BottomFirst,
}

// ==================== Raw video ====================

/// Uncompressed video frame made of one or more planes.
#[derive(Debug)]
pub struct RawVideoFrame {
    format: FormatId,
    resolution: Resolution,
    interlace: Interlace,
    field_order: FieldOrder,
    planes: Vec<Plane>,
    pub timestamp: Duration,
    pub duration: Option<Duration>,
}

impl RawVideoFrame {
    /// Allocate a frame with buffers sized from the format's plane layout.
    ///
    /// With `fixed` the buffers come from the process-wide
    /// [`FixedMemoryPool`]. Returns `None` for unknown or non-raw formats and
    /// on size overflow, so speculative callers can check and skip.
    pub fn create_empty(format: FormatId, resolution: Resolution, fixed: bool) -> Option<Self> {
        if fixed {
            Self::create_empty_in(format, resolution, Some(FixedMemoryPool::global()))
        } else {
            Self::create_empty_in(format, resolution, None)
        }
    }

    /// Same as [`create_empty`](Self::create_empty) with an explicit pool.
    pub fn create_empty_in(
        format: FormatId,
        resolution: Resolution,
        pool: Option<&FixedMemoryPool>,
    ) -> Option<Self> {
        let info = format::info(format)?;
        if info.group != FormatGroup::RawVideo {
            return None;
        }

        // Compute every size before allocating anything.
        let sizes = info
            .planes
            .iter()
            .map(|p| {
                let line = p.line_size(resolution.width)?;
                let size = p.plane_size(resolution.width, resolution.height)?;
                Some((line, size))
            })
            .collect::<Option<Vec<_>>>()?;

        let planes = sizes
            .into_iter()
            .map(|(line_size, size)| {
                let buffer = match pool {
                    Some(pool) => PlaneBuffer::pooled(pool, size),
                    None => PlaneBuffer::heap(size),
                };
                Plane::new(buffer, resolution, line_size)
            })
            .collect();

        Some(Self {
            format,
            resolution,
            interlace: Interlace::default(),
            field_order: FieldOrder::default(),
            planes,
            timestamp: Duration::ZERO,
            duration: None,
        })
    }

    /// Allocate a frame and copy `data` into its first plane, truncated to fit.
    pub fn create_empty_with_data(
        format: FormatId,
        resolution: Resolution,
        data: &[u8],
        fixed: bool,
    ) -> Option<Self> {
        let mut frame = Self::create_empty(format, resolution, fixed)?;
        if let Some(plane) = frame.planes.first_mut() {
            let n = data.len().min(plane.size());
            plane.data_mut()[..n].copy_from_slice(&data[..n]);
        }
        Some(frame)
    }

    pub fn with_interlace(mut self, interlace: Interlace, field_order: FieldOrder) -> Self {
        self.interlace = interlace;
        self.field_order = field_order;
        self
    }

    pub fn format(&self) -> FormatId {
        self.format
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn interlace(&self) -> Interlace {
        self.interlace
    }

    pub fn field_order(&self) -> FieldOrder {
        self.field_order
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn planes_mut(&mut self) -> &mut [Plane] {
        &mut self.planes
    }

    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }

    pub fn plane_mut(&mut self, index: usize) -> Option<&mut Plane> {
        self.planes.get_mut(index)
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Total payload size over all planes.
    pub fn size(&self) -> usize {
        self.planes.iter().map(Plane::size).sum()
    }

    /// Deep copy: same format, geometry, plane count and bytes.
    pub fn get_copy(&self) -> Self {
        Self {
            format: self.format,
            resolution: self.resolution,
            interlace: self.interlace,
            field_order: self.field_order,
            planes: self.planes.iter().map(Plane::duplicate).collect(),
            timestamp: self.timestamp,
            duration: self.duration,
        }
    }

    /// Format and resolution match.
    pub fn same_format(&self, other: &RawVideoFrame) -> bool {
        self.format == other.format && self.resolution == other.resolution
    }

    /// Format, resolution and interlacing match.
    pub fn same_format_strict(&self, other: &RawVideoFrame) -> bool {
        self.same_format(other) && self.interlace == other.interlace
    }
}

impl Clone for RawVideoFrame {
    fn clone(&self) -> Self {
        self.get_copy()
    }
}

// ==================== Compressed video ====================

/// Encoded video payload (one access unit / image).
#[derive(Debug, Clone)]
pub struct CompressedVideoFrame {
    format: FormatId,
    resolution: Resolution,
    data: Vec<u8>,
    pub timestamp: Duration,
    pub duration: Option<Duration>,
}

impl CompressedVideoFrame {
    /// Returns `None` when `format` is not a compressed video format.
    pub fn from_bytes(format: FormatId, resolution: Resolution, data: &[u8]) -> Option<Self> {
        if format::format_group(format) != Some(FormatGroup::CompressedVideo) {
            return None;
        }
        Some(Self {
            format,
            resolution,
            data: data.to_vec(),
            timestamp: Duration::ZERO,
            duration: None,
        })
    }

    pub fn format(&self) -> FormatId {
        self.format
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn get_copy(&self) -> Self {
        self.clone()
    }

    pub fn same_format(&self, other: &CompressedVideoFrame) -> bool {
        self.format == other.format && self.resolution == other.resolution
    }
}

// ==================== Raw audio ====================

/// Interleaved PCM audio.
#[derive(Debug, Clone)]
pub struct RawAudioFrame {
    format: FormatId,
    channel_count: usize,
    sampling_frequency: usize,
    data: Vec<u8>,
    pub timestamp: Duration,
}

impl RawAudioFrame {
    /// Zero-filled frame holding `sample_count` samples per channel.
    pub fn create_empty(
        format: FormatId,
        channel_count: usize,
        sampling_frequency: usize,
        sample_count: usize,
    ) -> Option<Self> {
        let bytes = audio_sample_bytes(format, channel_count)?.checked_mul(sample_count)?;
        Some(Self {
            format,
            channel_count,
            sampling_frequency,
            data: vec![0u8; bytes],
            timestamp: Duration::ZERO,
        })
    }

    /// Frame holding a copy of `data`.
    pub fn from_bytes(
        format: FormatId,
        channel_count: usize,
        sampling_frequency: usize,
        data: &[u8],
    ) -> Option<Self> {
        audio_sample_bytes(format, channel_count)?;
        Some(Self {
            format,
            channel_count,
            sampling_frequency,
            data: data.to_vec(),
            timestamp: Duration::ZERO,
        })
    }

    pub fn format(&self) -> FormatId {
        self.format
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sampling_frequency(&self) -> usize {
        self.sampling_frequency
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bits of one multi-channel sample.
    pub fn sample_size(&self) -> usize {
        format::info(self.format).map_or(0, |f| f.bits_per_sample as usize) * self.channel_count
    }

    /// Number of multi-channel samples in the buffer.
    pub fn sample_count(&self) -> usize {
        match self.sample_size() {
            0 => 0,
            bits => self.data.len() * 8 / bits,
        }
    }

    /// Playback length of this frame.
    pub fn duration(&self) -> Duration {
        if self.sampling_frequency == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count() as f64 / self.sampling_frequency as f64)
    }

    pub fn get_copy(&self) -> Self {
        self.clone()
    }

    pub fn same_format(&self, other: &RawAudioFrame) -> bool {
        self.format == other.format
            && self.sampling_frequency == other.sampling_frequency
            && self.channel_count == other.channel_count
    }
}

fn audio_sample_bytes(format: FormatId, channel_count: usize) -> Option<usize> {
    let info = format::info(format)?;
    if info.group != FormatGroup::RawAudio || channel_count == 0 {
        return None;
    }
    (info.bits_per_sample as usize / 8).checked_mul(channel_count)
}

// ==================== Frame handle ====================

/// Shared, immutable-once-published frame handle.
#[derive(Debug, Clone)]
pub enum Frame {
    RawVideo(Arc<RawVideoFrame>),
    CompressedVideo(Arc<CompressedVideoFrame>),
    RawAudio(Arc<RawAudioFrame>),
}

impl Frame {
    pub fn format(&self) -> FormatId {
        match self {
            Frame::RawVideo(f) => f.format(),
            Frame::CompressedVideo(f) => f.format(),
            Frame::RawAudio(f) => f.format(),
        }
    }

    pub fn group(&self) -> FormatGroup {
        match self {
            Frame::RawVideo(_) => FormatGroup::RawVideo,
            Frame::CompressedVideo(_) => FormatGroup::CompressedVideo,
            Frame::RawAudio(_) => FormatGroup::RawAudio,
        }
    }

    pub fn timestamp(&self) -> Duration {
        match self {
            Frame::RawVideo(f) => f.timestamp,
            Frame::CompressedVideo(f) => f.timestamp,
            Frame::RawAudio(f) => f.timestamp,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Frame::RawVideo(f) => f.size(),
            Frame::CompressedVideo(f) => f.size(),
            Frame::RawAudio(f) => f.size(),
        }
    }

    /// Whether other handles to the same payload exist.
    pub fn is_shared(&self) -> bool {
        match self {
            Frame::RawVideo(f) => Arc::strong_count(f) > 1,
            Frame::CompressedVideo(f) => Arc::strong_count(f) > 1,
            Frame::RawAudio(f) => Arc::strong_count(f) > 1,
        }
    }

    /// Exclusively owned deep copy.
    pub fn get_copy(&self) -> Frame {
        match self {
            Frame::RawVideo(f) => Frame::RawVideo(Arc::new(f.get_copy())),
            Frame::CompressedVideo(f) => Frame::CompressedVideo(Arc::new(f.get_copy())),
            Frame::RawAudio(f) => Frame::RawAudio(Arc::new(f.get_copy())),
        }
    }

    /// Stream-format comparison; payload is never inspected.
    pub fn same_format(&self, other: &Frame) -> bool {
        match (self, other) {
            (Frame::RawVideo(a), Frame::RawVideo(b)) => a.same_format(b),
            (Frame::CompressedVideo(a), Frame::CompressedVideo(b)) => a.same_format(b),
            (Frame::RawAudio(a), Frame::RawAudio(b)) => a.same_format(b),
            _ => false,
        }
    }

    /// Like [`same_format`](Self::same_format), also comparing interlacing.
    pub fn same_format_strict(&self, other: &Frame) -> bool {
        match (self, other) {
            (Frame::RawVideo(a), Frame::RawVideo(b)) => a.same_format_strict(b),
            _ => self.same_format(other),
        }
    }

    pub fn as_raw_video(&self) -> Option<&RawVideoFrame> {
        match self {
            Frame::RawVideo(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_compressed_video(&self) -> Option<&CompressedVideoFrame> {
        match self {
            Frame::CompressedVideo(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_raw_audio(&self) -> Option<&RawAudioFrame> {
        match self {
            Frame::RawAudio(f) => Some(f),
            _ => None,
        }
    }

    /// Mutable access to a raw video payload, copying first if shared.
    pub fn make_mut_raw_video(&mut self) -> Option<&mut RawVideoFrame> {
        match self {
            Frame::RawVideo(f) => Some(Arc::make_mut(f)),
            _ => None,
        }
    }

    pub fn make_mut_compressed_video(&mut self) -> Option<&mut CompressedVideoFrame> {
        match self {
            Frame::CompressedVideo(f) => Some(Arc::make_mut(f)),
            _ => None,
        }
    }

    pub fn make_mut_raw_audio(&mut self) -> Option<&mut RawAudioFrame> {
        match self {
            Frame::RawAudio(f) => Some(Arc::make_mut(f)),
            _ => None,
        }
    }
}

impl From<RawVideoFrame> for Frame {
    fn from(f: RawVideoFrame) -> Self {
        Frame::RawVideo(Arc::new(f))
    }
}

impl From<CompressedVideoFrame> for Frame {
    fn from(f: CompressedVideoFrame) -> Self {
        Frame::CompressedVideo(Arc::new(f))
    }
}

impl From<RawAudioFrame> for Frame {
    fn from(f: RawAudioFrame) -> Self {
        Frame::RawAudio(Arc::new(f))
    }
}
