//! Format tags and their layout metadata.
//!
//! Every payload travelling through a pipe is tagged with a [`FormatId`].
//! Raw video formats carry a per-plane layout (bit depth as a rational,
//! subsampling, optional line alignment) that [`RawVideoFrame::create_empty`]
//! uses to size buffers. Compressed video and raw audio formats only carry
//! naming metadata and, for audio, the sample width.
//!
//! [`RawVideoFrame::create_empty`]: crate::frame::RawVideoFrame::create_empty

use std::fmt;

/// Opaque format tag. Values are stable for the life of the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FormatId(pub u32);

impl FormatId {
    pub const UNKNOWN: FormatId = FormatId(0);

    #[inline]
    pub fn is_known(self) -> bool {
        info(self).is_some()
    }
}

impl fmt::Debug for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormatId({})", format_name(*self))
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(format_name(*self))
    }
}

// Raw video
pub const Y8: FormatId = FormatId(0x1001);
pub const Y16: FormatId = FormatId(0x1002);
pub const RGB24: FormatId = FormatId(0x1010);
pub const BGR24: FormatId = FormatId(0x1011);
pub const RGBA32: FormatId = FormatId(0x1012);
pub const BGRA32: FormatId = FormatId(0x1013);
pub const YUYV422: FormatId = FormatId(0x1020);
pub const UYVY422: FormatId = FormatId(0x1021);
pub const V210: FormatId = FormatId(0x1022);
pub const YUV420P: FormatId = FormatId(0x1030);
pub const YUV422P: FormatId = FormatId(0x1031);
pub const YUV444P: FormatId = FormatId(0x1032);
pub const NV12: FormatId = FormatId(0x1040);

// Compressed video
pub const JPEG: FormatId = FormatId(0x2001);
pub const PNG: FormatId = FormatId(0x2002);
pub const H264: FormatId = FormatId(0x2010);
pub const H265: FormatId = FormatId(0x2011);
pub const VP8: FormatId = FormatId(0x2020);

// Raw audio
pub const S16: FormatId = FormatId(0x3001);
pub const S32: FormatId = FormatId(0x3002);
pub const F32: FormatId = FormatId(0x3003);

/// Which frame variant a format belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatGroup {
    RawVideo,
    CompressedVideo,
    RawAudio,
}

impl fmt::Display for FormatGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatGroup::RawVideo => write!(f, "raw video"),
            FormatGroup::CompressedVideo => write!(f, "compressed video"),
            FormatGroup::RawAudio => write!(f, "raw audio"),
        }
    }
}

/// Layout of one plane of a raw video format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    /// Bits per pixel as `numerator / denominator`.
    pub bit_depth: (u32, u32),
    pub sub_x: u32,
    pub sub_y: u32,
    /// Line size is rounded up to a multiple of this many bytes. Zero = none.
    pub alignment: u32,
}

impl PlaneInfo {
    const fn new(bits: u32, sub_x: u32, sub_y: u32) -> Self {
        Self {
            bit_depth: (bits, 1),
            sub_x,
            sub_y,
            alignment: 0,
        }
    }

    /// Bytes per line for a plane `width` pixels wide, or `None` on overflow.
    pub fn line_size(&self, width: usize) -> Option<usize> {
        let (num, den) = self.bit_depth;
        let nom = width.checked_mul(num as usize)?;
        let den = (den as usize)
            .checked_mul(self.sub_x as usize)?
            .checked_mul(8)?;
        if den == 0 {
            return None;
        }
        let unaligned = nom.div_ceil(den);
        match self.alignment as usize {
            0 => Some(unaligned),
            align => unaligned.checked_next_multiple_of(align),
        }
    }

    /// Bytes for the whole plane, or `None` on overflow.
    pub fn plane_size(&self, width: usize, height: usize) -> Option<usize> {
        if self.sub_y == 0 {
            return None;
        }
        let line = self.line_size(width)?;
        Some(line.checked_mul(height)? / self.sub_y as usize)
    }
}

/// Static description of a registered format.
#[derive(Debug)]
pub struct FormatInfo {
    pub id: FormatId,
    pub long_name: &'static str,
    pub short_names: &'static [&'static str],
    pub mime_types: &'static [&'static str],
    pub group: FormatGroup,
    /// Plane layouts (raw video only).
    pub planes: &'static [PlaneInfo],
    /// Bits per single-channel sample (raw audio only).
    pub bits_per_sample: u32,
}

impl FormatInfo {
    /// Primary short name, used in logs and diagnostics.
    pub fn name(&self) -> &'static str {
        self.short_names.first().copied().unwrap_or(self.long_name)
    }
}

const fn raw(
    id: FormatId,
    long_name: &'static str,
    short_names: &'static [&'static str],
    planes: &'static [PlaneInfo],
) -> FormatInfo {
    FormatInfo {
        id,
        long_name,
        short_names,
        mime_types: &[],
        group: FormatGroup::RawVideo,
        planes,
        bits_per_sample: 0,
    }
}

const fn compressed(
    id: FormatId,
    long_name: &'static str,
    short_names: &'static [&'static str],
    mime_types: &'static [&'static str],
) -> FormatInfo {
    FormatInfo {
        id,
        long_name,
        short_names,
        mime_types,
        group: FormatGroup::CompressedVideo,
        planes: &[],
        bits_per_sample: 0,
    }
}

const fn audio(
    id: FormatId,
    long_name: &'static str,
    short_names: &'static [&'static str],
    bits_per_sample: u32,
) -> FormatInfo {
    FormatInfo {
        id,
        long_name,
        short_names,
        mime_types: &[],
        group: FormatGroup::RawAudio,
        planes: &[],
        bits_per_sample,
    }
}

const V210_PLANE: PlaneInfo = PlaneInfo {
    // 6 pixels packed in 16 bytes, lines padded to 48 pixels.
    bit_depth: (128, 6),
    sub_x: 1,
    sub_y: 1,
    alignment: 128,
};

static FORMATS: &[FormatInfo] = &[
    raw(Y8, "Y 8bit", &["y8", "gray", "grey"], &[PlaneInfo::new(8, 1, 1)]),
    raw(Y16, "Y 16bit", &["y16", "gray16"], &[PlaneInfo::new(16, 1, 1)]),
    raw(RGB24, "RGB 24bit", &["rgb24", "rgb"], &[PlaneInfo::new(24, 1, 1)]),
    raw(BGR24, "BGR 24bit", &["bgr24", "bgr"], &[PlaneInfo::new(24, 1, 1)]),
    raw(RGBA32, "RGBA 32bit", &["rgba32", "rgba"], &[PlaneInfo::new(32, 1, 1)]),
    raw(BGRA32, "BGRA 32bit", &["bgra32", "bgra"], &[PlaneInfo::new(32, 1, 1)]),
    raw(
        YUYV422,
        "YUV 4:2:2 packed (YUYV)",
        &["yuyv422", "yuyv", "yuv422"],
        &[PlaneInfo::new(16, 1, 1)],
    ),
    raw(UYVY422, "YUV 4:2:2 packed (UYVY)", &["uyvy422", "uyvy"], &[PlaneInfo::new(16, 1, 1)]),
    raw(V210, "YUV 4:2:2 10bit packed (v210)", &["v210"], &[V210_PLANE]),
    raw(
        YUV420P,
        "YUV 4:2:0 planar",
        &["yuv420p", "i420"],
        &[PlaneInfo::new(8, 1, 1), PlaneInfo::new(8, 2, 2), PlaneInfo::new(8, 2, 2)],
    ),
    raw(
        YUV422P,
        "YUV 4:2:2 planar",
        &["yuv422p"],
        &[PlaneInfo::new(8, 1, 1), PlaneInfo::new(8, 2, 1), PlaneInfo::new(8, 2, 1)],
    ),
    raw(
        YUV444P,
        "YUV 4:4:4 planar",
        &["yuv444p"],
        &[PlaneInfo::new(8, 1, 1), PlaneInfo::new(8, 1, 1), PlaneInfo::new(8, 1, 1)],
    ),
    raw(
        NV12,
        "YUV 4:2:0 semi-planar (NV12)",
        &["nv12"],
        &[PlaneInfo::new(8, 1, 1), PlaneInfo::new(16, 2, 2)],
    ),
    compressed(JPEG, "JPEG", &["jpeg", "jpg", "mjpeg"], &["image/jpeg"]),
    compressed(PNG, "PNG", &["png"], &["image/png"]),
    compressed(H264, "H.264", &["h264", "avc"], &["video/h264"]),
    compressed(H265, "H.265", &["h265", "hevc"], &["video/h265"]),
    compressed(VP8, "VP8", &["vp8"], &["video/vp8"]),
    audio(S16, "Signed 16bit interleaved", &["s16", "s16le"], 16),
    audio(S32, "Signed 32bit interleaved", &["s32", "s32le"], 32),
    audio(F32, "Float 32bit interleaved", &["f32", "float"], 32),
];

/// Look up the metadata of a format.
pub fn info(id: FormatId) -> Option<&'static FormatInfo> {
    FORMATS.iter().find(|f| f.id == id)
}

/// All registered formats, in table order.
pub fn all_formats() -> &'static [FormatInfo] {
    FORMATS
}

/// Find a format by any of its short names or its long name (case-insensitive).
pub fn format_by_name(name: &str) -> Option<FormatId> {
    let name = name.trim();
    FORMATS
        .iter()
        .find(|f| {
            f.long_name.eq_ignore_ascii_case(name)
                || f.short_names.iter().any(|s| s.eq_ignore_ascii_case(name))
        })
        .map(|f| f.id)
}

/// Primary short name of a format, `"unknown"` if not registered.
pub fn format_name(id: FormatId) -> &'static str {
    info(id).map(|f| f.name()).unwrap_or("unknown")
}

/// Group of a format, if registered.
pub fn format_group(id: FormatId) -> Option<FormatGroup> {
    info(id).map(|f| f.group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_alias() {
        assert_eq!(format_by_name("RGB"), Some(RGB24));
        assert_eq!(format_by_name("hevc"), Some(H265));
        assert_eq!(format_by_name("Y 8bit"), Some(Y8));
        assert_eq!(format_by_name("no-such-format"), None);
    }

    #[test]
    fn test_unique_ids_and_names() {
        let mut ids: Vec<_> = all_formats().iter().map(|f| f.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), all_formats().len());

        for f in all_formats() {
            assert_eq!(format_by_name(f.name()), Some(f.id));
        }
    }

    #[test]
    fn test_line_size() {
        let y8 = &info(Y8).unwrap().planes[0];
        assert_eq!(y8.line_size(4), Some(4));
        assert_eq!(y8.plane_size(4, 4), Some(16));

        let chroma = &info(YUV420P).unwrap().planes[1];
        assert_eq!(chroma.line_size(5), Some(3));
        assert_eq!(chroma.plane_size(4, 4), Some(4));
    }

    #[test]
    fn test_aligned_line_size() {
        let v210 = &info(V210).unwrap().planes[0];
        // 48 pixels take exactly 128 bytes
        assert_eq!(v210.line_size(48), Some(128));
        // one extra pixel pushes the line to the next multiple
        assert_eq!(v210.line_size(49), Some(256));
    }

    #[test]
    fn test_overflow_is_none() {
        let rgb = &info(RGB24).unwrap().planes[0];
        assert_eq!(rgb.line_size(usize::MAX), None);
        assert_eq!(rgb.plane_size(usize::MAX / 4, usize::MAX / 4), None);
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(format_name(FormatId(0xdead)), "unknown");
        assert!(!FormatId::UNKNOWN.is_known());
    }
}
