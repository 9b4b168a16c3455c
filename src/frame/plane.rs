//! A single buffer of a video frame together with its geometry.

use crate::frame::pool::{FixedMemoryPool, PoolBlock};
use crate::frame::Resolution;

/// Backing storage of a plane.
#[derive(Debug)]
pub enum PlaneBuffer {
    Heap(Vec<u8>),
    /// Borrowed from a pool; going back there when the plane is dropped.
    Pooled(PoolBlock),
}

impl PlaneBuffer {
    pub fn heap(size: usize) -> Self {
        PlaneBuffer::Heap(vec![0u8; size])
    }

    pub fn pooled(pool: &FixedMemoryPool, size: usize) -> Self {
        PlaneBuffer::Pooled(pool.acquire(size))
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            PlaneBuffer::Heap(v) => v,
            PlaneBuffer::Pooled(b) => b,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            PlaneBuffer::Heap(v) => v,
            PlaneBuffer::Pooled(b) => b,
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, PlaneBuffer::Pooled(_))
    }
}

/// One color channel (or packed plane) of a raw video frame.
#[derive(Debug)]
pub struct Plane {
    buffer: PlaneBuffer,
    resolution: Resolution,
    line_size: usize,
}

impl Plane {
    pub fn new(buffer: PlaneBuffer, resolution: Resolution, line_size: usize) -> Self {
        Self {
            buffer,
            resolution,
            line_size,
        }
    }

    pub fn data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }

    pub fn size(&self) -> usize {
        self.data().len()
    }

    pub fn line_size(&self) -> usize {
        self.line_size
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_pooled(&self) -> bool {
        self.buffer.is_pooled()
    }

    /// Bytes of line `y`, or `None` past the end of the buffer.
    pub fn line(&self, y: usize) -> Option<&[u8]> {
        let start = y.checked_mul(self.line_size)?;
        self.data().get(start..start + self.line_size)
    }

    /// New plane with the same geometry and storage kind, content copied.
    pub fn duplicate(&self) -> Plane {
        let mut buffer = match &self.buffer {
            PlaneBuffer::Heap(v) => PlaneBuffer::Heap(Vec::with_capacity(v.len())),
            PlaneBuffer::Pooled(b) => PlaneBuffer::pooled(&b.pool(), self.size()),
        };
        match &mut buffer {
            PlaneBuffer::Heap(v) => v.extend_from_slice(self.data()),
            PlaneBuffer::Pooled(b) => b.copy_from_slice(self.data()),
        }
        Plane::new(buffer, self.resolution, self.line_size)
    }
}
