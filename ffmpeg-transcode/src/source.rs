use ffmpeg_next::{Rational, format::Pixel};

use crate::{error::Result, frame::RawFrame};

/// What a frame source reports about itself once opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    /// Total frames, `None` when the source cannot tell (live devices,
    /// containers without an index or duration).
    pub frame_count: Option<u64>,
    pub pixel_format: Pixel,
}

impl SourceInfo {
    /// Frames a run may pull: `min(requested, frame_count)`.
    pub fn clamp(&self, requested: u64) -> u64 {
        match self.frame_count {
            Some(available) => requested.min(available),
            None => requested,
        }
    }

    pub fn fps(&self) -> f64 {
        if self.frame_rate.denominator() == 0 {
            return 0.0;
        }
        f64::from(self.frame_rate)
    }
}

/// Pull-based provider of decoded frames.
pub trait FrameSource {
    fn info(&self) -> SourceInfo;

    /// Next frame in the source's pixel format, `Ok(None)` once exhausted.
    /// Calling again after exhaustion keeps returning `Ok(None)`.
    fn read(&mut self) -> Result<Option<RawFrame>>;
}

/// Synthetic BGR24 source drawing a moving gradient. Rows are padded to a
/// 32-byte stride like most capture APIs do.
pub struct PatternSource {
    info: SourceInfo,
    next_index: u64,
}

impl PatternSource {
    pub fn new(width: u32, height: u32, frame_rate: Rational, frame_count: u64) -> Self {
        Self {
            info: SourceInfo {
                width,
                height,
                frame_rate,
                frame_count: Some(frame_count),
                pixel_format: Pixel::BGR24,
            },
            next_index: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.next_index
    }

    fn draw(&self, index: u64) -> RawFrame {
        let width = self.info.width as usize;
        let height = self.info.height as usize;
        let stride = (width * 3 + 31) & !31;
        let shift = (index * 4) as usize;
        let mut data = vec![0u8; stride * height];
        for y in 0..height {
            let row = &mut data[y * stride..y * stride + width * 3];
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                px[0] = ((x + shift) % 256) as u8;
                px[1] = ((y * 2 + shift / 2) % 256) as u8;
                px[2] = (((x + y) / 2) % 256) as u8;
            }
        }
        RawFrame::packed(Pixel::BGR24, self.info.width, self.info.height, data, stride)
            .with_pts(Some(index as i64))
    }
}

impl FrameSource for PatternSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn read(&mut self) -> Result<Option<RawFrame>> {
        if self.info.frame_count.is_some_and(|n| self.next_index >= n) {
            return Ok(None);
        }
        let frame = self.draw(self.next_index);
        self.next_index += 1;
        Ok(Some(frame))
    }
}
