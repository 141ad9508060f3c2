use bytes::Bytes;
use ffmpeg_next::format::Pixel;

use crate::error::{Result, TranscodeError};

/// One plane of pixel data with its row pitch in bytes.
#[derive(Debug, Clone)]
pub struct Plane {
    data: Bytes,
    stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Bytes>, stride: usize) -> Self {
        Self {
            data: data.into(),
            stride,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// Uncompressed frame as handed out by a frame source, in the source's own
/// pixel layout.
#[derive(Debug, Clone)]
pub struct RawFrame {
    planes: Vec<Plane>,
    width: u32,
    height: u32,
    format: Pixel,
    pts: Option<i64>,
}

impl RawFrame {
    /// Does not check the planes against the layout; see [`RawFrame::validate`].
    pub fn new(format: Pixel, width: u32, height: u32, planes: Vec<Plane>) -> Self {
        Self {
            planes,
            width,
            height,
            format,
            pts: None,
        }
    }

    /// Single-plane frame for packed formats such as BGR24.
    pub fn packed(format: Pixel, width: u32, height: u32, data: impl Into<Bytes>, stride: usize) -> Self {
        Self::new(format, width, height, vec![Plane::new(data, stride)])
    }

    /// Copies the planes out of a decoded FFmpeg frame.
    pub fn from_video(frame: &ffmpeg_next::frame::Video) -> Self {
        let planes = if is_paletted(frame.format()) {
            vec![
                Plane::new(Bytes::copy_from_slice(frame.data(0)), frame.stride(0)),
                Plane::new(Bytes::copy_from_slice(palette_of(frame)), PALETTE_SIZE),
            ]
        } else {
            (0..frame.planes())
                .map(|i| Plane::new(Bytes::copy_from_slice(frame.data(i)), frame.stride(i)))
                .collect()
        };
        Self {
            planes,
            width: frame.width(),
            height: frame.height(),
            format: frame.format(),
            pts: frame.pts(),
        }
    }

    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> Pixel {
        self.format
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Checks plane count, strides and buffer sizes against the pixel layout.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TranscodeError::ConversionError(format!(
                "invalid frame size {}x{}",
                self.width, self.height
            )));
        }
        let expected = plane_count(self.format)?;
        if self.planes.len() != expected {
            return Err(TranscodeError::ConversionError(format!(
                "{:?} needs {} planes, frame has {}",
                self.format,
                expected,
                self.planes.len()
            )));
        }
        let paletted = is_paletted(self.format);
        for (index, plane) in self.planes.iter().enumerate() {
            if paletted && index == 1 {
                if plane.data.len() < PALETTE_SIZE {
                    return Err(TranscodeError::ConversionError(format!(
                        "palette holds {} bytes, needs {}",
                        plane.data.len(),
                        PALETTE_SIZE
                    )));
                }
                continue;
            }
            let row = row_bytes(self.format, self.width, index)?;
            if plane.stride < row {
                return Err(TranscodeError::ConversionError(format!(
                    "plane {} stride {} is shorter than a row of {} bytes",
                    index, plane.stride, row
                )));
            }
            let rows = plane_height(self.format, self.height, index);
            let needed = plane.stride * rows as usize;
            if plane.data.len() < needed {
                return Err(TranscodeError::ConversionError(format!(
                    "plane {} holds {} bytes, stride {} x {} rows needs {}",
                    index,
                    plane.data.len(),
                    plane.stride,
                    rows,
                    needed
                )));
            }
        }
        Ok(())
    }

    /// Copies the frame row by row into freshly allocated FFmpeg frame memory.
    pub fn to_video(&self) -> Result<ffmpeg_next::frame::Video> {
        self.validate()?;
        let mut video = ffmpeg_next::frame::Video::new(self.format, self.width, self.height);
        let paletted = is_paletted(self.format);
        for (index, plane) in self.planes.iter().enumerate() {
            if paletted && index == 1 {
                write_palette(&mut video, &plane.data[..PALETTE_SIZE])?;
                continue;
            }
            let row = row_bytes(self.format, self.width, index)?;
            let rows = plane_height(self.format, self.height, index) as usize;
            let dst_stride = video.stride(index);
            let dst = video.data_mut(index);
            for r in 0..rows {
                let src = &plane.data[r * plane.stride..r * plane.stride + row];
                dst[r * dst_stride..r * dst_stride + row].copy_from_slice(src);
            }
        }
        video.set_pts(self.pts);
        Ok(video)
    }
}

/// Frame in FFmpeg memory, ready for the encoder.
pub struct RawVideoFrame {
    frame: ffmpeg_next::frame::Video,
}

impl From<ffmpeg_next::frame::Video> for RawVideoFrame {
    fn from(frame: ffmpeg_next::frame::Video) -> Self {
        Self { frame }
    }
}

impl RawVideoFrame {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn format(&self) -> Pixel {
        self.frame.format()
    }

    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.frame.set_pts(pts);
    }

    pub fn as_video(&self) -> &ffmpeg_next::frame::Video {
        &self.frame
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::frame::Video {
        &mut self.frame
    }
}

/// Bytes in a palette: 256 native-endian 32-bit ARGB entries.
pub const PALETTE_SIZE: usize = 256 * 4;

/// Number of buffers a frame of `format` carries. Paletted formats count the
/// palette as a second buffer.
pub fn plane_count(format: Pixel) -> Result<usize> {
    let n = unsafe { ffmpeg_next::ffi::av_pix_fmt_count_planes(format.into()) };
    if n <= 0 {
        return Err(TranscodeError::ConversionError(format!(
            "unknown pixel format {:?}",
            format
        )));
    }
    if is_paletted(format) {
        return Ok(n as usize + 1);
    }
    Ok(n as usize)
}

/// Whether pixels of `format` are indices into a palette held in `data[1]`.
pub fn is_paletted(format: Pixel) -> bool {
    unsafe {
        let desc = ffmpeg_next::ffi::av_pix_fmt_desc_get(format.into());
        !desc.is_null() && (*desc).flags & (ffmpeg_next::ffi::AV_PIX_FMT_FLAG_PAL as u64) != 0
    }
}

/// Palette of a paletted frame. `frame::Video::data(1)` cannot be used: the
/// decoder may leave `linesize[1]` at zero.
fn palette_of(frame: &ffmpeg_next::frame::Video) -> &[u8] {
    unsafe {
        let ptr = (*frame.as_ptr()).data[1];
        if ptr.is_null() {
            return &[];
        }
        std::slice::from_raw_parts(ptr, PALETTE_SIZE)
    }
}

fn write_palette(video: &mut ffmpeg_next::frame::Video, palette: &[u8]) -> Result<()> {
    unsafe {
        let ptr = (*video.as_mut_ptr()).data[1];
        if ptr.is_null() {
            return Err(TranscodeError::ConversionError(
                "frame has no palette buffer".to_string(),
            ));
        }
        std::ptr::copy_nonoverlapping(palette.as_ptr(), ptr, PALETTE_SIZE);
    }
    Ok(())
}

/// Minimal bytes per row of `plane` for a frame `width` pixels wide.
pub fn row_bytes(format: Pixel, width: u32, plane: usize) -> Result<usize> {
    let n = unsafe { ffmpeg_next::ffi::av_image_get_linesize(format.into(), width as i32, plane as i32) };
    if n <= 0 {
        return Err(TranscodeError::ConversionError(format!(
            "no plane {} in {:?} at width {}",
            plane, format, width
        )));
    }
    Ok(n as usize)
}

/// Rows in `plane`; chroma planes 1 and 2 are vertically subsampled.
pub fn plane_height(format: Pixel, height: u32, plane: usize) -> u32 {
    if plane != 1 && plane != 2 {
        return height;
    }
    match format.descriptor() {
        Some(desc) => {
            let s = desc.log2_chroma_h();
            (height + (1 << s) - 1) >> s
        }
        None => height,
    }
}
