use ffmpeg_next::format::Pixel;

use crate::{
    config::ScalingAlgorithm,
    error::{Result, TranscodeError},
    frame::{RawFrame, RawVideoFrame},
};

/// Format and size one side of the converter is fixed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureSpec {
    pub format: Pixel,
    pub width: u32,
    pub height: u32,
}

impl PictureSpec {
    pub fn new(format: Pixel, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }
}

/// Converts every frame of a run from one fixed pixel layout to another.
/// The scaling context is built once; frames that do not match the source
/// layout are rejected rather than reconfiguring it.
pub struct PixelConverter {
    context: ffmpeg_next::software::scaling::Context,
    source: PictureSpec,
    destination: PictureSpec,
}

impl PixelConverter {
    pub fn new(
        source: PictureSpec,
        destination: PictureSpec,
        algorithm: ScalingAlgorithm,
    ) -> Result<Self> {
        let context = ffmpeg_next::software::scaling::Context::get(
            source.format,
            source.width,
            source.height,
            destination.format,
            destination.width,
            destination.height,
            algorithm.flags(),
        )
        .map_err(|e| {
            TranscodeError::ConversionError(format!(
                "cannot convert {:?} {}x{} to {:?} {}x{}: {}",
                source.format,
                source.width,
                source.height,
                destination.format,
                destination.width,
                destination.height,
                e
            ))
        })?;
        log::debug!(
            "pixel converter {:?} {}x{} -> {:?} {}x{} ({:?})",
            source.format,
            source.width,
            source.height,
            destination.format,
            destination.width,
            destination.height,
            algorithm
        );
        Ok(Self {
            context,
            source,
            destination,
        })
    }

    /// Converts one frame into newly allocated destination planes. The
    /// source pts is carried over.
    pub fn convert(&mut self, frame: &RawFrame) -> Result<RawVideoFrame> {
        let actual = PictureSpec::new(frame.format(), frame.width(), frame.height());
        if actual != self.source {
            return Err(TranscodeError::ConversionError(format!(
                "frame is {:?} {}x{}, converter expects {:?} {}x{}",
                actual.format,
                actual.width,
                actual.height,
                self.source.format,
                self.source.width,
                self.source.height
            )));
        }
        let input = frame.to_video()?;
        let mut output = ffmpeg_next::frame::Video::new(
            self.destination.format,
            self.destination.width,
            self.destination.height,
        );
        self.context
            .run(&input, &mut output)
            .map_err(|e| TranscodeError::ConversionError(e.to_string()))?;
        output.set_pts(frame.pts());
        Ok(RawVideoFrame::from(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PALETTE_SIZE, Plane};

    fn bgr_frame(width: u32, height: u32, color: [u8; 3]) -> RawFrame {
        let stride = width as usize * 3;
        let data: Vec<u8> = (0..width as usize * height as usize)
            .flat_map(|_| color)
            .collect();
        RawFrame::packed(Pixel::BGR24, width, height, data, stride)
    }

    fn converter(width: u32, height: u32) -> PixelConverter {
        PixelConverter::new(
            PictureSpec::new(Pixel::BGR24, width, height),
            PictureSpec::new(Pixel::YUV420P, width, height),
            ScalingAlgorithm::Bicubic,
        )
        .unwrap()
    }

    #[test]
    fn bgr_to_yuv420p_keeps_size_and_pts() -> anyhow::Result<()> {
        let mut conv = converter(32, 16);
        let out = conv.convert(&bgr_frame(32, 16, [0, 0, 0]).with_pts(Some(4)))?;
        assert_eq!(out.format(), Pixel::YUV420P);
        assert_eq!((out.width(), out.height()), (32, 16));
        assert_eq!(out.pts(), Some(4));
        Ok(())
    }

    #[test]
    fn white_maps_to_high_luma() -> anyhow::Result<()> {
        let mut conv = converter(16, 16);
        let out = conv.convert(&bgr_frame(16, 16, [255, 255, 255]))?;
        let luma = out.as_video().data(0)[0];
        assert!(luma >= 230, "luma {}", luma);
        let black = conv.convert(&bgr_frame(16, 16, [0, 0, 0]))?;
        assert!(black.as_video().data(0)[0] <= 20);
        Ok(())
    }

    #[test]
    fn pal8_is_converted_through_its_palette() -> anyhow::Result<()> {
        let mut palette = vec![0u8; PALETTE_SIZE];
        palette[..4].copy_from_slice(&[255, 255, 255, 255]);
        let frame = RawFrame::new(
            Pixel::PAL8,
            16,
            16,
            vec![
                Plane::new(vec![0u8; 16 * 16], 16),
                Plane::new(palette, PALETTE_SIZE),
            ],
        );
        let mut conv = PixelConverter::new(
            PictureSpec::new(Pixel::PAL8, 16, 16),
            PictureSpec::new(Pixel::YUV420P, 16, 16),
            ScalingAlgorithm::Bicubic,
        )?;
        let out = conv.convert(&frame)?;
        let luma = out.as_video().data(0)[0];
        assert!(luma >= 230, "luma {}", luma);
        Ok(())
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let mut conv = converter(32, 16);
        let err = conv.convert(&bgr_frame(16, 16, [1, 2, 3])).err().expect("must fail");
        assert!(matches!(err, TranscodeError::ConversionError(_)));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut conv = converter(8, 8);
        let frame = RawFrame::new(
            Pixel::BGR24,
            8,
            8,
            vec![Plane::new(vec![0u8; 8 * 3 * 7], 8 * 3)],
        );
        let err = conv.convert(&frame).err().expect("must fail");
        assert!(matches!(err, TranscodeError::ConversionError(_)));
    }
}
