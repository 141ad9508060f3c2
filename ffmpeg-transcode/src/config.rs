use ffmpeg_next::{Rational, codec, format::Pixel, software::scaling};

/// Resampling algorithm used by the pixel converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingAlgorithm {
    FastBilinear,
    Bilinear,
    #[default]
    Bicubic,
    Point,
    Area,
    Lanczos,
}

impl ScalingAlgorithm {
    pub fn flags(self) -> scaling::flag::Flags {
        match self {
            ScalingAlgorithm::FastBilinear => scaling::flag::Flags::FAST_BILINEAR,
            ScalingAlgorithm::Bilinear => scaling::flag::Flags::BILINEAR,
            ScalingAlgorithm::Bicubic => scaling::flag::Flags::BICUBIC,
            ScalingAlgorithm::Point => scaling::flag::Flags::POINT,
            ScalingAlgorithm::Area => scaling::flag::Flags::AREA,
            ScalingAlgorithm::Lanczos => scaling::flag::Flags::LANCZOS,
        }
    }
}

/// Fixed encoding parameters for one run.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub codec: codec::Id,
    /// Encoder implementation name, e.g. "libvpx". `None` picks FFmpeg's
    /// default encoder for `codec`.
    pub encoder_name: Option<String>,
    pub pixel_format: Pixel,
    pub bit_rate: usize,
    pub gop_size: u32,
    pub qmin: i32,
    pub qmax: i32,
    pub max_b_frames: usize,
    pub scaling: ScalingAlgorithm,
    /// Forces the output frame rate instead of the rate the source reports.
    pub frame_rate: Option<Rational>,
    /// Used when the source reports no usable frame rate.
    pub fallback_frame_rate: Rational,
    /// Container short name ("webm", "matroska", ...). `None` guesses from the
    /// output extension.
    pub container_format: Option<String>,
    /// Extra private codec options, applied after the codec defaults.
    pub options: Vec<(String, String)>,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            codec: codec::Id::VP8,
            encoder_name: None,
            pixel_format: Pixel::YUV420P,
            bit_rate: 400_000,
            gop_size: 1,
            qmin: 10,
            qmax: 51,
            max_b_frames: 3,
            scaling: ScalingAlgorithm::Bicubic,
            frame_rate: None,
            fallback_frame_rate: Rational::new(25, 1),
            container_format: None,
            options: Vec::new(),
        }
    }
}

impl EncodeSettings {
    pub fn with_codec(mut self, codec: codec::Id) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_encoder_name(mut self, name: impl Into<String>) -> Self {
        self.encoder_name = Some(name.into());
        self
    }

    pub fn with_container_format(mut self, format: impl Into<String>) -> Self {
        self.container_format = Some(format.into());
        self
    }

    pub fn with_gop(mut self, gop_size: u32, max_b_frames: usize) -> Self {
        self.gop_size = gop_size;
        self.max_b_frames = max_b_frames;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Frame rate the output stream is timed with: the override, else the
    /// source's rate, else the fallback.
    pub fn frame_rate_for(&self, source_rate: Rational) -> Rational {
        if let Some(rate) = self.frame_rate {
            return rate;
        }
        if source_rate.numerator() > 0 && source_rate.denominator() > 0 {
            source_rate
        } else {
            self.fallback_frame_rate
        }
    }

    /// Codec defaults merged with the user options, later entries winning.
    pub fn codec_options(&self) -> Vec<(String, String)> {
        let defaults: &[(&str, &str)] = match self.codec {
            codec::Id::H264 => &[("preset", "slow"), ("tune", "zerolatency")],
            codec::Id::HEVC => &[("preset", "ultrafast"), ("tune", "zero-latency")],
            _ => &[],
        };
        let mut merged: Vec<(String, String)> = defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (key, value) in &self.options {
            merged.retain(|(k, _)| k != key);
            merged.push((key.clone(), value.clone()));
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_parameters() {
        let s = EncodeSettings::default();
        assert_eq!(s.codec, codec::Id::VP8);
        assert_eq!(s.pixel_format, Pixel::YUV420P);
        assert_eq!(s.bit_rate, 400_000);
        assert_eq!(s.gop_size, 1);
        assert_eq!((s.qmin, s.qmax), (10, 51));
        assert_eq!(s.max_b_frames, 3);
        assert_eq!(s.scaling, ScalingAlgorithm::Bicubic);
    }

    #[test]
    fn frame_rate_prefers_override_then_source() {
        let s = EncodeSettings::default();
        assert_eq!(s.frame_rate_for(Rational::new(30, 1)), Rational::new(30, 1));
        assert_eq!(s.frame_rate_for(Rational::new(0, 1)), Rational::new(25, 1));
        assert_eq!(s.frame_rate_for(Rational::new(0, 0)), Rational::new(25, 1));

        let forced = EncodeSettings {
            frame_rate: Some(Rational::new(24000, 1001)),
            ..Default::default()
        };
        assert_eq!(forced.frame_rate_for(Rational::new(30, 1)), Rational::new(24000, 1001));
    }

    #[test]
    fn h264_defaults_can_be_overridden() {
        let s = EncodeSettings::default()
            .with_codec(codec::Id::H264)
            .with_option("preset", "veryfast");
        let opts = s.codec_options();
        assert!(opts.contains(&("preset".to_string(), "veryfast".to_string())));
        assert!(opts.contains(&("tune".to_string(), "zerolatency".to_string())));
        assert_eq!(opts.iter().filter(|(k, _)| k == "preset").count(), 1);
    }

    #[test]
    fn vp8_has_no_codec_defaults() {
        assert!(EncodeSettings::default().codec_options().is_empty());
    }
}
