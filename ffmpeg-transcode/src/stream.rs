use ffmpeg_next::{Rational, codec, format::Pixel};

use crate::config::EncodeSettings;

/// Everything needed to open an encoder and describe the output stream.
/// Built once before encoding starts and never changed afterwards.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    codec: codec::Id,
    encoder_name: Option<String>,
    pixel_format: Pixel,
    width: u32,
    height: u32,
    time_base: Rational,
    frame_rate: Rational,
    bit_rate: usize,
    gop_size: u32,
    qmin: i32,
    qmax: i32,
    max_b_frames: usize,
    options: Vec<(String, String)>,
    global_header: bool,
}

impl StreamDescriptor {
    /// The time base is one tick per output frame, so frame `i` lands on pts `i`.
    pub fn new(
        settings: &EncodeSettings,
        width: u32,
        height: u32,
        source_rate: Rational,
        global_header: bool,
    ) -> Self {
        let frame_rate = settings.frame_rate_for(source_rate);
        Self {
            codec: settings.codec,
            encoder_name: settings.encoder_name.clone(),
            pixel_format: settings.pixel_format,
            width,
            height,
            time_base: frame_rate.invert(),
            frame_rate,
            bit_rate: settings.bit_rate,
            gop_size: settings.gop_size,
            qmin: settings.qmin,
            qmax: settings.qmax,
            max_b_frames: settings.max_b_frames,
            options: settings.codec_options(),
            global_header,
        }
    }

    pub fn codec(&self) -> codec::Id {
        self.codec
    }
    pub fn encoder_name(&self) -> Option<&str> {
        self.encoder_name.as_deref()
    }
    pub fn pixel_format(&self) -> Pixel {
        self.pixel_format
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn time_base(&self) -> Rational {
        self.time_base
    }
    pub fn frame_rate(&self) -> Rational {
        self.frame_rate
    }
    pub fn bit_rate(&self) -> usize {
        self.bit_rate
    }
    pub fn gop_size(&self) -> u32 {
        self.gop_size
    }
    pub fn qmin(&self) -> i32 {
        self.qmin
    }
    pub fn qmax(&self) -> i32 {
        self.qmax
    }
    pub fn max_b_frames(&self) -> usize {
        self.max_b_frames
    }
    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }
    pub fn global_header(&self) -> bool {
        self.global_header
    }

    pub fn fps(&self) -> f64 {
        f64::from(self.frame_rate)
    }

    /// Presentation timestamp, in `time_base` units, of the frame at `index`:
    /// `index * tb.den * rate.den / (tb.num * rate.num)`.
    pub fn pts_for_index(&self, index: u64) -> i64 {
        let tb = self.time_base;
        let rate = self.frame_rate;
        let num = index as i128 * tb.denominator() as i128 * rate.denominator() as i128;
        let den = tb.numerator() as i128 * rate.numerator() as i128;
        if den == 0 {
            return index as i64;
        }
        (num / den) as i64
    }
}
