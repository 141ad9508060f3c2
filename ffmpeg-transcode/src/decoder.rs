use ffmpeg_next::Rational;

use crate::{input::InputStream, packet::EncodedPacket};

/// Video decoder for one demuxed stream.
pub struct Decoder {
    inner: ffmpeg_next::codec::decoder::Video,
    decoder_time_base: Rational,
    stream_index: usize,
}

impl Decoder {
    pub fn new(stream: &InputStream) -> anyhow::Result<Self> {
        let mut decoder_ctx = ffmpeg_next::codec::Context::new();
        unsafe {
            (*decoder_ctx.as_mut_ptr()).time_base = stream.time_base().into();
        }
        decoder_ctx.set_parameters(stream.parameters().clone())?;

        let decoder = decoder_ctx.decoder().video()?;
        if decoder.format() == ffmpeg_next::format::Pixel::None
            || decoder.width() == 0
            || decoder.height() == 0
        {
            anyhow::bail!("missing codec parameters");
        }
        let decoder_time_base = decoder.time_base();

        Ok(Self {
            inner: decoder,
            decoder_time_base,
            stream_index: stream.index(),
        })
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn format(&self) -> ffmpeg_next::format::Pixel {
        self.inner.format()
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn send_packet(&mut self, mut packet: EncodedPacket) -> anyhow::Result<()> {
        let time_base = packet.time_base();
        let packet = packet.get_mut();
        if self.decoder_time_base.denominator() > 0 {
            packet.rescale_ts(time_base, self.decoder_time_base);
        }
        self.inner.send_packet(packet)?;
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    /// Next decoded frame, `None` when the decoder needs more input or has
    /// been fully drained.
    pub fn receive_frame(&mut self) -> anyhow::Result<Option<ffmpeg_next::frame::Video>> {
        let mut frame = ffmpeg_next::frame::Video::empty();
        match self.inner.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}
