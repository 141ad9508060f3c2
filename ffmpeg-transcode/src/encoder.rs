use ffmpeg_next::{Dictionary, Rational};

use crate::{
    error::{Result, TranscodeError},
    frame::RawVideoFrame,
    packet::EncodedPacket,
    registry::{Registry, has_delay},
    stream::StreamDescriptor,
};

/// Lifecycle of an [`EncoderSession`].
///
/// `Open` accepts frames. The first drain call moves to `Draining`, which
/// only accepts further drain calls, and the session becomes `Exhausted` once
/// the codec has handed out everything it buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Draining,
    Exhausted,
    Closed,
}

/// One open codec instance bound to one stream descriptor.
pub struct EncoderSession {
    inner: Option<ffmpeg_next::codec::encoder::Video>,
    codec: ffmpeg_next::Codec,
    descriptor: StreamDescriptor,
    encoder_time_base: Rational,
    has_delay: bool,
    state: SessionState,
    frames_submitted: u64,
    packets_emitted: u64,
}

impl EncoderSession {
    pub fn open(registry: &Registry, descriptor: StreamDescriptor) -> Result<Self> {
        let codec = registry.find_encoder(descriptor.codec(), descriptor.encoder_name())?;
        let codec_name = codec.name().to_string();
        let open_failed = |reason: String| TranscodeError::EncoderOpenFailed {
            codec: codec_name.clone(),
            reason,
        };

        if descriptor.width() == 0 || descriptor.height() == 0 {
            return Err(open_failed(format!(
                "invalid frame size {}x{}",
                descriptor.width(),
                descriptor.height()
            )));
        }

        let mut encoder = ffmpeg_next::codec::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| open_failed(e.to_string()))?;
        encoder.set_width(descriptor.width());
        encoder.set_height(descriptor.height());
        encoder.set_format(descriptor.pixel_format());
        encoder.set_time_base(descriptor.time_base());
        encoder.set_frame_rate(Some(descriptor.frame_rate()));
        encoder.set_bit_rate(descriptor.bit_rate());
        encoder.set_gop(descriptor.gop_size());
        encoder.set_max_b_frames(descriptor.max_b_frames());
        unsafe {
            let ctx = encoder.as_mut_ptr();
            (*ctx).qmin = descriptor.qmin();
            (*ctx).qmax = descriptor.qmax();
        }
        if descriptor.global_header() {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        for (key, value) in descriptor.options() {
            opts.set(key, value);
        }
        let encoder = encoder
            .open_with(opts)
            .map_err(|e| open_failed(e.to_string()))?;

        let encoder_time_base: Rational = unsafe { (*encoder.0.as_ptr()).time_base.into() };
        let has_delay = has_delay(&codec);
        log::info!(
            "encoder {} opened: {}x{} {:?} @ {} fps, {} bps, gop {}, time base {}/{}, delay: {}",
            codec_name,
            descriptor.width(),
            descriptor.height(),
            descriptor.pixel_format(),
            descriptor.fps(),
            descriptor.bit_rate(),
            descriptor.gop_size(),
            encoder_time_base.numerator(),
            encoder_time_base.denominator(),
            has_delay
        );

        Ok(Self {
            inner: Some(encoder),
            codec,
            descriptor,
            encoder_time_base,
            has_delay,
            state: SessionState::Open,
            frames_submitted: 0,
            packets_emitted: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_delay(&self) -> bool {
        self.has_delay
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn codec(&self) -> ffmpeg_next::Codec {
        self.codec
    }

    /// Time base of the timestamps on emitted packets.
    pub fn time_base(&self) -> Rational {
        self.encoder_time_base
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn packets_emitted(&self) -> u64 {
        self.packets_emitted
    }

    pub(crate) fn encoder(&self) -> Option<&ffmpeg_next::codec::encoder::Video> {
        self.inner.as_ref()
    }

    /// Stamps the frame with the pts for `presentation_index` and feeds it to
    /// the codec. An empty result means the codec is buffering.
    pub fn submit(
        &mut self,
        mut frame: RawVideoFrame,
        presentation_index: u64,
    ) -> Result<Vec<EncodedPacket>> {
        if self.state != SessionState::Open {
            return Err(TranscodeError::invalid_state("encoder", "submit", self.state));
        }
        let expected = (
            self.descriptor.pixel_format(),
            self.descriptor.width(),
            self.descriptor.height(),
        );
        let actual = (frame.format(), frame.width(), frame.height());
        if actual != expected {
            return Err(TranscodeError::EncodeFailed {
                index: presentation_index,
                reason: format!("frame is {:?}, encoder expects {:?}", actual, expected),
            });
        }

        frame.set_pts(Some(self.descriptor.pts_for_index(presentation_index)));
        let encode_failed = |e: ffmpeg_next::Error| TranscodeError::EncodeFailed {
            index: presentation_index,
            reason: e.to_string(),
        };
        let encoder = self
            .inner
            .as_mut()
            .ok_or_else(|| TranscodeError::invalid_state("encoder", "submit", SessionState::Closed))?;
        encoder.send_frame(frame.as_video()).map_err(encode_failed)?;
        self.frames_submitted += 1;

        let mut packets = Vec::new();
        while let Some(packet) = self.receive_packet().map_err(encode_failed)? {
            packets.push(packet);
        }
        log::debug!(
            "frame {} (pts {:?}) submitted, {} packet(s) out",
            presentation_index,
            frame.pts(),
            packets.len()
        );
        Ok(packets)
    }

    /// Flushes what the codec still holds. The returned iterator is lazy and
    /// ends when the codec reports it has nothing left; draining again after
    /// that yields nothing. Codecs without internal delay are not flushed.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain {
            session: self,
            done: false,
        }
    }

    /// Releases the codec. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            log::info!(
                "encoder {} closed: {} frames in, {} packets out",
                self.codec.name(),
                self.frames_submitted,
                self.packets_emitted
            );
        }
        self.state = SessionState::Closed;
    }

    fn next_drained(&mut self) -> Result<Option<EncodedPacket>> {
        match self.state {
            SessionState::Open => {
                if !self.has_delay {
                    log::debug!("encoder {} has no delay, nothing to drain", self.codec.name());
                    self.state = SessionState::Exhausted;
                    return Ok(None);
                }
                let sent = match self.inner.as_mut() {
                    Some(encoder) => encoder.send_eof(),
                    None => Err(ffmpeg_next::Error::Bug),
                };
                if let Err(e) = sent {
                    self.state = SessionState::Exhausted;
                    return Err(TranscodeError::DrainFailed(e.to_string()));
                }
                self.state = SessionState::Draining;
            }
            SessionState::Draining => {}
            SessionState::Exhausted => return Ok(None),
            SessionState::Closed => {
                return Err(TranscodeError::invalid_state("encoder", "drain", self.state));
            }
        }

        match self.receive_packet() {
            Ok(Some(packet)) => Ok(Some(packet)),
            Ok(None) => {
                self.state = SessionState::Exhausted;
                log::debug!("encoder {} drained", self.codec.name());
                Ok(None)
            }
            Err(e) => {
                self.state = SessionState::Exhausted;
                Err(TranscodeError::DrainFailed(e.to_string()))
            }
        }
    }

    fn receive_packet(&mut self) -> std::result::Result<Option<EncodedPacket>, ffmpeg_next::Error> {
        let Some(encoder) = self.inner.as_mut() else {
            return Ok(None);
        };
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match encoder.receive_packet(&mut packet) {
            Ok(()) => {
                let mut packet = EncodedPacket::from((packet, self.encoder_time_base));
                let duration = self.descriptor.pts_for_index(1);
                if duration > 0 {
                    packet.set_duration(duration);
                }
                self.packets_emitted += 1;
                Ok(Some(packet))
            }
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Packets flushed out of an encoder at end of stream.
pub struct Drain<'a> {
    session: &'a mut EncoderSession,
    done: bool,
}

impl Iterator for Drain<'_> {
    type Item = Result<EncodedPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.session.next_drained() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::{codec, format::Pixel};

    use super::*;
    use crate::config::EncodeSettings;

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 48;

    fn descriptor(settings: EncodeSettings) -> StreamDescriptor {
        StreamDescriptor::new(&settings, WIDTH, HEIGHT, Rational::new(25, 1), false)
    }

    fn frame(shade: u8) -> RawVideoFrame {
        let mut video = ffmpeg_next::frame::Video::new(Pixel::YUV420P, WIDTH, HEIGHT);
        video.data_mut(0).fill(shade);
        video.data_mut(1).fill(128);
        video.data_mut(2).fill(128);
        RawVideoFrame::from(video)
    }

    fn mpeg4_settings() -> EncodeSettings {
        EncodeSettings {
            qmax: 31,
            ..EncodeSettings::default()
                .with_codec(codec::Id::MPEG4)
                .with_gop(12, 2)
        }
    }

    fn rawvideo_settings() -> EncodeSettings {
        EncodeSettings::default().with_codec(codec::Id::RAWVIDEO)
    }

    #[test]
    fn submitted_plus_drained_equals_frames() -> anyhow::Result<()> {
        let registry = Registry::new()?;
        let mut session = EncoderSession::open(&registry, descriptor(mpeg4_settings()))?;
        let mut from_submit = 0;
        for i in 0..10u64 {
            from_submit += session.submit(frame(i as u8 * 20), i)?.len();
        }
        let drained = session.drain().collect::<Result<Vec<_>>>()?;
        assert_eq!(session.state(), SessionState::Exhausted);
        assert_eq!(from_submit + drained.len(), 10);
        assert_eq!(session.packets_emitted(), 10);
        assert_eq!(session.frames_submitted(), 10);
        Ok(())
    }

    #[test]
    fn drain_is_idempotent_once_exhausted() -> anyhow::Result<()> {
        let registry = Registry::new()?;
        let mut session = EncoderSession::open(&registry, descriptor(mpeg4_settings()))?;
        for i in 0..4u64 {
            session.submit(frame(50), i)?;
        }
        let _ = session.drain().collect::<Result<Vec<_>>>()?;
        assert_eq!(session.drain().count(), 0);
        assert_eq!(session.drain().count(), 0);
        assert_eq!(session.state(), SessionState::Exhausted);
        Ok(())
    }

    #[test]
    fn submit_after_drain_fails_fast() -> anyhow::Result<()> {
        let registry = Registry::new()?;
        let mut session = EncoderSession::open(&registry, descriptor(mpeg4_settings()))?;
        session.submit(frame(10), 0)?;
        let mut drain = session.drain();
        let _first = drain.next();
        drop(drain);
        let err = session.submit(frame(10), 1).unwrap_err();
        assert!(matches!(err, TranscodeError::InvalidState { .. }), "{}", err);
        Ok(())
    }

    #[test]
    fn stateless_codec_skips_drain() -> anyhow::Result<()> {
        let registry = Registry::new()?;
        let mut session = EncoderSession::open(&registry, descriptor(rawvideo_settings()))?;
        assert!(!session.has_delay());
        for i in 0..3u64 {
            let packets = session.submit(frame(i as u8), i)?;
            assert_eq!(packets.len(), 1);
            assert_eq!(packets[0].pts(), Some(i as i64));
        }
        assert_eq!(session.drain().count(), 0);
        assert_eq!(session.state(), SessionState::Exhausted);
        Ok(())
    }

    #[test]
    fn wrong_frame_size_is_an_encode_failure() -> anyhow::Result<()> {
        let registry = Registry::new()?;
        let mut session = EncoderSession::open(&registry, descriptor(rawvideo_settings()))?;
        let small = RawVideoFrame::from(ffmpeg_next::frame::Video::new(Pixel::YUV420P, 32, 32));
        let err = session.submit(small, 0).unwrap_err();
        assert!(matches!(err, TranscodeError::EncodeFailed { index: 0, .. }));
        assert_eq!(session.state(), SessionState::Open);
        Ok(())
    }

    #[test]
    fn zero_size_descriptor_fails_to_open() -> anyhow::Result<()> {
        let registry = Registry::new()?;
        let d = StreamDescriptor::new(&mpeg4_settings(), 0, 48, Rational::new(25, 1), false);
        let err = EncoderSession::open(&registry, d).err().expect("open must fail");
        assert!(matches!(err, TranscodeError::EncoderOpenFailed { .. }));
        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> anyhow::Result<()> {
        let registry = Registry::new()?;
        let mut session = EncoderSession::open(&registry, descriptor(rawvideo_settings()))?;
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.drain().next().is_some_and(|r| r.is_err()));
        Ok(())
    }
}
