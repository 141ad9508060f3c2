use bytes::Bytes;
use ffmpeg_next::Rational;

/// Compressed unit produced by the encoder. Timestamps are expressed in
/// `time_base`; the container writer rescales them to its stream time base.
pub struct EncodedPacket {
    packet: ffmpeg_next::codec::packet::Packet,
    time_base: Rational,
}

impl EncodedPacket {
    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }

    /// Decode timestamp, or the presentation timestamp when the codec left
    /// dts unset.
    pub fn ordering_ts(&self) -> Option<i64> {
        self.packet.dts().or(self.packet.pts())
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }

    pub fn index(&self) -> usize {
        self.packet.stream()
    }

    pub fn data(&self) -> Bytes {
        self.packet
            .data()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default()
    }

    pub fn is_key(&self) -> bool {
        self.packet.is_key()
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn set_duration(&mut self, duration: i64) {
        self.packet.set_duration(duration);
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::codec::packet::Packet {
        &mut self.packet
    }
}

impl From<(ffmpeg_next::codec::packet::Packet, Rational)> for EncodedPacket {
    fn from((packet, time_base): (ffmpeg_next::codec::packet::Packet, Rational)) -> Self {
        Self { packet, time_base }
    }
}

impl std::fmt::Debug for EncodedPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedPacket")
            .field("pts", &self.pts())
            .field("dts", &self.dts())
            .field("size", &self.size())
            .field("key", &self.is_key())
            .field("time_base", &self.time_base)
            .finish()
    }
}
