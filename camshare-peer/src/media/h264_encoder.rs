use crate::error::MediaError;
use openh264::OpenH264API;
use openh264::encoder::{
    BitRate, Encoder, EncoderConfig, FrameRate, RateControlMode, SpsPpsStrategy, UsageType,
};
use openh264::formats::{RgbSliceU8, YUVBuffer};

/// RGB to H.264 (Annex-B) for camera frames.
pub(crate) struct H264Encoder {
    encoder: Encoder,
}

impl H264Encoder {
    pub(crate) fn new(frame_rate: u32, bitrate_bps: u32) -> Result<Self, MediaError> {
        // SPS/PPS travel with every keyframe so a viewer can join mid-stream.
        let config = EncoderConfig::new()
            .usage_type(UsageType::CameraVideoRealTime)
            .max_frame_rate(FrameRate::from_hz(frame_rate as f32))
            .bitrate(BitRate::from_bps(bitrate_bps))
            .rate_control_mode(RateControlMode::Bitrate)
            .sps_pps_strategy(SpsPpsStrategy::InAccessUnit);

        let encoder = Encoder::with_api_config(OpenH264API::default(), config)
            .map_err(|e| MediaError::Other(format!("H.264 encoder unavailable: {e}")))?;
        Ok(Self { encoder })
    }

    /// Encodes one packed RGB8 frame. An empty result means the encoder
    /// skipped the frame.
    pub(crate) fn encode(
        &mut self,
        rgb: &[u8],
        width: usize,
        height: usize,
    ) -> Result<Vec<u8>, MediaError> {
        let expected = width * height * 3;
        if rgb.len() != expected {
            return Err(MediaError::Other(format!(
                "frame is {} bytes, expected {expected} for {width}x{height}",
                rgb.len()
            )));
        }

        let yuv = YUVBuffer::from_rgb_source(RgbSliceU8::new(rgb, (width, height)));
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| MediaError::Other(format!("encoding failed: {e}")))?;
        Ok(bitstream.to_vec())
    }
}
