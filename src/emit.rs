use std::io::Write;

use image::DynamicImage;
use image::imageops::FilterType;

use crate::error::{SimpipeError, SimpipeResult};
use crate::stop::StopToken;

/// Canonical output width in pixels.
pub const FRAME_WIDTH: u32 = 640;
/// Canonical output height in pixels.
pub const FRAME_HEIGHT: u32 = 480;
/// Canonical output channel count (RGB).
pub const FRAME_CHANNELS: usize = 3;
/// Size of one emitted frame in bytes.
pub const FRAME_BYTES: usize = (FRAME_WIDTH * FRAME_HEIGHT) as usize * FRAME_CHANNELS;

/// Writes frames to the consumer as raw unframed RGB24 bytes.
///
/// Every emitted frame is exactly `640x480x3` bytes, row-major; resolution
/// and pixel format are agreed with the consumer out-of-band. A broken pipe
/// means the consumer is gone and is converted into a stop request, never
/// surfaced as an error.
pub struct RawFrameSink<W> {
    out: W,
    stop: StopToken,
}

impl<W: Write> RawFrameSink<W> {
    pub fn new(out: W, stop: StopToken) -> Self {
        Self { out, stop }
    }

    /// Reduce `frame` to the canonical format and write it out.
    pub fn emit(&mut self, frame: &DynamicImage) -> SimpipeResult<()> {
        let rgb = if frame.width() != FRAME_WIDTH || frame.height() != FRAME_HEIGHT {
            frame
                .resize_exact(FRAME_WIDTH, FRAME_HEIGHT, FilterType::Triangle)
                .to_rgb8()
        } else {
            frame.to_rgb8()
        };

        let wrote = self
            .out
            .write_all(rgb.as_raw())
            .and_then(|()| self.out.flush());
        if let Err(e) = wrote {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                self.stop.set();
                return Ok(());
            }
            return Err(SimpipeError::emit(format!("write frame to output: {e}")));
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
