//! simpipe streams robot-simulation video frames to a downstream encoder.
//!
//! Two producer strategies share one frame contract:
//!
//! - The [`adapter`] tries to drive an external simulation backend process
//!   (locate -> spawn -> handshake -> construct environment -> step/render
//!   loop -> close), normalizing whatever frame payloads it returns.
//! - The [`fallback`] renderer draws a moving marker on a blank canvas with
//!   no external dependencies, and takes over whenever the backend cannot be
//!   used.
//!
//! Either way, frames flow through the [`emit::RawFrameSink`] until the
//! [`stop::StopToken`] is set by a signal or by the consumer going away.
//!
//! Output wire contract: raw unframed RGB24 bytes, exactly 640x480x3 per
//! frame, written to the output stream with no headers or delimiters. The
//! consumer (typically an `ffmpeg -f rawvideo` input) knows the resolution
//! and pixel format out-of-band.
#![forbid(unsafe_code)]

pub mod adapter;
pub mod backend;
pub mod clock;
pub mod config;
pub mod emit;
pub mod error;
pub mod fallback;
pub mod normalize;
pub mod stop;

pub use adapter::{Adapter, AdapterState, TickError};
pub use backend::{Backend, Capabilities, ResetForm, StepForm};
pub use clock::TickPacer;
pub use config::{DEFAULT_FPS, RunConfig};
pub use emit::{FRAME_BYTES, FRAME_CHANNELS, FRAME_HEIGHT, FRAME_WIDTH, RawFrameSink};
pub use error::{SimpipeError, SimpipeResult};
pub use normalize::FramePayload;
pub use stop::StopToken;
