use std::io::Write;

use simpipe::{FRAME_BYTES, RawFrameSink, RunConfig, StopToken, fallback};

/// Accepts a fixed number of frame writes, then reports the consumer gone.
struct PipeBudget {
    buf: Vec<u8>,
    frames_left: usize,
}

impl PipeBudget {
    fn new(frames: usize) -> Self {
        Self {
            buf: Vec::new(),
            frames_left: frames,
        }
    }
}

impl Write for PipeBudget {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if self.frames_left == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        }
        self.frames_left -= 1;
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn pixel(frames: &[u8], frame: usize, x: u32, y: u32) -> [u8; 3] {
    let base = frame * FRAME_BYTES + (y as usize * 640 + x as usize) * 3;
    [frames[base], frames[base + 1], frames[base + 2]]
}

#[test]
fn streams_canonical_frames_until_consumer_goes_away() {
    let cfg = RunConfig {
        fps: 500,
        config_path: None,
    };
    let stop = StopToken::new();
    let mut sink = RawFrameSink::new(PipeBudget::new(6), stop.clone());

    let code = fallback::run(&cfg, &stop, &mut sink).unwrap();
    assert_eq!(code, 0);
    // The broken pipe was converted into a stop, not an error.
    assert!(stop.is_set());

    let frames = sink.into_inner().buf;
    assert_eq!(frames.len(), 6 * FRAME_BYTES);

    // Tick 5 evaluates the trajectory at t = 1.0.
    let center = fallback::marker_center(1.0);
    let (cx, cy) = (center.x as u32, center.y as u32);
    assert_eq!(pixel(&frames, 5, cx, cy + 4), fallback::MARKER_FILL.0);
    assert_eq!(pixel(&frames, 5, 0, 0), fallback::BACKGROUND.0);

    // The marker moves between ticks.
    assert_ne!(pixel(&frames, 0, cx, cy + 4), pixel(&frames, 5, cx, cy + 4));
}

#[test]
fn stop_set_up_front_produces_no_frames() {
    let cfg = RunConfig::default();
    let stop = StopToken::new();
    stop.set();
    let mut sink = RawFrameSink::new(PipeBudget::new(8), stop.clone());

    let code = fallback::run(&cfg, &stop, &mut sink).unwrap();
    assert_eq!(code, 0);
    assert!(sink.into_inner().buf.is_empty());
}
