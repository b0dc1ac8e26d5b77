use std::io::Write;

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use kurbo::{Point, Vec2};

use crate::clock::TickPacer;
use crate::config::RunConfig;
use crate::emit::{FRAME_HEIGHT, FRAME_WIDTH, RawFrameSink};
use crate::error::{SimpipeError, SimpipeResult};
use crate::stop::StopToken;

pub const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
pub const MARKER_FILL: Rgb<u8> = Rgb([200, 80, 80]);
pub const HEADING_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const MARKER_RADIUS: i32 = 24;

/// Phase advance per tick. The trajectory depends only on the tick count,
/// never on wall-clock time.
pub const PHASE_STEP: f64 = 0.2;

/// Closed-form marker trajectory: an elliptical orbit around the canvas
/// center with a deliberately shorter X amplitude.
pub fn marker_center(t: f64) -> Point {
    let w = f64::from(FRAME_WIDTH);
    let h = f64::from(FRAME_HEIGHT);
    Point::new(
        (w / 2.0 + (w / 3.0) * 0.6 * t.cos()).trunc(),
        (h / 2.0 + (h / 3.0) * t.sin()).trunc(),
    )
}

/// Draw one fallback frame at phase `t`.
pub fn render_frame(t: f64) -> SimpipeResult<RgbImage> {
    let mut canvas = blank_canvas()?;
    let center = marker_center(t);
    let (cx, cy) = (center.x as i32, center.y as i32);

    draw_filled_circle_mut(&mut canvas, (cx, cy), MARKER_RADIUS, MARKER_FILL);

    // Heading indicator: a 3px line from the marker center along +X.
    let tip = center + Vec2::new(f64::from(MARKER_RADIUS), 0.0);
    for dy in -1..=1 {
        draw_line_segment_mut(
            &mut canvas,
            (center.x as f32, (cy + dy) as f32),
            (tip.x as f32, (cy + dy) as f32),
            HEADING_COLOR,
        );
    }

    Ok(canvas)
}

fn blank_canvas() -> SimpipeResult<RgbImage> {
    let mut data = Vec::with_capacity((FRAME_WIDTH * FRAME_HEIGHT) as usize * 3);
    for _ in 0..FRAME_WIDTH * FRAME_HEIGHT {
        data.extend_from_slice(&BACKGROUND.0);
    }
    RgbImage::from_raw(FRAME_WIDTH, FRAME_HEIGHT, data)
        .ok_or_else(|| SimpipeError::render("no usable 2d canvas for the fallback renderer"))
}

/// Self-contained producer loop: draw, emit, sleep, until stopped.
///
/// A canvas failure on the first tick aborts before any frame is emitted;
/// the caller maps that error to a nonzero process exit.
pub fn run<W: Write>(
    cfg: &RunConfig,
    stop: &StopToken,
    sink: &mut RawFrameSink<W>,
) -> SimpipeResult<i32> {
    let mut pacer = TickPacer::new(cfg.fps);
    let mut t = 0.0_f64;
    while !stop.is_set() {
        let canvas = render_frame(t)?;
        sink.emit(&DynamicImage::ImageRgb8(canvas))?;
        t += PHASE_STEP;
        pacer.pace();
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trajectory_matches_closed_form() {
        // Tick 5 of the production loop evaluates the trajectory at t = 1.0.
        let t = PHASE_STEP * 5.0;
        let p = marker_center(t);
        assert_eq!(p.x, (320.0 + (640.0 / 3.0) * 0.6 * t.cos()).trunc());
        assert_eq!(p.y, (240.0 + 160.0 * t.sin()).trunc());
        assert_eq!((p.x, p.y), (389.0, 374.0));
    }

    #[test]
    fn trajectory_is_deterministic() {
        for n in 0..50 {
            let t = PHASE_STEP * f64::from(n);
            assert_eq!(marker_center(t), marker_center(t));
        }
    }

    #[test]
    fn frame_is_canonical_with_marker_and_background() {
        let frame = render_frame(0.0).unwrap();
        assert_eq!((frame.width(), frame.height()), (FRAME_WIDTH, FRAME_HEIGHT));

        let center = marker_center(0.0);
        assert_eq!(frame.get_pixel(0, 0), &BACKGROUND);
        // Just below the center to avoid the heading line overdraw.
        assert_eq!(
            frame.get_pixel(center.x as u32, center.y as u32 + 4),
            &MARKER_FILL
        );
        assert_eq!(
            frame.get_pixel(center.x as u32 + 5, center.y as u32),
            &HEADING_COLOR
        );
    }

    #[test]
    fn frames_at_equal_phase_are_identical() {
        assert_eq!(render_frame(1.4).unwrap(), render_frame(1.4).unwrap());
    }
}
