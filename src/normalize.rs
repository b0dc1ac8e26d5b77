use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, RgbImage};
use serde_json::Value;

/// A backend frame payload of not-yet-trusted shape.
///
/// The backend is an external, uncontrolled API; its `render` reply may carry
/// a nested numeric pixel array, base64-encoded image bytes, or something
/// else entirely. Classification is by shape only; interpretation happens in
/// [`normalize`].
#[derive(Clone, Debug)]
pub enum FramePayload {
    NumericArray(Value),
    EncodedBytes(Vec<u8>),
    Other(Value),
}

/// Classify a raw `render` payload by its JSON shape.
pub fn classify(payload: Value) -> FramePayload {
    match payload {
        Value::String(text) => match BASE64.decode(text.as_bytes()) {
            Ok(bytes) => FramePayload::EncodedBytes(bytes),
            Err(_) => FramePayload::Other(Value::String(text)),
        },
        array @ Value::Array(_) => FramePayload::NumericArray(array),
        other => FramePayload::Other(other),
    }
}

/// Reduce a payload to a drawable image, or nothing for this tick.
///
/// Every interpretation failure is non-fatal and maps to `None`; this
/// function never panics and never returns an error.
///
/// Encoded bytes that fail to decode are discarded: raw pixel layout cannot
/// be distinguished from a broken encoded container without metadata, so
/// there is no raw-byte passthrough.
pub fn normalize(payload: FramePayload) -> Option<DynamicImage> {
    match payload {
        FramePayload::NumericArray(value) => image_from_nested(&value),
        FramePayload::EncodedBytes(bytes) => image::load_from_memory(&bytes).ok(),
        FramePayload::Other(value) => image_from_shaped(&value),
    }
}

/// Interpret a nested `rows x cols x channels` numeric array as an image.
///
/// Accepts 1, 3 or 4 channels; grayscale is expanded and alpha is dropped.
fn image_from_nested(value: &Value) -> Option<DynamicImage> {
    let rows = value.as_array()?;
    let height = rows.len();
    let width = rows.first()?.as_array()?.len();
    if width == 0 {
        return None;
    }
    let channels = match rows.first()?.as_array()?.first()? {
        Value::Number(_) => 1,
        Value::Array(px) => px.len(),
        _ => return None,
    };
    if !matches!(channels, 1 | 3 | 4) {
        return None;
    }

    let mut data = Vec::with_capacity(width * height * 3);
    for row in rows {
        let row = row.as_array()?;
        if row.len() != width {
            return None;
        }
        for pixel in row {
            match pixel {
                Value::Number(_) if channels == 1 => {
                    let v = sample_u8(pixel)?;
                    data.extend_from_slice(&[v, v, v]);
                }
                Value::Array(px) if channels > 1 => {
                    if px.len() != channels {
                        return None;
                    }
                    data.push(sample_u8(&px[0])?);
                    data.push(sample_u8(&px[1])?);
                    data.push(sample_u8(&px[2])?);
                }
                _ => return None,
            }
        }
    }

    RgbImage::from_raw(width as u32, height as u32, data).map(DynamicImage::ImageRgb8)
}

/// Generic coercion for anything else: an object carrying `shape: [h, w, c]`
/// and a flat numeric `pixels` array is rebuilt into an image.
fn image_from_shaped(value: &Value) -> Option<DynamicImage> {
    let obj = value.as_object()?;
    let shape = obj.get("shape")?.as_array()?;
    let [h, w, c] = shape.as_slice() else {
        return None;
    };
    let (height, width, channels) = (
        h.as_u64()? as usize,
        w.as_u64()? as usize,
        c.as_u64()? as usize,
    );
    if width == 0 || height == 0 || !matches!(channels, 1 | 3 | 4) {
        return None;
    }

    let pixels = obj.get("pixels")?.as_array()?;
    if pixels.len() != width * height * channels {
        return None;
    }

    let mut data = Vec::with_capacity(width * height * 3);
    for chunk in pixels.chunks(channels) {
        if channels == 1 {
            let v = sample_u8(&chunk[0])?;
            data.extend_from_slice(&[v, v, v]);
        } else {
            data.push(sample_u8(&chunk[0])?);
            data.push(sample_u8(&chunk[1])?);
            data.push(sample_u8(&chunk[2])?);
        }
    }

    RgbImage::from_raw(width as u32, height as u32, data).map(DynamicImage::ImageRgb8)
}

fn sample_u8(value: &Value) -> Option<u8> {
    if let Some(v) = value.as_u64() {
        return u8::try_from(v).ok();
    }
    let v = value.as_f64()?;
    (v.is_finite() && (0.0..=255.0).contains(&v)).then(|| v.round() as u8)
}
