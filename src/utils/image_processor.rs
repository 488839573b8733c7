use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::error::AppError;

/// WebP cannot encode a side longer than this.
pub const MAX_DIMENSION: u32 = 16_383;
/// Pixel budget for any buffer built while rendering (160 MB as RGBA).
pub const MAX_PIXELS: u64 = 40_000_000;

fn check_dimensions(width: u32, height: u32) -> Result<(), AppError> {
    if width == 0
        || height == 0
        || width > MAX_DIMENSION
        || height > MAX_DIMENSION
        || u64::from(width) * u64::from(height) > MAX_PIXELS
    {
        return Err(AppError::BadRequest(format!(
            "a {width}x{height} rendition is out of range"
        )));
    }
    Ok(())
}

/// Height of a `src_width`x`src_height` image scaled to `width`.
fn scaled_height(src_width: u32, src_height: u32, width: u32) -> u32 {
    let height = (u64::from(src_height) * u64::from(width)).div_ceil(u64::from(src_width.max(1)));
    u32::try_from(height).unwrap_or(u32::MAX)
}

/// Canvas size after rotating a `width`x`height` image clockwise by `degrees`.
fn rotated_size(width: u32, height: u32, degrees: f32) -> (u32, u32) {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 || normalized == 180.0 {
        return (width, height);
    }
    if normalized == 90.0 || normalized == 270.0 {
        return (height, width);
    }

    let (w, h) = (width as f32, height as f32);
    let (sin, cos) = normalized.to_radians().sin_cos();
    (
        (w * cos.abs() + h * sin.abs()).ceil().max(1.0) as u32,
        (w * sin.abs() + h * cos.abs()).ceil().max(1.0) as u32,
    )
}

/// Decodes `data`, scales it to `width` keeping the aspect ratio, rotates it
/// clockwise by `degrees` and encodes the result as lossless webp.
///
/// Renditions that would exceed [`MAX_DIMENSION`] or [`MAX_PIXELS`] are
/// rejected before anything is allocated for them.
pub fn render_webp(data: &[u8], width: u32, degrees: f32) -> Result<Vec<u8>, AppError> {
    let img = image::load_from_memory(data)
        .map_err(|e| AppError::BadRequest(format!("Failed to load image: {}", e)))?;

    let height = scaled_height(img.width(), img.height(), width);
    check_dimensions(width, height)?;
    let (canvas_width, canvas_height) = rotated_size(width, height, degrees);
    check_dimensions(canvas_width, canvas_height)?;

    let img = img.resize(width, u32::MAX, FilterType::Lanczos3);
    let img = rotate(img, degrees);

    // The webp encoder only takes 8-bit RGB(A).
    let img = DynamicImage::ImageRgba8(img.to_rgba8());

    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::WebP)
        .map_err(|e| AppError::InternalServerError(format!("Failed to encode image: {}", e)))?;

    Ok(buffer.into_inner())
}

/// Quarter turns are exact pixel moves; any other angle is resampled onto a
/// canvas large enough to hold the rotated corners, padded with transparency.
pub fn rotate(img: DynamicImage, degrees: f32) -> DynamicImage {
    let normalized = degrees.rem_euclid(360.0);

    match normalized {
        n if n == 0.0 => img,
        n if n == 90.0 => img.rotate90(),
        n if n == 180.0 => img.rotate180(),
        n if n == 270.0 => img.rotate270(),
        n => DynamicImage::ImageRgba8(rotate_resampled(&img.to_rgba8(), n)),
    }
}

fn rotate_resampled(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let (w, h) = (src.width() as f32, src.height() as f32);
    let (sin, cos) = degrees.to_radians().sin_cos();

    let (out_w, out_h) = rotated_size(src.width(), src.height(), degrees);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ocx, ocy) = (out_w as f32 / 2.0, out_h as f32 / 2.0);

    // Inverse-map every output pixel centre back into the source. With y
    // pointing down, a positive angle turns the picture clockwise.
    RgbaImage::from_fn(out_w, out_h, |x, y| {
        let dx = x as f32 + 0.5 - ocx;
        let dy = y as f32 + 0.5 - ocy;
        let sx = dx * cos + dy * sin + cx - 0.5;
        let sy = -dx * sin + dy * cos + cy - 0.5;
        sample_bilinear(src, sx, sy)
    })
}

fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let (w, h) = (src.width() as f32, src.height() as f32);
    if x <= -1.0 || y <= -1.0 || x >= w || y >= h {
        return Rgba([0, 0, 0, 0]);
    }

    let fetch = |px: f32, py: f32| -> [f32; 4] {
        if px < 0.0 || py < 0.0 || px >= w || py >= h {
            [0.0; 4]
        } else {
            let p = src.get_pixel(px as u32, py as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1.0, y0);
    let bl = fetch(x0, y0 + 1.0);
    let br = fetch(x0 + 1.0, y0 + 1.0);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bottom = bl[c] * (1.0 - fx) + br[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}
