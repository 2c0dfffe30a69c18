//! Frame dumps for inspecting what a session rendered.

use std::path::Path;

use anyhow::{Context, Result};

/// Framebuffer pixels are `0xAARRGGBB`; PNG wants RGBA byte order.
pub fn argb_to_rgba(frame: &[u32]) -> Vec<u8> {
    frame
        .iter()
        .flat_map(|&px| {
            let [a, r, g, b] = px.to_be_bytes();
            [r, g, b, a]
        })
        .collect()
}

pub fn write_png(path: &Path, width: u32, height: u32, frame: &[u32]) -> Result<()> {
    let image = image::RgbaImage::from_raw(width, height, argb_to_rgba(frame))
        .with_context(|| format!("frame has {} pixels, expected {width}x{height}", frame.len()))?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write {}", path.display()))?;
    tracing::info!(path = %path.display(), width, height, "frame written");
    Ok(())
}
