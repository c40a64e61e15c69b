//! Display sampling: frames, the cursor marker, and the platform screen source.
//!
//! A [`FrameSource`] returns one fully composed RGB24 frame per call. The
//! platform implementation ([`ScreenFrameSource`]) grabs the primary monitor
//! with xcap and stamps the pointer position onto it.

mod screen;

use anyhow::Result;
use image::{Rgb, RgbImage};
use std::sync::Arc;

pub use screen::{list_displays, DevicePointer, DisplayInfo, ScreenFrameSource};

/// Radius of the filled cursor marker, in pixels.
pub const CURSOR_RADIUS: i32 = 12;

/// Cursor marker colour.
pub const CURSOR_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// One captured display image in packed RGB24, plus its position in the capture sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    seq: u64,
    image: RgbImage,
}

/// Frames are shared between the rolling buffer, the live writer, and export jobs.
pub type SharedFrame = Arc<Frame>;

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self { seq, image }
    }

    /// Solid-colour frame, mostly useful for fakes and tests.
    pub fn filled(seq: u64, width: u32, height: u32, color: Rgb<u8>) -> Self {
        Self::new(seq, RgbImage::from_pixel(width, height, color))
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Raw `rgb24` bytes, row-major, no padding.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Produces composed frames at whatever cadence the caller drives it.
pub trait FrameSource {
    /// Fixed output size for every frame this source returns.
    fn dimensions(&self) -> (u32, u32);

    /// Capture the current display with the cursor overlay applied. An error here
    /// ends the recording session.
    fn capture_frame(&mut self) -> Result<Frame>;
}

/// Reports the global pointer position in physical screen coordinates.
pub trait PointerSource {
    fn position(&self) -> (i32, i32);
}

/// Fill a circle of [`CURSOR_RADIUS`] centred on `(x, y)`, clipped to the image.
pub fn overlay_cursor(image: &mut RgbImage, x: i32, y: i32) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let r = CURSOR_RADIUS;
    if x + r < 0 || y + r < 0 || x - r >= width || y - r >= height {
        return;
    }
    for dy in -r..=r {
        let py = y + dy;
        if py < 0 || py >= height {
            continue;
        }
        for dx in -r..=r {
            let px = x + dx;
            if px < 0 || px >= width || dx * dx + dy * dy > r * r {
                continue;
            }
            image.put_pixel(px as u32, py as u32, CURSOR_COLOR);
        }
    }
}
