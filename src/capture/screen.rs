use super::{overlay_cursor, Frame, FrameSource, PointerSource};
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use crate::hotkeys::open_device_state;
use device_query::{DeviceQuery, DeviceState};
use image::{imageops, DynamicImage, RgbImage};
use xcap::Monitor;

/// Summary of an attached display for `--list-displays`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

pub fn list_displays() -> Result<Vec<DisplayInfo>> {
    let monitors = Monitor::all().map_err(|err| anyhow!("failed to enumerate displays: {err}"))?;
    Ok(monitors
        .iter()
        .enumerate()
        .map(|(idx, monitor)| DisplayInfo {
            name: monitor
                .name()
                .unwrap_or_else(|_| format!("Display {idx}")),
            x: monitor.x().unwrap_or(0),
            y: monitor.y().unwrap_or(0),
            width: monitor.width().unwrap_or(0),
            height: monitor.height().unwrap_or(0),
            is_primary: monitor.is_primary().unwrap_or(false),
        })
        .collect())
}

/// Global pointer position via device_query.
pub struct DevicePointer {
    state: DeviceState,
}

impl DevicePointer {
    pub fn new() -> Result<Self> {
        let state = open_device_state().context("cannot read global pointer position")?;
        Ok(Self { state })
    }
}

impl PointerSource for DevicePointer {
    fn position(&self) -> (i32, i32) {
        self.state.get_mouse().coords
    }
}

/// Primary-monitor frame source. The output size is pinned to the first
/// successful grab; later grabs of a different size are rescaled to it.
pub struct ScreenFrameSource {
    monitor: Monitor,
    origin: (i32, i32),
    size: (u32, u32),
    pointer: Box<dyn PointerSource>,
    next_seq: u64,
}

impl ScreenFrameSource {
    /// Open the primary display (or the first one if none is flagged primary).
    pub fn primary(pointer: Box<dyn PointerSource>) -> Result<Self> {
        let monitors =
            Monitor::all().map_err(|err| anyhow!("failed to enumerate displays: {err}"))?;
        let primary = monitors
            .iter()
            .position(|m| m.is_primary().unwrap_or(false))
            .unwrap_or(0);
        let monitor = monitors
            .into_iter()
            .nth(primary)
            .context("no displays found")?;
        let origin = (monitor.x().unwrap_or(0), monitor.y().unwrap_or(0));
        let first_grab = monitor
            .capture_image()
            .map_err(|err| anyhow!("initial display capture failed: {err}"))?;
        let size = (first_grab.width(), first_grab.height());
        if size.0 == 0 || size.1 == 0 {
            return Err(anyhow!("display reported an empty capture ({}x{})", size.0, size.1));
        }
        log_debug(&format!(
            "screen source: {} origin={origin:?} size={}x{}",
            monitor.name().unwrap_or_else(|_| "unknown".to_string()),
            size.0,
            size.1
        ));
        Ok(Self {
            monitor,
            origin,
            size,
            pointer,
            next_seq: 0,
        })
    }

    fn grab_rgb(&self) -> Result<RgbImage> {
        let rgba = self
            .monitor
            .capture_image()
            .map_err(|err| anyhow!("display capture failed: {err}"))?;
        let mut rgb = DynamicImage::ImageRgba8(rgba).into_rgb8();
        if (rgb.width(), rgb.height()) != self.size {
            rgb = imageops::resize(&rgb, self.size.0, self.size.1, imageops::FilterType::Nearest);
        }
        Ok(rgb)
    }
}

impl FrameSource for ScreenFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    fn capture_frame(&mut self) -> Result<Frame> {
        let mut image = self.grab_rgb()?;
        let (px, py) = self.pointer.position();
        overlay_cursor(&mut image, px - self.origin.0, py - self.origin.1);
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(Frame::new(seq, image))
    }
}
