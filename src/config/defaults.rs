pub const DEFAULT_FPS: u32 = 15;
pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 60;

pub const DEFAULT_CLIP_SECONDS: u32 = 20;
pub const MIN_CLIP_SECONDS: u32 = 1;
pub const MAX_CLIP_SECONDS: u32 = 120;

pub(super) const APP_ID_PATTERN: &str = r"^[A-Za-z0-9._-]{1,64}$";
pub(super) const MAX_DEVICE_NAME_LEN: usize = 256;
pub(super) const FFMPEG_ALLOWLIST: &[&str] = &["ffmpeg", "ffmpeg.exe"];
pub(super) const FORBIDDEN_DEVICE_CHARS: &[char] = &[';', '|', '&', '$', '`', '<', '>'];
