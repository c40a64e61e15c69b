use super::defaults::{
    APP_ID_PATTERN, FFMPEG_ALLOWLIST, FORBIDDEN_DEVICE_CHARS, MAX_DEVICE_NAME_LEN,
};
use super::{AppConfig, MAX_CLIP_SECONDS, MAX_FPS, MIN_CLIP_SECONDS, MIN_FPS};
use crate::logcat::ToolCommand;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values, parse tool command lines, and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            bail!("--fps must be between {MIN_FPS} and {MAX_FPS}, got {}", self.fps);
        }
        if !(MIN_CLIP_SECONDS..=MAX_CLIP_SECONDS).contains(&self.clip_seconds) {
            bail!(
                "--clip-seconds must be between {MIN_CLIP_SECONDS} and {MAX_CLIP_SECONDS}, got {}",
                self.clip_seconds
            );
        }

        if let Some(device) = &self.input_device {
            if device.trim().is_empty()
                || device.len() > MAX_DEVICE_NAME_LEN
                || device.chars().any(|ch| ch.is_control())
            {
                bail!("--input-device must be 1-{MAX_DEVICE_NAME_LEN} characters with no control characters");
            }
        }

        if let Some(ffmpeg) = &self.ffmpeg_cmd {
            self.ffmpeg_cmd = Some(sanitize_binary(ffmpeg, "--ffmpeg-cmd", FFMPEG_ALLOWLIST)?);
        }

        if self.is_listing() {
            return Ok(());
        }

        let app_id = self
            .app_id
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| anyhow!("--app-id (or BUGREEL_APP_ID) is required to start recording"))?;
        validate_app_id(app_id)?;
        self.app_id = Some(app_id.to_string());

        if self.no_device_logs {
            self.log_tool = None;
            self.connect_tool = None;
            self.clear_tool = None;
        } else {
            self.log_tool = Some(parse_tool(&self.log_cmd, "--log-cmd")?);
            self.connect_tool = parse_optional_tool(&self.log_connect_cmd, "--log-connect-cmd")?;
            self.clear_tool = parse_optional_tool(&self.log_clear_cmd, "--log-clear-cmd")?;
        }

        let root = match &self.output_root {
            Some(root) => root.clone(),
            None => default_output_root()?,
        };
        if root.exists() && !root.is_dir() {
            bail!("--output-root '{}' is not a directory", root.display());
        }
        self.output_root = Some(root);
        Ok(())
    }

    /// Validated app id. Only meaningful after `validate` on a recording invocation.
    pub fn app_id(&self) -> Result<&str> {
        self.app_id
            .as_deref()
            .ok_or_else(|| anyhow!("--app-id is required to start recording"))
    }

    pub fn resolved_output_root(&self) -> Result<PathBuf> {
        match &self.output_root {
            Some(root) => Ok(root.clone()),
            None => default_output_root(),
        }
    }
}

pub(super) fn validate_app_id(app_id: &str) -> Result<()> {
    let pattern = Regex::new(APP_ID_PATTERN).context("app id pattern")?;
    if !pattern.is_match(app_id) {
        bail!(
            "--app-id must be 1-64 characters of letters, digits, '.', '_' or '-', got '{app_id}'"
        );
    }
    if app_id == "." || app_id == ".." {
        bail!("--app-id cannot be '{app_id}'");
    }
    Ok(())
}

fn parse_tool(raw: &str, flag: &str) -> Result<ToolCommand> {
    let tool = ToolCommand::parse(raw).with_context(|| format!("{flag} is invalid"))?;
    if tool.program().chars().any(|ch| FORBIDDEN_DEVICE_CHARS.contains(&ch)) {
        bail!("{flag} program '{}' contains shell metacharacters", tool.program());
    }
    Ok(tool)
}

/// An empty command line disables the step.
fn parse_optional_tool(raw: &str, flag: &str) -> Result<Option<ToolCommand>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_tool(raw, flag).map(Some)
}

/// The user's Downloads folder, falling back to `~/Downloads`.
pub(super) fn default_output_root() -> Result<PathBuf> {
    if let Some(downloads) = dirs::download_dir() {
        return Ok(downloads);
    }
    dirs::home_dir()
        .map(|home| home.join("Downloads"))
        .ok_or_else(|| anyhow!("cannot locate a Downloads folder; pass --output-root"))
}

pub(super) fn sanitize_binary(value: &str, flag: &str, allowlist: &[&str]) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if let Some(allowed) = allowlist
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return Ok((*allowed).to_string());
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    bail!("{flag} must be one of {allowlist:?} or an existing binary path");
}
