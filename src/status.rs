//! Operator-facing status lines.

use crate::hotkeys::Key;
use crossterm::{
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warning,
    Error,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Tone::Info => Color::Cyan,
            Tone::Success => Color::Green,
            Tone::Warning => Color::Yellow,
            Tone::Error => Color::Red,
        }
    }
}

/// Receives every message the session wants the operator to see.
pub trait StatusSink {
    fn report(&mut self, tone: Tone, message: &str);
}

/// Coloured lines on stdout; warnings and errors go to stderr.
#[derive(Debug, Default)]
pub struct TerminalStatus;

impl StatusSink for TerminalStatus {
    fn report(&mut self, tone: Tone, message: &str) {
        let result = match tone {
            Tone::Warning | Tone::Error => write_line(&mut io::stderr().lock(), tone, message),
            Tone::Info | Tone::Success => write_line(&mut io::stdout().lock(), tone, message),
        };
        if let Err(err) = result {
            crate::log_debug(&format!("status write failed: {err}"));
        }
    }
}

fn write_line<W: Write>(out: &mut W, tone: Tone, message: &str) -> io::Result<()> {
    queue!(
        out,
        SetForegroundColor(tone.color()),
        Print(message),
        ResetColor,
        Print("\n")
    )?;
    out.flush()
}

/// Collects messages in memory.
#[derive(Debug, Default)]
pub struct BufferedStatus {
    pub lines: Vec<(Tone, String)>,
}

impl BufferedStatus {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|(_, line)| line.contains(needle))
    }
}

impl StatusSink for BufferedStatus {
    fn report(&mut self, tone: Tone, message: &str) {
        self.lines.push((tone, message.to_string()));
    }
}

/// Hotkey reminder shown once recording starts.
pub fn key_bindings_help() -> String {
    format!(
        "Press '{}' to save the last clip, '{}' for a screenshot, '{}' to stop recording.",
        Key::SaveClip.label(),
        Key::Screenshot.label(),
        Key::Exit.label()
    )
}
