//! Global hotkey polling with rising-edge debounce.
//!
//! Bindings are fixed: `]` stops the session, `[` saves a clip of the rolling
//! window, `=` takes a screenshot.

use anyhow::{Context, Result};
use device_query::{DeviceQuery, DeviceState, Keycode};

/// Physical keys the session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Exit,
    SaveClip,
    Screenshot,
}

impl Key {
    pub fn label(self) -> &'static str {
        match self {
            Key::Exit => "]",
            Key::SaveClip => "[",
            Key::Screenshot => "=",
        }
    }

    fn keycode(self) -> Keycode {
        match self {
            Key::Exit => Keycode::RightBracket,
            Key::SaveClip => Keycode::LeftBracket,
            Key::Screenshot => Keycode::Equal,
        }
    }
}

/// Level-triggered key state, sampled once per capture tick.
pub trait KeyState {
    fn is_pressed(&self, key: Key) -> bool;
}

/// Global keyboard state via device_query.
pub struct DeviceKeyState {
    state: DeviceState,
}

impl DeviceKeyState {
    pub fn new() -> Result<Self> {
        let state = open_device_state().context("cannot read global keyboard state")?;
        Ok(Self { state })
    }
}

/// `DeviceState::new` panics on Linux when no X display can be opened.
pub(crate) fn open_device_state() -> Result<DeviceState> {
    #[cfg(target_os = "linux")]
    {
        DeviceState::checked_new()
            .ok_or_else(|| anyhow::anyhow!("could not connect to an X display"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Ok(DeviceState::new())
    }
}

impl KeyState for DeviceKeyState {
    fn is_pressed(&self, key: Key) -> bool {
        self.state.get_keys().contains(&key.keycode())
    }
}

/// Action requested by the operator this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Screenshot,
    SaveClip,
    Exit,
}

/// Maps key levels to commands.
///
/// Screenshot and SaveClip fire on the rising edge only, so a held key acts
/// once. Exit is level-triggered and pre-empts everything else polled in the
/// same tick. When Screenshot and SaveClip rise together both fire, screenshot
/// first, so the clip includes the frame that was just saved.
#[derive(Debug, Default)]
pub struct HotkeyRouter {
    save_held: bool,
    screenshot_held: bool,
}

impl HotkeyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll(&mut self, keys: &dyn KeyState) -> Vec<Command> {
        let exit = keys.is_pressed(Key::Exit);
        let save = keys.is_pressed(Key::SaveClip);
        let screenshot = keys.is_pressed(Key::Screenshot);

        let save_rising = save && !self.save_held;
        let screenshot_rising = screenshot && !self.screenshot_held;
        self.save_held = save;
        self.screenshot_held = screenshot;

        if exit {
            return vec![Command::Exit];
        }
        let mut commands = Vec::with_capacity(2);
        if screenshot_rising {
            commands.push(Command::Screenshot);
        }
        if save_rising {
            commands.push(Command::SaveClip);
        }
        commands
    }
}
