use anyhow::Result;
use bugreel::audio::AudioSource;
use bugreel::capture::{self, DisplayInfo};

/// Comma-separated device names, as accepted by `BUGREEL_TEST_DEVICES`.
pub(crate) fn parse_device_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub(crate) fn list_input_devices() -> Result<()> {
    // Support BUGREEL_TEST_DEVICES for testing
    let devices = if let Ok(raw) = std::env::var("BUGREEL_TEST_DEVICES") {
        parse_device_list(&raw)
    } else {
        AudioSource::list_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}

pub(crate) fn describe_display(display: &DisplayInfo) -> String {
    format!(
        "{} {}x{} at ({}, {}){}",
        display.name,
        display.width,
        display.height,
        display.x,
        display.y,
        if display.is_primary { " [primary]" } else { "" }
    )
}

pub(crate) fn list_displays() -> Result<()> {
    let displays = capture::list_displays().unwrap_or_else(|err| {
        eprintln!("Failed to list displays: {err:#}");
        Vec::new()
    });
    if displays.is_empty() {
        println!("No displays detected.");
    } else {
        println!("Available displays:");
        for display in &displays {
            println!("  - {}", describe_display(display));
        }
    }
    Ok(())
}
