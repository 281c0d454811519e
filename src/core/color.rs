// src/core/color.rs

use crate::models::AnsiColor;
use anyhow::{Result, anyhow};
use colored::{Color, Colorize};

/// Parses a color name string (e.g., "red", "teal") into an `AnsiColor` enum.
pub fn parse_color_name(name: &str) -> Result<AnsiColor> {
    match name.trim().to_lowercase().as_str() {
        "black" => Ok(AnsiColor::Black),
        "red" => Ok(AnsiColor::Red),
        "green" => Ok(AnsiColor::Green),
        "yellow" => Ok(AnsiColor::Yellow),
        "purple" | "blue" => Ok(AnsiColor::Purple),
        "magenta" => Ok(AnsiColor::Magenta),
        "teal" | "cyan" => Ok(AnsiColor::Teal),
        "white" => Ok(AnsiColor::White),
        "darkgrey" | "darkgray" | "dark_grey" | "dark_gray" => Ok(AnsiColor::DarkGrey),
        _ => Err(anyhow!("Unknown color name: '{}'", name)),
    }
}

/// Converts an `AnsiColor` into the `colored` color it is rendered with.
pub fn to_terminal_color(color: AnsiColor) -> Color {
    match color {
        AnsiColor::Black => Color::Black,
        AnsiColor::Red => Color::Red,
        AnsiColor::Green => Color::Green,
        AnsiColor::Yellow => Color::Yellow,
        AnsiColor::Purple => Color::Blue,
        AnsiColor::Magenta => Color::Magenta,
        AnsiColor::Teal => Color::Cyan,
        AnsiColor::White => Color::White,
        AnsiColor::DarkGrey => Color::BrightBlack,
    }
}

/// Paints `text` with `color` when coloring is enabled. With coloring disabled, or no
/// color given, the text is returned untouched.
///
/// Label colors are bold; dark grey (used for separators and timestamps) is not.
/// Enabled coloring emits escapes even when stdout is not a terminal.
pub fn paint(text: &str, color: Option<AnsiColor>, enabled: bool) -> String {
    match color {
        Some(c) if enabled => {
            force_terminal_colors(true);
            let colored = text.color(to_terminal_color(c));
            if c == AnsiColor::DarkGrey {
                colored.to_string()
            } else {
                colored.bold().to_string()
            }
        }
        _ => text.to_string(),
    }
}

/// Makes `colored` emit escapes regardless of whether stdout is a terminal, so the
/// explicit enablement flag is the only thing deciding.
pub(crate) fn force_terminal_colors(enabled: bool) {
    if enabled {
        colored::control::set_override(true);
    }
}
