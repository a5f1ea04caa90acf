//! Style names (`"bright blue"`, `"bold red on white"`) to owo-colors styles.

use std::iter::Peekable;
use std::str::SplitWhitespace;

use owo_colors::{AnsiColors, Style};

use super::RuleError;

/// Parse a space separated list of colors and effects.
///
/// Underscores count as spaces, so `bright_blue` works too. A color word
/// sets the foreground; `on <color>` sets the background.
pub fn parse_style(input: &str) -> Result<Style, RuleError> {
    let unknown = || RuleError::Style(input.to_string());

    let normalized = input.replace('_', " ");
    let mut words = normalized.split_whitespace().peekable();
    if words.peek().is_none() {
        return Err(unknown());
    }

    let mut style = Style::new();
    while let Some(word) = words.next() {
        style = match word {
            "on" => {
                let first = words.next().ok_or_else(unknown)?;
                style.on_color(color(first, &mut words).ok_or_else(unknown)?)
            }
            "bold" => style.bold(),
            "dim" | "dimmed" => style.dimmed(),
            "italic" => style.italic(),
            "underline" | "underlined" => style.underline(),
            "blink" => style.blink(),
            "reverse" | "reversed" => style.reversed(),
            "hidden" => style.hidden(),
            "strikethrough" => style.strikethrough(),
            other => style.color(color(other, &mut words).ok_or_else(unknown)?),
        };
    }
    Ok(style)
}

/// Resolve a color starting at `first`, consuming the base name after
/// `bright`.
fn color(first: &str, rest: &mut Peekable<SplitWhitespace<'_>>) -> Option<AnsiColors> {
    if first == "bright" {
        let base = rest.next()?;
        return bright(base_color(base)?);
    }
    base_color(first)
}

fn base_color(name: &str) -> Option<AnsiColors> {
    let color = match name {
        "black" => AnsiColors::Black,
        "red" => AnsiColors::Red,
        "green" => AnsiColors::Green,
        "yellow" => AnsiColors::Yellow,
        "blue" => AnsiColors::Blue,
        "magenta" | "purple" | "pink" => AnsiColors::Magenta,
        "cyan" => AnsiColors::Cyan,
        "white" => AnsiColors::White,
        _ => return None,
    };
    Some(color)
}

fn bright(color: AnsiColors) -> Option<AnsiColors> {
    let bright = match color {
        AnsiColors::Black => AnsiColors::BrightBlack,
        AnsiColors::Red => AnsiColors::BrightRed,
        AnsiColors::Green => AnsiColors::BrightGreen,
        AnsiColors::Yellow => AnsiColors::BrightYellow,
        AnsiColors::Blue => AnsiColors::BrightBlue,
        AnsiColors::Magenta => AnsiColors::BrightMagenta,
        AnsiColors::Cyan => AnsiColors::BrightCyan,
        AnsiColors::White => AnsiColors::BrightWhite,
        _ => return None,
    };
    Some(bright)
}
