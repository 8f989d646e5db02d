use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ANSI_ESCAPE_RE: Regex = Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap();
}

/// Removes terminal color/control sequences that yt-dlp embeds in its
/// preformatted strings (`_percent_str`, `_speed_str`, ...).
pub fn strip_ansi(input: &str) -> String {
    ANSI_ESCAPE_RE.replace_all(input, "").into_owned()
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
