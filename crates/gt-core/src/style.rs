//! Terminal styling helpers with NO_COLOR support.

/// Check if color output is enabled (respects `NO_COLOR` env var).
pub fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

/// ANSI tones used by the chat output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Dim,
    Bold,
    Red,
    Yellow,
    Green,
    BoldCyan,
}

impl Tone {
    fn code(self) -> &'static str {
        match self {
            Tone::Dim => "\x1b[2m",
            Tone::Bold => "\x1b[1m",
            Tone::Red => "\x1b[31m",
            Tone::Yellow => "\x1b[33m",
            Tone::Green => "\x1b[32m",
            Tone::BoldCyan => "\x1b[1;36m",
        }
    }
}

/// Terminal style helper that respects NO_COLOR.
#[derive(Debug, Clone, Copy)]
pub struct Style {
    enabled: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self::new()
    }
}

impl Style {
    pub fn new() -> Self {
        Self {
            enabled: color_enabled(),
        }
    }

    /// Create a style with colors explicitly enabled (for tests).
    pub fn force_enabled() -> Self {
        Self { enabled: true }
    }

    /// Create a style with colors explicitly disabled.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn start(&self, tone: Tone) -> &'static str {
        if self.enabled {
            tone.code()
        } else {
            ""
        }
    }

    pub fn reset(&self) -> &'static str {
        if self.enabled {
            "\x1b[0m"
        } else {
            ""
        }
    }

    /// Wrap `text` in `tone` and a reset.
    pub fn paint(&self, tone: Tone, text: &str) -> String {
        format!("{}{text}{}", self.start(tone), self.reset())
    }
}

/// Compute visible width of a string, ignoring ANSI escape sequences.
pub fn visible_width(s: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    for c in s.chars() {
        if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else if c == '\x1b' {
            in_escape = true;
        } else {
            width += char_width(c);
        }
    }
    width
}

/// Number of terminal rows a single line occupies at `columns` width.
pub fn wrapped_rows(line: &str, columns: u16) -> usize {
    let columns = usize::from(columns.max(1));
    visible_width(line).div_ceil(columns).max(1)
}

/// Approximate display width of a character: CJK and fullwidth forms take two cells.
fn char_width(c: char) -> usize {
    if c < ' ' {
        return 0;
    }
    if c.is_ascii() {
        return 1;
    }
    let cp = c as u32;
    let wide = (0x1100..=0x115F).contains(&cp)
        || (0x2E80..=0x303E).contains(&cp)
        || (0x3040..=0x33BF).contains(&cp)
        || (0x3400..=0x4DBF).contains(&cp)
        || (0x4E00..=0x9FFF).contains(&cp)
        || (0xAC00..=0xD7A3).contains(&cp)
        || (0xF900..=0xFAFF).contains(&cp)
        || (0xFE30..=0xFE6F).contains(&cp)
        || (0xFF01..=0xFF60).contains(&cp)
        || (0x1F300..=0x1F64F).contains(&cp)
        || (0x20000..=0x2FFFF).contains(&cp);
    if wide {
        2
    } else {
        1
    }
}

/// Format a token count for display: `340` for small, `1.2k` for 1000+.
pub fn format_tokens(n: usize) -> String {
    if n >= 1000 {
        let k = n as f64 / 1000.0;
        format!("{k:.1}k")
    } else {
        n.to_string()
    }
}
