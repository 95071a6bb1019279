//! SGR (Select Graphic Rendition) decoding
//!
//! Only foreground colors are understood: `0` (or an empty parameter)
//! resets, `30`-`37` and `90`-`97` pick a color. Every other parameter is
//! ignored, and non-SGR control sequences are stripped from the text.

use serde::{Deserialize, Serialize};

const ESC: char = '\x1b';

/// A foreground color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

const NORMAL: [Color; 8] = [
    Color::Black,
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::White,
];

const BRIGHT: [Color; 8] = [
    Color::BrightBlack,
    Color::BrightRed,
    Color::BrightGreen,
    Color::BrightYellow,
    Color::BrightBlue,
    Color::BrightMagenta,
    Color::BrightCyan,
    Color::BrightWhite,
];

impl Color {
    /// Map an SGR foreground code to a color
    pub fn from_sgr(code: u32) -> Option<Color> {
        match code {
            30..=37 => Some(NORMAL[(code - 30) as usize]),
            90..=97 => Some(BRIGHT[(code - 90) as usize]),
            _ => None,
        }
    }

    /// The SGR foreground code for this color
    pub fn sgr(self) -> u32 {
        if let Some(i) = NORMAL.iter().position(|c| *c == self) {
            30 + i as u32
        } else {
            let i = BRIGHT.iter().position(|c| *c == self).unwrap_or(7);
            90 + i as u32
        }
    }

    /// Look up a color by name (`red`, `bright_blue`, `gray`, ...)
    pub fn from_name(name: &str) -> Option<Color> {
        let name = name.to_ascii_lowercase().replace('-', "_");
        let color = match name.as_str() {
            "black" => Color::Black,
            "red" => Color::Red,
            "green" => Color::Green,
            "yellow" => Color::Yellow,
            "blue" => Color::Blue,
            "magenta" => Color::Magenta,
            "cyan" => Color::Cyan,
            "white" => Color::White,
            "gray" | "grey" | "bright_black" => Color::BrightBlack,
            "bright_red" => Color::BrightRed,
            "bright_green" => Color::BrightGreen,
            "bright_yellow" => Color::BrightYellow,
            "bright_blue" => Color::BrightBlue,
            "bright_magenta" => Color::BrightMagenta,
            "bright_cyan" => Color::BrightCyan,
            "bright_white" => Color::BrightWhite,
            _ => return None,
        };
        Some(color)
    }
}

/// A run of text in one color
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub color: Color,
}

impl Segment {
    pub fn new(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

/// Decoder state carried between writes
///
/// `color` is `None` while unset, meaning the caller's default applies.
/// `pending` holds an escape sequence cut off at the end of a partial line.
#[derive(Debug, Clone, Default)]
pub struct AnsiState {
    color: Option<Color>,
    pending: String,
}

impl AnsiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The color currently in effect, if one has been set
    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn reset(&mut self) {
        self.color = None;
        self.pending.clear();
    }

    /// Decode one line fragment into colored segments.
    ///
    /// `partial` says the fragment does not end its line, so a sequence
    /// truncated at the end is kept for the next call instead of dropped.
    pub fn decode(&mut self, fragment: &str, default: Color, partial: bool) -> Vec<Segment> {
        let input = if self.pending.is_empty() {
            fragment.to_string()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.push_str(fragment);
            joined
        };

        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = input.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            if c != ESC {
                text.push(c);
                continue;
            }

            match chars.peek() {
                Some(&(_, '[')) => {
                    chars.next();
                }
                Some(_) => continue, // lone ESC
                None => {
                    if partial {
                        self.pending = input[start..].to_string();
                    }
                    break;
                }
            }

            let mut params = String::new();
            let mut terminator = None;
            for (_, p) in chars.by_ref() {
                if ('\x40'..='\x7e').contains(&p) {
                    terminator = Some(p);
                    break;
                }
                params.push(p);
            }

            match terminator {
                Some('m') => {
                    self.flush(&mut text, default, &mut segments);
                    self.apply(&params);
                }
                Some(_) => {}
                None => {
                    if partial {
                        self.pending = input[start..].to_string();
                    }
                    break;
                }
            }
        }

        self.flush(&mut text, default, &mut segments);
        segments
    }

    fn flush(&self, text: &mut String, default: Color, segments: &mut Vec<Segment>) {
        if !text.is_empty() {
            segments.push(Segment::new(std::mem::take(text), self.color.unwrap_or(default)));
        }
    }

    fn apply(&mut self, params: &str) {
        let mut params = params.split(';');
        while let Some(param) = params.next() {
            if param.is_empty() {
                self.color = None;
                continue;
            }
            match param.parse::<u32>() {
                Ok(0) => self.color = None,
                // Extended colors carry their own arguments: 5;n or 2;r;g;b
                Ok(38 | 48 | 58) => {
                    let skip = match params.next() {
                        Some("5") => 1,
                        Some("2") => 3,
                        _ => 0,
                    };
                    params.by_ref().take(skip).for_each(drop);
                }
                Ok(code) => {
                    if let Some(color) = Color::from_sgr(code) {
                        self.color = Some(color);
                    }
                }
                Err(_) => {}
            }
        }
    }
}
