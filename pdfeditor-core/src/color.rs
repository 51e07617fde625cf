use std::fmt;
use std::str::FromStr;

use crate::error::EditorError;

/// 8-bit RGBA color used for annotation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);
    pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    /// Channels scaled to `0.0..=1.0`, as PDF color operators expect them.
    pub fn rgb_fractions(&self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }

    pub fn alpha_fraction(&self) -> f32 {
        f32::from(self.a) / 255.0
    }

    fn named(name: &str) -> Option<Self> {
        let color = match name {
            "black" => Rgba::BLACK,
            "white" => Rgba::WHITE,
            "red" => Rgba::opaque(255, 0, 0),
            "green" => Rgba::opaque(0, 128, 0),
            "blue" => Rgba::opaque(0, 0, 255),
            "gray" | "grey" => Rgba::opaque(128, 128, 128),
            "yellow" => Rgba::opaque(255, 255, 0),
            "cyan" => Rgba::opaque(0, 255, 255),
            "magenta" => Rgba::opaque(255, 0, 255),
            _ => return None,
        };
        Some(color)
    }

    fn from_hex(digits: &str) -> Option<Self> {
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
        match digits.len() {
            3 => {
                let expand = |idx: usize| channel(idx..idx + 1).map(|v| v * 17);
                Some(Rgba::opaque(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Some(Rgba::opaque(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
            8 => Some(Rgba::new(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => None,
        }
    }

    fn from_components(input: &str) -> Option<Self> {
        let parts = input
            .split(',')
            .map(|part| part.trim().parse::<u8>().ok())
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [r, g, b] => Some(Rgba::opaque(*r, *g, *b)),
            [r, g, b, a] => Some(Rgba::new(*r, *g, *b, *a)),
            _ => None,
        }
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::BLACK
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if !self.is_opaque() {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

impl FromStr for Rgba {
    type Err = EditorError;

    /// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa`, `r,g,b`, `r,g,b,a` or a color name.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let parsed = if let Some(digits) = lowered.strip_prefix('#') {
            Rgba::from_hex(digits)
        } else if lowered.contains(',') {
            Rgba::from_components(&lowered)
        } else {
            Rgba::named(&lowered)
        };
        parsed.ok_or_else(|| EditorError::invalid(format!("unrecognized color {trimmed:?}")))
    }
}
