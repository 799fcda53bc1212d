//! An ARGB colour value that can live in a cell.

use crate::error::ConversionError;
use crate::variant::VariantConverter;
use std::fmt;

/// An 8-bit-per-channel colour with alpha.
///
/// Stored as eight lowercase hex digits in `aarrggbb` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Colour {
    pub alpha: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Colour {
    pub const TRANSPARENT: Colour = Colour::from_argb(0, 0, 0, 0);
    pub const BLACK: Colour = Colour::from_rgb(0, 0, 0);
    pub const WHITE: Colour = Colour::from_rgb(0xff, 0xff, 0xff);
    pub const RED: Colour = Colour::from_rgb(0xff, 0, 0);

    /// An opaque colour.
    pub const fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::from_argb(0xff, red, green, blue)
    }

    pub const fn from_argb(alpha: u8, red: u8, green: u8, blue: u8) -> Self {
        Self {
            alpha,
            red,
            green,
            blue,
        }
    }

    pub const fn to_argb_u32(self) -> u32 {
        u32::from_be_bytes([self.alpha, self.red, self.green, self.blue])
    }

    /// Packed as `0xrrggbbaa`, the layout `gpui::rgba` expects.
    pub const fn to_rgba_u32(self) -> u32 {
        u32::from_be_bytes([self.red, self.green, self.blue, self.alpha])
    }

    pub const fn with_alpha(self, alpha: u8) -> Self {
        Self { alpha, ..self }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.to_argb_u32())
    }
}

impl VariantConverter for Colour {
    fn to_variant(&self) -> String {
        self.to_string()
    }

    /// Accepts `aarrggbb` or opaque `rrggbb`, optionally prefixed by `#` or `0x`.
    fn from_variant(text: &str) -> Result<Self, ConversionError> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .unwrap_or(trimmed);

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConversionError::new::<Colour>(text, "not a hex colour"));
        }

        let packed = u32::from_str_radix(digits, 16)
            .map_err(|err| ConversionError::new::<Colour>(text, err))?;
        match digits.len() {
            8 => {
                let [alpha, red, green, blue] = packed.to_be_bytes();
                Ok(Colour::from_argb(alpha, red, green, blue))
            }
            6 => {
                let [_, red, green, blue] = packed.to_be_bytes();
                Ok(Colour::from_rgb(red, green, blue))
            }
            n => Err(ConversionError::new::<Colour>(
                text,
                format!("expected 6 or 8 hex digits, found {n}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colour_text() {
        assert_eq!(Colour::RED.to_variant(), "ffff0000");
        assert_eq!(Colour::from_argb(0x80, 1, 2, 3).to_variant(), "80010203");
    }

    #[test]
    fn test_colour_parse_forms() {
        assert_eq!(Colour::from_variant("ffff0000"), Ok(Colour::RED));
        assert_eq!(Colour::from_variant("#00ff00"), Ok(Colour::from_rgb(0, 0xff, 0)));
        assert_eq!(Colour::from_variant("0xFF0000FF"), Ok(Colour::from_rgb(0, 0, 0xff)));
    }

    #[test]
    fn test_colour_parse_rejects_garbage() {
        assert!(Colour::from_variant("red").is_err());
        assert!(Colour::from_variant("fff").is_err());
        assert!(Colour::from_variant("+fffffff").is_err());
    }

    #[test]
    fn test_rgba_packing() {
        let colour = Colour::from_argb(0x40, 0x11, 0x22, 0x33);
        assert_eq!(colour.to_rgba_u32(), 0x1122_3340);
        assert_eq!(colour.to_argb_u32(), 0x4011_2233);
    }
}
