/// RGBA color in linear space with values in [0, 1]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    pub const fn transparent() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Opaque color from a `0xRRGGBB` literal, converted to linear space.
    pub const fn from_hex(hex: u32) -> Self {
        Self::from_srgba(
            ((hex >> 16) & 0xFF) as u8,
            ((hex >> 8) & 0xFF) as u8,
            (hex & 0xFF) as u8,
            255,
        )
    }

    /// Convert sRGB color (0-255) to linear space
    #[inline]
    pub const fn from_srgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        const fn srgb_to_linear(c: u8) -> f32 {
            let x = c as f32 / 255.0;
            if x <= 0.04045 {
                x / 12.92
            } else {
                // Polynomial approximation of ((x + 0.055) / 1.055)^2.4
                let t = (x + 0.055) / 1.055;
                t * t * (0.5870 * t + 0.4130)
            }
        }

        Self::new(
            srgb_to_linear(r),
            srgb_to_linear(g),
            srgb_to_linear(b),
            a as f32 / 255.0,
        )
    }

    /// with alpha builder method taking f32
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.a = alpha;
        self
    }

    #[inline]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<Color> for [f32; 4] {
    fn from(color: Color) -> Self {
        color.to_array()
    }
}

/// Catppuccin Mocha palette, used by the demo and the atlas debug overlay.
pub mod mocha {
    use super::Color;

    pub const RED: Color = Color::from_srgba(243, 139, 168, 255);
    pub const PEACH: Color = Color::from_srgba(250, 179, 135, 255);
    pub const YELLOW: Color = Color::from_srgba(249, 226, 175, 255);
    pub const GREEN: Color = Color::from_srgba(166, 227, 161, 255);
    pub const TEAL: Color = Color::from_srgba(148, 226, 213, 255);
    pub const BLUE: Color = Color::from_srgba(137, 180, 250, 255);
    pub const LAVENDER: Color = Color::from_srgba(180, 190, 254, 255);
    pub const MAUVE: Color = Color::from_srgba(203, 166, 247, 255);
    pub const TEXT: Color = Color::from_srgba(205, 214, 244, 255);
    pub const OVERLAY0: Color = Color::from_srgba(108, 112, 134, 255);
    pub const SURFACE0: Color = Color::from_srgba(49, 50, 68, 255);
    pub const BASE: Color = Color::from_srgba(30, 30, 46, 255);
    pub const CRUST: Color = Color::from_srgba(17, 17, 27, 255);
}
