//! Panel geometry and mounting rotation.

/// Physical panel width in pixels.
pub const WIDTH: usize = 1024;
/// Physical panel height in pixels.
pub const HEIGHT: usize = 758;
/// Number of bytes in one physical line (two pixels per byte).
pub const LINE_BYTES: usize = WIDTH / 2;
/// Total framebuffer size in bytes.
pub const BUFFER_SIZE: usize = LINE_BYTES * HEIGHT;
/// Byte value of two white pixels.
pub const WHITE_BYTE: u8 = 0xFF;
/// Temperature passed to the waveform lookup when no sensor reading exists.
pub const DEFAULT_TEMPERATURE_C: i32 = 25;

/// Orientation in which the panel is mounted.
///
/// Logical coordinates are what image and text code draws in. They are
/// remapped onto the physical scan order the waveform driver reads.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Rotation {
    #[default]
    Landscape,
    Portrait,
    InvertedLandscape,
    InvertedPortrait,
}

impl Rotation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::InvertedLandscape => "inverted-landscape",
            Self::InvertedPortrait => "inverted-portrait",
        }
    }

    /// Logical `(width, height)` seen by drawing code.
    pub const fn logical_size(self) -> (usize, usize) {
        match self {
            Self::Landscape | Self::InvertedLandscape => (WIDTH, HEIGHT),
            Self::Portrait | Self::InvertedPortrait => (HEIGHT, WIDTH),
        }
    }

    /// Maps a logical coordinate to the physical one.
    ///
    /// Returns `None` when the logical coordinate falls outside the panel.
    pub const fn to_physical(self, x: usize, y: usize) -> Option<(usize, usize)> {
        let (width, height) = self.logical_size();
        if x >= width || y >= height {
            return None;
        }

        Some(match self {
            Self::Landscape => (x, y),
            Self::Portrait => (WIDTH - 1 - y, x),
            Self::InvertedLandscape => (WIDTH - 1 - x, HEIGHT - 1 - y),
            Self::InvertedPortrait => (y, HEIGHT - 1 - x),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_is_identity() {
        assert_eq!(Rotation::Landscape.to_physical(3, 7), Some((3, 7)));
        assert_eq!(Rotation::Landscape.to_physical(WIDTH, 0), None);
    }

    #[test]
    fn portrait_swaps_axes_and_stays_in_bounds() {
        let rotation = Rotation::Portrait;
        assert_eq!(rotation.logical_size(), (HEIGHT, WIDTH));
        assert_eq!(rotation.to_physical(0, 0), Some((WIDTH - 1, 0)));
        assert_eq!(
            rotation.to_physical(HEIGHT - 1, WIDTH - 1),
            Some((0, HEIGHT - 1))
        );
        assert_eq!(rotation.to_physical(HEIGHT, 0), None);
    }

    #[test]
    fn inverted_rotations_mirror_corners() {
        assert_eq!(
            Rotation::InvertedLandscape.to_physical(0, 0),
            Some((WIDTH - 1, HEIGHT - 1))
        );
        assert_eq!(
            Rotation::InvertedPortrait.to_physical(0, 0),
            Some((0, HEIGHT - 1))
        );
    }
}
