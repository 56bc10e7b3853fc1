//! In-memory framebuffer for ED060XC3.

use alloc::{boxed::Box, vec::Vec};

use crate::panel::{BUFFER_SIZE, HEIGHT, LINE_BYTES, Rotation, WHITE_BYTE, WIDTH};

/// The framebuffer could not be placed on the heap.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AllocError;

/// 4bpp framebuffer in physical scan order.
///
/// Nibble mapping within one byte: even `x` sits in the low nibble, odd `x`
/// in the high nibble. A nibble holds the top four bits of the 8-bit
/// intensity, `0` is black and `15` is white.
pub struct FrameBuffer {
    bytes: Box<[u8]>,
    rotation: Rotation,
}

impl FrameBuffer {
    /// Allocates a white framebuffer.
    ///
    /// At 388 KiB the buffer normally lands in PSRAM, so the request goes
    /// through `try_reserve_exact` instead of aborting on failure.
    pub fn try_new(rotation: Rotation) -> Result<Self, AllocError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(BUFFER_SIZE)
            .map_err(|_| AllocError)?;
        bytes.resize(BUFFER_SIZE, WHITE_BYTE);

        Ok(Self {
            bytes: bytes.into_boxed_slice(),
            rotation,
        })
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Logical `(width, height)` for the mounting rotation.
    pub fn logical_size(&self) -> (usize, usize) {
        self.rotation.logical_size()
    }

    /// Returns the packed bytes in physical order.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Fills every pixel with one 8-bit intensity.
    pub fn clear(&mut self, intensity: u8) {
        let nibble = intensity >> 4;
        self.bytes.fill(nibble | (nibble << 4));
    }

    /// Sets a pixel in logical coordinates.
    ///
    /// Returns `true` when the pixel is in bounds, `false` otherwise.
    pub fn set_pixel(&mut self, x: usize, y: usize, intensity: u8) -> bool {
        match self.rotation.to_physical(x, y) {
            Some((px, py)) => {
                self.write_physical(px, py, intensity >> 4);
                true
            }
            None => false,
        }
    }

    /// Reads a pixel in logical coordinates as an 8-bit intensity.
    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        let (px, py) = self.rotation.to_physical(x, y)?;
        let byte = self.bytes[py * LINE_BYTES + px / 2];
        let nibble = if px % 2 == 0 { byte & 0x0F } else { byte >> 4 };
        Some(nibble << 4)
    }

    /// Sets a colour pixel in logical coordinates.
    ///
    /// DES colour panels sit behind a diagonal stripe filter, so each
    /// physical cell only shows one channel. The cell keeps the intensity of
    /// the channel its filter passes.
    pub fn set_color_pixel(&mut self, x: usize, y: usize, r: u8, g: u8, b: u8) -> bool {
        let Some((px, py)) = self.rotation.to_physical(x, y) else {
            return false;
        };

        let intensity = match (px + py) % 3 {
            0 => r,
            1 => g,
            _ => b,
        };
        self.write_physical(px, py, intensity >> 4);
        true
    }

    /// Copies packed 4bpp bytes into one physical line, ignoring rotation.
    ///
    /// `x` must be even so bytes line up with pixel pairs. Returns the number
    /// of bytes written after clipping.
    pub fn copy_packed_row(&mut self, x: usize, y: usize, packed: &[u8]) -> usize {
        if y >= HEIGHT || x >= WIDTH || x % 2 != 0 {
            return 0;
        }

        let start = y * LINE_BYTES + x / 2;
        let room = LINE_BYTES - x / 2;
        let count = packed.len().min(room);
        self.bytes[start..start + count].copy_from_slice(&packed[..count]);
        count
    }

    fn write_physical(&mut self, px: usize, py: usize, nibble: u8) {
        let byte = &mut self.bytes[py * LINE_BYTES + px / 2];
        if px % 2 == 0 {
            *byte = (*byte & 0xF0) | nibble;
        } else {
            *byte = (*byte & 0x0F) | (nibble << 4);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_white() {
        let fb = FrameBuffer::try_new(Rotation::Landscape).unwrap();

        assert_eq!(fb.bytes().len(), BUFFER_SIZE);
        assert!(fb.bytes().iter().all(|&byte| byte == WHITE_BYTE));
    }

    #[test]
    fn even_pixels_use_low_nibble() {
        let mut fb = FrameBuffer::try_new(Rotation::Landscape).unwrap();
        fb.clear(0);

        assert!(fb.set_pixel(0, 0, 0xA0));
        assert!(fb.set_pixel(1, 0, 0x30));

        assert_eq!(fb.bytes()[0], 0x3A);
        assert_eq!(fb.pixel(0, 0), Some(0xA0));
        assert_eq!(fb.pixel(1, 0), Some(0x30));
    }

    #[test]
    fn rotated_pixel_lands_on_physical_position() {
        let mut fb = FrameBuffer::try_new(Rotation::Portrait).unwrap();
        fb.clear(0xFF);

        assert!(fb.set_pixel(0, 0, 0));
        // Logical origin sits at the last physical column of line 0.
        assert_eq!(fb.bytes()[LINE_BYTES - 1], 0x0F);
        assert!(!fb.set_pixel(HEIGHT, 0, 0));
    }

    #[test]
    fn color_pixel_keeps_filtered_channel() {
        let mut fb = FrameBuffer::try_new(Rotation::Landscape).unwrap();

        assert!(fb.set_color_pixel(0, 0, 0xF0, 0x00, 0x00));
        assert!(fb.set_color_pixel(1, 0, 0xF0, 0x00, 0x00));
        assert!(fb.set_color_pixel(2, 0, 0x00, 0x00, 0x70));

        assert_eq!(fb.pixel(0, 0), Some(0xF0));
        assert_eq!(fb.pixel(1, 0), Some(0x00));
        assert_eq!(fb.pixel(2, 0), Some(0x70));
    }

    #[test]
    fn packed_row_copy_clips_at_line_end() {
        let mut fb = FrameBuffer::try_new(Rotation::InvertedLandscape).unwrap();
        let row = [0x12u8; 8];

        assert_eq!(fb.copy_packed_row(WIDTH - 4, 0, &row), 2);
        assert_eq!(fb.bytes()[LINE_BYTES - 1], 0x12);
        assert_eq!(fb.bytes()[LINE_BYTES], WHITE_BYTE);
        assert_eq!(fb.copy_packed_row(1, 0, &row), 0);
    }
}
