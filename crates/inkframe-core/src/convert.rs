//! Pixel conversions between decoder output and panel intensities.

/// 4x4 ordered dither thresholds, in sixteenths.
const BAYER_4X4: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

/// Maps a 4-bit grey value to the 8-bit panel intensity.
#[inline]
pub const fn gray4_intensity(nibble: u8) -> u8 {
    (nibble & 0x0F) * 16
}

/// Splits RGB565 into 8-bit channels.
#[inline]
pub const fn rgb565_to_rgb888(pixel: u16) -> (u8, u8, u8) {
    let r = ((pixel >> 11) << 3) as u8;
    let g = (((pixel >> 5) & 0x3F) << 2) as u8;
    let b = ((pixel & 0x1F) << 3) as u8;
    (r, g, b)
}

#[inline]
pub const fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Perceptual luma of an RGB888 pixel.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u16 * 30 + g as u16 * 59 + b as u16 * 11) / 100) as u8
}

/// Quantises an 8-bit level to 4 bits with ordered dithering at `(x, y)`.
pub fn dither_gray4(level: u8, x: usize, y: usize) -> u8 {
    let scaled = level as u16 * 15;
    let base = (scaled / 255) as u8;
    let remainder = scaled % 255;
    let threshold = BAYER_4X4[y & 3][x & 3] as u16 * 255 / 16;

    if base < 15 && remainder > threshold {
        base + 1
    } else {
        base
    }
}

/// Writes one 4-bit value into a packed band at `(col, row)`.
pub fn put_gray4(words: &mut [u16], stride: usize, col: usize, row: usize, nibble: u8) {
    let Some(word) = words.get_mut(row * stride + col / 4) else {
        return;
    };
    let shift = (col % 4) * 4;
    *word = (*word & !(0x0F << shift)) | (((nibble & 0x0F) as u16) << shift);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_extremes_map_to_intensity() {
        assert_eq!(gray4_intensity(0xF), 240);
        assert_eq!(gray4_intensity(0x0), 0);
        assert_eq!(gray4_intensity(0x8), 128);
    }

    #[test]
    fn pure_red_splits_to_top_of_red_channel() {
        assert_eq!(rgb565_to_rgb888(0xF800), (248, 0, 0));
        assert_eq!(rgb565_to_rgb888(0x07E0), (0, 252, 0));
        assert_eq!(rgb565_to_rgb888(0x001F), (0, 0, 248));
    }

    #[test]
    fn rgb888_packs_to_rgb565() {
        assert_eq!(rgb888_to_rgb565(255, 0, 0), 0xF800);
        assert_eq!(rgb888_to_rgb565(255, 255, 255), 0xFFFF);
    }

    #[test]
    fn dither_keeps_black_and_white_exact() {
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(dither_gray4(0, x, y), 0);
                assert_eq!(dither_gray4(255, x, y), 15);
            }
        }
    }

    #[test]
    fn dither_mid_level_mixes_neighbouring_values() {
        let mut rounded_up = 0;
        for y in 0..4 {
            for x in 0..4 {
                let value = dither_gray4(128, x, y);
                assert!(value == 7 || value == 8);
                if value == 8 {
                    rounded_up += 1;
                }
            }
        }

        // 128 * 15 = 7 * 255 + 135, thresholds below 135 cover 9 cells.
        assert_eq!(rounded_up, 9);
    }

    #[test]
    fn put_gray4_replaces_only_target_nibble() {
        let mut words = [0xFFFFu16; 2];

        put_gray4(&mut words, 2, 1, 0, 0x3);
        put_gray4(&mut words, 2, 4, 0, 0x0);

        assert_eq!(words, [0xFF3F, 0xFFF0]);
    }
}
