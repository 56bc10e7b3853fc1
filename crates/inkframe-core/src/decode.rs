//! Seam between the render pipeline and an image decoding capability.

use crate::frame::DitherScratch;

/// Tallest row band a decoder may deliver in one callback.
pub const BAND_MAX_ROWS: usize = 16;

/// Packed pixel layout of a delivered band.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BandFormat {
    /// Four dithered 4-bit grey pixels per word, first pixel in the low nibble.
    Gray4Dithered,
    /// One RGB565 pixel per word.
    Rgb565,
}

impl BandFormat {
    /// Format selected by the `des-color` build feature.
    pub const fn configured() -> Self {
        if cfg!(feature = "des-color") {
            Self::Rgb565
        } else {
            Self::Gray4Dithered
        }
    }

    /// Words needed for one row of `width` pixels.
    pub const fn row_words(self, width: usize) -> usize {
        match self {
            Self::Gray4Dithered => width.div_ceil(4),
            Self::Rgb565 => width,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gray4Dithered => "gray4",
            Self::Rgb565 => "rgb565",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ImageDimensions {
    pub width: u16,
    pub height: u16,
}

/// One strip of decoded pixels in image space.
///
/// Borrowed from the dither scratch, so it only lives for one callback.
#[derive(Clone, Copy, Debug)]
pub struct RowBand<'a> {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    /// Words per band row.
    pub stride: usize,
    pub format: BandFormat,
    pub pixels: &'a [u16],
}

impl RowBand<'_> {
    /// 4-bit grey value at a band-relative position.
    pub fn gray4(&self, col: usize, row: usize) -> Option<u8> {
        if self.format != BandFormat::Gray4Dithered || !self.contains(col, row) {
            return None;
        }
        let word = *self.pixels.get(row * self.stride + col / 4)?;
        Some(((word >> ((col % 4) * 4)) & 0x0F) as u8)
    }

    /// RGB565 value at a band-relative position.
    pub fn rgb565(&self, col: usize, row: usize) -> Option<u16> {
        if self.format != BandFormat::Rgb565 || !self.contains(col, row) {
            return None;
        }
        self.pixels.get(row * self.stride + col).copied()
    }

    /// Packed words of one band row.
    pub fn row_words(&self, row: usize) -> Option<&[u16]> {
        if row >= self.height as usize {
            return None;
        }
        let start = row * self.stride;
        let words = self.format.row_words(self.width as usize);
        self.pixels.get(start..start + words)
    }

    fn contains(&self, col: usize, row: usize) -> bool {
        col < self.width as usize && row < self.height as usize
    }
}

/// Receives decoded bands. Returning `false` aborts the decode.
pub trait RowSink {
    fn consume(&mut self, band: &RowBand<'_>) -> bool;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// Progressive, arithmetic-coded or otherwise unsupported stream.
    UnsupportedFormat,
    Malformed,
    /// The sink asked to stop.
    Interrupted,
    /// Decoder work memory or the dither scratch is too small for the image.
    Workspace,
    /// Another decode is using the decoder.
    Busy,
}

impl DecodeError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "unsupported_format",
            Self::Malformed => "malformed",
            Self::Interrupted => "interrupted",
            Self::Workspace => "workspace",
            Self::Busy => "decoder_busy",
        }
    }
}

/// Decodes a complete in-memory image, one band at a time.
///
/// The source is passed to the decoding capability untouched. Rejecting
/// unsupported streams is the decoder's job. Whatever happens, the decoder
/// state is released before `decode` returns.
pub trait ImageDecoder {
    fn decode(
        &mut self,
        source: &[u8],
        scratch: &mut DitherScratch,
        format: BandFormat,
        sink: &mut dyn RowSink,
    ) -> Result<ImageDimensions, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray4_reads_low_nibble_first() {
        let pixels = [0x4321u16, 0x0008];
        let band = RowBand {
            x: 0,
            y: 0,
            width: 5,
            height: 1,
            stride: 2,
            format: BandFormat::Gray4Dithered,
            pixels: &pixels,
        };

        assert_eq!(band.gray4(0, 0), Some(1));
        assert_eq!(band.gray4(3, 0), Some(4));
        assert_eq!(band.gray4(4, 0), Some(8));
        assert_eq!(band.gray4(5, 0), None);
        assert_eq!(band.rgb565(0, 0), None);
    }

    #[test]
    fn row_words_respect_stride() {
        let pixels = [1u16, 2, 3, 4, 5, 6];
        let band = RowBand {
            x: 8,
            y: 16,
            width: 2,
            height: 2,
            stride: 3,
            format: BandFormat::Rgb565,
            pixels: &pixels,
        };

        assert_eq!(band.row_words(1), Some(&pixels[3..5]));
        assert_eq!(band.rgb565(1, 1), Some(5));
        assert_eq!(band.row_words(2), None);
    }
}
