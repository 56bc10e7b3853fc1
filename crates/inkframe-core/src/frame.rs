//! Frame buffer store and the row sink that composes decoded bands into it.

use alloc::vec::Vec;

use ed060xc3::{AllocError, FrameBuffer, Rotation, panel};
use log::{debug, warn};

use crate::{
    convert::{gray4_intensity, rgb565_to_rgb888},
    decode::{BAND_MAX_ROWS, BandFormat, RowBand, RowSink},
    pipeline::Clock,
};

const WHITE: u8 = 0xFF;

/// Reusable band conversion buffer.
///
/// A decoder fills it during one callback and hands it to the sink as a
/// [`RowBand`]. Nothing may read it after the callback returns.
pub struct DitherScratch {
    words: Vec<u16>,
}

impl DitherScratch {
    /// Allocates room for `band_width` pixels times [`BAND_MAX_ROWS`] rows.
    pub fn try_new(band_width: usize) -> Result<Self, AllocError> {
        let len = band_width * BAND_MAX_ROWS;
        let mut words = Vec::new();
        words.try_reserve_exact(len).map_err(|_| AllocError)?;
        words.resize(len, 0);
        Ok(Self { words })
    }

    pub fn capacity_words(&self) -> usize {
        self.words.len()
    }

    /// First `words` words of the scratch, `None` if the band does not fit.
    pub fn band_mut(&mut self, words: usize) -> Option<&mut [u16]> {
        self.words.get_mut(..words)
    }
}

/// How decoded bands land in the frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CopyMode {
    /// Every pixel goes through the mounting rotation.
    #[default]
    RotationAware,
    /// Experimental: packed grey rows are copied straight into physical
    /// lines. Rotation is ignored and colour bands fall back to the
    /// rotation-aware path.
    RawCopy,
}

/// Frame buffer plus dither scratch, allocated once at startup.
pub struct FrameStore {
    frame: FrameBuffer,
    scratch: DitherScratch,
}

impl FrameStore {
    /// Startup allocation. Failing here leaves the device unusable.
    pub fn allocate(rotation: Rotation) -> Result<Self, AllocError> {
        let frame = FrameBuffer::try_new(rotation)?;
        let scratch = DitherScratch::try_new(panel::WIDTH)?;
        debug!(
            "frame: allocated rotation={} frame_bytes={} scratch_words={}",
            frame.rotation().as_str(),
            frame.bytes().len(),
            scratch.capacity_words()
        );
        Ok(Self { frame, scratch })
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut FrameBuffer {
        &mut self.frame
    }

    /// Borrows both buffers for one decode.
    pub fn split_mut(&mut self) -> (&mut FrameBuffer, &mut DitherScratch) {
        (&mut self.frame, &mut self.scratch)
    }

    /// Resets the frame to white ahead of a full-screen drawing.
    pub fn reset(&mut self) {
        self.frame.clear(WHITE);
    }
}

/// Row sink writing bands into the frame buffer and timing itself.
///
/// The frame is reset to white when the first band arrives. A job that fails
/// before decoding anything leaves the previous image in place.
pub struct FrameComposer<'a, C: ?Sized> {
    frame: &'a mut FrameBuffer,
    clock: &'a C,
    mode: CopyMode,
    render_us: u64,
    bands: u32,
    raw_fallback_logged: bool,
}

impl<'a, C> FrameComposer<'a, C>
where
    C: Clock + ?Sized,
{
    pub fn new(frame: &'a mut FrameBuffer, clock: &'a C, mode: CopyMode) -> Self {
        Self {
            frame,
            clock,
            mode,
            render_us: 0,
            bands: 0,
            raw_fallback_logged: false,
        }
    }

    /// Time spent inside `consume`.
    pub fn render_us(&self) -> u64 {
        self.render_us
    }

    pub fn bands(&self) -> u32 {
        self.bands
    }

    fn remap_gray4(&mut self, band: &RowBand<'_>) {
        for row in 0..band.height as usize {
            for col in 0..band.width as usize {
                let Some(nibble) = band.gray4(col, row) else {
                    continue;
                };
                let _ = self.frame.set_pixel(
                    band.x as usize + col,
                    band.y as usize + row,
                    gray4_intensity(nibble),
                );
            }
        }
    }

    fn remap_color(&mut self, band: &RowBand<'_>) {
        for row in 0..band.height as usize {
            for col in 0..band.width as usize {
                let Some(pixel) = band.rgb565(col, row) else {
                    continue;
                };
                let (r, g, b) = rgb565_to_rgb888(pixel);
                let _ = self.frame.set_color_pixel(
                    band.x as usize + col,
                    band.y as usize + row,
                    r,
                    g,
                    b,
                );
            }
        }
    }

    fn copy_raw(&mut self, band: &RowBand<'_>) {
        let row_bytes = (band.width as usize).div_ceil(2);
        for row in 0..band.height as usize {
            let Some(words) = band.row_words(row) else {
                break;
            };

            let mut remaining = row_bytes;
            for (index, word) in words.iter().enumerate() {
                let bytes = word.to_le_bytes();
                let take = remaining.min(bytes.len());
                self.frame.copy_packed_row(
                    band.x as usize + index * 4,
                    band.y as usize + row,
                    &bytes[..take],
                );
                remaining -= take;
            }
        }
    }
}

impl<C> RowSink for FrameComposer<'_, C>
where
    C: Clock + ?Sized,
{
    fn consume(&mut self, band: &RowBand<'_>) -> bool {
        let started = self.clock.now_us();
        if self.bands == 0 {
            self.frame.clear(WHITE);
        }

        match (self.mode, band.format) {
            (CopyMode::RawCopy, BandFormat::Gray4Dithered) if band.x % 2 == 0 => {
                self.copy_raw(band)
            }
            (_, BandFormat::Gray4Dithered) => self.remap_gray4(band),
            (mode, BandFormat::Rgb565) => {
                if mode == CopyMode::RawCopy && !self.raw_fallback_logged {
                    warn!("frame: raw copy has no colour path, remapping bands");
                    self.raw_fallback_logged = true;
                }
                self.remap_color(band)
            }
        }

        self.render_us += self.clock.now_us().saturating_sub(started);
        self.bands += 1;
        true
    }
}
