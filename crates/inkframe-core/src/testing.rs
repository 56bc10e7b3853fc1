//! In-crate test doubles for every hardware seam.

use core::cell::Cell;
use std::{string::String, vec::Vec};

use ed060xc3::{ClearKind, FrameBuffer, UpdateMode};

use crate::{
    arbiter::HostLink,
    decode::{BandFormat, DecodeError, ImageDecoder, ImageDimensions, RowBand, RowSink},
    frame::DitherScratch,
    gallery::Backlight,
    pipeline::{Clock, Panel},
    storage::{Capacity, FileStore, StorageError},
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Vec<(String, Vec<u8>)>,
    failing_reads: Vec<String>,
    pub fail_listing: bool,
    pub reads: Vec<String>,
    pub released: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, bytes: &[u8]) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn failing_reads_of(mut self, name: &str) -> Self {
        self.failing_reads.push(name.into());
        self
    }

    pub fn insert(&mut self, name: &str, bytes: &[u8]) {
        self.remove(name);
        self.files.push((name.into(), bytes.to_vec()));
    }

    pub fn remove(&mut self, name: &str) {
        self.files.retain(|(existing, _)| existing != name);
    }

    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, bytes)| bytes.as_slice())
    }
}

impl FileStore for MemoryStore {
    fn list_root(&mut self, visit: &mut dyn FnMut(&str)) -> Result<(), StorageError> {
        if self.fail_listing {
            return Err(StorageError::Io);
        }
        for (name, _) in &self.files {
            visit(name);
        }
        Ok(())
    }

    fn file_len(&mut self, name: &str) -> Result<usize, StorageError> {
        self.contents(name)
            .map(<[u8]>::len)
            .ok_or(StorageError::NotFound)
    }

    fn read_file(&mut self, name: &str, out: &mut [u8]) -> Result<usize, StorageError> {
        self.reads.push(name.into());
        if self.failing_reads.iter().any(|failing| failing == name) {
            return Err(StorageError::Io);
        }

        let bytes = self.contents(name).ok_or(StorageError::NotFound)?;
        let count = bytes.len().min(out.len());
        out[..count].copy_from_slice(&bytes[..count]);
        Ok(count)
    }

    fn create_if_absent(&mut self, name: &str, contents: &[u8]) -> Result<bool, StorageError> {
        if self.contents(name).is_some() {
            return Ok(false);
        }
        self.insert(name, contents);
        Ok(true)
    }

    fn capacity(&mut self) -> Result<Capacity, StorageError> {
        Ok(Capacity {
            sector_count: 15_523_840,
            sector_size: 512,
        })
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[derive(Debug, Default)]
pub struct RecordingLink {
    pub published: u32,
    pub withdrawn: u32,
    pub fail: bool,
}

impl HostLink for RecordingLink {
    type Error = ();

    fn publish(&mut self) -> Result<(), Self::Error> {
        if self.fail {
            return Err(());
        }
        self.published += 1;
        Ok(())
    }

    fn withdraw(&mut self) -> Result<(), Self::Error> {
        if self.fail {
            return Err(());
        }
        self.withdrawn += 1;
        Ok(())
    }
}

/// Accepts sources starting with `IMG:` and emits two solid 8x16 bands.
#[derive(Debug)]
pub struct ScriptedDecoder {
    nibble: u8,
    pub calls: u32,
}

impl ScriptedDecoder {
    pub const BAND_WIDTH: usize = 8;
    pub const BAND_HEIGHT: usize = 16;

    pub fn solid(nibble: u8) -> Self {
        Self { nibble, calls: 0 }
    }
}

impl ImageDecoder for ScriptedDecoder {
    fn decode(
        &mut self,
        source: &[u8],
        scratch: &mut DitherScratch,
        format: BandFormat,
        sink: &mut dyn RowSink,
    ) -> Result<ImageDimensions, DecodeError> {
        self.calls += 1;
        if !source.starts_with(b"IMG:") {
            return Err(DecodeError::UnsupportedFormat);
        }

        let stride = format.row_words(Self::BAND_WIDTH);
        let value = match format {
            BandFormat::Gray4Dithered => {
                let n = self.nibble as u16 & 0x0F;
                n | (n << 4) | (n << 8) | (n << 12)
            }
            BandFormat::Rgb565 if self.nibble == 0 => 0x0000,
            BandFormat::Rgb565 => 0xFFFF,
        };

        for index in 0..2 {
            let words = scratch
                .band_mut(stride * Self::BAND_HEIGHT)
                .ok_or(DecodeError::Workspace)?;
            words.fill(value);

            let band = RowBand {
                x: 0,
                y: (index * Self::BAND_HEIGHT) as u16,
                width: Self::BAND_WIDTH as u16,
                height: Self::BAND_HEIGHT as u16,
                stride,
                format,
                pixels: &*words,
            };
            if !sink.consume(&band) {
                return Err(DecodeError::Interrupted);
            }
        }

        Ok(ImageDimensions {
            width: Self::BAND_WIDTH as u16,
            height: (2 * Self::BAND_HEIGHT) as u16,
        })
    }
}

/// Advances by `step` microseconds on every read.
#[derive(Debug)]
pub struct StepClock {
    now: Cell<u64>,
    step: u64,
}

impl StepClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now_us(&self) -> u64 {
        let next = self.now.get() + self.step;
        self.now.set(next);
        next
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PanelEvent {
    Clear(ClearKind),
    Refresh(UpdateMode),
}

#[derive(Debug, Default)]
pub struct RecordingPanel {
    pub events: Vec<PanelEvent>,
    pub fail_refresh: bool,
    /// Number of dark pixels in the top-left 64x64 corner at each refresh.
    pub dark_pixels: Vec<usize>,
}

impl Panel for RecordingPanel {
    type Error = ();

    fn clear(&mut self, kind: ClearKind) -> Result<(), Self::Error> {
        self.events.push(PanelEvent::Clear(kind));
        Ok(())
    }

    fn refresh(&mut self, frame: &FrameBuffer, mode: UpdateMode) -> Result<(), Self::Error> {
        if self.fail_refresh {
            return Err(());
        }

        let dark = (0..64)
            .flat_map(|y| (0..64).map(move |x| (x, y)))
            .filter(|&(x, y)| frame.pixel(x, y).is_some_and(|level| level < 0x80))
            .count();
        self.dark_pixels.push(dark);
        self.events.push(PanelEvent::Refresh(mode));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingBacklight {
    pub levels: Vec<u16>,
}

impl Backlight for RecordingBacklight {
    type Error = ();

    fn set_level(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.levels.push(duty);
        Ok(())
    }
}
