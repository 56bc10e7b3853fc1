//! One image file from storage to the panel.

use core::cell::Cell;

use alloc::vec::Vec;

use ed060xc3::{ClearKind, FrameBuffer, UpdateMode};
use log::{info, warn};

use crate::{
    arbiter::{HostLink, StorageArbiter},
    decode::{BandFormat, DecodeError, ImageDecoder, ImageDimensions},
    frame::{CopyMode, FrameComposer, FrameStore},
    storage::{FileStore, StorageError},
};

/// Largest source file the pipeline will try to hold in memory.
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 4 * 1024 * 1024;

/// Monotonic microsecond time source.
pub trait Clock {
    fn now_us(&self) -> u64;

    fn now_ms(&self) -> u64 {
        self.now_us() / 1_000
    }
}

/// Display refresh collaborator.
pub trait Panel {
    type Error: core::fmt::Debug;

    fn clear(&mut self, kind: ClearKind) -> Result<(), Self::Error>;

    /// Pushes the whole frame to the glass.
    fn refresh(&mut self, frame: &FrameBuffer, mode: UpdateMode) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RenderError {
    StorageUnavailable,
    Io,
    AllocationFailure,
    Decode(DecodeError),
    Refresh,
}

impl RenderError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StorageUnavailable => "storage_unavailable",
            Self::Io => "io",
            Self::AllocationFailure => "allocation_failure",
            Self::Decode(err) => err.as_str(),
            Self::Refresh => "refresh",
        }
    }
}

impl From<StorageError> for RenderError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable => Self::StorageUnavailable,
            StorageError::NotFound | StorageError::Io => Self::Io,
        }
    }
}

/// Per-job timings, reset for every job.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RenderMetrics {
    /// Decode time without the time spent composing bands.
    pub decode_time_ms: u32,
    /// Cumulative time inside the row sink.
    pub render_time_ms: u32,
    pub bands: u32,
    pub source_bytes: usize,
    pub dimensions: Option<ImageDimensions>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PipelineConfig {
    pub format: BandFormat,
    pub copy_mode: CopyMode,
    /// Power cycle and fully clear the panel before each image.
    pub full_clean: bool,
    pub max_source_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            format: BandFormat::configured(),
            copy_mode: CopyMode::RotationAware,
            full_clean: false,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl PipelineConfig {
    pub const fn with_format(mut self, format: BandFormat) -> Self {
        self.format = format;
        self
    }

    pub const fn with_copy_mode(mut self, copy_mode: CopyMode) -> Self {
        self.copy_mode = copy_mode;
        self
    }

    pub const fn with_full_clean(mut self, full_clean: bool) -> Self {
        self.full_clean = full_clean;
        self
    }

    pub const fn with_max_source_bytes(mut self, max_source_bytes: usize) -> Self {
        self.max_source_bytes = max_source_bytes;
        self
    }

    const fn clear_kind(&self) -> ClearKind {
        if self.full_clean {
            ClearKind::Full
        } else {
            ClearKind::Light
        }
    }
}

/// Counts source buffers handed out and given back.
#[derive(Debug, Default)]
pub struct JobLedger {
    allocated: Cell<u32>,
    released: Cell<u32>,
}

impl JobLedger {
    pub fn allocated(&self) -> u32 {
        self.allocated.get()
    }

    pub fn released(&self) -> u32 {
        self.released.get()
    }

    pub fn outstanding(&self) -> u32 {
        self.allocated() - self.released()
    }
}

/// Source bytes of the file being rendered.
///
/// Dropping the job frees the buffer, so every exit path releases it once.
struct ImageJob<'l> {
    source: Vec<u8>,
    ledger: &'l JobLedger,
}

impl<'l> ImageJob<'l> {
    fn allocate(len: usize, ledger: &'l JobLedger) -> Result<Self, RenderError> {
        let mut source = Vec::new();
        source
            .try_reserve_exact(len)
            .map_err(|_| RenderError::AllocationFailure)?;
        source.resize(len, 0);
        ledger.allocated.set(ledger.allocated.get() + 1);
        Ok(Self { source, ledger })
    }
}

impl Drop for ImageJob<'_> {
    fn drop(&mut self) {
        self.ledger.released.set(self.ledger.released.get() + 1);
    }
}

pub struct RenderPipeline<D, P, C> {
    decoder: D,
    panel: P,
    clock: C,
    store: FrameStore,
    config: PipelineConfig,
    ledger: JobLedger,
}

impl<D, P, C> RenderPipeline<D, P, C>
where
    D: ImageDecoder,
    P: Panel,
    C: Clock,
{
    pub fn new(decoder: D, panel: P, clock: C, store: FrameStore, config: PipelineConfig) -> Self {
        Self {
            decoder,
            panel,
            clock,
            store,
            config,
            ledger: JobLedger::default(),
        }
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }

    pub fn frame(&self) -> &FrameBuffer {
        self.store.frame()
    }

    /// Clears the frame ahead of a full-screen drawing such as the listing.
    ///
    /// Image jobs do not need this. The composer clears on the first band.
    pub fn prepare_frame(&mut self) {
        self.store.reset();
    }

    /// Draws into the frame with `draw` and pushes it with `mode`.
    pub fn present_with(
        &mut self,
        mode: UpdateMode,
        draw: impl FnOnce(&mut FrameBuffer),
    ) -> Result<(), RenderError> {
        draw(self.store.frame_mut());
        self.panel
            .refresh(self.store.frame(), mode)
            .map_err(|err| {
                warn!("render: refresh failed mode={} err={:?}", mode.as_str(), err);
                RenderError::Refresh
            })
    }

    pub fn clear_panel(&mut self, kind: ClearKind) -> Result<(), RenderError> {
        self.panel.clear(kind).map_err(|err| {
            warn!("render: clear failed kind={} err={:?}", kind.as_str(), err);
            RenderError::Refresh
        })
    }

    /// Reads, decodes and shows one root file.
    ///
    /// A failed decode leaves the panel showing the previous image.
    pub fn render_file<S, L>(
        &mut self,
        arbiter: &mut StorageArbiter<S, L>,
        name: &str,
    ) -> Result<RenderMetrics, RenderError>
    where
        S: FileStore,
        L: HostLink,
    {
        let ticket = arbiter.begin_job()?;
        let result = self.run_job(arbiter, name);
        arbiter.finish_job(ticket);

        match &result {
            Ok(metrics) => info!(
                "render: {} done bytes={} bands={} decode_ms={} render_ms={}",
                name,
                metrics.source_bytes,
                metrics.bands,
                metrics.decode_time_ms,
                metrics.render_time_ms
            ),
            Err(err) => warn!("render: {} failed kind={}", name, err.as_str()),
        }

        result
    }

    fn run_job<S, L>(
        &mut self,
        arbiter: &mut StorageArbiter<S, L>,
        name: &str,
    ) -> Result<RenderMetrics, RenderError>
    where
        S: FileStore,
        L: HostLink,
    {
        let storage = arbiter.storage()?;
        let len = storage.file_len(name)?;
        if len > self.config.max_source_bytes {
            return Err(RenderError::AllocationFailure);
        }

        let mut job = ImageJob::allocate(len, &self.ledger)?;
        let read = storage.read_file(name, &mut job.source)?;
        if read != len {
            return Err(RenderError::Io);
        }

        let mut metrics = RenderMetrics {
            source_bytes: len,
            ..RenderMetrics::default()
        };

        let started = self.clock.now_us();
        let (frame, scratch) = self.store.split_mut();
        let mut composer = FrameComposer::new(frame, &self.clock, self.config.copy_mode);
        let decoded = self
            .decoder
            .decode(&job.source, scratch, self.config.format, &mut composer);
        let total_us = self.clock.now_us().saturating_sub(started);
        let render_us = composer.render_us();
        metrics.bands = composer.bands();
        drop(job);

        metrics.dimensions = Some(decoded.map_err(RenderError::Decode)?);
        metrics.render_time_ms = (render_us / 1_000) as u32;
        metrics.decode_time_ms = (total_us.saturating_sub(render_us) / 1_000) as u32;

        self.clear_panel(self.config.clear_kind())?;
        self.panel
            .refresh(self.store.frame(), UpdateMode::Gc16)
            .map_err(|err| {
                warn!("render: refresh failed err={:?}", err);
                RenderError::Refresh
            })?;

        Ok(metrics)
    }
}
