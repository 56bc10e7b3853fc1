//! Unattended gallery: list the root directory, show each image, dwell,
//! start over.
//!
//! The scheduler is a state machine advanced by [`GalleryApp::tick`]. Every
//! wait is a returned deadline rather than a sleep, so the caller decides how
//! to idle and tests drive time directly.

mod ramp;


pub use ramp::BacklightRamp;

use ed060xc3::{ClearKind, UpdateMode};
use log::{debug, info, warn};

use crate::{
    arbiter::{HostLink, StorageArbiter},
    command::{self, Command, CommandError, CommandOutput},
    decode::ImageDecoder,
    pipeline::{Clock, Panel, RenderError, RenderMetrics, RenderPipeline},
    splash,
    storage::{DirectoryCursor, FileStore, StorageError},
};

/// Frontlight PWM output.
pub trait Backlight {
    type Error: core::fmt::Debug;

    fn set_level(&mut self, duty: u16) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GalleryConfig {
    /// Hold time at full ramp level.
    pub dwell_ms: u32,
    pub ramp_floor: u16,
    pub ramp_ceiling: u16,
    pub ramp_step: u16,
    pub ramp_step_ms: u32,
    /// Delay before listing again when no image was found.
    pub empty_retry_ms: u32,
    /// How often a suspended gallery checks whether storage came back.
    pub suspend_poll_ms: u32,
    /// Draw the root listing once before the first pass.
    pub startup_listing: bool,
    pub listing_hold_ms: u32,
    /// Frontlight duty written once at startup, before any ramp.
    pub initial_backlight: Option<u16>,
    /// Loop over the directory. When off, only the first file is shown.
    pub gallery_mode: bool,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 5_000,
            ramp_floor: 100,
            ramp_ceiling: 8_000,
            ramp_step: 250,
            ramp_step_ms: 100,
            empty_retry_ms: 5_000,
            suspend_poll_ms: 250,
            startup_listing: true,
            listing_hold_ms: 1_500,
            // About a quarter of the 13-bit LEDC range.
            initial_backlight: Some(2_096),
            gallery_mode: true,
        }
    }
}

impl GalleryConfig {
    pub const fn with_dwell_ms(mut self, dwell_ms: u32) -> Self {
        self.dwell_ms = dwell_ms;
        self
    }

    pub const fn with_ramp(mut self, floor: u16, ceiling: u16, step: u16, step_ms: u32) -> Self {
        self.ramp_floor = floor;
        self.ramp_ceiling = ceiling;
        self.ramp_step = step;
        self.ramp_step_ms = step_ms;
        self
    }

    pub const fn with_empty_retry_ms(mut self, empty_retry_ms: u32) -> Self {
        self.empty_retry_ms = empty_retry_ms;
        self
    }

    pub const fn with_startup_listing(mut self, startup_listing: bool) -> Self {
        self.startup_listing = startup_listing;
        self
    }

    pub const fn with_initial_backlight(mut self, initial_backlight: Option<u16>) -> Self {
        self.initial_backlight = initial_backlight;
        self
    }

    pub const fn with_gallery_mode(mut self, gallery_mode: bool) -> Self {
        self.gallery_mode = gallery_mode;
        self
    }

    pub const fn ramp(&self) -> BacklightRamp {
        BacklightRamp::new(self.ramp_floor, self.ramp_ceiling, self.ramp_step)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TickResult {
    /// More work is ready, tick again right away.
    Continue,
    /// Nothing to do before this time.
    WaitUntil(u64),
    /// The gallery stopped and will not run again.
    Stopped,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GalleryPhase {
    Startup,
    ShowingListing { until_ms: u64 },
    Idle { resume_at_ms: u64 },
    Listing,
    Rendering,
    RampUp { step: u16, due_ms: u64 },
    Dwelling { until_ms: u64 },
    RampDown { step: u16, due_ms: u64 },
    Suspended { next_poll_ms: u64 },
    Stopped,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GalleryStats {
    /// Directory passes started.
    pub passes: u32,
    pub rendered: u32,
    pub failed: u32,
    pub last_metrics: Option<RenderMetrics>,
}

pub struct GalleryApp<S, L, D, P, C, B> {
    arbiter: StorageArbiter<S, L>,
    pipeline: RenderPipeline<D, P, C>,
    backlight: B,
    config: GalleryConfig,
    ramp: BacklightRamp,
    phase: GalleryPhase,
    cursor: DirectoryCursor,
    /// Images shown since the current pass was listed.
    pass_rendered: u32,
    stats: GalleryStats,
    stop_requested: bool,
    backlight_fault_logged: bool,
}

impl<S, L, D, P, C, B> GalleryApp<S, L, D, P, C, B>
where
    S: FileStore,
    L: HostLink,
    D: ImageDecoder,
    P: Panel,
    C: Clock,
    B: Backlight,
{
    pub fn new(
        arbiter: StorageArbiter<S, L>,
        pipeline: RenderPipeline<D, P, C>,
        backlight: B,
        config: GalleryConfig,
    ) -> Self {
        let mut app = Self {
            arbiter,
            pipeline,
            backlight,
            ramp: config.ramp(),
            phase: if config.startup_listing {
                GalleryPhase::Startup
            } else {
                GalleryPhase::Listing
            },
            config,
            cursor: DirectoryCursor::default(),
            pass_rendered: 0,
            stats: GalleryStats::default(),
            stop_requested: false,
            backlight_fault_logged: false,
        };
        if let Some(duty) = config.initial_backlight {
            app.set_backlight(duty);
        }
        app
    }

    pub fn phase(&self) -> GalleryPhase {
        self.phase
    }

    pub fn stats(&self) -> GalleryStats {
        self.stats
    }

    pub fn arbiter(&self) -> &StorageArbiter<S, L> {
        &self.arbiter
    }

    pub fn pipeline(&self) -> &RenderPipeline<D, P, C> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut RenderPipeline<D, P, C> {
        &mut self.pipeline
    }

    pub fn backlight(&self) -> &B {
        &self.backlight
    }

    /// Stops the gallery at the next job boundary.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Runs a console command against the shared storage.
    pub fn execute(&mut self, command: Command) -> Result<CommandOutput, CommandError> {
        let output = command::execute(&mut self.arbiter, command)?;
        if command == Command::Exit {
            self.request_stop();
        }
        Ok(output)
    }

    pub fn tick(&mut self, now_ms: u64) -> TickResult {
        match self.phase {
            GalleryPhase::Startup => self.show_listing(now_ms),
            GalleryPhase::ShowingListing { until_ms } => {
                if now_ms < until_ms {
                    return TickResult::WaitUntil(until_ms);
                }
                let _ = self.pipeline.clear_panel(ClearKind::Full);
                self.phase = GalleryPhase::Listing;
                TickResult::Continue
            }
            GalleryPhase::Idle { resume_at_ms } => {
                if self.stop_requested {
                    return self.halt();
                }
                if now_ms < resume_at_ms {
                    return TickResult::WaitUntil(resume_at_ms);
                }
                self.phase = GalleryPhase::Listing;
                TickResult::Continue
            }
            GalleryPhase::Listing => self.list(now_ms),
            GalleryPhase::Rendering => self.render_next(now_ms),
            GalleryPhase::RampUp { step, due_ms } => {
                if now_ms < due_ms {
                    return TickResult::WaitUntil(due_ms);
                }
                if step >= self.ramp.steps() {
                    let until_ms = now_ms + self.config.dwell_ms as u64;
                    self.phase = GalleryPhase::Dwelling { until_ms };
                    return TickResult::WaitUntil(until_ms);
                }
                self.set_backlight(self.ramp.level(step));
                let due_ms = now_ms + self.config.ramp_step_ms as u64;
                self.phase = GalleryPhase::RampUp {
                    step: step + 1,
                    due_ms,
                };
                TickResult::WaitUntil(due_ms)
            }
            GalleryPhase::Dwelling { until_ms } => {
                if now_ms < until_ms {
                    return TickResult::WaitUntil(until_ms);
                }
                self.phase = GalleryPhase::RampDown {
                    step: 0,
                    due_ms: now_ms,
                };
                TickResult::Continue
            }
            GalleryPhase::RampDown { step, due_ms } => {
                if now_ms < due_ms {
                    return TickResult::WaitUntil(due_ms);
                }
                if step >= self.ramp.steps() {
                    self.set_backlight(0);
                    self.phase = GalleryPhase::Rendering;
                    return TickResult::Continue;
                }
                self.set_backlight(self.ramp.level_down(step));
                let due_ms = now_ms + self.config.ramp_step_ms as u64;
                self.phase = GalleryPhase::RampDown {
                    step: step + 1,
                    due_ms,
                };
                TickResult::WaitUntil(due_ms)
            }
            GalleryPhase::Suspended { next_poll_ms } => {
                if self.stop_requested {
                    return self.halt();
                }
                if now_ms < next_poll_ms {
                    return TickResult::WaitUntil(next_poll_ms);
                }
                if self.arbiter.is_host_exposed() {
                    return self.suspend(now_ms);
                }
                info!("gallery: storage returned, listing again");
                self.phase = GalleryPhase::Listing;
                TickResult::Continue
            }
            GalleryPhase::Stopped => TickResult::Stopped,
        }
    }

    fn show_listing(&mut self, now_ms: u64) -> TickResult {
        if self.stop_requested {
            return self.halt();
        }

        let cursor = match self.arbiter.storage().and_then(DirectoryCursor::collect) {
            Ok(cursor) => cursor,
            Err(err) => {
                warn!("gallery: startup listing skipped kind={}", err.as_str());
                self.phase = GalleryPhase::Listing;
                return TickResult::Continue;
            }
        };

        self.pipeline.prepare_frame();
        let shown = self.pipeline.present_with(UpdateMode::Du, |frame| {
            splash::draw_listing(frame, cursor.names());
        });
        if shown.is_err() {
            self.phase = GalleryPhase::Listing;
            return TickResult::Continue;
        }

        info!("gallery: startup listing entries={}", cursor.len());
        let until_ms = now_ms + self.config.listing_hold_ms as u64;
        self.phase = GalleryPhase::ShowingListing { until_ms };
        TickResult::WaitUntil(until_ms)
    }

    fn list(&mut self, now_ms: u64) -> TickResult {
        if self.stop_requested {
            return self.halt();
        }
        if self.arbiter.is_host_exposed() {
            return self.suspend(now_ms);
        }

        match self.arbiter.storage().and_then(DirectoryCursor::collect) {
            Ok(cursor) if cursor.is_empty() => {
                info!(
                    "gallery: no images hidden={} retry_ms={}",
                    cursor.skipped_hidden(),
                    self.config.empty_retry_ms
                );
                self.retry_later(now_ms)
            }
            Ok(cursor) => {
                self.stats.passes = self.stats.passes.saturating_add(1);
                debug!(
                    "gallery: pass={} files={} hidden={}",
                    self.stats.passes,
                    cursor.len(),
                    cursor.skipped_hidden()
                );
                self.cursor = cursor;
                self.pass_rendered = 0;
                self.phase = GalleryPhase::Rendering;
                TickResult::Continue
            }
            Err(StorageError::Unavailable) => self.suspend(now_ms),
            Err(err) => {
                warn!("gallery: listing failed kind={}", err.as_str());
                self.retry_later(now_ms)
            }
        }
    }

    fn render_next(&mut self, now_ms: u64) -> TickResult {
        if self.stop_requested {
            return self.halt();
        }

        let Some(name) = self.cursor.advance() else {
            if self.pass_rendered == 0 {
                info!(
                    "gallery: nothing shown this pass, retry_ms={}",
                    self.config.empty_retry_ms
                );
                return self.retry_later(now_ms);
            }
            self.phase = GalleryPhase::Listing;
            return TickResult::Continue;
        };

        let result = self.pipeline.render_file(&mut self.arbiter, &name);
        match result {
            Ok(metrics) => {
                self.stats.rendered = self.stats.rendered.saturating_add(1);
                self.stats.last_metrics = Some(metrics);
                self.pass_rendered += 1;
            }
            Err(RenderError::StorageUnavailable) => return self.suspend(now_ms),
            // Already logged by the pipeline with the file name.
            Err(_) => self.stats.failed = self.stats.failed.saturating_add(1),
        }

        if !self.config.gallery_mode {
            info!("gallery: single image mode, showing {} only", name);
            self.phase = GalleryPhase::Stopped;
            return TickResult::Stopped;
        }

        if result.is_ok() {
            self.phase = GalleryPhase::RampUp {
                step: 0,
                due_ms: now_ms,
            };
        }
        TickResult::Continue
    }

    fn retry_later(&mut self, now_ms: u64) -> TickResult {
        let resume_at_ms = now_ms + self.config.empty_retry_ms as u64;
        self.phase = GalleryPhase::Idle { resume_at_ms };
        TickResult::WaitUntil(resume_at_ms)
    }

    fn suspend(&mut self, now_ms: u64) -> TickResult {
        if !matches!(self.phase, GalleryPhase::Suspended { .. }) {
            info!("gallery: suspended while storage is exposed to host");
        }
        let next_poll_ms = now_ms + self.config.suspend_poll_ms as u64;
        self.phase = GalleryPhase::Suspended { next_poll_ms };
        TickResult::WaitUntil(next_poll_ms)
    }

    fn halt(&mut self) -> TickResult {
        self.set_backlight(0);
        self.phase = GalleryPhase::Stopped;
        info!(
            "gallery: stopped passes={} rendered={} failed={}",
            self.stats.passes, self.stats.rendered, self.stats.failed
        );
        TickResult::Stopped
    }

    fn set_backlight(&mut self, duty: u16) {
        if let Err(err) = self.backlight.set_level(duty)
            && !self.backlight_fault_logged
        {
            warn!("gallery: backlight write failed duty={} err={:?}", duty, err);
            self.backlight_fault_logged = true;
        }
    }
}
