//! ED060XC3 refresh through the epdiy C driver.
//!
//! epdiy owns the waveform tables, the LCD peripheral and the panel power
//! rails. We keep our own framebuffer and copy it into epdiy's front buffer
//! before each update, which works because both use the same 4bpp layout.

use ed060xc3::{ClearKind, FrameBuffer, UpdateMode, panel};
use inkframe_core::pipeline::Panel;
use log::{info, warn};

#[repr(C)]
pub struct EpdBoardDefinition {
    _private: [u8; 0],
}

#[repr(C)]
pub struct EpdDisplay {
    _private: [u8; 0],
}

#[repr(C)]
pub struct EpdWaveform {
    _private: [u8; 0],
}

/// `EpdiyHighlevelState` from `epd_highlevel.h`.
#[repr(C)]
struct EpdiyHighlevelState {
    front_fb: *mut u8,
    back_fb: *mut u8,
    difference_fb: *mut u8,
    dirty_lines: *mut bool,
    dirty_columns: *mut u8,
    waveform: *const EpdWaveform,
}

/// `EPD_BUILTIN_WAVEFORM`: null makes `epd_hl_init` use the display's own
/// default waveform.
const EPD_BUILTIN_WAVEFORM: *const EpdWaveform = core::ptr::null();
const EPD_LUT_64K: i32 = 2;
const MODE_DU: i32 = 0x1;
const MODE_GC16: i32 = 0x2;
const EPD_DRAW_SUCCESS: i32 = 0;

unsafe extern "C" {
    static epd_board_v7_raw: EpdBoardDefinition;
    static ED060XC3: EpdDisplay;

    fn epd_init(board: *const EpdBoardDefinition, display: *const EpdDisplay, options: i32);
    fn epd_hl_init(waveform: *const EpdWaveform) -> EpdiyHighlevelState;
    fn epd_hl_get_framebuffer(state: *mut EpdiyHighlevelState) -> *mut u8;
    fn epd_hl_update_screen(state: *mut EpdiyHighlevelState, mode: i32, temperature: i32) -> i32;
    fn epd_fullclear(state: *mut EpdiyHighlevelState, temperature: i32);
    fn epd_poweron();
    fn epd_poweroff();
    fn epd_ambient_temperature() -> f32;
}

/// epdiy driver error code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EpdDrawError(pub i32);

pub struct EpdiyPanel {
    state: EpdiyHighlevelState,
    temperature: i32,
}

impl EpdiyPanel {
    /// Brings up the epdiy driver for the v7 board and clears the panel.
    ///
    /// Must be called once. epdiy keeps global state behind this handle.
    pub fn init() -> Self {
        // SAFETY: Called once at startup before any other epdiy function.
        let state = unsafe {
            epd_init(&epd_board_v7_raw, &ED060XC3, EPD_LUT_64K);
            epd_hl_init(EPD_BUILTIN_WAVEFORM)
        };

        // SAFETY: epdiy is initialised above.
        let ambient = unsafe {
            epd_poweron();
            let ambient = epd_ambient_temperature();
            epd_poweroff();
            ambient
        };
        let temperature = if ambient.is_finite() && ambient > -20.0 && ambient < 70.0 {
            ambient as i32
        } else {
            panel::DEFAULT_TEMPERATURE_C
        };
        info!("epd: init temperature_c={}", temperature);

        let mut this = Self { state, temperature };
        this.full_clear();
        this
    }

    fn full_clear(&mut self) {
        // SAFETY: `state` came from epd_hl_init and lives as long as self.
        unsafe {
            epd_poweron();
            epd_fullclear(&mut self.state, self.temperature);
            epd_poweroff();
        }
    }

    /// Switches the panel rails off for shutdown.
    pub fn power_off(&mut self) {
        // SAFETY: epdiy is initialised in `init`.
        unsafe { epd_poweroff() }
    }
}

impl Panel for EpdiyPanel {
    type Error = EpdDrawError;

    fn clear(&mut self, kind: ClearKind) -> Result<(), Self::Error> {
        match kind {
            ClearKind::Full => self.full_clear(),
            // SAFETY: `state` came from epd_hl_init and lives as long as self.
            ClearKind::Light => unsafe { epd_fullclear(&mut self.state, self.temperature) },
        }
        Ok(())
    }

    fn refresh(&mut self, frame: &FrameBuffer, mode: UpdateMode) -> Result<(), Self::Error> {
        let raw_mode = match mode {
            UpdateMode::Gc16 => MODE_GC16,
            UpdateMode::Du => MODE_DU,
        };

        // SAFETY: epdiy allocates the front buffer with the panel's full
        // 4bpp size and keeps it for the lifetime of `state`.
        let status = unsafe {
            let front = epd_hl_get_framebuffer(&mut self.state);
            if front.is_null() {
                return Err(EpdDrawError(-1));
            }
            core::slice::from_raw_parts_mut(front, panel::BUFFER_SIZE)
                .copy_from_slice(frame.bytes());

            epd_poweron();
            let status = epd_hl_update_screen(&mut self.state, raw_mode, self.temperature);
            epd_poweroff();
            status
        };

        if status != EPD_DRAW_SUCCESS {
            warn!("epd: update failed mode={} status={}", mode.as_str(), status);
            return Err(EpdDrawError(status));
        }
        Ok(())
    }
}
