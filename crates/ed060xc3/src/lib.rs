#![cfg_attr(not(test), no_std)]

//! ED060XC3 (6" 1024x758 e-paper) panel model.
//!
//! The electrical waveform driver lives outside this crate. What is modelled
//! here is the memory side of the panel: the 4bpp packed framebuffer laid out
//! the way epdiy expects it, the fixed mounting rotation, and the update
//! modes a refresh can be requested with.

extern crate alloc;

mod framebuffer;
pub mod panel;

#[cfg(feature = "embedded-graphics")]
mod graphics;

pub use framebuffer::{AllocError, FrameBuffer};
pub use panel::Rotation;

/// Waveform used for a screen update.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateMode {
    /// 16 grey levels with full flashing. Used for finished images.
    Gc16,
    /// Direct update, black and white only. Fast, used for text screens.
    Du,
}

impl UpdateMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gc16 => "gc16",
            Self::Du => "du",
        }
    }
}

/// How thoroughly the panel is cleared before an update.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClearKind {
    /// Power cycle around a full clear. Removes ghosting left by long dwell.
    Full,
    /// Plain full clear with the panel already powered.
    Light,
}

impl ClearKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Light => "light",
        }
    }
}
