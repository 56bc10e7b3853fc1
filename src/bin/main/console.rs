use core::fmt::Write;

use esp_println::{Printer, println};
use heapless::String as HeaplessString;
use inkframe_core::{
    arbiter::HostLink,
    command::Command,
    decode::ImageDecoder,
    gallery::{Backlight, GalleryApp},
    pipeline::{Clock, Panel},
    storage::FileStore,
};
use log::{info, warn};

pub(super) const CONSOLE_LINE_BYTES: usize = 64;
pub(super) const PROMPT: &str = "inkframe> ";

/// Accumulates console bytes until a line terminator arrives.
pub(super) struct ConsoleLine {
    buf: HeaplessString<CONSOLE_LINE_BYTES>,
    overflowed: bool,
}

impl ConsoleLine {
    pub(super) const fn new() -> Self {
        Self {
            buf: HeaplessString::new(),
            overflowed: false,
        }
    }

    /// Returns the finished line when `byte` terminates it.
    ///
    /// Lines longer than the buffer are dropped whole.
    pub(super) fn push(&mut self, byte: u8) -> Option<HeaplessString<CONSOLE_LINE_BYTES>> {
        match byte {
            b'\r' | b'\n' => {
                let line = core::mem::take(&mut self.buf);
                if core::mem::replace(&mut self.overflowed, false) {
                    warn!("console: line dropped, longer than {} bytes", CONSOLE_LINE_BYTES);
                    return None;
                }
                (!line.trim().is_empty()).then_some(line)
            }
            // Backspace and DEL from terminal emulators.
            0x08 | 0x7F => {
                self.buf.pop();
                None
            }
            byte if byte.is_ascii() && !byte.is_ascii_control() => {
                if self.buf.push(byte as char).is_err() {
                    self.overflowed = true;
                }
                None
            }
            _ => None,
        }
    }
}

pub(super) fn dispatch<S, L, D, P, C, B>(app: &mut GalleryApp<S, L, D, P, C, B>, line: &str)
where
    S: FileStore,
    L: HostLink,
    D: ImageDecoder,
    P: Panel,
    C: Clock,
    B: Backlight,
{
    let Some(command) = Command::parse(line) else {
        println!("unknown command '{}', try 'help'", line.trim());
        return;
    };

    info!("console: command={}", command.name());
    match app.execute(command) {
        Ok(output) => {
            let mut printer = Printer;
            let _ = output.write_to(&mut printer);
            println!();
        }
        Err(err) => {
            println!("{} failed: {}", command.name(), err.as_str());
        }
    }
}
