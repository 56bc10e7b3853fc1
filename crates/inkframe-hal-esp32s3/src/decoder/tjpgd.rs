//! Baseline JPEG decoding through the TJPGD copy in the ESP32-S3 ROM.
//!
//! TJPGD pulls input and pushes RGB888 MCU blocks through C callbacks that
//! carry no user pointer we can reach, so the active decode is published in
//! a global. [`JpegCallbackGuard`] owns it for exactly one decode.

use core::ffi::c_void;

use inkframe_core::{
    convert::{dither_gray4, luma, put_gray4, rgb888_to_rgb565},
    decode::{BandFormat, DecodeError, ImageDecoder, ImageDimensions, RowBand, RowSink},
    frame::DitherScratch,
};
use log::{debug, info};

/// TJPGD work pool. Covers Huffman and quantisation tables plus one MCU.
pub const JPEG_WORK_BYTES: usize = 8192;
/// Opaque `JDEC` state.
pub const JPEG_DECODER_BYTES: usize = 1536;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
struct JpegRect {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

/// Decoder memory, allocated once and reused by every decode.
pub struct JpegWorkspace {
    decoder_state: [u32; JPEG_DECODER_BYTES / core::mem::size_of::<u32>()],
    work: [u8; JPEG_WORK_BYTES],
}

impl JpegWorkspace {
    pub const fn new() -> Self {
        Self {
            decoder_state: [0; JPEG_DECODER_BYTES / core::mem::size_of::<u32>()],
            work: [0; JPEG_WORK_BYTES],
        }
    }
}

impl Default for JpegWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// State of the decode in flight, reached from the C callbacks.
struct DecodeContext<'a> {
    source: &'a [u8],
    position: usize,
    scratch: &'a mut DitherScratch,
    sink: &'a mut dyn RowSink,
    format: BandFormat,
    max_right: usize,
    max_bottom: usize,
    failure: Option<DecodeError>,
}

impl DecodeContext<'_> {
    fn read(&mut self, buff: *mut u8, want: usize) -> usize {
        let available = self.source.len().saturating_sub(self.position);
        let count = want.min(available);
        if count == 0 {
            return 0;
        }

        if !buff.is_null() {
            // SAFETY: TJPGD passes a writable buffer of at least `want` bytes.
            let out = unsafe { core::slice::from_raw_parts_mut(buff, count) };
            out.copy_from_slice(&self.source[self.position..self.position + count]);
        }
        self.position += count;
        count
    }

    fn emit(&mut self, rgb: &[u8], rect: JpegRect) -> bool {
        let left = rect.left as usize;
        let top = rect.top as usize;
        let block_w = (rect.right as usize).saturating_sub(left) + 1;
        let block_h = (rect.bottom as usize).saturating_sub(top) + 1;

        let stride = self.format.row_words(block_w);
        let Some(words) = self.scratch.band_mut(stride * block_h) else {
            self.failure = Some(DecodeError::Workspace);
            return false;
        };

        for by in 0..block_h {
            for bx in 0..block_w {
                let base = (by * block_w + bx) * 3;
                let (r, g, b) = (rgb[base], rgb[base + 1], rgb[base + 2]);
                match self.format {
                    BandFormat::Gray4Dithered => {
                        let level = dither_gray4(luma(r, g, b), left + bx, top + by);
                        put_gray4(words, stride, bx, by, level);
                    }
                    BandFormat::Rgb565 => words[by * stride + bx] = rgb888_to_rgb565(r, g, b),
                }
            }
        }

        self.max_right = self.max_right.max(rect.right as usize);
        self.max_bottom = self.max_bottom.max(rect.bottom as usize);

        let band = RowBand {
            x: rect.left,
            y: rect.top,
            width: block_w as u16,
            height: block_h as u16,
            stride,
            format: self.format,
            pixels: &*words,
        };
        if self.sink.consume(&band) {
            true
        } else {
            self.failure = Some(DecodeError::Interrupted);
            false
        }
    }
}

static mut JPEG_DECODE_CTX: *mut c_void = core::ptr::null_mut();

#[inline]
unsafe fn jpeg_ctx_load() -> *mut c_void {
    // SAFETY: Access is guarded by single-threaded decode guard discipline.
    unsafe { core::ptr::read(core::ptr::addr_of!(JPEG_DECODE_CTX)) }
}

#[inline]
unsafe fn jpeg_ctx_store(value: *mut c_void) {
    // SAFETY: Access is guarded by single-threaded decode guard discipline.
    unsafe { core::ptr::write(core::ptr::addr_of_mut!(JPEG_DECODE_CTX), value) }
}

struct JpegCallbackGuard;

impl JpegCallbackGuard {
    unsafe fn install(ctx: *mut c_void) -> Option<Self> {
        // SAFETY: Only one JPEG decode may own the global context.
        unsafe {
            if !jpeg_ctx_load().is_null() {
                return None;
            }
            jpeg_ctx_store(ctx);
        }
        Some(Self)
    }
}

impl Drop for JpegCallbackGuard {
    fn drop(&mut self) {
        // SAFETY: Clear global callback context on scope exit.
        unsafe { jpeg_ctx_store(core::ptr::null_mut()) }
    }
}

unsafe extern "C" {
    fn jd_prepare(
        jd: *mut c_void,
        infunc: Option<unsafe extern "C" fn(*mut c_void, *mut u8, u32) -> u32>,
        pool: *mut c_void,
        sz_pool: u32,
        device: *mut c_void,
    ) -> i32;

    fn jd_decomp(
        jd: *mut c_void,
        outfunc: Option<unsafe extern "C" fn(*mut c_void, *mut c_void, *mut JpegRect) -> u32>,
        scale: u8,
    ) -> i32;
}

const JDR_OK: i32 = 0;
const JDR_INTR: i32 = 1;
const JDR_INP: i32 = 2;
const JDR_MEM1: i32 = 3;
const JDR_MEM2: i32 = 4;
const JDR_PAR: i32 = 5;
const JDR_FMT1: i32 = 6;
const JDR_FMT2: i32 = 7;
const JDR_FMT3: i32 = 8;

fn jpeg_jdr_name(status: i32) -> &'static str {
    match status {
        JDR_OK => "ok",
        JDR_INTR => "intr",
        JDR_INP => "inp",
        JDR_MEM1 => "mem1",
        JDR_MEM2 => "mem2",
        JDR_PAR => "par",
        JDR_FMT1 => "fmt1",
        JDR_FMT2 => "fmt2",
        JDR_FMT3 => "fmt3_progressive_or_unsupported",
        _ => "unknown",
    }
}

fn jdr_to_error(status: i32) -> DecodeError {
    match status {
        JDR_INTR => DecodeError::Interrupted,
        JDR_MEM1 | JDR_MEM2 => DecodeError::Workspace,
        JDR_FMT2 | JDR_FMT3 => DecodeError::UnsupportedFormat,
        _ => DecodeError::Malformed,
    }
}

unsafe extern "C" fn jpeg_in_callback(_jd: *mut c_void, buff: *mut u8, nbyte: u32) -> u32 {
    // SAFETY: Read callback context installed by JpegCallbackGuard.
    let ctx_ptr = unsafe { jpeg_ctx_load() } as *mut DecodeContext<'_>;
    if ctx_ptr.is_null() {
        return 0;
    }
    // SAFETY: The context outlives the decode that installed it.
    let ctx = unsafe { &mut *ctx_ptr };
    ctx.read(buff, nbyte as usize) as u32
}

unsafe extern "C" fn jpeg_out_callback(
    _jd: *mut c_void,
    bitmap: *mut c_void,
    rect: *mut JpegRect,
) -> u32 {
    if bitmap.is_null() || rect.is_null() {
        return 0;
    }

    // SAFETY: Read callback context installed by JpegCallbackGuard.
    let ctx_ptr = unsafe { jpeg_ctx_load() } as *mut DecodeContext<'_>;
    if ctx_ptr.is_null() {
        return 0;
    }
    // SAFETY: The context outlives the decode that installed it.
    let ctx = unsafe { &mut *ctx_ptr };

    // SAFETY: Decoder provides a valid rectangle pointer for callback duration.
    let rect = unsafe { *rect };
    if rect.right < rect.left || rect.bottom < rect.top {
        return 0;
    }

    // ESP32-S3 ROM TJPGD uses RGB888 output blocks.
    let block_w = (rect.right - rect.left) as usize + 1;
    let block_h = (rect.bottom - rect.top) as usize + 1;
    // SAFETY: TJPGD callback hands contiguous block bitmap bytes.
    let rgb = unsafe { core::slice::from_raw_parts(bitmap as *const u8, block_w * block_h * 3) };

    ctx.emit(rgb, rect) as u32
}

/// [`ImageDecoder`] backed by the ROM TJPGD.
pub struct RomJpegDecoder {
    workspace: &'static mut JpegWorkspace,
}

impl RomJpegDecoder {
    pub fn new(workspace: &'static mut JpegWorkspace) -> Self {
        Self { workspace }
    }
}

impl ImageDecoder for RomJpegDecoder {
    fn decode(
        &mut self,
        source: &[u8],
        scratch: &mut DitherScratch,
        format: BandFormat,
        sink: &mut dyn RowSink,
    ) -> Result<ImageDimensions, DecodeError> {
        let mut ctx = DecodeContext {
            source,
            position: 0,
            scratch,
            sink,
            format,
            max_right: 0,
            max_bottom: 0,
            failure: None,
        };

        // SAFETY: The guard clears the context before `ctx` goes out of scope.
        let Some(_guard) =
            (unsafe { JpegCallbackGuard::install((&mut ctx as *mut DecodeContext<'_>).cast()) })
        else {
            info!("jpeg: decode refused reason=callback_busy");
            return Err(DecodeError::Busy);
        };

        let workspace = &mut *self.workspace;
        // SAFETY: ROM TJPGD expects opaque state pointer + callbacks + work pool.
        let prep = unsafe {
            jd_prepare(
                workspace.decoder_state.as_mut_ptr() as *mut c_void,
                Some(jpeg_in_callback),
                workspace.work.as_mut_ptr() as *mut c_void,
                JPEG_WORK_BYTES as u32,
                core::ptr::null_mut(),
            )
        };
        if prep != JDR_OK {
            info!(
                "jpeg: decode fail stage=jd_prepare status={} kind={}",
                prep,
                jpeg_jdr_name(prep)
            );
            return Err(jdr_to_error(prep));
        }

        // Scale=0 keeps full source resolution.
        // SAFETY: Decoder state is initialized by jd_prepare.
        let decomp = unsafe {
            jd_decomp(
                workspace.decoder_state.as_mut_ptr() as *mut c_void,
                Some(jpeg_out_callback),
                0,
            )
        };
        if decomp != JDR_OK {
            info!(
                "jpeg: decode fail stage=jd_decomp status={} kind={}",
                decomp,
                jpeg_jdr_name(decomp)
            );
            return Err(ctx.failure.unwrap_or_else(|| jdr_to_error(decomp)));
        }

        let dimensions = ImageDimensions {
            width: (ctx.max_right + 1) as u16,
            height: (ctx.max_bottom + 1) as u16,
        };
        debug!(
            "jpeg: decoded {}x{} consumed={}/{}",
            dimensions.width,
            dimensions.height,
            ctx.position,
            source.len()
        );
        Ok(dimensions)
    }
}
