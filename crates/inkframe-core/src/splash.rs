//! Startup screen listing the files found on the card.

use ed060xc3::FrameBuffer;
use embedded_graphics::{
    mono_font::{MonoTextStyle, ascii::FONT_10X20},
    pixelcolor::{Gray4, GrayColor},
    prelude::*,
    text::{Baseline, Text},
};

pub const LISTING_TITLE: &str = "Directory listing:";

const MARGIN_X: i32 = 16;
const MARGIN_Y: i32 = 16;
const INDENT_X: i32 = 16;
const LINE_HEIGHT: i32 = 24;

/// Draws the title and one line per name, stopping at the bottom edge.
///
/// Returns how many names fit.
pub fn draw_listing<'a>(frame: &mut FrameBuffer, names: impl Iterator<Item = &'a str>) -> usize {
    let style = MonoTextStyle::new(&FONT_10X20, Gray4::BLACK);
    let (_, height) = frame.logical_size();
    let bottom = height as i32 - MARGIN_Y;

    let mut y = MARGIN_Y;
    let _ = Text::with_baseline(LISTING_TITLE, Point::new(MARGIN_X, y), style, Baseline::Top)
        .draw(frame);

    let mut drawn = 0;
    for name in names {
        y += LINE_HEIGHT;
        if y + LINE_HEIGHT > bottom {
            break;
        }
        let _ = Text::with_baseline(name, Point::new(MARGIN_X + INDENT_X, y), style, Baseline::Top)
            .draw(frame);
        drawn += 1;
    }

    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed060xc3::{Rotation, panel};

    fn dark_pixels_in_rows(frame: &FrameBuffer, rows: core::ops::Range<usize>) -> usize {
        let (width, _) = frame.logical_size();
        rows.flat_map(|y| (0..width).map(move |x| (x, y)))
            .filter(|&(x, y)| frame.pixel(x, y).is_some_and(|level| level < 0x80))
            .count()
    }

    #[test]
    fn listing_draws_title_and_names() {
        let mut frame = FrameBuffer::try_new(Rotation::Landscape).unwrap();

        let drawn = draw_listing(&mut frame, ["a.jpg", "b.jpg"].into_iter());

        assert_eq!(drawn, 2);
        assert!(dark_pixels_in_rows(&frame, 16..40) > 0);
        assert!(dark_pixels_in_rows(&frame, 64..88) > 0);
        assert_eq!(dark_pixels_in_rows(&frame, 100..140), 0);
    }

    #[test]
    fn listing_stops_at_bottom_edge() {
        let mut frame = FrameBuffer::try_new(Rotation::Landscape).unwrap();
        let names = ["x.jpg"; 64];

        let drawn = draw_listing(&mut frame, names.into_iter());

        assert!(drawn < names.len());
        assert!(drawn as i32 * LINE_HEIGHT <= panel::HEIGHT as i32);
    }
}
