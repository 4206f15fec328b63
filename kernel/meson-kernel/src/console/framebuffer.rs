//! Framebuffer console driver.
//!
//! Renders cells as glyphs from a bound VBF font into a 32-bit pixel
//! buffer. On the kernel target the buffer is the linear framebuffer
//! the boot loader handed over; on the host it is owned memory that the
//! tests inspect pixel by pixel.

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use meson_vbf::VbfFont;

use super::{ConsoleColor, ConsoleDriver, TextArea};
use crate::status::Status;

/// Map a console colour to its ARGB value.
fn argb(color: ConsoleColor) -> u32 {
    match color {
        ConsoleColor::Black => 0x0000_0000,
        ConsoleColor::Blue => 0x0000_00AA,
        ConsoleColor::Green => 0x0000_AA00,
        ConsoleColor::Cyan => 0x0000_AAAA,
        ConsoleColor::Red => 0x00AA_0000,
        ConsoleColor::Magenta => 0x00AA_00AA,
        ConsoleColor::Brown => 0x00AA_5500,
        ConsoleColor::LightGrey => 0x00AA_AAAA,
        ConsoleColor::DarkGrey => 0x0055_5555,
        ConsoleColor::LightBlue => 0x0055_55FF,
        ConsoleColor::LightGreen => 0x0055_FF55,
        ConsoleColor::LightCyan => 0x0055_FFFF,
        ConsoleColor::LightRed => 0x00FF_5555,
        ConsoleColor::LightMagenta => 0x00FF_55FF,
        ConsoleColor::Yellow => 0x00FF_FF55,
        ConsoleColor::White => 0x00FF_FFFF,
    }
}

/// Framebuffer console backend.
pub struct FramebufferConsole {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    font: VbfFont,
}

impl FramebufferConsole {
    /// Create a driver for a `width x height` pixel buffer using `font`.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Invalid`] for a zero-sized buffer.
    pub fn new(width: u32, height: u32, font: VbfFont) -> Result<Self, Status> {
        if width == 0 || height == 0 {
            return Err(Status::Invalid);
        }
        Ok(Self {
            width,
            height,
            pixels: vec![0u32; (width * height) as usize],
            font,
        })
    }

    /// How many character columns and rows fit on this framebuffer with
    /// the bound font.
    #[must_use]
    pub fn text_geometry(&self) -> (u16, u16) {
        (
            (self.width / self.font.glyph_width) as u16,
            (self.height / self.font.glyph_height) as u16,
        )
    }

    /// The pixel at `(x, y)`; used by tests and the screen-shot path.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }

    fn draw_cell(&mut self, area: &TextArea, row: u16, column: u16) {
        let cell = area.cell_at(row, column);
        let gw = self.font.glyph_width;
        let gh = self.font.glyph_height;
        let origin_x = u32::from(column) * gw;
        let origin_y = u32::from(row) * gh;
        let fg = argb(cell.fg);
        let bg = argb(cell.bg);

        for gy in 0..gh {
            for gx in 0..gw {
                let on = self.font.pixel(u32::from(cell.ch), gx, gy);
                let x = origin_x + gx;
                let y = origin_y + gy;
                if x < self.width && y < self.height {
                    self.pixels[(y * self.width + x) as usize] = if on { fg } else { bg };
                }
            }
        }
    }

    fn render(&mut self, area: &TextArea) {
        for row in 0..area.rows {
            for column in 0..area.columns {
                self.draw_cell(area, row, column);
            }
        }
    }
}

impl ConsoleDriver for FramebufferConsole {
    fn init(&mut self, area: &mut TextArea) -> Result<(), Status> {
        let (columns, rows) = self.text_geometry();
        if area.columns > columns || area.rows > rows {
            return Err(Status::Invalid);
        }
        self.render(area);
        Ok(())
    }

    fn get_cursor_address(&self, area: &TextArea) -> u32 {
        area.cursor_address()
    }

    fn set_cursor_address(&mut self, area: &mut TextArea, row: u16, column: u16) {
        area.set_cursor(row, column);
    }

    fn set_foreground(&mut self, area: &mut TextArea, color: ConsoleColor) {
        area.foreground = color;
    }

    fn set_background(&mut self, area: &mut TextArea, color: ConsoleColor) {
        area.background = color;
    }

    fn print(&mut self, area: &mut TextArea, text: &str) {
        area.put_str(text);
        self.render(area);
    }

    fn delete_char(&mut self, area: &mut TextArea) {
        area.delete_char();
        self.render(area);
    }

    fn screen_draw(&mut self, area: &mut TextArea) {
        self.render(area);
    }

    fn screen_clear(&mut self, area: &mut TextArea) {
        area.clear();
        self.render(area);
    }

    fn screen_save(&mut self, area: &mut TextArea) {
        area.save_screen();
    }

    fn screen_restore(&mut self, area: &mut TextArea) {
        area.restore_screen();
        self.render(area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An 8x8 font with a solid block for 'X' and nothing else set.
    fn block_font() -> VbfFont {
        let mut font = VbfFont::new("test8x8", 8, 8, 8).unwrap();
        let solid = vec![0xFFu8; font.bytes_per_glyph()];
        font.set_glyph(u32::from('X'), &solid).unwrap();
        let empty = vec![0x00u8; font.bytes_per_glyph()];
        font.set_glyph(u32::from(' '), &empty).unwrap();
        font
    }

    #[test]
    fn geometry_derives_from_font() {
        let driver = FramebufferConsole::new(640, 480, block_font()).unwrap();
        assert_eq!(driver.text_geometry(), (80, 60));
    }

    #[test]
    fn printed_glyph_lands_in_pixels() {
        let mut area = TextArea::new(4, 2, 0);
        let mut driver = FramebufferConsole::new(32, 16, block_font()).unwrap();
        driver.init(&mut area).unwrap();

        driver.set_foreground(&mut area, ConsoleColor::White);
        driver.print(&mut area, "X");

        // Every pixel of the first glyph cell is foreground.
        assert_eq!(driver.pixel(0, 0), argb(ConsoleColor::White));
        assert_eq!(driver.pixel(7, 7), argb(ConsoleColor::White));
        // The neighbouring cell stays background.
        assert_eq!(driver.pixel(8, 0), argb(ConsoleColor::Black));
    }

    #[test]
    fn area_larger_than_framebuffer_is_rejected() {
        let mut area = TextArea::new(100, 100, 0);
        let mut driver = FramebufferConsole::new(64, 64, block_font()).unwrap();
        assert!(matches!(driver.init(&mut area), Err(Status::Invalid)));
    }

    #[test]
    fn switch_keeps_buffered_text() {
        // Drive the area with the text-mode driver, then redraw the
        // same cells through the framebuffer driver.
        use super::super::text_mode::TextModeConsole;

        let mut area = TextArea::new(4, 2, 0);
        let mut text = TextModeConsole::new();
        text.init(&mut area).unwrap();
        text.set_foreground(&mut area, ConsoleColor::White);
        text.print(&mut area, "X");

        let mut fb = FramebufferConsole::new(32, 16, block_font()).unwrap();
        fb.init(&mut area).unwrap();
        fb.screen_draw(&mut area);
        assert_eq!(fb.pixel(0, 0), argb(ConsoleColor::White));
    }
}
