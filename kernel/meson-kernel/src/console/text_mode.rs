//! Hardware text-mode console driver.
//!
//! Renders cells as classic 16-colour attribute/character word pairs.
//! On the kernel target the word buffer is the VGA text window at
//! `0xB8000` and the cursor is programmed through the CRTC registers;
//! on the host the driver renders into an owned buffer, which the tests
//! inspect.

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use super::{Cell, ConsoleColor, ConsoleDriver, TextArea};
use crate::status::Status;

/// CRTC index port.
#[cfg(target_os = "none")]
const CRTC_INDEX: u16 = 0x3D4;
/// CRTC data port.
#[cfg(target_os = "none")]
const CRTC_DATA: u16 = 0x3D5;

/// Text-mode console backend.
pub struct TextModeConsole {
    /// Rendered attribute/character words, row-major.
    buffer: Vec<u16>,
    /// When set, rendering also lands in the VGA window.
    #[cfg(target_os = "none")]
    vga: Option<*mut u16>,
}

// SAFETY: the VGA pointer is only touched under the console lock.
#[cfg(target_os = "none")]
unsafe impl Send for TextModeConsole {}

impl TextModeConsole {
    /// Create a driver rendering into an owned buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            #[cfg(target_os = "none")]
            vga: None,
        }
    }

    /// Create a driver bound to the VGA text window.
    ///
    /// # Safety
    ///
    /// `window` must be a mapping of the `0xB8000` text buffer large
    /// enough for the console geometry.
    #[cfg(target_os = "none")]
    #[must_use]
    pub unsafe fn with_vga_window(window: *mut u16) -> Self {
        Self {
            buffer: Vec::new(),
            vga: Some(window),
        }
    }

    fn encode(cell: Cell) -> u16 {
        let attr = u16::from(cell.bg.code()) << 4 | u16::from(cell.fg.code());
        (attr << 8) | u16::from(cell.ch)
    }

    /// The rendered word at a cell position; used by tests and by the
    /// screen-shot path.
    #[must_use]
    pub fn word_at(&self, area: &TextArea, row: u16, column: u16) -> u16 {
        self.buffer[row as usize * area.columns as usize + column as usize]
    }

    fn render(&mut self, area: &TextArea) {
        let cells = area.cells();
        if self.buffer.len() != cells.len() {
            self.buffer = vec![0u16; cells.len()];
        }
        for (word, &cell) in self.buffer.iter_mut().zip(cells) {
            *word = Self::encode(cell);
        }

        #[cfg(target_os = "none")]
        if let Some(window) = self.vga {
            for (index, &word) in self.buffer.iter().enumerate() {
                // SAFETY: constructor contract covers the geometry.
                unsafe { core::ptr::write_volatile(window.add(index), word) };
            }
        }
    }

    fn move_hardware_cursor(&self, area: &TextArea) {
        #[cfg(target_os = "none")]
        {
            let address = area.cursor_address() as u16;
            let index = crate::arch::Port::<u8>::new(CRTC_INDEX);
            let data = crate::arch::Port::<u8>::new(CRTC_DATA);
            // SAFETY: standard CRTC cursor-location register protocol.
            unsafe {
                index.write(0x0E);
                data.write((address >> 8) as u8);
                index.write(0x0F);
                data.write(address as u8);
            }
        }
        #[cfg(not(target_os = "none"))]
        let _ = area;
    }
}

impl Default for TextModeConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleDriver for TextModeConsole {
    fn init(&mut self, area: &mut TextArea) -> Result<(), Status> {
        self.render(area);
        self.move_hardware_cursor(area);
        Ok(())
    }

    fn get_cursor_address(&self, area: &TextArea) -> u32 {
        area.cursor_address()
    }

    fn set_cursor_address(&mut self, area: &mut TextArea, row: u16, column: u16) {
        area.set_cursor(row, column);
        self.move_hardware_cursor(area);
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
        self.move_hardware_cursor(area);
    }

    fn delete_char(&mut self, area: &mut TextArea) {
        area.delete_char();
        self.render(area);
        self.move_hardware_cursor(area);
    }

    fn screen_draw(&mut self, area: &mut TextArea) {
        self.render(area);
        self.move_hardware_cursor(area);
    }

    fn screen_clear(&mut self, area: &mut TextArea) {
        area.clear();
        self.render(area);
        self.move_hardware_cursor(area);
    }

    fn screen_save(&mut self, area: &mut TextArea) {
        area.save_screen();
    }

    fn screen_restore(&mut self, area: &mut TextArea) {
        area.restore_screen();
        self.render(area);
    }
}
