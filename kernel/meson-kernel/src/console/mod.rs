//! Text console abstraction.
//!
//! A [`TextArea`] holds everything a console needs that is independent
//! of the output device: geometry, cursor, colours, the character cells
//! with scrollback history, and the keyboard input stream. A
//! [`ConsoleDriver`] renders the cells onto actual hardware; the
//! hardware text-mode driver and the framebuffer driver implement the
//! same operation set, so [`switch_to_graphics`] can rebind the active
//! console mid-flight without losing buffered content.

extern crate alloc;

pub mod font;
pub mod framebuffer;
pub mod keymap;
pub mod text_mode;

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::status::Status;
use crate::sync::SpinLock;

/// The 16 standard text-mode colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConsoleColor {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGrey = 7,
    DarkGrey = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightMagenta = 13,
    Yellow = 14,
    White = 15,
}

impl ConsoleColor {
    /// The 4-bit hardware attribute code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a colour from its 4-bit code.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code & 0xF {
            0 => Self::Black,
            1 => Self::Blue,
            2 => Self::Green,
            3 => Self::Cyan,
            4 => Self::Red,
            5 => Self::Magenta,
            6 => Self::Brown,
            7 => Self::LightGrey,
            8 => Self::DarkGrey,
            9 => Self::LightBlue,
            10 => Self::LightGreen,
            11 => Self::LightCyan,
            12 => Self::LightRed,
            13 => Self::LightMagenta,
            14 => Self::Yellow,
            _ => Self::White,
        }
    }
}

/// One character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// The character (code page 437 byte).
    pub ch: u8,
    /// Foreground colour.
    pub fg: ConsoleColor,
    /// Background colour.
    pub bg: ConsoleColor,
}

impl Cell {
    /// A blank cell in the given colours.
    #[must_use]
    pub fn blank(fg: ConsoleColor, bg: ConsoleColor) -> Self {
        Self { ch: b' ', fg, bg }
    }
}

/// Keyboard input queue with echo control.
///
/// Characters arrive one at a time from the keyboard driver. When echo
/// is on, each accepted character is also printed to the owning console.
pub struct TextInput {
    queue: VecDeque<u8>,
    echo: bool,
}

impl TextInput {
    const CAPACITY: usize = 256;

    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            echo: true,
        }
    }

    /// Whether accepted characters are echoed to the output.
    #[must_use]
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Turn echo on or off.
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// The number of buffered characters.
    #[must_use]
    pub fn count(&self) -> usize {
        self.queue.len()
    }

    /// Append one character; drops input when the queue is full.
    pub fn append(&mut self, ch: u8) {
        if self.queue.len() < Self::CAPACITY {
            self.queue.push_back(ch);
        }
    }

    /// Take the oldest character.
    pub fn getc(&mut self) -> Option<u8> {
        self.queue.pop_front()
    }

    /// Take up to `max` characters.
    pub fn read(&mut self, max: usize) -> Vec<u8> {
        let take = max.min(self.queue.len());
        self.queue.drain(..take).collect()
    }

    /// Drop the oldest character.
    pub fn remove(&mut self) {
        self.queue.pop_front();
    }

    /// Drop everything.
    pub fn remove_all(&mut self) {
        self.queue.clear();
    }
}

/// Device-independent console state.
pub struct TextArea {
    /// Character columns.
    pub columns: u16,
    /// Character rows.
    pub rows: u16,
    /// Cursor column, 0-based.
    pub cursor_column: u16,
    /// Cursor row, 0-based.
    pub cursor_row: u16,
    /// Whether the cursor is drawn.
    pub cursor_visible: bool,
    /// Current foreground colour.
    pub foreground: ConsoleColor,
    /// Current background colour.
    pub background: ConsoleColor,
    /// Visible character cells, row-major, `columns * rows` long.
    cells: Vec<Cell>,
    /// Scrolled-off rows, oldest first, bounded by `scroll_back_lines`.
    scrollback: VecDeque<Vec<Cell>>,
    /// Maximum scrollback depth in rows.
    pub scroll_back_lines: usize,
    /// Saved screen for [`ConsoleDriver::screen_save`].
    saved: Option<Vec<Cell>>,
    /// Keyboard input stream.
    pub input: TextInput,
}

impl TextArea {
    /// Create a console area of the given geometry.
    #[must_use]
    pub fn new(columns: u16, rows: u16, scroll_back_lines: usize) -> Self {
        let fg = ConsoleColor::LightGrey;
        let bg = ConsoleColor::Black;
        Self {
            columns,
            rows,
            cursor_column: 0,
            cursor_row: 0,
            cursor_visible: true,
            foreground: fg,
            background: bg,
            cells: vec![Cell::blank(fg, bg); columns as usize * rows as usize],
            scrollback: VecDeque::new(),
            scroll_back_lines,
            saved: None,
            input: TextInput::new(),
        }
    }

    /// The visible cells, row-major.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// The cell at a position.
    #[must_use]
    pub fn cell_at(&self, row: u16, column: u16) -> Cell {
        self.cells[row as usize * self.columns as usize + column as usize]
    }

    /// The linear cell index of the cursor.
    #[must_use]
    pub fn cursor_address(&self) -> u32 {
        u32::from(self.cursor_row) * u32::from(self.columns) + u32::from(self.cursor_column)
    }

    /// Place the cursor, clamped to the geometry.
    pub fn set_cursor(&mut self, row: u16, column: u16) {
        self.cursor_row = row.min(self.rows - 1);
        self.cursor_column = column.min(self.columns - 1);
    }

    /// Scroll one row into the history.
    fn scroll_up(&mut self) {
        let cols = self.columns as usize;
        let top: Vec<Cell> = self.cells[..cols].to_vec();
        if self.scroll_back_lines > 0 {
            if self.scrollback.len() == self.scroll_back_lines {
                self.scrollback.pop_front();
            }
            self.scrollback.push_back(top);
        }
        self.cells.copy_within(cols.., 0);
        let blank = Cell::blank(self.foreground, self.background);
        let len = self.cells.len();
        self.cells[len - cols..].fill(blank);
    }

    /// Number of rows currently held in the scrollback history.
    #[must_use]
    pub fn scrollback_rows(&self) -> usize {
        self.scrollback.len()
    }

    /// Write one character at the cursor, handling control characters
    /// and scrolling.
    pub fn put_char(&mut self, ch: u8) {
        match ch {
            b'\n' => {
                self.cursor_column = 0;
                self.advance_row();
            }
            b'\r' => self.cursor_column = 0,
            b'\t' => {
                // Expand to the next 8-column stop.
                let stop = 8 - (self.cursor_column % 8);
                for _ in 0..stop {
                    self.put_char(b' ');
                }
            }
            ch => {
                let index =
                    self.cursor_row as usize * self.columns as usize + self.cursor_column as usize;
                self.cells[index] = Cell {
                    ch,
                    fg: self.foreground,
                    bg: self.background,
                };
                self.cursor_column += 1;
                if self.cursor_column >= self.columns {
                    self.cursor_column = 0;
                    self.advance_row();
                }
            }
        }
    }

    fn advance_row(&mut self) {
        if self.cursor_row + 1 >= self.rows {
            self.scroll_up();
        } else {
            self.cursor_row += 1;
        }
    }

    /// Write a string at the cursor.
    pub fn put_str(&mut self, text: &str) {
        for &byte in text.as_bytes() {
            self.put_char(byte);
        }
    }

    /// Erase the character before the cursor and back up over it.
    pub fn delete_char(&mut self) {
        if self.cursor_column == 0 {
            if self.cursor_row == 0 {
                return;
            }
            self.cursor_row -= 1;
            self.cursor_column = self.columns - 1;
        } else {
            self.cursor_column -= 1;
        }
        let index = self.cursor_row as usize * self.columns as usize + self.cursor_column as usize;
        self.cells[index] = Cell::blank(self.foreground, self.background);
    }

    /// Blank the screen and home the cursor.
    pub fn clear(&mut self) {
        let blank = Cell::blank(self.foreground, self.background);
        self.cells.fill(blank);
        self.cursor_column = 0;
        self.cursor_row = 0;
    }

    /// Keep a copy of the visible cells.
    pub fn save_screen(&mut self) {
        self.saved = Some(self.cells.clone());
    }

    /// Bring back the last saved copy, if any.
    pub fn restore_screen(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.cells = saved;
        }
    }

    /// The visible content of one row as a string, trailing blanks
    /// trimmed.
    #[must_use]
    pub fn row_text(&self, row: u16) -> String {
        let cols = self.columns as usize;
        let start = row as usize * cols;
        let bytes: Vec<u8> = self.cells[start..start + cols].iter().map(|c| c.ch).collect();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        String::from(text.trim_end())
    }
}

/// The rendering half of a console: one implementation per output
/// device.
pub trait ConsoleDriver: Send {
    /// Prepare the device for this area's geometry.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Invalid`] if the device cannot show the area.
    fn init(&mut self, area: &mut TextArea) -> Result<(), Status>;

    /// The device's notion of the cursor position as a linear index.
    fn get_cursor_address(&self, area: &TextArea) -> u32;

    /// Move the cursor.
    fn set_cursor_address(&mut self, area: &mut TextArea, row: u16, column: u16);

    /// Change the drawing foreground.
    fn set_foreground(&mut self, area: &mut TextArea, color: ConsoleColor);

    /// Change the drawing background.
    fn set_background(&mut self, area: &mut TextArea, color: ConsoleColor);

    /// Print text at the cursor.
    fn print(&mut self, area: &mut TextArea, text: &str);

    /// Erase the character before the cursor.
    fn delete_char(&mut self, area: &mut TextArea);

    /// Redraw the whole screen from the area's cells.
    fn screen_draw(&mut self, area: &mut TextArea);

    /// Clear the screen.
    fn screen_clear(&mut self, area: &mut TextArea);

    /// Save the visible screen.
    fn screen_save(&mut self, area: &mut TextArea);

    /// Restore the saved screen.
    fn screen_restore(&mut self, area: &mut TextArea);
}

/// The active console: state plus its bound driver.
pub struct Console {
    /// Device-independent state.
    pub area: TextArea,
    driver: Box<dyn ConsoleDriver>,
}

impl Console {
    /// Print through the bound driver.
    pub fn print(&mut self, text: &str) {
        self.driver.print(&mut self.area, text);
    }

    /// Erase the character before the cursor through the bound driver.
    pub fn delete_char(&mut self) {
        self.driver.delete_char(&mut self.area);
    }

    /// Clear the screen through the bound driver.
    pub fn clear_screen(&mut self) {
        self.driver.screen_clear(&mut self.area);
    }

    /// Move the cursor through the bound driver.
    pub fn set_cursor(&mut self, row: u16, column: u16) {
        self.driver.set_cursor_address(&mut self.area, row, column);
    }

    /// Change the foreground colour through the bound driver.
    pub fn set_foreground(&mut self, color: ConsoleColor) {
        self.driver.set_foreground(&mut self.area, color);
    }

    /// Change the background colour through the bound driver.
    pub fn set_background(&mut self, color: ConsoleColor) {
        self.driver.set_background(&mut self.area, color);
    }
}

static CONSOLE: SpinLock<Option<Console>> = SpinLock::new(None);

/// Install the console with its first driver.
///
/// # Errors
///
/// Propagates the driver's init failure.
pub fn init(mut area: TextArea, mut driver: Box<dyn ConsoleDriver>) -> Result<(), Status> {
    driver.init(&mut area)?;
    let mut console = CONSOLE.lock();
    *console = Some(Console { area, driver });
    Ok(())
}

/// Run a closure against the active console.
///
/// # Errors
///
/// Returns [`Status::NotInitialized`] before [`init`].
pub fn with_console<R>(f: impl FnOnce(&mut Console) -> R) -> Result<R, Status> {
    let mut console = CONSOLE.lock();
    match console.as_mut() {
        Some(console) => Ok(f(console)),
        None => Err(Status::NotInitialized),
    }
}

/// Print to the active console. Quietly does nothing before `init`.
pub fn print(text: &str) {
    let _ = with_console(|console| console.driver.print(&mut console.area, text));
}

/// Feed one input character to the active console.
///
/// When echo is enabled the character is also printed.
pub fn input_char(ch: u8) {
    let _ = with_console(|console| {
        console.area.input.append(ch);
        if console.area.input.echo() {
            let bytes = [ch];
            if let Ok(text) = core::str::from_utf8(&bytes) {
                console.driver.print(&mut console.area, text);
            }
        }
    });
}

/// Rebind the active console to a new (graphics) driver.
///
/// The area's cells carry the buffered content across, so the switch
/// redraws the same text on the new device.
///
/// # Errors
///
/// Returns [`Status::NotInitialized`] before [`init`], or the new
/// driver's init failure.
pub fn switch_to_graphics(mut new_driver: Box<dyn ConsoleDriver>) -> Result<(), Status> {
    let mut console = CONSOLE.lock();
    let console = console.as_mut().ok_or(Status::NotInitialized)?;
    new_driver.init(&mut console.area)?;
    console.driver = new_driver;
    console.driver.screen_draw(&mut console.area);
    Ok(())
}

/// A [`LogSink`](crate::log::LogSink) writing to the active console.
pub struct ConsoleSink {
    max_level: crate::log::LogLevel,
}

impl ConsoleSink {
    /// Create a sink passing messages at or below `max_level`.
    #[must_use]
    pub fn new(max_level: crate::log::LogLevel) -> Self {
        Self { max_level }
    }
}

impl crate::log::LogSink for ConsoleSink {
    fn write_str(&self, s: &str) {
        print(s);
    }

    fn max_level(&self) -> crate::log::LogLevel {
        self.max_level
    }

    fn name(&self) -> &str {
        "console"
    }
}
