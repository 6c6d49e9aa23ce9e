//! Character-cell console writer for VGA text mode.
//!
//! The screen is a grid of [`WIDTH`] x [`HEIGHT`] cells. Each cell is a
//! 16-bit value holding a character byte in the low half and a color
//! attribute (foreground in bits 8..12, background in bits 12..16) in the
//! high half.
//!
//! [`Writer`] keeps a cursor over the grid. Writing a character stores it at
//! the cursor and advances the cursor to the next column, then the next row,
//! and from the bottom row back to the top. The screen never scrolls.
//!
//! # Example
//!
//! ```
//! use vga_text::{CELL_COUNT, Color, ColorCode, Writer};
//!
//! let mut writer = Writer::new([0u16; CELL_COUNT]);
//! writer.initialize();
//! writer.set_color(ColorCode::new(Color::Yellow, Color::Blue));
//! writer.write_string(b"hi");
//!
//! assert_eq!(writer.cursor(), (0, 2));
//! assert_eq!(writer.buffer()[0], 0x1e00 | u16::from(b'h'));
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use core::{fmt, ptr};

/// Number of columns on the screen.
pub const WIDTH: usize = 80;
/// Number of rows on the screen.
pub const HEIGHT: usize = 25;
/// Number of cells on the screen.
pub const CELL_COUNT: usize = WIDTH * HEIGHT;
/// Physical address of the text-mode frame buffer.
pub const BUFFER_ADDR: usize = 0xb8000;

/// The 16 colors of the text-mode palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightMagenta = 13,
    Yellow = 14,
    White = 15,
}

/// A foreground/background color pair, packed into one attribute byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl fmt::Debug for ColorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ColorCode(fg={}, bg={})",
            self.foreground(),
            self.background()
        )
    }
}

impl Default for ColorCode {
    fn default() -> Self {
        Self::new(Color::LightGray, Color::Black)
    }
}

impl ColorCode {
    #[must_use]
    pub const fn new(fg: Color, bg: Color) -> Self {
        Self::from_raw(fg as u8, bg as u8)
    }

    /// Creates a color pair from raw palette indices.
    ///
    /// Each index is masked to its low 4 bits.
    #[must_use]
    pub const fn from_raw(fg: u8, bg: u8) -> Self {
        Self((fg & 0x0f) | (bg & 0x0f) << 4)
    }

    #[must_use]
    pub const fn foreground(self) -> u8 {
        self.0 & 0x0f
    }

    #[must_use]
    pub const fn background(self) -> u8 {
        self.0 >> 4
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Encodes `byte` drawn in `color` as a cell value.
#[must_use]
pub const fn cell(byte: u8, color: ColorCode) -> u16 {
    (byte as u16) | (color.bits() as u16) << 8
}

/// Storage for the screen cells.
pub trait CellBuffer {
    /// Stores `cell` at `index` (row-major, `row * WIDTH + column`).
    ///
    /// `index` is always below [`CELL_COUNT`].
    fn write_cell(&mut self, index: usize, cell: u16);
}

impl CellBuffer for [u16; CELL_COUNT] {
    fn write_cell(&mut self, index: usize, cell: u16) {
        self[index] = cell;
    }
}

/// The memory-mapped text-mode frame buffer.
#[derive(derive_more::Debug)]
pub struct MmioBuffer {
    #[debug("{:#x}", base_addr)]
    base_addr: usize,
}

impl MmioBuffer {
    /// Creates a buffer writing to `base_addr..base_addr + 2 * CELL_COUNT`.
    ///
    /// # Safety
    ///
    /// The range must be a text-mode frame buffer (or memory standing in for
    /// one), aligned to 2 bytes, that nothing else writes while the buffer
    /// is alive.
    #[must_use]
    pub const unsafe fn new(base_addr: usize) -> Self {
        Self { base_addr }
    }
}

impl CellBuffer for MmioBuffer {
    fn write_cell(&mut self, index: usize, cell: u16) {
        assert!(index < CELL_COUNT);
        let addr = self.base_addr + index * size_of::<u16>();
        unsafe {
            ptr::with_exposed_provenance_mut::<u16>(addr).write_volatile(cell);
        }
    }
}

/// Cursor-based writer over a [`CellBuffer`].
#[derive(Debug)]
pub struct Writer<B> {
    buffer: B,
    row: usize,
    column: usize,
    color: ColorCode,
}

impl<B> Writer<B>
where
    B: CellBuffer,
{
    /// Creates a writer with the cursor at the origin and the default color.
    ///
    /// The buffer is not touched until [`initialize`](Self::initialize) or
    /// the first write.
    pub const fn new(buffer: B) -> Self {
        Self {
            buffer,
            row: 0,
            column: 0,
            color: ColorCode::new(Color::LightGray, Color::Black),
        }
    }

    /// Fills the screen with blanks in the default color and moves the
    /// cursor to the origin.
    pub fn initialize(&mut self) {
        self.row = 0;
        self.column = 0;
        self.color = ColorCode::default();
        let blank = cell(b' ', self.color);
        for index in 0..CELL_COUNT {
            self.buffer.write_cell(index, blank);
        }
    }

    pub fn set_color(&mut self, color: ColorCode) {
        self.color = color;
    }

    #[must_use]
    pub fn color(&self) -> ColorCode {
        self.color
    }

    /// Returns the cursor position as `(row, column)`.
    #[must_use]
    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.column)
    }

    #[must_use]
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Writes `byte` at the cursor and advances the cursor.
    ///
    /// `b'\n'` writes nothing and moves the cursor to the start of the next
    /// row.
    pub fn write_char(&mut self, byte: u8) {
        if byte == b'\n' {
            self.new_line();
            return;
        }
        let index = self.row * WIDTH + self.column;
        self.buffer.write_cell(index, cell(byte, self.color));

        self.column += 1;
        if self.column == WIDTH {
            self.new_line();
        }
    }

    pub fn write_string(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_char(byte);
        }
    }

    fn new_line(&mut self) {
        self.column = 0;
        self.row += 1;
        if self.row == HEIGHT {
            self.row = 0;
        }
    }
}

impl<B> fmt::Write for Writer<B>
where
    B: CellBuffer,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            match u8::try_from(ch) {
                Ok(byte @ (0x20..=0x7e | b'\n')) => self.write_char(byte),
                _ => self.write_char(0xfe),
            }
        }
        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use core::fmt::Write as _;

    use super::*;

    fn writer() -> Writer<Box<[u16; CELL_COUNT]>> {
        let mut writer = Writer::new(Box::new([0; CELL_COUNT]));
        writer.initialize();
        writer
    }

    impl CellBuffer for Box<[u16; CELL_COUNT]> {
        fn write_cell(&mut self, index: usize, cell: u16) {
            (**self).write_cell(index, cell);
        }
    }

    fn text(writer: &Writer<Box<[u16; CELL_COUNT]>>, row: usize, len: usize) -> Vec<u8> {
        writer.buffer()[row * WIDTH..][..len]
            .iter()
            .map(|&cell| cell.to_le_bytes()[0])
            .collect()
    }

    #[test]
    fn test_color_code() {
        let code = ColorCode::new(Color::White, Color::Red);
        assert_eq!(code.bits(), 0x4f);
        assert_eq!(code.foreground(), 15);
        assert_eq!(code.background(), 4);
        assert_eq!(ColorCode::default().bits(), 0x07);
    }

    #[test]
    fn test_color_code_masks_raw_values() {
        let code = ColorCode::from_raw(0x1f, 0xf2);
        assert_eq!(code.bits(), 0x2f);
        assert_eq!(format!("{code:?}"), "ColorCode(fg=15, bg=2)");
    }

    #[test]
    fn test_cell_encoding() {
        let code = ColorCode::new(Color::Green, Color::Black);
        assert_eq!(cell(b'A', code), 0x0241);
    }

    #[test]
    fn test_initialize_clears_screen() {
        let mut writer = Writer::new(Box::new([0xffff; CELL_COUNT]));
        writer.set_color(ColorCode::new(Color::Red, Color::Blue));
        writer.write_string(b"abc");
        writer.initialize();
        assert_eq!(writer.cursor(), (0, 0));
        assert_eq!(writer.color(), ColorCode::default());
        assert!(writer.buffer().iter().all(|&c| c == 0x0720));
    }

    #[test]
    fn test_write_advances_cursor() {
        let mut writer = writer();
        writer.write_string(b"hello");
        assert_eq!(writer.cursor(), (0, 5));
        assert_eq!(text(&writer, 0, 5), b"hello");
        assert_eq!(writer.buffer()[0] >> 8, 0x07);
    }

    #[test]
    fn test_set_color_applies_to_following_chars() {
        let mut writer = writer();
        writer.write_char(b'a');
        writer.set_color(ColorCode::new(Color::Yellow, Color::Black));
        writer.write_char(b'b');
        assert_eq!(writer.buffer()[0], 0x0761);
        assert_eq!(writer.buffer()[1], 0x0e62);
    }

    #[test]
    fn test_column_wraps_to_next_row() {
        let mut writer = writer();
        writer.write_string(&[b'x'; WIDTH]);
        assert_eq!(writer.cursor(), (1, 0));
        writer.write_char(b'y');
        assert_eq!(text(&writer, 1, 1), b"y");
    }

    #[test]
    fn test_row_wraps_to_top() {
        let mut writer = writer();
        writer.write_string(&[b'.'; CELL_COUNT]);
        assert_eq!(writer.cursor(), (0, 0));
        writer.write_char(b'z');
        assert_eq!(text(&writer, 0, 2), b"z.");
    }

    #[test]
    fn test_newline() {
        let mut writer = writer();
        writer.write_string(b"ab\ncd");
        assert_eq!(writer.cursor(), (1, 2));
        assert_eq!(text(&writer, 0, 3), b"ab ");
        assert_eq!(text(&writer, 1, 2), b"cd");

        for _ in 0..HEIGHT - 1 {
            writer.write_char(b'\n');
        }
        assert_eq!(writer.cursor(), (0, 0));
    }

    #[test]
    fn test_fmt_write_replaces_non_ascii() {
        let mut writer = writer();
        write!(writer, "a\u{e9}{}", 7).unwrap();
        assert_eq!(text(&writer, 0, 3), [b'a', 0xfe, b'7']);
    }

    #[test]
    fn test_mmio_buffer() {
        let mut memory = Box::new([0u16; CELL_COUNT]);
        let base_addr = memory.as_mut_ptr().expose_provenance();
        let mut writer = Writer::new(unsafe { MmioBuffer::new(base_addr) });
        writer.write_string(b"ok");
        assert_eq!(
            format!("{:?}", writer.buffer()),
            format!("MmioBuffer {{ base_addr: {base_addr:#x} }}")
        );
        let memory = &*memory;
        assert_eq!(memory[0], 0x076f);
        assert_eq!(memory[1], 0x076b);
    }
}
