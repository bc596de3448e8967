//! Double-buffered bitmap peripheral.
//!
//! The screen is `SCREEN_WIDTH` columns, each a 32-bit word whose bit `y` is
//! the pixel at row `y` (row 0 at the bottom). Draw instructions OR into the
//! active plane; `IGRENDER` composes both planes into the visible screen.

use crate::config::{SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::opcodes::DisplayOp;

pub type Plane = [u32; SCREEN_WIDTH];

/// Coordinates packed into one 24-bit literal as four 6-bit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedArgs {
    pub x: u32,
    pub y: u32,
    pub a: u32,
    pub b: u32,
}

impl PackedArgs {
    pub fn unpack(value: u32) -> Self {
        PackedArgs {
            y: value & 0x3F,
            x: (value >> 6) & 0x3F,
            b: (value >> 12) & 0x3F,
            a: (value >> 18) & 0x3F,
        }
    }

    pub fn pack(self) -> u32 {
        (self.a & 0x3F) << 18 | (self.b & 0x3F) << 12 | (self.x & 0x3F) << 6 | (self.y & 0x3F)
    }
}

// bits start..start+len of a column, clipped to the screen height
fn run_mask(start: u32, len: u32) -> u32 {
    let height = SCREEN_HEIGHT as u64;
    let start = u64::from(start).min(height);
    let end = (start + u64::from(len)).min(height);
    ((1u64 << end) - (1u64 << start)) as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Display {
    planes: [Plane; 2],
    screen: Plane,
    status_flag: i32,
}

impl Display {
    pub fn new() -> Self {
        Display {
            planes: [[0; SCREEN_WIDTH]; 2],
            screen: [0; SCREEN_WIDTH],
            status_flag: 0,
        }
    }

    pub fn active_index(&self) -> usize {
        (self.status_flag & 1) as usize
    }

    pub fn status_flag(&self) -> i32 {
        self.status_flag
    }

    pub fn plane(&self, index: usize) -> &Plane {
        &self.planes[index & 1]
    }

    pub fn active_plane(&self) -> &Plane {
        &self.planes[self.active_index()]
    }

    pub fn load_active(&mut self, plane: Plane) {
        let index = self.active_index();
        self.planes[index] = plane;
    }

    pub fn screen(&self) -> &Plane {
        &self.screen
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < SCREEN_WIDTH && y < SCREEN_HEIGHT && self.screen[x] & (1 << y) != 0
    }

    /// Executes a draw, clear, render or flag instruction. `IGSAVE`/`IGLOAD`
    /// move planes through memory and are handled by the processor.
    pub fn execute(&mut self, op: DisplayOp, value: u32) {
        let args = PackedArgs::unpack(value);
        match op {
            DisplayOp::Clear => self.load_active([0; SCREEN_WIDTH]),
            DisplayOp::Render => {
                for (column, (first, second)) in self.screen.iter_mut().zip(self.planes[0].iter().zip(&self.planes[1])) {
                    *column = first | second;
                }
            }
            DisplayOp::DrawPixel => self.fill(args.x, 1, run_mask(args.y, 1)),
            DisplayOp::DrawHorizontal => self.fill(args.x, args.a, run_mask(args.y, 1)),
            DisplayOp::DrawVertical => self.fill(args.x, 1, run_mask(args.y, args.a)),
            DisplayOp::DrawRect => self.fill(args.x, args.a, run_mask(args.y, args.b)),
            DisplayOp::SetFlag => self.status_flag = value as i32,
            DisplayOp::Save | DisplayOp::Load => {}
        }
    }

    fn fill(&mut self, x: u32, width: u32, mask: u32) {
        let index = self.active_index();
        let start = (x as usize).min(SCREEN_WIDTH);
        let end = (start + width as usize).min(SCREEN_WIDTH);
        for column in &mut self.planes[index][start..end] {
            *column |= mask;
        }
    }

    /// Visible screen as text rows, top row first.
    pub fn to_lines(&self) -> Vec<String> {
        (0..SCREEN_HEIGHT)
            .rev()
            .map(|y| (0..SCREEN_WIDTH).map(|x| if self.pixel(x, y) { '#' } else { '.' }).collect())
            .collect()
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(x: u32, y: u32, a: u32, b: u32) -> u32 {
        PackedArgs { x, y, a, b }.pack()
    }

    #[test]
    fn test_pack_layout() {
        let args = PackedArgs::unpack(0b000011_000010_000101_000111);
        assert_eq!(args, PackedArgs { a: 3, b: 2, x: 5, y: 7 });
        assert_eq!(args.pack(), 0b000011_000010_000101_000111);
    }

    #[test]
    fn test_draw_pixel_ors_and_render_composes() {
        let mut display = Display::new();
        display.execute(DisplayOp::DrawPixel, packed(2, 3, 0, 0));
        display.execute(DisplayOp::DrawPixel, packed(2, 4, 0, 0));
        assert_eq!(display.plane(0)[2], 0b11000);
        assert!(!display.pixel(2, 3));

        display.execute(DisplayOp::SetFlag, 1);
        assert_eq!(display.status_flag(), 1);
        display.execute(DisplayOp::DrawPixel, packed(5, 0, 0, 0));
        assert_eq!(display.plane(1)[5], 1);
        assert_eq!(display.plane(0)[5], 0);

        display.execute(DisplayOp::Render, 0);
        assert!(display.pixel(2, 3));
        assert!(display.pixel(2, 4));
        assert!(display.pixel(5, 0));
    }

    #[test]
    fn test_lines_and_rect() {
        let mut display = Display::new();
        display.execute(DisplayOp::DrawHorizontal, packed(1, 0, 3, 0));
        assert_eq!(&display.plane(0)[0..5], &[0, 1, 1, 1, 0]);

        display.execute(DisplayOp::Clear, 0);
        display.execute(DisplayOp::DrawVertical, packed(0, 2, 3, 0));
        assert_eq!(display.plane(0)[0], 0b11100);

        display.execute(DisplayOp::Clear, 0);
        display.execute(DisplayOp::DrawRect, packed(30, 30, 5, 5));
        assert_eq!(display.plane(0)[29], 0);
        assert_eq!(display.plane(0)[30], 0xC000_0000);
        assert_eq!(display.plane(0)[31], 0xC000_0000);
    }

    #[test]
    fn test_clear_only_touches_active_plane() {
        let mut display = Display::new();
        display.execute(DisplayOp::DrawPixel, packed(0, 0, 0, 0));
        display.execute(DisplayOp::SetFlag, 3);
        assert_eq!((display.status_flag(), display.active_index()), (3, 1));
        display.execute(DisplayOp::DrawPixel, packed(1, 1, 0, 0));
        display.execute(DisplayOp::Clear, 0);
        assert_eq!(display.plane(0)[0], 1);
        assert_eq!(display.plane(1)[1], 0);
    }

    #[test]
    fn test_out_of_range_is_clipped() {
        let mut display = Display::new();
        display.execute(DisplayOp::DrawPixel, packed(40, 40, 0, 0));
        assert_eq!(display, Display::new());
    }

    #[test]
    fn test_to_lines() {
        let mut display = Display::new();
        display.execute(DisplayOp::DrawPixel, packed(0, 0, 0, 0));
        display.execute(DisplayOp::Render, 0);
        let lines = display.to_lines();
        assert_eq!(lines.len(), SCREEN_HEIGHT);
        assert!(lines[SCREEN_HEIGHT - 1].starts_with("#."));
        assert!(lines[0].chars().all(|c| c == '.'));
    }
}
