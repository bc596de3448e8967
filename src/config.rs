pub const MEMORY_SIZE: usize = 4096;
pub const SCREEN_WIDTH: usize = 32;
pub const SCREEN_HEIGHT: usize = 32;
pub const CYCLE_TIMEOUT: u64 = 50_000;

pub const LITERAL_BITS: u32 = 24;
pub const LITERAL_MASK: u32 = (1 << LITERAL_BITS) - 1;

pub const MAIN_SCOPE: &str = "__main__";
pub const DIRECTIVE_MARKER: char = '#';
pub const EVAL_MARKER: &str = "EVAL";
pub const COMMENT_MARKERS: [&str; 2] = ["//", ";"];
