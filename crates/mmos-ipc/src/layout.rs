//! Shared region layout contract.
//!
//! The worker allocates a single fixed-size region per session and both sides address it
//! through the offsets below. All integers are little-endian; pixels are packed 32-bit ARGB,
//! row-major.
//!
//! ```text
//! 0     magic                 4
//! 4     version               4
//! 8     width                 4
//! 12    height                4
//! 16    frame_count           4
//! 20    frame_rate            4
//! 24    state_flags           4
//! 28    top_closable_layer    4
//! 32    input_queue_head      4
//! 36    input_queue_tail      4
//! 40    command_type          4
//! 44    command_arg1          4
//! 48    command_arg2          4
//! 52    command_string        64
//! 116   reserved              12   (publish_seq, tick_request, tick_ack)
//! 128   input_queue           128 x 16
//! 2176  pixels                width x height x 4
//! ```

/// ASCII `MMOS` as an integer. Stored little-endian like every other field.
pub const MAGIC: u32 = 0x4D4D_4F53;

/// Shared region ABI version.
pub const VERSION: u32 = 1;

pub const DEFAULT_WIDTH: u32 = 400;
pub const DEFAULT_HEIGHT: u32 = 600;
pub const DEFAULT_FRAME_RATE: u32 = 60;

/// Upper bound on either dimension. Keeps `region_bytes` comfortably inside `u32` offsets.
pub const MAX_DIMENSION: u32 = 8192;

pub mod offset {
    pub const MAGIC: usize = 0;
    pub const VERSION: usize = 4;
    pub const WIDTH: usize = 8;
    pub const HEIGHT: usize = 12;
    pub const FRAME_COUNT: usize = 16;
    pub const FRAME_RATE: usize = 20;
    pub const STATE_FLAGS: usize = 24;
    pub const TOP_CLOSABLE_LAYER: usize = 28;
    pub const INPUT_QUEUE_HEAD: usize = 32;
    pub const INPUT_QUEUE_TAIL: usize = 36;
    pub const COMMAND_TYPE: usize = 40;
    pub const COMMAND_ARG1: usize = 44;
    pub const COMMAND_ARG2: usize = 48;
    pub const COMMAND_STRING: usize = 52;
    pub const RESERVED: usize = 116;

    /// Frame publish sequence lock (worker-written). Odd while the pixel body is in flux.
    pub const PUBLISH_SEQ: usize = RESERVED;
    /// Host-driven pacing: bumped by the host once per requested frame.
    pub const TICK_REQUEST: usize = RESERVED + 4;
    /// Host-driven pacing: last `TICK_REQUEST` value the worker has fully served.
    pub const TICK_ACK: usize = RESERVED + 8;

    pub const INPUT_QUEUE: usize = 128;
    pub const PIXELS: usize = INPUT_QUEUE + super::INPUT_QUEUE_SLOTS * super::INPUT_EVENT_BYTES;
}

pub const COMMAND_STRING_BYTES: usize = 64;
pub const RESERVED_BYTES: usize = 12;

pub const INPUT_QUEUE_SLOTS: usize = 128;
pub const INPUT_EVENT_BYTES: usize = 16;

/// Bytes before the pixel body.
pub const HEADER_BYTES: usize = offset::PIXELS;

/// Sentinel stored in `top_closable_layer` when no closable layer is open.
pub const NO_LAYER: i32 = -1;

/// Prefix of every region name.
pub const REGION_NAME_PREFIX: &str = "mmos_shm_";

/// Extension used by file-backed regions.
pub const REGION_FILE_EXTENSION: &str = "shm";

/// Total region size for a `width` x `height` framebuffer.
pub const fn region_bytes(width: u32, height: u32) -> usize {
    HEADER_BYTES + pixel_bytes(width, height)
}

pub const fn pixel_bytes(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize) * 4
}

pub const fn valid_dimensions(width: u32, height: u32) -> bool {
    width > 0 && height > 0 && width <= MAX_DIMENSION && height <= MAX_DIMENSION
}

/// Replace every character outside `[A-Za-z0-9_-]` so the session id is safe as a file name.
pub fn sanitize_session_id(session: &str) -> String {
    session
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Region name for a session, e.g. `mmos_shm_world_1`.
pub fn region_name(session: &str) -> String {
    format!("{REGION_NAME_PREFIX}{}", sanitize_session_id(session))
}
