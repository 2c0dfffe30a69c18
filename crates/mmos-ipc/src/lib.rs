//! Shared-memory transport between the simulated device kernel (worker) and its host.
//!
//! One fixed-size region per session carries a header of counters and flags, a single command
//! slot, an SPSC input ring and the published framebuffer. See [`layout`] for the byte map.

pub mod command;
pub mod error;
pub mod input;
pub mod layout;
pub mod namespace;
pub mod publish;
pub mod region;
pub mod ring;
pub mod state;

pub use command::{Command, CommandType, Layer, PendingCommand, SlotBusy};
pub use error::{IpcError, Result};
pub use input::{InputEvent, KeyEvent, KeyKind, Modifiers, PointerEvent, PointerKind};
pub use namespace::{FileNamespace, MemoryNamespace, RegionNamespace};
pub use publish::{publish_frame, FrameReader, Refresh};
pub use region::SharedRegion;
pub use ring::{InputRing, PopError, PushError, INPUT_QUEUE_CAPACITY};
pub use state::{HeaderSnapshot, StateFlags};
