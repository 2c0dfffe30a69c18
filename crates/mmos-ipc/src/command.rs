//! Single-slot command hand-off.
//!
//! The host fills `arg1`, `arg2` and the string field, then publishes the type code last. The
//! worker reads the slot and resets the type to NONE; that reset is the only acknowledgement.

use core::sync::atomic::Ordering;

use crate::layout::{offset, COMMAND_STRING_BYTES};
use crate::region::SharedRegion;

/// Longest string that fits the slot; one byte is always left for the NUL terminator.
pub const MAX_COMMAND_TEXT: usize = COMMAND_STRING_BYTES - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandType {
    None = 0,
    Init = 1,
    Shutdown = 2,
    Sleep = 3,
    Wake = 4,
    GoHome = 5,
    HomeButton = 6,
    AddLayer = 7,
    RemoveLayer = 8,
    SetFrameRate = 9,
    Resize = 10,
}

impl CommandType {
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::Init,
            2 => Self::Shutdown,
            3 => Self::Sleep,
            4 => Self::Wake,
            5 => Self::GoHome,
            6 => Self::HomeButton,
            7 => Self::AddLayer,
            8 => Self::RemoveLayer,
            9 => Self::SetFrameRate,
            10 => Self::Resize,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

/// UI layers the kernel stacks; `ADD_LAYER`/`REMOVE_LAYER` carry the ordinal in `arg1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    HomeScreen = 0,
    Application = 1,
    Notification = 2,
    ControlCenter = 3,
    Popup = 4,
    LockScreen = 5,
}

impl Layer {
    pub const ALL: [Layer; 6] = [
        Layer::HomeScreen,
        Layer::Application,
        Layer::Notification,
        Layer::ControlCenter,
        Layer::Popup,
        Layer::LockScreen,
    ];

    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn ordinal(self) -> u32 {
        self as u32
    }

    /// Layers a "back" gesture can close. The home screen never closes.
    pub fn is_closable(self) -> bool {
        !matches!(self, Layer::HomeScreen)
    }
}

/// Typed command as understood by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init,
    Shutdown,
    Sleep,
    Wake,
    GoHome,
    HomeButton,
    AddLayer(Layer),
    RemoveLayer(Layer),
    SetFrameRate(u32),
    Resize { width: u32, height: u32 },
}

impl Command {
    pub fn kind(&self) -> CommandType {
        match self {
            Command::Init => CommandType::Init,
            Command::Shutdown => CommandType::Shutdown,
            Command::Sleep => CommandType::Sleep,
            Command::Wake => CommandType::Wake,
            Command::GoHome => CommandType::GoHome,
            Command::HomeButton => CommandType::HomeButton,
            Command::AddLayer(_) => CommandType::AddLayer,
            Command::RemoveLayer(_) => CommandType::RemoveLayer,
            Command::SetFrameRate(_) => CommandType::SetFrameRate,
            Command::Resize { .. } => CommandType::Resize,
        }
    }

    pub fn to_pending(&self) -> PendingCommand {
        let (arg1, arg2) = match self {
            Command::AddLayer(layer) | Command::RemoveLayer(layer) => (layer.ordinal() as i32, 0),
            Command::SetFrameRate(fps) => (*fps as i32, 0),
            Command::Resize { width, height } => (*width as i32, *height as i32),
            _ => (0, 0),
        };
        PendingCommand {
            code: self.kind().code(),
            arg1,
            arg2,
            text: String::new(),
        }
    }
}

/// Raw slot contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingCommand {
    pub code: u32,
    pub arg1: i32,
    pub arg2: i32,
    pub text: String,
}

impl PendingCommand {
    pub fn kind(&self) -> Option<CommandType> {
        CommandType::from_code(self.code)
    }

    /// Interpret the slot. `None` for unknown codes and for arguments the worker can't act on
    /// (unknown layer ordinal, non-positive dimensions); callers log and ignore those.
    pub fn to_command(&self) -> Option<Command> {
        Some(match self.kind()? {
            CommandType::None => return None,
            CommandType::Init => Command::Init,
            CommandType::Shutdown => Command::Shutdown,
            CommandType::Sleep => Command::Sleep,
            CommandType::Wake => Command::Wake,
            CommandType::GoHome => Command::GoHome,
            CommandType::HomeButton => Command::HomeButton,
            CommandType::AddLayer => Command::AddLayer(Layer::from_ordinal(self.arg1)?),
            CommandType::RemoveLayer => Command::RemoveLayer(Layer::from_ordinal(self.arg1)?),
            CommandType::SetFrameRate => Command::SetFrameRate(self.arg1.max(0) as u32),
            CommandType::Resize => Command::Resize {
                width: u32::try_from(self.arg1).ok().filter(|w| *w > 0)?,
                height: u32::try_from(self.arg2).ok().filter(|h| *h > 0)?,
            },
        })
    }
}

impl From<Command> for PendingCommand {
    fn from(command: Command) -> Self {
        command.to_pending()
    }
}

/// The slot already holds a command the worker has not taken yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBusy {
    pub pending_code: u32,
}

/// Cut `text` to at most [`MAX_COMMAND_TEXT`] bytes without splitting a UTF-8 sequence.
pub fn truncate_command_text(text: &str) -> &str {
    if text.len() <= MAX_COMMAND_TEXT {
        return text;
    }
    let mut end = MAX_COMMAND_TEXT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

impl SharedRegion {
    pub fn command_pending(&self) -> bool {
        self.pending_command_code() != CommandType::None.code()
    }

    /// Type code of the outstanding command without consuming it (0 when the slot is free).
    pub fn pending_command_code(&self) -> u32 {
        self.load(offset::COMMAND_TYPE, Ordering::Acquire)
    }

    /// Host side. Fills the slot unless a previous command is still outstanding.
    pub fn try_set_command(&self, command: &PendingCommand) -> Result<(), SlotBusy> {
        let pending_code = self.load(offset::COMMAND_TYPE, Ordering::Acquire);
        if pending_code != CommandType::None.code() {
            return Err(SlotBusy { pending_code });
        }

        self.store(offset::COMMAND_ARG1, command.arg1 as u32, Ordering::Relaxed);
        self.store(offset::COMMAND_ARG2, command.arg2 as u32, Ordering::Relaxed);

        let mut bytes = [0u8; COMMAND_STRING_BYTES];
        let text = truncate_command_text(&command.text);
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.store(offset::COMMAND_STRING + i * 4, word, Ordering::Relaxed);
        }

        self.store(offset::COMMAND_TYPE, command.code, Ordering::Release);
        Ok(())
    }

    /// Worker side. Reads and clears the slot.
    pub fn take_command(&self) -> Option<PendingCommand> {
        let code = self.load(offset::COMMAND_TYPE, Ordering::Acquire);
        if code == CommandType::None.code() {
            return None;
        }

        let arg1 = self.load(offset::COMMAND_ARG1, Ordering::Relaxed) as i32;
        let arg2 = self.load(offset::COMMAND_ARG2, Ordering::Relaxed) as i32;
        let mut bytes = [0u8; COMMAND_STRING_BYTES];
        for (i, chunk) in bytes.chunks_exact_mut(4).enumerate() {
            let word = self.load(offset::COMMAND_STRING + i * 4, Ordering::Relaxed);
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let len = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        let text = String::from_utf8_lossy(&bytes[..len]).into_owned();

        self.store(offset::COMMAND_TYPE, CommandType::None.code(), Ordering::Release);
        Some(PendingCommand {
            code,
            arg1,
            arg2,
            text,
        })
    }
}
