//! Deterministic stand-in kernel.
//!
//! Draws a scene that depends only on the frame number and the input it has seen, so two runs fed
//! the same script produce bit-identical frames. Used by the CLI and the test suites.

use mmos_ipc::input::KeyEvent;
use mmos_ipc::{InputEvent, Layer, PointerEvent};

use crate::error::KernelError;
use crate::kernel::{Kernel, KernelStatus};

const BACKGROUND: u32 = 0xFF10_1820;
const CURSOR: u32 = 0xFFFF_FFFF;
const PRESSED_CURSOR: u32 = 0xFFFF_4040;
const LAYER_COLORS: [u32; 6] = [
    0xFF20_3040,
    0xFF30_6090,
    0xFF90_6030,
    0xFF50_9050,
    0xFFC0_C040,
    0xFF40_4040,
];

/// Letter typed with Ctrl held that toggles debug mode.
const DEBUG_TOGGLE_KEY: u16 = b'd' as u16;

#[derive(Debug, Default, Clone)]
pub struct DemoKernel {
    width: u32,
    height: u32,
    ticks: u64,
    cursor: (i32, i32),
    pressed: bool,
    taps: u32,
    scroll: i32,
    typed: u32,
    debug_mode: bool,
    text_focus: bool,
    layers: Vec<Layer>,
    sleeping: bool,
    frame_rate: u32,
}

impl DemoKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn taps(&self) -> u32 {
        self.taps
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Last rate announced through `set_frame_rate`.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    fn pointer(&mut self, p: &PointerEvent) {
        self.cursor = (i32::from(p.x), i32::from(p.y));
    }

    fn key_down(&mut self, key: &KeyEvent) {
        use mmos_ipc::Modifiers;

        if key.modifiers.contains(Modifiers::CTRL) && key.key_char == DEBUG_TOGGLE_KEY {
            self.debug_mode = !self.debug_mode;
        }
        self.typed = self
            .typed
            .wrapping_mul(31)
            .wrapping_add(key.key_code as u32)
            .wrapping_add(u32::from(key.key_char));
    }

    fn fill_rect(&self, frame: &mut [u32], x0: i32, y0: i32, w: i32, h: i32, color: u32) {
        let (fw, fh) = (self.width as i32, self.height as i32);
        let xs = x0.clamp(0, fw)..(x0 + w).clamp(0, fw);
        for y in y0.clamp(0, fh)..(y0 + h).clamp(0, fh) {
            let row = (y * fw) as usize;
            for x in xs.clone() {
                frame[row + x as usize] = color;
            }
        }
    }
}

impl Kernel for DemoKernel {
    fn init(&mut self, width: u32, height: u32) -> Result<(), KernelError> {
        self.width = width;
        self.height = height;
        self.layers = vec![Layer::HomeScreen];
        tracing::debug!(width, height, "demo kernel initialised");
        Ok(())
    }

    fn update(&mut self) -> Result<(), KernelError> {
        self.ticks += 1;
        Ok(())
    }

    fn render(&mut self, frame: &mut [u32]) -> Result<(), KernelError> {
        let expected = self.width as usize * self.height as usize;
        if frame.len() != expected {
            return Err(KernelError::Failed(format!(
                "frame has {} pixels, expected {expected}",
                frame.len()
            )));
        }

        let mix = (self.ticks as u32)
            .wrapping_mul(0x9E37_79B9)
            .wrapping_add(self.typed)
            .wrapping_add(self.taps.wrapping_mul(0x85EB_CA6B))
            .wrapping_add(self.scroll as u32);
        let tint = mix & 0x000F_0F0F;
        let background = if self.debug_mode {
            BACKGROUND ^ 0x0040_0000
        } else {
            BACKGROUND
        };
        frame.fill(background | tint);

        // Status bar shows the frame number in its top row.
        let status_width = (self.width as usize).min(32);
        for (i, px) in frame.iter_mut().take(status_width).enumerate() {
            *px = if (self.ticks >> (i % 32)) & 1 == 1 {
                0xFFFF_FFFF
            } else {
                0xFF00_0000
            };
        }

        let band = (self.height as i32 / 16).max(1);
        for (i, layer) in self.layers.iter().enumerate() {
            let y = self.height as i32 - band * (i as i32 + 1);
            self.fill_rect(
                frame,
                0,
                y,
                self.width as i32,
                band,
                LAYER_COLORS[*layer as usize],
            );
        }

        let color = if self.pressed { PRESSED_CURSOR } else { CURSOR };
        let (cx, cy) = self.cursor;
        self.fill_rect(frame, cx - 2, cy, 5, 1, color);
        self.fill_rect(frame, cx, cy - 2, 1, 5, color);
        Ok(())
    }

    fn handle_input(&mut self, event: &InputEvent) -> Result<(), KernelError> {
        match event {
            InputEvent::PointerDown(p) => {
                self.pointer(p);
                self.pressed = true;
                self.taps = self.taps.wrapping_add(1);
                // Taps in the top tenth of the screen land in the "address bar".
                self.text_focus = i32::from(p.y) < self.height as i32 / 10;
            }
            InputEvent::PointerUp(p) => {
                self.pointer(p);
                self.pressed = false;
            }
            InputEvent::PointerDrag(p) | InputEvent::PointerMove(p) => self.pointer(p),
            InputEvent::Wheel { pointer, delta } => {
                self.pointer(pointer);
                self.scroll = self.scroll.wrapping_add(*delta as i32);
            }
            InputEvent::KeyDown(key) => self.key_down(key),
            InputEvent::KeyUp(_) | InputEvent::Noop { .. } => {}
        }
        Ok(())
    }

    fn sleep(&mut self) {
        self.sleeping = true;
    }

    fn wake(&mut self) {
        self.sleeping = false;
    }

    fn go_home(&mut self) {
        self.layers.retain(|l| *l == Layer::HomeScreen);
        self.text_focus = false;
    }

    fn home_button(&mut self) {
        // Home from an app goes home; home from the home screen opens the control center.
        if self.layers.iter().any(|l| l.is_closable()) {
            self.go_home();
        } else {
            self.add_layer(Layer::ControlCenter);
        }
    }

    fn add_layer(&mut self, layer: Layer) {
        if !self.layers.contains(&layer) {
            self.layers.push(layer);
        }
    }

    fn remove_layer(&mut self, layer: Layer) {
        self.layers.retain(|l| *l != layer);
    }

    fn set_frame_rate(&mut self, fps: u32) {
        self.frame_rate = fps;
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), KernelError> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn status(&self) -> KernelStatus {
        KernelStatus {
            debug_mode: self.debug_mode,
            text_input_focus: self.text_focus,
            top_closable_layer: self.layers.iter().rev().find(|l| l.is_closable()).copied(),
        }
    }
}
