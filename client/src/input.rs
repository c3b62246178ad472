//! Client input sequencing with change detection
//!
//! Key polling is left to whatever front end drives the client; this module
//! only turns sampled key states into sequenced [`InputState`]s. The bundled
//! binary samples keys from terminal commands.

use shared::{timestamp_millis, InputState};
use std::time::{Duration, Instant};

/// Keep-alive interval for unchanged input.
pub const INPUT_RESEND_INTERVAL: Duration = Duration::from_millis(16);

/// Key states sampled for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySample {
    pub left: bool,
    pub right: bool,
    pub slam: bool,
    pub throw: bool,
}

/// Turns key samples into networked inputs.
pub struct InputManager {
    next_sequence: u32,
    current_input: InputState,
    last_input_sent: Instant,
    prev_slam: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            current_input: InputState::default(),
            last_input_sent: Instant::now(),
            prev_slam: false,
        }
    }

    /// Returns the input to send for this frame, if any. Input is sent when it
    /// changed or when the keep-alive interval elapsed. Slam is reported only
    /// on the frame the key went down.
    pub fn update(&mut self, keys: KeySample) -> Option<InputState> {
        let slam_pressed = keys.slam && !self.prev_slam;
        self.prev_slam = keys.slam;

        let input_changed = keys.left != self.current_input.left
            || keys.right != self.current_input.right
            || keys.throw != self.current_input.throw_held
            || slam_pressed;

        let time_to_send = self.last_input_sent.elapsed() >= INPUT_RESEND_INTERVAL;
        if !input_changed && !time_to_send {
            return None;
        }

        self.current_input = InputState {
            sequence: self.next_sequence,
            timestamp: timestamp_millis(),
            left: keys.left,
            right: keys.right,
            slam: slam_pressed,
            throw_held: keys.throw,
        };
        self.next_sequence += 1;
        self.last_input_sent = Instant::now();

        Some(self.current_input.clone())
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A line typed on the client's terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Left,
    Right,
    Stop,
    Slam,
    Throw,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        match line.trim().to_ascii_lowercase().as_str() {
            "a" | "left" => Some(Command::Left),
            "d" | "right" => Some(Command::Right),
            "s" | "stop" => Some(Command::Stop),
            "w" | "slam" => Some(Command::Slam),
            "t" | "throw" => Some(Command::Throw),
            "q" | "quit" => Some(Command::Quit),
            _ => None,
        }
    }

    /// Applies the command to held keys. Slam is held for a single sample.
    pub fn apply(self, keys: &mut KeySample) {
        match self {
            Command::Left => {
                keys.left = true;
                keys.right = false;
            }
            Command::Right => {
                keys.left = false;
                keys.right = true;
            }
            Command::Stop => {
                keys.left = false;
                keys.right = false;
            }
            Command::Slam => keys.slam = true,
            Command::Throw => keys.throw = !keys.throw,
            Command::Quit => {}
        }
    }
}
