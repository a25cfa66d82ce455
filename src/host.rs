//! The seams between the engine and the outside world
//!
//! `Host` is everything the engine asks of its surroundings: text out,
//! lines in, a status bar, and the optional windowing and persistence
//! hooks. `Inspector` is the read-only view a debugger or UI consumes.
//! The engine depends on these traits and never on concrete terminal code.

use crate::fault::Fault;
use crate::frame::CallFrame;

/// What came back from a blocking read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    /// The host wants the game to end (EOF, interrupt)
    Quit,
}

pub trait Host {
    /// Emit narrative text. Hosts must present output in call order.
    fn write_text(&mut self, text: &str);

    fn write_char(&mut self, ch: char) {
        self.write_text(&ch.to_string());
    }

    /// Emit an object's short name. Hosts that style names hook in here;
    /// `is_location` distinguishes the player's current room.
    fn write_object(&mut self, name: &str, is_location: bool) {
        let _ = is_location;
        self.write_text(name);
    }

    /// Render the status bar: current location plus either score/turns or
    /// hours/minutes depending on `is_time`.
    fn show_status(&mut self, location: &str, a: i16, b: u16, is_time: bool);

    /// Block until the player enters a line (at most `max_len` bytes are
    /// used), or the host decides the game is over.
    fn read_line(&mut self, max_len: usize) -> InputEvent;

    /// v3 split: reserve `lines` rows for the upper window. Hosts without
    /// windows ignore this.
    fn split_window(&mut self, lines: u16) {
        let _ = lines;
    }

    /// Select the active window. Hosts without windows ignore this.
    fn set_window(&mut self, window: u16) {
        let _ = window;
    }

    /// Persist a save blob. Declining (the default) makes `save` fail
    /// cleanly in-game.
    fn save(&mut self, data: &[u8]) -> bool {
        let _ = data;
        false
    }

    /// Fetch a previously saved blob, if the host has one.
    fn restore(&mut self) -> Option<Vec<u8>> {
        None
    }
}

/// Read-only machine state for debuggers and UIs
pub trait Inspector {
    fn pc(&self) -> u32;
    fn call_depth(&self) -> usize;
    fn current_frame(&self) -> &CallFrame;
    fn memory_bytes(&self) -> &[u8];
    /// The object the player is in (global 16 by v3 convention)
    fn location(&self) -> Result<u16, Fault>;
    fn object_name(&self, obj: u16) -> Result<String, Fault>;
}
