//! Headless host for tests and non-interactive environments
//!
//! Collects all output in memory, answers reads from a scripted input
//! queue, and keeps saves in a slot instead of on disk. When the input
//! queue runs dry the game is asked to quit, so scripted runs always
//! terminate.

use std::collections::VecDeque;

use crate::host::{Host, InputEvent};

#[derive(Debug, Default)]
pub struct HeadlessHost {
    output: String,
    inputs: VecDeque<String>,
    statuses: Vec<String>,
    save_slot: Option<Vec<u8>>,
}

impl HeadlessHost {
    pub fn new() -> HeadlessHost {
        HeadlessHost::default()
    }

    /// Queue a line for a future read
    pub fn push_input(&mut self, line: &str) {
        self.inputs.push_back(line.to_string());
    }

    /// Everything the game has printed so far
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn statuses(&self) -> &[String] {
        &self.statuses
    }

    pub fn last_status(&self) -> Option<&String> {
        self.statuses.last()
    }

    pub fn saved_blob(&self) -> Option<&Vec<u8>> {
        self.save_slot.as_ref()
    }

    /// Seed the save slot, as if a blob had been written earlier
    pub fn preload_save(&mut self, data: Vec<u8>) {
        self.save_slot = Some(data);
    }
}

impl Host for HeadlessHost {
    fn write_text(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn show_status(&mut self, location: &str, a: i16, b: u16, is_time: bool) {
        let right = if is_time {
            format!("{a:02}:{b:02}")
        } else {
            format!("{a}/{b}")
        };
        self.statuses.push(format!("{location} | {right}"));
    }

    fn read_line(&mut self, max_len: usize) -> InputEvent {
        match self.inputs.pop_front() {
            Some(line) => InputEvent::Line(line.chars().take(max_len).collect()),
            None => InputEvent::Quit,
        }
    }

    fn save(&mut self, data: &[u8]) -> bool {
        self.save_slot = Some(data.to_vec());
        true
    }

    fn restore(&mut self) -> Option<Vec<u8>> {
        self.save_slot.clone()
    }
}
