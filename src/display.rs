//! Terminal host
//!
//! A one-line reverse-video status bar on the top row, narrative text
//! scrolling beneath it, optional styling of object names. `--plain`
//! suppresses every escape sequence so output pipes cleanly.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crossterm::{
    cursor::{MoveTo, RestorePosition, SavePosition},
    execute,
    style::{Attribute, Color, Print, SetAttribute, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use log::{debug, warn};

use crate::host::{Host, InputEvent};

pub struct TerminalHost {
    plain: bool,
    highlight: bool,
    save_path: PathBuf,
    last_output: String,
}

impl TerminalHost {
    pub fn new(plain: bool, highlight: bool, save_path: PathBuf) -> TerminalHost {
        TerminalHost {
            plain,
            highlight: highlight && !plain,
            save_path,
            last_output: String::new(),
        }
    }

    /// Clear the screen and draw the empty status bar
    pub fn init(&mut self) {
        if self.plain {
            return;
        }
        let blank = " ".repeat(self.width());
        let done = execute!(
            io::stdout(),
            Clear(ClearType::All),
            MoveTo(0, 0),
            SetAttribute(Attribute::Reverse),
            Print(blank),
            SetAttribute(Attribute::Reset),
            MoveTo(0, 1),
        );
        if let Err(e) = done {
            warn!("could not initialize the terminal: {e}");
        }
    }

    /// Drop any lingering attributes on the way out
    pub fn finish(&mut self) {
        if self.plain {
            return;
        }
        let _ = execute!(io::stdout(), SetAttribute(Attribute::Reset));
        println!();
    }

    fn width(&self) -> usize {
        terminal::size().map(|(w, _)| w as usize).unwrap_or(80)
    }

    fn draw_status_bar(&self, content: &str) {
        let width = self.width();
        let mut bar: String = format!(" {content}").chars().take(width).collect();
        while bar.chars().count() < width {
            bar.push(' ');
        }
        let done = execute!(
            io::stdout(),
            SavePosition,
            MoveTo(0, 0),
            SetAttribute(Attribute::Reverse),
            Print(bar),
            SetAttribute(Attribute::Reset),
            RestorePosition,
        );
        if let Err(e) = done {
            debug!("status bar draw failed: {e}");
        }
        let _ = io::stdout().flush();
    }
}

impl Host for TerminalHost {
    fn write_text(&mut self, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
        if !text.is_empty() {
            self.last_output = text.to_string();
        }
    }

    fn write_object(&mut self, name: &str, is_location: bool) {
        if !self.highlight {
            self.write_text(name);
            return;
        }
        let color = if is_location {
            Color::Yellow
        } else {
            Color::Cyan
        };
        let done = execute!(
            io::stdout(),
            SetAttribute(Attribute::Bold),
            SetForegroundColor(color),
            Print(name),
            SetAttribute(Attribute::Reset),
        );
        if done.is_err() {
            print!("{name}");
        }
        let _ = io::stdout().flush();
        if !name.is_empty() {
            self.last_output = name.to_string();
        }
    }

    fn show_status(&mut self, location: &str, a: i16, b: u16, is_time: bool) {
        if self.plain {
            return;
        }
        let right = if is_time {
            let (hours, minutes) = (a.rem_euclid(24) as u16, b % 60);
            let meridian = if hours >= 12 { "PM" } else { "AM" };
            let clock_hours = match hours % 12 {
                0 => 12,
                h => h,
            };
            format!("{clock_hours:02}:{minutes:02} {meridian}")
        } else {
            format!("{a}/{b}")
        };
        let width = self.width();
        let padding = width
            .saturating_sub(location.len() + right.len() + 3)
            .max(1);
        self.draw_status_bar(&format!("{location}{}{right}", " ".repeat(padding)));
    }

    fn read_line(&mut self, max_len: usize) -> InputEvent {
        if !self.plain && !self.last_output.trim_end().ends_with('>') {
            // The game didn't print its own prompt
            let _ = execute!(
                io::stdout(),
                SetAttribute(Attribute::Bold),
                Print("> "),
                SetAttribute(Attribute::Reset),
            );
            let _ = io::stdout().flush();
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => InputEvent::Quit,
            Ok(_) => {
                self.last_output.clear();
                let line: String = line
                    .trim_end_matches(['\r', '\n'])
                    .chars()
                    .take(max_len)
                    .collect();
                InputEvent::Line(line)
            }
        }
    }

    fn save(&mut self, data: &[u8]) -> bool {
        match fs::write(&self.save_path, data) {
            Ok(()) => true,
            Err(e) => {
                warn!("could not write save file {:?}: {e}", self.save_path);
                false
            }
        }
    }

    fn restore(&mut self) -> Option<Vec<u8>> {
        match fs::read(&self.save_path) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!("no save file at {:?}: {e}", self.save_path);
                None
            }
        }
    }
}
