//! Parser for the fixed 64-byte story file header

use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use crate::fault::Fault;
use crate::memory::Memory;

/// Flags1 bit 1: status line shows hours/minutes instead of score/turns
const FLAG1_STATUS_TIME: u8 = 0x02;
/// Flags1 bit 4: set when the interpreter cannot provide a status line
const FLAG1_NO_STATUS: u8 = 0x10;
/// Flags1 bit 5: set when the interpreter supports screen splitting
const FLAG1_SPLIT_SCREEN: u8 = 0x20;

/// The immutable view of the story header, read once at load
#[derive(Debug, PartialEq)]
pub struct Header {
    pub version: u8,
    pub flags1: u8,
    pub release: u16,
    pub high_base: u16,
    pub initial_pc: u16,
    pub dictionary: u16,
    pub object_table: u16,
    pub globals: u16,
    pub static_base: u16,
    pub flags2: u16,
    pub serial: String,
    pub abbreviations: u16,
    /// In bytes (the header stores it divided by 2)
    pub file_length: usize,
    pub checksum: u16,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Header, Fault> {
        if bytes.len() < 0x40 {
            return Err(Fault::BadStory(format!(
                "file is {} bytes, too small to hold a header",
                bytes.len()
            )));
        }
        let word = |addr: usize| ((bytes[addr] as u16) << 8) | bytes[addr + 1] as u16;

        let version = bytes[0];
        if version != 3 {
            return Err(Fault::UnsupportedVersion(version));
        }

        let header = Header {
            version,
            flags1: bytes[0x01],
            release: word(0x02),
            high_base: word(0x04),
            initial_pc: word(0x06),
            dictionary: word(0x08),
            object_table: word(0x0A),
            globals: word(0x0C),
            static_base: word(0x0E),
            flags2: word(0x10),
            serial: bytes[0x12..0x18].iter().map(|&b| b as char).collect(),
            abbreviations: word(0x18),
            file_length: word(0x1A) as usize * 2,
            checksum: word(0x1C),
        };

        if header.static_base > header.high_base {
            return Err(Fault::BadStory(format!(
                "static memory base {:#06x} lies above high memory base {:#06x}",
                header.static_base, header.high_base
            )));
        }
        if header.file_length > bytes.len() {
            return Err(Fault::BadStory(format!(
                "header claims {} bytes but the image holds {}",
                header.file_length,
                bytes.len()
            )));
        }
        Ok(header)
    }

    /// True when the status line shows a clock rather than score/turns
    pub fn status_is_time(&self) -> bool {
        self.flags1 & FLAG1_STATUS_TIME != 0
    }

    /// Announce interpreter capabilities by rewriting flags1: a status line
    /// is available and the screen can be split. The only header write
    /// after load.
    pub fn announce_capabilities(mem: &mut Memory) -> Result<(), Fault> {
        let flags1 = mem.read_byte(0x01)?;
        mem.set_byte_raw(0x01, (flags1 & !FLAG1_NO_STATUS) | FLAG1_SPLIT_SCREEN)
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Release number:           {}
Serial number:            {}
Start PC:                 {:#06x}
High memory base:         {:#06x}
Static memory base:       {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version,
            self.release,
            self.serial,
            self.initial_pc,
            self.high_base,
            self.static_base,
            self.dictionary,
            self.object_table,
            self.globals,
            self.abbreviations,
            self.file_length,
            self.checksum,
        )
    }
}
