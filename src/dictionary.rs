//! The game dictionary and input tokenizer
//!
//! The dictionary area holds the word-separator list, the entry size, and
//! a table of entries sorted by their 4-byte encoded keys. Tokenizing
//! splits an input line on spaces and separators (separators are tokens
//! themselves), encodes each token, and records dictionary hits in the
//! parse buffer.

use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use log::debug;

use crate::fault::Fault;
use crate::memory::Memory;
use crate::text;
use crate::vm::Vm;

/// v3 entries lead with a 4-byte encoded key
const KEY_BYTES: usize = 4;

#[derive(Debug, Clone)]
pub struct Dictionary {
    pub separators: Vec<u8>,
    pub entry_length: u8,
    pub entry_count: u16,
    entries_base: usize,
}

impl Dictionary {
    pub fn load(mem: &Memory, addr: usize) -> Result<Dictionary, Fault> {
        let mut reader = mem.reader(addr);
        let separator_count = reader.next_byte()? as usize;
        let mut separators = Vec::with_capacity(separator_count);
        for _ in 0..separator_count {
            separators.push(reader.next_byte()?);
        }
        let entry_length = reader.next_byte()?;
        if (entry_length as usize) < KEY_BYTES {
            return Err(Fault::BadStory(format!(
                "dictionary entry length {entry_length} is shorter than its key"
            )));
        }
        let entry_count = reader.next_word()?;
        let dictionary = Dictionary {
            separators,
            entry_length,
            entry_count,
            entries_base: reader.position(),
        };
        debug!("dictionary at {addr:#06x}: {dictionary}");
        Ok(dictionary)
    }

    /// Binary-search the sorted entry table for an encoded key.
    /// Returns the entry's byte address, or 0 on a miss.
    pub fn lookup(&self, mem: &Memory, key: &[u8; 4]) -> Result<u16, Fault> {
        let mut lo = 0usize;
        let mut hi = self.entry_count as usize;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let addr = self.entries_base + mid * self.entry_length as usize;
            let mut entry = [0u8; KEY_BYTES];
            for (i, slot) in entry.iter_mut().enumerate() {
                *slot = mem.read_byte(addr + i)?;
            }
            match entry.cmp(key) {
                std::cmp::Ordering::Equal => return Ok(addr as u16),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(0)
    }
}

impl Display for Dictionary {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "{} entries of {} bytes, separators:",
            self.entry_count, self.entry_length
        )?;
        for sep in &self.separators {
            write!(f, " '{}'", *sep as char)?;
        }
        Ok(())
    }
}

/// Split an input line into (0-based offset, word) pairs. Spaces delimit
/// words; separator characters delimit words and come out as
/// single-character words of their own.
pub fn split_line(input: &[u8], separators: &[u8]) -> Vec<(usize, Vec<u8>)> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, &b) in input.iter().enumerate() {
        if b == b' ' {
            if let Some(s) = start.take() {
                words.push((s, input[s..i].to_vec()));
            }
        } else if separators.contains(&b) {
            if let Some(s) = start.take() {
                words.push((s, input[s..i].to_vec()));
            }
            words.push((i, vec![b]));
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        words.push((s, input[s..].to_vec()));
    }
    words
}

/// Tokenize the line in the text buffer into the parse buffer.
/// Parse entries are a dictionary address word (0 on a miss), the token
/// length, and the token's 1-based offset within the text buffer.
pub fn tokenize(
    vm: &mut Vm,
    dict: &Dictionary,
    text_addr: usize,
    parse_addr: usize,
) -> Result<(), Fault> {
    let capacity = vm.memory.read_byte(text_addr)? as usize;
    let mut input = Vec::with_capacity(capacity);
    for i in 0..capacity {
        let b = vm.memory.read_byte(text_addr + 1 + i)?;
        if b == 0 {
            break;
        }
        input.push(b);
    }

    let words = split_line(&input, &dict.separators);
    let max_tokens = vm.memory.read_byte(parse_addr)? as usize;
    if words.len() > max_tokens {
        debug!(
            "parse buffer holds {max_tokens} tokens, dropping {}",
            words.len() - max_tokens
        );
    }

    let count = words.len().min(max_tokens);
    let mut entries = Vec::with_capacity(count);
    for (offset, word) in words.into_iter().take(count) {
        let key = text::encode_dict_word(&String::from_utf8_lossy(&word));
        let addr = dict.lookup(&vm.memory, &key)?;
        entries.push((addr, word.len() as u8, offset as u8 + 1));
    }

    let mut writer = vm.memory.writer(parse_addr + 1);
    writer.byte(count as u8)?;
    for (addr, length, offset) in entries {
        writer.word(addr)?;
        writer.byte(length)?;
        writer.byte(offset)?;
    }
    Ok(())
}
