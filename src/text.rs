//! ZSCII text codec
//!
//! Strings are sequences of 16-bit words, three 5-bit Z-characters each,
//! terminated by a set top bit. Decoding walks the three alphabets with
//! one-shot shifts, splices abbreviations, and maps 10-bit escapes through
//! the default Unicode translation table. Encoding produces the fixed
//! 6-Z-character keys the dictionary is searched with.

use std::collections::HashMap;

use log::debug;

use crate::fault::Fault;
use crate::memory::Memory;

/// The three alphabets for Z-string decoding
pub const ALPHABET_A0: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHABET_A2: &[u8] = b" \n0123456789.,!?_#'\"/\\-:()";

/// Z-characters per dictionary key (two packed words)
pub const DICT_KEY_ZCHARS: usize = 6;

lazy_static! {
    /// Default ZSCII 155..223 to Unicode translation, per the standard
    static ref UNICODE_TABLE: HashMap<u16, char> = {
        let pairs: &[(u16, u32)] = &[
            (155, 0xE4), (156, 0xF6), (157, 0xFC), (158, 0xC4), (159, 0xD6),
            (160, 0xDC), (161, 0xDF), (162, 0xBB), (163, 0xAB), (164, 0xEB),
            (165, 0xEF), (166, 0xFF), (167, 0xCB), (168, 0xCF), (169, 0xE1),
            (170, 0xE9), (171, 0xED), (172, 0xF3), (173, 0xFA), (174, 0xFD),
            (175, 0xC1), (176, 0xC9), (177, 0xCD), (178, 0xD3), (179, 0xDA),
            (180, 0xDD), (181, 0xE0), (182, 0xE8), (183, 0xEC), (184, 0xF2),
            (185, 0xF9), (186, 0xC0), (187, 0xC8), (188, 0xCC), (189, 0xD2),
            (190, 0xD9), (191, 0xE2), (192, 0xEA), (193, 0xEE), (194, 0xF4),
            (195, 0xFB), (196, 0xC2), (197, 0xCA), (198, 0xCE), (199, 0xD4),
            (200, 0xDB), (201, 0xE5), (202, 0xC5), (203, 0xF8), (204, 0xD8),
            (205, 0xE3), (206, 0xF1), (207, 0xF5), (208, 0xC3), (209, 0xD1),
            (210, 0xD5), (211, 0xE6), (212, 0xC6), (213, 0xE7), (214, 0xC7),
            (215, 0xFE), (216, 0xF0), (217, 0xDE), (218, 0xD0), (219, 0xA3),
            (220, 0x153), (221, 0x152), (222, 0xA1), (223, 0xBF),
        ];
        pairs
            .iter()
            .map(|&(z, u)| (z, char::from_u32(u).unwrap()))
            .collect()
    };
}

/// Map a ZSCII code to its printable character, if it has one
pub fn zscii_to_char(code: u16) -> Option<char> {
    match code {
        13 => Some('\n'),
        32..=126 => Some(code as u8 as char),
        155..=251 => Some(*UNICODE_TABLE.get(&code).unwrap_or(&'?')),
        _ => None,
    }
}

/// Decode a Z-string from memory starting at the given address.
/// Returns the decoded string and the number of bytes consumed.
pub fn decode_string(
    mem: &Memory,
    addr: usize,
    abbrev_base: usize,
) -> Result<(String, usize), Fault> {
    decode_inner(mem, addr, abbrev_base, false)
}

/// Read one abbreviation table entry and decode its string
pub fn abbreviation(mem: &Memory, abbrev_base: usize, index: usize) -> Result<String, Fault> {
    if index > 95 {
        return Err(Fault::BadText { addr: abbrev_base });
    }
    let entry_addr = abbrev_base + 2 * index;
    let word_addr = mem.read_word(entry_addr)? as usize;
    let (text, _) = decode_inner(mem, word_addr * 2, abbrev_base, true)?;
    Ok(text)
}

fn decode_inner(
    mem: &Memory,
    addr: usize,
    abbrev_base: usize,
    in_abbrev: bool,
) -> Result<(String, usize), Fault> {
    // Collect all Z-characters up to the end bit
    let mut zchars = Vec::new();
    let mut reader = mem.reader(addr);
    loop {
        let word = reader.next_word()?;
        zchars.push(((word >> 10) & 0x1F) as u8);
        zchars.push(((word >> 5) & 0x1F) as u8);
        zchars.push((word & 0x1F) as u8);
        if word & 0x8000 != 0 {
            break;
        }
    }
    let consumed = reader.position() - addr;

    let mut result = String::new();
    let mut alphabet = 0u8;
    let mut i = 0;
    while i < zchars.len() {
        let zc = zchars[i];
        i += 1;
        match zc {
            0 => {
                result.push(' ');
                alphabet = 0;
            }
            1..=3 => {
                // Abbreviation: the next Z-character selects the entry
                if in_abbrev {
                    return Err(Fault::BadText { addr });
                }
                let Some(&next) = zchars.get(i) else {
                    debug!("abbreviation marker at end of string at {addr:#06x}");
                    break;
                };
                i += 1;
                let index = 32 * (zc as usize - 1) + next as usize;
                result.push_str(&abbreviation(mem, abbrev_base, index)?);
                alphabet = 0;
            }
            4 => alphabet = 1,
            5 => alphabet = 2,
            _ => {
                if alphabet == 2 && zc == 6 {
                    // 10-bit ZSCII escape
                    if i + 1 >= zchars.len() {
                        debug!("ZSCII escape truncated at end of string at {addr:#06x}");
                        break;
                    }
                    let code = ((zchars[i] as u16) << 5) | zchars[i + 1] as u16;
                    i += 2;
                    if let Some(ch) = zscii_to_char(code) {
                        result.push(ch);
                    } else {
                        debug!("unprintable ZSCII code {code} in string at {addr:#06x}");
                    }
                } else {
                    let table = match alphabet {
                        0 => ALPHABET_A0,
                        1 => ALPHABET_A1,
                        _ => ALPHABET_A2,
                    };
                    result.push(table[(zc - 6) as usize] as char);
                }
                alphabet = 0;
            }
        }
    }

    Ok((result, consumed))
}

/// Encode a word into the 4-byte dictionary key: exactly six Z-characters
/// over two words, padded with Z-character 5, end bit on the second word.
pub fn encode_dict_word(word: &str) -> [u8; 4] {
    let mut zchars: Vec<u8> = Vec::new();
    for ch in word.chars().flat_map(|c| c.to_lowercase()) {
        if zchars.len() >= DICT_KEY_ZCHARS {
            break;
        }
        if let Some(pos) = ALPHABET_A0.iter().position(|&a| a as char == ch) {
            zchars.push(6 + pos as u8);
        } else if let Some(pos) = ALPHABET_A2
            .iter()
            .position(|&a| a as char == ch)
            .filter(|&pos| pos >= 2)
        {
            zchars.push(5);
            zchars.push(6 + pos as u8);
        } else {
            // 10-bit escape for anything outside the alphabets
            let code = if (ch as u32) <= 0xFF { ch as u32 } else { b'?' as u32 };
            zchars.push(5);
            zchars.push(6);
            zchars.push(((code >> 5) & 0x1F) as u8);
            zchars.push((code & 0x1F) as u8);
        }
    }
    zchars.truncate(DICT_KEY_ZCHARS);
    while zchars.len() < DICT_KEY_ZCHARS {
        zchars.push(5);
    }

    let w0 = ((zchars[0] as u16) << 10) | ((zchars[1] as u16) << 5) | zchars[2] as u16;
    let w1 =
        0x8000 | ((zchars[3] as u16) << 10) | ((zchars[4] as u16) << 5) | zchars[5] as u16;
    [(w0 >> 8) as u8, w0 as u8, (w1 >> 8) as u8, w1 as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with(addr: usize, bytes: &[u8]) -> Memory {
        let mut image = vec![0u8; 0x800];
        image[addr..addr + bytes.len()].copy_from_slice(bytes);
        Memory::new(image, 0).unwrap()
    }

    #[test]
    fn test_simple_string() {
        // "hello": h=13, e=10, l=17, l=17, o=20, pad=5
        // word 1: 13<<10 | 10<<5 | 17 = 0x3551
        // word 2: 0x8000 | 17<<10 | 20<<5 | 5 = 0xC685
        let mem = memory_with(0x10, &[0x35, 0x51, 0xC6, 0x85]);
        let (text, len) = decode_string(&mem, 0x10, 0).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(len, 4);
    }

    #[test]
    fn test_string_with_space() {
        // "a b": a=6, space=0, b=7, end bit set
        let word = 0x8000 | (6 << 10) | 7;
        let mem = memory_with(0x10, &[(word >> 8) as u8, word as u8]);
        let (text, len) = decode_string(&mem, 0x10, 0).unwrap();
        assert_eq!(text, "a b");
        assert_eq!(len, 2);
    }

    #[test]
    fn test_shift_to_a2() {
        // "0": shift 5 then A2 index 2 (z=8), padded
        let word = 0x8000 | (5 << 10) | (8 << 5) | 5;
        let mem = memory_with(0x10, &[(word >> 8) as u8, word as u8]);
        let (text, _) = decode_string(&mem, 0x10, 0).unwrap();
        assert_eq!(text, "0");
    }

    #[test]
    fn test_zscii_escape() {
        // ZSCII 155 (a-umlaut): shift 5, escape 6, high 4, low 27
        let w0 = (5 << 10) | (6 << 5) | 4;
        let w1 = 0x8000 | (27 << 10) | (5 << 5) | 5;
        let mem = memory_with(
            0x10,
            &[(w0 >> 8) as u8, w0 as u8, (w1 >> 8) as u8, w1 as u8],
        );
        let (text, _) = decode_string(&mem, 0x10, 0).unwrap();
        assert_eq!(text, "\u{e4}");
    }

    #[test]
    fn test_abbreviation_splice() {
        // Abbreviation 2 holds "the "; the main string is [1, 2, 3] with the
        // end bit, so the trailing Z-char 3 has no entry selector and is
        // dropped rather than starting a nested abbreviation.
        let abbrev_base = 0x40;
        let mut image = vec![0u8; 0x800];
        // entry 2 -> word address 0x60 (byte address 0xC0)
        image[abbrev_base + 4] = 0x00;
        image[abbrev_base + 5] = 0x60;
        // "the ": t=25, h=13, e=10, space=0
        let w0: u16 = (25 << 10) | (13 << 5) | 10;
        let w1: u16 = 0x8000 | (5 << 5) | 5; // space, pad, pad
        image[0xC0] = (w0 >> 8) as u8;
        image[0xC1] = w0 as u8;
        image[0xC2] = (w1 >> 8) as u8;
        image[0xC3] = w1 as u8;
        // main string: z-chars 1, 2, 3 with end bit
        let main: u16 = 0x8000 | (1 << 10) | (2 << 5) | 3;
        image[0x10] = (main >> 8) as u8;
        image[0x11] = main as u8;
        let mem = Memory::new(image, 0).unwrap();

        let (text, _) = decode_string(&mem, 0x10, abbrev_base).unwrap();
        assert_eq!(text, "the ");
    }

    #[test]
    fn test_nested_abbreviation_is_malformed() {
        let abbrev_base = 0x40;
        let mut image = vec![0u8; 0x800];
        // entry 0 -> byte address 0xC0, whose text itself names entry 0
        image[abbrev_base] = 0x00;
        image[abbrev_base + 1] = 0x60;
        let inner: u16 = 0x8000 | (1 << 10) | (0 << 5) | 5;
        image[0xC0] = (inner >> 8) as u8;
        image[0xC1] = inner as u8;
        let main: u16 = 0x8000 | (1 << 10) | (0 << 5) | 5;
        image[0x10] = (main >> 8) as u8;
        image[0x11] = main as u8;
        let mem = Memory::new(image, 0).unwrap();

        assert!(decode_string(&mem, 0x10, abbrev_base).is_err());
    }

    #[test]
    fn test_encode_take() {
        // t=25, a=6, k=16, e=10, pad, pad
        assert_eq!(encode_dict_word("take"), [0x64, 0xD0, 0xA8, 0xA5]);
    }

    #[test]
    fn test_encode_casefolds_and_truncates() {
        assert_eq!(
            encode_dict_word("Lanterns"),
            encode_dict_word("lantern-overlong")
        );
    }

    #[test]
    fn test_encode_decode_round_trip() {
        for word in ["mail", "sword", "x", "grue"] {
            let key = encode_dict_word(word);
            let mem = memory_with(0x10, &key);
            let (text, len) = decode_string(&mem, 0x10, 0).unwrap();
            assert_eq!(text, *word);
            assert_eq!(len, 4);
        }
    }

    #[test]
    fn test_encode_separator() {
        // "," sits in A2 at index 13: shift 5, z=19, then padding
        assert_eq!(encode_dict_word(","), [0x16, 0x65, 0x94, 0xA5]);
    }
}
