//! Instruction decoder
//!
//! The opcode byte's top bits select the form; the form selects how
//! operand types are read. The opcode's metadata then says whether a
//! store byte, branch bytes, or an inline string follow. `0xBE` opens
//! the extended set, which version 3 does not have.

use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use crate::fault::Fault;
use crate::memory::Memory;
use crate::opcode_tables::Opcode;
use crate::text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Long,
    Short,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    LargeConstant,
    SmallConstant,
    Variable,
    Omitted,
}

impl OperandType {
    fn from_bits(bits: u8) -> OperandType {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Operand {
    pub kind: OperandType,
    pub value: u16,
}

/// Where a taken branch goes. Offsets 0 and 1 are not addresses: they
/// return false or true from the current routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchTarget {
    ReturnFalse,
    ReturnTrue,
    Address(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct Branch {
    /// Branch when the condition matches this polarity
    pub on_true: bool,
    pub target: BranchTarget,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub addr: u32,
    pub opcode: Opcode,
    pub form: Form,
    pub operands: Vec<Operand>,
    pub store: Option<u8>,
    pub branch: Option<Branch>,
    /// Inline string for `print`/`print_ret`, decoded up front
    pub text: Option<String>,
    /// Address of the following instruction
    pub next: u32,
}

impl Instruction {
    pub fn decode(mem: &Memory, addr: u32, abbrev_base: usize) -> Result<Instruction, Fault> {
        let mut reader = mem.reader(addr as usize);
        let opcode_byte = reader.next_byte()?;

        if opcode_byte == 0xBE {
            // Extended form, version 5 and later
            return Err(Fault::UnsupportedOpcode {
                addr,
                raw: opcode_byte,
            });
        }

        let form = match opcode_byte & 0xC0 {
            0xC0 => Form::Variable,
            0x80 => Form::Short,
            _ => Form::Long,
        };

        let (opcode, operand_types) = match form {
            Form::Long => {
                // Two operands; bits 6 and 5 pick byte constant vs variable
                let opcode = Opcode::from_2op(opcode_byte & 0x1F, addr)?;
                let pick = |bit: u8| {
                    if opcode_byte & bit != 0 {
                        OperandType::Variable
                    } else {
                        OperandType::SmallConstant
                    }
                };
                (opcode, vec![pick(0x40), pick(0x20)])
            }
            Form::Short => {
                let kind = OperandType::from_bits((opcode_byte & 0x30) >> 4);
                let number = opcode_byte & 0x0F;
                if kind == OperandType::Omitted {
                    (Opcode::from_0op(number, addr)?, vec![])
                } else {
                    (Opcode::from_1op(number, addr)?, vec![kind])
                }
            }
            Form::Variable => {
                let number = opcode_byte & 0x1F;
                let opcode = if opcode_byte & 0x20 != 0 {
                    Opcode::from_var(number, addr)?
                } else {
                    Opcode::from_2op(number, addr)?
                };
                let types_byte = reader.next_byte()?;
                let mut types = Vec::with_capacity(4);
                for shift in [6u8, 4, 2, 0] {
                    let kind = OperandType::from_bits(types_byte >> shift);
                    if kind == OperandType::Omitted {
                        break;
                    }
                    types.push(kind);
                }
                (opcode, types)
            }
        };

        let mut operands = Vec::with_capacity(operand_types.len());
        for kind in operand_types {
            let value = match kind {
                OperandType::LargeConstant => reader.next_word()?,
                _ => reader.next_byte()? as u16,
            };
            operands.push(Operand { kind, value });
        }

        let store = if opcode.stores() {
            Some(reader.next_byte()?)
        } else {
            None
        };

        let branch = if opcode.branches() {
            Some(Self::decode_branch(&mut reader)?)
        } else {
            None
        };

        let text = if opcode.has_text() {
            let (string, length) = text::decode_string(mem, reader.position(), abbrev_base)?;
            reader.seek(reader.position() + length);
            Some(string)
        } else {
            None
        };

        Ok(Instruction {
            addr,
            opcode,
            form,
            operands,
            store,
            branch,
            text,
            next: reader.position() as u32,
        })
    }

    fn decode_branch(reader: &mut crate::memory::Reader<'_>) -> Result<Branch, Fault> {
        let first = reader.next_byte()?;
        let on_true = first & 0x80 != 0;
        let offset = if first & 0x40 != 0 {
            // Short form: 6-bit unsigned offset
            (first & 0x3F) as i32
        } else {
            // Long form: 14-bit signed offset over two bytes
            let second = reader.next_byte()?;
            let raw = (((first & 0x3F) as i32) << 8) | second as i32;
            if raw >= 0x2000 {
                raw - 0x4000
            } else {
                raw
            }
        };
        let target = match offset {
            0 => BranchTarget::ReturnFalse,
            1 => BranchTarget::ReturnTrue,
            _ => {
                let dest = reader.position() as i64 + offset as i64 - 2;
                if dest < 0 {
                    return Err(Fault::OutOfBounds { addr: 0 });
                }
                BranchTarget::Address(dest as u32)
            }
        };
        Ok(Branch { on_true, target })
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.opcode.name())?;
        for operand in &self.operands {
            match operand.kind {
                OperandType::Variable => write!(f, " V{:02x}", operand.value)?,
                _ => write!(f, " #{:04x}", operand.value)?,
            }
        }
        if let Some(store) = self.store {
            write!(f, " -> V{store:02x}")?;
        }
        if let Some(branch) = &self.branch {
            write!(
                f,
                " ?{}{:?}",
                if branch.on_true { "" } else { "~" },
                branch.target
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with_code_at(addr: usize, code: &[u8]) -> Memory {
        let mut bytes = vec![0u8; 0x3000];
        bytes[addr..addr + code.len()].copy_from_slice(code);
        Memory::new(bytes, 0x100).unwrap()
    }

    fn memory_with_code(code: &[u8]) -> Memory {
        memory_with_code_at(0x500, code)
    }

    #[test]
    fn test_long_form_add() {
        // add #5 #3 -> stack
        let mem = memory_with_code(&[0x14, 5, 3, 0x00]);
        let inst = Instruction::decode(&mem, 0x500, 0).unwrap();
        assert_eq!(inst.opcode, Opcode::Add);
        assert_eq!(inst.form, Form::Long);
        assert_eq!(inst.operands.len(), 2);
        assert_eq!(inst.operands[0].value, 5);
        assert_eq!(inst.store, Some(0));
        assert_eq!(inst.next, 0x504);
    }

    #[test]
    fn test_long_form_variable_operands() {
        // add V01 V02: bits 6 and 5 set
        let mem = memory_with_code(&[0x74, 1, 2, 0x00]);
        let inst = Instruction::decode(&mem, 0x500, 0).unwrap();
        assert_eq!(inst.opcode, Opcode::Add);
        assert_eq!(inst.operands[0].kind, OperandType::Variable);
        assert_eq!(inst.operands[1].kind, OperandType::Variable);
    }

    #[test]
    fn test_short_form_jz_with_branch() {
        // jz #00 ?+5 (branch on true, short offset)
        let mem = memory_with_code(&[0x90, 0x00, 0xC0 | 5]);
        let inst = Instruction::decode(&mem, 0x500, 0).unwrap();
        assert_eq!(inst.opcode, Opcode::Jz);
        let branch = inst.branch.unwrap();
        assert!(branch.on_true);
        // target = 0x503 + 5 - 2
        assert_eq!(branch.target, BranchTarget::Address(0x506));
    }

    #[test]
    fn test_branch_sentinels() {
        let mem = memory_with_code(&[0x90, 0x00, 0xC0, 0x90, 0x00, 0x41]);
        let rfalse = Instruction::decode(&mem, 0x500, 0).unwrap();
        assert_eq!(rfalse.branch.unwrap().target, BranchTarget::ReturnFalse);
        let rtrue = Instruction::decode(&mem, 0x503, 0).unwrap();
        let branch = rtrue.branch.unwrap();
        assert_eq!(branch.target, BranchTarget::ReturnTrue);
        assert!(!branch.on_true);
    }

    #[test]
    fn test_long_branch_negative_offset() {
        // je V00 V00, two-byte branch offset -8192
        let mem = memory_with_code_at(0x2100, &[0x61, 0, 0, 0xA0, 0x00]);
        let inst = Instruction::decode(&mem, 0x2100, 0).unwrap();
        // target = 0x2105 - 8192 - 2
        let expected = 0x2105i64 - 8192 - 2;
        assert_eq!(
            inst.branch.unwrap().target,
            BranchTarget::Address(expected as u32)
        );
    }

    #[test]
    fn test_long_branch_before_memory_start_faults() {
        let mem = memory_with_code(&[0x61, 0, 0, 0xA0, 0x00]);
        assert!(Instruction::decode(&mem, 0x500, 0).is_err());
    }

    #[test]
    fn test_variable_form_var_count() {
        // call #0500 #0a -> V10: types large, small, omitted, omitted
        let mem = memory_with_code(&[0xE0, 0x1F, 0x05, 0x00, 0x0A, 0x10]);
        let inst = Instruction::decode(&mem, 0x500, 0).unwrap();
        assert_eq!(inst.opcode, Opcode::Call);
        assert_eq!(inst.operands.len(), 2);
        assert_eq!(inst.operands[0].value, 0x0500);
        assert_eq!(inst.operands[1].value, 0x0A);
        assert_eq!(inst.store, Some(0x10));
        assert_eq!(inst.next, 0x506);
    }

    #[test]
    fn test_variable_form_2op() {
        // je encoded in variable form with three operands
        let mem = memory_with_code(&[0xC1, 0x57, 0x07, 0x07, 0x07, 0x80 | 0x40 | 3]);
        let inst = Instruction::decode(&mem, 0x500, 0).unwrap();
        assert_eq!(inst.opcode, Opcode::Je);
        assert_eq!(inst.operands.len(), 3);
        assert!(inst.branch.is_some());
    }

    #[test]
    fn test_print_carries_inline_text() {
        // print "hi": h=13, i=14, pad, end bit
        let word: u16 = 0x8000 | (13 << 10) | (14 << 5) | 5;
        let mem = memory_with_code(&[0xB2, (word >> 8) as u8, word as u8, 0xBA]);
        let inst = Instruction::decode(&mem, 0x500, 0).unwrap();
        assert_eq!(inst.opcode, Opcode::Print);
        assert_eq!(inst.text.as_deref(), Some("hi"));
        assert_eq!(inst.next, 0x503);
        let next = Instruction::decode(&mem, inst.next, 0).unwrap();
        assert_eq!(next.opcode, Opcode::Quit);
    }

    #[test]
    fn test_extended_form_faults() {
        let mem = memory_with_code(&[0xBE, 0x01, 0x00]);
        let err = Instruction::decode(&mem, 0x500, 0).unwrap_err();
        assert_eq!(
            err,
            Fault::UnsupportedOpcode {
                addr: 0x500,
                raw: 0xBE
            }
        );
    }

    #[test]
    fn test_decode_past_end_faults() {
        let mem = memory_with_code(&[]);
        assert!(Instruction::decode(&mem, 0x4000, 0).is_err());

        // An instruction cut off mid-operand is out of bounds
        let mut bytes = vec![0u8; 0x1000];
        bytes[0xFFF] = 0x14;
        let mem = Memory::new(bytes, 0x100).unwrap();
        assert!(Instruction::decode(&mem, 0xFFF, 0).is_err());
    }
}
