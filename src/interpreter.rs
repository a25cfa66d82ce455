//! The execution engine
//!
//! Fetch, decode, execute: one instruction at a time, strictly
//! sequential. Dispatch is a single exhaustive match over the v3
//! instruction set, so a missing handler is a compile error rather than
//! a runtime surprise. The only blocking point is `sread`, where the
//! host either supplies a line or cancels the game.

use log::{debug, info, trace};

use crate::dictionary::{self, Dictionary};
use crate::fault::Fault;
use crate::frame::{CallFrame, MAX_LOCALS};
use crate::host::{Host, InputEvent};
use crate::instruction::{Branch, BranchTarget, Instruction, OperandType};
use crate::opcode_tables::Opcode;
use crate::snapshot::Snapshot;
use crate::text;
use crate::vm::Vm;
use crate::zobject::ObjectSystem;
use crate::zrand::ZRand;

/// Output stream 3 may nest this deep
const STREAM3_DEPTH: usize = 16;

/// Top-level machine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Loaded,
    Running,
    AwaitingInput,
    Halted,
}

/// Result of executing one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    Continue,
    Quit,
}

/// An active memory-table redirection (output stream 3)
struct Stream3 {
    table_addr: usize,
    written: usize,
}

pub struct Interpreter<H: Host> {
    pub vm: Vm,
    host: H,
    rng: ZRand,
    state: RunState,
    dictionary: Option<Dictionary>,
    screen_enabled: bool,
    stream3: Vec<Stream3>,
    instruction_count: u64,
}

impl<H: Host> Interpreter<H> {
    pub fn new(vm: Vm, host: H) -> Interpreter<H> {
        Interpreter::with_rng(vm, host, ZRand::new_uniform())
    }

    pub fn with_rng(vm: Vm, host: H, rng: ZRand) -> Interpreter<H> {
        Interpreter {
            vm,
            host,
            rng,
            state: RunState::Loaded,
            dictionary: None,
            screen_enabled: true,
            stream3: Vec::new(),
            instruction_count: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn instructions_executed(&self) -> u64 {
        self.instruction_count
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Drive the machine until the game quits, input is cancelled, or a
    /// fault halts execution.
    pub fn run(&mut self) -> Result<(), Fault> {
        info!("starting execution at {:#07x}", self.vm.pc);
        self.host.split_window(1);
        self.state = RunState::Running;
        loop {
            match self.step() {
                Ok(ExecutionResult::Continue) => {}
                Ok(ExecutionResult::Quit) => {
                    info!(
                        "game over after {} instructions",
                        self.instruction_count
                    );
                    self.state = RunState::Halted;
                    return Ok(());
                }
                Err(fault) => {
                    debug!("fault: {fault}\n{}", self.vm);
                    self.state = RunState::Halted;
                    return Err(fault);
                }
            }
        }
    }

    /// Execute exactly one instruction
    pub fn step(&mut self) -> Result<ExecutionResult, Fault> {
        let instr = Instruction::decode(
            &self.vm.memory,
            self.vm.pc,
            self.vm.header.abbreviations as usize,
        )?;
        trace!("{:#07x}: {}", instr.addr, instr);
        self.vm.pc = instr.next;
        self.instruction_count += 1;
        self.execute(&instr)
    }

    fn execute(&mut self, instr: &Instruction) -> Result<ExecutionResult, Fault> {
        use Opcode::*;
        let args = self.resolve_operands(instr)?;
        let signed = |v: u16| v as i16;

        match instr.opcode {
            // Arithmetic: 16-bit two's complement with wrap-around
            Add => {
                let (a, b) = pair(&args, instr)?;
                self.store_result(instr, a.wrapping_add(b))?;
            }
            Sub => {
                let (a, b) = pair(&args, instr)?;
                self.store_result(instr, a.wrapping_sub(b))?;
            }
            Mul => {
                let (a, b) = pair(&args, instr)?;
                self.store_result(instr, a.wrapping_mul(b))?;
            }
            Div => {
                let (a, b) = pair(&args, instr)?;
                if b == 0 {
                    return Err(Fault::DivZero);
                }
                // Truncates toward zero
                let quotient = signed(a).wrapping_div(signed(b));
                self.store_result(instr, quotient as u16)?;
            }
            Mod => {
                let (a, b) = pair(&args, instr)?;
                if b == 0 {
                    return Err(Fault::DivZero);
                }
                let remainder = signed(a).wrapping_rem(signed(b));
                self.store_result(instr, remainder as u16)?;
            }
            Or => {
                let (a, b) = pair(&args, instr)?;
                self.store_result(instr, a | b)?;
            }
            And => {
                let (a, b) = pair(&args, instr)?;
                self.store_result(instr, a & b)?;
            }
            Not => {
                let a = arg(&args, 0, instr)?;
                self.store_result(instr, !a)?;
            }

            // Comparisons and other branching 2OPs
            Je => {
                let first = arg(&args, 0, instr)?;
                if args.len() < 2 {
                    return Err(Fault::BadOperands { addr: instr.addr });
                }
                let cond = args[1..].contains(&first);
                self.branch_on(instr, cond)?;
            }
            Jl => {
                let (a, b) = pair(&args, instr)?;
                self.branch_on(instr, signed(a) < signed(b))?;
            }
            Jg => {
                let (a, b) = pair(&args, instr)?;
                self.branch_on(instr, signed(a) > signed(b))?;
            }
            Jz => {
                let a = arg(&args, 0, instr)?;
                self.branch_on(instr, a == 0)?;
            }
            Jin => {
                let (a, b) = pair(&args, instr)?;
                let cond = self.vm.get_parent(a)? == b;
                self.branch_on(instr, cond)?;
            }
            Test => {
                let (a, b) = pair(&args, instr)?;
                self.branch_on(instr, a & b == b)?;
            }
            DecChk => {
                let (var, limit) = pair(&args, instr)?;
                let value = signed(self.vm.read_variable_in_place(var as u8)?).wrapping_sub(1);
                self.vm.write_variable_in_place(var as u8, value as u16)?;
                self.branch_on(instr, value < signed(limit))?;
            }
            IncChk => {
                let (var, limit) = pair(&args, instr)?;
                let value = signed(self.vm.read_variable_in_place(var as u8)?).wrapping_add(1);
                self.vm.write_variable_in_place(var as u8, value as u16)?;
                self.branch_on(instr, value > signed(limit))?;
            }

            // Variables and memory
            Store => {
                let (var, value) = pair(&args, instr)?;
                self.vm.write_variable_in_place(var as u8, value)?;
            }
            Load => {
                let var = arg(&args, 0, instr)?;
                let value = self.vm.read_variable_in_place(var as u8)?;
                self.store_result(instr, value)?;
            }
            Inc => {
                let var = arg(&args, 0, instr)?;
                let value = signed(self.vm.read_variable_in_place(var as u8)?).wrapping_add(1);
                self.vm.write_variable_in_place(var as u8, value as u16)?;
            }
            Dec => {
                let var = arg(&args, 0, instr)?;
                let value = signed(self.vm.read_variable_in_place(var as u8)?).wrapping_sub(1);
                self.vm.write_variable_in_place(var as u8, value as u16)?;
            }
            Loadw => {
                let (base, index) = pair(&args, instr)?;
                let addr = base.wrapping_add(index.wrapping_mul(2));
                let value = self.vm.read_word(addr as u32)?;
                self.store_result(instr, value)?;
            }
            Loadb => {
                let (base, index) = pair(&args, instr)?;
                let addr = base.wrapping_add(index);
                let value = self.vm.read_byte(addr as u32)? as u16;
                self.store_result(instr, value)?;
            }
            Storew => {
                let (base, index) = pair(&args, instr)?;
                let value = arg(&args, 2, instr)?;
                let addr = base.wrapping_add(index.wrapping_mul(2));
                self.vm.write_word(addr as u32, value)?;
            }
            Storeb => {
                let (base, index) = pair(&args, instr)?;
                let value = arg(&args, 2, instr)?;
                let addr = base.wrapping_add(index);
                self.vm.write_byte(addr as u32, value as u8)?;
            }
            Push => {
                let a = arg(&args, 0, instr)?;
                self.vm.push(a)?;
            }
            Pull => {
                let var = arg(&args, 0, instr)?;
                let value = self.vm.pop()?;
                self.vm.write_variable_in_place(var as u8, value)?;
            }
            Pop => {
                self.vm.pop()?;
            }

            // Objects
            TestAttr => {
                let (obj, attr) = pair(&args, instr)?;
                let cond = self.vm.test_attr(obj, attr)?;
                self.branch_on(instr, cond)?;
            }
            SetAttr => {
                let (obj, attr) = pair(&args, instr)?;
                self.vm.set_attr(obj, attr)?;
            }
            ClearAttr => {
                let (obj, attr) = pair(&args, instr)?;
                self.vm.clear_attr(obj, attr)?;
            }
            InsertObj => {
                let (obj, dest) = pair(&args, instr)?;
                self.vm.insert_obj(obj, dest)?;
            }
            RemoveObj => {
                let obj = arg(&args, 0, instr)?;
                self.vm.remove_obj(obj)?;
            }
            GetParent => {
                let obj = arg(&args, 0, instr)?;
                let parent = self.vm.get_parent(obj)?;
                self.store_result(instr, parent)?;
            }
            GetSibling => {
                let obj = arg(&args, 0, instr)?;
                let sibling = self.vm.get_sibling(obj)?;
                self.store_result(instr, sibling)?;
                self.branch_on(instr, sibling != 0)?;
            }
            GetChild => {
                let obj = arg(&args, 0, instr)?;
                let child = self.vm.get_child(obj)?;
                self.store_result(instr, child)?;
                self.branch_on(instr, child != 0)?;
            }
            GetProp => {
                let (obj, prop) = pair(&args, instr)?;
                let value = self.vm.get_prop(obj, prop as u8)?;
                self.store_result(instr, value)?;
            }
            GetPropAddr => {
                let (obj, prop) = pair(&args, instr)?;
                let addr = self.vm.get_prop_addr(obj, prop as u8)?;
                self.store_result(instr, addr)?;
            }
            GetPropLen => {
                let addr = arg(&args, 0, instr)?;
                let len = self.vm.get_prop_len(addr)?;
                self.store_result(instr, len)?;
            }
            GetNextProp => {
                let (obj, prop) = pair(&args, instr)?;
                let next = self.vm.get_next_prop(obj, prop as u8)?;
                self.store_result(instr, next as u16)?;
            }
            PutProp => {
                let (obj, prop) = pair(&args, instr)?;
                let value = arg(&args, 2, instr)?;
                self.vm.put_prop(obj, prop as u8, value)?;
            }

            // Control flow
            Call => self.do_call(instr, &args)?,
            Ret => {
                let value = arg(&args, 0, instr)?;
                self.return_from_routine(value)?;
            }
            Rtrue => self.return_from_routine(1)?,
            Rfalse => self.return_from_routine(0)?,
            RetPopped => {
                let value = self.vm.pop()?;
                self.return_from_routine(value)?;
            }
            Jump => {
                let offset = signed(arg(&args, 0, instr)?);
                let dest = instr.next as i64 + offset as i64 - 2;
                if dest < 0 {
                    return Err(Fault::OutOfBounds { addr: 0 });
                }
                self.vm.pc = dest as u32;
            }
            Nop => {}
            Quit => return Ok(ExecutionResult::Quit),
            Restart => {
                self.vm.restart()?;
                self.screen_enabled = true;
                self.stream3.clear();
                self.dictionary = None;
            }

            // Printing
            Print => {
                let text = instr.text.as_deref().unwrap_or_default().to_string();
                self.emit(&text)?;
            }
            PrintRet => {
                let text = instr.text.as_deref().unwrap_or_default().to_string();
                self.emit(&text)?;
                self.emit("\n")?;
                self.return_from_routine(1)?;
            }
            NewLine => self.emit("\n")?,
            PrintNum => {
                let value = signed(arg(&args, 0, instr)?);
                self.emit(&value.to_string())?;
            }
            PrintChar => {
                let code = arg(&args, 0, instr)?;
                match text::zscii_to_char(code) {
                    Some(ch) => self.emit_char(ch)?,
                    None => debug!("print_char of unprintable ZSCII {code}"),
                }
            }
            PrintAddr => {
                let addr = arg(&args, 0, instr)?;
                let (text, _) = text::decode_string(
                    &self.vm.memory,
                    addr as usize,
                    self.vm.header.abbreviations as usize,
                )?;
                self.emit(&text)?;
            }
            PrintPaddr => {
                let packed = arg(&args, 0, instr)?;
                let (text, _) = text::decode_string(
                    &self.vm.memory,
                    Vm::unpack_addr(packed) as usize,
                    self.vm.header.abbreviations as usize,
                )?;
                self.emit(&text)?;
            }
            PrintObj => {
                let obj = arg(&args, 0, instr)?;
                let name = self.vm.short_name(obj)?;
                let is_location = obj == self.vm.read_global(0x10)?;
                self.emit_object(&name, is_location)?;
            }

            // Host-facing odds and ends
            Sread => return self.do_sread(instr, &args),
            ShowStatus => self.refresh_status()?,
            Verify => {
                let sum = self.vm.memory.checksum(self.vm.header.file_length);
                self.branch_on(instr, sum == self.vm.header.checksum)?;
            }
            Piracy => self.branch_on(instr, true)?,
            Save => self.do_save(instr)?,
            Restore => self.do_restore(instr)?,
            Random => {
                let range = signed(arg(&args, 0, instr)?);
                let value = if range > 0 {
                    self.rng.next_in_range(range as u16)
                } else {
                    if range == 0 {
                        self.rng.reseed_unpredictable();
                    } else {
                        self.rng.reseed(range.unsigned_abs() as u64);
                    }
                    0
                };
                self.store_result(instr, value)?;
            }
            SplitWindow => {
                let lines = arg(&args, 0, instr)?;
                self.host.split_window(lines);
            }
            SetWindow => {
                let window = arg(&args, 0, instr)?;
                self.host.set_window(window);
            }
            OutputStream => self.do_output_stream(instr, &args)?,
            InputStream => {
                let stream = arg(&args, 0, instr)?;
                if stream != 0 {
                    debug!("input stream {stream} not supported, keeping the keyboard");
                }
            }
            SoundEffect => {
                debug!("sound_effect ignored");
            }
        }
        Ok(ExecutionResult::Continue)
    }

    /// Replace variable operands with their values, in operand order
    fn resolve_operands(&mut self, instr: &Instruction) -> Result<Vec<u16>, Fault> {
        let mut args = Vec::with_capacity(instr.operands.len());
        for operand in &instr.operands {
            let value = match operand.kind {
                OperandType::Variable => self.vm.read_variable(operand.value as u8)?,
                _ => operand.value,
            };
            args.push(value);
        }
        Ok(args)
    }

    fn store_result(&mut self, instr: &Instruction, value: u16) -> Result<(), Fault> {
        if let Some(var) = instr.store {
            self.vm.write_variable(var, value)?;
        }
        Ok(())
    }

    /// Resolve a branch: when the condition matches the branch polarity,
    /// jump, or return false/true for the sentinel offsets.
    fn branch_on(&mut self, instr: &Instruction, cond: bool) -> Result<(), Fault> {
        let branch = instr
            .branch
            .ok_or(Fault::BadOperands { addr: instr.addr })?;
        if cond != branch.on_true {
            return Ok(());
        }
        match branch.target {
            BranchTarget::ReturnFalse => self.return_from_routine(0),
            BranchTarget::ReturnTrue => self.return_from_routine(1),
            BranchTarget::Address(dest) => {
                self.vm.pc = dest;
                Ok(())
            }
        }
    }

    fn return_from_routine(&mut self, value: u16) -> Result<(), Fault> {
        let frame = self.vm.pop_frame()?;
        self.vm.pc = frame.resume_pc;
        if let Some(var) = frame.store {
            self.vm.write_variable(var, value)?;
        }
        Ok(())
    }

    fn do_call(&mut self, instr: &Instruction, args: &[u16]) -> Result<(), Fault> {
        let packed = arg(args, 0, instr)?;
        if packed == 0 {
            // A call to address 0 just yields false
            return self.store_result(instr, 0);
        }
        let addr = Vm::unpack_addr(packed);
        let mut reader = self.vm.memory.reader(addr as usize);
        let count = reader.next_byte()? as usize;
        if count > MAX_LOCALS {
            return Err(Fault::BadRoutine { addr });
        }
        let mut defaults = Vec::with_capacity(count);
        for _ in 0..count {
            defaults.push(reader.next_word()?);
        }
        let entry = reader.position() as u32;
        let frame = CallFrame::new(self.vm.pc, instr.store, &defaults, &args[1..]);
        self.vm.push_frame(frame)?;
        debug!(
            "call {entry:#07x} with {} arguments into {count} locals",
            args.len() - 1
        );
        self.vm.pc = entry;
        Ok(())
    }

    fn do_sread(
        &mut self,
        instr: &Instruction,
        args: &[u16],
    ) -> Result<ExecutionResult, Fault> {
        let text_addr = arg(args, 0, instr)? as usize;
        let parse_addr = arg(args, 1, instr)? as usize;

        self.refresh_status()?;
        let max_len = self.vm.memory.read_byte(text_addr)? as usize;

        self.state = RunState::AwaitingInput;
        let event = self.host.read_line(max_len);
        self.state = RunState::Running;

        let line = match event {
            InputEvent::Line(line) => line,
            InputEvent::Quit => {
                info!("input cancelled by the host");
                return Ok(ExecutionResult::Quit);
            }
        };

        let mut bytes: Vec<u8> = line
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii() && *c != '\0')
            .map(|c| c as u8)
            .collect();
        bytes.truncate(max_len);
        for (i, &b) in bytes.iter().enumerate() {
            self.vm.memory.write_byte(text_addr + 1 + i, b)?;
        }
        self.vm.memory.write_byte(text_addr + 1 + bytes.len(), 0)?;

        if self.dictionary.is_none() {
            self.dictionary = Some(Dictionary::load(
                &self.vm.memory,
                self.vm.header.dictionary as usize,
            )?);
        }
        let dict = self.dictionary.as_ref().expect("loaded above");
        dictionary::tokenize(&mut self.vm, dict, text_addr, parse_addr)?;
        Ok(ExecutionResult::Continue)
    }

    fn refresh_status(&mut self) -> Result<(), Fault> {
        let location = self.vm.read_global(0x10)?;
        let name = if location == 0 {
            String::new()
        } else {
            self.vm.short_name(location)?
        };
        let a = self.vm.read_global(0x11)? as i16;
        let b = self.vm.read_global(0x12)?;
        self.host
            .show_status(&name, a, b, self.vm.header.status_is_time());
        Ok(())
    }

    fn do_save(&mut self, instr: &Instruction) -> Result<(), Fault> {
        // A later restore resumes as if the save had just succeeded, so the
        // snapshot records the success branch's destination.
        let resume = match instr.branch {
            Some(Branch {
                on_true: true,
                target: BranchTarget::Address(dest),
            }) => dest,
            _ => self.vm.pc,
        };
        let blob = Snapshot::capture_at(&self.vm, resume).to_bytes();
        let saved = self.host.save(&blob);
        self.branch_on(instr, saved)
    }

    fn do_restore(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let restored = match self.host.restore() {
            Some(bytes) => match Snapshot::from_bytes(&bytes)
                .and_then(|snapshot| snapshot.apply(&mut self.vm))
            {
                Ok(()) => true,
                Err(e) => {
                    debug!("restore failed: {e}");
                    false
                }
            },
            None => false,
        };
        if restored {
            // The PC now points where the save's success branch led
            Ok(())
        } else {
            self.branch_on(instr, false)
        }
    }

    fn do_output_stream(&mut self, instr: &Instruction, args: &[u16]) -> Result<(), Fault> {
        let selector = arg(args, 0, instr)? as i16;
        match selector {
            0 => {}
            1 => self.screen_enabled = true,
            -1 => self.screen_enabled = false,
            3 => {
                if self.stream3.len() >= STREAM3_DEPTH {
                    return Err(Fault::StreamNesting);
                }
                let table_addr = arg(args, 1, instr)? as usize;
                self.stream3.push(Stream3 {
                    table_addr,
                    written: 0,
                });
            }
            -3 => match self.stream3.pop() {
                Some(stream) => {
                    self.vm
                        .memory
                        .write_word(stream.table_addr, stream.written as u16)?;
                }
                None => debug!("output stream 3 deselected while inactive"),
            },
            2 | -2 | 4 | -4 => debug!("output stream {selector} not supported, ignored"),
            _ => debug!("unknown output stream {selector}, ignored"),
        }
        Ok(())
    }

    /// Route text to the active output target: the topmost stream-3 table
    /// when one is selected, the host's screen otherwise.
    fn emit(&mut self, text: &str) -> Result<(), Fault> {
        if let Some(stream) = self.stream3.last_mut() {
            for ch in text.chars() {
                let code = if ch == '\n' {
                    13
                } else if ch.is_ascii() {
                    ch as u8
                } else {
                    b'?'
                };
                self.vm
                    .memory
                    .write_byte(stream.table_addr + 2 + stream.written, code)?;
                stream.written += 1;
            }
        } else if self.screen_enabled {
            self.host.write_text(text);
        }
        Ok(())
    }

    fn emit_char(&mut self, ch: char) -> Result<(), Fault> {
        if self.stream3.is_empty() {
            if self.screen_enabled {
                self.host.write_char(ch);
            }
            Ok(())
        } else {
            self.emit(&ch.to_string())
        }
    }

    fn emit_object(&mut self, name: &str, is_location: bool) -> Result<(), Fault> {
        if self.stream3.is_empty() {
            if self.screen_enabled {
                self.host.write_object(name, is_location);
            }
            Ok(())
        } else {
            self.emit(name)
        }
    }
}

fn arg(args: &[u16], index: usize, instr: &Instruction) -> Result<u16, Fault> {
    args.get(index)
        .copied()
        .ok_or(Fault::BadOperands { addr: instr.addr })
}

fn pair(args: &[u16], instr: &Instruction) -> Result<(u16, u16), Fault> {
    Ok((arg(args, 0, instr)?, arg(args, 1, instr)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_headless::HeadlessHost;
    use test_log::test;

    /// A story image with code at 0x0900 and the usual tables below the
    /// static-memory fence at 0x0800.
    fn story_with_code(code: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x1200];
        bytes[0x00] = 3;
        bytes[0x04] = 0x08; // high memory at 0x0800
        bytes[0x06] = 0x09; // initial PC at 0x0900
        bytes[0x08] = 0x06; // dictionary at 0x0600
        bytes[0x0A] = 0x03; // object table at 0x0300
        bytes[0x0C] = 0x01; // globals at 0x0100
        bytes[0x0E] = 0x08; // static memory at 0x0800
        bytes[0x1A] = 0x09; // file length 0x1200
        bytes[0x1B] = 0x00;
        // empty dictionary: no separators, minimal entry length
        bytes[0x601] = 4;
        bytes[0x900..0x900 + code.len()].copy_from_slice(code);
        bytes
    }

    fn run_code(code: &[u8]) -> Interpreter<HeadlessHost> {
        let vm = Vm::new(story_with_code(code)).unwrap();
        let mut interp = Interpreter::new(vm, HeadlessHost::new());
        interp.run().unwrap();
        interp
    }

    #[test]
    fn test_print_num_and_new_line() {
        // print_num #42; new_line; quit
        let interp = run_code(&[0xE6, 0x7F, 42, 0xBB, 0xBA]);
        assert_eq!(interp.host().output(), "42\n");
        assert_eq!(interp.state(), RunState::Halted);
    }

    #[test]
    fn test_print_inline_and_char() {
        // print "hi"; print_char '!'; quit
        let word: u16 = 0x8000 | (13 << 10) | (14 << 5) | 5;
        let interp = run_code(&[
            0xB2,
            (word >> 8) as u8,
            word as u8,
            0xE5,
            0x7F,
            b'!',
            0xBA,
        ]);
        assert_eq!(interp.host().output(), "hi!");
    }

    #[test]
    fn test_call_and_return() {
        // call 0x0500 (-> 0x0A00) with args 3, 4 -> G16; quit
        // routine: 2 locals; add L1 L2 -> stack; ret popped
        let mut code = vec![
            0xE0, 0x17, 0x05, 0x00, 0x03, 0x04, 0x10, // call
            0xBA, // quit
        ];
        let routine_offset = 0x0A00 - 0x0900;
        code.resize(routine_offset, 0xB4);
        code.extend_from_slice(&[
            2, 0, 0, 0, 0, // two locals, zero defaults
            0x74, 0x01, 0x02, 0x00, // add V01 V02 -> stack
            0xAB, 0x00, // ret V00
        ]);
        let interp = run_code(&code);
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 7);
    }

    #[test]
    fn test_call_address_zero_stores_false() {
        // call 0 -> G16; quit
        let vm = Vm::new(story_with_code(&[0xE0, 0x3F, 0x00, 0x00, 0x10, 0xBA])).unwrap();
        let mut interp = Interpreter::new(vm, HeadlessHost::new());
        interp.vm.write_global(0x10, 0xFFFF).unwrap();
        interp.run().unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
        assert_eq!(interp.vm.call_depth(), 1);
    }

    #[test]
    fn test_je_branch_taken() {
        // je #7 #7 branches over the first store to the second one
        let interp = run_code(&[
            0x01, 7, 7, 0xC0 | 6, // je 7 7 -> branch +6 to 0x0908
            0x0D, 0x10, 1, // store G16 1
            0xBA, // quit on the not-taken path
            0x0D, 0x10, 2, // store G16 2
            0xBA, // quit
        ]);
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 2);
    }

    #[test]
    fn test_div_semantics() {
        // div #-7 #2 -> G16; mod #-7 #2 -> G17; quit
        let interp = run_code(&[
            0xD7, 0x0F, 0xFF, 0xF9, 0x00, 0x02, 0x10, // div -7 2 -> G16
            0xD8, 0x0F, 0xFF, 0xF9, 0x00, 0x02, 0x11, // mod -7 2 -> G17
            0xBA,
        ]);
        assert_eq!(interp.vm.read_global(0x10).unwrap() as i16, -3);
        assert_eq!(interp.vm.read_global(0x11).unwrap() as i16, -1);
    }

    #[test]
    fn test_div_by_zero_faults() {
        let vm = Vm::new(story_with_code(&[0x17, 7, 0, 0x00, 0xBA])).unwrap();
        let mut interp = Interpreter::new(vm, HeadlessHost::new());
        assert_eq!(interp.run(), Err(Fault::DivZero));
        assert_eq!(interp.state(), RunState::Halted);
    }

    #[test]
    fn test_sread_quit_halts_cleanly() {
        // sread 0x0200 0x0260; quit
        let mut code = vec![0xE4, 0x0F, 0x02, 0x00, 0x02, 0x60, 0xBA];
        code.resize(32, 0xB4);
        let mut bytes = story_with_code(&code);
        bytes[0x200] = 40; // text buffer capacity
        bytes[0x260] = 10; // parse buffer capacity
        let vm = Vm::new(bytes).unwrap();
        let mut interp = Interpreter::new(vm, HeadlessHost::new());
        // No scripted input: the host cancels, the run ends cleanly
        assert_eq!(interp.run(), Ok(()));
        assert_eq!(interp.state(), RunState::Halted);
    }

    #[test]
    fn test_output_stream_redirect() {
        // output_stream 3 table=0x0400; print "hi"; output_stream -3; quit
        let word: u16 = 0x8000 | (13 << 10) | (14 << 5) | 5;
        let interp = run_code(&[
            0xF3, 0x4F, 0x03, 0x04, 0x00, // output_stream 3 0x0400
            0xB2, (word >> 8) as u8, word as u8, // print "hi"
            0xF3, 0x3F, 0xFF, 0xFD, // output_stream -3
            0xBA,
        ]);
        assert_eq!(interp.host().output(), "");
        assert_eq!(interp.vm.read_word(0x400).unwrap(), 2);
        assert_eq!(interp.vm.read_byte(0x402).unwrap(), b'h');
        assert_eq!(interp.vm.read_byte(0x403).unwrap(), b'i');
    }

    #[test]
    fn test_random_seeded_is_deterministic() {
        // random #6 -> G16; quit
        let code = [0xE7, 0x7F, 6, 0x10, 0xBA];
        let draw = |seed| {
            let vm = Vm::new(story_with_code(&code)).unwrap();
            let mut interp =
                Interpreter::with_rng(vm, HeadlessHost::new(), ZRand::new_predictable(seed));
            interp.run().unwrap();
            interp.vm.read_global(0x10).unwrap()
        };
        assert_eq!(draw(99), draw(99));
        let value = draw(7);
        assert!((1..=6).contains(&value));
    }
}
