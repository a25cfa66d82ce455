//! Save-game blobs
//!
//! The blob is host-defined: a small header identifying the story, the PC,
//! the serialized call stack (Quetzal frame records), and an image of
//! dynamic memory. Hosts treat it as opaque; `Snapshot` is the only
//! reader and writer.

use log::debug;

use crate::fault::Fault;
use crate::frame::CallFrame;
use crate::vm::Vm;

const MAGIC: &[u8; 4] = b"GSAV";
const FORMAT_VERSION: u8 = 1;

pub struct Snapshot {
    pub release: u16,
    pub checksum: u16,
    pub pc: u32,
    pub frames: Vec<CallFrame>,
    pub dynamic: Vec<u8>,
}

impl Snapshot {
    /// Capture the machine's restorable state at the current PC
    pub fn capture(vm: &Vm) -> Snapshot {
        Snapshot::capture_at(vm, vm.pc)
    }

    /// Capture with an explicit resume PC (a save records the address its
    /// own success branch would have reached)
    pub fn capture_at(vm: &Vm, pc: u32) -> Snapshot {
        Snapshot {
            release: vm.header.release,
            checksum: vm.header.checksum,
            pc,
            frames: vm.frames().to_vec(),
            dynamic: vm.memory.dynamic().to_vec(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.dynamic.len() + 64);
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&self.release.to_be_bytes());
        bytes.extend_from_slice(&self.checksum.to_be_bytes());
        bytes.push((self.pc >> 16) as u8);
        bytes.push((self.pc >> 8) as u8);
        bytes.push(self.pc as u8);
        bytes.extend_from_slice(&(self.frames.len() as u16).to_be_bytes());
        for frame in &self.frames {
            bytes.extend_from_slice(&frame.to_bytes());
        }
        bytes.extend_from_slice(&(self.dynamic.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&self.dynamic);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Snapshot, Fault> {
        if bytes.len() < 14 || &bytes[0..4] != MAGIC {
            return Err(Fault::BadSave("not a save file".to_string()));
        }
        if bytes[4] != FORMAT_VERSION {
            return Err(Fault::BadSave(format!(
                "save format {} is not supported",
                bytes[4]
            )));
        }
        let release = u16::from_be_bytes([bytes[5], bytes[6]]);
        let checksum = u16::from_be_bytes([bytes[7], bytes[8]]);
        let pc = ((bytes[9] as u32) << 16) | ((bytes[10] as u32) << 8) | bytes[11] as u32;
        let frame_count = u16::from_be_bytes([bytes[12], bytes[13]]) as usize;

        let mut at = 14;
        let mut frames = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            let (frame, used) = CallFrame::from_bytes(&bytes[at..])?;
            frames.push(frame);
            at += used;
        }

        if bytes.len() < at + 2 {
            return Err(Fault::BadSave("truncated dynamic memory".to_string()));
        }
        let dyn_len = u16::from_be_bytes([bytes[at], bytes[at + 1]]) as usize;
        at += 2;
        if bytes.len() < at + dyn_len {
            return Err(Fault::BadSave("truncated dynamic memory".to_string()));
        }
        let dynamic = bytes[at..at + dyn_len].to_vec();

        Ok(Snapshot {
            release,
            checksum,
            pc,
            frames,
            dynamic,
        })
    }

    /// Put the machine back into this snapshot's state. Refuses saves made
    /// from a different story.
    pub fn apply(self, vm: &mut Vm) -> Result<(), Fault> {
        if self.release != vm.header.release || self.checksum != vm.header.checksum {
            return Err(Fault::BadSave(
                "save comes from a different story file".to_string(),
            ));
        }
        debug!(
            "restoring snapshot: pc {:#07x}, {} frames, {} dynamic bytes",
            self.pc,
            self.frames.len(),
            self.dynamic.len()
        );
        vm.memory.load_dynamic(&self.dynamic)?;
        vm.replace_frames(self.frames)?;
        vm.pc = self.pc;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CallFrame;

    fn test_vm() -> Vm {
        let mut bytes = vec![0u8; 0x1000];
        bytes[0x00] = 3;
        bytes[0x02] = 0x00;
        bytes[0x03] = 0x2A; // release 42
        bytes[0x04] = 0x02;
        bytes[0x06] = 0x05;
        bytes[0x0C] = 0x01;
        bytes[0x0E] = 0x02; // static memory at 0x0200
        bytes[0x1B] = 0x80;
        bytes[0x1C] = 0xBE;
        bytes[0x1D] = 0xEF; // checksum field
        Vm::new(bytes).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let mut vm = test_vm();
        vm.write_byte(0x150, 0x77).unwrap();
        vm.push(0x1234).unwrap();
        vm.push_frame(CallFrame::new(0x505, Some(0x10), &[1, 2, 3], &[9]))
            .unwrap();
        vm.pc = 0x777;

        let blob = Snapshot::capture(&vm).to_bytes();

        // Wreck the state, then restore
        let mut other = test_vm();
        other.pc = 0x500;
        Snapshot::from_bytes(&blob).unwrap().apply(&mut other).unwrap();

        assert_eq!(other.pc, 0x777);
        assert_eq!(other.call_depth(), 2);
        assert_eq!(other.read_byte(0x150).unwrap(), 0x77);
        assert_eq!(other.frame().local(0).unwrap(), 9);
        let restored = other.pop_frame().unwrap();
        assert_eq!(restored.resume_pc, 0x505);
        assert_eq!(other.pop().unwrap(), 0x1234);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Snapshot::from_bytes(b"not a save").is_err());
        assert!(Snapshot::from_bytes(b"GSAV").is_err());
    }

    #[test]
    fn test_rejects_other_story() {
        let vm = test_vm();
        let mut blob = Snapshot::capture(&vm).to_bytes();
        blob[7] = 0x00; // different checksum
        blob[8] = 0x01;
        let mut target = test_vm();
        assert!(Snapshot::from_bytes(&blob)
            .unwrap()
            .apply(&mut target)
            .is_err());
    }
}
