//! Top-level driver: owns the memory allocation and the hart, and runs the
//! fetch-decode-execute loop.
//!
//! The execution core (decoder + executor) only describes the contract a
//! driver must satisfy (see the module docs on [`crate::elf_loader`] and
//! the fetch step below); this module is one concrete, working driver
//! against that contract, matching the reference driver's 1 GiB memory
//! image and `0x000f_fffc` stack-pointer convention.

use crate::decode::decode;
use crate::exec::execute;
use crate::hart::CpuState;
use crate::memory::Memory;
use crate::trap::{Cause, Trap};

/// The reference driver's default memory size.
pub const DEFAULT_MEMORY_SIZE: usize = 1 << 30;

/// The reference driver's default initial stack pointer.
pub const DEFAULT_STACK_TOP: u32 = 0x000f_fffc;

/// Fetch the 32-bit little-endian word at `hart.pc`. Failure is surfaced as
/// an instruction-access-fault trap rather than a `Memory` error, per the
/// driver-loop contract.
pub fn fetch(hart: &CpuState, memory: &Memory) -> Result<u32, Trap> {
    memory
        .read32(hart.pc)
        .map_err(|_| Trap::with_fault_addr(Cause::InstructionAccessFault, hart.pc, hart.pc))
}

/// A running emulator instance: the memory image, the single hart, and a
/// count of instructions retired so far (used to drive `--cycle-breakpoint`
/// in the `emulate` binary; the core itself has no notion of cycle-accurate
/// timing, see spec.md §1's Non-goals).
pub struct Emulator {
    pub memory: Memory,
    pub hart: CpuState,
    pub cycle: u64,
}

impl Emulator {
    pub fn new(memory_size: usize, entry: u32, stack_top: u32) -> Self {
        Self {
            memory: Memory::new(memory_size),
            hart: CpuState::new(entry, stack_top),
            cycle: 0,
        }
    }

    /// Run one fetch-decode-execute cycle.
    pub fn step(&mut self) -> Result<(), Trap> {
        let word = fetch(&self.hart, &self.memory)?;
        let instr = decode(word);
        let result = execute(instr, &mut self.hart, &mut self.memory);
        self.cycle += 1;
        result
    }

    /// Run cycles until a trap occurs, returning it. This never returns
    /// `Ok` — a RV32I program with no OS has no way to halt other than
    /// trapping or running forever.
    pub fn run_until_trap(&mut self) -> Trap {
        loop {
            if let Err(trap) = self.step() {
                return trap;
            }
        }
    }
}
