//! Synchronous exceptions.
//!
//! A `Trap` halts normal instruction commit: no partial writeback to the
//! register file, CSR bank, or memory, and `pc` is left pointing at the
//! trapping instruction so the driver can consult the hart's trap-vector
//! CSRs before deciding what to do next (see the driver-loop contract).

/// RISC-V exception codes relevant to this core (subset of `scause`'s
/// exception-code field; there is no interrupt bit here because this hart
/// has no interrupt source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    InstructionAccessFault,
    IllegalInstruction,
    Breakpoint,
    LoadAddressMisaligned,
    LoadAccessFault,
    StoreAddressMisaligned,
    StoreAccessFault,
    EnvironmentCall,
}

impl Cause {
    /// The exception code RISC-V assigns this cause in `scause`.
    pub fn code(&self) -> u32 {
        match self {
            Cause::InstructionAccessFault => 1,
            Cause::IllegalInstruction => 2,
            Cause::Breakpoint => 3,
            Cause::LoadAddressMisaligned => 4,
            Cause::LoadAccessFault => 5,
            Cause::StoreAddressMisaligned => 6,
            Cause::StoreAccessFault => 7,
            Cause::EnvironmentCall => 9, // environment call from S-mode
        }
    }
}

/// A synchronous exception raised while executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trap {
    pub cause: Cause,
    /// The faulting virtual address, when the cause is address-related.
    pub fault_addr: Option<u32>,
    /// The program counter of the trapping instruction.
    pub pc: u32,
}

impl Trap {
    pub fn new(cause: Cause, pc: u32) -> Self {
        Self {
            cause,
            fault_addr: None,
            pc,
        }
    }

    pub fn with_fault_addr(cause: Cause, pc: u32, fault_addr: u32) -> Self {
        Self {
            cause,
            fault_addr: Some(fault_addr),
            pc,
        }
    }
}
