//! Instruction executor.
//!
//! `execute` is the only mutator of hart state. On successful commit of any
//! instruction outside the control-transfer family, `pc` advances by 4;
//! control-transfer instructions set `pc` themselves. All arithmetic uses
//! two's-complement wrapping semantics — overflow is never a trap. Every
//! trap path here leaves the register file, CSR bank, and memory exactly as
//! they were before the instruction began: the trap is always returned
//! before any state is committed.

use log::{debug, trace};

use crate::csr::CsrError;
use crate::disasm::fmt_instr;
use crate::hart::CpuState;
use crate::instr::*;
use crate::memory::{Memory, MemoryError};
use crate::trap::{Cause, Trap};

/// Advance one instruction. Returns `Ok(())` on a normal commit (hart state
/// already updated in place) or `Err(Trap)` if the instruction could not
/// complete, in which case `hart` and `memory` are unchanged from their
/// values before the call.
pub fn execute(instr: Instruction, hart: &mut CpuState, memory: &mut Memory) -> Result<(), Trap> {
    let pc = hart.pc;
    trace!("execute pc=0x{pc:08x} instr={}", fmt_instr(&instr));
    match instr {
        Instruction::RegReg { op, rd, rs1, rs2 } => {
            let a = hart.x(rs1);
            let b = hart.x(rs2);
            hart.set_x(rd, reg_op(op, a, b));
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::RegImm { op, rd, rs1, imm } => {
            let a = hart.x(rs1);
            hart.set_x(rd, imm_op(op, a, imm));
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Load { width, rd, rs1, imm } => {
            let addr = hart.x(rs1).wrapping_add(imm as u32);
            let value = load(memory, width, addr, pc)?;
            hart.set_x(rd, value);
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Store { width, rs1, rs2, imm } => {
            let addr = hart.x(rs1).wrapping_add(imm as u32);
            let value = hart.x(rs2);
            store(memory, width, addr, value, pc)?;
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Branch { cond, rs1, rs2, imm } => {
            let a = hart.x(rs1);
            let b = hart.x(rs2);
            if branch_taken(cond, a, b) && imm != 0 {
                hart.pc = pc.wrapping_add(imm as u32);
            } else {
                hart.pc = pc.wrapping_add(4);
            }
            Ok(())
        }
        Instruction::Lui { rd, imm } => {
            hart.set_x(rd, (imm as u32).wrapping_shl(12));
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Auipc { rd, imm } => {
            hart.set_x(rd, pc.wrapping_add((imm as u32).wrapping_shl(12)));
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Jal { rd, imm } => {
            hart.set_x(rd, pc.wrapping_add(4));
            hart.pc = pc.wrapping_add(imm as u32);
            Ok(())
        }
        Instruction::Jalr { rd, rs1, imm } => {
            let target = hart.x(rs1).wrapping_add(imm as u32) & !1u32;
            hart.set_x(rd, pc.wrapping_add(4));
            hart.pc = target;
            Ok(())
        }
        Instruction::Ecall => {
            debug!("ecall at pc=0x{pc:08x} (logged, not trapped)");
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Ebreak => {
            debug!("ebreak at pc=0x{pc:08x} (logged, not trapped)");
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Sret => {
            debug!("sret at pc=0x{pc:08x} (logged, not trapped)");
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Wfi => {
            debug!("wfi at pc=0x{pc:08x} (no interrupt source, treated as a no-op)");
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Fence | Instruction::FenceI => {
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Csr { op, rd, csr, source } => {
            let value = match source {
                CsrSource::Register(r) => hart.x(r),
                CsrSource::Immediate(imm) => imm,
            };
            let old = match op {
                CsrOp::Write => hart.csrs.read_write(csr, value),
                CsrOp::Set => hart.csrs.read_set(csr, value),
                CsrOp::Clear => hart.csrs.read_clear(csr, value),
            }
            .map_err(|CsrError::Unknown(_)| Trap::new(Cause::IllegalInstruction, pc))?;
            hart.set_x(rd, old);
            hart.pc = pc.wrapping_add(4);
            Ok(())
        }
        Instruction::Unknown(word) => {
            debug!("illegal instruction 0x{word:08x} at pc=0x{pc:08x}");
            Err(Trap::new(Cause::IllegalInstruction, pc))
        }
    }
}

fn reg_op(op: RegOp, a: u32, b: u32) -> u32 {
    match op {
        RegOp::Add => a.wrapping_add(b),
        RegOp::Sub => a.wrapping_sub(b),
        RegOp::Sll => a.wrapping_shl(b & 0x1f),
        RegOp::Srl => a.wrapping_shr(b & 0x1f),
        RegOp::Sra => ((a as i32).wrapping_shr(b & 0x1f)) as u32,
        RegOp::Slt => ((a as i32) < (b as i32)) as u32,
        RegOp::Sltu => (a < b) as u32,
        RegOp::Xor => a ^ b,
        RegOp::Or => a | b,
        RegOp::And => a & b,
    }
}

fn imm_op(op: ImmOp, a: u32, imm: i32) -> u32 {
    let imm_u = imm as u32;
    match op {
        ImmOp::Addi => a.wrapping_add(imm_u),
        ImmOp::Slti => ((a as i32) < imm) as u32,
        ImmOp::Sltiu => (a < imm_u) as u32,
        ImmOp::Xori => a ^ imm_u,
        ImmOp::Ori => a | imm_u,
        ImmOp::Andi => a & imm_u,
        ImmOp::Slli => a.wrapping_shl(imm_u & 0x1f),
        ImmOp::Srli => a.wrapping_shr(imm_u & 0x1f),
        ImmOp::Srai => ((a as i32).wrapping_shr(imm_u & 0x1f)) as u32,
    }
}

fn branch_taken(cond: BranchCond, a: u32, b: u32) -> bool {
    match cond {
        BranchCond::Eq => a == b,
        BranchCond::Ne => a != b,
        BranchCond::Lt => (a as i32) < (b as i32),
        BranchCond::Ge => (a as i32) >= (b as i32),
        BranchCond::Ltu => a < b,
        BranchCond::Geu => a >= b,
    }
}

fn load(memory: &Memory, width: LoadWidth, addr: u32, pc: u32) -> Result<u32, Trap> {
    let raw = match width {
        LoadWidth::Byte { signed } => {
            let byte = mem_result(memory.read8(addr), pc, addr, Cause::LoadAccessFault)?;
            if signed {
                byte as i8 as i32 as u32
            } else {
                byte as u32
            }
        }
        LoadWidth::Half { signed } => {
            if addr & 0b1 != 0 {
                return Err(Trap::with_fault_addr(Cause::LoadAddressMisaligned, pc, addr));
            }
            let half = mem_result(memory.read16(addr), pc, addr, Cause::LoadAccessFault)?;
            if signed {
                half as i16 as i32 as u32
            } else {
                half as u32
            }
        }
        LoadWidth::Word => {
            if addr & 0b11 != 0 {
                return Err(Trap::with_fault_addr(Cause::LoadAddressMisaligned, pc, addr));
            }
            mem_result(memory.read32(addr), pc, addr, Cause::LoadAccessFault)?
        }
    };
    Ok(raw)
}

fn store(memory: &mut Memory, width: StoreWidth, addr: u32, value: u32, pc: u32) -> Result<(), Trap> {
    match width {
        StoreWidth::Byte => {
            mem_result(memory.write8(addr, value as u8), pc, addr, Cause::StoreAccessFault)
        }
        StoreWidth::Half => {
            if addr & 0b1 != 0 {
                return Err(Trap::with_fault_addr(Cause::StoreAddressMisaligned, pc, addr));
            }
            mem_result(memory.write16(addr, value as u16), pc, addr, Cause::StoreAccessFault)
        }
        StoreWidth::Word => {
            if addr & 0b11 != 0 {
                return Err(Trap::with_fault_addr(Cause::StoreAddressMisaligned, pc, addr));
            }
            mem_result(memory.write32(addr, value), pc, addr, Cause::StoreAccessFault)
        }
    }
}

fn mem_result<T>(r: Result<T, MemoryError>, pc: u32, addr: u32, cause: Cause) -> Result<T, Trap> {
    r.map_err(|_| Trap::with_fault_addr(cause, pc, addr))
}
