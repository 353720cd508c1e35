//! Instruction decoder.
//!
//! `decode` is a pure function: its result depends only on the input word.
//! It never fails — an unrecognized opcode/funct combination yields
//! [`Instruction::Unknown`], which the executor turns into an
//! illegal-instruction trap. Decoding is a two-level match on opcode, then
//! funct3/funct7/funct12, per the RV32I base encoding.

use log::trace;

use crate::disasm::fmt_instr;
use crate::fields::*;
use crate::instr::*;

const OPCODE_REG: u32 = 0b011_0011;
const OPCODE_IMM: u32 = 0b001_0011;
const OPCODE_LOAD: u32 = 0b000_0011;
const OPCODE_JALR: u32 = 0b110_0111;
const OPCODE_STORE: u32 = 0b010_0011;
const OPCODE_BRANCH: u32 = 0b110_0011;
const OPCODE_LUI: u32 = 0b011_0111;
const OPCODE_AUIPC: u32 = 0b001_0111;
const OPCODE_JAL: u32 = 0b110_1111;
const OPCODE_SYSTEM: u32 = 0b111_0011;
const OPCODE_FENCE: u32 = 0b000_1111;

pub fn decode(word: u32) -> Instruction {
    let instr = decode_inner(word);
    trace!("decode word=0x{word:08x} -> {}", fmt_instr(&instr));
    instr
}

fn decode_inner(word: u32) -> Instruction {
    match opcode(word) {
        OPCODE_REG => decode_reg(word),
        OPCODE_IMM => decode_imm(word),
        OPCODE_LOAD => decode_load(word),
        OPCODE_JALR => decode_jalr(word),
        OPCODE_STORE => decode_store(word),
        OPCODE_BRANCH => decode_branch(word),
        OPCODE_LUI => Instruction::Lui {
            rd: rd(word),
            imm: imm_u(word),
        },
        OPCODE_AUIPC => Instruction::Auipc {
            rd: rd(word),
            imm: imm_u(word),
        },
        OPCODE_JAL => Instruction::Jal {
            rd: rd(word),
            imm: imm_j(word),
        },
        OPCODE_SYSTEM => decode_system(word),
        OPCODE_FENCE => decode_fence(word),
        _ => Instruction::Unknown(word),
    }
}

fn decode_reg(word: u32) -> Instruction {
    let op = match (funct3(word), funct7(word)) {
        (0b000, 0b000_0000) => RegOp::Add,
        (0b000, 0b010_0000) => RegOp::Sub,
        (0b001, 0b000_0000) => RegOp::Sll,
        (0b010, 0b000_0000) => RegOp::Slt,
        (0b011, 0b000_0000) => RegOp::Sltu,
        (0b100, 0b000_0000) => RegOp::Xor,
        (0b101, 0b000_0000) => RegOp::Srl,
        (0b101, 0b010_0000) => RegOp::Sra,
        (0b110, 0b000_0000) => RegOp::Or,
        (0b111, 0b000_0000) => RegOp::And,
        _ => return Instruction::Unknown(word),
    };
    Instruction::RegReg {
        op,
        rd: rd(word),
        rs1: rs1(word),
        rs2: rs2(word),
    }
}

fn decode_imm(word: u32) -> Instruction {
    let op = match funct3(word) {
        0b000 => ImmOp::Addi,
        0b010 => ImmOp::Slti,
        0b011 => ImmOp::Sltiu,
        0b100 => ImmOp::Xori,
        0b110 => ImmOp::Ori,
        0b111 => ImmOp::Andi,
        0b001 if funct7(word) == 0b000_0000 => ImmOp::Slli,
        0b101 if funct7(word) == 0b000_0000 => ImmOp::Srli,
        0b101 if funct7(word) == 0b010_0000 => ImmOp::Srai,
        _ => return Instruction::Unknown(word),
    };
    // SLLI/SRLI/SRAI use only the low 5 bits of the I-type immediate as a
    // shift amount; the rest of those bits carry the funct7 discriminator
    // already consumed above, so sign extension of the full imm field is
    // harmless here and the executor masks with 0x1F before shifting.
    Instruction::RegImm {
        op,
        rd: rd(word),
        rs1: rs1(word),
        imm: imm_i(word),
    }
}

fn decode_load(word: u32) -> Instruction {
    let width = match funct3(word) {
        0b000 => LoadWidth::Byte { signed: true },
        0b001 => LoadWidth::Half { signed: true },
        0b010 => LoadWidth::Word,
        0b100 => LoadWidth::Byte { signed: false },
        0b101 => LoadWidth::Half { signed: false },
        _ => return Instruction::Unknown(word),
    };
    Instruction::Load {
        width,
        rd: rd(word),
        rs1: rs1(word),
        imm: imm_i(word),
    }
}

fn decode_jalr(word: u32) -> Instruction {
    if funct3(word) != 0b000 {
        return Instruction::Unknown(word);
    }
    Instruction::Jalr {
        rd: rd(word),
        rs1: rs1(word),
        imm: imm_i(word),
    }
}

fn decode_store(word: u32) -> Instruction {
    let width = match funct3(word) {
        0b000 => StoreWidth::Byte,
        0b001 => StoreWidth::Half,
        0b010 => StoreWidth::Word,
        _ => return Instruction::Unknown(word),
    };
    Instruction::Store {
        width,
        rs1: rs1(word),
        rs2: rs2(word),
        imm: imm_s(word),
    }
}

fn decode_branch(word: u32) -> Instruction {
    let cond = match funct3(word) {
        0b000 => BranchCond::Eq,
        0b001 => BranchCond::Ne,
        0b100 => BranchCond::Lt,
        0b101 => BranchCond::Ge,
        0b110 => BranchCond::Ltu,
        0b111 => BranchCond::Geu,
        _ => return Instruction::Unknown(word),
    };
    Instruction::Branch {
        cond,
        rs1: rs1(word),
        rs2: rs2(word),
        imm: imm_b(word),
    }
}

fn decode_system(word: u32) -> Instruction {
    match funct3(word) {
        0b000 => match funct12(word) {
            0x000 => Instruction::Ecall,
            0x001 => Instruction::Ebreak,
            0x102 => Instruction::Sret,
            0x105 => Instruction::Wfi,
            _ => Instruction::Unknown(word),
        },
        0b001 => decode_csr(word, CsrOp::Write, CsrSource::Register(rs1(word))),
        0b010 => decode_csr(word, CsrOp::Set, CsrSource::Register(rs1(word))),
        0b011 => decode_csr(word, CsrOp::Clear, CsrSource::Register(rs1(word))),
        0b101 => decode_csr(word, CsrOp::Write, CsrSource::Immediate(csr_uimm(word))),
        0b110 => decode_csr(word, CsrOp::Set, CsrSource::Immediate(csr_uimm(word))),
        0b111 => decode_csr(word, CsrOp::Clear, CsrSource::Immediate(csr_uimm(word))),
        _ => Instruction::Unknown(word),
    }
}

fn decode_csr(word: u32, op: CsrOp, source: CsrSource) -> Instruction {
    Instruction::Csr {
        op,
        rd: rd(word),
        csr: csr_addr(word),
        source,
    }
}

fn decode_fence(word: u32) -> Instruction {
    match funct3(word) {
        0b000 => Instruction::Fence,
        0b001 => Instruction::FenceI,
        _ => Instruction::Unknown(word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::*;

    #[test]
    fn decode_is_pure() {
        let word = encode_r(0b0110011, 3, 0b000, 1, 2, 0b0000000);
        assert_eq!(decode(word), decode(word));
    }

    #[test]
    fn unknown_opcode_is_unknown() {
        assert_eq!(decode(0x7f), Instruction::Unknown(0x7f));
    }

    #[test]
    fn add_round_trips() {
        let word = encode_r(OPCODE_REG, 3, 0b000, 1, 2, 0b0000000);
        assert_eq!(
            decode(word),
            Instruction::RegReg {
                op: RegOp::Add,
                rd: 3,
                rs1: 1,
                rs2: 2,
            }
        );
    }

    #[test]
    fn sub_vs_add_discriminated_by_funct7() {
        let word = encode_r(OPCODE_REG, 3, 0b000, 1, 2, 0b0100000);
        assert_eq!(
            decode(word),
            Instruction::RegReg {
                op: RegOp::Sub,
                rd: 3,
                rs1: 1,
                rs2: 2,
            }
        );
    }

    #[test]
    fn lw_decodes_with_sign_extended_immediate() {
        let word = encode_i(OPCODE_LOAD, 2, 0b010, 1, -4i32 as u32 & 0xfff);
        assert_eq!(
            decode(word),
            Instruction::Load {
                width: LoadWidth::Word,
                rd: 2,
                rs1: 1,
                imm: -4,
            }
        );
    }

    #[test]
    fn beq_decodes_branch_immediate() {
        let word = encode_b(OPCODE_BRANCH, 0b000, 1, 2, 12);
        assert_eq!(
            decode(word),
            Instruction::Branch {
                cond: BranchCond::Eq,
                rs1: 1,
                rs2: 2,
                imm: 12,
            }
        );
    }

    #[test]
    fn jal_decodes_jump_immediate() {
        let word = encode_j(OPCODE_JAL, 1, 12);
        assert_eq!(
            decode(word),
            Instruction::Jal { rd: 1, imm: 12 }
        );
    }

    #[test]
    fn csrrw_decodes_register_source() {
        let word = encode_i(OPCODE_SYSTEM, 1, 0b001, 2, 0x100);
        assert_eq!(
            decode(word),
            Instruction::Csr {
                op: CsrOp::Write,
                rd: 1,
                csr: 0x100,
                source: CsrSource::Register(2),
            }
        );
    }

    #[test]
    fn csrrwi_decodes_zero_extended_immediate() {
        let word = encode_i(OPCODE_SYSTEM, 1, 0b101, 0b11111, 0x100);
        assert_eq!(
            decode(word),
            Instruction::Csr {
                op: CsrOp::Write,
                rd: 1,
                csr: 0x100,
                source: CsrSource::Immediate(0b11111),
            }
        );
    }

    #[test]
    fn ecall_ebreak_distinguished_by_funct12() {
        let ecall = encode_i(OPCODE_SYSTEM, 0, 0b000, 0, 0x000);
        let ebreak = encode_i(OPCODE_SYSTEM, 0, 0b000, 0, 0x001);
        assert_eq!(decode(ecall), Instruction::Ecall);
        assert_eq!(decode(ebreak), Instruction::Ebreak);
    }

    #[test]
    fn fence_and_fence_i() {
        let fence = encode_i(OPCODE_FENCE, 0, 0b000, 0, 0);
        let fence_i = encode_i(OPCODE_FENCE, 0, 0b001, 0, 0);
        assert_eq!(decode(fence), Instruction::Fence);
        assert_eq!(decode(fence_i), Instruction::FenceI);
    }

    #[test]
    fn jalr_requires_funct3_zero() {
        let good = encode_i(OPCODE_JALR, 1, 0b000, 2, 4);
        let bad = encode_i(OPCODE_JALR, 1, 0b010, 2, 4);
        assert!(matches!(decode(good), Instruction::Jalr { .. }));
        assert!(matches!(decode(bad), Instruction::Unknown(_)));
    }
}
