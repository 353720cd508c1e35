//! Emulate a 32-bit RISC-V binary.

use std::io::{self, Read, Write};

use clap::Parser;
use clap_num::maybe_hex;

use riscvemu::driver::{Emulator, DEFAULT_MEMORY_SIZE, DEFAULT_STACK_TOP};
use riscvemu::elf_loader::load_elf;

/// Emulate a 32-bit RISC-V (RV32I + Zicsr) binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the input ELF executable
    input: String,

    /// Single step through each instruction, printing hart state
    #[arg(short, long)]
    debug: bool,

    /// Break on program counter match and begin single-stepping (0x prefix
    /// for hexadecimal)
    #[arg(short, long, value_parser=maybe_hex::<u32>)]
    pc_breakpoint: Option<u32>,

    /// Break on instruction-retired count match and begin single-stepping
    #[arg(short, long, value_parser=maybe_hex::<u64>)]
    cycle_breakpoint: Option<u64>,

    /// Print the 8-word memory region starting at this address at every
    /// step while single-stepping (0x prefix for hexadecimal)
    #[arg(short, long, value_parser=maybe_hex::<u32>)]
    memory: Option<u32>,
}

fn press_enter_to_continue() {
    let mut stdin = io::stdin();
    let mut stdout = io::stdout();
    write!(stdout, "Press enter to continue...").unwrap();
    stdout.flush().unwrap();
    let _ = stdin.read(&mut [0u8]).unwrap();
}

fn print_memory(emu: &Emulator, base: u32) {
    for n in 0..8 {
        let addr = base.wrapping_add(4 * n);
        match emu.memory.read32(addr) {
            Ok(word) => println!("{addr:08x}: {word:08x}"),
            Err(e) => println!("{addr:08x}: <{e}>"),
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut emu = Emulator::new(DEFAULT_MEMORY_SIZE, 0, DEFAULT_STACK_TOP);
    let entry = match load_elf(&args.input, &mut emu.memory) {
        Ok(entry) => entry,
        Err(e) => {
            eprintln!("error loading ELF: {e}");
            std::process::exit(1);
        }
    };
    emu.hart.pc = entry;

    log::info!("beginning execution at pc=0x{entry:08x}");

    let mut stepping = args.debug;
    loop {
        if let Some(pc_breakpoint) = args.pc_breakpoint {
            if emu.hart.pc == pc_breakpoint {
                stepping = true;
            }
        }
        if let Some(cycle_breakpoint) = args.cycle_breakpoint {
            if emu.cycle == cycle_breakpoint {
                stepping = true;
            }
        }

        if let Err(trap) = emu.step() {
            println!(
                "trap: {:?} at pc=0x{:08x} fault_addr={:?}",
                trap.cause, trap.pc, trap.fault_addr
            );
            return;
        }

        if stepping {
            if let Some(base) = args.memory {
                print_memory(&emu, base);
            }
            press_enter_to_continue();
        }
    }
}
