use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;

use crate::console::Console;
use crate::error::{FatalOpcode, VmError};
use crate::instruction::Instruction;
use crate::loader;
use crate::memory::Memory;
use crate::registers::{Condition, Register, Registers};
use crate::sign_extend::SignExtend;
use crate::trap::TrapVector;

/// Bundles everything one LC-3 run needs: registers, memory, the program
/// counter, the condition flag, the running flag, and a console. Handlers
/// take `&mut self` instead of touching global state, so tests can build as
/// many independent `Vm`s as they like.
pub struct Vm<C: Console> {
    registers: Registers,
    memory: Memory,
    pc: u16,
    condition: Condition,
    running: bool,
    console: C,
}

impl<C: Console> Vm<C> {
    pub fn new(console: C) -> Self {
        Self {
            registers: Registers::new(),
            memory: Memory::new(),
            pc: 0x3000,
            condition: Condition::Zero,
            running: true,
            console,
        }
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn register(&self, r: Register) -> u16 {
        self.registers.read(r)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Reads a raw memory word without going through the console MMIO hook.
    /// Intended for test setup and inspection, not for instruction execution.
    pub fn peek(&self, address: u16) -> u16 {
        self.memory.peek(address)
    }

    pub fn write_memory(&mut self, address: u16, value: u16) {
        self.memory.write(address, value);
    }

    /// Loads a big-endian image (2-byte origin, then payload words) from
    /// `path` into memory, returning the origin it was placed at.
    pub fn load_image_file(&mut self, path: &Path) -> std::io::Result<u16> {
        loader::load_file(path, &mut self.memory)
    }

    /// Loads a big-endian image from any reader, for callers that already
    /// have the bytes in hand (tests, embedders).
    pub fn load_image(&mut self, reader: &mut impl std::io::Read) -> std::io::Result<u16> {
        loader::load(reader, &mut self.memory)
    }

    fn mem_read(&mut self, address: u16) -> Result<u16, VmError> {
        Ok(self.memory.read(address, &mut self.console)?)
    }

    fn mem_write(&mut self, address: u16, value: u16) {
        self.memory.write(address, value);
    }

    fn update_flags(&mut self, r: Register) {
        self.condition = Condition::from_value(self.registers.read(r));
    }

    /// Runs until `HALT`, a fatal opcode, or `interrupted` is observed
    /// between instructions.
    pub fn run(&mut self, interrupted: &AtomicBool) -> Result<(), VmError> {
        while self.running {
            if interrupted.load(Ordering::Relaxed) {
                return Err(VmError::Interrupted);
            }
            self.step()?;
        }
        Ok(())
    }

    /// Fetches, increments PC, decodes, and executes one instruction.
    pub fn step(&mut self) -> Result<(), VmError> {
        let instruction = self.mem_read(self.pc)?;
        self.pc = self.pc.wrapping_add(1);
        let decoded = Instruction::decode(instruction);
        self.execute(decoded)
    }

    fn execute(&mut self, instruction: Instruction) -> Result<(), VmError> {
        match instruction {
            // BR - Conditional Branch
            //
            // Assembler Formats
            //
            //      BRn LABEL   BRzp LABEL
            //      BRz LABEL   BRnp LABEL
            //      BRp LABEL   BRnz LABEL
            //      BR  LABEL   BRnzp LABEL
            //
            // Description
            //
            // The condition codes specified by bits [11:9] are tested. If any of the
            // condition codes tested is set, the program branches to the location
            // specified by adding the sign-extended pc_offset9 to the incremented PC.
            // BR with no flags set is assembled as BRnzp: always branch.
            Instruction::Br { n, z, p, pc_offset9 } => {
                let taken = match self.condition {
                    Condition::Neg => n,
                    Condition::Zero => z,
                    Condition::Pos => p,
                };
                if taken {
                    self.pc = self.pc.wrapping_add(pc_offset9.sign_extend(9));
                }
            }

            // ADD - Addition
            //
            // Assembler Formats
            //
            //      ADD DR, SR1, SR2
            //      ADD DR, SR1, imm5
            //
            // Description
            //
            // If bit [5] is 0, the second operand comes from SR2; if 1, it comes from
            // sign-extending imm5 to 16 bits. Either way it's added to SR1 and stored
            // in DR, and the condition codes are set from the result.
            Instruction::Add(dr, sr1, sr2) => {
                let value = self.registers.read(sr1).wrapping_add(self.registers.read(sr2));
                self.registers.write(dr, value);
                self.update_flags(dr);
            }
            Instruction::AddImm(dr, sr1, imm5) => {
                let value = self.registers.read(sr1).wrapping_add(imm5.sign_extend(5));
                self.registers.write(dr, value);
                self.update_flags(dr);
            }

            // LD - Load
            //
            // Assembler Format
            //
            //      LD DR, LABEL
            //
            // Description
            //
            // An address is computed by sign-extending pc_offset9 to 16 bits and adding
            // it to the incremented PC. The memory contents at that address are loaded
            // into DR, and the condition codes are set from the loaded value.
            Instruction::Ld(dr, pc_offset9) => {
                let address = self.pc.wrapping_add(pc_offset9.sign_extend(9));
                let value = self.mem_read(address)?;
                self.registers.write(dr, value);
                self.update_flags(dr);
            }

            // ST - Store
            //
            // Assembler Format
            //
            //      ST SR, LABEL
            //
            // Description
            //
            // SR is stored at the address formed by sign-extending pc_offset9 to 16
            // bits and adding it to the incremented PC.
            Instruction::St(sr, pc_offset9) => {
                let address = self.pc.wrapping_add(pc_offset9.sign_extend(9));
                self.mem_write(address, self.registers.read(sr));
            }

            // JSR / JSRR - Jump to Subroutine
            //
            // Assembler Formats
            //
            //      JSR LABEL
            //      JSRR BaseR
            //
            // Description
            //
            // The incremented PC is saved, then the PC jumps to the subroutine's
            // address: either sign-extended pc_offset11 added to the incremented PC
            // (JSR), or the contents of BaseR (JSRR). R7 is finally loaded with the
            // saved PC, the linkage back to the calling routine.
            Instruction::Jsr(pc_offset11) => {
                let linkage = self.pc;
                self.pc = self.pc.wrapping_add(pc_offset11.sign_extend(11));
                self.registers.write(Register::R7, linkage);
            }
            Instruction::Jsrr(base_r) => {
                let linkage = self.pc;
                self.pc = self.registers.read(base_r);
                self.registers.write(Register::R7, linkage);
            }

            // AND - Bit-wise Logical AND
            //
            // Assembler Formats
            //
            //      AND DR, SR1, SR2
            //      AND DR, SR1, imm5
            //
            // Description
            //
            // Same operand-select rule as ADD, but the two operands are bit-wise ANDed
            // instead of added. The condition codes are set from the result.
            Instruction::And(dr, sr1, sr2) => {
                let value = self.registers.read(sr1) & self.registers.read(sr2);
                self.registers.write(dr, value);
                self.update_flags(dr);
            }
            Instruction::AndImm(dr, sr1, imm5) => {
                let value = self.registers.read(sr1) & imm5.sign_extend(5);
                self.registers.write(dr, value);
                self.update_flags(dr);
            }

            // LDR - Load Base+offset
            //
            // Assembler Format
            //
            //      LDR DR, BaseR, offset6
            //
            // Description
            //
            // An address is computed by sign-extending offset6 to 16 bits and adding
            // it to BaseR. The memory contents at that address are loaded into DR, and
            // the condition codes are set from the loaded value.
            Instruction::Ldr(dr, base_r, offset6) => {
                let address = self.registers.read(base_r).wrapping_add(offset6.sign_extend(6));
                let value = self.mem_read(address)?;
                self.registers.write(dr, value);
                self.update_flags(dr);
            }

            // STR - Store Base+offset
            //
            // Assembler Format
            //
            //      STR SR, BaseR, offset6
            //
            // Description
            //
            // SR is stored at the address formed by sign-extending offset6 to 16 bits
            // and adding it to BaseR.
            Instruction::Str(sr, base_r, offset6) => {
                let address = self.registers.read(base_r).wrapping_add(offset6.sign_extend(6));
                self.mem_write(address, self.registers.read(sr));
            }

            // RTI - Return from Interrupt. Supervisor-mode only; this VM never enters
            // supervisor mode, so executing it is always a program error.
            Instruction::Rti => return Err(VmError::Fatal(FatalOpcode::Rti)),

            // NOT - Bit-Wise Complement
            //
            // Assembler Format
            //
            //      NOT DR, SR
            //
            // Description
            //
            // The bit-wise complement of SR is stored in DR, and the condition codes
            // are set from the result.
            Instruction::Not(dr, sr) => {
                let value = !self.registers.read(sr);
                self.registers.write(dr, value);
                self.update_flags(dr);
            }

            // LDI - Load Indirect
            //
            // Assembler Format
            //
            //      LDI DR, LABEL
            //
            // Description
            //
            // An address is computed by sign-extending pc_offset9 to 16 bits and adding
            // it to the incremented PC. What's stored at that address is itself the
            // address of the value to load into DR. The condition codes are set from
            // the loaded value.
            Instruction::Ldi(dr, pc_offset9) => {
                let pointer = self.pc.wrapping_add(pc_offset9.sign_extend(9));
                let address = self.mem_read(pointer)?;
                let value = self.mem_read(address)?;
                self.registers.write(dr, value);
                self.update_flags(dr);
            }

            // STI - Store Indirect
            //
            // Assembler Format
            //
            //      STI SR, LABEL
            //
            // Description
            //
            // Bits [8:0] are sign-extended and added to the incremented PC to form a
            // pointer; what's stored there is the address SR is finally stored to.
            Instruction::Sti(sr, pc_offset9) => {
                let pointer = self.pc.wrapping_add(pc_offset9.sign_extend(9));
                let address = self.mem_read(pointer)?;
                self.mem_write(address, self.registers.read(sr));
            }

            // JMP / RET - Jump
            //
            // Assembler Formats
            //
            //      JMP BaseR
            //      RET
            //
            // Description
            //
            // The program unconditionally jumps to the address in BaseR. RET is the
            // special case BaseR = R7, returning from a JSR/JSRR call.
            Instruction::Jmp(base_r) => {
                self.pc = self.registers.read(base_r);
            }

            // RES - reserved opcode, not emitted by a correct assembler.
            Instruction::Reserved => return Err(VmError::Fatal(FatalOpcode::Reserved)),

            // LEA - Load Effective Address
            //
            // Assembler Format
            //
            //      LEA DR, LABEL
            //
            // Description
            //
            // An address is computed by sign-extending pc_offset9 to 16 bits and adding
            // it to the incremented PC. That address itself (not what it points to) is
            // loaded into DR, and the condition codes are set from it.
            Instruction::Lea(dr, pc_offset9) => {
                let address = self.pc.wrapping_add(pc_offset9.sign_extend(9));
                self.registers.write(dr, address);
                self.update_flags(dr);
            }

            // TRAP - System Call
            //
            // Assembler Format
            //
            //      TRAP trapvector8
            //
            // Description
            //
            // R7 is loaded with the incremented PC as linkage back to the caller, then
            // control passes to the service routine named by the low byte of the
            // instruction.
            Instruction::Trap(trap_vector) => {
                self.registers.write(Register::R7, self.pc);
                self.execute_trap(trap_vector)?;
            }
        }

        Ok(())
    }

    fn execute_trap(&mut self, trap_vector: TrapVector) -> Result<(), VmError> {
        match trap_vector {
            // GETC - Read a single character from the keyboard, unechoed. Its ASCII
            // code is copied into R0; the high eight bits of R0 are cleared.
            TrapVector::Getc => {
                let byte = self.console.read_char()?;
                self.registers.write(Register::R0, u16::from(byte));
                self.update_flags(Register::R0);
            }

            // OUT - Write the character in R0[7:0] to the console display.
            TrapVector::Out => {
                let byte = (self.registers.read(Register::R0) & 0xFF) as u8;
                self.console.write_char(byte)?;
                self.console.flush()?;
            }

            // PUTS - Write a string of ASCII characters to the console, one character
            // per memory location, starting at the address in R0. Terminates at the
            // first 0x0000 word.
            TrapVector::Puts => {
                let mut address = self.registers.read(Register::R0);
                loop {
                    let word = self.mem_read(address)?;
                    if word == 0 {
                        break;
                    }
                    self.console.write_char((word & 0xFF) as u8)?;
                    address = address.wrapping_add(1);
                }
                self.console.flush()?;
            }

            // IN - Print a prompt, then read a single character from the keyboard,
            // echoing it to the console and copying its ASCII code into R0.
            TrapVector::In => {
                self.console.write_str("Enter a character: ")?;
                self.console.flush()?;
                let byte = self.console.read_char()?;
                self.console.write_char(byte)?;
                self.console.flush()?;
                self.registers.write(Register::R0, u16::from(byte));
                self.update_flags(Register::R0);
            }

            // PUTSP - Write a string of ASCII characters to the console, two
            // characters packed per memory location (low byte first, then high byte
            // if nonzero), starting at the address in R0. Terminates at the first
            // 0x0000 word.
            TrapVector::Putsp => {
                let mut address = self.registers.read(Register::R0);
                loop {
                    let word = self.mem_read(address)?;
                    if word == 0 {
                        break;
                    }
                    self.console.write_char((word & 0xFF) as u8)?;
                    let high = (word >> 8) as u8;
                    if high != 0 {
                        self.console.write_char(high)?;
                    }
                    address = address.wrapping_add(1);
                }
                self.console.flush()?;
            }

            // HALT - Halt execution and print a message on the console.
            TrapVector::Halt => {
                self.console.write_str("HALT\n")?;
                self.console.flush()?;
                self.running = false;
            }

            TrapVector::Unknown(code) => {
                warn!("ignoring unknown TRAP vector {:#04x}", code);
            }
        }

        Ok(())
    }
}
