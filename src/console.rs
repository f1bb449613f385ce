use std::collections::VecDeque;
use std::io::{self, Read, Write};

use nix::sys::select::{select, FdSet};
use nix::sys::time::{TimeVal, TimeValLike};

/// The three I/O primitives the core depends on: non-blocking key
/// availability, blocking character read, and character write with flush.
/// Terminal setup/teardown (raw mode, echo) is the caller's responsibility;
/// an implementation only needs to behave correctly once that's arranged.
pub trait Console {
    fn key_available(&mut self) -> bool;
    fn read_char(&mut self) -> io::Result<u8>;
    fn write_char(&mut self, byte: u8) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;

    /// Writes a literal byte string, one `write_char` at a time. Used for the
    /// TRAP routines' fixed prompts and messages.
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        for &b in s.as_bytes() {
            self.write_char(b)?;
        }
        Ok(())
    }
}

/// A console backed by the process's own stdin/stdout, polled via `select(2)`.
pub struct TermConsole;

impl TermConsole {
    pub fn new() -> Self {
        TermConsole
    }
}

impl Default for TermConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for TermConsole {
    fn key_available(&mut self) -> bool {
        let mut readfds = FdSet::new();
        readfds.insert(libc::STDIN_FILENO);

        match select(None, &mut readfds, None, None, &mut TimeVal::zero()) {
            Ok(n) => n > 0,
            Err(_) => false,
        }
    }

    fn read_char(&mut self) -> io::Result<u8> {
        let mut buffer = [0u8; 1];
        io::stdin().read_exact(&mut buffer)?;
        Ok(buffer[0])
    }

    fn write_char(&mut self, byte: u8) -> io::Result<()> {
        io::stdout().write_all(&[byte])
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// A console driven by a scripted input queue instead of a real terminal.
/// Used for headless tests of traps and memory-mapped keyboard I/O.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    input: VecDeque<u8>,
    pub output: Vec<u8>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: impl IntoIterator<Item = u8>) -> Self {
        Self {
            input: input.into_iter().collect(),
            output: Vec::new(),
        }
    }

    pub fn push_input(&mut self, byte: u8) {
        self.input.push_back(byte);
    }
}

impl Console for ScriptedConsole {
    fn key_available(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn read_char(&mut self) -> io::Result<u8> {
        self.input
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted input left"))
    }

    fn write_char(&mut self, byte: u8) -> io::Result<()> {
        self.output.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
