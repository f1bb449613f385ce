use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use lc3::{LcError, TermConsole, VmError};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg, Termios};

const STDIN_FILENO: i32 = 0;

/// A virtual machine for the LC-3 instruction set.
#[derive(Parser, Debug)]
#[command(name = "lc3", version, about)]
struct Cli {
    /// LC-3 object file(s) to load and run, in order.
    images: Vec<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.images.is_empty() {
        println!("lc3 [image-file1] ...");
        process::exit(2);
    }

    let raw_mode = match RawMode::enable() {
        Ok(guard) => guard,
        Err(err) => {
            println!("An error occurred: {}", err);
            process::exit(1);
        }
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .expect("failed to register interrupt handler");
    }

    let result = lc3::run(&cli.images, TermConsole::new(), &interrupted);

    match result {
        Ok(()) => {
            drop(raw_mode);
        }

        Err(LcError::Load { path, source }) => {
            drop(raw_mode);
            println!("Failed to load image: {}", path.display());
            log::debug!("load failure detail: {}", source);
            process::exit(1);
        }

        Err(LcError::Vm(VmError::Fatal(fatal))) => {
            drop(raw_mode);
            log::error!("aborting: {}", fatal);
            process::exit(1);
        }

        Err(LcError::Vm(VmError::Interrupted)) => {
            drop(raw_mode);
            println!();
            process::exit(130);
        }

        Err(LcError::Vm(VmError::Io(err))) => {
            drop(raw_mode);
            println!("An error occurred: {}", err);
            process::exit(1);
        }
    }
}

/// Disables canonical mode and echo on stdin for the VM's duration, and
/// restores the previous mode on drop — including on every early-exit path
/// above, since those call `drop(raw_mode)` explicitly before
/// `process::exit`, which otherwise would skip destructors entirely.
struct RawMode {
    original: Termios,
}

impl RawMode {
    fn enable() -> nix::Result<Self> {
        let original = tcgetattr(STDIN_FILENO)?;

        let mut raw = original.clone();
        raw.local_flags &= !(LocalFlags::ICANON | LocalFlags::ECHO);
        tcsetattr(STDIN_FILENO, SetArg::TCSANOW, &raw)?;

        Ok(Self { original })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = tcsetattr(STDIN_FILENO, SetArg::TCSANOW, &self.original);
    }
}
