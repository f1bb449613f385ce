mod console;
mod error;
mod instruction;
mod loader;
mod memory;
mod registers;
mod sign_extend;
mod trap;
mod vm;

pub use crate::console::{Console, ScriptedConsole, TermConsole};
pub use crate::error::{FatalOpcode, LcError, VmError};
pub use crate::registers::{Condition, Register};
pub use crate::vm::Vm;

use std::path::Path;
use std::sync::atomic::AtomicBool;

/// Builds a `Vm` over `console`, loads each image in order, and runs it to
/// completion. Images are loaded in argument order; a later image overwrites
/// any earlier one at overlapping addresses.
pub fn run<C: Console>(
    images: &[impl AsRef<Path>],
    console: C,
    interrupted: &AtomicBool,
) -> Result<(), LcError> {
    let mut vm = Vm::new(console);

    for image in images {
        let path = image.as_ref();
        vm.load_image_file(path).map_err(|source| LcError::Load {
            path: path.to_path_buf(),
            source,
        })?;
    }

    vm.run(interrupted)?;
    Ok(())
}
