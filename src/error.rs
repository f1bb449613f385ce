use std::io;
use std::path::PathBuf;

/// The two opcodes this VM defines as unrecoverable. `RTI` is a
/// supervisor-mode instruction we don't implement; `RES` is reserved by the
/// ISA and never emitted by a correct assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FatalOpcode {
    #[error("RTI is not supported")]
    Rti,
    #[error("reserved opcode executed")]
    Reserved,
}

/// Errors that can interrupt the fetch-decode-execute loop.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("{0}")]
    Fatal(#[from] FatalOpcode),

    #[error("interrupted")]
    Interrupted,

    #[error("console I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Top-level error type covering bootstrap and runtime failures.
#[derive(Debug, thiserror::Error)]
pub enum LcError {
    #[error("failed to load image {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Vm(#[from] VmError),
}
