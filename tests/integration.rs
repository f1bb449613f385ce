use std::io::Write;
use std::sync::atomic::AtomicBool;

use lc3::{Condition, LcError, Register, ScriptedConsole, Vm, VmError};

fn image_bytes(words: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for word in words {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes
}

fn write_image(words: &[u16]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&image_bytes(words)).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn runs_a_puts_program_to_completion() {
    let mut vm = Vm::new(ScriptedConsole::new());
    // LEA R0, #2 (R0 <- PC+1+2 = 0x3004, pointing just past this instruction block)
    vm.write_memory(0x3000, 0b1110_000_000000010);
    vm.write_memory(0x3001, 0xF022); // TRAP PUTS
    vm.write_memory(0x3002, 0xF025); // TRAP HALT
    vm.write_memory(0x3004, u16::from(b'H'));
    vm.write_memory(0x3005, u16::from(b'i'));
    vm.write_memory(0x3006, 0);

    let interrupted = AtomicBool::new(false);
    vm.run(&interrupted).unwrap();

    assert!(!vm.is_running());
    assert_eq!(vm.register(Register::R0), 0x3004);
    assert_eq!(vm.condition(), Condition::Pos);
}

#[test]
fn rti_aborts_the_run_with_a_fatal_error() {
    let mut vm = Vm::new(ScriptedConsole::new());
    vm.write_memory(0x3000, 0x8000); // RTI

    let interrupted = AtomicBool::new(false);
    let err = vm.run(&interrupted).unwrap_err();

    assert!(matches!(err, VmError::Fatal(_)));
}

#[test]
fn loads_two_images_in_argument_order_with_later_overwriting_earlier() {
    let first = write_image(&[0x3000, 0x1111, 0x2222]);
    let second = write_image(&[0x3001, 0x9999]);

    let mut vm = Vm::new(ScriptedConsole::new());
    vm.load_image_file(first.path()).unwrap();
    vm.load_image_file(second.path()).unwrap();

    assert_eq!(vm.peek(0x3000), 0x1111);
    assert_eq!(vm.peek(0x3001), 0x9999);
}

#[test]
fn a_missing_image_is_reported_and_does_not_start_the_vm() {
    let interrupted = AtomicBool::new(false);
    let err = lc3::run(&["/no/such/file.obj"], ScriptedConsole::new(), &interrupted).unwrap_err();

    match err {
        LcError::Load { path, .. } => assert_eq!(path, std::path::Path::new("/no/such/file.obj")),
        other => panic!("expected a Load error, got {:?}", other),
    }
}
