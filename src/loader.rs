use std::fs;
use std::io::{self, BufReader, Read};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};

use crate::memory::Memory;

/// Reads a big-endian image (2-byte origin, then payload words) from `path`
/// into `memory`, returning the origin the payload was placed at.
pub fn load_file(path: &Path, memory: &mut Memory) -> io::Result<u16> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    load(&mut reader, memory)
}

/// Reads a big-endian image from any reader. Payload words that would fall
/// past the end of the address space are silently discarded, as is a
/// trailing odd byte that doesn't form a complete word. Spec.md §4.4.
pub fn load(reader: &mut impl Read, memory: &mut Memory) -> io::Result<u16> {
    let origin = reader.read_u16::<BigEndian>()?;
    let mut address = origin;

    loop {
        match reader.read_u16::<BigEndian>() {
            Ok(word) => {
                memory.write(address, word);
                address = address.wrapping_add(1);
                if address == 0 {
                    // Wrapped past 0xFFFF: the address space is full.
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }

    Ok(origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn image(words: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for w in words {
            bytes.extend_from_slice(&w.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn round_trips_origin_and_payload() {
        let mut memory = Memory::new();
        let bytes = image(&[0x3000, 0x1234, 0xABCD]);

        let origin = load(&mut Cursor::new(bytes), &mut memory).unwrap();

        assert_eq!(origin, 0x3000);
        assert_eq!(memory.peek(0x3000), 0x1234);
        assert_eq!(memory.peek(0x3001), 0xABCD);
    }

    #[test]
    fn discards_trailing_odd_byte() {
        let mut memory = Memory::new();
        let mut bytes = image(&[0x3000, 0x1234]);
        bytes.push(0xAB);

        let origin = load(&mut Cursor::new(bytes), &mut memory).unwrap();

        assert_eq!(origin, 0x3000);
        assert_eq!(memory.peek(0x3001), 0);
    }

    #[test]
    fn truncates_past_the_address_space() {
        let mut memory = Memory::new();
        let bytes = image(&[0xFFFF, 0x1111, 0x2222]);

        let origin = load(&mut Cursor::new(bytes), &mut memory).unwrap();

        assert_eq!(origin, 0xFFFF);
        assert_eq!(memory.peek(0xFFFF), 0x1111);
        assert_eq!(memory.peek(0x0000), 0);
    }

    #[test]
    fn later_load_overwrites_overlapping_range() {
        let mut memory = Memory::new();
        load(&mut Cursor::new(image(&[0x3000, 0x1111, 0x2222])), &mut memory).unwrap();
        load(&mut Cursor::new(image(&[0x3001, 0x9999])), &mut memory).unwrap();

        assert_eq!(memory.peek(0x3000), 0x1111);
        assert_eq!(memory.peek(0x3001), 0x9999);
    }
}
