use crate::draw::DrawSequence;
use crate::occupancy::{Granularity, OccupancyOracle};
use crate::pattern::{self, filler};
use crate::registry::{AllocationRecord, Registry};

fn record(address: usize, size: usize) -> AllocationRecord {
    AllocationRecord::new(address as *mut u8, size)
}

#[test]
fn test_occupancy_reserve_and_release() {
    let mut oracle = OccupancyOracle::new(Granularity::Byte);
    assert_eq!(oracle.reserve(0x1000, 32), Ok(()));
    assert!(oracle.is_occupied(0x1000));
    assert!(oracle.is_occupied(0x101f));
    assert!(!oracle.is_occupied(0x1020));
    assert!(!oracle.is_occupied(0x0fff));

    // a conflicting reservation changes nothing
    assert_eq!(oracle.reserve(0x1010, 64), Err(0x1010));
    assert!(!oracle.is_occupied(0x1020));
    assert_eq!(oracle.reserve(0x0ff0, 17), Err(0x1000));
    assert_eq!(oracle.occupied_units(), 32);

    assert_eq!(oracle.reserve(0x1020, 16), Ok(()));
    assert_eq!(oracle.release(0x1000, 32), 32);
    assert_eq!(oracle.first_occupied(0x1000, 32), None);
    assert_eq!(oracle.occupied_units(), 16);
}

#[test]
fn test_occupancy_zero_size() {
    let mut oracle = OccupancyOracle::new(Granularity::Byte);
    assert_eq!(oracle.reserve(0x2000, 0), Ok(()));
    assert_eq!(oracle.occupied_units(), 0);
    oracle.reserve(0x2000, 1).unwrap();
    assert_eq!(oracle.reserve(0x2000, 0), Ok(()));
    assert_eq!(oracle.release(0x2000, 0), 0);
}

#[test]
fn test_occupancy_words() {
    let unit = Granularity::Word.unit();
    let mut oracle = OccupancyOracle::new(Granularity::Word);
    oracle.reserve(unit * 4, 1).unwrap();
    // the rest of the word is taken too
    assert!(oracle.is_occupied(unit * 4 + unit - 1));
    assert_eq!(oracle.reserve(unit * 4 + 1, 1), Err(unit * 4 + 1));
    assert_eq!(oracle.reserve(unit * 5, unit * 2), Ok(()));
    assert_eq!(oracle.occupied_units(), 3);
    oracle.clear();
    assert_eq!(oracle.occupied_units(), 0);
}

#[test]
fn test_registry_order() {
    let mut registry = Registry::new();
    assert!(registry.is_empty());
    registry.insert(record(0x10, 1));
    registry.insert(record(0x20, 2));
    registry.insert(record(0x30, 3));
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.size_of(0x20), Some(2));

    assert_eq!(registry.remove(1), record(0x20, 2));
    assert_eq!(registry.size_of(0x20), None);
    assert_eq!(registry.get(1), record(0x30, 3));

    registry.resize(0, 9);
    assert_eq!(registry.size_of(0x10), Some(9));
    let all: Vec<_> = registry.iter().collect();
    assert_eq!(all, vec![record(0x10, 9), record(0x30, 3)]);

    let drained: Vec<_> = registry.drain().collect();
    assert_eq!(drained, vec![record(0x30, 3), record(0x10, 9)]);
    assert!(registry.is_empty());
    assert_eq!(registry.size_of(0x10), None);
}

#[test]
fn test_pattern_stamp_verify_scrub() {
    let mut buf = [0u8; 300];
    let ptr = buf.as_mut_ptr();
    let address = ptr as usize;
    unsafe {
        pattern::stamp(ptr, buf.len());
        assert_eq!(pattern::verify(ptr, buf.len(), address), None);
        // wrong origin
        assert!(pattern::verify(ptr, buf.len(), address + 1).is_some());
    }

    buf[257] ^= 0x40;
    let mismatch = unsafe { pattern::verify(buf.as_ptr(), buf.len(), address) }.unwrap();
    assert_eq!(mismatch.offset, 257);
    assert_eq!(mismatch.expected, pattern::pattern(address, 257));
    assert_eq!(mismatch.actual, pattern::pattern(address, 257) ^ 0x40);

    unsafe { pattern::scrub(buf.as_mut_ptr(), buf.len()) };
    for (offset, &byte) in buf.iter().enumerate() {
        assert_ne!(byte, pattern::pattern(address, offset));
    }
}

#[test]
fn test_pattern_is_address_local() {
    assert_eq!(pattern::pattern(0, 0), b'M');
    assert_eq!(pattern::pattern(0x1000, 3), pattern::pattern(0x1003, 0));
    assert_eq!(pattern::pattern(usize::MAX, 1), b'M');
    for offset in 0..512 {
        assert_ne!(filler(0x4242, offset), pattern::pattern(0x4242, offset));
    }
}

#[test]
fn test_draws_are_reproducible() {
    let mut a = DrawSequence::new(1);
    let mut b = DrawSequence::new(1);
    for live in 1..200 {
        assert_eq!(a.size(2048), b.size(2048));
        assert_eq!(a.alignment(2048, 16), b.alignment(2048, 16));
        assert_eq!(a.victim(live), b.victim(live));
    }
    assert_eq!(a.drawn(), 3 * 199);

    let mut c = DrawSequence::new(2);
    let mut a = DrawSequence::new(1);
    let differs = (0..32).any(|_| a.size(1 << 20) != c.size(1 << 20));
    assert!(differs);
}

#[test]
fn test_draw_ranges() {
    let mut draws = DrawSequence::new(0xdead);
    let mut seen_floor = false;
    for live in 1..2000 {
        assert!(draws.size(100) < 100);
        assert!(draws.victim(live) < live);
        let alignment = draws.alignment(2048, 16);
        assert!(alignment.is_power_of_two());
        assert!((16..=2048).contains(&alignment));
        seen_floor |= alignment == 16;
    }
    assert!(seen_floor);
    assert_eq!(draws.alignment(1, 1), 1);
}
