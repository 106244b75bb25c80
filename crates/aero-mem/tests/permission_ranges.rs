use aero_mem::{AccessKind, MemoryController, MemoryError, Zero};

fn mem() -> MemoryController {
    MemoryController::new(Box::new(Zero))
}

#[test]
fn set_permissions_applies_to_every_byte_in_range_and_only_those() {
    let mut m = mem();
    m.set_permissions(0x1000, 0x1FFF, true, true, false).unwrap();

    assert!(m.range_is(0x1000, 0x1FFF, true, true, false));
    assert!(!m.is_readable(0x0FFF));
    assert!(!m.is_readable(0x2000));
}

#[test]
fn loading_a_readonly_executable_segment_then_reading_past_it_fails() {
    // A loader-style scenario: one R+X segment of sixteen 0x90 bytes at
    // base+0x400000; reading the byte immediately past it fails.
    let base = 0x400000u64;
    let mut m = mem();
    m.set_permissions(base, base + 15, true, false, true)
        .unwrap();
    m.initialize(base, &[0x90; 16]);

    for a in base..=base + 15 {
        assert_eq!(m.read(a).unwrap(), 0x90);
        assert!(m.is_readable(a));
        assert!(!m.is_writable(a));
        assert!(m.is_executable(a));
    }

    assert_eq!(
        m.read(base + 16),
        Err(MemoryError::PermissionDenied {
            kind: AccessKind::Read,
            addr: base + 16
        })
    );
}

#[test]
fn push_then_pop_round_trips_and_marks_bytes_initialized() {
    let mut m = mem();
    m.set_permissions(0x7FFF_0000, 0x7FFF_FFFF, true, true, false)
        .unwrap();

    let rsp = 0x7FFF_FFF0u64;
    let value = 0xDEAD_BEEF_CAFE_BABEu64;
    let new_rsp = rsp - 8;
    m.write_u64(new_rsp, value).unwrap();

    assert_eq!(m.read_u64(new_rsp).unwrap(), value);
    for a in new_rsp..new_rsp + 8 {
        assert!(m.is_initialized(a));
    }
}

#[test]
fn revoking_permissions_replaces_rather_than_unions() {
    let mut m = mem();
    m.set_permissions(0, 0xFFF, true, true, true).unwrap();
    m.set_permissions(0x100, 0x1FF, false, false, false).unwrap();

    assert!(m.range_is(0, 0xFF, true, true, true));
    assert!(m.range_is(0x100, 0x1FF, false, false, false));
    assert!(m.range_is(0x200, 0xFFF, true, true, true));
}
