#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_core::{
    validate_range, AccessKind, ConditionKind, Engine, EngineCommand, EngineConfig, MemoryArchive,
    RamBackend, ValidationCondition, SAVE_STATE_HEADER_ENTRY, SCRATCH_START,
};

fn address(raw: u32, selector: u8) -> u32 {
    match selector & 3 {
        0 => raw & 0x01FF_FFFF,
        1 => SCRATCH_START | (raw & 0x3FFF),
        _ => raw,
    }
}

fuzz_target!(|data: &[u8]| {
    let mut engine = Engine::new(RamBackend::new(), EngineConfig::default());
    engine.initialize();
    engine.load_game("fuzz");

    for chunk in data.chunks_exact(9) {
        let op = chunk[0];
        let addr = address(
            u32::from_le_bytes([chunk[1], chunk[2], chunk[3], chunk[4]]),
            op >> 6,
        );
        let value = u32::from_le_bytes([chunk[5], chunk[6], chunk[7], chunk[8]]);
        let size = value >> 28;

        match op & 0x1F {
            0 => {
                let added = engine.add_watch(addr, size, None);
                assert!(!added || validate_range(addr, size).is_ok());
            }
            1 => {
                engine.remove_watch(addr);
            }
            2 => {
                engine.tick();
            }
            3 => engine.backend_mut().store_word(addr, value),
            4 => engine.backend_mut().store_byte(addr, chunk[5]),
            5 => engine.backend_mut().set_word(addr, value),
            6 => {
                engine.backend_mut().load_word(addr);
            }
            7 => {
                engine.process_pending_accesses();
            }
            8 => {
                let kind = ConditionKind::from_code(value % 12).unwrap_or(ConditionKind::Equal);
                engine.add_condition(
                    ValidationCondition::new(addr, size, kind)
                        .with_value(value)
                        .with_mask(value.rotate_left(7))
                        .with_range(value & 0xFF, value >> 8),
                );
            }
            9 => {
                engine.validate_address(addr, value);
            }
            10 => {
                engine.validate_range(addr, value);
                engine.validate_all();
            }
            11 => {
                engine.set_hardcore(value & 1 == 1);
            }
            12 => {
                let protected = engine.add_protected_region(addr, size << 8);
                if protected && engine.is_hardcore() {
                    assert!(engine.is_address_protected(addr));
                }
            }
            13 => {
                engine.validate_system_state();
            }
            14 => {
                let mut archive = MemoryArchive::new();
                archive.insert(SAVE_STATE_HEADER_ENTRY, chunk[1..].to_vec());
                engine.check_save_state_allowed(&mut archive);
                engine.check_load_state_allowed(&mut archive);
            }
            15 => engine.track_access(addr, size, value, AccessKind::Write),
            16 => {
                let _ = engine.has_recent_access(addr, size, u64::from(value));
                let _ = engine.access_count(addr, size);
            }
            17 => engine.set_history_limit((value & 0xFF) as usize),
            18 => {
                engine.peek_byte(addr, 0);
                let mut buffer = [0; 8];
                engine.peek_bytes(addr, &mut buffer);
            }
            19 => engine.poke_byte(addr, chunk[5], 0),
            20 => engine.on_save_state_loaded(),
            21 => engine.reset_achievements(),
            22 => engine.apply_command(EngineCommand::ClearProtectedRegions),
            23 => engine.apply_command(EngineCommand::EnableTracking(value & 1 == 1)),
            24 => {
                engine.read_memory(addr, size);
            }
            25 => engine.shutdown(),
            26 => engine.initialize(),
            27 => {
                engine.backend_mut().set_word(addr, value);
                engine.on_write_observed(addr, size);
            }
            _ => engine.backend_mut().fail_reads_at(addr),
        }
    }
});
