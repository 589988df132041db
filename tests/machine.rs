//! Whole-machine behavior: frames, save states, cartridge RAM, input.

use once_cell::sync::Lazy;
use tempfile::NamedTempFile;

use chroma_core::{Button, Machine, SaveStateError};

/// An MBC1 cartridge with a battery, 8 ROM banks, and one RAM bank. Each
/// bank starts with its own index so bank switches are observable.
static MBC1_ROM: Lazy<Vec<u8>> = Lazy::new(|| {
    let mut rom = vec![0u8; 8 * 0x4000];
    for bank in 0..8 {
        rom[bank * 0x4000] = bank as u8;
    }
    rom[0x147] = 0x03; // MBC1 + RAM + battery
    rom[0x148] = 0x02;
    rom[0x149] = 0x02;
    rom
});

fn nop_machine() -> Machine {
    let mut machine = Machine::new();
    machine.load_rom(vec![0u8; 0x8000]);
    machine
}

#[test]
fn first_frame_ends_in_vblank() {
    let mut machine = nop_machine();
    machine.run_frame();
    assert_eq!(machine.bus.read(0xFF44), 144);
}

#[test]
fn frame_stays_complete_while_the_next_one_renders() {
    let mut machine = nop_machine();
    machine.run_frame();
    // Cross the line 153 buffer swap and render into the next frame.
    machine.run(456 * 20);
    // Every pixel of a completed row was written by the renderer; the
    // cleared back buffer would read all black.
    let row = &machine.frame()[100 * 160..101 * 160];
    assert!(row.iter().all(|pixel| *pixel != [0.0, 0.0, 0.0]));
}

#[test]
fn save_state_round_trips() {
    let mut machine = nop_machine();
    machine.run(400);
    machine.bus.write(0xC000, 0xAB);
    let pc = machine.cpu.pc;
    let state = machine.create_save_state();

    machine.run(4000);
    machine.bus.write(0xC000, 0x00);
    assert_ne!(machine.cpu.pc, pc);

    machine.load_save_state(&state).unwrap();
    assert_eq!(machine.cpu.pc, pc);
    assert_eq!(machine.bus.read(0xC000), 0xAB);
}

#[test]
fn truncated_save_state_is_rejected() {
    let mut machine = nop_machine();
    let state = machine.create_save_state();
    assert_eq!(
        machine.load_save_state(&state[..10]),
        Err(SaveStateError::Truncated)
    );
}

#[test]
fn mbc1_switches_rom_banks() {
    let mut machine = Machine::new();
    machine.load_rom(MBC1_ROM.clone());
    assert_eq!(machine.bus.read(0x0000), 0);
    assert_eq!(machine.bus.read(0x4000), 1);
    machine.bus.write(0x2000, 0x05);
    assert_eq!(machine.bus.read(0x4000), 5);
    machine.bus.write(0x2000, 0x00);
    assert_eq!(machine.bus.read(0x4000), 1);
}

#[test]
fn battery_ram_survives_a_power_cycle() {
    let mut machine = Machine::new();
    machine.load_rom(MBC1_ROM.clone());
    assert!(machine.has_battery());
    machine.bus.write(0x0000, 0x0A);
    machine.bus.write(0xA000, 0x77);

    let file = NamedTempFile::new().unwrap();
    machine.save_ram(file.path()).unwrap();

    let mut machine = Machine::new();
    machine.load_rom(MBC1_ROM.clone());
    machine.load_ram(file.path()).unwrap();
    machine.bus.write(0x0000, 0x0A);
    assert_eq!(machine.bus.read(0xA000), 0x77);
}

#[test]
fn selected_button_press_raises_the_joypad_interrupt() {
    let mut machine = nop_machine();
    machine.bus.write(0xFF00, 0x10);
    machine.bus.if_reg = 0;
    machine.set_button(Button::A, true);
    assert_eq!(machine.bus.if_reg & 0x10, 0x10);
    assert_eq!(machine.bus.read(0xFF00) & 0x01, 0x00);
    machine.set_button(Button::A, false);
    assert_eq!(machine.bus.read(0xFF00) & 0x01, 0x01);
}
