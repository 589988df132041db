//! Audio behavior observed through the machine: the DIV-driven frame
//! sequencer and the sample stream.

use chroma_core::Machine;

fn nop_machine() -> Machine {
    let mut machine = Machine::new();
    machine.load_rom(vec![0u8; 0x8000]);
    machine
}

#[test]
fn length_counter_silences_channel_one() {
    let mut machine = nop_machine();
    machine.bus.write(0xFF26, 0x80);
    machine.bus.write(0xFF12, 0xF0); // full volume, no envelope
    machine.bus.write(0xFF11, 0x3F); // one length step remaining
    machine.bus.write(0xFF14, 0xC0); // trigger with length enabled
    assert_eq!(machine.bus.read(0xFF26) & 0x01, 0x01);

    // Two sequencer ticks (8192 cycles apart) guarantee a length step.
    machine.run(20_000);
    assert_eq!(machine.bus.read(0xFF26) & 0x01, 0x00);
}

#[test]
fn samples_accumulate_until_cleared() {
    let mut machine = nop_machine();
    machine.run(12_800);
    // One stereo pair every 128 cycles.
    assert!(machine.samples().len() >= 200);
    assert_eq!(machine.samples().len() % 2, 0);
    machine.clear_samples();
    assert!(machine.samples().is_empty());
}

#[test]
fn sample_rate_is_fixed() {
    let machine = Machine::new();
    assert_eq!(machine.sample_rate(), 32768);
}
