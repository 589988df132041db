//! Instruction-level tests that drive whole programs through the machine.

use chroma_core::Machine;

/// Builds a machine running `code` from the entry point. The rest of the ROM
/// is zero, so execution falls through into NOPs.
fn machine_with(code: &[u8]) -> Machine {
    let mut rom = vec![0u8; 0x8000];
    rom[0x100..0x100 + code.len()].copy_from_slice(code);
    let mut machine = Machine::new();
    machine.load_rom(rom);
    machine
}

#[test]
fn nops_advance_pc_one_per_machine_cycle() {
    let mut machine = machine_with(&[]);
    machine.run(4000);
    assert_eq!(machine.cpu.pc, 0x100 + 1000);
}

#[test]
fn alu_immediate_flag_table() {
    // (carry in, opcode, A, operand, A out, F out)
    let cases: &[(bool, u8, u8, u8, u8, u8)] = &[
        // ADD A,d8
        (false, 0xC6, 0x3C, 0x0F, 0x4B, 0x20),
        (false, 0xC6, 0xFF, 0x01, 0x00, 0xB0),
        (false, 0xC6, 0x80, 0x80, 0x00, 0x90),
        // ADC A,d8
        (true, 0xCE, 0x0F, 0x00, 0x10, 0x20),
        (true, 0xCE, 0xFF, 0x00, 0x00, 0xB0),
        // SUB d8
        (false, 0xD6, 0x3E, 0x3E, 0x00, 0xC0),
        (false, 0xD6, 0x10, 0x01, 0x0F, 0x60),
        (false, 0xD6, 0x00, 0x01, 0xFF, 0x70),
        // SBC A,d8
        (true, 0xDE, 0x10, 0x0F, 0x00, 0xE0),
        (true, 0xDE, 0x00, 0xFF, 0x00, 0xF0),
        // CP d8
        (false, 0xFE, 0x3C, 0x2F, 0x3C, 0x60),
        (false, 0xFE, 0x3C, 0x3C, 0x3C, 0xC0),
        (false, 0xFE, 0x3C, 0x40, 0x3C, 0x50),
    ];
    for &(carry, op, a, n, a_out, f_out) in cases {
        // LD A,d8 then SCF or AND A to pin the carry, then the op.
        let carry_op = if carry { 0x37 } else { 0xA7 };
        let mut machine = machine_with(&[0x3E, a, carry_op, op, n]);
        machine.run(20);
        assert_eq!(
            (machine.cpu.a, machine.cpu.f),
            (a_out, f_out),
            "opcode {op:#04x} with A={a:#04x}, operand {n:#04x}, carry {carry}"
        );
    }
}

#[test]
fn push_pop_round_trips_through_the_stack() {
    // LD B,0x12; LD C,0x34; PUSH BC; POP DE
    let mut machine = machine_with(&[0x06, 0x12, 0x0E, 0x34, 0xC5, 0xD1]);
    machine.run(44);
    assert_eq!(machine.cpu.d, 0x12);
    assert_eq!(machine.cpu.e, 0x34);
    assert_eq!(machine.cpu.sp, 0xFFFE);
}

#[test]
fn taken_jr_costs_twelve_cycles() {
    // LD A,0x01; OR A; JR NZ,+2 over two padding bytes
    let mut machine = machine_with(&[0x3E, 0x01, 0xB7, 0x20, 0x02, 0x00, 0x00]);
    machine.run(24);
    assert_eq!(machine.cpu.pc, 0x107);
}

#[test]
fn halt_resumes_on_pending_interrupt_without_ime() {
    // IE = timer, TAC = enabled with the fast divider, then HALT into a
    // JR loop. The timer overflow wakes the CPU; with IME clear nothing
    // is dispatched.
    let mut machine = machine_with(&[
        0x3E, 0x04, // LD A,0x04
        0xE0, 0xFF, // LDH (IE),A
        0x3E, 0x05, // LD A,0x05
        0xE0, 0x07, // LDH (TAC),A
        0x76, // HALT
        0x18, 0xFE, // JR -2
    ]);
    machine.run(20_000);
    assert!(!machine.cpu.halted);
    assert!(!machine.cpu.ime);
    assert!((0x109..=0x10B).contains(&machine.cpu.pc));
    assert_eq!(machine.bus.if_reg & 0x04, 0x04);
}

#[test]
fn timer_interrupt_dispatches_to_its_vector() {
    let mut rom = vec![0u8; 0x8000];
    let code = [
        0x3E, 0x04, // LD A,0x04
        0xE0, 0xFF, // LDH (IE),A
        0x3E, 0x05, // LD A,0x05
        0xE0, 0x07, // LDH (TAC),A
        0xFB, // EI
        0x76, // HALT
    ];
    rom[0x100..0x100 + code.len()].copy_from_slice(&code);
    // Park the handler in a JR loop so the PC stays near the vector.
    rom[0x50] = 0x18;
    rom[0x51] = 0xFE;
    let mut machine = Machine::new();
    machine.load_rom(rom);
    machine.run(20_000);
    assert!(!machine.cpu.ime);
    assert!((0x50..=0x52).contains(&machine.cpu.pc));
    assert_eq!(machine.cpu.sp, 0xFFFC);
}

#[test]
fn vblank_outranks_timer_when_both_are_pending() {
    let mut rom = vec![0u8; 0x8000];
    let code = [
        0x3E, 0x05, // LD A,0x05 (vblank | timer)
        0xE0, 0xFF, // LDH (IE),A
        0xE0, 0x0F, // LDH (IF),A
        0xFB, // EI
        0x76, // HALT
    ];
    rom[0x100..0x100 + code.len()].copy_from_slice(&code);
    // The vblank handler returns with RETI; the timer handler loops.
    rom[0x40] = 0xD9;
    rom[0x50] = 0x18;
    rom[0x51] = 0xFE;
    let mut machine = Machine::new();
    machine.load_rom(rom);
    machine.run(400);
    // Vblank dispatched first and returned, then the timer interrupt.
    assert_eq!(machine.bus.if_reg & 0x05, 0x00);
    assert!((0x50..=0x52).contains(&machine.cpu.pc));
}

#[test]
fn halt_bug_repeats_the_following_byte() {
    // HALT with IME clear and an interrupt already pending skips the PC
    // increment once, so the INC A after it runs twice.
    let mut machine = machine_with(&[
        0x3E, 0x04, // LD A,0x04
        0xE0, 0xFF, // LDH (IE),A
        0xE0, 0x0F, // LDH (IF),A
        0x76, // HALT
        0x3C, // INC A
        0x18, 0xFE, // JR -2
    ]);
    machine.run(200);
    assert_eq!(machine.cpu.a, 0x06);
    assert!((0x108..=0x10A).contains(&machine.cpu.pc));
}
