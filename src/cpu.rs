use log::warn;

use crate::bus::Bus;
use crate::save_state::{SaveState, SaveStateError};

const FLAG_Z: u8 = 0x80;
const FLAG_N: u8 = 0x40;
const FLAG_H: u8 = 0x20;
const FLAG_C: u8 = 0x10;

const INTERRUPT_MASK: u8 = 0x1F;

// Base instruction duration in M-cycles. Conditional branches add their
// extra cycles when taken; 0xCB uses the prefix table instead.
const OPCODE_CYCLES: [u32; 256] = [
    1, 3, 2, 2, 1, 1, 2, 1, 5, 2, 2, 2, 1, 1, 2, 1, //
    0, 3, 2, 2, 1, 1, 2, 1, 3, 2, 2, 2, 1, 1, 2, 1, //
    2, 3, 2, 2, 1, 1, 2, 1, 2, 2, 2, 2, 1, 1, 2, 1, //
    2, 3, 2, 2, 3, 3, 3, 1, 2, 2, 2, 2, 1, 1, 2, 1, //
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, //
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, //
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, //
    2, 2, 2, 2, 2, 2, 1, 2, 1, 1, 1, 1, 1, 1, 2, 1, //
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, //
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, //
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, //
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, //
    2, 3, 3, 4, 3, 4, 2, 4, 2, 4, 3, 0, 3, 6, 2, 4, //
    2, 3, 3, 0, 3, 4, 2, 4, 2, 4, 3, 0, 3, 0, 2, 4, //
    3, 3, 2, 0, 0, 4, 2, 4, 4, 1, 4, 0, 0, 0, 2, 4, //
    3, 3, 2, 1, 0, 4, 2, 4, 3, 2, 4, 1, 0, 0, 2, 4, //
];

const PREFIX_CYCLES: [u32; 256] = [
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 3, 2, 2, 2, 2, 2, 2, 2, 3, 2, //
    2, 2, 2, 2, 2, 2, 3, 2, 2, 2, 2, 2, 2, 2, 3, 2, //
    2, 2, 2, 2, 2, 2, 3, 2, 2, 2, 2, 2, 2, 2, 3, 2, //
    2, 2, 2, 2, 2, 2, 3, 2, 2, 2, 2, 2, 2, 2, 3, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, //
];

/// SM83 interpreter. One call to [`Cpu::step`] retires one instruction (or
/// one interrupt dispatch) and returns its duration in clock cycles.
pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    pub ime: bool,
    pub halted: bool,
    halt_bug: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0x01,
            f: 0xB0,
            b: 0x00,
            c: 0x13,
            d: 0x00,
            e: 0xD8,
            h: 0x01,
            l: 0x4D,
            sp: 0xFFFE,
            pc: 0x0100,
            ime: false,
            halted: false,
            halt_bug: false,
        }
    }

    /// Post-boot register values, entry point at 0x0100.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    fn set_bc(&mut self, value: u16) {
        [self.b, self.c] = value.to_be_bytes();
    }

    fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    fn set_de(&mut self, value: u16) {
        [self.d, self.e] = value.to_be_bytes();
    }

    fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    fn set_hl(&mut self, value: u16) {
        [self.h, self.l] = value.to_be_bytes();
    }

    fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    // The flag register's low nibble does not exist in hardware.
    fn set_af(&mut self, value: u16) {
        self.a = (value >> 8) as u8;
        self.f = value as u8 & 0xF0;
    }

    fn flag(&self, flag: u8) -> bool {
        self.f & flag != 0
    }

    fn fetch8(&mut self, bus: &mut Bus) -> u8 {
        let value = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch16(&mut self, bus: &mut Bus) -> u16 {
        let low = self.fetch8(bus);
        let high = self.fetch8(bus);
        u16::from_le_bytes([low, high])
    }

    fn push16(&mut self, bus: &mut Bus, value: u16) {
        self.sp = self.sp.wrapping_sub(2);
        bus.write16(self.sp, value);
    }

    fn pop16(&mut self, bus: &mut Bus) -> u16 {
        let value = bus.read16(self.sp);
        self.sp = self.sp.wrapping_add(2);
        value
    }

    /// Executes one instruction and returns its cycle count. Interrupt
    /// dispatch takes precedence and costs 20 cycles; a halted CPU idles at
    /// 4 cycles per step.
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        if self.handle_interrupts(bus) {
            return 20;
        }
        if self.halted {
            return 4;
        }

        let opcode = bus.read(self.pc);
        if !self.halt_bug {
            self.pc = self.pc.wrapping_add(1);
        }
        self.halt_bug = false;

        if opcode == 0xCB {
            let prefixed = self.fetch8(bus);
            self.execute_prefixed(prefixed, bus);
            return PREFIX_CYCLES[prefixed as usize] * 4;
        }

        let mut cycles = OPCODE_CYCLES[opcode as usize] * 4;
        cycles += self.execute(opcode, bus);
        cycles
    }

    /// Services the highest-priority pending interrupt. A pending request
    /// always lifts HALT, even with IME cleared.
    fn handle_interrupts(&mut self, bus: &mut Bus) -> bool {
        let pending = bus.if_reg & bus.ie_reg & INTERRUPT_MASK;
        if pending == 0 {
            return false;
        }
        self.halted = false;
        if !self.ime {
            return false;
        }
        for bit in 0..5u16 {
            let mask = 1 << bit;
            if pending & mask != 0 {
                bus.if_reg &= !mask;
                self.ime = false;
                self.push16(bus, self.pc);
                self.pc = 0x40 + bit * 8;
                return true;
            }
        }
        false
    }

    fn read_r8(&mut self, index: u8, bus: &mut Bus) -> u8 {
        match index & 0x07 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => bus.read(self.hl()),
            _ => self.a,
        }
    }

    fn write_r8(&mut self, index: u8, value: u8, bus: &mut Bus) {
        match index & 0x07 {
            0 => self.b = value,
            1 => self.c = value,
            2 => self.d = value,
            3 => self.e = value,
            4 => self.h = value,
            5 => self.l = value,
            6 => bus.write(self.hl(), value),
            _ => self.a = value,
        }
    }

    // 8-bit arithmetic. Flag layout is ZNHC in the high nibble of F.

    fn alu_add(&mut self, value: u8) {
        let result = self.a as u16 + value as u16;
        let mut f = 0;
        if result as u8 == 0 {
            f |= FLAG_Z;
        }
        if (self.a & 0x0F) + (value & 0x0F) > 0x0F {
            f |= FLAG_H;
        }
        if result > 0xFF {
            f |= FLAG_C;
        }
        self.a = result as u8;
        self.f = f;
    }

    fn alu_adc(&mut self, value: u8) {
        let carry = self.flag(FLAG_C) as u16;
        let result = self.a as u16 + value as u16 + carry;
        let mut f = 0;
        if result as u8 == 0 {
            f |= FLAG_Z;
        }
        if (self.a & 0x0F) as u16 + (value & 0x0F) as u16 + carry > 0x0F {
            f |= FLAG_H;
        }
        if result > 0xFF {
            f |= FLAG_C;
        }
        self.a = result as u8;
        self.f = f;
    }

    fn alu_sub(&mut self, value: u8) {
        let result = self.a.wrapping_sub(value);
        let mut f = FLAG_N;
        if result == 0 {
            f |= FLAG_Z;
        }
        if value & 0x0F > self.a & 0x0F {
            f |= FLAG_H;
        }
        if value > self.a {
            f |= FLAG_C;
        }
        self.a = result;
        self.f = f;
    }

    fn alu_sbc(&mut self, value: u8) {
        let carry = self.flag(FLAG_C) as u16;
        let result = (self.a as u16)
            .wrapping_sub(value as u16)
            .wrapping_sub(carry);
        let mut f = FLAG_N;
        if result as u8 == 0 {
            f |= FLAG_Z;
        }
        if (value & 0x0F) as u16 + carry > (self.a & 0x0F) as u16 {
            f |= FLAG_H;
        }
        if value as u16 + carry > self.a as u16 {
            f |= FLAG_C;
        }
        self.a = result as u8;
        self.f = f;
    }

    fn alu_and(&mut self, value: u8) {
        self.a &= value;
        self.f = FLAG_H;
        if self.a == 0 {
            self.f |= FLAG_Z;
        }
    }

    fn alu_xor(&mut self, value: u8) {
        self.a ^= value;
        self.f = if self.a == 0 { FLAG_Z } else { 0 };
    }

    fn alu_or(&mut self, value: u8) {
        self.a |= value;
        self.f = if self.a == 0 { FLAG_Z } else { 0 };
    }

    fn alu_cp(&mut self, value: u8) {
        let mut f = FLAG_N;
        if self.a == value {
            f |= FLAG_Z;
        }
        if value & 0x0F > self.a & 0x0F {
            f |= FLAG_H;
        }
        if value > self.a {
            f |= FLAG_C;
        }
        self.f = f;
    }

    fn alu_inc(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.f &= FLAG_C;
        if result == 0 {
            self.f |= FLAG_Z;
        }
        if value & 0x0F == 0x0F {
            self.f |= FLAG_H;
        }
        result
    }

    fn alu_dec(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.f &= FLAG_C;
        self.f |= FLAG_N;
        if result == 0 {
            self.f |= FLAG_Z;
        }
        if value & 0x0F == 0 {
            self.f |= FLAG_H;
        }
        result
    }

    // Z flag is untouched by 16-bit adds onto HL.
    fn alu_add_hl(&mut self, value: u16) {
        let hl = self.hl();
        let result = hl as u32 + value as u32;
        self.f &= FLAG_Z;
        if (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF {
            self.f |= FLAG_H;
        }
        if result > 0xFFFF {
            self.f |= FLAG_C;
        }
        self.set_hl(result as u16);
    }

    // Shared by ADD SP,e8 and LD HL,SP+e8: carries come from the low byte.
    fn sp_offset(&mut self, offset: u8) -> u16 {
        let sp = self.sp;
        let result = sp.wrapping_add(offset as i8 as u16);
        let mut f = 0;
        if (sp ^ offset as u16 ^ result) & 0x10 != 0 {
            f |= FLAG_H;
        }
        if (sp ^ offset as u16 ^ result) & 0x100 != 0 {
            f |= FLAG_C;
        }
        self.f = f;
        result
    }

    fn daa(&mut self) {
        let mut a = self.a;
        if !self.flag(FLAG_N) {
            if self.flag(FLAG_C) || a > 0x99 {
                a = a.wrapping_add(0x60);
                self.f |= FLAG_C;
            }
            if self.flag(FLAG_H) || a & 0x0F > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if self.flag(FLAG_C) {
                a = a.wrapping_sub(0x60);
            }
            if self.flag(FLAG_H) {
                a = a.wrapping_sub(0x06);
            }
        }
        self.f &= !(FLAG_Z | FLAG_H);
        if a == 0 {
            self.f |= FLAG_Z;
        }
        self.a = a;
    }

    fn jump_relative(&mut self, offset: u8) {
        self.pc = self.pc.wrapping_add(offset as i8 as u16);
    }

    /// Returns the extra cycles spent on taken branches.
    fn execute(&mut self, opcode: u8, bus: &mut Bus) -> u32 {
        match opcode {
            0x00 => {}
            0x01 => {
                let value = self.fetch16(bus);
                self.set_bc(value);
            }
            0x02 => bus.write(self.bc(), self.a),
            0x03 => self.set_bc(self.bc().wrapping_add(1)),
            0x04 => self.b = self.alu_inc(self.b),
            0x05 => self.b = self.alu_dec(self.b),
            0x06 => self.b = self.fetch8(bus),
            0x07 => {
                self.f = if self.a & 0x80 != 0 { FLAG_C } else { 0 };
                self.a = self.a.rotate_left(1);
            }
            0x08 => {
                let address = self.fetch16(bus);
                bus.write16(address, self.sp);
            }
            0x09 => self.alu_add_hl(self.bc()),
            0x0A => self.a = bus.read(self.bc()),
            0x0B => self.set_bc(self.bc().wrapping_sub(1)),
            0x0C => self.c = self.alu_inc(self.c),
            0x0D => self.c = self.alu_dec(self.c),
            0x0E => self.c = self.fetch8(bus),
            0x0F => {
                self.f = if self.a & 0x01 != 0 { FLAG_C } else { 0 };
                self.a = self.a.rotate_right(1);
            }
            // STOP resets the divider; speed switching is not modelled.
            0x10 => {
                let _ = self.fetch8(bus);
                bus.write(0xFF04, 0);
            }
            0x11 => {
                let value = self.fetch16(bus);
                self.set_de(value);
            }
            0x12 => bus.write(self.de(), self.a),
            0x13 => self.set_de(self.de().wrapping_add(1)),
            0x14 => self.d = self.alu_inc(self.d),
            0x15 => self.d = self.alu_dec(self.d),
            0x16 => self.d = self.fetch8(bus),
            0x17 => {
                let carry = self.flag(FLAG_C) as u8;
                self.f = if self.a & 0x80 != 0 { FLAG_C } else { 0 };
                self.a = (self.a << 1) | carry;
            }
            0x18 => {
                let offset = self.fetch8(bus);
                self.jump_relative(offset);
            }
            0x19 => self.alu_add_hl(self.de()),
            0x1A => self.a = bus.read(self.de()),
            0x1B => self.set_de(self.de().wrapping_sub(1)),
            0x1C => self.e = self.alu_inc(self.e),
            0x1D => self.e = self.alu_dec(self.e),
            0x1E => self.e = self.fetch8(bus),
            0x1F => {
                let carry = self.flag(FLAG_C) as u8;
                self.f = if self.a & 0x01 != 0 { FLAG_C } else { 0 };
                self.a = (self.a >> 1) | (carry << 7);
            }
            0x20 => {
                let offset = self.fetch8(bus);
                if !self.flag(FLAG_Z) {
                    self.jump_relative(offset);
                    return 4;
                }
            }
            0x21 => {
                let value = self.fetch16(bus);
                self.set_hl(value);
            }
            0x22 => {
                bus.write(self.hl(), self.a);
                self.set_hl(self.hl().wrapping_add(1));
            }
            0x23 => self.set_hl(self.hl().wrapping_add(1)),
            0x24 => self.h = self.alu_inc(self.h),
            0x25 => self.h = self.alu_dec(self.h),
            0x26 => self.h = self.fetch8(bus),
            0x27 => self.daa(),
            0x28 => {
                let offset = self.fetch8(bus);
                if self.flag(FLAG_Z) {
                    self.jump_relative(offset);
                    return 4;
                }
            }
            0x29 => self.alu_add_hl(self.hl()),
            0x2A => {
                self.a = bus.read(self.hl());
                self.set_hl(self.hl().wrapping_add(1));
            }
            0x2B => self.set_hl(self.hl().wrapping_sub(1)),
            0x2C => self.l = self.alu_inc(self.l),
            0x2D => self.l = self.alu_dec(self.l),
            0x2E => self.l = self.fetch8(bus),
            0x2F => {
                self.a = !self.a;
                self.f |= FLAG_N | FLAG_H;
            }
            0x30 => {
                let offset = self.fetch8(bus);
                if !self.flag(FLAG_C) {
                    self.jump_relative(offset);
                    return 4;
                }
            }
            0x31 => self.sp = self.fetch16(bus),
            0x32 => {
                bus.write(self.hl(), self.a);
                self.set_hl(self.hl().wrapping_sub(1));
            }
            0x33 => self.sp = self.sp.wrapping_add(1),
            0x34 => {
                let value = bus.read(self.hl());
                let result = self.alu_inc(value);
                bus.write(self.hl(), result);
            }
            0x35 => {
                let value = bus.read(self.hl());
                let result = self.alu_dec(value);
                bus.write(self.hl(), result);
            }
            0x36 => {
                let value = self.fetch8(bus);
                bus.write(self.hl(), value);
            }
            0x37 => {
                self.f = (self.f & FLAG_Z) | FLAG_C;
            }
            0x38 => {
                let offset = self.fetch8(bus);
                if self.flag(FLAG_C) {
                    self.jump_relative(offset);
                    return 4;
                }
            }
            0x39 => self.alu_add_hl(self.sp),
            0x3A => {
                self.a = bus.read(self.hl());
                self.set_hl(self.hl().wrapping_sub(1));
            }
            0x3B => self.sp = self.sp.wrapping_sub(1),
            0x3C => self.a = self.alu_inc(self.a),
            0x3D => self.a = self.alu_dec(self.a),
            0x3E => self.a = self.fetch8(bus),
            0x3F => {
                self.f = (self.f & (FLAG_Z | FLAG_C)) ^ FLAG_C;
            }
            // HALT with IME cleared and an interrupt already pending does not
            // halt; the next opcode byte is executed twice instead.
            0x76 => {
                if self.ime || bus.if_reg & bus.ie_reg & INTERRUPT_MASK == 0 {
                    self.halted = true;
                } else {
                    self.halt_bug = true;
                }
                return 4;
            }
            0x40..=0x7F => {
                let value = self.read_r8(opcode, bus);
                self.write_r8(opcode >> 3, value, bus);
            }
            0x80..=0xBF => {
                let value = self.read_r8(opcode, bus);
                match (opcode >> 3) & 0x07 {
                    0 => self.alu_add(value),
                    1 => self.alu_adc(value),
                    2 => self.alu_sub(value),
                    3 => self.alu_sbc(value),
                    4 => self.alu_and(value),
                    5 => self.alu_xor(value),
                    6 => self.alu_or(value),
                    _ => self.alu_cp(value),
                }
            }
            0xC0 => {
                if !self.flag(FLAG_Z) {
                    self.pc = self.pop16(bus);
                    return 12;
                }
            }
            0xC1 => {
                let value = self.pop16(bus);
                self.set_bc(value);
            }
            0xC2 => {
                let address = self.fetch16(bus);
                if !self.flag(FLAG_Z) {
                    self.pc = address;
                    return 4;
                }
            }
            0xC3 => self.pc = self.fetch16(bus),
            0xC4 => {
                let address = self.fetch16(bus);
                if !self.flag(FLAG_Z) {
                    self.push16(bus, self.pc);
                    self.pc = address;
                    return 12;
                }
            }
            0xC5 => self.push16(bus, self.bc()),
            0xC6 => {
                let value = self.fetch8(bus);
                self.alu_add(value);
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.push16(bus, self.pc);
                self.pc = (opcode & 0x38) as u16;
            }
            0xC8 => {
                if self.flag(FLAG_Z) {
                    self.pc = self.pop16(bus);
                    return 12;
                }
            }
            0xC9 => self.pc = self.pop16(bus),
            0xCA => {
                let address = self.fetch16(bus);
                if self.flag(FLAG_Z) {
                    self.pc = address;
                    return 4;
                }
            }
            0xCC => {
                let address = self.fetch16(bus);
                if self.flag(FLAG_Z) {
                    self.push16(bus, self.pc);
                    self.pc = address;
                    return 12;
                }
            }
            0xCD => {
                let address = self.fetch16(bus);
                self.push16(bus, self.pc);
                self.pc = address;
            }
            0xCE => {
                let value = self.fetch8(bus);
                self.alu_adc(value);
            }
            0xD0 => {
                if !self.flag(FLAG_C) {
                    self.pc = self.pop16(bus);
                    return 12;
                }
            }
            0xD1 => {
                let value = self.pop16(bus);
                self.set_de(value);
            }
            0xD2 => {
                let address = self.fetch16(bus);
                if !self.flag(FLAG_C) {
                    self.pc = address;
                    return 4;
                }
            }
            0xD4 => {
                let address = self.fetch16(bus);
                if !self.flag(FLAG_C) {
                    self.push16(bus, self.pc);
                    self.pc = address;
                    return 12;
                }
            }
            0xD5 => self.push16(bus, self.de()),
            0xD6 => {
                let value = self.fetch8(bus);
                self.alu_sub(value);
            }
            0xD8 => {
                if self.flag(FLAG_C) {
                    self.pc = self.pop16(bus);
                    return 12;
                }
            }
            0xD9 => {
                self.pc = self.pop16(bus);
                self.ime = true;
            }
            0xDA => {
                let address = self.fetch16(bus);
                if self.flag(FLAG_C) {
                    self.pc = address;
                    return 4;
                }
            }
            0xDC => {
                let address = self.fetch16(bus);
                if self.flag(FLAG_C) {
                    self.push16(bus, self.pc);
                    self.pc = address;
                    return 12;
                }
            }
            0xDE => {
                let value = self.fetch8(bus);
                self.alu_sbc(value);
            }
            0xE0 => {
                let offset = self.fetch8(bus);
                bus.write(0xFF00 | offset as u16, self.a);
            }
            0xE1 => {
                let value = self.pop16(bus);
                self.set_hl(value);
            }
            0xE2 => bus.write(0xFF00 | self.c as u16, self.a),
            0xE5 => self.push16(bus, self.hl()),
            0xE6 => {
                let value = self.fetch8(bus);
                self.alu_and(value);
            }
            0xE8 => {
                let offset = self.fetch8(bus);
                self.sp = self.sp_offset(offset);
            }
            0xE9 => self.pc = self.hl(),
            0xEA => {
                let address = self.fetch16(bus);
                bus.write(address, self.a);
            }
            0xEE => {
                let value = self.fetch8(bus);
                self.alu_xor(value);
            }
            0xF0 => {
                let offset = self.fetch8(bus);
                self.a = bus.read(0xFF00 | offset as u16);
            }
            0xF1 => {
                let value = self.pop16(bus);
                self.set_af(value);
            }
            0xF2 => self.a = bus.read(0xFF00 | self.c as u16),
            0xF3 => self.ime = false,
            0xF5 => self.push16(bus, self.af() & 0xFFF0),
            0xF6 => {
                let value = self.fetch8(bus);
                self.alu_or(value);
            }
            0xF8 => {
                let offset = self.fetch8(bus);
                let result = self.sp_offset(offset);
                self.set_hl(result);
            }
            0xF9 => self.sp = self.hl(),
            0xFA => {
                let address = self.fetch16(bus);
                self.a = bus.read(address);
            }
            0xFB => self.ime = true,
            0xFE => {
                let value = self.fetch8(bus);
                self.alu_cp(value);
            }
            _ => warn!("undefined opcode {opcode:#04x} at {:#06x}", self.pc),
        }
        0
    }

    fn execute_prefixed(&mut self, opcode: u8, bus: &mut Bus) {
        let value = self.read_r8(opcode, bus);
        match opcode {
            // RLC
            0x00..=0x07 => {
                let result = value.rotate_left(1);
                self.f = self.rotate_flags(result, value & 0x80 != 0);
                self.write_r8(opcode, result, bus);
            }
            // RRC
            0x08..=0x0F => {
                let result = value.rotate_right(1);
                self.f = self.rotate_flags(result, value & 0x01 != 0);
                self.write_r8(opcode, result, bus);
            }
            // RL
            0x10..=0x17 => {
                let result = (value << 1) | self.flag(FLAG_C) as u8;
                self.f = self.rotate_flags(result, value & 0x80 != 0);
                self.write_r8(opcode, result, bus);
            }
            // RR
            0x18..=0x1F => {
                let result = (value >> 1) | ((self.flag(FLAG_C) as u8) << 7);
                self.f = self.rotate_flags(result, value & 0x01 != 0);
                self.write_r8(opcode, result, bus);
            }
            // SLA
            0x20..=0x27 => {
                let result = value << 1;
                self.f = self.rotate_flags(result, value & 0x80 != 0);
                self.write_r8(opcode, result, bus);
            }
            // SRA keeps the sign bit.
            0x28..=0x2F => {
                let result = (value >> 1) | (value & 0x80);
                self.f = self.rotate_flags(result, value & 0x01 != 0);
                self.write_r8(opcode, result, bus);
            }
            // SWAP
            0x30..=0x37 => {
                let result = value.rotate_left(4);
                self.f = self.rotate_flags(result, false);
                self.write_r8(opcode, result, bus);
            }
            // SRL
            0x38..=0x3F => {
                let result = value >> 1;
                self.f = self.rotate_flags(result, value & 0x01 != 0);
                self.write_r8(opcode, result, bus);
            }
            // BIT
            0x40..=0x7F => {
                let bit = (opcode >> 3) & 0x07;
                self.f = (self.f & FLAG_C) | FLAG_H;
                if value & (1 << bit) == 0 {
                    self.f |= FLAG_Z;
                }
            }
            // RES
            0x80..=0xBF => {
                let bit = (opcode >> 3) & 0x07;
                self.write_r8(opcode, value & !(1 << bit), bus);
            }
            // SET
            _ => {
                let bit = (opcode >> 3) & 0x07;
                self.write_r8(opcode, value | (1 << bit), bus);
            }
        }
    }

    fn rotate_flags(&self, result: u8, carry: bool) -> u8 {
        let mut f = 0;
        if result == 0 {
            f |= FLAG_Z;
        }
        if carry {
            f |= FLAG_C;
        }
        f
    }

    pub fn write_state(&self, state: &mut SaveState) {
        state.write_u8(self.a);
        state.write_u8(self.f);
        state.write_u8(self.b);
        state.write_u8(self.c);
        state.write_u8(self.d);
        state.write_u8(self.e);
        state.write_u8(self.h);
        state.write_u8(self.l);
        state.write_u16(self.sp);
        state.write_u16(self.pc);
        state.write_bool(self.ime);
        state.write_bool(self.halted);
        state.write_bool(self.halt_bug);
    }

    pub fn load_state(&mut self, state: &mut SaveState) -> Result<(), SaveStateError> {
        self.a = state.read_u8()?;
        self.f = state.read_u8()?;
        self.b = state.read_u8()?;
        self.c = state.read_u8()?;
        self.d = state.read_u8()?;
        self.e = state.read_u8()?;
        self.h = state.read_u8()?;
        self.l = state.read_u8()?;
        self.sp = state.read_u16()?;
        self.pc = state.read_u16()?;
        self.ime = state.read_bool()?;
        self.halted = state.read_bool()?;
        self.halt_bug = state.read_bool()?;
        Ok(())
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_matches_post_boot_registers() {
        let cpu = Cpu::new();
        assert_eq!(cpu.af(), 0x01B0);
        assert_eq!(cpu.bc(), 0x0013);
        assert_eq!(cpu.de(), 0x00D8);
        assert_eq!(cpu.hl(), 0x014D);
        assert_eq!(cpu.sp, 0xFFFE);
        assert_eq!(cpu.pc, 0x0100);
    }

    #[test]
    fn add_sets_half_and_full_carry() {
        let mut cpu = Cpu::new();
        cpu.a = 0x3C;
        cpu.alu_add(0x0F);
        assert_eq!(cpu.a, 0x4B);
        assert_eq!(cpu.f, FLAG_H);

        cpu.a = 0xFF;
        cpu.alu_add(0x01);
        assert_eq!(cpu.a, 0x00);
        assert_eq!(cpu.f, FLAG_Z | FLAG_H | FLAG_C);
    }

    #[test]
    fn sbc_borrows_through_carry() {
        let mut cpu = Cpu::new();
        cpu.a = 0x00;
        cpu.f = FLAG_C;
        cpu.alu_sbc(0x00);
        assert_eq!(cpu.a, 0xFF);
        assert_eq!(cpu.f, FLAG_N | FLAG_H | FLAG_C);
    }

    #[test]
    fn cp_compares_without_storing() {
        let mut cpu = Cpu::new();
        cpu.a = 0x42;
        cpu.alu_cp(0x42);
        assert_eq!(cpu.a, 0x42);
        assert_eq!(cpu.f, FLAG_Z | FLAG_N);
        cpu.alu_cp(0x43);
        assert_eq!(cpu.f, FLAG_N | FLAG_H | FLAG_C);
    }

    #[test]
    fn daa_adjusts_bcd_addition() {
        let mut cpu = Cpu::new();
        cpu.a = 0x45;
        cpu.alu_add(0x38); // 0x7D
        cpu.daa();
        assert_eq!(cpu.a, 0x83);
        assert!(!cpu.flag(FLAG_C));
    }

    #[test]
    fn inc_and_dec_preserve_carry() {
        let mut cpu = Cpu::new();
        cpu.f = FLAG_C;
        let value = cpu.alu_inc(0x0F);
        assert_eq!(value, 0x10);
        assert_eq!(cpu.f, FLAG_H | FLAG_C);
        let value = cpu.alu_dec(0x01);
        assert_eq!(value, 0x00);
        assert_eq!(cpu.f, FLAG_Z | FLAG_N | FLAG_C);
    }

    #[test]
    fn sp_offset_carries_from_the_low_byte() {
        let mut cpu = Cpu::new();
        cpu.sp = 0xFFF8;
        let result = cpu.sp_offset(0x08);
        assert_eq!(result, 0x0000);
        assert_eq!(cpu.f, FLAG_H | FLAG_C);

        cpu.sp = 0x0001;
        let result = cpu.sp_offset(0xFF); // -1
        assert_eq!(result, 0x0000);
        assert_eq!(cpu.f, FLAG_H | FLAG_C);
    }

    #[test]
    fn flag_register_low_nibble_is_always_clear() {
        let mut cpu = Cpu::new();
        cpu.set_af(0x12FF);
        assert_eq!(cpu.af(), 0x12F0);
    }
}
