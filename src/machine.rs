use std::io;
use std::path::Path;

use log::info;

use crate::apu;
use crate::bus::Bus;
use crate::cpu::Cpu;
use crate::joypad::Button;
use crate::save_state::{SaveState, SaveStateError};

/// CPU clock in Hz.
pub const CLOCK_HZ: u32 = 4_194_304;

/// The whole console: CPU plus the bus that owns everything else.
///
/// Drive it with [`Machine::run`], handing it a cycle budget per host tick;
/// an aligner carries over the cycles the last instruction overshot by, so
/// long-term speed matches the budget exactly.
pub struct Machine {
    pub cpu: Cpu,
    pub bus: Bus,
    clock_aligner: i32,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            clock_aligner: 0,
        }
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.clock_aligner = 0;
    }

    /// Installs a ROM image and resets the machine.
    pub fn load_rom(&mut self, data: Vec<u8>) {
        self.bus.mmc.load_rom(data);
        self.reset();
        info!("machine reset, entry at {:#06x}", self.cpu.pc);
    }

    pub fn load_rom_file(&mut self, path: &Path) -> io::Result<()> {
        let data = std::fs::read(path)?;
        self.load_rom(data);
        Ok(())
    }

    /// Runs for at least `cycles` CPU cycles. Overshoot is deducted from the
    /// next call's budget.
    pub fn run(&mut self, cycles: u32) {
        self.clock_aligner += cycles as i32;
        while self.clock_aligner > 0 {
            let spent = self.cpu.step(&mut self.bus);
            self.clock_aligner -= spent as i32;
            self.bus.tick(spent);
        }
    }

    /// Runs until the PPU finishes the current frame.
    pub fn run_frame(&mut self) {
        loop {
            let spent = self.cpu.step(&mut self.bus);
            self.bus.tick(spent);
            if self.bus.ppu.take_frame_ready() {
                return;
            }
        }
    }

    /// True once per completed frame.
    pub fn frame_ready(&mut self) -> bool {
        self.bus.ppu.take_frame_ready()
    }

    /// The most recently completed 160x144 framebuffer, row-major RGB.
    pub fn frame(&self) -> &[[f32; 3]] {
        self.bus.ppu.frame()
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.bus.joypad.set_button(button, pressed, &mut self.bus.if_reg);
    }

    /// Interleaved stereo samples produced since the last
    /// [`Machine::clear_samples`] call.
    pub fn samples(&self) -> &[i16] {
        self.bus.apu.samples()
    }

    pub fn clear_samples(&mut self) {
        self.bus.apu.clear_samples();
    }

    pub fn sample_rate(&self) -> u32 {
        apu::sample_rate()
    }

    pub fn has_battery(&self) -> bool {
        self.bus.mmc.has_battery()
    }

    /// Writes external cartridge RAM to `path`.
    pub fn save_ram(&self, path: &Path) -> io::Result<()> {
        self.bus.mmc.save_ram(path)
    }

    /// Restores external cartridge RAM from `path`.
    pub fn load_ram(&mut self, path: &Path) -> io::Result<()> {
        self.bus.mmc.load_ram(path)
    }

    /// Serializes the full machine state. The blob is only valid with the
    /// same ROM loaded.
    pub fn create_save_state(&self) -> Vec<u8> {
        let mut state = SaveState::new();
        self.cpu.write_state(&mut state);
        self.bus.write_state(&mut state);
        state.into_bytes()
    }

    pub fn load_save_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let mut state = SaveState::from_bytes(bytes);
        self.cpu.load_state(&mut state)?;
        self.bus.load_state(&mut state)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_consumes_the_cycle_budget_exactly() {
        let mut machine = Machine::new();
        // An empty ROM executes NOPs from the entry point onward.
        machine.run(400);
        assert_eq!(machine.cpu.pc, 0x100 + 100);
    }

    #[test]
    fn overshoot_carries_into_the_next_budget() {
        let mut machine = Machine::new();
        machine.run(2); // one NOP, 2 cycles of debt
        assert_eq!(machine.cpu.pc, 0x101);
        machine.run(2); // debt cancels the budget
        assert_eq!(machine.cpu.pc, 0x101);
    }

    #[test]
    fn run_frame_stops_at_vblank() {
        let mut machine = Machine::new();
        machine.run_frame();
        assert_eq!(machine.bus.ppu.read_ly(), 144);
        assert!(!machine.frame_ready());
    }
}
