use log::debug;

use crate::apu::Apu;
use crate::dma::Dma;
use crate::joypad::Joypad;
use crate::mmc::Mmc;
use crate::ppu::Ppu;
use crate::save_state::{SaveState, SaveStateError};
use crate::timer::Timer;

/// Address decoder and clock distributor.
///
/// Owns every unit except the CPU. Reads and writes route to the owning
/// unit; [`Bus::tick`] advances the timer, the OAM DMA engine, the PPU, and
/// the APU by the cycles the CPU just spent.
pub struct Bus {
    pub mmc: Mmc,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub dma: Dma,
    pub joypad: Joypad,
    pub if_reg: u8,
    pub ie_reg: u8,
    key1: u8,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            mmc: Mmc::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            timer: Timer::new(),
            dma: Dma::new(),
            joypad: Joypad::new(),
            if_reg: 0xE1,
            ie_reg: 0x00,
            key1: 0x00,
        }
    }

    pub fn reset(&mut self) {
        self.mmc.reset();
        self.ppu.reset();
        self.apu.reset();
        self.timer.reset();
        self.dma.reset();
        self.joypad.reset();
        self.if_reg = 0xE1;
        self.ie_reg = 0x00;
        self.key1 = 0x00;
    }

    /// Advances every clocked unit by `cycles` CPU cycles. Frame sequencer
    /// ticks derived from DIV feed the APU.
    pub fn tick(&mut self, cycles: u32) {
        let sequencer_ticks = self.timer.step(cycles, &mut self.if_reg);
        self.step_dma(cycles);
        self.ppu.step(cycles, &self.mmc, &mut self.if_reg);
        self.apu.step(cycles);
        self.apu.tick_frame(sequencer_ticks);
    }

    // One byte per cycle while the OAM DMA engine is active.
    fn step_dma(&mut self, cycles: u32) {
        if !self.dma.active {
            return;
        }
        for _ in 0..cycles {
            match self.dma.next_transfer() {
                Some((source, dest)) => {
                    let value = self.read_masked(source, true);
                    self.write_masked(dest, value, true);
                }
                None => break,
            }
        }
    }

    pub fn read(&mut self, address: u16) -> u8 {
        self.read_masked(address, false)
    }

    pub fn write(&mut self, address: u16, value: u8) {
        self.write_masked(address, value, false);
    }

    pub fn read16(&mut self, address: u16) -> u16 {
        let low = self.read(address);
        let high = self.read(address.wrapping_add(1));
        u16::from_le_bytes([low, high])
    }

    pub fn write16(&mut self, address: u16, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write(address, low);
        self.write(address.wrapping_add(1), high);
    }

    fn read_masked(&mut self, mut address: u16, internal: bool) -> u8 {
        // Active OAM DMA holds the external bus; only HRAM stays reachable.
        if self.dma.active && address < 0xFF80 && !internal {
            return 0xFF;
        }
        if address < 0xFE00 {
            if address >= 0xE000 {
                address -= 0x2000;
            }
            return self.mmc.read(address);
        }
        if address < 0xFEA0 {
            return self.mmc.read_oam(address);
        }
        if address < 0xFF00 {
            debug!("read from unusable address {address:#06x}");
            return 0;
        }
        match address & 0xFF {
            0x00 => self.joypad.read(),
            // Serial transfer is not emulated; the registers behave as RAM.
            0x01 | 0x02 => self.mmc.read_hram(address),
            0x04 => self.timer.read_div(),
            0x05 => self.timer.read_tima(),
            0x06 => self.timer.read_tma(),
            0x07 => self.timer.read_tac(),
            0x0F => self.if_reg,
            0x10..=0x26 | 0x30..=0x3F => self.apu.read(address),
            0x40 => self.ppu.read_lcdc(),
            0x41 => self.ppu.read_stat(),
            0x42 => self.ppu.read_scy(),
            0x43 => self.ppu.read_scx(),
            0x44 => self.ppu.read_ly(),
            0x45 => self.ppu.read_lyc(),
            0x46 => 0x00,
            0x47 => self.ppu.read_bgp(),
            0x48 => self.ppu.read_obp0(),
            0x49 => self.ppu.read_obp1(),
            0x4A => self.ppu.read_wy(),
            0x4B => self.ppu.read_wx(),
            0x4D => self.key1,
            0x4F => self.mmc.read_vbk(),
            0x51..=0x54 => 0x00,
            0x55 => self.dma.read_hdma5(),
            // Infrared port, always idle.
            0x56 => 0xFF,
            0x68 => self.ppu.read_bgpi(),
            0x69 => self.ppu.read_bgpd(),
            0x6A => self.ppu.read_obpi(),
            0x6B => self.ppu.read_obpd(),
            0x6C => self.ppu.read_opri(),
            0x70 => self.mmc.read_svbk(),
            0x76 | 0x77 => 0x00,
            0xFF => self.ie_reg,
            _ => self.mmc.read_hram(address),
        }
    }

    fn write_masked(&mut self, mut address: u16, value: u8, internal: bool) {
        if self.dma.active && address < 0xFF80 && !internal {
            return;
        }
        if address < 0xFE00 {
            if address >= 0xE000 {
                address -= 0x2000;
            }
            self.mmc.write(address, value);
            return;
        }
        if address < 0xFEA0 {
            self.mmc.write_oam(address, value);
            return;
        }
        if address < 0xFF00 {
            debug!("write of {value:#04x} to unusable address {address:#06x}");
            return;
        }
        match address & 0xFF {
            0x00 => self.joypad.write(value),
            0x01 => {
                debug!("serial data write: {value:#04x}");
                self.mmc.write_hram(address, value);
            }
            0x02 => self.mmc.write_hram(address, value),
            0x04 => {
                let sequencer_ticks = self.timer.write_div();
                self.apu.tick_frame(sequencer_ticks);
            }
            0x05 => self.timer.write_tima(value),
            0x06 => self.timer.write_tma(value),
            0x07 => self.timer.write_tac(value),
            0x0F => self.if_reg = value,
            0x10..=0x26 | 0x30..=0x3F => self.apu.write(address, value),
            0x40 => self.ppu.write_lcdc(value),
            0x41 => self.ppu.write_stat(value),
            0x42 => self.ppu.write_scy(value),
            0x43 => self.ppu.write_scx(value),
            0x44 => self.ppu.write_ly(value),
            0x45 => self.ppu.write_lyc(value),
            0x46 => self.dma.start_oam_transfer(value),
            0x47 => self.ppu.write_bgp(value),
            0x48 => self.ppu.write_obp0(value),
            0x49 => self.ppu.write_obp1(value),
            0x4A => self.ppu.write_wy(value),
            0x4B => self.ppu.write_wx(value),
            0x4D => self.key1 = value,
            0x4F => self.mmc.write_vbk(value),
            0x51..=0x54 => self.dma.write_hdma((address as usize & 0xFF) - 0x51, value),
            0x55 => self.dma.write_hdma5(value),
            0x56 => self.mmc.write_hram(address, value),
            0x68 => self.ppu.write_bgpi(value),
            0x69 => self.ppu.write_bgpd(value),
            0x6A => self.ppu.write_obpi(value),
            0x6B => self.ppu.write_obpd(value),
            0x6C => self.ppu.write_opri(value),
            0x70 => self.mmc.write_svbk(value),
            0xFF => self.ie_reg = value,
            offset => {
                if offset >= 0x80 {
                    self.mmc.write_hram(address, value);
                } else {
                    debug!("write of {value:#04x} to unhandled I/O register {address:#06x}");
                }
            }
        }
    }

    pub fn write_state(&self, state: &mut SaveState) {
        state.write_u8(self.if_reg);
        state.write_u8(self.ie_reg);
        state.write_u8(self.key1);
        self.dma.write_state(state);
        self.joypad.write_state(state);
        self.mmc.write_state(state);
        self.ppu.write_state(state);
        self.timer.write_state(state);
    }

    pub fn load_state(&mut self, state: &mut SaveState) -> Result<(), SaveStateError> {
        self.if_reg = state.read_u8()?;
        self.ie_reg = state.read_u8()?;
        self.key1 = state.read_u8()?;
        self.dma.load_state(state)?;
        self.joypad.load_state(state)?;
        self.mmc.load_state(state)?;
        self.ppu.load_state(state)?;
        self.timer.load_state(state)?;
        Ok(())
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
