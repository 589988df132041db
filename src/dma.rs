use log::warn;

use crate::save_state::{SaveState, SaveStateError};

const OAM_SIZE: u16 = 0xA0;

/// OAM DMA engine plus the HDMA register file.
///
/// The engine itself is driven by the bus, which owns both endpoints of the
/// copy: while `active` the bus feeds one byte per CPU cycle from the source
/// page into OAM and blocks every other master below HRAM.
///
/// HDMA transfers are not implemented. The registers are stored and read
/// back so software that programs them keeps working, and a start request is
/// logged once.
pub struct Dma {
    source_page: u8,
    writes: u16,
    pub active: bool,
    hdma: [u8; 5],
    hdma_warned: bool,
}

impl Dma {
    pub fn new() -> Self {
        Self {
            source_page: 0,
            writes: 0,
            active: false,
            hdma: [0xFF; 5],
            hdma_warned: false,
        }
    }

    pub fn reset(&mut self) {
        self.source_page = 0;
        self.writes = 0;
        self.active = false;
        self.hdma = [0xFF; 5];
    }

    /// FF46 write: latches the source page and restarts the transfer.
    pub fn start_oam_transfer(&mut self, value: u8) {
        self.source_page = value % 0xE0;
        self.writes = 0;
        self.active = true;
    }

    /// Yields the source/destination pair for the next byte, advancing the
    /// engine. Returns `None` once all 160 bytes have been copied.
    pub fn next_transfer(&mut self) -> Option<(u16, u16)> {
        if !self.active {
            return None;
        }
        if self.writes >= OAM_SIZE {
            self.active = false;
            return None;
        }
        let offset = self.writes;
        self.writes += 1;
        if self.writes >= OAM_SIZE {
            self.active = false;
        }
        Some((((self.source_page as u16) << 8) | offset, 0xFE00 | offset))
    }

    pub fn write_hdma(&mut self, index: usize, value: u8) {
        self.hdma[index] = value;
    }

    pub fn write_hdma5(&mut self, value: u8) {
        self.hdma[4] = value;
        if value & 0x80 != 0 && !self.hdma_warned {
            warn!(
                "HDMA transfer requested (src {:02X}{:02X} dst {:02X}{:02X} len {:02X}); VRAM DMA is not implemented",
                self.hdma[0], self.hdma[1], self.hdma[2], self.hdma[3], value
            );
            self.hdma_warned = true;
        }
    }

    pub fn read_hdma5(&self) -> u8 {
        self.hdma[4]
    }

    pub fn write_state(&self, state: &mut SaveState) {
        state.write_u8(self.source_page);
        state.write_u16(self.writes);
        state.write_bool(self.active);
        state.write_bytes(&self.hdma);
    }

    pub fn load_state(&mut self, state: &mut SaveState) -> Result<(), SaveStateError> {
        self.source_page = state.read_u8()?;
        self.writes = state.read_u16()?;
        self.active = state.read_bool()?;
        state.read_bytes(&mut self.hdma)?;
        Ok(())
    }
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_runs_for_exactly_160_bytes() {
        let mut dma = Dma::new();
        dma.start_oam_transfer(0x80);
        assert!(dma.active);
        for i in 0..0xA0u16 {
            let (src, dst) = dma.next_transfer().unwrap();
            assert_eq!(src, 0x8000 | i);
            assert_eq!(dst, 0xFE00 | i);
        }
        assert!(!dma.active);
        assert!(dma.next_transfer().is_none());
    }

    #[test]
    fn source_page_wraps_at_0xe0() {
        let mut dma = Dma::new();
        dma.start_oam_transfer(0xE3);
        let (src, _) = dma.next_transfer().unwrap();
        assert_eq!(src >> 8, 0x03);
    }

    #[test]
    fn restart_rewinds_the_engine() {
        let mut dma = Dma::new();
        dma.start_oam_transfer(0xC0);
        dma.next_transfer();
        dma.next_transfer();
        dma.start_oam_transfer(0xC1);
        let (src, dst) = dma.next_transfer().unwrap();
        assert_eq!(src, 0xC100);
        assert_eq!(dst, 0xFE00);
    }
}
