use std::io;
use std::path::Path;

use log::{debug, warn};

use crate::save_state::{SaveState, SaveStateError};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const VRAM_BANK_SIZE: usize = 0x2000;
pub const WRAM_BANK_SIZE: usize = 0x1000;
pub const ERAM_BANK_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;
pub const HRAM_SIZE: usize = 0x100;

const VRAM_BANKS: usize = 2;
const WRAM_BANKS: usize = 8;

// Tile and tile-map data the boot ROM leaves behind in VRAM (the scrolled-in
// logo). Games that skip re-initializing VRAM rely on it being present.
const INITIAL_TILE_DATA: [u8; 200] = [
    0xF0, 0xF0, 0xFC, 0xFC, 0xFC, 0xFC, 0xF3, 0xF3, //
    0x3C, 0x3C, 0x3C, 0x3C, 0x3C, 0x3C, 0x3C, 0x3C, //
    0xF0, 0xF0, 0xF0, 0xF0, 0x00, 0x00, 0xF3, 0xF3, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xCF, 0xCF, //
    0x00, 0x00, 0x0F, 0x0F, 0x3F, 0x3F, 0x0F, 0x0F, //
    0x00, 0x00, 0x00, 0x00, 0xC0, 0xC0, 0x0F, 0x0F, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0xF0, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF3, 0xF3, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0xC0, //
    0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0xFF, 0xFF, //
    0xC0, 0xC0, 0xC0, 0xC0, 0xC0, 0xC0, 0xC3, 0xC3, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFC, 0xFC, //
    0xF3, 0xF3, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, //
    0x3C, 0x3C, 0xFC, 0xFC, 0xFC, 0xFC, 0x3C, 0x3C, //
    0xF3, 0xF3, 0xF3, 0xF3, 0xF3, 0xF3, 0xF3, 0xF3, //
    0xF3, 0xF3, 0xC3, 0xC3, 0xC3, 0xC3, 0xC3, 0xC3, //
    0xCF, 0xCF, 0xCF, 0xCF, 0xCF, 0xCF, 0xCF, 0xCF, //
    0x3C, 0x3C, 0x3F, 0x3F, 0x3C, 0x3C, 0x0F, 0x0F, //
    0x3C, 0x3C, 0xFC, 0xFC, 0x00, 0x00, 0xFC, 0xFC, //
    0xFC, 0xFC, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, //
    0xF3, 0xF3, 0xF3, 0xF3, 0xF3, 0xF3, 0xF0, 0xF0, //
    0xC3, 0xC3, 0xC3, 0xC3, 0xC3, 0xC3, 0xFF, 0xFF, //
    0xCF, 0xCF, 0xCF, 0xCF, 0xCF, 0xCF, 0xC3, 0xC3, //
    0x0F, 0x0F, 0x0F, 0x0F, 0x0F, 0x0F, 0xFC, 0xFC, //
    0x3C, 0x42, 0xB9, 0xA5, 0xB9, 0xA5, 0x42, 0x3C, //
];

const INITIAL_TILE_MAP: [u8; 44] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, //
    0x09, 0x0A, 0x0B, 0x0C, 0x19, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x12, 0x13, 0x14, //
    0x15, 0x16, 0x17, 0x18, //
];

/// Cartridge banking hardware, selected by header byte 0x147 at load time.
pub enum Mapper {
    RomOnly,
    Mbc1 {
        ram_enable: bool,
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
    },
}

/// Memory controller: owns every RAM the machine has plus the cartridge ROM,
/// and resolves banked addresses through the active [`Mapper`].
///
/// The bus hands this unit all accesses below 0xE000 (echo RAM is folded in
/// by the bus) as well as OAM and HRAM traffic.
pub struct Mmc {
    rom: Vec<u8>,
    vram: Vec<u8>,
    wram: Vec<u8>,
    eram: Vec<u8>,
    pub oam: [u8; OAM_SIZE],
    pub hram: [u8; HRAM_SIZE],
    vbk: u8,
    svbk: u8,
    rom_banks: usize,
    ram_banks: usize,
    has_battery: bool,
    mapper: Mapper,
}

impl Mmc {
    pub fn new() -> Self {
        let mut mmc = Self {
            rom: vec![0; 2 * ROM_BANK_SIZE],
            vram: vec![0; VRAM_BANKS * VRAM_BANK_SIZE],
            wram: vec![0; WRAM_BANKS * WRAM_BANK_SIZE],
            eram: vec![0; ERAM_BANK_SIZE],
            oam: [0; OAM_SIZE],
            hram: [0; HRAM_SIZE],
            vbk: 0,
            svbk: 1,
            rom_banks: 2,
            ram_banks: 1,
            has_battery: false,
            mapper: Mapper::RomOnly,
        };
        mmc.reset();
        mmc
    }

    /// Restores the post-boot memory state: HRAM as the boot ROM leaves it,
    /// VRAM cleared except for the logo tiles, bank selects at their
    /// defaults. WRAM and external RAM are deliberately left alone.
    pub fn reset(&mut self) {
        self.hram.fill(0xFF);
        self.vram.fill(0x00);
        for bank in 0..VRAM_BANKS {
            let base = bank * VRAM_BANK_SIZE;
            for (i, byte) in INITIAL_TILE_DATA.iter().enumerate() {
                self.vram[base + i * 2 + 0x10] = *byte;
            }
            for (i, byte) in INITIAL_TILE_MAP.iter().enumerate() {
                self.vram[base + i + 0x1904] = *byte;
            }
        }
        self.vbk = 0;
        self.svbk = 1;
        if let Mapper::Mbc1 {
            ram_enable,
            rom_bank,
            ram_bank,
            mode,
        } = &mut self.mapper
        {
            *ram_enable = false;
            *rom_bank = 0;
            *ram_bank = 0;
            *mode = 0;
        }
    }

    /// Installs a ROM image, selecting the mapper from the cartridge header.
    /// Unknown mapper types degrade to ROM-only with a warning.
    pub fn load_rom(&mut self, data: Vec<u8>) {
        let mapper_byte = data.get(0x147).copied().unwrap_or(0);
        let rom_shift = data.get(0x148).copied().unwrap_or(0);
        let ram_code = data.get(0x149).copied().unwrap_or(0);
        let title: String = data
            .get(0x134..0x144)
            .unwrap_or(&[])
            .iter()
            .take_while(|byte| **byte != 0)
            .map(|byte| {
                if byte.is_ascii_graphic() || *byte == b' ' {
                    *byte as char
                } else {
                    '?'
                }
            })
            .collect();

        self.mapper = match mapper_byte {
            0x00 => Mapper::RomOnly,
            0x01..=0x03 => Mapper::Mbc1 {
                ram_enable: false,
                rom_bank: 0,
                ram_bank: 0,
                mode: 0,
            },
            other => {
                warn!("unhandled mapper type {other:#04x}; treating cartridge as ROM only");
                Mapper::RomOnly
            }
        };
        self.has_battery = mapper_byte == 0x03;
        self.rom_banks = 2usize << rom_shift.min(8);
        self.ram_banks = match ram_code {
            0x00..=0x02 => 1,
            0x03 => 4,
            0x04 | 0x05 => {
                warn!("external RAM code {ram_code:#04x} exceeds what MBC1 can address");
                4
            }
            other => {
                warn!("unknown external RAM code {other:#04x}");
                1
            }
        };

        let declared = self.rom_banks * ROM_BANK_SIZE;
        if data.len() < declared {
            warn!(
                "ROM image is {} bytes but the header declares {} banks; padding with zeros",
                data.len(),
                self.rom_banks
            );
        }
        self.rom = data;
        self.rom.resize(declared, 0);
        self.eram = vec![0; self.ram_banks * ERAM_BANK_SIZE];

        debug!(
            "loaded \"{title}\": mapper {mapper_byte:#04x}, {} ROM banks, {} RAM banks",
            self.rom_banks, self.ram_banks
        );
    }

    pub fn has_battery(&self) -> bool {
        self.has_battery
    }

    /// ROM bank visible through the fixed 0x0000-0x3FFF window.
    fn low_bank(&self) -> usize {
        match &self.mapper {
            Mapper::RomOnly => 0,
            Mapper::Mbc1 { ram_bank, mode, .. } => {
                if *mode != 0 && self.rom_banks > 32 {
                    ((*ram_bank as usize) << 5) % self.rom_banks
                } else {
                    0
                }
            }
        }
    }

    /// ROM bank visible through the switchable 0x4000-0x7FFF window.
    fn high_bank(&self) -> usize {
        match &self.mapper {
            Mapper::RomOnly => 1,
            Mapper::Mbc1 {
                rom_bank, ram_bank, ..
            } => {
                if self.rom_banks > 32 {
                    (((*ram_bank as usize) << 5) | *rom_bank as usize) % self.rom_banks
                } else if *rom_bank == 0 {
                    1
                } else {
                    *rom_bank as usize & (self.rom_banks - 1)
                }
            }
        }
    }

    fn eram_bank(&self) -> usize {
        match &self.mapper {
            Mapper::RomOnly => 0,
            Mapper::Mbc1 {
                ram_bank, mode, ..
            } => {
                if *mode != 0 {
                    (*ram_bank as usize & 0b11) % self.ram_banks
                } else {
                    0
                }
            }
        }
    }

    pub fn read(&self, address: u16) -> u8 {
        let address = address as usize;
        match address {
            0x0000..=0x3FFF => self.rom[self.low_bank() * ROM_BANK_SIZE + address],
            0x4000..=0x7FFF => self.rom[self.high_bank() * ROM_BANK_SIZE + address - 0x4000],
            0x8000..=0x9FFF => {
                self.vram[(self.vbk & 1) as usize * VRAM_BANK_SIZE + address - 0x8000]
            }
            0xA000..=0xBFFF => match &self.mapper {
                Mapper::RomOnly => self.eram[address - 0xA000],
                Mapper::Mbc1 { ram_enable, .. } => {
                    if *ram_enable {
                        self.eram[self.eram_bank() * ERAM_BANK_SIZE + address - 0xA000]
                    } else {
                        debug!("read from disabled external RAM at {address:#06x}");
                        0xFF
                    }
                }
            },
            0xC000..=0xCFFF => self.wram[address - 0xC000],
            0xD000..=0xDFFF => {
                self.wram[(self.svbk & 0b111) as usize * WRAM_BANK_SIZE + address - 0xD000]
            }
            _ => 0,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        let address = address as usize;
        match address {
            0x0000..=0x7FFF => match &mut self.mapper {
                Mapper::RomOnly => {
                    debug!("write of {value:#04x} to ROM address {address:#06x} ignored");
                }
                Mapper::Mbc1 {
                    ram_enable,
                    rom_bank,
                    ram_bank,
                    mode,
                } => match address {
                    0x0000..=0x1FFF => *ram_enable = (value & 0x0F) == 0x0A,
                    0x2000..=0x3FFF => {
                        *rom_bank = value & 0x1F;
                        if *rom_bank == 0 {
                            *rom_bank = 1;
                        }
                    }
                    0x4000..=0x5FFF => *ram_bank = value & 0x03,
                    _ => *mode = value & 1,
                },
            },
            0x8000..=0x9FFF => {
                self.vram[(self.vbk & 1) as usize * VRAM_BANK_SIZE + address - 0x8000] = value;
            }
            0xA000..=0xBFFF => match &self.mapper {
                Mapper::RomOnly => self.eram[address - 0xA000] = value,
                Mapper::Mbc1 { ram_enable, .. } => {
                    if *ram_enable {
                        let offset = self.eram_bank() * ERAM_BANK_SIZE + address - 0xA000;
                        self.eram[offset] = value;
                    } else {
                        debug!("write to disabled external RAM at {address:#06x}");
                    }
                }
            },
            0xC000..=0xCFFF => self.wram[address - 0xC000] = value,
            0xD000..=0xDFFF => {
                self.wram[(self.svbk & 0b111) as usize * WRAM_BANK_SIZE + address - 0xD000] = value;
            }
            _ => {}
        }
    }

    pub fn read_oam(&self, address: u16) -> u8 {
        self.oam[(address as usize - 0xFE00) % OAM_SIZE]
    }

    pub fn write_oam(&mut self, address: u16, value: u8) {
        self.oam[(address as usize - 0xFE00) % OAM_SIZE] = value;
    }

    /// Raw 4-byte OAM entry (y, x, tile, flags) for sprite `index`.
    pub fn oam_entry(&self, index: usize) -> [u8; 4] {
        let base = (index % 40) * 4;
        [
            self.oam[base],
            self.oam[base + 1],
            self.oam[base + 2],
            self.oam[base + 3],
        ]
    }

    pub fn read_hram(&self, address: u16) -> u8 {
        self.hram[(address & 0xFF) as usize]
    }

    pub fn write_hram(&mut self, address: u16, value: u8) {
        self.hram[(address & 0xFF) as usize] = value;
    }

    pub fn vram_bank(&self, bank: usize) -> &[u8] {
        let base = (bank & 1) * VRAM_BANK_SIZE;
        &self.vram[base..base + VRAM_BANK_SIZE]
    }

    pub fn read_vbk(&self) -> u8 {
        self.vbk
    }

    pub fn write_vbk(&mut self, value: u8) {
        self.vbk = value | 0xFE;
    }

    pub fn read_svbk(&self) -> u8 {
        self.svbk
    }

    pub fn write_svbk(&mut self, value: u8) {
        self.svbk = value;
        if self.svbk & 0b111 == 0 {
            self.svbk |= 1;
        }
    }

    /// Persists external RAM to a battery-save file.
    pub fn save_ram(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, &self.eram)
    }

    /// Restores external RAM from a battery-save file. Short or oversized
    /// files fill what they can; the rest keeps its current contents.
    pub fn load_ram(&mut self, path: &Path) -> io::Result<()> {
        let data = std::fs::read(path)?;
        if data.len() != self.eram.len() {
            warn!(
                "battery save is {} bytes, cartridge has {} bytes of RAM",
                data.len(),
                self.eram.len()
            );
        }
        let len = data.len().min(self.eram.len());
        self.eram[..len].copy_from_slice(&data[..len]);
        Ok(())
    }

    pub fn write_state(&self, state: &mut SaveState) {
        state.write_u8(self.vbk);
        state.write_u8(self.svbk);
        if let Mapper::Mbc1 {
            ram_enable,
            rom_bank,
            ram_bank,
            mode,
        } = &self.mapper
        {
            state.write_bool(*ram_enable);
            state.write_u8(*rom_bank);
            state.write_u8(*ram_bank);
            state.write_u8(*mode);
        }
        state.write_bytes(&self.vram);
        state.write_bytes(&self.wram);
        state.write_bytes(&self.eram);
        state.write_bytes(&self.oam);
        state.write_bytes(&self.hram);
    }

    pub fn load_state(&mut self, state: &mut SaveState) -> Result<(), SaveStateError> {
        self.vbk = state.read_u8()?;
        self.svbk = state.read_u8()?;
        if let Mapper::Mbc1 {
            ram_enable,
            rom_bank,
            ram_bank,
            mode,
        } = &mut self.mapper
        {
            *ram_enable = state.read_bool()?;
            *rom_bank = state.read_u8()?;
            *ram_bank = state.read_u8()?;
            *mode = state.read_u8()?;
        }
        state.read_bytes(&mut self.vram)?;
        state.read_bytes(&mut self.wram)?;
        state.read_bytes(&mut self.eram)?;
        state.read_bytes(&mut self.oam)?;
        state.read_bytes(&mut self.hram)?;
        Ok(())
    }
}

impl Default for Mmc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mbc1_rom(banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[0x147] = 0x01;
        rom[0x148] = (banks / 2).trailing_zeros() as u8;
        for bank in 0..banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        rom
    }

    #[test]
    fn reset_seeds_logo_tiles_in_both_vram_banks() {
        let mmc = Mmc::new();
        assert_eq!(mmc.vram_bank(0)[0x10], 0xF0);
        assert_eq!(mmc.vram_bank(1)[0x10], 0xF0);
        assert_eq!(mmc.vram_bank(0)[0x1904], 0x01);
        assert_eq!(mmc.vram_bank(0)[0x1910], 0x19);
    }

    #[test]
    fn rom_bank_zero_select_maps_to_bank_one() {
        let mut mmc = Mmc::new();
        mmc.load_rom(mbc1_rom(4));
        mmc.write(0x2000, 0x00);
        assert_eq!(mmc.read(0x4000), 1);
        mmc.write(0x2000, 0x02);
        assert_eq!(mmc.read(0x4000), 2);
    }

    #[test]
    fn large_rom_uses_upper_bank_bits() {
        let mut mmc = Mmc::new();
        mmc.load_rom(mbc1_rom(64));
        mmc.write(0x2000, 0x01);
        mmc.write(0x4000, 0x01); // upper bits
        assert_eq!(mmc.read(0x4000), 33);
        // Mode 1 moves the upper bits into the fixed window too.
        mmc.write(0x6000, 0x01);
        assert_eq!(mmc.read(0x0000), 32);
    }

    #[test]
    fn disabled_external_ram_reads_open_bus() {
        let mut mmc = Mmc::new();
        mmc.load_rom(mbc1_rom(2));
        mmc.write(0xA000, 0x55);
        assert_eq!(mmc.read(0xA000), 0xFF);
        mmc.write(0x0000, 0x0A);
        mmc.write(0xA000, 0x55);
        assert_eq!(mmc.read(0xA000), 0x55);
        mmc.write(0x0000, 0x00);
        assert_eq!(mmc.read(0xA000), 0xFF);
    }

    #[test]
    fn wram_banks_switch_through_svbk() {
        let mut mmc = Mmc::new();
        mmc.write(0xD000, 0xAA);
        mmc.write_svbk(0x02);
        mmc.write(0xD000, 0xBB);
        assert_eq!(mmc.read(0xD000), 0xBB);
        mmc.write_svbk(0x01);
        assert_eq!(mmc.read(0xD000), 0xAA);
        // Bank 0 select coerces to bank 1.
        mmc.write_svbk(0x00);
        assert_eq!(mmc.read(0xD000), 0xAA);
    }

    #[test]
    fn unknown_mapper_degrades_to_rom_only() {
        let mut rom = vec![0u8; 2 * ROM_BANK_SIZE];
        rom[0x147] = 0x42;
        rom[0x4000] = 0x99;
        let mut mmc = Mmc::new();
        mmc.load_rom(rom);
        assert_eq!(mmc.read(0x4000), 0x99);
        mmc.write(0x2000, 0x05);
        assert_eq!(mmc.read(0x4000), 0x99);
    }
}
