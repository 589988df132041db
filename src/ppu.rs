use log::warn;

use crate::mmc::Mmc;
use crate::save_state::{SaveState, SaveStateError};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

const IF_VBLANK: u8 = 0x01;
const IF_LCD: u8 = 0x02;

const DOTS_PER_LINE: u16 = 456;
const LINES_PER_FRAME: u8 = 154;

const MODE_HBLANK: u8 = 0;
const MODE_VBLANK: u8 = 1;
const MODE_OAM_SCAN: u8 = 2;
const MODE_RENDERING: u8 = 3;

// The classic green ramp, lightest first.
const DMG_PALETTE: [[f32; 3]; 4] = [
    [0.88, 0.97, 0.82],
    [0.53, 0.75, 0.44],
    [0.20, 0.41, 0.34],
    [0.03, 0.09, 0.13],
];

/// Scanline-based picture unit.
///
/// Each scanline is prerendered into background, window, and sprite line
/// buffers when mode 3 begins, then merged one pixel per dot. Mode timing is
/// still tracked dot by dot, including the variable mode 3 penalty, so STAT
/// polling loops observe realistic mode durations.
pub struct Ppu {
    dot: u16,
    mode3_penalty: u16,
    window_scanline: u8,
    stat_interrupt: bool,
    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    scx_buffer: u8,
    ly: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,
    bgpi: u8,
    bgpd: u8,
    obpi: u8,
    obpd: u8,
    opri: u8,
    bg_line: [u8; 256],
    window_line: [u8; 166],
    // Per slot: palette byte in bits 8-15, priority in bit 2, color in 0-1.
    sprite_line: [u16; SCREEN_WIDTH],
    frames: [Vec<[f32; 3]>; 2],
    active_frame: usize,
    frame_ready: bool,
}

impl Ppu {
    pub fn new() -> Self {
        let mut ppu = Self {
            dot: 0,
            mode3_penalty: 0,
            window_scanline: 0,
            stat_interrupt: false,
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            scx_buffer: 0,
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            bgpi: 0,
            bgpd: 0,
            obpi: 0,
            obpd: 0,
            opri: 0,
            bg_line: [0; 256],
            window_line: [0; 166],
            sprite_line: [0; SCREEN_WIDTH],
            frames: [
                vec![[0.0; 3]; SCREEN_WIDTH * SCREEN_HEIGHT],
                vec![[0.0; 3]; SCREEN_WIDTH * SCREEN_HEIGHT],
            ],
            active_frame: 0,
            frame_ready: false,
        };
        ppu.reset();
        ppu
    }

    /// Post-boot register values.
    pub fn reset(&mut self) {
        self.dot = 0;
        self.ly = 0;
        self.lyc = 0;
        self.scx = 0;
        self.scx_buffer = 0;
        self.scy = 0;
        self.wx = 0;
        self.wy = 0;
        self.lcdc = 0x91;
        self.stat = 0x80;
        self.bgp = 0xE4;
        self.obp0 = 0xFF;
        self.obp1 = 0xFF;
        self.bgpi = 0xFF;
        self.bgpd = 0xFF;
        self.obpi = 0xFF;
        self.obpd = 0xFF;
        self.opri = 0xFF;
        self.set_mode(MODE_OAM_SCAN);
        self.window_scanline = 0;
        self.frame_ready = false;
        self.stat_interrupt = false;
    }

    fn mode(&self) -> u8 {
        self.stat & 0x03
    }

    fn set_mode(&mut self, mode: u8) {
        self.stat = (self.stat & !0x03) | mode;
    }

    fn mode_int_selected(&self, mode: u8) -> bool {
        self.stat & (0x08 << mode) != 0
    }

    fn lyc_int_selected(&self) -> bool {
        self.stat & 0x40 != 0
    }

    fn lcd_enabled(&self) -> bool {
        self.lcdc & 0x80 != 0
    }

    fn window_tile_map(&self) -> u16 {
        ((self.lcdc >> 6) & 1) as u16
    }

    fn window_enabled(&self) -> bool {
        self.lcdc & 0x20 != 0
    }

    fn bg_tile_map(&self) -> u16 {
        ((self.lcdc >> 3) & 1) as u16
    }

    fn tall_sprites(&self) -> bool {
        self.lcdc & 0x04 != 0
    }

    fn obj_enabled(&self) -> bool {
        self.lcdc & 0x02 != 0
    }

    fn bg_window_enabled(&self) -> bool {
        self.lcdc & 0x01 != 0
    }

    /// Advances the unit by `cycles` dots, raising VBlank and STAT interrupt
    /// requests in `if_reg`.
    pub fn step(&mut self, cycles: u32, mmc: &Mmc, if_reg: &mut u8) {
        for _ in 0..cycles {
            self.step_dot(mmc, if_reg);
        }
    }

    fn step_dot(&mut self, mmc: &Mmc, if_reg: &mut u8) {
        match self.mode() {
            MODE_HBLANK => {
                if !self.stat_interrupt && self.mode_int_selected(MODE_HBLANK) {
                    *if_reg |= IF_LCD;
                }
                if self.dot == DOTS_PER_LINE - 1 {
                    if self.ly == SCREEN_HEIGHT as u8 - 1 {
                        self.set_mode(MODE_VBLANK);
                        self.frame_ready = true;
                        *if_reg |= IF_VBLANK;
                    } else {
                        self.set_mode(MODE_OAM_SCAN);
                    }
                }
            }
            MODE_VBLANK => {
                if !self.stat_interrupt && self.mode_int_selected(MODE_VBLANK) {
                    *if_reg |= IF_LCD;
                }
                if self.dot == DOTS_PER_LINE - 1 && self.ly == LINES_PER_FRAME - 1 {
                    self.set_mode(MODE_OAM_SCAN);
                }
            }
            MODE_OAM_SCAN => {
                if !self.stat_interrupt && self.mode_int_selected(MODE_OAM_SCAN) {
                    *if_reg |= IF_LCD;
                }
                if self.dot == 79 {
                    self.set_mode(MODE_RENDERING);
                    self.scx = self.scx_buffer;
                    self.update_mode3_penalty(mmc);
                    self.prerender_bg_line(mmc);
                    self.prerender_window_line(mmc);
                    self.prerender_sprite_line(mmc);
                }
            }
            _ => {
                if self.dot - 80 < SCREEN_WIDTH as u16 {
                    // Mid-line SCX writes only move the fine scroll.
                    if self.dot % 8 == 0 {
                        self.scx = (self.scx_buffer & 0xF8) | (self.scx & 0x07);
                    }
                    self.merge_pixel();
                } else if self.dot == 80 + self.mode3_penalty + SCREEN_WIDTH as u16 {
                    self.set_mode(MODE_HBLANK);
                }
            }
        }

        self.dot += 1;
        if self.dot == DOTS_PER_LINE {
            self.dot = 0;
            if self.window_enabled() && self.wy <= self.ly && self.wx < 166 {
                self.window_scanline = self.window_scanline.wrapping_add(1);
            }
            self.ly += 1;
            if self.ly == LINES_PER_FRAME {
                self.ly = 0;
                self.window_scanline = 0;
                self.active_frame = (self.active_frame + 1) % 2;
                self.frames[self.active_frame].fill([0.0; 3]);
                self.stat_interrupt = false;
            }
        }

        let lyc_match = self.ly == self.lyc;
        self.stat = (self.stat & !0x04) | ((lyc_match as u8) << 2);
        if !self.stat_interrupt && lyc_match && self.lyc_int_selected() {
            *if_reg |= IF_LCD;
        }

        // The STAT line stays high while any selected condition holds, which
        // blocks further LCD requests until every condition drops.
        self.stat_interrupt = lyc_match
            || match self.mode() {
                mode @ MODE_HBLANK..=MODE_OAM_SCAN => self.mode_int_selected(mode),
                _ => false,
            };
    }

    fn tile_row(&self, mmc: &Mmc, tile: u8, row: u16) -> (u8, u8) {
        let base = if self.lcdc & 0x10 != 0 {
            0x8000 + tile as u16 * 16
        } else {
            (0x9000 + (tile as i8) as i32 * 16) as u16
        };
        (mmc.read(base + row * 2), mmc.read(base + row * 2 + 1))
    }

    fn prerender_bg_line(&mut self, mmc: &Mmc) {
        self.bg_line.fill(0);
        if !self.bg_window_enabled() {
            return;
        }
        let y = self.ly.wrapping_add(self.scy);
        for tile_x in 0..32u16 {
            let x = tile_x * 8;
            let tile_index = (((y & 0xF8) as u16) << 2) + tile_x;
            let tile = mmc.read(0x9800 + tile_index + 0x400 * self.bg_tile_map());
            let (low, high) = self.tile_row(mmc, tile, (y % 8) as u16);
            for pixel in 0..8 {
                self.bg_line[(x + pixel) as usize] =
                    ((low >> (7 - pixel)) & 1) | (((high >> (7 - pixel)) & 1) << 1);
            }
        }
    }

    // The buffer is left stale when the window does not apply to this line;
    // the merge step never samples it in that case.
    fn prerender_window_line(&mut self, mmc: &Mmc) {
        if !self.window_enabled() || self.wy > self.ly || self.wx >= 166 {
            return;
        }
        self.window_line.fill(0);
        let y = self.window_scanline;
        for tile_x in 0..20u16 {
            let x = tile_x * 8;
            let tile_index = (((y & 0xF8) as u16) << 2) + tile_x;
            let tile = mmc.read(0x9800 + tile_index + 0x400 * self.window_tile_map());
            let (low, high) = self.tile_row(mmc, tile, (y % 8) as u16);
            for pixel in 0..8 {
                self.window_line[(x + pixel) as usize] =
                    ((low >> (7 - pixel)) & 1) | (((high >> (7 - pixel)) & 1) << 1);
            }
        }
    }

    fn prerender_sprite_line(&mut self, mmc: &Mmc) {
        self.sprite_line.fill(0);
        let mut obj_count = 0;
        for sprite_index in 0..40 {
            if obj_count == 10 {
                break;
            }
            let [y, x, tile, flags] = mmc.oam_entry(sprite_index);
            let sprite_x = x as i32 - 8;
            let sprite_y = y as i32 - 16;
            if (self.ly as i32) < sprite_y {
                continue;
            }
            let mut row = (self.ly as i32 - sprite_y) as u16;
            let mut tile_index = tile as u16;
            if self.tall_sprites() {
                if row > 15 {
                    continue;
                }
                if flags & 0x40 != 0 {
                    row = 15 - row;
                }
                tile_index = (tile as u16 & 0xFE) + (row > 7) as u16;
            } else {
                if row > 7 {
                    continue;
                }
                if flags & 0x40 != 0 {
                    row = 7 - row;
                }
            }
            obj_count += 1;

            let low = mmc.read(0x8000 + tile_index * 16 + (row % 8) * 2);
            let high = mmc.read(0x8000 + tile_index * 16 + (row % 8) * 2 + 1);
            let palette = if flags & 0x10 != 0 { self.obp1 } else { self.obp0 };
            let priority = ((flags >> 7) & 1) as u16;

            for offset in 0..8i32 {
                let screen_x = sprite_x + offset;
                if !(0..SCREEN_WIDTH as i32).contains(&screen_x) {
                    continue;
                }
                let slot = &mut self.sprite_line[screen_x as usize];
                // First sprite in OAM order wins the slot.
                if *slot & 0b11 != 0 {
                    continue;
                }
                let column = if flags & 0x20 != 0 { 7 - offset } else { offset };
                let color =
                    (((low >> (7 - column)) & 1) | (((high >> (7 - column)) & 1) << 1)) as u16;
                if color == 0 {
                    continue;
                }
                *slot = (priority << 2) | color | ((palette as u16) << 8);
            }
        }
    }

    fn merge_pixel(&mut self) {
        let x = (self.dot - 80) as usize;
        let sprite = self.sprite_line[x];
        let sprite_color = ((sprite & 0b11) * 2) as u8;
        let sprite_behind = sprite & 0b100 != 0;

        let in_window = self.window_enabled()
            && self.wy <= self.ly
            && self.wx < 160
            && self.dot - 73 >= self.wx as u16;
        let background = if in_window {
            let index = (self.dot - 73 - self.wx as u16) as usize;
            self.window_line.get(index).copied().unwrap_or(0)
        } else {
            self.bg_line[((self.dot - 80 + self.scx as u16) % 256) as usize]
        };

        let color = if self.obj_enabled()
            && sprite & 0b11 != 0
            && (!sprite_behind || background == 0)
        {
            let palette = (sprite >> 8) as u8;
            DMG_PALETTE[((palette >> sprite_color) & 0b11) as usize]
        } else {
            DMG_PALETTE[((self.bgp >> (background * 2)) & 0b11) as usize]
        };
        self.frames[self.active_frame][self.ly as usize * SCREEN_WIDTH + x] = color;
    }

    /// Recomputed when mode 3 begins: base 12 dots, plus fine scroll, plus a
    /// flat window cost, plus a per-sprite fetch cost.
    fn update_mode3_penalty(&mut self, mmc: &Mmc) {
        let mut penalty = 12 + (self.scx % 8) as i32;
        if self.ly >= self.wy {
            penalty += 6;
        }
        let mut obj_count = 0;
        for sprite_index in 0..40 {
            if obj_count == 10 {
                break;
            }
            let [y, x, _, _] = mmc.oam_entry(sprite_index);
            let sprite_y = y as i32 - 16;
            if (self.ly as i32) < sprite_y {
                continue;
            }
            if self.ly as i32 - sprite_y > 7 {
                continue;
            }
            obj_count += 1;
            if x == 0 {
                penalty += 11;
            } else {
                penalty += 4 + (7 - ((x as i32 - (self.scx % 8) as i32) % 8));
            }
        }
        self.mode3_penalty = penalty as u16;
    }

    /// The most recently completed framebuffer, row-major. Rendering always
    /// targets the other buffer, so this never shows a partial frame.
    pub fn frame(&self) -> &[[f32; 3]] {
        &self.frames[(self.active_frame + 1) % 2]
    }

    /// Returns true once per frame, at the start of VBlank.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::replace(&mut self.frame_ready, false)
    }

    pub fn read_lcdc(&self) -> u8 {
        self.lcdc
    }

    pub fn write_lcdc(&mut self, value: u8) {
        self.lcdc = value;
        if !self.lcd_enabled() {
            self.ly = 0;
            self.dot = 0;
            self.set_mode(MODE_OAM_SCAN);
        }
    }

    pub fn read_stat(&self) -> u8 {
        self.stat
    }

    pub fn write_stat(&mut self, value: u8) {
        self.stat = (value & 0xF8) | (self.stat & 0x07) | 0x80;
    }

    pub fn read_scy(&self) -> u8 {
        self.scy
    }

    pub fn write_scy(&mut self, value: u8) {
        self.scy = value;
    }

    pub fn read_scx(&self) -> u8 {
        self.scx
    }

    // SCX takes effect at the next scanline's mode 3 (coarse bits only once
    // rendering has begun).
    pub fn write_scx(&mut self, value: u8) {
        self.scx_buffer = value;
    }

    pub fn read_ly(&self) -> u8 {
        self.ly
    }

    pub fn write_ly(&mut self, _value: u8) {
        warn!("write to read-only register LY");
    }

    pub fn read_lyc(&self) -> u8 {
        self.lyc
    }

    pub fn write_lyc(&mut self, value: u8) {
        self.lyc = value;
    }

    fn rendering(&self) -> bool {
        self.mode() == MODE_RENDERING
    }

    // Palette registers are inaccessible while mode 3 is on screen.
    pub fn read_bgp(&self) -> u8 {
        if self.rendering() { 0xFF } else { self.bgp }
    }

    pub fn write_bgp(&mut self, value: u8) {
        if !self.rendering() {
            self.bgp = value;
        }
    }

    pub fn read_obp0(&self) -> u8 {
        if self.rendering() { 0xFF } else { self.obp0 }
    }

    pub fn write_obp0(&mut self, value: u8) {
        if !self.rendering() {
            self.obp0 = value;
        }
    }

    pub fn read_obp1(&self) -> u8 {
        if self.rendering() { 0xFF } else { self.obp1 }
    }

    pub fn write_obp1(&mut self, value: u8) {
        if !self.rendering() {
            self.obp1 = value;
        }
    }

    pub fn read_wy(&self) -> u8 {
        self.wy
    }

    pub fn write_wy(&mut self, value: u8) {
        self.wy = value;
    }

    pub fn read_wx(&self) -> u8 {
        self.wx
    }

    pub fn write_wx(&mut self, value: u8) {
        self.wx = value;
    }

    pub fn read_bgpi(&self) -> u8 {
        if self.rendering() { 0xFF } else { self.bgpi }
    }

    pub fn write_bgpi(&mut self, value: u8) {
        if !self.rendering() {
            self.bgpi = value;
        }
    }

    pub fn read_bgpd(&self) -> u8 {
        if self.rendering() { 0xFF } else { self.bgpd }
    }

    pub fn write_bgpd(&mut self, value: u8) {
        if !self.rendering() {
            self.bgpd = value;
        }
    }

    pub fn read_obpi(&self) -> u8 {
        if self.rendering() { 0xFF } else { self.obpi }
    }

    pub fn write_obpi(&mut self, value: u8) {
        if !self.rendering() {
            self.obpi = value;
        }
    }

    pub fn read_obpd(&self) -> u8 {
        if self.rendering() { 0xFF } else { self.obpd }
    }

    pub fn write_obpd(&mut self, value: u8) {
        if !self.rendering() {
            self.obpd = value;
        }
    }

    pub fn read_opri(&self) -> u8 {
        self.opri
    }

    pub fn write_opri(&mut self, value: u8) {
        if !self.rendering() {
            self.opri = value;
        }
    }

    pub fn write_state(&self, state: &mut SaveState) {
        state.write_u16(self.dot);
        state.write_u8(self.mode3_penalty as u8);
        state.write_u8(self.window_scanline);
        state.write_bool(self.stat_interrupt);
        state.write_u8(self.lcdc);
        state.write_u8(self.stat);
        state.write_u8(self.scy);
        state.write_u8(self.scx);
        state.write_u8(self.scx_buffer);
        state.write_u8(self.ly);
        state.write_u8(self.lyc);
        state.write_u8(self.bgp);
        state.write_u8(self.obp0);
        state.write_u8(self.obp1);
        state.write_u8(self.wy);
        state.write_u8(self.wx);
        state.write_u8(self.bgpi);
        state.write_u8(self.bgpd);
        state.write_u8(self.obpi);
        state.write_u8(self.obpd);
        state.write_u8(self.opri);
    }

    pub fn load_state(&mut self, state: &mut SaveState) -> Result<(), SaveStateError> {
        self.dot = state.read_u16()?;
        self.mode3_penalty = state.read_u8()? as u16;
        self.window_scanline = state.read_u8()?;
        self.stat_interrupt = state.read_bool()?;
        self.lcdc = state.read_u8()?;
        self.stat = state.read_u8()?;
        self.scy = state.read_u8()?;
        self.scx = state.read_u8()?;
        self.scx_buffer = state.read_u8()?;
        self.ly = state.read_u8()?;
        self.lyc = state.read_u8()?;
        self.bgp = state.read_u8()?;
        self.obp0 = state.read_u8()?;
        self.obp1 = state.read_u8()?;
        self.wy = state.read_u8()?;
        self.wx = state.read_u8()?;
        self.bgpi = state.read_u8()?;
        self.bgpd = state.read_u8()?;
        self.obpi = state.read_u8()?;
        self.obpd = state.read_u8()?;
        self.opri = state.read_u8()?;
        Ok(())
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_line(ppu: &mut Ppu, mmc: &Mmc, if_reg: &mut u8) {
        ppu.step(DOTS_PER_LINE as u32, mmc, if_reg);
    }

    #[test]
    fn mode_sequence_covers_a_scanline() {
        let mut ppu = Ppu::new();
        let mmc = Mmc::new();
        let mut if_reg = 0;

        assert_eq!(ppu.read_stat() & 0x03, MODE_OAM_SCAN);
        ppu.step(80, &mmc, &mut if_reg);
        assert_eq!(ppu.read_stat() & 0x03, MODE_RENDERING);
        // No sprites on the line and WY == 0: penalty is 12 + 6.
        ppu.step(160 + 18 + 1, &mmc, &mut if_reg);
        assert_eq!(ppu.read_stat() & 0x03, MODE_HBLANK);
        ppu.step(DOTS_PER_LINE as u32 - 80 - 160 - 18 - 1, &mmc, &mut if_reg);
        assert_eq!(ppu.read_ly(), 1);
        assert_eq!(ppu.read_stat() & 0x03, MODE_OAM_SCAN);
    }

    #[test]
    fn vblank_starts_at_line_144() {
        let mut ppu = Ppu::new();
        let mmc = Mmc::new();
        let mut if_reg = 0;

        for _ in 0..SCREEN_HEIGHT {
            step_line(&mut ppu, &mmc, &mut if_reg);
        }
        assert_eq!(ppu.read_ly(), 144);
        assert_eq!(ppu.read_stat() & 0x03, MODE_VBLANK);
        assert_eq!(if_reg & IF_VBLANK, IF_VBLANK);
        assert!(ppu.take_frame_ready());
        assert!(!ppu.take_frame_ready());
    }

    #[test]
    fn frame_wraps_after_154_lines() {
        let mut ppu = Ppu::new();
        let mmc = Mmc::new();
        let mut if_reg = 0;

        for _ in 0..LINES_PER_FRAME {
            step_line(&mut ppu, &mmc, &mut if_reg);
        }
        assert_eq!(ppu.read_ly(), 0);
        assert_eq!(ppu.read_stat() & 0x03, MODE_OAM_SCAN);
    }

    #[test]
    fn lyc_match_raises_stat_interrupt_once() {
        let mut ppu = Ppu::new();
        let mmc = Mmc::new();
        let mut if_reg = 0;

        ppu.write_lyc(2);
        ppu.write_stat(0x40);
        step_line(&mut ppu, &mmc, &mut if_reg);
        assert_eq!(if_reg & IF_LCD, 0);
        step_line(&mut ppu, &mmc, &mut if_reg);
        assert_eq!(if_reg & IF_LCD, IF_LCD);
        assert_eq!(ppu.read_stat() & 0x04, 0x04);
    }

    #[test]
    fn palette_registers_lock_during_rendering() {
        let mut ppu = Ppu::new();
        let mmc = Mmc::new();
        let mut if_reg = 0;

        ppu.step(100, &mmc, &mut if_reg);
        assert_eq!(ppu.read_stat() & 0x03, MODE_RENDERING);
        assert_eq!(ppu.read_bgp(), 0xFF);
        ppu.write_bgp(0x1B);
        ppu.step(400, &mmc, &mut if_reg);
        assert_eq!(ppu.read_bgp(), 0xE4);
    }

    #[test]
    fn disabling_the_lcd_rewinds_the_beam() {
        let mut ppu = Ppu::new();
        let mmc = Mmc::new();
        let mut if_reg = 0;

        step_line(&mut ppu, &mmc, &mut if_reg);
        ppu.step(100, &mmc, &mut if_reg);
        ppu.write_lcdc(0x11);
        assert_eq!(ppu.read_ly(), 0);
        assert_eq!(ppu.read_stat() & 0x03, MODE_OAM_SCAN);
    }

    #[test]
    fn scx_writes_latch_at_the_next_scanline() {
        let mut ppu = Ppu::new();
        let mmc = Mmc::new();
        let mut if_reg = 0;

        ppu.write_scx(0x23);
        assert_eq!(ppu.read_scx(), 0);
        step_line(&mut ppu, &mmc, &mut if_reg);
        assert_eq!(ppu.read_scx(), 0x23);
    }

    #[test]
    fn logo_tiles_produce_nonblank_pixels() {
        let mut ppu = Ppu::new();
        let mmc = Mmc::new();
        let mut if_reg = 0;

        // The logo tile map sits at tile rows 8-9 of the background map,
        // which cover scanlines 64..80. The buffers swap at the end of
        // line 153, so step a whole frame before looking.
        for _ in 0..154 {
            step_line(&mut ppu, &mmc, &mut if_reg);
        }
        let frame = ppu.frame();
        let dark = frame
            .iter()
            .filter(|pixel| pixel[0] < DMG_PALETTE[0][0])
            .count();
        assert!(dark > 0);
    }
}
