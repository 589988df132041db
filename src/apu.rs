//! Audio unit: two pulse channels, the wave channel, and the noise channel,
//! mixed down to interleaved signed 16-bit stereo at 32768 Hz.
//!
//! The frame sequencer is clocked externally: the timer reports DIV bit 4
//! falling edges and the bus forwards them to [`Apu::tick_frame`].

const SAMPLE_RATE: u32 = 32768;

// CPU cycles per output sample pair (4194304 / 32768).
const SAMPLE_INTERVAL: u32 = 128;

// Keeps roughly 1/16 s of stereo audio before new samples are dropped.
const SAMPLE_BUFFER_LIMIT: usize = 4096;

const OUTPUT_SCALE: i32 = (i16::MAX / 4) as i32;

// Pulse waveforms, sampled at bit `duty_pos`. Index is the duty selector in
// NRx1 bits 6-7.
const DUTY_TABLE: [u16; 4] = [
    0b1111_1110_1111_1110,
    0b0111_1110_0111_1110,
    0b0111_1000_0111_1000,
    0b1000_0001_1000_0001,
];

// Base LFSR clock divisors, shifted left by NR43 bits 4-7.
const NOISE_DIVISORS: [i32; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

pub fn sample_rate() -> u32 {
    SAMPLE_RATE
}

#[derive(Default)]
struct Sweep {
    period: u8,
    negate: bool,
    shift: u8,
    timer: u8,
    shadow: u16,
    enabled: bool,
}

#[derive(Default)]
struct PulseChannel {
    enabled: bool,
    duty: u8,
    length_load: u8,
    length_timer: u16,
    length_enable: bool,
    envelope_initial: u8,
    envelope_add: bool,
    envelope_period: u8,
    envelope_timer: u8,
    volume: u8,
    frequency: u16,
    period: i32,
    period_timer: i32,
    duty_pos: u8,
    sweep: Option<Sweep>,
}

impl PulseChannel {
    fn new(with_sweep: bool) -> Self {
        Self {
            sweep: with_sweep.then(Sweep::default),
            ..Default::default()
        }
    }

    fn update_period(&mut self) {
        self.period = 4 * (0x800 - self.frequency as i32);
    }

    fn write_sweep(&mut self, value: u8) {
        if let Some(sweep) = self.sweep.as_mut() {
            sweep.period = (value >> 4) & 0x07;
            sweep.negate = value & 0x08 != 0;
            sweep.shift = value & 0x07;
        }
    }

    fn read_sweep(&self) -> u8 {
        match &self.sweep {
            Some(sweep) => (sweep.period << 4) | ((sweep.negate as u8) << 3) | sweep.shift,
            None => 0,
        }
    }

    fn write_duty_length(&mut self, value: u8) {
        self.duty = value >> 6;
        self.length_load = value & 0x1F;
        self.length_timer = 64 - self.length_load as u16;
    }

    fn read_duty_length(&self) -> u8 {
        self.duty << 6
    }

    fn write_envelope(&mut self, value: u8) {
        self.envelope_initial = value >> 4;
        self.envelope_add = value & 0x08 != 0;
        self.envelope_period = value & 0x07;
        // An all-zero envelope means the DAC is off.
        if self.envelope_initial == 0 && !self.envelope_add {
            self.enabled = false;
        }
    }

    fn read_envelope(&self) -> u8 {
        (self.envelope_initial << 4) | ((self.envelope_add as u8) << 3) | self.envelope_period
    }

    fn write_frequency_low(&mut self, value: u8) {
        self.frequency = (self.frequency & 0x700) | value as u16;
        self.update_period();
    }

    fn write_control(&mut self, value: u8) {
        self.length_enable = value & 0x40 != 0;
        self.frequency = (self.frequency & 0xFF) | (((value & 0x07) as u16) << 8);
        self.update_period();
        if value & 0x80 != 0 {
            self.trigger();
        }
    }

    fn read_control(&self) -> u8 {
        (self.length_enable as u8) << 6
    }

    fn trigger(&mut self) {
        self.enabled = !(self.envelope_period == 0 && self.envelope_initial == 0);
        if self.length_timer == 0 {
            self.length_timer = 64;
        }
        self.period_timer = self.period;
        self.envelope_timer = self.envelope_period;
        self.volume = self.envelope_initial;

        let shifts_now = match self.sweep.as_mut() {
            Some(sweep) => {
                sweep.shadow = self.frequency;
                sweep.timer = sweep.period;
                sweep.enabled = sweep.period != 0 || sweep.shift != 0;
                sweep.shift != 0
            }
            None => false,
        };
        if shifts_now {
            self.shift_frequency();
        }
    }

    /// One sweep iteration. Returns false when the new frequency overflows,
    /// which silences the channel.
    fn shift_frequency(&mut self) -> bool {
        let Some(sweep) = self.sweep.as_mut() else {
            return true;
        };
        let delta = (sweep.shadow >> sweep.shift) as i32;
        let shifted = if sweep.negate {
            sweep.shadow as i32 - delta
        } else {
            sweep.shadow as i32 + delta
        };
        if !(0..0x800).contains(&shifted) {
            self.enabled = false;
            sweep.enabled = false;
            return false;
        }
        sweep.shadow = shifted as u16;
        self.frequency = shifted as u16;
        self.update_period();
        true
    }

    fn run(&mut self, cycles: u32) {
        self.period_timer -= cycles as i32;
        while self.period_timer <= 0 && self.period > 0 {
            self.period_timer += self.period;
            self.duty_pos = (self.duty_pos + 1) % 8;
        }
    }

    fn clock_length(&mut self) {
        if self.length_enable && self.length_timer > 0 {
            self.length_timer -= 1;
            if self.length_timer == 0 {
                self.enabled = false;
            }
        }
    }

    fn clock_envelope(&mut self) {
        if self.envelope_timer == 0 {
            return;
        }
        self.envelope_timer -= 1;
        if self.envelope_timer == 0 {
            let volume = if self.envelope_add {
                self.volume as i8 + 1
            } else {
                self.volume as i8 - 1
            };
            if (0..=15).contains(&volume) {
                self.envelope_timer = self.envelope_period;
                self.volume = volume as u8;
            }
        }
    }

    fn clock_sweep(&mut self) {
        let runs = match &mut self.sweep {
            Some(sweep) if sweep.enabled && sweep.period != 0 && sweep.timer > 0 => {
                sweep.timer -= 1;
                sweep.timer == 0
            }
            _ => false,
        };
        if runs && self.shift_frequency() {
            if let Some(sweep) = self.sweep.as_mut() {
                sweep.timer = sweep.period;
            }
            self.shift_frequency();
        }
    }

    fn sample(&self) -> i32 {
        if !self.enabled {
            return 0;
        }
        let bit = (DUTY_TABLE[self.duty as usize] >> self.duty_pos) & 1;
        (self.volume as i32 + 1) * bit as i32
    }
}

#[derive(Default)]
struct WaveChannel {
    enabled: bool,
    dac_power: bool,
    length_load: u8,
    length_timer: u16,
    length_enable: bool,
    volume_code: u8,
    volume_shift: u8,
    frequency: u16,
    period: i32,
    period_timer: i32,
    position: u8,
    table: [u8; 16],
}

impl WaveChannel {
    fn update_period(&mut self) {
        self.period = 2 * (0x800 - self.frequency as i32);
    }

    fn write_dac(&mut self, value: u8) {
        self.dac_power = value & 0x80 != 0;
        if !self.dac_power {
            self.enabled = false;
        }
    }

    fn read_dac(&self) -> u8 {
        ((self.dac_power as u8) << 7) | 0x7F
    }

    fn write_length(&mut self, value: u8) {
        self.length_load = value;
        self.length_timer = 256 - value as u16;
    }

    fn write_volume(&mut self, value: u8) {
        self.volume_code = (value >> 5) & 0x03;
        self.volume_shift = if self.volume_code > 0 {
            self.volume_code - 1
        } else {
            4
        };
    }

    fn read_volume(&self) -> u8 {
        (self.volume_code << 5) | 0x9F
    }

    fn write_frequency_low(&mut self, value: u8) {
        self.frequency = (self.frequency & 0x700) | value as u16;
        self.update_period();
    }

    fn write_control(&mut self, value: u8) {
        self.length_enable = value & 0x40 != 0;
        self.frequency = (self.frequency & 0xFF) | (((value & 0x07) as u16) << 8);
        self.update_period();
        if value & 0x80 != 0 {
            self.trigger();
        }
    }

    fn read_control(&self) -> u8 {
        ((self.length_enable as u8) << 6) | 0xBF
    }

    fn trigger(&mut self) {
        self.enabled = self.dac_power;
        if self.length_timer == 0 {
            self.length_timer = 256;
        }
        self.period_timer = self.period;
    }

    fn run(&mut self, cycles: u32) {
        self.period_timer -= cycles as i32;
        while self.period_timer <= 0 && self.period > 0 {
            self.period_timer += self.period;
            self.position = (self.position + 1) % 32;
        }
    }

    fn clock_length(&mut self) {
        if self.length_enable && self.length_timer > 0 {
            self.length_timer -= 1;
            if self.length_timer == 0 {
                self.enabled = false;
            }
        }
    }

    // While the channel plays, CPU accesses land on the byte it is reading.
    fn table_index(&self, offset: u16) -> usize {
        if self.dac_power {
            (self.position % 16) as usize
        } else {
            (offset % 16) as usize
        }
    }

    fn read_table(&self, offset: u16) -> u8 {
        self.table[self.table_index(offset)]
    }

    fn write_table(&mut self, offset: u16, value: u8) {
        self.table[self.table_index(offset)] = value;
    }

    fn sample(&self) -> i32 {
        if !(self.enabled && self.dac_power) {
            return 0;
        }
        let byte = self.table[(self.position / 2) as usize];
        let nibble = if self.position % 2 != 0 {
            byte & 0x0F
        } else {
            byte >> 4
        };
        (nibble >> self.volume_shift) as i32
    }
}

#[derive(Default)]
struct NoiseChannel {
    enabled: bool,
    length_load: u8,
    length_timer: u16,
    length_enable: bool,
    envelope_initial: u8,
    envelope_add: bool,
    envelope_period: u8,
    envelope_timer: u8,
    volume: u8,
    clock_shift: u8,
    narrow_width: bool,
    divisor_code: u8,
    period: i32,
    period_timer: i32,
    lfsr: u16,
    lfsr_feed: u16,
}

impl NoiseChannel {
    fn write_length(&mut self, value: u8) {
        self.length_load = value & 0x1F;
        self.length_timer = 64 - (value & 0x1F) as u16;
    }

    fn write_envelope(&mut self, value: u8) {
        self.envelope_initial = value >> 4;
        self.envelope_add = value & 0x08 != 0;
        self.envelope_period = value & 0x07;
        if self.envelope_initial == 0 && !self.envelope_add {
            self.enabled = false;
        }
    }

    fn read_envelope(&self) -> u8 {
        (self.envelope_initial << 4) | ((self.envelope_add as u8) << 3) | self.envelope_period
    }

    fn write_polynomial(&mut self, value: u8) {
        self.clock_shift = value >> 4;
        self.narrow_width = value & 0x08 != 0;
        self.divisor_code = value & 0x07;
        self.period = NOISE_DIVISORS[self.divisor_code as usize] << self.clock_shift;
        self.lfsr_feed = if self.narrow_width { 0x4040 } else { 0x4000 };
    }

    fn read_polynomial(&self) -> u8 {
        (self.clock_shift << 4) | ((self.narrow_width as u8) << 3) | self.divisor_code
    }

    fn write_control(&mut self, value: u8) {
        self.length_enable = value & 0x40 != 0;
        if value & 0x80 != 0 {
            self.trigger();
        }
    }

    fn read_control(&self) -> u8 {
        ((self.length_enable as u8) << 6) | 0xBF
    }

    fn trigger(&mut self) {
        self.enabled = !(self.envelope_period == 0 && self.envelope_initial == 0);
        if self.length_timer == 0 {
            self.length_timer = 64;
        }
        self.period_timer = self.period;
        self.envelope_timer = self.envelope_period;
        self.volume = self.envelope_initial;
        self.lfsr = 0x7FFF;
    }

    fn run(&mut self, cycles: u32) {
        self.period_timer -= cycles as i32;
        while self.period_timer <= 0 && self.period > 0 {
            self.period_timer += self.period;
            let tap = self.lfsr ^ (self.lfsr >> 1);
            self.lfsr >>= 1;
            if tap & 1 != 0 {
                self.lfsr |= self.lfsr_feed;
            } else {
                self.lfsr &= !self.lfsr_feed;
            }
        }
    }

    fn clock_length(&mut self) {
        if self.length_enable && self.length_timer > 0 {
            self.length_timer -= 1;
            if self.length_timer == 0 {
                self.enabled = false;
            }
        }
    }

    fn clock_envelope(&mut self) {
        if self.envelope_timer == 0 {
            return;
        }
        self.envelope_timer -= 1;
        if self.envelope_timer == 0 {
            let volume = if self.envelope_add {
                self.volume as i8 + 1
            } else {
                self.volume as i8 - 1
            };
            if (0..=15).contains(&volume) {
                self.envelope_timer = self.envelope_period;
                self.volume = volume as u8;
            }
        }
    }

    fn sample(&self) -> i32 {
        if self.enabled && self.lfsr & 1 != 0 {
            self.volume as i32
        } else {
            0
        }
    }
}

pub struct Apu {
    ch1: PulseChannel,
    ch2: PulseChannel,
    ch3: WaveChannel,
    ch4: NoiseChannel,
    nr50: u8,
    nr51: u8,
    audio_on: bool,
    frame: u8,
    sample_clock: u32,
    samples: Vec<i16>,
}

impl Apu {
    pub fn new() -> Self {
        Self {
            ch1: PulseChannel::new(true),
            ch2: PulseChannel::new(false),
            ch3: WaveChannel::default(),
            ch4: NoiseChannel::default(),
            // Boot ROM leftovers: full volume, CH1/CH2 to both sides.
            nr50: 0x77,
            nr51: 0xF3,
            audio_on: true,
            frame: 0,
            sample_clock: 0,
            samples: Vec::with_capacity(SAMPLE_BUFFER_LIMIT),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advances the channels by `cycles` CPU cycles, emitting one stereo
    /// sample pair per 128 cycles.
    pub fn step(&mut self, cycles: u32) {
        self.sample_clock += cycles;
        while self.sample_clock >= SAMPLE_INTERVAL {
            self.sample_clock -= SAMPLE_INTERVAL;
            self.ch1.run(SAMPLE_INTERVAL);
            self.ch2.run(SAMPLE_INTERVAL);
            self.ch3.run(SAMPLE_INTERVAL);
            self.ch4.run(SAMPLE_INTERVAL);
            self.mix_sample();
        }
    }

    fn mix_sample(&mut self) {
        let mut left = 0;
        let mut right = 0;
        if self.audio_on {
            let channels = [
                self.ch1.sample(),
                self.ch2.sample(),
                self.ch3.sample(),
                self.ch4.sample(),
            ];
            for (i, sample) in channels.iter().enumerate() {
                if self.nr51 & (1 << (i + 4)) != 0 {
                    left += sample;
                }
                if self.nr51 & (1 << i) != 0 {
                    right += sample;
                }
            }
        }
        if self.samples.len() + 2 <= SAMPLE_BUFFER_LIMIT {
            self.samples.push((OUTPUT_SCALE * left / 32) as i16);
            self.samples.push((OUTPUT_SCALE * right / 32) as i16);
        }
    }

    /// Clocks the frame sequencer: lengths on even frames, envelopes on
    /// frame 7, CH1 sweep on frames 2 and 6.
    pub fn tick_frame(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.frame = (self.frame + 1) % 8;
            if self.frame & 1 == 0 {
                self.ch1.clock_length();
                self.ch2.clock_length();
                self.ch3.clock_length();
                self.ch4.clock_length();
            }
            if self.frame == 7 {
                self.ch1.clock_envelope();
                self.ch2.clock_envelope();
                self.ch4.clock_envelope();
            }
            if self.frame & 3 == 2 {
                self.ch1.clock_sweep();
            }
        }
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            0xFF10 => self.ch1.read_sweep(),
            0xFF11 => self.ch1.read_duty_length(),
            0xFF12 => self.ch1.read_envelope(),
            0xFF13 => 0x00,
            0xFF14 => self.ch1.read_control(),
            0xFF16 => self.ch2.read_duty_length(),
            0xFF17 => self.ch2.read_envelope(),
            0xFF18 => 0x00,
            0xFF19 => self.ch2.read_control(),
            0xFF1A => self.ch3.read_dac(),
            0xFF1B => 0xFF,
            0xFF1C => self.ch3.read_volume(),
            0xFF1D => 0xFF,
            0xFF1E => self.ch3.read_control(),
            0xFF20 => 0xFF,
            0xFF21 => self.ch4.read_envelope(),
            0xFF22 => self.ch4.read_polynomial(),
            0xFF23 => self.ch4.read_control(),
            0xFF24 => self.nr50,
            0xFF25 => self.nr51,
            0xFF26 => {
                ((self.audio_on as u8) << 7)
                    | ((self.ch4.enabled as u8) << 3)
                    | ((self.ch3.enabled as u8) << 2)
                    | ((self.ch2.enabled as u8) << 1)
                    | (self.ch1.enabled as u8)
            }
            0xFF30..=0xFF3F => self.ch3.read_table(address - 0xFF30),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            0xFF10 => self.ch1.write_sweep(value),
            0xFF11 => self.ch1.write_duty_length(value),
            0xFF12 => self.ch1.write_envelope(value),
            0xFF13 => self.ch1.write_frequency_low(value),
            0xFF14 => self.ch1.write_control(value),
            0xFF16 => self.ch2.write_duty_length(value),
            0xFF17 => self.ch2.write_envelope(value),
            0xFF18 => self.ch2.write_frequency_low(value),
            0xFF19 => self.ch2.write_control(value),
            0xFF1A => self.ch3.write_dac(value),
            0xFF1B => self.ch3.write_length(value),
            0xFF1C => self.ch3.write_volume(value),
            0xFF1D => self.ch3.write_frequency_low(value),
            0xFF1E => self.ch3.write_control(value),
            0xFF20 => self.ch4.write_length(value),
            0xFF21 => self.ch4.write_envelope(value),
            0xFF22 => self.ch4.write_polynomial(value),
            0xFF23 => self.ch4.write_control(value),
            0xFF24 => self.nr50 = value,
            0xFF25 => self.nr51 = value,
            0xFF26 => self.audio_on = value & 0x80 != 0,
            0xFF30..=0xFF3F => self.ch3.write_table(address - 0xFF30, value),
            _ => {}
        }
    }

    /// Interleaved stereo samples accumulated since the last
    /// [`Apu::clear_samples`] call.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
