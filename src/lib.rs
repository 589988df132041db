//! Cycle-accurate Game Boy Color emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU/bus/PPU/APU/
//! timer/DMA/cartridge banking). Frontends own the window, the audio device
//! and input mapping, and drive the core through the [`machine::Machine`]
//! facade.

/// Audio Processing Unit: four-channel synthesis and sample generation.
pub mod apu;

/// Memory map, OAM-DMA bus arbitration and I/O register dispatch.
pub mod bus;

/// LR35902 CPU core.
pub mod cpu;

/// OAM DMA engine and the (stubbed) HDMA register file.
pub mod dma;

/// Joypad matrix register.
pub mod joypad;

/// High-level facade that wires the CPU and bus into a single machine.
pub mod machine;

/// Cartridge/memory controller: ROM, VRAM, WRAM, external RAM and banking.
pub mod mmc;

/// Pixel Processing Unit: scanline state machine and compositing.
pub mod ppu;

/// Ordered binary serialization for machine snapshots.
pub mod save_state;

/// Divider/timer unit.
pub mod timer;

pub use joypad::Button;
pub use machine::Machine;
pub use save_state::SaveStateError;
