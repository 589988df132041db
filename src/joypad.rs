use crate::save_state::{SaveState, SaveStateError};

const IF_JOYPAD: u8 = 0x10;

// P1/JOYP select bits. Low nibble is the (active-low) button matrix.
const SELECT_BUTTONS: u8 = 0x10;
const SELECT_DIRECTIONS: u8 = 0x20;

/// One of the eight physical inputs. The first four share matrix lines with
/// the last four; which group drives the register depends on the select bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
    Right = 4,
    Left = 5,
    Up = 6,
    Down = 7,
}

impl Button {
    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    #[inline]
    fn is_action(self) -> bool {
        (self as u8) < 4
    }
}

pub struct Joypad {
    data: u8,
    buttons: [bool; 8],
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            data: 0xFF,
            buttons: [false; 8],
        }
    }

    pub fn reset(&mut self) {
        self.data = 0xFF;
        self.buttons = [false; 8];
    }

    /// Records a host-side press or release. A press on a currently selected
    /// matrix line raises the joypad interrupt.
    pub fn set_button(&mut self, button: Button, pressed: bool, if_reg: &mut u8) {
        let was_pressed = self.buttons[button.index()];
        self.buttons[button.index()] = pressed;
        if pressed && !was_pressed && self.line_selected(button) {
            *if_reg |= IF_JOYPAD;
        }
    }

    pub fn read(&mut self) -> u8 {
        let a_or_right = !(self.button_pressed(Button::A) || self.button_pressed(Button::Right));
        let b_or_left = !(self.button_pressed(Button::B) || self.button_pressed(Button::Left));
        let select_or_up =
            !(self.button_pressed(Button::Select) || self.button_pressed(Button::Up));
        let start_or_down =
            !(self.button_pressed(Button::Start) || self.button_pressed(Button::Down));

        self.data = (self.data & 0xF0)
            | (a_or_right as u8)
            | ((b_or_left as u8) << 1)
            | ((select_or_up as u8) << 2)
            | ((start_or_down as u8) << 3);
        self.data
    }

    pub fn write(&mut self, value: u8) {
        self.data = (value & 0x30) | (self.data & 0xCF);
    }

    fn line_selected(&self, button: Button) -> bool {
        if button.is_action() {
            self.data & SELECT_BUTTONS != 0
        } else {
            self.data & SELECT_DIRECTIONS != 0
        }
    }

    fn button_pressed(&self, button: Button) -> bool {
        self.buttons[button.index()] && self.line_selected(button)
    }

    pub fn write_state(&self, state: &mut SaveState) {
        state.write_u8(self.data);
        for pressed in self.buttons {
            state.write_bool(pressed);
        }
    }

    pub fn load_state(&mut self, state: &mut SaveState) -> Result<(), SaveStateError> {
        self.data = state.read_u8()?;
        for pressed in self.buttons.iter_mut() {
            *pressed = state.read_bool()?;
        }
        Ok(())
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unselected_lines_read_released() {
        let mut joypad = Joypad::new();
        let mut if_reg = 0;
        joypad.write(0x00);
        joypad.set_button(Button::A, true, &mut if_reg);
        assert_eq!(joypad.read() & 0x0F, 0x0F);
        assert_eq!(if_reg, 0);
    }

    #[test]
    fn selected_press_pulls_line_low_and_raises_interrupt() {
        let mut joypad = Joypad::new();
        let mut if_reg = 0;
        joypad.write(SELECT_BUTTONS);
        joypad.set_button(Button::A, true, &mut if_reg);
        assert_eq!(joypad.read() & 0x01, 0);
        assert_eq!(if_reg, IF_JOYPAD);

        // Holding the button does not retrigger.
        if_reg = 0;
        joypad.set_button(Button::A, true, &mut if_reg);
        assert_eq!(if_reg, 0);
    }

    #[test]
    fn direction_and_action_groups_are_independent() {
        let mut joypad = Joypad::new();
        let mut if_reg = 0;
        joypad.write(SELECT_DIRECTIONS);
        joypad.set_button(Button::Down, true, &mut if_reg);
        joypad.set_button(Button::Start, true, &mut if_reg);
        // Start shares the line with Down but is in the unselected group.
        assert_eq!(joypad.read() & 0x08, 0);
        joypad.write(SELECT_BUTTONS);
        assert_eq!(joypad.read() & 0x08, 0);
    }

    #[test]
    fn write_only_touches_select_bits() {
        let mut joypad = Joypad::new();
        joypad.write(0xFF);
        assert_eq!(joypad.read(), 0xFF);
        joypad.write(0x00);
        assert_eq!(joypad.read() & 0x30, 0x00);
    }
}
