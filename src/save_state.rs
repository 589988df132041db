use std::error::Error;
use std::fmt;

/// Error produced when a snapshot blob ends before every field was read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStateError {
    Truncated,
}

impl fmt::Display for SaveStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveStateError::Truncated => {
                write!(f, "snapshot ended before all fields were restored")
            }
        }
    }
}

impl Error for SaveStateError {}

/// Append-only byte sequence with a read cursor.
///
/// Scalars are little-endian. The format carries no header or field tags:
/// load order must mirror save order exactly, and a mismatched load corrupts
/// state rather than failing. Components keep their field order stable for
/// this reason.
#[derive(Default)]
pub struct SaveState {
    data: Vec<u8>,
    cursor: usize,
}

impl SaveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            cursor: 0,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn read_u8(&mut self) -> Result<u8, SaveStateError> {
        let byte = *self
            .data
            .get(self.cursor)
            .ok_or(SaveStateError::Truncated)?;
        self.cursor += 1;
        Ok(byte)
    }

    pub fn read_bool(&mut self) -> Result<bool, SaveStateError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, SaveStateError> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32, SaveStateError> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64, SaveStateError> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<(), SaveStateError> {
        let end = self
            .cursor
            .checked_add(out.len())
            .ok_or(SaveStateError::Truncated)?;
        let src = self
            .data
            .get(self.cursor..end)
            .ok_or(SaveStateError::Truncated)?;
        out.copy_from_slice(src);
        self.cursor = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_round_trip_in_order() {
        let mut state = SaveState::new();
        state.write_u8(0xAB);
        state.write_u16(0x1234);
        state.write_u32(0xDEAD_BEEF);
        state.write_u64(0x0123_4567_89AB_CDEF);
        state.write_bool(true);

        let mut state = SaveState::from_bytes(&state.into_bytes());
        assert_eq!(state.read_u8(), Ok(0xAB));
        assert_eq!(state.read_u16(), Ok(0x1234));
        assert_eq!(state.read_u32(), Ok(0xDEAD_BEEF));
        assert_eq!(state.read_u64(), Ok(0x0123_4567_89AB_CDEF));
        assert_eq!(state.read_bool(), Ok(true));
    }

    #[test]
    fn scalars_are_little_endian() {
        let mut state = SaveState::new();
        state.write_u16(0x1234);
        assert_eq!(state.into_bytes(), vec![0x34, 0x12]);
    }

    #[test]
    fn reading_past_the_end_reports_truncation() {
        let mut state = SaveState::from_bytes(&[0x01]);
        assert_eq!(state.read_u8(), Ok(0x01));
        assert_eq!(state.read_u8(), Err(SaveStateError::Truncated));
        assert_eq!(state.read_u16(), Err(SaveStateError::Truncated));
    }
}
