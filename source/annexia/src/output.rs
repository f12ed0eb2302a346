use alloc::string::String;

/// Everything the engine prints. The host drains it after each line.
pub struct OutputBuf {
    buf: String,
    capacity: usize,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OutputError {
    OutputFull,
    FormattingErr,
}

impl OutputBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::new(),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push_str(&mut self, stir: &str) -> Result<(), OutputError> {
        if self.buf.len() + stir.len() > self.capacity {
            return Err(OutputError::OutputFull);
        }
        self.buf.push_str(stir);
        Ok(())
    }

    pub fn push_char(&mut self, c: char) -> Result<(), OutputError> {
        let mut tmp = [0u8; 4];
        self.push_str(c.encode_utf8(&mut tmp))
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

impl core::fmt::Write for OutputBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.push_str(s).map_err(|_| core::fmt::Error)
    }
}

#[cfg(test)]
mod test {
    use super::{OutputBuf, OutputError};

    #[test]
    fn bounded() {
        let mut out = OutputBuf::new(4);
        out.push_str("ab").unwrap();
        out.push_char('c').unwrap();
        assert_eq!(out.push_str("de"), Err(OutputError::OutputFull));
        assert_eq!(out.as_str(), "abc");
        out.clear();
        assert_eq!(out.as_str(), "");
    }
}
