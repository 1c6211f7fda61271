//! Utilities for the context library
use std::fmt::{self, Display, Formatter};

/// A human-readable amount of memory, for logging
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MemorySize {
    /// The number of bytes
    pub bytes: usize
}
impl Display for MemorySize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}", self.bytes)
        } else {
            // Write approximation
            let bytes = self.bytes;
            let (amount, suffix) = if bytes > 1024 * 1024 * 1024 {
                (1024 * 1024 * 1024, "GB")
            } else if bytes > 1024 * 1024 {
                (1024 * 1024, "MB")
            } else if bytes > 1024 {
                (1024, "KB")
            } else {
                (1, "")
            };
            write!(f, "{:.2}{}", bytes as f64 / amount as f64, suffix)
        }
    }
}

#[cfg(test)]
mod test {
    use super::MemorySize;

    #[test]
    fn display() {
        assert_eq!(MemorySize { bytes: 512 }.to_string(), "512.00");
        assert_eq!(MemorySize { bytes: 64 * 1024 }.to_string(), "64.00KB");
        assert_eq!(format!("{:#}", MemorySize { bytes: 65536 }), "65536");
    }
}
