//! Host log records as seen by the aggregator.
//!
//! The aggregator never interprets a record. It only needs the opcode byte
//! and the record's serialized fields, in the host's own format.

use bytes::Bytes;
use std::io::{self, Write};

/// Opcode of the boundary record that forces a batch to finalize.
pub const FLUSH_OPCODE: u8 = 0xFE;

/// A record the aggregator can fold into a batch digest.
pub trait LogRecord: Send + Sync {
    /// One-byte record type.
    fn opcode(&self) -> u8;

    /// Write the record's fields in the host's serialization.
    fn write_fields(&self, out: &mut dyn Write) -> io::Result<()>;

    /// Whether this record closes the current batch.
    fn is_flush(&self) -> bool {
        self.opcode() == FLUSH_OPCODE
    }
}

/// A record with pre-serialized fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub opcode: u8,
    pub fields: Bytes,
}

impl RawRecord {
    pub fn new(opcode: u8, fields: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            fields: fields.into(),
        }
    }

    /// The boundary record.
    pub fn flush() -> Self {
        Self::new(FLUSH_OPCODE, Bytes::new())
    }
}

impl LogRecord for RawRecord {
    fn opcode(&self) -> u8 {
        self.opcode
    }

    fn write_fields(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&self.fields)
    }
}

impl<R: LogRecord + ?Sized> LogRecord for &R {
    fn opcode(&self) -> u8 {
        (**self).opcode()
    }

    fn write_fields(&self, out: &mut dyn Write) -> io::Result<()> {
        (**self).write_fields(out)
    }

    fn is_flush(&self) -> bool {
        (**self).is_flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_record() {
        assert!(RawRecord::flush().is_flush());
        assert!(!RawRecord::new(0x01, &b"mkdir /a"[..]).is_flush());
    }

    #[test]
    fn test_fields_written_verbatim() {
        let record = RawRecord::new(0x02, &b"rename /a /b"[..]);
        let mut out = Vec::new();
        record.write_fields(&mut out).unwrap();
        assert_eq!(out, b"rename /a /b");
    }
}
