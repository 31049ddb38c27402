//! Minimal protobuf wire-format reader, covering the subset the OSM PBF
//! schema uses: varints, zigzag sint64, length-delimited fields, and
//! packed repeated scalars.

use super::PbfError;

type Result<T> = std::result::Result<T, PbfError>;

/// A decoded field value.
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

impl<'a> Value<'a> {
    pub fn varint(self) -> Result<u64> {
        match self {
            Value::Varint(v) => Ok(v),
            _ => Err(PbfError::Malformed("expected varint field")),
        }
    }

    pub fn bytes(self) -> Result<&'a [u8]> {
        match self {
            Value::Bytes(b) => Ok(b),
            _ => Err(PbfError::Malformed("expected length-delimited field")),
        }
    }
}

/// Cursor over one serialized message.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    /// The next `(field number, value)` pair, or `None` at end of
    /// message.
    pub fn next_field(&mut self) -> Result<Option<(u32, Value<'a>)>> {
        if self.pos == self.buf.len() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let field = (key >> 3) as u32;
        let value = match key & 7 {
            0 => Value::Varint(self.read_varint()?),
            1 => Value::Fixed64(u64::from_le_bytes(self.read_array()?)),
            2 => {
                let len = self.read_varint()? as usize;
                Value::Bytes(self.read_slice(len)?)
            }
            5 => Value::Fixed32(u32::from_le_bytes(self.read_array()?)),
            wire => return Err(PbfError::WireType(wire as u32)),
        };
        Ok(Some((field, value)))
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = *self.buf.get(self.pos).ok_or(PbfError::Truncated)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(PbfError::Malformed("varint longer than 10 bytes"))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(PbfError::Truncated)?;
        if end > self.buf.len() {
            return Err(PbfError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

/// Zigzag-decode a varint into a signed value.
pub fn zigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Decode a packed repeated varint field, appending to `out`. A bare
/// (unpacked) varint occurrence is handled by the caller pushing the
/// single value instead.
pub fn packed_varints(buf: &[u8], out: &mut Vec<u64>) -> Result<()> {
    let mut r = Reader::new(buf);
    while r.pos < r.buf.len() {
        out.push(r.read_varint()?);
    }
    Ok(())
}

/// Decode a packed repeated sint64 field (zigzag), appending to `out`.
pub fn packed_sint64(buf: &[u8], out: &mut Vec<i64>) -> Result<()> {
    let mut r = Reader::new(buf);
    while r.pos < r.buf.len() {
        let v = r.read_varint()?;
        out.push(zigzag(v));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbf::testenc;

    #[test]
    fn zigzag_round_trip() {
        for v in [0i64, -1, 1, -2, 63, -64, i64::MAX, i64::MIN] {
            assert_eq!(zigzag(testenc::zigzag_encode(v)), v);
        }
    }

    #[test]
    fn reads_mixed_fields() {
        let mut buf = Vec::new();
        testenc::put_varint_field(&mut buf, 1, 300);
        testenc::put_bytes_field(&mut buf, 2, b"abc");
        testenc::put_varint_field(&mut buf, 17, 7);

        let mut r = Reader::new(&buf);
        let (f, v) = r.next_field().unwrap().unwrap();
        assert_eq!(f, 1);
        assert_eq!(v.varint().unwrap(), 300);
        let (f, v) = r.next_field().unwrap().unwrap();
        assert_eq!(f, 2);
        assert_eq!(v.bytes().unwrap(), b"abc");
        let (f, v) = r.next_field().unwrap().unwrap();
        assert_eq!(f, 17);
        assert_eq!(v.varint().unwrap(), 7);
        assert!(r.next_field().unwrap().is_none());
    }

    #[test]
    fn truncated_message_is_an_error() {
        let mut buf = Vec::new();
        testenc::put_bytes_field(&mut buf, 1, b"abcdef");
        buf.truncate(buf.len() - 2);
        let mut r = Reader::new(&buf);
        assert!(matches!(r.next_field(), Err(PbfError::Truncated)));
    }

    #[test]
    fn packed_sint64_decodes_deltas() {
        let mut payload = Vec::new();
        for v in [10i64, -5, 3] {
            testenc::put_varint(&mut payload, testenc::zigzag_encode(v));
        }
        let mut out = Vec::new();
        packed_sint64(&payload, &mut out).unwrap();
        assert_eq!(out, vec![10, -5, 3]);
    }
}
