/// ----- FRAME MODULE -----
/// Length-prefixed text framing: a 16-bit big-endian length followed by
/// that many payload bytes, no terminator. Both directions loop over
/// partial transfers; end-of-stream surfaces as `UnexpectedEof` so callers
/// can treat a closed peer as a single error kind.

use std::io::{self, Read, Write};

/// The prefix is a u16, so no payload can exceed this.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

pub fn send_message<W: Write>(writer: &mut W, payload: &str) -> io::Result<()> {
    let raw = payload.as_bytes();
    if raw.len() > MAX_PAYLOAD {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes exceeds the u16 length prefix", raw.len()),
        ));
    }
    let prefix = (raw.len() as u16).to_be_bytes();
    writer.write_all(&prefix)?;
    writer.write_all(raw)?;
    writer.flush()
}

pub fn receive_message<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut prefix = [0u8; 2];
    reader.read_exact(&mut prefix)?;
    let len = u16::from_be_bytes(prefix) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    String::from_utf8(payload)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "payload is not valid UTF-8"))
}
