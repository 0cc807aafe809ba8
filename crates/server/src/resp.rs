//! RESP-2 wire values: serializer and incremental parser.
//!
//! Clients send commands as arrays of bulk strings; replies use the full
//! value palette. The parser works on a growing byte buffer and reports
//! `Incomplete` until an entire frame has arrived, so the connection loop
//! can keep reading without re-framing anything itself.

/// Largest bulk string we accept on the wire (64 MiB).
const MAX_BULK_BYTES: i64 = 64 * 1024 * 1024;
/// Largest command array we accept.
const MAX_ARRAY_ITEMS: i64 = 1024;

/// A RESP-2 protocol value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$5\r\nhello\r\n`
    Bulk(Vec<u8>),
    /// `$-1\r\n`
    NullBulk,
    /// `*2\r\n...`
    Array(Vec<Value>),
    /// `*-1\r\n`
    NullArray,
}

impl Value {
    /// Encodes the value into its wire form.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Value::Simple(s) => format!("+{}\r\n", s).into_bytes(),
            Value::Error(s) => format!("-{}\r\n", s).into_bytes(),
            Value::Integer(i) => format!(":{}\r\n", i).into_bytes(),
            Value::Bulk(b) => {
                let mut out = format!("${}\r\n", b.len()).into_bytes();
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
                out
            }
            Value::NullBulk => b"$-1\r\n".to_vec(),
            Value::Array(items) => {
                let mut out = format!("*{}\r\n", items.len()).into_bytes();
                for item in items {
                    out.extend(item.serialize());
                }
                out
            }
            Value::NullArray => b"*-1\r\n".to_vec(),
        }
    }
}

/// Outcome of attempting to parse one frame from the front of `buf`.
#[derive(Debug, PartialEq, Eq)]
pub enum Parse {
    /// A full frame and the number of bytes it consumed.
    Complete(Value, usize),
    /// The buffer ends mid-frame; read more bytes and retry.
    Incomplete,
    /// The bytes cannot be RESP; the connection should be dropped.
    Invalid,
}

/// Parses one frame from the front of `buf`.
pub fn parse(buf: &[u8]) -> Parse {
    match parse_value(buf, 0) {
        Ok(Some((value, end))) => Parse::Complete(value, end),
        Ok(None) => Parse::Incomplete,
        Err(()) => Parse::Invalid,
    }
}

/// `Ok(None)` = incomplete, `Err(())` = malformed.
type Step<T> = Result<Option<T>, ()>;

fn parse_value(buf: &[u8], pos: usize) -> Step<(Value, usize)> {
    let Some(&tag) = buf.get(pos) else {
        return Ok(None);
    };
    match tag {
        b'+' => {
            let Some((line, end)) = parse_line(buf, pos + 1) else {
                return Ok(None);
            };
            let s = std::str::from_utf8(line).map_err(|_| ())?;
            Ok(Some((Value::Simple(s.to_string()), end)))
        }
        b'-' => {
            let Some((line, end)) = parse_line(buf, pos + 1) else {
                return Ok(None);
            };
            let s = std::str::from_utf8(line).map_err(|_| ())?;
            Ok(Some((Value::Error(s.to_string()), end)))
        }
        b':' => {
            let Some((line, end)) = parse_line(buf, pos + 1) else {
                return Ok(None);
            };
            Ok(Some((Value::Integer(parse_int(line)?), end)))
        }
        b'$' => {
            let Some((line, body_start)) = parse_line(buf, pos + 1) else {
                return Ok(None);
            };
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(Some((Value::NullBulk, body_start)));
            }
            if len < 0 || len > MAX_BULK_BYTES {
                return Err(());
            }
            let len = len as usize;
            let frame_end = body_start + len + 2;
            if buf.len() < frame_end {
                return Ok(None);
            }
            if &buf[body_start + len..frame_end] != b"\r\n" {
                return Err(());
            }
            Ok(Some((
                Value::Bulk(buf[body_start..body_start + len].to_vec()),
                frame_end,
            )))
        }
        b'*' => {
            let Some((line, mut cursor)) = parse_line(buf, pos + 1) else {
                return Ok(None);
            };
            let count = parse_int(line)?;
            if count == -1 {
                return Ok(Some((Value::NullArray, cursor)));
            }
            if count < 0 || count > MAX_ARRAY_ITEMS {
                return Err(());
            }
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let Some((item, next)) = parse_value(buf, cursor)? else {
                    return Ok(None);
                };
                items.push(item);
                cursor = next;
            }
            Ok(Some((Value::Array(items), cursor)))
        }
        _ => Err(()),
    }
}

/// Finds the next CRLF, returning the line body and the position after it.
/// `None` means the terminator has not arrived yet.
fn parse_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let mut i = pos;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some((&buf[pos..i], i + 2));
        }
        i += 1;
    }
    None
}

fn parse_int(line: &[u8]) -> Result<i64, ()> {
    std::str::from_utf8(line)
        .map_err(|_| ())?
        .parse::<i64>()
        .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_each_reply_shape() {
        assert_eq!(Value::Simple("OK".into()).serialize(), b"+OK\r\n");
        assert_eq!(Value::Error("ERR boom".into()).serialize(), b"-ERR boom\r\n");
        assert_eq!(Value::Integer(1).serialize(), b":1\r\n");
        assert_eq!(
            Value::Bulk(b"hello".to_vec()).serialize(),
            b"$5\r\nhello\r\n"
        );
        assert_eq!(Value::NullBulk.serialize(), b"$-1\r\n");
        assert_eq!(Value::NullArray.serialize(), b"*-1\r\n");
    }

    #[test]
    fn parse_set_command() {
        let frame = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        match parse(frame) {
            Parse::Complete(Value::Array(items), consumed) => {
                assert_eq!(consumed, frame.len());
                assert_eq!(items.len(), 3);
                assert_eq!(items[0], Value::Bulk(b"SET".to_vec()));
                assert_eq!(items[2], Value::Bulk(b"bar".to_vec()));
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn roundtrip_array() {
        let value = Value::Array(vec![
            Value::Bulk(b"GET".to_vec()),
            Value::Bulk(b"some key".to_vec()),
        ]);
        let bytes = value.serialize();
        match parse(&bytes) {
            Parse::Complete(parsed, consumed) => {
                assert_eq!(parsed, value);
                assert_eq!(consumed, bytes.len());
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn partial_frames_are_incomplete() {
        let frame = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        for cut in [1, 4, 10, frame.len() - 1] {
            assert_eq!(
                parse(&frame[..cut]),
                Parse::Incomplete,
                "cut at {} should be incomplete",
                cut
            );
        }
    }

    #[test]
    fn pipelined_frames_parse_one_at_a_time() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"*1\r\n$4\r\nPING\r\n");
        buf.extend_from_slice(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");

        let Parse::Complete(first, consumed) = parse(&buf) else {
            panic!("first frame should parse");
        };
        assert_eq!(first, Value::Array(vec![Value::Bulk(b"PING".to_vec())]));

        let Parse::Complete(second, rest) = parse(&buf[consumed..]) else {
            panic!("second frame should parse");
        };
        assert_eq!(consumed + rest, buf.len());
        assert_eq!(
            second,
            Value::Array(vec![
                Value::Bulk(b"GET".to_vec()),
                Value::Bulk(b"k".to_vec())
            ])
        );
    }

    #[test]
    fn null_bulk_parses() {
        assert_eq!(
            parse(b"$-1\r\n"),
            Parse::Complete(Value::NullBulk, 5)
        );
    }

    #[test]
    fn binary_payload_survives() {
        let value = Value::Bulk(vec![0, 1, 2, 255, 13, 10, 7]);
        let bytes = value.serialize();
        assert_eq!(parse(&bytes), Parse::Complete(value, bytes.len()));
    }

    #[test]
    fn garbage_tag_is_invalid() {
        assert_eq!(parse(b"hello\r\n"), Parse::Invalid);
    }

    #[test]
    fn negative_bulk_length_is_invalid() {
        assert_eq!(parse(b"$-5\r\nxx\r\n"), Parse::Invalid);
    }
}
