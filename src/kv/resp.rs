//! RESP2 framing: command encoding and reply parsing.

use crate::error::{StoreFault, StoreResult};
use std::io::{self, BufRead, Read};

/// Largest bulk string we accept (the backend's own limit).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Deepest array nesting we accept.
const MAX_DEPTH: usize = 8;

/// A decoded reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Turn an error reply into a fault, pass anything else through.
    pub fn into_result(self) -> StoreResult<Reply> {
        match self {
            Reply::Error(msg) => Err(StoreFault::Protocol(msg)),
            other => Ok(other),
        }
    }

    pub fn into_bulk(self) -> StoreResult<Option<Vec<u8>>> {
        match self.into_result()? {
            Reply::Bulk(value) => Ok(value),
            other => Err(unexpected("bulk string", &other)),
        }
    }

    pub fn into_integer(self) -> StoreResult<i64> {
        match self.into_result()? {
            Reply::Integer(n) => Ok(n),
            other => Err(unexpected("integer", &other)),
        }
    }

    pub fn into_ok(self) -> StoreResult<()> {
        match self.into_result()? {
            Reply::Status(s) if s == "OK" => Ok(()),
            other => Err(unexpected("+OK", &other)),
        }
    }

    /// An array of bulk strings; a nil array reads as empty.
    pub fn into_bulk_array(self) -> StoreResult<Vec<Option<Vec<u8>>>> {
        match self.into_result()? {
            Reply::Array(None) => Ok(Vec::new()),
            Reply::Array(Some(items)) => items
                .into_iter()
                .map(|item| match item {
                    Reply::Bulk(value) => Ok(value),
                    other => Err(unexpected("bulk string element", &other)),
                })
                .collect(),
            other => Err(unexpected("array", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Reply) -> StoreFault {
    StoreFault::protocol(format!("expected {wanted}, got {got:?}"))
}

/// Encode a command as an array of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Read one complete reply.
///
/// I/O failures (including a connection closed mid-reply) are `Unavailable`;
/// malformed framing is `Protocol`.
pub fn read_reply<R: BufRead>(reader: &mut R) -> StoreResult<Reply> {
    read_reply_at(reader, 0)
}

fn read_reply_at<R: BufRead>(reader: &mut R, depth: usize) -> StoreResult<Reply> {
    if depth > MAX_DEPTH {
        return Err(StoreFault::protocol("reply nested too deeply"));
    }

    let line = read_line(reader)?;
    let (kind, rest) = match line.split_first() {
        Some((kind, rest)) => (*kind, rest),
        None => return Err(StoreFault::protocol("empty reply line")),
    };

    match kind {
        b'+' => Ok(Reply::Status(String::from_utf8_lossy(rest).into_owned())),
        b'-' => Ok(Reply::Error(String::from_utf8_lossy(rest).into_owned())),
        b':' => Ok(Reply::Integer(parse_int(rest)?)),
        b'$' => {
            let len = parse_int(rest)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            if len > MAX_BULK_LEN {
                return Err(StoreFault::protocol(format!("bulk length {len} too large")));
            }
            let mut data = vec![0u8; len as usize + 2];
            reader.read_exact(&mut data)?;
            if !data.ends_with(b"\r\n") {
                return Err(StoreFault::protocol("bulk string not terminated by CRLF"));
            }
            data.truncate(len as usize);
            Ok(Reply::Bulk(Some(data)))
        }
        b'*' => {
            let len = parse_int(rest)?;
            if len < 0 {
                return Ok(Reply::Array(None));
            }
            let mut items = Vec::with_capacity(len.min(1024) as usize);
            for _ in 0..len {
                items.push(read_reply_at(reader, depth + 1)?);
            }
            Ok(Reply::Array(Some(items)))
        }
        other => Err(StoreFault::protocol(format!(
            "unknown reply type byte {:?}",
            other as char
        ))),
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> StoreResult<Vec<u8>> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(StoreFault::Unavailable(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        )));
    }
    if !line.ends_with(b"\r\n") {
        return Err(StoreFault::protocol("reply line not terminated by CRLF"));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_int(bytes: &[u8]) -> StoreResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            StoreFault::protocol(format!(
                "invalid integer {:?}",
                String::from_utf8_lossy(bytes)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(bytes: &[u8]) -> StoreResult<Reply> {
        read_reply(&mut Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn test_encode_command() {
        let encoded = encode_command(&[b"SADD", b"srv-2-psp:app1", b"psp1"]);
        assert_eq!(
            encoded,
            b"*3\r\n$4\r\nSADD\r\n$14\r\nsrv-2-psp:app1\r\n$4\r\npsp1\r\n".to_vec()
        );
    }

    #[test]
    fn test_scalar_replies() {
        assert_eq!(parse(b"+OK\r\n").unwrap(), Reply::Status("OK".into()));
        assert_eq!(parse(b":42\r\n").unwrap(), Reply::Integer(42));
        assert_eq!(parse(b":-3\r\n").unwrap(), Reply::Integer(-3));
        assert_eq!(parse(b"$-1\r\n").unwrap(), Reply::Bulk(None));
        assert_eq!(
            parse(b"$5\r\nhe\r\nl\r\n").unwrap(),
            Reply::Bulk(Some(b"he\r\nl".to_vec()))
        );
        assert_eq!(parse(b"$0\r\n\r\n").unwrap(), Reply::Bulk(Some(Vec::new())));
    }

    #[test]
    fn test_error_reply_becomes_protocol_fault() {
        let reply = parse(b"-WRONGTYPE bad kind\r\n").unwrap();
        assert!(matches!(
            reply.into_integer(),
            Err(StoreFault::Protocol(msg)) if msg == "WRONGTYPE bad kind"
        ));
    }

    #[test]
    fn test_array_replies() {
        let reply = parse(b"*3\r\n$2\r\nd1\r\n$-1\r\n$2\r\nd3\r\n").unwrap();
        assert_eq!(
            reply.into_bulk_array().unwrap(),
            vec![Some(b"d1".to_vec()), None, Some(b"d3".to_vec())]
        );

        assert!(parse(b"*-1\r\n").unwrap().into_bulk_array().unwrap().is_empty());
        assert!(parse(b"*0\r\n").unwrap().into_bulk_array().unwrap().is_empty());
    }

    #[test]
    fn test_truncated_reply_is_unavailable() {
        assert!(matches!(parse(b""), Err(StoreFault::Unavailable(_))));
        assert!(matches!(parse(b"$5\r\nab"), Err(StoreFault::Unavailable(_))));
    }

    #[test]
    fn test_malformed_reply_is_protocol() {
        assert!(matches!(parse(b"?what\r\n"), Err(StoreFault::Protocol(_))));
        assert!(matches!(parse(b":abc\r\n"), Err(StoreFault::Protocol(_))));
        assert!(matches!(parse(b"+OK\n"), Err(StoreFault::Protocol(_))));
        assert!(matches!(
            parse(b":1\r\n").unwrap().into_bulk(),
            Err(StoreFault::Protocol(_))
        ));
    }
}
