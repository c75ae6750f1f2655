//! RESP (Redis Serialization Protocol) encoder and decoder
//!
//! Commands are always sent as RESP2 arrays of bulk strings. The decoder
//! understands both RESP2 replies and the RESP3 types a server may send
//! after `HELLO 3`.

use std::io::{self, BufRead};

use super::error::ProtocolError;

/// RESP value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string (+OK\r\n)
    SimpleString(String),
    /// Error (-ERR message\r\n) or RESP3 blob error (!<len>\r\n...)
    Error(String),
    /// Integer (:1000\r\n)
    Integer(i64),
    /// Bulk string ($6\r\nfoobar\r\n); RESP3 verbatim strings land here too
    BulkString(Vec<u8>),
    /// Null bulk string ($-1\r\n), null array (*-1\r\n) or RESP3 null (_\r\n)
    Null,
    /// Array (*2\r\n...)
    Array(Vec<RespValue>),
    /// RESP3 boolean (#t\r\n)
    Boolean(bool),
    /// RESP3 double (,3.14\r\n)
    Double(f64),
    /// RESP3 big number ((3492890328409238509324850943850943825024385\r\n)
    BigNumber(String),
    /// RESP3 map (%2\r\n...)
    Map(Vec<(RespValue, RespValue)>),
    /// RESP3 set (~2\r\n...)
    Set(Vec<RespValue>),
    /// RESP3 out-of-band push (>2\r\n...)
    Push(Vec<RespValue>),
}

impl RespValue {
    /// Get as string (for simple string or bulk string)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Get as bytes (for bulk string)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Get as array; RESP3 sets are accepted wherever an array is expected
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) | RespValue::Set(arr) => Some(arr),
            _ => None,
        }
    }

    /// Short description used in "unexpected response" errors
    pub fn describe(&self) -> String {
        match self {
            RespValue::SimpleString(s) => format!("simple string '{}'", s),
            RespValue::Error(e) => format!("error '{}'", e),
            RespValue::Integer(n) => format!("integer {}", n),
            RespValue::BulkString(b) => format!("bulk string ({} bytes)", b.len()),
            RespValue::Null => "null".to_string(),
            RespValue::Array(a) => format!("array of {}", a.len()),
            RespValue::Boolean(b) => format!("boolean {}", b),
            RespValue::Double(d) => format!("double {}", d),
            RespValue::BigNumber(n) => format!("big number {}", n),
            RespValue::Map(m) => format!("map of {}", m.len()),
            RespValue::Set(s) => format!("set of {}", s.len()),
            RespValue::Push(p) => format!("push of {}", p.len()),
        }
    }
}

/// RESP encoder with pre-allocated buffer
pub struct RespEncoder {
    buf: Vec<u8>,
}

impl RespEncoder {
    /// Create new encoder with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Clear buffer for reuse
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Get encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Encode a command as RESP array
    /// Each argument is encoded as a bulk string
    pub fn encode_command(&mut self, args: &[&[u8]]) {
        self.buf.push(b'*');
        self.write_int(args.len() as i64);
        self.buf.extend_from_slice(b"\r\n");

        for arg in args {
            self.buf.push(b'$');
            self.write_int(arg.len() as i64);
            self.buf.extend_from_slice(b"\r\n");
            self.buf.extend_from_slice(arg);
            self.buf.extend_from_slice(b"\r\n");
        }
    }

    /// Encode a command from string slices
    pub fn encode_command_str(&mut self, args: &[&str]) {
        let byte_args: Vec<&[u8]> = args.iter().map(|s| s.as_bytes()).collect();
        self.encode_command(&byte_args);
    }

    #[inline]
    fn write_int(&mut self, value: i64) {
        let mut buffer = itoa::Buffer::new();
        self.buf.extend_from_slice(buffer.format(value).as_bytes());
    }
}

/// RESP decoder for streaming reads
pub struct RespDecoder<R> {
    reader: R,
    line_buf: String,
}

impl<R: BufRead> RespDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::with_capacity(256),
        }
    }

    /// Decode the next reply, skipping RESP3 attributes and push messages
    pub fn decode(&mut self) -> io::Result<RespValue> {
        loop {
            match self.decode_value()? {
                RespValue::Push(_) => continue,
                value => return Ok(value),
            }
        }
    }

    fn decode_value(&mut self) -> io::Result<RespValue> {
        self.line_buf.clear();
        self.reader.read_line(&mut self.line_buf)?;

        if self.line_buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Connection closed",
            ));
        }

        let line = self.line_buf.trim_end_matches(&['\r', '\n'][..]);
        if line.is_empty() {
            return Err(ProtocolError::EmptyLine.into());
        }

        let type_byte = line.as_bytes()[0];
        let content = line.get(1..).unwrap_or_default().to_string();

        match type_byte {
            b'+' => Ok(RespValue::SimpleString(content)),
            b'-' => Ok(RespValue::Error(content)),
            b':' => {
                let value: i64 = content
                    .parse()
                    .map_err(|_| ProtocolError::InvalidInteger(content.clone()))?;
                Ok(RespValue::Integer(value))
            }
            b'$' => match self.read_blob(&content)? {
                Some(data) => Ok(RespValue::BulkString(data)),
                None => Ok(RespValue::Null),
            },
            b'!' => {
                let data = self.read_blob(&content)?.unwrap_or_default();
                Ok(RespValue::Error(String::from_utf8_lossy(&data).into_owned()))
            }
            b'=' => {
                // Verbatim string: "txt:" / "mkd:" format prefix before payload
                let data = self.read_blob(&content)?.unwrap_or_default();
                let payload = if data.len() >= 4 && data[3] == b':' {
                    data[4..].to_vec()
                } else {
                    data
                };
                Ok(RespValue::BulkString(payload))
            }
            b'*' => Ok(self
                .read_elements(&content)?
                .map(RespValue::Array)
                .unwrap_or(RespValue::Null)),
            b'~' => Ok(self
                .read_elements(&content)?
                .map(RespValue::Set)
                .unwrap_or(RespValue::Null)),
            b'>' => Ok(self
                .read_elements(&content)?
                .map(RespValue::Push)
                .unwrap_or(RespValue::Null)),
            b'%' => {
                let count = parse_length(&content)?;
                let mut entries = Vec::with_capacity(count.max(0) as usize);
                for _ in 0..count {
                    let key = self.decode_value()?;
                    let value = self.decode_value()?;
                    entries.push((key, value));
                }
                Ok(RespValue::Map(entries))
            }
            b'|' => {
                // Attribute map precedes the real reply; read and discard it
                let count = parse_length(&content)?;
                for _ in 0..count.max(0) * 2 {
                    self.decode_value()?;
                }
                self.decode_value()
            }
            b'_' => Ok(RespValue::Null),
            b'#' => match content.as_str() {
                "t" => Ok(RespValue::Boolean(true)),
                "f" => Ok(RespValue::Boolean(false)),
                _ => Err(ProtocolError::InvalidType('#').into()),
            },
            b',' => {
                let value = match content.as_str() {
                    "inf" => f64::INFINITY,
                    "-inf" => f64::NEG_INFINITY,
                    "nan" => f64::NAN,
                    other => other
                        .parse()
                        .map_err(|_| ProtocolError::InvalidDouble(content.clone()))?,
                };
                Ok(RespValue::Double(value))
            }
            b'(' => Ok(RespValue::BigNumber(content)),
            other => Err(ProtocolError::InvalidType(other as char).into()),
        }
    }

    /// Read a length-prefixed payload; `None` for a negative (null) length
    fn read_blob(&mut self, header: &str) -> io::Result<Option<Vec<u8>>> {
        let len = parse_length(header)?;
        if len < 0 {
            return Ok(None);
        }

        let mut data = vec![0u8; len as usize];
        self.reader.read_exact(&mut data)?;

        let mut crlf = [0u8; 2];
        self.reader.read_exact(&mut crlf)?;

        Ok(Some(data))
    }

    fn read_elements(&mut self, header: &str) -> io::Result<Option<Vec<RespValue>>> {
        let count = parse_length(header)?;
        if count < 0 {
            return Ok(None);
        }

        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            elements.push(self.decode_value()?);
        }
        Ok(Some(elements))
    }
}

fn parse_length(s: &str) -> Result<i64, ProtocolError> {
    s.parse()
        .map_err(|_| ProtocolError::InvalidLength(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(data: &[u8]) -> RespValue {
        RespDecoder::new(Cursor::new(data)).decode().unwrap()
    }

    #[test]
    fn test_encode_simple_command() {
        let mut encoder = RespEncoder::with_capacity(64);
        encoder.encode_command_str(&["PING"]);
        assert_eq!(encoder.as_bytes(), b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn test_encode_scan_command() {
        let mut encoder = RespEncoder::with_capacity(64);
        encoder.encode_command_str(&["SCAN", "0", "MATCH", "user:*"]);
        assert_eq!(
            encoder.as_bytes(),
            b"*4\r\n$4\r\nSCAN\r\n$1\r\n0\r\n$5\r\nMATCH\r\n$6\r\nuser:*\r\n"
        );
    }

    #[test]
    fn test_decode_simple_string() {
        assert_eq!(decode(b"+OK\r\n"), RespValue::SimpleString("OK".to_string()));
    }

    #[test]
    fn test_decode_error() {
        assert_eq!(
            decode(b"-ERR unknown command\r\n"),
            RespValue::Error("ERR unknown command".to_string())
        );
    }

    #[test]
    fn test_decode_bulk_string_and_null() {
        assert_eq!(decode(b"$6\r\nfoobar\r\n"), RespValue::BulkString(b"foobar".to_vec()));
        assert_eq!(decode(b"$-1\r\n"), RespValue::Null);
        assert_eq!(decode(b"*-1\r\n"), RespValue::Null);
    }

    #[test]
    fn test_decode_scan_reply() {
        let value = decode(b"*2\r\n$2\r\n17\r\n*2\r\n$6\r\nuser:1\r\n$6\r\nuser:2\r\n");
        let parts = value.as_array().unwrap();
        assert_eq!(parts[0].as_str(), Some("17"));
        assert_eq!(parts[1].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_decode_resp3_scalars() {
        assert_eq!(decode(b"_\r\n"), RespValue::Null);
        assert_eq!(decode(b"#t\r\n"), RespValue::Boolean(true));
        assert_eq!(decode(b"#f\r\n"), RespValue::Boolean(false));
        assert_eq!(decode(b",1.5\r\n"), RespValue::Double(1.5));
        assert_eq!(decode(b",-inf\r\n"), RespValue::Double(f64::NEG_INFINITY));
        assert_eq!(
            decode(b"(12345678901234567890\r\n"),
            RespValue::BigNumber("12345678901234567890".to_string())
        );
        assert_eq!(
            decode(b"!21\r\nSYNTAX invalid syntax\r\n"),
            RespValue::Error("SYNTAX invalid syntax".to_string())
        );
    }

    #[test]
    fn test_decode_verbatim_strips_format() {
        assert_eq!(
            decode(b"=15\r\ntxt:Some string\r\n"),
            RespValue::BulkString(b"Some string".to_vec())
        );
    }

    #[test]
    fn test_decode_map_and_set() {
        let value = decode(b"%2\r\n+server\r\n$5\r\nredis\r\n+proto\r\n:3\r\n");
        assert_eq!(
            value,
            RespValue::Map(vec![
                (
                    RespValue::SimpleString("server".to_string()),
                    RespValue::BulkString(b"redis".to_vec())
                ),
                (
                    RespValue::SimpleString("proto".to_string()),
                    RespValue::Integer(3)
                ),
            ])
        );

        let value = decode(b"~2\r\n+a\r\n+b\r\n");
        assert_eq!(value.as_array().map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_decode_skips_push_and_attributes() {
        let value = decode(b">2\r\n+invalidate\r\n*0\r\n|1\r\n+ttl\r\n:10\r\n+OK\r\n");
        assert_eq!(value, RespValue::SimpleString("OK".to_string()));
    }

    #[test]
    fn test_decode_invalid_type() {
        let err = RespDecoder::new(Cursor::new(&b"?what\r\n"[..]))
            .decode()
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_decode_eof() {
        let err = RespDecoder::new(Cursor::new(&b""[..])).decode().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
