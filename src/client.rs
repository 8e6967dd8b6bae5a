use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::net::{
    MAX_MESSAGE_BYTES, OP_GET, OP_GET_PREFIX, OP_SET, OP_STAT, STATUS_BAD_FRAME, STATUS_INTERNAL,
    STATUS_INVALID_ARGUMENT, STATUS_OK, STREAM_END, STREAM_PAIR,
};
use crate::runtime::metrics::StatsSnapshot;
use crate::types::Value;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server rejected the request as invalid")]
    InvalidArgument,
    #[error("server reported an internal error")]
    Internal,
    #[error("server could not parse the request frame")]
    BadFrame,
    #[error("unexpected server response code {code}")]
    UnexpectedStatus { code: u8 },
    #[error("malformed server response: {reason}")]
    MalformedResponse { reason: &'static str },
    #[error("value of {actual} bytes exceeds the {max}-byte message cap")]
    ValueTooLarge { actual: usize, max: usize },
    #[error("key of {actual} bytes does not fit the wire format")]
    KeyTooLarge { actual: usize },
}

/// Blocking client for the key-value protocol. One request is in flight
/// per connection at a time; the CLI and the benchmark workers each hold
/// their own client.
pub struct RemoteStoreClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl RemoteStoreClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        Self::connect_inner(addr, None)
    }

    /// Connects with a per-operation read/write timeout.
    pub fn connect_with_timeout<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        Self::connect_inner(addr, Some(timeout))
    }

    fn connect_inner<A: ToSocketAddrs>(
        addr: A,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true).ok();
        if let Some(timeout) = timeout {
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
        }
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader,
            writer: BufWriter::new(stream),
        })
    }

    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<(), ClientError> {
        if key.len() > usize::from(u16::MAX) {
            return Err(ClientError::KeyTooLarge { actual: key.len() });
        }
        if value.len() > MAX_MESSAGE_BYTES {
            return Err(ClientError::ValueTooLarge {
                actual: value.len(),
                max: MAX_MESSAGE_BYTES,
            });
        }

        self.writer.write_all(&[OP_SET])?;
        self.write_short_field(key.as_bytes())?;
        self.writer.write_all(&(value.len() as u32).to_be_bytes())?;
        self.writer.write_all(value)?;
        self.writer.flush()?;

        self.expect_ok()
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Value>, ClientError> {
        if key.len() > usize::from(u16::MAX) {
            return Err(ClientError::KeyTooLarge { actual: key.len() });
        }

        self.writer.write_all(&[OP_GET])?;
        self.write_short_field(key.as_bytes())?;
        self.writer.flush()?;

        self.expect_ok()?;
        let found = self.read_u8()?;
        match found {
            0 => Ok(None),
            1 => {
                let value = self.read_long_field()?;
                Ok(Some(Value::from(value)))
            }
            _ => Err(ClientError::MalformedResponse {
                reason: "found flag is neither 0 nor 1",
            }),
        }
    }

    /// Streams every pair whose key starts with `prefix` into `visit`.
    /// Returns how many pairs the server sent.
    pub fn get_prefix(
        &mut self,
        prefix: &str,
        mut visit: impl FnMut(String, Value),
    ) -> Result<u64, ClientError> {
        if prefix.len() > usize::from(u16::MAX) {
            return Err(ClientError::KeyTooLarge {
                actual: prefix.len(),
            });
        }

        self.writer.write_all(&[OP_GET_PREFIX])?;
        self.write_short_field(prefix.as_bytes())?;
        self.writer.flush()?;

        self.expect_ok()?;
        let mut count = 0u64;
        loop {
            match self.read_u8()? {
                STREAM_END => return Ok(count),
                STREAM_PAIR => {
                    let key_bytes = self.read_short_field()?;
                    let key = String::from_utf8(key_bytes).map_err(|_| {
                        ClientError::MalformedResponse {
                            reason: "streamed key is not UTF-8",
                        }
                    })?;
                    let value = Value::from(self.read_long_field()?);
                    visit(key, value);
                    count += 1;
                }
                _ => {
                    return Err(ClientError::MalformedResponse {
                        reason: "unknown stream tag",
                    })
                }
            }
        }
    }

    pub fn stat(&mut self) -> Result<StatsSnapshot, ClientError> {
        self.writer.write_all(&[OP_STAT])?;
        self.writer.flush()?;

        self.expect_ok()?;
        Ok(StatsSnapshot {
            total_keys: self.read_u64()?,
            total_size_bytes: self.read_u64()?,
            set_ops: self.read_u64()?,
            get_ops: self.read_u64()?,
            prefix_ops: self.read_u64()?,
        })
    }

    fn write_short_field(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.writer.write_all(&(bytes.len() as u16).to_be_bytes())?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    fn expect_ok(&mut self) -> Result<(), ClientError> {
        match self.read_u8()? {
            STATUS_OK => Ok(()),
            STATUS_INVALID_ARGUMENT => Err(ClientError::InvalidArgument),
            STATUS_INTERNAL => Err(ClientError::Internal),
            STATUS_BAD_FRAME => Err(ClientError::BadFrame),
            code => Err(ClientError::UnexpectedStatus { code }),
        }
    }

    fn read_u8(&mut self) -> Result<u8, ClientError> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u64(&mut self) -> Result<u64, ClientError> {
        let mut buf = [0u8; 8];
        self.reader.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_short_field(&mut self) -> Result<Vec<u8>, ClientError> {
        let mut len_buf = [0u8; 2];
        self.reader.read_exact(&mut len_buf)?;
        let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_long_field(&mut self) -> Result<Vec<u8>, ClientError> {
        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_BYTES {
            return Err(ClientError::MalformedResponse {
                reason: "field exceeds the message cap",
            });
        }
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}
