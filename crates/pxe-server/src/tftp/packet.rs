//! TFTP wire format (RFC 1350, option extension RFC 2347).

use crate::error::TftpError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Payload size of every DATA packet but the last.
pub const BLOCK_SIZE: usize = 512;

/// Large enough for any request or control packet a client sends us.
pub const RECV_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
    Oack = 6,
}

impl TryFrom<u16> for Opcode {
    type Error = TftpError;

    fn try_from(value: u16) -> Result<Self, TftpError> {
        match value {
            1 => Ok(Opcode::Rrq),
            2 => Ok(Opcode::Wrq),
            3 => Ok(Opcode::Data),
            4 => Ok(Opcode::Ack),
            5 => Ok(Opcode::Error),
            6 => Ok(Opcode::Oack),
            _ => Err(TftpError::InvalidPacket(format!("unknown opcode {value}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileAlreadyExists = 6,
    NoSuchUser = 7,
    /// RFC 2347
    OptionNegotiationFailed = 8,
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        match value {
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileAlreadyExists,
            7 => ErrorCode::NoSuchUser,
            8 => ErrorCode::OptionNegotiationFailed,
            _ => ErrorCode::NotDefined,
        }
    }
}

/// Transfer mode named in a request. Boot files are always sent verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Octet,
    NetAscii,
}

impl TransferMode {
    fn parse(mode: &str) -> Result<Self, TftpError> {
        if mode.eq_ignore_ascii_case("octet") {
            Ok(TransferMode::Octet)
        } else if mode.eq_ignore_ascii_case("netascii") {
            Ok(TransferMode::NetAscii)
        } else {
            Err(TftpError::InvalidPacket(format!("unsupported mode {mode:?}")))
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            TransferMode::Octet => "octet",
            TransferMode::NetAscii => "netascii",
        }
    }
}

/// Body of an RRQ or WRQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub filename: String,
    pub mode: TransferMode,
    /// Options in the order received, names lowercased
    pub options: Vec<(String, String)>,
}

impl Request {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The client asked for the transfer size to be declared up front.
    pub fn wants_tsize(&self) -> bool {
        self.option("tsize").is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Read(Request),
    Write(Request),
    Data { block: u16, payload: Bytes },
    Ack { block: u16 },
    Error { code: ErrorCode, message: String },
    Oack { options: Vec<(String, String)> },
}

impl Packet {
    pub fn parse(data: &[u8]) -> Result<Self, TftpError> {
        if data.len() < 2 {
            return Err(TftpError::InvalidPacket("packet too short".to_string()));
        }
        let mut buf = data;
        let opcode = Opcode::try_from(buf.get_u16())?;

        match opcode {
            Opcode::Rrq => parse_request(buf).map(Packet::Read),
            Opcode::Wrq => parse_request(buf).map(Packet::Write),
            Opcode::Data => {
                let block = read_block(&mut buf)?;
                Ok(Packet::Data {
                    block,
                    payload: Bytes::copy_from_slice(buf),
                })
            }
            Opcode::Ack => Ok(Packet::Ack {
                block: read_block(&mut buf)?,
            }),
            Opcode::Error => {
                let code = ErrorCode::from(read_block(&mut buf)?);
                let message = buf
                    .split(|&b| b == 0)
                    .next()
                    .map(|m| String::from_utf8_lossy(m).into_owned())
                    .unwrap_or_default();
                Ok(Packet::Error { code, message })
            }
            Opcode::Oack => Ok(Packet::Oack {
                options: parse_options(buf)?,
            }),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Packet::Read(request) => encode_request(&mut buf, Opcode::Rrq, request),
            Packet::Write(request) => encode_request(&mut buf, Opcode::Wrq, request),
            Packet::Data { block, payload } => {
                buf.reserve(4 + payload.len());
                buf.put_u16(Opcode::Data as u16);
                buf.put_u16(*block);
                buf.put_slice(payload);
            }
            Packet::Ack { block } => {
                buf.put_u16(Opcode::Ack as u16);
                buf.put_u16(*block);
            }
            Packet::Error { code, message } => {
                buf.put_u16(Opcode::Error as u16);
                buf.put_u16(*code as u16);
                put_cstr(&mut buf, message);
            }
            Packet::Oack { options } => {
                buf.put_u16(Opcode::Oack as u16);
                encode_options(&mut buf, options);
            }
        }
        buf.freeze()
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Packet::Error {
            code,
            message: message.into(),
        }
    }
}

fn read_block(buf: &mut &[u8]) -> Result<u16, TftpError> {
    if buf.remaining() < 2 {
        return Err(TftpError::InvalidPacket("missing block number".to_string()));
    }
    Ok(buf.get_u16())
}

fn parse_request(body: &[u8]) -> Result<Request, TftpError> {
    // every field, options included, is NUL terminated
    let Some(body) = body.strip_suffix(b"\0") else {
        return Err(TftpError::InvalidPacket("unterminated request".to_string()));
    };
    let mut fields = body.split(|&b| b == 0);

    let filename = fields
        .next()
        .filter(|f| !f.is_empty())
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .ok_or_else(|| TftpError::InvalidPacket("missing filename".to_string()))?;
    let mode = fields
        .next()
        .map(|m| String::from_utf8_lossy(m).into_owned())
        .ok_or_else(|| TftpError::InvalidPacket("missing mode".to_string()))?;
    let mode = TransferMode::parse(&mode)?;

    let mut options = Vec::new();
    while let Some(key) = fields.next() {
        // some PXE ROMs pad the request with extra NULs
        if key.is_empty() {
            break;
        }
        let value = fields
            .next()
            .ok_or_else(|| TftpError::InvalidPacket("option without value".to_string()))?;
        options.push((
            String::from_utf8_lossy(key).to_ascii_lowercase(),
            String::from_utf8_lossy(value).into_owned(),
        ));
    }

    Ok(Request {
        filename,
        mode,
        options,
    })
}

fn parse_options(body: &[u8]) -> Result<Vec<(String, String)>, TftpError> {
    let Some(body) = body.strip_suffix(b"\0") else {
        return Ok(Vec::new());
    };
    let fields: Vec<&[u8]> = body.split(|&b| b == 0).collect();
    if fields.len() % 2 != 0 {
        return Err(TftpError::InvalidPacket("option without value".to_string()));
    }
    Ok(fields
        .chunks_exact(2)
        .map(|pair| {
            (
                String::from_utf8_lossy(pair[0]).to_ascii_lowercase(),
                String::from_utf8_lossy(pair[1]).into_owned(),
            )
        })
        .collect())
}

fn encode_request(buf: &mut BytesMut, opcode: Opcode, request: &Request) {
    buf.put_u16(opcode as u16);
    put_cstr(buf, &request.filename);
    put_cstr(buf, request.mode.as_str());
    encode_options(buf, &request.options);
}

fn encode_options(buf: &mut BytesMut, options: &[(String, String)]) {
    for (key, value) in options {
        put_cstr(buf, key);
        put_cstr(buf, value);
    }
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}
