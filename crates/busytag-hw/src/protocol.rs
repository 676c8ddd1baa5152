//! Busy Tag USB CDC command encoding and response decoding.
//!
//! Protocol structure:
//! - Requests are `AT+<CMD>[=<args>|?]` lines terminated by CRLF
//! - Data replies are `+<TAG>:<payload>` lines
//! - `OK` acknowledges a command, `ERROR:<code>` rejects it
//! - `+evn...` lines are unsolicited events and may arrive at any time

use crate::led::{LedConfig, RgbColor};
use crate::storage::{FileEntry, FileKind};
use crate::{Error, Result};

/// Line delimiter for requests and responses.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Acknowledgment token.
pub const OK_TOKEN: &str = "OK";

/// Prefix of the error token.
pub const ERROR_TOKEN: &str = "ERROR";

/// Prefix of unsolicited event notifications.
pub const EVENT_PREFIX: &str = "+evn";

/// Valid display brightness range.
pub const BRIGHTNESS_RANGE: std::ops::RangeInclusive<u8> = 1..=100;

/// Error codes carried by `ERROR:<code>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unknown,
    InvalidCommand,
    InvalidArgument,
    FileNotFound,
    InvalidSize,
    /// A numeric code this library does not know about.
    Unrecognized(i32),
}

impl ErrorCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ErrorCode::Unknown,
            1 => ErrorCode::InvalidCommand,
            2 => ErrorCode::InvalidArgument,
            3 => ErrorCode::FileNotFound,
            4 => ErrorCode::InvalidSize,
            other => ErrorCode::Unrecognized(other),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Unknown => write!(f, "unknown error"),
            ErrorCode::InvalidCommand => write!(f, "invalid command"),
            ErrorCode::InvalidArgument => write!(f, "invalid argument"),
            ErrorCode::FileNotFound => write!(f, "file not found"),
            ErrorCode::InvalidSize => write!(f, "invalid size"),
            ErrorCode::Unrecognized(code) => write!(f, "unrecognized error code {}", code),
        }
    }
}

/// Reply tags (the text between `+` and `:`).
pub mod tag {
    pub const DEVICE_NAME: &str = "DN";
    pub const DEVICE_ID: &str = "ID";
    pub const FIRMWARE_VERSION: &str = "FV";
    pub const TOTAL_STORAGE: &str = "TSS";
    pub const FREE_STORAGE: &str = "FSS";
    pub const PICTURE_LIST: &str = "PL";
    pub const FILE_LIST: &str = "FL";
    pub const GET_FILE: &str = "GF";
    pub const DELETE_FILE: &str = "DF";
    pub const PICTURE: &str = "SP";
    pub const BRIGHTNESS: &str = "DB";
    pub const SOLID_COLOR: &str = "SC";
}

/// A request understood by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    GetDeviceName,
    GetDeviceId,
    GetFirmwareVersion,
    GetTotalStorage,
    GetFreeStorage,
    ListPictures,
    ListFiles,
    GetFile(&'a str),
    UploadFile { name: &'a str, size: usize },
    DeleteFile(&'a str),
    SetPicture(&'a str),
    GetPicture,
    GetBrightness,
    SetBrightness(u8),
    SetSolidColor(LedConfig),
    GetSolidColor,
}

impl Command<'_> {
    /// Checks arguments that the device would otherwise reject.
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::GetFile(name)
            | Command::DeleteFile(name)
            | Command::SetPicture(name)
            | Command::UploadFile { name, .. } => validate_file_name(name),
            Command::SetBrightness(level) if !BRIGHTNESS_RANGE.contains(level) => {
                Err(Error::InvalidBrightness(*level))
            }
            _ => Ok(()),
        }
    }

    /// Builds the request line, without the terminator.
    pub fn encode(&self) -> String {
        match self {
            Command::GetDeviceName => "AT+GDN".to_string(),
            Command::GetDeviceId => "AT+GID".to_string(),
            Command::GetFirmwareVersion => "AT+GFV".to_string(),
            Command::GetTotalStorage => "AT+GTSS".to_string(),
            Command::GetFreeStorage => "AT+GFSS".to_string(),
            Command::ListPictures => "AT+GPL".to_string(),
            Command::ListFiles => "AT+GFL".to_string(),
            Command::GetFile(name) => format!("AT+GF={}", name),
            Command::UploadFile { name, size } => format!("AT+UF={},{}", name, size),
            Command::DeleteFile(name) => format!("AT+DF={}", name),
            Command::SetPicture(name) => format!("AT+SP={}", name),
            Command::GetPicture => "AT+SP?".to_string(),
            Command::GetBrightness => "AT+DB?".to_string(),
            Command::SetBrightness(level) => format!("AT+DB={}", level),
            Command::SetSolidColor(config) => {
                format!("AT+SC={},{}", config.pin_bits(), config.color().to_hex())
            }
            Command::GetSolidColor => "AT+SC?".to_string(),
        }
    }
}

impl std::fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// File names are sent verbatim, so they cannot contain argument or line separators.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains([',', '\r', '\n']) {
        return Err(Error::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// One decoded response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK`.
    Ok,
    /// `ERROR:<code>`.
    Error(ErrorCode),
    /// `+<tag>:<payload>`.
    Data { tag: String, payload: String },
    /// Unsolicited `+evn...` notification.
    Event(String),
    /// Empty separator line.
    Blank,
}

/// Decodes one response line (terminator already stripped).
pub fn decode_line(line: &str) -> Result<Reply> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line.trim().is_empty() {
        return Ok(Reply::Blank);
    }
    if line == OK_TOKEN {
        return Ok(Reply::Ok);
    }
    if let Some(rest) = line.strip_prefix(ERROR_TOKEN) {
        let code = rest
            .strip_prefix(':')
            .and_then(|code| code.trim().parse::<i32>().ok())
            .ok_or_else(|| Error::MalformedResponse(line.to_string()))?;
        if code < 0 {
            return Err(Error::MalformedResponse(line.to_string()));
        }
        return Ok(Reply::Error(ErrorCode::from_code(code)));
    }
    if line.starts_with(EVENT_PREFIX) {
        return Ok(Reply::Event(line.to_string()));
    }
    if let Some(body) = line.strip_prefix('+') {
        if let Some((tag, payload)) = body.split_once(':') {
            if !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Ok(Reply::Data {
                    tag: tag.to_string(),
                    payload: payload.to_string(),
                });
            }
        }
    }

    Err(Error::MalformedResponse(line.to_string()))
}

/// Returns the payload of a `+<tag>:` line, or a protocol error.
pub fn expect_data(reply: Reply, expected_tag: &str, line: &str) -> Result<String> {
    match reply {
        Reply::Data { tag, payload } if tag == expected_tag => Ok(payload),
        Reply::Error(code) => Err(Error::Device(code)),
        _ => Err(Error::UnexpectedResponse {
            expected: format!("+{}:", expected_tag),
            line: line.to_string(),
        }),
    }
}

/// Checks that a reply is the `OK` acknowledgment.
pub fn expect_ok(reply: Reply, line: &str) -> Result<()> {
    match reply {
        Reply::Ok => Ok(()),
        Reply::Error(code) => Err(Error::Device(code)),
        _ => Err(Error::UnexpectedResponse {
            expected: OK_TOKEN.to_string(),
            line: line.to_string(),
        }),
    }
}

/// Parses an unsigned numeric payload such as `+FSS:123456`.
pub fn parse_number(payload: &str) -> Result<u64> {
    payload
        .trim()
        .parse()
        .map_err(|_| Error::MalformedResponse(payload.to_string()))
}

/// Parses a brightness payload (`+DB:<1..100>`).
pub fn parse_brightness(payload: &str) -> Result<u8> {
    payload
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|level| BRIGHTNESS_RANGE.contains(level))
        .ok_or_else(|| Error::MalformedResponse(payload.to_string()))
}

/// Parses a solid color payload (`+SC:<pin bits>,<RRGGBB>`).
pub fn parse_solid_color(payload: &str) -> Result<LedConfig> {
    let malformed = || Error::MalformedResponse(payload.to_string());
    let (bits, color) = payload.split_once(',').ok_or_else(malformed)?;
    let bits = bits.trim().parse::<u8>().map_err(|_| malformed())?;
    let color = color.parse::<RgbColor>().map_err(|_| malformed())?;
    LedConfig::from_mask(bits, color).map_err(|_| malformed())
}

/// Parses a picture listing entry (`+PL:<name>,<size>`).
pub fn parse_picture_entry(payload: &str) -> Result<FileEntry> {
    let malformed = || Error::MalformedResponse(payload.to_string());
    let (name, size) = payload.rsplit_once(',').ok_or_else(malformed)?;
    let size = size.trim().parse::<u64>().map_err(|_| malformed())?;
    Ok(FileEntry::new(name, size, FileKind::File))
}

/// Parses a file listing entry (`+FL:<name>,<file|dir>,<size>`).
pub fn parse_file_entry(payload: &str) -> Result<FileEntry> {
    let malformed = || Error::MalformedResponse(payload.to_string());
    let mut parts = payload.split(',');
    let (Some(name), Some(kind), Some(size), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    let kind = kind.parse::<FileKind>().map_err(|_| malformed())?;
    let size = size.trim().parse::<u64>().map_err(|_| malformed())?;
    Ok(FileEntry::new(name, size, kind))
}

/// Parses the header that precedes file contents (`+GF:<name>,<size>`).
pub fn parse_file_header(payload: &str) -> Result<(String, usize)> {
    let malformed = || Error::MalformedResponse(payload.to_string());
    let (name, size) = payload.rsplit_once(',').ok_or_else(malformed)?;
    let size = size.trim().parse::<usize>().map_err(|_| malformed())?;
    Ok((name.to_string(), size))
}
