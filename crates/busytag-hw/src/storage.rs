//! Files and pictures stored on the device's internal filesystem.

use crate::device::Device;
use crate::protocol::{parse_file_entry, parse_file_header, parse_picture_entry};
use crate::protocol::{decode_line, tag, Command, Reply, ERROR_TOKEN, EVENT_PREFIX};
use crate::transport::Transport;
use crate::{Error, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time the device is allowed per uploaded byte to store and acknowledge it.
const UPLOAD_TIME_PER_BYTE: Duration = Duration::from_micros(100);

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileKind {
    #[default]
    File,
    Directory,
}

impl FromStr for FileKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "file" => Ok(FileKind::File),
            "dir" => Ok(FileKind::Directory),
            other => Err(Error::MalformedResponse(other.to_string())),
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::File => write!(f, "file"),
            FileKind::Directory => write!(f, "dir"),
        }
    }
}

/// A file or directory on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub kind: FileKind,
}

impl FileEntry {
    pub fn new(name: &str, size: u64, kind: FileKind) -> Self {
        Self {
            name: name.to_string(),
            size,
            kind,
        }
    }
}

impl<T: Transport> Device<T> {
    /// Lists pictures that can be shown on the display.
    pub fn list_pictures(&mut self) -> Result<Vec<FileEntry>> {
        self.query_list(Command::ListPictures, tag::PICTURE_LIST)?
            .iter()
            .map(String::as_str)
            .map(parse_picture_entry)
            .collect()
    }

    /// Lists every file and directory stored on the device.
    pub fn list_files(&mut self) -> Result<Vec<FileEntry>> {
        self.query_list(Command::ListFiles, tag::FILE_LIST)?
            .iter()
            .map(String::as_str)
            .map(parse_file_entry)
            .collect()
    }

    /// Downloads a file from the device.
    pub fn read_file(&mut self, filename: &str) -> Result<Vec<u8>> {
        self.send(&Command::GetFile(filename))?;

        let header = self.read_data(tag::GET_FILE)?;
        let (name, size) = parse_file_header(&header)?;
        if name != filename {
            warn!("Requested {} but device sent {}", filename, name);
        }

        // Blank line separates the header from the contents
        let (reply, line) = self.next_reply()?;
        if reply != Reply::Blank {
            return Err(Error::UnexpectedResponse {
                expected: "blank line".to_string(),
                line,
            });
        }

        let data = self.read_bytes(size)?;
        self.read_ok()?;

        debug!("Read {} ({} bytes)", filename, data.len());
        Ok(data)
    }

    /// Uploads a file to the device, replacing any file with the same name.
    pub fn upload_file(&mut self, filename: &str, data: &[u8]) -> Result<()> {
        self.send(&Command::UploadFile {
            name: filename,
            size: data.len(),
        })?;

        // The device answers with a free-form prompt line before accepting data
        let prompt = loop {
            let line = self.read_line(self.timeout)?;
            if line.starts_with(EVENT_PREFIX) {
                debug!("Skipping event: {}", line);
                continue;
            }
            break line;
        };
        if prompt.starts_with(ERROR_TOKEN) {
            return Err(match decode_line(&prompt)? {
                Reply::Error(code) => Error::Device(code),
                _ => Error::MalformedResponse(prompt),
            });
        }
        debug!("Upload prompt: {:?}", prompt);

        self.write_bytes(data)?;
        self.read_ok_within(self.upload_ack_timeout(data.len()))?;

        info!("Uploaded {} ({} bytes)", filename, data.len());
        Ok(())
    }

    /// How long to wait for the acknowledgment of a `len` byte upload.
    fn upload_ack_timeout(&self, len: usize) -> Duration {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        self.timeout + UPLOAD_TIME_PER_BYTE.saturating_mul(len)
    }

    /// Deletes a file from the device.
    pub fn delete_file(&mut self, filename: &str) -> Result<()> {
        self.send(&Command::DeleteFile(filename))?;
        self.read_data(tag::DELETE_FILE)?;
        self.read_ok()?;

        info!("Deleted {}", filename);
        Ok(())
    }
}
