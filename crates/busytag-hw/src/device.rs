//! Busy Tag device facade: one method per hardware capability.

use crate::config::DeviceConfig;
use crate::led::LedConfig;
use crate::protocol::{decode_line, expect_data, expect_ok, parse_brightness, parse_number};
use crate::protocol::{parse_solid_color, tag, Command, Reply};
use crate::transport::{SerialTransport, Transport};
use crate::{Error, Result};
use std::time::Duration;
use tracing::{debug, info};

/// Identity reported by the device when the connection is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub device_id: String,
    pub firmware_version: String,
    /// Total storage in bytes.
    pub capacity: u64,
}

/// A connected Busy Tag.
///
/// Every method performs one request/response exchange. The serial port is
/// released when the device is dropped or [`Device::close`] is called.
///
/// After an exchange times out, input still pending from the device is
/// discarded before the next command is written.
pub struct Device<T: Transport = SerialTransport> {
    transport: T,
    port_path: String,
    pub(crate) timeout: Duration,
    info: DeviceInfo,
    resync: bool,
}

impl Device {
    /// Opens the Busy Tag at `path` with default settings.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_config(&DeviceConfig::for_device(path))
    }

    /// Opens the Busy Tag named by a configuration.
    pub fn open_with_config(config: &DeviceConfig) -> Result<Self> {
        let path = config
            .device
            .as_deref()
            .ok_or_else(|| Error::Config("no device path configured".to_string()))?;
        let transport = SerialTransport::open(path, config.baud_rate)?;
        Self::with_transport(transport, path, config.timeout())
    }
}

impl<T: Transport> Device<T> {
    /// Wraps an open transport and reads the device identity.
    pub fn with_transport(transport: T, port_path: &str, timeout: Duration) -> Result<Self> {
        let mut device = Self {
            transport,
            port_path: port_path.to_string(),
            timeout,
            info: DeviceInfo {
                name: String::new(),
                device_id: String::new(),
                firmware_version: String::new(),
                capacity: 0,
            },
            resync: false,
        };

        let name = device.query(Command::GetDeviceName, tag::DEVICE_NAME)?;
        let device_id = device.query(Command::GetDeviceId, tag::DEVICE_ID)?;
        let firmware_version = device.query(Command::GetFirmwareVersion, tag::FIRMWARE_VERSION)?;
        let capacity = parse_number(&device.query(Command::GetTotalStorage, tag::TOTAL_STORAGE)?)?;
        device.info = DeviceInfo {
            name,
            device_id,
            firmware_version,
            capacity,
        };

        info!(
            "Connected to {} (id: {}, firmware: {}) on {}",
            device.info.name, device.info.device_id, device.info.firmware_version, device.port_path
        );
        Ok(device)
    }

    /// Validates and sends a command.
    pub(crate) fn send(&mut self, command: &Command<'_>) -> Result<()> {
        command.validate()?;
        if self.resync {
            self.transport.discard_input()?;
            self.resync = false;
        }
        self.transport.write_line(&command.encode())
    }

    /// Flags the link for a resync if `result` is a timeout.
    fn track<R>(&mut self, result: Result<R>) -> Result<R> {
        if matches!(result, Err(Error::Timeout(_))) {
            self.resync = true;
        }
        result
    }

    /// Reads one raw line, waiting at most `timeout`.
    pub(crate) fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let result = self.transport.read_line(timeout);
        self.track(result)
    }

    /// Reads exactly `len` raw bytes.
    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let result = self.transport.read_exact(len, self.timeout);
        self.track(result)
    }

    /// Writes raw bytes.
    pub(crate) fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.transport.write_all(data)
    }

    /// Reads the next reply, skipping unsolicited event lines.
    pub(crate) fn next_reply(&mut self) -> Result<(Reply, String)> {
        self.next_reply_within(self.timeout)
    }

    /// Reads the next reply, waiting at most `timeout` for each line.
    pub(crate) fn next_reply_within(&mut self, timeout: Duration) -> Result<(Reply, String)> {
        loop {
            let line = self.read_line(timeout)?;
            match decode_line(&line)? {
                Reply::Event(event) => debug!("Skipping event: {}", event),
                reply => return Ok((reply, line)),
            }
        }
    }

    /// Reads replies until `OK`, tolerating blank separator lines.
    pub(crate) fn read_ok(&mut self) -> Result<()> {
        self.read_ok_within(self.timeout)
    }

    pub(crate) fn read_ok_within(&mut self, timeout: Duration) -> Result<()> {
        loop {
            let (reply, line) = self.next_reply_within(timeout)?;
            if reply != Reply::Blank {
                return expect_ok(reply, &line);
            }
        }
    }

    /// Reads one `+<tag>:` reply and returns its payload.
    pub(crate) fn read_data(&mut self, tag: &str) -> Result<String> {
        let (reply, line) = self.next_reply()?;
        expect_data(reply, tag, &line)
    }

    /// Sends a command answered by a single data line.
    fn query(&mut self, command: Command<'_>, tag: &str) -> Result<String> {
        self.send(&command)?;
        self.read_data(tag)
    }

    /// Sends a command answered by a bare `OK`.
    pub(crate) fn execute(&mut self, command: Command<'_>) -> Result<()> {
        self.send(&command)?;
        self.read_ok()
    }

    /// Sends a listing command and collects `+<tag>:` lines until `OK`.
    pub(crate) fn query_list(&mut self, command: Command<'_>, tag: &str) -> Result<Vec<String>> {
        self.send(&command)?;
        let mut payloads = Vec::new();
        loop {
            let (reply, line) = self.next_reply()?;
            match reply {
                Reply::Ok => return Ok(payloads),
                Reply::Blank => {}
                reply => payloads.push(expect_data(reply, tag, &line)?),
            }
        }
    }

    /// Shows a picture already stored on the device.
    pub fn set_active_picture(&mut self, filename: &str) -> Result<()> {
        self.execute(Command::SetPicture(filename))?;
        debug!("Active picture set to {}", filename);
        Ok(())
    }

    /// Returns the name of the picture currently shown.
    pub fn get_active_picture(&mut self) -> Result<String> {
        self.query(Command::GetPicture, tag::PICTURE)
    }

    /// Lights the selected LEDs with a solid color.
    pub fn set_led_solid_color(&mut self, config: &LedConfig) -> Result<()> {
        self.execute(Command::SetSolidColor(*config))?;
        debug!(
            "LEDs {:#04x} set to {}",
            config.pin_bits(),
            config.color()
        );
        Ok(())
    }

    /// Returns the current solid color configuration.
    pub fn get_led_solid_color(&mut self) -> Result<LedConfig> {
        let payload = self.query(Command::GetSolidColor, tag::SOLID_COLOR)?;
        parse_solid_color(&payload)
    }

    /// Returns the display brightness (1-100).
    pub fn get_display_brightness(&mut self) -> Result<u8> {
        let payload = self.query(Command::GetBrightness, tag::BRIGHTNESS)?;
        parse_brightness(&payload)
    }

    /// Sets the display brightness (1-100).
    pub fn set_display_brightness(&mut self, brightness: u8) -> Result<()> {
        self.execute(Command::SetBrightness(brightness))
    }

    /// Returns the free space on the device filesystem in bytes.
    pub fn get_free_storage(&mut self) -> Result<u64> {
        let payload = self.query(Command::GetFreeStorage, tag::FREE_STORAGE)?;
        parse_number(&payload)
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn device_id(&self) -> &str {
        &self.info.device_id
    }

    pub fn firmware_version(&self) -> &str {
        &self.info.firmware_version
    }

    /// Total storage in bytes.
    pub fn capacity(&self) -> u64 {
        self.info.capacity
    }

    /// Returns the port path.
    pub fn port_path(&self) -> &str {
        &self.port_path
    }

    /// Returns the response timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes the response timeout for subsequent commands.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Closes the connection, releasing the serial port.
    pub fn close(self) {
        info!("Closing Busy Tag on {}", self.port_path);
    }

    /// Gives up the device facade and returns the open transport.
    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T: Transport> std::fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("port_path", &self.port_path)
            .field("info", &self.info)
            .finish()
    }
}
