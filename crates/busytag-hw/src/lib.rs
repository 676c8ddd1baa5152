//! Busy Tag Hardware Library
//!
//! Client for the Busy Tag status display over its USB CDC (virtual serial)
//! interface: LED strip colors, the active picture, display brightness and
//! the on-device picture storage.
//!
//! ```no_run
//! use busytag_hw::{Device, LedConfig, LedPin};
//!
//! # fn main() -> busytag_hw::Result<()> {
//! let mut device = Device::open("/dev/ttyACM0")?;
//! device.set_led_solid_color(&LedConfig::new(LedPin::All, "FF4D00".parse()?))?;
//! device.set_active_picture("coffee.gif")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod led;
pub mod protocol;
pub mod storage;
pub mod transport;

pub use config::DeviceConfig;
pub use device::{Device, DeviceInfo};
pub use error::{Error, Result};
pub use led::{LedConfig, LedPin, RgbColor};
pub use protocol::ErrorCode;
pub use storage::{FileEntry, FileKind};
pub use transport::{SerialTransport, Transport};
