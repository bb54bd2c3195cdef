//! Blocking Bluetooth RFCOMM serial connections.
//!
//! [`SerialConnection`] wraps one RFCOMM stream socket with connect, read
//! (with an optional timeout), write and pending-data queries. Every
//! failure is returned as a [`SerialError`]; failures that break the link
//! close the socket before returning, so a connection is never left
//! half-open.
//!
//! ```no_run
//! use rfcomm_serial::SerialConnection;
//!
//! # fn main() -> rfcomm_serial::Result<()> {
//! let mut conn = SerialConnection::create("00:11:22:33:44:55", 1)?;
//! conn.set_read_timeout(2, 0);
//! conn.connect()?;
//! conn.write(b"AT\r\n")?;
//!
//! let mut buf = [0u8; 64];
//! let n = conn.read(&mut buf)?;
//! println!("{:?}", &buf[..n]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod platform;
pub mod rfcomm;

pub use config::{Config, DeviceProfile, ReadTimeout};
pub use error::{ErrorKind, QueryFailure, Result, SerialError};
#[cfg(any(target_os = "linux", windows))]
pub use platform::NativePlatform;
pub use platform::{Platform, Readiness, Subsystem};
pub use rfcomm::{ConnectionState, SerialConnection};
