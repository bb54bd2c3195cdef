//! Error types for RFCOMM serial connections.
//!
//! Every failing operation surfaces exactly one `SerialError`. Failures that
//! break the transport close the connection before the error is returned,
//! see [`crate::rfcomm::SerialConnection`].

use std::io;

use thiserror::Error;

/// Reasons the OS can give for refusing a pending-byte query.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFailure {
   #[error("bluetooth not initialized")]
   NotInitialized,

   #[error("network subsystem failure")]
   NetworkDown,

   #[error("a blocking call is in progress")]
   InProgress,

   #[error("socket isn't valid")]
   InvalidHandle,

   #[error("count variable address invalid")]
   InvalidOutputBuffer,
}

/// Main error type for RFCOMM serial connections.
#[derive(Error, Debug)]
pub enum SerialError {
   #[error("Channel ID should be a positive 8-bit value, got {0}")]
   InvalidChannel(i64),

   #[error("Unable to initialize socket library: {0}")]
   SubsystemInit(#[source] io::Error),

   #[error("Cannot connect: {0}")]
   Connection(String),

   #[error("Connection has been closed")]
   NotConnected,

   #[error("Invalid argument: {0}")]
   InvalidArgument(&'static str),

   #[error("Time limit expired")]
   Timeout,

   #[error("I/O error: {0}")]
   Io(#[from] io::Error),

   #[error("Writing attempt was unsuccessful: {written} of {requested} bytes sent")]
   ShortWrite { written: usize, requested: usize },

   #[error("Pending data query failed: {0}")]
   Query(#[from] QueryFailure),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("Unknown device profile: {0}")]
   UnknownDevice(String),
}

/// Coarse error categories, one per failure class a caller may react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
pub enum ErrorKind {
   Construction,
   Connection,
   NotConnected,
   InvalidArgument,
   Timeout,
   Io,
   Query,
   Config,
}

impl SerialError {
   pub const fn kind(&self) -> ErrorKind {
      match self {
         Self::InvalidChannel(_) | Self::SubsystemInit(_) => ErrorKind::Construction,
         Self::Connection(_) => ErrorKind::Connection,
         Self::NotConnected => ErrorKind::NotConnected,
         Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
         Self::Timeout => ErrorKind::Timeout,
         Self::Io(_) | Self::ShortWrite { .. } => ErrorKind::Io,
         Self::Query(_) => ErrorKind::Query,
         Self::ConfigDirNotFound
         | Self::TomlParse(_)
         | Self::TomlSerialize(_)
         | Self::UnknownDevice(_) => ErrorKind::Config,
      }
   }

   /// Whether the failure left the connection closed.
   pub const fn closes_connection(&self) -> bool {
      matches!(
         self,
         Self::Timeout | Self::Io(_) | Self::ShortWrite { .. } | Self::Query(_)
      )
   }
}

impl From<SerialError> for io::Error {
   fn from(err: SerialError) -> Self {
      let kind = match &err {
         SerialError::Io(e) => e.kind(),
         SerialError::NotConnected => io::ErrorKind::NotConnected,
         SerialError::Timeout => io::ErrorKind::TimedOut,
         SerialError::InvalidArgument(_) | SerialError::InvalidChannel(_) => {
            io::ErrorKind::InvalidInput
         },
         SerialError::ShortWrite { .. } => io::ErrorKind::WriteZero,
         SerialError::Connection(_) => io::ErrorKind::ConnectionRefused,
         _ => io::ErrorKind::Other,
      };
      match err {
         SerialError::Io(e) => e,
         other => Self::new(kind, other),
      }
   }
}

/// Convenience type alias for Results with `SerialError`.
pub type Result<T> = std::result::Result<T, SerialError>;

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_kinds_follow_taxonomy() {
      assert_eq!(SerialError::InvalidChannel(0).kind(), ErrorKind::Construction);
      assert_eq!(SerialError::NotConnected.kind(), ErrorKind::NotConnected);
      assert_eq!(
         SerialError::ShortWrite { written: 1, requested: 4 }.kind(),
         ErrorKind::Io
      );
      assert_eq!(SerialError::Query(QueryFailure::NetworkDown).kind(), ErrorKind::Query);
      assert_eq!(ErrorKind::Timeout.to_string(), "Timeout");
   }

   #[test]
   fn test_io_conversion_keeps_kind() {
      let err: io::Error = SerialError::Timeout.into();
      assert_eq!(err.kind(), io::ErrorKind::TimedOut);

      let err: io::Error = SerialError::NotConnected.into();
      assert_eq!(err.kind(), io::ErrorKind::NotConnected);

      let raw = io::Error::from_raw_os_error(104);
      let err: io::Error = SerialError::Io(raw).into();
      assert_eq!(err.raw_os_error(), Some(104));
   }
}
