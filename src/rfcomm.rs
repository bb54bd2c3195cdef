//! Blocking RFCOMM serial connection.
//!
//! A [`SerialConnection`] owns at most one RFCOMM socket. It is created
//! unconnected, opened with [`SerialConnection::connect`] and closed either
//! explicitly or as a side effect of any failure that breaks the transport.
//! Callers must re-check [`SerialConnection::is_connected`] after an error
//! or a zero-length read before reusing the connection.

use std::{fmt, io, mem, time::Duration};

use log::{debug, info, warn};

#[cfg(any(target_os = "linux", windows))]
use crate::platform::NativePlatform;
use crate::{
   config::{Config, DeviceProfile},
   error::{QueryFailure, Result, SerialError},
   platform::{Platform, Readiness},
};

/// Lifecycle state of a [`SerialConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
pub enum ConnectionState {
   Unconnected,
   Connected,
}

/// One RFCOMM endpoint on a remote device.
///
/// Single-owner, single-thread: operations take `&mut self` and block the
/// calling thread for at most the read timeout.
pub struct SerialConnection<P: Platform> {
   address: String,
   channel: u8,
   platform: P,
   handle: Option<P::Handle>,
   read_timeout: Option<Duration>,
   initialized: bool,
}

#[cfg(any(target_os = "linux", windows))]
impl SerialConnection<NativePlatform> {
   /// Creates an unconnected connection using the OS Bluetooth stack.
   pub fn create(address: impl Into<String>, channel: i64) -> Result<Self> {
      Self::with_platform(NativePlatform::default(), address, channel)
   }
}

impl<P: Platform> SerialConnection<P> {
   /// Creates an unconnected connection on top of `platform`.
   ///
   /// Fails if `channel` is not in `1..=255` or the platform subsystem cannot
   /// be started.
   pub fn with_platform(platform: P, address: impl Into<String>, channel: i64) -> Result<Self> {
      let channel = u8::try_from(channel)
         .ok()
         .filter(|&c| c > 0)
         .ok_or(SerialError::InvalidChannel(channel))?;

      platform
         .subsystem()
         .acquire(|| platform.init_subsystem())
         .map_err(SerialError::SubsystemInit)?;

      Ok(Self {
         address: address.into(),
         channel,
         platform,
         handle: None,
         read_timeout: None,
         initialized: true,
      })
   }

   /// Creates a connection for a configured device, applying its read
   /// timeout or the configuration default.
   pub fn from_profile(platform: P, profile: &DeviceProfile, config: &Config) -> Result<Self> {
      let mut conn = Self::with_platform(platform, profile.address.as_str(), profile.channel)?;
      if let Some(timeout) = profile.read_timeout.or(config.default_read_timeout) {
         conn.set_read_timeout(timeout.seconds, timeout.microseconds);
      }
      Ok(conn)
   }

   pub fn address(&self) -> &str {
      &self.address
   }

   pub const fn channel(&self) -> u8 {
      self.channel
   }

   pub const fn read_timeout(&self) -> Option<Duration> {
      self.read_timeout
   }

   pub const fn is_connected(&self) -> bool {
      self.handle.is_some()
   }

   pub const fn state(&self) -> ConnectionState {
      if self.is_connected() {
         ConnectionState::Connected
      } else {
         ConnectionState::Unconnected
      }
   }

   /// Opens a fresh socket to the remote device, closing any previous one.
   ///
   /// The socket is switched to non-blocking mode once connected; reads wait
   /// for readiness instead.
   pub fn connect(&mut self) -> Result<()> {
      self.close();

      if !self.initialized {
         return Err(SerialError::Connection(
            "socket subsystem is not initialized".to_owned(),
         ));
      }

      debug!("Creating RFCOMM socket for {}", self.address);
      let handle = self
         .platform
         .create_rfcomm_socket()
         .map_err(|e| SerialError::Connection(e.to_string()))?;

      if let Err(e) = self.open(handle) {
         self.platform.close(handle);
         warn!("Connecting to {}:{} failed: {e}", self.address, self.channel);
         return Err(SerialError::Connection(e.to_string()));
      }

      self.handle = Some(handle);
      info!("Connected to {}:{}", self.address, self.channel);
      Ok(())
   }

   fn open(&self, handle: P::Handle) -> io::Result<()> {
      let address = self.platform.parse_address(&self.address)?;
      debug!("Connecting to {address:?} on channel {}", self.channel);
      self.platform.connect(handle, &address, self.channel)?;
      self.platform.set_nonblocking(handle)
   }

   /// Closes the socket. Closing an unconnected connection does nothing.
   pub fn close(&mut self) {
      if let Some(handle) = self.handle.take() {
         self.platform.close(handle);
         info!("Closed connection to {}:{}", self.address, self.channel);
      }
   }

   /// Closes the connection and hands back `err` for the caller to return.
   fn abort(&mut self, err: SerialError) -> SerialError {
      warn!("{}:{}: {err}, closing connection", self.address, self.channel);
      self.close();
      err
   }

   /// Reads whatever is available, up to `buf.len()` bytes.
   ///
   /// Waits for data for at most the read timeout. `Ok(0)` for a non-empty
   /// buffer means the peer closed the connection, which is now closed too.
   /// A timeout closes the connection and fails with [`SerialError::Timeout`].
   pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
      if buf.is_empty() {
         return Ok(0);
      }
      let handle = self.handle.ok_or(SerialError::NotConnected)?;

      match self.platform.poll_readable(handle, self.read_timeout) {
         Ok(Readiness::Ready) => {},
         Ok(Readiness::TimedOut) => return Err(self.abort(SerialError::Timeout)),
         Err(e) => return Err(self.abort(SerialError::Io(e))),
      }

      match self.platform.receive(handle, buf) {
         Ok(0) => {
            info!("{}:{}: peer closed the connection", self.address, self.channel);
            self.close();
            Ok(0)
         },
         Ok(n) => {
            debug!("← {}: {}", self.address, hex::encode(&buf[..n]));
            Ok(n)
         },
         Err(e) => Err(self.abort(SerialError::Io(e))),
      }
   }

   /// [`read`](Self::read) into the first `length` bytes of `buf`.
   pub fn read_len(&mut self, buf: &mut [u8], length: usize) -> Result<usize> {
      if length == 0 {
         return Ok(0);
      }
      if !self.is_connected() {
         return Err(SerialError::NotConnected);
      }
      let buf = buf
         .get_mut(..length)
         .ok_or(SerialError::InvalidArgument("buffer is shorter than length"))?;
      self.read(buf)
   }

   /// Sends `buf` in a single call.
   ///
   /// Anything short of the full buffer closes the connection and fails with
   /// [`SerialError::ShortWrite`]; there are no retries.
   pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
      if buf.is_empty() {
         return Ok(0);
      }
      let handle = self.handle.ok_or(SerialError::NotConnected)?;

      match self.platform.send(handle, buf) {
         Ok(n) if n == buf.len() => {
            debug!("→ {}: {}", self.address, hex::encode(buf));
            Ok(n)
         },
         Ok(n) => Err(self.abort(SerialError::ShortWrite {
            written: n,
            requested: buf.len(),
         })),
         Err(e) => Err(self.abort(SerialError::Io(e))),
      }
   }

   /// [`write`](Self::write) of the first `length` bytes of `buf`.
   pub fn write_len(&mut self, buf: &[u8], length: usize) -> Result<usize> {
      if length == 0 {
         return Ok(0);
      }
      let buf = buf
         .get(..length)
         .ok_or(SerialError::InvalidArgument("buffer is shorter than length"))?;
      self.write(buf)
   }

   /// Whether received bytes are waiting to be read. Never blocks.
   pub fn is_data_available(&mut self) -> Result<bool> {
      let handle = self.handle.ok_or(SerialError::NotConnected)?;

      match self.platform.pending_bytes(handle) {
         Ok(count) => Ok(count > 0),
         Err(e) => {
            let err = match self.platform.query_failure(&e) {
               Some(failure) => SerialError::Query(failure),
               None => SerialError::Io(e),
            };
            let err = self.abort(err);
            if matches!(err, SerialError::Query(QueryFailure::NotInitialized)) {
               self.release_subsystem();
            }
            Err(err)
         },
      }
   }

   /// Sets the read timeout for subsequent reads.
   ///
   /// A negative component clears it, so reads block until data arrives.
   pub fn set_read_timeout(&mut self, seconds: i64, microseconds: i64) {
      self.read_timeout = match (u64::try_from(seconds), u64::try_from(microseconds)) {
         (Ok(secs), Ok(micros)) => {
            Some(Duration::from_secs(secs).saturating_add(Duration::from_micros(micros)))
         },
         _ => None,
      };
   }

   fn release_subsystem(&mut self) {
      if mem::take(&mut self.initialized) {
         let platform = &self.platform;
         platform.subsystem().release(|| platform.release_subsystem());
      }
   }
}

impl<P: Platform> Drop for SerialConnection<P> {
   fn drop(&mut self) {
      self.close();
      self.release_subsystem();
   }
}

impl<P: Platform> fmt::Debug for SerialConnection<P> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("SerialConnection")
         .field("address", &self.address)
         .field("channel", &self.channel)
         .field("handle", &self.handle)
         .field("read_timeout", &self.read_timeout)
         .finish_non_exhaustive()
   }
}

impl<P: Platform> io::Read for SerialConnection<P> {
   fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
      Ok(SerialConnection::read(self, buf)?)
   }
}

impl<P: Platform> io::Write for SerialConnection<P> {
   fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      Ok(SerialConnection::write(self, buf)?)
   }

   fn flush(&mut self) -> io::Result<()> {
      Ok(())
   }
}
