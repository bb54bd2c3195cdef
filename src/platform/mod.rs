//! Platform socket layer.
//!
//! [`Platform`] is the set of OS primitives a [`SerialConnection`] needs.
//! One implementation exists per supported target and is exported as
//! [`NativePlatform`]; tests and unsupported targets can plug in their own.
//!
//! [`SerialConnection`]: crate::rfcomm::SerialConnection

use std::{fmt, io, time::Duration};

use crate::error::QueryFailure;

mod subsystem;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(windows)]
mod windows;

pub use subsystem::Subsystem;

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform as NativePlatform;
#[cfg(windows)]
pub use windows::WinsockPlatform as NativePlatform;

/// Outcome of waiting for a handle to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
   /// Data, a hang-up or an error is pending; the next receive will report it.
   Ready,
   TimedOut,
}

/// OS primitives backing an RFCOMM stream socket.
///
/// Handles are plain values; ownership is tracked by the caller, which must
/// pass each handle returned by [`Platform::create_rfcomm_socket`] to
/// [`Platform::close`] exactly once.
pub trait Platform {
   type Handle: Copy + Eq + fmt::Debug;
   type Address: fmt::Debug;

   /// Process-wide reference count guarding `init_subsystem`/`release_subsystem`.
   fn subsystem(&self) -> &Subsystem;

   /// Starts the platform networking stack. Called on the first acquire only.
   fn init_subsystem(&self) -> io::Result<()>;

   /// Stops the platform networking stack. Called on the last release only.
   fn release_subsystem(&self);

   fn create_rfcomm_socket(&self) -> io::Result<Self::Handle>;

   /// Parses a textual device address into the platform socket address.
   fn parse_address(&self, text: &str) -> io::Result<Self::Address>;

   /// Blocking connect to `address` on RFCOMM `channel`.
   fn connect(&self, handle: Self::Handle, address: &Self::Address, channel: u8) -> io::Result<()>;

   fn set_nonblocking(&self, handle: Self::Handle) -> io::Result<()>;

   /// Waits until `handle` is readable. `None` waits forever.
   fn poll_readable(
      &self,
      handle: Self::Handle,
      timeout: Option<Duration>,
   ) -> io::Result<Readiness>;

   /// Receives at most `buf.len()` bytes. `Ok(0)` means the peer closed.
   fn receive(&self, handle: Self::Handle, buf: &mut [u8]) -> io::Result<usize>;

   /// Sends once, returning how many bytes the OS accepted.
   fn send(&self, handle: Self::Handle, buf: &[u8]) -> io::Result<usize>;

   /// Number of received bytes buffered by the OS, without consuming them.
   fn pending_bytes(&self, handle: Self::Handle) -> io::Result<usize>;

   /// Maps a `pending_bytes` error onto a named failure, if it has one.
   fn query_failure(&self, err: &io::Error) -> Option<QueryFailure>;

   fn close(&self, handle: Self::Handle);
}
