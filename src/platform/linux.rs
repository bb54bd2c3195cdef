//! BlueZ RFCOMM sockets through the Linux socket API.

use std::{
   io, mem,
   os::{fd::RawFd, raw::c_int},
   time::Duration,
};

use bluer::{Address, rfcomm::SocketAddr};
use libc::{
   AF_BLUETOOTH, EBADF, EFAULT, EINPROGRESS, ENETDOWN, ENOTSOCK, F_GETFL, F_SETFL, FIONREAD,
   MSG_NOSIGNAL, O_NONBLOCK, POLLIN, POLLNVAL, SOCK_CLOEXEC, SOCK_STREAM,
};
use log::debug;

use super::{Platform, Readiness, Subsystem};
use crate::error::QueryFailure;

const BTPROTO_RFCOMM: c_int = 3;

/// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`.
#[repr(C)]
struct SockaddrRc {
   rc_family: libc::sa_family_t,
   rc_bdaddr: [u8; 6],
   rc_channel: u8,
}

impl From<SocketAddr> for SockaddrRc {
   fn from(addr: SocketAddr) -> Self {
      // bdaddr_t is stored little-endian
      let mut rc_bdaddr = addr.addr.0;
      rc_bdaddr.reverse();
      Self {
         rc_family: AF_BLUETOOTH as _,
         rc_bdaddr,
         rc_channel: addr.channel,
      }
   }
}

static SUBSYSTEM: Subsystem = Subsystem::new();

/// RFCOMM over BlueZ kernel sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxPlatform;

fn cvt(ret: c_int) -> io::Result<c_int> {
   if ret == -1 {
      Err(io::Error::last_os_error())
   } else {
      Ok(ret)
   }
}

fn cvt_len(ret: isize) -> io::Result<usize> {
   usize::try_from(ret).map_err(|_| io::Error::last_os_error())
}

/// `poll` takes milliseconds; round up so short timeouts still wait.
fn poll_timeout(timeout: Option<Duration>) -> c_int {
   match timeout {
      None => -1,
      Some(t) => c_int::try_from(t.as_micros().div_ceil(1000)).unwrap_or(c_int::MAX),
   }
}

impl Platform for LinuxPlatform {
   type Handle = RawFd;
   type Address = Address;

   fn subsystem(&self) -> &Subsystem {
      &SUBSYSTEM
   }

   fn init_subsystem(&self) -> io::Result<()> {
      // Kernel sockets need no library start-up.
      Ok(())
   }

   fn release_subsystem(&self) {}

   fn create_rfcomm_socket(&self) -> io::Result<RawFd> {
      cvt(unsafe { libc::socket(AF_BLUETOOTH, SOCK_STREAM | SOCK_CLOEXEC, BTPROTO_RFCOMM) })
   }

   fn parse_address(&self, text: &str) -> io::Result<Address> {
      text
         .parse::<Address>()
         .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
   }

   fn connect(&self, handle: RawFd, address: &Address, channel: u8) -> io::Result<()> {
      let saddr = SockaddrRc::from(SocketAddr::new(*address, channel));
      cvt(unsafe {
         libc::connect(
            handle,
            (&raw const saddr).cast(),
            mem::size_of::<SockaddrRc>() as libc::socklen_t,
         )
      })?;
      Ok(())
   }

   fn set_nonblocking(&self, handle: RawFd) -> io::Result<()> {
      let flags = cvt(unsafe { libc::fcntl(handle, F_GETFL) })?;
      cvt(unsafe { libc::fcntl(handle, F_SETFL, flags | O_NONBLOCK) })?;
      Ok(())
   }

   fn poll_readable(&self, handle: RawFd, timeout: Option<Duration>) -> io::Result<Readiness> {
      let timeout = poll_timeout(timeout);
      let mut pfd = libc::pollfd {
         fd: handle,
         events: POLLIN,
         revents: 0,
      };
      loop {
         match cvt(unsafe { libc::poll(&raw mut pfd, 1, timeout) }) {
            Ok(0) => return Ok(Readiness::TimedOut),
            Ok(_) if pfd.revents & POLLNVAL != 0 => {
               return Err(io::Error::from_raw_os_error(EBADF));
            },
            Ok(_) => return Ok(Readiness::Ready),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
               debug!("poll interrupted, retrying");
            },
            Err(e) => return Err(e),
         }
      }
   }

   fn receive(&self, handle: RawFd, buf: &mut [u8]) -> io::Result<usize> {
      cvt_len(unsafe { libc::recv(handle, buf.as_mut_ptr().cast(), buf.len(), 0) })
   }

   fn send(&self, handle: RawFd, buf: &[u8]) -> io::Result<usize> {
      cvt_len(unsafe { libc::send(handle, buf.as_ptr().cast(), buf.len(), MSG_NOSIGNAL) })
   }

   fn pending_bytes(&self, handle: RawFd) -> io::Result<usize> {
      let mut count: c_int = 0;
      cvt(unsafe { libc::ioctl(handle, FIONREAD, &raw mut count) })?;
      Ok(usize::try_from(count).unwrap_or(0))
   }

   fn query_failure(&self, err: &io::Error) -> Option<QueryFailure> {
      match err.raw_os_error()? {
         ENETDOWN => Some(QueryFailure::NetworkDown),
         EINPROGRESS => Some(QueryFailure::InProgress),
         EBADF | ENOTSOCK => Some(QueryFailure::InvalidHandle),
         EFAULT => Some(QueryFailure::InvalidOutputBuffer),
         _ => None,
      }
   }

   fn close(&self, handle: RawFd) {
      if let Err(e) = cvt(unsafe { libc::close(handle) }) {
         debug!("close({handle}) failed: {e}");
      }
   }
}
