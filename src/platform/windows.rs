//! RFCOMM sockets through Winsock and the Microsoft Bluetooth stack.

use std::{ffi::CString, fmt, io, mem, ptr, time::Duration};

use log::debug;
use windows_sys::Win32::{
   Devices::Bluetooth::{AF_BTH, BTHPROTO_RFCOMM, SOCKADDR_BTH},
   Networking::WinSock::{
      FD_SET, FIONBIO, FIONREAD, INVALID_SOCKET, SOCK_STREAM, SOCKADDR, SOCKET, SOCKET_ERROR,
      TIMEVAL, WSACleanup, WSADATA, WSAEFAULT, WSAEINPROGRESS, WSAENETDOWN, WSAENOTSOCK,
      WSAGetLastError, WSANOTINITIALISED, WSAStartup, WSAStringToAddressA, closesocket, connect,
      ioctlsocket, recv, select, send, socket,
   },
};

use super::{Platform, Readiness, Subsystem};
use crate::error::QueryFailure;

/// Winsock 2.2
const WINSOCK_VERSION: u16 = 0x0202;
/// `WSAStringToAddress` rejects longer Bluetooth address strings.
const MAX_ADDRESS_LEN: usize = 40;

static SUBSYSTEM: Subsystem = Subsystem::new();

/// Parsed `SOCKADDR_BTH`; the port is filled in at connect time.
#[derive(Clone, Copy)]
pub struct BthAddress(SOCKADDR_BTH);

impl fmt::Debug for BthAddress {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let bt_addr = self.0.btAddr;
      write!(f, "BthAddress({bt_addr:012X})")
   }
}

/// RFCOMM over Winsock.
#[derive(Debug, Default, Clone, Copy)]
pub struct WinsockPlatform;

fn last_error() -> io::Error {
   io::Error::from_raw_os_error(unsafe { WSAGetLastError() })
}

fn cvt(ret: i32) -> io::Result<i32> {
   if ret == SOCKET_ERROR {
      Err(last_error())
   } else {
      Ok(ret)
   }
}

fn to_timeval(timeout: Duration) -> TIMEVAL {
   TIMEVAL {
      tv_sec: i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX),
      tv_usec: timeout.subsec_micros() as i32,
   }
}

fn clamp_len(len: usize) -> i32 {
   i32::try_from(len).unwrap_or(i32::MAX)
}

impl Platform for WinsockPlatform {
   type Handle = SOCKET;
   type Address = BthAddress;

   fn subsystem(&self) -> &Subsystem {
      &SUBSYSTEM
   }

   fn init_subsystem(&self) -> io::Result<()> {
      let mut data: WSADATA = unsafe { mem::zeroed() };
      match unsafe { WSAStartup(WINSOCK_VERSION, &raw mut data) } {
         0 => Ok(()),
         code => Err(io::Error::from_raw_os_error(code)),
      }
   }

   fn release_subsystem(&self) {
      if unsafe { WSACleanup() } == SOCKET_ERROR {
         debug!("WSACleanup failed: {}", last_error());
      }
   }

   fn create_rfcomm_socket(&self) -> io::Result<SOCKET> {
      let handle = unsafe { socket(AF_BTH as _, SOCK_STREAM as _, BTHPROTO_RFCOMM as _) };
      if handle == INVALID_SOCKET {
         Err(last_error())
      } else {
         Ok(handle)
      }
   }

   fn parse_address(&self, text: &str) -> io::Result<BthAddress> {
      if text.len() >= MAX_ADDRESS_LEN {
         return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Address length is invalid",
         ));
      }
      let text = CString::new(text).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

      let mut addr: SOCKADDR_BTH = unsafe { mem::zeroed() };
      let mut size = mem::size_of::<SOCKADDR_BTH>() as i32;
      cvt(unsafe {
         WSAStringToAddressA(
            text.as_ptr().cast(),
            AF_BTH as _,
            ptr::null(),
            (&raw mut addr).cast::<SOCKADDR>(),
            &raw mut size,
         )
      })?;
      Ok(BthAddress(addr))
   }

   fn connect(&self, handle: SOCKET, address: &BthAddress, channel: u8) -> io::Result<()> {
      let mut addr = address.0;
      addr.port = u32::from(channel);
      cvt(unsafe {
         connect(
            handle,
            (&raw const addr).cast::<SOCKADDR>(),
            mem::size_of::<SOCKADDR_BTH>() as i32,
         )
      })?;
      Ok(())
   }

   fn set_nonblocking(&self, handle: SOCKET) -> io::Result<()> {
      let mut enable: u32 = 1;
      cvt(unsafe { ioctlsocket(handle, FIONBIO, &raw mut enable) })?;
      Ok(())
   }

   fn poll_readable(&self, handle: SOCKET, timeout: Option<Duration>) -> io::Result<Readiness> {
      let mut set: FD_SET = unsafe { mem::zeroed() };
      set.fd_count = 1;
      set.fd_array[0] = handle;

      let timeval = timeout.map(to_timeval);
      let timeval_ptr = timeval.as_ref().map_or(ptr::null(), ptr::from_ref);

      match cvt(unsafe {
         select(0, &raw mut set, ptr::null_mut(), ptr::null_mut(), timeval_ptr)
      })? {
         0 => Ok(Readiness::TimedOut),
         _ => Ok(Readiness::Ready),
      }
   }

   fn receive(&self, handle: SOCKET, buf: &mut [u8]) -> io::Result<usize> {
      let n = cvt(unsafe { recv(handle, buf.as_mut_ptr(), clamp_len(buf.len()), 0) })?;
      Ok(n as usize)
   }

   fn send(&self, handle: SOCKET, buf: &[u8]) -> io::Result<usize> {
      let n = cvt(unsafe { send(handle, buf.as_ptr(), clamp_len(buf.len()), 0) })?;
      Ok(n as usize)
   }

   fn pending_bytes(&self, handle: SOCKET) -> io::Result<usize> {
      let mut count: u32 = 0;
      cvt(unsafe { ioctlsocket(handle, FIONREAD, &raw mut count) })?;
      Ok(count as usize)
   }

   fn query_failure(&self, err: &io::Error) -> Option<QueryFailure> {
      match err.raw_os_error()? {
         WSANOTINITIALISED => Some(QueryFailure::NotInitialized),
         WSAENETDOWN => Some(QueryFailure::NetworkDown),
         WSAEINPROGRESS => Some(QueryFailure::InProgress),
         WSAENOTSOCK => Some(QueryFailure::InvalidHandle),
         WSAEFAULT => Some(QueryFailure::InvalidOutputBuffer),
         _ => None,
      }
   }

   fn close(&self, handle: SOCKET) {
      if unsafe { closesocket(handle) } == SOCKET_ERROR {
         debug!("closesocket failed: {}", last_error());
      }
   }
}
