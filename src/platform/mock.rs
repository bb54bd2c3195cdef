//! Scripted in-memory platform for exercising connections without a radio.

use std::{
   collections::VecDeque,
   io,
   sync::Arc,
   time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::{Platform, Readiness, Subsystem};
use crate::error::QueryFailure;

/// Raw error codes understood by [`MockPlatform::query_failure`].
pub mod code {
   pub const NOT_INITIALIZED: i32 = 9001;
   pub const NETWORK_DOWN: i32 = 9002;
   pub const IN_PROGRESS: i32 = 9003;
   pub const INVALID_HANDLE: i32 = 9004;
   pub const INVALID_OUTPUT: i32 = 9005;
   pub const UNMAPPED: i32 = 9099;
}

#[derive(Debug, Default)]
pub struct MockState {
   next_handle: u32,
   pub open: Vec<u32>,
   pub closed: Vec<u32>,
   /// Socket-level calls made, subsystem start/stop excluded.
   pub calls: usize,
   pub init_calls: usize,
   pub release_calls: usize,

   pub fail_init: bool,
   pub fail_create: bool,
   pub fail_connect: bool,
   pub fail_nonblocking: bool,
   pub connected_to: Option<(String, u8)>,
   pub nonblocking: bool,

   pub incoming: VecDeque<u8>,
   pub peer_closed: bool,
   pub poll_error: Option<i32>,
   pub recv_error: Option<i32>,
   pub last_timeout: Option<Option<Duration>>,

   /// Caps how many bytes a single send accepts.
   pub send_limit: Option<usize>,
   pub send_error: Option<i32>,
   pub sent: Vec<u8>,

   pub pending_error: Option<i32>,
}

impl MockState {
   fn readable(&self) -> bool {
      !self.incoming.is_empty() || self.peer_closed
   }

   fn check_open(&self, handle: u32) -> io::Result<()> {
      if self.open.contains(&handle) {
         Ok(())
      } else {
         Err(io::Error::from_raw_os_error(code::INVALID_HANDLE))
      }
   }
}

#[derive(Debug, Default)]
struct Shared {
   state: Mutex<MockState>,
   data_ready: Condvar,
   subsystem: Subsystem,
}

/// Cloneable handle; clones script and observe the same fake link.
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
   shared: Arc<Shared>,
}

impl MockPlatform {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn state(&self) -> MutexGuard<'_, MockState> {
      self.shared.state.lock()
   }

   pub fn subsystem_users(&self) -> usize {
      self.shared.subsystem.users()
   }

   /// Queues bytes as if the remote device had sent them.
   pub fn peer_send(&self, bytes: &[u8]) {
      self.state().incoming.extend(bytes);
      self.shared.data_ready.notify_all();
   }

   pub fn peer_close(&self) {
      self.state().peer_closed = true;
      self.shared.data_ready.notify_all();
   }
}

impl Platform for MockPlatform {
   type Handle = u32;
   type Address = String;

   fn subsystem(&self) -> &Subsystem {
      &self.shared.subsystem
   }

   fn init_subsystem(&self) -> io::Result<()> {
      let mut state = self.state();
      state.init_calls += 1;
      if state.fail_init {
         return Err(io::Error::other("adapter missing"));
      }
      Ok(())
   }

   fn release_subsystem(&self) {
      self.state().release_calls += 1;
   }

   fn create_rfcomm_socket(&self) -> io::Result<u32> {
      let mut state = self.state();
      state.calls += 1;
      if state.fail_create {
         return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "address family not supported",
         ));
      }
      state.next_handle += 1;
      let handle = state.next_handle;
      state.open.push(handle);
      state.nonblocking = false;
      Ok(handle)
   }

   fn parse_address(&self, text: &str) -> io::Result<String> {
      self.state().calls += 1;
      if text.split(':').count() == 6 {
         Ok(text.to_owned())
      } else {
         Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid Bluetooth address: {text}"),
         ))
      }
   }

   fn connect(&self, handle: u32, address: &String, channel: u8) -> io::Result<()> {
      let mut state = self.state();
      state.calls += 1;
      state.check_open(handle)?;
      if state.fail_connect {
         return Err(io::Error::new(io::ErrorKind::HostUnreachable, "host is down"));
      }
      state.connected_to = Some((address.clone(), channel));
      state.peer_closed = false;
      Ok(())
   }

   fn set_nonblocking(&self, handle: u32) -> io::Result<()> {
      let mut state = self.state();
      state.calls += 1;
      state.check_open(handle)?;
      if state.fail_nonblocking {
         return Err(io::Error::other("fcntl failed"));
      }
      state.nonblocking = true;
      Ok(())
   }

   fn poll_readable(&self, handle: u32, timeout: Option<Duration>) -> io::Result<Readiness> {
      let mut state = self.state();
      state.calls += 1;
      state.last_timeout = Some(timeout);
      state.check_open(handle)?;
      if let Some(code) = state.poll_error {
         return Err(io::Error::from_raw_os_error(code));
      }

      match timeout {
         None => {
            while !state.readable() {
               self.shared.data_ready.wait(&mut state);
            }
         },
         Some(timeout) => {
            let deadline = Instant::now() + timeout;
            while !state.readable() {
               if self
                  .shared
                  .data_ready
                  .wait_until(&mut state, deadline)
                  .timed_out()
               {
                  break;
               }
            }
         },
      }

      Ok(if state.readable() {
         Readiness::Ready
      } else {
         Readiness::TimedOut
      })
   }

   fn receive(&self, handle: u32, buf: &mut [u8]) -> io::Result<usize> {
      let mut state = self.state();
      state.calls += 1;
      state.check_open(handle)?;
      if let Some(code) = state.recv_error {
         return Err(io::Error::from_raw_os_error(code));
      }
      if state.incoming.is_empty() {
         return if state.peer_closed {
            Ok(0)
         } else {
            Err(io::ErrorKind::WouldBlock.into())
         };
      }

      let n = buf.len().min(state.incoming.len());
      for (dst, src) in buf.iter_mut().zip(state.incoming.drain(..n)) {
         *dst = src;
      }
      Ok(n)
   }

   fn send(&self, handle: u32, buf: &[u8]) -> io::Result<usize> {
      let mut state = self.state();
      state.calls += 1;
      state.check_open(handle)?;
      if let Some(code) = state.send_error {
         return Err(io::Error::from_raw_os_error(code));
      }
      let n = state.send_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
      state.sent.extend_from_slice(&buf[..n]);
      Ok(n)
   }

   fn pending_bytes(&self, handle: u32) -> io::Result<usize> {
      let mut state = self.state();
      state.calls += 1;
      if let Some(code) = state.pending_error {
         return Err(io::Error::from_raw_os_error(code));
      }
      state.check_open(handle)?;
      Ok(state.incoming.len())
   }

   fn query_failure(&self, err: &io::Error) -> Option<QueryFailure> {
      match err.raw_os_error()? {
         code::NOT_INITIALIZED => Some(QueryFailure::NotInitialized),
         code::NETWORK_DOWN => Some(QueryFailure::NetworkDown),
         code::IN_PROGRESS => Some(QueryFailure::InProgress),
         code::INVALID_HANDLE => Some(QueryFailure::InvalidHandle),
         code::INVALID_OUTPUT => Some(QueryFailure::InvalidOutputBuffer),
         _ => None,
      }
   }

   fn close(&self, handle: u32) {
      let mut state = self.state();
      state.calls += 1;
      state.open.retain(|&h| h != handle);
      state.closed.push(handle);
   }
}
