//! Reference-counted platform subsystem lifetime.

use std::io;

use log::{debug, warn};
use parking_lot::Mutex;

/// Counts the connections holding the platform networking stack.
///
/// The first `acquire` starts the stack and the last `release` stops it.
/// Both run under the same lock, so concurrent connections created and
/// dropped on different threads never interleave init and cleanup.
#[derive(Debug)]
pub struct Subsystem {
   users: Mutex<usize>,
}

impl Subsystem {
   pub const fn new() -> Self {
      Self {
         users: parking_lot::const_mutex(0),
      }
   }

   /// Takes a reference, running `init` if this is the first one.
   ///
   /// A failed `init` is not counted.
   pub fn acquire(&self, init: impl FnOnce() -> io::Result<()>) -> io::Result<()> {
      let mut users = self.users.lock();
      if *users == 0 {
         init()?;
         debug!("Socket subsystem started");
      }
      *users += 1;
      Ok(())
   }

   /// Drops a reference, running `cleanup` if it was the last one.
   pub fn release(&self, cleanup: impl FnOnce()) {
      let mut users = self.users.lock();
      match *users {
         0 => warn!("Socket subsystem released more often than acquired"),
         1 => {
            *users = 0;
            cleanup();
            debug!("Socket subsystem stopped");
         },
         _ => *users -= 1,
      }
   }

   pub fn users(&self) -> usize {
      *self.users.lock()
   }
}

impl Default for Subsystem {
   fn default() -> Self {
      Self::new()
   }
}
