//! Device profiles and connection defaults.
//!
//! Profiles are stored as TOML, by default in
//! `<config dir>/rfcomm-serial/config.toml`.

use std::{
   fs,
   path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SerialError};

/// Read timeout as given to
/// [`SerialConnection::set_read_timeout`](crate::rfcomm::SerialConnection::set_read_timeout).
///
/// A negative component means "block until data arrives".
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTimeout {
   pub seconds: i64,
   #[serde(default)]
   pub microseconds: i64,
}

/// A named remote endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
   pub name: String,
   pub address: String,
   pub channel: i64,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub read_timeout: Option<ReadTimeout>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
   /// Applied to profiles without their own timeout.
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub default_read_timeout: Option<ReadTimeout>,

   #[serde(default)]
   pub devices: Vec<DeviceProfile>,
}

impl Config {
   /// Loads the configuration from the default location.
   ///
   /// A missing file yields the defaults; nothing is written.
   pub fn load() -> Result<Self> {
      let config_path = Self::config_path()?;
      if config_path.exists() {
         Self::load_from(&config_path)
      } else {
         Ok(Self::default())
      }
   }

   pub fn load_from(path: &Path) -> Result<Self> {
      let contents = fs::read_to_string(path)?;
      Ok(toml::from_str(&contents)?)
   }

   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   pub fn config_path() -> Result<PathBuf> {
      let config_dir = dirs::config_dir().ok_or(SerialError::ConfigDirNotFound)?;
      Ok(config_dir.join("rfcomm-serial").join("config.toml"))
   }

   /// Looks up a device profile by name.
   pub fn device(&self, name: &str) -> Result<&DeviceProfile> {
      self
         .devices
         .iter()
         .find(|d| d.name == name)
         .ok_or_else(|| SerialError::UnknownDevice(name.to_owned()))
   }
}
