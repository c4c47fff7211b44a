//! Settings for a pflib session
//!
//! Which bus backend to use and how to reach it, which
//! ROCs are connected and parameter overrides which are
//! applied to all of them. Settings are read from and
//! written to toml files.

use std::fs::File;
use std::io::{
  Read,
  Write,
};
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Duration;

extern crate toml;

use pf_dataclasses::decoding::DEFAULT_HEADER_THRESHOLD;

use crate::compile::PageSettings;
use crate::ipbus::{
  BridgeRegisters,
  IPBus,
  IPBusWishbone,
};
use crate::simulated::SimulatedWishbone;
use crate::wishbone::{
  BusError,
  WishboneInterface,
};

#[derive(Debug)]
pub enum SettingsError {
  FileNotFound,
  ReadFailed,
  WriteFailed,
  TomlDecodingError,
  TomlEncodingError,
}

impl fmt::Display for SettingsError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : &str = match self {
      SettingsError::FileNotFound      => "FileNotFound",
      SettingsError::ReadFailed        => "ReadFailed",
      SettingsError::WriteFailed       => "WriteFailed",
      SettingsError::TomlDecodingError => "TomlDecodingError",
      SettingsError::TomlEncodingError => "TomlEncodingError",
    };
    write!(f, "<SettingsError: {}>", etype)
  }
}

impl Error for SettingsError {
}

/// Read a whole (toml) file into a string
pub fn read_toml_file(filename : &Path) -> Result<String, SettingsError> {
  match File::open(filename) {
    Err(err) => {
      error!("Unable to open {}! {}", filename.display(), err);
      Err(SettingsError::FileNotFound)
    }
    Ok(mut file) => {
      let mut toml_string = String::from("");
      match file.read_to_string(&mut toml_string) {
        Err(err) => {
          error!("Unable to read {}! {}", filename.display(), err);
          Err(SettingsError::ReadFailed)
        }
        Ok(_) => Ok(toml_string)
      }
    }
  }
}

/// How the register bus is reached
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum BusBackend {
  IPBus,
  Uio,
  /// in memory registers, nothing leaves the host
  Simulated,
}

impl fmt::Display for BusBackend {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      BusBackend::IPBus     => "IPBus",
      BusBackend::Uio       => "Uio",
      BusBackend::Simulated => "Simulated",
    };
    write!(f, "<BusBackend: {}>", repr)
  }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct IPBusSettings {
  /// ip:port of the Polarfire
  pub address         : String,
  /// socket read timeout
  pub timeout_ms      : u64,
  /// attempts per IPBus transaction before giving up
  pub max_attempts    : usize,
  /// polls of the DONE register per Wishbone transaction
  pub max_poll_cycles : usize,
  pub bridge          : BridgeRegisters,
}

impl IPBusSettings {
  pub fn new() -> Self {
    Self {
      address         : String::from("192.168.1.10:50001"),
      timeout_ms      : 100,
      max_attempts    : 4,
      max_poll_cycles : 100,
      bridge          : BridgeRegisters::new(),
    }
  }
}

impl Default for IPBusSettings {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UioSettings {
  pub device : String,
  /// bytes to map
  pub size   : usize,
}

impl UioSettings {
  pub fn new() -> Self {
    Self {
      device : String::from(crate::uio::UIO0),
      // 12 targets a 20bit address space of 32bit words
      size   : 12 << 22,
    }
  }
}

impl Default for UioSettings {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PfSettings {
  pub backend                : BusBackend,
  pub ipbus                  : IPBusSettings,
  pub uio                    : UioSettings,
  /// indices of the connected ROCs
  pub rocs                   : Vec<u32>,
  /// acceptable fraction (0..1) of bad headers per link
  pub header_check_threshold : f64,
  /// applied to every ROC before the detector configuration
  pub parameters             : PageSettings,
}

impl PfSettings {

  pub fn new() -> Self {
    Self {
      backend                : BusBackend::IPBus,
      ipbus                  : IPBusSettings::new(),
      uio                    : UioSettings::new(),
      rocs                   : vec![0, 1, 2, 3],
      header_check_threshold : DEFAULT_HEADER_THRESHOLD,
      parameters             : PageSettings::new(),
    }
  }

  pub fn from_toml_str(toml_string : &str) -> Result<Self, SettingsError> {
    match toml::from_str(toml_string) {
      Err(err) => {
        error!("Can't interpret toml! {}", err);
        Err(SettingsError::TomlDecodingError)
      }
      Ok(settings) => Ok(settings)
    }
  }

  pub fn from_toml(filename : &Path) -> Result<Self, SettingsError> {
    let toml_string = read_toml_file(filename)?;
    Self::from_toml_str(&toml_string)
  }

  /// Write the settings to a toml file
  pub fn to_toml(&self, filename : &Path) -> Result<(), SettingsError> {
    info!("Will write to file {}!", filename.display());
    let toml_string = match toml::to_string_pretty(self) {
      Err(err) => {
        error!("Unable to serialize toml! {err}");
        return Err(SettingsError::TomlEncodingError);
      }
      Ok(toml_string) => toml_string
    };
    match File::create(filename) {
      Err(err) => {
        error!("Unable to open file {}! {}", filename.display(), err);
        Err(SettingsError::WriteFailed)
      }
      Ok(mut file) => {
        match file.write_all(toml_string.as_bytes()) {
          Err(err) => {
            error!("Unable to write to file {}! {}", filename.display(), err);
            Err(SettingsError::WriteFailed)
          }
          Ok(_) => {
            debug!("Wrote settings to {}!", filename.display());
            Ok(())
          }
        }
      }
    }
  }

  /// Bind the configured backend. This is done only once
  /// per session.
  pub fn open_bus(&self) -> Result<Box<dyn WishboneInterface>, BusError> {
    info!("Opening register bus with {}", self.backend);
    match self.backend {
      BusBackend::IPBus => {
        let ipbus = IPBus::new(&self.ipbus.address,
                               Duration::from_millis(self.ipbus.timeout_ms),
                               self.ipbus.max_attempts)?;
        Ok(Box::new(IPBusWishbone::new(ipbus, self.ipbus.bridge, self.ipbus.max_poll_cycles)))
      }
      BusBackend::Uio => open_uio(&self.uio),
      BusBackend::Simulated => Ok(Box::new(SimulatedWishbone::new())),
    }
  }
}

cfg_if::cfg_if! {
  if #[cfg(target_os = "linux")] {
    fn open_uio(settings : &UioSettings) -> Result<Box<dyn WishboneInterface>, BusError> {
      let bus = crate::uio::UioWishbone::new(&settings.device, settings.size)?;
      Ok(Box::new(bus))
    }
  } else {
    fn open_uio(settings : &UioSettings) -> Result<Box<dyn WishboneInterface>, BusError> {
      error!("UIO devices ({}) are only available on linux!", settings.device);
      Err(BusError::LinkDown)
    }
  }
}

impl Default for PfSettings {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for PfSettings {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let disp : String;
    match toml::to_string(self) {
      Err(err) => {
        error!("Deserialization error! {err}");
        disp = String::from("-- DESERIALIZATION ERROR! --");
      }
      Ok(_disp) => {
        disp = _disp;
      }
    }
    write!(f, "<PfSettings :\n{}>", disp)
  }
}

#[cfg(test)]
mod test_settings {
  use super::*;
  use pf_dataclasses::decoding::HeaderStatus;
  use std::collections::BTreeMap;

  #[test]
  fn toml_round_trip() {
    let mut settings = PfSettings::new();
    settings.backend = BusBackend::Simulated;
    settings.parameters.insert(String::from("CHANNEL_*"),
                               BTreeMap::from([(String::from("REF_DAC_TOA"), 3)]));
    let toml_string = toml::to_string(&settings).unwrap();
    let back = PfSettings::from_toml_str(&toml_string).unwrap();
    assert_eq!(back, settings);
  }

  #[test]
  fn parse_minimal_file() {
    let toml_string = r#"
      backend = "Simulated"
      rocs = [0, 2]
      header_check_threshold = 0.015

      [ipbus]
      address = "10.0.0.2:50001"
      timeout_ms = 50
      max_attempts = 2
      max_poll_cycles = 10
      [ipbus.bridge]
      wb_write_data = 0x20
      wb_read_data = 0x21
      wb_addr = 0x22
      wb_target = 0x23
      wb_we = 0x24
      start = 0x25
      done = 0x26
      reset = 0x27

      [uio]
      device = "/dev/uio1"
      size = 4096

      [parameters.TOP]
      PHASE = 0x4
    "#;
    let settings = PfSettings::from_toml_str(toml_string).unwrap();
    assert_eq!(settings.rocs, vec![0, 2]);
    assert_eq!(settings.header_check_threshold, 0.015);
    assert_eq!(settings.parameters["TOP"]["PHASE"], 4);
    assert!(PfSettings::from_toml_str("backend = 3").is_err());
  }

  #[test]
  fn default_threshold_rejects_bad_link() {
    let settings = PfSettings::new();
    let mut status = HeaderStatus::new(0);
    status.n_bad_bxheaders = 100;
    status.n_bad_idles     = 100;
    assert!(!status.is_acceptable(settings.header_check_threshold));
    status.n_bad_bxheaders  = 1;
    status.n_bad_idles      = 0;
    status.n_good_bxheaders = 99;
    status.n_good_idles     = 100;
    assert!(status.is_acceptable(settings.header_check_threshold));
  }

  #[test]
  fn simulated_bus() {
    let mut settings = PfSettings::new();
    settings.backend = BusBackend::Simulated;
    let mut bus = settings.open_bus().unwrap();
    bus.wb_write(7, 9).unwrap();
    assert_eq!(bus.wb_read(7), Ok(9));
  }
}
