//! One Polarfire with its ROCs, and the configuration
//! of a whole detector
//!
//! The PolarfireTarget owns the bus for the session, the
//! register snapshot and the handles of the connected
//! ROCs. The DetectorConfiguration holds the parameters
//! for every Polarfire (by hostname) and ROC, with all
//! INHERIT sections already resolved.

use std::collections::{
  BTreeMap,
  BTreeSet,
};
use std::error::Error;
use std::fmt;
use std::path::Path;

use crate::compile::{
  CommitPlan,
  CompileError,
  PageSettings,
};
use crate::daq;
use crate::fast_control;
use crate::roc::Roc;
use crate::settings::{
  read_toml_file,
  PfSettings,
  SettingsError,
};
use crate::snapshot::RegisterSnapshot;
use crate::targets::{
  TargetRouter,
  WishboneTarget,
};
use crate::wishbone::{
  BusError,
  WishboneInterface,
};

/// Key of a section which applies to all its siblings
pub const INHERIT      : &str = "INHERIT";
pub const HGCROCS      : &str = "HGCROCS";
pub const CALIB_OFFSET : &str = "CALIB_OFFSET";
pub const SIPM_BIAS    : &str = "SIPM_BIAS";

pub struct PolarfireTarget {
  bus          : Box<dyn WishboneInterface>,
  pub snapshot : RegisterSnapshot,
  rocs         : Vec<Roc>,
}

impl PolarfireTarget {

  pub fn new(bus : Box<dyn WishboneInterface>, roc_indices : &[u32]) -> Result<Self, CompileError> {
    let mut rocs = Vec::<Roc>::with_capacity(roc_indices.len());
    for index in roc_indices {
      rocs.push(Roc::new(*index)?);
    }
    Ok(Self {
      bus,
      snapshot : RegisterSnapshot::new(),
      rocs,
    })
  }

  /// Open the backend named in the settings
  pub fn from_settings(settings : &PfSettings) -> Result<Self, CompileError> {
    let bus = settings.open_bus()?;
    Self::new(bus, &settings.rocs)
  }

  pub fn router(&mut self) -> TargetRouter<'_> {
    TargetRouter::new(self.bus.as_mut())
  }

  pub fn roc(&self, index : u32) -> Option<&Roc> {
    self.rocs.iter().find(|r| r.index == index)
  }

  pub fn rocs(&self) -> &[Roc] {
    &self.rocs
  }

  pub fn firmware_version(&mut self) -> Result<u32, BusError> {
    self.router().firmware_version(WishboneTarget::Common)
  }

  pub fn apply_parameters(&mut self, roc_index : u32, settings : &PageSettings) -> Result<CommitPlan, CompileError> {
    let roc = find_roc(&self.rocs, roc_index)?;
    let mut router = TargetRouter::new(self.bus.as_mut());
    roc.apply_parameters(&mut router, &mut self.snapshot, settings)
  }

  /// What apply_parameters would write
  pub fn plan_parameters(&mut self, roc_index : u32, settings : &PageSettings) -> Result<CommitPlan, CompileError> {
    let roc = find_roc(&self.rocs, roc_index)?;
    let mut router = TargetRouter::new(self.bus.as_mut());
    roc.plan_parameters(&mut router, &mut self.snapshot, settings)
  }

  pub fn dump_settings(&mut self, roc_index : u32) -> Result<PageSettings, CompileError> {
    let roc = find_roc(&self.rocs, roc_index)?;
    let mut router = TargetRouter::new(self.bus.as_mut());
    roc.dump_settings(&mut router, &mut self.snapshot)
  }

  /// Apply the configuration of this Polarfire. Stops at
  /// the first ROC which fails.
  pub fn apply_configuration(&mut self, config : &PolarfireConfig) -> Result<BTreeMap<u32, CommitPlan>, CompileError> {
    if let Some(offset) = config.calib_offset {
      let mut router = self.router();
      let (length, _) = fast_control::get_calib_setup(&mut router)?;
      fast_control::setup_calib(&mut router, length, offset)?;
    }
    if let Some(bias) = config.sipm_bias {
      warn!("SiPM bias {} is set through the bias board, not by this target", bias);
    }
    let mut plans = BTreeMap::new();
    for (roc_index, settings) in &config.hgcrocs {
      if self.roc(*roc_index).is_none() {
        warn!("Configuration for ROC {} which is not connected, skipping", roc_index);
        continue;
      }
      let plan = self.apply_parameters(*roc_index, settings)?;
      info!("ROC {} configured with {} writes", roc_index, plan.n_writes());
      plans.insert(*roc_index, plan);
    }
    Ok(plans)
  }

  /// Clear buffers and counters before a run
  pub fn prepare_new_run(&mut self) -> Result<(), BusError> {
    let mut router = self.router();
    fast_control::buffer_reset(&mut router)?;
    daq::daq_reset(&mut router)?;
    fast_control::clear_run(&mut router)
  }

  pub fn daq_status(&mut self) -> Result<daq::DaqStatus, BusError> {
    daq::daq_status(&mut self.router())
  }

  /// The next event from the DAQ buffer as bytes for the
  /// decoder.
  pub fn read_event(&mut self) -> Result<Option<Vec<u8>>, BusError> {
    daq::daq_read_event(&mut self.router())
  }
}

fn find_roc(rocs : &[Roc], index : u32) -> Result<&Roc, CompileError> {
  match rocs.iter().find(|r| r.index == index) {
    Some(roc) => Ok(roc),
    None => {
      error!("ROC {} is not connected to this Polarfire!", index);
      Err(CompileError::Bus(BusError::BadAddress))
    }
  }
}

impl fmt::Display for PolarfireTarget {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<PolarfireTarget:");
    for roc in &self.rocs {
      repr += &(format!("\n  {}", roc));
    }
    repr += &(format!("\n  {}>", self.snapshot));
    write!(f, "{}", repr)
  }
}

#[derive(Debug)]
pub enum ConfigError {
  BadFile(SettingsError),
  /// The structure of the file is not what we expect
  BadFormat(String),
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : String;
    match self {
      ConfigError::BadFile(err) => {
        etype = format!("BadFile ({})", err);
      }
      ConfigError::BadFormat(msg) => {
        etype = format!("BadFormat ({})", msg);
      }
    }
    write!(f, "<ConfigError: {}>", etype)
  }
}

impl Error for ConfigError {
}

impl From<SettingsError> for ConfigError {
  fn from(err : SettingsError) -> Self {
    ConfigError::BadFile(err)
  }
}

#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize, serde::Serialize)]
pub struct PolarfireConfig {
  pub calib_offset : Option<u32>,
  pub sipm_bias    : Option<u32>,
  /// roc index -> page -> parameter -> value
  pub hgcrocs      : BTreeMap<u32, PageSettings>,
}

impl PolarfireConfig {

  pub fn new() -> Self {
    Self {
      calib_offset : None,
      sipm_bias    : None,
      hgcrocs      : BTreeMap::new(),
    }
  }

  /// Merge a polarfire section into this configuration
  fn import(&mut self, section : &toml::Table) -> Result<(), ConfigError> {
    for (key, value) in section {
      match key.to_uppercase().as_str() {
        CALIB_OFFSET => {
          self.calib_offset = Some(parse_value(key, value)?);
        }
        SIPM_BIAS => {
          self.sipm_bias = Some(parse_value(key, value)?);
        }
        HGCROCS => {
          let rocs = as_table(key, value)?;
          // INHERIT first, so that a specific ROC overrides it
          if let Some(inherit) = get_ignore_case(rocs, INHERIT) {
            let pages = as_table(INHERIT, inherit)?;
            for settings in self.hgcrocs.values_mut() {
              extract(pages, settings)?;
            }
          }
          for (roc, pages) in rocs {
            if roc.eq_ignore_ascii_case(INHERIT) {
              continue;
            }
            let index = parse_roc_index(roc)?;
            extract(as_table(roc, pages)?, self.hgcrocs.entry(index).or_default())?;
          }
        }
        _ => {
          return Err(ConfigError::BadFormat(format!("Unrecognized polarfire setting {}", key)));
        }
      }
    }
    Ok(())
  }
}

impl fmt::Display for PolarfireConfig {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<PolarfireConfig:");
    repr += &(format!("\n  {} : {:?}", CALIB_OFFSET, self.calib_offset));
    repr += &(format!("\n  {} : {:?}", SIPM_BIAS, self.sipm_bias));
    for (roc, pages) in &self.hgcrocs {
      repr += &(format!("\n  ROC {}", roc));
      for (page, params) in pages {
        repr += &(format!("\n    {}", page));
        for (name, value) in params {
          repr += &(format!("\n      {} : {}", name, value));
        }
      }
    }
    repr += ">";
    write!(f, "{}", repr)
  }
}

fn get_ignore_case<'a>(table : &'a toml::Table, key : &str) -> Option<&'a toml::Value> {
  table.iter()
    .find(|(k, _)| k.eq_ignore_ascii_case(key))
    .map(|(_, v)| v)
}

fn as_table<'a>(key : &str, value : &'a toml::Value) -> Result<&'a toml::Table, ConfigError> {
  value.as_table()
    .ok_or_else(|| ConfigError::BadFormat(format!("The section {} is not a table", key)))
}

fn parse_roc_index(key : &str) -> Result<u32, ConfigError> {
  key.parse::<u32>()
    .map_err(|_| ConfigError::BadFormat(format!("ROC {} is not a number", key)))
}

/// Integers, or strings with an optional 0x/0b prefix
fn parse_value(key : &str, value : &toml::Value) -> Result<u32, ConfigError> {
  let bad = || ConfigError::BadFormat(format!("Value for {} is not an unsigned 32bit integer", key));
  match value {
    toml::Value::Integer(v) => u32::try_from(*v).map_err(|_| bad()),
    toml::Value::String(s) => {
      let s = s.trim();
      let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
      } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u32::from_str_radix(bin, 2)
      } else {
        s.parse::<u32>()
      };
      parsed.map_err(|_| bad())
    }
    _ => Err(bad()),
  }
}

/// page -> parameter -> value into settings
fn extract(pages : &toml::Table, settings : &mut PageSettings) -> Result<(), ConfigError> {
  for (page, params) in pages {
    let params = as_table(page, params)?;
    let entry = settings.entry(page.to_uppercase()).or_default();
    for (name, value) in params {
      entry.insert(name.to_uppercase(), parse_value(name, value)?);
    }
  }
  Ok(())
}

/// hostname -> configuration of its Polarfire
#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize, serde::Serialize)]
pub struct DetectorConfiguration {
  pub polarfires : BTreeMap<String, PolarfireConfig>,
}

impl DetectorConfiguration {

  pub fn new() -> Self {
    Self {
      polarfires : BTreeMap::new(),
    }
  }

  pub fn from_toml(filename : &Path) -> Result<Self, ConfigError> {
    let toml_string = read_toml_file(filename)?;
    Self::from_toml_str(&toml_string)
  }

  /// Interpret a configuration file. An INHERIT section
  /// applies to all polarfires (or ROCs) of the file, a
  /// named section overrides what it inherited.
  pub fn from_toml_str(toml_string : &str) -> Result<Self, ConfigError> {
    let table = match toml_string.parse::<toml::Table>() {
      Err(err) => {
        error!("Can't interpret toml! {}", err);
        return Err(ConfigError::BadFile(SettingsError::TomlDecodingError));
      }
      Ok(table) => table
    };
    // find every polarfire and ROC first, so that
    // INHERIT sections know where they apply
    let mut config = Self::new();
    for (hostname, section) in &table {
      if hostname.eq_ignore_ascii_case(INHERIT) {
        continue;
      }
      let section = as_table(hostname, section)?;
      let pf = config.polarfires.entry(hostname.clone()).or_default();
      if let Some(rocs) = get_ignore_case(section, HGCROCS) {
        let known : BTreeSet<&String> = as_table(HGCROCS, rocs)?.keys()
          .filter(|k| !k.eq_ignore_ascii_case(INHERIT))
          .collect();
        for roc in known {
          pf.hgcrocs.entry(parse_roc_index(roc)?).or_default();
        }
      }
    }
    if let Some(inherit) = get_ignore_case(&table, INHERIT) {
      let section = as_table(INHERIT, inherit)?;
      for pf in config.polarfires.values_mut() {
        pf.import(section)?;
      }
    }
    for (hostname, section) in &table {
      if hostname.eq_ignore_ascii_case(INHERIT) {
        continue;
      }
      if let Some(pf) = config.polarfires.get_mut(hostname) {
        pf.import(as_table(hostname, section)?)?;
      }
    }
    debug!("Loaded configuration for {} polarfires", config.polarfires.len());
    Ok(config)
  }

  pub fn polarfire(&self, hostname : &str) -> Option<&PolarfireConfig> {
    self.polarfires.get(hostname)
  }
}

impl fmt::Display for DetectorConfiguration {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<DetectorConfiguration:");
    for (hostname, pf) in &self.polarfires {
      repr += &(format!("\n{} {}", hostname, pf));
    }
    repr += ">";
    write!(f, "{}", repr)
  }
}

#[cfg(test)]
mod test_polarfire_target {
  use super::*;
  use crate::simulated::SimulatedWishbone;

  const CONFIG : &str = r#"
    [INHERIT]
    calib_offset = 12
    [INHERIT.hgcrocs.INHERIT.GLOBAL_ANALOG_0]
    gain_conv = 3

    [pf-left]
    sipm_bias = "0x0C"
    [pf-left.hgcrocs.0.CHANNEL_3]
    ref_dac_toa = 7
    [pf-left.hgcrocs.1."CHANNEL_*"]
    ref_dac_toa = 1
    [pf-left.hgcrocs.1.GLOBAL_ANALOG_0]
    GAIN_CONV = 5

    [pf-right]
    calib_offset = 20
    [pf-right.hgcrocs.2.TOP]
    phase = "0b101"
  "#;

  #[test]
  fn rocs_must_fit_the_bus() {
    let target = PolarfireTarget::new(Box::new(SimulatedWishbone::new()), &[0, 63]).unwrap();
    assert_eq!(target.rocs().len(), 2);
    let err = PolarfireTarget::new(Box::new(SimulatedWishbone::new()), &[0, 64]);
    assert!(matches!(err, Err(CompileError::Bus(BusError::BadAddress))));
    assert!(PolarfireTarget::new(Box::new(SimulatedWishbone::new()), &[u32::MAX]).is_err());
  }

  #[test]
  fn inherit_is_resolved() {
    let config = DetectorConfiguration::from_toml_str(CONFIG).unwrap();
    assert_eq!(config.polarfires.len(), 2);
    let left = config.polarfire("pf-left").unwrap();
    assert_eq!(left.calib_offset, Some(12));
    assert_eq!(left.sipm_bias, Some(12));
    assert_eq!(left.hgcrocs[&0]["GLOBAL_ANALOG_0"]["GAIN_CONV"], 3);
    assert_eq!(left.hgcrocs[&0]["CHANNEL_3"]["REF_DAC_TOA"], 7);
    assert_eq!(left.hgcrocs[&1]["GLOBAL_ANALOG_0"]["GAIN_CONV"], 5);
    assert_eq!(left.hgcrocs[&1]["CHANNEL_*"]["REF_DAC_TOA"], 1);
    let right = config.polarfire("pf-right").unwrap();
    assert_eq!(right.calib_offset, Some(20));
    assert_eq!(right.hgcrocs[&2]["TOP"]["PHASE"], 5);
    assert_eq!(right.hgcrocs[&2]["GLOBAL_ANALOG_0"]["GAIN_CONV"], 3);
  }

  #[test]
  fn bad_configurations() {
    assert!(DetectorConfiguration::from_toml_str("[pf]\nnonsense = 1").is_err());
    assert!(DetectorConfiguration::from_toml_str("[pf.hgcrocs.abc.TOP]\nPHASE = 1").is_err());
    assert!(DetectorConfiguration::from_toml_str("[pf.hgcrocs.0.TOP]\nPHASE = -1").is_err());
    assert!(DetectorConfiguration::from_toml_str("pf = 3").is_err());
  }

  #[test]
  fn apply_configuration_to_target() {
    let config = DetectorConfiguration::from_toml_str(CONFIG).unwrap();
    let mut target = PolarfireTarget::new(Box::new(SimulatedWishbone::new()), &[0, 1]).unwrap();
    let plans = target.apply_configuration(config.polarfire("pf-left").unwrap()).unwrap();
    assert_eq!(plans.len(), 2);
    let (length, offset) = fast_control::get_calib_setup(&mut target.router()).unwrap();
    assert_eq!((length, offset), (0, 12));
    let dumped = target.dump_settings(1).unwrap();
    assert_eq!(dumped["CHANNEL_70"]["REF_DAC_TOA"], 1);
    assert_eq!(dumped["GLOBAL_ANALOG_0"]["GAIN_CONV"], 5);
    // applying again changes nothing
    let plans = target.apply_configuration(config.polarfire("pf-left").unwrap()).unwrap();
    assert!(plans.values().all(|p| p.is_empty()));
    assert!(target.apply_parameters(7, &PageSettings::new()).is_err());
  }
}
