//! pflib - configuration and readout of the HGCROC
//! behind a Polarfire FPGA
//!
//! * wishbone         - the register bus trait and its errors
//! * ipbus, uio,
//!   simulated        - bus backends
//! * targets          - wishbone targets and address routing
//! * snapshot         - last known register values
//! * register_maps    - pages, parameters and their bit locations
//! * compile          - parameters to register writes and back
//! * roc              - a single HGCROC
//! * fast_control     - L1A, resets and the calibration pulse
//! * daq              - event buffer readout
//! * polarfire_target - one Polarfire with its ROCs and the
//!                      detector configuration
//! * settings         - session settings from toml
//!
//! Decoding of the DAQ stream lives in pf-dataclasses.

pub mod wishbone;
pub mod ipbus;
pub mod uio;
pub mod simulated;
pub mod targets;
pub mod snapshot;
pub mod register_maps;
pub mod compile;
pub mod roc;
pub mod fast_control;
pub mod daq;
pub mod polarfire_target;
pub mod settings;

#[macro_use] extern crate log;
extern crate env_logger;

use std::io::Write;

use log::Level;
use colored::{
  Colorize,
  ColoredString,
};

pub use wishbone::{
  BusError,
  WishboneInterface,
};
pub use targets::{
  TargetRouter,
  WishboneTarget,
};
pub use snapshot::RegisterSnapshot;
pub use compile::{
  CommitPlan,
  CompileError,
  PageSettings,
  PageRegisters,
};
pub use roc::Roc;
pub use polarfire_target::{
  DetectorConfiguration,
  PolarfireConfig,
  PolarfireTarget,
};
pub use settings::{
  BusBackend,
  PfSettings,
};

/// Make sure that the loglevel is in color, even though not using pretty_env_logger
pub fn color_log(level : &Level) -> ColoredString {
  match level {
    Level::Error    => String::from(" ERROR!").red(),
    Level::Warn     => String::from(" WARN  ").yellow(),
    Level::Info     => String::from(" Info  ").green(),
    Level::Debug    => String::from(" debug ").blue(),
    Level::Trace    => String::from(" trace ").cyan(),
  }
}

/// Set up the environmental (env) logger
/// with our format
///
/// Ensure that the lines and module paths
/// are printed in the logging output
pub fn init_env_logger() {
  env_logger::builder()
    .format(|buf, record| {
    writeln!( buf, "[{level}][{module_path}:{line}] {args}",
      level = color_log(&record.level()),
      module_path = record.module_path().unwrap_or("<unknown>"),
      line = record.line().unwrap_or(0),
      args = record.args()
      )
    }).init();
}
