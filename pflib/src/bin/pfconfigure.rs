//! Configure the ROCs behind a Polarfire
//!
//! Applies the parameters of the session settings and
//! of a detector configuration, or reads the chips back.

#[macro_use] extern crate log;

use std::path::PathBuf;
use std::process::exit;

use clap::{
  Parser,
  ValueEnum,
};

use pflib::{
  init_env_logger,
  BusBackend,
  DetectorConfiguration,
  PageSettings,
  PfSettings,
  PolarfireConfig,
  PolarfireTarget,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
enum DumpFormat {
  #[default]
  Toml,
  Json,
}

#[derive(Parser, Debug)]
#[command(author = "pflib developers", version, about, long_about = None)]
struct Args {
  /// Session settings (backend, connected ROCs, global parameters)
  #[arg(short, long)]
  settings : Option<PathBuf>,
  /// Detector configuration with the parameters per polarfire
  #[arg(short, long)]
  config : Option<PathBuf>,
  /// Name of this polarfire in the detector configuration.
  /// Not needed if the configuration has only one.
  #[arg(long)]
  host : Option<String>,
  /// Show the register writes without doing them
  #[arg(long)]
  dry_run : bool,
  /// Use in memory registers instead of the configured bus
  #[arg(long)]
  simulate : bool,
  /// Read back all parameters of the connected ROCs
  #[arg(long)]
  dump : bool,
  #[arg(long, value_enum, default_value_t = DumpFormat::Toml)]
  format : DumpFormat,
  /// Clear buffers and counters after configuring
  #[arg(long)]
  prepare_run : bool,
  /// Write the (default) settings to this file and exit
  #[arg(long)]
  write_settings : Option<PathBuf>,
}

fn select_polarfire(config : &DetectorConfiguration, host : &Option<String>) -> Option<PolarfireConfig> {
  match host {
    Some(hostname) => {
      let pf = config.polarfire(hostname).cloned();
      if pf.is_none() {
        error!("No polarfire {} in the detector configuration!", hostname);
      }
      pf
    }
    None => {
      if config.polarfires.len() != 1 {
        error!("The configuration describes {} polarfires, please select one with --host!", config.polarfires.len());
        return None;
      }
      config.polarfires.values().next().cloned()
    }
  }
}

fn print_dump(roc : u32, settings : &PageSettings, format : DumpFormat) {
  println!("=> ROC {}", roc);
  match format {
    DumpFormat::Toml => {
      match toml::to_string(settings) {
        Err(err) => error!("Unable to serialize settings! {}", err),
        Ok(repr) => println!("{}", repr),
      }
    }
    DumpFormat::Json => {
      match serde_json::to_string_pretty(settings) {
        Err(err) => error!("Unable to serialize settings! {}", err),
        Ok(repr) => println!("{}", repr),
      }
    }
  }
}

fn main() {
  init_env_logger();
  let args = Args::parse();

  let mut settings = match &args.settings {
    None => {
      info!("No settings given, using defaults");
      PfSettings::new()
    }
    Some(path) => {
      match PfSettings::from_toml(path) {
        Err(err) => {
          error!("Unable to load settings! {}", err);
          exit(1);
        }
        Ok(settings) => settings
      }
    }
  };
  if let Some(path) = &args.write_settings {
    if let Err(err) = settings.to_toml(path) {
      error!("Unable to write settings! {}", err);
      exit(1);
    }
    exit(0);
  }
  if args.simulate {
    settings.backend = BusBackend::Simulated;
  }
  debug!("Using {}", settings);

  let pf_config = match &args.config {
    None => PolarfireConfig::new(),
    Some(path) => {
      let detector = match DetectorConfiguration::from_toml(path) {
        Err(err) => {
          error!("Unable to load detector configuration! {}", err);
          exit(1);
        }
        Ok(detector) => detector
      };
      match select_polarfire(&detector, &args.host) {
        None => exit(1),
        Some(pf) => pf
      }
    }
  };

  let mut target = match PolarfireTarget::from_settings(&settings) {
    Err(err) => {
      error!("Unable to connect to the polarfire! {}", err);
      exit(1);
    }
    Ok(target) => target
  };
  match target.firmware_version() {
    Err(err) => warn!("Unable to read the firmware version! {}", err),
    Ok(version) => println!("=> Firmware version {:#010x}", version),
  }
  let rocs : Vec<u32> = target.rocs().iter().map(|r| r.index).collect();

  if args.dump {
    for roc in &rocs {
      match target.dump_settings(*roc) {
        Err(err) => {
          error!("Unable to read back ROC {}! {}", roc, err);
          exit(1);
        }
        Ok(dumped) => print_dump(*roc, &dumped, args.format),
      }
    }
    exit(0);
  }

  if args.dry_run {
    for roc in &rocs {
      let mut combined = settings.parameters.clone();
      if let Some(specific) = pf_config.hgcrocs.get(roc) {
        for (page, params) in specific {
          combined.entry(page.clone()).or_default().extend(params.iter().map(|(k, v)| (k.clone(), *v)));
        }
      }
      match target.plan_parameters(*roc, &combined) {
        Err(err) => {
          error!("Unable to plan ROC {}! {}", roc, err);
          exit(1);
        }
        Ok(plan) => println!("=> ROC {} {}", roc, plan),
      }
    }
    exit(0);
  }

  // session wide parameters first, the detector configuration overrides them
  if !settings.parameters.is_empty() {
    for roc in &rocs {
      match target.apply_parameters(*roc, &settings.parameters) {
        Err(err) => {
          error!("Unable to configure ROC {}! {}", roc, err);
          exit(1);
        }
        Ok(plan) => println!("=> ROC {} : {} writes, {} registers unchanged", roc, plan.n_writes(), plan.n_elided),
      }
    }
  }
  match target.apply_configuration(&pf_config) {
    Err(err) => {
      error!("Unable to apply the detector configuration! {}", err);
      exit(1);
    }
    Ok(plans) => {
      for (roc, plan) in plans {
        println!("=> ROC {} : {} writes, {} registers unchanged", roc, plan.n_writes(), plan.n_elided);
      }
    }
  }
  if args.prepare_run {
    if let Err(err) = target.prepare_new_run() {
      error!("Unable to prepare the run! {}", err);
      exit(1);
    }
    println!("=> Ready for a new run");
  }
}
