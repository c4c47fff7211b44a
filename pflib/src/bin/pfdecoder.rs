//! Decode a captured DAQ buffer and check its headers
//!

#[macro_use] extern crate log;

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use indicatif::{
  ProgressBar,
  ProgressStyle,
};

use pf_dataclasses::decoding::{
  HeaderCheckResults,
  DEFAULT_HEADER_THRESHOLD,
};
use pf_dataclasses::io::{
  read_file,
  EventStreamer,
};
use pflib::{
  init_env_logger,
  PfSettings,
};

#[derive(Parser, Default, Debug)]
#[command(author = "pflib developers", version, about, long_about = None)]
struct Args {
  /// File with back-to-back events as written by the DAQ
  input : PathBuf,
  /// Print every decoded event as json
  #[arg(long)]
  json : bool,
  /// Acceptable fraction (0..1) of bad headers per link.
  /// Overrides the value of the settings file.
  #[arg(short, long)]
  threshold : Option<f64>,
  /// Session settings to take the header check threshold from
  #[arg(short, long)]
  settings : Option<PathBuf>,
  /// Stop after this many events
  #[arg(short, long)]
  nevents : Option<usize>,
  /// Hide the progress bar
  #[arg(long)]
  no_progress : bool,
}

fn main() {
  init_env_logger();
  let args = Args::parse();

  let threshold = match (args.threshold, &args.settings) {
    (Some(threshold), _) => threshold,
    (None, Some(path)) => {
      match PfSettings::from_toml(path) {
        Err(err) => {
          error!("Unable to load settings! {}", err);
          exit(1);
        }
        Ok(settings) => settings.header_check_threshold
      }
    }
    (None, None) => DEFAULT_HEADER_THRESHOLD,
  };
  if !(0.0..=1.0).contains(&threshold) {
    error!("The threshold is a fraction between 0 and 1, got {}!", threshold);
    exit(1);
  }

  let stream = match read_file(&args.input) {
    Err(err) => {
      error!("Unable to read {}! {}", args.input.display(), err);
      exit(1);
    }
    Ok(stream) => stream
  };
  let mut streamer = EventStreamer::new(&stream);
  let total    = streamer.remaining() as u64;

  let bar = if args.no_progress || args.json {
    ProgressBar::hidden()
  } else {
    ProgressBar::new(total)
  };
  let bar_template : &str = "[{elapsed_precise}] {prefix} {msg} {spinner} {bar:60.blue/grey} {pos:>7}/{len:7} words";
  match ProgressStyle::with_template(bar_template) {
    Err(err) => warn!("Unable to set progressbar style! {}", err),
    Ok(style) => bar.set_style(style),
  }
  bar.set_message("Decoding events");

  let mut summary   = HeaderCheckResults::new();
  let mut n_events  = 0usize;
  let mut n_flagged = 0usize;
  while let Some(event) = streamer.next() {
    n_events += 1;
    if !event.header_check.all_good() {
      n_flagged += 1;
      debug!("Event {} has flagged blocks {}", n_events, event.header_check);
    }
    summary.add_event(&event);
    if args.json {
      match serde_json::to_string(&event) {
        Err(err) => error!("Unable to serialize event {}! {}", n_events, err),
        Ok(repr) => println!("{}", repr),
      }
    }
    bar.set_position(streamer.pos as u64);
    if let Some(max) = args.nevents {
      if n_events >= max {
        break;
      }
    }
  }
  bar.finish_and_clear();

  if let Some(err) = &streamer.error {
    error!("Decoding stopped after {} events with {} words left! {}", n_events, streamer.remaining(), err);
  }
  println!("=> Decoded {} events, {} of them with flagged blocks", n_events, n_flagged);
  println!("{}", summary);
  if summary.is_acceptable(threshold) {
    println!("=> All links are below {:.2}% bad headers", threshold*100.0);
  } else {
    println!("=> At least one link exceeds {:.2}% bad headers!", threshold*100.0);
    exit(2);
  }
  if streamer.error.is_some() {
    exit(1);
  }
}
