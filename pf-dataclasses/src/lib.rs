//! Dataclasses for the Polarfire/HGCROC readout chain
//!
//! * constants     - sync words, field widths, link geometry
//! * errors        - decoding errors
//! * serialization - word level helpers for captured buffers
//! * decoding      - the SuperPacket/PolarfirePacket/RocPacket
//!                   decoder and the per channel samples
//! * io            - read captured DAQ buffers from disk
//!
//! The decoder is a pure function of its input buffer,
//! it does no I/O and keeps no state between calls.

pub mod constants;
pub mod errors;
pub mod serialization;
pub mod decoding;
pub mod io;

#[macro_use] extern crate log;

#[cfg(feature = "random")]
extern crate rand;

/// Create a random, but wire-consistent instance
/// of a structure for testing
#[cfg(feature = "random")]
pub trait FromRandom {
  fn from_random() -> Self;
}
