//! The register bus
//!
//! All registers behind the Polarfire are reached through 
//! its Wishbone bus. There are several ways to get there, 
//! which all implement the WishboneInterface trait:
//!
//! * IPBus over UDP
//! * a memory mapped UIO window
//! * a simulated register file (tests, dry runs)
//!
//! Addresses are flattened, the upper bits select the 
//! target (see targets.rs), the lower 20 bits the 
//! register within the target.

use std::error::Error;
use std::fmt;

/// Number of bits for the register address within 
/// a target
pub const TARGET_ADDRESS_BITS : u32 = 20;

/// Split a flattened address into (target id, local address)
pub fn split_address(addr : u32) -> (u32, u32) {
  (addr >> TARGET_ADDRESS_BITS, addr & ((1 << TARGET_ADDRESS_BITS) - 1))
}

/// Combine target id and local address 
pub fn flat_address(target_id : u32, local : u32) -> u32 {
  (target_id << TARGET_ADDRESS_BITS) | (local & ((1 << TARGET_ADDRESS_BITS) - 1))
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BusError {
  /// No answer within the configured time
  Timeout,
  /// The transport to the Polarfire is not available
  LinkDown,
  /// The address is outside of the target's range
  BadAddress,
  /// The hardware refused the transaction
  Nack,
}

impl fmt::Display for BusError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : String;
    match self {
      BusError::Timeout => {
        etype = String::from("Timeout");
      },
      BusError::LinkDown => {
        etype = String::from("LinkDown");
      },
      BusError::BadAddress => {
        etype = String::from("BadAddress");
      },
      BusError::Nack => {
        etype = String::from("Nack");
      },
    }
    write!(f, "<BusError: {}>", etype)
  }
}

impl Error for BusError {
}

/// Uniform access to the 32bit registers of the Polarfire
///
/// Implementations may retry transient link errors
/// internally, but never more often than their configured
/// attempt limit. All errors are handed to the caller.
pub trait WishboneInterface {

  fn wb_read(&mut self, addr : u32) -> Result<u32, BusError>;
  
  fn wb_write(&mut self, addr : u32, value : u32) -> Result<(), BusError>;

  /// Read nwords consecutive registers starting at addr
  fn wb_read_block(&mut self, addr : u32, nwords : usize) -> Result<Vec<u32>, BusError>;

  /// Reset the bus (on/off cycle)
  fn wb_reset(&mut self) -> Result<(), BusError>;
}
