//! DAQ readout of the Polarfire event buffer
//!
//! Built events wait in the output buffer. The status
//! register tells how many there are and how large the
//! next one is; after it has been read, the read pointer
//! has to be advanced by hand.

use std::fmt;

use pf_dataclasses::serialization::{
  get_bits,
  u32_to_u8,
};

use crate::targets::{
  TargetRouter,
  WishboneTarget,
};
use crate::wishbone::BusError;

pub const REG_CONTROL         : u32 = 1;
pub const CTL_RESET           : u32 = 0x1;  // write 1 to reset all buffers
pub const CTL_ADVANCE_PTR     : u32 = 0x2;  // write 1 to drop the current event

pub const REG_STATUS          : u32 = 65;
pub const STATUS_EMPTY        : u32 = 0x1;
pub const STATUS_FULL         : u32 = 0x2;
pub const STATUS_NEVENTS_SHIFT: u32 = 4;    // [12:4] events in the buffer
pub const STATUS_NEVENTS_BITS : u32 = 9;
pub const STATUS_SIZE_SHIFT   : u32 = 16;   // [26:16] words of the next event
pub const STATUS_SIZE_BITS    : u32 = 11;

/// The event buffer in the DaqOutbuffer target starts here
pub const EVENT_BUFFER_BASE   : u32 = 0x800;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct DaqStatus {
  pub empty           : bool,
  pub full            : bool,
  pub nevents         : u32,
  /// in 32bit words
  pub next_event_size : u32,
}

impl DaqStatus {

  pub fn from_register(value : u32) -> Self {
    Self {
      empty           : value & STATUS_EMPTY != 0,
      full            : value & STATUS_FULL != 0,
      nevents         : get_bits(value, STATUS_NEVENTS_SHIFT, STATUS_NEVENTS_BITS),
      next_event_size : get_bits(value, STATUS_SIZE_SHIFT, STATUS_SIZE_BITS),
    }
  }
}

impl fmt::Display for DaqStatus {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<DaqStatus:");
    repr += &(format!("\n  empty           : {}", self.empty));
    repr += &(format!("\n  full            : {}", self.full));
    repr += &(format!("\n  nevents         : {}", self.nevents));
    repr += &(format!("\n  next event size : {} words>", self.next_event_size));
    write!(f, "{}", repr)
  }
}

pub fn daq_status(router : &mut TargetRouter) -> Result<DaqStatus, BusError> {
  let value = router.read_field(WishboneTarget::DaqControl, REG_STATUS)?;
  Ok(DaqStatus::from_register(value))
}

pub fn daq_reset(router : &mut TargetRouter) -> Result<(), BusError> {
  info!("Resetting DAQ buffers");
  router.write_field(WishboneTarget::DaqControl, REG_CONTROL, CTL_RESET)
}

pub fn daq_advance_ptr(router : &mut TargetRouter) -> Result<(), BusError> {
  trace!("Advancing DAQ read pointer");
  router.write_field(WishboneTarget::DaqControl, REG_CONTROL, CTL_ADVANCE_PTR)
}

/// Read the next event as a byte buffer ready for the
/// decoder. None if no event is waiting.
pub fn daq_read_event(router : &mut TargetRouter) -> Result<Option<Vec<u8>>, BusError> {
  let status = daq_status(router)?;
  if status.empty || status.next_event_size == 0 {
    return Ok(None);
  }
  if status.full {
    warn!("DAQ buffer is full, events may have been lost!");
  }
  let words = router.read_block(WishboneTarget::DaqOutbuffer,
                                EVENT_BUFFER_BASE,
                                status.next_event_size as usize)?;
  daq_advance_ptr(router)?;
  debug!("Read event with {} words, {} events left", words.len(), status.nevents.saturating_sub(1));
  Ok(Some(u32_to_u8(&words)))
}

#[cfg(test)]
mod test_daq {
  use super::*;
  use crate::simulated::SimulatedWishbone;

  #[test]
  fn status_fields() {
    let status = DaqStatus::from_register((42 << 16) | (3 << 4) | 0x2);
    assert!(!status.empty);
    assert!(status.full);
    assert_eq!(status.nevents, 3);
    assert_eq!(status.next_event_size, 42);
  }

  #[test]
  fn read_event_and_advance() {
    let mut bus = SimulatedWishbone::new();
    let status_addr = WishboneTarget::DaqControl.base() + REG_STATUS;
    bus.preset(status_addr, (2 << 16) | (1 << 4));
    bus.preset(WishboneTarget::DaqOutbuffer.base() + EVENT_BUFFER_BASE, 0xBEEF2021);
    bus.preset(WishboneTarget::DaqOutbuffer.base() + EVENT_BUFFER_BASE + 1, 0x1);
    {
      let mut router = TargetRouter::new(&mut bus);
      let event = daq_read_event(&mut router).unwrap().unwrap();
      assert_eq!(event, vec![0x21, 0x20, 0xEF, 0xBE, 0x01, 0, 0, 0]);
    }
    let ctl = WishboneTarget::DaqControl.base() + REG_CONTROL;
    assert_eq!(bus.write_log, vec![(ctl, CTL_ADVANCE_PTR)]);
    bus.preset(status_addr, STATUS_EMPTY);
    let mut router = TargetRouter::new(&mut bus);
    assert_eq!(daq_read_event(&mut router), Ok(None));
  }
}
