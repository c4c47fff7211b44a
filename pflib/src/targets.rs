//! Logical subsystems on the Wishbone bus
//!
//! Every subsystem of the Polarfire firmware (fast control,
//! GPIO, I2C, elinks, DAQ) is a Wishbone target with its own
//! address window. The TargetRouter translates 
//! (target, local address) into a bus address and refuses
//! anything outside of the target's window before it 
//! reaches the hardware.

use std::fmt;
use std::str::FromStr;

use crate::wishbone::{
  BusError,
  WishboneInterface,
  flat_address,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize)]
pub enum WishboneTarget {
  Common       = 0,
  FastControl  = 1,
  Gpio         = 2,
  I2c          = 3,
  Elinks       = 4,
  DaqControl   = 8,
  DaqInbuffer  = 9,
  DaqLinkFmt   = 10,
  DaqOutbuffer = 11,
}

impl WishboneTarget {

  pub const ALL : [WishboneTarget;9] = [
    WishboneTarget::Common,
    WishboneTarget::FastControl,
    WishboneTarget::Gpio,
    WishboneTarget::I2c,
    WishboneTarget::Elinks,
    WishboneTarget::DaqControl,
    WishboneTarget::DaqInbuffer,
    WishboneTarget::DaqLinkFmt,
    WishboneTarget::DaqOutbuffer,
  ];

  pub fn id(&self) -> u32 {
    *self as u32
  }

  pub fn from_id(id : u32) -> Option<Self> {
    Self::ALL.iter().find(|t| t.id() == id).copied()
  }

  /// First bus address of the target
  pub fn base(&self) -> u32 {
    flat_address(self.id(), 0)
  }

  /// Number of registers in the target's window
  pub fn size(&self) -> u32 {
    match self {
      WishboneTarget::Common       => 0x100,
      WishboneTarget::FastControl  => 0x100,
      WishboneTarget::Gpio         => 0x100,
      // the ROC register pages of all chips
      WishboneTarget::I2c          => 0x10_0000,
      WishboneTarget::Elinks       => 0x1000,
      WishboneTarget::DaqControl   => 0x100,
      WishboneTarget::DaqInbuffer  => 0x1000,
      WishboneTarget::DaqLinkFmt   => 0x100,
      WishboneTarget::DaqOutbuffer => 0x1_0000,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      WishboneTarget::Common       => "COMMON",
      WishboneTarget::FastControl  => "FAST_CONTROL",
      WishboneTarget::Gpio         => "GPIO",
      WishboneTarget::I2c          => "I2C",
      WishboneTarget::Elinks       => "ELINKS",
      WishboneTarget::DaqControl   => "DAQ_CONTROL",
      WishboneTarget::DaqInbuffer  => "DAQ_INBUFFER",
      WishboneTarget::DaqLinkFmt   => "DAQ_LINKFMT",
      WishboneTarget::DaqOutbuffer => "DAQ_OUTBUFFER",
    }
  }
}

impl FromStr for WishboneTarget {
  type Err = BusError;

  fn from_str(s : &str) -> Result<Self, Self::Err> {
    let upper = s.to_uppercase().replace('-', "_");
    Self::ALL.iter()
      .find(|t| t.name() == upper)
      .copied()
      .ok_or(BusError::BadAddress)
  }
}

impl fmt::Display for WishboneTarget {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<WishboneTarget: {} ({})>", self.name(), self.id())
  }
}

/// Address translation onto a borrowed bus
pub struct TargetRouter<'a> {
  bus : &'a mut dyn WishboneInterface,
}

impl<'a> TargetRouter<'a> {

  pub fn new(bus : &'a mut dyn WishboneInterface) -> Self {
    Self {
      bus
    }
  }

  /// The bus address for a local address, or BadAddress
  pub fn address(&self, target : WishboneTarget, local : u32) -> Result<u32, BusError> {
    if local >= target.size() {
      error!("Address {:#x} outside of {}", local, target);
      return Err(BusError::BadAddress);
    }
    Ok(target.base() + local)
  }

  pub fn read_field(&mut self, target : WishboneTarget, local : u32) -> Result<u32, BusError> {
    let addr = self.address(target, local)?;
    self.bus.wb_read(addr)
  }

  pub fn write_field(&mut self, target : WishboneTarget, local : u32, value : u32) -> Result<(), BusError> {
    let addr = self.address(target, local)?;
    self.bus.wb_write(addr, value)
  }

  pub fn read_block(&mut self, target : WishboneTarget, local : u32, nwords : usize) -> Result<Vec<u32>, BusError> {
    if nwords == 0 {
      return Ok(Vec::new());
    }
    let end = (local as u64) + (nwords as u64) - 1;
    if end >= target.size() as u64 {
      error!("Block {:#x}+{} outside of {}", local, nwords, target);
      return Err(BusError::BadAddress);
    }
    let addr = self.address(target, local)?;
    self.bus.wb_read_block(addr, nwords)
  }

  /// Read-modify-write, only the bits in mask are changed
  pub fn rmw(&mut self, target : WishboneTarget, local : u32, data : u32, mask : u32) -> Result<(), BusError> {
    let old = self.read_field(target, local)?;
    let new = (old & !mask) | (data & mask);
    self.write_field(target, local, new)
  }

  /// The firmware version sits in the lower 16 bits of 
  /// the first register of each target
  pub fn firmware_version(&mut self, target : WishboneTarget) -> Result<u32, BusError> {
    Ok(self.read_field(target, 0)? & 0xFFFF)
  }

  pub fn reset(&mut self) -> Result<(), BusError> {
    self.bus.wb_reset()
  }
}

#[cfg(test)]
mod test_targets {
  use super::*;
  use crate::simulated::SimulatedWishbone;

  #[test]
  fn bases_are_disjoint() {
    for a in WishboneTarget::ALL {
      for b in WishboneTarget::ALL {
        if a != b {
          let (a0, a1) = (a.base(), a.base() + a.size());
          assert!(b.base() >= a1 || b.base() + b.size() <= a0);
        }
      }
      assert_eq!(WishboneTarget::from_id(a.id()), Some(a));
      assert_eq!(a.name().parse::<WishboneTarget>(), Ok(a));
    }
  }

  #[test]
  fn out_of_range_never_reaches_the_bus() {
    let mut bus = SimulatedWishbone::new();
    {
      let mut router = TargetRouter::new(&mut bus);
      let size = WishboneTarget::Gpio.size();
      assert_eq!(router.read_field(WishboneTarget::Gpio, size), Err(BusError::BadAddress));
      assert_eq!(router.write_field(WishboneTarget::Gpio, size + 5, 1), Err(BusError::BadAddress));
      assert_eq!(router.read_block(WishboneTarget::Gpio, size - 1, 2), Err(BusError::BadAddress));
    }
    assert_eq!(bus.n_reads, 0);
    assert_eq!(bus.n_writes, 0);
  }

  #[test]
  fn rmw_keeps_other_bits() {
    let mut bus = SimulatedWishbone::new();
    bus.preset(WishboneTarget::FastControl.base() + 2, 0xFFFF_0000);
    {
      let mut router = TargetRouter::new(&mut bus);
      router.rmw(WishboneTarget::FastControl, 2, 0x0A0B_0C0D, 0x00FF_00FF).unwrap();
      assert_eq!(router.read_field(WishboneTarget::FastControl, 2), Ok(0xFF0B_000D));
    }
    bus.preset(WishboneTarget::Elinks.base(), 0xABCD_1234);
    let mut router = TargetRouter::new(&mut bus);
    assert_eq!(router.firmware_version(WishboneTarget::Elinks), Ok(0x1234));
  }
}
