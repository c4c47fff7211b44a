//! Fast control commands
//!
//! Single shot commands (L1A, resets, calibration pulse)
//! are sent by writing their bit to the singles register.
//! The firmware clears the bits by itself.

use std::fmt;

use crate::targets::{
  TargetRouter,
  WishboneTarget,
};
use crate::wishbone::BusError;

pub const REG_SINGLES           : u32 = 1; // write 1 to fire a command, self clearing
pub const SINGLE_L1A            : u32 = 0x01;
pub const SINGLE_LINK_RESET     : u32 = 0x02;
pub const SINGLE_BUFFER_RESET   : u32 = 0x04;
pub const SINGLE_CALIB_PULSE    : u32 = 0x08;
pub const SINGLE_CLEAR_FIFO     : u32 = 0x10;

pub const REG_CALIB_SETUP       : u32 = 2;
pub const CALIB_LENGTH_SHIFT    : u32 = 24; // [27:24] length of the calib pulse in bx
pub const CALIB_LENGTH_MASK     : u32 = 0x0F00_0000;
pub const CALIB_OFFSET_SHIFT    : u32 = 16; // [23:16] bx between calib pulse and L1A
pub const CALIB_OFFSET_MASK     : u32 = 0x00FF_0000;

pub const REG_SINGLE_ERROR_COUNTER : u32 = 4;
pub const REG_DOUBLE_ERROR_COUNTER : u32 = 5;
pub const REG_CMD_COUNTER_BASE     : u32 = 8; // one counter per command
pub const N_CMD_COUNTERS           : usize = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum FastCommand {
  L1a,
  LinkReset,
  BufferReset,
  CalibPulse,
  ClearFifo,
}

impl FastCommand {
  pub fn mask(&self) -> u32 {
    match self {
      FastCommand::L1a         => SINGLE_L1A,
      FastCommand::LinkReset   => SINGLE_LINK_RESET,
      FastCommand::BufferReset => SINGLE_BUFFER_RESET,
      FastCommand::CalibPulse  => SINGLE_CALIB_PULSE,
      FastCommand::ClearFifo   => SINGLE_CLEAR_FIFO,
    }
  }
}

impl fmt::Display for FastCommand {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      FastCommand::L1a         => "L1A",
      FastCommand::LinkReset   => "LinkReset",
      FastCommand::BufferReset => "BufferReset",
      FastCommand::CalibPulse  => "CalibPulse",
      FastCommand::ClearFifo   => "ClearFifo",
    };
    write!(f, "<FastCommand: {}>", repr)
  }
}

pub fn send_command(router : &mut TargetRouter, cmd : FastCommand) -> Result<(), BusError> {
  trace!("Sending {}", cmd);
  router.write_field(WishboneTarget::FastControl, REG_SINGLES, cmd.mask())
}

pub fn send_l1a(router : &mut TargetRouter) -> Result<(), BusError> {
  send_command(router, FastCommand::L1a)
}

pub fn link_reset(router : &mut TargetRouter) -> Result<(), BusError> {
  send_command(router, FastCommand::LinkReset)
}

pub fn buffer_reset(router : &mut TargetRouter) -> Result<(), BusError> {
  send_command(router, FastCommand::BufferReset)
}

pub fn calib_pulse(router : &mut TargetRouter) -> Result<(), BusError> {
  send_command(router, FastCommand::CalibPulse)
}

pub fn clear_run(router : &mut TargetRouter) -> Result<(), BusError> {
  send_command(router, FastCommand::ClearFifo)
}

/// Configure the calibration pulse, leaving the other
/// bits of the register alone. Values are truncated to
/// the width of their fields.
pub fn setup_calib(router : &mut TargetRouter, pulse_len : u32, l1a_offset : u32) -> Result<(), BusError> {
  if pulse_len > 0xF || l1a_offset > 0xFF {
    warn!("Calib setup out of range, will be truncated! length {} (max 15), offset {} (max 255)", pulse_len, l1a_offset);
  }
  let data = ((pulse_len & 0xF) << CALIB_LENGTH_SHIFT) | ((l1a_offset & 0xFF) << CALIB_OFFSET_SHIFT);
  router.rmw(WishboneTarget::FastControl, REG_CALIB_SETUP, data, CALIB_LENGTH_MASK | CALIB_OFFSET_MASK)
}

/// (pulse length, L1A offset)
pub fn get_calib_setup(router : &mut TargetRouter) -> Result<(u32, u32), BusError> {
  let value = router.read_field(WishboneTarget::FastControl, REG_CALIB_SETUP)?;
  Ok(((value & CALIB_LENGTH_MASK) >> CALIB_LENGTH_SHIFT,
      (value & CALIB_OFFSET_MASK) >> CALIB_OFFSET_SHIFT))
}

/// (single bit errors, double bit errors)
pub fn get_error_counters(router : &mut TargetRouter) -> Result<(u32, u32), BusError> {
  let single = router.read_field(WishboneTarget::FastControl, REG_SINGLE_ERROR_COUNTER)?;
  let double = router.read_field(WishboneTarget::FastControl, REG_DOUBLE_ERROR_COUNTER)?;
  Ok((single, double))
}

pub fn get_cmd_counters(router : &mut TargetRouter) -> Result<Vec<u32>, BusError> {
  router.read_block(WishboneTarget::FastControl, REG_CMD_COUNTER_BASE, N_CMD_COUNTERS)
}

#[cfg(test)]
mod test_fast_control {
  use super::*;
  use crate::simulated::SimulatedWishbone;

  #[test]
  fn calib_setup_rmw() {
    let mut bus = SimulatedWishbone::new();
    let addr = WishboneTarget::FastControl.base() + REG_CALIB_SETUP;
    bus.preset(addr, 0xF000_ABCD);
    {
      let mut router = TargetRouter::new(&mut bus);
      setup_calib(&mut router, 3, 0x22).unwrap();
      assert_eq!(get_calib_setup(&mut router), Ok((3, 0x22)));
    }
    assert_eq!(bus.peek(addr), 0xF322_ABCD);
  }

  #[test]
  fn commands_go_to_singles() {
    let mut bus = SimulatedWishbone::new();
    {
      let mut router = TargetRouter::new(&mut bus);
      send_l1a(&mut router).unwrap();
      calib_pulse(&mut router).unwrap();
      clear_run(&mut router).unwrap();
    }
    let singles = WishboneTarget::FastControl.base() + REG_SINGLES;
    assert_eq!(bus.write_log, vec![(singles, 0x01), (singles, 0x08), (singles, 0x10)]);
  }
}
