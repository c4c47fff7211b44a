//! A register file in memory
//!
//! Behaves like the Polarfire for a bus client, but
//! every register simply holds the last value written
//! (0 if never written). Transactions are counted and 
//! faults can be injected, which makes it the backend
//! of choice for tests and dry runs.

use std::collections::HashMap;
use std::fmt;

use crate::wishbone::{
  BusError,
  WishboneInterface,
};

/// When an injected fault fires
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Fault {
  /// the next read, whatever the address
  NextRead(BusError),
  /// the next write, whatever the address
  NextWrite(BusError),
  /// the next write to this address
  WriteTo(u32, BusError),
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedWishbone {
  pub registers : HashMap<u32, u32>,
  pub n_reads   : usize,
  pub n_writes  : usize,
  /// (address, value) of every write in order
  pub write_log : Vec<(u32, u32)>,
  pub n_resets  : usize,
  faults        : Vec<Fault>,
}

impl SimulatedWishbone {

  pub fn new() -> Self {
    Self {
      registers : HashMap::new(),
      n_reads   : 0,
      n_writes  : 0,
      write_log : Vec::new(),
      n_resets  : 0,
      faults    : Vec::new(),
    }
  }

  /// Set a register without counting it as a transaction
  pub fn preset(&mut self, addr : u32, value : u32) {
    self.registers.insert(addr, value);
  }

  pub fn peek(&self, addr : u32) -> u32 {
    *self.registers.get(&addr).unwrap_or(&0)
  }

  /// Arm a one-shot fault
  pub fn inject(&mut self, fault : Fault) {
    self.faults.push(fault);
  }

  pub fn reset_counters(&mut self) {
    self.n_reads  = 0;
    self.n_writes = 0;
    self.write_log.clear();
  }

  fn take_fault<F : Fn(&Fault) -> bool>(&mut self, matches : F) -> Option<BusError> {
    let idx = self.faults.iter().position(matches)?;
    match self.faults.remove(idx) {
      Fault::NextRead(err)   => Some(err),
      Fault::NextWrite(err)  => Some(err),
      Fault::WriteTo(_, err) => Some(err),
    }
  }
}

impl WishboneInterface for SimulatedWishbone {

  fn wb_read(&mut self, addr : u32) -> Result<u32, BusError> {
    if let Some(err) = self.take_fault(|f| matches!(f, Fault::NextRead(_))) {
      debug!("Injected read fault at {:#x} {}", addr, err);
      return Err(err);
    }
    self.n_reads += 1;
    Ok(self.peek(addr))
  }

  fn wb_write(&mut self, addr : u32, value : u32) -> Result<(), BusError> {
    if let Some(err) = self.take_fault(|f| match f {
      Fault::NextWrite(_)    => true,
      Fault::WriteTo(a, _)   => *a == addr,
      Fault::NextRead(_)     => false,
    }) {
      debug!("Injected write fault at {:#x} {}", addr, err);
      return Err(err);
    }
    trace!("Write {:#010x} to {:#x}", value, addr);
    self.n_writes += 1;
    self.write_log.push((addr, value));
    self.registers.insert(addr, value);
    Ok(())
  }

  fn wb_read_block(&mut self, addr : u32, nwords : usize) -> Result<Vec<u32>, BusError> {
    let mut data = Vec::<u32>::with_capacity(nwords);
    for k in 0..nwords as u32 {
      data.push(self.wb_read(addr + k)?);
    }
    Ok(data)
  }

  fn wb_reset(&mut self) -> Result<(), BusError> {
    self.n_resets += 1;
    Ok(())
  }
}

impl fmt::Display for SimulatedWishbone {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<SimulatedWishbone: {} registers, {} reads, {} writes>",
           self.registers.len(), self.n_reads, self.n_writes)
  }
}
