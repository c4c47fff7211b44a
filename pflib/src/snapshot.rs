//! Session local cache of register values
//!
//! Every value we wrote or read during a session is 
//! remembered here, so that a read-modify-write does not 
//! have to go to the hardware again. Entries are dropped
//! as soon as a bus error tells us that the hardware 
//! state is not certain anymore.

use std::collections::HashMap;
use std::fmt;

use crate::targets::WishboneTarget;
use crate::wishbone::split_address;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterSnapshot {
  /// flattened bus address -> last known value
  values : HashMap<u32, u32>,
}

impl RegisterSnapshot {

  pub fn new() -> Self {
    Self {
      values : HashMap::new(),
    }
  }

  pub fn get(&self, addr : u32) -> Option<u32> {
    self.values.get(&addr).copied()
  }

  /// Remember the value of a register
  pub fn record(&mut self, addr : u32, value : u32) {
    self.values.insert(addr, value);
  }

  pub fn invalidate(&mut self, addr : u32) {
    self.values.remove(&addr);
  }

  /// Forget everything about the registers of a target
  pub fn invalidate_target(&mut self, target : WishboneTarget) {
    let before = self.values.len();
    self.values.retain(|addr, _| split_address(*addr).0 != target.id());
    debug!("Invalidated {} cached registers of {}", before - self.values.len(), target);
  }

  pub fn clear(&mut self) {
    self.values.clear();
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

impl fmt::Display for RegisterSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<RegisterSnapshot: {} registers>", self.values.len())
  }
}
