//! A single HGCROC behind the Polarfire
//!
//! The chip registers are reached through the I2C target,
//! each chip has its own window there. Parameter access
//! goes through the compiler, raw register access is
//! available for debugging.

use std::collections::BTreeMap;
use std::fmt;

use crate::compile::{
  self,
  CommitPlan,
  CompileError,
  PageRegisters,
  PageSettings,
  TargetScope,
};
use crate::register_maps::{
  sipm_rocv2,
  RegisterMap,
  PAGE_REGISTERS,
};
use crate::snapshot::RegisterSnapshot;
use crate::targets::TargetRouter;
use crate::wishbone::BusError;

/// The run mode bits live outside of the parameter pages
pub const RUN_MODE_PAGE     : u32 = 45;
pub const RUN_MODE_REGISTER : u32 = 0;
pub const MASK_RUN_MODE     : u32 = 0x3;

#[derive(Debug, Clone)]
pub struct Roc {
  pub index : u32,
  pub scope : TargetScope,
  map       : &'static RegisterMap,
}

impl Roc {

  /// The i-th chip with the HGCROC v2 register map.
  /// Fails if the chip's window does not fit into the
  /// I2C target.
  pub fn new(index : u32) -> Result<Self, CompileError> {
    let scope = TargetScope::roc(index)?;
    let map   = sipm_rocv2::register_map()?;
    Ok(Self::with_map(index, scope, map))
  }

  pub fn with_map(index : u32, scope : TargetScope, map : &'static RegisterMap) -> Self {
    Self {
      index,
      scope,
      map,
    }
  }

  pub fn register_map(&self) -> &RegisterMap {
    self.map
  }

  /// Read the first n registers of a page, bypassing
  /// the snapshot
  pub fn read_page(&self, router : &mut TargetRouter, page : u32, n : usize) -> Result<Vec<u32>, BusError> {
    if n > PAGE_REGISTERS as usize {
      error!("A page has only {} registers, requested {}", PAGE_REGISTERS, n);
      return Err(BusError::BadAddress);
    }
    router.read_block(self.scope.target, self.scope.local(page, 0), n)
  }

  pub fn get_value(&self, router : &mut TargetRouter, page : u32, register : u32) -> Result<u32, BusError> {
    router.read_field(self.scope.target, self.scope.local(page, register))
  }

  pub fn set_value(&self,
                   router   : &mut TargetRouter,
                   snapshot : &mut RegisterSnapshot,
                   page     : u32,
                   register : u32,
                   value    : u32) -> Result<(), BusError> {
    let local = self.scope.local(page, register);
    let addr  = router.address(self.scope.target, local)?;
    match router.write_field(self.scope.target, local, value) {
      Ok(_) => {
        snapshot.record(addr, value);
        Ok(())
      }
      Err(err) => {
        snapshot.invalidate_target(self.scope.target);
        Err(err)
      }
    }
  }

  /// Write raw register values, page by page
  pub fn set_registers(&self,
                       router    : &mut TargetRouter,
                       snapshot  : &mut RegisterSnapshot,
                       registers : &PageRegisters) -> Result<usize, CompileError> {
    let mut applied = 0usize;
    for (page, regs) in registers {
      for (register, value) in regs {
        if let Err(err) = self.set_value(router, snapshot, *page, *register, *value) {
          return Err(CompileError::CommitError {
            page     : *page,
            register : *register,
            applied,
            source   : err,
          });
        }
        applied += 1;
      }
    }
    Ok(applied)
  }

  pub fn set_run_mode(&self,
                      router   : &mut TargetRouter,
                      snapshot : &mut RegisterSnapshot,
                      active   : bool) -> Result<(), BusError> {
    let mut value = self.get_value(router, RUN_MODE_PAGE, RUN_MODE_REGISTER)? & !MASK_RUN_MODE;
    if active {
      value |= MASK_RUN_MODE;
    }
    info!("Setting ROC {} run mode to {}", self.index, active);
    self.set_value(router, snapshot, RUN_MODE_PAGE, RUN_MODE_REGISTER, value)
  }

  pub fn is_run_mode(&self, router : &mut TargetRouter) -> Result<bool, BusError> {
    Ok(self.get_value(router, RUN_MODE_PAGE, RUN_MODE_REGISTER)? & MASK_RUN_MODE != 0)
  }

  /// Names of the parameters of a page
  pub fn parameters(&self, page : &str) -> Option<Vec<String>> {
    self.map.page(page).map(|(_, table)| {
      table.parameters().map(|p| p.name.clone()).collect()
    })
  }

  pub fn defaults(&self) -> PageSettings {
    self.map.defaults()
  }

  pub fn apply_parameters(&self,
                          router   : &mut TargetRouter,
                          snapshot : &mut RegisterSnapshot,
                          settings : &PageSettings) -> Result<CommitPlan, CompileError> {
    debug!("Applying parameters for {} pages to ROC {}", settings.len(), self.index);
    compile::compile(router, snapshot, &self.scope, settings, self.map)
  }

  /// The writes apply_parameters would do, nothing is written
  pub fn plan_parameters(&self,
                         router   : &mut TargetRouter,
                         snapshot : &mut RegisterSnapshot,
                         settings : &PageSettings) -> Result<CommitPlan, CompileError> {
    compile::dry_run(router, snapshot, &self.scope, settings, self.map)
  }

  pub fn apply_parameter(&self,
                         router   : &mut TargetRouter,
                         snapshot : &mut RegisterSnapshot,
                         page     : &str,
                         name     : &str,
                         value    : u32) -> Result<CommitPlan, CompileError> {
    let mut settings = PageSettings::new();
    settings.insert(String::from(page), BTreeMap::from([(String::from(name), value)]));
    self.apply_parameters(router, snapshot, &settings)
  }

  /// Current values of all parameters of the chip
  pub fn dump_settings(&self,
                       router   : &mut TargetRouter,
                       snapshot : &mut RegisterSnapshot) -> Result<PageSettings, CompileError> {
    compile::decompile(router, snapshot, &self.scope, self.map, &["*"])
  }

  /// Raw contents of every known page
  pub fn dump_registers(&self, router : &mut TargetRouter) -> Result<PageRegisters, BusError> {
    let mut registers = PageRegisters::new();
    for (_, page_id, _) in self.map.pages() {
      let values = self.read_page(router, page_id, PAGE_REGISTERS as usize)?;
      registers.insert(page_id, values.into_iter().enumerate().map(|(k, v)| (k as u32, v)).collect());
    }
    Ok(registers)
  }
}

impl fmt::Display for Roc {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<Roc: {} at {}>", self.index, self.scope)
  }
}

#[cfg(test)]
mod test_roc {
  use super::*;
  use crate::compile::max_rocs;
  use crate::simulated::{
    Fault,
    SimulatedWishbone,
  };
  use crate::targets::WishboneTarget;

  #[test]
  fn index_outside_of_i2c_target() {
    assert!(Roc::new(max_rocs() - 1).is_ok());
    for index in [max_rocs(), 64, 1 << 18, u32::MAX] {
      assert!(matches!(Roc::new(index), Err(CompileError::Bus(BusError::BadAddress))), "ROC {}", index);
    }
  }

  #[test]
  fn raw_registers_in_page_order() {
    let roc = Roc::new(3).unwrap();
    let mut bus = SimulatedWishbone::new();
    let mut registers = PageRegisters::new();
    registers.insert(45, BTreeMap::from([(0, 0x3), (4, 0x11)]));
    registers.insert(261, BTreeMap::from([(2, 0x7)]));
    let mut snapshot = RegisterSnapshot::new();
    {
      let mut router = TargetRouter::new(&mut bus);
      assert_eq!(roc.set_registers(&mut router, &mut snapshot, &registers).unwrap(), 3);
    }
    let base = WishboneTarget::I2c.base() + 3 * 0x4000;
    assert_eq!(bus.write_log, vec![(base + (45 << 5),      0x3),
                                   (base + (45 << 5) + 4,  0x11),
                                   (base + (261 << 5) + 2, 0x7)]);
    assert_eq!(snapshot.get(base + (261 << 5) + 2), Some(0x7));
  }

  #[test]
  fn raw_register_failure_reports_progress() {
    let roc = Roc::new(0).unwrap();
    let mut bus = SimulatedWishbone::new();
    let failing = WishboneTarget::I2c.base() + (261 << 5) + 2;
    bus.inject(Fault::WriteTo(failing, BusError::Timeout));
    let mut registers = PageRegisters::new();
    registers.insert(45, BTreeMap::from([(0, 0x3), (4, 0x11)]));
    registers.insert(261, BTreeMap::from([(2, 0x7), (3, 0x8)]));
    let mut snapshot = RegisterSnapshot::new();
    {
      let mut router = TargetRouter::new(&mut bus);
      match roc.set_registers(&mut router, &mut snapshot, &registers) {
        Err(CompileError::CommitError { page, register, applied, source }) => {
          assert_eq!((page, register, applied), (261, 2, 2));
          assert_eq!(source, BusError::Timeout);
        }
        other => panic!("Expected a CommitError, got {:?}", other),
      }
    }
    // nothing after the failing register is written
    assert_eq!(bus.n_writes, 2);
    assert_eq!(bus.peek(failing + 1), 0);
  }

  #[test]
  fn parameters_land_in_the_chip_window() {
    let roc = Roc::new(2).unwrap();
    let mut bus = SimulatedWishbone::new();
    let mut snapshot = RegisterSnapshot::new();
    {
      let mut router = TargetRouter::new(&mut bus);
      let err = roc.apply_parameter(&mut router, &mut snapshot, "channel_0", "trim_inv", 0);
      assert!(matches!(err, Err(CompileError::UnknownParameter { .. })));
    }
    let mut router = TargetRouter::new(&mut bus);
    let plan = roc.apply_parameter(&mut router, &mut snapshot, "CHANNEL_0", "INPUTDAC", 5).unwrap();
    assert_eq!(plan.n_writes(), 1);
    drop(router);
    // CHANNEL_0 is page 261, INPUTDAC sits in register 0
    let addr = WishboneTarget::I2c.base() + 2 * 0x4000 + (261 << 5);
    assert_eq!(bus.peek(addr), 5);
  }

  #[test]
  fn run_mode_keeps_other_bits() {
    let roc = Roc::new(0).unwrap();
    let mut bus = SimulatedWishbone::new();
    let addr = WishboneTarget::I2c.base() + (RUN_MODE_PAGE << 5);
    bus.preset(addr, 0xF0);
    let mut snapshot = RegisterSnapshot::new();
    let mut router = TargetRouter::new(&mut bus);
    roc.set_run_mode(&mut router, &mut snapshot, true).unwrap();
    assert!(roc.is_run_mode(&mut router).unwrap());
    roc.set_run_mode(&mut router, &mut snapshot, false).unwrap();
    assert!(!roc.is_run_mode(&mut router).unwrap());
    drop(router);
    assert_eq!(bus.peek(addr), 0xF0);
  }

  #[test]
  fn dump_after_apply() {
    let roc = Roc::new(1).unwrap();
    let mut bus = SimulatedWishbone::new();
    let mut snapshot = RegisterSnapshot::new();
    let mut router = TargetRouter::new(&mut bus);
    let mut settings = PageSettings::new();
    settings.insert(String::from("DIGITAL_HALF_*"), BTreeMap::from([(String::from("L1OFFSET"), 300)]));
    roc.apply_parameters(&mut router, &mut snapshot, &settings).unwrap();
    let mut fresh = RegisterSnapshot::new();
    let dumped = roc.dump_settings(&mut router, &mut fresh).unwrap();
    assert_eq!(dumped.len(), roc.register_map().len());
    assert_eq!(dumped["DIGITAL_HALF_0"]["L1OFFSET"], 300);
    assert_eq!(dumped["DIGITAL_HALF_1"]["L1OFFSET"], 300);
    assert_eq!(dumped["TOP"]["EN_PLL"], 0);
    let registers = roc.dump_registers(&mut router).unwrap();
    assert_eq!(registers[&299][&2], 300 & 0xFF);
    assert_eq!(registers[&299][&1], 1 << 7);
    assert!(roc.read_page(&mut router, 0, 33).is_err());
  }
}
