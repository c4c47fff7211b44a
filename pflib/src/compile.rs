//! Settings <-> register values
//!
//! compile turns a set of named parameter values into the
//! smallest number of register writes, decompile reads the
//! registers back and recovers the named values.
//!
//! A compile call either applies all of its writes or tells
//! exactly which register failed and how many were applied
//! before. Everything which can be checked is checked before
//! the first write goes out.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use crate::register_maps::{
  LookupTable,
  RegisterLocation,
  RegisterMap,
  RegisterMapError,
  PAGE_SHIFT,
};
use crate::snapshot::RegisterSnapshot;
use crate::targets::{
  TargetRouter,
  WishboneTarget,
};
use crate::wishbone::BusError;

/// Address space of a single ROC within the I2C target
pub const ROC_ADDRESS_SPACE : u32 = 0x4000;

/// Number of ROC windows which fit into the I2C target
pub fn max_rocs() -> u32 {
  WishboneTarget::I2c.size() / ROC_ADDRESS_SPACE
}

/// page (or page pattern) -> parameter -> value
pub type PageSettings = BTreeMap<String, BTreeMap<String, u32>>;

/// page id -> register -> value
pub type PageRegisters = BTreeMap<u32, BTreeMap<u32, u32>>;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
  /// The page (pattern) does not match any page
  UnknownPage { page : String },
  UnknownParameter { page : String, name : String },
  ValueOutOfRange { page : String, name : String, value : u32, max : u32 },
  /// A register write failed, the preceding `applied`
  /// writes went through
  CommitError { page : u32, register : u32, applied : usize, source : BusError },
  /// A register could not be read, nothing has been written
  Bus(BusError),
  /// A register needed for a parameter is not in the input
  MissingRegister { page : u32, register : u32 },
  Map(RegisterMapError),
}

impl fmt::Display for CompileError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : String;
    match self {
      CompileError::UnknownPage { page } => {
        etype = format!("UnknownPage ({})", page);
      }
      CompileError::UnknownParameter { page, name } => {
        etype = format!("UnknownParameter ({}.{})", page, name);
      }
      CompileError::ValueOutOfRange { page, name, value, max } => {
        etype = format!("ValueOutOfRange ({}.{} = {} > {})", page, name, value, max);
      }
      CompileError::CommitError { page, register, applied, source } => {
        etype = format!("CommitError (page {} register {} after {} writes, {})", page, register, applied, source);
      }
      CompileError::Bus(err) => {
        etype = format!("Bus ({})", err);
      }
      CompileError::MissingRegister { page, register } => {
        etype = format!("MissingRegister (page {} register {})", page, register);
      }
      CompileError::Map(err) => {
        etype = format!("Map ({})", err);
      }
    }
    write!(f, "<CompileError: {}>", etype)
  }
}

impl Error for CompileError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      CompileError::CommitError { source, .. } => Some(source),
      CompileError::Bus(err) => Some(err),
      CompileError::Map(err) => Some(err),
      _ => None,
    }
  }
}

impl From<BusError> for CompileError {
  fn from(err : BusError) -> Self {
    CompileError::Bus(err)
  }
}

impl From<RegisterMapError> for CompileError {
  fn from(err : RegisterMapError) -> Self {
    CompileError::Map(err)
  }
}

/// Where the registers of one chip live on the bus
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TargetScope {
  pub target : WishboneTarget,
  /// local address of page 0, register 0
  pub base   : u32,
}

impl TargetScope {

  pub fn new(target : WishboneTarget, base : u32) -> Self {
    Self {
      target,
      base,
    }
  }

  /// The scope of the i-th ROC behind the I2C target
  pub fn roc(index : u32) -> Result<Self, BusError> {
    if index >= max_rocs() {
      error!("There is no room for ROC {} in {}, only {} ROCs fit!", index, WishboneTarget::I2c, max_rocs());
      return Err(BusError::BadAddress);
    }
    Ok(Self::new(WishboneTarget::I2c, index * ROC_ADDRESS_SPACE))
  }

  /// Local address (within the target) of a register.
  /// Not bounds checked, the router rejects addresses
  /// outside of the target.
  pub fn local(&self, page : u32, register : u32) -> u32 {
    self.base.wrapping_add(page.wrapping_shl(PAGE_SHIFT) | register)
  }
}

impl fmt::Display for TargetScope {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<TargetScope: {} + {:#x}>", self.target.name(), self.base)
  }
}

/// A single register update
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegisterWrite {
  pub page     : u32,
  pub register : u32,
  pub old      : u32,
  pub new      : u32,
}

/// What a compile did (or would do)
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct CommitPlan {
  pub writes   : Vec<RegisterWrite>,
  /// registers which already held the requested value
  pub n_elided : usize,
}

impl CommitPlan {

  pub fn new() -> Self {
    Self {
      writes   : Vec::new(),
      n_elided : 0,
    }
  }

  pub fn n_writes(&self) -> usize {
    self.writes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.writes.is_empty()
  }
}

impl fmt::Display for CommitPlan {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = format!("<CommitPlan: {} writes, {} elided", self.writes.len(), self.n_elided);
    for w in &self.writes {
      repr += &(format!("\n  page {:>3} reg {:>2} : {:#010x} -> {:#010x}", w.page, w.register, w.old, w.new));
    }
    repr += ">";
    write!(f, "{}", repr)
  }
}

/// Fields to place, grouped by (page, register)
type Staged = BTreeMap<(u32, u32), Vec<(RegisterLocation, u32)>>;

fn stage(staged     : &mut Staged,
         page_name  : &str,
         page_id    : u32,
         table      : &LookupTable,
         values     : &BTreeMap<String, u32>) -> Result<(), CompileError> {
  for (name, value) in values {
    let param = match table.get(name) {
      Some(p) => p,
      None => {
        return Err(CompileError::UnknownParameter {
          page : String::from(page_name),
          name : name.to_uppercase()
        });
      }
    };
    if !param.accepts(*value) {
      return Err(CompileError::ValueOutOfRange {
        page  : String::from(page_name),
        name  : param.name.clone(),
        value : *value,
        max   : param.max_value(),
      });
    }
    trace!("{}.{} = {} -> page {}", page_name, param.name, value, page_id);
    for (loc, field) in param.fields(*value) {
      staged.entry((page_id, loc.register)).or_default().push((loc, field));
    }
  }
  Ok(())
}

fn stage_settings(staged   : &mut Staged,
                  settings : &PageSettings,
                  map      : &RegisterMap) -> Result<(), CompileError> {
  // patterns first, so that settings for a named page
  // override those for a group of pages
  let (globs, named) : (Vec<_>, Vec<_>) = settings.iter().partition(|(pattern, _)| pattern.contains('*'));
  for (pattern, values) in globs.into_iter().chain(named) {
    let pages = map.matching_pages(pattern);
    if pages.is_empty() {
      return Err(CompileError::UnknownPage { page : pattern.clone() });
    }
    for (page_name, page_id, table) in pages {
      stage(staged, page_name, page_id, table, values)?;
    }
  }
  Ok(())
}

/// Current value of a register, from the snapshot if we
/// know it, otherwise from the bus
fn current_value(router   : &mut TargetRouter,
                 snapshot : &mut RegisterSnapshot,
                 scope    : &TargetScope,
                 page     : u32,
                 register : u32) -> Result<u32, BusError> {
  let local = scope.local(page, register);
  let addr  = router.address(scope.target, local)?;
  if let Some(value) = snapshot.get(addr) {
    return Ok(value);
  }
  let value = router.read_field(scope.target, local)?;
  snapshot.record(addr, value);
  Ok(value)
}

/// Compute the new register values and drop those which
/// would not change anything. Reads, but never writes.
fn plan(router   : &mut TargetRouter,
        snapshot : &mut RegisterSnapshot,
        scope    : &TargetScope,
        staged   : &Staged) -> Result<CommitPlan, CompileError> {
  let mut plan = CommitPlan::new();
  for ((page, register), fields) in staged {
    let old = match current_value(router, snapshot, scope, *page, *register) {
      Ok(value) => value,
      Err(err) => {
        error!("Reading page {} register {} failed! {}", page, register, err);
        snapshot.invalidate_target(scope.target);
        return Err(CompileError::Bus(err));
      }
    };
    let new = fields.iter().fold(old, |reg, (loc, field)| loc.insert(reg, *field));
    if new == old {
      plan.n_elided += 1;
    } else {
      plan.writes.push(RegisterWrite {
        page     : *page,
        register : *register,
        old,
        new,
      });
    }
  }
  Ok(plan)
}

fn commit(router   : &mut TargetRouter,
          snapshot : &mut RegisterSnapshot,
          scope    : &TargetScope,
          plan     : &CommitPlan) -> Result<(), CompileError> {
  for (applied, w) in plan.writes.iter().enumerate() {
    let local = scope.local(w.page, w.register);
    let result = router.address(scope.target, local)
      .and_then(|addr| router.write_field(scope.target, local, w.new).map(|_| addr));
    match result {
      Ok(addr) => {
        snapshot.record(addr, w.new);
      }
      Err(err) => {
        error!("Writing page {} register {} failed after {} writes! {}", w.page, w.register, applied, err);
        snapshot.invalidate_target(scope.target);
        return Err(CompileError::CommitError {
          page     : w.page,
          register : w.register,
          applied,
          source   : err,
        });
      }
    }
  }
  Ok(())
}

fn apply(router   : &mut TargetRouter,
         snapshot : &mut RegisterSnapshot,
         scope    : &TargetScope,
         staged   : &Staged) -> Result<CommitPlan, CompileError> {
  let plan = plan(router, snapshot, scope, staged)?;
  commit(router, snapshot, scope, &plan)?;
  debug!("Applied {} writes to {} ({} registers unchanged)", plan.n_writes(), scope, plan.n_elided);
  Ok(plan)
}

/// Apply settings (page pattern -> name -> value) to
/// the chip in scope.
pub fn compile(router   : &mut TargetRouter,
               snapshot : &mut RegisterSnapshot,
               scope    : &TargetScope,
               settings : &PageSettings,
               map      : &RegisterMap) -> Result<CommitPlan, CompileError> {
  let mut staged = Staged::new();
  stage_settings(&mut staged, settings, map)?;
  apply(router, snapshot, scope, &staged)
}

/// Apply values of a single table placed at page_id
pub fn compile_table(router   : &mut TargetRouter,
                     snapshot : &mut RegisterSnapshot,
                     scope    : &TargetScope,
                     page_id  : u32,
                     table    : &LookupTable,
                     values   : &BTreeMap<String, u32>) -> Result<CommitPlan, CompileError> {
  let mut staged = Staged::new();
  stage(&mut staged, table.name(), page_id, table, values)?;
  apply(router, snapshot, scope, &staged)
}

/// Compute what compile would write without writing
pub fn dry_run(router   : &mut TargetRouter,
               snapshot : &mut RegisterSnapshot,
               scope    : &TargetScope,
               settings : &PageSettings,
               map      : &RegisterMap) -> Result<CommitPlan, CompileError> {
  let mut staged = Staged::new();
  stage_settings(&mut staged, settings, map)?;
  plan(router, snapshot, scope, &staged)
}

/// Read back the values of all parameters of a table
pub fn decompile_table(router   : &mut TargetRouter,
                       snapshot : &mut RegisterSnapshot,
                       scope    : &TargetScope,
                       page_id  : u32,
                       table    : &LookupTable) -> Result<BTreeMap<String, u32>, CompileError> {
  let mut registers = BTreeMap::<u32, u32>::new();
  for register in table.registers() {
    match current_value(router, snapshot, scope, page_id, register) {
      Ok(value) => {
        registers.insert(register, value);
      }
      Err(err) => {
        error!("Reading page {} register {} failed! {}", page_id, register, err);
        snapshot.invalidate_target(scope.target);
        return Err(CompileError::Bus(err));
      }
    }
  }
  let mut values = BTreeMap::new();
  for param in table.parameters() {
    match param.assemble(|reg| registers.get(&reg).copied()) {
      Some(value) => {
        values.insert(param.name.clone(), value);
      }
      None => {
        // all registers of the table have been read above
        let register = param.registers().find(|r| !registers.contains_key(r)).unwrap_or(0);
        return Err(CompileError::MissingRegister { page : page_id, register });
      }
    }
  }
  Ok(values)
}

/// Read back the pages (or page patterns) from the chip
/// in scope. Never writes.
pub fn decompile(router   : &mut TargetRouter,
                 snapshot : &mut RegisterSnapshot,
                 scope    : &TargetScope,
                 map      : &RegisterMap,
                 pages    : &[&str]) -> Result<PageSettings, CompileError> {
  let mut settings = PageSettings::new();
  for pattern in pages {
    let matching = map.matching_pages(pattern);
    if matching.is_empty() {
      return Err(CompileError::UnknownPage { page : String::from(*pattern) });
    }
    for (page_name, page_id, table) in matching {
      let values = decompile_table(router, snapshot, scope, page_id, table)?;
      settings.insert(String::from(page_name), values);
    }
  }
  Ok(settings)
}

/// The register contents for settings, without a bus.
///
/// Registers start out as 0, so bits not covered by a
/// setting are 0.
pub fn compile_registers(settings : &PageSettings,
                         map      : &RegisterMap) -> Result<PageRegisters, CompileError> {
  let mut staged = Staged::new();
  stage_settings(&mut staged, settings, map)?;
  let mut registers = PageRegisters::new();
  for ((page, register), fields) in staged {
    let value = fields.iter().fold(0u32, |reg, (loc, field)| loc.insert(reg, *field));
    registers.entry(page).or_default().insert(register, value);
  }
  Ok(registers)
}

/// Recover the settings from register contents, without
/// a bus.
///
/// Pages without any register in the input are skipped.
/// If be_careful is set, a parameter missing one of its
/// registers is skipped with a warning, otherwise this is
/// an error.
pub fn decompile_registers(registers  : &PageRegisters,
                           map        : &RegisterMap,
                           be_careful : bool) -> Result<PageSettings, CompileError> {
  let mut settings = PageSettings::new();
  for (page_name, page_id, table) in map.pages() {
    let page_regs = match registers.get(&page_id) {
      Some(regs) => regs,
      None => {
        if be_careful {
          warn!("No registers for page {} ({}), can not deduce its parameters", page_name, page_id);
        }
        continue;
      }
    };
    let mut values = BTreeMap::new();
    for param in table.parameters() {
      match param.assemble(|reg| page_regs.get(&reg).copied()) {
        Some(value) => {
          values.insert(param.name.clone(), value);
        }
        None => {
          let register = param.registers().find(|r| !page_regs.contains_key(r)).unwrap_or(0);
          if be_careful {
            warn!("Skipping {}.{}, register {} is missing", page_name, param.name, register);
            continue;
          }
          return Err(CompileError::MissingRegister { page : page_id, register });
        }
      }
    }
    settings.insert(String::from(page_name), values);
  }
  Ok(settings)
}

#[cfg(test)]
mod test_compile {
  use super::*;
  use std::sync::Arc;
  use crate::register_maps::Parameter;
  use crate::simulated::{
    Fault,
    SimulatedWishbone,
  };

  fn values(pairs : &[(&str, u32)]) -> BTreeMap<String, u32> {
    pairs.iter().map(|(n, v)| (String::from(*n), *v)).collect()
  }

  fn threshold_table() -> LookupTable {
    LookupTable::new("TEST", vec![
      Parameter::new("threshold", 5, 3, 4, 0),
      Parameter::new("gain", 5, 8, 2, 0),
      Parameter::new("trim", 6, 0, 6, 0).with_limit(40),
      Parameter::spanning("wide", &[RegisterLocation::new(7, 4, 4), RegisterLocation::new(8, 0, 4)], 0),
    ]).unwrap()
  }

  fn test_map() -> RegisterMap {
    let table = Arc::new(threshold_table());
    let mut map = RegisterMap::new();
    map.add_page("PAGE_2", 2, table.clone()).unwrap();
    map.add_page("PAGE_3", 3, table.clone()).unwrap();
    map.add_page("OTHER", 9, table).unwrap();
    map
  }

  #[test]
  fn threshold_example() {
    let scope = TargetScope::roc(0).unwrap();
    let addr  = WishboneTarget::I2c.base() + scope.local(2, 5);
    let mut bus = SimulatedWishbone::new();
    bus.preset(addr, 0xFFFF_FF87);
    let mut snapshot = RegisterSnapshot::new();
    let table = threshold_table();
    {
      let mut router = TargetRouter::new(&mut bus);
      let plan = compile_table(&mut router, &mut snapshot, &scope, 2, &table, &values(&[("threshold", 9)])).unwrap();
      assert_eq!(plan.n_writes(), 1);
      assert_eq!(plan.writes[0].page, 2);
      assert_eq!(plan.writes[0].register, 5);
    }
    assert_eq!(bus.n_writes, 1);
    assert_eq!(bus.write_log[0].0, addr);
    // bits [6:3] = 1001, everything else untouched
    assert_eq!(bus.peek(addr), 0xFFFF_FFCF);
    let mut fresh = RegisterSnapshot::new();
    let mut router = TargetRouter::new(&mut bus);
    let back = decompile_table(&mut router, &mut fresh, &scope, 2, &table).unwrap();
    assert_eq!(back["THRESHOLD"], 9);
  }

  #[test]
  fn round_trip_and_idempotence() {
    let map = test_map();
    let scope = TargetScope::roc(1).unwrap();
    let mut bus = SimulatedWishbone::new();
    let mut snapshot = RegisterSnapshot::new();
    let mut settings = PageSettings::new();
    settings.insert(String::from("page_3"), values(&[("THRESHOLD", 13), ("gain", 2), ("trim", 40), ("wide", 0xA5)]));
    let mut router = TargetRouter::new(&mut bus);
    let first = compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap();
    assert_eq!(first.n_writes(), 4);
    let second = compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap();
    assert!(second.is_empty());
    assert_eq!(second.n_elided, 4);
    let mut fresh = RegisterSnapshot::new();
    let back = decompile(&mut router, &mut fresh, &scope, &map, &["PAGE_3"]).unwrap();
    assert_eq!(back["PAGE_3"], values(&[("THRESHOLD", 13), ("GAIN", 2), ("TRIM", 40), ("WIDE", 0xA5)]));
  }

  #[test]
  fn second_compile_does_not_touch_the_bus() {
    let map = test_map();
    let scope = TargetScope::roc(0).unwrap();
    let mut bus = SimulatedWishbone::new();
    let mut snapshot = RegisterSnapshot::new();
    let mut settings = PageSettings::new();
    settings.insert(String::from("PAGE_2"), values(&[("THRESHOLD", 3)]));
    {
      let mut router = TargetRouter::new(&mut bus);
      compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap();
    }
    bus.reset_counters();
    let mut router = TargetRouter::new(&mut bus);
    compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap();
    drop(router);
    assert_eq!(bus.n_reads, 0);
    assert_eq!(bus.n_writes, 0);
  }

  #[test]
  fn out_of_range_writes_nothing() {
    let map = test_map();
    let scope = TargetScope::roc(0).unwrap();
    let mut bus = SimulatedWishbone::new();
    let mut snapshot = RegisterSnapshot::new();
    let mut settings = PageSettings::new();
    settings.insert(String::from("PAGE_2"), values(&[("GAIN", 1), ("THRESHOLD", 16)]));
    {
      let mut router = TargetRouter::new(&mut bus);
      let err = compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap_err();
      assert!(matches!(err, CompileError::ValueOutOfRange { value : 16, max : 15, .. }));
      settings.insert(String::from("PAGE_2"), values(&[("TRIM", 41)]));
      let err = compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap_err();
      assert!(matches!(err, CompileError::ValueOutOfRange { value : 41, max : 40, .. }));
    }
    assert_eq!(bus.n_writes, 0);
    assert_eq!(bus.n_reads, 0);
  }

  #[test]
  fn unknown_names() {
    let map = test_map();
    let scope = TargetScope::roc(0).unwrap();
    let mut bus = SimulatedWishbone::new();
    let mut snapshot = RegisterSnapshot::new();
    let mut router = TargetRouter::new(&mut bus);
    let mut settings = PageSettings::new();
    settings.insert(String::from("NOPE"), values(&[("GAIN", 1)]));
    assert_eq!(compile(&mut router, &mut snapshot, &scope, &settings, &map),
               Err(CompileError::UnknownPage { page : String::from("NOPE") }));
    let mut settings = PageSettings::new();
    settings.insert(String::from("PAGE_2"), values(&[("nope", 1)]));
    assert_eq!(compile(&mut router, &mut snapshot, &scope, &settings, &map),
               Err(CompileError::UnknownParameter { page : String::from("PAGE_2"), name : String::from("NOPE") }));
  }

  #[test]
  fn shared_register_single_write() {
    let map = test_map();
    let scope = TargetScope::roc(0).unwrap();
    let addr  = WishboneTarget::I2c.base() + scope.local(2, 5);
    let mut bus = SimulatedWishbone::new();
    bus.preset(addr, 0xF000_0000);
    let mut snapshot = RegisterSnapshot::new();
    let mut settings = PageSettings::new();
    settings.insert(String::from("PAGE_2"), values(&[("THRESHOLD", 0xF), ("GAIN", 0b11)]));
    {
      let mut router = TargetRouter::new(&mut bus);
      compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap();
    }
    assert_eq!(bus.n_writes, 1);
    assert_eq!(bus.write_log, vec![(addr, 0xF000_0000 | (0b11 << 8) | (0xF << 3))]);
  }

  #[test]
  fn glob_pages_are_expanded() {
    let map = test_map();
    let scope = TargetScope::roc(0).unwrap();
    let mut bus = SimulatedWishbone::new();
    let mut snapshot = RegisterSnapshot::new();
    let mut settings = PageSettings::new();
    settings.insert(String::from("page_*"), values(&[("GAIN", 1)]));
    // the named page wins over the pattern
    settings.insert(String::from("PAGE_3"), values(&[("GAIN", 2)]));
    let mut router = TargetRouter::new(&mut bus);
    compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap();
    let back = decompile(&mut router, &mut snapshot, &scope, &map, &["PAGE_*", "OTHER"]).unwrap();
    assert_eq!(back["PAGE_2"]["GAIN"], 1);
    assert_eq!(back["PAGE_3"]["GAIN"], 2);
    assert_eq!(back["OTHER"]["GAIN"], 0);
  }

  #[test]
  fn failed_write_reports_register() {
    let map = test_map();
    let scope = TargetScope::roc(0).unwrap();
    let bad = WishboneTarget::I2c.base() + scope.local(2, 6);
    let mut bus = SimulatedWishbone::new();
    bus.inject(Fault::WriteTo(bad, BusError::Nack));
    let mut snapshot = RegisterSnapshot::new();
    let mut settings = PageSettings::new();
    settings.insert(String::from("PAGE_2"), values(&[("THRESHOLD", 1), ("TRIM", 2), ("WIDE", 3)]));
    let mut router = TargetRouter::new(&mut bus);
    let err = compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap_err();
    assert_eq!(err, CompileError::CommitError { page : 2, register : 6, applied : 1, source : BusError::Nack });
    assert!(snapshot.is_empty());
    // the whole operation can simply be repeated
    let plan = compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap();
    assert_eq!(plan.n_writes(), 3);
    assert_eq!(plan.n_elided, 1);
  }

  #[test]
  fn failed_read_writes_nothing() {
    let map = test_map();
    let scope = TargetScope::roc(0).unwrap();
    let mut bus = SimulatedWishbone::new();
    bus.inject(Fault::NextRead(BusError::Timeout));
    let mut snapshot = RegisterSnapshot::new();
    let mut settings = PageSettings::new();
    settings.insert(String::from("PAGE_2"), values(&[("THRESHOLD", 1)]));
    {
      let mut router = TargetRouter::new(&mut bus);
      let err = compile(&mut router, &mut snapshot, &scope, &settings, &map).unwrap_err();
      assert_eq!(err, CompileError::Bus(BusError::Timeout));
    }
    assert_eq!(bus.n_writes, 0);
  }

  #[test]
  fn dry_run_only_reads() {
    let map = test_map();
    let scope = TargetScope::roc(0).unwrap();
    let mut bus = SimulatedWishbone::new();
    let mut snapshot = RegisterSnapshot::new();
    let mut settings = PageSettings::new();
    settings.insert(String::from("PAGE_2"), values(&[("THRESHOLD", 1)]));
    {
      let mut router = TargetRouter::new(&mut bus);
      let plan = dry_run(&mut router, &mut snapshot, &scope, &settings, &map).unwrap();
      assert_eq!(plan.n_writes(), 1);
    }
    assert_eq!(bus.n_writes, 0);
  }

  #[test]
  fn registers_without_bus() {
    let map = test_map();
    let mut settings = PageSettings::new();
    settings.insert(String::from("PAGE_2"), values(&[("THRESHOLD", 9), ("WIDE", 0x5A)]));
    let registers = compile_registers(&settings, &map).unwrap();
    assert_eq!(registers[&2][&5], 9 << 3);
    assert_eq!(registers[&2][&7], 0xA << 4);
    assert_eq!(registers[&2][&8], 0x5);
    // register 6 is missing for TRIM
    assert!(matches!(decompile_registers(&registers, &map, false),
                     Err(CompileError::MissingRegister { page : 2, .. })));
    let back = decompile_registers(&registers, &map, true).unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(back["PAGE_2"]["THRESHOLD"], 9);
    assert_eq!(back["PAGE_2"]["WIDE"], 0x5A);
    assert!(!back["PAGE_2"].contains_key("TRIM"));
  }

  #[test]
  fn roc_windows_fit_the_i2c_target() {
    assert_eq!(max_rocs(), 64);
    let last = TargetScope::roc(max_rocs() - 1).unwrap();
    assert_eq!(last.base + ROC_ADDRESS_SPACE, WishboneTarget::I2c.size());
    assert_eq!(TargetScope::roc(max_rocs()), Err(BusError::BadAddress));
    assert_eq!(TargetScope::roc(u32::MAX), Err(BusError::BadAddress));
  }
}
