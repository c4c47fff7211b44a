//! Named bit fields of the ROC registers
//!
//! A ROC is configured through pages of registers. A
//! LookupTable names the bit fields of one kind of page
//! (e.g. the channel wise settings), a RegisterMap binds
//! page names and page ids of a chip to these tables.
//!
//! Tables are built once and are read-only afterwards.

use std::collections::{
  BTreeMap,
  BTreeSet,
};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

pub mod sipm_rocv2;

/// Number of registers addressable within one page
pub const PAGE_REGISTERS : u32 = 32;

/// Bits of the page local register index in a
/// ROC register address
pub const PAGE_SHIFT : u32 = 5;

/// Problems found while building a table or a map
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterMapError {
  /// A location is empty or does not fit into the register
  InvalidLocation { parameter : String },
  DuplicateParameter { parameter : String },
  DuplicatePage { page : String },
  /// A page refers to a table which does not exist
  UnknownTable { table : String },
  /// The default does not fit the field
  InvalidDefault { parameter : String },
}

impl fmt::Display for RegisterMapError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : String;
    match self {
      RegisterMapError::InvalidLocation { parameter } => {
        etype = format!("InvalidLocation ({})", parameter);
      }
      RegisterMapError::DuplicateParameter { parameter } => {
        etype = format!("DuplicateParameter ({})", parameter);
      }
      RegisterMapError::DuplicatePage { page } => {
        etype = format!("DuplicatePage ({})", page);
      }
      RegisterMapError::UnknownTable { table } => {
        etype = format!("UnknownTable ({})", table);
      }
      RegisterMapError::InvalidDefault { parameter } => {
        etype = format!("InvalidDefault ({})", parameter);
      }
    }
    write!(f, "<RegisterMapError: {}>", etype)
  }
}

impl Error for RegisterMapError {
}

/// The bits [min_bit, min_bit + n_bits) of a register
/// within a page
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegisterLocation {
  pub register : u32,
  pub min_bit  : u32,
  pub n_bits   : u32,
}

impl RegisterLocation {

  pub const fn new(register : u32, min_bit : u32, n_bits : u32) -> Self {
    Self {
      register,
      min_bit,
      n_bits,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.n_bits > 0
      && self.min_bit + self.n_bits <= 32
      && self.register < PAGE_REGISTERS
  }

  /// Right aligned mask of n_bits
  pub fn field_mask(&self) -> u32 {
    if self.n_bits >= 32 {
      u32::MAX
    } else {
      (1u32 << self.n_bits) - 1
    }
  }

  /// The bits occupied by this location, in place
  pub fn mask(&self) -> u32 {
    self.field_mask() << self.min_bit
  }

  pub fn extract(&self, register_value : u32) -> u32 {
    (register_value >> self.min_bit) & self.field_mask()
  }

  /// Replace the bits of this location in register_value
  pub fn insert(&self, register_value : u32, field : u32) -> u32 {
    (register_value & !self.mask()) | ((field & self.field_mask()) << self.min_bit)
  }
}

impl fmt::Display for RegisterLocation {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<RegisterLocation: reg {} bits [{}:{}]>",
           self.register,
           self.min_bit + self.n_bits - 1,
           self.min_bit)
  }
}

/// A named setting, possibly spread over several
/// registers. The low bits of the value live in the
/// first location.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Parameter {
  pub name      : String,
  pub default   : u32,
  pub locations : Vec<RegisterLocation>,
  /// Largest allowed value if that is below the
  /// width of the field
  pub limit     : Option<u32>,
}

impl Parameter {

  pub fn new(name : &str, register : u32, min_bit : u32, n_bits : u32, default : u32) -> Self {
    Self::spanning(name, &[RegisterLocation::new(register, min_bit, n_bits)], default)
  }

  pub fn spanning(name : &str, locations : &[RegisterLocation], default : u32) -> Self {
    Self {
      name      : name.to_uppercase(),
      default,
      locations : locations.to_vec(),
      limit     : None,
    }
  }

  pub fn with_limit(mut self, limit : u32) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn total_bits(&self) -> u32 {
    self.locations.iter().map(|l| l.n_bits).sum()
  }

  /// Largest value which can be written
  pub fn max_value(&self) -> u32 {
    let width_max = if self.total_bits() >= 32 {
      u32::MAX
    } else {
      (1u32 << self.total_bits()) - 1
    };
    match self.limit {
      Some(limit) => limit.min(width_max),
      None        => width_max,
    }
  }

  pub fn accepts(&self, value : u32) -> bool {
    value <= self.max_value()
  }

  /// Split a value into (register, field) pieces,
  /// low bits first
  pub fn fields(&self, value : u32) -> Vec<(RegisterLocation, u32)> {
    let mut pieces = Vec::with_capacity(self.locations.len());
    let mut shift  = 0u32;
    for loc in &self.locations {
      let field = if shift >= 32 { 0 } else { (value >> shift) & loc.field_mask() };
      pieces.push((*loc, field));
      shift += loc.n_bits;
    }
    pieces
  }

  /// Assemble the value from the register contents.
  /// None if one of the registers is not known.
  pub fn assemble<F : Fn(u32) -> Option<u32>>(&self, register_value : F) -> Option<u32> {
    let mut value = 0u32;
    let mut shift = 0u32;
    for loc in &self.locations {
      let reg = register_value(loc.register)?;
      if shift < 32 {
        value |= loc.extract(reg) << shift;
      }
      shift += loc.n_bits;
    }
    Some(value)
  }

  pub fn registers(&self) -> impl Iterator<Item = u32> + '_ {
    self.locations.iter().map(|l| l.register)
  }
}

impl fmt::Display for Parameter {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = format!("<Parameter: {} (default {})", self.name, self.default);
    for loc in &self.locations {
      repr += &(format!("\n  {}", loc));
    }
    if let Some(limit) = self.limit {
      repr += &(format!("\n  limit {}", limit));
    }
    repr += ">";
    write!(f, "{}", repr)
  }
}

/// All parameters of one kind of page
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
  name   : String,
  params : BTreeMap<String, Parameter>,
}

impl LookupTable {

  /// Build a table and check its parameters.
  pub fn new(name : &str, params : Vec<Parameter>) -> Result<Self, RegisterMapError> {
    let mut table = BTreeMap::new();
    for p in params {
      if p.locations.is_empty() || p.locations.iter().any(|l| !l.is_valid()) || p.total_bits() > 32 {
        return Err(RegisterMapError::InvalidLocation { parameter : p.name.clone() });
      }
      if p.default > p.max_value() {
        return Err(RegisterMapError::InvalidDefault { parameter : p.name.clone() });
      }
      if table.contains_key(&p.name) {
        return Err(RegisterMapError::DuplicateParameter { parameter : p.name.clone() });
      }
      table.insert(p.name.clone(), p);
    }
    Ok(Self {
      name   : name.to_uppercase(),
      params : table,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Case insensitive lookup
  pub fn get(&self, name : &str) -> Option<&Parameter> {
    match self.params.get(name) {
      Some(p) => Some(p),
      None    => self.params.get(&name.to_uppercase()),
    }
  }

  pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
    self.params.values()
  }

  /// Every register index used by a parameter of the table
  pub fn registers(&self) -> BTreeSet<u32> {
    self.params.values().flat_map(|p| p.registers()).collect()
  }

  pub fn defaults(&self) -> BTreeMap<String, u32> {
    self.params.values().map(|p| (p.name.clone(), p.default)).collect()
  }

  pub fn len(&self) -> usize {
    self.params.len()
  }

  pub fn is_empty(&self) -> bool {
    self.params.is_empty()
  }
}

impl fmt::Display for LookupTable {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<LookupTable: {} ({} parameters, {} registers)>",
           self.name, self.params.len(), self.registers().len())
  }
}

/// Page name -> (page id, table) for one chip type
#[derive(Debug, Clone, Default)]
pub struct RegisterMap {
  pages : BTreeMap<String, (u32, Arc<LookupTable>)>,
}

impl RegisterMap {

  pub fn new() -> Self {
    Self {
      pages : BTreeMap::new(),
    }
  }

  pub fn add_page(&mut self, name : &str, page_id : u32, table : Arc<LookupTable>) -> Result<(), RegisterMapError> {
    let name = name.to_uppercase();
    if self.pages.contains_key(&name) || self.page_name(page_id).is_some() {
      return Err(RegisterMapError::DuplicatePage { page : name });
    }
    self.pages.insert(name, (page_id, table));
    Ok(())
  }

  /// Exact (case insensitive) lookup of a page
  pub fn page(&self, name : &str) -> Option<(u32, &LookupTable)> {
    self.pages.get(&name.to_uppercase()).map(|(id, t)| (*id, t.as_ref()))
  }

  pub fn page_name(&self, page_id : u32) -> Option<&str> {
    self.pages.iter()
      .find(|(_, (id, _))| *id == page_id)
      .map(|(name, _)| name.as_str())
  }

  /// Pages selected by a name. A '*' matches every page 
  /// starting with what comes before it.
  pub fn matching_pages(&self, pattern : &str) -> Vec<(&str, u32, &LookupTable)> {
    let upper = pattern.to_uppercase();
    match upper.find('*').map(|pos| &upper[..pos]) {
      Some(prefix) => {
        self.pages.iter()
          .filter(|(name, _)| name.starts_with(prefix))
          .map(|(name, (id, t))| (name.as_str(), *id, t.as_ref()))
          .collect()
      }
      None => {
        self.pages.get_key_value(&upper)
          .map(|(name, (id, t))| vec![(name.as_str(), *id, t.as_ref())])
          .unwrap_or_default()
      }
    }
  }

  pub fn pages(&self) -> impl Iterator<Item = (&str, u32, &LookupTable)> {
    self.pages.iter().map(|(name, (id, t))| (name.as_str(), *id, t.as_ref()))
  }

  /// page -> parameter -> default value
  pub fn defaults(&self) -> BTreeMap<String, BTreeMap<String, u32>> {
    self.pages.iter()
      .map(|(name, (_, t))| (name.clone(), t.defaults()))
      .collect()
  }

  pub fn len(&self) -> usize {
    self.pages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pages.is_empty()
  }
}

impl fmt::Display for RegisterMap {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = format!("<RegisterMap: {} pages", self.pages.len());
    for (name, (id, table)) in &self.pages {
      repr += &(format!("\n  {:>20} : {:>3} -> {}", name, id, table.name()));
    }
    repr += ">";
    write!(f, "{}", repr)
  }
}
