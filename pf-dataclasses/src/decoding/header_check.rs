//! Header checks of decoded events
//!
//! These are derived from the decoded data and are not
//! part of the wire format. A flagged block is still
//! decoded, the flags only tell which header 
//! invariants did not hold.

use std::fmt;

use crate::decoding::roc_packet::RocPacket;
use crate::decoding::super_packet::SuperPacket;

/// Default acceptable fraction of bad headers (or idles)
/// per link
pub const DEFAULT_HEADER_THRESHOLD : f64 = 0.05;

/// Bit flags for a single block (link or sample)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct HeaderFlags(pub u8);

impl HeaderFlags {
  /// BX header word does not carry the 0xAA pattern
  pub const BAD_BX_HEADER   : HeaderFlags = HeaderFlags(0x01);
  /// Full link without the idle word at its end
  pub const BAD_IDLE        : HeaderFlags = HeaderFlags(0x02);
  /// the ROC bunch crossing does not match the 
  /// one of the enclosing Polarfire packet
  pub const BX_MISMATCH     : HeaderFlags = HeaderFlags(0x04);
  /// declared and available length disagree
  pub const LENGTH_MISMATCH : HeaderFlags = HeaderFlags(0x08);
  /// the link did not send any data
  pub const EMPTY_LINK      : HeaderFlags = HeaderFlags(0x10);
  /// the fpga id differs from the one of the SuperPacket
  pub const FPGA_MISMATCH   : HeaderFlags = HeaderFlags(0x20);

  const NAMES : [(HeaderFlags, &'static str);6] = [
    (HeaderFlags::BAD_BX_HEADER,   "BAD_BX_HEADER"),
    (HeaderFlags::BAD_IDLE,        "BAD_IDLE"),
    (HeaderFlags::BX_MISMATCH,     "BX_MISMATCH"),
    (HeaderFlags::LENGTH_MISMATCH, "LENGTH_MISMATCH"),
    (HeaderFlags::EMPTY_LINK,      "EMPTY_LINK"),
    (HeaderFlags::FPGA_MISMATCH,   "FPGA_MISMATCH"),
  ];

  pub fn empty() -> Self {
    HeaderFlags(0)
  }

  pub fn is_empty(&self) -> bool {
    self.0 == 0
  }

  pub fn contains(&self, other : HeaderFlags) -> bool {
    (self.0 & other.0) == other.0
  }

  pub fn insert(&mut self, other : HeaderFlags) {
    self.0 |= other.0;
  }

  pub fn names(&self) -> Vec<&'static str> {
    HeaderFlags::NAMES.iter()
      .filter(|(flag, _)| self.contains(*flag))
      .map(|(_, name)| *name)
      .collect()
  }
}

impl fmt::Display for HeaderFlags {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    if self.is_empty() {
      return write!(f, "<HeaderFlags: OK>");
    }
    write!(f, "<HeaderFlags: {}>", self.names().join("|"))
  }
}

/// Header statistics of a single link
#[derive(Debug, Copy, Clone, PartialEq, Default, serde::Serialize)]
pub struct HeaderStatus {
  pub link             : usize,
  pub n_good_bxheaders : usize,
  pub n_bad_bxheaders  : usize,
  pub n_good_idles     : usize,
  pub n_bad_idles      : usize,
  pub n_bx_mismatch    : usize,
}

impl HeaderStatus {

  pub fn new(link : usize) -> Self {
    Self {
      link,
      ..Default::default()
    }
  }

  /// Fraction of bad BX headers, -1 if 
  /// no headers have been seen
  pub fn percent_bad_headers(&self) -> f64 {
    let num_headers = self.n_good_bxheaders + self.n_bad_bxheaders;
    if num_headers > 0 {
      return self.n_bad_bxheaders as f64 / num_headers as f64;
    }
    -1.0
  }

  /// Fraction of bad idles, -1 if 
  /// no idles have been seen
  pub fn percent_bad_idles(&self) -> f64 {
    let num_idles = self.n_good_idles + self.n_bad_idles;
    if num_idles > 0 {
      return self.n_bad_idles as f64 / num_idles as f64;
    }
    -1.0
  }

  /// Count the headers of a link packet. Packets 
  /// which carry nothing beyond the Polarfire words 
  /// are not counted.
  pub fn update(&mut self, packet : &RocPacket) {
    if packet.length <= 2 {
      return;
    }
    if packet.good_bxheader() {
      self.n_good_bxheaders += 1;
    } else {
      self.n_bad_bxheaders += 1;
    }
    if packet.good_idle() {
      self.n_good_idles += 1;
    } else {
      self.n_bad_idles += 1;
    }
    if packet.flags.contains(HeaderFlags::BX_MISMATCH) {
      self.n_bx_mismatch += 1;
    }
  }

  /// A link is acceptable if neither its fraction of bad
  /// BX headers nor its fraction of bad idles exceeds
  /// threshold (0..1)
  pub fn is_acceptable(&self, threshold : f64) -> bool {
    if self.percent_bad_headers() > threshold {
      warn!("Link {} has bad headers! {:.2} %", self.link, self.percent_bad_headers()*100.0);
      return false;
    }
    if self.percent_bad_idles() > threshold {
      warn!("Link {} has bad idles! {:.2} %", self.link, self.percent_bad_idles()*100.0);
      return false;
    }
    true
  }
}

impl fmt::Display for HeaderStatus {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<HeaderStatus:");
    repr += &(format!("\n  link           : {}", self.link));
    repr += &(format!("\n  bx headers     : {} good / {} bad", self.n_good_bxheaders, self.n_bad_bxheaders));
    repr += &(format!("\n  idles          : {} good / {} bad", self.n_good_idles, self.n_bad_idles));
    repr += &(format!("\n  bx mismatches  : {}>", self.n_bx_mismatch));
    write!(f, "{}", repr)
  }
}

/// A block which did not pass all header checks
#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize)]
pub struct FlaggedBlock {
  pub sample : usize,
  /// None if the flags belong to the sample itself
  pub link   : Option<usize>,
  pub flags  : HeaderFlags,
}

/// Aggregated header checks, either of a single
/// event or of many events
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct HeaderCheckResults {
  pub res     : Vec<HeaderStatus>,
  pub flagged : Vec<FlaggedBlock>,
}

impl HeaderCheckResults {

  pub fn new() -> Self {
    Self {
      res     : Vec::new(),
      flagged : Vec::new(),
    }
  }

  /// Results for a fixed set of links, as used when
  /// checking a running DAQ
  pub fn for_links(nlinks : usize) -> Self {
    let mut results = Self::new();
    for link in 0..nlinks {
      results.res.push(HeaderStatus::new(link));
    }
    results
  }

  fn status_mut(&mut self, link : usize) -> &mut HeaderStatus {
    while self.res.len() <= link {
      let next = self.res.len();
      self.res.push(HeaderStatus::new(next));
    }
    &mut self.res[link]
  }

  /// Record the outcome of one link of one sample
  pub fn record_link(&mut self, sample : usize, packet : &RocPacket) {
    self.status_mut(packet.link).update(packet);
    if !packet.flags.is_empty() {
      self.flagged.push(FlaggedBlock {
        sample,
        link  : Some(packet.link),
        flags : packet.flags,
      });
    }
  }

  pub fn record_sample(&mut self, sample : usize, flags : HeaderFlags) {
    if !flags.is_empty() {
      self.flagged.push(FlaggedBlock {
        sample,
        link : None,
        flags,
      });
    }
  }

  /// Add all links of all samples of an event
  pub fn add_event(&mut self, event : &SuperPacket) {
    for (isample, sample) in event.samples.iter().enumerate() {
      self.record_sample(isample, sample.flags);
      for link in &sample.links {
        self.record_link(isample, link);
      }
    }
  }

  /// True if no block has been flagged
  pub fn all_good(&self) -> bool {
    self.flagged.is_empty()
  }

  /// Flags of a specific link in a specific sample
  pub fn flags_for(&self, sample : usize, link : usize) -> HeaderFlags {
    let mut flags = HeaderFlags::empty();
    for block in &self.flagged {
      if block.sample == sample && block.link == Some(link) {
        flags.insert(block.flags);
      }
    }
    flags
  }

  pub fn is_acceptable(&self, threshold : f64) -> bool {
    for status in &self.res {
      debug!("Testing link {}...", status.link);
      if !status.is_acceptable(threshold) {
        return false;
      }
    }
    true
  }

  /// Check with an individual threshold per link
  pub fn is_acceptable_per_link(&self, thresholds : &[f64]) -> bool {
    for (status, threshold) in self.res.iter().zip(thresholds.iter()) {
      if !status.is_acceptable(*threshold) {
        return false;
      }
    }
    true
  }
}

impl fmt::Display for HeaderCheckResults {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<HeaderCheckResults:");
    for status in &self.res {
      repr += &(format!("\n  link {:02} : bx headers {}/{} idles {}/{} bx mismatch {}",
                        status.link,
                        status.n_good_bxheaders,
                        status.n_good_bxheaders + status.n_bad_bxheaders,
                        status.n_good_idles,
                        status.n_good_idles + status.n_bad_idles,
                        status.n_bx_mismatch));
    }
    repr += &(format!("\n  {} flagged blocks>", self.flagged.len()));
    write!(f, "{}", repr)
  }
}

#[cfg(test)]
mod test_header_check {
  use super::*;

  #[test]
  fn flags_accumulate() {
    let mut flags = HeaderFlags::empty();
    assert!(flags.is_empty());
    flags.insert(HeaderFlags::BX_MISMATCH);
    flags.insert(HeaderFlags::BAD_IDLE);
    assert!(flags.contains(HeaderFlags::BX_MISMATCH));
    assert!(!flags.contains(HeaderFlags::BAD_BX_HEADER));
    assert_eq!(flags.names(), vec!["BAD_IDLE", "BX_MISMATCH"]);
  }

  #[test]
  fn percentages_without_data() {
    let status = HeaderStatus::new(3);
    assert_eq!(status.percent_bad_headers(), -1.0);
    assert_eq!(status.percent_bad_idles(), -1.0);
    assert!(status.is_acceptable(0.0));
  }

  #[test]
  fn acceptance_threshold() {
    let mut status = HeaderStatus::new(0);
    status.n_good_bxheaders = 3;
    status.n_bad_bxheaders  = 1;
    status.n_good_idles     = 4;
    assert_eq!(status.percent_bad_headers(), 0.25);
    assert!(status.is_acceptable(0.3));
    assert!(!status.is_acceptable(0.2));
  }

  #[test]
  fn all_bad_link_fails_at_default() {
    let mut status = HeaderStatus::new(2);
    status.n_bad_bxheaders = 100;
    status.n_bad_idles     = 100;
    assert_eq!(status.percent_bad_headers(), 1.0);
    assert!(!status.is_acceptable(DEFAULT_HEADER_THRESHOLD));
    let mut results = HeaderCheckResults::for_links(4);
    assert!(results.is_acceptable(DEFAULT_HEADER_THRESHOLD));
    results.res[2] = status;
    assert!(!results.is_acceptable(DEFAULT_HEADER_THRESHOLD));
  }

  #[test]
  fn results_for_fixed_links() {
    let results = HeaderCheckResults::for_links(3);
    assert_eq!(results.res.len(), 3);
    for (k, status) in results.res.iter().enumerate() {
      assert_eq!(status.link, k);
      assert_eq!(status.percent_bad_headers(), -1.0);
    }
    assert!(results.all_good());
  }

  #[test]
  fn per_link_thresholds() {
    let mut results = HeaderCheckResults::for_links(2);
    results.res[0].n_good_bxheaders = 9;
    results.res[0].n_bad_bxheaders  = 1;
    results.res[1].n_good_bxheaders = 10;
    // link 0 has 10% bad headers
    assert!(results.is_acceptable_per_link(&[0.2, 0.0]));
    assert!(!results.is_acceptable_per_link(&[0.05, 0.2]));
    assert!(!results.is_acceptable(0.05));
    assert!(results.is_acceptable(0.1));
  }
}
