//! A single channel sample word of the HGCROC
//!
//! The meaning of the two upper 10bit fields depends
//! on the two flags Tc (bit 31) and Tp (bit 30):
//!
//! | Tc | Tp | [29:20] | [19:10] | [9:0] |
//! |----|----|---------|---------|-------|
//! | 0  | 0  | adc_tm1 | adc     | toa   |
//! | 0  | 1  | adc_tm1 | adc     | toa   | (tot busy)
//! | 1  | 0  | adc     | tot     | toa   | (characterization)
//! | 1  | 1  | adc_tm1 | tot     | toa   |

use std::fmt;

use crate::serialization::get_bits;

/// The readout mode of a channel, as encoded 
/// by the Tc/Tp flags
#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize)]
pub enum ChannelMode {
  /// ADC measurement, no TOT
  Adc,
  /// ADC measurement, TOT circuit still busy
  TotBusy,
  /// ADC and TOT of the same bunch crossing
  Characterization,
  /// TOT measurement, ADC saturated
  Tot,
}

impl fmt::Display for ChannelMode {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      ChannelMode::Adc              => "Adc",
      ChannelMode::TotBusy          => "TotBusy",
      ChannelMode::Characterization => "Characterization",
      ChannelMode::Tot              => "Tot",
    };
    write!(f, "<ChannelMode: {}>", repr)
  }
}

/// Wrapper around a raw channel word
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Sample {
  pub word : u32,
}

impl Sample {

  pub fn new(word : u32) -> Self {
    Self {
      word
    }
  }

  /// Pack the individual measurements into a sample word.
  ///
  /// Fields which do not exist in the mode given by tc/tp 
  /// are ignored, missing values are packed as 0. Values 
  /// are truncated to 10 bits.
  pub fn from_unpacked(tc      : bool,
                       tp      : bool,
                       adc_tm1 : Option<u16>,
                       adc     : Option<u16>,
                       tot     : Option<u16>,
                       toa     : Option<u16>) -> Self {
    let (upper, middle) = match (tc, tp) {
      (false, _   ) => (adc_tm1, adc),
      (true, false) => (adc, tot),
      (true, true ) => (adc_tm1, tot),
    };
    let upper  = upper.unwrap_or(0)  as u32 & 0x3ff;
    let middle = middle.unwrap_or(0) as u32 & 0x3ff;
    let toa    = toa.unwrap_or(0)    as u32 & 0x3ff;
    let word = (tc as u32) << 31
             | (tp as u32) << 30
             | upper  << 20
             | middle << 10
             | toa;
    Self::new(word)
  }

  pub fn tc(&self) -> bool {
    get_bits(self.word, 31, 1) == 1
  }

  pub fn tp(&self) -> bool {
    get_bits(self.word, 30, 1) == 1
  }

  pub fn mode(&self) -> ChannelMode {
    match (self.tc(), self.tp()) {
      (false, false) => ChannelMode::Adc,
      (false, true ) => ChannelMode::TotBusy,
      (true,  false) => ChannelMode::Characterization,
      (true,  true ) => ChannelMode::Tot,
    }
  }

  pub fn toa(&self) -> u16 {
    get_bits(self.word, 0, 10) as u16
  }

  /// The ADC of the previous bunch crossing,
  /// not available in characterization mode
  pub fn adc_tm1(&self) -> Option<u16> {
    if self.tc() && !self.tp() {
      return None;
    }
    Some(get_bits(self.word, 20, 10) as u16)
  }

  pub fn adc(&self) -> Option<u16> {
    if !self.tc() {
      Some(get_bits(self.word, 10, 10) as u16)
    } else if !self.tp() {
      Some(get_bits(self.word, 20, 10) as u16)
    } else {
      None
    }
  }

  pub fn tot(&self) -> Option<u16> {
    if self.tc() {
      Some(get_bits(self.word, 10, 10) as u16)
    } else {
      None
    }
  }
}

impl fmt::Display for Sample {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<Sample: {:#010x} Tc {} Tp {} adc_tm1 {:?} adc {:?} tot {:?} toa {}>",
           self.word, self.tc(), self.tp(), self.adc_tm1(), self.adc(), self.tot(), self.toa())
  }
}

/// One decoded channel of a RocPacket
#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize)]
pub struct ChannelRecord {
  /// channel number 0-35
  pub channel : u8,
  /// the raw word as it was read out
  pub word    : u32,
  pub mode    : ChannelMode,
  pub adc_tm1 : Option<u16>,
  pub adc     : Option<u16>,
  pub tot     : Option<u16>,
  pub toa     : u16,
}

impl ChannelRecord {
  pub fn new(channel : u8, word : u32) -> Self {
    let sample = Sample::new(word);
    Self {
      channel,
      word,
      mode    : sample.mode(),
      adc_tm1 : sample.adc_tm1(),
      adc     : sample.adc(),
      tot     : sample.tot(),
      toa     : sample.toa(),
    }
  }

  pub fn sample(&self) -> Sample {
    Sample::new(self.word)
  }
}

impl fmt::Display for ChannelRecord {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<ChannelRecord: ch {:02} {} adc {:?} tot {:?} toa {}>",
           self.channel, self.mode, self.adc, self.tot, self.toa)
  }
}
