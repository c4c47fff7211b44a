//! The 40 word DAQ link frame of a HGCROC v3 half
//!
//! word 0      : header
//!               1111 | bx (12) | event (6) | orbit (3) | counter err |
//!               first quarter err | second quarter err | trail flag (4)
//! word 1      : common mode, 12 zero bits | cm0 (10) | cm1 (10)
//! word 2-19   : channels 0-17
//! word 20     : calib channel
//! word 21-38  : channels 18-35
//! word 39     : crc
//!
//! Leading idle words have to be trimmed before.

use std::fmt;

use crate::constants::{
  DAQ_LINK_FRAME_LEN,
  NCHANNELS,
  TRAIL_FLAG_FIRST,
  TRAIL_FLAG_NORMAL,
};
use crate::errors::DecodingError;
use crate::serialization::get_bits;
use crate::decoding::sample::Sample;

#[derive(Debug, Clone, PartialEq)]
pub struct DaqLinkFrame {
  pub bx                 : u16,
  pub event              : u8,
  pub orbit              : u8,
  pub counter_err        : bool,
  pub first_quarter_err  : bool,
  pub second_quarter_err : bool,
  pub first_event        : bool,
  /// the 4 leading header bits were not all set
  pub bad_marker         : bool,
  /// the trail flag was neither first nor normal event
  pub bad_trail_flag     : bool,
  /// upper 12 bits of the common mode word were not 0
  pub bad_common_mode    : bool,
  pub adc_cm0            : u16,
  pub adc_cm1            : u16,
  pub calib              : Sample,
  pub channels           : [Sample;NCHANNELS],
  pub crc                : u32,
}

impl DaqLinkFrame {

  pub fn new() -> Self {
    Self {
      bx                 : 0,
      event              : 0,
      orbit              : 0,
      counter_err        : false,
      first_quarter_err  : false,
      second_quarter_err : false,
      first_event        : false,
      bad_marker         : false,
      bad_trail_flag     : false,
      bad_common_mode    : false,
      adc_cm0            : 0,
      adc_cm1            : 0,
      calib              : Sample::default(),
      channels           : [Sample::default();NCHANNELS],
      crc                : 0,
    }
  }

  pub fn from_words(data : &[u32]) -> Result<Self, DecodingError> {
    if data.len() != DAQ_LINK_FRAME_LEN {
      if data.len() > DAQ_LINK_FRAME_LEN {
        error!("DAQ link frame with {} words, idle words need to be trimmed!", data.len());
        return Err(DecodingError::FramingError { found : data.len() as u32 });
      }
      return Err(DecodingError::Truncated { needed : DAQ_LINK_FRAME_LEN, available : data.len() });
    }
    let mut frame = Self::new();
    let header = data[0];
    if get_bits(header, 28, 4) != 0b1111 {
      warn!("Bad leading header bits {:04b}", get_bits(header, 28, 4));
      frame.bad_marker = true;
    }
    frame.bx                 = get_bits(header, 16, 12) as u16;
    frame.event              = get_bits(header, 10, 6)  as u8;
    frame.orbit              = get_bits(header, 7, 3)   as u8;
    frame.counter_err        = get_bits(header, 6, 1) == 1;
    frame.first_quarter_err  = get_bits(header, 5, 1) == 1;
    frame.second_quarter_err = get_bits(header, 4, 1) == 1;
    let trail_flag           = get_bits(header, 0, 4);
    frame.first_event        = trail_flag == TRAIL_FLAG_FIRST;
    if !frame.first_event && trail_flag != TRAIL_FLAG_NORMAL {
      warn!("Bad event header flag {:04b}", trail_flag);
      frame.bad_trail_flag = true;
    }

    let cm = data[1];
    if get_bits(cm, 20, 12) != 0 {
      warn!("Bad common mode leading bits {:012b}", get_bits(cm, 20, 12));
      frame.bad_common_mode = true;
    }
    frame.adc_cm0 = get_bits(cm, 10, 10) as u16;
    frame.adc_cm1 = get_bits(cm, 0, 10)  as u16;

    for ch in 0..18 {
      frame.channels[ch] = Sample::new(data[2 + ch]);
    }
    frame.calib = Sample::new(data[2 + 18]);
    for ch in 18..NCHANNELS {
      frame.channels[ch] = Sample::new(data[3 + ch]);
    }
    frame.crc = data[39];
    Ok(frame)
  }

  /// True if none of the error bits or markers is set
  pub fn is_clean(&self) -> bool {
    !(self.counter_err || self.first_quarter_err || self.second_quarter_err
      || self.bad_marker || self.bad_trail_flag || self.bad_common_mode)
  }
}

impl Default for DaqLinkFrame {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for DaqLinkFrame {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<DaqLinkFrame:");
    repr += &(format!("\n  bx          : {}", self.bx));
    repr += &(format!("\n  event       : {}", self.event));
    repr += &(format!("\n  orbit       : {}", self.orbit));
    repr += &(format!("\n  first event : {}", self.first_event));
    repr += &(format!("\n  cm0/cm1     : {}/{}", self.adc_cm0, self.adc_cm1));
    repr += &(format!("\n  clean       : {}>", self.is_clean()));
    write!(f, "{}", repr)
  }
}

#[cfg(test)]
mod test_daq_link_frame {
  use super::*;

  fn test_frame() -> Vec<u32> {
    let mut frame = vec![0xf00c26a5, 0x00022802];
    for ch in 0..18u32 {
      frame.push(ch);
    }
    // calib channel marked as TOT busy
    frame.push(0b01000000000000000000000000000000);
    for ch in 18..36u32 {
      frame.push(ch);
    }
    frame.push(0xe2378cb3);
    frame
  }

  #[test]
  fn simulated_frame() {
    let frame = DaqLinkFrame::from_words(&test_frame()).unwrap();
    assert_eq!(frame.bx, 12);
    assert_eq!(frame.event, 9);
    assert_eq!(frame.orbit, 5);
    assert!(frame.first_event);
    assert!(!frame.counter_err);
    assert!(frame.first_quarter_err);
    assert!(!frame.second_quarter_err);
    assert!(!frame.bad_marker);
    assert_eq!(frame.adc_cm0, 138);
    assert_eq!(frame.adc_cm1, 2);
    assert!(!frame.calib.tc());
    assert!(frame.calib.tp());
    assert_eq!(frame.calib.adc(), Some(0));
    assert_eq!(frame.calib.tot(), None);
    for (ch, sample) in frame.channels.iter().enumerate() {
      assert_eq!(sample.adc(), Some(0));
      assert_eq!(sample.tot(), None);
      assert_eq!(sample.toa(), ch as u16);
    }
    assert_eq!(frame.crc, 0xe2378cb3);
  }

  #[test]
  fn wrong_length() {
    let mut words = test_frame();
    words.pop();
    assert!(matches!(DaqLinkFrame::from_words(&words), Err(DecodingError::Truncated { .. })));
    words.push(0);
    words.push(0);
    assert!(matches!(DaqLinkFrame::from_words(&words), Err(DecodingError::FramingError { .. })));
  }
}
