//! Link level data of a single ROC half
//!
//! The Polarfire prepends two words to the data of
//! each link. The first carries the link id and the crc
//! flag, together with the second word the lower 39 bits
//! form the readout map which tells which ROC words 
//! were actually read out:
//!
//! bit 0      : BX header
//! bit 1-18   : channels 0-17
//! bit 19, 20 : common mode, calib channel
//! bit 21-38  : channels 18-35
//!
//! Everything behind the selected words (e.g. the idle
//! word) is kept as trailer.

use std::fmt;

use crate::constants::{
  ROC_NPFHEADER,
  READOUT_MAP_NBITS,
  READOUT_BIT_HEADER,
  READOUT_BIT_CM,
  READOUT_BIT_CALIB,
  BX_HEADER_PATTERN,
  BX_HEADER_MASK,
  IDLE_WORD,
  IDLE_WORD_POS,
  FULL_LINK_LEN,
  NCHANNELS,
};
use crate::serialization::get_bits;
use crate::decoding::sample::ChannelRecord;
use crate::decoding::header_check::HeaderFlags;

/// The two slots in the middle of the channel
/// data which do not belong to a regular channel
#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize)]
pub enum ReservedKind {
  CommonMode,
  Calib,
}

/// A reserved slot, passed on undecoded
#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize)]
pub struct ReservedSlot {
  pub kind : ReservedKind,
  pub word : u32,
}

/// Readout map bit which selects a channel
pub fn readout_bit_for_channel(channel : usize) -> usize {
  if channel < 18 {
    channel + 1
  } else {
    // common mode and calib sit in the middle
    channel + 3
  }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RocPacket {
  /// index of the link within its PolarfirePacket
  pub link        : usize,
  /// number of words which have been available
  pub length      : usize,
  pub readout_map : u64,
  pub channels    : Vec<ChannelRecord>,
  pub reserved    : Vec<ReservedSlot>,
  pub trailer     : Vec<u32>,
  pub flags       : HeaderFlags,
  /// the raw link words
  pub words       : Vec<u32>,
  /// word index of the BX header, if it was read out
  #[serde(skip)]
  header_pos      : Option<usize>,
}

impl RocPacket {

  /// Decode the words of one link
  ///
  /// # Arguments
  ///
  /// * link          : index of the link in the enclosing packet
  /// * words         : the link words which are available
  /// * declared_len  : the length the Polarfire header declared
  /// * expected_bxid : bunch crossing of the enclosing packet
  pub fn decode(link          : usize,
                words         : &[u32],
                declared_len  : usize,
                expected_bxid : Option<u16>) -> Self {
    let mut packet = Self {
      link,
      length      : words.len(),
      readout_map : 0,
      channels    : Vec::new(),
      reserved    : Vec::new(),
      trailer     : Vec::new(),
      flags       : HeaderFlags::empty(),
      words       : words.to_vec(),
      header_pos  : None,
    };
    if words.len() < declared_len {
      packet.flags.insert(HeaderFlags::LENGTH_MISMATCH);
    }
    if words.len() <= ROC_NPFHEADER {
      packet.flags.insert(HeaderFlags::EMPTY_LINK);
      if words.len() == 1 {
        // link id without readout map
        packet.flags.insert(HeaderFlags::LENGTH_MISMATCH);
      }
      if words.len() == ROC_NPFHEADER {
        packet.readout_map = Self::map_from_words(words[0], words[1]);
        if packet.readout_map != 0 {
          packet.flags.insert(HeaderFlags::LENGTH_MISMATCH);
        }
      }
      return packet;
    }
    packet.readout_map = Self::map_from_words(words[0], words[1]);
    let mut pos = ROC_NPFHEADER;
    for bit in 0..READOUT_MAP_NBITS {
      if (packet.readout_map >> bit) & 0x1 == 0 {
        continue;
      }
      if pos >= words.len() {
        trace!("Link {} readout map selects more words than available ({})", link, words.len());
        packet.flags.insert(HeaderFlags::LENGTH_MISMATCH);
        break;
      }
      let word = words[pos];
      match bit {
        READOUT_BIT_HEADER => {
          packet.header_pos = Some(pos);
        }
        READOUT_BIT_CM => {
          packet.reserved.push(ReservedSlot { kind : ReservedKind::CommonMode, word });
        }
        READOUT_BIT_CALIB => {
          packet.reserved.push(ReservedSlot { kind : ReservedKind::Calib, word });
        }
        1..=18 => {
          packet.channels.push(ChannelRecord::new((bit - 1) as u8, word));
        }
        _ => {
          packet.channels.push(ChannelRecord::new((bit - 3) as u8, word));
        }
      }
      pos += 1;
    }
    if pos < words.len() {
      packet.trailer.extend_from_slice(&words[pos..]);
    }
    if !packet.good_bxheader() {
      packet.flags.insert(HeaderFlags::BAD_BX_HEADER);
    }
    if packet.idle_expected() && !packet.good_idle() {
      packet.flags.insert(HeaderFlags::BAD_IDLE);
    }
    if let (Some(bx), Some(expected)) = (packet.bxid(), expected_bxid) {
      // the ROC only counts 11 bits
      if bx != (expected & 0x7FF) {
        debug!("Link {} BX {} does not match the packet BX {}", link, bx, expected);
        packet.flags.insert(HeaderFlags::BX_MISMATCH);
      }
    }
    packet
  }

  fn map_from_words(w0 : u32, w1 : u32) -> u64 {
    let map = ((w0 as u64) << 32) | (w1 as u64);
    map & ((1u64 << READOUT_MAP_NBITS) - 1)
  }

  pub fn link_id(&self) -> Option<u16> {
    self.words.first().map(|w| get_bits(*w, 16, 16) as u16)
  }

  pub fn crc(&self) -> Option<bool> {
    self.words.first().map(|w| get_bits(*w, 15, 1) == 1)
  }

  pub fn bx_header(&self) -> Option<u32> {
    self.header_pos.map(|pos| self.words[pos])
  }

  /// The bunch crossing as counted by the ROC
  pub fn bxid(&self) -> Option<u16> {
    self.bx_header().map(|w| get_bits(w, 11, 11) as u16)
  }

  pub fn wadd(&self) -> Option<u8> {
    self.bx_header().map(|w| get_bits(w, 3, 8) as u8)
  }

  pub fn good_bxheader(&self) -> bool {
    match self.bx_header() {
      None    => false,
      Some(w) => (w & BX_HEADER_MASK) == BX_HEADER_PATTERN
    }
  }

  /// An idle word is only sent after a link 
  /// with every word read out
  pub fn idle_expected(&self) -> bool {
    self.readout_map.count_ones() as usize == READOUT_MAP_NBITS
  }

  pub fn good_idle(&self) -> bool {
    self.words.len() >= FULL_LINK_LEN && self.words[IDLE_WORD_POS] == IDLE_WORD
  }

  pub fn has_channel(&self, channel : usize) -> bool {
    self.channel(channel).is_some()
  }

  pub fn channel(&self, channel : usize) -> Option<&ChannelRecord> {
    if channel >= NCHANNELS {
      return None;
    }
    self.channels.iter().find(|ch| ch.channel as usize == channel)
  }

  pub fn reserved_slot(&self, kind : ReservedKind) -> Option<u32> {
    self.reserved.iter().find(|slot| slot.kind == kind).map(|slot| slot.word)
  }

  pub fn to_words(&self) -> Vec<u32> {
    self.words.clone()
  }
}

impl fmt::Display for RocPacket {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<RocPacket:");
    repr += &(format!("\n  link        : {}", self.link));
    repr += &(format!("\n  link id     : {:?}", self.link_id()));
    repr += &(format!("\n  length      : {}", self.length));
    repr += &(format!("\n  bxid        : {:?}", self.bxid()));
    repr += &(format!("\n  wadd        : {:?}", self.wadd()));
    repr += &(format!("\n  channels    : {}", self.channels.len()));
    repr += &(format!("\n  reserved    : {}", self.reserved.len()));
    repr += &(format!("\n  flags       : {}>", self.flags));
    write!(f, "{}", repr)
  }
}

/// Assemble the words of a link the way the 
/// Polarfire sends them
#[derive(Debug, Clone, Default)]
pub struct RocPacketBuilder {
  pub link_id     : u16,
  pub crc         : bool,
  pub bxid        : u16,
  pub wadd        : u8,
  /// (channel, sample word), any order
  pub channels    : Vec<(u8, u32)>,
  pub common_mode : Option<u32>,
  pub calib       : Option<u32>,
  /// leave out the BX header
  pub no_header   : bool,
  /// use this instead of a well formed BX header
  pub raw_header  : Option<u32>,
  pub idle        : bool,
}

impl RocPacketBuilder {

  pub fn new(link_id : u16, bxid : u16) -> Self {
    Self {
      link_id,
      bxid,
      ..Default::default()
    }
  }

  pub fn bx_header_word(bxid : u16, wadd : u8) -> u32 {
    BX_HEADER_PATTERN
      | ((bxid as u32) & 0x7FF) << 11
      | ((wadd as u32) & 0xFF) << 3
  }

  pub fn build(&self) -> Vec<u32> {
    // slot index in map order -> word
    let mut slots : [Option<u32>;READOUT_MAP_NBITS] = [None;READOUT_MAP_NBITS];
    if !self.no_header {
      slots[READOUT_BIT_HEADER] = Some(self.raw_header
        .unwrap_or(Self::bx_header_word(self.bxid, self.wadd)));
    }
    slots[READOUT_BIT_CM]    = self.common_mode;
    slots[READOUT_BIT_CALIB] = self.calib;
    for (ch, word) in &self.channels {
      if (*ch as usize) < NCHANNELS {
        slots[readout_bit_for_channel(*ch as usize)] = Some(*word);
      }
    }
    let mut map = 0u64;
    let mut payload = Vec::<u32>::new();
    for (bit, slot) in slots.iter().enumerate() {
      if let Some(word) = slot {
        map |= 1u64 << bit;
        payload.push(*word);
      }
    }
    let w0 = (self.link_id as u32) << 16
           | (self.crc as u32) << 15
           | ((map >> 32) as u32 & 0x7F);
    let w1 = (map & 0xFFFFFFFF) as u32;
    let mut words = vec![w0, w1];
    words.extend(payload);
    if self.idle {
      words.push(IDLE_WORD);
    }
    words
  }
}

#[cfg(test)]
mod test_roc_packet {
  use super::*;

  fn full_link(bxid : u16) -> RocPacketBuilder {
    let mut builder = RocPacketBuilder::new(0x12, bxid);
    builder.wadd        = 7;
    builder.common_mode = Some(0x00022802);
    builder.calib       = Some(0x40000000);
    builder.idle        = true;
    for ch in 0..36u8 {
      builder.channels.push((ch, ch as u32));
    }
    builder
  }

  #[test]
  fn decode_full_link() {
    let words  = full_link(100).build();
    assert_eq!(words.len(), FULL_LINK_LEN);
    let packet = RocPacket::decode(0, &words, words.len(), Some(100));
    assert!(packet.flags.is_empty(), "{}", packet.flags);
    assert_eq!(packet.link_id(), Some(0x12));
    assert_eq!(packet.bxid(), Some(100));
    assert_eq!(packet.wadd(), Some(7));
    assert_eq!(packet.channels.len(), 36);
    assert!(packet.good_idle());
    for ch in 0..36 {
      assert_eq!(packet.channel(ch).map(|c| c.toa), Some(ch as u16));
    }
    assert_eq!(packet.reserved_slot(ReservedKind::CommonMode), Some(0x00022802));
    assert_eq!(packet.reserved_slot(ReservedKind::Calib), Some(0x40000000));
  }

  #[test]
  fn sparse_readout_offsets() {
    let mut builder = RocPacketBuilder::new(1, 5);
    builder.channels = vec![(3, 0x300), (20, 0x2000), (35, 0x35)];
    let words  = builder.build();
    let packet = RocPacket::decode(2, &words, words.len(), Some(5));
    // 2 Polarfire words + header + 3 channels
    assert_eq!(words.len(), 6);
    assert!(packet.flags.is_empty());
    assert!(!packet.has_channel(0));
    assert_eq!(packet.channel(3).map(|c| c.word), Some(0x300));
    assert_eq!(packet.channel(20).map(|c| c.word), Some(0x2000));
    assert_eq!(packet.channel(35).map(|c| c.word), Some(0x35));
  }

  #[test]
  fn bad_header_and_bx_mismatch() {
    let mut builder = full_link(10);
    builder.raw_header = Some(0x55000000);
    let words  = builder.build();
    let packet = RocPacket::decode(0, &words, words.len(), Some(10));
    assert!(packet.flags.contains(HeaderFlags::BAD_BX_HEADER));
    let words  = full_link(11).build();
    let packet = RocPacket::decode(0, &words, words.len(), Some(10));
    assert!(packet.flags.contains(HeaderFlags::BX_MISMATCH));
    // the channels are still there
    assert_eq!(packet.channels.len(), 36);
  }

  #[test]
  fn truncated_link_is_flagged() {
    let words  = full_link(1).build();
    let packet = RocPacket::decode(0, &words[..20], words.len(), Some(1));
    assert!(packet.flags.contains(HeaderFlags::LENGTH_MISMATCH));
    // header + 17 channels fit into the 18 remaining words
    assert_eq!(packet.channels.len(), 17);
    let empty  = RocPacket::decode(1, &[], 0, None);
    assert!(empty.flags.contains(HeaderFlags::EMPTY_LINK));
    assert_eq!(empty.link_id(), None);
  }
}
