//! The data of all links of one sample
//!
//! Header layout
//!
//! word 0 : version [31:28] | fpga id [27:20] | nlinks [19:14] | length [11:0]
//! word 1 : bxid [31:20] | rreq [19:10] | orbit [9:0]
//! word 2.. : link lengths, 4 links per word, 6 bits each,
//!            link i at bit 8*(i%4)
//!
//! The length counts all words of the packet, header included.

use std::fmt;

use crate::constants::POLARFIRE_NHEADER;
use crate::serialization::get_bits;
use crate::decoding::roc_packet::RocPacket;
use crate::decoding::header_check::HeaderFlags;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PolarfirePacket {
  pub version      : u8,
  pub fpga_id      : u8,
  pub nlinks       : usize,
  /// length as declared in the header
  pub length       : usize,
  pub bxid         : u16,
  /// readout request (event) counter
  pub rreq         : u16,
  pub orbit        : u16,
  pub link_lengths : Vec<usize>,
  pub links        : Vec<RocPacket>,
  pub flags        : HeaderFlags,
}

impl PolarfirePacket {

  pub fn new() -> Self {
    Self {
      version      : 0,
      fpga_id      : 0,
      nlinks       : 0,
      length       : 0,
      bxid         : 0,
      rreq         : 0,
      orbit        : 0,
      link_lengths : Vec::new(),
      links        : Vec::new(),
      flags        : HeaderFlags::empty(),
    }
  }

  /// Number of words in front of the first link
  pub fn header_len(nlinks : usize) -> usize {
    POLARFIRE_NHEADER + (nlinks + 3)/4
  }

  /// Decode one sample
  ///
  /// Never reads outside of words. Inconsistent lengths
  /// are flagged, the links are decoded as far as 
  /// the words reach.
  ///
  /// # Arguments
  ///
  /// * words        : the words the SuperPacket assigned to this sample
  /// * declared_len : the sample length according to the SuperPacket
  /// * fpga_id      : fpga id of the SuperPacket
  pub fn decode(words        : &[u32],
                declared_len : usize,
                fpga_id      : u8) -> Self {
    let mut packet = Self::new();
    if words.len() < declared_len {
      packet.flags.insert(HeaderFlags::LENGTH_MISMATCH);
    }
    if words.len() < POLARFIRE_NHEADER {
      packet.flags.insert(HeaderFlags::LENGTH_MISMATCH);
      return packet;
    }
    let w0 = words[0];
    let w1 = words[1];
    packet.version = get_bits(w0, 28, 4)  as u8;
    packet.fpga_id = get_bits(w0, 20, 8)  as u8;
    packet.nlinks  = get_bits(w0, 14, 6)  as usize;
    packet.length  = get_bits(w0, 0, 12)  as usize;
    packet.bxid    = get_bits(w1, 20, 12) as u16;
    packet.rreq    = get_bits(w1, 10, 10) as u16;
    packet.orbit   = get_bits(w1, 0, 10)  as u16;
    if packet.fpga_id != fpga_id {
      packet.flags.insert(HeaderFlags::FPGA_MISMATCH);
    }
    if packet.length != declared_len {
      debug!("Polarfire packet declares {} words, SuperPacket {}", packet.length, declared_len);
      packet.flags.insert(HeaderFlags::LENGTH_MISMATCH);
    }
    let header_len = Self::header_len(packet.nlinks);
    if words.len() < header_len {
      packet.flags.insert(HeaderFlags::LENGTH_MISMATCH);
      return packet;
    }
    for ilink in 0..packet.nlinks {
      let word = words[POLARFIRE_NHEADER + ilink/4];
      packet.link_lengths.push(get_bits(word, 8*(ilink as u32 % 4), 6) as usize);
    }
    let mut offset = header_len;
    for (ilink, len) in packet.link_lengths.iter().enumerate() {
      let start = offset.min(words.len());
      let stop  = (offset + len).min(words.len());
      let link  = RocPacket::decode(ilink, &words[start..stop], *len, Some(packet.bxid));
      packet.links.push(link);
      offset += len;
    }
    if offset > words.len() {
      packet.flags.insert(HeaderFlags::LENGTH_MISMATCH);
    }
    packet
  }

  pub fn link(&self, ilink : usize) -> Option<&RocPacket> {
    self.links.get(ilink)
  }

  /// Reassemble the wire words. The length field and
  /// the link lengths are recomputed from the links.
  pub fn to_words(&self) -> Vec<u32> {
    let nlinks   = self.links.len();
    let length   = Self::header_len(nlinks)
                 + self.links.iter().map(|l| l.words.len()).sum::<usize>();
    let w0 = ((self.version as u32) & 0xF) << 28
           | (self.fpga_id as u32) << 20
           | ((nlinks as u32) & 0x3F) << 14
           | (length as u32) & 0xFFF;
    let w1 = ((self.bxid  as u32) & 0xFFF) << 20
           | ((self.rreq  as u32) & 0x3FF) << 10
           | (self.orbit as u32) & 0x3FF;
    let mut words = vec![w0, w1];
    let mut len_words = vec![0u32; (nlinks + 3)/4];
    for (ilink, link) in self.links.iter().enumerate() {
      len_words[ilink/4] |= ((link.words.len() as u32) & 0x3F) << (8*(ilink % 4));
    }
    words.extend(len_words);
    for link in &self.links {
      words.extend_from_slice(&link.words);
    }
    words
  }
}

impl Default for PolarfirePacket {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for PolarfirePacket {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<PolarfirePacket:");
    repr += &(format!("\n  version : {}", self.version));
    repr += &(format!("\n  fpga id : {}", self.fpga_id));
    repr += &(format!("\n  nlinks  : {}", self.nlinks));
    repr += &(format!("\n  length  : {}", self.length));
    repr += &(format!("\n  bxid    : {}", self.bxid));
    repr += &(format!("\n  rreq    : {}", self.rreq));
    repr += &(format!("\n  orbit   : {}", self.orbit));
    repr += &(format!("\n  flags   : {}>", self.flags));
    write!(f, "{}", repr)
  }
}
