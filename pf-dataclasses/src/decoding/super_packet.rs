//! The outer framing of one DAQ event
//!
//! word 0 : sync 0xBEEF2021
//! word 1 : version [31:28] | fpga id [27:20] | nsamples [19:16]
//! word 2.. : sample lengths, 2 samples per word, 12 bits each,
//!            sample i at bit 16*(i%2)
//!
//! followed by the samples, each one a PolarfirePacket.
//!
//! The buffer is expected to start exactly at the sync
//! word. There is no attempt to find the next sync word,
//! resynchronization is up to whoever captured the data.

use std::fmt;

use crate::constants::{
  SUPERPACKET_SYNC,
  SUPERPACKET_NHEADER,
};
use crate::errors::DecodingError;
use crate::serialization::{
  get_bits,
  u8_to_u32,
  u32_to_u8,
};
use crate::decoding::polarfire_packet::PolarfirePacket;
use crate::decoding::header_check::HeaderCheckResults;

#[cfg(feature = "random")]
use crate::FromRandom;
#[cfg(feature = "random")]
use rand::Rng;
#[cfg(feature = "random")]
use crate::decoding::roc_packet::{RocPacket, RocPacketBuilder};

/// Progress of a single decode call
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DecodeState {
  Start,
  OuterHeaderParsed,
  InnerPacketsParsed,
  Validated,
  Done,
  Rejected,
}

impl fmt::Display for DecodeState {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      DecodeState::Start              => "Start",
      DecodeState::OuterHeaderParsed  => "OuterHeaderParsed",
      DecodeState::InnerPacketsParsed => "InnerPacketsParsed",
      DecodeState::Validated          => "Validated",
      DecodeState::Done               => "Done",
      DecodeState::Rejected           => "Rejected",
    };
    write!(f, "<DecodeState: {}>", repr)
  }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SuperPacket {
  pub version        : u8,
  pub fpga_id        : u8,
  pub nsamples       : usize,
  pub sample_lengths : Vec<usize>,
  pub samples        : Vec<PolarfirePacket>,
  /// number of words this event occupies in the stream
  pub total_len      : usize,
  pub header_check   : HeaderCheckResults,
}

impl SuperPacket {

  pub fn new() -> Self {
    Self {
      version        : 0,
      fpga_id        : 0,
      nsamples       : 0,
      sample_lengths : Vec::new(),
      samples        : Vec::new(),
      total_len      : 0,
      header_check   : HeaderCheckResults::new(),
    }
  }

  /// Words in front of the first sample
  pub fn header_len(nsamples : usize) -> usize {
    SUPERPACKET_NHEADER + (nsamples + 1)/2
  }

  /// Decode a captured buffer (little endian 32bit words)
  pub fn from_bytestream<T : AsRef<[u8]>>(stream : &T) -> Result<Self, DecodingError> {
    let words = u8_to_u32(stream.as_ref());
    Self::from_words(&words)
  }

  /// Decode an event from its words
  ///
  /// Only a wrong sync word or a buffer shorter than 
  /// the declared lengths are errors. Everything else 
  /// ends up in the header check of the returned packet.
  pub fn from_words(words : &[u32]) -> Result<Self, DecodingError> {
    let mut state = DecodeState::Start;
    trace!("{}", state);
    let mut packet = Self::new();
    // outer header
    if words.is_empty() {
      return Err(Self::reject(DecodingError::Truncated { needed : SUPERPACKET_NHEADER, available : 0 }));
    }
    if words[0] != SUPERPACKET_SYNC {
      return Err(Self::reject(DecodingError::FramingError { found : words[0] }));
    }
    if words.len() < SUPERPACKET_NHEADER {
      return Err(Self::reject(DecodingError::Truncated { needed : SUPERPACKET_NHEADER, available : words.len() }));
    }
    let head = words[1];
    packet.version  = get_bits(head, 28, 4) as u8;
    packet.fpga_id  = get_bits(head, 20, 8) as u8;
    packet.nsamples = get_bits(head, 16, 4) as usize;
    let header_len  = Self::header_len(packet.nsamples);
    if words.len() < header_len {
      return Err(Self::reject(DecodingError::Truncated { needed : header_len, available : words.len() }));
    }
    for isample in 0..packet.nsamples {
      let word = words[SUPERPACKET_NHEADER + isample/2];
      packet.sample_lengths.push(get_bits(word, 16*(isample as u32 % 2), 12) as usize);
    }
    packet.total_len = header_len + packet.sample_lengths.iter().sum::<usize>();
    if words.len() < packet.total_len {
      return Err(Self::reject(DecodingError::Truncated { needed : packet.total_len, available : words.len() }));
    }
    state = DecodeState::OuterHeaderParsed;
    trace!("{} - {} samples in {} words", state, packet.nsamples, packet.total_len);

    // samples and their links
    let mut offset = header_len;
    for len in packet.sample_lengths.iter() {
      let sample = PolarfirePacket::decode(&words[offset..offset + len], *len, packet.fpga_id);
      packet.samples.push(sample);
      offset += len;
    }
    state = DecodeState::InnerPacketsParsed;
    trace!("{}", state);

    let mut results = HeaderCheckResults::new();
    results.add_event(&packet);
    packet.header_check = results;
    state = DecodeState::Validated;
    trace!("{} - {} flagged blocks", state, packet.header_check.flagged.len());
    state = DecodeState::Done;
    trace!("{}", state);
    Ok(packet)
  }

  fn reject(err : DecodingError) -> DecodingError {
    debug!("{} {}", DecodeState::Rejected, err);
    err
  }

  pub fn sample(&self, isample : usize) -> Option<&PolarfirePacket> {
    self.samples.get(isample)
  }

  /// Reassemble the wire words, lengths are recomputed
  pub fn to_words(&self) -> Vec<u32> {
    let sample_words : Vec<Vec<u32>> = self.samples.iter().map(|s| s.to_words()).collect();
    let nsamples = sample_words.len();
    let head = ((self.version as u32) & 0xF) << 28
             | (self.fpga_id as u32) << 20
             | ((nsamples as u32) & 0xF) << 16;
    let mut words = vec![SUPERPACKET_SYNC, head];
    let mut len_words = vec![0u32; (nsamples + 1)/2];
    for (isample, sample) in sample_words.iter().enumerate() {
      len_words[isample/2] |= ((sample.len() as u32) & 0xFFF) << (16*(isample % 2));
    }
    words.extend(len_words);
    for sample in sample_words {
      words.extend(sample);
    }
    words
  }

  pub fn to_bytestream(&self) -> Vec<u8> {
    u32_to_u8(&self.to_words())
  }
}

impl Default for SuperPacket {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for SuperPacket {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<SuperPacket:");
    repr += &(format!("\n  version   : {}", self.version));
    repr += &(format!("\n  fpga id   : {}", self.fpga_id));
    repr += &(format!("\n  nsamples  : {}", self.nsamples));
    repr += &(format!("\n  total len : {}", self.total_len));
    repr += &(format!("\n  flagged   : {}>", self.header_check.flagged.len()));
    write!(f, "{}", repr)
  }
}

#[cfg(feature = "random")]
impl FromRandom for SuperPacket {

  fn from_random() -> Self {
    let mut rng      = rand::thread_rng();
    let mut packet   = Self::new();
    packet.version   = 1;
    packet.fpga_id   = rng.gen::<u8>();
    let nsamples     = rng.gen_range(1..5usize);
    for _ in 0..nsamples {
      let mut sample  = PolarfirePacket::new();
      sample.version  = 1;
      sample.fpga_id  = packet.fpga_id;
      sample.bxid     = rng.gen_range(0..0x7FF);
      sample.rreq     = rng.gen_range(0..0x3FF);
      sample.orbit    = rng.gen_range(0..0x3FF);
      let nlinks      = rng.gen_range(1..5usize);
      for ilink in 0..nlinks {
        let mut builder = RocPacketBuilder::new(ilink as u16, sample.bxid);
        builder.wadd    = rng.gen::<u8>();
        for ch in 0..36u8 {
          if rng.gen_bool(0.5) {
            builder.channels.push((ch, rng.gen::<u32>() & 0x3FFFFFFF));
          }
        }
        let words = builder.build();
        sample.links.push(RocPacket::decode(ilink, &words, words.len(), Some(sample.bxid)));
      }
      sample.nlinks = nlinks;
      let words = sample.to_words();
      sample.length = words.len();
      packet.samples.push(PolarfirePacket::decode(&words, words.len(), packet.fpga_id));
    }
    let words = packet.to_words();
    // decode once more so that lengths and checks are consistent
    match Self::from_words(&words) {
      Ok(decoded) => decoded,
      Err(err)    => {
        error!("Random SuperPacket does not decode! {err}");
        packet
      }
    }
  }
}
