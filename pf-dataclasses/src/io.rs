//! Input/Output 
//!
//! * Read captured DAQ buffers into memory
//! * Walk through a buffer with back-to-back events
//!

use std::path::Path;
use std::fs::{
  self,
  File,
};
use std::io::{
  self,
  Read,
  Write,
};

use crate::errors::DecodingError;
use crate::serialization::{
  u8_to_u32,
  u32_to_u8,
};
use crate::decoding::SuperPacket;

/// Read an entire file into memory
///
/// Returns the content as a byte vector
/// 
/// # Arguments:
///
/// * filename : full path to the file to be read
pub fn read_file(filename : &Path) -> io::Result<Vec<u8>> {
  info!("Reading file {}", filename.display());
  let mut f = File::open(filename)?;
  let metadata = fs::metadata(filename)?;
  let mut buffer = vec![0; metadata.len() as usize];
  f.read_exact(&mut buffer)?;
  info!("Read {} bytes from {}", buffer.len(), filename.display());
  Ok(buffer)
}

/// Write DAQ words to disk in the byte order
/// the decoder expects
pub fn write_words(filename : &Path, words : &[u32]) -> io::Result<()> {
  let mut f = File::create(filename)?;
  f.write_all(&u32_to_u8(words))?;
  debug!("Wrote {} words to {}", words.len(), filename.display());
  Ok(())
}

/// Emit SuperPackets from a buffer of back-to-back events
///
/// The streamer stops at the first event which can 
/// not be framed, since the position of the next sync 
/// word is unknown from there on.
pub struct EventStreamer {
  words           : Vec<u32>,
  pub pos         : usize,
  pub n_events    : usize,
  /// the error which stopped the stream, if any
  pub error       : Option<DecodingError>,
}

impl EventStreamer {

  pub fn new(stream : &[u8]) -> Self {
    if stream.len() % 4 != 0 {
      warn!("Stream of {} bytes does not hold complete words, ignoring the last {} bytes", stream.len(), stream.len() % 4);
    }
    Self {
      words    : u8_to_u32(stream),
      pos      : 0,
      n_events : 0,
      error    : None,
    }
  }

  pub fn is_depleted(&self) -> bool {
    self.error.is_some() || self.pos >= self.words.len()
  }

  /// Number of words not yet consumed
  pub fn remaining(&self) -> usize {
    self.words.len().saturating_sub(self.pos)
  }
}

impl Iterator for EventStreamer {
  type Item = SuperPacket;

  fn next(&mut self) -> Option<SuperPacket> {
    if self.is_depleted() {
      return None;
    }
    match SuperPacket::from_words(&self.words[self.pos..]) {
      Err(err) => {
        error!("Stream stopped at word {} after {} events! {}", self.pos, self.n_events, err);
        self.error = Some(err);
        None
      }
      Ok(packet) => {
        self.pos      += packet.total_len;
        self.n_events += 1;
        Some(packet)
      }
    }
  }
}

#[cfg(test)]
mod test_io {
  use super::*;
  use crate::decoding::{PolarfirePacket, RocPacket, RocPacketBuilder};

  fn small_event(bxid : u16) -> Vec<u32> {
    let mut builder = RocPacketBuilder::new(0, bxid);
    builder.channels = vec![(1, 0x400), (2, 0x800)];
    let words = builder.build();
    let mut sample = PolarfirePacket::new();
    sample.bxid = bxid;
    sample.links.push(RocPacket::decode(0, &words, words.len(), Some(bxid)));
    let mut packet = SuperPacket::new();
    packet.samples.push(sample);
    packet.to_words()
  }

  #[test]
  fn stream_back_to_back_events() {
    let mut words = small_event(1);
    words.extend(small_event(2));
    words.extend(small_event(3));
    let mut streamer = EventStreamer::new(&u32_to_u8(&words));
    let bxids : Vec<u16> = streamer.by_ref().map(|ev| ev.samples[0].bxid).collect();
    assert_eq!(bxids, vec![1, 2, 3]);
    assert!(streamer.error.is_none());
    assert_eq!(streamer.remaining(), 0);
  }

  #[test]
  fn stream_stops_at_garbage() {
    let mut words = small_event(1);
    words.push(0xdeadbeef);
    words.extend(small_event(2));
    let mut streamer = EventStreamer::new(&u32_to_u8(&words));
    assert!(streamer.next().is_some());
    assert!(streamer.next().is_none());
    assert_eq!(streamer.n_events, 1);
    assert!(matches!(streamer.error, Some(DecodingError::FramingError { found : 0xdeadbeef })));
  }

  #[test]
  fn written_words_read_back() {
    let mut words = small_event(4);
    words.extend(small_event(5));
    let path = std::env::temp_dir().join(format!("pf-dataclasses-io-{}.raw", std::process::id()));
    write_words(&path, &words).unwrap();
    let stream = read_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(stream.len(), 4*words.len());
    // little endian
    assert_eq!(&stream[0..4], &words[0].to_le_bytes());
    let bxids : Vec<u16> = EventStreamer::new(&stream).map(|ev| ev.samples[0].bxid).collect();
    assert_eq!(bxids, vec![4, 5]);
    assert!(read_file(&path).is_err());
  }
}
