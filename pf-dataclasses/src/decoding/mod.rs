//! Decoding of the DAQ event stream
//!
//! An event is framed in three levels, outer to inner
//!
//! * SuperPacket     - sync word, fpga id and the sample lengths
//! * PolarfirePacket - one per sample, bunch crossing/orbit counters 
//!                     and the link lengths
//! * RocPacket       - one per link, BX header and the channel samples
//!
//! Only a broken outer framing fails the decode call. 
//! Problems inside the event are collected in the 
//! HeaderCheckResults of the returned SuperPacket.

pub mod sample;
pub mod header_check;
pub mod roc_packet;
pub mod polarfire_packet;
pub mod super_packet;
pub mod daq_link_frame;

pub use sample::{
  Sample,
  ChannelMode,
  ChannelRecord,
};
pub use header_check::{
  DEFAULT_HEADER_THRESHOLD,
  HeaderFlags,
  HeaderStatus,
  HeaderCheckResults,
  FlaggedBlock,
};
pub use roc_packet::{
  RocPacket,
  RocPacketBuilder,
  ReservedKind,
  ReservedSlot,
};
pub use polarfire_packet::PolarfirePacket;
pub use super_packet::{
  SuperPacket,
  DecodeState,
};
pub use daq_link_frame::DaqLinkFrame;

use crate::errors::DecodingError;

/// Decode one event from a captured buffer
pub fn decode(buffer : &[u8]) -> Result<SuperPacket, DecodingError> {
  SuperPacket::from_bytestream(&buffer)
}

#[cfg(test)]
mod test_decoding {
  use super::*;
  use crate::constants::SUPERPACKET_SYNC;
  use crate::serialization::u32_to_u8;

  fn link(link_id : u16, bxid : u16) -> RocPacketBuilder {
    let mut builder = RocPacketBuilder::new(link_id, bxid);
    for ch in 0..36u8 {
      builder.channels.push((ch, (ch as u32) << 10));
    }
    builder.common_mode = Some(0x1);
    builder.calib       = Some(0x2);
    builder.idle        = true;
    builder
  }

  fn event(bxids : &[u16]) -> Vec<u32> {
    let mut sample = PolarfirePacket::new();
    sample.fpga_id = 3;
    sample.bxid    = 42;
    sample.rreq    = 7;
    for (ilink, bx) in bxids.iter().enumerate() {
      let words = link(ilink as u16, *bx).build();
      sample.links.push(RocPacket::decode(ilink, &words, words.len(), None));
    }
    let mut packet = SuperPacket::new();
    packet.fpga_id = 3;
    packet.samples.push(sample);
    packet.to_words()
  }

  #[test]
  fn decode_clean_event() {
    let words  = event(&[42, 42]);
    let packet = decode(&u32_to_u8(&words)).unwrap();
    assert_eq!(packet.nsamples, 1);
    assert_eq!(packet.total_len, words.len());
    let sample = packet.sample(0).unwrap();
    assert_eq!(sample.nlinks, 2);
    assert_eq!(sample.rreq, 7);
    assert!(sample.flags.is_empty(), "{}", sample.flags);
    for link in &sample.links {
      assert_eq!(link.channels.len(), 36);
      assert_eq!(link.channel(5).and_then(|c| c.adc), Some(5));
    }
    assert!(packet.header_check.all_good());
    assert!(packet.header_check.is_acceptable(0.0));
  }

  #[test]
  fn one_bad_link_does_not_spoil_the_event() {
    let words  = event(&[42, 17, 42]);
    let packet = decode(&u32_to_u8(&words)).unwrap();
    let sample = packet.sample(0).unwrap();
    assert_eq!(sample.links.len(), 3);
    for link in &sample.links {
      assert_eq!(link.channels.len(), 36);
    }
    assert_eq!(packet.header_check.flagged.len(), 1);
    assert!(packet.header_check.flags_for(0, 1).contains(HeaderFlags::BX_MISMATCH));
    assert!(packet.header_check.flags_for(0, 0).is_empty());
    assert!(packet.header_check.flags_for(0, 2).is_empty());
    assert_eq!(packet.header_check.res[1].n_bx_mismatch, 1);
  }

  #[test]
  fn corrupted_sync_is_rejected() {
    let mut words = event(&[42]);
    words[0] = 0xBEEF2020;
    let result = decode(&u32_to_u8(&words));
    assert_eq!(result, Err(DecodingError::FramingError { found : 0xBEEF2020 }));
  }

  #[test]
  fn truncated_buffer_is_rejected() {
    let words = event(&[42, 42]);
    let bytes = u32_to_u8(&words);
    for cut in [0usize, 3, 4, 7, 8, 12, bytes.len() - 4, bytes.len() - 1] {
      match decode(&bytes[..cut]) {
        Err(DecodingError::Truncated { needed, available }) => {
          assert!(needed > available);
        }
        other => panic!("cut at {} gave {:?}", cut, other),
      }
    }
  }

  #[test]
  fn sync_only_buffers() {
    assert!(matches!(decode(&[]), Err(DecodingError::Truncated { .. })));
    let bytes = u32_to_u8(&[SUPERPACKET_SYNC]);
    assert!(matches!(decode(&bytes), Err(DecodingError::Truncated { .. })));
  }

  #[test]
  fn inconsistent_sample_length_is_flagged() {
    let mut words = event(&[42]);
    // the Polarfire header starts after sync, header and one length word
    words[3] = (words[3] & !0xFFF) | 0x10;
    let packet = decode(&u32_to_u8(&words)).unwrap();
    assert!(packet.sample(0).unwrap().flags.contains(HeaderFlags::LENGTH_MISMATCH));
    assert_eq!(packet.sample(0).unwrap().links[0].channels.len(), 36);
  }
}
