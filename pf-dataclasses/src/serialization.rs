//! Word level helpers for captured buffers
//!
//! The DAQ path delivers 32bit words, written
//! to disk (and handed around) in little endian
//! byte order. The IPBus transport in contrast
//! is big endian on the wire.

/// Get a u32 from a bytestream and advance a position marker
///
/// The caller has to guarantee that at least 4 bytes 
/// are available after pos.
///
/// # Arguments 
///
/// * bs     : Serialized data, stream of bytes
/// * pos    : Position marker - start postion of 
///            the deserialization
pub fn parse_u32<T: AsRef<[u8]>>(stream : &T, pos : &mut usize) -> u32 {
  let bs    = stream.as_ref();
  let value = u32::from_le_bytes([bs[*pos], bs[*pos+1], bs[*pos+2], bs[*pos+3]]);
  *pos += 4;
  value
}

/// Same as parse_u32, but for big endian (network order)
/// streams
pub fn parse_u32_be<T: AsRef<[u8]>>(stream : &T, pos : &mut usize) -> u32 {
  let bs    = stream.as_ref();
  let value = u32::from_be_bytes([bs[*pos], bs[*pos+1], bs[*pos+2], bs[*pos+3]]);
  *pos += 4;
  value
}

/// Restore the 32bit words of a captured buffer
///
/// A trailing incomplete word is dropped.
pub fn u8_to_u32(vec_u8 : &[u8]) -> Vec<u32> {
  vec_u8.chunks_exact(4)
    .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    .collect()
}

/// Convert a vector of words into the byte order
/// the DAQ path writes to disk
pub fn u32_to_u8(vec_u32 : &[u32]) -> Vec<u8> {
  vec_u32.iter()
    .flat_map(|&n| n.to_le_bytes())
    .collect()
}

/// A mask with the lowest nbits set
pub const fn mask(nbits : u32) -> u32 {
  if nbits >= 32 {
    u32::MAX
  } else {
    (1u32 << nbits) - 1
  }
}

/// Extract nbits starting at bit shift from word
#[inline]
pub fn get_bits(word : u32, shift : u32, nbits : u32) -> u32 {
  (word >> shift) & mask(nbits)
}
