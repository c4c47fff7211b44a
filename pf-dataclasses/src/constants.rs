//! Constants of the Polarfire DAQ data format
//!
//! All values are in units of 32bit words unless
//! noted otherwise.

/// Every SuperPacket starts with this word
pub const SUPERPACKET_SYNC      : u32 = 0xBEEF2021;

/// Words before the sample length words
/// (sync + header)
pub const SUPERPACKET_NHEADER   : usize = 2;

/// Words before the link length words
/// of a PolarfirePacket
pub const POLARFIRE_NHEADER     : usize = 2;

/// Words the Polarfire prepends to each
/// link (link id/crc + readout map)
pub const ROC_NPFHEADER         : usize = 2;

/// Number of readout channels of one ROC half
pub const NCHANNELS             : usize = 36;

/// Bits in the readout map which can select a word
/// header + 18 ch + cm + calib + 18 ch
pub const READOUT_MAP_NBITS     : usize = 39;

/// Readout map bit of the BX header
pub const READOUT_BIT_HEADER    : usize = 0;
/// Readout map bit of the common mode slot
pub const READOUT_BIT_CM        : usize = 19;
/// Readout map bit of the calib channel slot
pub const READOUT_BIT_CALIB     : usize = 20;

/// The top byte of a good BX header
pub const BX_HEADER_PATTERN     : u32 = 0xAA000000;
pub const BX_HEADER_MASK        : u32 = 0xFF000000;

/// Idle word sent after a full link
pub const IDLE_WORD             : u32 = 0xACCCCCCC;
/// Position of the idle word within a full link
pub const IDLE_WORD_POS         : usize = 41;
/// Length of a link with all channels read out
pub const FULL_LINK_LEN         : usize = 42;

/// Number of words of a HGCROC v3 DAQ link frame
pub const DAQ_LINK_FRAME_LEN    : usize = 40;
/// Trail flag of the first event after a reset
pub const TRAIL_FLAG_FIRST      : u32 = 0b0101;
/// Trail flag of any other event
pub const TRAIL_FLAG_NORMAL     : u32 = 0b0010;

/// Maximum number of samples in a SuperPacket (4 bits)
pub const MAX_NSAMPLES          : usize = 15;
/// Maximum number of links in a PolarfirePacket (6 bits)
pub const MAX_NLINKS            : usize = 63;
