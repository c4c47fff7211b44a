//! Errors which can occur while decoding
//! captured DAQ buffers
//!
//! Only problems with the outer framing are
//! errors. Anything wrong inside a well framed
//! event is reported through the header check
//! flags instead.

use std::error::Error;
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DecodingError {
  /// The first word is not the expected 
  /// sync pattern
  FramingError {
    found    : u32,
  },
  /// The header declares more words than 
  /// the buffer holds (all values in words)
  Truncated {
    needed    : usize,
    available : usize,
  },
}

impl fmt::Display for DecodingError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : String;
    match self {
      DecodingError::FramingError { found } => {
        etype = format!("FramingError (found {:#010x})", found);
      }
      DecodingError::Truncated { needed, available } => {
        etype = format!("Truncated (need {} words, have {})", needed, available);
      }
    }
    write!(f, "<DecodingError: {}>", etype)
  }
}

impl Error for DecodingError {
}

/// Problems reading captured data from disk
#[derive(Debug)]
pub enum IOError {
  FileNotFound,
  ReadFailed,
  /// The file does not hold an integer 
  /// number of 32bit words
  IncompleteWord,
}

impl fmt::Display for IOError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : &str = match self {
      IOError::FileNotFound   => "FileNotFound",
      IOError::ReadFailed     => "ReadFailed",
      IOError::IncompleteWord => "IncompleteWord",
    };
    write!(f, "<IOError: {}>", etype)
  }
}

impl Error for IOError {
}
