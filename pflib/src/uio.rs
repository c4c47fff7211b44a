//! Wishbone access through a memory mapped UIO window
//! 
//! On boards where the Wishbone bus is bridged to the 
//! host memory space, the registers are mapped through 
//! a UIO device (e.g. /dev/uio0). Each 32bit register
//! occupies 4 bytes, so the flattened register address
//! times 4 is the offset into the window.

extern crate memmap;

use std::fs::File;
use std::fmt;
use std::io;
use std::ptr;

use memmap::MmapMut;

use crate::wishbone::{
  BusError,
  WishboneInterface,
};

pub const UIO0 : &'static str = "/dev/uio0";

/// The size of a 32bit unsigned int in byte
/// (all words in registers are u32)
pub const SIZEOF_U32 : usize = 4;

/// Allow WRITE access to the memory registers at /dev/uio**
/// 
/// # Arguments
///
/// * addr_space : the uio device
/// * addr       : the memory address (address8) the 
///                window starts at
/// * len        : size of the window in bytes
pub fn map_physical_mem_write(addr_space : &str,
                              addr       : u32,
                              len        : usize) -> io::Result<MmapMut> {
  let m = unsafe {
    memmap::MmapOptions::new()
      .offset(addr as u64)
      .len(len)
      .map_mut(&File::options()
        .read(true)
        .write(true)
        .open(addr_space)?)?
    };
  Ok(m)
}

pub struct UioWishbone {
  pub device  : String,
  /// window size in bytes
  pub size    : usize,
  window      : MmapMut,
}

impl UioWishbone {

  pub fn new(device : &str, size : usize) -> Result<Self, BusError> {
    let window = match map_physical_mem_write(device, 0, size) {
      Err(err) => {
        error!("Failed to mmap {} with {} bytes! {}", device, size, err);
        return Err(BusError::LinkDown);
      }
      Ok(window) => window
    };
    info!("Mapped {} bytes of {}", size, device);
    Ok(Self {
      device : device.to_string(),
      size,
      window,
    })
  }

  fn offset(&self, addr : u32) -> Result<usize, BusError> {
    let offset = addr as usize * SIZEOF_U32;
    if offset + SIZEOF_U32 > self.size {
      error!("Address {:#x} is outside of the {} byte window of {}", addr, self.size, self.device);
      return Err(BusError::BadAddress);
    }
    Ok(offset)
  }
}

impl WishboneInterface for UioWishbone {

  fn wb_read(&mut self, addr : u32) -> Result<u32, BusError> {
    let offset = self.offset(addr)?;
    let value = unsafe {
      let p = self.window.as_ptr().add(offset) as *const u32;
      ptr::read_volatile(p)
    };
    trace!("Read {:#010x} from {:#x}", value, addr);
    Ok(value)
  }

  fn wb_write(&mut self, addr : u32, value : u32) -> Result<(), BusError> {
    let offset = self.offset(addr)?;
    unsafe {
      let p = self.window.as_mut_ptr().add(offset) as *mut u32;
      ptr::write_volatile(p, value);
    }
    trace!("Wrote {:#010x} to {:#x}", value, addr);
    Ok(())
  }

  fn wb_read_block(&mut self, addr : u32, nwords : usize) -> Result<Vec<u32>, BusError> {
    if nwords > 0 {
      // check the end of the block before touching anything
      self.offset(addr + nwords as u32 - 1)?;
    }
    let mut data = Vec::<u32>::with_capacity(nwords);
    for k in 0..nwords as u32 {
      data.push(self.wb_read(addr + k)?);
    }
    Ok(data)
  }

  /// There is nothing to reset on a mapped window
  fn wb_reset(&mut self) -> Result<(), BusError> {
    Ok(())
  }
}

impl fmt::Display for UioWishbone {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<UioWishbone: {} ({} bytes)>", self.device, self.size)
  }
}
