//! Wishbone access through IPBus
//!
//! The Polarfire exposes a small Wishbone bridge in its 
//! IPBus address space. A Wishbone transaction is a series 
//! of IPBus writes to the bridge registers, followed by 
//! polling the DONE register.
//!
//! Documentation about the IPBus protocoll can be found here.
//! [see docs here](https://ipbus.web.cern.ch/doc/user/html/)
//!
//! We are using only IPBus control packets
//!

use std::fmt;
use std::io;
use std::net::{
  UdpSocket,
  SocketAddr
};
use std::time::Duration;

use pf_dataclasses::serialization::parse_u32_be;

use crate::wishbone::{
  BusError,
  WishboneInterface,
  split_address,
};

/// Enough for the largest response we request
pub const IPBUS_MAX_PACKSIZE   : usize = 1024;

/// The transaction types we send to the bridge.
///
/// The bridge registers are accessed one word at
/// a time, the other IPBus types are not used.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum IPBusPacketType {
  Read                 = 0,
  Write                = 1,
  /// Anything else in a response
  Unknown              = 99
}

impl IPBusPacketType {

  pub fn to_u8(&self) -> u8 {
    *self as u8
  }

  pub fn from_u8(ptype : u8) -> Self {
    match ptype {
      0 => IPBusPacketType::Read,
      1 => IPBusPacketType::Write,
      _ => IPBusPacketType::Unknown,
    }
  }
}

impl fmt::Display for IPBusPacketType {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      IPBusPacketType::Read              => "Read",
      IPBusPacketType::Write             => "Write",
      IPBusPacketType::Unknown           => "Unknown",
    };
    write!(f, "<IPBusPacketType: {}>", repr)
  }
}

/// Problems with a single IPBus response
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum IPBusError {
  InvalidPacketID,
  DecodingFailed,
  NotAStatusPacket,
  /// the info code of the transaction header
  /// was not "success"
  TransactionFailed,
}

impl fmt::Display for IPBusError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype = match self {
      IPBusError::InvalidPacketID   => "InvalidPacketID",
      IPBusError::DecodingFailed    => "DecodingFailed",
      IPBusError::NotAStatusPacket  => "NotAStatusPacket",
      IPBusError::TransactionFailed => "TransactionFailed",
    };
    write!(f, "<IPBusError: {}>", etype)
  }
}

impl std::error::Error for IPBusError {
}

impl From<IPBusError> for BusError {
  fn from(_err : IPBusError) -> Self {
    BusError::Nack
  }
}

fn io_to_bus_error(err : &io::Error) -> BusError {
  match err.kind() {
    io::ErrorKind::WouldBlock 
    | io::ErrorKind::TimedOut => BusError::Timeout,
    _                         => BusError::LinkDown,
  }
}

/// Implementation of an IPBus control packet client
#[derive(Debug)]
pub struct IPBus {
  pub socket         : UdpSocket,
  pub target_address : String,
  pub packet_type    : IPBusPacketType,
  /// IPBus Packet ID 
  pub pid            : u16,
  pub expected_pid   : u16,
  /// transport attempts per transaction
  pub max_attempts   : usize,
  buffer             : [u8;IPBUS_MAX_PACKSIZE]
}

impl IPBus {
  
  pub fn new(target_address : &str,
             timeout        : Duration,
             max_attempts   : usize) -> Result<Self, BusError> {
    let socket = Self::connect(target_address, timeout).map_err(|e| io_to_bus_error(&e))?;
    let mut bus = Self {
      socket,
      target_address : target_address.to_string(),
      packet_type    : IPBusPacketType::Read,
      pid            : 0,
      expected_pid   : 0,
      max_attempts   : max_attempts.max(1),
      buffer         : [0;IPBUS_MAX_PACKSIZE]
    };
    if let Err(err) = bus.realign_packet_id() {
      error!("No status from the IPBus target at {}! {}", target_address, err);
      return Err(err);
    }
    Ok(bus)
  }

  /// Connect to the IPBus UDP socket
  ///
  /// This will try a number of options to bind 
  /// to the local port.
  /// 
  /// # Arguments 
  ///
  /// * target_address  : IP/port of the Polarfire
  /// * timeout         : read timeout of the socket
  pub fn connect(target_address : &str, timeout : Duration) 
    -> io::Result<UdpSocket> {
    // provide a number of local ports to try
    let local_addrs = [
      SocketAddr::from(([0, 0, 0, 0], 50100)),
      SocketAddr::from(([0, 0, 0, 0], 50101)),
      SocketAddr::from(([0, 0, 0, 0], 50102)),
      SocketAddr::from(([0, 0, 0, 0], 50103)),
      SocketAddr::from(([0, 0, 0, 0], 50104)),
    ];
    let socket = match UdpSocket::bind(&local_addrs[..]) {
      Err(err) => {
        error!("Can not create local UDP socket for IPBus connection! {}", err);
        return Err(err);
      }
      Ok(socket) => socket
    };
    info!("Bound UDP socket for IPBus to {:?}", socket.local_addr());
    socket.set_read_timeout(Some(timeout))?;
    if let Err(err) = socket.connect(target_address) {
      error!("Can not connect IPBus socket to target address {}! {}", target_address, err);
      return Err(err);
    }
    info!("Connected IPBus to target address {}!", target_address);
    Ok(socket)
  }

  /// Get the next transaction ID. 
  /// If we ran out, wrap around, 
  /// 0 is reserved
  fn get_next_pid(&mut self) -> u16 {
    let pid = self.pid;
    self.expected_pid = self.pid;
    self.pid = if self.pid == u16::MAX { 1 } else { self.pid + 1 };
    pid
  }

  fn receive(&mut self) -> Result<usize, BusError> {
    match self.socket.recv(&mut self.buffer) {
      Err(err) => {
        debug!("IPBus receive failed! {err}");
        Err(io_to_bus_error(&err))
      }
      Ok(nbytes) => Ok(nbytes)
    }
  }
  
  fn send(&mut self, data : &[u8]) -> Result<(), BusError> {
    match self.socket.send(data) {
      Err(err) => {
        error!("Unable to send udp data! {err}");
        Err(io_to_bus_error(&err))
      }
      Ok(_) => Ok(())
    }
  }

  fn buffer_is_status(&self) -> bool {
    self.buffer[3] & 0x1 == 1
  }

  /// Request a status packet from the target
  pub fn get_status(&mut self) -> Result<(), BusError> {
    let mut udp_data = Vec::<u8>::new();
    let mut phead  = self.create_packetheader(true);
    phead = phead & 0xfffffff0;
    phead = phead | 0x00000001;
    udp_data.extend_from_slice(&phead.to_be_bytes());
    udp_data.extend_from_slice(&[0u8;60]);
    self.send(&udp_data)?;
    let nbytes = self.receive()?;
    if !self.buffer_is_status() {
      return Err(IPBusError::NotAStatusPacket.into());
    }
    trace!("[IPBus::get_status] => {} bytes received!", nbytes);
    Ok(())
  }

  fn create_packetheader(&mut self, status : bool) -> u32 {
    let pid : u16 = if status { 0 } else { self.get_next_pid() };
    let header = (0x2 << 28) as u32
               | (pid as u32) << 8
               | (0xf << 4) as u32
               | 0x0 as u32; // 0 means control packet
    trace!("[IPBus::create_packetheader] => Will use packet ID {pid}");
    header
  }

  fn create_transactionheader(&self, nwords : u8) -> u32 {
    (0x2 << 28) as u32
      | (nwords as u32) << 8
      | ((self.packet_type.to_u8() & 0xf) << 4) as u32
      | 0xf as u32 // 0xf is for outbound request 
  }

  /// Encode register addresses and values in IPBus packet
  ///
  /// # Arguments:
  ///
  /// * addr        : register addresss
  /// * nwords      : number of words to read/write
  /// * data        : values to write, ignored for reads
  fn encode_payload(&mut self, addr : u32, nwords : usize, data : &[u32]) -> Vec<u8> {
    let mut udp_data = Vec::<u8>::new();
    let pheader = self.create_packetheader(false);
    let theader = self.create_transactionheader(nwords as u8);
    udp_data.extend_from_slice(&pheader.to_be_bytes());
    udp_data.extend_from_slice(&theader.to_be_bytes());
    udp_data.extend_from_slice(&addr.to_be_bytes());
    if self.packet_type == IPBusPacketType::Write {
      for word in data {
        udp_data.extend_from_slice(&word.to_be_bytes());
      }
    }
    trace!("[IPBus::encode_payload] => payload {:?}", udp_data);
    udp_data
  }
  
  /// Unpack the response in the receive buffer
  fn decode_payload(&self, nbytes : usize) -> Result<(u16, Vec<u32>), IPBusError> {
    if nbytes < 8 {
      return Err(IPBusError::DecodingFailed);
    }
    let mut pos  : usize = 0;
    let pheader  = parse_u32_be(&self.buffer, &mut pos);
    let theader  = parse_u32_be(&self.buffer, &mut pos);
    let pid      = ((0x00ffff00 & pheader) >> 8) as u16;
    let size     = ((0x0000ff00 & theader) >> 8) as usize;
    let ptype    = ((0x000000f0 & theader) >> 4) as u8;
    let info     = (0x0000000f & theader) as u8;
    let packet_type = IPBusPacketType::from_u8(ptype);
    trace!("[IPBus::decode_payload] => PID, SIZE, PTYPE, INFO : {} {} {} {}", pid, size, packet_type, info);
    if pid != self.expected_pid {
      return Err(IPBusError::InvalidPacketID);
    }
    if info != 0 {
      error!("IPBus transaction failed with info code {info}");
      return Err(IPBusError::TransactionFailed);
    }
    let mut data = Vec::<u32>::new();
    match packet_type {
      IPBusPacketType::Unknown => {
        return Err(IPBusError::DecodingFailed);
      }
      IPBusPacketType::Read => {
        if nbytes < 8 + 4*size {
          return Err(IPBusError::DecodingFailed);
        }
        for _ in 0..size {
          data.push(parse_u32_be(&self.buffer, &mut pos));
        }
      },
      IPBusPacketType::Write => (),
    }
    Ok((pid, data))
  }

  /// Set the packet id to that what is expected from the target
  pub fn realign_packet_id(&mut self) -> Result<(), BusError> {
    trace!("[IPBus::realign_packet_id] - aligning...");
    self.pid          = self.get_target_next_expected_packet_id()?;
    self.expected_pid = self.pid;
    trace!("[IPBus::realign_packet_id] - aligned {}", self.pid);
    Ok(())
  }

  /// Get the packet id which is expected by the target
  pub fn get_target_next_expected_packet_id(&mut self) -> Result<u16, BusError> {
    self.get_status()?;
    // the expected packet id is in WORD 3
    let word = 3usize;
    let target_exp_pid = u16::from_be_bytes([self.buffer[word*4 + 1], self.buffer[word*4 + 2]]);
    trace!("[IPBus::target_next_pid] => Get expected packet id {target_exp_pid}");
    Ok(target_exp_pid)
  }

  /// Send a request and wait for the matching response
  ///
  /// Lost packets and out of order responses are retried 
  /// up to max_attempts times.
  fn transact(&mut self, addr : u32, nwords : usize, data : &[u32]) -> Result<Vec<u32>, BusError> {
    let mut last_err = BusError::Timeout;
    for attempt in 0..self.max_attempts {
      let message = self.encode_payload(addr, nwords, data);
      self.send(&message)?;
      loop {
        let nbytes = match self.receive() {
          Err(err) => {
            // probably lost, the target might also 
            // expect a different packet id by now
            last_err = err;
            break;
          }
          Ok(nbytes) => nbytes
        };
        if self.buffer_is_status() {
          continue;
        }
        match self.decode_payload(nbytes) {
          Ok((_, words)) => {
            if attempt > 0 {
              debug!("[IPBus::transact] succeeded after {} retries", attempt);
            }
            return Ok(words);
          }
          Err(IPBusError::InvalidPacketID) => {
            // a late answer to an earlier request, 
            // the right one might still come
            debug!("--> invalid packet id, waiting for the next response");
            continue;
          }
          Err(err) => {
            return Err(err.into());
          }
        }
      }
      if last_err == BusError::LinkDown {
        return Err(last_err);
      }
      warn!("[IPBus::transact] attempt {} of {} for address {:#x} failed with {}", attempt + 1, self.max_attempts, addr, last_err);
      if let Err(err) = self.realign_packet_id() {
        warn!("[IPBus::transact] unable to realign the packet id, keeping {}! {}", self.pid, err);
      }
    }
    Err(last_err)
  }

  pub fn read(&mut self, addr : u32) -> Result<u32, BusError> {
    self.packet_type = IPBusPacketType::Read;
    let data = self.transact(addr, 1, &[])?;
    match data.first() {
      None => {
        error!("[IPBus::read] Data has size 0");
        Err(BusError::Nack)
      }
      Some(value) => Ok(*value)
    }
  }

  pub fn write(&mut self, addr : u32, data : u32) -> Result<(), BusError> {
    self.packet_type = IPBusPacketType::Write;
    self.transact(addr, 1, &[data])?;
    Ok(())
  }
}

impl fmt::Display for IPBus {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<IPBus: target {} pid {}>", self.target_address, self.pid)
  }
}

/// Addresses of the Wishbone bridge in the IPBus space
#[derive(Debug, Copy, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BridgeRegisters {
  pub wb_write_data : u32,
  pub wb_read_data  : u32,
  pub wb_addr       : u32,
  pub wb_target     : u32,
  pub wb_we         : u32,
  pub start         : u32,
  /// bit 0 : done, bit 1 : wishbone error
  pub done          : u32,
  pub reset         : u32,
}

impl BridgeRegisters {
  pub fn new() -> Self {
    Self {
      wb_write_data : 0x20,
      wb_read_data  : 0x21,
      wb_addr       : 0x22,
      wb_target     : 0x23,
      wb_we         : 0x24,
      start         : 0x25,
      done          : 0x26,
      reset         : 0x27,
    }
  }
}

impl Default for BridgeRegisters {
  fn default() -> Self {
    Self::new()
  }
}

/// The Polarfire Wishbone bus, reached through IPBus
pub struct IPBusWishbone {
  pub ipbus           : IPBus,
  pub regs            : BridgeRegisters,
  /// how often DONE is polled before giving up
  pub max_poll_cycles : usize,
}

impl IPBusWishbone {

  pub fn new(ipbus : IPBus, regs : BridgeRegisters, max_poll_cycles : usize) -> Self {
    Self {
      ipbus,
      regs,
      max_poll_cycles,
    }
  }

  fn wait_done(&mut self) -> Result<(), BusError> {
    for _ in 0..self.max_poll_cycles {
      let done = self.ipbus.read(self.regs.done)?;
      if done & 0x2 != 0 {
        error!("Wishbone error indicated by the Polarfire!");
        return Err(BusError::Nack);
      }
      if done & 0x1 == 1 {
        return Ok(());
      }
    }
    error!("Timeout on Wishbone bus after {} cycles", self.max_poll_cycles);
    Err(BusError::Timeout)
  }

  fn start(&mut self, addr : u32, write_enable : bool) -> Result<(), BusError> {
    let (target, local) = split_address(addr);
    self.ipbus.write(self.regs.wb_addr,   local)?;
    self.ipbus.write(self.regs.wb_target, target)?;
    self.ipbus.write(self.regs.wb_we,     write_enable as u32)?;
    self.ipbus.write(self.regs.start,     0x1)?;
    self.wait_done()
  }
}

impl WishboneInterface for IPBusWishbone {

  fn wb_read(&mut self, addr : u32) -> Result<u32, BusError> {
    self.start(addr, false)?;
    self.ipbus.read(self.regs.wb_read_data)
  }

  fn wb_write(&mut self, addr : u32, value : u32) -> Result<(), BusError> {
    self.ipbus.write(self.regs.wb_write_data, value)?;
    self.start(addr, true)
  }

  /// The bridge handles single words only
  fn wb_read_block(&mut self, addr : u32, nwords : usize) -> Result<Vec<u32>, BusError> {
    let mut data = Vec::<u32>::with_capacity(nwords);
    for k in 0..nwords as u32 {
      data.push(self.wb_read(addr + k)?);
    }
    Ok(data)
  }

  fn wb_reset(&mut self) -> Result<(), BusError> {
    self.ipbus.write(self.regs.reset, 1)?;
    self.ipbus.write(self.regs.reset, 0)
  }
}

impl fmt::Display for IPBusWishbone {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<IPBusWishbone: {}>", self.ipbus)
  }
}

#[cfg(test)]
mod test_ipbus {
  use super::*;

  #[test]
  fn packet_type_codes() {
    for ptype in [IPBusPacketType::Read, IPBusPacketType::Write] {
      assert_eq!(IPBusPacketType::from_u8(ptype.to_u8()), ptype);
    }
    // non incrementing and RMW transactions are never sent
    for code in [2, 3, 4, 7] {
      assert_eq!(IPBusPacketType::from_u8(code), IPBusPacketType::Unknown);
    }
  }

  #[test]
  fn unreachable_target_is_an_error() {
    // a port nobody listens on
    let port = {
      let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
      socket.local_addr().unwrap().port()
    };
    let target = format!("127.0.0.1:{}", port);
    let bus    = IPBus::new(&target, Duration::from_millis(10), 1);
    match bus {
      Err(err) => assert!(err == BusError::Timeout || err == BusError::LinkDown, "{:?}", err),
      Ok(bus)  => panic!("Expected an error, got {}", bus),
    }
  }

  #[test]
  fn ipbus_errors_are_nacks() {
    let err : BusError = IPBusError::TransactionFailed.into();
    assert_eq!(err, BusError::Nack);
    let io_err = io::Error::new(io::ErrorKind::WouldBlock, "timeout");
    assert_eq!(io_to_bus_error(&io_err), BusError::Timeout);
    let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
    assert_eq!(io_to_bus_error(&io_err), BusError::LinkDown);
  }
}
