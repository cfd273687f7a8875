
// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DEVICE_CLEAR:u32      = 15;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_TIMEOUT_MS:u32 = 5000;
pub const DEFAULT_DEVICE:&str = "inst0";

pub const OPERATION_FLAGS_END:i32 = 8;

// Reason bits of a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

// Extra time the socket waits beyond the instrument-side timeout before giving up on a reply
const SOCKET_TIMEOUT_MARGIN_MS:u64 = 1000;

use std::time::Duration;

use crate::rpc::port_mapping::TcpPortMapperClient;
use crate::rpc::tcp_client::TcpClient;
use crate::transport::{Transport, TransportError};

pub mod xdr_pack;

pub struct Link {
	pub link_id: i32,
	pub abort_port: u32,
	pub max_recv_size: u32,
}

/// Client for the VXI-11 core channel: one TCP connection, at most one link.
pub struct CoreClient {
	client: TcpClient,
	opt_link: Option<Link>,
	timeout_ms: u32,
}

fn device_error(code:i32) -> Result<(), TransportError> {
	let reason = match code {
		0  => return Ok(()),
		1  => "syntax error",
		3  => "device not accessible",
		4  => "invalid link identifier",
		5  => "parameter error",
		6  => "channel not established",
		8  => "operation not supported",
		9  => "out of resources",
		11 => "device locked by another link",
		12 => "no lock held by this link",
		15 => return Err(TransportError::Timeout),
		17 => "I/O error",
		21 => "invalid address",
		23 => "abort",
		29 => "channel already established",
		_  => "unknown error",
	};
	Err(TransportError::Device{ code, reason })
}

impl CoreClient {

	pub fn new(host:&str) -> Result<Self, TransportError> {
		let port = TcpPortMapperClient::new(host)?.get_tcp_port(DEVICE_CORE_PROG, DEVICE_CORE_VERS)?;
		log::debug!("vxi11: core channel of {} is on port {}", host, port);

		let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS)?;
		let mut core = CoreClient{ client, opt_link: None, timeout_ms: DEFAULT_TIMEOUT_MS };
		core.apply_socket_timeout()?;
		Ok(core)
	}

	/// Connects to `host` and opens a link to `device` (usually `inst0`).
	pub fn open(host:&str, device:&str) -> Result<Self, TransportError> {
		let mut core = Self::new(host)?;
		core.create_link(device)?;
		Ok(core)
	}

	fn get_link(&self) -> Result<i32, TransportError> {
		self.opt_link.as_ref().map(|l| l.link_id).ok_or(TransportError::NoLink)
	}

	fn apply_socket_timeout(&mut self) -> Result<(), TransportError> {
		let t = Duration::from_millis(self.timeout_ms as u64 + SOCKET_TIMEOUT_MARGIN_MS);
		self.client.set_read_timeout(Some(t))?;
		Ok(())
	}

	// Socket timeouts surface as WouldBlock or TimedOut depending on the platform
	fn call(&mut self) -> Result<(), TransportError> {
		self.client.do_call().map_err(|e| match e.kind() {
			std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => TransportError::Timeout,
			_ => TransportError::Io(e),
		})
	}

	pub fn create_link(&mut self, device:&str) -> Result<(), TransportError> {
		if self.opt_link.is_some() {
			return Err(TransportError::Rpc("already connected to a link".to_owned()));
		}

		self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, self.timeout_ms, device)?;
		self.call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		let abort_port:u32    = self.client.unpacker.unpack_u32()?;
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;
		device_error(error)?;

		log::debug!("vxi11: created link {} to {} (max_recv_size={})", link_id, device, max_recv_size);
		self.opt_link = Some(Link{ link_id, abort_port, max_recv_size });
		Ok(())
	}

	pub fn destroy_link(&mut self) -> Result<(), TransportError> {
		let link_id = self.get_link()?;

		self.client.start_call(DESTROY_LINK)?;
		self.client.packer.pack_i32(link_id)?;
		self.call()?;
		self.opt_link = None;

		device_error(self.client.unpacker.unpack_i32()?)
	}

	fn write_raw(&mut self, data:&[u8]) -> Result<(), TransportError> {
		let link_id = self.get_link()?;
		let max_chunk = self.opt_link.as_ref().map(|l| l.max_recv_size as usize).filter(|&n| n > 0).unwrap_or(data.len().max(1));

		// The END flag only goes on the last chunk
		let mut chunks = data.chunks(max_chunk).peekable();
		while let Some(chunk) = chunks.next() {
			let flags = if chunks.peek().is_none() { OPERATION_FLAGS_END } else { 0 };

			self.client.start_call(DEVICE_WRITE)?;
			xdr_pack::pack_device_write_parms(&mut self.client.packer, link_id, self.timeout_ms, self.timeout_ms, flags, chunk)?;
			self.call()?;

			let error:i32 = self.client.unpacker.unpack_i32()?;
			let size:u32  = self.client.unpacker.unpack_u32()?;
			device_error(error)?;

			if size as usize != chunk.len() {
				return Err(TransportError::Rpc(format!("instrument accepted {} of {} bytes", size, chunk.len())));
			}
		}
		Ok(())
	}

}

impl Transport for CoreClient {

	fn write(&mut self, command:&str) -> Result<(), TransportError> {
		log::trace!("vxi11: > {}", command);
		self.write_raw(command.as_bytes())
	}

	fn read_bytes(&mut self, capacity_hint:usize, expected_count:usize) -> Result<Vec<u8>, TransportError> {
		let link_id = self.get_link()?;
		let mut data:Vec<u8> = Vec::with_capacity(capacity_hint.max(expected_count));

		loop {
			let request_size:u32 = if expected_count > 0 {
				(expected_count - data.len()) as u32
			} else {
				capacity_hint.max(1) as u32
			};

			self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(&mut self.client.packer, link_id, request_size, self.timeout_ms, self.timeout_ms, 0, 0)?;
			self.call()?;

			let error:i32   = self.client.unpacker.unpack_i32()?;
			let reason:i32  = self.client.unpacker.unpack_i32()?;
			let chunk       = self.client.unpacker.unpack_variable_len_opaque()?;
			device_error(error)?;
			data.extend_from_slice(&chunk);

			if reason & (REASON_END | REASON_CHR) != 0 { break; }
			if expected_count > 0 && data.len() >= expected_count { break; }
			if reason & REASON_REQCNT == 0 && chunk.is_empty() {
				return Err(TransportError::Rpc("device_read returned no data and no reason".to_owned()));
			}
		}

		log::trace!("vxi11: < {} bytes", data.len());
		Ok(data)
	}

	fn set_timeout(&mut self, ms:u32) -> Result<(), TransportError> {
		self.timeout_ms = ms;
		self.apply_socket_timeout()
	}

	fn clear(&mut self) -> Result<(), TransportError> {
		let link_id = self.get_link()?;

		self.client.start_call(DEVICE_CLEAR)?;
		xdr_pack::pack_device_generic_parms(&mut self.client.packer, link_id, 0, self.timeout_ms, self.timeout_ms)?;
		self.call()?;

		device_error(self.client.unpacker.unpack_i32()?)
	}

}

impl Drop for CoreClient {

	fn drop(&mut self) {
		if self.opt_link.is_some() {
			if let Err(e) = self.destroy_link() {
				log::warn!("vxi11: unable to destroy link: {}", e);
			}
		}
	}

}
