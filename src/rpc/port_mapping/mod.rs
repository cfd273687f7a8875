
pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

use std::io::{self, Error, ErrorKind};

use super::IPPROTO_TCP;
use super::xdr_pack;
use super::tcp_client::TcpClient;

pub struct TcpPortMapperClient {
	client: TcpClient,
}

impl TcpPortMapperClient {

	pub fn new(host:&str) -> io::Result<Self> {
		let client = TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS)?;
		Ok(Self{ client })
	}

	/// Asks the port mapper which TCP port serves `program`/`version`. A port of zero means it isn't registered.
	pub fn get_tcp_port(&mut self, program:u32, version:u32) -> io::Result<u16> {
		self.client.start_call(PMAPPROC_GETPORT)?;
		xdr_pack::pack_mapping(&mut self.client.packer, program, version, IPPROTO_TCP, 0)?;
		self.client.do_call()?;

		let port:u32 = self.client.unpacker.unpack_u32()?;
		if !self.client.unpacker.all_data_consumed() {
			return Err(Error::new(ErrorKind::InvalidData, "Data unexpectedly left over in unpacker after unpacking port"));
		}

		match port {
			0 => Err(Error::new(ErrorKind::NotFound, format!("Program {:#x} v{} is not registered with the port mapper", program, version))),
			p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::InvalidData, "Port mapper returned a port out of range")),
			p => Ok(p as u16),
		}
	}

}
