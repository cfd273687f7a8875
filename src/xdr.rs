
use std::io::{self, Write, Error, ErrorKind, Cursor};

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::UnexpectedEof, msg) }

#[derive(Default)]
pub struct Packer {
	buff: Vec<u8>
}

#[derive(Default)]
pub struct Unpacker {
	buff: Vec<u8>,
	pos: usize,
}

impl Packer {

	pub fn new() -> Self { Packer{ buff: Vec::new() } }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn as_bytes(&self) -> &[u8] { &self.buff }

	// Packing methods that can only add multiples of four bytes, so if we started off with the correct
	// padding, we'll end up with the correct padding
	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }

	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> { self.pack_i32(if b { 1 } else { 0 }) }

	pub fn pack_enum(&mut self, x:i32) -> io::Result<()> { self.pack_i32(x) }

	// Packing methods that require padding at the end
	pub fn pack_variable_len_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		self.pack_u32(data.len() as u32)?;
		self.buff.write_all(data)?;

		while self.buff.len() % 4 != 0 { self.buff.push(0); }
		Ok(())
	}

}

impl Unpacker {

	pub fn new() -> Self { Unpacker{ buff: Vec::new(), pos: 0 } }

	pub fn reset(&mut self, data:&[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn all_data_consumed(&self) -> bool { self.pos >= self.buff.len() }

	fn remaining(&self) -> &[u8] { &self.buff[self.pos..] }

	fn skip(&mut self, n:usize) -> io::Result<()> {
		if self.pos + n > self.buff.len() {
			return Err(err("Tried to read past the end of the XDR buffer"));
		}
		self.pos += n;
		Ok(())
	}

	pub fn unpack_u32(&mut self) -> io::Result<u32> {
		let ans:u32 = Cursor::new(self.remaining()).read_u32::<BigEndian>()?;
		self.skip(4)?;
		Ok(ans)
	}

	pub fn unpack_i32(&mut self) -> io::Result<i32> {
		let ans:i32 = Cursor::new(self.remaining()).read_i32::<BigEndian>()?;
		self.skip(4)?;
		Ok(ans)
	}

	// An enum is just an i32 with a restricted set of values that depends on the application
	pub fn unpack_enum(&mut self) -> io::Result<i32> { self.unpack_i32() }

	pub fn unpack_variable_len_opaque(&mut self) -> io::Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		if n > self.remaining().len() {
			return Err(err("Opaque length runs past the end of the XDR buffer"));
		}
		let ans:Vec<u8> = self.remaining()[..n].to_vec();

		// Skip the padding as well so the next item stays aligned
		let padded = (n + 3) & !3;
		self.skip(padded.min(self.remaining().len()))?;
		Ok(ans)
	}

}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn opaque_is_padded_to_four_bytes() {
		let mut packer = Packer::new();
		packer.pack_variable_len_opaque(b"inst0").unwrap();
		packer.pack_u32(7).unwrap();
		assert_eq!(packer.as_bytes().len(), 4 + 8 + 4);

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.as_bytes());
		assert_eq!(unpacker.unpack_variable_len_opaque().unwrap(), b"inst0".to_vec());
		assert_eq!(unpacker.unpack_u32().unwrap(), 7);
		assert!(unpacker.all_data_consumed());
	}

	#[test]
	fn reading_past_the_end_fails() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&[0, 0, 0, 9, 1, 2]);
		assert!(unpacker.unpack_variable_len_opaque().is_err());
	}
}
