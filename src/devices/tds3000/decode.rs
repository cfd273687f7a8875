//! Turns a raw `CURVE?` reply into physical amplitudes.
//!
//! Binary replies are IEEE 488.2 definite-length blocks: `#<x><yy..><payload>` where `<x>` is
//! the number of `<y>` digits and `<yy..>` the payload length in bytes. ASCII replies are
//! comma-separated integers. Either way, raw codes are scaled with
//! `(raw - y_off) * y_mult + y_zero`.

use std::io::Cursor;
use std::str;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian { Big, Little }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
	Ascii,
	Binary(Endian),
}

impl Encoding {

	/// Interprets a `DATA:ENCDG?` reply. Only ASCII and the signed binary encodings
	/// (`RIBINARY`, `SRIBINARY`) are decodable; anything else gives `None`.
	pub fn from_reply(reply:&str) -> Option<Self> {
		let reply = reply.trim().to_ascii_uppercase();
		if reply.starts_with("ASCI") {
			Some(Encoding::Ascii)
		} else if reply.starts_with("SRI") {
			Some(Encoding::Binary(Endian::Little))
		} else if reply.starts_with("RI") {
			Some(Encoding::Binary(Endian::Big))
		} else {
			None
		}
	}

}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
	pub y_mult: f64,
	pub y_zero: f64,
	pub y_off: f64,
}

impl Scaling {

	pub fn apply(&self, raw:f64) -> f64 { (raw - self.y_off) * self.y_mult + self.y_zero }

}

impl Default for Scaling {
	fn default() -> Self { Self { y_mult: 1.0, y_zero: 0.0, y_off: 0.0 } }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
	pub samples: Vec<f64>,
	pub min: f64,
	pub max: f64,
}

/// Collects scaled samples while tracking the extrema. Seeded from the first sample.
struct Accumulator {
	scaling: Scaling,
	samples: Vec<f64>,
	min: f64,
	max: f64,
}

impl Accumulator {

	fn new(scaling:Scaling, capacity:usize) -> Self {
		Self { scaling, samples: Vec::with_capacity(capacity), min: 0.0, max: 0.0 }
	}

	fn push(&mut self, raw:f64) {
		let v = self.scaling.apply(raw);
		if self.samples.is_empty() {
			self.min = v;
			self.max = v;
		} else if v < self.min {
			self.min = v;
		} else if v > self.max {
			self.max = v;
		}
		self.samples.push(v);
	}

	fn finish(self) -> Decoded {
		Decoded { samples: self.samples, min: self.min, max: self.max }
	}

}

/// Where the payload of a binary block starts and how long the header says it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedHeader {
	pub declared_byte_count: usize,
	pub data_width: u8,
	pub payload_offset: usize,
}

pub fn parse_header(raw:&[u8], data_size:usize, data_width:u8) -> Result<DecodedHeader, DecodeError> {
	match raw.first() {
		Some(b'#') => { },
		Some(b) => return Err(DecodeError::BadHeader(format!("expected '#' but got {:#04x}", b))),
		None => return Err(DecodeError::BadHeader("empty reply".to_owned())),
	}

	let y_length = match raw.get(1) {
		Some(x) => (x & 0x0f) as usize,
		None => return Err(DecodeError::BadHeader("missing length digit count".to_owned())),
	};
	if y_length == 0 {
		return Err(DecodeError::BadHeader("indefinite-length blocks are not supported".to_owned()));
	}

	let digits = raw.get(2..2 + y_length)
		.ok_or_else(|| DecodeError::BadHeader(format!("header announces {} length digits but the reply is shorter", y_length)))?;
	let declared_byte_count = str::from_utf8(digits).ok()
		.filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
		.and_then(|s| s.parse::<usize>().ok())
		.ok_or_else(|| DecodeError::BadHeader(format!("length digits {:?} are not a number", String::from_utf8_lossy(digits))))?;

	let expected = data_size.checked_mul(data_width as usize)
		.ok_or(DecodeError::SizeOverflow{ data_size, data_width })?;
	if declared_byte_count != expected {
		return Err(DecodeError::LengthMismatch{ declared: declared_byte_count, expected });
	}

	Ok(DecodedHeader { declared_byte_count, data_width, payload_offset: 2 + y_length })
}

pub fn decode(raw:&[u8], encoding:Encoding, data_size:usize, data_width:u8, scaling:Scaling) -> Result<Decoded, DecodeError> {
	if data_size == 0 {
		return Err(DecodeError::Empty);
	}
	match encoding {
		Encoding::Ascii => decode_ascii(raw, data_size, scaling),
		Encoding::Binary(endian) => decode_binary(raw, endian, data_size, data_width, scaling),
	}
}

fn decode_ascii(raw:&[u8], data_size:usize, scaling:Scaling) -> Result<Decoded, DecodeError> {
	let text = String::from_utf8_lossy(raw);
	let tokens:Vec<&str> = text.trim().split(',').map(str::trim).collect();
	if tokens.len() != data_size {
		return Err(DecodeError::LengthMismatch{ declared: tokens.len(), expected: data_size });
	}

	let mut acc = Accumulator::new(scaling, data_size);
	for (index, token) in tokens.into_iter().enumerate() {
		// `f64::from_str` also takes "NaN" and "inf", which are not sample codes
		let raw_value = token.parse::<f64>().ok()
			.filter(|v| v.is_finite())
			.ok_or_else(|| DecodeError::BadSample{ index, token: token.to_owned() })?;
		acc.push(raw_value);
	}
	Ok(acc.finish())
}

fn decode_binary(raw:&[u8], endian:Endian, data_size:usize, data_width:u8, scaling:Scaling) -> Result<Decoded, DecodeError> {
	if data_width != 1 && data_width != 2 {
		return Err(DecodeError::UnsupportedWidth(data_width));
	}
	let header = parse_header(raw, data_size, data_width)?;

	let payload = &raw[header.payload_offset..];
	if payload.len() < header.declared_byte_count {
		return Err(DecodeError::Truncated{ expected: header.declared_byte_count, available: payload.len() });
	}

	let mut rdr = Cursor::new(&payload[..header.declared_byte_count]);
	let mut acc = Accumulator::new(scaling, data_size);
	for _ in 0..data_size {
		// The length check above guarantees these reads stay in bounds
		let raw_value = match (data_width, endian) {
			(1, _)              => rdr.read_i8().map(f64::from),
			(_, Endian::Big)    => rdr.read_i16::<BigEndian>().map(f64::from),
			(_, Endian::Little) => rdr.read_i16::<LittleEndian>().map(f64::from),
		}.map_err(|_| DecodeError::Truncated{ expected: header.declared_byte_count, available: payload.len() })?;
		acc.push(raw_value);
	}
	Ok(acc.finish())
}

#[cfg(test)]
mod test {
	use super::*;

	fn block(header:&str, payload:&[u8]) -> Vec<u8> {
		let mut v = header.as_bytes().to_vec();
		v.extend_from_slice(payload);
		v.push(b'\n');
		v
	}

	#[test]
	fn ascii_tokens() {
		let d = decode(b"0,10,20,5", Encoding::Ascii, 4, 1, Scaling::default()).unwrap();
		assert_eq!(d.samples, vec![0.0, 10.0, 20.0, 5.0]);
		assert_eq!(d.min, 0.0);
		assert_eq!(d.max, 20.0);
	}

	#[test]
	fn ascii_applies_affine_scaling() {
		let scaling = Scaling { y_mult: 0.5, y_zero: 1.0, y_off: 2.0 };
		let d = decode(b"2,4,-2\n", Encoding::Ascii, 3, 2, scaling).unwrap();
		assert_eq!(d.samples, vec![1.0, 2.0, -1.0]);
		assert_eq!((d.min, d.max), (-1.0, 2.0));
	}

	#[test]
	fn ascii_token_count_must_match() {
		assert_eq!(
			decode(b"1,2,3", Encoding::Ascii, 4, 1, Scaling::default()),
			Err(DecodeError::LengthMismatch{ declared: 3, expected: 4 })
		);
	}

	#[test]
	fn ascii_rejects_garbage() {
		assert_eq!(
			decode(b"1,x,3", Encoding::Ascii, 3, 1, Scaling::default()),
			Err(DecodeError::BadSample{ index: 1, token: "x".to_owned() })
		);
	}

	#[test]
	fn ascii_rejects_non_finite_tokens() {
		assert_eq!(
			decode(b"1,NaN,3", Encoding::Ascii, 3, 1, Scaling::default()),
			Err(DecodeError::BadSample{ index: 1, token: "NaN".to_owned() })
		);
		assert_eq!(
			decode(b"inf,2", Encoding::Ascii, 2, 1, Scaling::default()),
			Err(DecodeError::BadSample{ index: 0, token: "inf".to_owned() })
		);
		assert!(matches!(
			decode(b"4,-inf", Encoding::Ascii, 2, 1, Scaling::default()),
			Err(DecodeError::BadSample{ index: 1, .. })
		));
	}

	#[test]
	fn binary_width_one() {
		let scaling = Scaling { y_mult: 2.0, y_zero: 0.0, y_off: 0.0 };
		let d = decode(&block("#14", &[10, 20, 30, 5]), Encoding::Binary(Endian::Big), 4, 1, scaling).unwrap();
		assert_eq!(d.samples, vec![20.0, 40.0, 60.0, 10.0]);
		assert_eq!(d.min, 10.0);
		assert_eq!(d.max, 60.0);
	}

	#[test]
	fn binary_width_one_is_signed() {
		let d = decode(&block("#12", &[0xff, 0x80]), Encoding::Binary(Endian::Big), 2, 1, Scaling::default()).unwrap();
		assert_eq!(d.samples, vec![-1.0, -128.0]);
	}

	#[test]
	fn binary_width_two_big_endian() {
		let payload = [0xff, 0xff, 0x01, 0x00, 0x00, 0x02, 0xfe, 0xd4];
		let d = decode(&block("#18", &payload), Encoding::Binary(Endian::Big), 4, 2, Scaling::default()).unwrap();
		assert_eq!(d.samples, vec![-1.0, 256.0, 2.0, -300.0]);
		assert_eq!((d.min, d.max), (-300.0, 256.0));
	}

	#[test]
	fn binary_width_two_little_endian() {
		let payload = [0x00, 0x01, 0xd4, 0xfe];
		let d = decode(&block("#14", &payload), Encoding::Binary(Endian::Little), 2, 2, Scaling::default()).unwrap();
		assert_eq!(d.samples, vec![256.0, -300.0]);
	}

	#[test]
	fn extrema_seeded_from_first_sample() {
		let d = decode(b"-5,-3,-9", Encoding::Ascii, 3, 1, Scaling::default()).unwrap();
		assert_eq!((d.min, d.max), (-9.0, -3.0));

		let d = decode(&block("#13", &[7, 9, 8]), Encoding::Binary(Endian::Big), 3, 1, Scaling::default()).unwrap();
		assert_eq!((d.min, d.max), (7.0, 9.0));
	}

	#[test]
	fn declared_length_mismatch() {
		let r = decode(&block("#15", &[10, 20, 30, 5, 0]), Encoding::Binary(Endian::Big), 4, 1, Scaling::default());
		assert_eq!(r, Err(DecodeError::LengthMismatch{ declared: 5, expected: 4 }));
	}

	#[test]
	fn bad_first_byte() {
		let r = decode(&block("@14", &[1, 2, 3, 4]), Encoding::Binary(Endian::Big), 4, 1, Scaling::default());
		assert!(matches!(r, Err(DecodeError::BadHeader(_))));
	}

	#[test]
	fn non_digit_length() {
		let r = decode(&block("#2x4", &[1, 2, 3, 4]), Encoding::Binary(Endian::Big), 4, 1, Scaling::default());
		assert!(matches!(r, Err(DecodeError::BadHeader(_))));
	}

	#[test]
	fn short_payload() {
		let r = decode(b"#14\x01\x02", Encoding::Binary(Endian::Big), 4, 1, Scaling::default());
		assert_eq!(r, Err(DecodeError::Truncated{ expected: 4, available: 2 }));
	}

	#[test]
	fn five_digit_header_offset() {
		let h = parse_header(b"#520000", 10000, 2).unwrap();
		assert_eq!(h, DecodedHeader{ declared_byte_count: 20000, data_width: 2, payload_offset: 7 });
	}

	#[test]
	fn oversized_sample_count_is_an_error() {
		assert_eq!(
			decode(b"#10", Encoding::Binary(Endian::Big), usize::MAX, 2, Scaling::default()),
			Err(DecodeError::SizeOverflow{ data_size: usize::MAX, data_width: 2 })
		);
	}

	#[test]
	fn encoding_reply_prefixes() {
		assert_eq!(Encoding::from_reply("ASCII"), Some(Encoding::Ascii));
		assert_eq!(Encoding::from_reply("RIBINARY"), Some(Encoding::Binary(Endian::Big)));
		assert_eq!(Encoding::from_reply("SRIBINARY\n"), Some(Encoding::Binary(Endian::Little)));
		assert_eq!(Encoding::from_reply("RPBINARY"), None);
		assert_eq!(Encoding::from_reply("SRPBINARY"), None);
	}
}
