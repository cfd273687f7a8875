//! Scripted transport that records every call and answers from canned replies.

use std::collections::{HashMap, VecDeque};

use super::{Transport, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
	Write(String),
	Query(String),
	ReadBytes { capacity_hint: usize, expected_count: usize },
	SetTimeout(u32),
	Clear,
}

/// Replies are looked up by the exact command text. One-shot replies queued with
/// [`MockTransport::reply`] are used first, then the standing reply set with
/// [`MockTransport::always`]. A query with neither answers [`TransportError::Timeout`],
/// which is what a real instrument does with a command it doesn't recognise.
#[derive(Debug, Default)]
pub struct MockTransport {
	calls: Vec<Call>,
	queued: HashMap<String, VecDeque<String>>,
	standing: HashMap<String, String>,
	blocks: VecDeque<Vec<u8>>,
	switches: Vec<(String, String, String)>,
	fail_on: Option<String>,
}

impl MockTransport {

	pub fn new() -> Self { Self::default() }

	pub fn reply(mut self, command:&str, reply:&str) -> Self {
		self.queued.entry(command.to_owned()).or_default().push_back(reply.to_owned());
		self
	}

	pub fn always(mut self, command:&str, reply:&str) -> Self {
		self.standing.insert(command.to_owned(), reply.to_owned());
		self
	}

	/// Once `trigger` is written, the standing reply to `command` becomes `reply`.
	pub fn when(mut self, trigger:&str, command:&str, reply:&str) -> Self {
		self.switches.push((trigger.to_owned(), command.to_owned(), reply.to_owned()));
		self
	}

	/// Queues a block handed out by the next `read_bytes`.
	pub fn block(mut self, bytes:Vec<u8>) -> Self {
		self.blocks.push_back(bytes);
		self
	}

	/// Any write or query of exactly `command` fails with an I/O error.
	pub fn fail_on(mut self, command:&str) -> Self {
		self.fail_on = Some(command.to_owned());
		self
	}

	pub fn calls(&self) -> &[Call] { &self.calls }

	/// Commands sent, in order, whether written or queried.
	pub fn commands(&self) -> Vec<&str> {
		self.calls.iter().filter_map(|c| match c {
			Call::Write(s) | Call::Query(s) => Some(s.as_str()),
			_ => None,
		}).collect()
	}

	pub fn writes(&self) -> Vec<&str> {
		self.calls.iter().filter_map(|c| match c {
			Call::Write(s) => Some(s.as_str()),
			_ => None,
		}).collect()
	}

	pub fn count(&self, command:&str) -> usize {
		self.commands().into_iter().filter(|c| *c == command).count()
	}

	fn check_failure(&self, command:&str) -> Result<(), TransportError> {
		match &self.fail_on {
			Some(f) if f == command => Err(TransportError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "scripted failure"))),
			_ => Ok(()),
		}
	}

}

impl Transport for MockTransport {

	fn write(&mut self, command:&str) -> Result<(), TransportError> {
		self.calls.push(Call::Write(command.to_owned()));
		self.check_failure(command)?;

		for (trigger, target, reply) in &self.switches {
			if trigger == command {
				self.standing.insert(target.clone(), reply.clone());
			}
		}
		Ok(())
	}

	fn read_bytes(&mut self, capacity_hint:usize, expected_count:usize) -> Result<Vec<u8>, TransportError> {
		self.calls.push(Call::ReadBytes{ capacity_hint, expected_count });
		self.blocks.pop_front().ok_or(TransportError::Timeout)
	}

	fn set_timeout(&mut self, ms:u32) -> Result<(), TransportError> {
		self.calls.push(Call::SetTimeout(ms));
		Ok(())
	}

	fn clear(&mut self) -> Result<(), TransportError> {
		self.calls.push(Call::Clear);
		Ok(())
	}

	fn query(&mut self, command:&str) -> Result<String, TransportError> {
		self.calls.push(Call::Query(command.to_owned()));
		self.check_failure(command)?;

		if let Some(reply) = self.queued.get_mut(command).and_then(|q| q.pop_front()) {
			return Ok(reply);
		}
		self.standing.get(command).cloned().ok_or(TransportError::Timeout)
	}

}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn queued_replies_run_out_into_standing_reply() {
		let mut mock = MockTransport::new().reply("BUSY?", "1").always("BUSY?", "0");
		assert_eq!(mock.query("BUSY?").unwrap(), "1");
		assert_eq!(mock.query("BUSY?").unwrap(), "0");
		assert_eq!(mock.query("BUSY?").unwrap(), "0");
		assert_eq!(mock.count("BUSY?"), 3);
	}

	#[test]
	fn writes_switch_standing_replies() {
		let mut mock = MockTransport::new().always("BUSY?", "1").when("ACQUIRE:STATE STOP", "BUSY?", "0");
		assert_eq!(mock.query("BUSY?").unwrap(), "1");
		mock.write("ACQUIRE:STATE STOP").unwrap();
		assert_eq!(mock.query("BUSY?").unwrap(), "0");
	}

	#[test]
	fn unscripted_query_times_out() {
		let mut mock = MockTransport::new();
		assert!(matches!(mock.query("*IDN?"), Err(TransportError::Timeout)));
		assert_eq!(mock.calls(), &[Call::Query("*IDN?".to_owned())]);
	}
}
