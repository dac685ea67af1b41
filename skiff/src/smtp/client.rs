use std::fmt::Display;

use thiserror::Error;

use super::{args::Domain, Command, Command::*, Message, ReplyLine, Response, ResponseCode};

/// Drives one delivery. It never touches the network: feed it every line the
/// relay sends and write out whatever [Output] it hands back.
pub struct Client<'m> {
	state: State,
	identity: Domain,
	message: &'m Message,
	recipients: Vec<&'m str>,

	reply: Option<Response>,
	last_reply: Option<Response>,
}

impl<'m> Client<'m> {
	pub fn initiate(message: &'m Message, identity: Domain) -> Self {
		Self {
			state: State::Initiated,
			identity,
			message,
			recipients: message.recipients().collect(),
			reply: None,
			last_reply: None,
		}
	}

	/// Takes one line from the relay, with or without its line ending.
	///
	/// Returns `Ok(None)` while a multiline reply is still coming in. Once the
	/// final line of a reply arrives its code is checked against the one the
	/// current step needs, and the next thing to send is returned.
	pub fn push(&mut self, line: &str) -> Result<Option<Output>, ProtocolError> {
		let line = line.trim_end_matches(['\r', '\n']);

		if self.state == State::ShouldExit {
			return Ok(None);
		}

		let reply_line = ReplyLine::parse(line).map_err(|_| ProtocolError::MalformedReply {
			stage: self.stage(),
			expected: self.expected(),
			line: line.into(),
		})?;
		let is_final = reply_line.is_final();
		let ReplyLine { code, text, .. } = reply_line;

		match self.reply.as_mut() {
			Some(reply) => reply.push(text),
			None => self.reply = Some(Response::with_message(code, text)),
		}

		if !is_final {
			return Ok(None);
		}

		// The final line's code is the one that counts
		let mut reply = self.reply.take().unwrap_or_else(|| Response::new(code));
		reply.code = code;
		self.last_reply = Some(reply);

		if code != self.expected() {
			return Err(ProtocolError::UnexpectedReply {
				stage: self.stage(),
				expected: self.expected(),
				received: code,
				line: line.into(),
			});
		}

		Ok(Some(self.advance()))
	}

	/// The error to report when the relay hangs up before we're done.
	pub fn closed(&self) -> ProtocolError {
		ProtocolError::ConnectionClosed {
			stage: self.stage(),
			expected: self.expected(),
		}
	}

	pub fn should_exit(&self) -> bool {
		self.state == State::ShouldExit
	}

	/// The most recent complete reply, with the text of every line.
	pub fn last_reply(&self) -> Option<&Response> {
		self.last_reply.as_ref()
	}

	/// The step currently waiting on a reply.
	pub fn stage(&self) -> Stage {
		match self.state {
			State::Initiated => Stage::Greeting,
			State::SentEhlo => Stage::Ehlo,
			State::SentReversePath => Stage::MailFrom,
			State::SentForwardPath(index) => {
				Stage::RcptTo(self.recipients.get(index).copied().unwrap_or_default().into())
			}
			State::SentData => Stage::Data,
			State::SentMessage => Stage::EndOfData,
			State::SentQuit | State::ShouldExit => Stage::Quit,
		}
	}

	fn expected(&self) -> ResponseCode {
		match self.state {
			State::Initiated => ResponseCode::ServiceReady,
			State::SentData => ResponseCode::StartMailInput,
			State::SentQuit | State::ShouldExit => ResponseCode::ServiceClosing,
			_ => ResponseCode::Okay,
		}
	}

	fn advance(&mut self) -> Output {
		match self.state {
			State::Initiated => {
				self.state = State::SentEhlo;
				Output::Command(Ehlo(self.identity.clone()))
			}
			State::SentEhlo => {
				self.state = State::SentReversePath;
				Output::Command(Mail(self.message.from().into()))
			}
			State::SentReversePath => self.next_forward_path(0),
			State::SentForwardPath(index) => self.next_forward_path(index + 1),
			State::SentData => {
				self.state = State::SentMessage;
				Output::Data(self.message.payload())
			}
			State::SentMessage => {
				self.state = State::SentQuit;
				Output::Command(Quit)
			}
			State::SentQuit | State::ShouldExit => {
				self.state = State::ShouldExit;
				Output::Done
			}
		}
	}

	fn next_forward_path(&mut self, index: usize) -> Output {
		match self.recipients.get(index) {
			Some(path) => {
				self.state = State::SentForwardPath(index);
				Output::Command(Rcpt((*path).into()))
			}
			None => {
				self.state = State::SentData;
				Output::Command(Data)
			}
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
	Initiated,
	SentEhlo,
	SentReversePath,
	SentForwardPath(usize),
	SentData,
	SentMessage,
	SentQuit,
	ShouldExit,
}

#[derive(Debug)]
pub enum Output {
	Command(Command),
	/// The message payload, already terminated
	Data(String),
	Done,
}

impl Display for Output {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Command(command) => write!(f, "{}\r\n", command),
			Self::Data(data) => write!(f, "{}", data),
			Self::Done => Ok(()),
		}
	}
}

/// Which step of the exchange a reply belonged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
	Greeting,
	Ehlo,
	MailFrom,
	RcptTo(String),
	Data,
	EndOfData,
	Quit,
}

impl Display for Stage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Greeting => write!(f, "greeting"),
			Self::Ehlo => write!(f, "EHLO"),
			Self::MailFrom => write!(f, "MAIL FROM"),
			Self::RcptTo(recipient) => write!(f, "RCPT TO <{}>", recipient),
			Self::Data => write!(f, "DATA"),
			Self::EndOfData => write!(f, "end of data"),
			Self::Quit => write!(f, "QUIT"),
		}
	}
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
	#[error("{stage}: expected {expected}, relay replied {line:?}")]
	UnexpectedReply {
		stage: Stage,
		expected: ResponseCode,
		received: ResponseCode,
		line: String,
	},
	#[error("{stage}: relay sent a malformed reply {line:?}")]
	MalformedReply {
		stage: Stage,
		expected: ResponseCode,
		line: String,
	},
	#[error("{stage}: connection closed while waiting for {expected}")]
	ConnectionClosed { stage: Stage, expected: ResponseCode },
}

impl ProtocolError {
	pub fn stage(&self) -> &Stage {
		match self {
			Self::UnexpectedReply { stage, .. }
			| Self::MalformedReply { stage, .. }
			| Self::ConnectionClosed { stage, .. } => stage,
		}
	}

	/// The offending line. `None` if the relay hung up instead of replying.
	pub fn line(&self) -> Option<&str> {
		match self {
			Self::UnexpectedReply { line, .. } | Self::MalformedReply { line, .. } => {
				Some(line.as_str())
			}
			Self::ConnectionClosed { .. } => None,
		}
	}

	/// Whether the relay turned us down with a 4xx, which is worth another
	/// attempt later.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::UnexpectedReply { received, .. } => received.is_transient(),
			_ => false,
		}
	}

	/// The recipient the relay refused, if that is why delivery stopped.
	pub fn rejected_recipient(&self) -> Option<&str> {
		match self {
			Self::UnexpectedReply {
				stage: Stage::RcptTo(recipient),
				..
			} => Some(recipient.as_str()),
			_ => None,
		}
	}
}
