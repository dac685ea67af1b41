use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
	pub code: ResponseCode,
	messages: Vec<String>,
}

impl Response {
	pub fn new(code: ResponseCode) -> Self {
		Self {
			code,
			messages: vec![],
		}
	}

	pub fn with_message<S: Into<String>>(code: ResponseCode, message: S) -> Self {
		Self {
			code,
			messages: vec![message.into()],
		}
	}

	pub fn push<S: Into<String>>(&mut self, message: S) {
		self.messages.push(message.into());
	}

	pub fn code(&self) -> ResponseCode {
		self.code
	}

	pub fn messages(&self) -> &[String] {
		&self.messages
	}
}

/// The longest reply line a relay may send, CRLF included (RFC 5321
/// 4.5.3.1.5).
pub const MAX_REPLY_LINE: usize = 512;

/// Whether a reply line is followed by more lines of the same reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
	/// `250-text`
	Continuation,
	/// `250 text`
	Final,
}

/// A single line of a server reply, split into its code, separator and text.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyLine {
	pub code: ResponseCode,
	pub separator: Separator,
	pub text: String,
}

impl ReplyLine {
	/// Parses one line with its line ending already removed.
	///
	/// A line must start with three digits followed by a hyphen (more lines
	/// follow) or a space (last line). Anything else is malformed, including
	/// a bare code and lines too long for a reply.
	pub fn parse(line: &str) -> Result<Self, ParseResponseError> {
		let malformed = || ParseResponseError::MalformedResponse(line.into());

		if line.len() > MAX_REPLY_LINE - 2 {
			return Err(malformed());
		}

		let (code, rest) = match (line.get(..3), line.get(3..)) {
			(Some(code), Some(rest)) => (code, rest),
			_ => return Err(malformed()),
		};

		if !code.bytes().all(|b| b.is_ascii_digit()) {
			return Err(malformed());
		}
		let code: ResponseCode = code.parse()?;

		let (separator, text) = match rest.chars().next() {
			Some(' ') => (Separator::Final, &rest[1..]),
			Some('-') => (Separator::Continuation, &rest[1..]),
			_ => return Err(malformed()),
		};

		Ok(Self {
			code,
			separator,
			text: text.to_owned(),
		})
	}

	pub fn is_final(&self) -> bool {
		self.separator == Separator::Final
	}
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseResponseError {
	#[error("the response was malformed: {0:?}")]
	MalformedResponse(String),
	#[error("the response code did not make sense")]
	MalformedResponseCode,
	#[error("the response code was invalid")]
	InvalidResponseCode(#[from] ParseIntError),
}

#[derive(Clone, Copy, Debug)]
pub enum ResponseCode {
	UnrecognizedCommand,   // 500
	InvalidParameters,     // 501
	CommandNotImplemented, // 502
	BadCommandSequence,    // 503

	SystemStatus,   // 211
	HelpMessage,    // 214
	ServiceReady,   // 220
	ServiceClosing, // 221

	ServiceNotAvailable, // 421 (Service not available, closing transmission channel)

	Okay,                    // 250
	UserNotLocalWillForward, // 251 (will forward to <forward-path>)
	CannotVrfyUser,          // 252 (but will attempt delivery)

	UnableToAcceptParameters,  // 455
	MailRcptParametersError,   // 555
	TemporaryMailFail,         // 450 (action not taken: mailbox unavailable)
	PermanentMailFail,         // 550
	ProcessingError,           // 451
	UserNotLocal,              // 551 (please try <forward-path>)
	InsufficientStorage,       // 452
	ExceededStorageAllocation, // 552
	MailboxNameNotAllowed,     // 553

	StartMailInput,  // 354
	TransactionFail, // 554

	UnknownPositiveCompletion(u16), // 2xx
	UnknownPositiveWaiting(u16),    // 3xx
	UnknownNegativeTemporary(u16),  // 4xx
	UnknownNegativePermanent(u16),  // 5xx
}

impl PartialEq for ResponseCode {
	fn eq(&self, other: &Self) -> bool {
		self.as_code() == other.as_code()
	}
}

impl std::fmt::Display for ResponseCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_code())
	}
}

impl ResponseCode {
	pub fn from_code(code: u16) -> Option<ResponseCode> {
		let response_code = match code {
			500 => Some(ResponseCode::UnrecognizedCommand),
			501 => Some(ResponseCode::InvalidParameters),
			502 => Some(ResponseCode::CommandNotImplemented),
			503 => Some(ResponseCode::BadCommandSequence),

			211 => Some(ResponseCode::SystemStatus),
			214 => Some(ResponseCode::HelpMessage),
			220 => Some(ResponseCode::ServiceReady),
			221 => Some(ResponseCode::ServiceClosing),

			421 => Some(ResponseCode::ServiceNotAvailable),

			250 => Some(ResponseCode::Okay),
			251 => Some(ResponseCode::UserNotLocalWillForward),
			252 => Some(ResponseCode::CannotVrfyUser),

			455 => Some(ResponseCode::UnableToAcceptParameters),
			555 => Some(ResponseCode::MailRcptParametersError),
			450 => Some(ResponseCode::TemporaryMailFail),
			550 => Some(ResponseCode::PermanentMailFail),
			451 => Some(ResponseCode::ProcessingError),
			551 => Some(ResponseCode::UserNotLocal),
			452 => Some(ResponseCode::InsufficientStorage),
			552 => Some(ResponseCode::ExceededStorageAllocation),
			553 => Some(ResponseCode::MailboxNameNotAllowed),

			354 => Some(ResponseCode::StartMailInput),
			554 => Some(ResponseCode::TransactionFail),
			_ => None,
		};

		if response_code.is_none() {
			match code / 100 {
				2 => Some(ResponseCode::UnknownPositiveCompletion(code)),
				3 => Some(ResponseCode::UnknownPositiveWaiting(code)),
				4 => Some(ResponseCode::UnknownNegativeTemporary(code)),
				5 => Some(ResponseCode::UnknownNegativePermanent(code)),
				_ => None,
			}
		} else {
			response_code
		}
	}

	pub fn as_code(self) -> u16 {
		match self {
			ResponseCode::UnrecognizedCommand => 500,
			ResponseCode::InvalidParameters => 501,
			ResponseCode::CommandNotImplemented => 502,
			ResponseCode::BadCommandSequence => 503,

			ResponseCode::SystemStatus => 211,
			ResponseCode::HelpMessage => 214,
			ResponseCode::ServiceReady => 220,
			ResponseCode::ServiceClosing => 221,

			ResponseCode::ServiceNotAvailable => 421,

			ResponseCode::Okay => 250,
			ResponseCode::UserNotLocalWillForward => 251,
			ResponseCode::CannotVrfyUser => 252,

			ResponseCode::UnableToAcceptParameters => 455,
			ResponseCode::MailRcptParametersError => 555,
			ResponseCode::TemporaryMailFail => 450,
			ResponseCode::PermanentMailFail => 550,
			ResponseCode::ProcessingError => 451,
			ResponseCode::UserNotLocal => 551,
			ResponseCode::InsufficientStorage => 452,
			ResponseCode::ExceededStorageAllocation => 552,
			ResponseCode::MailboxNameNotAllowed => 553,

			ResponseCode::StartMailInput => 354,
			ResponseCode::TransactionFail => 554,

			ResponseCode::UnknownPositiveCompletion(code) => code,
			ResponseCode::UnknownPositiveWaiting(code) => code,
			ResponseCode::UnknownNegativeTemporary(code) => code,
			ResponseCode::UnknownNegativePermanent(code) => code,
		}
	}

	/// 4xx: the relay might accept the same thing later.
	pub fn is_transient(&self) -> bool {
		self.as_code() / 100 == 4
	}
}

impl std::str::FromStr for ResponseCode {
	type Err = ParseResponseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.len() == 3 {
			ResponseCode::from_code(s.parse()?).ok_or(ParseResponseError::MalformedResponseCode)
		} else {
			Err(ParseResponseError::MalformedResponseCode)
		}
	}
}
