/// One outbound email. Nothing here is validated; the relay is the judge of
/// whether the addresses make sense.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
	from: String,
	to: Vec<String>,
	ccs: Vec<String>,
	subject: String,
	content: String,
}

impl Message {
	pub fn new<F, S, C>(from: F, to: Vec<String>, ccs: Vec<String>, subject: S, content: C) -> Self
	where
		F: Into<String>,
		S: Into<String>,
		C: Into<String>,
	{
		Self {
			from: from.into(),
			to,
			ccs,
			subject: subject.into(),
			content: content.into(),
		}
	}

	pub fn from(&self) -> &str {
		&self.from
	}

	/// Primary recipients. These are rendered as `to:` headers.
	pub fn to(&self) -> &[String] {
		&self.to
	}

	/// Carbon-copy recipients. These only appear in the envelope.
	pub fn ccs(&self) -> &[String] {
		&self.ccs
	}

	pub fn subject(&self) -> &str {
		&self.subject
	}

	pub fn content(&self) -> &str {
		&self.content
	}

	/// Every envelope recipient, primary recipients first. Duplicates are kept.
	pub fn recipients(&self) -> impl Iterator<Item = &str> {
		self.to.iter().chain(self.ccs.iter()).map(String::as_str)
	}

	/// Renders what is sent after the relay accepts DATA, up to and including
	/// the lone `.` that ends it.
	///
	/// Body lines are re-terminated with CRLF, and a line starting with a
	/// period gets another one prepended so the relay can strip it again.
	pub fn payload(&self) -> String {
		let mut payload = String::from("Content-Type: text/plain; charset=utf-8\r\n");
		payload.push_str(&format!("from: {}\r\n", self.from));

		for to in &self.to {
			payload.push_str(&format!("to: {}\r\n", to));
		}

		payload.push_str(&format!("Subject: {}\r\n\r\n", self.subject));

		let body = self
			.content
			.strip_suffix('\n')
			.map(|body| body.strip_suffix('\r').unwrap_or(body))
			.unwrap_or(&self.content);

		for line in body.split('\n') {
			let line = line.strip_suffix('\r').unwrap_or(line);

			if line.starts_with('.') {
				payload.push('.');
			}
			payload.push_str(line);
			payload.push_str("\r\n");
		}

		payload.push_str(".\r\n");
		payload
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn message(content: &str) -> Message {
		Message::new(
			"a@x.com",
			vec!["b@x.com".into(), "c@x.com".into()],
			vec!["d@x.com".into()],
			"Hi",
			content,
		)
	}

	#[test]
	fn recipients_are_to_then_ccs() {
		let mut message = message("Hello");
		message.ccs.push("b@x.com".into());

		assert_eq!(
			message.recipients().collect::<Vec<_>>(),
			["b@x.com", "c@x.com", "d@x.com", "b@x.com"]
		);
	}

	#[test]
	fn payload_headers_and_body() {
		assert_eq!(
			message("Hello").payload(),
			"Content-Type: text/plain; charset=utf-8\r\n\
			from: a@x.com\r\n\
			to: b@x.com\r\n\
			to: c@x.com\r\n\
			Subject: Hi\r\n\
			\r\n\
			Hello\r\n\
			.\r\n"
		);
	}

	#[test]
	fn payload_never_renders_ccs() {
		let payload = message("Hello").payload();

		assert_eq!(payload.matches("to: ").count(), 2);
		assert!(!payload.contains("d@x.com"));
	}

	#[test]
	fn payload_normalises_line_endings() {
		let payload = message("one\ntwo\r\nthree\n").payload();

		assert!(payload.ends_with("\r\n\r\none\r\ntwo\r\nthree\r\n.\r\n"));
	}

	#[test]
	fn payload_stuffs_leading_dots() {
		let payload = message("first\n.\n..twice").payload();

		assert!(payload.ends_with("\r\n\r\nfirst\r\n..\r\n...twice\r\n.\r\n"));
	}

	#[test]
	fn payload_empty_body() {
		assert!(message("").payload().ends_with("Subject: Hi\r\n\r\n\r\n.\r\n"));
	}
}
