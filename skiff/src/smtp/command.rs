use super::args::Domain;

/// The commands we send to a relay, in the order a delivery sends them.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
	Ehlo(Domain),
	Mail(String),
	Rcpt(String),
	Data,
	Quit,
}

impl std::fmt::Display for Command {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Command::Ehlo(identity) => write!(f, "EHLO {}", identity),
			Command::Mail(reverse_path) => write!(f, "MAIL FROM: <{}>", reverse_path),
			Command::Rcpt(forward_path) => write!(f, "RCPT TO: <{}>", forward_path),
			Command::Data => write!(f, "DATA"),
			Command::Quit => write!(f, "QUIT"),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn command_lines() {
		let identity: Domain = "client.example".parse().unwrap();

		assert_eq!(Command::Ehlo(identity).to_string(), "EHLO client.example");
		assert_eq!(
			Command::Mail("a@x.com".into()).to_string(),
			"MAIL FROM: <a@x.com>"
		);
		assert_eq!(
			Command::Rcpt("b@x.com".into()).to_string(),
			"RCPT TO: <b@x.com>"
		);
		assert_eq!(Command::Data.to_string(), "DATA");
		assert_eq!(Command::Quit.to_string(), "QUIT");
	}
}
