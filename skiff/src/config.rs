use std::time::Duration;

use crate::smtp::args::Domain;

/// Where to relay through, and how we present ourselves to it.
#[derive(Clone, Debug)]
pub struct RelayConfig {
	/// Hostname or IP address of the relay
	pub host: String,
	pub port: u16,
	/// The domain we send in EHLO
	pub identity: Domain,
	/// How long to wait for the TCP connection, per address tried
	pub connect_timeout: Duration,
	/// How long to wait for each reply from the relay, and for it to take
	/// each thing we send
	pub reply_timeout: Duration,
}

impl RelayConfig {
	pub const DEFAULT_PORT: u16 = 25;
	pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
	pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(60);

	pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
			..Default::default()
		}
	}

	pub fn with_identity(mut self, identity: Domain) -> Self {
		self.identity = identity;
		self
	}

	pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
		self.connect_timeout = timeout;
		self
	}

	pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
		self.reply_timeout = timeout;
		self
	}
}

impl Default for RelayConfig {
	fn default() -> Self {
		Self {
			host: String::from("localhost"),
			port: Self::DEFAULT_PORT,
			identity: Domain::default(),
			connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
			reply_timeout: Self::DEFAULT_REPLY_TIMEOUT,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn builders_override_defaults() {
		let config = RelayConfig::new("relay.example", 2525)
			.with_identity("client.example".parse().unwrap())
			.with_reply_timeout(Duration::from_secs(5));

		assert_eq!(config.host, "relay.example");
		assert_eq!(config.port, 2525);
		assert_eq!(config.identity.to_string(), "client.example");
		assert_eq!(config.connect_timeout, RelayConfig::DEFAULT_CONNECT_TIMEOUT);
		assert_eq!(config.reply_timeout, Duration::from_secs(5));
	}
}
