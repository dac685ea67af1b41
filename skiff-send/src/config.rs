use std::{path::Path, str::FromStr, time::Duration};

use confindent::Confindent;
use getopts::{Matches, Options};
use skiff::{
	smtp::args::{Domain, ParseDomainError},
	Message, RelayConfig,
};
use thiserror::Error;

const DEFAULT_CONFIG: &str = "/etc/skiff/skiff.conf";

pub struct Config {
	pub relay: RelayConfig,
	pub from: String,
	pub to: Vec<String>,
	pub ccs: Vec<String>,
	pub subject: String,
	/// `None` means the body should be read from stdin
	pub body: Option<String>,
}

impl Config {
	fn options() -> Options {
		let mut opts = Options::new();
		opts.optflag("h", "help", "Print this help message");
		opts.optopt(
			"c",
			"config",
			"An alternate location to read the config from\nDefault: /etc/skiff/skiff.conf",
			"PATH",
		);
		opts.optopt(
			"s",
			"server",
			"The relay to hand the message to\nDefault: localhost",
			"HOST",
		);
		opts.optopt("p", "port", "The port the relay listens on\nDefault: 25", "PORT");
		opts.optopt(
			"i",
			"identity",
			"The domain we introduce ourselves as\nDefault: this machine's hostname",
			"DOMAIN",
		);
		opts.optopt(
			"",
			"connect-timeout",
			"Seconds to wait for the connection\nDefault: 10",
			"SECS",
		);
		opts.optopt(
			"",
			"reply-timeout",
			"Seconds to wait for each reply\nDefault: 60",
			"SECS",
		);
		opts.optopt("f", "from", "The sender's address", "ADDR");
		opts.optmulti("t", "to", "A primary recipient", "ADDR");
		opts.optmulti("", "cc", "A carbon-copy recipient", "ADDR");
		opts.optopt("S", "subject", "The subject line", "TEXT");
		opts.optopt(
			"b",
			"body",
			"The message body\nDefault: read from stdin",
			"TEXT",
		);
		opts
	}

	fn print_usage<S: AsRef<str>>(prgm: S, opts: &Options) {
		let brief = format!("Usage: {} [options] --from ADDR --to ADDR", prgm.as_ref());
		println!("{}", opts.usage(&brief));
	}

	/// Reads the command line, and the config file it points to. Returns
	/// `Ok(None)` when there is nothing to do, like after printing help.
	pub fn get() -> Result<Option<Self>, ConfigError> {
		let args: Vec<String> = std::env::args().collect();
		let opts = Self::options();

		let matches = opts.parse(args.get(1..).unwrap_or_default())?;

		if matches.opt_present("help") {
			Self::print_usage(args.first().map_or("skiff-send", String::as_str), &opts);
			return Ok(None);
		}

		let file = Self::load_file(matches.opt_str("config"))?;
		Self::from_matches(&matches, file.as_ref(), default_identity()).map(Some)
	}

	fn load_file(path: Option<String>) -> Result<Option<Confindent>, ConfigError> {
		match path {
			// Asked for a file by name, so it has to be there
			Some(path) => Confindent::from_file(&path).map(Some).map_err(|err| {
				ConfigError::ConfigFile {
					path,
					reason: format!("{:?}", err),
				}
			}),
			None => Ok([DEFAULT_CONFIG, "skiff.conf"]
				.iter()
				.filter(|path| Path::new(path).exists())
				.find_map(|path| match Confindent::from_file(path) {
					Ok(conf) => Some(conf),
					Err(err) => {
						tracing::warn!("ignoring {}: {:?}", path, err);
						None
					}
				})),
		}
	}

	fn from_matches(
		matches: &Matches,
		file: Option<&Confindent>,
		default_identity: Domain,
	) -> Result<Self, ConfigError> {
		// Options specified on the command line take priority. We only take the
		// cli_key and convert to the config key internally so that we can remain
		// consistent.
		let find_value = |cli_key: &str| -> Option<String> {
			let conf_key: String = cli_key
				.split('-')
				.map(|word| {
					let mut c = word.chars();
					match c.next() {
						None => String::new(),
						Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
					}
				})
				.collect();

			matches
				.opt_str(cli_key)
				.or_else(|| file.and_then(|conf| conf.child_owned(&conf_key)))
		};

		let mut relay = RelayConfig::default().with_identity(default_identity);

		if let Some(host) = find_value("server") {
			relay.host = host;
		}
		if let Some(port) = find_value("port") {
			relay.port = parse_value("port", &port)?;
		}
		if let Some(identity) = find_value("identity") {
			relay.identity = identity.parse()?;
		}
		if let Some(secs) = find_value("connect-timeout") {
			relay.connect_timeout = Duration::from_secs(parse_value("connect-timeout", &secs)?);
		}
		if let Some(secs) = find_value("reply-timeout") {
			relay.reply_timeout = Duration::from_secs(parse_value("reply-timeout", &secs)?);
		}

		let from = matches.opt_str("from").ok_or(ConfigError::MissingSender)?;
		let to = matches.opt_strs("to");
		let ccs = matches.opt_strs("cc");

		if to.is_empty() && ccs.is_empty() {
			return Err(ConfigError::MissingRecipients);
		}

		Ok(Self {
			relay,
			from,
			to,
			ccs,
			subject: matches.opt_str("subject").unwrap_or_default(),
			body: matches.opt_str("body"),
		})
	}

	pub fn message(&self, body: String) -> Message {
		Message::new(
			self.from.clone(),
			self.to.clone(),
			self.ccs.clone(),
			self.subject.clone(),
			body,
		)
	}
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
	value.trim().parse().map_err(|_| ConfigError::InvalidValue {
		key: key.into(),
		value: value.into(),
	})
}

/// This machine's hostname, if it's usable in EHLO
fn default_identity() -> Domain {
	gethostname::gethostname()
		.into_string()
		.ok()
		.and_then(|name| name.parse().ok())
		.unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("{0}")]
	Options(#[from] getopts::Fail),
	#[error("failed to read config file {path}: {reason}")]
	ConfigFile { path: String, reason: String },
	#[error("'{value}' is not a valid value for {key}")]
	InvalidValue { key: String, value: String },
	#[error("invalid identity: {0}")]
	InvalidIdentity(#[from] ParseDomainError),
	#[error("a sender is required (--from)")]
	MissingSender,
	#[error("at least one recipient is required (--to or --cc)")]
	MissingRecipients,
}
