use std::net::IpAddr;

use hickory_resolver::{
	config::{ResolverConfig, ResolverOpts},
	error::ResolveError,
	TokioAsyncResolver,
};
use thiserror::Error;

pub struct RelayLookup {
	/// Addresses of the relay host, in reverse order of preference, so that
	/// Vec::pop gives the next one to try.
	ip_addresses: Vec<IpAddr>,
}

impl RelayLookup {
	/// Resolves the relay host. IP addresses, bare or in SMTP's bracketed
	/// literal form, are used as they are.
	pub async fn new(host: &str) -> Result<Self, DnsLookupError> {
		let literal = host
			.strip_prefix('[')
			.and_then(|s| s.strip_suffix(']'))
			.map(|s| s.strip_prefix("IPv6:").unwrap_or(s))
			.unwrap_or(host);

		if let Ok(ip) = literal.parse::<IpAddr>() {
			return Ok(Self {
				ip_addresses: vec![ip],
			});
		}

		let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
			Ok(resolver) => resolver,
			Err(err) => {
				tracing::debug!("no usable system resolver config ({}), using defaults", err);
				TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
			}
		};

		let mut ip_addresses: Vec<IpAddr> = resolver.lookup_ip(host).await?.iter().collect();
		ip_addresses.reverse();

		Ok(Self { ip_addresses })
	}

	pub fn next_address(&mut self) -> Option<IpAddr> {
		self.ip_addresses.pop()
	}
}

#[derive(Debug, Error)]
pub enum DnsLookupError {
	#[error("failed to resolve domain name")]
	ResolveError(#[from] ResolveError),
}
