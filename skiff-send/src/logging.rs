use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{filter::FilterFn, prelude::*, util::SubscriberInitExt};

/// Logs to stderr at the level named by `LOG_LEVEL`, defaulting to info.
/// Only our own crates are logged; the resolver is chatty.
pub fn init() {
	let default = LevelFilter::INFO;

	let level = std::env::var("LOG_LEVEL").map_or(default, |level| {
		LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
			eprintln!("Invalid log level specified {level}, defaulting to {default}");
			default
		})
	});

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::fmt::layer()
				.with_writer(std::io::stderr)
				.with_target(false)
				.compact()
				.with_filter(level)
				.with_filter(FilterFn::new(|metadata| {
					metadata.target().starts_with("skiff")
				})),
		)
		.init();
}
