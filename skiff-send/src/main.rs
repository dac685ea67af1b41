mod config;
mod logging;

use std::process::ExitCode;

use config::Config;
use skiff::{Relay, RelayError};
use tokio::io::AsyncReadExt;

#[tokio::main]
async fn main() -> ExitCode {
	logging::init();

	let config = match Config::get() {
		Ok(Some(config)) => config,
		Ok(None) => return ExitCode::SUCCESS,
		Err(err) => {
			tracing::error!("{}", err);
			return ExitCode::FAILURE;
		}
	};

	let body = match &config.body {
		Some(body) => body.clone(),
		None => {
			let mut body = String::new();
			if let Err(err) = tokio::io::stdin().read_to_string(&mut body).await {
				tracing::error!("failed to read the message body from stdin: {}", err);
				return ExitCode::FAILURE;
			}
			body
		}
	};

	let message = config.message(body);
	let relay = Relay::new(config.relay);

	match relay.deliver(&message).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(RelayError::Protocol(err)) if err.rejected_recipient().is_some() => {
			tracing::error!(
				recipient = err.rejected_recipient(),
				"the relay refused a recipient, nothing was sent: {}",
				err
			);
			ExitCode::FAILURE
		}
		Err(RelayError::Protocol(err)) if err.is_transient() => {
			tracing::error!("{} (temporary, try again later)", err);
			ExitCode::FAILURE
		}
		Err(err) => {
			tracing::error!("{}", err);
			ExitCode::FAILURE
		}
	}
}
