use std::{net::SocketAddr, time::Duration};

use thiserror::Error;
use tokio::{
	io::{self, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
	net::TcpStream,
	time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
	config::RelayConfig,
	smtp::{Client, Message, Output, ProtocolError, MAX_REPLY_LINE},
};

use self::dns::{DnsLookupError, RelayLookup};

pub mod dns;

/// Hands messages to a single relay. Each call to [Relay::deliver] opens its
/// own connection and closes it again before returning, so one `Relay` can be
/// shared between tasks.
#[derive(Clone, Debug)]
pub struct Relay {
	config: RelayConfig,
}

impl Relay {
	pub fn new(config: RelayConfig) -> Self {
		Self { config }
	}

	pub fn config(&self) -> &RelayConfig {
		&self.config
	}

	/// Connects to the relay and runs one complete exchange for `message`.
	/// There is exactly one attempt; retrying is up to the caller.
	pub async fn deliver(&self, message: &Message) -> Result<(), RelayError> {
		let (stream, addr) = self
			.connect()
			.await
			.map_err(|source| RelayError::Connection {
				host: self.config.host.clone(),
				port: self.config.port,
				source,
			})?;

		info!(relay = %addr, subject = message.subject(), "connected to relay");

		self.deliver_over(stream, message).await
	}

	/// Runs the exchange over a stream that is already connected to the
	/// relay. The stream is shut down and dropped before this returns,
	/// whatever the outcome.
	pub async fn deliver_over<S>(&self, stream: S, message: &Message) -> Result<(), RelayError>
	where
		S: AsyncRead + AsyncWrite + Unpin,
	{
		let mut stream = BufReader::new(stream);
		let result = self.converse(&mut stream, message).await;

		// A failed shutdown must not hide how the exchange itself went
		if let Err(err) = stream.shutdown().await {
			warn!("failed to shut down the relay connection: {}", err);
		}
		drop(stream);

		match &result {
			Ok(()) => info!(subject = message.subject(), "relay accepted the message"),
			Err(err) => warn!(subject = message.subject(), "delivery failed: {}", err),
		}

		result
	}

	async fn connect(&self) -> Result<(TcpStream, SocketAddr), ConnectError> {
		let mut lookup = RelayLookup::new(&self.config.host).await?;
		let mut last_err = ConnectError::NoAddresses;

		while let Some(ip) = lookup.next_address() {
			let addr = SocketAddr::new(ip, self.config.port);
			debug!(%addr, "connecting");

			match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
				Ok(Ok(stream)) => return Ok((stream, addr)),
				Ok(Err(err)) => {
					debug!(%addr, "connection failed: {}", err);
					last_err = ConnectError::Io(err);
				}
				Err(_) => {
					debug!(%addr, "connection timed out");
					last_err = ConnectError::Timeout(self.config.connect_timeout);
				}
			}
		}

		Err(last_err)
	}

	async fn converse<S>(
		&self,
		stream: &mut BufReader<S>,
		message: &Message,
	) -> Result<(), RelayError>
	where
		S: AsyncRead + AsyncWrite + Unpin,
	{
		let mut client = Client::initiate(message, self.config.identity.clone());
		let mut buf = Vec::new();

		while !client.should_exit() {
			buf.clear();

			// One byte over the limit is enough for the client to reject the line
			let mut line_reader = (&mut *stream).take(MAX_REPLY_LINE as u64 + 1);
			let read = timeout(
				self.config.reply_timeout,
				line_reader.read_until(b'\n', &mut buf),
			)
			.await
			.map_err(|_| timed_out("no reply from the relay", self.config.reply_timeout))??;

			// A zero sized read, the relay hung up on us
			if read == 0 {
				return Err(client.closed().into());
			}

			let line = String::from_utf8_lossy(&buf);
			debug!("S: {}", line.trim_end());

			match client.push(&line)? {
				Some(Output::Done) | None => (),
				Some(output) => {
					if let Output::Command(command) = &output {
						debug!("C: {}", command);
					} else {
						debug!("C: <message payload>");
					}

					let writer = stream.get_mut();
					let send = async {
						writer.write_all(output.to_string().as_bytes()).await?;
						writer.flush().await
					};
					timeout(self.config.reply_timeout, send).await.map_err(|_| {
						timed_out("the relay did not take our data", self.config.reply_timeout)
					})??;
				}
			}
		}

		if let Some(reply) = client.last_reply() {
			debug!("relay said goodbye: {}", reply.messages().join(" "));
		}

		Ok(())
	}
}

fn timed_out(what: &str, waited: Duration) -> io::Error {
	io::Error::new(
		io::ErrorKind::TimedOut,
		format!("{} within {:?}", what, waited),
	)
}

#[derive(Debug, Error)]
pub enum RelayError {
	#[error("could not connect to {host}:{port}: {source}")]
	Connection {
		host: String,
		port: u16,
		#[source]
		source: ConnectError,
	},
	#[error("connection to the relay failed: {0}")]
	Transport(#[from] io::Error),
	#[error("{0}")]
	Protocol(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum ConnectError {
	#[error("{0}")]
	Resolve(#[from] DnsLookupError),
	#[error("the host has no addresses")]
	NoAddresses,
	#[error("{0}")]
	Io(#[from] io::Error),
	#[error("timed out after {0:?}")]
	Timeout(Duration),
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use tokio::{
		io::{duplex, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
		net::TcpListener,
		task::JoinHandle,
	};

	use super::*;
	use crate::smtp::{ResponseCode, Stage};

	const ACCEPT_ALL: &[&str] = &[
		"220 relay.example ready\r\n",
		"250-relay.example greets you\r\n250 HELP\r\n",
		"250 sender ok\r\n",
		"250 recipient ok\r\n",
		"250 recipient ok\r\n",
		"250 recipient ok\r\n",
		"354 end with <CRLF>.<CRLF>\r\n",
		"250 queued\r\n",
		"221 bye\r\n",
	];

	fn message() -> Message {
		Message::new(
			"a@x.com",
			vec!["b@x.com".into(), "c@x.com".into()],
			vec!["d@x.com".into()],
			"Hi",
			"Hello",
		)
	}

	fn relay() -> Relay {
		Relay::new(
			RelayConfig::new("127.0.0.1", 25)
				.with_identity("client.example".parse().unwrap())
				.with_reply_timeout(Duration::from_secs(5)),
		)
	}

	/// Plays a relay that answers each command, and each finished payload,
	/// with the next scripted reply. Returns every line the client sent once
	/// the client closes its end.
	fn stub_relay<S>(stream: S, replies: &'static [&'static str]) -> JoinHandle<Vec<String>>
	where
		S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	{
		tokio::spawn(async move {
			let mut stream = BufReader::new(stream);
			let mut replies = replies.iter();
			let mut transcript = vec![];
			let mut in_data = false;

			if let Some(greeting) = replies.next() {
				stream.get_mut().write_all(greeting.as_bytes()).await.unwrap();
			}

			loop {
				let mut line = String::new();
				match stream.read_line(&mut line).await {
					Ok(0) | Err(_) => break,
					Ok(_) => (),
				}

				let line = line.trim_end_matches("\r\n").to_string();
				transcript.push(line.clone());

				if in_data && line != "." {
					continue;
				}

				if let Some(reply) = replies.next() {
					in_data = line == "DATA" && reply.starts_with("354");
					stream.get_mut().write_all(reply.as_bytes()).await.ok();
				} else {
					in_data = false;
				}
			}

			transcript
		})
	}

	/// Waits for the stub to see the client hang up.
	async fn closed(stub: JoinHandle<Vec<String>>) -> Vec<String> {
		tokio::time::timeout(Duration::from_secs(5), stub)
			.await
			.expect("client left the connection open")
			.unwrap()
	}

	fn commands(transcript: &[String]) -> Vec<&str> {
		let mut commands = vec![];
		let mut in_data = false;

		for line in transcript {
			if in_data {
				in_data = line != ".";
				continue;
			}

			commands.push(line.split_once(' ').map_or(line.as_str(), |(verb, _)| verb));
			in_data = line == "DATA";
		}

		commands
	}

	#[tokio::test]
	async fn delivers_and_closes() {
		let (client, server) = duplex(4096);
		let stub = stub_relay(server, ACCEPT_ALL);

		relay().deliver_over(client, &message()).await.unwrap();
		let transcript = closed(stub).await;

		assert_eq!(
			commands(&transcript),
			["EHLO", "MAIL", "RCPT", "RCPT", "RCPT", "DATA", "QUIT"]
		);
		assert_eq!(transcript[0], "EHLO client.example");
		assert_eq!(transcript[1], "MAIL FROM: <a@x.com>");
		assert_eq!(
			&transcript[2..5],
			["RCPT TO: <b@x.com>", "RCPT TO: <c@x.com>", "RCPT TO: <d@x.com>"]
		);
		assert_eq!(transcript.last().unwrap(), "QUIT");
	}

	#[tokio::test]
	async fn payload_between_data_and_terminator() {
		let (client, server) = duplex(4096);
		let stub = stub_relay(server, ACCEPT_ALL);

		relay().deliver_over(client, &message()).await.unwrap();
		let transcript = closed(stub).await;

		let start = transcript.iter().position(|l| l == "DATA").unwrap() + 1;
		let end = transcript.iter().position(|l| l == ".").unwrap();
		let payload = &transcript[start..end];

		assert_eq!(
			payload,
			[
				"Content-Type: text/plain; charset=utf-8",
				"from: a@x.com",
				"to: b@x.com",
				"to: c@x.com",
				"Subject: Hi",
				"",
				"Hello",
			]
		);
		assert_eq!(payload.iter().filter(|l| l.starts_with("to:")).count(), 2);
	}

	#[tokio::test]
	async fn rejected_greeting_sends_nothing() {
		let (client, server) = duplex(4096);
		let stub = stub_relay(server, &["554 not today\r\n"]);

		let err = relay().deliver_over(client, &message()).await.unwrap_err();
		let transcript = closed(stub).await;

		match err {
			RelayError::Protocol(err) => {
				assert_eq!(err.stage(), &Stage::Greeting);
				assert_eq!(err.line(), Some("554 not today"));
			}
			other => panic!("expected a protocol error, got {:?}", other),
		}
		assert!(transcript.is_empty());
	}

	#[tokio::test]
	async fn rejected_recipient_stops_before_data() {
		let (client, server) = duplex(4096);
		let stub = stub_relay(
			server,
			&[
				"220 ready\r\n",
				"250 hi\r\n",
				"250 ok\r\n",
				"250 ok\r\n",
				"550 no such user\r\n",
				"250 never sent\r\n",
			],
		);

		let err = relay().deliver_over(client, &message()).await.unwrap_err();
		let transcript = closed(stub).await;

		let rcpts = transcript.iter().filter(|l| l.starts_with("RCPT TO")).count();
		assert_eq!(rcpts, 2);
		assert!(!transcript.iter().any(|l| l == "DATA"));

		match err {
			RelayError::Protocol(err) => {
				assert_eq!(err.rejected_recipient(), Some("c@x.com"));
				assert_eq!(err.line(), Some("550 no such user"));
			}
			other => panic!("expected a protocol error, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn rejected_message_skips_quit() {
		let (client, server) = duplex(4096);
		let stub = stub_relay(
			server,
			&[
				"220 ready\r\n",
				"250 hi\r\n",
				"250 ok\r\n",
				"250 ok\r\n",
				"250 ok\r\n",
				"250 ok\r\n",
				"354 go ahead\r\n",
				"554 spam\r\n",
			],
		);

		let err = relay().deliver_over(client, &message()).await.unwrap_err();
		let transcript = closed(stub).await;

		assert!(matches!(
			err,
			RelayError::Protocol(ProtocolError::UnexpectedReply {
				stage: Stage::EndOfData,
				..
			})
		));
		assert_eq!(transcript.last().unwrap(), ".");
	}

	#[tokio::test]
	async fn short_reply_line_is_malformed() {
		let (client, server) = duplex(4096);
		let stub = stub_relay(server, &["22\r\n"]);

		let err = relay().deliver_over(client, &message()).await.unwrap_err();
		closed(stub).await;

		match err {
			RelayError::Protocol(ProtocolError::MalformedReply { stage, line, .. }) => {
				assert_eq!(stage, Stage::Greeting);
				assert_eq!(line, "22");
			}
			other => panic!("expected a malformed reply, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn bare_code_greeting_is_malformed() {
		let (client, server) = duplex(4096);
		let stub = stub_relay(server, &["220\r\n", "250 never sent\r\n"]);

		let err = relay().deliver_over(client, &message()).await.unwrap_err();
		let transcript = closed(stub).await;

		match err {
			RelayError::Protocol(ProtocolError::MalformedReply { stage, line, .. }) => {
				assert_eq!(stage, Stage::Greeting);
				assert_eq!(line, "220");
			}
			other => panic!("expected a malformed reply, got {:?}", other),
		}
		assert!(transcript.is_empty());
	}

	#[tokio::test]
	async fn overlong_reply_line_is_malformed() {
		let (client, mut server) = duplex(4096);
		let greeting = format!("220 {}\r\n", "x".repeat(2 * MAX_REPLY_LINE));
		server.write_all(greeting.as_bytes()).await.unwrap();

		let err = relay().deliver_over(client, &message()).await.unwrap_err();

		match err {
			RelayError::Protocol(ProtocolError::MalformedReply { stage, line, .. }) => {
				assert_eq!(stage, Stage::Greeting);
				assert_eq!(line.len(), MAX_REPLY_LINE + 1);
			}
			other => panic!("expected a malformed reply, got {:?}", other),
		}
		drop(server);
	}

	#[tokio::test]
	async fn hang_up_before_greeting() {
		let (client, server) = duplex(4096);
		drop(server);

		let err = relay().deliver_over(client, &message()).await.unwrap_err();

		match err {
			RelayError::Protocol(err) => {
				assert_eq!(
					err,
					ProtocolError::ConnectionClosed {
						stage: Stage::Greeting,
						expected: ResponseCode::ServiceReady,
					}
				);
				assert_eq!(err.line(), None);
			}
			other => panic!("expected a protocol error, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn hang_up_inside_multiline_reply() {
		let (client, mut server) = duplex(4096);
		server.write_all(b"220-still talking\r\n").await.unwrap();
		drop(server);

		let err = relay().deliver_over(client, &message()).await.unwrap_err();

		assert!(matches!(
			err,
			RelayError::Protocol(ProtocolError::ConnectionClosed {
				stage: Stage::Greeting,
				..
			})
		));
	}

	#[tokio::test]
	async fn write_after_hang_up_is_transport_error() {
		let (client, mut server) = duplex(4096);
		server.write_all(b"220 ready\r\n").await.unwrap();
		drop(server);

		let err = relay().deliver_over(client, &message()).await.unwrap_err();

		assert!(matches!(err, RelayError::Transport(_)), "got {:?}", err);
	}

	#[tokio::test]
	async fn silent_relay_times_out() {
		let (client, server) = duplex(4096);
		let relay = Relay::new(
			RelayConfig::new("127.0.0.1", 25).with_reply_timeout(Duration::from_millis(50)),
		);

		let err = relay.deliver_over(client, &message()).await.unwrap_err();
		drop(server);

		match err {
			RelayError::Transport(err) => assert_eq!(err.kind(), io::ErrorKind::TimedOut),
			other => panic!("expected a timeout, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn relay_that_stops_reading_times_out() {
		// Room for the greeting and nothing more, and nobody drains it
		let (client, mut server) = duplex(8);
		server.write_all(b"220 ok\r\n").await.unwrap();

		let relay = Relay::new(
			RelayConfig::new("127.0.0.1", 25).with_reply_timeout(Duration::from_millis(50)),
		);

		let err = tokio::time::timeout(
			Duration::from_secs(5),
			relay.deliver_over(client, &message()),
		)
		.await
		.expect("writing to the relay never gave up")
		.unwrap_err();
		drop(server);

		match err {
			RelayError::Transport(err) => assert_eq!(err.kind(), io::ErrorKind::TimedOut),
			other => panic!("expected a timeout, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn round_trip_over_tcp() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();

		let stub = tokio::spawn(async move {
			let (stream, _) = listener.accept().await.unwrap();
			stub_relay(
				stream,
				&[
					"220 ready\r\n",
					"250 hi\r\n",
					"250 ok\r\n",
					"250 ok\r\n",
					"354 go ahead\r\n",
					"250 queued\r\n",
					"221 bye\r\n",
				],
			)
			.await
			.unwrap()
		});

		let message = Message::new("a@x.com", vec!["b@x.com".into()], vec![], "Hi", "Hello");
		let relay = Relay::new(RelayConfig::new("127.0.0.1", port));

		relay.deliver(&message).await.unwrap();

		let transcript = tokio::time::timeout(Duration::from_secs(5), stub)
			.await
			.expect("client left the connection open")
			.unwrap();

		assert_eq!(
			transcript,
			[
				"EHLO localhost",
				"MAIL FROM: <a@x.com>",
				"RCPT TO: <b@x.com>",
				"DATA",
				"Content-Type: text/plain; charset=utf-8",
				"from: a@x.com",
				"to: b@x.com",
				"Subject: Hi",
				"",
				"Hello",
				".",
				"QUIT",
			]
		);
	}

	#[tokio::test]
	async fn refused_connection() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);

		let err = relay_to(port).deliver(&message()).await.unwrap_err();

		match err {
			RelayError::Connection { host, port: p, source } => {
				assert_eq!(host, "127.0.0.1");
				assert_eq!(p, port);
				assert!(matches!(source, ConnectError::Io(_)));
			}
			other => panic!("expected a connection error, got {:?}", other),
		}
	}

	fn relay_to(port: u16) -> Relay {
		Relay::new(RelayConfig::new("127.0.0.1", port))
	}
}
