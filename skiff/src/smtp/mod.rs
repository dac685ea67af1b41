pub mod args;
mod client;
mod command;
mod message;
mod response;

pub use client::{Client, Output, ProtocolError, Stage};
pub use command::Command;
pub use message::*;
pub use response::{
	ParseResponseError, ReplyLine, Response, ResponseCode, Separator, MAX_REPLY_LINE,
};
