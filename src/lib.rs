#![doc = include_str!("../README.md")]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod codec;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod ils;
pub mod message;
pub mod schema;
pub mod session;

pub use config::{AccountConfig, ServerConfig};
pub use connection::handle_connection;
pub use error::{Result, SipError};
pub use ils::{Ils, Item, Patron, TransactionStatus};
pub use session::{Account, ProtocolVersion, Session};
