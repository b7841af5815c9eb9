//! Spout: pull-mode client for LimaCharlie output streams.
//!
//! A spout registers with the cloud's output service, follows the redirect
//! to a per-connection stream URL, then keeps a newline-delimited JSON
//! stream open for as long as the instance lives, reconnecting whenever the
//! connection drops. Messages land in a bounded queue; when the consumer is
//! too slow the reader sheds load instead of stalling, and every shed
//! message is tallied in an observable drop counter.
//!
//! ## Core Types
//!
//! - [`Spout`] - The streaming client instance
//! - [`SpoutConfig`] - Subscription parameters (data kind and filters)
//! - [`Credentials`] - Organization id and secret key
//! - [`SpoutMessage`] - A delivered payload, decoded or raw
//! - [`SpoutError`] - Construction-time failures
//!
//! ## Example
//!
//! ```rust,no_run
//! use spout::{Credentials, DataKind, Spout, SpoutConfig};
//!
//! #[tokio::main]
//! async fn main() -> spout::Result<()> {
//!     let creds = Credentials::new("8cbe27f4-…", "secret-api-key");
//!     let mut spout = Spout::open(&creds, SpoutConfig::new(DataKind::Event)).await?;
//!     while let Some(msg) = spout.recv().await {
//!         println!("{msg:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod queue;

pub use client::Spout;
pub use config::{Credentials, DataKind, SpoutConfig};
pub use error::{Result, SpoutError};
pub use message::SpoutMessage;
pub use queue::{EventReceiver, EventSender, PushError};
