//! Outbound SMTP client.
//!
//! Supports plain TCP, implicit TLS (port 465), and mid-session STARTTLS
//! upgrade (port 587), AUTH PLAIN, and byte-exact DATA framing
//! (dot-stuffing, CRLF termination). The client is deliberately
//! policy-free: timeouts, retries, and status-code interpretation belong to
//! the transaction layer in `herald-delivery`.
//!
//! # Example
//!
//! ```no_run
//! use herald_smtp::client::SmtpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("mail.example.com:587", "mail.example.com".into()).await?;
//! client.read_greeting().await?;
//! client.ehlo("sender.example.com").await?;
//!
//! if client.extensions().starttls {
//!     client.starttls().await?;
//!     client.ehlo("sender.example.com").await?;
//! }
//!
//! client.mail_from("orders@sender.example.com", None).await?;
//! client.rcpt_to("customer@example.com").await?;
//! client.data().await?;
//! client.send_data("Subject: Hi\r\n\r\nHello\r\n").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use response::{Extensions, Response, ResponseLine};
pub use smtp_client::SmtpClient;
