//! SMTP client with support for implicit TLS and STARTTLS.

use herald_common::{incoming, outgoing};

use crate::base64;
use crate::stuffing::dot_stuff;

use super::connection::Connection;
use super::error::{ClientError, Result};
use super::response::{Extensions, Response};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Placeholder recorded in logs and transcripts instead of AUTH material.
const AUTH_MASK: &str = "AUTH PLAIN ***";

/// An SMTP client for sending commands and receiving responses.
///
/// The client owns the socket exclusively; dropping it closes the connection
/// immediately, which is the cancellation path — no `QUIT` is attempted.
pub struct SmtpClient {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    transcript: Vec<(String, Response)>,
    extensions: Extensions,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Creates a new SMTP client over a plain TCP connection.
    ///
    /// `server_domain` is the name used for TLS verification if the session
    /// is later upgraded via STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, server_domain: String) -> Result<Self> {
        let connection = Connection::open(addr).await?;
        Ok(Self::new(connection, server_domain))
    }

    /// Creates a new SMTP client over an implicit-TLS connection (port 465
    /// style): the TLS handshake happens before the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or TLS handshake fails.
    pub async fn connect_tls(
        addr: &str,
        server_domain: String,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let connection = Connection::open_tls(addr, &server_domain, accept_invalid_certs).await?;
        let mut client = Self::new(connection, server_domain);
        client.accept_invalid_certs = accept_invalid_certs;
        Ok(client)
    }

    fn new(connection: Connection, server_domain: String) -> Self {
        Self {
            connection: Some(connection),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            transcript: Vec::new(),
            extensions: Extensions::default(),
            server_domain,
            accept_invalid_certs: false,
        }
    }

    /// Sets whether to accept invalid TLS certificates on a later STARTTLS
    /// upgrade. Default is `false`; enable only against test servers with
    /// self-signed certificates.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Reads the initial server greeting (220 response).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is invalid.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        let response = self.read_response().await?;
        self.transcript.push(("<greeting>".to_string(), response.clone()));
        Ok(response)
    }

    /// Sends a command and reads the response, recording both in the
    /// transcript. `logged` is what appears in logs and the transcript —
    /// credentials are masked before they get here.
    async fn exchange(&mut self, wire: &str, logged: &str) -> Result<Response> {
        outgoing!("{logged}");

        let data = format!("{wire}\r\n");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data.as_bytes())
            .await?;

        let response = self.read_response().await?;
        incoming!("{} {}", response.code, response.message());

        self.transcript.push((logged.to_string(), response.clone()));
        Ok(response)
    }

    /// Sends a raw command and reads the response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.exchange(command, command).await
    }

    /// Sends EHLO and records the advertised capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        let response = self.command(&format!("EHLO {domain}")).await?;
        if response.is_success() {
            self.extensions = Extensions::from_response(&response);
        }
        Ok(response)
    }

    /// Capabilities parsed from the most recent EHLO.
    ///
    /// Reset to empty by a STARTTLS upgrade: pre-upgrade capabilities are
    /// untrusted and must be re-read over the encrypted channel.
    #[must_use]
    pub const fn extensions(&self) -> Extensions {
        self.extensions
    }

    /// Sends AUTH PLAIN with the RFC 4616 payload
    /// `base64("\0" + username + "\0" + password)`.
    ///
    /// The credential material never reaches logs or the transcript; both
    /// record a fixed placeholder.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let mut payload = Vec::with_capacity(2 + username.len() + password.len());
        payload.push(b'\0');
        payload.extend_from_slice(username.as_bytes());
        payload.push(b'\0');
        payload.extend_from_slice(password.as_bytes());

        let wire = format!("AUTH PLAIN {}", base64::encode(&payload));
        self.exchange(&wire, AUTH_MASK).await
    }

    /// Sends MAIL FROM with the bare envelope address.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str, size: Option<usize>) -> Result<Response> {
        let cmd = if let Some(sz) = size {
            format!("MAIL FROM:<{from}> SIZE={sz}")
        } else {
            format!("MAIL FROM:<{from}>")
        };
        self.command(&cmd).await
    }

    /// Sends RCPT TO with the bare envelope address.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Sends DATA.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Transmits the message payload: dot-stuffs it, guarantees a trailing
    /// CRLF, appends the `.` terminator, and reads the final response.
    ///
    /// Stuffing happens here, once, on the complete payload — the MIME
    /// builder upstream never needs to know the transport escape exists.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        let stuffed = dot_stuff(data);

        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;

        connection.send(stuffed.as_bytes()).await?;

        if stuffed.ends_with("\r\n") {
            // Payload already ends a line
        } else if stuffed.ends_with('\n') {
            connection.send(b"\r").await?;
        } else {
            connection.send(b"\r\n").await?;
        }

        connection.send(b".\r\n").await?;

        outgoing!("<{} bytes, dot-stuffed>", stuffed.len());
        let response = self.read_response().await?;
        incoming!("{} {}", response.code, response.message());

        self.transcript.push((".".to_string(), response.clone()));
        Ok(response)
    }

    /// Sends QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Sends STARTTLS and, on 220, replaces the transport with a TLS stream
    /// over the same socket. Previously parsed capabilities are discarded;
    /// the caller must re-issue EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS fails or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let domain = self.server_domain.clone();
            let accept_invalid = self.accept_invalid_certs;

            let Some(old_connection) = self.connection.take() else {
                return Err(ClientError::ConnectionClosed);
            };
            self.connection =
                Some(old_connection.upgrade_to_tls(&domain, accept_invalid).await?);

            // Anything the server claimed before encryption is void.
            self.extensions = Extensions::default();
            self.buffer_pos = 0;
        }

        Ok(response)
    }

    /// The (command, response) exchange so far, credentials masked.
    #[must_use]
    pub fn transcript(&self) -> &[(String, Response)] {
        &self.transcript
    }

    /// Reads a complete SMTP response from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}
