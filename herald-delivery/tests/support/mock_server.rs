//! Mock SMTP server for testing delivery scenarios
//!
//! A configurable scripted server that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Answer each SMTP command with a configured response
//! - Advertise and actually perform STARTTLS (self-signed certificate)
//! - Inject failures (error codes, connection drops, slow responses)
//! - Track received commands, message payloads, and connection counts

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::pki_types::PrivatePkcs8KeyDer;

/// Response configuration for one SMTP command.
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    /// EHLO capability lines after the server greeting line.
    ehlo_capabilities: Vec<String>,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    /// When set, STARTTLS is advertised and performed with this acceptor.
    tls: Option<TlsAcceptor>,
    response_delay: Option<Duration>,
    /// Delay before the response that follows the message body; long values
    /// give cancellation tests a window to abort in.
    data_end_delay: Option<Duration>,
    drop_after_commands: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "mock.local ESMTP ready"),
            ehlo_capabilities: vec!["8BITMIME".to_string(), "SIZE 10000000".to_string()],
            auth_response: SmtpResponse::new(235, "2.7.0 Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            tls: None,
            response_delay: None,
            data_end_delay: None,
            drop_after_commands: None,
        }
    }
}

enum SessionEnd<S> {
    Closed,
    Upgrade(S),
}

/// Mock SMTP server for testing.
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<String>>>,
    messages: Arc<RwLock<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// All command lines received, in order, across all connections.
    pub async fn commands(&self) -> Vec<String> {
        self.commands.read().await.clone()
    }

    /// Number of command lines whose verb matches (case-insensitive).
    pub async fn count_of(&self, verb: &str) -> usize {
        self.commands
            .read()
            .await
            .iter()
            .filter(|line| {
                line.split_whitespace()
                    .next()
                    .is_some_and(|w| w.eq_ignore_ascii_case(verb))
            })
            .count()
    }

    /// Raw DATA payloads received (dot-stuffed, as they came off the wire).
    pub async fn messages(&self) -> Vec<String> {
        self.messages.read().await.clone()
    }

    /// Number of TCP connections accepted.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<String>>>,
        messages: Arc<RwLock<Vec<String>>>,
    ) -> std::io::Result<()> {
        let mut command_budget = config.drop_after_commands;
        let starttls = config.tls.is_some();

        let end = run_session(
            stream,
            &config,
            &commands,
            &messages,
            starttls,
            &mut command_budget,
        )
        .await?;

        if let SessionEnd::Upgrade(stream) = end {
            let acceptor = config
                .tls
                .clone()
                .ok_or_else(|| std::io::Error::other("upgrade without TLS config"))?;
            let tls_stream = acceptor.accept(stream).await?;
            // No new greeting after the handshake; the client re-EHLOs.
            run_session(
                tls_stream,
                &config,
                &commands,
                &messages,
                false,
                &mut command_budget,
            )
            .await?;
        }

        Ok(())
    }
}

/// Drives one session over the given transport. Returns `Upgrade` when a
/// STARTTLS handshake should be performed over the underlying stream.
async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    config: &MockServerConfig,
    commands: &Arc<RwLock<Vec<String>>>,
    messages: &Arc<RwLock<Vec<String>>>,
    starttls_available: bool,
    command_budget: &mut Option<usize>,
) -> std::io::Result<SessionEnd<S>> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    // The greeting only opens plain sessions; post-upgrade the transaction
    // resumes at EHLO.
    if starttls_available || config.tls.is_none() {
        reader.get_mut().write_all(&config.greeting.to_bytes()).await?;
        reader.get_mut().flush().await?;
    }

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(SessionEnd::Closed);
        }

        let cmd_line = line.trim().to_string();
        commands.write().await.push(cmd_line.clone());

        if let Some(budget) = command_budget {
            if *budget == 0 {
                // Silently drop the connection
                return Ok(SessionEnd::Closed);
            }
            *budget -= 1;
        }

        if let Some(delay) = config.response_delay {
            tokio::time::sleep(delay).await;
        }

        let verb = cmd_line
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_uppercase();

        let response = match verb.as_str() {
            "EHLO" => {
                let mut lines = vec!["mock.local".to_string()];
                lines.extend(config.ehlo_capabilities.iter().cloned());
                if starttls_available {
                    lines.push("STARTTLS".to_string());
                }
                ehlo_bytes(250, &lines)
            }
            "STARTTLS" if starttls_available => {
                reader
                    .get_mut()
                    .write_all(b"220 2.0.0 Ready to start TLS\r\n")
                    .await?;
                reader.get_mut().flush().await?;
                return Ok(SessionEnd::Upgrade(reader.into_inner()));
            }
            "AUTH" => config.auth_response.to_bytes(),
            "MAIL" => config.mail_from_response.to_bytes(),
            "RCPT" => config.rcpt_to_response.to_bytes(),
            "DATA" => {
                reader
                    .get_mut()
                    .write_all(&config.data_response.to_bytes())
                    .await?;
                reader.get_mut().flush().await?;

                if config.data_response.code != 354 {
                    continue;
                }

                // Read payload until the bare dot terminator
                let mut payload = String::new();
                let mut data_line = String::new();
                loop {
                    data_line.clear();
                    if reader.read_line(&mut data_line).await? == 0 {
                        return Ok(SessionEnd::Closed);
                    }
                    if data_line.trim_end() == "." {
                        break;
                    }
                    payload.push_str(&data_line);
                }
                messages.write().await.push(payload);

                if let Some(delay) = config.data_end_delay {
                    tokio::time::sleep(delay).await;
                }
                config.data_end_response.to_bytes()
            }
            "QUIT" => {
                reader
                    .get_mut()
                    .write_all(&config.quit_response.to_bytes())
                    .await?;
                reader.get_mut().flush().await?;
                return Ok(SessionEnd::Closed);
            }
            _ => SmtpResponse::new(500, "Unknown command").to_bytes(),
        };

        reader.get_mut().write_all(&response).await?;
        reader.get_mut().flush().await?;
    }
}

/// Formats a multi-line 250 response: `250-` continuations, `250 ` last.
fn ehlo_bytes(code: u16, lines: &[String]) -> Vec<u8> {
    let mut response = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i + 1 < lines.len() {
            response.push_str(&format!("{code}-{line}\r\n"));
        } else {
            response.push_str(&format!("{code} {line}\r\n"));
        }
    }
    response.into_bytes()
}

/// Builder for configuring a [`MockSmtpServer`].
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_ehlo_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.config.ehlo_capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_quit_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.quit_response = SmtpResponse::new(code, message);
        self
    }

    /// Advertise STARTTLS and perform the handshake with a freshly minted
    /// self-signed certificate for `localhost`.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.config.tls = Some(self_signed_acceptor());
        self
    }

    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    #[must_use]
    pub const fn with_data_end_delay(mut self, delay: Duration) -> Self {
        self.config.data_end_delay = Some(delay);
        self
    }

    /// Silently drop the connection after N commands.
    #[must_use]
    pub const fn with_drop_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Build and start the mock SMTP server on a random port.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let messages = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_config = Arc::clone(&config);
        let accept_commands = Arc::clone(&commands);
        let accept_messages = Arc::clone(&messages);
        let accept_connections = Arc::clone(&connections);

        tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                accept_connections.fetch_add(1, Ordering::Relaxed);

                let config = Arc::clone(&accept_config);
                let commands = Arc::clone(&accept_commands);
                let messages = Arc::clone(&accept_messages);

                tokio::spawn(async move {
                    if let Err(e) =
                        MockSmtpServer::handle_client(stream, config, commands, messages).await
                    {
                        eprintln!("mock server client error: {e}");
                    }
                });
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            messages,
            connections,
        })
    }
}

/// A TLS acceptor with a throwaway self-signed certificate for `localhost`.
fn self_signed_acceptor() -> TlsAcceptor {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("certificate generation");
    let cert = certified.cert.der().clone();
    let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());

    let config = tokio_rustls::rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key.into())
        .expect("server TLS config");

    TlsAcceptor::from(Arc::new(config))
}
