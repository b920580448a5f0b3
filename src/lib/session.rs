//! A configured, authenticated connection to one hypervisor host.
//!
//! The [`Session`] owns the transport handle and is the only way commands
//! reach the host. `run` takes `&mut self`, so one session can never have
//! two commands in flight; guard it with a mutex to share it between
//! threads.

use crate::error::{Result, VirshError};
use crate::structs::HostSettings;
use crate::transport::{Connector, SshConnector, Transport};
use std::borrow::Cow;
use std::fmt;

/// Sent right after authentication; an empty answer means the login did not
/// actually take.
const IDENTITY_COMMAND: &str = "whoami";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// Hook applied to every caller-supplied value before it is interpolated
/// into a remote command line.
pub trait ArgumentSanitizer {
    fn sanitize<'a>(&self, arg: &'a str) -> Cow<'a, str>;
}

/// Leaves arguments untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl ArgumentSanitizer for Passthrough {
    fn sanitize<'a>(&self, arg: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(arg)
    }
}

impl<F> ArgumentSanitizer for F
where
    F: Fn(&str) -> String,
{
    fn sanitize<'a>(&self, arg: &'a str) -> Cow<'a, str> {
        Cow::Owned(self(arg))
    }
}

pub struct Session<C: Connector = SshConnector> {
    host: String,
    port: u16,
    remote_base_path: String,
    connector: C,
    transport: Option<C::Transport>,
    sanitizer: Box<dyn ArgumentSanitizer>,
}

impl Session<SshConnector> {
    pub fn new() -> Self {
        Session::with_connector(SshConnector)
    }

    pub fn from_settings(settings: &HostSettings) -> Self {
        let mut session = Session::new();
        session.configure(
            &settings.host,
            settings.port,
            &settings.remote_base_path,
        );
        session
    }
}

impl Default for Session<SshConnector> {
    fn default() -> Self {
        Session::new()
    }
}

impl<C: Connector> Session<C> {
    pub fn with_connector(connector: C) -> Self {
        Session {
            host: String::new(),
            port: 0,
            remote_base_path: String::new(),
            connector,
            transport: None,
            sanitizer: Box::new(Passthrough),
        }
    }

    /// Stores the connection parameters. Does not connect.
    pub fn configure(&mut self, host: &str, port: u16, remote_base_path: &str) {
        self.host = host.to_string();
        self.port = port;
        self.remote_base_path = remote_base_path.to_string();
    }

    pub fn set_sanitizer(&mut self, sanitizer: impl ArgumentSanitizer + 'static) {
        self.sanitizer = Box::new(sanitizer);
    }

    pub fn connect(&mut self, username: &str, password: &str) -> Result<()> {
        if self.host.is_empty() || self.port == 0 || self.remote_base_path.is_empty() {
            return Err(VirshError::HostUndefined);
        }
        if self.transport.is_some() {
            self.disconnect();
        }

        let mut transport = self.connector.open(&self.host, self.port)?;
        transport.authenticate(username, password)?;
        self.transport = Some(transport);

        let identity = match self.run(IDENTITY_COMMAND) {
            Ok(s) => s,
            Err(e) => {
                self.disconnect();
                return Err(e);
            }
        };
        if identity.trim().is_empty() {
            error!(
                "{} returned nothing on {}, treating login as failed",
                IDENTITY_COMMAND, self.host
            );
            self.disconnect();
            return Err(VirshError::LoginFailed);
        }
        info!("Connected to {}:{} as {}", self.host, self.port, identity.trim());
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                error!("Failed to disconnect from {}: {e}", self.host);
            }
            info!("Disconnected from {}", self.host);
        }
    }

    /// Runs one command to completion and returns whatever it printed.
    /// Remote failures are not detected here; they show up only in the text.
    pub fn run(&mut self, command: &str) -> Result<String> {
        let transport = self.transport.as_mut().ok_or(VirshError::NoConnection)?;
        debug!("Running `{command}` on {}", self.host);
        transport.exec(command)
    }

    pub fn sanitize<'a>(&self, arg: &'a str) -> Cow<'a, str> {
        self.sanitizer.sanitize(arg)
    }

    pub fn state(&self) -> SessionState {
        match self.transport {
            Some(_) => SessionState::Connected,
            None => SessionState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn remote_base_path(&self) -> &str {
        &self.remote_base_path
    }

    /// Joins `relative` onto the remote base path with a single separator.
    pub fn remote_path(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.remote_base_path.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        match self.state() {
            SessionState::Connected => Ok(()),
            SessionState::Disconnected => Err(VirshError::NoConnection),
        }
    }

    pub(crate) fn transport_mut(&mut self) -> Result<&mut C::Transport> {
        self.transport.as_mut().ok_or(VirshError::NoConnection)
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("remote_base_path", &self.remote_base_path)
            .field("state", &self.state())
            .finish()
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
