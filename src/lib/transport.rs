//! Remote shell and file transfer capability.
//!
//! The session only needs a handful of operations from the wire: open a
//! connection, log in with a password, run a command to completion and
//! move whole files in and out over SFTP. [`SshConnector`] provides them on
//! top of libssh2.

use crate::error::{Result, VirshError};
use ssh2::{ExtendedData, Session as SshSession};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;

/// Opens transports to a host.
pub trait Connector {
    type Transport: Transport;

    fn open(&mut self, host: &str, port: u16) -> Result<Self::Transport>;
}

/// An opened connection to a single host.
pub trait Transport {
    fn authenticate(&mut self, username: &str, password: &str) -> Result<()>;

    /// Runs `command` and blocks until the remote process exits, returning
    /// stdout and stderr merged into a single string.
    fn exec(&mut self, command: &str) -> Result<String>;

    fn write_file(&mut self, remote: &str, data: &[u8]) -> Result<()>;

    fn read_file(&mut self, remote: &str) -> Result<Vec<u8>>;

    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SshConnector;

impl Connector for SshConnector {
    type Transport = SshTransport;

    fn open(&mut self, host: &str, port: u16) -> Result<SshTransport> {
        debug!("About to connect to {host}:{port}");
        let tcp = TcpStream::connect((host, port))
            .map_err(|e| VirshError::Transport(format!("can't reach {host}:{port}: {e}")))?;
        let mut session = SshSession::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;
        Ok(SshTransport { session })
    }
}

pub struct SshTransport {
    session: SshSession,
}

impl Transport for SshTransport {
    fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        if let Err(e) = self.session.userauth_password(username, password) {
            warn!("Password authentication for {username} was rejected: {e}");
            return Err(VirshError::LoginFailed);
        }
        Ok(())
    }

    fn exec(&mut self, command: &str) -> Result<String> {
        let mut channel = self.session.channel_session()?;
        channel.handle_extended_data(ExtendedData::Merge)?;
        channel.exec(command)?;
        let mut output = Vec::new();
        channel
            .read_to_end(&mut output)
            .map_err(|e| VirshError::Transport(format!("reading output of `{command}`: {e}")))?;
        channel.wait_close()?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    fn write_file(&mut self, remote: &str, data: &[u8]) -> Result<()> {
        let sftp = self
            .session
            .sftp()
            .map_err(|e| VirshError::transfer(remote, e))?;
        let mut file = sftp
            .create(Path::new(remote))
            .map_err(|e| VirshError::transfer(remote, format!("could not open file: {e}")))?;
        file.write_all(data)
            .map_err(|e| VirshError::transfer(remote, format!("could not send data: {e}")))?;
        Ok(())
    }

    fn read_file(&mut self, remote: &str) -> Result<Vec<u8>> {
        let sftp = self
            .session
            .sftp()
            .map_err(|e| VirshError::transfer(remote, e))?;
        let mut file = sftp
            .open(Path::new(remote))
            .map_err(|e| VirshError::transfer(remote, format!("could not open file: {e}")))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| VirshError::transfer(remote, format!("could not read data: {e}")))?;
        Ok(data)
    }

    fn close(&mut self) -> Result<()> {
        self.session.disconnect(None, "closing session", None)?;
        Ok(())
    }
}
