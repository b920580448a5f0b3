//! Error kinds raised by the control core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VirshError>;

#[derive(Error, Debug)]
pub enum VirshError {
    #[error("a host, port and remote base path must be configured before connect()")]
    HostUndefined,

    #[error("failed to log in to the ssh server")]
    LoginFailed,

    #[error("a host must be connected before using this operation")]
    NoConnection,

    #[error("transfer of {path} failed: {reason}")]
    TransferFailed { path: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("domain document error: {0}")]
    Document(String),
}

impl VirshError {
    pub(crate) fn transfer(path: impl Into<String>, reason: impl ToString) -> Self {
        VirshError::TransferFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ssh2::Error> for VirshError {
    fn from(e: ssh2::Error) -> Self {
        VirshError::Transport(e.to_string())
    }
}

impl From<quick_xml::Error> for VirshError {
    fn from(e: quick_xml::Error) -> Self {
        VirshError::Document(e.to_string())
    }
}
