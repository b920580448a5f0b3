//! Whole-file copies between this machine and the host over SFTP.

use crate::error::{Result, VirshError};
use crate::session::Session;
use crate::transport::{Connector, Transport};
use std::fs;
use std::io::Write;
use std::path::Path;

pub fn upload_file<C: Connector>(session: &mut Session<C>, local: &Path, remote: &str) -> Result<()> {
    session.ensure_connected()?;
    let data = fs::read(local).map_err(|e| {
        VirshError::transfer(local.display().to_string(), format!("could not open local file: {e}"))
    })?;
    debug!("Uploading {} ({} bytes) to {remote}", local.display(), data.len());
    session.transport_mut()?.write_file(remote, &data)
}

pub fn download_file<C: Connector>(session: &mut Session<C>, remote: &str, local: &Path) -> Result<()> {
    let data = read_remote(session, remote)?;
    debug!("Downloaded {remote} ({} bytes) to {}", data.len(), local.display());
    fs::write(local, data).map_err(|e| {
        VirshError::transfer(local.display().to_string(), format!("could not write local file: {e}"))
    })
}

pub fn read_remote<C: Connector>(session: &mut Session<C>, remote: &str) -> Result<Vec<u8>> {
    session.transport_mut()?.read_file(remote)
}

/// Downloads `<base>/<vm_name>.xml`.
pub fn fetch_definition<C: Connector>(
    session: &mut Session<C>,
    vm_name: &str,
    local: &Path,
) -> Result<()> {
    let remote = session.remote_path(&format!("{vm_name}.xml"));
    download_file(session, &remote, local)
}

/// Stages `document` in a scratch file and uploads it as
/// `<base>/<vm_name>.xml`. The scratch file is removed whatever the upload
/// outcome. Returns the remote path.
pub fn publish_document<C: Connector>(
    session: &mut Session<C>,
    vm_name: &str,
    document: &str,
) -> Result<String> {
    session.ensure_connected()?;
    let remote = session.remote_path(&format!("{vm_name}.xml"));
    let mut scratch = tempfile::Builder::new()
        .prefix("virsh_remote-")
        .suffix(".xml")
        .tempfile()
        .map_err(|e| VirshError::transfer(&remote, format!("could not create scratch file: {e}")))?;
    let staged = scratch
        .write_all(document.as_bytes())
        .and_then(|_| scratch.flush())
        .map_err(|e| VirshError::transfer(&remote, format!("could not stage document: {e}")));
    let uploaded = staged.and_then(|_| upload_file(session, scratch.path(), &remote));
    if let Err(e) = scratch.close() {
        warn!("Could not remove scratch copy of {remote}: {e}");
    }
    uploaded?;
    info!("Published {remote}");
    Ok(remote)
}
