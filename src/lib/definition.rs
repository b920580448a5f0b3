//! Publishing and patching the per-VM definition file on the host.
//!
//! Patches never raise when the current document cannot be fetched: they
//! log it and return `Ok(None)`. A successful call returns the text that
//! was uploaded.

use crate::domain_xml::{generate, replace_mac_addresses, DomainDocument, MacReplaceMode, VmDescriptor};
use crate::error::Result;
use crate::lifecycle::dump_xml;
use crate::mac::random_mac;
use crate::session::Session;
use crate::transfer::{publish_document, read_remote};
use crate::transport::Connector;

/// Writes a fresh definition for `desc` to `<base>/<name>.xml`.
pub fn create_definition<C: Connector>(session: &mut Session<C>, desc: &VmDescriptor) -> Result<String> {
    let xml = generate(desc);
    publish_document(session, &desc.name, &xml)?;
    Ok(xml)
}

fn fetch_definition_text<C: Connector>(session: &mut Session<C>, vm_name: &str) -> Result<Option<String>> {
    session.ensure_connected()?;
    let remote = session.remote_path(&format!("{vm_name}.xml"));
    match read_remote(session, &remote) {
        Ok(data) if !data.is_empty() => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
        Ok(_) => {
            warn!("{remote} is empty, leaving it alone");
            Ok(None)
        }
        Err(e) => {
            warn!("Couldn't read {remote}: {e}");
            Ok(None)
        }
    }
}

fn patch<C, F>(session: &mut Session<C>, vm_name: &str, edit: F) -> Result<Option<String>>
where
    C: Connector,
    F: FnOnce(&mut DomainDocument) -> Result<()>,
{
    let Some(current) = fetch_definition_text(session, vm_name)? else {
        return Ok(None);
    };
    let mut doc = DomainDocument::parse(&current)?;
    edit(&mut doc)?;
    let xml = doc.to_string();
    publish_document(session, vm_name, &xml)?;
    Ok(Some(xml))
}

/// Makes `device` the only boot device. Empty means `hd`.
pub fn change_boot<C: Connector>(session: &mut Session<C>, vm_name: &str, device: &str) -> Result<Option<String>> {
    patch(session, vm_name, |doc| doc.set_boot_device(device))
}

/// Updates the limits of an existing `<bandwidth>`; fails if there is none.
pub fn change_bandwidth<C: Connector>(
    session: &mut Session<C>,
    vm_name: &str,
    inbound: u64,
    outbound: u64,
) -> Result<Option<String>> {
    patch(session, vm_name, |doc| doc.set_bandwidth(inbound, outbound))
}

/// Rewrites the MAC in the document reported by `virsh dumpxml` and uploads
/// it as the definition file. An empty `new_mac` picks a random one.
pub fn change_mac<C: Connector>(
    session: &mut Session<C>,
    vm_name: &str,
    new_mac: &str,
    mode: MacReplaceMode,
) -> Result<Option<String>> {
    let current = dump_xml(session, vm_name)?;
    if current.trim().is_empty() {
        warn!("dumpxml returned nothing for {vm_name}");
        return Ok(None);
    }
    let mut doc = match DomainDocument::parse(&current) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("dumpxml for {vm_name} is not a domain document ({e}), leaving the definition alone");
            return Ok(None);
        }
    };
    let mac = match new_mac {
        "" => random_mac(),
        m => m.to_string(),
    };
    let xml = match mode {
        MacReplaceMode::Textual => replace_mac_addresses(&current, &mac),
        MacReplaceMode::Structural => {
            doc.set_interface_macs(&mac)?;
            doc.to_string()
        }
    };
    publish_document(session, vm_name, &xml)?;
    Ok(Some(xml))
}
