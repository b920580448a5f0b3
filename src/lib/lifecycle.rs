//! Named VM verbs, each a single command line sent through the session.
//!
//! Nothing here checks that the VM exists; whatever the remote tool prints
//! is handed back as is. Caller values pass through the session's
//! sanitizer before being interpolated.

use crate::error::Result;
use crate::parsers::{parse_interface_table, parse_key_values, parse_lines, NetworkInterfaceRecord, VmInfoRecord};
use crate::session::Session;
use crate::transport::Connector;

pub const VIRSH: &str = "virsh";
pub const QEMU_IMG: &str = "qemu-img";
pub const VIRT_CLONE: &str = "virt-clone";

/// Target device the ISO is attached to.
pub const CDROM_TARGET: &str = "hdb";

const IMAGES_DIR: &str = "images";

fn arg<C: Connector>(session: &Session<C>, value: &str) -> String {
    session.sanitize(value).into_owned()
}

fn virsh<C: Connector>(session: &mut Session<C>, args: &str) -> Result<String> {
    session.ensure_connected()?;
    session.run(&format!("{VIRSH} {args}"))
}

fn simple<C: Connector>(session: &mut Session<C>, verb: &str, name: &str) -> Result<String> {
    let name = arg(session, name);
    virsh(session, &format!("{verb} {name}"))
}

/// `<base>/images/<name>/`
fn image_dir<C: Connector>(session: &Session<C>, name: &str) -> String {
    session.remote_path(&format!("{IMAGES_DIR}/{name}/"))
}

/// Names of every defined VM, running or not.
pub fn list<C: Connector>(session: &mut Session<C>) -> Result<Vec<String>> {
    let out = virsh(session, "list --all --name")?;
    Ok(parse_lines(&out))
}

pub fn start<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    simple(session, "start", name)
}

/// Forced power-off.
pub fn destroy<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    simple(session, "destroy", name)
}

pub fn shutdown<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    simple(session, "shutdown", name)
}

pub fn reboot<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    simple(session, "reboot", name)
}

pub fn suspend<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    simple(session, "suspend", name)
}

pub fn resume<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    simple(session, "resume", name)
}

/// Dumps the running state of `name` to `file` on the host.
pub fn save<C: Connector>(session: &mut Session<C>, name: &str, file: &str) -> Result<String> {
    let (name, file) = (arg(session, name), arg(session, file));
    virsh(session, &format!("save {name} {file}"))
}

pub fn restore<C: Connector>(session: &mut Session<C>, file: &str) -> Result<String> {
    simple(session, "restore", file)
}

pub fn define<C: Connector>(session: &mut Session<C>, xml_file: &str) -> Result<String> {
    simple(session, "define", xml_file)
}

pub fn undefine<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    simple(session, "undefine", name)
}

pub fn dump_xml<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    simple(session, "dumpxml", name)
}

pub fn get_info<C: Connector>(session: &mut Session<C>, name: &str) -> Result<VmInfoRecord> {
    let out = simple(session, "dominfo", name)?;
    Ok(parse_key_values(&out))
}

pub fn get_network<C: Connector>(session: &mut Session<C>, name: &str) -> Result<Vec<NetworkInterfaceRecord>> {
    let out = simple(session, "domiflist", name)?;
    Ok(parse_interface_table(&out))
}

/// Creates `<base>/images/<name>/<name>.<format>` of `size` (e.g. `20G`).
pub fn create_disk<C: Connector>(session: &mut Session<C>, name: &str, format: &str, size: &str) -> Result<String> {
    session.ensure_connected()?;
    let (name, format, size) = (arg(session, name), arg(session, format), arg(session, size));
    let dir = image_dir(session, &name);
    session.run(&format!("mkdir {dir}"))?;
    session.run(&format!("{QEMU_IMG} create -f {format} {dir}{name}.{format} {size}"))
}

/// Clones `source` as `dest`. Without `dest_disk` the clone gets
/// `<base>/images/<dest>/<dest>.qcow2`, whose directory is created first.
pub fn clone_vm<C: Connector>(
    session: &mut Session<C>,
    source: &str,
    dest: &str,
    dest_disk: Option<&str>,
) -> Result<String> {
    session.ensure_connected()?;
    let (source, dest) = (arg(session, source), arg(session, dest));
    let disk = match dest_disk.filter(|d| !d.is_empty()) {
        Some(d) => arg(session, d),
        None => {
            let dir = image_dir(session, &dest);
            session.run(&format!("mkdir {dir}"))?;
            format!("{dir}{dest}.qcow2")
        }
    };
    session.run(&format!("{VIRT_CLONE} -o {source} -n {dest} --file {disk}"))
}

/// Attaches `<base>/images/<image>` as `target` (e.g. `vdb`).
pub fn attach_disk<C: Connector>(session: &mut Session<C>, name: &str, image: &str, target: &str) -> Result<String> {
    let (name, image, target) = (arg(session, name), arg(session, image), arg(session, target));
    let path = session.remote_path(&format!("{IMAGES_DIR}/{image}"));
    virsh(session, &format!("attach-disk {name} {path} {target} --cache none"))
}

pub fn detach_disk<C: Connector>(session: &mut Session<C>, name: &str, target: &str) -> Result<String> {
    let (name, target) = (arg(session, name), arg(session, target));
    virsh(session, &format!("detach-disk {name} --target {target}"))
}

pub fn attach_iso<C: Connector>(session: &mut Session<C>, name: &str, iso: &str) -> Result<String> {
    let (name, iso) = (arg(session, name), arg(session, iso));
    virsh(
        session,
        &format!("attach-disk {name} {iso} {CDROM_TARGET} --type cdrom --mode readonly"),
    )
}

/// Ejects the ISO by attaching an empty source to the cdrom target.
pub fn detach_iso<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    let name = arg(session, name);
    virsh(
        session,
        &format!("attach-disk {name} \"\" {CDROM_TARGET} --type cdrom --mode readonly"),
    )
}

/// Sets the link state of interface `iface` of `name`.
pub fn set_network<C: Connector>(session: &mut Session<C>, name: &str, iface: &str, up: bool) -> Result<String> {
    let (name, iface) = (arg(session, name), arg(session, iface));
    let state = if up { "up" } else { "down" };
    virsh(session, &format!("domif-setlink {name} {iface} {state}"))
}

/// Opens up the image directory and definition file of `name`. Returns the
/// output of the second command.
pub fn set_permission<C: Connector>(session: &mut Session<C>, name: &str) -> Result<String> {
    session.ensure_connected()?;
    let name = arg(session, name);
    let dir = image_dir(session, &name);
    let xml = session.remote_path(&format!("{name}.xml"));
    session.run(&format!("chmod -R 777 {dir}"))?;
    session.run(&format!("chmod -R 777 {xml}"))
}
