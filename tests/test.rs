use rstest::rstest;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use virsh_remote::definition::{change_bandwidth, change_boot, change_mac, create_definition};
use virsh_remote::domain_xml::{DomainDocument, MacReplaceMode, VmDescriptor};
use virsh_remote::lifecycle;
use virsh_remote::session::SessionState;
use virsh_remote::transfer::{download_file, fetch_definition, upload_file};
use virsh_remote::transport::{Connector, Transport};
use virsh_remote::{Result, Session, VirshError};

const HOST: &str = "192.168.3.181";
const BASE: &str = "/data/libvirt/";

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct HostState {
    opened: usize,
    closed: usize,
    reject_auth: bool,
    whoami: String,
    commands: Vec<String>,
    responses: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
}

impl Default for HostState {
    fn default() -> Self {
        HostState {
            opened: 0,
            closed: 0,
            reject_auth: false,
            whoami: "root\n".to_string(),
            commands: vec![],
            responses: HashMap::new(),
            files: HashMap::new(),
        }
    }
}

/// Scripted stand-in for an ssh host.
#[derive(Clone, Default)]
struct FakeHost(Rc<RefCell<HostState>>);

impl FakeHost {
    fn respond(&self, command: &str, output: &str) {
        self.0
            .borrow_mut()
            .responses
            .insert(command.to_string(), output.to_string());
    }

    fn put_file(&self, path: &str, data: &str) {
        self.0
            .borrow_mut()
            .files
            .insert(path.to_string(), data.as_bytes().to_vec());
    }

    fn file(&self, path: &str) -> Option<String> {
        self.0
            .borrow()
            .files
            .get(path)
            .map(|d| String::from_utf8_lossy(d).into_owned())
    }

    /// Commands issued after the login check.
    fn commands(&self) -> Vec<String> {
        self.0
            .borrow()
            .commands
            .iter()
            .filter(|c| c.as_str() != "whoami")
            .cloned()
            .collect()
    }
}

struct FakeTransport(Rc<RefCell<HostState>>);

impl Connector for FakeHost {
    type Transport = FakeTransport;

    fn open(&mut self, _host: &str, _port: u16) -> Result<FakeTransport> {
        self.0.borrow_mut().opened += 1;
        Ok(FakeTransport(self.0.clone()))
    }
}

impl Transport for FakeTransport {
    fn authenticate(&mut self, _username: &str, _password: &str) -> Result<()> {
        if self.0.borrow().reject_auth {
            return Err(VirshError::LoginFailed);
        }
        Ok(())
    }

    fn exec(&mut self, command: &str) -> Result<String> {
        let mut state = self.0.borrow_mut();
        state.commands.push(command.to_string());
        if command == "whoami" {
            return Ok(state.whoami.clone());
        }
        Ok(state.responses.get(command).cloned().unwrap_or_default())
    }

    fn write_file(&mut self, remote: &str, data: &[u8]) -> Result<()> {
        self.0
            .borrow_mut()
            .files
            .insert(remote.to_string(), data.to_vec());
        Ok(())
    }

    fn read_file(&mut self, remote: &str) -> Result<Vec<u8>> {
        self.0
            .borrow()
            .files
            .get(remote)
            .cloned()
            .ok_or_else(|| VirshError::TransferFailed {
                path: remote.to_string(),
                reason: "no such file".to_string(),
            })
    }

    fn close(&mut self) -> Result<()> {
        self.0.borrow_mut().closed += 1;
        Ok(())
    }
}

fn configured() -> (FakeHost, Session<FakeHost>) {
    let host = FakeHost::default();
    let mut session = Session::with_connector(host.clone());
    session.configure(HOST, 22, BASE);
    (host, session)
}

fn connected() -> (FakeHost, Session<FakeHost>) {
    let (host, mut session) = configured();
    session.connect("root", "123456").unwrap();
    (host, session)
}

#[test]
fn connect_before_configure_fails() {
    let host = FakeHost::default();
    let mut session = Session::with_connector(host.clone());
    assert!(matches!(session.connect("root", "123456"), Err(VirshError::HostUndefined)));
    assert_eq!(host.0.borrow().opened, 0);
}

#[rstest]
#[case("", 22, BASE)]
#[case(HOST, 0, BASE)]
#[case(HOST, 22, "")]
fn incomplete_configuration_is_rejected(#[case] addr: &str, #[case] port: u16, #[case] base: &str) {
    let host = FakeHost::default();
    let mut session = Session::with_connector(host.clone());
    session.configure(addr, port, base);
    assert!(matches!(session.connect("root", "123456"), Err(VirshError::HostUndefined)));
    assert_eq!(host.0.borrow().opened, 0);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn empty_identity_means_login_failed() {
    let (host, mut session) = configured();
    host.0.borrow_mut().whoami = String::new();
    assert!(matches!(session.connect("root", "wrong"), Err(VirshError::LoginFailed)));
    assert!(!session.is_connected());
    assert_eq!(host.0.borrow().commands, vec!["whoami"]);
}

#[test]
fn failed_identity_check_closes_the_transport() {
    let (host, mut session) = configured();
    host.0.borrow_mut().whoami = String::new();
    assert!(session.connect("root", "wrong").is_err());
    assert_eq!(host.0.borrow().opened, 1);
    assert_eq!(host.0.borrow().closed, 1);
}

#[test]
fn rejected_password_means_login_failed() {
    let (host, mut session) = configured();
    host.0.borrow_mut().reject_auth = true;
    assert!(matches!(session.connect("root", "wrong"), Err(VirshError::LoginFailed)));
    assert!(!session.is_connected());
    assert!(host.0.borrow().commands.is_empty());
}

#[test]
fn connect_checks_identity_and_disconnect_closes() {
    let (host, mut session) = connected();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(host.0.borrow().commands, vec!["whoami"]);
    session.disconnect();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(host.0.borrow().closed, 1);
    assert!(matches!(session.run("whoami"), Err(VirshError::NoConnection)));
}

#[test]
fn run_returns_raw_output_without_judging_it() {
    let (host, mut session) = connected();
    host.respond("virsh start nope", "error: failed to get domain 'nope'\n");
    assert_eq!(
        lifecycle::start(&mut session, "nope").unwrap(),
        "error: failed to get domain 'nope'\n"
    );
}

type Fake = Session<FakeHost>;
type Op = fn(&mut Fake) -> Result<()>;

#[rstest]
#[case::list(|s: &mut Fake| lifecycle::list(s).map(|_| ()))]
#[case::start(|s: &mut Fake| lifecycle::start(s, "centos").map(|_| ()))]
#[case::destroy(|s: &mut Fake| lifecycle::destroy(s, "centos").map(|_| ()))]
#[case::shutdown(|s: &mut Fake| lifecycle::shutdown(s, "centos").map(|_| ()))]
#[case::reboot(|s: &mut Fake| lifecycle::reboot(s, "centos").map(|_| ()))]
#[case::suspend(|s: &mut Fake| lifecycle::suspend(s, "centos").map(|_| ()))]
#[case::resume(|s: &mut Fake| lifecycle::resume(s, "centos").map(|_| ()))]
#[case::save(|s: &mut Fake| lifecycle::save(s, "centos", "/tmp/c.save").map(|_| ()))]
#[case::restore(|s: &mut Fake| lifecycle::restore(s, "/tmp/c.save").map(|_| ()))]
#[case::define(|s: &mut Fake| lifecycle::define(s, "/data/libvirt/centos.xml").map(|_| ()))]
#[case::undefine(|s: &mut Fake| lifecycle::undefine(s, "centos").map(|_| ()))]
#[case::dump_xml(|s: &mut Fake| lifecycle::dump_xml(s, "centos").map(|_| ()))]
#[case::get_info(|s: &mut Fake| lifecycle::get_info(s, "centos").map(|_| ()))]
#[case::get_network(|s: &mut Fake| lifecycle::get_network(s, "centos").map(|_| ()))]
#[case::create_disk(|s: &mut Fake| lifecycle::create_disk(s, "centos", "qcow2", "20G").map(|_| ()))]
#[case::clone_vm(|s: &mut Fake| lifecycle::clone_vm(s, "centos", "copy", None).map(|_| ()))]
#[case::attach_disk(|s: &mut Fake| lifecycle::attach_disk(s, "centos", "data.qcow2", "vdb").map(|_| ()))]
#[case::detach_disk(|s: &mut Fake| lifecycle::detach_disk(s, "centos", "vdb").map(|_| ()))]
#[case::attach_iso(|s: &mut Fake| lifecycle::attach_iso(s, "centos", "/iso/c7.iso").map(|_| ()))]
#[case::detach_iso(|s: &mut Fake| lifecycle::detach_iso(s, "centos").map(|_| ()))]
#[case::set_network(|s: &mut Fake| lifecycle::set_network(s, "centos", "vnet0", false).map(|_| ()))]
#[case::set_permission(|s: &mut Fake| lifecycle::set_permission(s, "centos").map(|_| ()))]
#[case::create_definition(|s: &mut Fake| create_definition(s, &VmDescriptor::new("centos", 1, 1024)).map(|_| ()))]
#[case::change_boot(|s: &mut Fake| change_boot(s, "centos", "hd").map(|_| ()))]
#[case::change_bandwidth(|s: &mut Fake| change_bandwidth(s, "centos", 1, 1).map(|_| ()))]
#[case::change_mac(|s: &mut Fake| change_mac(s, "centos", "", MacReplaceMode::Textual).map(|_| ()))]
fn disconnected_operations_issue_nothing(#[case] op: Op) {
    let (host, mut session) = configured();
    assert!(matches!(op(&mut session), Err(VirshError::NoConnection)));
    assert!(host.0.borrow().commands.is_empty());
    assert!(host.0.borrow().files.is_empty());
}

#[test]
fn lifecycle_command_lines() {
    let (host, mut session) = connected();
    lifecycle::start(&mut session, "centos").unwrap();
    lifecycle::destroy(&mut session, "centos").unwrap();
    lifecycle::shutdown(&mut session, "centos").unwrap();
    lifecycle::reboot(&mut session, "centos").unwrap();
    lifecycle::suspend(&mut session, "centos").unwrap();
    lifecycle::resume(&mut session, "centos").unwrap();
    lifecycle::save(&mut session, "centos", "/tmp/c.save").unwrap();
    lifecycle::restore(&mut session, "/tmp/c.save").unwrap();
    lifecycle::define(&mut session, "/data/libvirt/centos.xml").unwrap();
    lifecycle::undefine(&mut session, "centos").unwrap();
    lifecycle::dump_xml(&mut session, "centos").unwrap();
    lifecycle::attach_disk(&mut session, "centos", "data.qcow2", "vdb").unwrap();
    lifecycle::detach_disk(&mut session, "centos", "vdb").unwrap();
    lifecycle::attach_iso(&mut session, "centos", "/iso/c7.iso").unwrap();
    lifecycle::detach_iso(&mut session, "centos").unwrap();
    lifecycle::set_network(&mut session, "centos", "vnet0", true).unwrap();
    lifecycle::set_network(&mut session, "centos", "vnet0", false).unwrap();
    assert_eq!(
        host.commands(),
        vec![
            "virsh start centos",
            "virsh destroy centos",
            "virsh shutdown centos",
            "virsh reboot centos",
            "virsh suspend centos",
            "virsh resume centos",
            "virsh save centos /tmp/c.save",
            "virsh restore /tmp/c.save",
            "virsh define /data/libvirt/centos.xml",
            "virsh undefine centos",
            "virsh dumpxml centos",
            "virsh attach-disk centos /data/libvirt/images/data.qcow2 vdb --cache none",
            "virsh detach-disk centos --target vdb",
            "virsh attach-disk centos /iso/c7.iso hdb --type cdrom --mode readonly",
            "virsh attach-disk centos \"\" hdb --type cdrom --mode readonly",
            "virsh domif-setlink centos vnet0 up",
            "virsh domif-setlink centos vnet0 down",
        ]
    );
}

#[test]
fn list_info_and_interfaces_are_parsed() {
    let (host, mut session) = connected();
    host.respond("virsh list --all --name", "centos\r\nubuntu\r\n\r\n");
    host.respond(
        "virsh dominfo centos",
        "Id:             22\nName:           centos\nState:          running\nState:          paused\n\n",
    );
    host.respond(
        "virsh domiflist centos",
        " Interface   Type       Source     Model       MAC\n-------------------------------------------------------\n vnet0       bridge     br0        virtio      52:54:00:aa:bb:cc\n\n",
    );

    assert_eq!(lifecycle::list(&mut session).unwrap(), vec!["centos", "ubuntu"]);

    let info = lifecycle::get_info(&mut session, "centos").unwrap();
    assert_eq!(info["Name"], "centos");
    assert_eq!(info["State"], "paused");

    let ifaces = lifecycle::get_network(&mut session, "centos").unwrap();
    assert_eq!(ifaces.len(), 1);
    assert_eq!(ifaces[0].interface, "vnet0");
    assert_eq!(ifaces[0].kind.as_deref(), Some("bridge"));
    assert_eq!(ifaces[0].source.as_deref(), Some("br0"));
    assert_eq!(ifaces[0].model.as_deref(), Some("virtio"));
    assert_eq!(ifaces[0].mac.as_deref(), Some("52:54:00:aa:bb:cc"));
}

#[test]
fn disk_creation_makes_image_directory_first() {
    let (host, mut session) = connected();
    lifecycle::create_disk(&mut session, "centos", "qcow2", "20G").unwrap();
    assert_eq!(
        host.commands(),
        vec![
            "mkdir /data/libvirt/images/centos/",
            "qemu-img create -f qcow2 /data/libvirt/images/centos/centos.qcow2 20G",
        ]
    );
}

#[test]
fn clone_derives_disk_when_none_given() {
    let (host, mut session) = connected();
    lifecycle::clone_vm(&mut session, "centos", "copy", None).unwrap();
    lifecycle::clone_vm(&mut session, "centos", "copy2", Some("/srv/copy2.qcow2")).unwrap();
    assert_eq!(
        host.commands(),
        vec![
            "mkdir /data/libvirt/images/copy/",
            "virt-clone -o centos -n copy --file /data/libvirt/images/copy/copy.qcow2",
            "virt-clone -o centos -n copy2 --file /srv/copy2.qcow2",
        ]
    );
}

#[test]
fn permissions_cover_images_and_definition() {
    let (host, mut session) = connected();
    host.respond("chmod -R 777 /data/libvirt/centos.xml", "done");
    assert_eq!(lifecycle::set_permission(&mut session, "centos").unwrap(), "done");
    assert_eq!(
        host.commands(),
        vec![
            "chmod -R 777 /data/libvirt/images/centos/",
            "chmod -R 777 /data/libvirt/centos.xml",
        ]
    );
}

#[test]
fn default_sanitizer_passes_arguments_through() {
    let (host, mut session) = connected();
    lifecycle::start(&mut session, "centos; reboot").unwrap();
    assert_eq!(host.commands(), vec!["virsh start centos; reboot"]);
}

#[test]
fn custom_sanitizer_sees_every_argument() {
    let (host, mut session) = connected();
    session.set_sanitizer(|arg: &str| arg.replace(';', ""));
    lifecycle::save(&mut session, "centos;", "/tmp/x;").unwrap();
    assert_eq!(host.commands(), vec!["virsh save centos /tmp/x"]);
}

#[test]
fn create_definition_publishes_to_base_path() {
    let (host, mut session) = connected();
    let mut desc = VmDescriptor::new("centos", 2, 1048576);
    desc.disk_path = Some("/data/libvirt/images/centos/centos.qcow2".to_string());
    desc.iso_path = Some("/iso/c7.iso".to_string());
    let xml = create_definition(&mut session, &desc).unwrap();

    let uploaded = host.file("/data/libvirt/centos.xml").unwrap();
    assert_eq!(uploaded, xml);
    let doc = DomainDocument::parse(&uploaded).unwrap();
    let devices: Vec<_> = doc
        .root()
        .find_all("disk")
        .into_iter()
        .filter_map(|d| d.attribute("device"))
        .collect();
    assert_eq!(devices, vec!["disk", "cdrom"]);
}

#[test]
fn boot_change_without_remote_document_is_silent() {
    let (host, mut session) = connected();
    assert_eq!(change_boot(&mut session, "centos", "cdrom").unwrap(), None);
    assert!(host.0.borrow().files.is_empty());
}

#[test]
fn boot_change_rewrites_remote_document() {
    let (host, mut session) = connected();
    create_definition(&mut session, &VmDescriptor::new("centos", 1, 1024)).unwrap();

    change_boot(&mut session, "centos", "cdrom").unwrap().unwrap();
    change_boot(&mut session, "centos", "hd").unwrap().unwrap();
    change_boot(&mut session, "centos", "hd").unwrap().unwrap();

    let doc = DomainDocument::parse(&host.file("/data/libvirt/centos.xml").unwrap()).unwrap();
    assert_eq!(doc.boot_devices(), vec!["hd"]);
}

#[test]
fn boot_change_keeps_unrelated_siblings() {
    let (host, mut session) = connected();
    host.put_file(
        "/data/libvirt/centos.xml",
        "<domain type='kvm'>\n  <os>\n    <type arch='x86_64'>hvm</type>\n    <boot dev='network'/>\n    <boot dev='cdrom'/>\n    <bootmenu enable='yes'/>\n  </os>\n  <on_crash>destroy</on_crash>\n</domain>\n",
    );
    change_boot(&mut session, "centos", "hd").unwrap().unwrap();
    assert_eq!(
        host.file("/data/libvirt/centos.xml").unwrap(),
        "<domain type='kvm'>\n  <os>\n    <type arch='x86_64'>hvm</type>\n    <bootmenu enable='yes'/>\n    <boot dev='hd'/>\n  </os>\n  <on_crash>destroy</on_crash>\n</domain>\n"
    );
}

#[test]
fn bandwidth_change_requires_existing_element() {
    let (host, mut session) = connected();
    create_definition(&mut session, &VmDescriptor::new("centos", 1, 1024)).unwrap();
    let before = host.file("/data/libvirt/centos.xml").unwrap();

    assert!(matches!(
        change_bandwidth(&mut session, "centos", 100, 200),
        Err(VirshError::Document(_))
    ));
    assert_eq!(host.file("/data/libvirt/centos.xml").unwrap(), before);
}

#[test]
fn bandwidth_change_updates_limits() {
    let (host, mut session) = connected();
    let mut desc = VmDescriptor::new("centos", 1, 1024);
    desc.network.bandwidth_in_kibps = 1;
    desc.network.bandwidth_out_kibps = 1;
    create_definition(&mut session, &desc).unwrap();

    change_bandwidth(&mut session, "centos", 100, 200).unwrap().unwrap();
    let doc = DomainDocument::parse(&host.file("/data/libvirt/centos.xml").unwrap()).unwrap();
    let bandwidth = doc.root().find_all("bandwidth");
    assert_eq!(bandwidth.len(), 1);
    assert_eq!(bandwidth[0].child("inbound").unwrap().attribute("average"), Some("100"));
    assert_eq!(bandwidth[0].child("outbound").unwrap().attribute("average"), Some("200"));
}

#[test]
fn mac_change_uses_dumpxml_output() {
    let (host, mut session) = connected();
    host.respond(
        "virsh dumpxml centos",
        "<domain type='kvm'>\n  <devices>\n    <interface type='network'>\n      <mac address='52:54:00:aa:bb:cc'/>\n    </interface>\n  </devices>\n</domain>\n",
    );
    let xml = change_mac(&mut session, "centos", "0e:37:6a:00:00:01", MacReplaceMode::Textual)
        .unwrap()
        .unwrap();
    assert!(xml.contains("<mac address='0e:37:6a:00:00:01'/>"));
    assert_eq!(host.file("/data/libvirt/centos.xml").unwrap(), xml);
    assert_eq!(host.commands(), vec!["virsh dumpxml centos"]);
}

#[test]
fn mac_change_with_empty_dump_does_nothing() {
    let (host, mut session) = connected();
    assert_eq!(
        change_mac(&mut session, "ghost", "", MacReplaceMode::Textual).unwrap(),
        None
    );
    assert!(host.0.borrow().files.is_empty());
}

#[test]
fn mac_change_ignores_dumpxml_errors() {
    let (host, mut session) = connected();
    let stored = "<domain type='kvm'><devices><interface><mac address='52:54:00:aa:bb:cc'/></interface></devices></domain>\n";
    host.put_file("/data/libvirt/centos.xml", stored);
    host.respond("virsh dumpxml centos", "error: failed to get domain 'centos'\n");
    for mode in [MacReplaceMode::Textual, MacReplaceMode::Structural] {
        assert_eq!(change_mac(&mut session, "centos", "", mode).unwrap(), None);
    }
    assert_eq!(host.file("/data/libvirt/centos.xml").as_deref(), Some(stored));
}

#[test]
fn file_transfer_round_trip() {
    let (host, mut session) = connected();
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("centos.xml");
    std::fs::write(&local, "<domain/>").unwrap();

    upload_file(&mut session, &local, "/data/libvirt/centos.xml").unwrap();
    assert_eq!(host.file("/data/libvirt/centos.xml").as_deref(), Some("<domain/>"));

    let copy = dir.path().join("copy.xml");
    fetch_definition(&mut session, "centos", &copy).unwrap();
    assert_eq!(std::fs::read_to_string(&copy).unwrap(), "<domain/>");
}

#[test]
fn transfer_failures_are_typed() {
    let (_host, mut session) = connected();
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("missing.xml");
    assert!(matches!(
        upload_file(&mut session, &missing, "/data/libvirt/x.xml"),
        Err(VirshError::TransferFailed { .. })
    ));
    assert!(matches!(
        download_file(&mut session, "/data/libvirt/none.xml", &dir.path().join("none.xml")),
        Err(VirshError::TransferFailed { .. })
    ));
}

#[test]
fn remote_paths_use_one_separator() {
    let (_host, session) = configured();
    assert_eq!(session.remote_path("centos.xml"), "/data/libvirt/centos.xml");
    assert_eq!(session.remote_path("/images/x/"), "/data/libvirt/images/x/");
}
