//! Domain definition documents: generation from a [`VmDescriptor`] and the
//! handful of targeted edits applied to documents fetched from the host.
//!
//! [`DomainDocument`] keeps every node it parsed, in order, so a document
//! survives parse → mutate → serialize with unrelated content untouched.
//! Attribute values and text are kept in their escaped source form.

use crate::error::{Result, VirshError};
use crate::mac::random_mac;
use crate::xml_consts::{BANDWIDTH, CDROM, DISK, DOMAIN_HEAD, DOMAIN_TAIL, INTERFACE_HEAD};
use lazy_static::lazy_static;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_BOOT_DEVICE: &str = "hd";
pub const DEFAULT_NETWORK_TYPE: &str = "network";
pub const DEFAULT_NETWORK_NAME: &str = "default";
pub const DEFAULT_VNC_PORT: u16 = 5900;

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(r"\{\{([A-Z_]+)\}\}").unwrap();
    pub static ref ADDRESS_ATTR_REGEX: Regex =
        Regex::new(r#"address=(?:'(?P<single>[A-Za-z0-9:]+)'|"(?P<double>[A-Za-z0-9:]+)")"#).unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    /// Interface type: `network` for a libvirt-managed network, anything
    /// else (`bridge`, ...) names the source directly.
    pub kind: String,
    pub name: String,
    pub mac: Option<String>,
    pub bridge: Option<String>,
    pub bandwidth_in_kibps: u64,
    pub bandwidth_out_kibps: u64,
}

impl Default for NetworkDescriptor {
    fn default() -> Self {
        NetworkDescriptor {
            kind: DEFAULT_NETWORK_TYPE.to_string(),
            name: DEFAULT_NETWORK_NAME.to_string(),
            mac: None,
            bridge: None,
            bandwidth_in_kibps: 0,
            bandwidth_out_kibps: 0,
        }
    }
}

impl NetworkDescriptor {
    /// Attribute of `<source>` that carries the network name.
    pub fn source_attribute(&self) -> &'static str {
        if self.kind == DEFAULT_NETWORK_TYPE {
            "network"
        } else {
            "name"
        }
    }

    fn has_bandwidth_limit(&self) -> bool {
        self.bandwidth_in_kibps != 0 && self.bandwidth_out_kibps != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDescriptor {
    pub name: String,
    pub vcpu_count: u32,
    pub memory_kib: u64,
    pub disk_path: Option<String>,
    pub iso_path: Option<String>,
    pub boot_device: String,
    pub network: NetworkDescriptor,
    pub vnc_port: u16,
}

impl VmDescriptor {
    pub fn new(name: &str, vcpu_count: u32, memory_kib: u64) -> Self {
        VmDescriptor {
            name: name.to_string(),
            vcpu_count,
            memory_kib,
            disk_path: None,
            iso_path: None,
            boot_device: DEFAULT_BOOT_DEVICE.to_string(),
            network: NetworkDescriptor::default(),
            vnc_port: DEFAULT_VNC_PORT,
        }
    }
}

fn fill(template: &str, values: &HashMap<&str, String>) -> String {
    TOKEN_REGEX
        .replace_all(template, |caps: &Captures| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Builds a complete domain document for `desc`.
pub fn generate(desc: &VmDescriptor) -> String {
    let net = &desc.network;
    let boot = match desc.boot_device.as_str() {
        "" => DEFAULT_BOOT_DEVICE,
        dev => dev,
    };
    let mac = non_empty(&net.mac)
        .map(|m| m.to_string())
        .unwrap_or_else(random_mac);
    let bridge = non_empty(&net.bridge)
        .map(|b| format!(" bridge='{}'", escape(b)))
        .unwrap_or_default();

    let mut values: HashMap<&str, String> = HashMap::new();
    values.insert("NAME", escape(desc.name.as_str()).into_owned());
    values.insert("UUID", Uuid::new_v4().to_string());
    values.insert("MEMORY", desc.memory_kib.to_string());
    values.insert("VCPU", desc.vcpu_count.to_string());
    values.insert("BOOT", escape(boot).into_owned());
    values.insert("NETWORK_TYPE", escape(net.kind.as_str()).into_owned());
    values.insert("MAC", escape(mac.as_str()).into_owned());
    values.insert("SOURCE_ATTR", net.source_attribute().to_string());
    values.insert("NETWORK_NAME", escape(net.name.as_str()).into_owned());
    values.insert("BRIDGE", bridge);
    values.insert("INBOUND", net.bandwidth_in_kibps.to_string());
    values.insert("OUTBOUND", net.bandwidth_out_kibps.to_string());
    values.insert("VNC_PORT", desc.vnc_port.to_string());

    let mut xml = fill(DOMAIN_HEAD, &values);
    if let Some(disk) = non_empty(&desc.disk_path) {
        values.insert("DISK", escape(disk).into_owned());
        xml.push_str(&fill(DISK, &values));
    }
    if let Some(iso) = non_empty(&desc.iso_path) {
        values.insert("ISO", escape(iso).into_owned());
        xml.push_str(&fill(CDROM, &values));
    }
    xml.push_str(&fill(INTERFACE_HEAD, &values));
    if net.has_bandwidth_limit() {
        xml.push_str(&fill(BANDWIDTH, &values));
    }
    xml.push_str(&fill(DOMAIN_TAIL, &values));
    xml
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    /// Comments, CDATA, declarations and processing instructions, verbatim.
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Element {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn from_start(e: &BytesStart) -> Result<Self> {
        let mut el = Element::new(&String::from_utf8_lossy(e.name().as_ref()));
        for attr in e.attributes() {
            let attr = attr.map_err(|err| VirshError::Document(err.to_string()))?;
            el.attributes.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                String::from_utf8_lossy(&attr.value).into_owned(),
            ));
        }
        Ok(el)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, key: &str, value: &str) {
        let value = escape(value).into_owned();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Every descendant element called `name`, in document order.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        for child in self.elements() {
            if child.name == name {
                found.push(child);
            }
            found.extend(child.find_all(name));
        }
        found
    }

    /// Drops direct children called `name` along with the indentation in
    /// front of them.
    pub fn remove_children(&mut self, name: &str) {
        let mut kept: Vec<Node> = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                Node::Element(e) if e.name == name => {
                    if matches!(kept.last(), Some(Node::Text(t)) if t.trim().is_empty()) {
                        kept.pop();
                    }
                }
                other => kept.push(other),
            }
        }
        self.children = kept;
    }

    /// Appends `child` as the last element, reusing the indentation of the
    /// existing children.
    pub fn append_child(&mut self, child: Element) {
        let indent = self.children.iter().find_map(|n| match n {
            Node::Text(t) if t.trim().is_empty() => Some(t.clone()),
            _ => None,
        });
        let Some(indent) = indent else {
            self.children.push(Node::Element(child));
            return;
        };
        let at = match self.children.last() {
            Some(Node::Text(t)) if t.trim().is_empty() => self.children.len() - 1,
            _ => self.children.len(),
        };
        self.children.insert(at, Node::Element(child));
        self.children.insert(at, Node::Text(indent));
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (key, value) in &self.attributes {
            let quote = if value.contains('\'') { '"' } else { '\'' };
            write!(f, " {key}={quote}{value}{quote}")?;
        }
        if self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.name)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Element(e) => write!(f, "{e}"),
            Node::Text(t) | Node::Other(t) => f.write_str(t),
        }
    }
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Element>,
    prolog: Vec<Node>,
    root: Option<Element>,
    epilog: Vec<Node>,
}

impl TreeBuilder {
    fn attach(&mut self, node: Node) -> Result<()> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
            return Ok(());
        }
        match node {
            Node::Element(el) => {
                if self.root.is_some() {
                    return Err(VirshError::Document(
                        "more than one root element".to_string(),
                    ));
                }
                self.root = Some(el);
            }
            other if self.root.is_some() => self.epilog.push(other),
            other => self.prolog.push(other),
        }
        Ok(())
    }
}

/// Whether `change_mac` rewrites the whole text or only interface MACs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MacReplaceMode {
    /// Every `address='…'` attribute made of alphanumerics and colons.
    #[default]
    Textual,
    /// Only `<mac address>` inside `<interface>` elements.
    Structural,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainDocument {
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
}

impl DomainDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut tree = TreeBuilder::default();
        loop {
            match reader.read_event()? {
                Event::Start(e) => tree.stack.push(Element::from_start(&e)?),
                Event::Empty(e) => tree.attach(Node::Element(Element::from_start(&e)?))?,
                Event::End(_) => {
                    let el = tree.stack.pop().ok_or_else(|| {
                        VirshError::Document("closing tag without an opening tag".to_string())
                    })?;
                    tree.attach(Node::Element(el))?;
                }
                Event::Text(t) => {
                    tree.attach(Node::Text(String::from_utf8_lossy(&t).into_owned()))?
                }
                Event::CData(t) => tree.attach(Node::Other(format!(
                    "<![CDATA[{}]]>",
                    String::from_utf8_lossy(&t)
                )))?,
                Event::Comment(t) => tree.attach(Node::Other(format!(
                    "<!--{}-->",
                    String::from_utf8_lossy(&t)
                )))?,
                Event::Decl(d) => tree.attach(Node::Other(format!(
                    "<?{}?>",
                    String::from_utf8_lossy(&d)
                )))?,
                Event::PI(p) => tree.attach(Node::Other(format!(
                    "<?{}?>",
                    String::from_utf8_lossy(&p)
                )))?,
                Event::DocType(t) => tree.attach(Node::Other(format!(
                    "<!DOCTYPE {}>",
                    String::from_utf8_lossy(&t).trim()
                )))?,
                Event::Eof => break,
                #[allow(unreachable_patterns)]
                _ => {}
            }
        }
        if let Some(open) = tree.stack.last() {
            return Err(VirshError::Document(format!("unclosed <{}>", open.name)));
        }
        let root = tree
            .root
            .ok_or_else(|| VirshError::Document("document has no root element".to_string()))?;
        Ok(DomainDocument {
            prolog: tree.prolog,
            root,
            epilog: tree.epilog,
        })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    fn section_mut(&mut self, name: &str) -> Result<&mut Element> {
        self.root
            .child_mut(name)
            .ok_or_else(|| VirshError::Document(format!("no <{name}> element under <domain>")))
    }

    /// Devices listed by the `boot` elements under `os`.
    pub fn boot_devices(&self) -> Vec<&str> {
        self.root
            .child("os")
            .map(|os| {
                os.elements()
                    .filter(|e| e.name == "boot")
                    .filter_map(|e| e.attribute("dev"))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replaces every `boot` element under `os` with a single one.
    pub fn replace_boot_device(&mut self, device: &str) -> Result<()> {
        let os = self.section_mut("os")?;
        os.remove_children("boot");
        os.append_child(Element::new("boot").with_attribute("dev", device));
        Ok(())
    }

    /// Boot-device mutation as published to the host: the replacement runs
    /// twice, so one call is the same as two calls of
    /// [`replace_boot_device`](Self::replace_boot_device).
    pub fn set_boot_device(&mut self, device: &str) -> Result<()> {
        let device = if device.is_empty() {
            DEFAULT_BOOT_DEVICE
        } else {
            device
        };
        self.replace_boot_device(device)?;
        self.replace_boot_device(device)
    }

    /// Sets the averages of the first interface's existing bandwidth limits.
    /// A document without a `bandwidth` element is an error.
    pub fn set_bandwidth(&mut self, inbound: u64, outbound: u64) -> Result<()> {
        let interface = self
            .section_mut("devices")?
            .child_mut("interface")
            .ok_or_else(|| VirshError::Document("no <interface> under <devices>".to_string()))?;
        let bandwidth = interface.child_mut("bandwidth").ok_or_else(|| {
            VirshError::Document("no <bandwidth> element under the first <interface>".to_string())
        })?;
        for (direction, value) in [("inbound", inbound), ("outbound", outbound)] {
            bandwidth
                .child_mut(direction)
                .ok_or_else(|| VirshError::Document(format!("no <{direction}> under <bandwidth>")))?
                .set_attribute("average", &value.to_string());
        }
        Ok(())
    }

    /// Rewrites `<mac address>` of every interface. Returns how many changed.
    pub fn set_interface_macs(&mut self, mac: &str) -> Result<usize> {
        let devices = self.section_mut("devices")?;
        let mut changed = 0;
        for node in devices.children.iter_mut() {
            if let Node::Element(iface) = node {
                if iface.name != "interface" {
                    continue;
                }
                if let Some(m) = iface.child_mut("mac") {
                    m.set_attribute("address", mac);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }
}

impl fmt::Display for DomainDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.prolog {
            write!(f, "{node}")?;
        }
        write!(f, "{}", self.root)?;
        for node in &self.epilog {
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

/// Substitutes `mac` into every `address` attribute whose value looks like
/// a hardware address, across the whole text. Non-MAC attributes that match
/// the shape are rewritten too.
pub fn replace_mac_addresses(xml: &str, mac: &str) -> String {
    ADDRESS_ATTR_REGEX
        .replace_all(xml, |caps: &Captures| {
            let quote = if caps.name("single").is_some() { '\'' } else { '"' };
            format!("address={quote}{mac}{quote}")
        })
        .into_owned()
}
