//! Turns the plain-text reports printed by `virsh` into typed records.
//!
//! No parser here fails: malformed input produces fewer or emptier records,
//! which is how callers notice that a remote command went wrong.

use std::collections::HashMap;

/// `virsh dominfo` report, keyed by the text before the first `": "`.
pub type VmInfoRecord = HashMap<String, String>;

/// One row of `virsh domiflist`. Missing trailing columns stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInterfaceRecord {
    pub interface: String,
    pub kind: Option<String>,
    pub source: Option<String>,
    pub model: Option<String>,
    pub mac: Option<String>,
}

fn split_lines(output: &str) -> impl Iterator<Item = &str> {
    output.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

/// Non-empty lines in order, as printed by `virsh list --all --name`.
pub fn parse_lines(output: &str) -> Vec<String> {
    split_lines(output)
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

/// `Key: value` report. Later duplicates of a key overwrite earlier ones.
pub fn parse_key_values(output: &str) -> VmInfoRecord {
    let mut record = VmInfoRecord::new();
    for line in split_lines(output).filter(|l| !l.trim().is_empty()) {
        let (key, value) = line.split_once(": ").unwrap_or((line, ""));
        record.insert(key.trim().to_string(), value.trim().to_string());
    }
    record
}

/// Whitespace-separated table behind a header and a separator row.
pub fn parse_interface_table(output: &str) -> Vec<NetworkInterfaceRecord> {
    split_lines(output)
        .skip(2)
        .filter_map(|line| {
            let mut fields = line.split_whitespace().map(|f| f.to_string());
            let interface = fields.next()?;
            Some(NetworkInterfaceRecord {
                interface,
                kind: fields.next(),
                source: fields.next(),
                model: fields.next(),
                mac: fields.next(),
            })
        })
        .collect()
}
