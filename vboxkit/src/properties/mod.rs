//! Point lookups over flat text dumps produced by the management tool.
//!
//! Two dump formats are understood:
//!
//! - **Machine-readable**: `KEY="VALUE"` (or human `Key:   value`) lines, one
//!   fact per line. Keys match whole and case-insensitively, so `VMState`
//!   never answers for `VMStateChangeTime`; the first occurrence in document
//!   order wins.
//! - **Guest property**: `Value: <v>` or `Name: <n>, value: <v>, timestamp: <t>,
//!   flags: <f>`. The tool prints the literal `No value set!` for a property
//!   that exists but was never assigned.
//!
//! Nothing here caches: a dump describes one moment and callers re-query.

mod listing;

pub use listing::{
    CurrentSnapshotInfo, MachineEntry, parse_bridged_interfaces, parse_current_snapshot,
    parse_group_list, parse_machine_list,
};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Literal the tool prints for a guest property without a value.
///
/// Compared verbatim. A localized or reworded tool build would make unset
/// properties look like values, so keep this next to the only comparison.
pub const NO_VALUE_SENTINEL: &str = "No value set!";

/// Look up `key` in a `KEY=VALUE` / `KEY: VALUE` dump.
///
/// Returns the value of the first line whose key equals `key` ignoring case,
/// with surrounding quotes stripped and whitespace trimmed.
pub fn lookup(dump: &str, key: &str) -> Option<String> {
    let wanted = normalize_key(key);
    dump.lines().find_map(|line| {
        let (k, v) = split_line(line)?;
        (normalize_key(k) == wanted).then(|| clean_value(v))
    })
}

/// All keys of one dump, normalized, first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyTable {
    entries: HashMap<String, String>,
}

impl PropertyTable {
    pub fn parse(dump: &str) -> Self {
        let mut entries = HashMap::new();
        for (k, v) in dump.lines().filter_map(split_line) {
            entries
                .entry(normalize_key(k))
                .or_insert_with(|| clean_value(v));
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&normalize_key(key)).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Interpret the output of `guestproperty get`.
///
/// `None` means the property has no value (empty output, the sentinel, or no
/// `:` at all). `Some("")` means it was queried and is empty.
pub fn parse_guest_property(output: &str) -> Option<String> {
    let output = output.trim();
    if output.is_empty() || output == NO_VALUE_SENTINEL {
        return None;
    }
    let (_, rest) = output.split_once(':')?;
    Some(strip_trailing_fields(rest).trim().to_string())
}

/// One entry of `guestproperty enumerate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestProperty {
    pub name: String,
    pub value: String,
    pub timestamp: Option<u64>,
    pub flags: String,
}

/// Parse `Name: <n>, value: <v>, timestamp: <t>, flags: <f>` lines.
///
/// Lines that do not start with `Name:` are skipped.
pub fn parse_guest_property_list(output: &str) -> Vec<GuestProperty> {
    output
        .lines()
        .filter_map(|line| {
            let rest = strip_prefix_ci(line.trim(), "name:")?;
            let (name, rest) = split_field(rest, "value:")?;
            let (value, rest) = split_field(rest, "timestamp:").unwrap_or((rest, ""));
            let (timestamp, flags) = split_field(rest, "flags:").unwrap_or((rest, ""));
            Some(GuestProperty {
                name: name.to_string(),
                value: value.to_string(),
                timestamp: timestamp.parse().ok(),
                flags: flags.to_string(),
            })
        })
        .collect()
}

fn split_line(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(['=', ':'])?;
    let key = line[..idx].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, &line[idx + 1..]))
}

fn normalize_key(key: &str) -> String {
    key.trim().trim_matches(['"', '\'']).to_lowercase()
}

fn clean_value(value: &str) -> String {
    value.trim().trim_matches(['"', '\'']).trim().to_string()
}

/// Cut `, timestamp: ...` / `, flags: ...` trailers off a property value.
fn strip_trailing_fields(value: &str) -> &str {
    let lower = value.to_ascii_lowercase();
    [", timestamp:", ", flags:"]
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min()
        .map_or(value, |idx| &value[..idx])
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| s[prefix.len()..].trim_start())
}

/// Split `"<field>, <marker> <rest>"` into `(field, rest)`.
fn split_field<'a>(s: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    let needle = format!(", {}", marker);
    let idx = s.to_ascii_lowercase().find(&needle)?;
    Some((s[..idx].trim(), s[idx + needle.len()..].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOWVMINFO: &str = r#"name="ubuntu-22"
groups="/qa"
ostype="Ubuntu (64-bit)"
UUID="4b0a2c7e-9a0f-4a55-8f0a-1d2e3f4a5b6c"
CfgFile="/home/qa/VirtualBox VMs/ubuntu-22/ubuntu-22.vbox"
VMState="running"
VMStateChangeTime="2024-05-01T10:00:00.000000000"
"SATA-0-0"="/disks/ubuntu.vdi"
"#;

    #[test]
    fn test_lookup_any_case_strips_quotes() {
        let dump = "VMState=\"running\"\nName=\"x\"";
        assert_eq!(lookup(dump, "vmstate").as_deref(), Some("running"));
        assert_eq!(lookup(dump, "VMSTATE").as_deref(), Some("running"));
        assert_eq!(lookup(dump, "name").as_deref(), Some("x"));
        assert_eq!(lookup(dump, "missing"), None);
    }

    #[test]
    fn test_lookup_does_not_confuse_longer_keys() {
        assert_eq!(lookup(SHOWVMINFO, "VMState").as_deref(), Some("running"));
        assert_eq!(
            lookup(SHOWVMINFO, "vmstatechangetime").as_deref(),
            Some("2024-05-01T10:00:00.000000000")
        );
        // Keys must match whole; a bare prefix finds nothing
        assert_eq!(lookup(SHOWVMINFO, "vmstatec"), None);
        assert_eq!(lookup(SHOWVMINFO, "vmsta"), None);
    }

    #[test]
    fn test_lookup_value_with_colons_and_spaces() {
        assert_eq!(
            lookup(SHOWVMINFO, "CfgFile").as_deref(),
            Some("/home/qa/VirtualBox VMs/ubuntu-22/ubuntu-22.vbox")
        );
        assert_eq!(
            lookup(SHOWVMINFO, "sata-0-0").as_deref(),
            Some("/disks/ubuntu.vdi")
        );
    }

    #[test]
    fn test_lookup_first_occurrence_wins() {
        let dump = "Name=\"first\"\nname=\"second\"";
        assert_eq!(lookup(dump, "name").as_deref(), Some("first"));
        assert_eq!(PropertyTable::parse(dump).get("NAME"), Some("first"));
    }

    #[test]
    fn test_lookup_human_readable_format() {
        let dump = "Name:            ubuntu-22\nState:           powered off (since 2024-05-01)";
        assert_eq!(lookup(dump, "state").as_deref(), Some("powered off (since 2024-05-01)"));
    }

    #[test]
    fn test_property_table() {
        let table = PropertyTable::parse(SHOWVMINFO);
        assert_eq!(table.get("groups"), Some("/qa"));
        assert!(table.contains("UUID"));
        assert!(!table.contains("nope"));
        assert_eq!(table.len(), 8);
    }

    #[test]
    fn test_guest_property_value() {
        assert_eq!(
            parse_guest_property("Value: Alice, Timestamp: 123").as_deref(),
            Some("Alice")
        );
        assert_eq!(
            parse_guest_property("Value: 192.168.56.101\n").as_deref(),
            Some("192.168.56.101")
        );
    }

    #[test]
    fn test_guest_property_sentinel_is_absent() {
        assert_eq!(parse_guest_property("No value set!"), None);
        assert_eq!(parse_guest_property("No value set!\n"), None);
        assert_eq!(parse_guest_property(""), None);
        assert_eq!(parse_guest_property("garbage"), None);
    }

    #[test]
    fn test_guest_property_empty_is_not_absent() {
        assert_eq!(parse_guest_property("Value: ").as_deref(), Some(""));
    }

    #[test]
    fn test_guest_property_list() {
        let out = "Name: /VirtualBox/GuestInfo/OS/Product, value: Linux, timestamp: 1714557600000000000, flags: <NULL>\n\
                   Name: /VirtualBox/GuestInfo/Net/0/V4/IP, value: 10.0.2.15, timestamp: 1714557601000000000, flags: \n\
                   unrelated line";
        let props = parse_guest_property_list(out);
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].name, "/VirtualBox/GuestInfo/OS/Product");
        assert_eq!(props[0].value, "Linux");
        assert_eq!(props[0].timestamp, Some(1714557600000000000));
        assert_eq!(props[0].flags, "<NULL>");
        assert_eq!(props[1].value, "10.0.2.15");
        assert_eq!(props[1].flags, "");
    }
}
