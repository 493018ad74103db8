//! Parsers for list-style tool output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::lookup;

/// One registered machine from `list vms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineEntry {
    pub name: String,
    /// Unique id without braces.
    pub uuid: String,
}

/// Parse `"<name>" {<uuid>}` lines. Names may contain spaces.
pub fn parse_machine_list(output: &str) -> Vec<MachineEntry> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let brace = line.rfind('{')?;
            let name = line[..brace].trim().trim_matches('"');
            let uuid = line[brace..].trim().trim_matches(['{', '}']);
            (!name.is_empty() && !uuid.is_empty()).then(|| MachineEntry {
                name: name.to_string(),
                uuid: uuid.to_string(),
            })
        })
        .collect()
}

/// Parse `list groups`: one quoted group path per line, reduced to its last segment.
pub fn parse_group_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim().trim_matches('"'))
        .filter(|path| !path.is_empty())
        .map(|path| {
            path.trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or(path)
                .to_string()
        })
        .collect()
}

/// Parse `list bridgedifs`: blank-line separated blocks of `Key: Value` lines.
pub fn parse_bridged_interfaces(output: &str) -> Vec<BTreeMap<String, String>> {
    let mut adapters = Vec::new();
    let mut adapter = BTreeMap::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            if !adapter.is_empty() {
                adapters.push(std::mem::take(&mut adapter));
            }
            continue;
        }
        let (key, value) = line.split_once(':').unwrap_or((line, ""));
        adapter.insert(key.trim().to_string(), value.trim().to_string());
    }
    if !adapter.is_empty() {
        adapters.push(adapter);
    }
    adapters
}

/// Current snapshot as reported by `snapshot <vm> list --machinereadable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSnapshotInfo {
    pub name: String,
    pub uuid: String,
    /// Key of the snapshot's name line, e.g. `SnapshotName-1`.
    pub node: String,
    pub description: Option<String>,
}

/// Extract the current snapshot; `None` when the machine has none.
pub fn parse_current_snapshot(output: &str) -> Option<CurrentSnapshotInfo> {
    let name = lookup(output, "CurrentSnapshotName")?;
    let uuid = lookup(output, "CurrentSnapshotUUID").unwrap_or_default();
    let node = lookup(output, "CurrentSnapshotNode").unwrap_or_default();
    let description = if node.is_empty() {
        None
    } else {
        lookup(output, &node.replace("Name", "Description"))
    };
    Some(CurrentSnapshotInfo {
        name,
        uuid,
        node,
        description,
    })
}
