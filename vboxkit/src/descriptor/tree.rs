//! Owned element tree for descriptor files.
//!
//! Tags are stored qualified as `{namespace-uri}Local` when the element lives
//! in a namespace. Lookups take bare local names and qualify them with the
//! namespace detected on the root element, so callers never deal with
//! namespaces.

use vboxkit_shared::errors::{VboxError, VboxResult};

use super::records::{AttachedMediaRecord, SnapshotRecord, strip_braces};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Qualified tag, `{uri}Local` or `Local`.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn local_name(&self) -> &str {
        match self.tag.rfind('}') {
            Some(idx) => &self.tag[idx + 1..],
            None => &self.tag,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// This element and everything below it, in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let name = node.tag_name();
        let tag = match name.namespace() {
            Some(ns) => format!("{{{}}}{}", ns, name.name()),
            None => name.name().to_string(),
        };
        Self {
            tag,
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            text: node
                .children()
                .filter(|c| c.is_text())
                .filter_map(|c| c.text())
                .collect(),
            children: node
                .children()
                .filter(|c| c.is_element())
                .map(Element::from_node)
                .collect(),
        }
    }
}

/// Pre-order iterator over an element subtree.
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Parsed descriptor file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorTree {
    root: Element,
    namespace: Option<String>,
}

impl DescriptorTree {
    pub fn parse(text: &str) -> VboxResult<Self> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| VboxError::Parse(format!("invalid descriptor XML: {}", e)))?;
        let root = doc.root_element();
        Ok(Self {
            namespace: root.tag_name().namespace().map(str::to_string),
            root: Element::from_node(root),
        })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Default namespace declared on the root element, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Qualify a bare tag name with the detected namespace.
    pub fn qualify(&self, local: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{}}}{}", ns, local),
            None => local.to_string(),
        }
    }

    /// First element named `local` in document order (root included).
    pub fn find(&self, local: &str) -> Option<&Element> {
        self.iter(local).next()
    }

    /// Every element named `local` in document order, regardless of nesting.
    pub fn iter<'a>(&'a self, local: &str) -> impl Iterator<Item = &'a Element> + 'a {
        let tag = self.qualify(local);
        self.root.descendants().filter(move |e| e.tag == tag)
    }

    /// All snapshots, flattened in document order.
    pub fn snapshots(&self) -> Vec<SnapshotRecord> {
        self.iter("Snapshot").map(|e| self.snapshot_record(e)).collect()
    }

    /// Snapshot named by the machine's `currentSnapshot` attribute.
    ///
    /// `None` when nothing is recorded or the id matches no snapshot.
    pub fn current_snapshot(&self) -> Option<SnapshotRecord> {
        let machine = self.find("Machine")?;
        let current = strip_braces(machine.attr("currentSnapshot")?);
        if current.is_empty() {
            return None;
        }
        self.iter("Snapshot")
            .find(|e| strip_braces(e.attr("uuid").unwrap_or_default()) == current)
            .map(|e| self.snapshot_record(e))
    }

    /// Media entries inside the first `section` element; empty when absent.
    pub fn media(&self, section: &str, entry: &str) -> Vec<AttachedMediaRecord> {
        let Some(section) = self.find(section) else {
            return Vec::new();
        };
        let tag = self.qualify(entry);
        section
            .descendants()
            .skip(1)
            .filter(|e| e.tag == tag)
            .map(|e| AttachedMediaRecord {
                uuid: strip_braces(e.attr("uuid").unwrap_or_default()).to_string(),
                location: e.attr("location").unwrap_or_default().to_string(),
            })
            .collect()
    }

    pub fn dvd_images(&self) -> Vec<AttachedMediaRecord> {
        self.media("DVDImages", "Image")
    }

    pub fn hard_disks(&self) -> Vec<AttachedMediaRecord> {
        self.media("HardDisks", "HardDisk")
    }

    fn snapshot_record(&self, e: &Element) -> SnapshotRecord {
        let description = match e.attr("description") {
            Some(d) => d.to_string(),
            None => e
                .children()
                .iter()
                .find(|c| c.tag == self.qualify("Description"))
                .map(|c| c.text().trim().to_string())
                .unwrap_or_default(),
        };
        SnapshotRecord {
            uuid: strip_braces(e.attr("uuid").unwrap_or_default()).to_string(),
            name: e.attr("name").unwrap_or_default().to_string(),
            created: e.attr("timeStamp").map(str::to_string),
            description,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"<?xml version="1.0"?>
<!-- managed by VirtualBox -->
<VirtualBox xmlns="http://www.virtualbox.org/" version="1.19-linux">
  <Machine uuid="{11111111-0000-0000-0000-000000000000}" name="ubuntu-22" currentSnapshot="{bbbbbbbb-0000-0000-0000-000000000000}">
    <MediaRegistry>
      <HardDisks>
        <HardDisk uuid="{dddddddd-0000-0000-0000-000000000000}" location="ubuntu-22.vdi" format="VDI">
          <HardDisk uuid="{eeeeeeee-0000-0000-0000-000000000000}" location="Snapshots/{eeeeeeee}.vdi" format="VDI"/>
        </HardDisk>
      </HardDisks>
      <DVDImages>
        <Image uuid="{c1c1c1c1-0000-0000-0000-000000000000}" location="/iso/ubuntu.iso"/>
        <Image uuid="{c2c2c2c2-0000-0000-0000-000000000000}" location="/iso/tools.iso"/>
      </DVDImages>
    </MediaRegistry>
    <Snapshot uuid="{aaaaaaaa-0000-0000-0000-000000000000}" name="base" timeStamp="2024-05-01T10:00:00Z">
      <Description>clean install</Description>
      <Snapshots>
        <Snapshot uuid="{bbbbbbbb-0000-0000-0000-000000000000}" name="updated" timeStamp="2024-05-02T10:00:00Z" description="after upgrade"/>
      </Snapshots>
    </Snapshot>
  </Machine>
</VirtualBox>
"#;

    #[test]
    fn test_namespace_detection() {
        let tree = DescriptorTree::parse(SAMPLE).unwrap();
        assert_eq!(tree.namespace(), Some("http://www.virtualbox.org/"));
        assert_eq!(tree.qualify("Machine"), "{http://www.virtualbox.org/}Machine");
        assert_eq!(tree.find("Machine").unwrap().local_name(), "Machine");
        assert_eq!(tree.find("Machine").unwrap().attr("name"), Some("ubuntu-22"));
    }

    #[test]
    fn test_without_namespace() {
        let tree = DescriptorTree::parse("<VirtualBox><Machine name=\"x\"/></VirtualBox>").unwrap();
        assert_eq!(tree.namespace(), None);
        assert_eq!(tree.find("Machine").unwrap().tag(), "Machine");
    }

    #[test]
    fn test_snapshots_flattened_in_document_order() {
        let tree = DescriptorTree::parse(SAMPLE).unwrap();
        let snaps = tree.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].name, "base");
        assert_eq!(snaps[0].uuid, "aaaaaaaa-0000-0000-0000-000000000000");
        assert_eq!(snaps[0].description, "clean install");
        assert_eq!(snaps[1].name, "updated");
        assert_eq!(snaps[1].description, "after upgrade");
        assert_eq!(snaps[1].created.as_deref(), Some("2024-05-02T10:00:00Z"));
    }

    #[test]
    fn test_current_snapshot() {
        let tree = DescriptorTree::parse(SAMPLE).unwrap();
        let current = tree.current_snapshot().unwrap();
        assert_eq!(current.name, "updated");
    }

    #[test]
    fn test_current_snapshot_dangling_id() {
        let xml = SAMPLE.replace(
            "currentSnapshot=\"{bbbbbbbb-0000-0000-0000-000000000000}\"",
            "currentSnapshot=\"{ffffffff-0000-0000-0000-000000000000}\"",
        );
        let tree = DescriptorTree::parse(&xml).unwrap();
        assert_eq!(tree.current_snapshot(), None);
    }

    #[test]
    fn test_no_current_snapshot() {
        let tree = DescriptorTree::parse("<VirtualBox><Machine name=\"x\"/></VirtualBox>").unwrap();
        assert_eq!(tree.current_snapshot(), None);
        assert!(tree.snapshots().is_empty());
    }

    #[test]
    fn test_media() {
        let tree = DescriptorTree::parse(SAMPLE).unwrap();
        let dvds = tree.dvd_images();
        assert_eq!(dvds.len(), 2);
        assert_eq!(dvds[0].uuid, "c1c1c1c1-0000-0000-0000-000000000000");
        assert_eq!(dvds[1].location, "/iso/tools.iso");

        let disks = tree.hard_disks();
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[1].location, "Snapshots/{eeeeeeee}.vdi");
    }

    #[test]
    fn test_missing_media_section_is_empty() {
        let tree = DescriptorTree::parse("<VirtualBox><Machine name=\"x\"/></VirtualBox>").unwrap();
        assert!(tree.dvd_images().is_empty());
    }

    #[test]
    fn test_malformed_is_parse_error() {
        let err = DescriptorTree::parse("<VirtualBox><Machine>").unwrap_err();
        assert!(matches!(err, VboxError::Parse(_)));
    }
}
