//! Container abstraction
//!
//! The property decoder never deals with the storage format directly: it walks
//! a tree of named entries through the [`Container`] trait. The Compound File
//! implementation lives in [`ole`](crate::ole); [`MemContainer`] is a simple
//! in-memory tree
use std::fmt;
use std::io::{self, Read};

/// Name of the stream holding the property entries of a node
pub const PROPERTIES_STREAM: &str = "__properties_version1.0";
/// Name prefix of attachment storages
pub const ATTACHMENT_PREFIX: &str = "__attach_version1.0_#";
/// Name prefix of recipient storages
pub const RECIPIENT_PREFIX: &str = "__recip_version1.0_#";

/// Returns the name of the stream (or storage) holding the value of a property
///
/// The format is `__substg1.0_` followed by the tag and the type, each as 4
/// uppercase hex digits
pub fn substg_name(tag: u16, ptype: u16) -> String {
    format!("__substg1.0_{tag:04X}{ptype:04X}")
}

/// A node in a [`Container`]
pub trait ContainerEntry: Clone + fmt::Debug {
    /// The entry name
    fn name(&self) -> &str;
    /// Whether the entry is a storage (directory) rather than a stream
    fn is_storage(&self) -> bool;
}

/// A read-only tree of storages and streams
pub trait Container {
    /// The entry type
    type Entry: ContainerEntry;
    /// The reader returned by [`open`](Self::open)
    type Stream<'a>: Read
    where
        Self: 'a;

    /// Returns the root storage
    fn root(&self) -> Self::Entry;

    /// Lists the direct children of a storage
    ///
    /// Streams have no children
    fn children(&self, parent: &Self::Entry) -> Result<Vec<Self::Entry>, io::Error>;

    /// Opens a stream for reading
    fn open(&self, entry: &Self::Entry) -> Result<Self::Stream<'_>, io::Error>;

    /// Looks up a direct child by name (case insensitive)
    ///
    /// Returns `Ok(None)` if no such child exists
    fn lookup(&self, parent: &Self::Entry, name: &str) -> Result<Option<Self::Entry>, io::Error> {
        Ok(find_child(self.children(parent)?, name))
    }

    /// Reads the whole content of a stream
    ///
    /// The stream is only kept open for the duration of the call
    fn read(&self, entry: &Self::Entry) -> Result<Vec<u8>, io::Error> {
        let mut stream = self.open(entry)?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Returns the entry named `name` (case insensitive), if any
pub fn find_child<E: ContainerEntry, I: IntoIterator<Item = E>>(entries: I, name: &str) -> Option<E> {
    entries
        .into_iter()
        .find(|e| e.name().eq_ignore_ascii_case(name))
}

#[derive(Debug)]
struct MemNode {
    name: String,
    data: Option<Vec<u8>>,
    children: Vec<usize>,
}

/// An in-memory [`Container`]
///
/// # Examples
/// ```
/// use msgdecode_rs::container::{Container, ContainerEntry, MemContainer};
///
/// let mut mc = MemContainer::new();
/// let root = mc.root();
/// let attach = mc.add_storage(&root, "__attach_version1.0_#00000000");
/// mc.add_stream(&attach, "__properties_version1.0", vec![0u8; 8]);
/// let found = mc.lookup(&root, "__ATTACH_VERSION1.0_#00000000").unwrap().unwrap();
/// assert!(found.is_storage());
/// ```
#[derive(Debug)]
pub struct MemContainer {
    nodes: Vec<MemNode>,
}

/// An entry of a [`MemContainer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemEntry {
    id: usize,
    name: String,
    storage: bool,
}

impl ContainerEntry for MemEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_storage(&self) -> bool {
        self.storage
    }
}

impl Default for MemContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemContainer {
    /// Creates a container with an empty root storage
    pub fn new() -> Self {
        Self {
            nodes: vec![MemNode {
                name: "Root Entry".to_string(),
                data: None,
                children: Vec::new(),
            }],
        }
    }

    fn add(&mut self, parent: &MemEntry, name: &str, data: Option<Vec<u8>>) -> MemEntry {
        assert!(parent.storage, "Cannot add children to a stream");
        let id = self.nodes.len();
        let storage = data.is_none();
        self.nodes.push(MemNode {
            name: name.to_string(),
            data,
            children: Vec::new(),
        });
        self.nodes[parent.id].children.push(id);
        MemEntry {
            id,
            name: name.to_string(),
            storage,
        }
    }

    /// Adds a storage under `parent`
    pub fn add_storage(&mut self, parent: &MemEntry, name: &str) -> MemEntry {
        self.add(parent, name, None)
    }

    /// Adds a stream under `parent`
    pub fn add_stream(&mut self, parent: &MemEntry, name: &str, data: Vec<u8>) -> MemEntry {
        self.add(parent, name, Some(data))
    }

    fn entry(&self, id: usize) -> MemEntry {
        let node = &self.nodes[id];
        MemEntry {
            id,
            name: node.name.clone(),
            storage: node.data.is_none(),
        }
    }
}

impl Container for MemContainer {
    type Entry = MemEntry;
    type Stream<'a>
        = &'a [u8]
    where
        Self: 'a;

    fn root(&self) -> MemEntry {
        self.entry(0)
    }

    fn children(&self, parent: &MemEntry) -> Result<Vec<MemEntry>, io::Error> {
        let node = self.nodes.get(parent.id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("No entry {}", parent.id))
        })?;
        Ok(node.children.iter().map(|&id| self.entry(id)).collect())
    }

    fn open(&self, entry: &MemEntry) -> Result<Self::Stream<'_>, io::Error> {
        self.nodes
            .get(entry.id)
            .and_then(|node| node.data.as_deref())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Entry \"{}\" is not a stream", entry.name),
                )
            })
    }
}
