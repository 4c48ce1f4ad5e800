//! Double-array trie mapping filenames to file identifiers.
//!
//! Each slot holds a `(next, prev)` pair:
//!
//! * `next >= 0`: internal node. `next` is the transition base; the child
//!   reached by byte `c` lives at slot `next ^ c` and must have `prev` equal
//!   to this node's slot.
//! * `next < 0`: terminal node. `-next` is an offset into the string table
//!   where the rest of the filename is stored NUL-terminated, followed by the
//!   little-endian `i32` file identifier.
//!
//! Slot 0 is the root and is the only node with `next == 0`; backward walks
//! stop there. A name that is a strict prefix of another name ends on a
//! NUL-labelled edge (`next ^ 0`), which contributes nothing to the name.
//!
//! Lookups fold ASCII letters to lower case byte by byte. The stored suffix
//! is compared against the unconsumed tail of the query, so reaching a
//! terminal node is not taken as proof of a match on its own.

use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use crate::error::{ArchiveError, Result};
use crate::header::HeaderInfo;
use crate::table::FileEntry;

/// Slot index of the root node.
pub const ROOT: usize = 0;

/// Edge label used when a name ends on an internal node.
pub const TERMINATOR: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieNode {
    pub next: i32,
    pub prev: i32,
}

impl TrieNode {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.next < 0
    }
}

#[derive(Debug, Clone)]
pub struct TrieIndex {
    nodes:   Vec<TrieNode>,
    strings: Vec<u8>,
}

impl TrieIndex {
    pub fn new(nodes: Vec<TrieNode>, strings: Vec<u8>) -> Self {
        Self { nodes, strings }
    }

    /// Read the node and string tables out of a decrypted header image.
    pub fn from_header(header: &[u8], info: &HeaderInfo) -> Result<Self> {
        let strings_range = info.string_table_range();
        let nodes_range = info.node_table_range();
        if strings_range.end > header.len() || nodes_range.end > header.len() {
            return Err(ArchiveError::corrupt_header("trie tables run past header end"));
        }

        let mut cursor = Cursor::new(&header[nodes_range]);
        let mut nodes = Vec::with_capacity(info.node_count as usize);
        for _ in 0..info.node_count {
            nodes.push(TrieNode {
                next: cursor.read_i32::<LittleEndian>()?,
                prev: cursor.read_i32::<LittleEndian>()?,
            });
        }
        Ok(Self::new(nodes, header[strings_range].to_vec()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, state: usize) -> Option<TrieNode> {
        self.nodes.get(state).copied()
    }

    /// Follow the edge labelled `label` out of `state`.
    ///
    /// Returns `None` when `state` is terminal, the target slot is out of
    /// range, or the target's `prev` does not point back at `state`.
    pub fn transition(&self, state: usize, label: u8) -> Option<usize> {
        let node = self.node(state)?;
        if node.is_terminal() {
            return None;
        }
        let target = (node.next as u32 ^ u32::from(label)) as usize;
        let child = self.node(target)?;
        (child.prev >= 0 && child.prev as usize == state).then_some(target)
    }

    /// The parent of `state` and the label of the edge leading into it.
    ///
    /// `Ok(None)` at the root.
    pub fn parent_edge(&self, state: usize) -> Result<Option<(usize, u8)>> {
        let node = self.node(state).ok_or_else(|| bad_slot(state))?;
        if node.next == 0 {
            return Ok(None);
        }
        let parent = usize::try_from(node.prev)
            .map_err(|_| ArchiveError::corrupt_header(format!("node {state} has no parent")))?;
        let parent_node = self.node(parent).ok_or_else(|| bad_slot(parent))?;
        if parent_node.is_terminal() {
            return Err(ArchiveError::corrupt_header(format!(
                "node {state} hangs off terminal node {parent}"
            )));
        }
        let label = state as u32 ^ parent_node.next as u32;
        let label = u8::try_from(label).map_err(|_| {
            ArchiveError::corrupt_header(format!("edge {parent}->{state} has label {label:#x}"))
        })?;
        Ok(Some((parent, label)))
    }

    /// Literal suffix and file identifier stored for a terminal node.
    pub fn suffix(&self, state: usize) -> Result<(&[u8], i32)> {
        let node = self.node(state).ok_or_else(|| bad_slot(state))?;
        if !node.is_terminal() {
            return Err(ArchiveError::corrupt_header(format!("node {state} is not terminal")));
        }
        let start = (-(i64::from(node.next))) as usize;
        let tail = self.strings.get(start..).ok_or_else(|| {
            ArchiveError::corrupt_header(format!("suffix offset {start} outside string table"))
        })?;
        let len = tail.iter().position(|&b| b == 0).ok_or_else(|| {
            ArchiveError::corrupt_header(format!("suffix at {start} is not NUL-terminated"))
        })?;
        let id_bytes = tail.get(len + 1..len + 5).ok_or_else(|| {
            ArchiveError::corrupt_header(format!("file id after suffix at {start} is truncated"))
        })?;
        Ok((&tail[..len], LittleEndian::read_i32(id_bytes)))
    }

    /// Resolve `name` to its file identifier in time proportional to its length.
    pub fn lookup(&self, name: &str) -> Option<i32> {
        let query: Vec<u8> = name.bytes().map(|b| b.to_ascii_lowercase()).collect();
        let mut state = ROOT;
        let mut consumed = 0;

        for &c in &query {
            if self.node(state)?.is_terminal() {
                break;
            }
            state = self.transition(state, c)?;
            consumed += 1;
        }
        if !self.node(state)?.is_terminal() {
            state = self.transition(state, TERMINATOR)?;
            if !self.node(state)?.is_terminal() {
                return None;
            }
        }

        let (suffix, id) = self.suffix(state).ok()?;
        suffix.eq_ignore_ascii_case(&query[consumed..]).then_some(id)
    }

    /// Rebuild the full filename ending at terminal node `terminal`.
    pub fn filename_of(&self, terminal: usize) -> Result<String> {
        let (suffix, _) = self.suffix(terminal)?;
        let mut prefix = Vec::new();
        let mut state = terminal;
        let mut steps = 0;

        while let Some((parent, label)) = self.parent_edge(state)? {
            if label != TERMINATOR {
                prefix.push(label);
            }
            state = parent;
            steps += 1;
            if steps > self.nodes.len() {
                return Err(ArchiveError::corrupt_header(format!(
                    "parent chain from node {terminal} does not reach the root"
                )));
            }
        }

        prefix.reverse();
        prefix.extend_from_slice(suffix);
        Ok(String::from_utf8_lossy(&prefix).into_owned())
    }

    /// Every slot that is a reachable terminal (`next < 0`, `prev >= 0`).
    pub fn terminals(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_terminal() && n.prev >= 0)
            .map(|(i, _)| i)
    }

    /// Fill `FileEntry::filename` for every entry referenced by a terminal.
    ///
    /// A terminal whose name cannot be rebuilt (for instance an edge label
    /// wider than a byte) leaves its entry unnamed and is passed to
    /// `unnamed`; the entry stays readable through the file table. Returns
    /// the number of names resolved.
    pub fn resolve_names<F>(&self, entries: &mut [FileEntry], mut unnamed: F) -> Result<usize>
    where
        F: FnMut(usize, &FileEntry, &ArchiveError),
    {
        let mut resolved = 0;
        for terminal in self.terminals() {
            let (_, id) = self.suffix(terminal)?;
            let count = entries.len();
            let entry = usize::try_from(id)
                .ok()
                .and_then(|i| entries.get_mut(i))
                .ok_or_else(|| {
                    ArchiveError::corrupt_header(format!(
                        "node {terminal} names file {id}, table has {count}"
                    ))
                })?;
            match self.filename_of(terminal) {
                Ok(name) => {
                    entry.filename = Some(name);
                    resolved += 1;
                }
                Err(e) => unnamed(terminal, entry, &e),
            }
        }
        Ok(resolved)
    }
}

fn bad_slot(state: usize) -> ArchiveError {
    ArchiveError::corrupt_header(format!("node index {state} out of range"))
}
