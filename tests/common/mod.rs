//! Writes small but structurally faithful `.arh`/`.ard` pairs for tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use arhpak::crypto;
use arhpak::header::{HeaderInfo, HEADER_SIZE, NODE_RECORD_SIZE};
use arhpak::payload::PREFIX_SIZE;
use arhpak::table::{TYPE_REPLACEABLE, TYPE_STORED};
use byteorder::{LittleEndian, WriteBytesExt};

pub const DEFAULT_KEY: u32 = 0x5EED_1234;

#[derive(Clone)]
struct PendingEntry {
    name:      String,
    data:      Vec<u8>,
    type_tag:  i32,
    truncated: bool,
}

#[derive(Clone)]
pub struct ArchiveBuilder {
    entries: Vec<PendingEntry>,
    key:     u32,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self { entries: Vec::new(), key: DEFAULT_KEY }
    }

    pub fn key(mut self, key: u32) -> Self {
        self.key = key;
        self
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.push(name, data, TYPE_STORED, false)
    }

    pub fn compressed(self, name: &str, data: &[u8]) -> Self {
        self.push(name, data, TYPE_REPLACEABLE, false)
    }

    pub fn with_type(self, name: &str, data: &[u8], type_tag: i32) -> Self {
        self.push(name, data, type_tag, false)
    }

    /// A compressed entry whose recorded stream length is cut in half.
    pub fn truncated(self, name: &str, data: &[u8]) -> Self {
        self.push(name, data, TYPE_REPLACEABLE, true)
    }

    fn push(mut self, name: &str, data: &[u8], type_tag: i32, truncated: bool) -> Self {
        self.entries.push(PendingEntry { name: name.to_owned(), data: data.to_vec(), type_tag, truncated });
        self
    }

    /// Encrypted header image and data file image.
    pub fn build(&self) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::new();
        let mut records = Vec::new();
        for (id, pending) in self.entries.iter().enumerate() {
            let offset = data.len() as i64;
            let (csize, usize_) = if pending.type_tag == TYPE_STORED {
                data.extend_from_slice(&pending.data);
                (pending.data.len(), pending.data.len())
            } else {
                let packed = zstd::bulk::compress(&pending.data, 3).unwrap();
                let recorded = if pending.truncated { packed.len() / 2 } else { packed.len() };
                data.extend_from_slice(&[0xCC; 8]);
                data.write_u32::<LittleEndian>(pending.data.len() as u32).unwrap();
                data.write_u32::<LittleEndian>(recorded as u32).unwrap();
                data.resize(offset as usize + PREFIX_SIZE as usize, 0);
                data.extend_from_slice(&packed);
                (recorded, pending.data.len())
            };
            records.push((offset, csize as i32, usize_ as i32, pending.type_tag, id as i32));
        }

        let names: Vec<(Vec<u8>, i32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(id, s)| (s.name.to_ascii_lowercase().into_bytes(), id as i32))
            .collect();
        let trie = DoubleArray::build(names);

        let mut strings = trie.strings;
        while strings.len() % 4 != 0 {
            strings.push(0);
        }

        let string_table_offset = HEADER_SIZE as u32;
        let node_table_offset = string_table_offset + strings.len() as u32;
        let node_table_length = (trie.nodes.len() * NODE_RECORD_SIZE) as u32;
        let info = HeaderInfo {
            magic:               u32::from_le_bytes(*b"arh1"),
            field4:              0,
            node_count:          trie.nodes.len() as u32,
            string_table_offset,
            string_table_length: strings.len() as u32,
            node_table_offset,
            node_table_length,
            file_table_offset:   node_table_offset + node_table_length,
            file_count:          records.len() as u32,
            key:                 self.key,
        };

        let mut header = Vec::new();
        info.write(&mut header).unwrap();
        header.extend_from_slice(&strings);
        for (next, prev) in &trie.nodes {
            header.write_i32::<LittleEndian>(*next).unwrap();
            header.write_i32::<LittleEndian>(*prev).unwrap();
        }
        for (offset, csize, usize_, ty, id) in records {
            header.write_i64::<LittleEndian>(offset).unwrap();
            header.write_i32::<LittleEndian>(csize).unwrap();
            header.write_i32::<LittleEndian>(usize_).unwrap();
            header.write_i32::<LittleEndian>(ty).unwrap();
            header.write_i32::<LittleEndian>(id).unwrap();
        }
        crypto::encrypt_header(&mut header, &info.protected_words(), self.key).unwrap();

        (header, data)
    }

    /// Write `test.arh` / `test.ard` into `dir`.
    pub fn write_to(&self, dir: &Path) -> (PathBuf, PathBuf) {
        let (header, data) = self.build();
        let arh = dir.join("test.arh");
        let ard = dir.join("test.ard");
        std::fs::write(&arh, header).unwrap();
        std::fs::write(&ard, data).unwrap();
        (arh, ard)
    }
}

/// Double-array construction: each subtree holding a single name collapses
/// into a terminal node carrying the rest of the name in the string table.
struct DoubleArray {
    nodes:    Vec<(i32, i32)>,
    occupied: Vec<bool>,
    strings:  Vec<u8>,
}

impl DoubleArray {
    fn build(names: Vec<(Vec<u8>, i32)>) -> Self {
        let mut da = DoubleArray {
            nodes:    vec![(0, -1)],
            occupied: vec![true],
            // Offset 0 would read back as `next == 0`.
            strings:  vec![0],
        };
        da.place(0, names, true);
        da
    }

    fn ensure(&mut self, slot: usize) {
        if slot >= self.nodes.len() {
            self.nodes.resize(slot + 1, (0, -1));
            self.occupied.resize(slot + 1, false);
        }
    }

    fn is_free(&self, slot: usize) -> bool {
        !self.occupied.get(slot).copied().unwrap_or(false)
    }

    fn place(&mut self, slot: usize, items: Vec<(Vec<u8>, i32)>, is_root: bool) {
        if !is_root && items.len() == 1 {
            let (rest, id) = &items[0];
            let offset = self.strings.len() as i32;
            self.strings.extend_from_slice(rest);
            self.strings.push(0);
            self.strings.extend_from_slice(&id.to_le_bytes());
            self.nodes[slot].0 = -offset;
            return;
        }

        let mut groups: BTreeMap<u8, Vec<(Vec<u8>, i32)>> = BTreeMap::new();
        for (name, id) in items {
            match name.split_first() {
                Some((&c, rest)) => groups.entry(c).or_default().push((rest.to_vec(), id)),
                None             => groups.entry(0).or_default().push((Vec::new(), id)),
            }
        }

        let base = if is_root { 0 } else { self.find_base(groups.keys().copied()) };
        self.nodes[slot].0 = base as i32;
        for &label in groups.keys() {
            let child = base ^ label as usize;
            self.ensure(child);
            self.occupied[child] = true;
            self.nodes[child] = (0, slot as i32);
        }
        for (label, group) in groups {
            self.place(base ^ label as usize, group, false);
        }
    }

    fn find_base(&self, labels: impl Iterator<Item = u8> + Clone) -> usize {
        (1..)
            .find(|&b: &usize| labels.clone().all(|l| self.is_free(b ^ l as usize)))
            .unwrap()
    }
}
