#![allow(dead_code)]
//! Test helpers: a minimal Compound File (v3) writer and property stream
//! builders

const ENDOFCHAIN: u32 = 0xfffffffe;
const FREESECT: u32 = 0xffffffff;
const FATSECT: u32 = 0xfffffffd;
const NOSTREAM: u32 = 0xffffffff;
const SECTOR: usize = 512;
const MINI_SECTOR: usize = 64;
const MINI_CUTOFF: usize = 4096;

pub enum Node {
    Storage(String, Vec<Node>),
    Stream(String, Vec<u8>),
}

pub fn storage(name: &str, children: Vec<Node>) -> Node {
    Node::Storage(name.to_string(), children)
}

pub fn stream(name: &str, data: Vec<u8>) -> Node {
    Node::Stream(name.to_string(), data)
}

struct DirEntry {
    name: String,
    objtype: u8,
    left: u32,
    right: u32,
    child: u32,
    start: u32,
    size: u64,
    data: Option<Vec<u8>>,
}

impl DirEntry {
    fn new(name: &str, objtype: u8, data: Option<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            objtype,
            left: NOSTREAM,
            right: NOSTREAM,
            child: NOSTREAM,
            start: ENDOFCHAIN,
            size: 0,
            data,
        }
    }

    fn encode(&self) -> [u8; 128] {
        let mut ret = [0u8; 128];
        let name: Vec<u16> = self.name.encode_utf16().chain([0]).collect();
        for (i, c) in name.iter().enumerate() {
            ret[i * 2..i * 2 + 2].copy_from_slice(&c.to_le_bytes());
        }
        ret[64..66].copy_from_slice(&((name.len() * 2) as u16).to_le_bytes());
        ret[66] = self.objtype;
        ret[67] = 1;
        ret[68..72].copy_from_slice(&self.left.to_le_bytes());
        ret[72..76].copy_from_slice(&self.right.to_le_bytes());
        ret[76..80].copy_from_slice(&self.child.to_le_bytes());
        ret[116..120].copy_from_slice(&self.start.to_le_bytes());
        ret[120..128].copy_from_slice(&self.size.to_le_bytes());
        ret
    }
}

// Children are linked as a chain of right siblings
fn flatten(entries: &mut Vec<DirEntry>, parent: usize, mut children: Vec<Node>) {
    children.sort_by(|a, b| node_name(a).cmp(node_name(b)));
    let mut prev: Option<usize> = None;
    for node in children {
        let id = entries.len();
        let grandchildren = match node {
            Node::Storage(name, c) => {
                entries.push(DirEntry::new(&name, 1, None));
                Some(c)
            }
            Node::Stream(name, data) => {
                let mut e = DirEntry::new(&name, 2, None);
                e.size = data.len() as u64;
                e.data = Some(data);
                entries.push(e);
                None
            }
        };
        match prev {
            Some(p) => entries[p].right = id as u32,
            None => entries[parent].child = id as u32,
        }
        prev = Some(id);
        if let Some(c) = grandchildren {
            flatten(entries, id, c);
        }
    }
}

fn node_name(node: &Node) -> &str {
    match node {
        Node::Storage(name, _) | Node::Stream(name, _) => name,
    }
}

fn sectors_for(len: usize, unit: usize) -> usize {
    len.div_ceil(unit)
}

fn chain(table: &mut [u32], start: usize, count: usize) {
    for i in 0..count {
        table[start + i] = if i + 1 == count {
            ENDOFCHAIN
        } else {
            (start + i + 1) as u32
        };
    }
}

/// Serializes a tree of storages and streams into a version 3 Compound File
///
/// Streams shorter than 4096 bytes are placed in the mini stream
pub fn build_cfb(children: Vec<Node>) -> Vec<u8> {
    let mut entries = vec![DirEntry::new("Root Entry", 5, None)];
    flatten(&mut entries, 0, children);

    // Mini stream
    let mut mini_stream = Vec::new();
    let mut minifat: Vec<u32> = Vec::new();
    for e in entries.iter_mut() {
        let Some(data) = e.data.as_ref() else {
            continue;
        };
        if data.is_empty() || data.len() >= MINI_CUTOFF {
            continue;
        }
        let start = minifat.len();
        let count = sectors_for(data.len(), MINI_SECTOR);
        minifat.resize(start + count, FREESECT);
        chain(&mut minifat, start, count);
        e.start = start as u32;
        mini_stream.extend_from_slice(data);
        mini_stream.resize((start + count) * MINI_SECTOR, 0);
    }

    let dir_sectors = sectors_for(entries.len() * 128, SECTOR);
    let minifat_sectors = sectors_for(minifat.len() * 4, SECTOR);
    let ministream_sectors = sectors_for(mini_stream.len(), SECTOR);
    let big_sectors: usize = entries
        .iter()
        .filter_map(|e| e.data.as_ref())
        .filter(|d| d.len() >= MINI_CUTOFF)
        .map(|d| sectors_for(d.len(), SECTOR))
        .sum();
    let others = dir_sectors + minifat_sectors + ministream_sectors + big_sectors;
    let mut fat_sectors = 1;
    while fat_sectors * (SECTOR / 4) < fat_sectors + others {
        fat_sectors += 1;
    }
    assert!(fat_sectors <= 109, "DIFAT sectors are not supported");

    let mut fat = vec![FREESECT; fat_sectors * (SECTOR / 4)];
    fat[0..fat_sectors].fill(FATSECT);
    let mut next = fat_sectors;
    let dir_start = next;
    chain(&mut fat, next, dir_sectors);
    next += dir_sectors;
    let minifat_start = next;
    chain(&mut fat, next, minifat_sectors);
    next += minifat_sectors;
    let ministream_start = next;
    chain(&mut fat, next, ministream_sectors);
    next += ministream_sectors;
    let mut big = Vec::new();
    for e in entries.iter_mut() {
        let Some(data) = e.data.as_ref() else {
            continue;
        };
        if data.len() < MINI_CUTOFF {
            continue;
        }
        let count = sectors_for(data.len(), SECTOR);
        chain(&mut fat, next, count);
        e.start = next as u32;
        big.push(data.clone());
        next += count;
    }
    if !mini_stream.is_empty() {
        entries[0].start = ministream_start as u32;
        entries[0].size = mini_stream.len() as u64;
    }

    let mut hdr = vec![0u8; SECTOR];
    hdr[0..8].copy_from_slice(&[0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1]);
    hdr[24..26].copy_from_slice(&0x3eu16.to_le_bytes());
    hdr[26..28].copy_from_slice(&3u16.to_le_bytes());
    hdr[28..30].copy_from_slice(&0xfffeu16.to_le_bytes());
    hdr[30..32].copy_from_slice(&9u16.to_le_bytes());
    hdr[32..34].copy_from_slice(&6u16.to_le_bytes());
    hdr[44..48].copy_from_slice(&(fat_sectors as u32).to_le_bytes());
    hdr[48..52].copy_from_slice(&(dir_start as u32).to_le_bytes());
    hdr[56..60].copy_from_slice(&(MINI_CUTOFF as u32).to_le_bytes());
    let minifat_first = if minifat_sectors > 0 {
        minifat_start as u32
    } else {
        ENDOFCHAIN
    };
    hdr[60..64].copy_from_slice(&minifat_first.to_le_bytes());
    hdr[64..68].copy_from_slice(&(minifat_sectors as u32).to_le_bytes());
    hdr[68..72].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
    for (i, slot) in hdr[76..SECTOR].chunks_exact_mut(4).enumerate() {
        let v = if i < fat_sectors { i as u32 } else { FREESECT };
        slot.copy_from_slice(&v.to_le_bytes());
    }

    let mut out = hdr;
    out.extend(fat.iter().flat_map(|v| v.to_le_bytes()));
    let mut dir: Vec<u8> = entries.iter().flat_map(|e| e.encode()).collect();
    while dir.len() < dir_sectors * SECTOR {
        dir.extend_from_slice(&unused_entry());
    }
    out.extend(dir);
    let mut mf: Vec<u8> = minifat.iter().flat_map(|v| v.to_le_bytes()).collect();
    mf.resize(minifat_sectors * SECTOR, 0xff);
    out.extend(mf);
    mini_stream.resize(ministream_sectors * SECTOR, 0);
    out.extend(mini_stream);
    for mut data in big {
        let padded = sectors_for(data.len(), SECTOR) * SECTOR;
        data.resize(padded, 0);
        out.extend(data);
    }
    out
}

fn unused_entry() -> [u8; 128] {
    let mut ret = [0u8; 128];
    ret[68..80].fill(0xff);
    ret
}

/// Builds a 16 bytes property entry
pub fn entry(ptype: u16, tag: u16, payload: [u8; 8]) -> [u8; 16] {
    let mut ret = [0u8; 16];
    ret[0..2].copy_from_slice(&ptype.to_le_bytes());
    ret[2..4].copy_from_slice(&tag.to_le_bytes());
    ret[8..16].copy_from_slice(&payload);
    ret
}

/// Builds an entry of type 0x0003
pub fn int32(tag: u16, v: u32) -> [u8; 16] {
    let mut payload = [0u8; 8];
    payload[0..4].copy_from_slice(&v.to_le_bytes());
    entry(0x0003, tag, payload)
}

/// Builds a property stream with a zeroed header of `hdr` bytes
pub fn props(hdr: usize, entries: &[[u8; 16]]) -> Vec<u8> {
    let mut ret = vec![0u8; hdr];
    entries.iter().for_each(|e| ret.extend_from_slice(e));
    ret
}

/// UTF-16LE with a terminator
pub fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain([0])
        .flat_map(|c| c.to_le_bytes())
        .collect()
}

/// The name of the stream holding a property value
pub fn substg(tag: u16, ptype: u16) -> String {
    format!("__substg1.0_{tag:04X}{ptype:04X}")
}
