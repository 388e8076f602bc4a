//! Compound File reader
//!
//! A read-only parser for the *Compound File Binary Format*
//! ([MS-CFB](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-cfb/53989ce4-7b05-4f8d-829b-d08d6148375b)),
//! the container in which MSG files are stored
//!
//! The allocation tables and the directory are loaded when the file is opened;
//! stream data is only read on demand. Minor divergences from the format are
//! tolerated and reported as [anomalies](Ole::anomalies), only major issues
//! are fatal
use crate::container::{Container, ContainerEntry};
use std::cell::RefCell;
use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

const SIGNATURE: [u8; 8] = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
const DIFSECT: u32 = 0xfffffffc;
const FATSECT: u32 = 0xfffffffd;
const ENDOFCHAIN: u32 = 0xfffffffe;
const FREESECT: u32 = 0xffffffff;
const MAXREGSECT: u32 = 0xfffffffa;
const NOSTREAM: u32 = 0xffffffff;
const DIR_ENTRY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: u64 = 64;
const MINI_STREAM_CUTOFF: u64 = 4096;

/// A directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OleEntry {
    /// The entry id
    pub id: u32,
    /// The entry name
    pub name: String,
    /// The object type (0: unallocated, 1: storage, 2: stream, 5: root)
    pub objtype: u8,
    left: u32,
    right: u32,
    child: u32,
    start_sector: u32,
    /// The stream size in bytes
    pub size: u64,
}

impl OleEntry {
    fn parse(id: u32, buf: &[u8], major_version: u16) -> Result<Self, io::Error> {
        let objtype = buf[66];
        let mut ret = Self {
            id,
            name: String::new(),
            objtype,
            left: le32(buf, 68),
            right: le32(buf, 72),
            child: le32(buf, 76),
            start_sector: le32(buf, 116),
            size: u64::from(le32(buf, 120)) | (u64::from(le32(buf, 124)) << 32),
        };
        if objtype == 0 {
            return Ok(ret);
        }
        let namelen = usize::from(u16::from_le_bytes([buf[64], buf[65]]));
        if namelen < 2 || namelen > 64 || namelen % 2 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid directory entry {id}: name length {namelen} is invalid"),
            ));
        }
        let name: Vec<u16> = buf[0..namelen - 2]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        ret.name = String::from_utf16(&name).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid directory entry {id}: name is not valid UTF-16"),
            )
        })?;
        if major_version == 3 {
            ret.size &= 0xffffffff;
        }
        Ok(ret)
    }

    /// Whether the entry is in use
    pub fn is_allocated(&self) -> bool {
        self.objtype != 0
    }

    fn link(id: u32) -> Option<u32> {
        if id == NOSTREAM || id > MAXREGSECT {
            None
        } else {
            Some(id)
        }
    }

    fn is_mini(&self) -> bool {
        self.id > 0 && self.size < MINI_STREAM_CUTOFF
    }
}

impl ContainerEntry for OleEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_storage(&self) -> bool {
        self.objtype == 1 || self.objtype == 5
    }
}

fn le32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Follows a sector chain in an allocation table
///
/// Fails on chains which loop, leave the table or hit a special sector
fn walk_chain(table: &[u32], start: u32, what: &str) -> Result<Vec<u32>, io::Error> {
    let mut ret = Vec::new();
    let mut seen = HashSet::new();
    let mut cur = start;
    while cur != ENDOFCHAIN {
        if cur > MAXREGSECT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Found special sector 0x{cur:x} in {what} chain starting at {start}"),
            ));
        }
        if !seen.insert(cur) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Loop detected in {what} chain starting at {start}"),
            ));
        }
        ret.push(cur);
        cur = *usize::try_from(cur)
            .ok()
            .and_then(|i| table.get(i))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Sector {cur} is out of {what} (chain start: {start})"),
                )
            })?;
    }
    Ok(ret)
}

/// A Compound File
///
/// # Examples
/// ```no_run
/// use msgdecode_rs::container::Container;
/// use msgdecode_rs::ole::Ole;
/// use std::fs::File;
/// use std::io::BufReader;
///
/// let ole = Ole::new(BufReader::new(File::open("message.msg").unwrap())).unwrap();
/// let root = ole.root();
/// for child in ole.children(&root).unwrap() {
///     println!("{}", child.name);
/// }
/// ```
#[derive(Debug)]
pub struct Ole<R: Read + Seek> {
    f: RefCell<R>,
    major_version: u16,
    sector_size: u32,
    fat: Vec<u32>,
    minifat: Vec<u32>,
    mini_stream: Vec<u32>,
    entries: Vec<OleEntry>,
    anomalies: Vec<String>,
}

impl<R: Read + Seek> Ole<R> {
    /// Parses the file structures
    ///
    /// # Errors
    /// * Errors from the IO layer are bubbled
    /// * Structural errors are reported with [`ErrorKind`](io::ErrorKind) set
    ///   to [`InvalidData`](io::ErrorKind::InvalidData)
    pub fn new(mut reader: R) -> Result<Self, io::Error> {
        let mut hdr = [0u8; 512];
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut hdr).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                io::Error::new(io::ErrorKind::InvalidData, "Not an ole file: too short")
            }
            _ => e,
        })?;
        if hdr[0..8] != SIGNATURE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Not an ole file"));
        }
        let mut anomalies = Vec::new();
        let major_version = u16::from_le_bytes([hdr[26], hdr[27]]);
        if !(3..=4).contains(&major_version) {
            anomalies.push(format!("Major version set to {major_version} (expected 3 or 4)"));
        }
        let sector_size: u32 = match u16::from_le_bytes([hdr[30], hdr[31]]) {
            9 => 512,
            12 => 4096,
            shift => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid sector shift {shift}"),
                ));
            }
        };
        if (sector_size == 512) != (major_version == 3) {
            anomalies.push(format!(
                "Major version {major_version} with sector size {sector_size}"
            ));
        }
        let fat_sectors = le32(&hdr, 44);
        let first_dir_sector = le32(&hdr, 48);
        let first_minifat_sector = le32(&hdr, 60);
        let first_difat_sector = le32(&hdr, 68);
        let difat_sectors = le32(&hdr, 72);

        let mut ret = Self {
            f: RefCell::new(reader),
            major_version,
            sector_size,
            fat: Vec::new(),
            minifat: Vec::new(),
            mini_stream: Vec::new(),
            entries: Vec::new(),
            anomalies,
        };

        // DIFAT: 109 entries in the header, then a chain of DIFAT sectors
        let mut difat: Vec<u32> = hdr[76..512].chunks_exact(4).map(|c| le32(c, 0)).collect();
        let mut next = first_difat_sector;
        let mut seen = HashSet::new();
        for _ in 0..difat_sectors {
            if next > MAXREGSECT || !seen.insert(next) {
                ret.anomalies
                    .push(format!("DIFAT chain broken at sector 0x{next:x}"));
                break;
            }
            let sec = ret.read_sector(next)?;
            let (ids, link) = sec.split_at(sec.len() - 4);
            difat.extend(ids.chunks_exact(4).map(|c| le32(c, 0)));
            next = le32(link, 0);
        }
        difat.retain(|&s| s != FREESECT);
        if difat.len() != fat_sectors as usize {
            ret.anomalies.push(format!(
                "Number of FAT sectors in header is {} but {} were found in DIFAT",
                fat_sectors,
                difat.len()
            ));
        }

        // FAT
        for &sector in difat.iter() {
            if sector > MAXREGSECT {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Found DIFAT sector with special offset 0x{sector:x}"),
                ));
            }
            let sec = ret.read_sector(sector)?;
            ret.fat.extend(sec.chunks_exact(4).map(|c| le32(c, 0)));
        }
        if difat
            .iter()
            .any(|&s| ret.fat.get(s as usize) != Some(&FATSECT))
        {
            ret.anomalies
                .push("One or more FAT sectors are not marked as FATSECT".to_string());
        }
        if first_difat_sector <= MAXREGSECT && ret.fat.get(first_difat_sector as usize) != Some(&DIFSECT) {
            ret.anomalies
                .push("DIFAT sector is not marked as DIFSECT".to_string());
        }

        // Directory
        for sector in walk_chain(&ret.fat, first_dir_sector, "directory")? {
            let sec = ret.read_sector(sector)?;
            for chunk in sec.chunks_exact(DIR_ENTRY_SIZE) {
                let id = u32::try_from(ret.entries.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "Too many directory entries")
                })?;
                ret.entries.push(OleEntry::parse(id, chunk, major_version)?);
            }
        }
        let (root_type, root_start, root_name) = ret
            .entries
            .first()
            .map(|e| (e.objtype, e.start_sector, e.name.clone()))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Empty directory"))?;
        if root_type != 5 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid Root Entry: type is {root_type} instead of 5"),
            ));
        }
        if root_name != "Root Entry" {
            ret.anomalies
                .push(format!("Root Entry name is \"{root_name}\""));
        }

        // MiniFAT and mini stream
        for sector in walk_chain(&ret.fat, first_minifat_sector, "MiniFAT")? {
            let sec = ret.read_sector(sector)?;
            ret.minifat.extend(sec.chunks_exact(4).map(|c| le32(c, 0)));
        }
        ret.mini_stream = walk_chain(&ret.fat, root_start, "mini stream")?;

        for anomaly in ret.anomalies.iter() {
            debug!("Ole anomaly: {anomaly}");
        }
        Ok(ret)
    }

    /// Returns the major version of the file
    pub fn version(&self) -> u16 {
        self.major_version
    }

    /// Returns the number of directory entries (allocated or not)
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Lists the non fatal divergences found in the file structures
    pub fn anomalies(&self) -> &[String] {
        self.anomalies.as_slice()
    }

    fn sector_offset(&self, sector: u32) -> u64 {
        (u64::from(sector) + 1) * u64::from(self.sector_size)
    }

    fn read_sector(&self, sector: u32) -> Result<Vec<u8>, io::Error> {
        let mut buf = vec![0u8; self.sector_size as usize];
        let mut f = self.f.borrow_mut();
        f.seek(SeekFrom::Start(self.sector_offset(sector)))?;
        f.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn entry(&self, id: u32) -> Option<&OleEntry> {
        self.entries.get(usize::try_from(id).ok()?)
    }

    // Maps a stream to a list of (file offset, length) segments
    fn segments(&self, entry: &OleEntry) -> Result<Vec<(u64, usize)>, io::Error> {
        if entry.size == 0 {
            return Ok(Vec::new());
        }
        let (chain, unit) = if entry.is_mini() {
            (
                walk_chain(&self.minifat, entry.start_sector, "MiniFAT")?,
                MINI_SECTOR_SIZE,
            )
        } else {
            (
                walk_chain(&self.fat, entry.start_sector, "FAT")?,
                u64::from(self.sector_size),
            )
        };
        let mut ret = Vec::with_capacity(chain.len());
        let mut remaining = entry.size;
        for sector in chain {
            if remaining == 0 {
                break;
            }
            let offset = if entry.is_mini() {
                let pos = u64::from(sector) * MINI_SECTOR_SIZE;
                let ss = u64::from(self.sector_size);
                let container = usize::try_from(pos / ss)
                    .ok()
                    .and_then(|i| self.mini_stream.get(i))
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Mini sector {sector} is out of the mini stream"),
                        )
                    })?;
                self.sector_offset(*container) + pos % ss
            } else {
                self.sector_offset(sector)
            };
            let len = remaining.min(unit);
            ret.push((offset, len as usize));
            remaining -= len;
        }
        if remaining != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Stream \"{}\" is out of {}: {} bytes missing",
                    entry.name,
                    if entry.is_mini() { "MiniFAT" } else { "FAT" },
                    remaining
                ),
            ));
        }
        Ok(ret)
    }
}

impl<R: Read + Seek> Container for Ole<R> {
    type Entry = OleEntry;
    type Stream<'a>
        = OleStream<'a, R>
    where
        Self: 'a;

    fn root(&self) -> OleEntry {
        // Safe: checked on open
        self.entries[0].clone()
    }

    fn children(&self, parent: &OleEntry) -> Result<Vec<OleEntry>, io::Error> {
        if !parent.is_storage() {
            return Ok(Vec::new());
        }
        let mut ret = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<u32> = OleEntry::link(parent.child).into_iter().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                warn!("Loop in the directory tree of \"{}\" at entry {id}", parent.name);
                continue;
            }
            let Some(entry) = self.entry(id) else {
                warn!("Directory entry {id} is out of range");
                continue;
            };
            if !entry.is_allocated() {
                continue;
            }
            stack.extend(OleEntry::link(entry.left));
            stack.extend(OleEntry::link(entry.right));
            ret.push(entry.clone());
        }
        ret.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ret)
    }

    fn open(&self, entry: &OleEntry) -> Result<OleStream<'_, R>, io::Error> {
        if entry.is_storage() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Entry \"{}\" is not a stream", entry.name),
            ));
        }
        Ok(OleStream {
            ole: self,
            segments: self.segments(entry)?,
            current: 0,
            done: 0,
        })
    }
}

/// A reader for a stream object
pub struct OleStream<'a, R: Read + Seek> {
    ole: &'a Ole<R>,
    segments: Vec<(u64, usize)>,
    current: usize,
    done: usize,
}

impl<R: Read + Seek> Read for OleStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(&(offset, len)) = self.segments.get(self.current) else {
            return Ok(0);
        };
        let avail = (len - self.done).min(buf.len());
        let mut f = self.ole.f.borrow_mut();
        f.seek(SeekFrom::Start(offset + self.done as u64))?;
        f.read_exact(&mut buf[0..avail])?;
        self.done += avail;
        if self.done == len {
            self.current += 1;
            self.done = 0;
        }
        Ok(avail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn not_ole() {
        let err = Ole::new(Cursor::new(vec![0u8; 1024])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let err = Ole::new(Cursor::new(SIGNATURE.to_vec())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn chains() {
        let fat = [1, 2, ENDOFCHAIN, 0, FREESECT];
        assert_eq!(walk_chain(&fat, 0, "FAT").unwrap(), vec![0, 1, 2]);
        assert_eq!(walk_chain(&fat, ENDOFCHAIN, "FAT").unwrap(), Vec::<u32>::new());
        // 3 -> 0 -> 1 -> 2
        assert_eq!(walk_chain(&fat, 3, "FAT").unwrap(), vec![3, 0, 1, 2]);
        let err = walk_chain(&fat, 4, "FAT").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let looping = [1, 0];
        let err = walk_chain(&looping, 0, "FAT").unwrap_err();
        assert!(err.to_string().contains("Loop"));
        let err = walk_chain(&fat, 7, "FAT").unwrap_err();
        assert!(err.to_string().contains("out of FAT"));
        assert!(walk_chain(&fat, NOSTREAM, "FAT").is_err());
    }
}
