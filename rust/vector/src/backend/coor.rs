// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coordinate section of a native map.
//!
//! After the shared section header (plus one byte: `1` if records carry z)
//! the file is a sequence of variable-length records addressed by their byte
//! offset:
//!
//! | field | present |
//! |---|---|
//! | flags `u8`: bit 0 alive, bit 1 has categories, bits 2-4 type | always |
//! | category count `u16`, then `(layer i32, cat i32)` pairs | bit 1 set |
//! | point count `u32` | lines and boundaries |
//! | x values, y values, z values (`f64`) | always, z if 3D |
//!
//! Deleting a record flips its alive bit in place; records are never moved,
//! so offsets stay valid.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use bytes::{Buf, BufMut};
use topovec_rtree::port::get_u8;
use topovec_rtree::ByteOrder;
use topovec_topology::codec::{read_section_header, write_section_header, SectionVersion};
use topovec_topology::{FeatureType, LineCats, LinePoints};

use crate::error::{Error, Result};

pub const COOR_FILE: &str = "coor";
pub const COOR_MAGIC: [u8; 4] = *b"TVCO";
pub const COOR_VERSION: SectionVersion = SectionVersion::new(1, 0, 1, 0);
const COOR_EXTRA: u32 = 1;

const ALIVE: u8 = 0b0000_0001;
const HAS_CATS: u8 = 0b0000_0010;
const TYPE_SHIFT: u8 = 2;
const TYPE_MASK: u8 = 0b0001_1100;

/// An open coordinate file. Records are cached in memory and written
/// through to disk when the file is writable.
#[derive(Debug)]
pub struct CoorFile {
    path: PathBuf,
    file: Option<File>,
    data: Vec<u8>,
    order: ByteOrder,
    with_z: bool,
    body: usize,
}

impl CoorFile {
    /// Creates an empty coordinate file; fails if it exists.
    pub fn create(path: &Path, with_z: bool, order: ByteOrder) -> Result<Self> {
        let mut data = Vec::new();
        write_section_header(&mut data, COOR_MAGIC, COOR_VERSION, order, COOR_EXTRA);
        data.put_u8(with_z as u8);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(&data)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            body: data.len(),
            data,
            order,
            with_z,
        })
    }

    pub fn open(path: &Path, writable: bool) -> Result<Self> {
        let data = std::fs::read(path)?;
        let mut buf = data.as_slice();
        let header = read_section_header(&mut buf, "coor", COOR_MAGIC, COOR_VERSION)?;
        let with_z = get_u8(&mut buf)? != 0;
        let body = header.size as usize;
        if body > data.len() {
            return Err(topovec_topology::Error::Corrupt {
                section: "coor",
                reason: format!("header size {body} beyond end of file"),
            }
            .into());
        }

        let file = if writable {
            Some(OpenOptions::new().read(true).write(true).open(path)?)
        } else {
            None
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
            data,
            order: header.byte_order,
            with_z,
            body,
        })
    }

    pub fn with_z(&self) -> bool {
        self.with_z
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Current file size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Modification time of the file on disk, seconds since the epoch.
    pub fn mtime(&self) -> Result<i64> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        Ok(modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0))
    }

    /// Decodes the record at `offset`. Returns its type and alive flag.
    pub fn read(
        &self,
        offset: u64,
        points: &mut LinePoints,
        cats: &mut LineCats,
    ) -> Result<(FeatureType, bool)> {
        let mut buf = self.record(offset)?;
        let order = self.order;
        let flags = get_u8(&mut buf)?;
        let kind = record_type(flags, offset)?;

        cats.clear();
        if flags & HAS_CATS != 0 {
            let n = order.get_u16(&mut buf)?;
            for _ in 0..n {
                let layer = order.get_i32(&mut buf)?;
                let cat = order.get_i32(&mut buf)?;
                cats.add(layer, cat);
            }
        }

        let n = if kind.is_point_like() {
            1
        } else {
            order.get_u32(&mut buf)? as usize
        };
        let stride = if self.with_z { 3 } else { 2 };
        topovec_rtree::port::ensure(&buf, n * stride * 8)?;
        let mut xs = Vec::with_capacity(n);
        for _ in 0..n {
            xs.push(order.get_f64(&mut buf)?);
        }
        let mut ys = Vec::with_capacity(n);
        for _ in 0..n {
            ys.push(order.get_f64(&mut buf)?);
        }
        points.clear();
        for i in 0..n {
            let z = if self.with_z { order.get_f64(&mut buf)? } else { 0.0 };
            points.push(xs[i], ys[i], z);
        }
        Ok((kind, flags & ALIVE != 0))
    }

    /// Offset of the first live record after `after`, or the first live
    /// record of the file when `after` is `None`.
    pub fn next_live(&self, after: Option<u64>) -> Result<Option<u64>> {
        let mut offset = match after {
            None => self.body as u64,
            Some(o) => o + self.record_len(o)? as u64,
        };
        while (offset as usize) < self.data.len() {
            let flags = self.data[offset as usize];
            if flags & ALIVE != 0 {
                return Ok(Some(offset));
            }
            offset += self.record_len(offset)? as u64;
        }
        Ok(None)
    }

    /// Appends a live record and returns its offset.
    pub fn append(
        &mut self,
        kind: FeatureType,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<u64> {
        let cat_count: u16 = count_field("categories", cats.len())?;
        let point_count: u32 = count_field("points", points.len())?;
        let offset = self.data.len() as u64;
        let mut record = Vec::new();
        let order = self.order;

        let mut flags = ALIVE | (kind.code() << TYPE_SHIFT);
        if !cats.is_empty() {
            flags |= HAS_CATS;
        }
        record.put_u8(flags);
        if !cats.is_empty() {
            order.put_u16(&mut record, cat_count);
            for (layer, cat) in cats.iter() {
                order.put_i32(&mut record, layer);
                order.put_i32(&mut record, cat);
            }
        }
        if !kind.is_point_like() {
            order.put_u32(&mut record, point_count);
        }
        for p in points.iter() {
            order.put_f64(&mut record, p.x);
        }
        for p in points.iter() {
            order.put_f64(&mut record, p.y);
        }
        if self.with_z {
            for p in points.iter() {
                order.put_f64(&mut record, p.z);
            }
        }

        if let Some(file) = &mut self.file {
            file.seek(SeekFrom::End(0))?;
            file.write_all(&record)?;
        } else {
            return Err(Error::ReadOnly);
        }
        self.data.extend_from_slice(&record);
        Ok(offset)
    }

    /// Flips the alive bit of the record at `offset`.
    pub fn set_alive(&mut self, offset: u64, alive: bool) -> Result<()> {
        self.record(offset)?;
        let file = self.file.as_mut().ok_or(Error::ReadOnly)?;
        let flags = &mut self.data[offset as usize];
        if alive {
            *flags |= ALIVE;
        } else {
            *flags &= !ALIVE;
        }
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&[*flags])?;
        Ok(())
    }

    /// Flushes written records to disk.
    pub fn sync(&mut self) -> Result<()> {
        if let Some(file) = &mut self.file {
            file.sync_all()?;
        }
        Ok(())
    }

    fn record(&self, offset: u64) -> Result<&[u8]> {
        let start = offset as usize;
        if start < self.body || start >= self.data.len() {
            let reason = format!("no coordinate record at offset {offset}");
            return Err(topovec_topology::Error::Source(reason).into());
        }
        Ok(&self.data[start..])
    }

    fn record_len(&self, offset: u64) -> Result<usize> {
        let mut buf = self.record(offset)?;
        let total = buf.len();
        let flags = get_u8(&mut buf)?;
        let kind = record_type(flags, offset)?;
        if flags & HAS_CATS != 0 {
            let n = self.order.get_u16(&mut buf)? as usize;
            topovec_rtree::port::ensure(&buf, n * 8)?;
            buf.advance(n * 8);
        }
        let n = if kind.is_point_like() {
            1
        } else {
            self.order.get_u32(&mut buf)? as usize
        };
        let coords = n * if self.with_z { 24 } else { 16 };
        topovec_rtree::port::ensure(&buf, coords)?;
        buf.advance(coords);
        Ok(total - buf.remaining())
    }
}

fn record_type(flags: u8, offset: u64) -> Result<FeatureType> {
    FeatureType::from_code((flags & TYPE_MASK) >> TYPE_SHIFT).ok_or_else(|| {
        topovec_topology::Error::Corrupt {
            section: "coor",
            reason: format!("bad record type at offset {offset}"),
        }
        .into()
    })
}

/// Narrows a record count to its on-disk field width.
fn count_field<T: TryFrom<usize>>(what: &str, count: usize) -> Result<T> {
    T::try_from(count).map_err(|_| Error::Format {
        file: COOR_FILE,
        reason: format!("{count} {what} do not fit in one record"),
    })
}
