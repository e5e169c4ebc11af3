//! DeviceSQL (export.pdb) file structure
//!
//! The export.pdb file is a little-endian paginated database: a header page
//! declaring the page size and a table directory, then fixed-size pages.
//! Each table chains its pages through a per-page `next_page` field and the
//! chain ends at the table's `last_page` index.
//!
//! Within a data page, rows are packed into the heap (which starts at 0x28)
//! and addressed from the page tail: each group of up to sixteen rows owns a
//! 36-byte footer holding sixteen 2-byte heap-relative offsets and a 16-bit
//! presence bitmap, read LSB-first. Only rows whose presence bit is set
//! contain valid data.
//!
//! Reference: https://djl-analysis.deepsymmetry.org/rekordbox-export-analysis/exports.html

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::source::ByteSource;

/// Offset where heap data begins in each page
pub const HEAP_START: u64 = 0x28;

/// Size of each row group footer at the page tail
pub const ROW_GROUP_SIZE: u64 = 0x24;

/// Maximum rows per group
pub const ROWS_PER_GROUP: u16 = 16;

/// `next_page` value marking the end of a chain
pub const NO_PAGE: u32 = 0xFFFF_FFFF;

/// Table types found in export.pdb and exportExt.pdb files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TableKind {
    Tracks,
    Genres,
    Artists,
    Albums,
    Labels,
    Keys,
    Colors,
    PlaylistTree,
    PlaylistEntries,
    Artwork,
    Columns,
    HistoryPlaylists,
    HistoryEntries,
    History,
    // exportExt.pdb tables
    Tags,
    TagTracks,
}

impl TableKind {
    /// Map a raw table type code to a known kind. The extension file reuses
    /// low type codes for its own tables, so the mapping is per-family.
    pub fn from_raw(raw: u32, is_ext: bool) -> Option<Self> {
        if is_ext {
            return match raw {
                3 => Some(TableKind::Tags),
                4 => Some(TableKind::TagTracks),
                _ => None,
            };
        }
        match raw {
            0 => Some(TableKind::Tracks),
            1 => Some(TableKind::Genres),
            2 => Some(TableKind::Artists),
            3 => Some(TableKind::Albums),
            4 => Some(TableKind::Labels),
            5 => Some(TableKind::Keys),
            6 => Some(TableKind::Colors),
            7 => Some(TableKind::PlaylistTree),
            8 => Some(TableKind::PlaylistEntries),
            13 => Some(TableKind::Artwork),
            16 => Some(TableKind::Columns),
            17 => Some(TableKind::HistoryPlaylists),
            18 => Some(TableKind::HistoryEntries),
            19 => Some(TableKind::History),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Tracks => "tracks",
            TableKind::Genres => "genres",
            TableKind::Artists => "artists",
            TableKind::Albums => "albums",
            TableKind::Labels => "labels",
            TableKind::Keys => "keys",
            TableKind::Colors => "colors",
            TableKind::PlaylistTree => "playlist_tree",
            TableKind::PlaylistEntries => "playlist_entries",
            TableKind::Artwork => "artwork",
            TableKind::Columns => "columns",
            TableKind::HistoryPlaylists => "history_playlists",
            TableKind::HistoryEntries => "history_entries",
            TableKind::History => "history",
            TableKind::Tags => "tags",
            TableKind::TagTracks => "tag_tracks",
        }
    }
}

/// A table directory entry from the file header.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub raw_kind: u32,
    pub kind: Option<TableKind>,
    pub empty_candidate: u32,
    pub first_page: u32,
    pub last_page: u32,
}

/// A parsed page header.
///
/// The `unknown`/`u3`..`u7` fields have no documented meaning; they are
/// preserved verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub index: u32,
    pub raw_kind: u32,
    pub next_page: u32,
    pub unknown1: u32,
    pub unknown2: u32,
    pub num_rows_small: u8,
    pub u3: u8,
    pub u4: u8,
    pub page_flags: u8,
    pub free_size: u16,
    pub used_size: u16,
    pub u5: u16,
    pub num_rows_large: u16,
    pub u6: u16,
    pub u7: u16,
    /// Absolute byte offset of the page within the file.
    #[serde(skip)]
    offset: u64,
}

impl Page {
    /// Pages only hold rows when bit 0x40 of the flags is clear; index and
    /// free-list pages are skipped during row enumeration.
    pub fn is_data_page(&self) -> bool {
        self.page_flags & 0x40 == 0
    }

    /// Number of rows in this page. The large count wins when it exceeds
    /// the small one and is not the 0x1fff sentinel.
    pub fn num_rows(&self) -> u16 {
        let small = self.num_rows_small as u16;
        if self.num_rows_large > small && self.num_rows_large != 0x1fff {
            self.num_rows_large
        } else {
            small
        }
    }

    pub fn num_row_groups(&self) -> u16 {
        self.num_rows().div_ceil(ROWS_PER_GROUP)
    }
}

/// A present row located within a page: the page view plus the row's offset
/// inside it. Row decoders read fields relative to `offset` and may follow
/// string offsets anywhere within the page.
#[derive(Debug, Clone)]
pub struct RowRef {
    pub page: ByteSource,
    pub offset: u64,
}

/// An open DeviceSQL database file.
#[derive(Debug)]
pub struct DbFile {
    source: ByteSource,
    page_size: u32,
    num_tables: u32,
    next_unused_page: u32,
    sequence: u32,
    tables: Vec<Table>,
    is_ext: bool,
}

impl DbFile {
    /// Parse the header of an `export.pdb` file.
    pub fn open(source: ByteSource) -> Result<Self> {
        Self::open_with(source, false)
    }

    /// Parse the header of an `exportExt.pdb` file.
    pub fn open_ext(source: ByteSource) -> Result<Self> {
        Self::open_with(source, true)
    }

    fn open_with(source: ByteSource, is_ext: bool) -> Result<Self> {
        let gap = source.read_bytes(0, 4)?;
        if gap != [0, 0, 0, 0] {
            return Err(Error::bad_magic(0, &[0, 0, 0, 0], gap));
        }
        let page_size = source.read_u32_le(4)?;
        if page_size < HEAP_START as u32 + ROW_GROUP_SIZE as u32 {
            return Err(Error::malformed_page(
                0,
                format!("implausible page size {page_size}"),
            ));
        }
        let num_tables = source.read_u32_le(8)?;
        let next_unused_page = source.read_u32_le(12)?;
        let sequence = source.read_u32_le(20)?;

        let mut tables = Vec::with_capacity(num_tables as usize);
        let mut seen = HashSet::new();
        for i in 0..num_tables as u64 {
            let base = 28 + i * 16;
            let raw_kind = source.read_u32_le(base)?;
            let kind = TableKind::from_raw(raw_kind, is_ext);
            if let Some(kind) = kind {
                if !seen.insert(kind) {
                    return Err(Error::DuplicateTable(kind.name().to_string()));
                }
            }
            tables.push(Table {
                raw_kind,
                kind,
                empty_candidate: source.read_u32_le(base + 4)?,
                first_page: source.read_u32_le(base + 8)?,
                last_page: source.read_u32_le(base + 12)?,
            });
        }

        debug!(
            page_size,
            num_tables, next_unused_page, "opened DeviceSQL database"
        );

        Ok(Self {
            source,
            page_size,
            num_tables,
            next_unused_page,
            sequence,
            tables,
            is_ext,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn num_tables(&self) -> u32 {
        self.num_tables
    }

    pub fn next_unused_page(&self) -> u32 {
        self.next_unused_page
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn is_ext(&self) -> bool {
        self.is_ext
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Find the directory entry for a table kind, if present.
    pub fn table(&self, kind: TableKind) -> Option<&Table> {
        self.tables.iter().find(|t| t.kind == Some(kind))
    }

    /// Number of whole pages the file can hold.
    fn page_count(&self) -> u64 {
        self.source.len() / self.page_size as u64
    }

    /// Read the page at `index`. A page extending past the end of the file
    /// is fatal.
    pub fn read_page(&self, index: u32) -> Result<Page> {
        let offset = index as u64 * self.page_size as u64;
        let view = self
            .source
            .sub(offset, self.page_size as u64)
            .map_err(|_| Error::malformed_page(index, "page extends past end of file"))?;

        let page = Page {
            index,
            raw_kind: view.read_u32_le(0x08)?,
            next_page: view.read_u32_le(0x0C)?,
            unknown1: view.read_u32_le(0x10)?,
            unknown2: view.read_u32_le(0x14)?,
            num_rows_small: view.read_u8(0x18)?,
            u3: view.read_u8(0x19)?,
            u4: view.read_u8(0x1A)?,
            page_flags: view.read_u8(0x1B)?,
            free_size: view.read_u16_le(0x1C)?,
            used_size: view.read_u16_le(0x1E)?,
            u5: view.read_u16_le(0x20)?,
            num_rows_large: view.read_u16_le(0x22)?,
            u6: view.read_u16_le(0x24)?,
            u7: view.read_u16_le(0x26)?,
            offset,
        };

        let stored_index = view.read_u32_le(0x04)?;
        if stored_index != index {
            warn!(
                index,
                stored_index, "page header index does not match file position"
            );
        }

        Ok(page)
    }

    /// Walk a table's page chain from `first_page`, stopping after the page
    /// whose index equals `last_page`.
    pub fn iter_pages<'a>(&'a self, table: &Table) -> PageIter<'a> {
        PageIter {
            db: self,
            next: Some(table.first_page),
            last: table.last_page,
            visited: 0,
        }
    }

    /// Enumerate the present rows of a data page in canonical order:
    /// ascending row group, then ascending slot within the group.
    pub fn iter_rows(&self, page: &Page) -> Result<Vec<RowRef>> {
        if !page.is_data_page() {
            return Ok(Vec::new());
        }

        let view = self.source.sub(page.offset, self.page_size as u64)?;
        let page_size = self.page_size as u64;
        let num_rows = page.num_rows();
        let num_groups = page.num_row_groups() as u64;

        if num_groups * ROW_GROUP_SIZE + HEAP_START > page_size {
            return Err(Error::malformed_page(
                page.index,
                format!("{num_groups} row groups do not fit in the page"),
            ));
        }

        let mut rows = Vec::with_capacity(num_rows as usize);
        for group in 0..num_groups {
            let base = page_size - group * ROW_GROUP_SIZE;
            let rows_in_group = (num_rows - (group as u16) * ROWS_PER_GROUP).min(ROWS_PER_GROUP);
            // Presence flags are a little-endian bit stream, LSB-first; only
            // the low `rows_in_group` bits are meaningful.
            let present = view.read_bits(base - 4, 0, rows_in_group as u32)?;
            for slot in 0..rows_in_group as u64 {
                if present >> slot & 1 == 0 {
                    continue;
                }
                let heap_offset = view.read_u16_le(base - 6 - 2 * slot)? as u64;
                let row_offset = HEAP_START + heap_offset;
                if row_offset >= page_size {
                    return Err(Error::malformed_row(
                        page.offset + row_offset,
                        format!(
                            "row offset {heap_offset:#x} points outside page {}",
                            page.index
                        ),
                    ));
                }
                rows.push(RowRef {
                    page: view.clone(),
                    offset: row_offset,
                });
            }
        }

        Ok(rows)
    }
}

/// Iterator over a table's linked pages.
pub struct PageIter<'a> {
    db: &'a DbFile,
    next: Option<u32>,
    last: u32,
    visited: u64,
}

impl Iterator for PageIter<'_> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;

        // A well-formed chain never revisits a page, so walking more pages
        // than the file holds means the chain loops.
        self.visited += 1;
        if self.visited > self.db.page_count() {
            self.next = None;
            return Some(Err(Error::malformed_page(index, "page chain cycle")));
        }

        let page = match self.db.read_page(index) {
            Ok(page) => page,
            Err(e) => {
                self.next = None;
                return Some(Err(e));
            }
        };

        if index == self.last {
            self.next = None;
        } else if page.next_page == NO_PAGE || page.next_page as u64 >= self.db.page_count() {
            self.next = None;
            return Some(Err(Error::malformed_page(
                index,
                format!(
                    "chain ends at page {index} without reaching last page {} (next_page {:#x})",
                    self.last, page.next_page
                ),
            )));
        } else {
            self.next = Some(page.next_page);
        }

        Some(Ok(page))
    }
}
