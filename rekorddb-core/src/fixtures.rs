//! In-memory file builders used by the unit tests.
//!
//! These produce little synthetic export.pdb / ANLZ images so the decoders
//! can be exercised without shipping binary fixtures. The page layout
//! mirrors what rekordbox itself writes: heap growing forward from 0x28,
//! row-group footers growing backward from the page tail.

#![allow(dead_code)]

use crate::string::StringKind;

pub(crate) const PAGE_SIZE: usize = 4096;
const HEAP_START: usize = 0x28;
const ROW_GROUP_SIZE: usize = 36;
const ROWS_PER_GROUP: usize = 16;
const NO_PAGE: u32 = 0xFFFF_FFFF;

const KIND_LONG_ASCII: u8 = 0x40;
const KIND_UTF16LE: u8 = 0x90;
const ISRC_MARKER: u8 = 0x03;

// DeviceSQL string encoders. Write support is out of scope for the crate
// itself; these exist so fixture rows carry real string bodies and so the
// round-trip tests can re-encode what they decode.

fn long_header(kind: u8, total_len: usize) -> Vec<u8> {
    vec![kind, (total_len & 0xFF) as u8, (total_len >> 8) as u8, 0x00]
}

/// Encode a string, picking the variant rekordbox would: short ASCII up to
/// 126 bytes, long ASCII past that, UTF-16LE for non-ASCII text.
pub(crate) fn encode_string(s: &str) -> Vec<u8> {
    if s.is_empty() {
        // Total length 1: just the kind byte.
        return vec![0x03];
    }
    if !s.is_ascii() {
        encode_utf16le(s)
    } else if s.len() <= 126 {
        encode_short_ascii(s)
    } else {
        encode_long_ascii(s)
    }
}

/// Re-encode with the same variant a string was decoded from.
pub(crate) fn encode_as(kind: StringKind, s: &str) -> Vec<u8> {
    match kind {
        StringKind::ShortAscii => encode_short_ascii(s),
        StringKind::LongAscii => encode_long_ascii(s),
        StringKind::LongUtf16Le => encode_utf16le(s),
        StringKind::Isrc => encode_isrc(s),
        StringKind::Unknown(_) => Vec::new(),
    }
}

fn encode_short_ascii(s: &str) -> Vec<u8> {
    // Header byte holds the total length (body + header) in its upper
    // seven bits, with the low bit set.
    let mut out = vec![(((s.len() + 1) as u8) << 1) | 1];
    out.extend_from_slice(s.as_bytes());
    out
}

fn encode_long_ascii(s: &str) -> Vec<u8> {
    let mut out = long_header(KIND_LONG_ASCII, 4 + s.len());
    out.extend_from_slice(s.as_bytes());
    out
}

fn encode_utf16le(s: &str) -> Vec<u8> {
    let body: Vec<u8> = s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    let mut out = long_header(KIND_UTF16LE, 4 + body.len());
    out.extend_from_slice(&body);
    out
}

/// ISRCs use the 0x90 kind despite the ASCII payload: marker, text, NUL.
pub(crate) fn encode_isrc(isrc: &str) -> Vec<u8> {
    if isrc.is_empty() {
        return encode_string("");
    }
    let mut out = long_header(KIND_UTF16LE, 4 + isrc.len() + 2);
    out.push(ISRC_MARKER);
    out.extend_from_slice(isrc.as_bytes());
    out.push(0x00);
    out
}

/// Encoded size of a string without building it.
pub(crate) fn encoded_length(s: &str) -> usize {
    if s.is_empty() {
        1
    } else if !s.is_ascii() {
        4 + s.encode_utf16().count() * 2
    } else if s.len() <= 126 {
        1 + s.len()
    } else {
        4 + s.len()
    }
}

/// A single data page under construction.
pub(crate) struct PageBuilder {
    data: Vec<u8>,
    heap_pos: usize,
    page_index: u32,
    raw_kind: u32,
    /// Heap-relative offset per slot; `None` marks an absent row.
    slots: Vec<Option<u16>>,
}

impl PageBuilder {
    pub fn new(page_index: u32, raw_kind: u32) -> Self {
        Self {
            data: vec![0u8; PAGE_SIZE],
            heap_pos: HEAP_START,
            page_index,
            raw_kind,
            slots: Vec::new(),
        }
    }

    fn index_area_start(&self, extra_rows: usize) -> usize {
        let rows = self.slots.len() + extra_rows;
        let groups = rows.div_ceil(ROWS_PER_GROUP).max(1);
        PAGE_SIZE - groups * ROW_GROUP_SIZE
    }

    pub fn would_overflow(&self, data_size: usize) -> bool {
        self.heap_pos + data_size > self.index_area_start(1)
    }

    /// Write a present row into the heap and record its slot.
    pub fn write_row(&mut self, data: &[u8]) -> u16 {
        assert!(!self.would_overflow(data.len()), "fixture page overflow");
        let offset = (self.heap_pos - HEAP_START) as u16;
        self.data[self.heap_pos..self.heap_pos + data.len()].copy_from_slice(data);
        self.heap_pos += data.len();
        self.slots.push(Some(offset));
        offset
    }

    /// Record a slot whose presence bit is clear.
    pub fn add_absent_row(&mut self) {
        self.slots.push(None);
    }

    pub fn row_count(&self) -> usize {
        self.slots.len()
    }

    /// Write the page header and the backward row index, returning the
    /// finished page bytes.
    pub fn finalize(mut self, next_page: u32) -> Vec<u8> {
        let num_rows = self.slots.len();

        self.data[4..8].copy_from_slice(&self.page_index.to_le_bytes());
        self.data[8..12].copy_from_slice(&self.raw_kind.to_le_bytes());
        self.data[12..16].copy_from_slice(&next_page.to_le_bytes());
        self.data[0x18] = num_rows as u8;
        // 0x24: plain data page (bit 0x40 clear)
        self.data[0x1B] = 0x24;

        let free_size = self.index_area_start(0).saturating_sub(self.heap_pos) as u16;
        let used_size = (self.heap_pos - HEAP_START) as u16;
        self.data[0x1C..0x1E].copy_from_slice(&free_size.to_le_bytes());
        self.data[0x1E..0x20].copy_from_slice(&used_size.to_le_bytes());

        let num_groups = num_rows.div_ceil(ROWS_PER_GROUP);
        for group in 0..num_groups {
            let base = PAGE_SIZE - group * ROW_GROUP_SIZE;
            let first_slot = group * ROWS_PER_GROUP;
            let in_group = (num_rows - first_slot).min(ROWS_PER_GROUP);

            let mut present: u16 = 0;
            for i in 0..in_group {
                if let Some(offset) = self.slots[first_slot + i] {
                    present |= 1 << i;
                    let pos = base - 6 - 2 * i;
                    self.data[pos..pos + 2].copy_from_slice(&offset.to_le_bytes());
                }
            }
            self.data[base - 4..base - 2].copy_from_slice(&present.to_le_bytes());
        }

        self.data
    }
}

/// An index page: carries no rows, chains to the first data page.
pub(crate) fn index_page(page_index: u32, raw_kind: u32, next_page: u32) -> Vec<u8> {
    let mut data = vec![0u8; PAGE_SIZE];
    data[4..8].copy_from_slice(&page_index.to_le_bytes());
    data[8..12].copy_from_slice(&raw_kind.to_le_bytes());
    data[12..16].copy_from_slice(&next_page.to_le_bytes());
    data[0x1B] = 0x64;
    data
}

/// A row slot in a fixture page.
#[derive(Clone)]
pub(crate) enum RowSpec {
    Present(Vec<u8>),
    Absent,
}

struct TableFixture {
    raw_kind: u32,
    /// One inner vec per data page.
    pages: Vec<Vec<RowSpec>>,
}

/// Builds a whole database image: header page, then per table an index page
/// followed by its chained data pages.
pub(crate) struct DbBuilder {
    tables: Vec<TableFixture>,
}

impl DbBuilder {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    /// Add a table whose rows all fit one data page.
    pub fn add_table(&mut self, raw_kind: u32, rows: Vec<Vec<u8>>) -> &mut Self {
        self.add_table_pages(
            raw_kind,
            vec![rows.into_iter().map(RowSpec::Present).collect()],
        )
    }

    /// Add a table with explicit per-page row slots.
    pub fn add_table_pages(&mut self, raw_kind: u32, pages: Vec<Vec<RowSpec>>) -> &mut Self {
        assert!(!pages.is_empty());
        self.tables.push(TableFixture { raw_kind, pages });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pages: Vec<Vec<u8>> = vec![vec![0u8; PAGE_SIZE]]; // header placeholder
        let mut pointers = Vec::new();
        let mut next_index = 1u32;

        for table in &self.tables {
            let index_idx = next_index;
            next_index += 1;
            let first_data_idx = next_index;
            let data_pages = table.pages.len() as u32;
            next_index += data_pages;

            pages.push(index_page(index_idx, table.raw_kind, first_data_idx));

            for (i, rows) in table.pages.iter().enumerate() {
                let page_idx = first_data_idx + i as u32;
                let mut builder = PageBuilder::new(page_idx, table.raw_kind);
                for row in rows {
                    match row {
                        RowSpec::Present(data) => {
                            builder.write_row(data);
                        }
                        RowSpec::Absent => builder.add_absent_row(),
                    }
                }
                let next = if i + 1 < table.pages.len() {
                    page_idx + 1
                } else {
                    NO_PAGE
                };
                pages.push(builder.finalize(next));
            }

            pointers.push((
                table.raw_kind,
                next_index,
                index_idx,
                first_data_idx + data_pages - 1,
            ));
        }

        // Header page.
        let header = &mut pages[0];
        header[4..8].copy_from_slice(&(PAGE_SIZE as u32).to_le_bytes());
        header[8..12].copy_from_slice(&(pointers.len() as u32).to_le_bytes());
        header[12..16].copy_from_slice(&next_index.to_le_bytes());
        header[20..24].copy_from_slice(&next_index.to_le_bytes());
        let mut offset = 28;
        for (raw_kind, empty_candidate, first, last) in pointers {
            header[offset..offset + 4].copy_from_slice(&raw_kind.to_le_bytes());
            header[offset + 4..offset + 8].copy_from_slice(&empty_candidate.to_le_bytes());
            header[offset + 8..offset + 12].copy_from_slice(&first.to_le_bytes());
            header[offset + 12..offset + 16].copy_from_slice(&last.to_le_bytes());
            offset += 16;
        }

        pages.concat()
    }
}

/// Everything a fixture track row can carry. IDs default to zero (absent).
pub(crate) struct TrackRowSpec {
    pub id: u32,
    pub artist_id: u32,
    pub composer_id: u32,
    pub original_artist_id: u32,
    pub remixer_id: u32,
    pub album_id: u32,
    pub genre_id: u32,
    pub label_id: u32,
    pub key_id: u32,
    pub artwork_id: u32,
    pub color_id: u8,
    pub rating: u8,
    pub sample_rate: u32,
    pub bitrate: u32,
    pub track_number: u32,
    pub tempo: u32,
    pub disc_number: u16,
    pub play_count: u16,
    pub year: u16,
    pub sample_depth: u16,
    pub duration: u16,
    pub title: String,
    pub comment: String,
    pub file_path: String,
    pub filename: String,
    pub analyze_path: String,
    pub date_added: String,
    pub release_date: String,
    pub mix_name: String,
    pub isrc: String,
}

impl Default for TrackRowSpec {
    fn default() -> Self {
        Self {
            id: 1,
            artist_id: 0,
            composer_id: 0,
            original_artist_id: 0,
            remixer_id: 0,
            album_id: 0,
            genre_id: 0,
            label_id: 0,
            key_id: 0,
            artwork_id: 0,
            color_id: 0,
            rating: 0,
            sample_rate: 44100,
            bitrate: 320,
            track_number: 0,
            tempo: 12000,
            disc_number: 1,
            play_count: 0,
            year: 0,
            sample_depth: 16,
            duration: 180,
            title: String::new(),
            comment: String::new(),
            file_path: String::new(),
            filename: String::new(),
            analyze_path: String::new(),
            date_added: String::new(),
            release_date: String::new(),
            mix_name: String::new(),
            isrc: String::new(),
        }
    }
}

/// Build a track row: 0x5E-byte fixed block, 21 string-offset words, then
/// the string bodies.
pub(crate) fn track_row(spec: &TrackRowSpec) -> Vec<u8> {
    const FIXED_SIZE: usize = 0x5E;
    const STRING_COUNT: usize = 21;
    const HEADER_SIZE: usize = FIXED_SIZE + STRING_COUNT * 2;

    let strings: Vec<Vec<u8>> = vec![
        encode_isrc(&spec.isrc),            // 0: isrc
        encode_string(""),                  // 1: texter
        encode_string(""),                  // 2: unknown_string_2
        encode_string(""),                  // 3: unknown_string_3
        encode_string(""),                  // 4: unknown_string_4
        encode_string(""),                  // 5: message
        encode_string("ON"),                // 6: kuvo_public
        encode_string("ON"),                // 7: autoload_hot_cues
        encode_string(""),                  // 8: unknown_string_5
        encode_string(""),                  // 9: unknown_string_6
        encode_string(&spec.date_added),    // 10: date_added
        encode_string(&spec.release_date),  // 11: release_date
        encode_string(&spec.mix_name),      // 12: mix_name
        encode_string(""),                  // 13: unknown_string_7
        encode_string(&spec.analyze_path),  // 14: analyze_path
        encode_string(""),                  // 15: analyze_date
        encode_string(&spec.comment),       // 16: comment
        encode_string(&spec.title),         // 17: title
        encode_string(""),                  // 18: unknown_string_8
        encode_string(&spec.filename),      // 19: filename
        encode_string(&spec.file_path),     // 20: file_path
    ];

    let mut string_offsets = Vec::with_capacity(STRING_COUNT);
    let mut current_offset = HEADER_SIZE;
    for s in &strings {
        string_offsets.push(current_offset as u16);
        current_offset += s.len();
    }

    let mut row = Vec::with_capacity(current_offset);
    row.extend_from_slice(&0x0024u16.to_le_bytes()); // subtype
    row.extend_from_slice(&0u16.to_le_bytes()); // index_shift
    row.extend_from_slice(&0u32.to_le_bytes()); // bitmask
    row.extend_from_slice(&spec.sample_rate.to_le_bytes());
    row.extend_from_slice(&spec.composer_id.to_le_bytes());
    row.extend_from_slice(&0u32.to_le_bytes()); // file_size
    row.extend_from_slice(&0u32.to_le_bytes()); // unknown2
    row.extend_from_slice(&0u16.to_le_bytes()); // u3
    row.extend_from_slice(&0u16.to_le_bytes()); // u4
    row.extend_from_slice(&spec.artwork_id.to_le_bytes());
    row.extend_from_slice(&spec.key_id.to_le_bytes());
    row.extend_from_slice(&spec.original_artist_id.to_le_bytes());
    row.extend_from_slice(&spec.label_id.to_le_bytes());
    row.extend_from_slice(&spec.remixer_id.to_le_bytes());
    row.extend_from_slice(&spec.bitrate.to_le_bytes());
    row.extend_from_slice(&spec.track_number.to_le_bytes());
    row.extend_from_slice(&spec.tempo.to_le_bytes());
    row.extend_from_slice(&spec.genre_id.to_le_bytes());
    row.extend_from_slice(&spec.album_id.to_le_bytes());
    row.extend_from_slice(&spec.artist_id.to_le_bytes());
    row.extend_from_slice(&spec.id.to_le_bytes());
    row.extend_from_slice(&spec.disc_number.to_le_bytes());
    row.extend_from_slice(&spec.play_count.to_le_bytes());
    row.extend_from_slice(&spec.year.to_le_bytes());
    row.extend_from_slice(&spec.sample_depth.to_le_bytes());
    row.extend_from_slice(&spec.duration.to_le_bytes());
    row.extend_from_slice(&41u16.to_le_bytes()); // unknown5
    row.push(spec.color_id);
    row.push(spec.rating);
    row.extend_from_slice(&1u16.to_le_bytes()); // unknown6
    row.extend_from_slice(&3u16.to_le_bytes()); // unknown7
    for offset in &string_offsets {
        row.extend_from_slice(&offset.to_le_bytes());
    }
    for s in &strings {
        row.extend_from_slice(s);
    }
    row
}

/// Artist row, near (1-byte offset) form.
pub(crate) fn artist_row(id: u32, name: &str) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&0x0060u16.to_le_bytes());
    row.extend_from_slice(&0u16.to_le_bytes());
    row.extend_from_slice(&id.to_le_bytes());
    row.push(0x03);
    row.push(10); // header is 10 bytes, name follows
    row.extend_from_slice(&encode_string(name));
    row
}

/// Artist row, far (2-byte offset) form.
pub(crate) fn artist_row_far(id: u32, name: &str) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&0x0064u16.to_le_bytes());
    row.extend_from_slice(&0u16.to_le_bytes());
    row.extend_from_slice(&id.to_le_bytes());
    row.push(0x03);
    row.push(0);
    row.extend_from_slice(&12u16.to_le_bytes());
    row.extend_from_slice(&encode_string(name));
    row
}

pub(crate) fn album_row(id: u32, artist_id: u32, name: &str) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&0x0080u16.to_le_bytes());
    row.extend_from_slice(&0u16.to_le_bytes());
    row.extend_from_slice(&0u32.to_le_bytes());
    row.extend_from_slice(&artist_id.to_le_bytes());
    row.extend_from_slice(&id.to_le_bytes());
    row.extend_from_slice(&0u32.to_le_bytes());
    row.push(0x03);
    row.push(22);
    row.extend_from_slice(&encode_string(name));
    row
}

pub(crate) fn genre_row(id: u32, name: &str) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&id.to_le_bytes());
    row.extend_from_slice(&encode_string(name));
    row
}

pub(crate) fn label_row(id: u32, name: &str) -> Vec<u8> {
    genre_row(id, name)
}

pub(crate) fn key_row(id: u32, name: &str) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&id.to_le_bytes());
    row.extend_from_slice(&id.to_le_bytes());
    row.extend_from_slice(&encode_string(name));
    row
}

pub(crate) fn color_row(id: u16, name: &str) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&[0u8; 5]);
    row.extend_from_slice(&id.to_le_bytes());
    row.push(0);
    row.extend_from_slice(&encode_string(name));
    row
}

pub(crate) fn artwork_row(id: u32, path: &str) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&id.to_le_bytes());
    row.extend_from_slice(&encode_string(path));
    row
}

pub(crate) fn playlist_tree_row(
    id: u32,
    parent_id: u32,
    sort_order: u32,
    is_folder: bool,
    name: &str,
) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&parent_id.to_le_bytes());
    row.extend_from_slice(&0u32.to_le_bytes());
    row.extend_from_slice(&sort_order.to_le_bytes());
    row.extend_from_slice(&id.to_le_bytes());
    row.extend_from_slice(&u32::from(is_folder).to_le_bytes());
    row.extend_from_slice(&encode_string(name));
    row
}

pub(crate) fn playlist_entry_row(playlist_id: u32, entry_index: u32, track_id: u32) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&entry_index.to_le_bytes());
    row.extend_from_slice(&track_id.to_le_bytes());
    row.extend_from_slice(&playlist_id.to_le_bytes());
    row
}

pub(crate) fn history_playlist_row(id: u32, name: &str) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&id.to_le_bytes());
    row.extend_from_slice(&encode_string(name));
    row
}

pub(crate) fn history_entry_row(playlist_id: u32, entry_index: u32, track_id: u32) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&track_id.to_le_bytes());
    row.extend_from_slice(&playlist_id.to_le_bytes());
    row.extend_from_slice(&entry_index.to_le_bytes());
    row
}

pub(crate) fn tag_row(
    id: u32,
    category_id: u32,
    category_pos: u32,
    is_category: bool,
    name: &str,
) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&0u16.to_le_bytes()); // subtype
    row.extend_from_slice(&0u16.to_le_bytes()); // index_shift
    row.extend_from_slice(&id.to_le_bytes());
    row.extend_from_slice(&category_id.to_le_bytes());
    row.extend_from_slice(&category_pos.to_le_bytes());
    row.extend_from_slice(&u32::from(is_category).to_le_bytes());
    row.extend_from_slice(&encode_string(name));
    row
}

pub(crate) fn tag_track_row(tag_id: u32, track_id: u32) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&tag_id.to_le_bytes());
    row.extend_from_slice(&track_id.to_le_bytes());
    row
}

/// Assemble an analysis-file section: fourcc, len_header, len_tag, the rest
/// of the header, then the body. `len_header` covers the 12-byte prefix plus
/// `header_rest`.
pub(crate) fn tag(fourcc: &[u8; 4], header_rest: &[u8], body: &[u8]) -> Vec<u8> {
    let len_header = 12 + header_rest.len() as u32;
    let len_tag = len_header + body.len() as u32;
    let mut out = Vec::with_capacity(len_tag as usize);
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&len_header.to_be_bytes());
    out.extend_from_slice(&len_tag.to_be_bytes());
    out.extend_from_slice(header_rest);
    out.extend_from_slice(body);
    out
}

/// Assemble a whole ANLZ file: PMAI envelope plus the given sections.
pub(crate) fn anlz_file(sections: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PMAI");
    out.extend_from_slice(&0x1Cu32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // len_file patched below
    out.extend_from_slice(&[0u8; 16]);
    for section in sections {
        out.extend_from_slice(section);
    }
    let len_file = out.len() as u32;
    out[8..12].copy_from_slice(&len_file.to_be_bytes());
    out
}

/// UTF-16BE bytes with the 2-byte terminator, as analysis strings are
/// stored.
pub(crate) fn utf16_be(text: &str) -> Vec<u8> {
    let mut out: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
    out.extend_from_slice(&[0, 0]);
    out
}
