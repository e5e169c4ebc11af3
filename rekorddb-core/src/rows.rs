//! Row decoders for the DeviceSQL tables
//!
//! One decoder per table type, each documented by field offset within the
//! row payload. Strings live in the page heap and are addressed relative to
//! the row start, either by a fixed offset byte (artists, albums) or by the
//! 2-byte slot table at the head of track rows. A string offset that runs
//! outside the page decodes to the empty string with a warning; the fixed
//! fields running outside the page is a malformed row.
//!
//! Reference: https://djl-analysis.deepsymmetry.org/rekordbox-export-analysis/exports.html

use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::pdb::{RowRef, TableKind};
use crate::string;

/// Bounds-checked field reads relative to a row's start.
struct Fields<'a> {
    row: &'a RowRef,
}

impl<'a> Fields<'a> {
    fn new(row: &'a RowRef) -> Self {
        Self { row }
    }

    fn abs(&self, at: u64) -> u64 {
        self.row.offset + at
    }

    fn u8(&self, at: u64) -> Result<u8> {
        self.row
            .page
            .read_u8(self.abs(at))
            .map_err(|_| Error::malformed_row(self.abs(at), "fixed field extends past page end"))
    }

    fn u16(&self, at: u64) -> Result<u16> {
        self.row
            .page
            .read_u16_le(self.abs(at))
            .map_err(|_| Error::malformed_row(self.abs(at), "fixed field extends past page end"))
    }

    fn u32(&self, at: u64) -> Result<u32> {
        self.row
            .page
            .read_u32_le(self.abs(at))
            .map_err(|_| Error::malformed_row(self.abs(at), "fixed field extends past page end"))
    }

    fn id(&self, at: u64) -> Result<u64> {
        Ok(self.u32(at)? as u64)
    }

    /// Decode the DeviceSQL string at row-relative offset `at`. Anything
    /// that would leave the page yields an empty string, not an error.
    fn string(&self, at: u64) -> String {
        match string::decode(&self.row.page, self.abs(at)) {
            Ok(decoded) => decoded.text,
            Err(_) => {
                warn!(
                    offset = self.abs(at),
                    "string offset points outside its page, substituting empty string"
                );
                String::new()
            }
        }
    }
}

/// A track row. The fixed block occupies 0x5E bytes, followed by 21 string
/// slot offsets; foreign keys of zero mean "no reference".
#[derive(Debug, Clone, Serialize)]
pub struct TrackRow {
    pub id: u64,
    pub index_shift: u16,
    pub bitmask: u32,
    pub sample_rate: u32,
    pub composer_id: u64,
    pub file_size: u32,
    pub artwork_id: u64,
    pub key_id: u64,
    pub original_artist_id: u64,
    pub label_id: u64,
    pub remixer_id: u64,
    pub bitrate: u32,
    pub track_number: u32,
    /// BPM × 100
    pub tempo: u32,
    pub genre_id: u64,
    pub album_id: u64,
    pub artist_id: u64,
    pub disc_number: u16,
    pub play_count: u16,
    pub year: u16,
    pub sample_depth: u16,
    /// Seconds
    pub duration: u16,
    pub color_id: u64,
    pub rating: u8,
    pub isrc: String,
    pub texter: String,
    pub message: String,
    pub kuvo_public: String,
    pub autoload_hot_cues: String,
    pub date_added: String,
    pub release_date: String,
    pub mix_name: String,
    pub analyze_path: String,
    pub analyze_date: String,
    pub comment: String,
    pub title: String,
    pub filename: String,
    pub file_path: String,
    /// Slots with no known meaning (2, 3, 4, 8, 9, 13, 18), retained but
    /// never indexed.
    pub unknown_strings: Vec<String>,
}

impl TrackRow {
    pub fn decode(row: &RowRef) -> Result<TrackRow> {
        let f = Fields::new(row);

        // 21 string slots at 0x5E, each a u16 offset from the row start.
        let mut slots = [0u64; 21];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = f.u16(0x5E + 2 * i as u64)? as u64;
        }
        let slot_string = |i: usize| -> String {
            if slots[i] == 0 {
                String::new()
            } else {
                f.string(slots[i])
            }
        };

        Ok(TrackRow {
            index_shift: f.u16(0x02)?,
            bitmask: f.u32(0x04)?,
            sample_rate: f.u32(0x08)?,
            composer_id: f.id(0x0C)?,
            file_size: f.u32(0x10)?,
            artwork_id: f.id(0x1C)?,
            key_id: f.id(0x20)?,
            original_artist_id: f.id(0x24)?,
            label_id: f.id(0x28)?,
            remixer_id: f.id(0x2C)?,
            bitrate: f.u32(0x30)?,
            track_number: f.u32(0x34)?,
            tempo: f.u32(0x38)?,
            genre_id: f.id(0x3C)?,
            album_id: f.id(0x40)?,
            artist_id: f.id(0x44)?,
            id: f.id(0x48)?,
            disc_number: f.u16(0x4C)?,
            play_count: f.u16(0x4E)?,
            year: f.u16(0x50)?,
            sample_depth: f.u16(0x52)?,
            duration: f.u16(0x54)?,
            color_id: f.u8(0x58)? as u64,
            rating: f.u8(0x59)?,
            isrc: slot_string(0),
            texter: slot_string(1),
            message: slot_string(5),
            kuvo_public: slot_string(6),
            autoload_hot_cues: slot_string(7),
            date_added: slot_string(10),
            release_date: slot_string(11),
            mix_name: slot_string(12),
            analyze_path: slot_string(14),
            analyze_date: slot_string(15),
            comment: slot_string(16),
            title: slot_string(17),
            filename: slot_string(19),
            file_path: slot_string(20),
            unknown_strings: [2, 3, 4, 8, 9, 13, 18]
                .iter()
                .map(|&i| slot_string(i))
                .collect(),
        })
    }

    /// Tempo in beats per minute.
    pub fn tempo_bpm(&self) -> f64 {
        self.tempo as f64 / 100.0
    }

    /// Every artist-role foreign key on this row, zeroes included.
    pub fn artist_role_ids(&self) -> [u64; 4] {
        [
            self.artist_id,
            self.composer_id,
            self.original_artist_id,
            self.remixer_id,
        ]
    }
}

/// Subtype word of the two-form rows: 0x60/0x80 keep a one-byte name
/// offset, 0x64/0x84 a two-byte one.
const SUBTYPE_FAR_BIT: u16 = 0x0004;

#[derive(Debug, Clone, Serialize)]
pub struct ArtistRow {
    pub id: u64,
    pub subtype: u16,
    pub index_shift: u16,
    pub name: String,
}

impl ArtistRow {
    pub fn decode(row: &RowRef) -> Result<ArtistRow> {
        let f = Fields::new(row);
        let subtype = f.u16(0x00)?;
        let ofs_name = if subtype & SUBTYPE_FAR_BIT != 0 {
            f.u16(0x0A)? as u64
        } else {
            f.u8(0x09)? as u64
        };
        Ok(ArtistRow {
            subtype,
            index_shift: f.u16(0x02)?,
            id: f.id(0x04)?,
            name: f.string(ofs_name),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlbumRow {
    pub id: u64,
    pub subtype: u16,
    pub index_shift: u16,
    pub artist_id: u64,
    pub name: String,
}

impl AlbumRow {
    pub fn decode(row: &RowRef) -> Result<AlbumRow> {
        let f = Fields::new(row);
        let subtype = f.u16(0x00)?;
        let ofs_name = if subtype & SUBTYPE_FAR_BIT != 0 {
            f.u16(0x16)? as u64
        } else {
            f.u8(0x15)? as u64
        };
        Ok(AlbumRow {
            subtype,
            index_shift: f.u16(0x02)?,
            artist_id: f.id(0x08)?,
            id: f.id(0x0C)?,
            name: f.string(ofs_name),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelRow {
    pub id: u64,
    pub name: String,
}

impl LabelRow {
    pub fn decode(row: &RowRef) -> Result<LabelRow> {
        let f = Fields::new(row);
        Ok(LabelRow {
            id: f.id(0x00)?,
            name: f.string(0x04),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenreRow {
    pub id: u64,
    pub name: String,
}

impl GenreRow {
    pub fn decode(row: &RowRef) -> Result<GenreRow> {
        let f = Fields::new(row);
        Ok(GenreRow {
            id: f.id(0x00)?,
            name: f.string(0x04),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyRow {
    pub id: u64,
    pub id2: u64,
    pub name: String,
}

impl KeyRow {
    pub fn decode(row: &RowRef) -> Result<KeyRow> {
        let f = Fields::new(row);
        Ok(KeyRow {
            id: f.id(0x00)?,
            id2: f.id(0x04)?,
            name: f.string(0x08),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColorRow {
    pub id: u64,
    pub name: String,
}

impl ColorRow {
    pub fn decode(row: &RowRef) -> Result<ColorRow> {
        let f = Fields::new(row);
        Ok(ColorRow {
            // Color IDs are 16-bit, after a 5-byte unknown block.
            id: f.u16(0x05)? as u64,
            name: f.string(0x08),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtworkRow {
    pub id: u64,
    pub path: String,
}

impl ArtworkRow {
    pub fn decode(row: &RowRef) -> Result<ArtworkRow> {
        let f = Fields::new(row);
        Ok(ArtworkRow {
            id: f.id(0x00)?,
            path: f.string(0x04),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistEntryRow {
    pub playlist_id: u64,
    pub entry_index: u32,
    pub track_id: u64,
}

impl PlaylistEntryRow {
    pub fn decode(row: &RowRef) -> Result<PlaylistEntryRow> {
        let f = Fields::new(row);
        Ok(PlaylistEntryRow {
            entry_index: f.u32(0x00)?,
            track_id: f.id(0x04)?,
            playlist_id: f.id(0x08)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistTreeRow {
    pub id: u64,
    pub parent_id: u64,
    pub sort_order: u32,
    pub is_folder: bool,
    pub name: String,
}

impl PlaylistTreeRow {
    pub fn decode(row: &RowRef) -> Result<PlaylistTreeRow> {
        let f = Fields::new(row);
        Ok(PlaylistTreeRow {
            parent_id: f.id(0x00)?,
            sort_order: f.u32(0x08)?,
            id: f.id(0x0C)?,
            is_folder: f.u32(0x10)? != 0,
            name: f.string(0x14),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPlaylistRow {
    pub id: u64,
    pub name: String,
}

impl HistoryPlaylistRow {
    pub fn decode(row: &RowRef) -> Result<HistoryPlaylistRow> {
        let f = Fields::new(row);
        Ok(HistoryPlaylistRow {
            id: f.id(0x00)?,
            name: f.string(0x04),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntryRow {
    pub playlist_id: u64,
    pub entry_index: u32,
    pub track_id: u64,
}

impl HistoryEntryRow {
    pub fn decode(row: &RowRef) -> Result<HistoryEntryRow> {
        let f = Fields::new(row);
        Ok(HistoryEntryRow {
            track_id: f.id(0x00)?,
            playlist_id: f.id(0x04)?,
            entry_index: f.u32(0x08)?,
        })
    }
}

/// A tag row from `exportExt.pdb`. Rows with `is_category` set are the
/// category headers; the rest are tags positioned within their category.
#[derive(Debug, Clone, Serialize)]
pub struct TagRow {
    pub id: u64,
    pub category_id: u64,
    pub category_pos: u32,
    pub is_category: bool,
    pub name: String,
}

impl TagRow {
    pub fn decode(row: &RowRef) -> Result<TagRow> {
        let f = Fields::new(row);
        Ok(TagRow {
            id: f.id(0x04)?,
            category_id: f.id(0x08)?,
            category_pos: f.u32(0x0C)?,
            is_category: f.u32(0x10)? != 0,
            name: f.string(0x14),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TagTrackRow {
    pub tag_id: u64,
    pub track_id: u64,
}

impl TagTrackRow {
    pub fn decode(row: &RowRef) -> Result<TagTrackRow> {
        let f = Fields::new(row);
        Ok(TagTrackRow {
            tag_id: f.id(0x00)?,
            track_id: f.id(0x04)?,
        })
    }
}

/// A decoded row of any known table type.
#[derive(Debug, Clone, Serialize)]
pub enum Row {
    Track(TrackRow),
    Artist(ArtistRow),
    Album(AlbumRow),
    Label(LabelRow),
    Genre(GenreRow),
    Key(KeyRow),
    Color(ColorRow),
    Artwork(ArtworkRow),
    PlaylistEntry(PlaylistEntryRow),
    PlaylistTree(PlaylistTreeRow),
    HistoryPlaylist(HistoryPlaylistRow),
    HistoryEntry(HistoryEntryRow),
    Tag(TagRow),
    TagTrack(TagTrackRow),
    /// Tables whose row layout is undocumented (columns, history).
    Opaque,
}

/// Decode a raw row according to its table's kind.
pub fn decode_row(kind: TableKind, row: &RowRef) -> Result<Row> {
    Ok(match kind {
        TableKind::Tracks => Row::Track(TrackRow::decode(row)?),
        TableKind::Artists => Row::Artist(ArtistRow::decode(row)?),
        TableKind::Albums => Row::Album(AlbumRow::decode(row)?),
        TableKind::Labels => Row::Label(LabelRow::decode(row)?),
        TableKind::Genres => Row::Genre(GenreRow::decode(row)?),
        TableKind::Keys => Row::Key(KeyRow::decode(row)?),
        TableKind::Colors => Row::Color(ColorRow::decode(row)?),
        TableKind::Artwork => Row::Artwork(ArtworkRow::decode(row)?),
        TableKind::PlaylistEntries => Row::PlaylistEntry(PlaylistEntryRow::decode(row)?),
        TableKind::PlaylistTree => Row::PlaylistTree(PlaylistTreeRow::decode(row)?),
        TableKind::HistoryPlaylists => Row::HistoryPlaylist(HistoryPlaylistRow::decode(row)?),
        TableKind::HistoryEntries => Row::HistoryEntry(HistoryEntryRow::decode(row)?),
        TableKind::Tags => Row::Tag(TagRow::decode(row)?),
        TableKind::TagTracks => Row::TagTrack(TagTrackRow::decode(row)?),
        TableKind::Columns | TableKind::History => Row::Opaque,
    })
}
