//! Song structure (`PSSI`) codec
//!
//! Version-6 library exports obfuscate the phrase tag: every byte after the
//! 2-byte entry count is XOR-masked with a 19-byte key derived by adding
//! the entry count (mod 256) to a fixed base pattern. Files sourced from
//! the shared library folder are not masked; callers opt out of unmasking
//! through [`crate::anlz::AnlzOptions`].
//!
//! The phrase labels shown to users are a function of the tag's mood, the
//! phrase kind and three flag bytes, via the published translation table.
//! Raw values are always preserved; label resolution is nullable and never
//! fails, since banks and kinds outside the documented range occur in the
//! wild (0xf3 and 0xf9 banks have been observed).

use std::io::Cursor;

use binrw::BinRead;
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::source::ByteSource;

/// Base XOR pattern; each byte is offset by the entry count before use.
const MASK: [u8; 19] = [
    0xCB, 0xE1, 0xEE, 0xFA, 0xE5, 0xEE, 0xAD, 0xEE, 0xE9, 0xD2, 0xE9, 0xEB, 0xE1, 0xE9, 0xF3,
    0xE8, 0xE9, 0xF4, 0xE1,
];

/// XOR a masked song-structure body in place. The operation is its own
/// inverse.
pub fn unmask(body: &mut [u8], len_entries: u16) {
    for (i, byte) in body.iter_mut().enumerate() {
        *byte ^= MASK[i % MASK.len()].wrapping_add(len_entries as u8);
    }
}

/// Overall energy profile of the analyzed track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mood {
    High,
    Mid,
    Low,
}

impl Mood {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Mood::High),
            2 => Some(Mood::Mid),
            3 => Some(Mood::Low),
            _ => None,
        }
    }
}

/// Stylistic bank assigned to the track's phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bank {
    Default,
    Cool,
    Natural,
    Hot,
    Subtle,
    Warm,
    Vivid,
    Club1,
    Club2,
}

impl Bank {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Bank::Default),
            1 => Some(Bank::Cool),
            2 => Some(Bank::Natural),
            3 => Some(Bank::Hot),
            4 => Some(Bank::Subtle),
            5 => Some(Bank::Warm),
            6 => Some(Bank::Vivid),
            7 => Some(Bank::Club1),
            8 => Some(Bank::Club2),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Bank::Default => "Default",
            Bank::Cool => "Cool",
            Bank::Natural => "Natural",
            Bank::Hot => "Hot",
            Bank::Subtle => "Subtle",
            Bank::Warm => "Warm",
            Bank::Vivid => "Vivid",
            Bank::Club1 => "Club 1",
            Bank::Club2 => "Club 2",
        }
    }
}

/// On-disk phrase entry, 24 bytes big-endian.
#[derive(BinRead, Debug)]
#[br(big)]
struct RawPhrase {
    index: u16,
    start_beat: u16,
    kind: u16,
    #[allow(dead_code)]
    unknown1: u8,
    k1: u8,
    #[allow(dead_code)]
    unknown2: u8,
    k2: u8,
    #[allow(dead_code)]
    unknown3: u8,
    b: u8,
    beat2: u16,
    beat3: u16,
    beat4: u16,
    #[allow(dead_code)]
    unknown4: u8,
    k3: u8,
    #[allow(dead_code)]
    unknown5: u8,
    fill: u8,
    beat_fill: u16,
}

/// One phrase of the song structure.
#[derive(Debug, Clone, Serialize)]
pub struct Phrase {
    /// 1-based position in the phrase list.
    pub index: u16,
    pub start_beat: u16,
    pub raw_kind: u16,
    pub k1: u8,
    pub k2: u8,
    pub k3: u8,
    /// Variant selector used by "up" phrases.
    pub b: u8,
    pub beat2: u16,
    pub beat3: u16,
    pub beat4: u16,
    /// Non-zero when the phrase ends in a fill-in.
    pub fill: u8,
    /// Beat at which the fill-in starts.
    pub beat_fill: u16,
    /// Human-readable label from the published translation table, when the
    /// mood/kind combination is documented.
    pub label: Option<&'static str>,
}

/// Decoded `PSSI` tag.
#[derive(Debug, Clone, Serialize)]
pub struct SongStructure {
    pub len_entry_bytes: u32,
    pub len_entries: u16,
    pub raw_mood: u16,
    pub mood: Option<Mood>,
    /// Beat number where the last phrase ends.
    pub end_beat: u16,
    pub raw_bank: u8,
    pub bank: Option<Bank>,
    pub phrases: Vec<Phrase>,
}

/// Resolve the display label of a phrase. High-mood tracks qualify their
/// phrases through the flag bytes; mid and low moods map the kind directly,
/// with the low mood folding kinds 2-4 and 5-7 into two verses.
pub fn phrase_label(mood: Mood, kind: u16, k1: u8, k2: u8, k3: u8) -> Option<&'static str> {
    match mood {
        Mood::High => match (kind, k1, k2, k3) {
            (1, 1, _, _) => Some("Intro 1"),
            (1, 0, _, _) => Some("Intro 2"),
            (2, 0, 0, 0) => Some("Up 1"),
            (2, 0, 0, 1) => Some("Up 2"),
            (2, 0, 1, 0) => Some("Up 3"),
            (3, ..) => Some("Down"),
            (5, 1, _, _) => Some("Chorus 1"),
            (5, 0, _, _) => Some("Chorus 2"),
            (6, 1, _, _) => Some("Outro 1"),
            (6, 0, _, _) => Some("Outro 2"),
            _ => None,
        },
        Mood::Mid => match kind {
            1 => Some("Intro"),
            2 => Some("Verse 1"),
            3 => Some("Verse 2"),
            4 => Some("Verse 3"),
            5 => Some("Verse 4"),
            6 => Some("Verse 5"),
            7 => Some("Verse 6"),
            8 => Some("Bridge"),
            9 => Some("Chorus"),
            10 => Some("Outro"),
            _ => None,
        },
        Mood::Low => match kind {
            1 => Some("Intro"),
            2..=4 => Some("Verse 1"),
            5..=7 => Some("Verse 2"),
            8 => Some("Bridge"),
            9 => Some("Chorus"),
            10 => Some("Outro"),
            _ => None,
        },
    }
}

/// Decode a `PSSI` section. `view` spans the whole tag, fourcc included.
pub(crate) fn decode(view: &ByteSource, unmasked: bool) -> Result<SongStructure> {
    let tag_err = |reason: String| Error::malformed_tag(*b"PSSI", 0, reason);

    if view.len() < 32 {
        return Err(tag_err(format!(
            "{} bytes cannot hold a song structure header",
            view.len()
        )));
    }

    let len_entry_bytes = view.read_u32_be(12)?;
    let len_entries = view.read_u16_be(16)?;

    if len_entry_bytes < 24 {
        return Err(tag_err(format!("phrase entry size {len_entry_bytes} too small")));
    }

    // Everything after the entry count is masked in rekordbox 6 exports.
    let mut body = view.read_bytes(18, view.len() - 18)?.to_vec();
    if !unmasked {
        unmask(&mut body, len_entries);
    }

    let needed = 14 + len_entries as u64 * len_entry_bytes as u64;
    if (body.len() as u64) < needed {
        return Err(tag_err(format!(
            "{len_entries} phrases need {needed} bytes, section holds {}",
            body.len()
        )));
    }

    let raw_mood = u16::from_be_bytes([body[0], body[1]]);
    let mood = Mood::from_raw(raw_mood);
    if mood.is_none() {
        warn!(raw_mood, "unrecognized song structure mood");
    }
    let end_beat = u16::from_be_bytes([body[8], body[9]]);
    let raw_bank = body[12];
    let bank = Bank::from_raw(raw_bank);

    let mut phrases = Vec::with_capacity(len_entries as usize);
    for i in 0..len_entries as usize {
        let start = 14 + i * len_entry_bytes as usize;
        let mut cursor = Cursor::new(&body[start..start + len_entry_bytes as usize]);
        let raw = RawPhrase::read(&mut cursor).map_err(|e| tag_err(e.to_string()))?;
        let label = mood.and_then(|m| phrase_label(m, raw.kind, raw.k1, raw.k2, raw.k3));
        phrases.push(Phrase {
            index: raw.index,
            start_beat: raw.start_beat,
            raw_kind: raw.kind,
            k1: raw.k1,
            k2: raw.k2,
            k3: raw.k3,
            b: raw.b,
            beat2: raw.beat2,
            beat3: raw.beat3,
            beat4: raw.beat4,
            fill: raw.fill,
            beat_fill: raw.beat_fill,
            label,
        });
    }

    Ok(SongStructure {
        len_entry_bytes,
        len_entries,
        raw_mood,
        mood,
        end_beat,
        raw_bank,
        bank,
        phrases,
    })
}
