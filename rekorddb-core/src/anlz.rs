//! ANLZ analysis file parsing (.DAT, .EXT, .2EX)
//!
//! ANLZ files are big-endian and contain tagged sections after a `PMAI`
//! envelope header: beat grids, cue lists, the source audio path, several
//! waveform renditions, and the song-structure tag. Every section starts
//! with a fourcc, a header length and a total length, so unrecognized tags
//! can be skipped by advancing `len_tag` bytes.
//!
//! Reference: https://djl-analysis.deepsymmetry.org/rekordbox-export-analysis/anlz.html

use std::io::Cursor;

use binrw::BinRead;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::phrase::{self, SongStructure};
use crate::source::ByteSource;

pub type FourCC = [u8; 4];

pub const PMAI: FourCC = *b"PMAI";
pub const PQTZ: FourCC = *b"PQTZ";
pub const PCOB: FourCC = *b"PCOB";
pub const PCO2: FourCC = *b"PCO2";
pub const PPTH: FourCC = *b"PPTH";
pub const PVBR: FourCC = *b"PVBR";
pub const PWAV: FourCC = *b"PWAV";
pub const PWV2: FourCC = *b"PWV2";
pub const PWV3: FourCC = *b"PWV3";
pub const PWV4: FourCC = *b"PWV4";
pub const PWV5: FourCC = *b"PWV5";
pub const PWV6: FourCC = *b"PWV6";
pub const PWV7: FourCC = *b"PWV7";
pub const PSSI: FourCC = *b"PSSI";

/// Construction options for [`AnlzFile`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnlzOptions {
    /// Song-structure tags in files from the shared library folder are not
    /// XOR-masked; set this to skip the unmasking pass.
    pub unmasked_phrases: bool,
}

/// One beat of the beat grid.
#[derive(BinRead, Debug, Clone, Copy, Serialize)]
#[br(big)]
pub struct Beat {
    /// Position within its bar, 1 through 4.
    pub beat_number: u16,
    /// BPM × 100 at this beat.
    pub tempo: u16,
    /// Milliseconds from the start of the track.
    pub time: u32,
}

/// Decoded `PQTZ` tag.
#[derive(Debug, Clone, Serialize)]
pub struct BeatGrid {
    pub unknown1: u32,
    pub unknown2: u32,
    pub beats: Vec<Beat>,
}

/// Which list a `PCOB` tag holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CueListType {
    MemoryCues,
    HotCues,
    Unknown(u32),
}

impl CueListType {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => CueListType::MemoryCues,
            1 => CueListType::HotCues,
            other => CueListType::Unknown(other),
        }
    }
}

/// Cue entry kind: a plain point or a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CueKind {
    Point,
    Loop,
    Unknown(u8),
}

impl CueKind {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => CueKind::Point,
            2 => CueKind::Loop,
            other => CueKind::Unknown(other),
        }
    }
}

/// A legacy (`PCPT`) cue entry.
#[derive(Debug, Clone, Serialize)]
pub struct Cue {
    /// 0 for a memory cue, otherwise the hot cue number (1 = A).
    pub hot_cue: u32,
    /// 0 normal, 4 active loop.
    pub status: u32,
    pub order_first: u16,
    pub order_last: u16,
    pub kind: CueKind,
    pub time: u32,
    pub loop_time: u32,
}

/// Decoded `PCOB` tag.
#[derive(Debug, Clone, Serialize)]
pub struct CueList {
    pub list_type: CueListType,
    /// Retained but unused; purpose unknown.
    pub memory_count: u32,
    pub cues: Vec<Cue>,
}

/// Hot cue color assignment from an extended cue entry.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HotCueColor {
    /// Palette code used by the player UI.
    pub code: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// An extended (`PCP2`) cue entry. Entries may be truncated before any of
/// the optional fields; everything after `time` can be absent.
#[derive(Debug, Clone, Serialize)]
pub struct ExtendedCue {
    pub hot_cue: u32,
    pub kind: CueKind,
    pub time: u32,
    pub loop_time: Option<u32>,
    pub color_id: Option<u8>,
    pub loop_numerator: Option<u16>,
    pub loop_denominator: Option<u16>,
    pub comment: Option<String>,
    pub color: Option<HotCueColor>,
}

/// Decoded `PCO2` tag.
#[derive(Debug, Clone, Serialize)]
pub struct ExtendedCueList {
    pub list_type: CueListType,
    pub cues: Vec<ExtendedCue>,
}

/// Decoded `PPTH` tag.
#[derive(Debug, Clone, Serialize)]
pub struct PathTag {
    pub path: String,
}

/// Decoded `PVBR` tag. The seek index is opaque; the payload is preserved
/// for later investigation.
#[derive(Debug, Clone, Serialize)]
pub struct VbrIndex {
    pub data: Vec<u8>,
}

/// One column of the monochrome previews: low 5 bits height, high 3 bits
/// whiteness.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WaveColumn {
    pub height: u8,
    pub whiteness: u8,
}

impl WaveColumn {
    fn from_byte(byte: u8) -> Self {
        Self {
            height: byte & 0x1F,
            whiteness: (byte >> 5) & 0x07,
        }
    }

    /// The tiny (`PWV2`) preview keeps only a 4-bit height.
    fn from_tiny_byte(byte: u8) -> Self {
        Self {
            height: byte & 0x0F,
            whiteness: 0,
        }
    }
}

/// Decoded `PWAV`/`PWV2` tag.
#[derive(Debug, Clone, Serialize)]
pub struct WavePreview {
    pub unknown: u32,
    pub columns: Vec<WaveColumn>,
}

/// Decoded `PWV3` tag: PWAV-coded columns at detail resolution.
#[derive(Debug, Clone, Serialize)]
pub struct WaveDetail {
    pub unknown: u32,
    pub columns: Vec<WaveColumn>,
}

/// One 6-byte column of the color preview (`PWV4`): seven-bit height,
/// luminance and four color channels. Raw bytes are preserved alongside.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WaveColorPreviewColumn {
    pub height: u8,
    pub luminance: u8,
    pub blue: u8,
    pub red: u8,
    pub green: u8,
    pub blue2: u8,
    pub raw: [u8; 6],
}

impl WaveColorPreviewColumn {
    fn from_bytes(bytes: [u8; 6]) -> Self {
        Self {
            height: bytes[0] & 0x7F,
            luminance: bytes[1] & 0x7F,
            blue: bytes[2] & 0x7F,
            red: bytes[3] & 0x7F,
            green: bytes[4] & 0x7F,
            blue2: bytes[5] & 0x7F,
            raw: bytes,
        }
    }
}

/// Decoded `PWV4` tag.
#[derive(Debug, Clone, Serialize)]
pub struct WaveColorPreview {
    pub unknown: u32,
    pub columns: Vec<WaveColorPreviewColumn>,
}

/// One 2-byte column of the color detail waveform (`PWV5`), big-endian:
/// red(3) | green(3) | blue(3) | height(5) | unused(2).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WaveColorDetailColumn {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub height: u8,
}

impl WaveColorDetailColumn {
    fn from_raw(value: u16) -> Self {
        Self {
            red: ((value >> 13) & 0x07) as u8,
            green: ((value >> 10) & 0x07) as u8,
            blue: ((value >> 7) & 0x07) as u8,
            height: ((value >> 2) & 0x1F) as u8,
        }
    }
}

/// Decoded `PWV5` tag.
#[derive(Debug, Clone, Serialize)]
pub struct WaveColorDetail {
    pub unknown: u32,
    pub columns: Vec<WaveColorDetailColumn>,
}

/// One 3-byte column of the three-band waveforms (`PWV6`/`PWV7`).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ThreeBandColumn {
    pub mid: u8,
    pub high: u8,
    pub low: u8,
}

/// Decoded `PWV6`/`PWV7` tag.
#[derive(Debug, Clone, Serialize)]
pub struct WaveThreeBand {
    pub unknown: Option<u32>,
    pub columns: Vec<ThreeBandColumn>,
}

/// Typed contents of a section.
#[derive(Debug, Clone, Serialize)]
pub enum SectionContent {
    BeatGrid(BeatGrid),
    CueList(CueList),
    ExtendedCueList(ExtendedCueList),
    Path(PathTag),
    VbrIndex(VbrIndex),
    WavePreview(WavePreview),
    TinyWavePreview(WavePreview),
    WaveDetail(WaveDetail),
    WaveColorPreview(WaveColorPreview),
    WaveColorDetail(WaveColorDetail),
    WaveThreeBandPreview(WaveThreeBand),
    WaveThreeBandDetail(WaveThreeBand),
    SongStructure(SongStructure),
    /// A fourcc this library does not recognize; skipped over.
    Unknown,
}

/// A section yielded by [`AnlzFile::sections`].
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub fourcc: FourCC,
    /// Byte offset of the section within the file.
    pub offset: u64,
    pub len_header: u32,
    pub len_tag: u32,
    pub content: SectionContent,
}

impl Section {
    pub fn fourcc_str(&self) -> String {
        String::from_utf8_lossy(&self.fourcc).into_owned()
    }
}

/// An open analysis file.
#[derive(Debug)]
pub struct AnlzFile {
    source: ByteSource,
    len_header: u32,
    len_file: u32,
    options: AnlzOptions,
}

impl AnlzFile {
    /// Open an analysis file with default options.
    pub fn open(source: ByteSource) -> Result<Self> {
        Self::open_with(source, AnlzOptions::default())
    }

    /// Open an analysis file, verifying the `PMAI` envelope.
    pub fn open_with(source: ByteSource, options: AnlzOptions) -> Result<Self> {
        let magic = source.read_bytes(0, 4)?;
        if magic != PMAI {
            return Err(Error::bad_magic(0, &PMAI, magic));
        }
        let len_header = source.read_u32_be(4)?;
        let len_file = source.read_u32_be(8)?;
        if len_header < 12 {
            return Err(Error::malformed_tag(
                PMAI,
                0,
                format!("header length {len_header} too small"),
            ));
        }
        if len_file as u64 > source.len() {
            return Err(Error::malformed_tag(
                PMAI,
                0,
                format!(
                    "declared file length {len_file} exceeds actual {}",
                    source.len()
                ),
            ));
        }
        Ok(Self {
            source,
            len_header,
            len_file,
            options,
        })
    }

    pub fn len_header(&self) -> u32 {
        self.len_header
    }

    pub fn len_file(&self) -> u32 {
        self.len_file
    }

    /// Lazily walk the file's sections in order.
    pub fn sections(&self) -> Sections<'_> {
        Sections {
            file: self,
            offset: self.len_header as u64,
            done: false,
        }
    }

    /// Find the first section with the given fourcc.
    pub fn find(&self, fourcc: FourCC) -> Result<Option<Section>> {
        for section in self.sections() {
            let section = section?;
            if section.fourcc == fourcc {
                return Ok(Some(section));
            }
        }
        Ok(None)
    }
}

/// Iterator over the sections of an [`AnlzFile`].
pub struct Sections<'a> {
    file: &'a AnlzFile,
    offset: u64,
    done: bool,
}

impl Iterator for Sections<'_> {
    type Item = Result<Section>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let end = self.file.len_file as u64;
            let offset = self.offset;
            if offset >= end {
                return None;
            }

            let fatal = |e| {
                Some(Err(e))
            };

            if end - offset < 12 {
                self.done = true;
                return fatal(Error::malformed_tag(
                    *b"????",
                    offset,
                    format!("{} trailing bytes cannot hold a section", end - offset),
                ));
            }

            let header = match self.file.source.read_bytes(offset, 12) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.done = true;
                    return fatal(e);
                }
            };
            let fourcc: FourCC = [header[0], header[1], header[2], header[3]];
            let len_header =
                u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
            let len_tag =
                u32::from_be_bytes([header[8], header[9], header[10], header[11]]);

            if len_tag < 12 || len_tag as u64 > end - offset {
                self.done = true;
                return fatal(Error::malformed_tag(
                    fourcc,
                    offset,
                    format!("section length {len_tag} does not fit the file"),
                ));
            }
            self.offset = offset + len_tag as u64;

            if len_header > len_tag {
                // The section is well delimited, so only it is lost.
                warn!(
                    fourcc = %String::from_utf8_lossy(&fourcc),
                    offset,
                    len_header,
                    len_tag,
                    "section header longer than section, skipping"
                );
                continue;
            }

            let view = match self.file.source.sub(offset, len_tag as u64) {
                Ok(view) => view,
                Err(e) => {
                    self.done = true;
                    return fatal(e);
                }
            };
            return match decode_section(fourcc, len_header, len_tag, &view, self.file.options) {
                Ok(content) => Some(Ok(Section {
                    fourcc,
                    offset,
                    len_header,
                    len_tag,
                    content,
                })),
                Err(e) => {
                    self.done = true;
                    fatal(e)
                }
            };
        }
    }
}

fn decode_section(
    fourcc: FourCC,
    len_header: u32,
    len_tag: u32,
    view: &ByteSource,
    options: AnlzOptions,
) -> Result<SectionContent> {
    Ok(match &fourcc {
        b"PQTZ" => SectionContent::BeatGrid(decode_beat_grid(view)?),
        b"PCOB" => SectionContent::CueList(decode_cue_list(view)?),
        b"PCO2" => SectionContent::ExtendedCueList(decode_extended_cue_list(view)?),
        b"PPTH" => SectionContent::Path(decode_path(view)?),
        b"PVBR" => SectionContent::VbrIndex(VbrIndex {
            data: view.read_bytes(12, view.len() - 12)?.to_vec(),
        }),
        b"PWAV" => SectionContent::WavePreview(decode_wave_preview(view, len_header, len_tag, 400)?),
        b"PWV2" => {
            SectionContent::TinyWavePreview(decode_wave_preview(view, len_header, len_tag, 100)?)
        }
        b"PWV3" => SectionContent::WaveDetail(decode_wave_detail(view, len_header, len_tag)?),
        b"PWV4" => {
            SectionContent::WaveColorPreview(decode_wave_color_preview(view, len_header, len_tag)?)
        }
        b"PWV5" => {
            SectionContent::WaveColorDetail(decode_wave_color_detail(view, len_header, len_tag)?)
        }
        b"PWV6" => SectionContent::WaveThreeBandPreview(decode_three_band(
            view, len_header, len_tag, false,
        )?),
        b"PWV7" => {
            SectionContent::WaveThreeBandDetail(decode_three_band(view, len_header, len_tag, true)?)
        }
        b"PSSI" => {
            SectionContent::SongStructure(phrase::decode(view, options.unmasked_phrases)?)
        }
        _ => {
            debug!(
                fourcc = %String::from_utf8_lossy(&fourcc),
                "skipping unknown analysis tag"
            );
            SectionContent::Unknown
        }
    })
}

fn decode_beat_grid(view: &ByteSource) -> Result<BeatGrid> {
    let tag_err = |reason: String| Error::malformed_tag(PQTZ, 0, reason);

    let unknown1 = view.read_u32_be(12)?;
    let unknown2 = view.read_u32_be(16)?;
    let len_beats = view.read_u32_be(20)?;

    let bytes = view
        .read_bytes(24, len_beats as u64 * 8)
        .map_err(|_| tag_err(format!("{len_beats} beats do not fit the section")))?;
    let mut cursor = Cursor::new(bytes);
    let mut beats = Vec::with_capacity(len_beats as usize);
    for _ in 0..len_beats {
        let beat = Beat::read(&mut cursor).map_err(|e| tag_err(e.to_string()))?;
        beats.push(beat);
    }

    if beats.windows(2).any(|pair| pair[0].time > pair[1].time) {
        warn!("beat grid times are not monotonically non-decreasing");
    }

    Ok(BeatGrid {
        unknown1,
        unknown2,
        beats,
    })
}

/// Fixed fields of a `PCPT` entry, after the 12-byte entry prefix.
#[derive(BinRead, Debug)]
#[br(big)]
struct RawCue {
    hot_cue: u32,
    status: u32,
    #[allow(dead_code)]
    unknown1: u32,
    order_first: u16,
    order_last: u16,
    kind: u8,
    #[br(pad_before = 3)]
    time: u32,
    loop_time: u32,
}

fn decode_cue_list(view: &ByteSource) -> Result<CueList> {
    let list_type = CueListType::from_raw(view.read_u32_be(12)?);
    // Deliberately a 16-bit read: CDJ-3000 exports leave garbage in the two
    // bytes that follow, which older readers swallowed into a 32-bit count.
    let num_cues = view.read_u16_be(16)?;
    let memory_count = view.read_u32_be(20)?;

    let mut cues = Vec::with_capacity(num_cues as usize);
    let mut offset = 24u64;
    for i in 0..num_cues {
        let Ok(magic) = view.read_bytes(offset, 4) else {
            warn!(entry = i, "cue list ends before its declared count");
            break;
        };
        if magic != *b"PCPT" {
            warn!(entry = i, "cue entry lacks PCPT magic, abandoning list");
            break;
        }
        let len_entry = view.read_u32_be(offset + 8)?;
        if len_entry < 12 || offset + len_entry as u64 > view.len() {
            warn!(entry = i, len_entry, "cue entry length does not fit, abandoning list");
            break;
        }

        match view.read_bytes(offset + 12, (len_entry - 12).min(28) as u64) {
            Ok(bytes) if bytes.len() >= 28 => {
                let mut cursor = Cursor::new(bytes);
                match RawCue::read(&mut cursor) {
                    Ok(raw) => cues.push(Cue {
                        hot_cue: raw.hot_cue,
                        status: raw.status,
                        order_first: raw.order_first,
                        order_last: raw.order_last,
                        kind: CueKind::from_raw(raw.kind),
                        time: raw.time,
                        loop_time: raw.loop_time,
                    }),
                    Err(e) => warn!(entry = i, error = %e, "skipping malformed cue entry"),
                }
            }
            _ => warn!(entry = i, "skipping truncated cue entry"),
        }

        offset += len_entry as u64;
    }

    Ok(CueList {
        list_type,
        memory_count,
        cues,
    })
}

fn decode_extended_cue_list(view: &ByteSource) -> Result<ExtendedCueList> {
    let list_type = CueListType::from_raw(view.read_u32_be(12)?);
    let num_cues = view.read_u16_be(16)?;

    let mut cues = Vec::with_capacity(num_cues as usize);
    let mut offset = 20u64;
    for i in 0..num_cues {
        let Ok(magic) = view.read_bytes(offset, 4) else {
            warn!(entry = i, "extended cue list ends before its declared count");
            break;
        };
        if magic != *b"PCP2" {
            warn!(entry = i, "extended cue entry lacks PCP2 magic, abandoning list");
            break;
        }
        let len_entry = view.read_u32_be(offset + 8)?;
        if len_entry < 12 || offset + len_entry as u64 > view.len() {
            warn!(
                entry = i,
                len_entry, "extended cue entry length does not fit, abandoning list"
            );
            break;
        }

        match decode_extended_cue(view, offset, len_entry) {
            Some(cue) => cues.push(cue),
            None => warn!(entry = i, "skipping truncated extended cue entry"),
        }

        offset += len_entry as u64;
    }

    Ok(ExtendedCueList { list_type, cues })
}

/// Decode one `PCP2` entry. Entries shrink from the tail: everything after
/// `time` is optional and partial entries are accepted.
fn decode_extended_cue(view: &ByteSource, offset: u64, len_entry: u32) -> Option<ExtendedCue> {
    let entry = view.sub(offset, len_entry as u64).ok()?;
    let len = len_entry as u64;

    let hot_cue = entry.read_u32_be(12).ok()?;
    let kind = CueKind::from_raw(entry.read_u8(16).ok()?);
    let time = entry.read_u32_be(20).ok()?;

    let loop_time = (len >= 28).then(|| entry.read_u32_be(24).ok()).flatten();
    let color_id = (len >= 29).then(|| entry.read_u8(28).ok()).flatten();
    let loop_numerator = (len >= 38).then(|| entry.read_u16_be(36).ok()).flatten();
    let loop_denominator = (len >= 40).then(|| entry.read_u16_be(38).ok()).flatten();

    let mut comment = None;
    let mut color = None;
    if len >= 44 {
        let len_comment = entry.read_u32_be(40).ok()? as u64;
        if len_comment > 0 && 44 + len_comment <= len {
            let bytes = entry.read_bytes(44, len_comment).ok()?;
            comment = Some(utf16_be_string(bytes));
        }
        let color_at = 44 + len_comment;
        if color_at + 4 <= len {
            color = Some(HotCueColor {
                code: entry.read_u8(color_at).ok()?,
                red: entry.read_u8(color_at + 1).ok()?,
                green: entry.read_u8(color_at + 2).ok()?,
                blue: entry.read_u8(color_at + 3).ok()?,
            });
        }
    }

    Some(ExtendedCue {
        hot_cue,
        kind,
        time,
        loop_time,
        color_id,
        loop_numerator,
        loop_denominator,
        comment,
        color,
    })
}

fn utf16_be_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let mut end = units.len();
    while end > 0 && units[end - 1] == 0 {
        end -= 1;
    }
    String::from_utf16_lossy(&units[..end])
}

fn decode_path(view: &ByteSource) -> Result<PathTag> {
    let len_path = view.read_u32_be(12)? as u64;
    if len_path < 2 {
        return Ok(PathTag {
            path: String::new(),
        });
    }
    // The declared length includes the two-byte terminator.
    let bytes = view.read_bytes(16, len_path).map_err(|_| {
        Error::malformed_tag(PPTH, 0, format!("path of {len_path} bytes does not fit"))
    })?;
    Ok(PathTag {
        path: utf16_be_string(bytes),
    })
}

fn decode_wave_preview(
    view: &ByteSource,
    len_header: u32,
    len_tag: u32,
    expected: u32,
) -> Result<WavePreview> {
    let fourcc = if expected == 400 { PWAV } else { PWV2 };
    if len_tag == len_header {
        // Vestigial preview with no payload; accepted as empty.
        return Ok(WavePreview {
            unknown: 0,
            columns: Vec::new(),
        });
    }

    let len_data = view.read_u32_be(12)?;
    let unknown = view.read_u32_be(16)?;
    if len_data != expected || len_tag - len_header != expected {
        return Err(Error::malformed_tag(
            fourcc,
            0,
            format!("expected {expected} data bytes, found {len_data}"),
        ));
    }

    let data = view.read_bytes(20, len_data as u64)?;
    let columns = if expected == 400 {
        data.iter().map(|&b| WaveColumn::from_byte(b)).collect()
    } else {
        data.iter().map(|&b| WaveColumn::from_tiny_byte(b)).collect()
    };
    Ok(WavePreview { unknown, columns })
}

/// Check the `len_entries × len_entry_bytes` payload arithmetic common to
/// the detail tags, returning the payload slice.
fn detail_payload<'a>(
    view: &'a ByteSource,
    fourcc: FourCC,
    len_header: u32,
    len_tag: u32,
    data_start: u64,
    len_entry_bytes: u32,
    expected_entry_bytes: u32,
    len_entries: u32,
) -> Result<&'a [u8]> {
    if len_entry_bytes != expected_entry_bytes {
        return Err(Error::malformed_tag(
            fourcc,
            0,
            format!("unexpected entry size {len_entry_bytes}"),
        ));
    }
    let payload = len_entries as u64 * len_entry_bytes as u64;
    if (len_tag - len_header) as u64 != payload {
        return Err(Error::malformed_tag(
            fourcc,
            0,
            format!(
                "payload of {} bytes does not match {len_entries} entries of {len_entry_bytes}",
                len_tag - len_header
            ),
        ));
    }
    view.read_bytes(data_start, payload)
}

fn decode_wave_detail(view: &ByteSource, len_header: u32, len_tag: u32) -> Result<WaveDetail> {
    let len_entry_bytes = view.read_u32_be(12)?;
    let len_entries = view.read_u32_be(16)?;
    let unknown = view.read_u32_be(20)?;
    let data = detail_payload(
        view,
        PWV3,
        len_header,
        len_tag,
        24,
        len_entry_bytes,
        1,
        len_entries,
    )?;
    Ok(WaveDetail {
        unknown,
        columns: data.iter().map(|&b| WaveColumn::from_byte(b)).collect(),
    })
}

fn decode_wave_color_preview(
    view: &ByteSource,
    len_header: u32,
    len_tag: u32,
) -> Result<WaveColorPreview> {
    let len_entry_bytes = view.read_u32_be(12)?;
    let len_entries = view.read_u32_be(16)?;
    let unknown = view.read_u32_be(20)?;
    let data = detail_payload(
        view,
        PWV4,
        len_header,
        len_tag,
        24,
        len_entry_bytes,
        6,
        len_entries,
    )?;
    Ok(WaveColorPreview {
        unknown,
        columns: data
            .chunks_exact(6)
            .map(|c| WaveColorPreviewColumn::from_bytes([c[0], c[1], c[2], c[3], c[4], c[5]]))
            .collect(),
    })
}

fn decode_wave_color_detail(
    view: &ByteSource,
    len_header: u32,
    len_tag: u32,
) -> Result<WaveColorDetail> {
    let len_entry_bytes = view.read_u32_be(12)?;
    let len_entries = view.read_u32_be(16)?;
    let unknown = view.read_u32_be(20)?;
    let data = detail_payload(
        view,
        PWV5,
        len_header,
        len_tag,
        24,
        len_entry_bytes,
        2,
        len_entries,
    )?;
    Ok(WaveColorDetail {
        unknown,
        columns: data
            .chunks_exact(2)
            .map(|c| WaveColorDetailColumn::from_raw(u16::from_be_bytes([c[0], c[1]])))
            .collect(),
    })
}

fn decode_three_band(
    view: &ByteSource,
    len_header: u32,
    len_tag: u32,
    has_unknown: bool,
) -> Result<WaveThreeBand> {
    let len_entry_bytes = view.read_u32_be(12)?;
    let len_entries = view.read_u32_be(16)?;
    let (unknown, data_start) = if has_unknown {
        (Some(view.read_u32_be(20)?), 24)
    } else {
        (None, 20)
    };
    let fourcc = if has_unknown { PWV7 } else { PWV6 };
    let data = detail_payload(
        view,
        fourcc,
        len_header,
        len_tag,
        data_start,
        len_entry_bytes,
        3,
        len_entries,
    )?;
    Ok(WaveThreeBand {
        unknown,
        columns: data
            .chunks_exact(3)
            .map(|c| ThreeBandColumn {
                mid: c[0],
                high: c[1],
                low: c[2],
            })
            .collect(),
    })
}
