//! Eager indexer and the read-only collection façade
//!
//! Opening a database scans every table once, decodes all rows, and builds
//! the primary and secondary indexes up front; the byte source is released
//! when `open` returns. All indexes are immutable after construction and a
//! `Collection` can be shared freely across threads.
//!
//! Index layout follows the original access library: HashMap primaries,
//! sorted secondaries, case-insensitive string keys (stored lowercased),
//! dense playlist entry lists with zero fill for holes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::pdb::{DbFile, RowRef, TableKind};
use crate::rows::{
    AlbumRow, ArtistRow, ArtworkRow, ColorRow, GenreRow, HistoryEntryRow, HistoryPlaylistRow,
    KeyRow, LabelRow, PlaylistEntryRow, PlaylistTreeRow, TagRow, TagTrackRow, TrackRow,
};
use crate::source::ByteSource;

/// Sorted set of row IDs, the value type of every secondary index.
pub type IdSet = BTreeSet<u64>;

/// An entry in a playlist folder: either a playlist or a nested folder.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistFolderEntry {
    pub name: String,
    pub is_folder: bool,
    pub id: u64,
}

/// A foreign key that did not resolve against its primary index.
#[derive(Debug, Clone, Serialize)]
pub struct DanglingRef {
    pub from_table: &'static str,
    pub from_id: u64,
    pub field: &'static str,
    pub to_id: u64,
}

/// Walk one table of the given kind, passing every present row to the
/// handler in canonical order. Missing tables are skipped with a warning
/// (duplicates were already rejected when the file was opened).
fn scan_table<F>(db: &DbFile, kind: TableKind, mut handler: F) -> Result<()>
where
    F: FnMut(RowRef) -> Result<()>,
{
    let Some(table) = db.table(kind) else {
        warn!(table = kind.name(), "table not present in database file");
        return Ok(());
    };
    for page in db.iter_pages(table) {
        let page = page?;
        if !page.is_data_page() {
            continue;
        }
        for row in db.iter_rows(&page)? {
            handler(row)?;
        }
    }
    Ok(())
}

fn add_to_name_index(index: &mut BTreeMap<String, IdSet>, name: &str, id: u64) {
    if name.is_empty() {
        return;
    }
    index.entry(name.to_lowercase()).or_default().insert(id);
}

fn add_to_id_index(index: &mut BTreeMap<u64, IdSet>, key: u64, id: u64) {
    if key == 0 {
        return;
    }
    index.entry(key).or_default().insert(id);
}

fn insert_primary<R>(map: &mut HashMap<u64, R>, table: &'static str, id: u64, row: R) {
    if map.insert(id, row).is_some() {
        warn!(table, id, "duplicate row id, keeping the later row");
    }
}

/// A fully indexed `export.pdb` collection.
#[derive(Debug, Default)]
pub struct Collection {
    tracks: HashMap<u64, TrackRow>,
    artists: HashMap<u64, ArtistRow>,
    albums: HashMap<u64, AlbumRow>,
    labels: HashMap<u64, LabelRow>,
    musical_keys: HashMap<u64, KeyRow>,
    genres: HashMap<u64, GenreRow>,
    colors: HashMap<u64, ColorRow>,
    artwork: HashMap<u64, ArtworkRow>,

    track_title_index: BTreeMap<String, IdSet>,
    track_artist_index: BTreeMap<u64, IdSet>,
    track_album_index: BTreeMap<u64, IdSet>,
    track_genre_index: BTreeMap<u64, IdSet>,
    artist_name_index: BTreeMap<String, IdSet>,
    album_name_index: BTreeMap<String, IdSet>,
    album_artist_index: BTreeMap<u64, IdSet>,
    label_name_index: BTreeMap<String, IdSet>,
    key_name_index: BTreeMap<String, IdSet>,
    genre_name_index: BTreeMap<String, IdSet>,
    color_name_index: BTreeMap<String, IdSet>,

    playlists: HashMap<u64, Vec<u64>>,
    playlist_folders: HashMap<u64, Vec<PlaylistFolderEntry>>,
    history_playlists: HashMap<u64, Vec<u64>>,
    history_playlist_names: BTreeMap<String, u64>,

    dangling: Vec<DanglingRef>,
}

impl Collection {
    /// Open and fully index an `export.pdb` file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let source = ByteSource::map_file(path)?;
        Self::from_source(source)
    }

    /// Index an already opened byte source.
    pub fn from_source(source: ByteSource) -> Result<Self> {
        let db = DbFile::open(source)?;
        let mut collection = Collection::default();
        collection.index_tracks(&db)?;
        collection.index_artists(&db)?;
        collection.index_albums(&db)?;
        collection.index_labels(&db)?;
        collection.index_keys(&db)?;
        collection.index_genres(&db)?;
        collection.index_colors(&db)?;
        collection.index_artwork(&db)?;
        collection.index_playlists(&db)?;
        collection.index_playlist_folders(&db)?;
        collection.index_history(&db)?;
        collection.record_dangling();
        Ok(collection)
    }

    fn index_tracks(&mut self, db: &DbFile) -> Result<()> {
        let tracks = &mut self.tracks;
        let title_index = &mut self.track_title_index;
        let artist_index = &mut self.track_artist_index;
        let album_index = &mut self.track_album_index;
        let genre_index = &mut self.track_genre_index;

        scan_table(db, TableKind::Tracks, |row| {
            let track = TrackRow::decode(&row)?;
            let id = track.id;

            add_to_name_index(title_index, &track.title, id);
            // A track is findable under every artist role it references.
            for role_id in track.artist_role_ids() {
                add_to_id_index(artist_index, role_id, id);
            }
            add_to_id_index(album_index, track.album_id, id);
            add_to_id_index(genre_index, track.genre_id, id);

            insert_primary(tracks, "tracks", id, track);
            Ok(())
        })?;

        info!("Indexed {} tracks.", self.tracks.len());
        Ok(())
    }

    fn index_artists(&mut self, db: &DbFile) -> Result<()> {
        let artists = &mut self.artists;
        let name_index = &mut self.artist_name_index;
        scan_table(db, TableKind::Artists, |row| {
            let artist = ArtistRow::decode(&row)?;
            add_to_name_index(name_index, &artist.name, artist.id);
            insert_primary(artists, "artists", artist.id, artist);
            Ok(())
        })?;
        info!("Indexed {} artists.", self.artists.len());
        Ok(())
    }

    fn index_albums(&mut self, db: &DbFile) -> Result<()> {
        let albums = &mut self.albums;
        let name_index = &mut self.album_name_index;
        let artist_index = &mut self.album_artist_index;
        scan_table(db, TableKind::Albums, |row| {
            let album = AlbumRow::decode(&row)?;
            add_to_name_index(name_index, &album.name, album.id);
            add_to_id_index(artist_index, album.artist_id, album.id);
            insert_primary(albums, "albums", album.id, album);
            Ok(())
        })?;
        info!("Indexed {} albums.", self.albums.len());
        Ok(())
    }

    fn index_labels(&mut self, db: &DbFile) -> Result<()> {
        let labels = &mut self.labels;
        let name_index = &mut self.label_name_index;
        scan_table(db, TableKind::Labels, |row| {
            let label = LabelRow::decode(&row)?;
            add_to_name_index(name_index, &label.name, label.id);
            insert_primary(labels, "labels", label.id, label);
            Ok(())
        })?;
        info!("Indexed {} labels.", self.labels.len());
        Ok(())
    }

    fn index_keys(&mut self, db: &DbFile) -> Result<()> {
        let keys = &mut self.musical_keys;
        let name_index = &mut self.key_name_index;
        scan_table(db, TableKind::Keys, |row| {
            let key = KeyRow::decode(&row)?;
            add_to_name_index(name_index, &key.name, key.id);
            insert_primary(keys, "keys", key.id, key);
            Ok(())
        })?;
        info!("Indexed {} musical keys.", self.musical_keys.len());
        Ok(())
    }

    fn index_genres(&mut self, db: &DbFile) -> Result<()> {
        let genres = &mut self.genres;
        let name_index = &mut self.genre_name_index;
        scan_table(db, TableKind::Genres, |row| {
            let genre = GenreRow::decode(&row)?;
            add_to_name_index(name_index, &genre.name, genre.id);
            insert_primary(genres, "genres", genre.id, genre);
            Ok(())
        })?;
        info!("Indexed {} genres.", self.genres.len());
        Ok(())
    }

    fn index_colors(&mut self, db: &DbFile) -> Result<()> {
        let colors = &mut self.colors;
        let name_index = &mut self.color_name_index;
        scan_table(db, TableKind::Colors, |row| {
            let color = ColorRow::decode(&row)?;
            add_to_name_index(name_index, &color.name, color.id);
            insert_primary(colors, "colors", color.id, color);
            Ok(())
        })?;
        info!("Indexed {} colors.", self.colors.len());
        Ok(())
    }

    fn index_artwork(&mut self, db: &DbFile) -> Result<()> {
        let artwork = &mut self.artwork;
        scan_table(db, TableKind::Artwork, |row| {
            let art = ArtworkRow::decode(&row)?;
            insert_primary(artwork, "artwork", art.id, art);
            Ok(())
        })?;
        info!("Indexed {} artwork paths.", self.artwork.len());
        Ok(())
    }

    fn index_playlists(&mut self, db: &DbFile) -> Result<()> {
        let playlists = &mut self.playlists;
        scan_table(db, TableKind::PlaylistEntries, |row| {
            let entry = PlaylistEntryRow::decode(&row)?;
            let list = playlists.entry(entry.playlist_id).or_default();
            // Entry indices are dense from zero; grow the list and fill
            // holes with zero (no track).
            if list.len() <= entry.entry_index as usize {
                list.resize(entry.entry_index as usize + 1, 0);
            }
            list[entry.entry_index as usize] = entry.track_id;
            Ok(())
        })?;
        info!("Indexed {} playlists.", self.playlists.len());
        Ok(())
    }

    fn index_playlist_folders(&mut self, db: &DbFile) -> Result<()> {
        let mut by_parent: HashMap<u64, Vec<(u32, PlaylistFolderEntry)>> = HashMap::new();
        scan_table(db, TableKind::PlaylistTree, |row| {
            let tree = PlaylistTreeRow::decode(&row)?;
            by_parent.entry(tree.parent_id).or_default().push((
                tree.sort_order,
                PlaylistFolderEntry {
                    name: tree.name,
                    is_folder: tree.is_folder,
                    id: tree.id,
                },
            ));
            Ok(())
        })?;
        for (parent, mut entries) in by_parent {
            entries.sort_by_key(|(order, _)| *order);
            self.playlist_folders
                .insert(parent, entries.into_iter().map(|(_, e)| e).collect());
        }
        info!("Indexed {} playlist folders.", self.playlist_folders.len());
        Ok(())
    }

    fn index_history(&mut self, db: &DbFile) -> Result<()> {
        let names = &mut self.history_playlist_names;
        scan_table(db, TableKind::HistoryPlaylists, |row| {
            let playlist = HistoryPlaylistRow::decode(&row)?;
            names.insert(playlist.name.to_lowercase(), playlist.id);
            Ok(())
        })?;

        let history = &mut self.history_playlists;
        scan_table(db, TableKind::HistoryEntries, |row| {
            let entry = HistoryEntryRow::decode(&row)?;
            let list = history.entry(entry.playlist_id).or_default();
            if list.len() <= entry.entry_index as usize {
                list.resize(entry.entry_index as usize + 1, 0);
            }
            list[entry.entry_index as usize] = entry.track_id;
            Ok(())
        })?;
        info!("Indexed {} history playlists.", self.history_playlists.len());
        Ok(())
    }

    /// Verify every non-zero foreign key against its primary index and
    /// record the ones that do not resolve. Never fatal.
    fn record_dangling(&mut self) {
        let mut dangling = Vec::new();
        let mut check = |present: bool, from_table, from_id, field, to_id| {
            if to_id != 0 && !present {
                dangling.push(DanglingRef {
                    from_table,
                    from_id,
                    field,
                    to_id,
                });
            }
        };

        for track in self.tracks.values() {
            let id = track.id;
            for (field, to_id) in [
                ("artist_id", track.artist_id),
                ("composer_id", track.composer_id),
                ("original_artist_id", track.original_artist_id),
                ("remixer_id", track.remixer_id),
            ] {
                check(self.artists.contains_key(&to_id), "tracks", id, field, to_id);
            }
            check(
                self.albums.contains_key(&track.album_id),
                "tracks",
                id,
                "album_id",
                track.album_id,
            );
            check(
                self.genres.contains_key(&track.genre_id),
                "tracks",
                id,
                "genre_id",
                track.genre_id,
            );
            check(
                self.labels.contains_key(&track.label_id),
                "tracks",
                id,
                "label_id",
                track.label_id,
            );
            check(
                self.musical_keys.contains_key(&track.key_id),
                "tracks",
                id,
                "key_id",
                track.key_id,
            );
            check(
                self.colors.contains_key(&track.color_id),
                "tracks",
                id,
                "color_id",
                track.color_id,
            );
            check(
                self.artwork.contains_key(&track.artwork_id),
                "tracks",
                id,
                "artwork_id",
                track.artwork_id,
            );
        }
        for album in self.albums.values() {
            check(
                self.artists.contains_key(&album.artist_id),
                "albums",
                album.id,
                "artist_id",
                album.artist_id,
            );
        }
        for (playlist_id, track_ids) in &self.playlists {
            for &track_id in track_ids {
                check(
                    self.tracks.contains_key(&track_id),
                    "playlist_entries",
                    *playlist_id,
                    "track_id",
                    track_id,
                );
            }
        }

        for entry in &dangling {
            warn!(
                from_table = entry.from_table,
                from_id = entry.from_id,
                field = entry.field,
                to_id = entry.to_id,
                "dangling foreign key"
            );
        }
        self.dangling = dangling;
    }

    // Primary indexes.

    pub fn tracks(&self) -> &HashMap<u64, TrackRow> {
        &self.tracks
    }

    pub fn track(&self, id: u64) -> Option<&TrackRow> {
        self.tracks.get(&id)
    }

    pub fn artists(&self) -> &HashMap<u64, ArtistRow> {
        &self.artists
    }

    pub fn artist(&self, id: u64) -> Option<&ArtistRow> {
        self.artists.get(&id)
    }

    pub fn albums(&self) -> &HashMap<u64, AlbumRow> {
        &self.albums
    }

    pub fn album(&self, id: u64) -> Option<&AlbumRow> {
        self.albums.get(&id)
    }

    pub fn labels(&self) -> &HashMap<u64, LabelRow> {
        &self.labels
    }

    pub fn musical_keys(&self) -> &HashMap<u64, KeyRow> {
        &self.musical_keys
    }

    pub fn genres(&self) -> &HashMap<u64, GenreRow> {
        &self.genres
    }

    pub fn colors(&self) -> &HashMap<u64, ColorRow> {
        &self.colors
    }

    pub fn artwork(&self) -> &HashMap<u64, ArtworkRow> {
        &self.artwork
    }

    // Secondary indexes. String keys are lowercased.

    pub fn track_title_index(&self) -> &BTreeMap<String, IdSet> {
        &self.track_title_index
    }

    pub fn track_artist_index(&self) -> &BTreeMap<u64, IdSet> {
        &self.track_artist_index
    }

    pub fn track_album_index(&self) -> &BTreeMap<u64, IdSet> {
        &self.track_album_index
    }

    pub fn track_genre_index(&self) -> &BTreeMap<u64, IdSet> {
        &self.track_genre_index
    }

    pub fn artist_name_index(&self) -> &BTreeMap<String, IdSet> {
        &self.artist_name_index
    }

    pub fn album_name_index(&self) -> &BTreeMap<String, IdSet> {
        &self.album_name_index
    }

    pub fn album_artist_index(&self) -> &BTreeMap<u64, IdSet> {
        &self.album_artist_index
    }

    pub fn label_name_index(&self) -> &BTreeMap<String, IdSet> {
        &self.label_name_index
    }

    pub fn key_name_index(&self) -> &BTreeMap<String, IdSet> {
        &self.key_name_index
    }

    pub fn genre_name_index(&self) -> &BTreeMap<String, IdSet> {
        &self.genre_name_index
    }

    pub fn color_name_index(&self) -> &BTreeMap<String, IdSet> {
        &self.color_name_index
    }

    /// Playlist ID → ordered track IDs. Holes hold zero (no track).
    pub fn playlists(&self) -> &HashMap<u64, Vec<u64>> {
        &self.playlists
    }

    /// Folder ID → entries ordered by sort order. Folder 0 is the root.
    pub fn playlist_folders(&self) -> &HashMap<u64, Vec<PlaylistFolderEntry>> {
        &self.playlist_folders
    }

    pub fn history_playlists(&self) -> &HashMap<u64, Vec<u64>> {
        &self.history_playlists
    }

    pub fn history_playlist_names(&self) -> &BTreeMap<String, u64> {
        &self.history_playlist_names
    }

    /// Foreign keys that failed to resolve during indexing.
    pub fn dangling_refs(&self) -> &[DanglingRef] {
        &self.dangling
    }
}

/// A fully indexed `exportExt.pdb` collection: tags and tag↔track links.
#[derive(Debug, Default)]
pub struct ExtCollection {
    tags: HashMap<u64, TagRow>,
    tag_name_index: BTreeMap<String, IdSet>,
    tag_track_index: BTreeMap<u64, IdSet>,
    track_tag_index: BTreeMap<u64, IdSet>,
    tag_categories: Vec<u64>,
    category_tags: HashMap<u64, Vec<u64>>,
}

impl ExtCollection {
    /// Open and fully index an `exportExt.pdb` file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let source = ByteSource::map_file(path)?;
        Self::from_source(source)
    }

    pub fn from_source(source: ByteSource) -> Result<Self> {
        let db = DbFile::open_ext(source)?;
        let mut collection = ExtCollection::default();

        let tags = &mut collection.tags;
        let name_index = &mut collection.tag_name_index;
        let mut categories: Vec<(u32, u64)> = Vec::new();
        let mut by_category: HashMap<u64, Vec<(u32, u64)>> = HashMap::new();
        scan_table(&db, TableKind::Tags, |row| {
            let tag = TagRow::decode(&row)?;
            add_to_name_index(name_index, &tag.name, tag.id);
            if tag.is_category {
                categories.push((tag.category_pos, tag.id));
            } else {
                by_category
                    .entry(tag.category_id)
                    .or_default()
                    .push((tag.category_pos, tag.id));
            }
            insert_primary(tags, "tags", tag.id, tag);
            Ok(())
        })?;
        categories.sort_by_key(|(pos, _)| *pos);
        collection.tag_categories = categories.into_iter().map(|(_, id)| id).collect();
        for (category, mut tag_list) in by_category {
            tag_list.sort_by_key(|(pos, _)| *pos);
            collection
                .category_tags
                .insert(category, tag_list.into_iter().map(|(_, id)| id).collect());
        }
        info!("Indexed {} tags.", collection.tags.len());

        let tag_track_index = &mut collection.tag_track_index;
        let track_tag_index = &mut collection.track_tag_index;
        scan_table(&db, TableKind::TagTracks, |row| {
            let link = TagTrackRow::decode(&row)?;
            add_to_id_index(tag_track_index, link.tag_id, link.track_id);
            add_to_id_index(track_tag_index, link.track_id, link.tag_id);
            Ok(())
        })?;
        info!(
            "Indexed tag links for {} tracks.",
            collection.track_tag_index.len()
        );

        Ok(collection)
    }

    pub fn tags(&self) -> &HashMap<u64, TagRow> {
        &self.tags
    }

    pub fn tag(&self, id: u64) -> Option<&TagRow> {
        self.tags.get(&id)
    }

    pub fn tag_name_index(&self) -> &BTreeMap<String, IdSet> {
        &self.tag_name_index
    }

    /// Tag ID → IDs of tracks carrying that tag.
    pub fn tag_track_index(&self) -> &BTreeMap<u64, IdSet> {
        &self.tag_track_index
    }

    /// Track ID → IDs of the tags on that track.
    pub fn track_tag_index(&self) -> &BTreeMap<u64, IdSet> {
        &self.track_tag_index
    }

    /// Category IDs in display order.
    pub fn tag_categories(&self) -> &[u64] {
        &self.tag_categories
    }

    /// Category ID → tag IDs in display order.
    pub fn category_tags(&self) -> &HashMap<u64, Vec<u64>> {
        &self.category_tags
    }
}
