use std::collections::HashSet;
use std::io::prelude::*;

use chrono::{DateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::model::{Collection, Folder, Note, NotePatch};
use crate::storage::{storage_key, Storage};

// Current version of the archive format
pub const CURRENT_ARCHIVE_VERSION: u32 = 0;

const PREVIEW_CHARS: usize = 80;
const EMPTY_PREVIEW: &str = "No content";

#[derive(Debug, Serialize, Deserialize)]
struct ExportData {
    version: u32,
    folders: Vec<Folder>,
    notes: Vec<Note>,
}

/// What happened to the durable copy after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    Durable,
    /// Nobody is signed in, so there is no slot to write.
    Volatile,
    Failed,
}

impl Persistence {
    pub fn is_durable(self) -> bool {
        self == Persistence::Durable
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderSummary {
    pub id: String,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteSummary {
    pub id: String,
    pub title: String,
    pub preview: String,
    /// Name of the note's folder; `None` when unfiled or the folder is gone.
    pub folder: Option<String>,
    pub is_favorite: bool,
    pub updated_at: DateTime<Utc>,
}

/// Sidebar view of the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Structure {
    pub total: usize,
    pub favorites: usize,
    pub folders: Vec<FolderSummary>,
    pub notes: Vec<NoteSummary>,
    pub active_id: Option<String>,
}

enum SlotRead {
    Loaded(Collection),
    /// Never written, or not a collection.
    Absent,
    Unreadable,
}

/// Owner of one user's notes and folders.
///
/// Every mutation rewrites the whole collection to the user's slot. Write
/// failures are logged and the in-memory state is kept as is.
#[derive(Debug)]
pub struct NoteStore<S: Storage> {
    storage: S,
    user_id: Option<String>,
    collection: Collection,
    active_id: Option<String>,
    last_persistence: Persistence,
    // Set when the user's slot failed to read; it may still hold their data.
    slot_unreadable: bool,
}

impl<S: Storage> NoteStore<S> {
    pub fn new(storage: S) -> Self {
        NoteStore {
            storage,
            user_id: None,
            collection: Collection::default(),
            active_id: None,
            last_persistence: Persistence::Volatile,
            slot_unreadable: false,
        }
    }

    /// Replaces the in-memory collection with `user_id`'s. A missing or
    /// malformed slot yields the seed collection; no user yields nothing.
    ///
    /// A slot that cannot be read also yields the seed, but only in memory:
    /// writes are withheld until a later load reads the slot again.
    pub fn load(&mut self, user_id: Option<&str>) {
        self.user_id = user_id.map(str::to_owned);
        self.last_persistence = Persistence::Volatile;
        self.slot_unreadable = false;
        match user_id {
            None => {
                debug!("no user signed in, starting with an empty collection");
                self.collection = Collection::default();
            }
            Some(user_id) => match self.read_collection(user_id) {
                SlotRead::Loaded(collection) => {
                    self.collection = collection;
                    self.last_persistence = Persistence::Durable;
                }
                SlotRead::Absent => {
                    info!("seeding a fresh collection for user \"{user_id}\"");
                    self.collection = Collection::seed(Utc::now());
                    self.persist();
                }
                SlotRead::Unreadable => {
                    warn!("slot of user \"{user_id}\" is unreadable, changes stay in memory");
                    self.collection = Collection::seed(Utc::now());
                    self.slot_unreadable = true;
                    self.last_persistence = Persistence::Failed;
                }
            },
        }
        self.active_id = self.collection.notes.first().map(|note| note.id.clone());
    }

    fn read_collection(&self, user_id: &str) -> SlotRead {
        let key = storage_key(user_id);
        let data = match self.storage.read(&key) {
            Ok(Some(data)) => data,
            Ok(None) => return SlotRead::Absent,
            Err(e) => {
                error!("error reading slot \"{key}\": {e}");
                return SlotRead::Unreadable;
            }
        };
        match serde_json::from_str::<Collection>(&data) {
            Ok(collection) => SlotRead::Loaded(dedup_notes(collection)),
            Err(e) => {
                warn!("slot \"{key}\" is malformed, ignoring it: {e}");
                SlotRead::Absent
            }
        }
    }

    fn persist(&mut self) -> Persistence {
        let outcome = match &self.user_id {
            None => Persistence::Volatile,
            Some(user_id) if self.slot_unreadable => {
                debug!("not overwriting the unread slot of user \"{user_id}\"");
                Persistence::Failed
            }
            Some(user_id) => {
                let key = storage_key(user_id);
                match serde_json::to_string(&self.collection) {
                    Err(e) => {
                        error!("error serializing collection for \"{key}\": {e}");
                        Persistence::Failed
                    }
                    Ok(data) => match self.storage.write(&key, &data) {
                        Ok(()) => Persistence::Durable,
                        Err(e) => {
                            error!("error writing slot \"{key}\": {e}");
                            Persistence::Failed
                        }
                    },
                }
            }
        };
        self.last_persistence = outcome;
        outcome
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn notes(&self) -> &[Note] {
        &self.collection.notes
    }

    pub fn folders(&self) -> &[Folder] {
        &self.collection.folders
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.collection.note(id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&Note> {
        self.active_id.as_deref().and_then(|id| self.collection.note(id))
    }

    pub fn last_persistence(&self) -> Persistence {
        self.last_persistence
    }

    /// Makes `id` the active note. Unknown ids leave the selection alone.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.collection.contains_note(id) {
            debug!("cannot select unknown note {id}");
            return false;
        }
        self.active_id = Some(id.to_owned());
        true
    }

    /// Adds an empty note at the front, makes it active and returns its id.
    pub fn create(&mut self) -> String {
        let mut note = Note::untitled(Utc::now());
        while self.collection.contains_note(&note.id) {
            note = Note::untitled(note.created_at);
        }
        let id = note.id.clone();
        debug!("created note {id}");
        self.collection.notes.insert(0, note);
        self.active_id = Some(id.clone());
        self.persist();
        id
    }

    /// Merges `patch` into note `id`. A vanished id is not an error: it
    /// returns `None` and changes nothing.
    pub fn update(&mut self, id: &str, patch: NotePatch) -> Option<Persistence> {
        let Some(note) = self.collection.note_mut(id) else {
            debug!("ignoring update of missing note {id}");
            return None;
        };
        note.apply(patch, Utc::now());
        Some(self.persist())
    }

    /// Removes note `id`; if it was active, the new head becomes active.
    pub fn delete(&mut self, id: &str) -> Option<Persistence> {
        let index = self.collection.notes.iter().position(|note| note.id == id);
        let Some(index) = index else {
            debug!("ignoring delete of missing note {id}");
            return None;
        };
        self.collection.notes.remove(index);
        if self.active_id.as_deref() == Some(id) {
            self.active_id = self.collection.notes.first().map(|note| note.id.clone());
        }
        Some(self.persist())
    }

    pub fn toggle_favorite(&mut self, id: &str) -> Option<Persistence> {
        let is_favorite = self.collection.note(id)?.is_favorite;
        self.update(
            id,
            NotePatch {
                is_favorite: Some(!is_favorite),
                ..Default::default()
            },
        )
    }

    /// Files note `id` under `folder_id`, or unfiles it with `None`.
    pub fn move_note(
        &mut self,
        id: &str,
        folder_id: Option<&str>,
    ) -> Result<Option<Persistence>, StoreError> {
        if let Some(folder_id) = folder_id {
            if self.collection.folder(folder_id).is_none() {
                return Err(StoreError::FolderNotFound(folder_id.to_owned()));
            }
        }
        Ok(self.update(
            id,
            NotePatch {
                folder_id: Some(folder_id.map(str::to_owned)),
                ..Default::default()
            },
        ))
    }

    pub fn create_folder(&mut self, name: String) -> String {
        let folder = Folder::new(name);
        let id = folder.id.clone();
        self.collection.folders.push(folder);
        self.persist();
        id
    }

    pub fn rename_folder(&mut self, id: &str, name: String) -> Result<Persistence, StoreError> {
        let Some(folder) = self.collection.folders.iter_mut().find(|f| f.id == id) else {
            return Err(StoreError::FolderNotFound(id.to_owned()));
        };
        folder.name = name;
        Ok(self.persist())
    }

    /// Removes folder `id` and moves its notes back to "no folder".
    pub fn delete_folder(&mut self, id: &str) -> Result<Persistence, StoreError> {
        let Some(index) = self.collection.folders.iter().position(|f| f.id == id) else {
            return Err(StoreError::FolderNotFound(id.to_owned()));
        };
        self.collection.folders.remove(index);
        for note in self.collection.notes.iter_mut() {
            if note.folder_id.as_deref() == Some(id) {
                note.folder_id = None;
            }
        }
        Ok(self.persist())
    }

    pub fn favorites(&self) -> impl Iterator<Item = &Note> {
        self.collection.notes.iter().filter(|note| note.is_favorite)
    }

    pub fn notes_in_folder<'a>(&'a self, folder_id: &'a str) -> impl Iterator<Item = &'a Note> {
        self.collection
            .notes
            .iter()
            .filter(move |note| note.folder_id.as_deref() == Some(folder_id))
    }

    /// Name of the folder `note` is filed under. Dangling references
    /// resolve to `None`, the same as an unfiled note.
    pub fn folder_name_of(&self, note: &Note) -> Option<&str> {
        note.folder_id
            .as_deref()
            .and_then(|id| self.collection.folder(id))
            .map(|folder| folder.name.as_str())
    }

    pub fn structure(&self) -> Structure {
        Structure {
            total: self.collection.notes.len(),
            favorites: self.favorites().count(),
            folders: self
                .collection
                .folders
                .iter()
                .map(|folder| FolderSummary {
                    id: folder.id.clone(),
                    name: folder.name.clone(),
                    count: self.notes_in_folder(&folder.id).count(),
                })
                .collect(),
            notes: self
                .collection
                .notes
                .iter()
                .map(|note| NoteSummary {
                    id: note.id.clone(),
                    title: note.title.clone(),
                    preview: preview(&note.content),
                    folder: self.folder_name_of(note).map(str::to_owned),
                    is_favorite: note.is_favorite,
                    updated_at: note.updated_at,
                })
                .collect(),
            active_id: self.active_id.clone(),
        }
    }

    /// Gzip-compressed, versioned JSON dump of the collection.
    pub fn export_archive(&self) -> Result<Vec<u8>, StoreError> {
        let export_data = ExportData {
            version: CURRENT_ARCHIVE_VERSION,
            folders: self.collection.folders.clone(),
            notes: self.collection.notes.clone(),
        };
        let json_str = serde_json::to_string(&export_data)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(json_str.as_bytes())
            .map_err(StoreError::Compress)?;
        encoder.finish().map_err(StoreError::Compress)
    }

    /// Merges an archive into the collection. Entries whose ids already
    /// exist replace them; new notes slot in by creation time.
    pub fn import_archive(&mut self, compressed: &[u8]) -> Result<Persistence, StoreError> {
        let mut decoder = GzDecoder::new(compressed);
        let mut decompressed = String::new();
        decoder
            .read_to_string(&mut decompressed)
            .map_err(StoreError::Decompress)?;
        let import_data: ExportData = serde_json::from_str(&decompressed)?;
        let import_data = migrate_export_data(import_data)?;

        let mut merged = self.collection.clone();
        for folder in import_data.folders {
            match merged.folders.iter_mut().find(|f| f.id == folder.id) {
                Some(existing) => *existing = folder,
                None => merged.folders.push(folder),
            }
        }
        for note in import_data.notes {
            match merged.note_mut(&note.id) {
                Some(existing) => *existing = note,
                None => merged.insert_by_created(note),
            }
        }
        info!(
            "imported archive, collection now has {} notes and {} folders",
            merged.notes.len(),
            merged.folders.len(),
        );
        self.collection = dedup_notes(merged);
        if self.active().is_none() {
            self.active_id = self.collection.notes.first().map(|note| note.id.clone());
        }
        Ok(self.persist())
    }
}

// Apply archive migrations in order; reject archives from the future.
fn migrate_export_data(mut data: ExportData) -> Result<ExportData, StoreError> {
    if data.version > CURRENT_ARCHIVE_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: data.version,
            current: CURRENT_ARCHIVE_VERSION,
        });
    }
    data.version = CURRENT_ARCHIVE_VERSION;
    Ok(data)
}

fn dedup_notes(mut collection: Collection) -> Collection {
    let mut seen = HashSet::new();
    collection.notes.retain(|note| {
        let fresh = seen.insert(note.id.clone());
        if !fresh {
            warn!("dropping duplicate note {}", note.id);
        }
        fresh
    });
    collection
}

fn preview(content: &str) -> String {
    let first_line = content.lines().map(str::trim).find(|line| !line.is_empty());
    match first_line {
        None => EMPTY_PREVIEW.to_owned(),
        Some(line) => line.chars().take(PREVIEW_CHARS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::MemoryStorage;
    use chrono::Duration;
    use std::cell::Cell;

    #[derive(Debug, Default)]
    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(std::io::Error::other("disk on fire").into())
        }

        fn write(&mut self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(std::io::Error::other("quota exceeded").into())
        }
    }

    // Fails its first read, then behaves like the wrapped storage.
    #[derive(Debug)]
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_next_read: Cell<bool>,
    }

    impl Storage for FlakyStorage {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.fail_next_read.replace(false) {
                return Err(std::io::Error::other("EACCES").into());
            }
            self.inner.read(key)
        }

        fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.write(key, value)
        }
    }

    fn loaded(user_id: &str) -> NoteStore<MemoryStorage> {
        let mut store = NoteStore::new(MemoryStorage::new());
        store.load(Some(user_id));
        store
    }

    fn stored_collection(store: &NoteStore<MemoryStorage>, user_id: &str) -> Collection {
        let data = store.storage().read(&storage_key(user_id)).unwrap().unwrap();
        serde_json::from_str(&data).unwrap()
    }

    #[test]
    fn new_user_gets_seed_collection() {
        let store = loaded("u1");
        assert_eq!(store.notes().len(), 1);
        assert_eq!(store.notes()[0].title, "Welcome to Gemini Notepad");
        let names: Vec<_> = store.folders().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Project Phoenix", "Meeting Notes", "Personal Ideas"]);
        assert_eq!(store.active_id(), Some("note-1"));
        assert_eq!(&stored_collection(&store, "u1"), store.collection());
    }

    #[test]
    fn signed_out_load_is_empty_and_volatile() {
        let mut store = NoteStore::new(MemoryStorage::new());
        store.load(None);
        assert!(store.notes().is_empty());
        assert!(store.folders().is_empty());
        assert_eq!(store.active_id(), None);

        store.create();
        assert_eq!(store.last_persistence(), Persistence::Volatile);
    }

    #[test]
    fn malformed_slot_falls_back_to_seed() {
        let mut storage = MemoryStorage::new();
        storage.write(&storage_key("u1"), "{\"notes\": 42}").unwrap();
        let mut store = NoteStore::new(storage);
        store.load(Some("u1"));
        assert_eq!(store.notes()[0].title, "Welcome to Gemini Notepad");
    }

    #[test]
    fn read_failure_falls_back_to_seed_and_write_failure_keeps_state() {
        let mut store = NoteStore::new(BrokenStorage);
        store.load(Some("u1"));
        assert_eq!(store.notes().len(), 1);
        assert_eq!(store.last_persistence(), Persistence::Failed);

        let id = store.create();
        assert_eq!(store.last_persistence(), Persistence::Failed);
        assert_eq!(store.notes()[0].id, id);
        assert_eq!(
            store.update(&id, NotePatch::title("kept")),
            Some(Persistence::Failed),
        );
        assert_eq!(store.note(&id).unwrap().title, "kept");
    }

    #[test]
    fn transient_read_error_leaves_existing_slot_alone() {
        let mut store = loaded("u1");
        let id = store.create();
        store.update(&id, NotePatch::content("precious"));
        let shared = store.storage().clone();
        let saved = stored_collection(&store, "u1");

        let mut flaky = NoteStore::new(FlakyStorage {
            inner: shared,
            fail_next_read: Cell::new(true),
        });
        flaky.load(Some("u1"));
        assert_eq!(flaky.last_persistence(), Persistence::Failed);
        assert!(flaky.note(&id).is_none());
        assert_eq!(flaky.notes()[0].title, "Welcome to Gemini Notepad");

        let scratch = flaky.create();
        assert_eq!(flaky.last_persistence(), Persistence::Failed);
        assert_eq!(
            flaky.update(&scratch, NotePatch::title("scratch")),
            Some(Persistence::Failed),
        );
        assert_eq!(stored_collection(&store, "u1"), saved);

        flaky.load(Some("u1"));
        assert_eq!(flaky.last_persistence(), Persistence::Durable);
        assert_eq!(flaky.note(&id).unwrap().content, "precious");
        flaky.create_folder("Later".into());
        assert_eq!(flaky.last_persistence(), Persistence::Durable);
    }

    #[test]
    fn collections_survive_a_reload() {
        let mut store = loaded("u1");
        let first = store.create();
        store.update(&first, NotePatch::text("first", "body"));
        let second = store.create();
        store.move_note(&second, Some("folder-2")).unwrap();
        store.toggle_favorite(&second);
        let folder = store.create_folder("Archive".into());
        store.rename_folder(&folder, "Old stuff".into()).unwrap();
        let before = store.collection().clone();

        let mut reopened = NoteStore::new(store.storage().clone());
        reopened.load(Some("u1"));
        assert_eq!(reopened.collection(), &before);
        assert_eq!(reopened.notes()[0].id, second);
        assert_eq!(reopened.notes()[1].id, first);
    }

    #[test]
    fn users_do_not_see_each_other() {
        let mut store = loaded("alice");
        let id = store.create();
        store.update(&id, NotePatch::title("alice only"));

        let mut other = NoteStore::new(store.storage().clone());
        other.load(Some("bob"));
        assert!(other.notes().iter().all(|note| note.title != "alice only"));
    }

    #[test]
    fn create_prepends_untitled_note_and_activates_it() {
        let mut store = loaded("u1");
        let before = store.notes().len();
        let id = store.create();
        assert_eq!(store.notes().len(), before + 1);
        let head = &store.notes()[0];
        assert_eq!(head.id, id);
        assert_eq!(head.title, "Untitled Note");
        assert_eq!(head.content, "");
        assert!(!head.is_favorite);
        assert_eq!(head.created_at, head.updated_at);
        assert_eq!(store.active_id(), Some(id.as_str()));
        assert_eq!(store.last_persistence(), Persistence::Durable);
    }

    #[test]
    fn update_of_missing_note_is_a_silent_no_op() {
        let mut store = loaded("u1");
        let before = store.collection().clone();
        assert_eq!(store.update("gone", NotePatch::title("x")), None);
        assert_eq!(store.collection(), &before);
    }

    #[test]
    fn update_refreshes_timestamp() {
        let mut store = loaded("u1");
        let id = store.create();
        let created = store.note(&id).unwrap().created_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.update(&id, NotePatch::content("hello"));
        let note = store.note(&id).unwrap();
        assert_eq!(note.content, "hello");
        assert_eq!(note.title, "Untitled Note");
        assert!(note.updated_at > created);
    }

    #[test]
    fn deleting_active_note_moves_to_new_head() {
        let mut store = loaded("u1");
        let older = store.create();
        let newer = store.create();
        assert_eq!(store.active_id(), Some(newer.as_str()));

        store.delete(&newer);
        assert_eq!(store.active_id(), Some(older.as_str()));
        store.delete(&older);
        assert_eq!(store.active_id(), Some("note-1"));
        store.delete("note-1");
        assert_eq!(store.active_id(), None);
        assert!(store.notes().is_empty());
    }

    #[test]
    fn deleting_inactive_note_keeps_selection() {
        let mut store = loaded("u1");
        let other = store.create();
        assert!(store.select("note-1"));
        store.delete(&other);
        assert_eq!(store.active_id(), Some("note-1"));
        assert_eq!(store.delete("missing"), None);
        assert_eq!(store.active_id(), Some("note-1"));
    }

    #[test]
    fn select_ignores_unknown_ids() {
        let mut store = loaded("u1");
        assert!(!store.select("nope"));
        assert_eq!(store.active_id(), Some("note-1"));
    }

    #[test]
    fn ids_stay_unique_and_timestamps_ordered_across_mutations() {
        let mut store = loaded("u1");
        for i in 0..20 {
            let id = store.create();
            store.update(&id, NotePatch::title(format!("note {i}")));
            if i % 3 == 0 {
                store.delete(&id);
            }
        }
        let unique: HashSet<_> = store.notes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(unique.len(), store.notes().len());
        assert!(store.notes().iter().all(|n| n.updated_at >= n.created_at));
    }

    #[test]
    fn move_note_requires_existing_folder() {
        let mut store = loaded("u1");
        assert!(matches!(
            store.move_note("note-1", Some("folder-404")),
            Err(StoreError::FolderNotFound(_)),
        ));
        assert_eq!(store.move_note("missing", Some("folder-1")).unwrap(), None);
        store.move_note("note-1", Some("folder-1")).unwrap();
        assert_eq!(store.notes_in_folder("folder-1").count(), 1);
        store.move_note("note-1", None).unwrap();
        assert_eq!(store.note("note-1").unwrap().folder_id, None);
    }

    #[test]
    fn deleting_folder_unfiles_its_notes() {
        let mut store = loaded("u1");
        store.move_note("note-1", Some("folder-3")).unwrap();
        store.delete_folder("folder-3").unwrap();
        assert_eq!(store.folders().len(), 2);
        assert_eq!(store.note("note-1").unwrap().folder_id, None);
        assert!(matches!(
            store.delete_folder("folder-3"),
            Err(StoreError::FolderNotFound(_)),
        ));
    }

    #[test]
    fn dangling_folder_reference_reads_as_no_folder() {
        let mut store = loaded("u1");
        store.update(
            "note-1",
            NotePatch {
                folder_id: Some(Some("folder-gone".into())),
                ..Default::default()
            },
        );
        let note = store.note("note-1").unwrap();
        assert_eq!(store.folder_name_of(note), None);
        let structure = store.structure();
        assert_eq!(structure.notes[0].folder, None);
        assert!(structure.folders.iter().all(|f| f.count == 0));
    }

    #[test]
    fn structure_counts_favorites_and_folders() {
        let mut store = loaded("u1");
        let id = store.create();
        store.move_note(&id, Some("folder-2")).unwrap();
        let structure = store.structure();
        assert_eq!(structure.total, 2);
        assert_eq!(structure.favorites, 1);
        assert_eq!(structure.folders[1].count, 1);
        assert_eq!(structure.notes[0].preview, "No content");
        assert_eq!(structure.notes[1].preview, "## Hello, World!");
        assert_eq!(structure.notes[0].folder.as_deref(), Some("Meeting Notes"));
        assert_eq!(structure.active_id, Some(id));
    }

    #[test]
    fn duplicate_ids_in_storage_are_dropped_on_load() {
        let now = Utc::now();
        let note = Note::untitled(now);
        let collection = Collection {
            notes: vec![note.clone(), note],
            folders: vec![],
        };
        let mut storage = MemoryStorage::new();
        storage
            .write(&storage_key("u1"), &serde_json::to_string(&collection).unwrap())
            .unwrap();
        let mut store = NoteStore::new(storage);
        store.load(Some("u1"));
        assert_eq!(store.notes().len(), 1);
    }

    #[test]
    fn archive_merges_into_another_collection() {
        let mut source = loaded("alice");
        let id = source.create();
        source.update(&id, NotePatch::text("shared", "exported body"));
        source.update("note-1", NotePatch::title("renamed welcome"));
        let archive = source.export_archive().unwrap();

        let mut target = loaded("bob");
        let old = Note::untitled(Utc::now() - Duration::days(30));
        let old_id = old.id.clone();
        target.collection.notes.push(old);

        assert_eq!(target.import_archive(&archive).unwrap(), Persistence::Durable);
        assert_eq!(target.note(&id).unwrap().content, "exported body");
        assert_eq!(target.note("note-1").unwrap().title, "renamed welcome");
        assert_eq!(target.folders().len(), 3);
        assert_eq!(target.notes().last().unwrap().id, old_id);
        assert_eq!(&stored_collection(&target, "bob"), target.collection());
    }

    #[test]
    fn archive_from_newer_version_is_rejected() {
        let data = ExportData {
            version: CURRENT_ARCHIVE_VERSION + 1,
            folders: vec![],
            notes: vec![],
        };
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(serde_json::to_string(&data).unwrap().as_bytes())
            .unwrap();
        let archive = encoder.finish().unwrap();

        let mut store = loaded("u1");
        assert!(matches!(
            store.import_archive(&archive),
            Err(StoreError::UnsupportedVersion { .. }),
        ));
        assert!(matches!(
            store.import_archive(b"not gzip"),
            Err(StoreError::Decompress(_)),
        ));
    }
}
