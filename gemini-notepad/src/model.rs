//! Notes, folders and the per-user collection that holds them.
//!
//! Field names serialize in camelCase so a stored collection reads as
//! `{"notes": [{"id", "title", "content", "folderId", "createdAt",
//! "updatedAt", "isFavorite"}], "folders": [{"id", "name"}]}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const UNTITLED_NOTE: &str = "Untitled Note";

const WELCOME_TITLE: &str = "Welcome to Gemini Notepad";
const WELCOME_CONTENT: &str = "## Hello, World!\n\n\
This is your first note. You can use **Markdown** to format your text. \
Feel free to explore the AI features in the right panel.\n\n\
* Summarize\n* Rewrite\n* Expand\n\n\
Start writing and see your ideas come to life!";

const SEED_FOLDERS: [(&str, &str); 3] = [
    ("folder-1", "Project Phoenix"),
    ("folder-2", "Meeting Notes"),
    ("folder-3", "Personal Ideas"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Note {
    /// A fresh, empty note with a unique id.
    pub fn untitled(now: DateTime<Utc>) -> Self {
        Note {
            id: generate_id("note"),
            title: UNTITLED_NOTE.to_string(),
            content: String::new(),
            folder_id: None,
            created_at: now,
            updated_at: now,
            is_favorite: false,
        }
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.content)
    }

    /// Merges `patch` and refreshes `updated_at`, never moving it before
    /// `created_at` even if the wall clock stepped backwards.
    pub fn apply(&mut self, patch: NotePatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(folder_id) = patch.folder_id {
            self.folder_id = folder_id;
        }
        if let Some(is_favorite) = patch.is_favorite {
            self.is_favorite = is_favorite;
        }
        self.updated_at = now.max(self.created_at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

impl Folder {
    pub fn new(name: String) -> Self {
        Folder {
            id: generate_id("folder"),
            name,
        }
    }
}

/// A partial update of a note. `None` leaves the field untouched; for
/// `folder_id`, `Some(None)` clears the folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub folder_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl NotePatch {
    pub fn title(title: impl Into<String>) -> Self {
        NotePatch {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        NotePatch {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn text(title: impl Into<String>, content: impl Into<String>) -> Self {
        NotePatch {
            title: Some(title.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// Everything one user owns. Notes are kept newest-created first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub notes: Vec<Note>,
    pub folders: Vec<Folder>,
}

impl Collection {
    pub fn seed(now: DateTime<Utc>) -> Self {
        Collection {
            notes: vec![Note {
                id: "note-1".to_string(),
                title: WELCOME_TITLE.to_string(),
                content: WELCOME_CONTENT.to_string(),
                folder_id: None,
                created_at: now,
                updated_at: now,
                is_favorite: true,
            }],
            folders: SEED_FOLDERS
                .iter()
                .map(|(id, name)| Folder {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn note_mut(&mut self, id: &str) -> Option<&mut Note> {
        self.notes.iter_mut().find(|note| note.id == id)
    }

    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.folders.iter().find(|folder| folder.id == id)
    }

    pub fn contains_note(&self, id: &str) -> bool {
        self.note(id).is_some()
    }

    /// Inserts `note` where it belongs in newest-created-first order.
    /// Notes sharing a creation time keep the newcomer first.
    pub fn insert_by_created(&mut self, note: Note) {
        let index = self
            .notes
            .iter()
            .position(|existing| existing.created_at <= note.created_at)
            .unwrap_or(self.notes.len());
        self.notes.insert(index, note);
    }
}

/// Number of whitespace-separated words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// Keeps an explicit `null` apart from a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::now_v7().simple())
}
