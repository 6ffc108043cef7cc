//! Core of a personal note-taking app: per-user note storage, an
//! autosaving editor and AI text actions against the active note.

pub mod ai;
pub mod app;
pub mod autosave;
pub mod config;
pub mod error;
pub mod model;
pub mod session;
pub mod storage;
pub mod store;

pub use ai::{AiAction, AiCapability, AiDispatcher, AiReply, AiRequest, GeminiClient, TextGenerator};
pub use app::{Handled, Notepad, NotepadSettings, Request, Response, StaleReplyPolicy};
pub use autosave::{AutosaveEditor, AutosaveTiming, SaveStatus, SwitchPolicy};
pub use config::AppConfig;
pub use error::{NotepadError, NotepadResult};
pub use model::{Collection, Folder, Note, NotePatch};
pub use session::{IdentityProvider, LocalProfileProvider, Session, User};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{NoteStore, Persistence, Structure};
