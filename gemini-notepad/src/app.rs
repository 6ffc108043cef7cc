use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::ai::{AiAction, AiDispatcher, AiReply, AiRequest, TextGenerator};
use crate::autosave::{AutosaveEditor, AutosaveTiming, Commit, SaveStatus, SwitchPolicy};
use crate::config::AppConfig;
use crate::error::{NotepadError, NotepadResult};
use crate::model::Note;
use crate::session::{IdentityProvider, Session, User};
use crate::storage::Storage;
use crate::store::{NoteStore, Persistence, Structure};

/// What to do with an AI reply whose note is no longer the active one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReplyPolicy {
    #[default]
    Discard,
    /// Write the reply into whichever note is active when it arrives.
    ApplyToActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotepadSettings {
    pub timing: AutosaveTiming,
    pub switch_policy: SwitchPolicy,
    pub stale_reply_policy: StaleReplyPolicy,
}

impl From<&AppConfig> for NotepadSettings {
    fn from(config: &AppConfig) -> Self {
        NotepadSettings {
            timing: config.timing(),
            switch_policy: config.switch_policy,
            stale_reply_policy: config.stale_reply_policy,
        }
    }
}

impl Default for NotepadSettings {
    fn default() -> Self {
        NotepadSettings::from(&AppConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AiOutcome {
    Applied { note_id: String },
    Stale { note_id: String },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorView {
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub status: SaveStatus,
    pub word_count: usize,
    pub pending: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    SignIn,
    SignInWithCredentials { email: String, password: String },
    SignUp {
        name: String,
        email: String,
        password: String,
    },
    SignOut,
    WhoAmI,
    GetStructure,
    GetNote { id: String },
    GetEditor,
    CreateNote,
    SelectNote { id: String },
    DeleteNote { id: String },
    EditTitle { title: String },
    EditContent { content: String },
    Flush,
    ToggleFavorite { id: String },
    MoveNote {
        id: String,
        #[serde(default)]
        folder_id: Option<String>,
    },
    CreateFolder { name: String },
    RenameFolder { id: String, name: String },
    DeleteFolder { id: String },
    Ai {
        #[serde(flatten)]
        action: AiAction,
    },
    ExportArchive { path: PathBuf },
    ImportArchive { path: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    User { user: Option<User> },
    Structure { structure: Structure },
    Note { note: Option<Note> },
    Editor { editor: Option<EditorView> },
    Created { id: String },
    Persisted { persistence: Option<Persistence> },
    Saved {
        note_id: String,
        persistence: Persistence,
    },
    Status { note_id: String, status: SaveStatus },
    AiPending { note_id: String },
    AiSkipped,
    AiDone { outcome: AiOutcome },
    Archive { path: PathBuf, bytes: usize },
    Error { message: String },
}

impl From<&Commit> for Response {
    fn from(commit: &Commit) -> Self {
        Response::Saved {
            note_id: commit.note_id.clone(),
            persistence: commit.persistence,
        }
    }
}

/// Result of handling one request. AI actions come back as work for the
/// caller to run off the event loop and feed to [`Notepad::apply_ai_reply`].
#[derive(Debug)]
pub enum Handled {
    Reply(Response),
    Ai(AiRequest),
}

pub struct Notepad<S: Storage, P, G> {
    session: Session<P>,
    store: NoteStore<S>,
    editor: Option<AutosaveEditor>,
    ai: Arc<AiDispatcher<G>>,
    settings: NotepadSettings,
}

impl<S, P, G> Notepad<S, P, G>
where
    S: Storage,
    P: IdentityProvider,
    G: TextGenerator,
{
    pub fn new(
        session: Session<P>,
        store: NoteStore<S>,
        ai: AiDispatcher<G>,
        settings: NotepadSettings,
    ) -> Self {
        let mut notepad = Notepad {
            session,
            store,
            editor: None,
            ai: Arc::new(ai),
            settings,
        };
        notepad.sync_user();
        notepad
    }

    pub fn session(&self) -> &Session<P> {
        &self.session
    }

    pub fn store(&self) -> &NoteStore<S> {
        &self.store
    }

    pub fn editor(&self) -> Option<&AutosaveEditor> {
        self.editor.as_ref()
    }

    pub fn ai(&self) -> Arc<AiDispatcher<G>> {
        Arc::clone(&self.ai)
    }

    pub fn structure(&self) -> Structure {
        self.store.structure()
    }

    pub fn editor_view(&self) -> Option<EditorView> {
        self.editor.as_ref().map(|editor| EditorView {
            note_id: editor.note_id().to_owned(),
            title: editor.title().to_owned(),
            content: editor.content().to_owned(),
            status: editor.status(),
            word_count: editor.word_count(),
            pending: editor.has_pending_save(),
        })
    }

    // Reload the store for whoever is signed in now.
    fn sync_user(&mut self) {
        let user_id = self.session.current_user().map(|user| user.id.clone());
        self.editor = None;
        self.store.load(user_id.as_deref());
        self.reopen_editor();
    }

    // Point the editor at the active note if it isn't already.
    fn reopen_editor(&mut self) {
        let active = self.store.active();
        let current = self.editor.as_ref().map(AutosaveEditor::note_id);
        if active.map(|note| note.id.as_str()) == current {
            return;
        }
        self.editor = active.map(|note| AutosaveEditor::open(note, self.settings.timing));
    }

    fn close_editor(&mut self, now: Instant) -> Option<Commit> {
        let editor = self.editor.take()?;
        editor.close(self.settings.switch_policy, now, &mut self.store)
    }

    pub async fn resume(&mut self) -> Option<User> {
        self.session.resume().await;
        self.sync_user();
        self.session.current_user().cloned()
    }

    pub async fn sign_in(&mut self, now: Instant) -> NotepadResult<User> {
        self.close_editor(now);
        let result = self.session.sign_in_with_provider().await;
        self.sync_user();
        Ok(result?)
    }

    pub async fn sign_in_with_credentials(
        &mut self,
        email: &str,
        password: &str,
        now: Instant,
    ) -> NotepadResult<User> {
        self.close_editor(now);
        let result = self.session.sign_in_with_credentials(email, password).await;
        self.sync_user();
        Ok(result?)
    }

    pub async fn sign_up(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        now: Instant,
    ) -> NotepadResult<User> {
        self.close_editor(now);
        let result = self.session.sign_up_with_credentials(name, email, password).await;
        self.sync_user();
        Ok(result?)
    }

    /// Saves pending edits, signs out and drops the collection from memory.
    pub async fn sign_out(&mut self, now: Instant) -> NotepadResult<()> {
        self.close_editor(now);
        self.session.sign_out().await?;
        self.sync_user();
        Ok(())
    }

    fn require_user(&self) -> NotepadResult<()> {
        match self.session.current_user() {
            Some(_) => Ok(()),
            None => Err(NotepadError::SignedOut),
        }
    }

    pub fn create_note(&mut self, now: Instant) -> NotepadResult<String> {
        self.require_user()?;
        self.close_editor(now);
        let id = self.store.create();
        self.reopen_editor();
        Ok(id)
    }

    /// Switches the active note. Returns `false` for unknown ids.
    pub fn select_note(&mut self, id: &str, now: Instant) -> bool {
        if self.store.note(id).is_none() {
            return false;
        }
        if self.editor.as_ref().map(AutosaveEditor::note_id) != Some(id) {
            self.close_editor(now);
        }
        self.store.select(id);
        self.reopen_editor();
        true
    }

    pub fn delete_note(&mut self, id: &str) -> Option<Persistence> {
        if self.editor.as_ref().map(AutosaveEditor::note_id) == Some(id) {
            debug!("closing editor of deleted note {id}");
            self.editor = None;
        }
        let persistence = self.store.delete(id);
        self.reopen_editor();
        persistence
    }

    fn editor_mut(&mut self) -> NotepadResult<&mut AutosaveEditor> {
        self.editor.as_mut().ok_or(NotepadError::NoActiveNote)
    }

    pub fn edit_title(&mut self, title: String, now: Instant) -> NotepadResult<()> {
        self.editor_mut()?.set_title(title, now);
        Ok(())
    }

    pub fn edit_content(&mut self, content: String, now: Instant) -> NotepadResult<()> {
        self.editor_mut()?.set_content(content, now);
        Ok(())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.editor.as_ref().and_then(AutosaveEditor::next_deadline)
    }

    pub fn poll(&mut self, now: Instant) -> Option<Commit> {
        let editor = self.editor.as_mut()?;
        editor.poll(now, &mut self.store)
    }

    pub fn flush(&mut self, now: Instant) -> Option<Commit> {
        let editor = self.editor.as_mut()?;
        editor.flush(now, &mut self.store)
    }

    pub fn toggle_favorite(&mut self, id: &str) -> Option<Persistence> {
        self.store.toggle_favorite(id)
    }

    pub fn move_note(
        &mut self,
        id: &str,
        folder_id: Option<&str>,
    ) -> NotepadResult<Option<Persistence>> {
        Ok(self.store.move_note(id, folder_id)?)
    }

    pub fn create_folder(&mut self, name: String) -> NotepadResult<String> {
        self.require_user()?;
        Ok(self.store.create_folder(name))
    }

    pub fn rename_folder(&mut self, id: &str, name: String) -> NotepadResult<Persistence> {
        Ok(self.store.rename_folder(id, name)?)
    }

    pub fn delete_folder(&mut self, id: &str) -> NotepadResult<Persistence> {
        Ok(self.store.delete_folder(id)?)
    }

    /// Prepares an AI action on the active note. Pending edits are saved
    /// first so the request sees what the user sees. `Ok(None)` when the
    /// note has nothing to work on.
    pub fn begin_ai(
        &mut self,
        action: AiAction,
        now: Instant,
    ) -> NotepadResult<Option<AiRequest>> {
        self.flush(now);
        let note = self.store.active().ok_or(NotepadError::NoActiveNote)?;
        Ok(AiRequest::for_note(note, action))
    }

    pub fn apply_ai_reply(&mut self, reply: AiReply) -> AiOutcome {
        let active = self.store.active_id().map(str::to_owned);
        let target = match self.settings.stale_reply_policy {
            StaleReplyPolicy::Discard if active.as_deref() == Some(reply.note_id.as_str()) => {
                Some(reply.note_id.clone())
            }
            StaleReplyPolicy::Discard => None,
            StaleReplyPolicy::ApplyToActive => active,
        };
        let Some(target) = target else {
            info!(
                "discarding {:?} reply for note {}, which is no longer active",
                reply.action, reply.note_id,
            );
            return AiOutcome::Stale {
                note_id: reply.note_id,
            };
        };
        let Some(patch) = reply.patch() else {
            return AiOutcome::Empty;
        };
        if self.store.update(&target, patch).is_none() {
            return AiOutcome::Stale {
                note_id: reply.note_id,
            };
        }
        if let (Some(editor), Some(note)) = (self.editor.as_mut(), self.store.note(&target)) {
            if editor.note_id() == target {
                editor.reload(note);
            }
        }
        AiOutcome::Applied { note_id: target }
    }

    /// Runs an AI action to completion without leaving the caller's task.
    pub async fn run_ai(
        &mut self,
        action: AiAction,
        now: Instant,
    ) -> NotepadResult<Option<AiOutcome>> {
        let Some(request) = self.begin_ai(action, now)? else {
            return Ok(None);
        };
        let reply = self.ai.run(request).await;
        Ok(Some(self.apply_ai_reply(reply)))
    }

    /// Saves pending edits, then dumps the collection.
    pub fn export_archive(&mut self, now: Instant) -> NotepadResult<Vec<u8>> {
        self.flush(now);
        Ok(self.store.export_archive()?)
    }

    pub fn import_archive(&mut self, archive: &[u8], now: Instant) -> NotepadResult<Persistence> {
        self.require_user()?;
        self.flush(now);
        let persistence = self.store.import_archive(archive)?;
        if let (Some(editor), Some(note)) = (self.editor.as_mut(), self.store.active()) {
            editor.reload(note);
        }
        self.reopen_editor();
        Ok(persistence)
    }

    pub async fn handle_request(&mut self, req: Request, now: Instant) -> anyhow::Result<Handled> {
        debug!("request: {req:?}");
        let resp = match req {
            Request::SignIn => Response::User {
                user: Some(self.sign_in(now).await?),
            },
            Request::SignInWithCredentials { email, password } => Response::User {
                user: Some(self.sign_in_with_credentials(&email, &password, now).await?),
            },
            Request::SignUp {
                name,
                email,
                password,
            } => Response::User {
                user: Some(self.sign_up(&name, &email, &password, now).await?),
            },
            Request::SignOut => {
                self.sign_out(now).await?;
                Response::User { user: None }
            }
            Request::WhoAmI => Response::User {
                user: self.session.current_user().cloned(),
            },
            Request::GetStructure => Response::Structure {
                structure: self.structure(),
            },
            Request::GetNote { id } => Response::Note {
                note: self.store.note(&id).cloned(),
            },
            Request::GetEditor => Response::Editor {
                editor: self.editor_view(),
            },
            Request::CreateNote => Response::Created {
                id: self.create_note(now)?,
            },
            Request::SelectNote { id } => {
                if !self.select_note(&id, now) {
                    anyhow::bail!("note not found: {id}");
                }
                Response::Editor {
                    editor: self.editor_view(),
                }
            }
            Request::DeleteNote { id } => Response::Persisted {
                persistence: self.delete_note(&id),
            },
            Request::EditTitle { title } => {
                self.edit_title(title, now)?;
                Response::Ok
            }
            Request::EditContent { content } => {
                self.edit_content(content, now)?;
                Response::Ok
            }
            Request::Flush => match self.flush(now) {
                Some(commit) => Response::from(&commit),
                None => Response::Ok,
            },
            Request::ToggleFavorite { id } => Response::Persisted {
                persistence: self.toggle_favorite(&id),
            },
            Request::MoveNote { id, folder_id } => Response::Persisted {
                persistence: self.move_note(&id, folder_id.as_deref())?,
            },
            Request::CreateFolder { name } => Response::Created {
                id: self.create_folder(name)?,
            },
            Request::RenameFolder { id, name } => Response::Persisted {
                persistence: Some(self.rename_folder(&id, name)?),
            },
            Request::DeleteFolder { id } => Response::Persisted {
                persistence: Some(self.delete_folder(&id)?),
            },
            Request::Ai { action } => {
                return Ok(match self.begin_ai(action, now)? {
                    Some(request) => Handled::Ai(request),
                    None => Handled::Reply(Response::AiSkipped),
                });
            }
            Request::ExportArchive { path } => {
                let archive = self.export_archive(now)?;
                fs::write(&path, &archive)?;
                info!("exported {} bytes to \"{}\"", archive.len(), path.display());
                Response::Archive {
                    path,
                    bytes: archive.len(),
                }
            }
            Request::ImportArchive { path } => {
                let archive = fs::read(&path)?;
                Response::Persisted {
                    persistence: Some(self.import_archive(&archive, now)?),
                }
            }
        };
        Ok(Handled::Reply(resp))
    }
}
