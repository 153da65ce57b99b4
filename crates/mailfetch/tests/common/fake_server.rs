//! In-memory mailbox that speaks the `MailConnection` protocol.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mailfetch::email::{EmailError, MailConnection, MailConnector, Result, ServerSettings};

/// Every command the server saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Login(String),
    Select(String),
    Search(String),
    Fetch(String),
    Close,
    Logout,
}

struct StoredMessage {
    uid: u32,
    raw: Vec<u8>,
    seen: bool,
}

#[derive(Default)]
struct ServerState {
    folders: BTreeMap<String, Vec<StoredMessage>>,
    next_uid: u32,
    reject_login: bool,
    connects: usize,
    events: Vec<ServerEvent>,
}

/// Cloning shares the mailbox, so a test can keep a handle after giving one to the engine.
#[derive(Clone, Default)]
pub struct FakeMailServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeMailServer {
    pub fn new() -> Self {
        let server = Self::default();
        server.add_folder("INBOX");
        server
    }

    pub fn add_folder(&self, folder: &str) {
        self.state
            .lock()
            .unwrap()
            .folders
            .entry(folder.to_string())
            .or_default();
    }

    /// Appends an unread message and returns its identifier.
    pub fn deliver(&self, folder: &str, raw: impl Into<Vec<u8>>) -> String {
        self.deliver_with_flags(folder, raw, false)
    }

    pub fn deliver_seen(&self, folder: &str, raw: impl Into<Vec<u8>>) -> String {
        self.deliver_with_flags(folder, raw, true)
    }

    fn deliver_with_flags(&self, folder: &str, raw: impl Into<Vec<u8>>, seen: bool) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_uid += 1;
        let uid = state.next_uid;
        state
            .folders
            .entry(folder.to_string())
            .or_default()
            .push(StoredMessage {
                uid,
                raw: raw.into(),
                seen,
            });
        uid.to_string()
    }

    pub fn reject_logins(&self) {
        self.state.lock().unwrap().reject_login = true;
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn is_seen(&self, folder: &str, id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.folders[folder]
            .iter()
            .any(|m| m.uid.to_string() == id && m.seen)
    }
}

#[async_trait]
impl MailConnector for FakeMailServer {
    async fn connect(&self, settings: &ServerSettings) -> Result<Box<dyn MailConnection>> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        state.events.push(ServerEvent::Login(settings.address.clone()));
        if state.reject_login {
            return Err(EmailError::Authentication(
                "[AUTHENTICATIONFAILED] Invalid credentials".to_string(),
            ));
        }
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
            selected: None,
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<ServerState>>,
    selected: Option<String>,
}

impl FakeConnection {
    fn selected(&self) -> Result<&str> {
        self.selected
            .as_deref()
            .ok_or_else(|| EmailError::Protocol("no mailbox selected".to_string()))
    }
}

#[async_trait]
impl MailConnection for FakeConnection {
    async fn select(&mut self, folder: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(ServerEvent::Select(folder.to_string()));
        if !state.folders.contains_key(folder) {
            return Err(EmailError::FolderNotFound {
                folder: folder.to_string(),
                reason: "NO [NONEXISTENT] Unknown Mailbox".to_string(),
            });
        }
        self.selected = Some(folder.to_string());
        Ok(())
    }

    async fn search(&mut self, criteria: &str) -> Result<Vec<String>> {
        let folder = self.selected()?.to_string();
        let mut state = self.state.lock().unwrap();
        state.events.push(ServerEvent::Search(criteria.to_string()));

        let messages = &state.folders[&folder];
        let ids = match criteria.to_ascii_uppercase().as_str() {
            "ALL" => messages.iter().map(|m| m.uid.to_string()).collect(),
            "UNSEEN" => messages
                .iter()
                .filter(|m| !m.seen)
                .map(|m| m.uid.to_string())
                .collect(),
            "SEEN" => messages
                .iter()
                .filter(|m| m.seen)
                .map(|m| m.uid.to_string())
                .collect(),
            _ => {
                return Err(EmailError::Search {
                    query: criteria.to_string(),
                    reason: "BAD Invalid search criteria".to_string(),
                })
            }
        };
        Ok(ids)
    }

    async fn fetch(&mut self, id: &str) -> Result<Option<Vec<u8>>> {
        let folder = self.selected()?.to_string();
        let mut state = self.state.lock().unwrap();
        state.events.push(ServerEvent::Fetch(id.to_string()));

        Ok(state.folders[&folder]
            .iter()
            .find(|m| m.uid.to_string() == id)
            .map(|m| m.raw.clone()))
    }

    async fn close(&mut self) -> Result<()> {
        self.selected = None;
        self.state.lock().unwrap().events.push(ServerEvent::Close);
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.state.lock().unwrap().events.push(ServerEvent::Logout);
        Ok(())
    }
}
