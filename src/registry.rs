//! Lazily loaded animation textures.
//!
//! The registry keeps one [`AnimationEntry`] per section. Requesting a
//! section starts fetching its position VAT (and color VAT, if any) through
//! an [`AssetSource`]; completions come back over a channel and are turned
//! into [`RegistryEvent`]s by [`AnimationRegistry::poll`], which the frame
//! loop calls once per frame on the render thread.
//!
//! # Load states
//!
//! ```text
//! Unloaded --request--> Loading --ok--> Loaded
//!                          |
//!                          +--error, retries left--> Loading (refetch)
//!                          +--error, out of retries--> Failed --request--> Loading
//! ```
//!
//! A request on a `Loading` entry is a no-op, so each section is fetched at
//! most once at a time. [`AnimationRegistry::reset_all`] returns every entry
//! to `Unloaded` and starts a new session; completions belonging to an
//! earlier session are discarded.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use crate::error::TextureError;
use crate::section::{SectionKey, SectionMap, SectionTable, TextureSource};
use crate::textures::{FilterMode, TextureData};

/// Load state of a section's position VAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    /// Every attempt failed. A new request starts over.
    Failed,
}

/// Which of a section's textures a fetch is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Position,
    Color,
}

/// Identifies one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub session: u64,
    pub key: SectionKey,
    pub kind: TextureKind,
    /// 0 for the first attempt.
    pub attempt: u32,
}

/// A texture the registry wants fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    /// Path relative to the asset root.
    pub path: String,
    pub filter: FilterMode,
}

/// Result of a fetch, sent back to the registry.
#[derive(Debug)]
pub struct LoadCompletion {
    pub ticket: FetchTicket,
    pub result: Result<TextureData, TextureError>,
}

/// Something that can fetch and decode textures.
///
/// Implementations must eventually send exactly one [`LoadCompletion`] per
/// request on `reply`, from any thread.
pub trait AssetSource {
    fn fetch(&mut self, request: FetchRequest, reply: Sender<LoadCompletion>);
}

/// Reads textures from files below a root directory, decoding each on its
/// own worker thread.
#[derive(Debug, Clone)]
pub struct FileAssetSource {
    root: PathBuf,
}

impl FileAssetSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for FileAssetSource {
    fn fetch(&mut self, request: FetchRequest, reply: Sender<LoadCompletion>) {
        let path = self.root.join(&request.path);
        let ticket = request.ticket;
        let filter = request.filter;
        let fallback = reply.clone();

        let spawned = thread::Builder::new()
            .name(format!("vat-{}", ticket.key))
            .spawn(move || {
                let result = TextureData::from_file(&path, filter);
                // The registry may be gone; nothing to do then.
                let _ = reply.send(LoadCompletion { ticket, result });
            });

        if let Err(e) = spawned {
            let _ = fallback.send(LoadCompletion {
                ticket,
                result: Err(TextureError::Io(e)),
            });
        }
    }
}

/// Registry state for one section.
#[derive(Debug, Clone)]
pub struct AnimationEntry {
    pub key: SectionKey,
    pub position: TextureSource,
    pub color: Option<TextureSource>,
    state: LoadState,
    color_state: LoadState,
}

impl AnimationEntry {
    /// Load state of the position VAT.
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Load state of the color VAT. Never affects [`state`](Self::state).
    pub fn color_state(&self) -> LoadState {
        self.color_state
    }
}

/// What a [`AnimationRegistry::request`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Textures are already bound.
    AlreadyLoaded,
    /// A fetch is in flight; nothing new was started.
    InFlight,
    /// Fetches were started.
    Started,
}

/// Something that happened to a section's textures.
#[derive(Debug)]
pub enum RegistryEvent {
    /// Position VAT decoded and ready to bind into the simulation pass.
    PositionReady { key: SectionKey, texture: TextureData },
    /// Color VAT decoded and ready to bind into the render pass.
    ColorReady { key: SectionKey, texture: TextureData },
    /// Out of retries. The previous binding stays in place.
    Failed {
        key: SectionKey,
        kind: TextureKind,
        error: String,
    },
}

/// The per-section texture load state machine.
pub struct AnimationRegistry {
    entries: SectionMap<AnimationEntry>,
    source: Box<dyn AssetSource>,
    tx: Sender<LoadCompletion>,
    rx: Receiver<LoadCompletion>,
    session: u64,
    max_retries: u32,
    fetches: u64,
}

impl std::fmt::Debug for AnimationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationRegistry")
            .field("entries", &self.entries)
            .field("session", &self.session)
            .field("max_retries", &self.max_retries)
            .field("fetches", &self.fetches)
            .finish()
    }
}

impl AnimationRegistry {
    /// Create a registry with an `Unloaded` entry for every section.
    pub fn new(table: &SectionTable, source: Box<dyn AssetSource>, max_retries: u32) -> Self {
        let (tx, rx) = mpsc::channel();
        let entries = SectionMap::from_fn(|key| {
            let config = table.get(key);
            AnimationEntry {
                key,
                position: config.position.clone(),
                color: config.color.clone(),
                state: LoadState::Unloaded,
                color_state: LoadState::Unloaded,
            }
        });
        Self {
            entries,
            source,
            tx,
            rx,
            session: 0,
            max_retries,
            fetches: 0,
        }
    }

    pub fn entry(&self, key: SectionKey) -> &AnimationEntry {
        &self.entries[key]
    }

    pub fn state(&self, key: SectionKey) -> LoadState {
        self.entries[key].state
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Total fetches issued, retries included.
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    /// Make sure `key`'s textures are loaded or loading.
    ///
    /// A color texture that previously failed gets a fresh attempt cycle on
    /// every request, even when the position texture is already loaded.
    pub fn request(&mut self, key: SectionKey) -> RequestOutcome {
        match self.entries[key].state {
            LoadState::Loaded => {
                self.request_color(key);
                RequestOutcome::AlreadyLoaded
            }
            LoadState::Loading => RequestOutcome::InFlight,
            LoadState::Unloaded | LoadState::Failed => {
                log::debug!("loading textures for section {}", key);
                self.entries[key].state = LoadState::Loading;
                self.issue(key, TextureKind::Position, 0);
                self.request_color(key);
                RequestOutcome::Started
            }
        }
    }

    fn request_color(&mut self, key: SectionKey) {
        let entry = &mut self.entries[key];
        if entry.color.is_none()
            || !matches!(entry.color_state, LoadState::Unloaded | LoadState::Failed)
        {
            return;
        }
        entry.color_state = LoadState::Loading;
        self.issue(key, TextureKind::Color, 0);
    }

    fn issue(&mut self, key: SectionKey, kind: TextureKind, attempt: u32) {
        let entry = &self.entries[key];
        let source = match kind {
            TextureKind::Position => Some(&entry.position),
            TextureKind::Color => entry.color.as_ref(),
        };
        let Some(source) = source else {
            return;
        };
        let request = FetchRequest {
            ticket: FetchTicket {
                session: self.session,
                key,
                kind,
                attempt,
            },
            path: source.path.clone(),
            filter: source.filter,
        };
        log::debug!("fetching {} (attempt {})", request.path, attempt + 1);
        self.fetches += 1;
        self.source.fetch(request, self.tx.clone());
    }

    /// Drain completions that have arrived so far.
    pub fn poll(&mut self) -> Vec<RegistryEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(completion) => self.complete(completion, &mut events),
                Err(TryRecvError::Empty) => break,
                // The registry owns a sender, so this cannot happen.
                Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Like [`poll`](Self::poll), but waits up to `timeout` for the first
    /// completion.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Vec<RegistryEvent> {
        let mut events = Vec::new();
        if let Ok(completion) = self.rx.recv_timeout(timeout) {
            self.complete(completion, &mut events);
        }
        events.extend(self.poll());
        events
    }

    fn complete(&mut self, completion: LoadCompletion, events: &mut Vec<RegistryEvent>) {
        let LoadCompletion { ticket, result } = completion;
        if ticket.session != self.session {
            log::debug!(
                "dropping {:?} texture for {} from session {}",
                ticket.kind,
                ticket.key,
                ticket.session
            );
            return;
        }

        let key = ticket.key;
        let state = match ticket.kind {
            TextureKind::Position => self.entries[key].state,
            TextureKind::Color => self.entries[key].color_state,
        };
        if state != LoadState::Loading {
            log::debug!("ignoring unexpected {:?} completion for {}", ticket.kind, key);
            return;
        }

        match result {
            Ok(texture) => {
                log::debug!(
                    "{:?} texture for {} ready ({}x{})",
                    ticket.kind,
                    key,
                    texture.width,
                    texture.height
                );
                match ticket.kind {
                    TextureKind::Position => {
                        self.entries[key].state = LoadState::Loaded;
                        events.push(RegistryEvent::PositionReady { key, texture });
                    }
                    TextureKind::Color => {
                        self.entries[key].color_state = LoadState::Loaded;
                        events.push(RegistryEvent::ColorReady { key, texture });
                    }
                }
            }
            Err(error) if ticket.attempt < self.max_retries => {
                log::warn!(
                    "{:?} texture for {} failed ({}), retrying",
                    ticket.kind,
                    key,
                    error
                );
                self.issue(key, ticket.kind, ticket.attempt + 1);
            }
            Err(error) => {
                log::warn!(
                    "{:?} texture for {} failed after {} attempts: {}",
                    ticket.kind,
                    key,
                    ticket.attempt + 1,
                    error
                );
                match ticket.kind {
                    TextureKind::Position => self.entries[key].state = LoadState::Failed,
                    TextureKind::Color => self.entries[key].color_state = LoadState::Failed,
                }
                events.push(RegistryEvent::Failed {
                    key,
                    kind: ticket.kind,
                    error: error.to_string(),
                });
            }
        }
    }

    /// Forget everything: all entries become `Unloaded` and in-flight
    /// fetches are orphaned.
    pub fn reset_all(&mut self) {
        self.session += 1;
        for (_, entry) in self.entries.iter_mut() {
            entry.state = LoadState::Unloaded;
            entry.color_state = LoadState::Unloaded;
        }
        log::debug!("texture registry reset (session {})", self.session);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records requests; tests answer them by hand.
    #[derive(Clone, Default)]
    pub(crate) struct ManualSource {
        pub pending: Arc<Mutex<Vec<(FetchRequest, Sender<LoadCompletion>)>>>,
    }

    impl AssetSource for ManualSource {
        fn fetch(&mut self, request: FetchRequest, reply: Sender<LoadCompletion>) {
            self.pending.lock().unwrap().push((request, reply));
        }
    }

    impl ManualSource {
        pub fn len(&self) -> usize {
            self.pending.lock().unwrap().len()
        }

        /// Answer the oldest request for `key` and `kind`.
        pub fn answer(&self, key: SectionKey, kind: TextureKind, ok: bool) {
            let mut pending = self.pending.lock().unwrap();
            let i = pending
                .iter()
                .position(|(r, _)| r.ticket.key == key && r.ticket.kind == kind)
                .expect("no pending request");
            let (request, reply) = pending.remove(i);
            let result = if ok {
                Ok(TextureData::placeholder())
            } else {
                Err(TextureError::Empty { path: request.path })
            };
            reply
                .send(LoadCompletion {
                    ticket: request.ticket,
                    result,
                })
                .unwrap();
        }
    }

    fn registry(source: &ManualSource) -> AnimationRegistry {
        AnimationRegistry::new(&SectionTable::standard(), Box::new(source.clone()), 2)
    }

    #[test]
    fn test_request_is_single_flight() {
        let source = ManualSource::default();
        let mut reg = registry(&source);

        assert_eq!(reg.request(SectionKey::Telomere), RequestOutcome::Started);
        assert_eq!(reg.request(SectionKey::Telomere), RequestOutcome::InFlight);
        assert_eq!(reg.request(SectionKey::Telomere), RequestOutcome::InFlight);
        assert_eq!(source.len(), 1);
        assert_eq!(reg.state(SectionKey::Telomere), LoadState::Loading);

        source.answer(SectionKey::Telomere, TextureKind::Position, true);
        let events = reg.poll();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            RegistryEvent::PositionReady { key: SectionKey::Telomere, .. }
        ));
        assert_eq!(reg.state(SectionKey::Telomere), LoadState::Loaded);
        assert_eq!(reg.request(SectionKey::Telomere), RequestOutcome::AlreadyLoaded);
        assert_eq!(reg.fetch_count(), 1);
    }

    #[test]
    fn test_color_fetched_alongside_position() {
        let source = ManualSource::default();
        let mut reg = registry(&source);
        reg.request(SectionKey::Dna);
        assert_eq!(source.len(), 2);

        source.answer(SectionKey::Dna, TextureKind::Color, true);
        let events = reg.poll();
        assert!(matches!(events[0], RegistryEvent::ColorReady { .. }));
        // Color alone does not complete the entry.
        assert_eq!(reg.state(SectionKey::Dna), LoadState::Loading);
    }

    #[test]
    fn test_retries_then_fails_then_recovers() {
        let source = ManualSource::default();
        let mut reg = registry(&source);
        reg.request(SectionKey::Intro);

        for _ in 0..2 {
            source.answer(SectionKey::Intro, TextureKind::Position, false);
            assert!(reg.poll().is_empty());
            assert_eq!(reg.state(SectionKey::Intro), LoadState::Loading);
        }
        source.answer(SectionKey::Intro, TextureKind::Position, false);
        let events = reg.poll();
        assert!(matches!(
            events[0],
            RegistryEvent::Failed { key: SectionKey::Intro, kind: TextureKind::Position, .. }
        ));
        assert_eq!(reg.state(SectionKey::Intro), LoadState::Failed);
        assert_eq!(reg.fetch_count(), 3);

        assert_eq!(reg.request(SectionKey::Intro), RequestOutcome::Started);
        source.answer(SectionKey::Intro, TextureKind::Position, true);
        reg.poll();
        assert_eq!(reg.state(SectionKey::Intro), LoadState::Loaded);
    }

    #[test]
    fn test_color_failure_keeps_entry_state() {
        let source = ManualSource::default();
        let mut reg = registry(&source);
        reg.request(SectionKey::Cells);
        source.answer(SectionKey::Cells, TextureKind::Position, true);
        for _ in 0..3 {
            source.answer(SectionKey::Cells, TextureKind::Color, false);
            reg.poll();
        }
        assert_eq!(reg.state(SectionKey::Cells), LoadState::Loaded);
        assert_eq!(reg.entry(SectionKey::Cells).color_state(), LoadState::Failed);
    }

    #[test]
    fn test_failed_color_retried_on_later_request() {
        let source = ManualSource::default();
        let mut reg = registry(&source);
        reg.request(SectionKey::Cells);
        source.answer(SectionKey::Cells, TextureKind::Position, true);
        for _ in 0..3 {
            source.answer(SectionKey::Cells, TextureKind::Color, false);
            reg.poll();
        }
        assert_eq!(source.len(), 0);

        assert_eq!(reg.request(SectionKey::Cells), RequestOutcome::AlreadyLoaded);
        assert_eq!(reg.entry(SectionKey::Cells).color_state(), LoadState::Loading);
        assert_eq!(source.len(), 1);
        // Still single-flight while the retry is pending.
        assert_eq!(reg.request(SectionKey::Cells), RequestOutcome::AlreadyLoaded);
        assert_eq!(source.len(), 1);

        source.answer(SectionKey::Cells, TextureKind::Color, true);
        let events = reg.poll();
        assert!(matches!(
            events[0],
            RegistryEvent::ColorReady { key: SectionKey::Cells, .. }
        ));
        assert_eq!(reg.entry(SectionKey::Cells).color_state(), LoadState::Loaded);
        assert_eq!(reg.request(SectionKey::Cells), RequestOutcome::AlreadyLoaded);
        assert_eq!(source.len(), 0);
    }

    #[test]
    fn test_reset_drops_stale_completions() {
        let source = ManualSource::default();
        let mut reg = registry(&source);
        reg.request(SectionKey::Exosomes);
        reg.reset_all();
        assert_eq!(reg.state(SectionKey::Exosomes), LoadState::Unloaded);

        source.answer(SectionKey::Exosomes, TextureKind::Position, true);
        assert!(reg.poll().is_empty());
        assert_eq!(reg.state(SectionKey::Exosomes), LoadState::Unloaded);

        assert_eq!(reg.request(SectionKey::Exosomes), RequestOutcome::Started);
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_file_source_missing_file_fails() {
        let dir = std::env::temp_dir().join("vatflow-registry-missing");
        let mut reg = AnimationRegistry::new(
            &SectionTable::standard(),
            Box::new(FileAssetSource::new(&dir)),
            0,
        );
        reg.request(SectionKey::Telomere);
        let events = reg.poll_timeout(Duration::from_secs(5));
        assert!(matches!(events.as_slice(), [RegistryEvent::Failed { .. }]));
    }
}
