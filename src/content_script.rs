use crate::classify::{ClassifierRules, ScanStats};
use crate::dom::{Document, ReadyState};
use crate::preference::{PreferenceStore, StorageError};
use crate::storage::StorageBackend;
use crate::theme;
use crate::toggle::ToggleControl;
use crate::watch::DomWatcher;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("read dark mode preference: {0}")]
    Preference(#[from] StorageError),
    #[error("create toggle control: {0:#}")]
    Control(anyhow::Error),
}

/// A page with the content script running on it.
pub struct Session<B> {
    doc: Document,
    store: PreferenceStore<B>,
    control: ToggleControl,
    watcher: DomWatcher,
    initial_scan: ScanStats,
}

/// Reads the flag and applies it right away, then once the document is ready
/// adds the control, classifies existing graphics and starts watching.
pub async fn bootstrap<B: StorageBackend>(
    doc: Document,
    store: PreferenceStore<B>,
    rules: ClassifierRules,
) -> Result<Session<B>, InitError> {
    let enabled = store.get_enabled().await?;
    theme::apply_state(&doc, enabled);

    doc.wait_ready().await;

    let control = ToggleControl::ensure(&doc).map_err(InitError::Control)?;
    let initial_scan = rules.scan(doc.body());
    tracing::info!(
        enabled,
        images = initial_scan.images,
        vector_graphics = initial_scan.vector_graphics,
        exempted = initial_scan.exempted,
        "dark mode initialized"
    );
    let watcher = DomWatcher::observe(&doc, rules);

    Ok(Session {
        doc,
        store,
        control,
        watcher,
        initial_scan,
    })
}

/// `bootstrap` as run on a live page: a failed start is logged and the page
/// is left as it is.
pub async fn start<B: StorageBackend>(
    doc: Document,
    store: PreferenceStore<B>,
    rules: ClassifierRules,
) -> Option<Session<B>> {
    match bootstrap(doc, store, rules).await {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::error!(error = %e, "initialize dark mode");
            None
        }
    }
}

/// `start` on a page that is still loading. The document turns interactive
/// only once the script is parked waiting for it, so the stored flag is on
/// `<html>` before the page finishes parsing.
pub async fn start_with_page<B: StorageBackend>(
    doc: Document,
    store: PreferenceStore<B>,
    rules: ClassifierRules,
) -> Option<Session<B>> {
    let page = doc.clone();
    let script = start(doc, store, rules);
    tokio::pin!(script);
    tokio::select! {
        biased;
        session = &mut script => session,
        () = page.ready_awaited() => {
            page.set_ready_state(ReadyState::Interactive);
            script.await
        }
    }
}

impl<B: StorageBackend> Session<B> {
    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn store(&self) -> &PreferenceStore<B> {
        &self.store
    }

    pub fn control(&self) -> &ToggleControl {
        &self.control
    }

    pub fn initial_scan(&self) -> ScanStats {
        self.initial_scan
    }

    /// Graphics classified by the watcher since bootstrap.
    pub fn watched(&self) -> ScanStats {
        self.watcher.totals()
    }

    /// A user click on the toggle.
    pub async fn click(&self) -> Option<bool> {
        self.control.on_click(&self.doc, &self.store).await
    }

    /// Lets the watcher catch up with insertions made so far.
    pub fn pump(&mut self) -> ScanStats {
        self.watcher.drain()
    }

    /// Runs the watcher until every other handle to the document is
    /// dropped, i.e. until the page unloads. Returns the watcher's totals.
    pub async fn run_watcher(self) -> ScanStats {
        let Session { doc, watcher, .. } = self;
        drop(doc);
        watcher.run().await
    }
}
