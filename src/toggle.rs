use anyhow::Context as _;
use kuchiki::NodeRef;
use kuchiki::iter::NodeIterator as _;
use kuchiki::traits::TendrilSink as _;
use maud::{Markup, html};

use crate::dom::Document;
use crate::preference::{PreferenceStore, StorageError};
use crate::storage::StorageBackend;
use crate::theme;

pub const TOGGLE_WRAP_ID: &str = "jenkins-dark-toggle-wrap";
pub const TOGGLE_BUTTON_ID: &str = "jenkins-dark-toggle-btn";
pub const TOGGLE_LABEL: &str = "Toggle Dark";

const WRAP_STYLE: &str = "position: fixed; bottom: 20px; left: 20px; z-index: 9999; \
    padding: 1.5px; border-radius: 8px; background-color: rgba(255, 255, 255, 0.9); \
    box-shadow: 0 6px 18px rgba(0,0,0,0.5); backdrop-filter: blur(6px);";

const BUTTON_STYLE: &str = "cursor: pointer; border: none; background: transparent; \
    color: inherit; padding: 9.5px 18px; border-radius: 4px; font-size: 10px; \
    outline: none; box-sizing: border-box;";

/// The floating on/off button.
///
/// Clicks are serialized: each one holds the gate for its whole
/// read-flip-write-apply sequence, so `n` clicks always flip the flag `n`
/// times regardless of how they overlap.
pub struct ToggleControl {
    button: NodeRef,
    created: bool,
    gate: tokio::sync::Mutex<()>,
}

impl ToggleControl {
    /// Attaches to the page's control, creating it first if the page has none.
    pub fn ensure(doc: &Document) -> anyhow::Result<Self> {
        if let Some(button) = doc.element_by_id(TOGGLE_BUTTON_ID) {
            tracing::debug!("toggle control already present");
            return Ok(Self::attach(button, false));
        }

        let fragment = kuchiki::parse_html().one(toggle_markup().into_string());
        let wrap = fragment
            .select_first(&format!("#{TOGGLE_WRAP_ID}"))
            .ok()
            .context("toggle markup lost its wrapper")?
            .as_node()
            .clone();
        let button = wrap
            .select_first(&format!("#{TOGGLE_BUTTON_ID}"))
            .ok()
            .context("toggle markup lost its button")?
            .as_node()
            .clone();
        doc.append_child(doc.body(), wrap);
        tracing::debug!("toggle control created");
        Ok(Self::attach(button, true))
    }

    fn attach(button: NodeRef, created: bool) -> Self {
        Self {
            button,
            created,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn button(&self) -> &NodeRef {
        &self.button
    }

    /// Whether `ensure` inserted the control rather than finding one.
    pub fn created(&self) -> bool {
        self.created
    }

    /// One click: read the flag, persist its negation, apply it. Returns the
    /// new flag.
    pub async fn click<B: StorageBackend>(
        &self,
        doc: &Document,
        store: &PreferenceStore<B>,
    ) -> Result<bool, StorageError> {
        let _turn = self.gate.lock().await;
        let current = store.get_enabled().await?;
        let next = !current;
        store.set_enabled(next).await?;
        theme::apply_state(doc, next);
        Ok(next)
    }

    /// `click` as the page sees it: failures are logged and the page keeps
    /// its current look.
    pub async fn on_click<B: StorageBackend>(
        &self,
        doc: &Document,
        store: &PreferenceStore<B>,
    ) -> Option<bool> {
        match self.click(doc, store).await {
            Ok(enabled) => Some(enabled),
            Err(e) => {
                tracing::error!(error = %e, "toggle dark mode");
                None
            }
        }
    }
}

fn toggle_markup() -> Markup {
    html! {
        div id=(TOGGLE_WRAP_ID) style=(WRAP_STYLE) {
            button type="button" id=(TOGGLE_BUTTON_ID) style=(BUTTON_STYLE) { (TOGGLE_LABEL) }
        }
    }
}
