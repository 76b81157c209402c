use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context as _;
use kuchiki::NodeRef;
use kuchiki::iter::NodeIterator as _;
use kuchiki::traits::TendrilSink as _;
use tokio::sync::{Notify, mpsc, watch};

/// Loading phase of a page, mirroring `document.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

/// Nodes inserted under `target` by a single DOM operation.
#[derive(Clone)]
pub struct MutationRecord {
    pub target: NodeRef,
    pub added_nodes: Vec<NodeRef>,
}

pub type MutationBatch = Vec<MutationRecord>;
pub type MutationReceiver = mpsc::UnboundedReceiver<MutationBatch>;

struct Observer {
    target: NodeRef,
    tx: mpsc::UnboundedSender<MutationBatch>,
}

struct Inner {
    tree: NodeRef,
    html: NodeRef,
    body: NodeRef,
    ready: watch::Sender<ReadyState>,
    ready_waiter: Notify,
    observers: RefCell<Vec<Observer>>,
}

/// A parsed page plus the pieces of browser behaviour the content script
/// relies on: readiness, subtree observation and class-list edits.
///
/// Handles are cheap to clone and share one tree. Dropping the last handle
/// closes every observer channel, which is how a watcher learns the page
/// went away.
#[derive(Clone)]
pub struct Document {
    inner: Rc<Inner>,
}

impl Document {
    pub fn parse(html: &str) -> anyhow::Result<Self> {
        let tree = kuchiki::parse_html().one(html);
        let root = tree
            .select_first("html")
            .ok()
            .context("document has no <html> element")?
            .as_node()
            .clone();
        let body = tree
            .select_first("body")
            .ok()
            .context("document has no <body> element")?
            .as_node()
            .clone();
        let (ready, _) = watch::channel(ReadyState::Loading);

        Ok(Self {
            inner: Rc::new(Inner {
                tree,
                html: root,
                body,
                ready,
                ready_waiter: Notify::new(),
                observers: RefCell::new(Vec::new()),
            }),
        })
    }

    pub fn document_element(&self) -> &NodeRef {
        &self.inner.html
    }

    pub fn body(&self) -> &NodeRef {
        &self.inner.body
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeRef> {
        self.inner
            .tree
            .descendants()
            .elements()
            .find(|el| el.attributes.borrow().get("id") == Some(id))
            .map(|el| el.as_node().clone())
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.inner.ready.borrow()
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        let previous = self.inner.ready.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "document ready state changed");
        }
    }

    /// Resolves once the document is no longer `Loading`.
    pub async fn wait_ready(&self) {
        let mut rx = self.inner.ready.subscribe();
        if *rx.borrow() == ReadyState::Loading {
            self.inner.ready_waiter.notify_one();
        }
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|state| *state != ReadyState::Loading).await;
    }

    /// Resolves once something is blocked in `wait_ready` on a loading
    /// document. A wait that started earlier counts.
    pub async fn ready_awaited(&self) {
        self.inner.ready_waiter.notified().await;
    }

    /// Subscribes to child-list mutations anywhere in the subtree of `target`.
    pub fn observe(&self, target: &NodeRef) -> MutationReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.observers.borrow_mut().push(Observer {
            target: target.clone(),
            tx,
        });
        rx
    }

    pub fn append_child(&self, parent: &NodeRef, node: NodeRef) {
        parent.append(node.clone());
        self.notify(MutationRecord {
            target: parent.clone(),
            added_nodes: vec![node],
        });
    }

    /// Parses `fragment` the way `innerHTML` would inside `parent` and
    /// appends the resulting nodes to `parent` as one mutation batch.
    pub fn append_html(&self, parent: &NodeRef, fragment: &str) -> anyhow::Result<Vec<NodeRef>> {
        let context = parent
            .as_element()
            .or_else(|| self.inner.body.as_element())
            .context("no element to parse the fragment in")?
            .name
            .clone();
        let parsed = kuchiki::parse_fragment(context, vec![]).one(fragment);
        let fragment_root = parsed
            .first_child()
            .context("fragment parsed to an empty tree")?;
        let added: Vec<NodeRef> = fragment_root.children().collect();
        for node in &added {
            parent.append(node.clone());
        }
        if !added.is_empty() {
            self.notify(MutationRecord {
                target: parent.clone(),
                added_nodes: added.clone(),
            });
        }
        Ok(added)
    }

    pub fn serialize(&self) -> anyhow::Result<String> {
        let mut out = Vec::new();
        self.inner
            .tree
            .serialize(&mut out)
            .context("serialize document")?;
        String::from_utf8(out).context("document html not utf-8")
    }

    fn notify(&self, record: MutationRecord) {
        let mut observers = self.inner.observers.borrow_mut();
        observers.retain(|o| !o.tx.is_closed());
        for observer in observers.iter() {
            if record
                .target
                .inclusive_ancestors()
                .any(|node| node == observer.target)
            {
                let _ = observer.tx.send(vec![record.clone()]);
            }
        }
    }
}

pub fn local_name(node: &NodeRef) -> Option<&str> {
    node.as_element().map(|el| &*el.name.local)
}

pub fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    let el = node.as_element()?;
    el.attributes.borrow().get(name).map(|s| s.to_string())
}

pub fn has_class(node: &NodeRef, class: &str) -> bool {
    let Some(el) = node.as_element() else {
        return false;
    };
    el.attributes
        .borrow()
        .get("class")
        .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
}

/// Adds `class` unless already present. Returns whether the element changed.
pub fn add_class(node: &NodeRef, class: &str) -> bool {
    let Some(el) = node.as_element() else {
        return false;
    };
    let mut attrs = el.attributes.borrow_mut();
    let current = attrs.get("class").unwrap_or("");
    if current.split_ascii_whitespace().any(|c| c == class) {
        return false;
    }
    let next = if current.trim().is_empty() {
        class.to_string()
    } else {
        format!("{} {}", current.trim_end(), class)
    };
    attrs.insert("class", next);
    true
}

/// Removes every occurrence of `class`. Returns whether the element changed.
pub fn remove_class(node: &NodeRef, class: &str) -> bool {
    let Some(el) = node.as_element() else {
        return false;
    };
    let mut attrs = el.attributes.borrow_mut();
    let Some(current) = attrs.get("class") else {
        return false;
    };
    let kept: Vec<&str> = current
        .split_ascii_whitespace()
        .filter(|c| *c != class)
        .collect();
    if kept.len() == current.split_ascii_whitespace().count() {
        return false;
    }
    let next = kept.join(" ");
    if next.is_empty() {
        attrs.remove("class");
    } else {
        attrs.insert("class", next);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html><html><head></head><body><div id="main"><p class="a b">x</p></div></body></html>"#;

    #[test]
    fn class_edits_are_idempotent() {
        let doc = Document::parse(PAGE).unwrap();
        let p = doc.body().select_first("p").unwrap().as_node().clone();

        assert!(add_class(&p, "c"));
        assert!(!add_class(&p, "c"));
        assert_eq!(attribute(&p, "class").as_deref(), Some("a b c"));

        assert!(remove_class(&p, "a"));
        assert!(!remove_class(&p, "a"));
        assert!(remove_class(&p, "b"));
        assert!(remove_class(&p, "c"));
        assert!(attribute(&p, "class").is_none());
    }

    #[test]
    fn element_by_id_finds_nested_elements() {
        let doc = Document::parse(PAGE).unwrap();
        let main = doc.element_by_id("main").unwrap();
        assert_eq!(local_name(&main), Some("div"));
        assert!(doc.element_by_id("missing").is_none());
    }

    #[tokio::test]
    async fn wait_ready_resolves_after_loading() {
        let doc = Document::parse(PAGE).unwrap();
        assert_eq!(doc.ready_state(), ReadyState::Loading);

        let waiter = doc.clone();
        tokio::join!(waiter.wait_ready(), async {
            tokio::task::yield_now().await;
            doc.set_ready_state(ReadyState::Interactive);
        });
        assert_eq!(doc.ready_state(), ReadyState::Interactive);

        // Already ready: returns immediately.
        doc.wait_ready().await;
    }

    #[tokio::test]
    async fn ready_awaited_sees_an_earlier_waiter() {
        let doc = Document::parse(PAGE).unwrap();
        let waiter = doc.clone();
        tokio::join!(waiter.wait_ready(), async {
            tokio::task::yield_now().await;
            doc.ready_awaited().await;
            assert_eq!(doc.ready_state(), ReadyState::Loading);
            doc.set_ready_state(ReadyState::Interactive);
        });
    }

    #[test]
    fn observers_only_see_their_subtree() {
        let doc = Document::parse(PAGE).unwrap();
        let main = doc.element_by_id("main").unwrap();
        let mut body_rx = doc.observe(doc.body());
        let mut main_rx = doc.observe(&main);

        let head = doc.inner.tree.select_first("head").unwrap().as_node().clone();
        doc.append_html(&head, "<span>ignored</span>").unwrap();
        doc.append_html(doc.body(), "<span>outside main</span>")
            .unwrap();
        doc.append_html(&main, "<img src=a.png><img src=b.png>")
            .unwrap();

        let first = body_rx.try_recv().unwrap();
        assert_eq!(first[0].added_nodes.len(), 1);
        let second = body_rx.try_recv().unwrap();
        assert_eq!(second[0].added_nodes.len(), 2);
        assert!(body_rx.try_recv().is_err());

        let only = main_rx.try_recv().unwrap();
        assert!(only[0].target == main);
        assert!(main_rx.try_recv().is_err());
    }

    #[test]
    fn append_html_keeps_head_only_elements() {
        let doc = Document::parse(PAGE).unwrap();
        let added = doc
            .append_html(
                doc.body(),
                "<style>.x{}</style><link rel=stylesheet href=a.css><img src=logo.png>",
            )
            .unwrap();

        let names: Vec<_> = added.iter().filter_map(local_name).collect();
        assert_eq!(names, ["style", "link", "img"]);
        let out = doc.serialize().unwrap();
        assert!(out.contains("<style>.x{}</style>"));
        assert!(out.contains(r#"<img src="logo.png"></body>"#));
    }
}
