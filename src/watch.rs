use crate::classify::{ClassifierRules, ScanStats};
use crate::dom::{Document, MutationBatch, MutationReceiver};

/// Re-runs the classifier on content the page inserts after load.
pub struct DomWatcher {
    rx: MutationReceiver,
    rules: ClassifierRules,
    totals: ScanStats,
}

impl DomWatcher {
    /// Starts observing insertions anywhere under `<body>`.
    pub fn observe(doc: &Document, rules: ClassifierRules) -> Self {
        Self {
            rx: doc.observe(doc.body()),
            rules,
            totals: ScanStats::default(),
        }
    }

    /// Everything this watcher has classified so far.
    pub fn totals(&self) -> ScanStats {
        self.totals
    }

    /// Classifies the inserted element nodes of one batch. Text and comment
    /// nodes are skipped.
    pub fn process(&mut self, batch: &MutationBatch) -> ScanStats {
        let mut stats = ScanStats::default();
        for record in batch {
            for node in &record.added_nodes {
                if node.as_element().is_none() {
                    continue;
                }
                stats.merge(self.rules.scan(node));
            }
        }
        if stats.exempted > 0 {
            tracing::debug!(
                images = stats.images,
                vector_graphics = stats.vector_graphics,
                exempted = stats.exempted,
                "classified inserted content"
            );
        }
        self.totals.merge(stats);
        stats
    }

    /// Handles every batch already delivered, without waiting for more.
    pub fn drain(&mut self) -> ScanStats {
        let mut stats = ScanStats::default();
        while let Ok(batch) = self.rx.try_recv() {
            stats.merge(self.process(&batch));
        }
        stats
    }

    /// Handles batches until the page goes away.
    pub async fn run(mut self) -> ScanStats {
        while let Some(batch) = self.rx.recv().await {
            self.process(&batch);
        }
        tracing::debug!("document dropped; watcher stopped");
        self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::NO_INVERT_CLASS;
    use crate::dom;

    const PAGE: &str = r#"<!doctype html><html><head></head><body><div id="app"></div></body></html>"#;

    #[test]
    fn classifies_inserted_nodes_and_their_descendants() {
        let doc = Document::parse(PAGE).unwrap();
        let mut watcher = DomWatcher::observe(&doc, ClassifierRules::default());
        let app = doc.element_by_id("app").unwrap();

        let added = doc
            .append_html(
                &app,
                r#"<img src="/static/icon-small.svg">text<section><svg class="logo"></svg><img src="photo.jpg" width="400" height="300"></section>"#,
            )
            .unwrap();
        let stats = watcher.drain();

        assert_eq!(stats.images, 2);
        assert_eq!(stats.vector_graphics, 1);
        assert_eq!(stats.exempted, 2);
        assert!(dom::has_class(&added[0], NO_INVERT_CLASS));
        assert_eq!(watcher.totals(), stats);
    }

    #[test]
    fn ignores_insertions_outside_body() {
        let doc = Document::parse(PAGE).unwrap();
        let mut watcher = DomWatcher::observe(&doc, ClassifierRules::default());
        let head = doc
            .document_element()
            .select_first("head")
            .unwrap()
            .as_node()
            .clone();

        let added = doc.append_html(&head, r#"<img src="logo.png">"#).unwrap();
        assert_eq!(watcher.drain(), ScanStats::default());
        assert!(!dom::has_class(&added[0], NO_INVERT_CLASS));
    }

    #[tokio::test]
    async fn run_stops_when_document_is_dropped() {
        let doc = Document::parse(PAGE).unwrap();
        let watcher = DomWatcher::observe(&doc, ClassifierRules::default());
        doc.append_html(doc.body(), r#"<img src="icon.png"><img src="logo.png">"#)
            .unwrap();
        drop(doc);

        let totals = watcher.run().await;
        assert_eq!(totals.exempted, 2);
    }
}
