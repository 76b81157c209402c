use crate::dom::{self, Document};

/// Class on `<html>` that the dark stylesheet keys off.
pub const ROOT_CLASS: &str = "jenkins-dark-material-enabled";

pub fn apply_state(doc: &Document, enabled: bool) {
    let root = doc.document_element();
    let changed = if enabled {
        dom::add_class(root, ROOT_CLASS)
    } else {
        dom::remove_class(root, ROOT_CLASS)
    };
    if changed {
        tracing::info!(enabled, "dark mode applied");
    }
}

pub fn is_applied(doc: &Document) -> bool {
    dom::has_class(doc.document_element(), ROOT_CLASS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_leaves_no_class_behind() {
        let doc = Document::parse(r#"<html class="no-js"><body></body></html>"#).unwrap();

        apply_state(&doc, true);
        apply_state(&doc, true);
        assert!(is_applied(&doc));
        assert_eq!(
            dom::attribute(doc.document_element(), "class").as_deref(),
            Some("no-js jenkins-dark-material-enabled")
        );

        apply_state(&doc, false);
        assert!(!is_applied(&doc));
        assert_eq!(
            dom::attribute(doc.document_element(), "class").as_deref(),
            Some("no-js")
        );
    }

    #[test]
    fn disabling_unstyled_root_is_a_no_op() {
        let doc = Document::parse("<p>hi</p>").unwrap();
        apply_state(&doc, false);
        assert!(dom::attribute(doc.document_element(), "class").is_none());
    }
}
