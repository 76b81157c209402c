use kuchiki::NodeRef;
use kuchiki::iter::NodeIterator as _;
use serde::Serialize;

use crate::dom;

/// Marker class telling the theme stylesheet not to invert an element.
pub const NO_INVERT_CLASS: &str = "jenkins-dark-no-invert";

/// Signals that an image or vector graphic is a logo or icon.
#[derive(Debug, Clone)]
pub struct ClassifierRules {
    /// Substrings of an image source that mark it as a logo/icon.
    pub keywords: Vec<String>,
    /// Classes on an `<svg>` that mark it as a logo/icon.
    pub vector_classes: Vec<String>,
    /// Anything narrower or shorter than this is treated as an icon.
    pub min_dimension: f64,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            keywords: ["logo", "jenkins", "icon"].map(String::from).to_vec(),
            vector_classes: ["logo", "icon"].map(String::from).to_vec(),
            min_dimension: 16.0,
        }
    }
}

/// What a node looks like to the classifier.
pub enum Graphic {
    Image,
    VectorGraphic,
    Other,
}

impl Graphic {
    pub fn of(node: &NodeRef) -> Self {
        match dom::local_name(node) {
            Some("img") => Graphic::Image,
            Some("svg") => Graphic::VectorGraphic,
            _ => Graphic::Other,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub images: usize,
    pub vector_graphics: usize,
    pub exempted: usize,
}

impl ScanStats {
    pub fn merge(&mut self, other: ScanStats) {
        self.images += other.images;
        self.vector_graphics += other.vector_graphics;
        self.exempted += other.exempted;
    }
}

impl ClassifierRules {
    /// Classifies `root` and every element below it.
    pub fn scan(&self, root: &NodeRef) -> ScanStats {
        let mut stats = ScanStats::default();
        for el in root.inclusive_descendants().elements() {
            let node = el.as_node();
            let exempt = match Graphic::of(node) {
                Graphic::Image => {
                    stats.images += 1;
                    self.image_is_exempt(node)
                }
                Graphic::VectorGraphic => {
                    stats.vector_graphics += 1;
                    self.vector_is_exempt(node)
                }
                Graphic::Other => continue,
            };
            if exempt && dom::add_class(node, NO_INVERT_CLASS) {
                stats.exempted += 1;
            }
        }
        stats
    }

    pub fn image_is_exempt(&self, img: &NodeRef) -> bool {
        let src = effective_source(img).unwrap_or_default().to_lowercase();
        if !src.is_empty() && self.keywords.iter().any(|k| src.contains(k.as_str())) {
            return true;
        }
        self.is_small(img)
    }

    pub fn vector_is_exempt(&self, svg: &NodeRef) -> bool {
        if self
            .vector_classes
            .iter()
            .any(|class| dom::has_class(svg, class))
        {
            return true;
        }
        self.is_small(svg)
    }

    fn is_small(&self, node: &NodeRef) -> bool {
        ["width", "height"].into_iter().any(|name| {
            dom::attribute(node, name)
                .and_then(|v| parse_length(&v))
                .is_some_and(|v| v < self.min_dimension)
        })
    }
}

/// The source an image is showing: the best `srcset` candidate when there is
/// one, otherwise `src`.
pub fn effective_source(img: &NodeRef) -> Option<String> {
    if let Some(best) = dom::attribute(img, "srcset").and_then(|s| choose_best_src_from_srcset(&s))
    {
        return Some(best);
    }
    dom::attribute(img, "src")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn choose_best_src_from_srcset(srcset: &str) -> Option<String> {
    let mut best: Option<(f64, String)> = None;
    for part in srcset.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut pieces = part.split_whitespace();
        let url = pieces.next()?.to_string();
        let descriptor = pieces.next().unwrap_or("");
        let score = if descriptor.ends_with('w') || descriptor.ends_with('x') {
            descriptor[..descriptor.len().saturating_sub(1)]
                .parse::<f64>()
                .unwrap_or(0.0)
        } else {
            0.0
        };
        match &best {
            Some((best_score, _)) if *best_score >= score => {}
            _ => best = Some((score, url)),
        }
    }
    best.map(|(_, url)| url)
}

/// Absolute lengths only: `12`, `12.5`, `12px`. Relative units carry no size
/// signal without layout.
const RELATIVE_UNITS: &[&str] = &["em", "rem", "ex", "ch", "vw", "vh", "vmin", "vmax"];

/// Pixel value of a `width`/`height` attribute. The leading number counts
/// and trailing junk is ignored, as in HTML dimension parsing. Percentages
/// and relative units need layout, so they give no signal.
fn parse_length(raw: &str) -> Option<f64> {
    let v = raw.trim();
    let end = numeric_prefix_len(v);
    let n = v[..end].parse::<f64>().ok().filter(|n| n.is_finite())?;
    let unit = v[end..].trim_start();
    if unit.starts_with('%') || RELATIVE_UNITS.iter().any(|u| unit.eq_ignore_ascii_case(u)) {
        return None;
    }
    Some(n)
}

fn numeric_prefix_len(v: &str) -> usize {
    let bytes = v.as_bytes();
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };
    let int = digits(0);
    if bytes.get(int) == Some(&b'.') {
        let frac = digits(int + 1);
        if frac > 0 {
            return int + 1 + frac;
        }
    }
    int
}
