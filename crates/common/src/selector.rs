//! Selector derivation shared between the in-page recorder and replay.
//!
//! The recorder's injected script and any server-side tooling must derive
//! selectors identically, otherwise recorded sequences stop replaying.
//! Both sides therefore embed this one algorithm; bump
//! [`SELECTOR_ALGORITHM_VERSION`] on any change.
//!
//! The heuristic: an element with an id becomes `#id`; anything else
//! becomes a root-down chain of `tag.class1.class2` segments joined with
//! ` > `. It is deliberately not guaranteed unique.

/// Version of the selector heuristic. Recorded steps carry selectors from
/// exactly one version; replaying across versions is unsupported.
pub const SELECTOR_ALGORITHM_VERSION: u32 = 1;

/// JavaScript implementation injected into recorded pages.
///
/// Declared as a bare function expression so the capture script can embed
/// it as a method.
pub const SELECTOR_FUNCTION_JS: &str = r#"function(element) {
    if (element.id) {
        return '#' + element.id;
    }
    let path = [];
    while (element && element.nodeType === Node.ELEMENT_NODE) {
        let selector = element.nodeName.toLowerCase();
        if (element.className && typeof element.className === 'string') {
            selector += '.' + element.className.trim().split(/\s+/).join('.');
        }
        path.unshift(selector);
        element = element.parentNode;
    }
    return path.join(' > ');
}"#;

/// Minimal element description for the Rust-side reference implementation.
#[derive(Debug, Clone, Default)]
pub struct ElementDesc {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl ElementDesc {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes = classes.into_iter().map(Into::into).collect();
        self
    }

    fn segment(&self) -> String {
        let mut seg = self.tag.to_lowercase();
        for class in &self.classes {
            let class = class.trim();
            if !class.is_empty() {
                seg.push('.');
                seg.push_str(class);
            }
        }
        seg
    }
}

/// Derive a selector for the last element of `path` (root first, target
/// last), mirroring [`SELECTOR_FUNCTION_JS`].
pub fn derive_selector(path: &[ElementDesc]) -> String {
    let Some(target) = path.last() else {
        return String::new();
    };
    if let Some(id) = target.id.as_deref().filter(|id| !id.is_empty()) {
        return format!("#{}", id);
    }
    path.iter()
        .map(ElementDesc::segment)
        .collect::<Vec<_>>()
        .join(" > ")
}
