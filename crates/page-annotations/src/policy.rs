use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationPolicy {
    /// Elements skipped with their whole subtree during extraction.
    pub non_text_tags: Vec<String>,
    /// Tag of the element wrapping each annotated fragment.
    pub element_tag: String,
    pub decoration_style: String,
    /// Border color used when the parent has no resolved text color.
    pub fallback_border_color: String,
    pub highlight_text_color: String,
    pub highlight_background_color: String,
    pub include_shadow_dom: bool,
    pub default_max_chars: usize,
}

impl Default for AnnotationPolicy {
    fn default() -> Self {
        Self {
            non_text_tags: [
                "script", "noscript", "style", "embed", "object", "textarea", "iframe", "input",
            ]
            .iter()
            .map(|tag| tag.to_string())
            .collect(),
            element_tag: "page-annotation".into(),
            decoration_style: "border-bottom-width: 1px; border-bottom-style: dotted; \
                               background-color: transparent"
                .into(),
            fallback_border_color: "blue".into(),
            highlight_text_color: "#000".into(),
            highlight_background_color: "rgba(20,111,225,0.25)".into(),
            include_shadow_dom: true,
            default_max_chars: 65_536,
        }
    }
}

impl AnnotationPolicy {
    pub fn is_non_text_tag(&self, tag: &str) -> bool {
        self.non_text_tags
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(tag))
    }
}
