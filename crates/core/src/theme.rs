//! The Theme object the core consumes but does not define: style sets,
//! referenced images, and the POI tables to load. Malformed entries are
//! skipped and logged rather than aborting the whole theme load — per
//! the error-handling design, a theme/config error never aborts map
//! initialization.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub layer_name: String,
    pub min_zoom: f32,
    pub max_zoom: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThemeImageRef {
    pub url: String,
    pub preload: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoiTableRef {
    pub name: String,
    pub url: String,
    pub use_alt_names_for_key: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Theme {
    pub styles: HashMap<String, Vec<StyleRule>>,
    pub images: HashMap<String, ThemeImageRef>,
    pub poi_tables: Vec<PoiTableRef>,
}

impl Theme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every style rule's image references resolve within this
    /// theme, returning the names of entries that don't — callers log
    /// and skip these rather than treating the theme as invalid.
    pub fn find_missing_image_refs(&self, referenced_image_names: &[&str]) -> Vec<String> {
        referenced_image_names
            .iter()
            .filter(|name| !self.images.contains_key(**name))
            .map(|name| name.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_refs_are_reported_without_erroring() {
        let mut theme = Theme::new();
        theme.images.insert(
            "pin".into(),
            ThemeImageRef { url: "pin.png".into(), preload: true },
        );

        let missing = theme.find_missing_image_refs(&["pin", "flag"]);
        assert_eq!(missing, vec!["flag".to_string()]);
    }
}
