//! Points of interest: the decoded-sprite image cache, the icon
//! resolution contract TextElements rely on, and the named POI-table
//! lookup tables data sources load from their theme.

use std::collections::HashMap;

use mapengine_render_protocol::ImageHandle;

/// Normalized texture-atlas sub-region. `(u0, v0)` is the top-left
/// corner, `(u1, v1)` the bottom-right; both in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvBox {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl UvBox {
    /// "Ownership within canvas": the box is a non-degenerate region
    /// that lies entirely inside the unit square.
    pub fn is_within_canvas(&self) -> bool {
        (0.0..=1.0).contains(&self.u0)
            && (0.0..=1.0).contains(&self.v0)
            && (0.0..=1.0).contains(&self.u1)
            && (0.0..=1.0).contains(&self.v1)
            && self.u0 < self.u1
            && self.v0 < self.v1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedImage {
    pub handle: ImageHandle,
    pub uv_box: UvBox,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

#[derive(Debug, Clone)]
struct ImageEntry {
    url: String,
    preload: bool,
    resolved: Option<ResolvedImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCacheError {
    /// `resolve` called for a name that was never `register`ed.
    NotRegistered,
}

/// Mapping from logical image name to its declared source (URL +
/// preload flag, set when the theme loads) and, once fetched and
/// decoded, its resolved atlas placement.
#[derive(Debug, Default)]
pub struct ImageCache {
    by_name: HashMap<String, ImageEntry>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Declares a logical image name from the theme. Re-registering an
    /// existing name updates its URL/preload flag but keeps any
    /// already-resolved placement.
    pub fn register(&mut self, name: impl Into<String>, url: impl Into<String>, preload: bool) {
        let name = name.into();
        match self.by_name.get_mut(&name) {
            Some(entry) => {
                entry.url = url.into();
                entry.preload = preload;
            }
            None => {
                self.by_name.insert(
                    name,
                    ImageEntry {
                        url: url.into(),
                        preload,
                        resolved: None,
                    },
                );
            }
        }
    }

    pub fn url(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(|entry| entry.url.as_str())
    }

    /// Names registered with `preload: true` that have not yet been
    /// resolved — fetched once, right after theme load, rather than
    /// lazily on first reference.
    pub fn names_pending_preload(&self) -> impl Iterator<Item = &str> {
        self.by_name
            .iter()
            .filter(|(_, entry)| entry.preload && entry.resolved.is_none())
            .map(|(name, _)| name.as_str())
    }

    pub fn resolved(&self, name: &str) -> Option<&ResolvedImage> {
        self.by_name.get(name)?.resolved.as_ref()
    }

    /// Records the decoded atlas placement for a registered name.
    pub fn resolve(
        &mut self,
        name: &str,
        handle: ImageHandle,
        uv_box: UvBox,
        pixel_width: u32,
        pixel_height: u32,
    ) -> Result<(), ImageCacheError> {
        let entry = self.by_name.get_mut(name).ok_or(ImageCacheError::NotRegistered)?;
        entry.resolved = Some(ResolvedImage {
            handle,
            uv_box,
            pixel_width,
            pixel_height,
        });
        Ok(())
    }
}

/// Resolves, per TextElement, the icon referenced by its composed
/// texture name. Contract: icon-renderable iff the image is resolved,
/// its UV box is computed, and that box's ownership lies within the
/// canvas.
#[derive(Debug, Default)]
pub struct PoiManager {
    images: ImageCache,
}

impl PoiManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageCache {
        &mut self.images
    }

    /// `None` if any part of the icon-renderable contract fails: the
    /// texture never fetched, not yet decoded, or resolved to a
    /// degenerate/out-of-canvas UV box. A missing icon does not fail
    /// the owning label — callers render the text alone unless the
    /// style marks the icon non-optional.
    pub fn resolve_icon(&self, texture_name: &str) -> Option<ResolvedImage> {
        let resolved = self.images.resolved(texture_name)?;
        resolved.uv_box.is_within_canvas().then_some(*resolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackMode {
    #[default]
    No,
    Yes,
    Parent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub fn contains(&self, zoom: f64) -> bool {
        (self.min..=self.max).contains(&zoom)
    }
}

/// One entry of a POI table: a styling rule keyed by data-feature name
/// (e.g. `"restaurant"`), not a located point — locations live on the
/// TextElements the table styles.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiTableEntry {
    pub name: String,
    pub alt_names: Vec<String>,
    pub visible: bool,
    pub icon_name: String,
    pub stack_mode: StackMode,
    pub priority: f64,
    pub icon_zoom_range: ZoomRange,
    pub text_zoom_range: ZoomRange,
}

impl PoiTableEntry {
    /// Final texture name: `prefix + iconName + postfix`, where
    /// prefix/postfix come from the style.
    pub fn texture_name(&self, prefix: &str, postfix: &str) -> String {
        format!("{prefix}{}{postfix}", self.icon_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoiTableError {
    MissingColumn { column: &'static str },
}

/// One raw row as decoded from a POI-table file's `poiList` array,
/// before being promoted to a `PoiTableEntry`. `name` and `iconName`
/// are validated explicitly rather than via `serde`'s `#[serde(default)]`
/// so a malformed table produces a precise error instead of a silently
/// empty field.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PoiTableEntryRow {
    pub name: Option<String>,
    #[serde(rename = "altNames", default)]
    pub alt_names: Option<Vec<String>>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(rename = "iconName")]
    pub icon_name: Option<String>,
    #[serde(rename = "stackMode", default)]
    pub stack_mode: StackMode,
    #[serde(default)]
    pub priority: f64,
    #[serde(rename = "iconMinZoom", default)]
    pub icon_min_zoom: Option<f64>,
    #[serde(rename = "iconMaxZoom", default)]
    pub icon_max_zoom: Option<f64>,
    #[serde(rename = "textMinZoom", default)]
    pub text_min_zoom: Option<f64>,
    #[serde(rename = "textMaxZoom", default)]
    pub text_max_zoom: Option<f64>,
}

fn default_visible() -> bool {
    true
}

/// A POI-table file: `{ poiList: [PoiTableEntry] }`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PoiTableFile {
    #[serde(rename = "poiList")]
    pub poi_list: Vec<PoiTableEntryRow>,
}

pub fn build_poi_table(rows: Vec<PoiTableEntryRow>) -> Result<Vec<PoiTableEntry>, PoiTableError> {
    rows.into_iter()
        .map(|row| {
            let name = row.name.ok_or(PoiTableError::MissingColumn { column: "name" })?;
            let icon_name = row
                .icon_name
                .ok_or(PoiTableError::MissingColumn { column: "iconName" })?;
            Ok(PoiTableEntry {
                name,
                alt_names: row.alt_names.unwrap_or_default(),
                visible: row.visible,
                icon_name,
                stack_mode: row.stack_mode,
                priority: row.priority,
                icon_zoom_range: ZoomRange {
                    min: row.icon_min_zoom.unwrap_or(0.0),
                    max: row.icon_max_zoom.unwrap_or(f64::MAX),
                },
                text_zoom_range: ZoomRange {
                    min: row.text_min_zoom.unwrap_or(0.0),
                    max: row.text_max_zoom.unwrap_or(f64::MAX),
                },
            })
        })
        .collect()
}

struct LoadedTable {
    entries: Vec<PoiTableEntry>,
    use_alt_names_for_key: bool,
}

/// Loads and looks up named POI tables. Multiple tables coexist (one
/// per theme layer that needs feature-key → icon/visibility styling).
#[derive(Default)]
pub struct PoiTableManager {
    tables: HashMap<String, LoadedTable>,
}

impl PoiTableManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_table(
        &mut self,
        table_name: impl Into<String>,
        entries: Vec<PoiTableEntry>,
        use_alt_names_for_key: bool,
    ) {
        self.tables.insert(
            table_name.into(),
            LoadedTable {
                entries,
                use_alt_names_for_key,
            },
        );
    }

    pub fn table_len(&self, table_name: &str) -> Option<usize> {
        self.tables.get(table_name).map(|table| table.entries.len())
    }

    /// `table × key → entry`. Key resolution honors `useAltNamesForKey`:
    /// when set, `key` may match any of an entry's `alt_names` as well
    /// as its primary `name`. Returns `None` on miss, including for an
    /// unknown table.
    pub fn lookup(&self, table_name: &str, key: &str) -> Option<&PoiTableEntry> {
        let table = self.tables.get(table_name)?;
        table.entries.iter().find(|entry| {
            entry.name == key
                || (table.use_alt_names_for_key
                    && entry.alt_names.iter().any(|alt| alt == key))
        })
    }
}
