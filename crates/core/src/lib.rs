//! Orchestration root for the map engine: wires the camera, frame
//! driver, tile caches, scheduler, and label/attribute subsystems
//! behind one `MapView`, and defines the error/event/theme/datasource
//! types that make up its public surface.

mod datasource;
mod error;
mod events;
mod map_view;
mod theme;

pub use datasource::{DataSource, DataSourceId, DataSourceRegistry, TileSnapshot, TilingScheme};
pub use error::{CoreError, DataSourceRegistrationError, PixelAccessError, ThemeLoadError};
pub use events::{EventCallback, EventKind, MapEventSink};
pub use map_view::{MapView, MapViewConfig};
pub use theme::{PoiTableRef, StyleRule, Theme, ThemeImageRef};
