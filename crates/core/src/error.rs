//! Error kinds for the parts of the pipeline that propagate to the
//! library consumer rather than retrying silently or logging and
//! moving on. Mirrors the teacher's manual `enum` + `impl Display` +
//! `impl std::error::Error` idiom with `From` impls bridging each
//! sub-crate's own error type, rather than pulling in an error-derive
//! crate the teacher never depends on.

use std::fmt;

use mapengine_camera::CameraPoseError;
use mapengine_tiles::TileLifecycleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceRegistrationError {
    DuplicateName { name: String },
    NotFound { name: String },
}

impl fmt::Display for DataSourceRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceRegistrationError::DuplicateName { name } => {
                write!(f, "a data source named '{name}' is already registered")
            }
            DataSourceRegistrationError::NotFound { name } => {
                write!(f, "no data source named '{name}' is registered")
            }
        }
    }
}

impl std::error::Error for DataSourceRegistrationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeLoadError {
    MissingImage { name: String },
    MalformedStyle { set_name: String },
}

impl fmt::Display for ThemeLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThemeLoadError::MissingImage { name } => {
                write!(f, "theme references unknown image '{name}'")
            }
            ThemeLoadError::MalformedStyle { set_name } => {
                write!(f, "style set '{set_name}' is malformed")
            }
        }
    }
}

impl std::error::Error for ThemeLoadError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelAccessError {
    OutOfBounds { x: i32, y: i32, width: u32, height: u32 },
}

impl fmt::Display for PixelAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelAccessError::OutOfBounds { x, y, width, height } => write!(
                f,
                "pixel ({x}, {y}) is outside the {width}x{height} surface"
            ),
        }
    }
}

impl std::error::Error for PixelAccessError {}

/// Precondition violations and programmer errors that the core
/// propagates to the caller rather than trying to recover from — per
/// the error-handling design's propagation policy, these "throw".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    DataSourceRegistration(DataSourceRegistrationError),
    ThemeLoad(ThemeLoadError),
    PixelAccess(PixelAccessError),
    TileLifecycle(TileLifecycleError),
    CameraPose(CameraPoseError),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::DataSourceRegistration(err) => write!(f, "{err}"),
            CoreError::ThemeLoad(err) => write!(f, "{err}"),
            CoreError::PixelAccess(err) => write!(f, "{err}"),
            CoreError::TileLifecycle(err) => write!(f, "tile lifecycle error: {err:?}"),
            CoreError::CameraPose(err) => write!(f, "camera pose error: {err:?}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<DataSourceRegistrationError> for CoreError {
    fn from(err: DataSourceRegistrationError) -> Self {
        CoreError::DataSourceRegistration(err)
    }
}

impl From<ThemeLoadError> for CoreError {
    fn from(err: ThemeLoadError) -> Self {
        CoreError::ThemeLoad(err)
    }
}

impl From<PixelAccessError> for CoreError {
    fn from(err: PixelAccessError) -> Self {
        CoreError::PixelAccess(err)
    }
}

impl From<TileLifecycleError> for CoreError {
    fn from(err: TileLifecycleError) -> Self {
        CoreError::TileLifecycle(err)
    }
}

impl From<CameraPoseError> for CoreError {
    fn from(err: CameraPoseError) -> Self {
        CoreError::CameraPose(err)
    }
}
