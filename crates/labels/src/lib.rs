mod fade;
mod placement;

pub use fade::{FadePhase, FadeTimer};
pub use placement::{
    LabelCandidate, LabelId, LabelPlacementConfig, LabelPlacer, PlacementOutcome,
};

pub use mapengine_collisions::{CollisionGridConfig, ScreenCollisionIndex, ScreenRect};
