pub mod analyze;
pub mod context;
pub mod controller;
pub mod events;
pub mod extract;
pub mod filename;
pub mod illustrate;
pub mod series_bridge;
pub mod worklist;

pub use analyze::{AnalyzeConfig, AnalyzeOutcome, AnalyzePhase, SCENE_OVERSHOOT_FACTOR};
pub use context::build_element_context;
pub use controller::{ControllerError, PipelineController};
pub use events::{Event, EventBus, EventKind};
pub use extract::{ExtractConfig, ExtractError, ExtractPhase};
pub use filename::{sanitize_slug, scene_image_filename};
pub use illustrate::{IllustrateConfig, IllustrateError, IllustratePhase};
pub use series_bridge::SeriesBridge;
pub use worklist::{compute_worklist, parse_selection};
