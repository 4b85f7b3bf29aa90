//! The per-tile operations shipped with the batch tools.

mod export;
mod remove_predicted_speeds;
mod stats;

pub use export::{
    AttributeFilter, EdgeAttribute, ExportConfigError, ExportTileAttributes, ExportTotals,
    FeatureTypes,
};
pub use remove_predicted_speeds::RemovePredictedSpeeds;
pub use stats::{CollectTileStats, TileStats};
