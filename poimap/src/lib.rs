// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export the argument helpers for convenience
pub use handlers::{
    ConfiguredGeocoder, build_selection, parse_csv_location, parse_proximity, parse_tag_list,
    resolve_token, strategy_for,
};
