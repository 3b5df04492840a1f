pub mod color;
pub mod error;
pub mod filter;
pub mod legend;
pub mod markers;
pub mod normalize;
pub mod popup;
pub mod report;
pub mod resolver;
pub mod session;
pub mod surface;

use colored::Colorize;

pub use color::{ColorAssigner, DEFAULT_PALETTE, UNGROUPED_COLOR, hex_to_rgb};
pub use error::{LoadError, Result};
pub use filter::{FilterEngine, FilterOutcome, Selection, TagMatch};
pub use legend::{Legend, LegendMember, LegendSection};
pub use markers::{GroupingMode, MarkerEntry, MarkerIndex};
pub use normalize::{DropReason, DroppedRow, FieldMapping, NormalizedRecord, Normalizer, RowOutcome};
pub use popup::Popup;
pub use resolver::{GeocodeResolver, WriteBackSummary, locate};
pub use session::{
    CycleTicket, GeocodeStrategy, LoadOptions, LoadReport, MapSession, ProgressCallback,
    resolve_rows,
};
pub use surface::{MarkerId, MemorySurface, PlacedMarker, RenderSurface};

pub fn print_banner() {
    let pin = r#"
     .-.
    (o o)   poimap
    | O \   points of interest, on a map
     \   \
      `~~~'"#;
    println!("{}", pin.truecolor(63, 177, 206));
    println!("    v{}\n", env!("CARGO_PKG_VERSION").dimmed());
}
