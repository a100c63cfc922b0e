//! DOCX package assembly.
//!
//! - [`DocxWriter`] turns compiled blocks into a package through `docx-rs`.
//! - `styles` and `numbering` hold the style and list definitions.
//! - `patch` finishes the document part with what `docx-rs` cannot express.
//! - `fonts` embeds configured font files.

mod fonts;
mod numbering;
mod package;
mod patch;
mod styles;
mod writer;

pub use fonts::{EmbeddedFont, load_fonts};
pub use writer::DocxWriter;
