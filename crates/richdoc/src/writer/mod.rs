//! Writers of compiled documents.

pub mod docx;

pub use self::docx::{DocxWriter, EmbeddedFont, load_fonts};
