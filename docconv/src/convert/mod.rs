//! Conversion adapters around the external tools.
//!
//! - [`pdf`]: PDF to DOCX through `pdf2docx`
//! - [`office`]: arbitrary conversions through headless LibreOffice
//! - [`process`]: the child-process runner both adapters share

pub mod office;
pub mod pdf;
pub mod process;

pub use office::{OfficeConverter, TargetFormat};
pub use pdf::PdfConverter;
