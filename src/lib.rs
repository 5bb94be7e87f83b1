//! ocr-relay - OCR request mediator.
//!
//! Forwards an image to a local PP-OCR service or a cloud vision
//! chat-completions API and normalizes the reply into ordered text lines.

pub mod config;
pub mod ocr;

pub use ocr::{
    ErrorKind, ExtractedText, ImageData, OcrQuery, OcrResult, OcrService, ReqwestTransport,
    ServiceError,
};
