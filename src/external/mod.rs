//! Collaborators the funding core talks to but does not own: proof storage,
//! email delivery, exchange rates, invoice rendering, and unique payment codes.

use crate::domain::{Currency, Money};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod blob;
pub mod codes;
pub mod invoice;
pub mod mail;
pub mod mock;
pub mod rates;

pub use blob::{LocalBlobStore, MemoryBlobStore, DEFAULT_MAX_UPLOAD_BYTES};
pub use codes::{FixedCode, RandomCodes};
pub use invoice::{InvoiceData, InvoiceLine, PdfInvoiceRenderer};
pub use mail::{LogMailer, WebhookMailer};
pub use mock::RecordingMailer;
pub use rates::{HttpRateProvider, StaticRates};

/// Storage for payment-proof uploads.
#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Validate and store `bytes`, returning an opaque reference.
    async fn put(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String, BlobError>;

    async fn get(&self, blob_ref: &str) -> Result<Vec<u8>, BlobError>;

    async fn delete(&self, blob_ref: &str) -> Result<(), BlobError>;
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("upload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("unsupported upload type '{0}', expected an image or application/pdf")]
    UnsupportedType(String),
    #[error("blob '{0}' not found")]
    NotFound(String),
    #[error("blob storage I/O error: {0}")]
    Io(String),
}

/// Email delivery. Best-effort: implementations report failure instead of raising.
#[async_trait]
pub trait Mailer: Send + Sync + fmt::Debug {
    async fn send_email(
        &self,
        to_address: &str,
        template_key: &str,
        template_data: &serde_json::Value,
    ) -> bool;
}

/// Exchange-rate lookup.
#[async_trait]
pub trait RateProvider: Send + Sync + fmt::Debug {
    /// Units of `to` per one unit of `from`.
    async fn get_rate(&self, from: Currency, to: Currency) -> Result<f64, RateError>;
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate for {from}->{to} missing from provider response")]
    Missing { from: Currency, to: Currency },
}

/// Invoice rendering for the reporting path.
pub trait DocumentRenderer: Send + Sync + fmt::Debug {
    fn render_invoice(&self, invoice: &InvoiceData) -> Result<Vec<u8>, RenderError>;
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invoice rendering failed: {0}")]
    Failed(String),
}

/// Source of the small surcharge that makes a bank payment matchable.
pub trait UniqueCodeGenerator: Send + Sync + fmt::Debug {
    fn next_code(&self, currency: Currency) -> Money;
}
