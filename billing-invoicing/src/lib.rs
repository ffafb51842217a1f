//! Invoice generation: turns a CLOSED billing cycle into a finalized
//! invoice.

pub mod errors;
pub mod service;
pub mod store;
pub mod types;

pub use errors::{InvoiceError, InvoiceOpResult};
pub use service::{InvoiceFinalized, InvoiceService, NoTaxCalculator, TaxCalculator};
pub use store::{InMemoryInvoiceStore, InvoiceStore, PostgresInvoiceStore};
pub use types::{Invoice, InvoiceItem, InvoiceStatus, InvoiceTaxLine};
