pub mod client;
pub mod company;
pub mod migrate;
pub mod store;
pub mod sync;
pub mod traits;

#[cfg(feature = "test-support")]
pub mod testing;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use company::{derive_company, CompanySource, DerivedCompany};
pub use store::{GraphError, GraphStore, Row, Statement, WriteSummary};
pub use sync::ContactGraphSync;
pub use traits::{
    BatchProgress, BulkSyncReport, ContactGraph, DeleteOutcome, NoProgress, SyncFailure,
    SyncOutcome, TagOverlap,
};
