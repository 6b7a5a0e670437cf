pub mod corpus;
pub mod expert;
pub mod query;
pub mod scoring;

pub use expert::{ExpertMetadata, ExpertRecord, Specialties};
pub use query::{HistoricalQuery, QueryStats};
