pub mod document;
pub mod repository;

pub use document::{CurrentAnalysis, Metric, PortfolioDocument, ResultRecord, Snapshot};
pub use repository::{validate_ticker, PortfolioRepository};
