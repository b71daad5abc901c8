pub mod cache;
pub mod fetch;
pub mod resolve;
pub mod variant;
