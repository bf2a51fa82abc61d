pub mod attributes;
pub mod comparable;
pub mod embedded;
pub mod listing;

pub use comparable::parse_comparable;
pub use listing::parse_listing;
