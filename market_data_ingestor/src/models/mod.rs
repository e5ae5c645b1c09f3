pub mod entity_data;
pub mod financials;
pub mod profile;
pub mod quote;
