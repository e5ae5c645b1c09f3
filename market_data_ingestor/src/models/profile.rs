use serde::{Deserialize, Serialize};

/// Company profile metadata; every field is optional because providers return
/// an empty profile for symbols they do not cover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    /// Display name (e.g., "Apple Inc").
    pub name: Option<String>,
    /// Listing exchange as reported by the provider.
    pub exchange: Option<String>,
    /// Sector / industry classification, passed through unchanged.
    pub sector: Option<String>,
}
