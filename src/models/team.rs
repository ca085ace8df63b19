use serde::{Deserialize, Serialize};

/// A member of the team roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub email: String,
    /// Free-form role string as reported by the API (e.g. "owner", "member").
    pub role: String,
}
