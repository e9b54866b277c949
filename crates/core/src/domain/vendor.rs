use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorId(pub String);

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A vendor invited to quote on a document. `name` is display-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRef {
    #[serde(alias = "value")]
    pub id: VendorId,
    #[serde(default, alias = "label")]
    pub name: String,
}

impl VendorRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: VendorId(id.into()), name: name.into() }
    }

    /// Name used for display ordering; falls back to the id when unnamed.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id.0
        } else {
            &self.name
        }
    }
}
