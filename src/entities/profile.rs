use serde::{Deserialize, Serialize};

/// Off-chain user record; `id` is the ledger enrollment identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub role: String,
}

impl UserProfile {
    pub fn is_driver(&self) -> bool {
        self.role == "driver"
    }
}
