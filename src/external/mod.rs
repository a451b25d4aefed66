mod gateway;

pub use gateway::GatewayLedger;

use async_trait::async_trait;

use crate::error::Error;

/// Append-only system of record, reachable only through named contract
/// transactions executed under a caller's enrolled identity.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// State-changing transaction; goes through ordering and endorsement.
    async fn submit_transaction(
        &self,
        identity: &str,
        name: &str,
        args: &[String],
    ) -> Result<Vec<u8>, Error>;

    /// Read-only query against the current ledger state.
    async fn evaluate_transaction(
        &self,
        identity: &str,
        name: &str,
        args: &[String],
    ) -> Result<Vec<u8>, Error>;
}
