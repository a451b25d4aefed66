use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::Ledger;
use crate::error::{not_found_error, upstream_error, Error};

#[derive(Serialize)]
struct TransactionRequest<'a> {
    identity: &'a str,
    transaction: &'a str,
    args: &'a [String],
}

/// Ledger client speaking to an HTTP gateway in front of the peer network.
/// The gateway holds the enrolled identities and signs on their behalf.
#[derive(Debug, Clone)]
pub struct GatewayLedger {
    client: reqwest::Client,
    base_url: String,
    channel: String,
    chaincode: String,
}

impl GatewayLedger {
    pub fn new(
        base_url: impl Into<String>,
        channel: impl Into<String>,
        chaincode: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            channel: channel.into(),
            chaincode: chaincode.into(),
        })
    }

    fn endpoint(&self, mode: &str) -> String {
        format!(
            "{}/channels/{}/chaincodes/{}/{}",
            self.base_url, self.channel, self.chaincode, mode
        )
    }

    async fn call(
        &self,
        mode: &str,
        identity: &str,
        name: &str,
        args: &[String],
    ) -> Result<Vec<u8>, Error> {
        let res = self
            .client
            .post(self.endpoint(mode))
            .json(&TransactionRequest {
                identity,
                transaction: name,
                args,
            })
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code == 404 && mode == "evaluate" {
            return Err(not_found_error(format!("{} found nothing", name)));
        } else if !(200..300).contains(&status_code) {
            let detail = res.text().await.unwrap_or_default();
            tracing::warn!(status_code, transaction = name, detail = %detail, "ledger gateway rejected transaction");
            return Err(upstream_error(format!("{} failed with status {}", name, status_code)));
        }

        Ok(res.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Ledger for GatewayLedger {
    #[tracing::instrument(skip(self, args))]
    async fn submit_transaction(
        &self,
        identity: &str,
        name: &str,
        args: &[String],
    ) -> Result<Vec<u8>, Error> {
        self.call("submit", identity, name, args).await
    }

    #[tracing::instrument(skip(self, args))]
    async fn evaluate_transaction(
        &self,
        identity: &str,
        name: &str,
        args: &[String],
    ) -> Result<Vec<u8>, Error> {
        self.call("evaluate", identity, name, args).await
    }
}

#[test]
fn endpoint_layout() {
    let ledger = GatewayLedger::new(
        "http://localhost:8801/",
        "mychannel",
        "meat_traceability",
        Duration::from_secs(5),
    )
    .unwrap();

    assert_eq!(
        ledger.endpoint("submit"),
        "http://localhost:8801/channels/mychannel/chaincodes/meat_traceability/submit"
    );
}
