use serde::{Deserialize, Serialize};

/// Outcome of a won confirmation whose shipment is on the ledger.
/// `reconciliation_required` lists the off-chain writes that failed after the
/// ledger commit and now need an operator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(rename = "bidID")]
    pub bid_id: String,
    #[serde(rename = "shipmentID")]
    pub shipment_id: String,
    pub reconciliation_required: Vec<String>,
}

impl Confirmation {
    pub fn is_consistent(&self) -> bool {
        self.reconciliation_required.is_empty()
    }
}

#[test]
fn confirmation_wire_names() {
    let confirmation = Confirmation {
        bid_id: "BID-1".into(),
        shipment_id: "SHIP-BID-1".into(),
        reconciliation_required: vec![],
    };

    let value = serde_json::to_value(&confirmation).unwrap();
    assert_eq!(value["shipmentID"], "SHIP-BID-1");
    assert_eq!(value["bidID"], "BID-1");
    assert!(value.get("shipment_id").is_none());
}
