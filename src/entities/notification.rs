use serde::Serialize;

use crate::entities::Bid;

/// Advisory push messages; losing one never affects bid state.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    NewTransportBid { bid: Bid },
    BidConfirmedByOther {
        #[serde(rename = "bidID")]
        bid_id: String,
    },
    BidReopened {
        #[serde(rename = "bidID")]
        bid_id: String,
    },
}

impl Notification {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[test]
fn notification_event_tags() {
    let text = Notification::BidConfirmedByOther {
        bid_id: "BID-1".into(),
    }
    .to_text()
    .unwrap();

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["event"], "bid_confirmed_by_other");
    assert_eq!(value["bidID"], "BID-1");
    assert!(value.get("bid_id").is_none());
}
