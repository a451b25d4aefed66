use serde::{Deserialize, Serialize};

use crate::entities::{Address, BidStop, Facility, Item, Quantity, StopAction};
use crate::error::Error;

/// Address as the shipment contract records it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerAddress {
    #[serde(rename = "fullText")]
    pub full_text: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<Address> for LedgerAddress {
    fn from(address: Address) -> Self {
        Self {
            full_text: address.full_text,
            latitude: address.latitude,
            longitude: address.longitude,
        }
    }
}

/// Item as the shipment contract records it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerItem {
    #[serde(rename = "assetID")]
    pub asset_id: String,
    pub quantity: Quantity,
}

impl From<&Item> for LedgerItem {
    fn from(item: &Item) -> Self {
        Self {
            asset_id: item.asset_id.clone(),
            quantity: item.quantity.clone(),
        }
    }
}

/// A stop with its facility master data attached, as recorded on the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichedStop {
    #[serde(rename = "facilityID")]
    pub facility_id: String,
    #[serde(rename = "facilityName")]
    pub facility_name: String,
    #[serde(rename = "facilityAddress")]
    pub facility_address: LedgerAddress,
    pub action: StopAction,
    pub items: Vec<LedgerItem>,
}

impl EnrichedStop {
    pub fn new(stop: &BidStop, facility: Facility) -> Self {
        Self {
            facility_id: stop.facility_id.clone(),
            facility_name: facility.name,
            facility_address: facility.address.into(),
            action: stop.action,
            items: stop.items.iter().map(LedgerItem::from).collect(),
        }
    }
}

/// Arguments of the ledger's shipment-creation transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct ShipmentDraft {
    pub shipment_id: String,
    pub shipment_type: String,
    pub driver_id: String,
    pub driver_name: String,
    pub vehicle_plate: String,
    pub stops: Vec<EnrichedStop>,
}

impl ShipmentDraft {
    pub const CREATE_TRANSACTION: &'static str = "CreateShipment";
    pub const READ_TRANSACTION: &'static str = "GetShipment";

    pub fn transaction_args(&self) -> Result<Vec<String>, Error> {
        Ok(vec![
            self.shipment_id.clone(),
            self.shipment_type.clone(),
            self.driver_id.clone(),
            self.driver_name.clone(),
            self.vehicle_plate.clone(),
            serde_json::to_string(&self.stops)?,
        ])
    }
}

#[test]
fn transaction_args_order() {
    let facility = Facility {
        id: "farm-A".into(),
        name: "Organic Farm A".into(),
        kind: "FARM".into(),
        address: Address {
            full_text: "1 Farm Road".into(),
            latitude: 10.0,
            longitude: 106.0,
        },
    };
    let stop = BidStop {
        facility_id: "farm-A".into(),
        action: StopAction::Pickup,
        items: vec![Item {
            asset_id: "ASSET-1".into(),
            quantity: Quantity {
                unit: "kg".into(),
                value: 120.0,
            },
        }],
    };

    let draft = ShipmentDraft {
        shipment_id: "SHIP-BID-1".into(),
        shipment_type: "DISTRIBUTION".into(),
        driver_id: "driver-1".into(),
        driver_name: "Driver One".into(),
        vehicle_plate: "29C-123.45".into(),
        stops: vec![EnrichedStop::new(&stop, facility)],
    };

    let args = draft.transaction_args().unwrap();
    assert_eq!(args.len(), 6);
    assert_eq!(args[0], "SHIP-BID-1");
    assert_eq!(args[4], "29C-123.45");

    let stops: serde_json::Value = serde_json::from_str(&args[5]).unwrap();
    assert_eq!(stops[0]["facilityID"], "farm-A");
    assert_eq!(stops[0]["facilityName"], "Organic Farm A");
    assert_eq!(stops[0]["action"], "PICKUP");
    assert_eq!(stops[0]["facilityAddress"]["fullText"], "1 Farm Road");
    assert_eq!(stops[0]["items"][0]["assetID"], "ASSET-1");
    assert_eq!(stops[0]["items"][0]["quantity"]["unit"], "kg");
    assert!(stops[0]["items"][0].get("asset_id").is_none());
}
