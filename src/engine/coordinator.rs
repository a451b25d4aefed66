use std::time::Duration;

use super::Engine;
use crate::{
    db::BidCondition,
    entities::{
        Bid, BidAssignment, Confirmation, EnrichedStop, Notification, RequestKind,
        ShipmentDraft, VehicleStatus,
    },
    error::{conflict_error, invalid_state_error, not_eligible_error, upstream_error, Error},
    logger::warn_if_slow,
};

const LEDGER_SLOW_THRESHOLD: Duration = Duration::from_secs(5);

impl Engine {
    /// Carries a won bid onto the ledger. Anything failing before the ledger
    /// accepts the shipment reopens the bid; anything failing after it is
    /// reported for reconciliation and left as is.
    #[tracing::instrument(skip(self, bid), fields(bid_id = %bid.id))]
    pub(super) async fn commit(&self, bid: Bid, driver_id: &str) -> Result<Confirmation, Error> {
        let assignment = bid
            .confirmed_assignment()
            .cloned()
            .ok_or_else(invalid_state_error)?;

        let shipment = match self.prepare_shipment(&bid, &assignment).await {
            Ok(shipment) => shipment,
            Err(err) => {
                tracing::warn!(error = %err, "shipment preconditions failed, reopening bid");
                self.compensate(&bid, driver_id).await;
                return Err(err);
            }
        };

        let args = match shipment.transaction_args() {
            Ok(args) => args,
            Err(err) => {
                self.compensate(&bid, driver_id).await;
                return Err(err);
            }
        };

        let submitted = warn_if_slow(
            "ledger_submit",
            LEDGER_SLOW_THRESHOLD,
            self.ledger
                .submit_transaction(driver_id, ShipmentDraft::CREATE_TRANSACTION, &args),
        )
        .await;
        if let Err(err) = submitted {
            tracing::error!(error = %err, shipment_id = %shipment.shipment_id, "ledger rejected shipment");
            self.compensate(&bid, driver_id).await;
            return Err(upstream_error("ledger rejected shipment creation"));
        }

        tracing::info!(shipment_id = %shipment.shipment_id, "shipment recorded on ledger");

        let reconciliation_required = self
            .finalize(&bid, &assignment, &shipment.shipment_id)
            .await;

        let notification = Notification::BidConfirmedByOther {
            bid_id: bid.id.clone(),
        };
        self.hub
            .notify_all(&bid.other_drivers(driver_id), &notification)
            .await;

        Ok(Confirmation {
            bid_id: bid.id.clone(),
            shipment_id: shipment.shipment_id,
            reconciliation_required,
        })
    }

    async fn prepare_shipment(
        &self,
        bid: &Bid,
        assignment: &BidAssignment,
    ) -> Result<ShipmentDraft, Error> {
        let vehicle = self
            .store
            .find_vehicle(&assignment.vehicle_id)
            .await?
            .filter(|vehicle| vehicle.is_available())
            .ok_or_else(|| conflict_error("assigned vehicle unavailable"))?;

        if !vehicle.is_owned_by(&assignment.driver_id) {
            return Err(not_eligible_error("assigned vehicle is not owned by you"));
        }

        let driver = self
            .store
            .find_user(&assignment.driver_id)
            .await?
            .ok_or_else(|| not_eligible_error("driver profile not found"))?;

        let mut stops = Vec::with_capacity(bid.stops.len());
        for stop in &bid.stops {
            let facility = self
                .store
                .find_facility(&stop.facility_id)
                .await?
                .ok_or_else(|| {
                    conflict_error(format!("itinerary facility {} not found", stop.facility_id))
                })?;
            stops.push(EnrichedStop::new(stop, facility));
        }

        Ok(ShipmentDraft {
            shipment_id: bid.derived_shipment_id(),
            shipment_type: bid.shipment_type.clone(),
            driver_id: driver.id,
            driver_name: driver.name,
            vehicle_plate: vehicle.plate_number,
            stops,
        })
    }

    /// Reopens a bid this driver still holds. If the reopen itself fails the
    /// bid stays CONFIRMED without a shipment, which only an operator can fix.
    async fn compensate(&self, bid: &Bid, driver_id: &str) {
        let mut reopened = bid.clone();
        if let Err(err) = reopened.reopen() {
            tracing::error!(error = %err, "bid cannot be reopened");
            return;
        }

        match self
            .store
            .update_bid(&reopened, &BidCondition::ConfirmedBy(driver_id.to_string()))
            .await
        {
            Ok(1) => {
                tracing::info!("bid reopened");

                let notification = Notification::BidReopened {
                    bid_id: bid.id.clone(),
                };
                self.hub
                    .notify_all(&bid.other_drivers(driver_id), &notification)
                    .await;
            }
            Ok(_) => tracing::warn!("bid no longer held by this driver, nothing to reopen"),
            Err(err) => tracing::error!(
                target: "reconciliation",
                bid_id = %bid.id,
                driver_id,
                error = %err,
                "failed to reopen bid, it stays confirmed without a shipment"
            ),
        }
    }

    /// Off-chain writes that follow a ledger commit. Each one is attempted
    /// regardless of the others; failures are returned, never retried.
    async fn finalize(
        &self,
        bid: &Bid,
        assignment: &BidAssignment,
        shipment_id: &str,
    ) -> Vec<String> {
        let mut failures = Vec::new();

        let requests = [
            (RequestKind::Dispatch, &bid.original_request_ids),
            (RequestKind::Replenishment, &bid.fulfilled_replenishment_ids),
        ];
        for (kind, ids) in requests {
            if ids.is_empty() {
                continue;
            }

            match self.store.resolve_requests(kind, ids).await {
                Ok(resolved) if resolved as usize == ids.len() => {}
                Ok(resolved) => tracing::warn!(
                    ?kind,
                    resolved,
                    expected = ids.len(),
                    "some requests were no longer pending"
                ),
                Err(err) => {
                    tracing::error!(
                        target: "reconciliation",
                        bid_id = %bid.id,
                        shipment_id,
                        ?kind,
                        ?ids,
                        error = %err,
                        "failed to resolve requests"
                    );
                    failures.push(format!(
                        "{} not marked {}",
                        kind.table(),
                        kind.resolved_status().name()
                    ));
                }
            }
        }

        match self
            .store
            .update_vehicle_status(&assignment.vehicle_id, VehicleStatus::InTrip)
            .await
        {
            Ok(1) => {}
            outcome => {
                tracing::error!(
                    target: "reconciliation",
                    bid_id = %bid.id,
                    shipment_id,
                    vehicle_id = %assignment.vehicle_id,
                    ?outcome,
                    "failed to put vehicle in trip"
                );
                failures.push(format!("vehicle {} not marked IN_TRIP", assignment.vehicle_id));
            }
        }

        let mut completed = bid.clone();
        let outcome = match completed.complete(shipment_id.to_string()) {
            Ok(()) => {
                self.store
                    .update_bid(
                        &completed,
                        &BidCondition::ConfirmedBy(assignment.driver_id.clone()),
                    )
                    .await
            }
            Err(err) => Err(err),
        };
        match outcome {
            Ok(1) => tracing::info!(shipment_id, "bid completed"),
            outcome => {
                tracing::error!(
                    target: "reconciliation",
                    bid_id = %bid.id,
                    shipment_id,
                    ?outcome,
                    "failed to complete bid"
                );
                failures.push(format!("bid {} not marked COMPLETED", bid.id));
            }
        }

        failures
    }
}
