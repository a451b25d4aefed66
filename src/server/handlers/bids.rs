use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json, Path};
use axum::http::StatusCode;

use crate::auth::User;
use crate::entities::{Bid, BidDraft, Confirmation};
use crate::error::{invalid_input_error, Error};
use crate::server::DynAPI;

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    payload: Result<Json<BidDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Bid>), Error> {
    let Json(draft) = payload.map_err(|rejection| {
        tracing::debug!(%rejection, "malformed bid draft");
        invalid_input_error()
    })?;
    let bid = api.create_bid(user, draft).await?;

    Ok((StatusCode::CREATED, bid.into()))
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Bid>, Error> {
    let bid = api.find_bid(user, id).await?;

    Ok(bid.into())
}

pub async fn list_mine(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<Vec<Bid>>, Error> {
    let bids = api.list_open_bids(user).await?;

    Ok(bids.into())
}

pub async fn confirm(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Confirmation>, Error> {
    let confirmation = api.confirm_bid(user, id).await?;

    Ok(confirmation.into())
}

pub async fn find_shipment(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    let shipment = api.find_shipment(user, id).await?;

    Ok(shipment.into())
}

pub async fn expire(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<Vec<String>>, Error> {
    let expired = api.expire_lapsed_bids(user).await?;

    Ok(expired.into())
}
