use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use libp2p::PeerId;
use relayprobe_node_api::{ContentRef, PeerIdentity};
use relayprobe_rpc_core::api::{AddResponse, CatQuery, ConnectRequest, ConnectResponse, IdResponse};
use tracing::{debug, info};

use crate::{AppState, error::ApiError};

type ApiResult<T> = Result<T, ApiError>;

pub(crate) async fn id(State(state): State<AppState>) -> ApiResult<Json<IdResponse>> {
    Ok(Json(state.control.identity().await?.into()))
}

pub(crate) async fn connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> ApiResult<Json<ConnectResponse>> {
    let peer = PeerIdentity::from(request);
    let route = state.control.connect(&peer).await?;
    debug!(%peer, %route, "Connect request served");
    Ok(Json(route.into()))
}

pub(crate) async fn add(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<AddResponse>> {
    let hash = state.control.add(body).await?;
    Ok(Json(AddResponse { hash }))
}

pub(crate) async fn cat(
    State(state): State<AppState>,
    Query(query): Query<CatQuery>,
) -> ApiResult<Response> {
    stream_content(&state, query.provider, query.arg).await
}

pub(crate) async fn gateway(
    State(state): State<AppState>,
    Path(reference): Path<ContentRef>,
) -> ApiResult<Response> {
    stream_content(&state, state.local_peer_id, reference).await
}

async fn stream_content(
    state: &AppState,
    provider: PeerId,
    reference: ContentRef,
) -> ApiResult<Response> {
    let stream = state.control.cat(provider, reference).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Stop the node, then the server itself once this response is sent.
pub(crate) async fn shutdown(State(state): State<AppState>) -> ApiResult<()> {
    info!("Shutdown requested over API");
    state.control.shutdown().await?;
    state.shutdown_tx.send_replace(true);
    Ok(())
}
