use axum::routing::post;
use axum::Router;
use tessera_core::protocol::{
    ROUTE_ENDFILE, ROUTE_GET, ROUTE_GET_RESULT, ROUTE_NEWFILE, ROUTE_PING, ROUTE_PUT,
    ROUTE_RENDER_FRAME, ROUTE_RENDER_PART, ROUTE_STOP,
};

use crate::handlers::rpc;
use crate::state::AppState;

/// Build the `/rpc` route tree. Every method is a `POST`.
///
/// ```text
/// /rpc/ping             liveness
/// /rpc/newfile          open scene upload
/// /rpc/put              append upload chunk (octet-stream)
/// /rpc/endfile          close upload, returns size + sha256
/// /rpc/render_frame     render one frame
/// /rpc/render_part      render one tile
/// /rpc/get_result       open artifact for download
/// /rpc/get              next artifact chunk (octet-stream)
/// /rpc/stop             shut the server down
/// ```
pub fn rpc_routes() -> Router<AppState> {
    Router::new()
        .route(ROUTE_PING, post(rpc::ping))
        .route(ROUTE_NEWFILE, post(rpc::newfile))
        .route(ROUTE_PUT, post(rpc::put))
        .route(ROUTE_ENDFILE, post(rpc::endfile))
        .route(ROUTE_RENDER_FRAME, post(rpc::render_frame))
        .route(ROUTE_RENDER_PART, post(rpc::render_part))
        .route(ROUTE_GET_RESULT, post(rpc::get_result))
        .route(ROUTE_GET, post(rpc::get))
        .route(ROUTE_STOP, post(rpc::stop))
}
