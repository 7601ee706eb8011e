use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, Reply};

use crate::handlers;
use crate::middleware::request_log;
use crate::models::AppState;

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Admin endpoints under `/__gateway`, then the caching proxy for everything else.
///
/// Admin and proxy handlers never reject, so a failed admin request is not forwarded to the origin.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("__gateway" / "health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::health);

    let skip_waiting = warp::path!("__gateway" / "skip-waiting")
        .and(warp::post())
        .and(warp::header::headers_cloned())
        .and(with_state(state.clone()))
        .and_then(handlers::skip_waiting);

    let announce = warp::path!("__gateway" / "announce")
        .and(warp::post())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(handlers::announce);

    let proxy = warp::any()
        .and(warp::method())
        .and(warp::header::headers_cloned())
        .and(warp::path::full())
        .and(
            warp::query::raw()
                .or_else(|_| async { Ok::<(String,), Infallible>((String::new(),)) }),
        )
        .and(warp::body::bytes())
        .and(with_state(state))
        .and_then(handlers::proxy);

    // the proxy writes its own summary line, which also names the response source
    let admin = health.or(skip_waiting).or(announce).with(request_log());

    admin.or(proxy).recover(handlers::handle_rejection)
}
