use bytes::Bytes;
use courier_core::error::CoreError;
use courier_core::metrics::Metrics;
use courier_core::presence::PresenceRegistry;
use courier_postgres::PgStore;
use courier_redis::RedisEngine;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PresenceRegistry>,
    pub metrics: Arc<Metrics>,
    pub redis: RedisEngine,
    pub store: Arc<PgStore>,
}

#[derive(Deserialize)]
struct OnlineReq {
    user_id: String,
    conn_id: String,
    platform_id: i32,
}

#[derive(Serialize)]
struct OnlineResp {
    first_for_platform: bool,
}

#[derive(Deserialize)]
struct OfflineReq {
    user_id: String,
    conn_id: String,
}

#[derive(Serialize)]
struct OfflineResp {
    last_for_platform: bool,
}

#[derive(Deserialize)]
struct PlatformsReq {
    user_id: String,
}

#[derive(Serialize)]
struct PlatformsResp {
    platform_ids: Vec<i32>,
    online: bool,
}

#[derive(Deserialize)]
struct SubscribeReq {
    user_id: String,
    targets: Vec<String>,
}

#[derive(Serialize)]
struct SubscribeResp {
    statuses: Vec<PlatformStatus>,
}

#[derive(Serialize)]
struct PlatformStatus {
    user_id: String,
    platform_ids: Vec<i32>,
}

#[derive(Deserialize)]
struct GroupOnlineReq {
    group_id: String,
    page_number: i64,
    show_number: i64,
    #[serde(default)]
    desc: bool,
}

#[derive(Serialize)]
struct GroupOnlineResp {
    total: i64,
    user_ids: Vec<String>,
}

fn respond(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

fn json_response<T: Serialize>(value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_string(value) {
        Ok(body) => respond(StatusCode::OK, body),
        Err(_) => respond(StatusCode::INTERNAL_SERVER_ERROR, "{}".to_string()),
    }
}

fn error_response(e: &CoreError) -> Response<Full<Bytes>> {
    let status = match e {
        CoreError::ArgInvalid(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound => StatusCode::NOT_FOUND,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    respond(status, format!("{{\"error\":\"{}\"}}", e))
}

async fn read_json<T: for<'de> Deserialize<'de>>(req: Request<Incoming>) -> Result<T, ()> {
    let bytes = req.into_body().collect().await.map_err(|_| ())?.to_bytes();
    serde_json::from_slice(&bytes).map_err(|_| ())
}

pub async fn handle_presence(
    state: AppState,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    match (method, path.as_str()) {
        (Method::POST, "/presence/online") => {
            let Ok(body) = read_json::<OnlineReq>(req).await else {
                return respond(StatusCode::BAD_REQUEST, String::new());
            };
            match state
                .registry
                .set_online(&body.user_id, &body.conn_id, body.platform_id)
                .await
            {
                Ok(first_for_platform) => json_response(&OnlineResp { first_for_platform }),
                Err(e) => error_response(&e),
            }
        }
        (Method::POST, "/presence/offline") => {
            let Ok(body) = read_json::<OfflineReq>(req).await else {
                return respond(StatusCode::BAD_REQUEST, String::new());
            };
            match state.registry.set_offline(&body.user_id, &body.conn_id).await {
                Ok(last_for_platform) => json_response(&OfflineResp { last_for_platform }),
                Err(e) => error_response(&e),
            }
        }
        (Method::POST, "/presence/platforms") => {
            let Ok(body) = read_json::<PlatformsReq>(req).await else {
                return respond(StatusCode::BAD_REQUEST, String::new());
            };
            match state.registry.user_platforms(&body.user_id).await {
                Ok(platform_ids) => {
                    let online = !platform_ids.is_empty();
                    json_response(&PlatformsResp {
                        platform_ids,
                        online,
                    })
                }
                Err(e) => error_response(&e),
            }
        }
        (Method::POST, "/presence/subscribe") => {
            let Ok(body) = read_json::<SubscribeReq>(req).await else {
                return respond(StatusCode::BAD_REQUEST, String::new());
            };
            if let Err(e) = state
                .registry
                .add_subscriptions(&body.user_id, &body.targets)
                .await
            {
                return error_response(&e);
            }
            // Subscribers get the current state of everything they just
            // subscribed to.
            let mut statuses = Vec::with_capacity(body.targets.len());
            for target in &body.targets {
                match state.registry.user_platforms(target).await {
                    Ok(platform_ids) => statuses.push(PlatformStatus {
                        user_id: target.clone(),
                        platform_ids,
                    }),
                    Err(e) => return error_response(&e),
                }
            }
            json_response(&SubscribeResp { statuses })
        }
        (Method::POST, "/presence/unsubscribe") => {
            let Ok(body) = read_json::<SubscribeReq>(req).await else {
                return respond(StatusCode::BAD_REQUEST, String::new());
            };
            match state
                .registry
                .remove_subscriptions(&body.user_id, &body.targets)
                .await
            {
                Ok(()) => respond(StatusCode::OK, "{}".to_string()),
                Err(e) => error_response(&e),
            }
        }
        (Method::POST, "/group/online") => {
            let Ok(body) = read_json::<GroupOnlineReq>(req).await else {
                return respond(StatusCode::BAD_REQUEST, String::new());
            };
            match state
                .registry
                .get_group_online(&body.group_id, body.page_number, body.show_number, body.desc)
                .await
            {
                Ok((total, user_ids)) => json_response(&GroupOnlineResp { total, user_ids }),
                Err(e) => error_response(&e),
            }
        }
        _ => respond(StatusCode::NOT_FOUND, String::new()),
    }
}

pub async fn handle_metrics(
    state: AppState,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => respond(StatusCode::OK, state.metrics.encode_prometheus()),
        (&Method::GET, "/healthz") => {
            if state.redis.ping().await.is_err() {
                return respond(StatusCode::SERVICE_UNAVAILABLE, "redis".to_string());
            }
            if state.store.readiness().await.is_err() {
                return respond(StatusCode::SERVICE_UNAVAILABLE, "store".to_string());
            }
            respond(StatusCode::OK, "ok".to_string())
        }
        _ => respond(StatusCode::NOT_FOUND, String::new()),
    }
}
