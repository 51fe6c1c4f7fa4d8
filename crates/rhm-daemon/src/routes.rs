//! Axum router and all HTTP handlers for rhm-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Identity comes from the `x-user-id` / `x-user-role`
//! headers set by the authenticating proxy in front of the daemon; an
//! optional `Idempotency-Key` header makes order transitions safe to retry.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use rhm_lifecycle::{
    AppointmentEvent, HouseTransition, LeaseTransition, ReconcileOutcome, RequestMeta,
    SweepOutcome,
};
use rhm_schemas::{
    Actor, Appointment, AppointmentFilter, AppointmentStatus, BookingRequest, House, HouseFilter,
    HousePatch, HouseStatus, NewAppointment, NewHouse, Notification, Order, OrderEvent,
    OrderFilter, OrderStatus, Role, StatusCounts,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::{
    api_types::{
        AppointmentListQuery, AppointmentRejectRequest, AppointmentTransitionResponse,
        CompleteDueRequest, HealthResponse, HouseListQuery, HouseTransitionResponse,
        LeaseTransitionResponse, NotificationsQuery, OrderListQuery, ReasonRequest,
        ReconcileRequest, TerminateApproveRequest, TerminateRequest,
    },
    error::ApiError,
    state::{reconcile_once_as, uptime_secs, AppState, BusMsg, StatusSnapshot},
};

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_ROLE: &str = "x-user-role";
pub const HEADER_IDEMPOTENCY_KEY: &str = "idempotency-key";

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        // houses
        .route("/v1/houses", post(create_house).get(list_houses))
        .route(
            "/v1/houses/:id",
            get(get_house).put(update_house).delete(delete_house),
        )
        .route("/v1/houses/:id/approve", post(approve_house))
        .route("/v1/houses/:id/reject", post(reject_house))
        .route("/v1/houses/:id/online", post(house_online))
        .route("/v1/houses/:id/offline", post(house_offline))
        // orders
        .route("/v1/orders", post(book_order).get(list_orders))
        .route("/v1/orders/:id", get(get_order))
        .route("/v1/orders/:id/events", get(order_events))
        .route("/v1/orders/:id/pay", post(pay_order))
        .route("/v1/orders/:id/cancel", post(cancel_order))
        .route("/v1/orders/:id/terminate-request", post(terminate_request))
        .route("/v1/orders/:id/terminate-approve", post(terminate_approve))
        .route("/v1/orders/:id/terminate-reject", post(terminate_reject))
        .route("/v1/orders/:id/terminate-confirm", post(terminate_confirm))
        .route("/v1/orders/:id/complete", post(complete_order))
        // appointments
        .route(
            "/v1/appointments",
            post(request_appointment).get(list_appointments),
        )
        .route("/v1/appointments/:id", get(get_appointment))
        .route("/v1/appointments/:id/approve", post(appointment_approve))
        .route("/v1/appointments/:id/reject", post(appointment_reject))
        .route("/v1/appointments/:id/complete", post(appointment_complete))
        .route("/v1/appointments/:id/cancel", post(appointment_cancel))
        // notifications
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/:id/read", post(mark_notification_read))
        // admin
        .route("/v1/admin/reconcile", post(admin_reconcile))
        .route("/v1/admin/leases/complete-due", post(admin_complete_due))
        .route("/v1/admin/stats", get(admin_stats))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

/// The caller, as asserted by the upstream auth layer. `SYSTEM` is reserved
/// for background jobs and is refused here.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let id = headers
        .get(HEADER_USER_ID)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing x-user-id header"))?;
    let user_id: i64 = id
        .trim()
        .parse()
        .map_err(|_| ApiError::unauthorized("x-user-id is not an integer"))?;
    if user_id <= 0 {
        return Err(ApiError::unauthorized("x-user-id must be positive"));
    }
    let role = headers
        .get(HEADER_USER_ROLE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing x-user-role header"))?;
    let role = Role::parse_external(role.trim())
        .ok_or_else(|| ApiError::unauthorized(format!("unknown role {role:?}")))?;
    Ok(Actor::new(user_id, role))
}

pub(crate) fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let meta = RequestMeta::now();
    match headers
        .get(HEADER_IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        Some(key) => meta.with_request_id(key),
        None => meta,
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    Ok(payload?.0)
}

/// Body that may be omitted entirely.
fn optional_body<T: Default>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(v)) => Ok(v),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health, /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            backend: st.market.backend_name().to_string(),
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    let mut snap = st.status.read().await.clone();
    snap.daemon_uptime_secs = uptime_secs();
    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    Json(snap)
}

// ---------------------------------------------------------------------------
// Houses
// ---------------------------------------------------------------------------

pub(crate) async fn create_house(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<NewHouse>, JsonRejection>,
) -> Result<(StatusCode, Json<House>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let new = body(payload)?;
    let house = st
        .market
        .create_house(&actor, new, &request_meta(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(house)))
}

pub(crate) async fn list_houses(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<HouseListQuery>, QueryRejection>,
) -> ApiResult<Vec<House>> {
    let actor = actor_from_headers(&headers)?;
    let Query(q) = query?;
    let filter = HouseFilter {
        status: q.status.as_deref().map(HouseStatus::parse).transpose()?,
        owner_id: q.owner_id,
        city: q.city,
    };
    Ok(Json(st.market.list_houses(&actor, &filter).await?))
}

pub(crate) async fn get_house(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<House> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(st.market.get_house(&actor, id).await?))
}

fn house_response(st: &AppState, t: HouseTransition) -> Json<HouseTransitionResponse> {
    st.publish(&t.notices);
    Json(HouseTransitionResponse {
        house: t.house,
        from: t.from,
    })
}

pub(crate) async fn update_house(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<HousePatch>, JsonRejection>,
) -> ApiResult<HouseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let patch = body(payload)?;
    let t = st
        .market
        .update_house(&actor, id, patch, &request_meta(&headers))
        .await?;
    Ok(house_response(&st, t))
}

pub(crate) async fn delete_house(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<HouseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let t = st
        .market
        .delete_house(&actor, id, &request_meta(&headers))
        .await?;
    Ok(house_response(&st, t))
}

pub(crate) async fn approve_house(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<HouseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let t = st
        .market
        .approve_house(&actor, id, &request_meta(&headers))
        .await?;
    Ok(house_response(&st, t))
}

pub(crate) async fn reject_house(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<ReasonRequest>, JsonRejection>,
) -> ApiResult<HouseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let req = body(payload)?;
    let t = st
        .market
        .reject_house(&actor, id, req.reason, &request_meta(&headers))
        .await?;
    Ok(house_response(&st, t))
}

pub(crate) async fn house_online(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<HouseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let t = st
        .market
        .put_online(&actor, id, &request_meta(&headers))
        .await?;
    Ok(house_response(&st, t))
}

pub(crate) async fn house_offline(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<HouseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let t = st
        .market
        .take_offline(&actor, id, &request_meta(&headers))
        .await?;
    Ok(house_response(&st, t))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub(crate) async fn book_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let req = body(payload)?;
    let order = st
        .market
        .book_order(&actor, &req, &request_meta(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub(crate) async fn list_orders(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<OrderListQuery>, QueryRejection>,
) -> ApiResult<Vec<Order>> {
    let actor = actor_from_headers(&headers)?;
    let Query(q) = query?;
    let filter = OrderFilter {
        status: q.status.as_deref().map(OrderStatus::parse).transpose()?,
        house_id: q.house_id,
        ..OrderFilter::default()
    };
    Ok(Json(st.market.list_orders(&actor, filter).await?))
}

pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Order> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(st.market.get_order(&actor, id).await?))
}

pub(crate) async fn order_events(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Vec<OrderEvent>> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(st.market.order_history(&actor, id).await?))
}

fn lease_response(st: &AppState, t: LeaseTransition) -> Json<LeaseTransitionResponse> {
    st.publish(&t.notices);
    Json(LeaseTransitionResponse {
        house_status: t.house.status,
        order: t.order,
        from: t.from,
        via: t.via,
        replayed: t.replayed,
    })
}

pub(crate) async fn pay_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<LeaseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let t = st.market.pay(&actor, id, &request_meta(&headers)).await?;
    Ok(lease_response(&st, t))
}

pub(crate) async fn cancel_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<LeaseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let t = st.market.cancel(&actor, id, &request_meta(&headers)).await?;
    Ok(lease_response(&st, t))
}

pub(crate) async fn terminate_request(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<TerminateRequest>, JsonRejection>,
) -> ApiResult<LeaseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let req = body(payload)?;
    let t = st
        .market
        .request_termination(
            &actor,
            id,
            req.reason,
            req.requested_date,
            &request_meta(&headers),
        )
        .await?;
    Ok(lease_response(&st, t))
}

pub(crate) async fn terminate_approve(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<TerminateApproveRequest>, JsonRejection>,
) -> ApiResult<LeaseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let req = optional_body(payload)?;
    let t = st
        .market
        .approve_termination(&actor, id, req.penalty_cents, &request_meta(&headers))
        .await?;
    Ok(lease_response(&st, t))
}

pub(crate) async fn terminate_reject(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<ReasonRequest>, JsonRejection>,
) -> ApiResult<LeaseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let req = body(payload)?;
    let t = st
        .market
        .reject_termination(&actor, id, req.reason, &request_meta(&headers))
        .await?;
    Ok(lease_response(&st, t))
}

pub(crate) async fn terminate_confirm(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<LeaseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let t = st
        .market
        .confirm_termination(&actor, id, &request_meta(&headers))
        .await?;
    Ok(lease_response(&st, t))
}

pub(crate) async fn complete_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<LeaseTransitionResponse> {
    let actor = actor_from_headers(&headers)?;
    let t = st
        .market
        .complete(&actor, id, &request_meta(&headers))
        .await?;
    Ok(lease_response(&st, t))
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

pub(crate) async fn request_appointment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<NewAppointment>, JsonRejection>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let req = body(payload)?;
    let t = st
        .market
        .request_appointment(&actor, &req, &request_meta(&headers))
        .await?;
    st.publish(&t.notices);
    Ok((StatusCode::CREATED, Json(t.appointment)))
}

pub(crate) async fn list_appointments(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<AppointmentListQuery>, QueryRejection>,
) -> ApiResult<Vec<Appointment>> {
    let actor = actor_from_headers(&headers)?;
    let Query(q) = query?;
    let filter = AppointmentFilter {
        status: q
            .status
            .as_deref()
            .map(AppointmentStatus::parse)
            .transpose()?,
        house_id: q.house_id,
        ..AppointmentFilter::default()
    };
    Ok(Json(st.market.list_appointments(&actor, filter).await?))
}

pub(crate) async fn get_appointment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Appointment> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(st.market.get_appointment(&actor, id).await?))
}

async fn appointment_transition(
    st: &AppState,
    headers: &HeaderMap,
    id: i64,
    event: AppointmentEvent,
) -> ApiResult<AppointmentTransitionResponse> {
    let actor = actor_from_headers(headers)?;
    let t = st
        .market
        .appointment_event(&actor, id, event, &request_meta(headers))
        .await?;
    st.publish(&t.notices);
    Ok(Json(AppointmentTransitionResponse {
        appointment: t.appointment,
        from: t.from,
    }))
}

pub(crate) async fn appointment_approve(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<AppointmentTransitionResponse> {
    appointment_transition(&st, &headers, id, AppointmentEvent::Approve).await
}

pub(crate) async fn appointment_reject(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<AppointmentRejectRequest>, JsonRejection>,
) -> ApiResult<AppointmentTransitionResponse> {
    let req = optional_body(payload)?;
    let event = AppointmentEvent::Reject { reason: req.reason };
    appointment_transition(&st, &headers, id, event).await
}

pub(crate) async fn appointment_complete(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<AppointmentTransitionResponse> {
    appointment_transition(&st, &headers, id, AppointmentEvent::Complete).await
}

pub(crate) async fn appointment_cancel(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<AppointmentTransitionResponse> {
    appointment_transition(&st, &headers, id, AppointmentEvent::Cancel).await
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub(crate) async fn list_notifications(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<NotificationsQuery>, QueryRejection>,
) -> ApiResult<Vec<Notification>> {
    let actor = actor_from_headers(&headers)?;
    let Query(q) = query?;
    Ok(Json(st.market.notifications(&actor, q.unread_only).await?))
}

pub(crate) async fn mark_notification_read(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Notification> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(st.market.mark_read(&actor, id).await?))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub(crate) async fn admin_reconcile(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ReconcileRequest>, JsonRejection>,
) -> ApiResult<ReconcileOutcome> {
    let actor = actor_from_headers(&headers)?;
    let req = optional_body(payload)?;
    info!(actor = %actor, dry_run = req.dry_run, "admin/reconcile");
    Ok(Json(reconcile_once_as(&st, &actor, req.dry_run).await?))
}

pub(crate) async fn admin_complete_due(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CompleteDueRequest>, JsonRejection>,
) -> ApiResult<SweepOutcome> {
    let actor = actor_from_headers(&headers)?;
    let req = optional_body(payload)?;
    let now = req.as_of.unwrap_or_else(Utc::now);
    info!(actor = %actor, as_of = %now, "admin/leases/complete-due");
    let out = st.market.complete_due_leases(&actor, now).await?;
    st.record_sweep(&out, now).await;
    Ok(Json(out))
}

pub(crate) async fn admin_stats(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<StatusCounts> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(st.market.stats(&actor).await?))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
