use crate::backend::AppointmentBackend;
use crate::configuration::Configuration;
use crate::error::{CreationFailure, SchedulingError, StoreError};
use crate::recurrence::{RecurrenceOptions, ReplicatedSlot};
use crate::scheduler::{AppointmentDraft, BatchReport, Scheduler};
use crate::types::{clock_time, AppointmentFilter, AppointmentStatus, AttendanceMode};
use axum::extract::{rejection::JsonRejection, Path, Query};
use axum::response::Response;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState<T: AppointmentBackend> {
    pub scheduler: Scheduler<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ListQuery {
    coach_id: Option<Uuid>,
    student_id: Option<Uuid>,
    status: Option<AppointmentStatus>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TodayQuery {
    coach_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MonthQuery {
    coach_id: Uuid,
    year: i32,
    month: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AvailabilityQuery {
    coach_id: Uuid,
    date: NaiveDate,
    #[serde(with = "clock_time")]
    time: NaiveTime,
    #[serde(default)]
    mode: AttendanceMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BatchRequest {
    appointment: AppointmentDraft,
    #[serde(default)]
    instances: Vec<ReplicatedSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecurringRequest {
    appointment: AppointmentDraft,
    #[serde(default)]
    recurrence: RecurrenceOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreviewRequest {
    date: NaiveDate,
    #[serde(with = "clock_time")]
    time: NaiveTime,
    #[serde(default)]
    recurrence: RecurrenceOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusRequest {
    status: AppointmentStatus,
}

pub fn create_app<T: AppointmentBackend, C: Configuration>(
    backend: T,
    configuration: C,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState {
        scheduler: Scheduler::new(backend, configuration.weekday_labels()),
    };

    Router::new()
        .route(
            "/appointments",
            get(get_appointments::<T>).post(create_appointment::<T>),
        )
        .route("/appointments/today", get(get_today_appointments::<T>))
        .route("/appointments/month", get(get_monthly_appointments::<T>))
        .route("/appointments/batch", post(create_batch::<T>))
        .route("/appointments/recurring", post(create_recurring::<T>))
        .route("/appointments/:id/status", post(update_status::<T>))
        .route("/recurrence/preview", post(preview_recurrence::<T>))
        .route("/slots/availability", get(get_availability::<T>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Malformed bodies are client errors like any other invalid request.
fn rejection_response(rejection: JsonRejection) -> Response {
    (StatusCode::BAD_REQUEST, rejection.body_text()).into_response()
}

fn store_error_response(err: StoreError) -> Response {
    let status = match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::SlotTaken { .. } => StatusCode::CONFLICT,
        StoreError::CorruptRow { .. } | StoreError::Database(_) => {
            error!(?err, "Appointment store request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string()).into_response()
}

fn scheduling_error_response(err: SchedulingError) -> Response {
    match err {
        SchedulingError::Store(err) => store_error_response(err),
        err => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}

fn batch_response(report: BatchReport) -> Response {
    let body = json!({
        "succeeded": report.succeeded(),
        "failed": report.failed(),
        "summary": report.summary(),
        "errors": report.failure_reasons(),
        "results": report.results,
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn get_appointments<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let filter = AppointmentFilter {
        coach_id: query.coach_id,
        student_id: query.student_id,
        status: query.status,
        date_from: query.date_from,
        date_to: query.date_to,
        ..AppointmentFilter::default()
    };
    match state.scheduler.appointments(&filter) {
        Ok(appointments) => Json(appointments).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn get_today_appointments<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    Query(query): Query<TodayQuery>,
) -> Response {
    let today = Local::now().date_naive();
    match state
        .scheduler
        .appointments(&AppointmentFilter::for_day(query.coach_id, today))
    {
        Ok(appointments) => Json(appointments).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn get_monthly_appointments<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    Query(query): Query<MonthQuery>,
) -> Response {
    let Some(filter) = AppointmentFilter::for_month(query.coach_id, query.year, query.month) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("Invalid month {}-{}", query.year, query.month),
        )
            .into_response();
    };
    match state.scheduler.appointments(&filter) {
        Ok(appointments) => Json(appointments).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn create_appointment<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    payload: Result<Json<AppointmentDraft>, JsonRejection>,
) -> Response {
    let Json(draft) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    let appointment = match draft.validated() {
        Ok(appointment) => appointment,
        Err(err) => return scheduling_error_response(err),
    };

    let outcome = state.scheduler.create_one(appointment);
    let status = match outcome.failure() {
        None => StatusCode::CREATED,
        Some(failure) if failure.is_conflict() => StatusCode::CONFLICT,
        Some(CreationFailure::Undetermined { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(outcome)).into_response()
}

async fn create_batch<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    match state
        .scheduler
        .create_batch(&request.appointment, &request.instances)
    {
        Ok(report) => batch_response(report),
        Err(err) => scheduling_error_response(err),
    }
}

async fn create_recurring<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    payload: Result<Json<RecurringRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    match state
        .scheduler
        .submit_recurring(&request.appointment, &request.recurrence)
    {
        Ok(report) => batch_response(report),
        Err(err) => scheduling_error_response(err),
    }
}

async fn update_status<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.scheduler.update_status(id, request.status) {
        Ok(appointment) => Json(appointment).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn preview_recurrence<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    payload: Result<Json<PreviewRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    match state
        .scheduler
        .plan(request.date, request.time, &request.recurrence)
    {
        Ok(plan) => Json(plan).into_response(),
        Err(err) => scheduling_error_response(err),
    }
}

async fn get_availability<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    Query(query): Query<AvailabilityQuery>,
) -> impl IntoResponse {
    let available = state.scheduler.slot_checker().can_create(
        query.coach_id,
        query.date,
        query.time,
        query.mode,
    );
    Json(json!({ "available": available }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        local_appointments::LocalAppointments, recurrence::WeekdayLabels,
        testutils::MockAppointmentBackend,
    };
    use reqwest::Client;
    use serde_json::Value;
    use std::sync::atomic::Ordering;
    use test_case::test_case;
    use tokio::{net::TcpListener, task::JoinHandle};

    #[derive(Clone)]
    struct TestConfiguration;

    impl Configuration for TestConfiguration {
        fn port(&self) -> String {
            "0".into()
        }

        fn database_url(&self) -> Option<String> {
            None
        }

        fn weekday_labels(&self) -> WeekdayLabels {
            WeekdayLabels::English
        }
    }

    async fn init<T: AppointmentBackend>(backend: T) -> (JoinHandle<()>, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = create_app(backend, TestConfiguration);
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (server, format!("http://{address}"))
    }

    fn booking(coach_id: Uuid, mode: &str) -> Value {
        json!({
            "coach_id": coach_id,
            "student_id": Uuid::new_v4(),
            "date": "2024-02-01",
            "time": "09:00",
            "mode": mode,
            "notes": "Mobility",
        })
    }

    #[tokio::test]
    async fn test_create_and_conflict() {
        let (server, base_url) = init(LocalAppointments::default()).await;
        let client = Client::new();
        let coach_id = Uuid::new_v4();

        let response = client
            .post(format!("{base_url}/appointments"))
            .json(&booking(coach_id, "in-person"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED.as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["time"], "09:00");
        assert_eq!(body["data"]["status"], "scheduled");

        let response = client
            .post(format!("{base_url}/appointments"))
            .json(&booking(coach_id, "presencial"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT.as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["data"], Value::Null);

        let response = client
            .post(format!("{base_url}/appointments"))
            .json(&booking(coach_id, "remote"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED.as_u16());

        server.abort();
    }

    #[tokio::test]
    async fn test_slot_lost_at_insert_is_conflict() {
        let backend = MockAppointmentBackend::new();
        backend.0.slot_taken_on_call.store(1, Ordering::SeqCst);
        let (server, base_url) = init(backend.clone()).await;

        let response = Client::new()
            .post(format!("{base_url}/appointments"))
            .json(&booking(Uuid::new_v4(), "in-person"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT.as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(backend.0.calls_to_appointments.load(Ordering::SeqCst), 1);
        server.abort();
    }

    #[tokio::test]
    async fn test_unreadable_store_is_unavailable() {
        let backend = MockAppointmentBackend::new();
        backend.0.success.store(false, Ordering::SeqCst);
        let (server, base_url) = init(backend.clone()).await;

        let response = Client::new()
            .post(format!("{base_url}/appointments"))
            .json(&booking(Uuid::new_v4(), "remote"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE.as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(backend.0.calls_to_insert_appointment.load(Ordering::SeqCst), 0);
        server.abort();
    }

    #[tokio::test]
    async fn test_today_lists_only_todays_appointments() {
        let (server, base_url) = init(LocalAppointments::default()).await;
        let client = Client::new();
        let coach_id = Uuid::new_v4();
        let today = Local::now().date_naive();

        let yesterday = today.pred_opt().unwrap();
        for (date, time) in [(today, "15:00"), (today, "08:30"), (yesterday, "08:30")] {
            let mut request = booking(coach_id, "in-person");
            request["date"] = json!(date);
            request["time"] = json!(time);
            let response = client
                .post(format!("{base_url}/appointments"))
                .json(&request)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED.as_u16());
        }
        client
            .post(format!("{base_url}/appointments"))
            .json(&json!({
                "coach_id": Uuid::new_v4(),
                "student_id": Uuid::new_v4(),
                "date": today,
                "time": "10:00",
            }))
            .send()
            .await
            .unwrap();

        let response = client
            .get(format!("{base_url}/appointments/today"))
            .query(&[("coach_id", coach_id.to_string())])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());
        let body: Value = response.json().await.unwrap();
        let times: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["time"].as_str().unwrap())
            .collect();
        assert_eq!(times, vec!["08:30", "15:00"]);
        server.abort();
    }

    #[test_case("/appointments", json!({ "date": "2024-13-45", "time": "09:00" }); "bad date")]
    #[test_case("/appointments", json!({ "coach_id": "not-a-uuid" }); "bad coach id")]
    #[test_case("/recurrence/preview", json!({
        "date": "2024-01-15",
        "time": "08:00",
        "recurrence": { "replicateToWeekdaySet": true, "weekdaySet": [300] },
    }); "weekday beyond u8")]
    #[tokio::test]
    async fn test_malformed_body_is_bad_request(path: &str, request: Value) {
        let backend = MockAppointmentBackend::new();
        let (server, base_url) = init(backend.clone()).await;

        let response = Client::new()
            .post(format!("{base_url}{path}"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());
        assert_eq!(backend.0.calls_to_appointments.load(Ordering::SeqCst), 0);
        server.abort();
    }

    #[tokio::test]
    async fn test_missing_time_is_rejected() {
        let backend = MockAppointmentBackend::new();
        let (server, base_url) = init(backend.clone()).await;

        let mut request = booking(Uuid::new_v4(), "in-person");
        request["time"] = Value::Null;
        let response = Client::new()
            .post(format!("{base_url}/appointments"))
            .json(&request)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());
        assert_eq!(backend.0.calls_to_insert_appointment.load(Ordering::SeqCst), 0);
        server.abort();
    }

    #[tokio::test]
    async fn test_batch_reports_partial_failure() {
        let backend = MockAppointmentBackend::new();
        backend.0.fail_insert_on_call.store(2, Ordering::SeqCst);
        let (server, base_url) = init(backend.clone()).await;

        let request = json!({
            "appointment": booking(Uuid::new_v4(), "in-person"),
            "instances": [
                { "date": "2024-02-08", "time": "09:00" },
                { "date": "2024-02-15", "time": "10:30" },
            ],
        });
        let response = Client::new()
            .post(format!("{base_url}/appointments/batch"))
            .json(&request)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK.as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["succeeded"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["summary"], "2 appointment(s) created, 1 failed");
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1]["success"], false);
        assert_eq!(results[2]["data"]["time"], "10:30");
        server.abort();
    }

    #[tokio::test]
    async fn test_recurring_creates_weekly_series() {
        let backend = LocalAppointments::default();
        let (server, base_url) = init(backend.clone()).await;
        let coach_id = Uuid::new_v4();

        let request = json!({
            "appointment": booking(coach_id, "in-person"),
            "recurrence": { "replicateSameWeekday": true, "weeksCount": 2 },
        });
        let response = Client::new()
            .post(format!("{base_url}/appointments/recurring"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["succeeded"], 3);

        let response = Client::new()
            .get(format!("{base_url}/appointments/month"))
            .query(&[
                ("coach_id", coach_id.to_string()),
                ("year", "2024".into()),
                ("month", "2".into()),
            ])
            .send()
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        let dates: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["date"].as_str().unwrap())
            .collect();
        assert_eq!(dates, vec!["2024-02-01", "2024-02-08", "2024-02-15"]);
        server.abort();
    }

    #[tokio::test]
    async fn test_invalid_recurrence_is_rejected() {
        let (server, base_url) = init(LocalAppointments::default()).await;

        let request = json!({
            "date": "2024-01-15",
            "time": "08:00",
            "recurrence": { "replicateSameWeekday": true, "weeksCount": 13 },
        });
        let response = Client::new()
            .post(format!("{base_url}/recurrence/preview"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());
        server.abort();
    }

    #[tokio::test]
    async fn test_preview_recurrence() {
        let (server, base_url) = init(LocalAppointments::default()).await;

        let request = json!({
            "date": "2024-01-15",
            "time": "08:00",
            "recurrence": { "replicateToWeekdaySet": true, "weekdaySet": [1, 3] },
        });
        let response = Client::new()
            .post(format!("{base_url}/recurrence/preview"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body["instances"],
            json!([{ "date": "2024-01-17", "time": "08:00", "weekday": "Wednesday" }])
        );
        server.abort();
    }

    #[tokio::test]
    async fn test_availability_and_status() {
        let backend = LocalAppointments::default();
        let (server, base_url) = init(backend.clone()).await;
        let client = Client::new();
        let coach_id = Uuid::new_v4();

        let response = client
            .post(format!("{base_url}/appointments"))
            .json(&booking(coach_id, "in-person"))
            .send()
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        let id = body["data"]["id"].as_str().unwrap().to_string();

        for (mode, expected) in [("in-person", false), ("remote", true)] {
            let response = client
                .get(format!("{base_url}/slots/availability"))
                .query(&[
                    ("coach_id", coach_id.to_string()),
                    ("date", "2024-02-01".into()),
                    ("time", "09:00".into()),
                    ("mode", mode.into()),
                ])
                .send()
                .await
                .unwrap();
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["available"], expected, "{mode}");
        }

        let response = client
            .post(format!("{base_url}/appointments/{id}/status"))
            .json(&json!({ "status": "completed" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "completed");

        let response = client
            .post(format!("{base_url}/appointments/{}/status", Uuid::new_v4()))
            .json(&json!({ "status": "completed" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16());

        server.abort();
    }

    #[tokio::test]
    async fn test_list_filters_by_student() {
        let (server, base_url) = init(LocalAppointments::default()).await;
        let client = Client::new();
        let coach_id = Uuid::new_v4();
        let request = booking(coach_id, "remote");
        let student_id = request["student_id"].as_str().unwrap().to_string();

        client
            .post(format!("{base_url}/appointments"))
            .json(&request)
            .send()
            .await
            .unwrap();
        client
            .post(format!("{base_url}/appointments"))
            .json(&booking(coach_id, "remote"))
            .send()
            .await
            .unwrap();

        let response = client
            .get(format!("{base_url}/appointments"))
            .query(&[("student_id", student_id.clone())])
            .send()
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        let appointments = body.as_array().unwrap();
        assert_eq!(appointments.len(), 1);
        assert_eq!(appointments[0]["student_id"], student_id.as_str());
        assert_eq!(appointments[0]["mode"], "remote");

        server.abort();
    }
}
