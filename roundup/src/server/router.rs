//! Request dispatch as a `tower::Service`.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{Request, StatusCode};
use serde::de::DeserializeOwned;
use tower::Service;

use super::AppState;
use super::response::{self, ApiError, ApiResponse};
use super::routes::{self, Route};
use crate::savings::schema::{
    CalculateRequest, Expense, FilterRequest, JobResponse, ReturnsRequest, ValidationRequest,
};
use crate::savings::{
    Instrument, calculate, filter_transactions, parse_expenses, process_returns,
    validate_transactions,
};

#[derive(Debug, serde::Serialize)]
struct Health {
    status: &'static str,
}

/// Routes requests to the savings handlers. Cheap to clone.
#[derive(Clone)]
pub struct Router {
    state: Arc<AppState>,
}

impl Router {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

impl<B> Service<Request<B>> for Router
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    type Response = ApiResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<ApiResponse, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let started = Instant::now();
            let method = req.method().clone();
            let path = req.uri().path().to_string();

            let response = match dispatch(&state, req).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            };

            tracing::info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "request"
            );
            Ok(response)
        })
    }
}

async fn dispatch<B>(state: &AppState, req: Request<B>) -> Result<ApiResponse, ApiError>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let route = Route::resolve(&state.options.api_prefix, req.uri().path())
        .ok_or_else(|| ApiError::not_found("Not Found"))?;
    if req.method() != route.method() {
        return Err(ApiError::method_not_allowed());
    }

    let limit = state.options.max_body_bytes;
    match route {
        Route::Root => Ok(response::redirect("/docs")),
        Route::Docs => Ok(response::ok(&routes::listing(&state.options.api_prefix))),
        Route::Health => Ok(response::ok(&Health { status: "healthy" })),
        Route::Parse => {
            let expenses: Vec<Expense> = read_json(req.into_body(), limit).await?;
            let parsed = blocking(move || parse_expenses(&expenses)).await?;
            Ok(response::ok(&parsed))
        }
        Route::Validate => {
            let request: ValidationRequest = read_json(req.into_body(), limit).await?;
            let validated = blocking(move || validate_transactions(request.transactions)).await?;
            Ok(response::ok(&validated))
        }
        Route::Filter => {
            let request: FilterRequest = read_json(req.into_body(), limit).await?;
            let filtered = blocking(move || filter_transactions(&request)).await?;
            Ok(response::ok(&filtered))
        }
        Route::Returns(instrument) => {
            let request: ReturnsRequest = read_json(req.into_body(), limit).await?;
            let returns = blocking(move || process_returns(&request, instrument)).await?;
            Ok(response::ok(&returns))
        }
        Route::ReturnsAsync(instrument) => {
            let request: ReturnsRequest = read_json(req.into_body(), limit).await?;
            Ok(submit_job(state, request, instrument))
        }
        Route::Job(id) => {
            let record = state
                .jobs
                .get(&id)
                .ok_or_else(|| ApiError::not_found("Job not found"))?;
            Ok(response::ok(&record.to_response()))
        }
        Route::Performance => Ok(response::ok(&state.metrics.snapshot())),
        Route::Calculate => {
            let request: CalculateRequest = read_json(req.into_body(), limit).await?;
            let result = calculate(request).await?;
            Ok(response::ok(&result))
        }
    }
}

fn submit_job(state: &AppState, request: ReturnsRequest, instrument: Instrument) -> ApiResponse {
    let record = state.jobs.submit(request, instrument);
    tracing::info!(job_id = %record.id, instrument = instrument.as_str(), "Submitted returns job");
    response::ok(&JobResponse {
        job_id: record.id,
        status: record.status.as_str().to_string(),
    })
}

/// Collect the body up to `limit` bytes and decode it as JSON.
async fn read_json<T, B>(body: B, limit: usize) -> Result<T, ApiError>
where
    T: DeserializeOwned,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let bytes: Bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(ApiError::payload_too_large(limit));
        }
        Err(e) => return Err(ApiError::bad_request(format!("failed to read body: {e}"))),
    };

    serde_json::from_slice(&bytes).map_err(|e| ApiError::unprocessable(e.to_string()))
}

/// Run CPU-bound work off the reactor threads.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http_body_util::Full;
    use hyper::header::LOCATION;
    use hyper::Method;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::runtime::ServerOptions;

    const PREFIX: &str = "/blackrock/challenge/v1";

    fn router_with(options: ServerOptions) -> Router {
        Router::new(AppState::new(options))
    }

    fn router() -> Router {
        router_with(ServerOptions::default())
    }

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn send(router: &Router, req: Request<Full<Bytes>>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn returns_body() -> Value {
        json!({
            "age": 29,
            "wage": 50000,
            "inflation": 0.055,
            "q": [{"fixed": 0, "start": "2023-07-01 00:00:00", "end": "2023-07-31 23:59:59"}],
            "p": [{"extra": 25, "start": "2023-10-01 08:00:00", "end": "2023-12-31 19:59:59"}],
            "k": [
                {"start": "2023-03-01 00:00:00", "end": "2023-11-30 23:59:59"},
                {"start": "2023-01-01 00:00:00", "end": "2023-12-31 23:59:59"}
            ],
            "transactions": [
                {"date": "2023-10-12 20:15:30", "amount": 250, "ceiling": 300, "remanent": 50},
                {"date": "2023-02-28 15:49:20", "amount": 375, "ceiling": 400, "remanent": 25},
                {"date": "2023-07-01 21:59:00", "amount": 620, "ceiling": 700, "remanent": 80},
                {"date": "2023-12-17 08:09:45", "amount": 480, "ceiling": 500, "remanent": 20}
            ]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&router(), request(Method::GET, "/health", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn test_root_redirects_to_docs() {
        let response = router()
            .oneshot(request(Method::GET, "/", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/docs");
    }

    #[tokio::test]
    async fn test_docs_lists_prefixed_routes() {
        let (status, body) = send(&router(), request(Method::GET, "/docs", "")).await;
        assert_eq!(status, StatusCode::OK);
        let paths: Vec<&str> = body["routes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["path"].as_str().unwrap())
            .collect();
        assert!(paths.contains(&"/blackrock/challenge/v1/calculate"));
    }

    #[tokio::test]
    async fn test_parse() {
        let body = r#"[{"date": "2023-10-12 20:15:30", "amount": 250},
                       {"date": "2023-02-28 15:49:20", "amount": 375}]"#;
        let (status, value) = send(
            &router(),
            request(Method::POST, &format!("{PREFIX}/transactions:parse"), body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value[0]["ceiling"], json!(300.0));
        assert_eq!(value[0]["remanent"], json!(50.0));
        assert_eq!(value[1]["remanent"], json!(25.0));
    }

    #[tokio::test]
    async fn test_validator_rejects_negative() {
        let body = json!({
            "wage": 50000,
            "transactions": [
                {"date": "2023-01-01 10:00:00", "amount": -10, "ceiling": 0, "remanent": 0},
                {"date": "2023-01-02 10:00:00", "amount": 250, "ceiling": 300, "remanent": 50}
            ]
        });
        let (status, value) = send(
            &router(),
            request(
                Method::POST,
                &format!("{PREFIX}/transactions:validator"),
                &body.to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["valid"].as_array().unwrap().len(), 1);
        assert_eq!(value["invalid"][0]["message"], "Negative amount not allowed");
    }

    #[tokio::test]
    async fn test_returns_index() {
        let (status, value) = send(
            &router(),
            request(
                Method::POST,
                &format!("{PREFIX}/returns:index"),
                &returns_body().to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["transactionsTotalAmount"], json!(1725.0));
        assert_eq!(value["savingsByDates"][1]["amount"], json!(145.0));
    }

    #[tokio::test]
    async fn test_async_job_completes() {
        let router = router();
        let (status, value) = send(
            &router,
            request(
                Method::POST,
                &format!("{PREFIX}/returns:nps:async"),
                &returns_body().to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["status"], "processing");
        let job_id = value["jobId"].as_str().unwrap().to_string();

        let path = format!("{PREFIX}/jobs/{job_id}");
        let mut last = Value::Null;
        for _ in 0..200 {
            let (status, value) = send(&router, request(Method::GET, &path, "")).await;
            assert_eq!(status, StatusCode::OK);
            if value["status"] != "processing" {
                last = value;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(last["status"], "completed");
        assert_eq!(last["result"]["transactionsTotalAmount"], json!(1725.0));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (status, value) = send(
            &router(),
            request(Method::GET, &format!("{PREFIX}/jobs/missing"), ""),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value, json!({"detail": "Job not found"}));
    }

    #[tokio::test]
    async fn test_performance() {
        let (status, value) = send(
            &router(),
            request(Method::GET, &format!("{PREFIX}/performance"), ""),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(value["memory"].as_str().unwrap().ends_with(" MB"));
        assert!(value["threads"].as_u64().unwrap() >= 1);
        assert_eq!(value["time"].as_str().unwrap().len(), "00:00:00.000".len());
    }

    #[tokio::test]
    async fn test_calculate() {
        let body = json!({
            "age": 29,
            "wage": 50000,
            "inflation": 0.055,
            "expenses": [
                {"date": "2023-10-12 20:15:30", "amount": 250},
                {"date": "2023-02-28 15:49:20", "amount": 375}
            ]
        });
        let (status, value) = send(
            &router(),
            request(Method::POST, &format!("{PREFIX}/calculate"), &body.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["summary"]["parsed"], 2);
        assert_eq!(value["summary"]["valid"], 2);
    }

    #[tokio::test]
    async fn test_malformed_json_is_422() {
        let (status, value) = send(
            &router(),
            request(Method::POST, &format!("{PREFIX}/returns:nps"), "{not json"),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(value["detail"].is_string());

        let (status, _) = send(
            &router(),
            request(Method::POST, &format!("{PREFIX}/returns:nps"), r#"{"age": 30}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_path_and_wrong_method() {
        let (status, value) = send(&router(), request(Method::GET, "/nope", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value, json!({"detail": "Not Found"}));

        let (status, _) = send(
            &router(),
            request(Method::GET, &format!("{PREFIX}/calculate"), ""),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let options = ServerOptions {
            max_body_bytes: 16,
            ..ServerOptions::default()
        };
        let (status, _) = send(
            &router_with(options),
            request(
                Method::POST,
                &format!("{PREFIX}/returns:nps"),
                &returns_body().to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let options = ServerOptions {
            api_prefix: "/api".into(),
            ..ServerOptions::default()
        };
        let router = router_with(options);
        let (status, _) = send(&router, request(Method::GET, "/api/performance", "")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(
            &router,
            request(Method::GET, &format!("{PREFIX}/performance"), ""),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
