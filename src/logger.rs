use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Id of the request currently being served, so error bodies carry the same
/// id as the log span and the `x-request-id` header. Outside a request a
/// fresh id is generated.
pub fn current_request_id() -> String {
    REQUEST_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| Uuid::new_v4().to_string())
}

/// Request logging middleware
///
/// Wraps every request in a tracing span carrying a generated request id,
/// and echoes that id back in the `x-request-id` response header. Errors
/// raised by inner middleware are rendered here so they carry the header too.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "http_request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.path(),
        );

        let service = self.service.clone();
        let scoped_id = request_id.clone();

        Box::pin(
            REQUEST_ID
                .scope(scoped_id, async move {
                    tracing::info!("Request started");

                    let http_req = req.request().clone();
                    let mut res = match service.call(req).await {
                        Ok(res) => res.map_into_left_body(),
                        Err(e) => {
                            tracing::warn!(
                                status = e.as_response_error().status_code().as_u16(),
                                "Request rejected by middleware"
                            );
                            ServiceResponse::from_err(e, http_req).map_into_right_body()
                        }
                    };

                    let status = res.status();
                    let elapsed_ms = start_time.elapsed().as_millis() as u64;
                    if status.is_server_error() {
                        tracing::error!(status = status.as_u16(), elapsed_ms, "Request failed");
                    } else {
                        tracing::info!(status = status.as_u16(), elapsed_ms, "Request completed");
                    }

                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        res.headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }
                    Ok(res)
                })
                .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_id_is_visible_inside_scope() {
        let seen = REQUEST_ID
            .scope("req-42".to_string(), async { current_request_id() })
            .await;
        assert_eq!(seen, "req-42");
    }

    #[test]
    fn test_request_id_outside_scope_is_fresh() {
        let first = current_request_id();
        assert!(Uuid::parse_str(&first).is_ok());
        assert_ne!(first, current_request_id());
    }
}
