use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

/// Counts requests and errors, and times each route.
///
/// Endpoints are keyed on the matched route pattern
/// (`GET /api/files/info/{filename}`), so per-file URLs do not each get a
/// bucket. Unmatched requests fall back to the raw path.
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();

        let app_state = req.app_data::<web::Data<AppState>>().cloned();
        if let Some(app_state) = &app_state {
            app_state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let Some(app_state) = app_state else {
                return result;
            };

            let (route, is_error) = match &result {
                Ok(response) => (
                    response.request().match_pattern().unwrap_or(path),
                    response.status().is_client_error() || response.status().is_server_error(),
                ),
                Err(_) => (path, true),
            };

            app_state.record_endpoint_request(&format!("{} {}", method, route), duration_ms, is_error);
            if is_error {
                app_state.increment_error_count();
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App, HttpResponse};

    #[actix_web::test]
    async fn test_metrics_keyed_by_route_pattern() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .route(
                    "/items/{name}",
                    web::get().to(|| async { HttpResponse::Ok().finish() }),
                ),
        )
        .await;

        for uri in ["/items/a", "/items/b", "/missing"] {
            test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        }

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.endpoint_metrics["GET /items/{name}"].request_count, 2);
        assert_eq!(snapshot.endpoint_metrics["GET /missing"].error_count, 1);
    }
}
