use crate::http::{make_boxed_error_response, text_body};
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// Health and readiness endpoints served on the admin listener.
///
/// `/health` always answers `ok`. `/ready` answers `ok` followed by the label
/// `backend` returns, asked again on every request so a backend switch shows
/// up without a restart.
pub struct AdminService<F, E> {
    backend: F,
    _error: PhantomData<E>,
}

impl<F, E> AdminService<F, E>
where
    F: Fn() -> String,
{
    pub fn new(backend: F) -> Self {
        Self {
            backend,
            _error: PhantomData,
        }
    }
}

impl<F, E, B> Service<Request<B>> for AdminService<F, E>
where
    F: Fn() -> String,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let res = match req.uri().path() {
            "/health" => Response::new(text_body("ok\n")),
            "/ready" => Response::new(text_body(format!("ok {}\n", (self.backend)()))),
            _ => make_boxed_error_response(StatusCode::NOT_FOUND),
        };
        Box::pin(async move { Ok(res) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    async fn get(
        service: &AdminService<impl Fn() -> String, Infallible>,
        path: &str,
    ) -> (StatusCode, String) {
        let req = Request::builder().uri(path).body(()).unwrap();
        let response = service.call(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let service = AdminService::new(|| "production".to_string());

        assert_eq!(get(&service, "/health").await, (StatusCode::OK, "ok\n".into()));
        assert_eq!(
            get(&service, "/ready").await,
            (StatusCode::OK, "ok production\n".into())
        );
        assert_eq!(get(&service, "/other").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ready_label_read_per_request() {
        let tier = Arc::new(Mutex::new("production"));
        let service = AdminService::new({
            let tier = tier.clone();
            move || tier.lock().unwrap().to_string()
        });

        assert_eq!(get(&service, "/ready").await.1, "ok production\n");
        *tier.lock().unwrap() = "local";
        assert_eq!(get(&service, "/ready").await.1, "ok local\n");
    }
}
