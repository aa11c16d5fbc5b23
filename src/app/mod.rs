//! The proxy's HTTP surface.
//!
//! | Request                        | Response                                         |
//! |--------------------------------|--------------------------------------------------|
//! | `GET /locations/:place`        | `200` with the best match as JSON                |
//! | `GET /locations`, blank place  | `400 {"error":"place parameter is required"}`    |
//! | no match upstream              | `404 {"error":"no locations found for query: …"}`|
//! | cache or upstream failure      | `500 {"error":"failed to resolve location"}`     |
//! | anything else                  | `404`                                            |

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use crate::context::Context;
use crate::http::{Request, Response, StatusCode};
use crate::middleware::{LoggerMiddleware, TrustedProxies, from_middleware};
use crate::resolver::{ResolveError, Resolver};
use crate::router::Router;
use crate::server::{Server, ServerError};

const PLACE_REQUIRED: &str = "place parameter is required";
const RESOLVE_FAILED: &str = "failed to resolve location";

/// JSON body of every non-200 answer.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    Response::json(status, &ErrorBody { error: message })
}

/// Builds the router serving `/locations/:place` from `resolver`.
///
/// Every request is logged by [`LoggerMiddleware`], which reads the client
/// address from forwarding headers only when the peer is in `trusted`.
pub fn routes(resolver: Arc<Resolver>, trusted: TrustedProxies) -> Router {
    let mut router = Router::new();
    router.layer(from_middleware(Arc::new(LoggerMiddleware::new(trusted))));

    router.get("/locations/:place", move |ctx: Context| {
        let resolver = Arc::clone(&resolver);
        async move { locate(&resolver, &ctx).await }
    });
    router.get("/locations", |_ctx: Context| async {
        error_response(StatusCode::BadRequest, PLACE_REQUIRED)
    });

    router
}

async fn locate(resolver: &Resolver, ctx: &Context) -> Response {
    let place = ctx.param("place").unwrap_or_default();
    if place.trim().is_empty() {
        return error_response(StatusCode::BadRequest, PLACE_REQUIRED);
    }

    match resolver.resolve(place).await {
        Ok(location) => Response::json(StatusCode::Ok, &location),
        Err(e @ ResolveError::NotFound { .. }) => {
            error_response(StatusCode::NotFound, &e.to_string())
        }
        Err(e) => {
            error!(place = %place, error = %e, "failed to resolve location");
            error_response(StatusCode::InternalServerError, RESOLVE_FAILED)
        }
    }
}

/// Serves `router` on `server` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if the listener fails.
pub async fn serve<S>(server: Server, router: Router, shutdown: S) -> Result<(), ServerError>
where
    S: Future<Output = ()>,
{
    let router = Arc::new(router);
    server
        .run_until(
            move |req: Request| {
                let router = Arc::clone(&router);
                async move { router.route(req).await }
            },
            shutdown,
        )
        .await
}
