//! Request routing: map URL patterns to handler functions.
//!
//! [`Router`] dispatches `GET` requests to handlers by path. Two pattern styles are
//! supported:
//!
//! | Pattern              | Example match              | Captured params              |
//! |----------------------|----------------------------|------------------------------|
//! | `/locations`         | `/locations`               | *(none)*                     |
//! | `/locations/:place`  | `/locations/New%20York`    | `place → "New York"`         |
//!
//! Captured segments are percent-decoded before the handler sees them; a capture
//! that does not decode to UTF-8 is answered with `400 Bad Request`. Trailing
//! slashes are normalized on both patterns and incoming paths, so `/locations/` and
//! `/locations` are treated as equivalent.
//!
//! Routes are matched in registration order; the first route whose pattern matches
//! wins. Every request, matched or not, passes through the middleware registered
//! with [`Router::layer`].

use std::future::Future;
use std::pin::Pin;
use std::str::Utf8Error;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::context::{Context, Parameters};
use crate::http::{Method, Request, Response, StatusCode};
use crate::middleware::{MiddlewareHandler, Next};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be cloned and shared across
/// threads without copying the underlying closure. Use [`Router::get`] rather than
/// building one by hand.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl
/// below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/locations`.
    Exact(String),
    // Matches a fixed number of segments where some may be named captures.
    Parameterized { segments: Vec<Segment> },
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

impl Pattern {
    // Patterns containing `:` are parameterized, everything else is exact.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_owned()),
                    None => Segment::Static(s.to_owned()),
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_owned())
    }

    // Try to match `path`, returning the decoded captures on success. A match
    // whose capture is not valid UTF-8 once decoded is `Some(Err(_))`.
    fn matches(&self, path: &str) -> Option<Result<Parameters, Utf8Error>> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(|| Ok(Parameters::new())),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = Parameters::new();
                let mut undecodable = None;
                for (seg, raw) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != raw => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => match percent_decode_str(raw).decode_utf8() {
                            Ok(value) => params.insert(name.as_str(), value.into_owned()),
                            Err(e) => undecodable = Some(e),
                        },
                    }
                }

                Some(undecodable.map_or(Ok(params), Err))
            }
        }
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> Option<Result<Parameters, Utf8Error>> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router that dispatches requests to registered handler functions.
///
/// When no route matches, a `404 Not Found` response is returned. A matching
/// route whose captured segment is not valid percent-encoded UTF-8 gets
/// `400 Bad Request` instead of its handler.
///
/// # Examples
///
/// ```rust
/// use geocache::context::Context;
/// use geocache::{Router, Response, StatusCode};
///
/// let mut router = Router::new();
///
/// router.get("/ping", |_ctx: Context| async { Response::new(StatusCode::Ok) });
///
/// router.get("/locations/:place", |ctx: Context| async move {
///     let place = ctx.param("place").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).body(place)
/// });
///
/// assert_eq!(router.len(), 2);
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    middlewares: Vec<MiddlewareHandler>,
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Wrap every request in `middleware`.
    ///
    /// Middleware runs in registration order, outermost first, and sees
    /// unmatched requests too.
    pub fn layer(&mut self, middleware: MiddlewareHandler) {
        self.middlewares.push(middleware);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx: Context| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `request` through the middleware to the first matching route.
    ///
    /// Returns `404 Not Found` when no route matches.
    pub async fn route(&self, request: Request) -> Response {
        let (ctx, handler) = self.resolve(request);

        let mut chain = self.middlewares.clone();
        chain.push(Arc::new(move |ctx: Context, _next: Next| handler(ctx)));

        Next::new(chain).run(ctx).await
    }

    fn resolve(&self, request: Request) -> (Context, Handler) {
        let matched = self.routes.iter().find_map(|route| {
            route
                .matches(request.method(), request.path())
                .map(|params| (params, Arc::clone(&route.handler)))
        });

        match matched {
            Some((Ok(params), handler)) => (Context::with_params(request, params), handler),
            Some((Err(e), _)) => {
                debug!(path = %request.path(), error = %e, "undecodable path parameter");
                (Context::new(request), bad_request())
            }
            None => (Context::new(request), not_found()),
        }
    }
}

fn not_found() -> Handler {
    Arc::new(|_ctx: Context| -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async { Response::new(StatusCode::NotFound) })
    })
}

fn bad_request() -> Handler {
    Arc::new(|_ctx: Context| -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async {
            Response::new(StatusCode::BadRequest).body("path parameter is not valid UTF-8")
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::middleware::{Middleware, from_middleware};

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn echo_place() -> impl IntoHandler {
        |ctx: Context| async move {
            let place = ctx.param("place").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(place)
        }
    }

    // ── Pattern::parse ────────────────────────────────────────────────────────

    #[test]
    fn pattern_parse_exact() {
        assert!(matches!(Pattern::parse("/locations"), Pattern::Exact(s) if s == "/locations"));
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
    }

    #[test]
    fn pattern_parse_trailing_slash_stripped() {
        assert!(matches!(Pattern::parse("/locations/"), Pattern::Exact(s) if s == "/locations"));
    }

    #[test]
    fn pattern_parse_parameterized() {
        match Pattern::parse("/locations/:place") {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 2);
                assert!(matches!(&segments[0], Segment::Static(s) if s == "locations"));
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "place"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    // ── Pattern::matches ──────────────────────────────────────────────────────

    #[test]
    fn exact_match_normalizes_trailing_slash() {
        let pat = Pattern::parse("/locations");
        assert!(matches!(pat.matches("/locations"), Some(Ok(_))));
        assert!(matches!(pat.matches("/locations/"), Some(Ok(_))));
        assert!(pat.matches("/places").is_none());
    }

    #[test]
    fn param_is_percent_decoded() {
        let pat = Pattern::parse("/locations/:place");
        let params = pat.matches("/locations/Galway%2C%20Ireland").unwrap().unwrap();
        assert_eq!(params.get("place"), Some("Galway, Ireland"));
    }

    #[test]
    fn param_keeps_plus_literal() {
        // `+` means space only in query strings, not in paths.
        let pat = Pattern::parse("/locations/:place");
        let params = pat.matches("/locations/A+B").unwrap().unwrap();
        assert_eq!(params.get("place"), Some("A+B"));
    }

    #[test]
    fn param_decodes_multibyte_utf8() {
        let pat = Pattern::parse("/locations/:place");
        let params = pat.matches("/locations/caf%C3%A9").unwrap().unwrap();
        assert_eq!(params.get("place"), Some("café"));
    }

    #[test]
    fn param_with_invalid_utf8_is_an_error() {
        let pat = Pattern::parse("/locations/:place");
        assert!(matches!(pat.matches("/locations/caf%E9"), Some(Err(_))));
    }

    #[test]
    fn param_wrong_segment_count() {
        let pat = Pattern::parse("/locations/:place");
        assert!(pat.matches("/locations").is_none());
        assert!(pat.matches("/locations/a/b").is_none());
    }

    #[test]
    fn param_wrong_static_segment() {
        let pat = Pattern::parse("/locations/:place");
        assert!(pat.matches("/places/Galway").is_none());
    }

    // ── Router ────────────────────────────────────────────────────────────────

    #[test]
    fn router_starts_empty() {
        let router = Router::new();
        assert!(router.is_empty());
        assert_eq!(router.len(), 0);
    }

    #[tokio::test]
    async fn empty_router_returns_404() {
        let router = Router::new();
        let res = router.route(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn get_route_receives_decoded_param() {
        let mut router = Router::new();
        router.get("/locations/:place", echo_place());

        let res = router.route(make_request("GET", "/locations/New%20York")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"New York");
    }

    #[tokio::test]
    async fn invalid_utf8_param_is_400_and_skips_the_handler() {
        let called = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&called);
        let mut router = Router::new();
        router.get("/locations/:place", move |_ctx: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Response::new(StatusCode::Ok) }
        });

        let res = router.route(make_request("GET", "/locations/caf%E9")).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_methods_do_not_match() {
        let mut router = Router::new();
        router.get("/locations/:place", echo_place());

        let res = router.route(make_request("POST", "/locations/Galway")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/path", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/path", |_ctx: Context| async {
            Response::new(StatusCode::BadRequest)
        });

        let res = router.route(make_request("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    // ── Middleware ────────────────────────────────────────────────────────────

    struct Counting(Arc<AtomicUsize>);

    impl Middleware for Counting {
        fn handle(
            &self,
            ctx: Context,
            next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                response.add_header("X-Counted", "yes");
                response
            })
        }
    }

    #[tokio::test]
    async fn middleware_wraps_matched_and_unmatched_requests() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new();
        router.layer(from_middleware(Arc::new(Counting(Arc::clone(&seen)))));
        router.get("/locations/:place", echo_place());

        let hit = router.route(make_request("GET", "/locations/Galway")).await;
        let miss = router.route(make_request("GET", "/nowhere")).await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(hit.headers().get("x-counted"), Some("yes"));
        assert_eq!(miss.status(), StatusCode::NotFound);
        assert_eq!(miss.headers().get("x-counted"), Some("yes"));
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let mut router = Router::new();
        router.layer(Arc::new(|_ctx: Context, _next: Next| {
            Box::pin(async { Response::new(StatusCode::TooManyRequests) })
                as Pin<Box<dyn Future<Output = Response> + Send>>
        }));
        router.get("/locations/:place", echo_place());

        let res = router.route(make_request("GET", "/locations/Galway")).await;
        assert_eq!(res.status(), StatusCode::TooManyRequests);
    }
}
