//! Route table of the HTTP API.

use hyper::Method;

use crate::savings::Instrument;

/// Endpoint a request path resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Root,
    Docs,
    Health,
    Parse,
    Validate,
    Filter,
    Returns(Instrument),
    ReturnsAsync(Instrument),
    Job(String),
    Performance,
    Calculate,
}

/// `(method, suffix, prefixed)` for every endpoint, in listing order.
const LISTING: &[(&str, &str, bool)] = &[
    ("GET", "/", false),
    ("GET", "/docs", false),
    ("GET", "/health", false),
    ("POST", "/transactions:parse", true),
    ("POST", "/transactions:validator", true),
    ("POST", "/transactions:filter", true),
    ("POST", "/returns:nps", true),
    ("POST", "/returns:index", true),
    ("POST", "/returns:nps:async", true),
    ("POST", "/returns:index:async", true),
    ("GET", "/jobs/{job_id}", true),
    ("GET", "/performance", true),
    ("POST", "/calculate", true),
];

impl Route {
    /// Map a request path to a route, or `None` when nothing matches.
    pub fn resolve(prefix: &str, path: &str) -> Option<Route> {
        match path {
            "/" => return Some(Route::Root),
            "/docs" => return Some(Route::Docs),
            "/health" => return Some(Route::Health),
            _ => {}
        }

        let rest = path.strip_prefix(prefix)?;
        let route = match rest {
            "/transactions:parse" => Route::Parse,
            "/transactions:validator" => Route::Validate,
            "/transactions:filter" => Route::Filter,
            "/returns:nps" => Route::Returns(Instrument::Nps),
            "/returns:index" => Route::Returns(Instrument::IndexFund),
            "/returns:nps:async" => Route::ReturnsAsync(Instrument::Nps),
            "/returns:index:async" => Route::ReturnsAsync(Instrument::IndexFund),
            "/performance" => Route::Performance,
            "/calculate" => Route::Calculate,
            other => {
                let id = other.strip_prefix("/jobs/")?;
                if id.is_empty() || id.contains('/') {
                    return None;
                }
                Route::Job(id.to_string())
            }
        };
        Some(route)
    }

    pub fn method(&self) -> Method {
        match self {
            Route::Root | Route::Docs | Route::Health | Route::Job(_) | Route::Performance => {
                Method::GET
            }
            _ => Method::POST,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RouteEntry {
    pub method: &'static str,
    pub path: String,
}

#[derive(Debug, serde::Serialize)]
pub struct Listing {
    pub title: &'static str,
    pub version: &'static str,
    pub routes: Vec<RouteEntry>,
}

/// Body of `GET /docs`.
pub fn listing(prefix: &str) -> Listing {
    let routes = LISTING
        .iter()
        .map(|&(method, suffix, prefixed)| RouteEntry {
            method,
            path: if prefixed {
                format!("{prefix}{suffix}")
            } else {
                suffix.to_string()
            },
        })
        .collect();

    Listing {
        title: "Roundup Micro-Savings API",
        version: env!("CARGO_PKG_VERSION"),
        routes,
    }
}
