//! Route tables and the index that mounts them.
//!
//! Each table is an ordered list of `RouteSpec` records plus the middleware its router
//! applies to every route. `RouteIndex::build` flattens the tables in registration order
//! under the configured base path; the same index then answers first-match lookups and
//! mounts every route on the axum router.

/// Admin pages (`/admin`) and the admin JSON API (`/api/admin`).
pub mod admin;
/// The public JSON API (`/api`).
pub mod api;
/// Development-only introspection of the mounted table (`/debug`).
pub mod debug;
/// Server-rendered site pages and app-level routes (root).
pub mod site;

mod pattern;

pub use pattern::{Params, PathPattern};

use std::{collections::BTreeMap, convert::Infallible};

use axum::{
    Extension, Router,
    extract::{FromRequestParts, RawPathParams, State},
    http::{Method, request::Parts},
    routing::{MethodFilter, MethodRouter, on},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    AppState,
    config::AppConfig,
    controllers::{Controller, RequestContext},
    handlers,
    middleware::Middleware,
};

/// RouteMethod
///
/// The HTTP verbs the tables register. GET routes also answer HEAD.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMethod {
    Get,
    Post,
}

impl RouteMethod {
    pub const ALL: [Self; 2] = [Self::Get, Self::Post];

    pub fn http(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    pub fn matches(self, method: &Method) -> bool {
        match self {
            Self::Get => method == Method::GET || method == Method::HEAD,
            Self::Post => method == Method::POST,
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Post => MethodFilter::POST,
        }
    }
}

/// Endpoint
///
/// Routes served by a dedicated handler instead of a controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    UploadPost,
    UploadThumb,
    UploadUserPicture,
    UploadCategoryPicture,
    UploadFavicon,
    UploadLogo,
    UsersCsv,
    Moderators,
    RecentPosts,
    TemplatesListing,
    DebugRoutes,
    DebugResolve,
}

impl Endpoint {
    pub fn name(self) -> &'static str {
        match self {
            Self::UploadPost => "uploads.uploadPost",
            Self::UploadThumb => "uploads.uploadThumb",
            Self::UploadUserPicture => "accounts.uploadPicture",
            Self::UploadCategoryPicture => "admin.uploads.uploadCategoryPicture",
            Self::UploadFavicon => "admin.uploads.uploadFavicon",
            Self::UploadLogo => "admin.uploads.uploadLogo",
            Self::UsersCsv => "admin.users.getCSV",
            Self::Moderators => "api.getModerators",
            Self::RecentPosts => "api.getRecentPosts",
            Self::TemplatesListing => "api.getTemplatesListing",
            Self::DebugRoutes => "debug.routes",
            Self::DebugResolve => "debug.resolve",
        }
    }

    fn method_router(self, filter: MethodFilter) -> MethodRouter<AppState> {
        match self {
            Self::UploadPost => on(filter, handlers::upload_post),
            Self::UploadThumb => on(filter, handlers::upload_thumb),
            Self::UploadUserPicture => on(filter, handlers::upload_user_picture),
            Self::UploadCategoryPicture => on(filter, handlers::upload_category_picture),
            Self::UploadFavicon => on(filter, handlers::upload_favicon),
            Self::UploadLogo => on(filter, handlers::upload_logo),
            Self::UsersCsv => on(filter, handlers::get_users_csv),
            Self::Moderators => on(filter, handlers::get_moderators),
            Self::RecentPosts => on(filter, handlers::get_recent_posts),
            Self::TemplatesListing => on(filter, handlers::get_templates_listing),
            Self::DebugRoutes => on(filter, handlers::debug_routes),
            Self::DebugResolve => on(filter, handlers::debug_resolve),
        }
    }
}

/// Target
///
/// Where a route terminates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    Controller(Controller),
    Endpoint(Endpoint),
}

impl Target {
    pub fn name(self) -> &'static str {
        match self {
            Self::Controller(controller) => controller.name(),
            Self::Endpoint(endpoint) => endpoint.name(),
        }
    }
}

/// Surface
///
/// How controller output leaves a table: rendered into an HTML page, or returned as JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Page,
    Json,
}

/// RouteSpec
///
/// One record of a route table. `before` runs ahead of the table's own middleware;
/// `middleware` runs after it. Both run before the target, in the order listed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: RouteMethod,
    pub path: &'static str,
    pub before: &'static [Middleware],
    pub middleware: &'static [Middleware],
    pub target: Target,
}

impl RouteSpec {
    /// A GET route answered by `controller`.
    pub const fn get(path: &'static str, controller: Controller) -> Self {
        Self {
            method: RouteMethod::Get,
            path,
            before: &[],
            middleware: &[],
            target: Target::Controller(controller),
        }
    }

    /// A route served by a dedicated endpoint handler.
    pub const fn endpoint(method: RouteMethod, path: &'static str, endpoint: Endpoint) -> Self {
        Self {
            method,
            path,
            before: &[],
            middleware: &[],
            target: Target::Endpoint(endpoint),
        }
    }

    pub const fn with(self, middleware: &'static [Middleware]) -> Self {
        Self { middleware, ..self }
    }

    /// Middleware that must run before the table's own.
    pub const fn first(self, before: &'static [Middleware]) -> Self {
        Self { before, ..self }
    }
}

/// RouteTable
///
/// The ordered records of one router and where it is mounted.
#[derive(Clone, Debug)]
pub struct RouteTable {
    pub name: &'static str,
    pub mount: &'static str,
    pub surface: Surface,
    pub middleware: &'static [Middleware],
    pub routes: Vec<RouteSpec>,
}

/// MountedRoute
///
/// A table record placed at its full path, carrying the full middleware chain: the
/// record's `before` list, the table's middleware, then the record's own.
#[derive(Clone, Debug)]
pub struct MountedRoute {
    pub table: &'static str,
    pub method: RouteMethod,
    pub pattern: PathPattern,
    pub middleware: Vec<Middleware>,
    pub target: Target,
    pub surface: Surface,
}

impl MountedRoute {
    fn method_router(&self, state: &AppState) -> MethodRouter<AppState> {
        let filter = self.method.filter();
        let mut route = match self.target {
            Target::Controller(controller) => {
                let surface = self.surface;
                on(
                    filter,
                    move |State(state): State<AppState>, ctx: RequestContext| {
                        handlers::dispatch(state, controller, surface, ctx)
                    },
                )
            }
            Target::Endpoint(endpoint) => endpoint.method_router(filter),
        };

        // The layer added last runs first.
        for middleware in self.middleware.iter().rev() {
            route = middleware.apply(route, state);
        }
        route
    }

    pub fn describe(&self) -> Value {
        json!({
            "table": self.table,
            "method": self.method,
            "path": self.pattern.to_string(),
            "middleware": self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "target": self.target.name(),
            "surface": self.surface,
        })
    }
}

/// ResolvedRoute
///
/// The first route matching a request, with the parameters it captured.
#[derive(Debug)]
pub struct ResolvedRoute<'a> {
    pub route: &'a MountedRoute,
    pub params: Params,
}

impl ResolvedRoute<'_> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// RouteParams
///
/// The parameters captured for the matched route. A route answering a static path on
/// behalf of a parameterized pattern finds them in the request extensions; otherwise
/// they come from the path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteParams(pub Params);

impl RouteParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<S> FromRequestParts<S> for RouteParams
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(params) = parts.extensions.get::<RouteParams>() {
            return Ok(params.clone());
        }
        // Routes without parameters have nothing to capture.
        let params = match RawPathParams::from_request_parts(parts, state).await {
            Ok(raw) => raw
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            Err(_) => Params::new(),
        };
        Ok(Self(params))
    }
}

/// RouteIndex
///
/// Every mounted route, in registration order.
#[derive(Clone, Debug, Default)]
pub struct RouteIndex {
    routes: Vec<MountedRoute>,
}

impl RouteIndex {
    pub fn build(tables: Vec<RouteTable>, base_path: &str) -> Self {
        let routes = tables
            .into_iter()
            .flat_map(|table| {
                table.routes.into_iter().map(move |spec| MountedRoute {
                    table: table.name,
                    method: spec.method,
                    pattern: PathPattern::join(&[base_path, table.mount, spec.path]),
                    middleware: spec
                        .before
                        .iter()
                        .chain(table.middleware)
                        .chain(spec.middleware)
                        .copied()
                        .collect(),
                    target: spec.target,
                    surface: table.surface,
                })
            })
            .collect();

        Self { routes }
    }

    /// for_config
    ///
    /// The application's tables in composition order: admin, admin API, public API,
    /// app-level routes, public site, then the debug router in development.
    pub fn for_config(config: &AppConfig) -> Self {
        let mut tables = vec![
            admin::admin_routes(),
            admin::admin_api_routes(),
            api::api_routes(),
            site::app_routes(),
            site::site_routes(),
        ];
        if config.is_development() {
            tables.push(debug::debug_routes());
        }
        Self::build(tables, &config.relative_path)
    }

    pub fn routes(&self) -> &[MountedRoute] {
        &self.routes
    }

    /// First route, in registration order, whose method and pattern match.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<ResolvedRoute<'_>> {
        self.routes.iter().find_map(|route| {
            if !route.method.matches(method) {
                return None;
            }
            route
                .pattern
                .match_path(path)
                .map(|params| ResolvedRoute { route, params })
        })
    }

    /// into_router
    ///
    /// Mounts every route on a fresh router. Each middleware becomes a route layer, so
    /// guards only run for matched routes and always before the target.
    ///
    /// The router prefers a static path over a parameterized one, so every method on a
    /// static path is answered by whichever route `resolve` picks for it, with that
    /// route's captured parameters. Methods nobody registered get the 404 fallback.
    pub fn into_router(&self, state: &AppState) -> Router<AppState> {
        let mut mounted: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();
        for route in &self.routes {
            for path in route.pattern.axum_paths() {
                if !path.contains('{') {
                    if !mounted.contains_key(&path) {
                        let method_router = self.static_method_router(&path, state);
                        mounted.insert(path, method_router);
                    }
                    continue;
                }

                let method_router = match mounted.remove(&path) {
                    Some(existing) => existing.merge(route.method_router(state)),
                    None => route.method_router(state),
                };
                mounted.insert(path, method_router);
            }
        }

        mounted
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router.fallback(handlers::not_found))
            })
    }

    fn static_method_router(&self, path: &str, state: &AppState) -> MethodRouter<AppState> {
        RouteMethod::ALL
            .into_iter()
            .filter_map(|method| self.resolve(&method.http(), path))
            .fold(MethodRouter::new(), |router, resolved| {
                let params = RouteParams(resolved.params);
                router.merge(resolved.route.method_router(state).layer(Extension(params)))
            })
    }
}

// Account routes shared by the public API and the site.
pub(crate) fn user_routes() -> Vec<RouteSpec> {
    use Middleware::{CheckAccountPermissions, CheckGlobalPrivacySettings};

    const PRIVATE: &[Middleware] = &[CheckGlobalPrivacySettings];
    const OWNER: &[Middleware] = &[CheckGlobalPrivacySettings, CheckAccountPermissions];

    vec![
        RouteSpec::get("/user/:userslug", Controller::Account).with(PRIVATE),
        RouteSpec::get("/user/:userslug/following", Controller::Following).with(PRIVATE),
        RouteSpec::get("/user/:userslug/followers", Controller::Followers).with(PRIVATE),
        RouteSpec::get("/user/:userslug/posts", Controller::AccountPosts).with(PRIVATE),
        RouteSpec::get("/user/:userslug/topics", Controller::AccountTopics).with(PRIVATE),
        RouteSpec::get("/user/:userslug/favourites", Controller::Favourites).with(OWNER),
        RouteSpec::get("/user/:userslug/edit", Controller::AccountEdit).with(OWNER),
        RouteSpec::get("/user/:userslug/settings", Controller::AccountSettings).with(OWNER),
        RouteSpec::get("/users", Controller::OnlineUsers).with(PRIVATE),
        RouteSpec::get("/users/online", Controller::OnlineUsers).with(PRIVATE),
        RouteSpec::get("/users/sort-posts", Controller::UsersByPosts).with(PRIVATE),
        RouteSpec::get("/users/sort-reputation", Controller::UsersByReputation).with(PRIVATE),
        RouteSpec::get("/users/latest", Controller::UsersByJoinDate).with(PRIVATE),
        RouteSpec::get("/users/search", Controller::UsersSearch).with(PRIVATE),
    ]
}
