use super::{Endpoint, RouteMethod, RouteSpec, RouteTable, Surface};
use crate::{controllers::Controller, middleware::Middleware};

/// Admin pages, served at the same sub-paths by the HTML and JSON admin routers.
const ADMIN_PAGES: &[(&str, Controller)] = &[
    ("/index", Controller::AdminHome),
    ("/plugins", Controller::AdminPlugins),
    ("/settings", Controller::AdminSettings),
    ("/themes", Controller::AdminThemes),
    ("/languages", Controller::AdminLanguages),
    ("/groups", Controller::AdminGroups),
    ("/sounds", Controller::AdminSounds),
    ("/users/search", Controller::AdminUsersSearch),
    ("/users/latest", Controller::AdminUsersByJoinDate),
    ("/users/sort-posts", Controller::AdminUsersByPosts),
    ("/users/sort-reputation", Controller::AdminUsersByReputation),
    ("/users", Controller::AdminUsersByJoinDate),
    ("/categories/active", Controller::AdminCategoriesActive),
    ("/categories/disabled", Controller::AdminCategoriesDisabled),
    ("/database", Controller::AdminDatabase),
    ("/events", Controller::AdminEvents),
];

/// Admin Router
///
/// Server-rendered administration pages under `/admin`. Every route is gated by
/// `is_admin` before the admin header is built, so a refused request never reaches a
/// controller.
pub fn admin_routes() -> RouteTable {
    let mut routes = vec![RouteSpec::get("/", Controller::AdminHome)];
    routes.extend(
        ADMIN_PAGES
            .iter()
            .map(|&(path, controller)| RouteSpec::get(path, controller)),
    );

    RouteTable {
        name: "admin",
        mount: "/admin",
        surface: Surface::Page,
        middleware: &[Middleware::IsAdmin, Middleware::AdminBuildHeader],
        routes,
    }
}

/// Admin API Router
///
/// The JSON form of the admin pages under `/api/admin`, plus the user export and the
/// category picture, favicon and logo uploads.
pub fn admin_api_routes() -> RouteTable {
    const AUTHENTICATED: &[Middleware] = &[Middleware::Authenticate];

    let mut routes: Vec<RouteSpec> = ADMIN_PAGES
        .iter()
        .map(|&(path, controller)| RouteSpec::get(path, controller))
        .collect();

    routes.extend([
        RouteSpec::endpoint(RouteMethod::Get, "/users/csv", Endpoint::UsersCsv).with(AUTHENTICATED),
        RouteSpec::endpoint(
            RouteMethod::Post,
            "/category/uploadpicture",
            Endpoint::UploadCategoryPicture,
        )
        .with(AUTHENTICATED),
        RouteSpec::endpoint(RouteMethod::Post, "/uploadfavicon", Endpoint::UploadFavicon)
            .with(AUTHENTICATED),
        RouteSpec::endpoint(RouteMethod::Post, "/uploadlogo", Endpoint::UploadLogo)
            .with(AUTHENTICATED),
    ]);

    RouteTable {
        name: "admin-api",
        mount: "/api/admin",
        surface: Surface::Json,
        middleware: &[Middleware::IsAdmin, Middleware::PrepareApi],
        routes,
    }
}
