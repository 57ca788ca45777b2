use super::{Endpoint, RouteMethod, RouteSpec, RouteTable, Surface};

/// Debug Router
///
/// Mounted only in development. Lists the mounted table and resolves a method and path
/// against it the way the router does.
pub fn debug_routes() -> RouteTable {
    RouteTable {
        name: "debug",
        mount: "/debug",
        surface: Surface::Json,
        middleware: &[],
        routes: vec![
            RouteSpec::endpoint(RouteMethod::Get, "/routes", Endpoint::DebugRoutes),
            RouteSpec::endpoint(RouteMethod::Get, "/resolve", Endpoint::DebugResolve),
        ],
    }
}
