mod common;

use axum::http::Method;
use common::sample_paths;
use forum_web::{
    AppConfig,
    config::Env,
    controllers::Controller,
    middleware::Middleware,
    routes::{
        Endpoint, PathPattern, RouteIndex, RouteMethod, Target, admin, api, debug, site,
    },
};

fn index() -> RouteIndex {
    RouteIndex::for_config(&AppConfig::default())
}

#[test]
fn test_tables_compose_in_order() {
    let index = index();
    let mut tables: Vec<&str> = index.routes().iter().map(|route| route.table).collect();
    tables.dedup();

    assert_eq!(tables, ["admin", "admin-api", "api", "app", "site", "debug"]);
}

#[test]
fn test_every_route_is_the_first_match_for_its_own_paths() {
    let index = index();

    for route in index.routes() {
        for path in sample_paths(&route.pattern) {
            let resolved = index
                .resolve(&route.method.http(), &path)
                .unwrap_or_else(|| panic!("{path} did not resolve"));
            assert_eq!(
                resolved.route.pattern, route.pattern,
                "{path} is shadowed by an earlier route"
            );
            assert_eq!(resolved.route.target, route.target);
        }
    }
}

#[test]
fn test_users_alias_targets_the_same_controller() {
    let index = index();

    for prefix in ["", "/api"] {
        let users = index.resolve(&Method::GET, &format!("{prefix}/users")).unwrap();
        let online = index
            .resolve(&Method::GET, &format!("{prefix}/users/online"))
            .unwrap();

        assert_ne!(users.route.pattern, online.route.pattern, "two records");
        assert_eq!(users.route.target, Target::Controller(Controller::OnlineUsers));
        assert_eq!(users.route.target, online.route.target);
        assert_eq!(users.route.middleware, online.route.middleware);
    }
}

#[test]
fn test_admin_chains_start_with_the_admin_guard() {
    let index = index();

    for route in index.routes().iter().filter(|r| r.table.starts_with("admin")) {
        assert_eq!(route.middleware[0], Middleware::IsAdmin, "{}", route.pattern);
    }

    let csv = index.resolve(&Method::GET, "/api/admin/users/csv").unwrap();
    assert_eq!(
        csv.route.middleware,
        [Middleware::IsAdmin, Middleware::PrepareApi, Middleware::Authenticate]
    );
    assert_eq!(csv.route.target, Target::Endpoint(Endpoint::UsersCsv));

    let page = index.resolve(&Method::GET, "/admin/categories/active").unwrap();
    assert_eq!(
        page.route.middleware,
        [Middleware::IsAdmin, Middleware::AdminBuildHeader]
    );
}

#[test]
fn test_admin_api_mirrors_admin_pages_except_root() {
    let pages = admin::admin_routes();
    let api = admin::admin_api_routes();

    let page_paths: Vec<&str> = pages.routes.iter().map(|r| r.path).skip(1).collect();
    let api_paths: Vec<&str> = api
        .routes
        .iter()
        .filter(|r| r.method == RouteMethod::Get && r.path != "/users/csv")
        .map(|r| r.path)
        .collect();

    assert_eq!(pages.routes[0].path, "/");
    assert_eq!(page_paths, api_paths);
}

#[test]
fn test_optional_segments_resolve_both_forms() {
    let index = index();

    let short = index.resolve(&Method::GET, "/topic/5").unwrap();
    let long = index.resolve(&Method::GET, "/topic/5/my-slug").unwrap();

    assert_eq!(short.route.target, Target::Controller(Controller::Topic));
    assert_eq!(long.route.target, Target::Controller(Controller::Topic));
    assert_eq!(short.param("topic_id"), Some("5"));
    assert_eq!(long.param("topic_id"), Some("5"));
    assert_eq!(short.param("slug"), None);
    assert_eq!(long.param("slug"), Some("my-slug"));
    assert_eq!(
        long.route.middleware,
        [Middleware::BuildHeader, Middleware::AddSlug]
    );
}

#[test]
fn test_recent_posts_wins_over_recent_term() {
    let index = index();

    let posts = index.resolve(&Method::GET, "/api/recent/posts").unwrap();
    assert_eq!(posts.route.target, Target::Endpoint(Endpoint::RecentPosts));

    let recent = index.resolve(&Method::GET, "/api/recent/week").unwrap();
    assert_eq!(recent.route.target, Target::Controller(Controller::Recent));
    assert_eq!(recent.param("term"), Some("week"));
}

#[test]
fn test_methods_are_matched() {
    let index = index();

    let upload = index.resolve(&Method::POST, "/api/post/upload").unwrap();
    assert_eq!(upload.route.target, Target::Endpoint(Endpoint::UploadPost));
    assert!(index.resolve(&Method::GET, "/api/post/upload").is_none());

    // GET routes answer HEAD.
    assert!(index.resolve(&Method::HEAD, "/api/config").is_some());

    let picture = index.resolve(&Method::POST, "/user/uploadpicture").unwrap();
    assert_eq!(
        picture.route.middleware,
        [Middleware::Authenticate, Middleware::CheckGlobalPrivacySettings]
    );
    assert_eq!(picture.route.table, "app");
}

#[test]
fn test_authorization_precedes_every_endpoint_that_needs_a_session() {
    let index = index();

    for route in index.routes() {
        let uploads_session = matches!(
            route.target,
            Target::Endpoint(
                Endpoint::UploadUserPicture
                    | Endpoint::UploadCategoryPicture
                    | Endpoint::UploadFavicon
                    | Endpoint::UploadLogo
                    | Endpoint::UsersCsv
            )
        );
        if uploads_session {
            assert!(
                route.middleware.iter().any(|m| m.is_authorization()),
                "{} has no guard",
                route.pattern
            );
        }
    }
}

#[test]
fn test_base_path_prefixes_every_route() {
    let mut config = AppConfig::default();
    config.relative_path = "/forum".to_string();
    let index = RouteIndex::for_config(&config);

    assert!(index
        .routes()
        .iter()
        .all(|route| route.pattern.to_string().starts_with("/forum")));
    assert!(index.resolve(&Method::GET, "/forum").is_some());
    assert!(index.resolve(&Method::GET, "/forum/admin").is_some());
    assert!(index.resolve(&Method::GET, "/api/config").is_none());
}

#[test]
fn test_debug_table_only_in_development() {
    let mut config = AppConfig::default();
    config.env = Env::Production;

    let index = RouteIndex::for_config(&config);
    assert!(index.routes().iter().all(|route| route.table != "debug"));
    assert!(index.resolve(&Method::GET, "/debug/routes").is_none());
}

#[test]
fn test_build_flattens_the_given_tables() {
    let index = RouteIndex::build(vec![debug::debug_routes(), site::app_routes()], "");
    let paths: Vec<String> = index
        .routes()
        .iter()
        .map(|route| route.pattern.to_string())
        .collect();

    assert_eq!(paths, ["/debug/routes", "/debug/resolve", "/user/uploadpicture"]);
}

#[test]
fn test_api_and_site_share_the_account_routes() {
    let api = api::api_routes();
    let site = site::site_routes();

    let account = |table: &forum_web::routes::RouteTable| -> Vec<(&'static str, Target)> {
        table
            .routes
            .iter()
            .filter(|r| r.path.starts_with("/user"))
            .map(|r| (r.path, r.target))
            .collect()
    };

    let api_accounts: Vec<_> = account(&api)
        .into_iter()
        .filter(|(path, _)| !path.starts_with("/user/uid"))
        .collect();
    assert_eq!(api_accounts, account(&site));
}

#[test]
fn test_login_redirect_runs_before_the_page_header() {
    let index = index();

    for path in ["/login", "/register"] {
        let page = index.resolve(&Method::GET, path).unwrap();
        assert_eq!(page.route.table, "site");
        assert_eq!(
            page.route.middleware,
            [Middleware::RedirectToAccountIfLoggedIn, Middleware::BuildHeader]
        );
    }
}

#[test]
fn test_other_methods_on_static_paths_reach_parameterized_routes() {
    let index = index();

    let account = index.resolve(&Method::GET, "/user/uploadpicture").unwrap();
    assert_eq!(account.route.target, Target::Controller(Controller::Account));
    assert_eq!(account.param("userslug"), Some("uploadpicture"));

    let topic = index.resolve(&Method::GET, "/api/topic/thumb/upload").unwrap();
    assert_eq!(topic.route.target, Target::Controller(Controller::Topic));
    assert_eq!(topic.param("topic_id"), Some("thumb"));
    assert_eq!(topic.param("slug"), Some("upload"));
}
