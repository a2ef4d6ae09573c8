//! Application route table.

use crate::handlers::{auth, dashboard, evaluations, health, matieres, users};
use crate::routing::{Router, Routes};

/// Numeric identifier segment
const ID: &str = r"\d+";

/// Declare every application route
pub fn app_routes() -> Router {
    let mut router = Router::new();

    router.get("/health", health::check).name("health");

    router.group("/auth", |g| {
        g.get("/csrf-token", auth::csrf_token).name("auth.csrf");
        g.get("/login", auth::login_form).name("auth.login");
        g.post("/login", auth::login).name("auth.login.submit");
        g.post("/register", auth::register).name("auth.register");
        g.post("/logout", auth::logout)
            .middleware("Auth")
            .name("auth.logout");
        g.get("/me", auth::me).middleware("Auth").name("auth.me");
        g.put("/change-password", auth::change_password)
            .middleware("Auth")
            .name("auth.change_password");
    });

    router.group("/users", |g| {
        g.middleware("Auth");
        g.get("/", users::index)
            .middleware("Admin")
            .name("admin.users.index");
        g.get("/:id", users::show).with("id", ID).name("users.show");
        g.put("/:id", users::update).with("id", ID).name("users.update");
        g.delete("/:id", users::destroy)
            .with("id", ID)
            .middleware("Admin")
            .name("admin.users.destroy");
    });

    router.group("/evaluations", |g| {
        g.get("/", evaluations::index)
            .middleware("Auth")
            .name("evaluations.index");
        g.post("/", evaluations::store)
            .middleware("Auth:professor")
            .name("evaluations.store");
        g.get("/:id", evaluations::show)
            .with("id", ID)
            .middleware("Auth")
            .name("evaluations.show");
        g.put("/:id", evaluations::update)
            .with("id", ID)
            .middleware("Auth:professor")
            .name("evaluations.update");
        g.delete("/:id", evaluations::destroy)
            .with("id", ID)
            .middleware("Auth")
            .middleware("Admin")
            .name("admin.evaluations.destroy");
        g.post("/:id/notes", evaluations::grade)
            .with("id", ID)
            .middleware("Auth:professor")
            .name("evaluations.notes");
    });

    router.group("/matieres", |g| {
        g.middleware("Auth");
        g.get("/", matieres::index).name("matieres.index");
        g.get("/:id", matieres::show).with("id", ID).name("matieres.show");
        g.group("/", |admin| {
            admin.middleware("Admin");
            admin.post("/", matieres::store).name("admin.matieres.store");
            admin
                .put("/:id", matieres::update)
                .with("id", ID)
                .name("admin.matieres.update");
            admin
                .delete("/:id", matieres::destroy)
                .with("id", ID)
                .name("admin.matieres.destroy");
        });
    });

    router
        .get("/admin/dashboard", dashboard::admin)
        .middleware("Auth")
        .middleware("Admin")
        .name("admin.dashboard");
    router
        .get("/professor/dashboard", dashboard::professor)
        .middleware("Auth:professor")
        .name("professor.dashboard");
    router
        .get("/student/dashboard", dashboard::student)
        .middleware("Auth:student")
        .name("student.dashboard");

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::middleware::MiddlewareRegistry;
    use axum::http::Method;

    #[test]
    fn application_table_builds() {
        let table = app_routes()
            .build(&MiddlewareRegistry::with_defaults(&Config::default()))
            .unwrap();

        assert_eq!(table.url_for("auth.login", &[]).unwrap(), "/auth/login");
        assert_eq!(
            table.url_for("admin.users.destroy", &[("id", "5")]).unwrap(),
            "/users/5"
        );
        assert_eq!(
            table.name_of(&Method::DELETE, "/users/5"),
            Some("admin.users.destroy")
        );
        assert_eq!(
            table.name_of(&Method::POST, "/matieres"),
            Some("admin.matieres.store")
        );
        assert_eq!(table.name_of(&Method::GET, "/users/abc"), None);
    }

    #[test]
    fn route_middleware_order() {
        let table = app_routes()
            .build(&MiddlewareRegistry::with_defaults(&Config::default()))
            .unwrap();
        let route = table
            .iter()
            .find(|r| r.name() == Some("admin.matieres.destroy"))
            .unwrap();
        let names: Vec<&str> = route.middleware().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Auth", "Admin"]);
    }
}
