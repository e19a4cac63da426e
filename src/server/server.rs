use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use tracing::{debug, error};

use crate::access::{can_update_status, can_view};
use crate::notifications::{draft_task_notification, NotificationTarget};
use crate::task_store::{StoreError, TaskStore};
use crate::user::models::{GroupPermissions, User};
use crate::user::{AuthToken, AuthTokenValue, UserStore};
use crate::workorder::models::{StepStatus, Task, TaskStatus};
use crate::workorder::workflow::{self, Actor, WorkflowError};
use axum_extra::extract::cookie::{Cookie, SameSite};
use tower_http::services::ServeDir;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{response, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::session::Session;
use super::{log_requests, state::*, RequestsLoggingLevel, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub session_user: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

#[derive(Deserialize, Debug)]
struct StatusChangeBody {
    pub status: TaskStatus,
    pub comment: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RevertStepBody {
    pub target: StepStatus,
}

fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::Network(reason) => {
            error!("Store unreachable: {}", reason);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        StoreError::Data(err) => {
            error!("Store error: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn workflow_error_response(err: WorkflowError) -> Response {
    match err {
        WorkflowError::StepNotFound(_) => StatusCode::NOT_FOUND.into_response(),
        WorkflowError::PredecessorNotCompleted(_)
        | WorkflowError::InvalidStepTransition(_)
        | WorkflowError::NotCompleted => {
            (StatusCode::CONFLICT, err.to_string()).into_response()
        }
    }
}

fn is_admin(user: &User, groups: &[GroupPermissions]) -> bool {
    groups
        .iter()
        .any(|g| g.is_system_admin && user.is_in_group(&g.id))
}

/// Loads a task and checks the session user may see it.
/// 404 when the task does not exist, 403 when it exists but is not visible.
fn load_visible_task(
    task_store: &dyn TaskStore,
    session: &Session,
    task_id: &str,
) -> Result<(Task, Vec<GroupPermissions>), Response> {
    let groups = task_store.fetch_groups().map_err(store_error_response)?;
    let task = task_store
        .get_task(task_id)
        .map_err(store_error_response)?
        .ok_or_else(|| StatusCode::NOT_FOUND.into_response())?;
    if !can_view(&session.user, &task, &groups) {
        return Err(StatusCode::FORBIDDEN.into_response());
    }
    Ok((task, groups))
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        session_user: session.map(|s| s.user.id),
    };
    Json(stats)
}

async fn login(
    State(user_store): State<GuardedUserStore>,
    Json(body): Json<LoginBody>,
) -> Response {
    debug!("login() called for {}", body.email);
    let user = match user_store.get_user_by_email(&body.email) {
        Ok(Some(user)) => user,
        Ok(None) => return StatusCode::FORBIDDEN.into_response(),
        Err(err) => {
            error!("Failed to look up user: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !user.active {
        debug!("Login attempt for inactive user {}", user.id);
        return StatusCode::FORBIDDEN.into_response();
    }

    let credentials = match user_store.get_user_credentials(&user.id) {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return StatusCode::FORBIDDEN.into_response(),
        Err(err) => {
            error!("Failed to load credentials: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !credentials.verify(&body.password) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let auth_token = AuthToken {
        user_id: user.id.clone(),
        created: SystemTime::now(),
        last_used: None,
        value: AuthTokenValue::generate(),
    };
    if let Err(err) = user_store.add_auth_token(auth_token.clone()) {
        error!("Error storing auth token: {}", err);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if let Err(err) = user_store.touch_last_access(&user.id) {
        debug!("Failed to stamp last access for {}: {}", user.id, err);
    }

    let response_body = LoginSuccessResponse {
        token: auth_token.value.0.clone(),
    };
    let response_body = serde_json::to_string(&response_body).unwrap();

    let cookie_value = HeaderValue::from_str(&format!(
        "session_token={}; Path=/; HttpOnly",
        auth_token.value.0
    ))
    .unwrap();
    response::Builder::new()
        .status(StatusCode::CREATED)
        .header(axum::http::header::SET_COOKIE, cookie_value)
        .body(Body::from(response_body))
        .unwrap()
}

async fn logout(State(user_store): State<GuardedUserStore>, session: Session) -> Response {
    match user_store.delete_auth_token(&AuthTokenValue(session.token)) {
        Ok(Some(_)) => {
            let cookie_value = Cookie::build(Cookie::new("session_token", ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1)) // Expire it in the past
                .same_site(SameSite::Lax)
                .build();

            response::Builder::new()
                .status(StatusCode::OK)
                .header(axum::http::header::SET_COOKIE, cookie_value.to_string())
                .body(Body::empty())
                .unwrap()
        }
        Ok(None) => StatusCode::BAD_REQUEST.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn get_tasks(session: Session, State(task_store): State<GuardedTaskStore>) -> Response {
    let groups = match task_store.fetch_groups() {
        Ok(groups) => groups,
        Err(err) => return store_error_response(err),
    };
    match task_store.fetch_all_tasks() {
        Ok(tasks) => {
            let visible: Vec<Task> = tasks
                .into_iter()
                .filter(|t| can_view(&session.user, t, &groups))
                .collect();
            Json(visible).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

async fn get_task(
    session: Session,
    State(task_store): State<GuardedTaskStore>,
    Path(id): Path<String>,
) -> Response {
    match load_visible_task(task_store.as_ref(), &session, &id) {
        Ok((task, _)) => Json(task).into_response(),
        Err(response) => response,
    }
}

async fn put_task(
    session: Session,
    State(state): State<ServerState>,
    Json(mut task): Json<Task>,
) -> Response {
    let task_store = &state.task_store;
    let groups = match task_store.fetch_groups() {
        Ok(groups) => groups,
        Err(err) => return store_error_response(err),
    };

    let existing = match task_store.get_task(&task.id) {
        Ok(existing) => existing,
        Err(err) => return store_error_response(err),
    };

    match &existing {
        None => {
            let can_create = groups
                .iter()
                .any(|g| g.can_create && session.user.is_in_group(&g.id));
            if !can_create && !is_admin(&session.user, &groups) {
                return StatusCode::FORBIDDEN.into_response();
            }
        }
        Some(existing) => {
            if !can_view(&session.user, existing, &groups) {
                return StatusCode::FORBIDDEN.into_response();
            }
        }
    }

    task.sort_steps();
    match task_store.upsert_task(&task) {
        Ok(()) => {
            if existing.is_none() {
                draft_creation_notification(&state, &task, &groups);
            }
            let status = if existing.is_none() {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(task)).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

/// Drafts the "new task" notification when the task asks for one.
/// Individual targets resolve to the responsible user, group targets to the
/// executor group. Failures here never fail the request.
fn draft_creation_notification(state: &ServerState, task: &Task, groups: &[GroupPermissions]) {
    let Some(target) = task.notification_target else {
        return;
    };

    let users: Vec<User> = match (target, task.responsible_id.as_deref()) {
        (NotificationTarget::Individual, Some(responsible_id)) => {
            match state.user_store.get_user(responsible_id) {
                Ok(user) => user.into_iter().collect(),
                Err(err) => {
                    debug!("Could not resolve notification recipient: {}", err);
                    vec![]
                }
            }
        }
        _ => vec![],
    };
    let target_groups: Vec<GroupPermissions> = groups
        .iter()
        .filter(|g| g.id == task.executor_group_id)
        .cloned()
        .collect();

    if let Some(draft) = draft_task_notification(task, target, &users, &target_groups) {
        debug!(subject = %draft.subject, "Notification drafted, no transport configured");
    }
}

async fn post_task_status(
    session: Session,
    State(task_store): State<GuardedTaskStore>,
    Path(id): Path<String>,
    Json(body): Json<StatusChangeBody>,
) -> Response {
    let (mut task, groups) = match load_visible_task(task_store.as_ref(), &session, &id) {
        Ok(x) => x,
        Err(response) => return response,
    };

    if !can_update_status(&session.user, &task, &groups, body.status) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let actor = Actor::new(session.user.id.clone(), session.user.name.clone());
    workflow::set_task_status(&mut task, body.status, &actor);
    if let Some(comment) = body.comment {
        workflow::add_comment(&mut task, &actor, comment);
    }

    match task_store.upsert_task(&task) {
        Ok(()) => Json(task).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn post_step_start(
    session: Session,
    State(task_store): State<GuardedTaskStore>,
    Path((task_id, step_id)): Path<(String, String)>,
) -> Response {
    mutate_step(task_store, session, &task_id, |task, actor| {
        workflow::start_step(task, &step_id, actor)
    })
}

async fn post_step_complete(
    session: Session,
    State(task_store): State<GuardedTaskStore>,
    Path((task_id, step_id)): Path<(String, String)>,
) -> Response {
    mutate_step(task_store, session, &task_id, |task, actor| {
        workflow::complete_step(task, &step_id, actor)
    })
}

async fn post_step_revert(
    session: Session,
    State(task_store): State<GuardedTaskStore>,
    Path((task_id, step_id)): Path<(String, String)>,
    Json(body): Json<RevertStepBody>,
) -> Response {
    mutate_step(task_store, session, &task_id, |task, actor| {
        workflow::revert_step(task, &step_id, body.target, actor)
    })
}

/// Shared guard-and-persist path for step transitions: visibility, then
/// status-update authorization (step work drives the task into in-progress),
/// then the workflow mutation, then upsert.
fn mutate_step<F>(
    task_store: GuardedTaskStore,
    session: Session,
    task_id: &str,
    mutation: F,
) -> Response
where
    F: FnOnce(&mut Task, &Actor) -> Result<(), WorkflowError>,
{
    let (mut task, groups) = match load_visible_task(task_store.as_ref(), &session, task_id) {
        Ok(x) => x,
        Err(response) => return response,
    };

    if !can_update_status(&session.user, &task, &groups, TaskStatus::InProgress) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let actor = Actor::new(session.user.id.clone(), session.user.name.clone());
    if let Err(err) = mutation(&mut task, &actor) {
        return workflow_error_response(err);
    }

    match task_store.upsert_task(&task) {
        Ok(()) => Json(task).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn post_task_reopen(
    session: Session,
    State(task_store): State<GuardedTaskStore>,
    Path(id): Path<String>,
) -> Response {
    mutate_step(task_store, session, &id, |task, actor| {
        workflow::reopen_task(task, actor)
    })
}

async fn get_users(_session: Session, State(user_store): State<GuardedUserStore>) -> Response {
    match user_store.fetch_all_users() {
        Ok(users) => Json(users).into_response(),
        Err(err) => {
            error!("Failed to fetch users: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn put_user(
    session: Session,
    State(state): State<ServerState>,
    Json(user): Json<User>,
) -> Response {
    let groups = match state.task_store.fetch_groups() {
        Ok(groups) => groups,
        Err(err) => return store_error_response(err),
    };
    if !is_admin(&session.user, &groups) {
        return StatusCode::FORBIDDEN.into_response();
    }

    match state.user_store.upsert_user(&user) {
        Ok(()) => Json(user).into_response(),
        Err(err) => {
            error!("Failed to upsert user: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_sectors(_session: Session, State(task_store): State<GuardedTaskStore>) -> Response {
    match task_store.fetch_sectors() {
        Ok(sectors) => Json(sectors).into_response(),
        Err(err) => store_error_response(err),
    }
}

async fn get_groups(_session: Session, State(task_store): State<GuardedTaskStore>) -> Response {
    match task_store.fetch_groups() {
        Ok(groups) => Json(groups).into_response(),
        Err(err) => store_error_response(err),
    }
}

fn make_app(
    config: ServerConfig,
    task_store: Arc<dyn TaskStore>,
    user_store: Arc<dyn UserStore>,
) -> Result<Router> {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        task_store,
        user_store,
    };

    let auth_routes: Router = Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .with_state(state.clone());

    let api_routes: Router = Router::new()
        .route("/tasks", get(get_tasks))
        .route("/tasks", put(put_task))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/status", post(post_task_status))
        .route("/tasks/{id}/reopen", post(post_task_reopen))
        .route("/tasks/{id}/steps/{step_id}/start", post(post_step_start))
        .route(
            "/tasks/{id}/steps/{step_id}/complete",
            post(post_step_complete),
        )
        .route("/tasks/{id}/steps/{step_id}/revert", post(post_step_revert))
        .route("/users", get(get_users))
        .route("/users", put(put_user))
        .route("/sectors", get(get_sectors))
        .route("/groups", get(get_groups))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let mut app: Router = home_router
        .nest("/v1/auth", auth_routes)
        .nest("/v1", api_routes);

    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(
    task_store: Arc<dyn TaskStore>,
    user_store: Arc<dyn UserStore>,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
    frontend_dir_path: Option<String>,
) -> Result<()> {
    let config = ServerConfig {
        port,
        requests_logging_level,
        frontend_dir_path,
    };
    let app = make_app(config, task_store, user_store)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_store::InMemoryTaskStore;
    use crate::user::{PasswordCredentials, SqliteUserStore, UserCredentialsStore};
    use crate::workorder::fixtures::{task_with_steps, user};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt; // for `oneshot`

    fn test_stores() -> (Arc<InMemoryTaskStore>, Arc<SqliteUserStore>) {
        (
            Arc::new(InMemoryTaskStore::seeded()),
            Arc::new(SqliteUserStore::in_memory().unwrap()),
        )
    }

    fn app_with(task_store: Arc<dyn TaskStore>, user_store: Arc<dyn UserStore>) -> Router {
        make_app(ServerConfig::default(), task_store, user_store).unwrap()
    }

    fn provision_user(
        user_store: &SqliteUserStore,
        id: &str,
        groups: &[&str],
        password: &str,
    ) -> User {
        let user = user(id, "s-production", groups);
        user_store.upsert_user(&user).unwrap();
        user_store
            .update_user_credentials(PasswordCredentials::from_plain_password(id, password).unwrap())
            .unwrap();
        user
    }

    async fn login_token(app: &Router, email: &str, password: &str) -> String {
        let body = serde_json::json!({ "email": email, "password": password }).to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        parsed["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn responds_forbidden_on_protected_routes() {
        let (task_store, user_store) = test_stores();
        let app = app_with(task_store, user_store);

        let protected_routes = vec![
            "/v1/tasks",
            "/v1/tasks/t-1",
            "/v1/users",
            "/v1/sectors",
            "/v1/groups",
            "/v1/auth/logout",
        ];

        for route in protected_routes.into_iter() {
            println!("Trying route {}", route);
            let request = Request::builder().uri(route).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn home_is_public() {
        let (task_store, user_store) = test_stores();
        let app = app_with(task_store, user_store);

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let (task_store, user_store) = test_stores();
        provision_user(&user_store, "u-op", &["g-production"], "correct-pw");
        let app = app_with(task_store, user_store);

        for (email, password) in [
            ("u-op@plant.example", "wrong-pw"),
            ("nobody@plant.example", "correct-pw"),
        ] {
            let body = serde_json::json!({ "email": email, "password": password }).to_string();
            let request = Request::builder()
                .method("POST")
                .uri("/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn login_rejects_inactive_user() {
        let (task_store, user_store) = test_stores();
        let mut inactive = provision_user(&user_store, "u-gone", &[], "pw");
        inactive.active = false;
        user_store.upsert_user(&inactive).unwrap();
        let app = app_with(task_store, user_store);

        let body =
            serde_json::json!({ "email": "u-gone@plant.example", "password": "pw" }).to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn login_token_grants_access_to_tasks() {
        let (task_store, user_store) = test_stores();
        provision_user(&user_store, "u-op", &["g-production"], "pw");
        let app = app_with(task_store, user_store);

        let token = login_token(&app, "u-op@plant.example", "pw").await;

        let request = Request::builder()
            .uri("/v1/tasks")
            .header("Authorization", &token)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_invalidates_token() {
        let (task_store, user_store) = test_stores();
        provision_user(&user_store, "u-op", &[], "pw");
        let app = app_with(task_store, user_store);

        let token = login_token(&app, "u-op@plant.example", "pw").await;

        let request = Request::builder()
            .uri("/v1/auth/logout")
            .header("Authorization", &token)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .uri("/v1/tasks")
            .header("Authorization", &token)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn task_list_is_filtered_by_visibility() {
        let (task_store, user_store) = test_stores();
        // A private task visible to nobody but its requestor.
        let mut hidden = task_with_steps(&[]);
        hidden.id = "t-private".to_string();
        hidden.visibility = crate::workorder::models::TaskVisibility::Private;
        hidden.requestor_id = "u-someone-else".to_string();
        hidden.executor_group_id = "g-maintenance".to_string();
        task_store.upsert_task(&hidden).unwrap();

        provision_user(&user_store, "u-op", &[], "pw");
        let app = app_with(task_store, user_store);
        let token = login_token(&app, "u-op@plant.example", "pw").await;

        let request = Request::builder()
            .uri("/v1/tasks")
            .header("Authorization", &token)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let tasks: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
        assert!(tasks.iter().all(|t| t["id"] != "t-private"));

        // Direct access is forbidden, not hidden.
        let request = Request::builder()
            .uri("/v1/tasks/t-private")
            .header("Authorization", &token)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (task_store, user_store) = test_stores();
        provision_user(&user_store, "u-op", &[], "pw");
        let app = app_with(task_store, user_store);
        let token = login_token(&app, "u-op@plant.example", "pw").await;

        let request = Request::builder()
            .uri("/v1/tasks/t-does-not-exist")
            .header("Authorization", &token)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_task_requires_capability() {
        let (task_store, user_store) = test_stores();
        provision_user(&user_store, "u-plain", &[], "pw");
        provision_user(&user_store, "u-creator", &["g-quality"], "pw");
        let app = app_with(task_store, user_store);

        let mut task = task_with_steps(&[]);
        task.id = "t-new".to_string();
        let body = serde_json::to_string(&task).unwrap();

        let token = login_token(&app, "u-plain@plant.example", "pw").await;
        let request = Request::builder()
            .method("PUT")
            .uri("/v1/tasks")
            .header("Authorization", &token)
            .header("content-type", "application/json")
            .body(Body::from(body.clone()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // g-quality holds can_create in the seeded store.
        let token = login_token(&app, "u-creator@plant.example", "pw").await;
        let request = Request::builder()
            .method("PUT")
            .uri("/v1/tasks")
            .header("Authorization", &token)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn step_lifecycle_through_the_api() {
        let (task_store, user_store) = test_stores();
        // u-op is in the executor group and may drive steps.
        provision_user(&user_store, "u-op", &["g-production"], "pw");
        let task = task_with_steps(&[StepStatus::Pending, StepStatus::Pending]);
        task_store.upsert_task(&task).unwrap();
        let app = app_with(task_store.clone(), user_store);
        let token = login_token(&app, "u-op@plant.example", "pw").await;

        // Second step cannot start first.
        let request = Request::builder()
            .method("POST")
            .uri("/v1/tasks/t-1/steps/st-2/start")
            .header("Authorization", &token)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        for uri in [
            "/v1/tasks/t-1/steps/st-1/start",
            "/v1/tasks/t-1/steps/st-1/complete",
            "/v1/tasks/t-1/steps/st-2/complete",
        ] {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header("Authorization", &token)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let stored = task_store.get_task("t-1").unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);

        // Reopen brings it back to in-progress.
        let request = Request::builder()
            .method("POST")
            .uri("/v1/tasks/t-1/reopen")
            .header("Authorization", &token)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = task_store.get_task("t-1").unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::InProgress);
        assert!(stored.completed_at.is_none());
        assert_eq!(stored.history[0].action, "reopened");
    }

    #[tokio::test]
    async fn manual_completion_requires_can_finish() {
        let (task_store, user_store) = test_stores();
        // g-quality: can_update_status but no can_finish in the seed data.
        provision_user(&user_store, "u-q", &["g-quality"], "pw");
        let mut task = task_with_steps(&[]);
        task.executor_group_id = "g-quality".to_string();
        task_store.upsert_task(&task).unwrap();
        let app = app_with(task_store, user_store);
        let token = login_token(&app, "u-q@plant.example", "pw").await;

        let body = serde_json::json!({ "status": "completed" }).to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/tasks/t-1/status")
            .header("Authorization", &token)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Waiting is a generic transition and goes through.
        let body = serde_json::json!({ "status": "waiting", "comment": "parts missing" })
            .to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/tasks/t-1/status")
            .header("Authorization", &token)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn put_user_is_admin_only() {
        let (task_store, user_store) = test_stores();
        provision_user(&user_store, "u-plain", &[], "pw");
        provision_user(&user_store, "u-admin", &["g-admin"], "pw");
        let app = app_with(task_store, user_store);

        let new_user = user("u-new", "s-production", &[]);
        let body = serde_json::to_string(&new_user).unwrap();

        let token = login_token(&app, "u-plain@plant.example", "pw").await;
        let request = Request::builder()
            .method("PUT")
            .uri("/v1/users")
            .header("Authorization", &token)
            .header("content-type", "application/json")
            .body(Body::from(body.clone()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let token = login_token(&app, "u-admin@plant.example", "pw").await;
        let request = Request::builder()
            .method("PUT")
            .uri("/v1/users")
            .header("Authorization", &token)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
