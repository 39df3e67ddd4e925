use anyhow::Result;
use std::time::Duration;

use tracing::{debug, error, info};

use axum_extra::extract::cookie::{Cookie, SameSite};
use tower_http::services::ServeDir;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, response, HeaderValue, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::session::{Session, COOKIE_SESSION_TOKEN_KEY};
use super::{log_requests, state::ServerState, ServerConfig};
use crate::dashboard::{render_dashboard, SearchResults, ENTER_KEY};
use crate::market::{
    ListingId, LoginRequest, MarketError, Marketplace, NewListing, NewUser, TransactionRequest,
    UserId, UserUpdate,
};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
    user_id: UserId,
    username: String,
    email: String,
}

#[derive(Deserialize, Debug, Default)]
struct UserListingsQuery {
    #[serde(default)]
    borrowed: bool,
}

#[derive(Deserialize, Debug, Default)]
struct SearchQuery {
    #[serde(default)]
    q: Option<String>,
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = match &self {
            MarketError::EmailTaken | MarketError::UsernameTaken => StatusCode::CONFLICT,
            MarketError::UserNotFound | MarketError::ListingNotFound => StatusCode::NOT_FOUND,
            MarketError::InvalidInput(_)
            | MarketError::InvalidTransition { .. }
            | MarketError::MissingParty(_) => StatusCode::BAD_REQUEST,
            MarketError::Hashing(_) | MarketError::Storage(_) | MarketError::Task(_) => {
                error!("Internal error: {:#}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn forbidden(message: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
}

fn session_cookie(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly",
        COOKIE_SESSION_TOKEN_KEY, token
    ))
    .ok()
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token.0),
    };
    Json(stats)
}

async fn register(State(state): State<ServerState>, Json(body): Json<NewUser>) -> Response {
    if state.config.disable_registration {
        return forbidden("registration is disabled");
    }
    match state.marketplace.create_user(body).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn login(State(marketplace): State<Marketplace>, Json(body): Json<LoginRequest>) -> Response {
    debug!("login() called for {}", body.email);
    let outcome = match marketplace.login(body).await {
        Ok(outcome) if outcome.matched => outcome,
        // Unknown emails are not told apart from wrong passwords
        Ok(_) | Err(MarketError::UserNotFound) => {
            return StatusCode::UNAUTHORIZED.into_response()
        }
        Err(err) => return err.into_response(),
    };

    let auth_token = match marketplace.create_session(&outcome.id).await {
        Ok(token) => token,
        Err(err) => {
            error!("Error with auth token generation: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let response_body = LoginSuccessResponse {
        token: auth_token.value.0.clone(),
        user_id: outcome.id,
        username: outcome.username,
        email: outcome.email,
    };
    let Some(cookie_value) = session_cookie(&auth_token.value.0) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    (
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie_value)],
        Json(response_body),
    )
        .into_response()
}

async fn logout(State(marketplace): State<Marketplace>, session: Session) -> Response {
    match marketplace.end_session(&session.token).await {
        Ok(_) => {
            let cookie_value = Cookie::build(Cookie::new(COOKIE_SESSION_TOKEN_KEY, ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1)) // Expire it in the past
                .same_site(SameSite::Lax)
                .build();

            response::Builder::new()
                .status(StatusCode::OK)
                .header(header::SET_COOKIE, cookie_value.to_string())
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(err) => err.into_response(),
    }
}

async fn get_users(State(marketplace): State<Marketplace>) -> Response {
    match marketplace.get_all_users().await {
        Ok(users) => Json(users).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_user(State(marketplace): State<Marketplace>, Path(id): Path<String>) -> Response {
    match marketplace.get_user(&UserId(id)).await {
        Ok(user) => Json(user).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn put_user(
    session: Session,
    State(marketplace): State<Marketplace>,
    Path(id): Path<String>,
    Json(body): Json<UserUpdate>,
) -> Response {
    let user_id = UserId(id);
    if !session.is_user(&user_id) {
        return forbidden("users can only update themselves");
    }
    match marketplace.update_user(&user_id, body).await {
        Ok(user) => Json(user).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn delete_user(
    session: Session,
    State(marketplace): State<Marketplace>,
    Path(id): Path<String>,
) -> Response {
    let user_id = UserId(id);
    if !session.is_user(&user_id) {
        return forbidden("users can only delete themselves");
    }
    match marketplace.delete_user(&user_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_user_listings(
    State(marketplace): State<Marketplace>,
    Path(id): Path<String>,
    Query(query): Query<UserListingsQuery>,
) -> Response {
    match marketplace
        .get_user_listings(&UserId(id), query.borrowed)
        .await
    {
        Ok(listings) => Json(listings).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_listings(State(marketplace): State<Marketplace>) -> Response {
    match marketplace.get_all_listings().await {
        Ok(listings) => Json(listings).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn search_listings(
    State(marketplace): State<Marketplace>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let q = query.q.unwrap_or_default();
    match marketplace.search_listings(&q).await {
        Ok(listings) => Json(listings).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn post_listing(
    session: Session,
    State(marketplace): State<Marketplace>,
    Json(body): Json<NewListing>,
) -> Response {
    match marketplace.create_listing(&session.user_id, body).await {
        Ok(listing) => (StatusCode::CREATED, Json(listing)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_listing(State(marketplace): State<Marketplace>, Path(id): Path<String>) -> Response {
    match marketplace.get_listing(&ListingId(id)).await {
        Ok(listing) => Json(listing).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Resolves the listing and checks that the session user owns it.
async fn owned_listing(
    marketplace: &Marketplace,
    session: &Session,
    listing_id: &ListingId,
) -> Result<(), Response> {
    let listing = marketplace
        .get_listing(listing_id)
        .await
        .map_err(IntoResponse::into_response)?;
    if !session.is_user(&listing.listing.owner_id) {
        return Err(forbidden("only the owner can do this"));
    }
    Ok(())
}

async fn delete_listing(
    session: Session,
    State(marketplace): State<Marketplace>,
    Path(id): Path<String>,
) -> Response {
    let listing_id = ListingId(id);
    if let Err(response) = owned_listing(&marketplace, &session, &listing_id).await {
        return response;
    }
    match marketplace.delete_listing(&listing_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn post_interest(
    session: Session,
    State(marketplace): State<Marketplace>,
    Path(id): Path<String>,
) -> Response {
    match marketplace
        .express_interest(&ListingId(id), &session.user_id)
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn put_transaction(
    session: Session,
    State(marketplace): State<Marketplace>,
    Path(id): Path<String>,
    body: Result<Json<TransactionRequest>, JsonRejection>,
) -> Response {
    // Unknown target states are a bad request like any other invalid input
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return MarketError::InvalidInput(rejection.body_text()).into_response(),
    };
    let listing_id = ListingId(id);
    if let Err(response) = owned_listing(&marketplace, &session, &listing_id).await {
        return response;
    }
    match marketplace.make_transaction(&listing_id, body).await {
        Ok(listing) => Json(listing).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn dashboard(
    session: Session,
    State(marketplace): State<Marketplace>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let mut state = match marketplace.dashboard(&session.user_id).await {
        Ok(state) => state,
        Err(err) => return err.into_response(),
    };

    // A query string behaves like typing in the search bar and pressing Enter
    state.handle_change(query.q.unwrap_or_default());
    let submitted = state.handle_search(ENTER_KEY);

    let found = match &submitted {
        Some(q) => match marketplace.search_listings(q).await {
            Ok(found) => found,
            Err(err) => return err.into_response(),
        },
        None => vec![],
    };
    let results = submitted.as_deref().map(|q| SearchResults {
        query: q,
        listings: &found,
    });
    Html(render_dashboard(&state, results)).into_response()
}

pub fn make_app(config: ServerConfig, marketplace: Marketplace) -> Result<Router> {
    let state = ServerState::new(config.clone(), marketplace);

    let auth_routes: Router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .with_state(state.clone());

    let user_routes: Router = Router::new()
        .route("/", get(get_users))
        .route("/{id}", get(get_user).put(put_user).delete(delete_user))
        .route("/{id}/listings", get(get_user_listings))
        .with_state(state.clone());

    let listing_routes: Router = Router::new()
        .route("/", get(get_listings).post(post_listing))
        .route("/search", get(search_listings))
        .route("/{id}", get(get_listing).delete(delete_listing))
        .route("/{id}/interest", post(post_interest))
        .route("/{id}/transaction", put(put_transaction))
        .with_state(state.clone());

    let dashboard_routes: Router = Router::new()
        .route("/dashboard", get(dashboard))
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

    let app: Router = home_router
        .merge(dashboard_routes)
        .nest("/v1/auth", auth_routes)
        .nest("/v1/users", user_routes)
        .nest("/v1/listings", listing_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(config: ServerConfig, marketplace: Marketplace) -> Result<()> {
    let port = config.port;
    let app = make_app(config, marketplace)?;

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    Ok(axum::serve(listener, app).await?)
}
