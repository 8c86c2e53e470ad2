use std::sync::Arc;

use reqwest::{header, Client, Response, StatusCode};
use serde::Serialize;
use shared::{
    domain::{ConnectionId, Role, UserId},
    error::ApiRejection,
    protocol::{
        ConnectionBuckets, ConnectionRecord, ConnectionRequestBody, ConnectionReviewBody,
        LoginRequest, LoginResponse, Paginated, ProfileSummary, ProfileUpdate, RegisterRequest,
        ReviewDecision, SessionUser,
    },
    tags,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod error;
pub mod lists;
pub mod view;

pub use error::ClientError;
pub use lists::{ActionOutcome, ConnectionAction, ListPatch, ListsState, Slot, TransitionError};
pub use view::{
    ActionControl, ConnectionListsView, Counterpart, ListItem, ListView, ViewError,
};

const CSRF_COOKIE: &str = "csrftoken";
const CSRF_HEADER: &str = "X-CSRFToken";

#[derive(Debug, Clone)]
pub enum ClientEvent {
    LoggedIn(SessionUser),
    LoggedOut,
    ListsLoaded,
    ListsChanged(Vec<ListPatch>),
    ActionFailed {
        connection_id: ConnectionId,
        message: String,
    },
    Error(String),
}

/// Everything a front end needs to persist and later resume a session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub token: String,
    pub csrf_token: Option<String>,
    pub user: SessionUser,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    csrf_token: Option<String>,
    viewer: Option<SessionUser>,
}

#[derive(Debug, Default)]
struct ListsDomain {
    state: ListsState,
    view: Option<ConnectionListsView>,
}

/// Discovery filters; unset fields are omitted from the query string.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    pub role: Option<Role>,
    pub skills: Vec<String>,
    pub interests: Vec<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct DiscoveryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skills: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interests: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

impl DiscoveryFilter {
    fn query(&self) -> DiscoveryQuery {
        DiscoveryQuery {
            role: self.role.map(Role::as_str),
            skills: (!self.skills.is_empty()).then(|| tags::join(&self.skills)),
            interests: (!self.interests.is_empty()).then(|| tags::join(&self.interests)),
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|search| !search.is_empty())
                .map(str::to_string),
            page: self.page,
        }
    }
}

pub struct MentorshipClient {
    http: Client,
    base_url: String,
    session: Mutex<SessionState>,
    lists: Mutex<ListsDomain>,
    events: broadcast::Sender<ClientEvent>,
}

impl MentorshipClient {
    pub fn new(base_url: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let base_url = base_url.into();
        Arc::new(Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session: Mutex::new(SessionState::default()),
            lists: Mutex::new(ListsDomain::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn auth_token(&self) -> Result<String, ClientError> {
        self.session
            .lock()
            .await
            .token
            .clone()
            .ok_or(ClientError::AuthRequired("missing auth token"))
    }

    /// State-changing calls need both the token and the CSRF cookie captured
    /// at sign-in; a missing credential short-circuits before any network
    /// traffic.
    async fn mutation_credentials(&self) -> Result<(String, String), ClientError> {
        let guard = self.session.lock().await;
        let token = guard
            .token
            .clone()
            .ok_or(ClientError::AuthRequired("missing auth token"))?;
        let csrf = guard
            .csrf_token
            .clone()
            .ok_or(ClientError::AuthRequired("missing csrf cookie"))?;
        Ok((token, csrf))
    }

    pub async fn viewer(&self) -> Option<SessionUser> {
        self.session.lock().await.viewer.clone()
    }

    pub async fn session_snapshot(&self) -> Option<SessionSnapshot> {
        let guard = self.session.lock().await;
        Some(SessionSnapshot {
            token: guard.token.clone()?,
            csrf_token: guard.csrf_token.clone(),
            user: guard.viewer.clone()?,
        })
    }

    /// Restores a previously saved session without contacting the server.
    pub async fn resume(&self, snapshot: SessionSnapshot) {
        {
            let mut guard = self.session.lock().await;
            guard.token = Some(snapshot.token);
            guard.csrf_token = snapshot.csrf_token;
            guard.viewer = Some(snapshot.user.clone());
        }
        let mut lists = self.lists.lock().await;
        lists.state = ListsState::default();
        lists.view = Some(ConnectionListsView::empty(snapshot.user.id));
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.endpoint("register/"))
            .json(request)
            .send()
            .await?;
        let response = check(response).await?;
        self.remember_csrf(&response).await;
        info!(username = %request.username, "session: account registered");
        Ok(())
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionUser, ClientError> {
        let response = self
            .http
            .post(self.endpoint("login/"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let response = check(response).await?;
        let csrf = csrf_from_response(&response);
        let body: LoginResponse = response.json().await?;

        {
            let mut guard = self.session.lock().await;
            guard.token = Some(body.token.clone());
            guard.csrf_token = csrf;
            guard.viewer = Some(body.user.clone());
        }
        {
            let mut lists = self.lists.lock().await;
            lists.state = ListsState::default();
            lists.view = Some(ConnectionListsView::empty(body.user.id));
        }

        info!(user_id = body.user.id.0, "session: signed in");
        let _ = self.events.send(ClientEvent::LoggedIn(body.user.clone()));
        Ok(body.user)
    }

    /// Invalidates the token server-side and clears the local session. A
    /// token the server already rejected still clears the local session.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let (token, csrf) = self.mutation_credentials().await?;
        let result = async {
            let response = self
                .http
                .post(self.endpoint("logout/"))
                .header(header::AUTHORIZATION, format!("Token {token}"))
                .header(CSRF_HEADER, csrf)
                .send()
                .await?;
            check(response).await?;
            Ok::<_, ClientError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.clear_session().await;
                info!("session: signed out");
                Ok(())
            }
            Err(ClientError::SessionExpired(rejection)) => {
                warn!(%rejection, "session: sign-out with an already-invalid token");
                self.clear_session().await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn clear_session(&self) {
        {
            let mut guard = self.session.lock().await;
            *guard = SessionState::default();
        }
        {
            let mut lists = self.lists.lock().await;
            *lists = ListsDomain::default();
        }
        let _ = self.events.send(ClientEvent::LoggedOut);
    }

    async fn remember_csrf(&self, response: &Response) {
        if let Some(csrf) = csrf_from_response(response) {
            self.session.lock().await.csrf_token = Some(csrf);
        }
    }

    pub async fn my_profile(&self) -> Result<ProfileSummary, ClientError> {
        let token = self.auth_token().await?;
        let response = self
            .http
            .get(self.endpoint("profile/"))
            .header(header::AUTHORIZATION, format!("Token {token}"))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> Result<ProfileSummary, ClientError> {
        let (token, csrf) = self.mutation_credentials().await?;
        let response = self
            .http
            .put(self.endpoint("profile/"))
            .header(header::AUTHORIZATION, format!("Token {token}"))
            .header(CSRF_HEADER, csrf)
            .json(update)
            .send()
            .await?;
        let profile: ProfileSummary = check(response).await?.json().await?;
        info!(profile_id = profile.id.0, "profile: updated");
        Ok(profile)
    }

    /// Public profile lookup. The token rides along when present so the
    /// reported connection standing is viewer-relative.
    pub async fn profile_of(&self, user_id: UserId) -> Result<ProfileSummary, ClientError> {
        let token = { self.session.lock().await.token.clone() };
        let mut request = self
            .http
            .get(self.endpoint(&format!("profiles/{}/", user_id.0)));
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        Ok(check(request.send().await?).await?.json().await?)
    }

    pub async fn discover(
        &self,
        filter: &DiscoveryFilter,
    ) -> Result<Paginated<ProfileSummary>, ClientError> {
        let token = { self.session.lock().await.token.clone() };
        let mut request = self
            .http
            .get(self.endpoint("users/"))
            .query(&filter.query());
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        Ok(check(request.send().await?).await?.json().await?)
    }

    /// Fetches the three buckets in one call and renders them. On failure the
    /// stored view carries the error text in place of all three lists; no
    /// partial stale items survive.
    pub async fn load_connections(&self) -> Result<ConnectionListsView, ClientError> {
        let token = self.auth_token().await?;
        let viewer = self
            .viewer()
            .await
            .ok_or(ClientError::AuthRequired("missing viewer identity"))?;

        let result = async {
            let response = self
                .http
                .get(self.endpoint("connections/"))
                .header(header::AUTHORIZATION, format!("Token {token}"))
                .send()
                .await?;
            Ok::<ConnectionBuckets, ClientError>(check(response).await?.json().await?)
        }
        .await;

        let mut lists = self.lists.lock().await;
        match result {
            Ok(buckets) => {
                let (state, duplicates) = ListsState::from_buckets(&buckets);
                for id in &duplicates {
                    warn!(
                        connection_id = id.0,
                        "connections: server repeated an id across buckets, keeping the first occurrence"
                    );
                }
                let view = ConnectionListsView::render(viewer.id, &buckets);
                info!(
                    incoming = buckets.incoming.len(),
                    outgoing = buckets.outgoing.len(),
                    current = buckets.current.len(),
                    "connections: lists loaded"
                );
                lists.state = state;
                lists.view = Some(view.clone());
                drop(lists);
                let _ = self.events.send(ClientEvent::ListsLoaded);
                Ok(view)
            }
            Err(err) => {
                lists.state = ListsState::default();
                lists.view = Some(ConnectionListsView::failed(viewer.id, err.to_string()));
                drop(lists);
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Snapshot of the currently rendered lists, if a session is active.
    pub async fn lists_view(&self) -> Option<ConnectionListsView> {
        self.lists.lock().await.view.clone()
    }

    /// Sends a connection request and tracks the created record in the
    /// outgoing list using the server's returned representation.
    pub async fn send_request(&self, user_id: UserId) -> Result<ConnectionRecord, ClientError> {
        let (token, csrf) = self.mutation_credentials().await?;
        let response = self
            .http
            .post(self.endpoint("connections/request/"))
            .header(header::AUTHORIZATION, format!("Token {token}"))
            .header(CSRF_HEADER, csrf)
            .json(&ConnectionRequestBody { user_id })
            .send()
            .await?;
        let record: ConnectionRecord = check(response).await?.json().await?;
        info!(
            connection_id = record.id.0,
            target_user_id = user_id.0,
            "connections: request sent"
        );

        let reconcile = {
            let mut lists = self.lists.lock().await;
            if lists.view.is_none() {
                None
            } else {
                match lists.state.apply_send(&record) {
                    Ok(patches) => {
                        if let Some(view) = lists.view.as_mut() {
                            view.apply_all(&patches);
                        }
                        Some(Ok(patches))
                    }
                    Err(err) => Some(Err(err)),
                }
            }
        };

        match reconcile {
            Some(Ok(patches)) => {
                let _ = self.events.send(ClientEvent::ListsChanged(patches));
            }
            Some(Err(err)) => {
                // The request committed server-side; stale local lists are a
                // secondary concern, repaired by re-fetching and only logged
                // on failure.
                warn!(
                    connection_id = record.id.0,
                    error = %err,
                    "connections: created request did not fit the local lists, reloading"
                );
                if let Err(reload_err) = self.load_connections().await {
                    warn!(error = %reload_err, "connections: reload after send failed");
                }
            }
            None => {}
        }

        Ok(record)
    }

    /// Dispatches accept/decline/cancel/remove for a rendered connection.
    /// Controls are disabled for the duration of the request; on failure they
    /// are restored and the server's message is surfaced; on success the
    /// reconciler patches the lists from the server's outcome.
    pub async fn submit_action(
        &self,
        id: ConnectionId,
        action: ConnectionAction,
    ) -> Result<ActionOutcome, ClientError> {
        let (token, csrf) = self.mutation_credentials().await?;

        {
            let mut lists = self.lists.lock().await;
            let view = lists.view.as_mut().ok_or(ClientError::ListsNotLoaded)?;
            view.begin_action(id, action)?;
        }

        match self.perform_action(&token, &csrf, id, action).await {
            Ok(outcome) => {
                let patches = {
                    let mut lists = self.lists.lock().await;
                    match lists.state.apply_action(id, action, &outcome) {
                        Ok(patches) => {
                            if let Some(view) = lists.view.as_mut() {
                                view.apply_all(&patches);
                            }
                            Some(patches)
                        }
                        Err(err) => {
                            warn!(
                                connection_id = id.0,
                                error = %err,
                                "connections: confirmed action no longer matches local lists, reloading"
                            );
                            None
                        }
                    }
                };
                match patches {
                    Some(patches) => {
                        let _ = self.events.send(ClientEvent::ListsChanged(patches));
                    }
                    None => {
                        if let Err(reload_err) = self.load_connections().await {
                            warn!(
                                error = %reload_err,
                                "connections: reload after confirmed action failed"
                            );
                        }
                    }
                }
                Ok(outcome)
            }
            Err(err) => {
                {
                    let mut lists = self.lists.lock().await;
                    if let Some(view) = lists.view.as_mut() {
                        view.restore_controls(id);
                    }
                }
                let _ = self.events.send(ClientEvent::ActionFailed {
                    connection_id: id,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn perform_action(
        &self,
        token: &str,
        csrf: &str,
        id: ConnectionId,
        action: ConnectionAction,
    ) -> Result<ActionOutcome, ClientError> {
        let url = self.endpoint(&format!("connections/{}/", id.0));
        let request = match action {
            ConnectionAction::Accept => self.http.put(&url).json(&ConnectionReviewBody {
                action: ReviewDecision::Accept,
            }),
            ConnectionAction::Decline => self.http.put(&url).json(&ConnectionReviewBody {
                action: ReviewDecision::Decline,
            }),
            ConnectionAction::Cancel | ConnectionAction::Remove => self.http.delete(&url),
        };
        let response = request
            .header(header::AUTHORIZATION, format!("Token {token}"))
            .header(CSRF_HEADER, csrf)
            .send()
            .await?;
        let response = check(response).await?;
        outcome_from_response(response).await
    }
}

/// Turns a non-success response into the matching `ClientError`, pulling the
/// server's message out of the body.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let rejection = ApiRejection::from_body(status.as_u16(), &body);
    if status == StatusCode::UNAUTHORIZED {
        Err(ClientError::SessionExpired(rejection))
    } else {
        Err(ClientError::Rejected(rejection))
    }
}

/// Maps a successful mutation response onto the discriminated outcome.
/// No-content replies and acknowledgement bodies without a record are the
/// removal-only case; a record-shaped body must parse completely.
async fn outcome_from_response(response: Response) -> Result<ActionOutcome, ClientError> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(ActionOutcome::NoContent);
    }
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(ActionOutcome::NoContent);
    }
    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|err| ClientError::MalformedResponse(format!("non-JSON success body: {err}")))?;
    if value.get("id").is_some() {
        let record = serde_json::from_value::<ConnectionRecord>(value)
            .map_err(|err| ClientError::MalformedResponse(err.to_string()))?;
        Ok(ActionOutcome::Updated(record))
    } else {
        Ok(ActionOutcome::NoContent)
    }
}

fn csrf_from_response(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .find_map(|value| {
            let raw = value.to_str().ok()?;
            let cookie = raw.split(';').next()?;
            let (name, value) = cookie.split_once('=')?;
            (name.trim() == CSRF_COOKIE && !value.trim().is_empty())
                .then(|| value.trim().to_string())
        })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
