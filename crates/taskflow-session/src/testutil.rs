//! Shared fixtures for unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

use crate::error::{StoreError, TransportError};
use crate::models::{GraphQlError, GraphQlResponse, Role, Token, User};
use crate::pipeline::PendingRequest;
use crate::session::{Session, SessionContext, SessionSnapshot};
use crate::store::KeyValueStore;
use crate::transport::{Transport, TransportResponse};

pub fn make_user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        name: "Test User".to_string(),
        avatar: None,
        role: Role::Member,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

/// Backend whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Io("disk unavailable".to_string()))
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Io("disk unavailable".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Io("disk unavailable".to_string()))
    }
}

/// [`Session`] that counts transitions.
pub struct RecordingSession {
    inner: Session,
    logins: AtomicUsize,
    logouts: AtomicUsize,
}

impl RecordingSession {
    pub fn new(inner: Session) -> Self {
        Self {
            inner,
            logins: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
        }
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionContext for RecordingSession {
    fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot()
    }

    async fn login(&self, user: User, token: Token) {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.inner.login(user, token).await;
    }

    async fn renew(&self, expected: &Token, user: User, token: Token) -> bool {
        let renewed = self.inner.renew(expected, user, token).await;
        if renewed {
            self.logins.fetch_add(1, Ordering::SeqCst);
        }
        renewed
    }

    async fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        self.inner.logout().await;
    }

    async fn update_user(&self, user: User) {
        self.inner.update_user(user).await;
    }

    fn set_loading(&self, loading: bool) {
        self.inner.set_loading(loading);
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: String,
    pub credential: Option<String>,
}

/// In-process stand-in for the TaskFlow GraphQL server.
///
/// Tokens from [`FakeServer::issue_token`] are accepted until refreshed;
/// everything else is rejected with the server's auth failure messages.
pub struct FakeServer {
    valid: Mutex<HashSet<String>>,
    calls: Mutex<Vec<RecordedCall>>,
    next_token: AtomicU64,
    refresh_fails: AtomicBool,
    refresh_paused: AtomicBool,
    refresh_release: Notify,
    reject_all: AtomicBool,
    offline: AtomicBool,
}

impl FakeServer {
    pub const USER_ID: &'static str = "u-1";

    pub fn new() -> Self {
        Self {
            valid: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            refresh_fails: AtomicBool::new(false),
            refresh_paused: AtomicBool::new(false),
            refresh_release: Notify::new(),
            reject_all: AtomicBool::new(false),
            offline: AtomicBool::new(false),
        }
    }

    pub fn issue_token(&self) -> Token {
        let token = format!("tok-{}", self.next_token.fetch_add(1, Ordering::SeqCst));
        self.valid.lock().unwrap().insert(token.clone());
        Token::new(token)
    }

    /// A token the server will reject but still accepts for refresh.
    pub fn issue_expired_token(&self) -> Token {
        Token::new(format!("expired-{}", self.next_token.fetch_add(1, Ordering::SeqCst)))
    }

    pub fn is_valid(&self, token: &Token) -> bool {
        self.valid.lock().unwrap().contains(token.as_str())
    }

    pub fn set_refresh_fails(&self, fails: bool) {
        self.refresh_fails.store(fails, Ordering::SeqCst);
    }

    /// Hold `RefreshToken` answers until [`FakeServer::release_refresh`].
    pub fn pause_refresh(&self) {
        self.refresh_paused.store(true, Ordering::SeqCst);
    }

    pub fn release_refresh(&self) {
        self.refresh_paused.store(false, Ordering::SeqCst);
        self.refresh_release.notify_one();
    }

    /// Reject every domain call, even with a freshly issued token.
    pub fn set_reject_all(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls_for(&self, operation: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn user_json(email: &str, name: &str) -> Value {
        json!({
            "id": Self::USER_ID,
            "email": email,
            "name": name,
            "avatar": null,
            "role": "MEMBER",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        })
    }

    fn default_user() -> Value {
        Self::user_json("kim@example.com", "Kim")
    }

    fn data(field: &str, value: Value) -> TransportResponse {
        TransportResponse::ok(GraphQlResponse {
            data: Some(json!({ field: value })),
            errors: None,
        })
    }

    fn error(field: &str, message: &str) -> TransportResponse {
        let mut error = GraphQlError::new(message);
        error.path = Some(vec![json!(field)]);
        TransportResponse::ok(GraphQlResponse {
            data: Some(json!({ field: null })),
            errors: Some(vec![error]),
        })
    }

    fn task_json(id: &str, title: &str, project_id: &str) -> Value {
        json!({
            "id": id,
            "title": title,
            "description": null,
            "status": "TODO",
            "priority": "MEDIUM",
            "assignee": null,
            "project": { "id": project_id, "name": "Alpha" },
            "dueDate": null,
            "completedAt": null,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        })
    }

    fn authorized(&self, credential: Option<&str>) -> bool {
        credential.is_some_and(|c| self.valid.lock().unwrap().contains(c))
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&self, request: &PendingRequest) -> Result<TransportResponse, TransportError> {
        let credential = request.credential.as_ref().map(|t| t.as_str().to_string());
        self.calls.lock().unwrap().push(RecordedCall {
            operation: request.operation.name.clone(),
            credential: credential.clone(),
        });

        tokio::task::yield_now().await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        if request.operation.name == "RefreshToken" && self.refresh_paused.load(Ordering::SeqCst) {
            self.refresh_release.notified().await;
        }

        let variables = &request.operation.variables;
        let input = &variables["input"];
        let credential = credential.as_deref();

        let response = match request.operation.name.as_str() {
            "Login" => {
                if input["password"] == "wrong" {
                    Self::error("login", "Incorrect email or password")
                } else {
                    let email = input["email"].as_str().unwrap_or_default();
                    let token = self.issue_token();
                    Self::data(
                        "login",
                        json!({ "token": token.as_str(), "user": Self::user_json(email, "Kim") }),
                    )
                }
            }
            "Register" => {
                let email = input["email"].as_str().unwrap_or_default();
                let name = input["name"].as_str().unwrap_or_default();
                let token = self.issue_token();
                Self::data(
                    "register",
                    json!({ "token": token.as_str(), "user": Self::user_json(email, name) }),
                )
            }
            "GetMe" => {
                if self.authorized(credential) {
                    Self::data("me", Self::default_user())
                } else {
                    Self::error("me", "Could not validate credentials")
                }
            }
            "RefreshToken" => match credential {
                _ if self.refresh_fails.load(Ordering::SeqCst) => {
                    Self::error("refreshToken", "Could not validate credentials")
                }
                None => Self::error("refreshToken", "Not authenticated"),
                Some(old) => {
                    self.valid.lock().unwrap().remove(old);
                    let token = self.issue_token();
                    Self::data(
                        "refreshToken",
                        json!({ "token": token.as_str(), "user": Self::default_user() }),
                    )
                }
            },
            name if self.reject_all.load(Ordering::SeqCst) || !self.authorized(credential) => {
                let field = request.operation.root_field.clone().unwrap_or_else(|| name.to_string());
                Self::error(&field, "Not authenticated")
            }
            "UpdateProfile" => {
                let mut user = Self::default_user();
                if let Some(name) = input["name"].as_str() {
                    user["name"] = json!(name);
                }
                Self::data("updateProfile", user)
            }
            "GetProjects" => Self::data(
                "projects",
                json!([{ "id": "p-1", "name": "Alpha", "description": null }]),
            ),
            "CreateProject" => {
                if input["name"] == "dup" {
                    Self::error("createProject", "Project name already exists")
                } else {
                    Self::data(
                        "createProject",
                        json!({ "id": "p-2", "name": input["name"], "description": input["description"] }),
                    )
                }
            }
            "GetProject" => match variables["id"].as_str() {
                Some("p-1") => Self::data("project", json!({ "id": "p-1", "name": "Alpha", "description": null })),
                _ => Self::data("project", Value::Null),
            },
            "UpdateProject" => Self::data(
                "updateProject",
                json!({
                    "id": variables["id"],
                    "name": input["name"].as_str().unwrap_or("Alpha"),
                    "description": input["description"],
                }),
            ),
            "DeleteProject" => match variables["id"].as_str() {
                Some("p-1") => Self::data("deleteProject", json!(true)),
                _ => Self::error("deleteProject", "Project not found"),
            },
            "GetTasks" => match variables["projectId"].as_str() {
                Some("p-1") => Self::data("tasks", json!([Self::task_json("t-1", "Write docs", "p-1")])),
                _ => Self::data("tasks", json!([])),
            },
            "CreateTask" => {
                let project_id = input["projectId"].as_str().unwrap_or_default();
                let title = input["title"].as_str().unwrap_or_default();
                let mut task = Self::task_json("t-2", title, project_id);
                if let Some(priority) = input["priority"].as_str() {
                    task["priority"] = json!(priority);
                }
                Self::data("createTask", task)
            }
            "GetTask" => match variables["id"].as_str() {
                Some("t-1") => Self::data("task", Self::task_json("t-1", "Write docs", "p-1")),
                _ => Self::data("task", Value::Null),
            },
            "UpdateTask" => {
                let id = variables["id"].as_str().unwrap_or_default();
                let mut task = Self::task_json(id, "Write docs", "p-1");
                for field in ["title", "description", "status", "priority", "dueDate"] {
                    if !input[field].is_null() {
                        task[field] = input[field].clone();
                    }
                }
                if input["status"] == "DONE" {
                    task["completedAt"] = json!("2024-01-02T00:00:00Z");
                }
                Self::data("updateTask", task)
            }
            "DeleteTask" => Self::data("deleteTask", json!(true)),
            "AddComment" => {
                let content = variables["content"].as_str().unwrap_or_default();
                if content.trim().is_empty() {
                    Self::error("addComment", "Comment content cannot be empty")
                } else {
                    Self::data(
                        "addComment",
                        json!({
                            "id": "c-1",
                            "content": content,
                            "author": { "id": Self::USER_ID, "name": "Kim", "email": "kim@example.com", "avatar": null },
                            "createdAt": "2024-01-01T00:00:00Z",
                            "updatedAt": "2024-01-01T00:00:00Z",
                        }),
                    )
                }
            }
            other => Self::error(other, "Unknown operation"),
        };

        Ok(response)
    }
}
