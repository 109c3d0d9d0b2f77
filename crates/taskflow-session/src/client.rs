//! Client façade wiring the session components together.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::api::AuthApi;
use crate::bootstrap::{BootstrapState, BootstrapValidator};
use crate::classify::AuthFailureClassifier;
use crate::config::ClientConfig;
use crate::error::{SessionError, SessionResult};
use crate::models::{
    Comment, CreateProjectInput, CreateTaskInput, LoginInput, Project, RegisterInput, Task,
    TaskFilter, Token, UpdateProfileInput, UpdateProjectInput, UpdateTaskInput, User,
};
use crate::operations::Operation;
use crate::pipeline::RequestPipeline;
use crate::refresh::RefreshCoordinator;
use crate::session::{Session, SessionContext};
use crate::store::{FileStore, KeyValueStore, TokenStore};
use crate::transport::{HttpTransport, Transport};

/// Authenticated client for the TaskFlow API.
///
/// Owns one [`Session`] and one [`TokenStore`]; every component below shares
/// them, so the client is the only place the session is created.
pub struct TaskflowClient {
    config: ClientConfig,
    tokens: TokenStore,
    session: Session,
    api: AuthApi,
    refresher: RefreshCoordinator,
    pipeline: RequestPipeline,
    bootstrap: BootstrapValidator,
}

impl TaskflowClient {
    /// Client over HTTP with file-backed storage under `storage.data_dir`.
    pub fn new(config: ClientConfig) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.api));
        let backend: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.storage.data_dir.clone()));
        Self::with_parts(config, transport, backend)
    }

    /// Client over caller-supplied transport and storage.
    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        backend: Arc<dyn KeyValueStore>,
    ) -> Self {
        let tokens = TokenStore::new(backend, &config.storage);
        let session = Session::new(tokens.clone());
        let context: Arc<dyn SessionContext> = Arc::new(session.clone());
        let classifier = AuthFailureClassifier::from_config(&config.auth);
        let api = AuthApi::new(transport.clone(), classifier.clone());

        let refresher = RefreshCoordinator::new(tokens.clone(), context.clone(), api.clone());
        let pipeline_refresher = config.auth.refresh_on_failure.then(|| refresher.clone());
        let pipeline = RequestPipeline::new(tokens.clone(), transport, classifier, pipeline_refresher);
        let bootstrap = BootstrapValidator::new(tokens.clone(), context, api.clone());

        Self {
            config,
            tokens,
            session,
            api,
            refresher,
            pipeline,
            bootstrap,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Validate any persisted token. Must complete before protected calls
    /// are exposed to a user.
    pub async fn bootstrap(&self) -> BootstrapState {
        self.bootstrap.run().await
    }

    pub fn bootstrap_state(&self) -> BootstrapState {
        self.bootstrap.state()
    }

    pub fn bootstrap_validator(&self) -> &BootstrapValidator {
        &self.bootstrap
    }

    pub async fn login(&self, email: &str, password: &str) -> SessionResult<User> {
        let input = LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.session.set_loading(true);
        let result = self.api.login(&input).await;
        self.session.set_loading(false);

        let payload = result?;
        self.session.login(payload.user.clone(), payload.token).await;
        Ok(payload.user)
    }

    pub async fn register(&self, email: &str, password: &str, name: &str) -> SessionResult<User> {
        let input = RegisterInput {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        };
        self.session.set_loading(true);
        let result = self.api.register(&input).await;
        self.session.set_loading(false);

        let payload = result?;
        self.session.login(payload.user.clone(), payload.token).await;
        Ok(payload.user)
    }

    pub async fn logout(&self) {
        self.session.logout().await;
    }

    /// Force a token refresh. A failure ends the session.
    pub async fn refresh(&self) -> SessionResult<Token> {
        Ok(self.refresher.refresh().await?)
    }

    pub async fn update_profile(&self, input: &UpdateProfileInput) -> SessionResult<User> {
        if !self.session.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        let user: User = self.execute_as(Operation::update_profile(input)).await?;
        self.session.update_user(user.clone()).await;
        Ok(user)
    }

    pub async fn execute(&self, operation: Operation) -> SessionResult<Value> {
        self.pipeline.execute(operation).await
    }

    pub async fn execute_as<T: DeserializeOwned>(&self, operation: Operation) -> SessionResult<T> {
        self.pipeline.execute_as(operation).await
    }

    pub async fn projects(&self) -> SessionResult<Vec<Project>> {
        self.execute_as(Operation::projects()).await
    }

    pub async fn create_project(&self, input: &CreateProjectInput) -> SessionResult<Project> {
        self.execute_as(Operation::create_project(input)).await
    }

    /// `None` when the project does not exist.
    pub async fn project(&self, id: &str) -> SessionResult<Option<Project>> {
        self.execute_as(Operation::project(id)).await
    }

    pub async fn update_project(&self, id: &str, input: &UpdateProjectInput) -> SessionResult<Project> {
        self.execute_as(Operation::update_project(id, input)).await
    }

    pub async fn delete_project(&self, id: &str) -> SessionResult<bool> {
        self.execute_as(Operation::delete_project(id)).await
    }

    pub async fn tasks(&self, project_id: &str, filter: Option<&TaskFilter>) -> SessionResult<Vec<Task>> {
        self.execute_as(Operation::tasks(project_id, filter)).await
    }

    pub async fn create_task(&self, input: &CreateTaskInput) -> SessionResult<Task> {
        self.execute_as(Operation::create_task(input)).await
    }

    /// `None` when the task does not exist.
    pub async fn task(&self, id: &str) -> SessionResult<Option<Task>> {
        self.execute_as(Operation::task(id)).await
    }

    pub async fn update_task(&self, id: &str, input: &UpdateTaskInput) -> SessionResult<Task> {
        self.execute_as(Operation::update_task(id, input)).await
    }

    pub async fn delete_task(&self, id: &str) -> SessionResult<bool> {
        self.execute_as(Operation::delete_task(id)).await
    }

    pub async fn add_comment(&self, task_id: &str, content: &str) -> SessionResult<Comment> {
        self.execute_as(Operation::add_comment(task_id, content)).await
    }
}
