//! GraphQL documents consumed from the TaskFlow server.
//!
//! An [`Operation`] is the identity-plus-variables part of every outgoing
//! call; the pipeline wraps it in a [`crate::pipeline::PendingRequest`].

use serde::Serialize;
use serde_json::Value;

use crate::models::{
    CreateProjectInput, CreateTaskInput, GraphQlRequest, LoginInput, RegisterInput, TaskFilter,
    UpdateProfileInput, UpdateProjectInput, UpdateTaskInput,
};

const USER_FIELDS: &str = "id email name avatar role createdAt updatedAt";

pub const LOGIN: &str = "mutation Login($input: LoginInput!) {
  login(input: $input) { token user { id email name avatar role createdAt updatedAt } }
}";

pub const REGISTER: &str = "mutation Register($input: RegisterInput!) {
  register(input: $input) { token user { id email name avatar role createdAt updatedAt } }
}";

pub const ME: &str = "query GetMe {
  me { id email name avatar role createdAt updatedAt }
}";

pub const REFRESH_TOKEN: &str = "mutation RefreshToken {
  refreshToken { token user { id email name avatar role createdAt updatedAt } }
}";

pub const UPDATE_PROFILE: &str = "mutation UpdateProfile($input: UpdateProfileInput!) {
  updateProfile(input: $input) { id email name avatar role createdAt updatedAt }
}";

pub const PROJECTS: &str = "query GetProjects {
  projects { id name description createdAt updatedAt }
}";

pub const CREATE_PROJECT: &str = "mutation CreateProject($input: CreateProjectInput!) {
  createProject(input: $input) { id name description createdAt updatedAt }
}";

pub const PROJECT: &str = "query GetProject($id: String!) {
  project(id: $id) { id name description createdAt updatedAt }
}";

pub const UPDATE_PROJECT: &str = "mutation UpdateProject($id: String!, $input: UpdateProjectInput!) {
  updateProject(id: $id, input: $input) { id name description createdAt updatedAt }
}";

pub const DELETE_PROJECT: &str = "mutation DeleteProject($id: String!) {
  deleteProject(id: $id)
}";

pub const TASKS: &str = "query GetTasks($projectId: String!, $filter: TaskFilter) {
  tasks(projectId: $projectId, filter: $filter) {
    id title description status priority
    assignee { id name email avatar }
    project { id name }
    dueDate completedAt createdAt updatedAt
  }
}";

pub const CREATE_TASK: &str = "mutation CreateTask($input: CreateTaskInput!) {
  createTask(input: $input) {
    id title description status priority
    assignee { id name email avatar }
    project { id name }
    dueDate completedAt createdAt updatedAt
  }
}";

pub const TASK: &str = "query GetTask($id: String!) {
  task(id: $id) {
    id title description status priority
    assignee { id name email avatar }
    project { id name }
    dueDate completedAt createdAt updatedAt
  }
}";

pub const UPDATE_TASK: &str = "mutation UpdateTask($id: String!, $input: UpdateTaskInput!) {
  updateTask(id: $id, input: $input) {
    id title description status priority
    assignee { id name email avatar }
    project { id name }
    dueDate completedAt createdAt updatedAt
  }
}";

pub const DELETE_TASK: &str = "mutation DeleteTask($id: String!) {
  deleteTask(id: $id)
}";

pub const ADD_COMMENT: &str = "mutation AddComment($taskId: String!, $content: String!) {
  addComment(taskId: $taskId, content: $content) {
    id content
    author { id name email avatar }
    createdAt updatedAt
  }
}";

/// A named GraphQL operation with its variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    pub document: String,
    pub variables: Value,
    /// Top-level field of `data` holding the result.
    pub root_field: Option<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            document: document.into(),
            variables: Value::Object(Default::default()),
            root_field: None,
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    /// Select a single top-level field of `data` as the operation result.
    pub fn with_root_field(mut self, field: impl Into<String>) -> Self {
        self.root_field = Some(field.into());
        self
    }

    pub fn to_request(&self) -> GraphQlRequest {
        GraphQlRequest {
            query: self.document.clone(),
            variables: self.variables.clone(),
            operation_name: Some(self.name.clone()),
        }
    }

    pub fn login(input: &LoginInput) -> Self {
        Self::new("Login", LOGIN)
            .with_variables(input_variables(input))
            .with_root_field("login")
    }

    pub fn register(input: &RegisterInput) -> Self {
        Self::new("Register", REGISTER)
            .with_variables(input_variables(input))
            .with_root_field("register")
    }

    pub fn me() -> Self {
        Self::new("GetMe", ME).with_root_field("me")
    }

    pub fn refresh_token() -> Self {
        Self::new("RefreshToken", REFRESH_TOKEN).with_root_field("refreshToken")
    }

    pub fn update_profile(input: &UpdateProfileInput) -> Self {
        Self::new("UpdateProfile", UPDATE_PROFILE)
            .with_variables(input_variables(input))
            .with_root_field("updateProfile")
    }

    pub fn projects() -> Self {
        Self::new("GetProjects", PROJECTS).with_root_field("projects")
    }

    pub fn create_project(input: &CreateProjectInput) -> Self {
        Self::new("CreateProject", CREATE_PROJECT)
            .with_variables(input_variables(input))
            .with_root_field("createProject")
    }

    pub fn project(id: &str) -> Self {
        Self::new("GetProject", PROJECT)
            .with_variables(serde_json::json!({ "id": id }))
            .with_root_field("project")
    }

    pub fn update_project(id: &str, input: &UpdateProjectInput) -> Self {
        Self::new("UpdateProject", UPDATE_PROJECT)
            .with_variables(id_and_input(id, input))
            .with_root_field("updateProject")
    }

    pub fn delete_project(id: &str) -> Self {
        Self::new("DeleteProject", DELETE_PROJECT)
            .with_variables(serde_json::json!({ "id": id }))
            .with_root_field("deleteProject")
    }

    pub fn tasks(project_id: &str, filter: Option<&TaskFilter>) -> Self {
        let mut variables = serde_json::json!({ "projectId": project_id });
        if let Some(filter) = filter {
            variables["filter"] = serde_json::to_value(filter).unwrap_or(Value::Null);
        }
        Self::new("GetTasks", TASKS)
            .with_variables(variables)
            .with_root_field("tasks")
    }

    pub fn create_task(input: &CreateTaskInput) -> Self {
        Self::new("CreateTask", CREATE_TASK)
            .with_variables(input_variables(input))
            .with_root_field("createTask")
    }

    pub fn task(id: &str) -> Self {
        Self::new("GetTask", TASK)
            .with_variables(serde_json::json!({ "id": id }))
            .with_root_field("task")
    }

    pub fn update_task(id: &str, input: &UpdateTaskInput) -> Self {
        Self::new("UpdateTask", UPDATE_TASK)
            .with_variables(id_and_input(id, input))
            .with_root_field("updateTask")
    }

    pub fn delete_task(id: &str) -> Self {
        Self::new("DeleteTask", DELETE_TASK)
            .with_variables(serde_json::json!({ "id": id }))
            .with_root_field("deleteTask")
    }

    pub fn add_comment(task_id: &str, content: &str) -> Self {
        Self::new("AddComment", ADD_COMMENT)
            .with_variables(serde_json::json!({ "taskId": task_id, "content": content }))
            .with_root_field("addComment")
    }
}

fn id_and_input<T: Serialize>(id: &str, input: &T) -> Value {
    let mut variables = input_variables(input);
    variables["id"] = Value::String(id.to_string());
    variables
}

fn input_variables<T: Serialize>(input: &T) -> Value {
    serde_json::json!({ "input": serde_json::to_value(input).unwrap_or(Value::Null) })
}

/// Field selection used for every user object, kept in one place so the
/// documents above stay in sync with [`crate::models::User`].
pub fn user_fields() -> &'static str {
    USER_FIELDS
}
