use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskflow_session::models::{
    CreateProjectInput, CreateTaskInput, TaskFilter, TaskPriority, TaskStatus, UpdateProfileInput,
    UpdateProjectInput, UpdateTaskInput,
};
use taskflow_session::operations::Operation;
use taskflow_session::{BootstrapState, ClientConfig, SessionContext, SessionError, TaskflowClient};

#[derive(Parser)]
#[command(name = "taskflowctl")]
#[command(version, about = "TaskFlow Command Line Client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GraphQL endpoint (overrides TASKFLOW_API_URL and the config file)
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Directory holding the persisted session
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and persist the session
    Login {
        #[arg(short, long)]
        email: String,

        /// Password (default: TASKFLOW_PASSWORD)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account and log in
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        name: String,

        /// Password (default: TASKFLOW_PASSWORD)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Clear the persisted session
    Logout,
    /// Show the logged-in user, validated against the server
    Whoami,
    /// Show bootstrap and session state
    Status,
    /// Force a token refresh
    Refresh,
    /// Profile management
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Project management
    Projects {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    /// Task management
    Tasks {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Run an arbitrary GraphQL document through the authenticated pipeline
    Query {
        /// Document text, or @path to read it from a file
        document: String,

        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,

        /// Operation name sent with the request
        #[arg(long, default_value = "Query")]
        operation_name: String,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Update profile fields
    Update {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        avatar: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// List projects
    List,
    /// Create a project
    Create {
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },
    /// Show a project
    Get { id: String },
    /// Update project fields
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a project
    Delete { id: String },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// List tasks of a project
    List {
        project_id: String,

        /// TODO, IN_PROGRESS, REVIEW or DONE
        #[arg(long)]
        status: Option<String>,

        /// LOW, MEDIUM, HIGH or URGENT
        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        search: Option<String>,
    },
    /// Create a task
    Create {
        project_id: String,

        title: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        due_date: Option<String>,
    },
    /// Show a task
    Get { id: String },
    /// Update task fields
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        #[arg(long)]
        due_date: Option<String>,
    },
    /// Delete a task
    Delete { id: String },
    /// Comment on a task
    Comment { task_id: String, content: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = ClientConfig::load()?;
    apply_cli_overrides(&mut config, cli.server_url, cli.data_dir)?;
    tracing::debug!(endpoint = %config.api.endpoint, data_dir = %config.storage.data_dir.display(), "Configuration loaded");

    let client = TaskflowClient::new(config);
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Login { email, password } => {
            let password = resolve_password(password)?;
            let user = client.login(&email, &password).await.map_err(friendly)?;
            out.print(&user, || format!("Logged in as {} <{}>", user.name, user.email))?;
        }
        Commands::Register { email, name, password } => {
            let password = resolve_password(password)?;
            let user = client.register(&email, &password, &name).await.map_err(friendly)?;
            out.print(&user, || format!("Registered and logged in as {} <{}>", user.name, user.email))?;
        }
        Commands::Logout => {
            client.logout().await;
            out.print(&serde_json::json!({ "loggedOut": true }), || "Logged out".to_string())?;
        }
        Commands::Whoami => {
            require_session(&client).await?;
            let user = client.session().user().context("Session has no user")?;
            out.print(&user, || format!("{} <{}> ({:?})", user.name, user.email, user.role))?;
        }
        Commands::Status => {
            let state = client.bootstrap().await;
            let snapshot = client.session().snapshot();
            let status = serde_json::json!({
                "bootstrap": state.to_string(),
                "authenticated": snapshot.is_authenticated,
                "user": snapshot.user.as_ref().map(|u| &u.email),
                "token": snapshot.token.as_ref().map(|t| format!("{}…", t.preview())),
                "validatedAt": snapshot.validated_at,
            });
            out.print(&status, || match &snapshot.user {
                Some(user) if snapshot.is_authenticated => {
                    format!("Logged in as {} <{}> (bootstrap: {})", user.name, user.email, state)
                }
                _ => format!("Not logged in (bootstrap: {})", state),
            })?;
        }
        Commands::Refresh => {
            require_session(&client).await?;
            let token = client.refresh().await.map_err(friendly)?;
            out.print(&serde_json::json!({ "token": token.preview() }), || {
                format!("Token refreshed ({}…)", token.preview())
            })?;
        }
        Commands::Profile {
            command: ProfileCommand::Update { name, email, avatar },
        } => {
            let input = UpdateProfileInput { name, email, avatar };
            if input.is_empty() {
                bail!("Nothing to update: pass --name, --email or --avatar");
            }
            require_session(&client).await?;
            let user = client.update_profile(&input).await.map_err(friendly)?;
            out.print(&user, || format!("Profile updated: {} <{}>", user.name, user.email))?;
        }
        Commands::Projects { command } => {
            require_session(&client).await?;
            match command {
                ProjectCommand::List => {
                    let projects = client.projects().await.map_err(friendly)?;
                    out.print(&projects, || {
                        projects
                            .iter()
                            .map(|p| format!("{}\t{}", p.id, p.name))
                            .collect::<Vec<_>>()
                            .join("\n")
                    })?;
                }
                ProjectCommand::Create { name, description } => {
                    let project = client
                        .create_project(&CreateProjectInput { name, description })
                        .await
                        .map_err(friendly)?;
                    out.print(&project, || format!("Created project {} ({})", project.name, project.id))?;
                }
                ProjectCommand::Get { id } => {
                    let project = client
                        .project(&id)
                        .await
                        .map_err(friendly)?
                        .with_context(|| format!("Project {} not found", id))?;
                    out.print(&project, || {
                        format!("{}\t{}\t{}", project.id, project.name, project.description.as_deref().unwrap_or(""))
                    })?;
                }
                ProjectCommand::Update { id, name, description } => {
                    let input = UpdateProjectInput { name, description };
                    if input.is_empty() {
                        bail!("Nothing to update: pass --name or --description");
                    }
                    let project = client.update_project(&id, &input).await.map_err(friendly)?;
                    out.print(&project, || format!("Updated project {} ({})", project.name, project.id))?;
                }
                ProjectCommand::Delete { id } => {
                    let deleted = client.delete_project(&id).await.map_err(friendly)?;
                    out.print(&serde_json::json!({ "deleted": deleted }), || {
                        format!("Deleted project {}", id)
                    })?;
                }
            }
        }
        Commands::Tasks { command } => {
            require_session(&client).await?;
            match command {
                TaskCommand::List {
                    project_id,
                    status,
                    priority,
                    search,
                } => {
                    let filter = TaskFilter {
                        status: status.as_deref().map(parse_enum::<TaskStatus>).transpose()?,
                        priority: priority.as_deref().map(parse_enum::<TaskPriority>).transpose()?,
                        assignee_id: None,
                        search,
                    };
                    let tasks = client.tasks(&project_id, Some(&filter)).await.map_err(friendly)?;
                    out.print(&tasks, || {
                        tasks
                            .iter()
                            .map(|t| format!("{}\t{:?}\t{:?}\t{}", t.id, t.status, t.priority, t.title))
                            .collect::<Vec<_>>()
                            .join("\n")
                    })?;
                }
                TaskCommand::Create {
                    project_id,
                    title,
                    description,
                    priority,
                    due_date,
                } => {
                    let input = CreateTaskInput {
                        title,
                        description,
                        project_id,
                        assignee_id: None,
                        priority: priority.as_deref().map(parse_enum::<TaskPriority>).transpose()?,
                        due_date,
                    };
                    let task = client.create_task(&input).await.map_err(friendly)?;
                    out.print(&task, || format!("Created task {} ({})", task.title, task.id))?;
                }
                TaskCommand::Get { id } => {
                    let task = client
                        .task(&id)
                        .await
                        .map_err(friendly)?
                        .with_context(|| format!("Task {} not found", id))?;
                    out.print(&task, || {
                        format!("{}\t{:?}\t{:?}\t{}\t{}", task.id, task.status, task.priority, task.project.name, task.title)
                    })?;
                }
                TaskCommand::Update {
                    id,
                    title,
                    description,
                    status,
                    priority,
                    assignee,
                    due_date,
                } => {
                    let input = UpdateTaskInput {
                        title,
                        description,
                        status: status.as_deref().map(parse_enum::<TaskStatus>).transpose()?,
                        priority: priority.as_deref().map(parse_enum::<TaskPriority>).transpose()?,
                        assignee_id: assignee,
                        due_date,
                    };
                    if input.is_empty() {
                        bail!("Nothing to update: pass at least one field");
                    }
                    let task = client.update_task(&id, &input).await.map_err(friendly)?;
                    out.print(&task, || format!("Updated task {} ({:?})", task.title, task.status))?;
                }
                TaskCommand::Delete { id } => {
                    let deleted = client.delete_task(&id).await.map_err(friendly)?;
                    out.print(&serde_json::json!({ "deleted": deleted }), || format!("Deleted task {}", id))?;
                }
                TaskCommand::Comment { task_id, content } => {
                    let comment = client.add_comment(&task_id, &content).await.map_err(friendly)?;
                    out.print(&comment, || format!("Comment {} added by {}", comment.id, comment.author.name))?;
                }
            }
        }
        Commands::Query {
            document,
            variables,
            operation_name,
        } => {
            let document = match document.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read document from {}", path))?,
                None => document,
            };
            let variables = match variables {
                Some(raw) => serde_json::from_str(&raw).context("Variables must be a JSON object")?,
                None => serde_json::json!({}),
            };
            require_session(&client).await?;
            let data = client
                .execute(Operation::new(operation_name, document).with_variables(variables))
                .await
                .map_err(friendly)?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
    }

    Ok(())
}

/// Apply `--server-url` and `--data-dir`, then validate the result again.
fn apply_cli_overrides(config: &mut ClientConfig, server_url: Option<String>, data_dir: Option<PathBuf>) -> Result<()> {
    if let Some(url) = server_url {
        config.api.endpoint = url;
    }
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    config.validate()
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn,taskflow_session=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Validate the persisted session before a protected command runs.
async fn require_session(client: &TaskflowClient) -> Result<()> {
    match client.bootstrap().await {
        BootstrapState::Valid => Ok(()),
        state => {
            tracing::debug!(%state, "No valid session");
            bail!("Not logged in. Run `taskflowctl login` first.")
        }
    }
}

fn resolve_password(password: Option<String>) -> Result<String> {
    match password {
        Some(p) => Ok(p),
        None => std::env::var("TASKFLOW_PASSWORD").context("Pass --password or set TASKFLOW_PASSWORD"),
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    let value = serde_json::Value::String(raw.to_uppercase().replace('-', "_"));
    serde_json::from_value(value).with_context(|| format!("Unknown value '{}'", raw))
}

/// Turn session errors into user-facing messages.
fn friendly(err: SessionError) -> anyhow::Error {
    match &err {
        SessionError::Application(_) => anyhow::anyhow!(err.application_messages().join("\n")),
        _ if err.requires_login() => {
            anyhow::anyhow!("{}\nRun `taskflowctl login` to start a new session.", err)
        }
        SessionError::Authentication(reason) => {
            anyhow::anyhow!("The server rejected this request after a token refresh: {}", reason)
        }
        _ => anyhow::Error::new(err),
    }
}

struct Output {
    json: bool,
}

impl Output {
    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}
