//! Argument parsing and command dispatch for the `dagstore` binary.

use std::{path::PathBuf, sync::Arc};

use serde_json::{Value, json};

use crate::{
    config::{BackendKind, SqliteConfig},
    errors::{ErrorKind, GraphError},
    integrity::run_integrity_checks,
    model::{EdgeSpec, GraphCreate, GraphId},
    names::validate_node_name,
    service::GraphService,
    store::{GraphStore, MemoryGraphStore, SqliteGraphStore},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLineConfig {
    pub backend: String,
    pub database: String,
    pub command: String,
    pub command_args: Vec<String>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut backend = String::from("sqlite");
        let mut database = String::from("memory");
        let mut command = String::from("status");
        let mut command_args = Vec::new();
        let mut command_set = false;
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            if command_set {
                command_args.push(arg.to_string());
                continue;
            }
            match *arg {
                "--backend" => {
                    backend = iter
                        .next()
                        .ok_or_else(|| "--backend requires a value".to_string())?
                        .to_string();
                }
                "--db" | "--database" => {
                    database = iter
                        .next()
                        .ok_or_else(|| "--db requires a value".to_string())?
                        .to_string();
                }
                "--command" => {
                    command = iter
                        .next()
                        .ok_or_else(|| "--command requires a value".to_string())?
                        .to_string();
                    command_set = true;
                }
                other if other.starts_with('-') => {
                    return Err(format!("unknown flag {other}"));
                }
                _ => {
                    command = arg.to_string();
                    command_set = true;
                }
            }
        }
        Ok(Self {
            backend,
            database,
            command,
            command_args,
        })
    }

    /// Database file, or `None` for a private in-memory database.
    pub fn database_path(&self) -> Option<PathBuf> {
        (self.database != "memory").then(|| PathBuf::from(&self.database))
    }

    pub fn help() -> &'static str {
        "Usage: dagstore [--backend sqlite|memory] [--db memory|PATH] COMMAND [ARGS]\n\
         \n\
         Commands:\n  \
           status\n  \
           create --nodes a,b,c [--edges a:b,b:c]\n  \
           read GRAPH_ID\n  \
           adjacency GRAPH_ID [--reverse]\n  \
           delete-node GRAPH_ID NODE\n  \
           check\n"
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Status,
    Check,
    Create(GraphCreate),
    Read(GraphId),
    Adjacency { graph_id: GraphId, reversed: bool },
    DeleteNode { graph_id: GraphId, node: String },
}

impl Command {
    pub fn parse(command: &str, args: &[String]) -> Result<Self, String> {
        match command {
            "status" => no_args(command, args).map(|_| Command::Status),
            "check" => no_args(command, args).map(|_| Command::Check),
            "create" => parse_create(args).map(Command::Create),
            "read" => match args {
                [id] => Ok(Command::Read(parse_graph_id(id)?)),
                _ => Err("read expects GRAPH_ID".to_string()),
            },
            "adjacency" => match args {
                [id] => Ok(Command::Adjacency {
                    graph_id: parse_graph_id(id)?,
                    reversed: false,
                }),
                [id, flag] if flag == "--reverse" => Ok(Command::Adjacency {
                    graph_id: parse_graph_id(id)?,
                    reversed: true,
                }),
                _ => Err("adjacency expects GRAPH_ID [--reverse]".to_string()),
            },
            "delete-node" => match args {
                [id, node] => Ok(Command::DeleteNode {
                    graph_id: parse_graph_id(id)?,
                    node: node.clone(),
                }),
                _ => Err("delete-node expects GRAPH_ID NODE".to_string()),
            },
            other => Err(format!("unknown command {other}")),
        }
    }
}

fn no_args(command: &str, args: &[String]) -> Result<(), String> {
    match args.first() {
        None => Ok(()),
        Some(extra) => Err(format!("{command} takes no arguments, got {extra}")),
    }
}

fn parse_graph_id(value: &str) -> Result<GraphId, String> {
    value
        .parse::<i64>()
        .map(GraphId)
        .map_err(|_| format!("invalid graph id {value}"))
}

fn parse_create(args: &[String]) -> Result<GraphCreate, String> {
    let mut request = GraphCreate::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--nodes" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--nodes requires a value".to_string())?;
                request.nodes = split_list(value).map(str::to_string).collect();
            }
            "--edges" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--edges requires a value".to_string())?;
                request.edges = split_list(value)
                    .map(|pair| {
                        pair.split_once(':')
                            .map(|(source, target)| EdgeSpec::new(source, target))
                            .ok_or_else(|| format!("edge {pair} is not SOURCE:TARGET"))
                    })
                    .collect::<Result<_, _>>()?;
            }
            other => return Err(format!("unknown create argument {other}")),
        }
    }
    Ok(request)
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').filter(move |_| !value.is_empty())
}

/// A command that could not be carried out.
#[derive(Debug)]
pub enum CliFailure {
    Usage(String),
    Graph(GraphError),
}

impl CliFailure {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliFailure::Usage(_) => 2,
            CliFailure::Graph(err) => match err.kind() {
                ErrorKind::Input | ErrorKind::NotFound => 1,
                ErrorKind::Internal => 2,
            },
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CliFailure::Usage(msg) => json!({
                "error": msg,
                "kind": "usage",
                "loc": Vec::<String>::new(),
            }),
            CliFailure::Graph(err) => json!({
                "error": err.to_string(),
                "kind": err.kind(),
                "loc": err.field_path(),
            }),
        }
    }
}

impl From<GraphError> for CliFailure {
    fn from(err: GraphError) -> Self {
        CliFailure::Graph(err)
    }
}

/// Open the configured store and run one command against it.
pub fn execute(config: &CommandLineConfig) -> Result<Value, CliFailure> {
    let command = Command::parse(&config.command, &config.command_args).map_err(CliFailure::Usage)?;
    let backend = BackendKind::parse(&config.backend)
        .ok_or_else(|| CliFailure::Usage(format!("unsupported backend {}", config.backend)))?;
    match backend {
        BackendKind::Sqlite => {
            let path = config.database_path();
            let store = Arc::new(
                SqliteGraphStore::with_config(path.as_deref(), &SqliteConfig::default(), false)
                    .map_err(|err| CliFailure::Graph(err.into()))?,
            );
            if command == Command::Check {
                let report =
                    run_integrity_checks(&store).map_err(|err| CliFailure::Graph(err.into()))?;
                return Ok(json!(report));
            }
            run_command(&GraphService::new(store), command)
        }
        BackendKind::Memory => {
            if command == Command::Check {
                return Err(CliFailure::Usage(
                    "check requires the sqlite backend".to_string(),
                ));
            }
            run_command(&GraphService::new(Arc::new(MemoryGraphStore::new())), command)
        }
    }
}

/// Run a parsed command through `service`. [`Command::Check`] is handled by [`execute`].
pub fn run_command<S: GraphStore + ?Sized>(
    service: &GraphService<S>,
    command: Command,
) -> Result<Value, CliFailure> {
    match command {
        Command::Status => {
            let store = service.store();
            let graphs = store.graph_count().map_err(GraphError::from)?;
            Ok(json!({
                "backend": store.backend_kind().as_str(),
                "graphs": graphs,
            }))
        }
        Command::Create(request) => {
            request.validate_names()?;
            let id = service.create_graph(&request)?;
            Ok(json!({ "id": id }))
        }
        Command::Read(graph_id) => {
            let snapshot = service.read_graph(graph_id)?;
            Ok(json!(*snapshot))
        }
        Command::Adjacency { graph_id, reversed } => {
            let list = service.read_adjacency(graph_id, reversed)?;
            Ok(json!(list))
        }
        Command::DeleteNode { graph_id, node } => {
            validate_node_name(&node, &["path", "node_name"])?;
            service.delete_node(graph_id, &node)?;
            Ok(json!({ "graph_id": graph_id, "deleted": node }))
        }
        Command::Check => Err(CliFailure::Usage(
            "check is only available through execute".to_string(),
        )),
    }
}
