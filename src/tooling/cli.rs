//! CLI Tooling
//!
//! Command-line interface for family graph and sync queue operations. Every
//! command loads the family from the workspace database and applies the change;
//! the service saves the graph before it records sync rows. Nothing is sent to
//! the remote until `sync flush`.

use crate::config::{ConfigLoader, VayaConfig};
use crate::error::{ApiError, StorageError, SyncError};
use crate::family::FamilyService;
use crate::graph::persistence::{GraphRepository, SledGraphRepository};
use crate::graph::{
    is_reserved_attribute, Person, PersonData, PersonPatch, Relationship, RelationshipKind,
    TraversalOptions,
};
use crate::sync::queue::SyncConfig;
use crate::sync::remote::{RemoteStore, RestRemoteStore, UnconfiguredRemote};
use crate::sync::storage::SledLocalStorage;
use crate::sync::{DrainOutcome, SyncQueue, SyncRecord};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_FAMILY: &str = "default";

/// Vaya CLI - family relationship graph with a durable sync queue
#[derive(Parser)]
#[command(name = "vaya")]
#[command(about = "Family relationship graph with durable local sync")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Family graph to operate on
    #[arg(long, default_value = DEFAULT_FAMILY)]
    pub family: String,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage people
    Person {
        #[command(subcommand)]
        command: PersonCommands,
    },
    /// Add a relationship (for parent-child the source is the parent)
    Relate {
        source: String,
        target: String,
        /// parent-child, spouse, sibling, partner or guardian
        #[arg(long, default_value = "parent-child")]
        kind: RelationshipKind,
        /// Metadata entry as key=value (repeatable); values parse as JSON when they can
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, Value)>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Merge metadata into a relationship (a null value removes the key)
    Annotate {
        id: String,
        #[arg(long = "meta", value_parser = parse_key_value, required = true)]
        metadata: Vec<(String, Value)>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Remove a relationship
    Unrelate { id: String },
    /// List relationships
    Relationships {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Ancestors of a person, closest generation first
    Ancestors {
        person: String,
        #[command(flatten)]
        traversal: TraversalArgs,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Descendants of a person, closest generation first
    Descendants {
        person: String,
        #[command(flatten)]
        traversal: TraversalArgs,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Ancestors shared by two people
    Common {
        first: String,
        second: String,
        #[command(flatten)]
        traversal: TraversalArgs,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Report relationships whose endpoints are missing
    Validate {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List stored families
    Families {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Sync queue commands
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
pub enum PersonCommands {
    /// Add a person
    Add {
        /// Full name
        name: String,
        #[command(flatten)]
        fields: PersonFields,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Update a person's attributes
    Update {
        id: String,
        /// New full name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: PersonFields,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Remove a person and their relationships
    Remove {
        id: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show one person
    Show {
        id: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List people
    List {
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show queue counters and queued records
    Status {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Deliver queued records to the remote store now
    Flush {
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// Optional person attributes shared by `person add` and `person update`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PersonFields {
    /// Birth date (YYYY-MM-DD)
    #[arg(long)]
    pub birth_date: Option<NaiveDate>,
    #[arg(long)]
    pub avatar_url: Option<String>,
    #[arg(long)]
    pub details: Option<String>,
    /// Free-form tag such as "grandmother"
    #[arg(long)]
    pub role: Option<String>,
    /// Extra attribute as key=value (repeatable)
    #[arg(long = "attr", value_parser = parse_attribute)]
    pub attributes: Vec<(String, Value)>,
}

#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct TraversalArgs {
    /// Maximum generations to walk
    #[arg(long)]
    pub depth: Option<usize>,
    /// Include the starting person
    #[arg(long)]
    pub include_self: bool,
}

impl From<TraversalArgs> for TraversalOptions {
    fn from(args: TraversalArgs) -> Self {
        TraversalOptions {
            max_depth: args.depth,
            include_self: args.include_self,
        }
    }
}

/// Parse `key=value`; the value is JSON if it parses, otherwise a string.
fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Parse `--attr key=value`. Keys with a dedicated flag are refused.
fn parse_attribute(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = parse_key_value(raw)?;
    if is_reserved_attribute(&key) {
        return Err(format!(
            "'{}' has its own flag; use --{} instead of --attr",
            key,
            if key == "full_name" { "name".to_string() } else { key.replace('_', "-") }
        ));
    }
    Ok((key, value))
}

/// CLI context for one workspace database
pub struct CliContext {
    workspace_root: PathBuf,
    config: VayaConfig,
    data_path: PathBuf,
    family_id: String,
    repository: Arc<SledGraphRepository>,
    queue: Arc<SyncQueue>,
}

impl CliContext {
    /// Load config, open the workspace database and restore the sync queue.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };

        let data_path = config.storage.resolve_path(&workspace_root)?;
        std::fs::create_dir_all(&data_path).map_err(StorageError::from)?;
        let db = sled::open(&data_path).map_err(StorageError::from)?;

        let repository = Arc::new(SledGraphRepository::from_db(&db)?);
        let storage = Arc::new(SledLocalStorage::from_db(&db)?);

        let remote: Arc<dyn RemoteStore> = match &config.remote.url {
            Some(_) => Arc::new(RestRemoteStore::from_config(
                &config.remote,
                config.sync.request_timeout(),
            )?),
            None => Arc::new(UnconfiguredRemote),
        };
        // One-shot commands never drain in the background; `sync flush` drains explicitly
        let sync_config = SyncConfig {
            drain_on_enqueue: false,
            ..config.sync.clone()
        };
        let queue = Arc::new(SyncQueue::open(storage, remote, sync_config)?);

        Ok(Self {
            workspace_root,
            config,
            data_path,
            family_id: DEFAULT_FAMILY.to_string(),
            repository,
            queue,
        })
    }

    /// Operate on `family_id` instead of the default family.
    pub fn with_family(mut self, family_id: impl Into<String>) -> Self {
        self.family_id = family_id.into();
        self
    }

    pub fn config(&self) -> &VayaConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    fn service(&self) -> Result<FamilyService, ApiError> {
        FamilyService::load_or_create(
            self.repository.clone(),
            &self.family_id,
            Arc::clone(&self.queue),
            &self.config.remote,
            &self.config.graph,
        )
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Person { command } => self.execute_person(command),
            Commands::Relate {
                source,
                target,
                kind,
                metadata,
                format,
            } => {
                let service = self.service()?;
                let metadata = (!metadata.is_empty()).then(|| to_map(metadata));
                let relationship = service.add_relationship(source, target, *kind, metadata)?;
                info!(relationship_id = %relationship.id, kind = %kind, "Added relationship");
                match format.as_str() {
                    "json" => to_json(&relationship),
                    _ => Ok(format!(
                        "{} {} {} -> {} ({})",
                        "Added".green(),
                        relationship.kind,
                        relationship.source,
                        relationship.target,
                        relationship.id
                    )),
                }
            }
            Commands::Annotate {
                id,
                metadata,
                format,
            } => {
                let service = self.service()?;
                let relationship = service.update_relationship(id, &to_map(metadata))?;
                match format.as_str() {
                    "json" => to_json(&relationship),
                    _ => Ok(format!("{} relationship {}", "Updated".green(), relationship.id)),
                }
            }
            Commands::Unrelate { id } => {
                let service = self.service()?;
                let relationship = service.delete_relationship(id)?;
                Ok(format!(
                    "{} {} {} -> {}",
                    "Removed".yellow(),
                    relationship.kind,
                    relationship.source,
                    relationship.target
                ))
            }
            Commands::Relationships { format } => {
                let service = self.service()?;
                let relationships = service.relationships();
                match format.as_str() {
                    "json" => to_json(&json!({
                        "family_id": service.family_id(),
                        "relationships": relationships,
                        "total": relationships.len(),
                    })),
                    _ => Ok(format_relationships_text(&service.people(), &relationships)),
                }
            }
            Commands::Ancestors {
                person,
                traversal,
                format,
            } => {
                let service = self.service()?;
                require_person(&service, person)?;
                let result = service.ancestors(person, (*traversal).into());
                format_people_result("Ancestors", &result, format)
            }
            Commands::Descendants {
                person,
                traversal,
                format,
            } => {
                let service = self.service()?;
                require_person(&service, person)?;
                let result = service.descendants(person, (*traversal).into());
                format_people_result("Descendants", &result, format)
            }
            Commands::Common {
                first,
                second,
                traversal,
                format,
            } => {
                let service = self.service()?;
                require_person(&service, first)?;
                require_person(&service, second)?;
                let result = service.common_ancestors(first, second, (*traversal).into());
                format_people_result("Common ancestors", &result, format)
            }
            Commands::Validate { format } => {
                let service = self.service()?;
                let dangling = service.dangling_relationships();
                let people = service.people().len();
                let relationships = service.relationships().len();
                match format.as_str() {
                    "json" => to_json(&json!({
                        "valid": dangling.is_empty(),
                        "family_id": service.family_id(),
                        "people": people,
                        "relationships": relationships,
                        "dangling": dangling,
                    })),
                    _ => Ok(format_validate_text(people, relationships, &dangling)),
                }
            }
            Commands::Families { format } => {
                let families = self.repository.list()?;
                match format.as_str() {
                    "json" => to_json(&json!({ "families": families })),
                    _ if families.is_empty() => Ok("No families stored.".to_string()),
                    _ => Ok(families.join("\n")),
                }
            }
            Commands::Sync { command } => self.execute_sync(command),
            Commands::Config => {
                let mut config = self.config.clone();
                if config.remote.api_key.is_some() {
                    config.remote.api_key = Some("********".to_string());
                }
                toml::to_string_pretty(&config)
                    .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
            }
        }
    }

    fn execute_person(&self, command: &PersonCommands) -> Result<String, ApiError> {
        match command {
            PersonCommands::Add {
                name,
                fields,
                format,
            } => {
                let service = self.service()?;
                let mut data = PersonData::new(name.as_str());
                data.birth_date = fields.birth_date;
                data.avatar_url = fields.avatar_url.clone();
                data.details = fields.details.clone();
                data.role = fields.role.clone();
                data.extra = to_map(&fields.attributes);
                let person = service.add_person(data)?;
                info!(person_id = %person.id, "Added person");
                match format.as_str() {
                    "json" => to_json(&person),
                    _ => Ok(format!(
                        "{} {} ({})",
                        "Added".green(),
                        person.data.full_name,
                        person.id
                    )),
                }
            }
            PersonCommands::Update {
                id,
                name,
                fields,
                format,
            } => {
                let patch = PersonPatch {
                    full_name: name.clone(),
                    birth_date: fields.birth_date,
                    avatar_url: fields.avatar_url.clone(),
                    details: fields.details.clone(),
                    role: fields.role.clone(),
                    extra: to_map(&fields.attributes),
                };
                if patch.is_empty() {
                    return Err(ApiError::InvalidArgument(
                        "person update needs at least one field to change".to_string(),
                    ));
                }
                let service = self.service()?;
                let person = service.update_person(id, &patch)?;
                match format.as_str() {
                    "json" => to_json(&person),
                    _ => Ok(format!("{} {} ({})", "Updated".green(), person.data.full_name, person.id)),
                }
            }
            PersonCommands::Remove { id, format } => {
                let service = self.service()?;
                let removal = service.delete_person(id)?;
                match format.as_str() {
                    "json" => to_json(&json!({
                        "person": removal.person,
                        "removed_relationships": removal.relationships,
                    })),
                    _ => Ok(format!(
                        "{} {} and {} relationship(s)",
                        "Removed".yellow(),
                        removal.person.data.full_name,
                        removal.relationships.len()
                    )),
                }
            }
            PersonCommands::Show { id, format } => {
                let service = self.service()?;
                let person = service
                    .person(id)
                    .ok_or_else(|| ApiError::PersonNotFound(id.clone()))?;
                match format.as_str() {
                    "json" => to_json(&person),
                    _ => Ok(format_person_text(&person)),
                }
            }
            PersonCommands::List { format } => {
                let service = self.service()?;
                let people = service.people();
                match format.as_str() {
                    "json" => to_json(&json!({
                        "family_id": service.family_id(),
                        "people": people,
                        "total": people.len(),
                    })),
                    _ => Ok(format_people_table(&people)),
                }
            }
        }
    }

    fn execute_sync(&self, command: &SyncCommands) -> Result<String, ApiError> {
        match command {
            SyncCommands::Status { format } => {
                let stats = self.queue.stats();
                let records = self.queue.records();
                match format.as_str() {
                    "json" => to_json(&json!({ "stats": stats, "records": records })),
                    _ => {
                        let mut out = format!(
                            "{}\n  Pending: {}\n  Failed: {}\n  Total: {}\n",
                            section_heading("Sync queue"),
                            stats.pending,
                            stats.failed,
                            stats.total
                        );
                        if !records.is_empty() {
                            out.push('\n');
                            out.push_str(&format_records_table(&records));
                        }
                        Ok(out)
                    }
                }
            }
            SyncCommands::Flush { format } => {
                if self.config.remote.url.is_none() {
                    return Err(SyncError::NotConfigured(
                        "set remote.url to flush the sync queue".to_string(),
                    )
                    .into());
                }
                // block_on cannot nest inside an existing runtime
                if tokio::runtime::Handle::try_current().is_ok() {
                    return Err(ApiError::InvalidArgument(
                        "sync flush cannot run inside an async runtime".to_string(),
                    ));
                }
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(StorageError::from)?;
                let outcome = runtime.block_on(self.queue.force_sync());
                let dropped = self.queue.take_dropped();
                let remaining = self.queue.stats().total;
                let report = match outcome {
                    DrainOutcome::Completed(report) => report,
                    DrainOutcome::AlreadyRunning => {
                        return Ok("A sync drain is already running.".to_string())
                    }
                };
                match format.as_str() {
                    "json" => to_json(&json!({
                        "report": report,
                        "remaining": remaining,
                        "dropped": dropped,
                    })),
                    _ => {
                        let mut out = format!(
                            "Flushed: {} succeeded, {} failed, {} deferred, {} remaining",
                            report.succeeded, report.failed, report.deferred, remaining
                        );
                        for record in &dropped {
                            out.push_str(&format!(
                                "\n  {} {} {}/{} after {} retries",
                                "Dropped".red(),
                                record.operation,
                                record.table,
                                record.id,
                                record.retries
                            ));
                        }
                        Ok(out)
                    }
                }
            }
        }
    }
}

fn require_person(service: &FamilyService, id: &str) -> Result<(), ApiError> {
    match service.person(id) {
        Some(_) => Ok(()),
        None => Err(ApiError::PersonNotFound(id.to_string())),
    }
}

fn to_map(entries: &[(String, Value)]) -> Map<String, Value> {
    entries.iter().cloned().collect()
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value).map_err(|e| StorageError::from(e).into())
}

fn section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn format_people_result(title: &str, people: &[Person], format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(&json!({ "people": people, "total": people.len() }));
    }
    if people.is_empty() {
        return Ok(format!("{}: none", title));
    }
    Ok(format!("{}\n{}", section_heading(title), format_people_table(people)))
}

fn format_people_table(people: &[Person]) -> String {
    if people.is_empty() {
        return "No people in this family yet.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Name", "Born", "Role"]);
    for person in people {
        table.add_row(vec![
            person.id.clone(),
            person.data.full_name.clone(),
            person
                .data
                .birth_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            person.data.role.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.to_string()
}

fn format_person_text(person: &Person) -> String {
    let mut out = format!("{}\n", section_heading(&person.data.full_name));
    out.push_str(&format!("  ID: {}\n", person.id));
    if let Some(date) = person.data.birth_date {
        out.push_str(&format!("  Born: {}\n", date));
    }
    if let Some(role) = &person.data.role {
        out.push_str(&format!("  Role: {}\n", role));
    }
    if let Some(url) = &person.data.avatar_url {
        out.push_str(&format!("  Avatar: {}\n", url));
    }
    if let Some(details) = &person.data.details {
        out.push_str(&format!("  Details: {}\n", details));
    }
    for (key, value) in &person.data.extra {
        out.push_str(&format!("  {}: {}\n", key, value));
    }
    out
}

fn format_relationships_text(people: &[Person], relationships: &[Relationship]) -> String {
    if relationships.is_empty() {
        return "No relationships.".to_string();
    }
    let names: HashMap<&str, &str> = people
        .iter()
        .map(|p| (p.id.as_str(), p.data.full_name.as_str()))
        .collect();
    let label = |id: &str| names.get(id).copied().unwrap_or("?").to_string();

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Type", "Source", "Target"]);
    for relationship in relationships {
        table.add_row(vec![
            relationship.id.clone(),
            relationship.kind.to_string(),
            label(&relationship.source),
            label(&relationship.target),
        ]);
    }
    table.to_string()
}

fn format_validate_text(people: usize, relationships: usize, dangling: &[Relationship]) -> String {
    if dangling.is_empty() {
        return format!(
            "{}\n  People: {}\n  Relationships: {}",
            "Validation passed".green(),
            people,
            relationships
        );
    }
    let mut out = format!(
        "{}\n  People: {}\n  Relationships: {}\n\nDangling relationships ({}):",
        "Validation found issues".red(),
        people,
        relationships,
        dangling.len()
    );
    for relationship in dangling {
        out.push_str(&format!(
            "\n  - {} {} -> {} ({})",
            relationship.kind, relationship.source, relationship.target, relationship.id
        ));
    }
    out
}

fn format_records_table(records: &[SyncRecord]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Seq", "Operation", "Table", "ID", "Status", "Retries"]);
    for record in records {
        table.add_row(vec![
            record.seq.to_string(),
            record.operation.to_string(),
            record.table.clone(),
            record.id.clone(),
            format!("{:?}", record.sync_status).to_lowercase(),
            record.retries.to_string(),
        ]);
    }
    table.to_string()
}
