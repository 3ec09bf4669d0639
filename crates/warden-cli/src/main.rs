//! Warden CLI: operator entry point for the tenant engine.
//!
//! Connects to SurrealDB, applies migrations and exposes the engine's
//! inbound operations as subcommands. Results are printed as JSON on
//! stdout; logs go to stderr as JSON lines.

mod config;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use surrealdb::engine::any::Any;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::membership::MemberRole;
use warden_core::models::organization::{Organization, Resource, SubscriptionTier};
use warden_core::models::permission::Capability;
use warden_core::models::record::Filter;
use warden_core::repository::OrganizationRepository;
use warden_db::DbManager;
use warden_db::repository::{
    SurrealMembershipRepository, SurrealOrganizationRepository, SurrealTenantRecordRepository,
};
use warden_engine::{
    ContextCache, NewOrganization, OrganizationDirectory, QueryGateway, QuerySpec, TenantAdmin,
    TenantResolver,
};

use crate::config::WardenConfig;
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Multi-tenant context resolution and administration", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// SurrealDB endpoint (overrides the config file)
    #[arg(long, env = "WARDEN_DB_ENDPOINT")]
    endpoint: Option<String>,

    /// SurrealDB namespace (overrides the config file)
    #[arg(long, env = "WARDEN_DB_NAMESPACE")]
    namespace: Option<String>,

    /// SurrealDB database (overrides the config file)
    #[arg(long, env = "WARDEN_DB_DATABASE")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Create an organization with its owner
    CreateOrg {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        /// Primary domain
        #[arg(long)]
        domain: String,
        /// Additional domains (repeatable)
        #[arg(long = "additional-domain")]
        additional_domains: Vec<String>,
        #[arg(long, default_value = "free")]
        tier: SubscriptionTier,
        /// User id of the owner
        #[arg(long)]
        owner: Uuid,
    },
    /// List organizations
    ListOrgs {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Add an active member
    AddMember {
        /// Organization id, code or domain
        #[arg(long)]
        org: String,
        /// User performing the change
        #[arg(long)]
        actor: Uuid,
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value = "member")]
        role: MemberRole,
    },
    /// Invite a user; prints the invitation token
    Invite {
        #[arg(long)]
        org: String,
        #[arg(long)]
        actor: Uuid,
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value = "member")]
        role: MemberRole,
    },
    /// Accept an invitation
    Accept {
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        token: String,
    },
    /// Change a member's role
    SetRole {
        #[arg(long)]
        org: String,
        #[arg(long)]
        actor: Uuid,
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        role: MemberRole,
    },
    /// Grant an extra capability to a member
    Grant {
        #[arg(long)]
        org: String,
        #[arg(long)]
        actor: Uuid,
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        capability: Capability,
    },
    /// Deactivate a membership
    RemoveMember {
        #[arg(long)]
        org: String,
        #[arg(long)]
        actor: Uuid,
        #[arg(long)]
        user: Uuid,
    },
    /// Deactivate an organization
    DeactivateOrg {
        #[arg(long)]
        org: String,
        #[arg(long)]
        actor: Uuid,
    },
    /// Resolve and print a tenant context
    Resolve {
        #[arg(long)]
        user: Uuid,
        /// Organization id, code or domain; the user's default otherwise
        #[arg(long)]
        org: Option<String>,
    },
    /// Check whether one more unit of a resource fits
    CheckLimit {
        #[arg(long)]
        org: String,
        #[arg(long)]
        resource: Resource,
    },
    /// Overwrite a usage counter with a measured value
    Reconcile {
        #[arg(long)]
        org: String,
        #[arg(long)]
        resource: Resource,
        #[arg(long)]
        actual: u64,
    },
    /// Query a tenant-owned table as a user
    Query {
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        table: String,
        /// Keys of `data` to print (repeatable)
        #[arg(long = "select")]
        selection: Vec<String>,
        /// Equality filter `field=value`; value is parsed as JSON when
        /// possible (repeatable)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<Filter>,
        #[arg(long)]
        limit: Option<u64>,
    },
}

fn parse_filter(raw: &str) -> Result<Filter, String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got {raw}"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok(Filter::eq(field.trim(), value))
}

type Organizations = SurrealOrganizationRepository<Any>;
type Memberships = SurrealMembershipRepository<Any>;

struct Services {
    organizations: Organizations,
    directory: OrganizationDirectory<Organizations>,
    resolver: TenantResolver<Organizations, Memberships>,
    admin: TenantAdmin<Organizations, Memberships>,
    gateway: QueryGateway<SurrealTenantRecordRepository<Any>>,
}

impl Services {
    fn new(db: &DbManager, config: &WardenConfig) -> Self {
        let client = db.client().clone();
        let organizations = SurrealOrganizationRepository::new(client.clone());
        let memberships = SurrealMembershipRepository::new(client.clone());
        let cache = Arc::new(ContextCache::from_config(&config.engine));

        Self {
            directory: OrganizationDirectory::new(organizations.clone()),
            resolver: TenantResolver::new(
                organizations.clone(),
                memberships.clone(),
                cache.clone(),
            ),
            admin: TenantAdmin::new(
                organizations.clone(),
                memberships,
                cache,
                config.engine.clone(),
            ),
            gateway: QueryGateway::new(SurrealTenantRecordRepository::new(client), &config.engine),
            organizations,
        }
    }

    /// Look an organization up by id, domain (contains a dot) or code.
    async fn organization(&self, reference: &str) -> WardenResult<Organization> {
        let found = if let Ok(id) = Uuid::parse_str(reference) {
            self.directory.by_id(id).await
        } else if reference.contains('.') {
            self.directory.by_domain(reference).await
        } else {
            self.directory.by_code(reference).await
        };
        found.map_err(|err| {
            if err.is_not_found() {
                WardenError::NoSuchOrganization {
                    reference: reference.to_string(),
                }
            } else {
                err
            }
        })
    }

    async fn actor(&self, reference: &str, actor: Uuid) -> WardenResult<warden_core::TenantContext> {
        let org = self.organization(reference).await?;
        self.resolver.resolve(actor, Some(org.id)).await
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<WardenConfig, CliError> {
    let mut config = WardenConfig::load(cli.config.as_deref())?;
    if let Some(endpoint) = &cli.endpoint {
        config.database.endpoint = endpoint.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.database.namespace = namespace.clone();
    }
    if let Some(database) = &cli.database {
        config.database.database = database.clone();
    }
    if matches!(cli.command, Command::Migrate) {
        config.database.migrate_on_connect = true;
    }
    Ok(config)
}

async fn run(command: Command, config: WardenConfig) -> Result<(), CliError> {
    let db = DbManager::connect(&config.database).await?;
    if matches!(command, Command::Migrate) {
        info!("Schema is up to date");
        return Ok(());
    }
    let services = Services::new(&db, &config);

    match command {
        Command::Migrate => {}
        Command::CreateOrg {
            code,
            name,
            domain,
            additional_domains,
            tier,
            owner,
        } => {
            let (org, _) = services
                .admin
                .initialize_organization(
                    NewOrganization {
                        code,
                        name,
                        primary_domain: domain,
                        additional_domains,
                        tier,
                        settings: None,
                    },
                    owner,
                )
                .await?;
            print_json(&org)?;
        }
        Command::ListOrgs { offset, limit } => {
            let page = services
                .organizations
                .list(warden_core::repository::Pagination { offset, limit })
                .await?;
            print_json(&page.items)?;
        }
        Command::AddMember {
            org,
            actor,
            user,
            role,
        } => {
            let actor = services.actor(&org, actor).await?;
            print_json(&services.admin.add_member(&actor, user, role).await?)?;
        }
        Command::Invite {
            org,
            actor,
            user,
            role,
        } => {
            let actor = services.actor(&org, actor).await?;
            let token = services.admin.invite_member(&actor, user, role).await?;
            print_json(&serde_json::json!({ "token": token }))?;
        }
        Command::Accept { org, user, token } => {
            let org = services.organization(&org).await?;
            print_json(&services.admin.accept_invitation(user, org.id, &token).await?)?;
        }
        Command::SetRole {
            org,
            actor,
            user,
            role,
        } => {
            let actor = services.actor(&org, actor).await?;
            print_json(&services.admin.set_role(&actor, user, role).await?)?;
        }
        Command::Grant {
            org,
            actor,
            user,
            capability,
        } => {
            let actor = services.actor(&org, actor).await?;
            print_json(&services.admin.add_override(&actor, user, capability).await?)?;
        }
        Command::RemoveMember { org, actor, user } => {
            let actor = services.actor(&org, actor).await?;
            print_json(&services.admin.deactivate_membership(&actor, user).await?)?;
        }
        Command::DeactivateOrg { org, actor } => {
            let actor = services.actor(&org, actor).await?;
            print_json(&services.admin.deactivate_organization(&actor).await?)?;
        }
        Command::Resolve { user, org } => {
            let org_id = match org {
                Some(reference) => Some(services.organization(&reference).await?.id),
                None => None,
            };
            print_json(&services.resolver.resolve(user, org_id).await?)?;
        }
        Command::CheckLimit { org, resource } => {
            let org = services.organization(&org).await?;
            let allowed = services.admin.quota().check_limit(org.id, resource).await?;
            print_json(&serde_json::json!({ "resource": resource, "allowed": allowed }))?;
        }
        Command::Reconcile {
            org,
            resource,
            actual,
        } => {
            let org = services.organization(&org).await?;
            let current = services
                .admin
                .quota()
                .reconcile_usage(org.id, resource, actual)
                .await?;
            print_json(&serde_json::json!({ "resource": resource, "current": current }))?;
        }
        Command::Query {
            org,
            user,
            table,
            selection,
            filters,
            limit,
        } => {
            let context = services.actor(&org, user).await?;
            let query = QuerySpec {
                table,
                selection,
                filters,
                limit,
            };
            print_json(&services.gateway.execute(&context, query).await?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
