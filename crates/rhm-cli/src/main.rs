//! `rhm`: operator commands for the rental marketplace.
//!
//! Output is `key=value` lines on stdout so scripts can grep it; logs go to
//! stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use rhm_config::{secrets::resolve_secrets, ConfigMode, LoadedConfig, Settings};
use rhm_db::{PgPool, PgStore};
use rhm_lifecycle::Market;
use rhm_schemas::Actor;

#[derive(Parser)]
#[command(name = "rhm")]
#[command(about = "Rental marketplace operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Compare house statuses with lease statuses and release orphaned houses
    Reconcile {
        /// Report only; write nothing.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Lease maintenance
    Leases {
        #[command(subcommand)]
        cmd: LeasesCmd,
    },

    /// Order inspection
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum LeasesCmd {
    /// Complete every ACTIVE lease whose end date has passed.
    CompleteDue {
        /// Sweep as of this date (YYYY-MM-DD) instead of today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum OrderCmd {
    /// Print an order and its transition history
    Show {
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let (_, pool) = connect().await?;
            match cmd {
                DbCmd::Status => {
                    let s = rhm_db::status(&pool).await?;
                    println!("db_ok={} has_schema={}", s.ok, s.has_schema);
                }
                DbCmd::Migrate => {
                    rhm_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = rhm_config::load_layered_yaml(&path_refs)?;
            // Reject layers that would not start the daemon.
            loaded.settings()?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Reconcile { dry_run } => {
            let market = market().await?;
            let out = market.reconcile(&Actor::system(), dry_run, Utc::now()).await?;
            println!("dry_run={}", out.dry_run);
            println!("scanned_houses={}", out.scanned_houses);
            println!("scanned_leases={}", out.scanned_leases);
            println!("drift={}", out.report.diffs.len());
            println!("fixed={}", out.fixed);
            println!("skipped={}", out.skipped);
            println!("failed={}", out.failed);
            println!("unresolved={}", out.unresolved.len());
            for diff in &out.unresolved {
                println!("unresolved_diff={}", serde_json::to_string(diff)?);
            }
        }

        Commands::Leases { cmd } => match cmd {
            LeasesCmd::CompleteDue { date } => {
                let market = market().await?;
                let as_of = date.map(start_of_day).unwrap_or_else(Utc::now);
                let out = market.complete_due_leases(&Actor::system(), as_of).await?;
                println!("as_of={}", as_of.date_naive());
                println!("due={}", out.due);
                println!("completed={}", join_ids(&out.completed));
                println!("confirmed={}", join_ids(&out.confirmed));
                println!("failed={}", join_ids(&out.failed));
            }
        },

        Commands::Order { cmd } => match cmd {
            OrderCmd::Show { id } => {
                let market = market().await?;
                let actor = Actor::system();
                let o = market.get_order(&actor, id).await?;
                println!("order_id={}", o.id);
                println!("house_id={}", o.house_id);
                println!("tenant_id={}", o.user_id);
                println!("landlord_id={}", o.landlord_id);
                println!("status={}", o.status.as_str());
                println!("start_date={}", o.start_date);
                println!("end_date={}", o.end_date);
                println!("total_amount_cents={}", o.total_amount_cents);
                println!("deposit_amount_cents={}", o.deposit_amount_cents);
                println!("paid_at={}", opt_dt(&o.paid_at));
                println!("penalty_amount_cents={}", opt_display(&o.penalty_amount_cents));
                println!("version={}", o.version);
                for ev in market.order_history(&actor, id).await? {
                    println!(
                        "event={} {}->{} by={}#{} at={}",
                        ev.action,
                        ev.from_status.as_str(),
                        ev.to_status.as_str(),
                        ev.actor_role.as_str(),
                        ev.actor_id,
                        ev.created_at.to_rfc3339()
                    );
                }
            }
        },
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

/// Config from `RHM_CONFIG` plus a migrated pool.
async fn connect() -> Result<(Settings, PgPool)> {
    let loaded: LoadedConfig = rhm_config::load_from_env()?;
    let settings = loaded.settings()?;
    let secrets = resolve_secrets(&loaded.config_json, ConfigMode::Maintenance)?;
    let pool = rhm_db::connect(
        secrets.require_database_url()?,
        settings.database.max_connections,
    )
    .await
    .context("rhm: database connect failed")?;
    Ok((settings, pool))
}

async fn market() -> Result<Market> {
    let (settings, pool) = connect().await?;
    let has_schema = rhm_db::status(&pool).await?.has_schema;
    if !has_schema {
        anyhow::bail!("database has no marketplace schema; run `rhm db migrate` first");
    }
    Ok(Market::new(
        Arc::new(PgStore::new(pool)),
        settings.lease.policy,
    ))
}

fn start_of_day(d: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn opt_dt(dt: &Option<DateTime<Utc>>) -> String {
    dt.as_ref().map(|d| d.to_rfc3339()).unwrap_or_default()
}

fn opt_display<T: std::fmt::Display>(v: &Option<T>) -> String {
    v.as_ref().map(|x| x.to_string()).unwrap_or_default()
}
