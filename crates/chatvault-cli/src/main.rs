//! Chatvault CLI: `cvault` command.
//!
//! Manages local identities and their encrypted conversation history.
//! The master passphrase is read from `CHATVAULT_MASTER` or prompted on
//! stdin; dump passphrases from `CHATVAULT_EXPORT_PASSPHRASE` or a prompt.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use chatvault::history::{self, HistoryLog};
use chatvault::identity::{mask_secrets, redact};
use chatvault::vault::ResetMode;
use chatvault::{
    IdentityId, IdentityManager, ImportMode, Role, SearchMode, SearchQuery, TailOrder,
    VaultConfig, VaultError,
};

const ENV_MASTER: &str = "CHATVAULT_MASTER";
const ENV_EXPORT: &str = "CHATVAULT_EXPORT_PASSPHRASE";

// ── Passphrase helpers ────────────────────────────────────────────────────────

fn read_line(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Passphrase from `env` if set, otherwise prompted.
fn passphrase_from(env: &str, prompt: &str) -> Result<String> {
    match std::env::var(env) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => read_line(prompt),
    }
}

fn master_passphrase() -> Result<String> {
    passphrase_from(ENV_MASTER, "Master passphrase: ")
}

/// New master passphrase; prompts twice unless taken from the environment.
fn new_master_passphrase() -> Result<String> {
    if let Ok(value) = std::env::var(ENV_MASTER) {
        if !value.is_empty() {
            return Ok(value);
        }
    }
    let passphrase = read_line("New master passphrase: ")?;
    let confirm = read_line("Confirm passphrase: ")?;
    if passphrase != confirm {
        bail!("passphrases do not match");
    }
    Ok(passphrase)
}

fn export_passphrase() -> Result<String> {
    passphrase_from(ENV_EXPORT, "Export passphrase: ")
}

/// Short, actionable rendering of library errors.
fn explain(err: VaultError) -> anyhow::Error {
    match err {
        VaultError::AuthFailed => anyhow!("wrong passphrase (or the data was tampered with)"),
        VaultError::AmbiguousName { name, candidates } => {
            let ids: Vec<String> = candidates.iter().map(IdentityId::to_string).collect();
            anyhow!(
                "'{name}' matches several identities; use an id instead: {}",
                ids.join(", ")
            )
        }
        other => anyhow!(other),
    }
}

// ── CLI structure ─────────────────────────────────────────────────────────────

/// Chatvault CLI: local identities with encrypted chat history.
#[derive(Parser, Debug)]
#[command(
    name = "cvault",
    about = "Chatvault CLI",
    version,
    long_about = "cvault: Chatvault CLI\n\nManage local identities, their encrypted credentials,\nand their encrypted conversation history."
)]
struct Cli {
    /// Data directory (default: $CHATVAULT_HOME or ~/.chatvault)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage identities
    User {
        #[command(subcommand)]
        subcommand: UserCommands,
    },

    /// Read and write an identity's history
    History {
        /// Identity name or id (default: the active identity)
        #[arg(long, global = true)]
        user: Option<String>,

        #[command(subcommand)]
        subcommand: HistoryCommands,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// Create an identity and make it active
    Add {
        /// Display name
        #[arg(long)]
        name: String,

        /// API credential (prompted if omitted)
        #[arg(long)]
        credential: Option<String>,
    },

    /// List identities unlocked by the passphrase
    List,

    /// Make an identity active
    Use {
        /// Name or id
        identity: String,
    },

    /// Remove an identity
    Remove {
        /// Name or id
        identity: String,

        /// Also delete the identity's history and files
        #[arg(long)]
        hard: bool,
    },

    /// Show the active identity
    Whoami,

    /// Remove data directories and vault entries that no longer match
    Prune,

    /// Wipe every stored identity from the vault
    Wipe {
        /// Delete the whole vault file instead of only its identity entries
        #[arg(long)]
        hard: bool,

        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },

    /// Show the active identity's credential
    Key {
        /// Print the full credential instead of a redacted form
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// Append one turn
    Append {
        /// Role (user or assistant)
        #[arg(long, default_value = "user", value_parser = ["user", "assistant"])]
        role: String,

        /// Message text
        content: String,
    },

    /// Show the last records
    Tail {
        /// Number of records
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,

        /// Newest record first
        #[arg(long)]
        newest_first: bool,

        /// Print JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Search the history
    Search {
        /// Query (terms, or a pattern with --mode regex)
        query: String,

        /// and, or, regex
        #[arg(long, default_value = "and")]
        mode: String,

        #[arg(long)]
        case_sensitive: bool,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Omit neighbouring records
        #[arg(long)]
        no_context: bool,

        /// Print hits as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete all history
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Export the history to a file
    Export {
        /// Output file
        output: PathBuf,

        /// Write unencrypted JSON lines (requires --yes)
        #[arg(long)]
        plain: bool,

        /// Confirm a plaintext export
        #[arg(long)]
        yes: bool,
    },

    /// Import a dump file
    Import {
        /// Dump file (encrypted or JSON lines)
        input: PathBuf,

        /// Replace the existing history instead of appending
        #[arg(long)]
        replace: bool,
    },

    /// Show the records in a dump file without importing
    Preview {
        /// Dump file
        input: PathBuf,

        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = open_manager(cli.home.as_deref()).and_then(|mgr| match cli.command {
        Commands::User { subcommand } => match subcommand {
            UserCommands::Add { name, credential } => cmd_user_add(&mgr, &name, credential),
            UserCommands::List => cmd_user_list(&mgr, cli.verbose),
            UserCommands::Use { identity } => cmd_user_use(&mgr, &identity),
            UserCommands::Remove { identity, hard } => cmd_user_remove(&mgr, &identity, hard),
            UserCommands::Whoami => cmd_user_whoami(&mgr),
            UserCommands::Prune => cmd_user_prune(&mgr),
            UserCommands::Wipe { hard, yes } => cmd_user_wipe(&mgr, hard, yes),
            UserCommands::Key { show } => cmd_user_key(&mgr, show),
        },
        Commands::History { user, subcommand } => {
            let user = user.as_deref();
            match subcommand {
                HistoryCommands::Append { role, content } => {
                    cmd_history_append(&mgr, user, &role, &content)
                }
                HistoryCommands::Tail {
                    count,
                    newest_first,
                    json,
                } => cmd_history_tail(&mgr, user, count, newest_first, json),
                HistoryCommands::Search {
                    query,
                    mode,
                    case_sensitive,
                    limit,
                    no_context,
                    json,
                } => {
                    let mode: SearchMode = mode.parse().map_err(explain)?;
                    let query = SearchQuery::new(query)
                        .mode(mode)
                        .case_sensitive(case_sensitive)
                        .limit(limit)
                        .with_context(!no_context);
                    cmd_history_search(&mgr, user, &query, json)
                }
                HistoryCommands::Reset { yes } => cmd_history_reset(&mgr, user, yes),
                HistoryCommands::Export { output, plain, yes } => {
                    cmd_history_export(&mgr, user, &output, plain, yes)
                }
                HistoryCommands::Import { input, replace } => {
                    cmd_history_import(&mgr, user, &input, replace)
                }
                HistoryCommands::Preview { input, count } => cmd_history_preview(&input, count),
            }
        }
    });

    if let Err(e) = result {
        eprintln!("error: {}", mask_secrets(&format!("{e:#}")));
        std::process::exit(1);
    }
}

fn open_manager(home: Option<&Path>) -> Result<IdentityManager> {
    let mut config = VaultConfig::from_env().map_err(explain)?;
    if let Some(home) = home {
        config.root = home.to_path_buf();
    }
    log::debug!("data root: {}", config.root.display());
    Ok(IdentityManager::new(config))
}

/// The identity named by `--user`, or the active one.
fn target_identity(mgr: &IdentityManager, user: Option<&str>, passphrase: &str) -> Result<IdentityId> {
    match user {
        Some(name) => mgr.resolve(name, Some(passphrase)).map_err(explain),
        None => mgr
            .active()
            .map_err(explain)?
            .ok_or_else(|| anyhow!("no active identity; run `cvault user add` or `cvault user use`")),
    }
}

fn open_history(mgr: &IdentityManager, user: Option<&str>) -> Result<HistoryLog> {
    let passphrase = master_passphrase()?;
    let id = target_identity(mgr, user, &passphrase)?;
    mgr.history(&id, &passphrase).map_err(explain)
}

// ── User commands ─────────────────────────────────────────────────────────────

fn cmd_user_add(mgr: &IdentityManager, name: &str, credential: Option<String>) -> Result<()> {
    let passphrase = new_master_passphrase()?;
    let credential = match credential {
        Some(c) => c,
        None => read_line("API credential: ")?,
    };

    let id = mgr.create(name, &passphrase, &credential).map_err(explain)?;
    println!("Created identity '{}'", name.trim());
    println!("  ID:    {id}");
    if mgr.is_admin(&id).map_err(explain)? {
        println!("  Role:  admin");
    }
    Ok(())
}

fn cmd_user_list(mgr: &IdentityManager, verbose: bool) -> Result<()> {
    let passphrase = master_passphrase()?;
    let active = mgr.active().map_err(explain)?;
    let listed = mgr.list(&passphrase).map_err(explain)?;

    if listed.is_empty() {
        println!("No identities unlocked by this passphrase.");
        return Ok(());
    }
    for (id, name) in listed {
        let marker = if active.as_ref() == Some(&id) { "*" } else { " " };
        if verbose {
            let admin = if mgr.is_admin(&id).map_err(explain)? { " (admin)" } else { "" };
            println!("{marker} {name}  {id}{admin}");
        } else {
            println!("{marker} {name}");
        }
    }
    Ok(())
}

fn cmd_user_use(mgr: &IdentityManager, identity: &str) -> Result<()> {
    let id = match mgr.resolve(identity, None) {
        Ok(id) => id,
        Err(VaultError::PassphraseRequired(_)) => {
            let passphrase = master_passphrase()?;
            mgr.resolve(identity, Some(&passphrase)).map_err(explain)?
        }
        Err(e) => return Err(explain(e)),
    };
    mgr.activate(&id).map_err(explain)?;
    println!("Active identity: {id}");
    Ok(())
}

fn cmd_user_remove(mgr: &IdentityManager, identity: &str, hard: bool) -> Result<()> {
    let passphrase = master_passphrase()?;
    let id = mgr.resolve(identity, Some(&passphrase)).map_err(explain)?;
    // Only the owner may remove an identity.
    mgr.display_name(&id, &passphrase).map_err(explain)?;

    let removal = mgr.remove(&id, hard).map_err(explain)?;
    if removal.purge_requested {
        mgr.layout()
            .purge_identity(&removal.id)
            .map_err(explain)
            .context("identity removed but its files could not be deleted")?;
    }

    println!("Removed identity {}", removal.id);
    match removal.new_active {
        Some(next) => println!("Active identity is now {next}"),
        None if mgr.active().map_err(explain)?.is_none() => println!("No active identity"),
        None => {}
    }
    Ok(())
}

fn cmd_user_prune(mgr: &IdentityManager) -> Result<()> {
    let dirs = mgr.prune_orphan_dirs().map_err(explain)?;
    let entries = mgr.prune_orphan_entries().map_err(explain)?;
    println!("Removed {dirs} orphaned directories");
    if entries.is_empty() {
        println!("No orphaned vault entries");
    } else {
        let ids: Vec<&str> = entries.iter().map(String::as_str).collect();
        println!("Removed vault entries of: {}", ids.join(", "));
    }
    Ok(())
}

fn cmd_user_wipe(mgr: &IdentityManager, hard: bool, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to wipe the vault without --yes");
    }
    let mode = if hard { ResetMode::Hard } else { ResetMode::Soft };
    let discarded = mgr.reset_vault(mode).map_err(explain)?;
    println!("Vault wiped ({discarded} entries discarded)");
    Ok(())
}

fn cmd_user_whoami(mgr: &IdentityManager) -> Result<()> {
    let id = mgr
        .active()
        .map_err(explain)?
        .ok_or_else(|| anyhow!("no active identity"))?;
    let passphrase = master_passphrase()?;
    let session = mgr.login(id.as_str(), &passphrase).map_err(explain)?;
    println!("{} ({})", session.display_name(), session.id());
    session.logout();
    Ok(())
}

fn cmd_user_key(mgr: &IdentityManager, show: bool) -> Result<()> {
    let id = mgr
        .active()
        .map_err(explain)?
        .ok_or_else(|| anyhow!("no active identity"))?;
    let passphrase = master_passphrase()?;
    let credential = mgr.get_credential(&id, &passphrase).map_err(explain)?;
    if show {
        println!("{}", credential.expose());
    } else {
        println!("{}", redact(credential.expose(), 6));
    }
    Ok(())
}

// ── History commands ──────────────────────────────────────────────────────────

fn cmd_history_append(mgr: &IdentityManager, user: Option<&str>, role: &str, content: &str) -> Result<()> {
    let log = open_history(mgr, user)?;
    match log.append(Role::normalize(role), content).map_err(explain)? {
        Some(record) => println!("Appended {} turn at {}", record.role, record.ts_iso()),
        None => println!("Nothing to append (empty content)"),
    }
    Ok(())
}

fn cmd_history_tail(
    mgr: &IdentityManager,
    user: Option<&str>,
    count: usize,
    newest_first: bool,
    json: bool,
) -> Result<()> {
    let log = open_history(mgr, user)?;
    let order = if newest_first {
        TailOrder::NewestFirst
    } else {
        TailOrder::Chronological
    };
    for record in log.load_tail(count, order).map_err(explain)? {
        if json {
            println!("{}", record.to_json().map_err(explain)?);
        } else {
            println!("[{}] {}: {}", record.ts_iso(), record.role, record.content);
        }
    }
    Ok(())
}

fn cmd_history_search(mgr: &IdentityManager, user: Option<&str>, query: &SearchQuery, json: bool) -> Result<()> {
    let log = open_history(mgr, user)?;
    let hits = log.search(query).map_err(explain)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for hit in hits {
        println!("#{} [{}] {}: {}", hit.idx, hit.ts.format("%Y-%m-%d %H:%M:%S"), hit.role, hit.snippet);
        if let Some(prev) = &hit.prev {
            println!("    before  {}: {}", prev.role, prev.line);
        }
        if let Some(next) = &hit.next {
            println!("    after   {}: {}", next.role, next.line);
        }
    }
    Ok(())
}

fn cmd_history_reset(mgr: &IdentityManager, user: Option<&str>, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to delete history without --yes");
    }
    let log = open_history(mgr, user)?;
    log.reset().map_err(explain)?;
    println!("History cleared");
    Ok(())
}

fn cmd_history_export(
    mgr: &IdentityManager,
    user: Option<&str>,
    output: &Path,
    plain: bool,
    yes: bool,
) -> Result<()> {
    let log = open_history(mgr, user)?;
    let bytes = if plain {
        if !yes {
            bail!("a plaintext export is readable by anyone; pass --yes to confirm");
        }
        log.export_plain(yes).map_err(explain)?.into_bytes()
    } else {
        let export_pw = export_passphrase()?;
        if export_pw.is_empty() {
            bail!("export passphrase cannot be empty");
        }
        log.export_encrypted(&export_pw, mgr.config().dump_kdf)
            .map_err(explain)?
            .to_json()
            .map_err(explain)?
            .into_bytes()
    };

    history::write_dump(output, &bytes)
        .map_err(explain)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Exported history to {}", output.display());
    Ok(())
}

fn read_dump(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Export passphrase only if the dump needs one.
fn dump_passphrase(bytes: &[u8]) -> Result<Option<String>> {
    match history::dump::detect(bytes).map_err(explain)? {
        history::Dump::Encrypted(_) => Ok(Some(export_passphrase()?)),
        history::Dump::Plain(_) => Ok(None),
    }
}

fn cmd_history_import(mgr: &IdentityManager, user: Option<&str>, input: &Path, replace: bool) -> Result<()> {
    let bytes = read_dump(input)?;
    let export_pw = dump_passphrase(&bytes)?;
    let log = open_history(mgr, user)?;
    let mode = if replace {
        ImportMode::Replace
    } else {
        ImportMode::Append
    };
    let count = log
        .import(&bytes, export_pw.as_deref(), mode)
        .map_err(explain)?;
    println!("Imported {count} records");
    Ok(())
}

fn cmd_history_preview(input: &Path, count: usize) -> Result<()> {
    let bytes = read_dump(input)?;
    let export_pw = dump_passphrase(&bytes)?;
    let records = history::preview(&bytes, export_pw.as_deref()).map_err(explain)?;

    println!("{} records", records.len());
    for record in records.iter().take(count) {
        let first = record.content.lines().next().unwrap_or("");
        println!("[{}] {}: {}", record.ts_iso(), record.role, redact(first, 80));
    }
    Ok(())
}
