//! groupcommit - CLI entry point.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use groupcommit::config::Config;
use groupcommit::state::{AppState, GroupId, GroupTarget, StagedGroupUpdate};
use groupcommit::{BatchEvent, GenerationProgress, Session, Vendor};

/// Split uncommitted changes into separately described commits.
#[derive(Parser, Debug)]
#[command(name = "groupcommit")]
#[command(about = "Group changed files into commits with LLM-written messages")]
#[command(version)]
struct Cli {
    /// LLM provider (openai, anthropic, gemini, mistral)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model id for the selected provider
    #[arg(long, global = true)]
    model: Option<String>,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show changed files and staged groups
    Status,

    /// Create a group from files and stage it with a commit message
    Group {
        /// Files to group (repo-relative)
        files: Vec<String>,

        /// Group every changed file not already staged
        #[arg(long, conflicts_with = "files")]
        all: bool,

        /// Context for this group, passed to the model
        #[arg(short, long)]
        context: Option<String>,

        /// Use this message instead of generating one
        #[arg(short, long)]
        message: Option<String>,

        /// Stage without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Change a staged group
    Edit {
        /// Group id or unique prefix
        id: String,

        #[arg(short, long)]
        message: Option<String>,

        #[arg(short, long)]
        context: Option<String>,

        /// Replace the group's files
        #[arg(long, num_args = 1..)]
        files: Option<Vec<String>>,

        /// Remove one file from the group
        #[arg(long, conflicts_with = "files")]
        remove: Option<String>,

        /// Generate a new message after applying the other changes
        #[arg(long, conflicts_with = "message")]
        regenerate: bool,
    },

    /// Drop a staged group without committing it
    Unstage {
        /// Group id or unique prefix
        id: String,
    },

    /// Commit every staged group
    Commit {
        /// Commit without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or set the context passed to the model for every group
    Context {
        text: Option<String>,

        #[arg(long, conflicts_with = "text")]
        clear: bool,
    },

    /// Discard all pending changes to a file
    Revert {
        path: String,

        #[arg(short, long)]
        yes: bool,
    },

    /// Check that the configured provider accepts the API key and model
    TestConnection,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "groupcommit=debug"
    } else {
        "groupcommit=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let mut session = Session::open(&cwd, &config)
        .await
        .context("Failed to open a session. Run groupcommit from within a git repository.")?;

    match cli.command {
        Command::Status => {
            print_status(session.state());
            Ok(())
        }
        Command::Group {
            files,
            all,
            context,
            message,
            yes,
        } => {
            let files = if all {
                session
                    .state()
                    .unclaimed_files()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            } else {
                files
            };
            run_group(&mut session, files, context, message, yes).await
        }
        Command::Edit {
            id,
            message,
            context,
            files,
            remove,
            regenerate,
        } => run_edit(&mut session, &id, message, context, files, remove, regenerate).await,
        Command::Unstage { id } => {
            let id = resolve_group_id(session.state(), &id)?;
            session.machine_mut().unstage(&id);
            println!("Unstaged group {}", short_id(&id));
            Ok(())
        }
        Command::Commit { yes } => run_commit(&mut session, yes).await,
        Command::Context { text, clear } => {
            match (text, clear) {
                (Some(text), _) => session.machine_mut().set_general_context(&text),
                (None, true) => session.machine_mut().set_general_context(""),
                (None, false) => {
                    let current = &session.state().general_context;
                    if current.is_empty() {
                        println!("No general context set.");
                    } else {
                        println!("{}", current);
                    }
                    return Ok(());
                }
            }
            println!("General context updated.");
            Ok(())
        }
        Command::Revert { path, yes } => {
            if !session.state().changed_files.contains(&path) {
                bail!("{} has no pending changes", path);
            }
            if !yes && !confirm(&format!("Discard all changes to {}?", path), false)? {
                println!("Aborted.");
                return Ok(());
            }
            session
                .revert(&path)
                .await
                .with_context(|| format!("Failed to revert {}", path))?;
            println!("✓ Reverted {}", path);
            Ok(())
        }
        Command::TestConnection => {
            let summary = session.state().provider.clone();
            println!("Testing {} ({})...", summary.vendor, summary.model);
            session
                .test_connection()
                .await
                .context("Connection test failed")?;
            println!("✓ Connection OK");
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(provider) = &cli.provider {
        config.provider = provider.parse::<Vendor>()?;
    }
    if let Some(model) = &cli.model {
        config.providers.entry(config.provider).or_default().model = Some(model.clone());
    }
    Ok(config)
}

async fn run_group(
    session: &mut Session,
    files: Vec<String>,
    context: Option<String>,
    message: Option<String>,
    yes: bool,
) -> Result<()> {
    if files.is_empty() {
        bail!("No files given. Pass file paths or --all.");
    }
    for file in &files {
        session.machine_mut().toggle_selection(file);
    }
    let selection: Vec<String> = session.state().selection.iter().cloned().collect();
    if !session.machine_mut().start_group(&selection) {
        bail!("None of the given files have unstaged changes");
    }
    if let Some(context) = &context {
        session.machine_mut().set_draft_context(context);
    }

    match message {
        Some(message) => {
            session.machine_mut().set_draft_message(&message);
        }
        None => {
            let draft_files = session
                .state()
                .draft
                .as_ref()
                .map(|d| d.files.len())
                .unwrap_or_default();
            println!("Describing {} file(s)...", draft_files);
            generate_with_progress(session, GroupTarget::Draft)
                .await
                .context("Failed to generate commit message")?;
        }
    }

    let draft = session
        .state()
        .draft
        .clone()
        .ok_or_else(|| anyhow!("The draft group was discarded"))?;
    println!();
    for file in &draft.files {
        println!("  {}", file);
    }
    println!();
    println!("{}", draft.commit_message.as_deref().unwrap_or_default());
    println!();

    if !yes && !confirm("Stage this group?", true)? {
        session.machine_mut().discard_draft();
        println!("Discarded.");
        return Ok(());
    }

    let id = session
        .machine_mut()
        .stage_draft()
        .ok_or_else(|| anyhow!("Cannot stage a group without a commit message"))?;
    println!("✓ Staged group {}", short_id(&id));
    Ok(())
}

async fn run_edit(
    session: &mut Session,
    id: &str,
    message: Option<String>,
    context: Option<String>,
    files: Option<Vec<String>>,
    remove: Option<String>,
    regenerate: bool,
) -> Result<()> {
    let id = resolve_group_id(session.state(), id)?;
    session.machine_mut().review_staged_group(&id);

    if let Some(path) = remove {
        if !session.machine_mut().remove_file_from_staged_group(&id, &path) {
            bail!("{} is not part of group {}", path, short_id(&id));
        }
        if session.state().staged_group(&id).is_none() {
            println!("Removed the last file, group {} unstaged", short_id(&id));
            return Ok(());
        }
    }

    session.machine_mut().update_staged_group(
        &id,
        StagedGroupUpdate {
            specific_context: context,
            commit_message: message,
            files,
        },
    );

    if regenerate {
        println!("Regenerating message for group {}...", short_id(&id));
        generate_with_progress(session, GroupTarget::Staged(id.clone()))
            .await
            .context("Failed to generate commit message")?;
    }
    session.machine_mut().back_to_selection();

    if let Some(group) = session.state().staged_group(&id) {
        print_group(group);
    }
    Ok(())
}

async fn run_commit(session: &mut Session, yes: bool) -> Result<()> {
    let total = session.state().staged_groups.len();
    if total == 0 {
        println!("No staged groups. Nothing to commit.");
        return Ok(());
    }
    for group in &session.state().staged_groups {
        print_group(group);
    }
    if !yes && !confirm(&format!("Commit {} group(s)?", total), true)? {
        println!("Aborted.");
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::Started { total } => println!("Committing {} group(s)...", total),
                BatchEvent::GroupCommitted { id, sha } => {
                    println!("  [DONE] {} -> {}", short_id(&id), sha.get(..7).unwrap_or(&sha))
                }
                BatchEvent::GroupFailed { id, error } => {
                    println!("  [FAILED] {}: {}", short_id(&id), error)
                }
                BatchEvent::Finished { .. } => {}
            }
        }
    });
    let summary = session.commit_all(Some(tx)).await;
    let _ = printer.await;

    println!(
        "✓ {} committed, {} failed",
        summary.success_count, summary.failure_count
    );
    if summary.failure_count > 0 {
        println!("Failed groups stay staged. Fix them and run commit again.");
    }
    Ok(())
}

/// Run a generation, printing progress to stderr. Ctrl-C cancels it.
async fn generate_with_progress(session: &mut Session, target: GroupTarget) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                GenerationProgress::Summarizing { index, total, path } => {
                    eprintln!("  [{}/{}] {}", index, total, path)
                }
                GenerationProgress::Synthesizing => eprintln!("  Writing commit message..."),
                GenerationProgress::Started { .. } | GenerationProgress::Finished { .. } => {}
            }
        }
    });

    let result = session.generate(target, &cancel, Some(tx)).await;
    interrupt.abort();
    let _ = printer.await;

    let generated = result?;
    if generated.truncated {
        eprintln!("  Note: some changes were truncated to fit the model's context.");
    }
    if let Some(tokens) = generated.tokens_used {
        eprintln!("  Used {} tokens", tokens);
    }
    Ok(())
}

/// Match a full group id or a unique prefix of one.
fn resolve_group_id(state: &AppState, prefix: &str) -> Result<GroupId> {
    let matches: Vec<&GroupId> = state
        .staged_groups
        .iter()
        .map(|g| &g.id)
        .filter(|id| id.as_str().starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).clone()),
        [] => bail!("No staged group matches '{}'", prefix),
        _ => bail!("'{}' matches {} groups, use a longer prefix", prefix, matches.len()),
    }
}

fn short_id(id: &GroupId) -> &str {
    id.as_str().get(..8).unwrap_or(id.as_str())
}

fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .context("Failed to read confirmation")
}

fn print_status(state: &AppState) {
    println!(
        "Provider: {} ({}){}",
        state.provider.vendor,
        state.provider.model,
        if state.provider.api_key_configured {
            ""
        } else {
            " - no API key configured"
        }
    );
    println!();

    let unclaimed = state.unclaimed_files();
    if unclaimed.is_empty() {
        println!("No unstaged changed files.");
    } else {
        println!("Changed files:");
        for file in unclaimed {
            println!("  {}", file);
        }
    }

    if !state.staged_groups.is_empty() {
        println!();
        println!("Staged groups:");
        for group in &state.staged_groups {
            print_group(group);
        }
    }
}

fn print_group(group: &groupcommit::StagedGroup) {
    let subject = group.commit_message.lines().next().unwrap_or_default();
    println!("  {}  {}", short_id(&group.id), subject);
    for file in &group.files {
        println!("      {}", file);
    }
}
