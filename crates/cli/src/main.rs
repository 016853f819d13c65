use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use gust_api::GitHubClient;
use gust_engine::{CorrelatedRun, Correlator, resolve_workflow_file};
use gust_types::{InputMap, Options, RunSpec};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "gust",
    version,
    about = "Dispatch a GitHub Actions workflow and follow the run it starts"
)]
struct Args {
    /// Workflow to dispatch: a bare name or a workflow file name
    workflow: String,

    /// Repository as owner/name; detected from the local checkout when omitted
    #[arg(short, long)]
    repo: Option<String>,

    /// Git ref to run against; defaults to the current branch or commit
    #[arg(short = 'e', long = "ref")]
    ref_name: Option<String>,

    /// Workflow input as key=value; repeatable
    #[arg(short, long = "input", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    input: Vec<(String, String)>,

    /// Commit local changes before dispatching
    #[arg(short, long)]
    commit: bool,

    /// Push after committing
    #[arg(short, long)]
    push: bool,

    /// Print the run URL
    #[arg(long)]
    print: bool,

    /// Open the run URL in a browser
    #[arg(short, long)]
    open: bool,

    /// Attach `gh run watch` to the run
    #[arg(short, long)]
    watch: bool,
}

impl Args {
    fn options(&self) -> Options {
        Options {
            commit: self.commit,
            push: self.push,
            print: self.print,
            open: self.open,
            watch: self.watch,
        }
    }
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let options = args.options();

    // Local commit/push completes before the correlator captures its
    // reference timestamp, so a push-triggered delay cannot race it.
    let spec = build_run_spec(&args, options).await?;
    debug!(repo = %spec.repo, ref_name = %spec.ref_name, "dispatching workflow");

    let client = GitHubClient::new_from_env()?;
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let workflow_file = resolve_workflow_file(&client, &spec.repo, &spec.workflow).await?;
    let run = Correlator::new(&client, cancel)
        .dispatch_and_correlate(&spec.repo, &workflow_file, &spec.ref_name, &spec.inputs)
        .await?;

    report(options, &spec.repo, &run).await
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Fill in repo and ref from the local checkout where the command line left
/// them out, and commit/push local changes when asked to.
async fn build_run_spec(args: &Args, options: Options) -> Result<RunSpec> {
    let cwd = std::env::current_dir().context("determine working directory")?;
    let mut root: Option<PathBuf> = None;

    let repo = match &args.repo {
        Some(repo) => repo.clone(),
        None => gust_git::github_repo_id(repo_root(&mut root, &cwd)?).await?,
    };
    let ref_name = match &args.ref_name {
        Some(ref_name) => ref_name.clone(),
        None => gust_git::current_ref(repo_root(&mut root, &cwd)?).await?,
    };

    if options.commit {
        gust_git::commit_if_dirty(repo_root(&mut root, &cwd)?, options.push).await?;
    }

    Ok(RunSpec {
        repo,
        ref_name,
        workflow: args.workflow.clone(),
        inputs: args.input.iter().cloned().collect::<InputMap>(),
    })
}

/// Locate the repository root once and reuse it across detection steps.
fn repo_root<'a>(cache: &'a mut Option<PathBuf>, cwd: &Path) -> Result<&'a PathBuf> {
    match cache {
        Some(root) => Ok(root),
        None => {
            let root = gust_git::discover_repo(cwd)?;
            Ok(cache.insert(root))
        }
    }
}

async fn report(options: Options, repo: &str, run: &CorrelatedRun) -> Result<()> {
    if options.print {
        println!("{}", run.url);
    }
    if options.open {
        open_in_browser(&run.url).await?;
    }
    if options.watch {
        watch_run(repo, run.id)?;
    }
    Ok(())
}

async fn open_in_browser(url: &str) -> Result<()> {
    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    let status = tokio::process::Command::new(opener)
        .arg(url)
        .status()
        .await
        .with_context(|| format!("launch {opener}"))?;
    ensure!(status.success(), "{opener} exited with {status}");
    Ok(())
}

/// Hand off to `gh run watch`, inheriting the terminal for its interactive UI.
fn watch_run(repo: &str, id: u64) -> Result<()> {
    let status = std::process::Command::new("gh")
        .args(["run", "watch", "-R", repo, &id.to_string()])
        .status()
        .context("launch gh run watch")?;
    ensure!(status.success(), "gh run watch exited with {status}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, parse_key_val};

    #[test]
    fn key_val_parser_splits_on_first_equals() {
        assert_eq!(
            parse_key_val("environment=staging").unwrap(),
            ("environment".to_string(), "staging".to_string())
        );
        assert_eq!(
            parse_key_val("flags=a=b").unwrap(),
            ("flags".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("no-equals").is_err());
    }

    #[test]
    fn args_collect_repeated_inputs() {
        let args = Args::parse_from([
            "gust", "deploy", "-r", "owner/name", "-e", "main", "-i", "a=1", "-i", "b=2",
            "--print",
        ]);

        assert_eq!(args.workflow, "deploy");
        assert_eq!(args.repo.as_deref(), Some("owner/name"));
        assert_eq!(args.ref_name.as_deref(), Some("main"));
        assert_eq!(
            args.input,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
        assert!(args.options().print);
        assert!(!args.options().watch);
    }

    #[test]
    fn workflow_argument_is_required() {
        assert!(Args::try_parse_from(["gust"]).is_err());
    }
}
