use bit::artifacts::transport::credentials::{EnvCredentials, TOKEN_ENV};
use bit::artifacts::transport::daemon::Daemon;
use bit::{BitResult, Repository, ResetMode};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bit",
    version,
    about = "A small Git engine",
    long_about = "Runs a fixed menu of Git operations (clone, branch, commit, tag, \
    fetch/pull/push, reset, clean, merge) on repositories it can share with Git \
    for the object and index formats.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
"
)]
struct Cli {
    #[arg(short = 'C', global = true, help = "Run as if started in this directory")]
    directory: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create an empty repository")]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<PathBuf>,
    },
    #[command(about = "Clone a repository into a new directory")]
    Clone {
        #[arg(index = 1, help = "Local path, file:// or bit:// URL of the remote")]
        uri: String,
        #[arg(index = 2, help = "Destination, derived from the URL when omitted")]
        path: Option<PathBuf>,
    },
    #[command(about = "List branches, or create one at HEAD")]
    Branch {
        #[arg(index = 1)]
        name: Option<String>,
    },
    #[command(about = "Switch branches or detach HEAD at a revision")]
    Checkout {
        #[arg(index = 1)]
        target: String,
        #[arg(short, long, help = "Discard local changes")]
        force: bool,
    },
    #[command(about = "Merge a branch into the current one")]
    Merge {
        #[arg(index = 1)]
        branch: String,
    },
    #[command(about = "Stage every change in the working tree")]
    Add {
        #[arg(index = 1, hide = true, help = "Ignored; everything is staged")]
        pathspec: Vec<String>,
    },
    #[command(about = "Record the staged changes")]
    Commit {
        #[arg(short, long, help = "The commit message")]
        message: String,
    },
    #[command(about = "Reset the current branch, the index and the working tree")]
    Reset {
        #[arg(long, conflicts_with_all = ["mixed", "hard"])]
        soft: bool,
        #[arg(long, conflicts_with = "hard")]
        mixed: bool,
        #[arg(long)]
        hard: bool,
        #[arg(index = 1, help = "Revision to reset to, HEAD by default")]
        revision: Option<String>,
    },
    #[command(about = "Remove untracked files")]
    Clean {
        #[arg(short, long, help = "Actually delete; otherwise only report")]
        force: bool,
    },
    #[command(about = "List, create or delete tags")]
    Tag {
        #[arg(index = 1)]
        name: Option<String>,
        #[arg(short, long, help = "Create an annotated tag with this message")]
        message: Option<String>,
        #[arg(short, long, help = "Replace an existing tag")]
        force: bool,
        #[arg(short, long, requires = "name", conflicts_with_all = ["message", "force"])]
        delete: bool,
    },
    #[command(name = "push-tag", about = "Push one tag to origin")]
    PushTag {
        #[arg(index = 1)]
        name: String,
    },
    #[command(about = "Download branches and tags from origin")]
    Fetch,
    #[command(about = "Fetch and merge the upstream of the current branch")]
    Pull,
    #[command(about = "Push the current branch to its upstream")]
    Push {
        #[arg(short, long, help = "Overwrite the remote branch even if it diverged")]
        force: bool,
    },
    #[command(name = "hash-object", about = "Compute a blob id, optionally storing it")]
    HashObject {
        #[arg(short, long, help = "Write the object to the object database")]
        write: bool,
        #[arg(index = 1)]
        file: PathBuf,
    },
    #[command(name = "cat-file", about = "Print the content of an object")]
    CatFile {
        #[arg(short = 'p', long, help = "Object id, id prefix or revision")]
        object: String,
    },
    #[command(about = "Serve the repositories below a directory over bit://")]
    Daemon {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, default_value = "127.0.0.1:9418")]
        listen: String,
        #[arg(long, help = "Require this access token (defaults to BIT_TOKEN)")]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn stdout() -> Box<dyn std::io::Write> {
    Box::new(std::io::stdout())
}

async fn run(cli: Cli) -> BitResult<()> {
    let cwd = std::env::current_dir()?;
    let cwd = match cli.directory {
        Some(directory) => cwd.join(directory),
        None => cwd,
    };

    match cli.command {
        Commands::Init { path } => {
            let path = path.map(|path| cwd.join(path)).unwrap_or(cwd);
            Repository::init_with_writer(path, stdout()).await?.close()
        }
        Commands::Clone { uri, path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(clone_directory_name(&uri)));
            Repository::clone_with_writer(&uri, cwd.join(path), &EnvCredentials, stdout())
                .await?
                .close()
        }
        Commands::Daemon {
            root,
            listen,
            token,
        } => {
            let token = token.or_else(|| std::env::var(TOKEN_ENV).ok());
            let listener = Daemon::bind(&listen).await?;
            Daemon::new(cwd.join(root), token).run(listener).await?;
            Ok(())
        }
        command => {
            let repository =
                Repository::open_with_writer(&cwd, stdout())?.with_credentials(&EnvCredentials)?;
            run_in(&repository, command).await?;
            repository.close()
        }
    }
}

async fn run_in(repository: &Repository, command: Commands) -> BitResult<()> {
    match command {
        Commands::Branch { name: Some(name) } => {
            repository.create_branch(&name)?;
        }
        Commands::Branch { name: None } => {
            repository.list_branches()?;
        }
        Commands::Checkout { target, force } => {
            repository.checkout(&target, force).await?;
        }
        Commands::Merge { branch } => {
            repository.merge_branch(&branch).await?;
        }
        Commands::Add { .. } => {
            repository.add_all().await?;
        }
        Commands::Commit { message } => {
            repository.commit(&message).await?;
        }
        Commands::Reset {
            soft,
            hard,
            revision,
            ..
        } => {
            let mode = if soft {
                ResetMode::Soft
            } else if hard {
                ResetMode::Hard
            } else {
                ResetMode::Mixed
            };
            match revision {
                Some(revision) => {
                    repository.reset_to(&revision, mode).await?;
                }
                None => repository.reset(mode).await?,
            }
        }
        Commands::Clean { force } => {
            repository.clean(force).await?;
        }
        Commands::Tag {
            name: None, ..
        } => {
            repository.list_tags()?;
        }
        Commands::Tag {
            name: Some(name),
            delete: true,
            ..
        } => {
            repository.delete_tag(&name)?;
        }
        Commands::Tag {
            name: Some(name),
            message,
            force,
            ..
        } => {
            repository.tag(&name, message.as_deref(), force)?;
        }
        Commands::PushTag { name } => repository.push_tag(&name).await?,
        Commands::Fetch => {
            repository.fetch().await?;
        }
        Commands::Pull => {
            repository.pull().await?;
        }
        Commands::Push { force } => repository.push(force).await?,
        Commands::HashObject { write, file } => {
            repository.hash_object(file, write)?;
        }
        Commands::CatFile { object } => {
            repository.cat_file(&object)?;
        }
        Commands::Init { .. } | Commands::Clone { .. } | Commands::Daemon { .. } => {}
    }

    Ok(())
}

/// `bit://host/team/project.git` clones into `project`
fn clone_directory_name(uri: &str) -> String {
    let trimmed = uri.trim_end_matches('/');
    let name = Path::new(trimmed)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| trimmed.to_string());

    name.strip_suffix(".git").unwrap_or(&name).to_string()
}
