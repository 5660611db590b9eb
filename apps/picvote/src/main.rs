use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use shared::{
    domain::{ImageId, SessionId, UserId},
    error::{ApiException, ErrorCode},
    protocol::ServerResponse,
};
use storage::Storage;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voting::{Dispatcher, UploadFile, VotingContext};

mod config;
mod replay;

use config::{load_settings, normalize_database_url, Settings};

/// Picture-voting sessions over a local SQLite store.
///
/// Every command prints one JSON document on stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "picvote", version)]
struct Cli {
    /// Settings file. Defaults to ./picvote.toml when it exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the configured database url.
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Signs in, creating the user on first use.
    SignIn {
        username: String,
        #[arg(long)]
        credential: Option<String>,
    },
    /// Creates a credentialed user.
    SignUp {
        username: String,
        #[arg(long)]
        credential: String,
    },
    ResetCredential {
        user_id: i64,
        #[arg(long)]
        current: Option<String>,
        #[arg(long = "new")]
        new_credential: String,
    },
    CreateSession {
        user_id: i64,
        name: String,
    },
    /// Lists every session, or only those hosted by one user.
    Sessions {
        #[arg(long)]
        hosted_by: Option<i64>,
    },
    Join {
        user_id: i64,
        #[arg(value_parser = parse_session_id)]
        session_id: SessionId,
    },
    /// Uploads image files into a session the user hosts.
    Upload {
        user_id: i64,
        #[arg(value_parser = parse_session_id)]
        session_id: SessionId,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    Images {
        #[arg(value_parser = parse_session_id)]
        session_id: SessionId,
    },
    /// Writes a stored image's bytes to a file.
    ExportImage {
        image_id: i64,
        #[arg(long)]
        out: PathBuf,
    },
    /// Casts the user's one vote in a session they have joined.
    Vote {
        user_id: i64,
        #[arg(value_parser = parse_session_id)]
        session_id: SessionId,
        image_id: i64,
    },
    HasVoted {
        user_id: i64,
        #[arg(value_parser = parse_session_id)]
        session_id: SessionId,
    },
    Tally {
        #[arg(value_parser = parse_session_id)]
        session_id: SessionId,
    },
    /// Reads JSON-lines requests from a file (or stdin) and answers each one.
    Replay {
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(database_url) = cli.database_url.clone() {
        settings.database_url = database_url;
    }
    init_tracing(&settings);

    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::connect(&database_url, settings.max_connections)
        .await
        .with_context(|| format!("failed to open store at '{database_url}'"))?;
    info!(%database_url, auth_mode = ?settings.auth_mode, "store ready");

    let ctx = VotingContext::new(Arc::new(storage), settings.voting_config());
    run(cli.command, ctx, &mut io::stdout()).await
}

fn init_tracing(settings: &Settings) {
    let filter =
        EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(command: Command, ctx: VotingContext, out: &mut impl Write) -> Result<()> {
    match command {
        Command::SignIn {
            username,
            credential,
        } => {
            let user_id = ctx
                .directory
                .register_or_authenticate(&username, credential.as_deref())
                .await
                .map_err(ApiException::from)?;
            emit(out, &ServerResponse::SignedIn { user_id })
        }
        Command::SignUp {
            username,
            credential,
        } => {
            let user_id = ctx
                .directory
                .sign_up(&username, &credential)
                .await
                .map_err(ApiException::from)?;
            emit(out, &ServerResponse::SignedIn { user_id })
        }
        Command::ResetCredential {
            user_id,
            current,
            new_credential,
        } => {
            ctx.directory
                .reset_credential(UserId(user_id), current.as_deref(), &new_credential)
                .await
                .map_err(ApiException::from)?;
            emit(out, &json!({ "user_id": user_id, "credential_reset": true }))
        }
        Command::CreateSession { user_id, name } => {
            let session_id = ctx
                .registry
                .create_session(&name, UserId(user_id))
                .await
                .map_err(ApiException::from)?;
            emit(out, &ServerResponse::SessionCreated { session_id })
        }
        Command::Sessions { hosted_by } => {
            let sessions = match hosted_by {
                Some(host) => ctx.registry.sessions_hosted_by(UserId(host)).await,
                None => ctx.registry.list_active_sessions().await,
            }
            .map_err(ApiException::from)?;
            emit(out, &ServerResponse::Sessions { sessions })
        }
        Command::Join {
            user_id,
            session_id,
        } => {
            let view = ctx
                .registry
                .join_session(&session_id, UserId(user_id))
                .await
                .map_err(ApiException::from)?;
            emit(
                out,
                &ServerResponse::Joined {
                    session: view.session,
                    participation: view.participation,
                },
            )
        }
        Command::Upload {
            user_id,
            session_id,
            files,
        } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(read_upload(path).await?);
            }
            let outcomes = ctx
                .gallery
                .upload_images(&session_id, UserId(user_id), uploads)
                .await
                .map_err(ApiException::from)?;
            emit(out, &ServerResponse::Uploaded { outcomes })
        }
        Command::Images { session_id } => {
            let images = ctx
                .gallery
                .list_images(&session_id)
                .await
                .map_err(ApiException::from)?;
            emit(out, &ServerResponse::Images { images })
        }
        Command::ExportImage {
            image_id,
            out: path,
        } => {
            let image = ctx
                .gallery
                .get_image_data(ImageId(image_id))
                .await
                .map_err(ApiException::from)?;
            tokio::fs::write(&path, &image.data)
                .await
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            emit(
                out,
                &json!({
                    "image_id": image.image_id,
                    "session_id": image.session_id,
                    "name": image.name,
                    "mime_type": image.mime_type,
                    "bytes": image.data.len(),
                    "path": path.display().to_string(),
                }),
            )
        }
        Command::Vote {
            user_id,
            session_id,
            image_id,
        } => {
            let (user_id, image_id) = (UserId(user_id), ImageId(image_id));
            ctx.registry
                .get_session(&session_id)
                .await
                .map_err(ApiException::from)?;
            let joined = ctx
                .registry
                .is_member(&session_id, user_id)
                .await
                .map_err(ApiException::from)?;
            if !joined {
                return Err(ApiException::new(
                    ErrorCode::Validation,
                    format!("join session {session_id} before voting"),
                )
                .into());
            }
            ctx.ledger
                .cast_vote(user_id, &session_id, image_id)
                .await
                .map_err(ApiException::from)?;
            emit(
                out,
                &ServerResponse::VoteRecorded {
                    session_id,
                    image_id,
                },
            )
        }
        Command::HasVoted {
            user_id,
            session_id,
        } => {
            let choice = ctx
                .ledger
                .vote_of(UserId(user_id), &session_id)
                .await
                .map_err(ApiException::from)?;
            emit(
                out,
                &json!({
                    "user_id": user_id,
                    "session_id": session_id,
                    "has_voted": choice.is_some(),
                    "image_id": choice,
                }),
            )
        }
        Command::Tally { session_id } => {
            let results = ctx
                .ledger
                .results(&session_id)
                .await
                .map_err(ApiException::from)?;
            emit(out, &ServerResponse::Results { results })
        }
        Command::Replay { input } => {
            let mut dispatcher = Dispatcher::new(ctx);
            let stats = match input {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("failed to open '{}'", path.display()))?;
                    replay::replay(&mut dispatcher, BufReader::new(file), out).await?
                }
                None => {
                    let stdin = BufReader::new(tokio::io::stdin());
                    replay::replay(&mut dispatcher, stdin, out).await?
                }
            };
            if stats.handled == 0 {
                bail!("replay input contained no requests");
            }
            Ok(())
        }
    }
}

async fn read_upload(path: &Path) -> Result<UploadFile> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("'{}' has no file name", path.display()))?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let mime_type = mime_guess::from_path(path).first_raw();
    Ok(UploadFile::new(name, data, mime_type))
}

fn parse_session_id(raw: &str) -> std::result::Result<SessionId, String> {
    SessionId::from_input(raw).ok_or_else(|| format!("'{raw}' is not a session id"))
}

fn emit(out: &mut impl Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to write output")?;
    writeln!(out).context("failed to write output")?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
