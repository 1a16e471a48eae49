use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use expander_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use expander_contracts::events::EventWriter;
use expander_contracts::ratio::AspectRatio;
use expander_contracts::session::{CredentialState, SessionStatus, SessionView};
use expander_engine::codec::{decode_data_uri, extension_for_mime};
use expander_engine::{
    ApiKey, EngineConfig, GeminiProvider, GenerateOutcome, Session, SessionBuilder,
    SharedCredentials, SkipReason, UploadSource,
};

#[derive(Debug, Parser)]
#[command(
    name = "expander",
    version,
    about = "Expand a photo's background to a new aspect ratio"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Run(RunArgs),
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    image_size: Option<String>,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value = "1:1")]
    ratio: AspectRatio,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    prompt: Option<String>,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long, default_value = "1:1")]
    ratio: AspectRatio,
    #[command(flatten)]
    engine: EngineArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("expander error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_once(args),
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
    }
}

struct SessionHost {
    session: Session,
    credentials: SharedCredentials,
    model: String,
}

fn build_session(args: &EngineArgs, ratio: AspectRatio) -> Result<SessionHost> {
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(image_size) = &args.image_size {
        config.image_size = image_size.clone();
    }
    let config = config.normalized();

    let credentials = SharedCredentials::from_flag_or_env(args.api_key.as_deref());
    let provider = GeminiProvider::new(&config);
    let model = provider.model().to_string();
    let mut builder =
        SessionBuilder::new(Arc::new(provider), Arc::new(credentials.clone())).ratio(ratio);
    if let Some(path) = &args.events {
        builder = builder.events(EventWriter::new(path, uuid::Uuid::new_v4().to_string()));
    }
    Ok(SessionHost {
        session: builder.build(),
        credentials,
        model,
    })
}

fn run_once(args: RunArgs) -> Result<i32> {
    let SessionHost { session, model, .. } = build_session(&args.engine, args.ratio)?;
    session.set_guidance(args.prompt.clone());

    if session.upload(UploadSource::Path(args.image.clone())) == SessionStatus::Error {
        eprintln!("{}", session.view().error.unwrap_or_default());
        return Ok(1);
    }

    match session.generate() {
        GenerateOutcome::Completed(SessionStatus::Success) => {
            let written = save_result(&session, &args.out)?;
            println!("Saved {} ({}, {model})", written.display(), args.ratio);
            Ok(0)
        }
        GenerateOutcome::Completed(_) | GenerateOutcome::Superseded => {
            eprintln!("{}", session.view().error.unwrap_or_default());
            Ok(1)
        }
        GenerateOutcome::Skipped(reason) => {
            eprintln!("{}", skip_reason_text(reason));
            Ok(2)
        }
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let SessionHost {
        session,
        credentials,
        model,
    } = build_session(&args.engine, args.ratio)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    println!(
        "Expander chat started (session {}, model {model}). Type /help for commands.",
        session.id()
    );
    if let Some(path) = session.events().path() {
        println!("Logging events to {}", path.display());
    }

    loop {
        print!("> ");
        stdout.flush()?;

        line.clear();
        let read = match stdin.lock().read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if apply_intent(&session, &credentials, &intent, &mut stdout)? == ChatFlow::Quit {
            break;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatFlow {
    Continue,
    Quit,
}

fn apply_intent(
    session: &Session,
    credentials: &SharedCredentials,
    intent: &Intent,
    out: &mut impl Write,
) -> Result<ChatFlow> {
    match intent.action.as_str() {
        "noop" => {}
        "quit" => return Ok(ChatFlow::Quit),
        "help" => {
            writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
        }
        "upload" => match intent.arg("path") {
            Some(path) => {
                let status = session.upload(UploadSource::Path(PathBuf::from(path)));
                if status == SessionStatus::Error {
                    writeln!(out, "{}", session.view().error.unwrap_or_default())?;
                } else {
                    writeln!(out, "Loaded {path}")?;
                }
            }
            None => writeln!(out, "/upload requires a path")?,
        },
        "select_ratio" => match intent.arg("ratio").map(str::parse::<AspectRatio>) {
            Some(Ok(ratio)) => {
                if session.select_ratio(ratio) {
                    writeln!(out, "Ratio set to {ratio}")?;
                } else {
                    writeln!(out, "Ratio is locked while generating.")?;
                }
            }
            Some(Err(err)) => writeln!(out, "{err}")?,
            None => writeln!(out, "Ratio is {}", session.ratio())?,
        },
        "set_prompt" => {
            let text = intent.arg("text").map(str::to_string);
            let cleared = text.is_none();
            session.set_guidance(text);
            if cleared {
                writeln!(out, "Guidance cleared.")?;
            } else {
                writeln!(out, "Guidance set.")?;
            }
        }
        "set_key" => {
            if let Some(raw) = intent.arg("key") {
                credentials.set(ApiKey::new(raw));
            }
            if session.request_credential() {
                writeln!(out, "API key ready.")?;
            } else {
                writeln!(out, "No API key available. Use /key <value> or set GEMINI_API_KEY.")?;
            }
        }
        "generate" => {
            writeln!(out, "Expanding to {}...", session.ratio())?;
            match session.generate() {
                GenerateOutcome::Completed(SessionStatus::Success) => {
                    writeln!(out, "Done. Use /save <path> to write the result.")?;
                }
                GenerateOutcome::Completed(_) => {
                    writeln!(out, "{}", session.view().error.unwrap_or_default())?;
                }
                GenerateOutcome::Skipped(reason) => {
                    writeln!(out, "{}", skip_reason_text(reason))?;
                }
                GenerateOutcome::Superseded => {
                    writeln!(out, "Result dropped; the session changed while generating.")?;
                }
            }
        }
        "discard_result" => {
            if session.discard_result() {
                writeln!(out, "Result discarded. Pick a ratio and /generate again.")?;
            } else {
                writeln!(out, "No result to discard.")?;
            }
        }
        "reset" => {
            session.reset();
            writeln!(out, "Session reset.")?;
        }
        "save" => match intent.arg("path") {
            Some(path) => {
                if session.generated_image().is_none() {
                    writeln!(out, "Nothing to save yet.")?;
                } else {
                    match save_result(session, Path::new(path)) {
                        Ok(written) => writeln!(out, "Saved {}", written.display())?,
                        Err(err) => writeln!(out, "Save failed: {err:#}")?,
                    }
                }
            }
            None => writeln!(out, "/save requires a path")?,
        },
        "status" => {
            writeln!(out, "{}", describe_view(&session.view()))?;
        }
        _ => {
            let command = intent.arg("command").unwrap_or_default();
            writeln!(out, "Unknown command /{command}. Type /help for commands.")?;
        }
    }
    Ok(ChatFlow::Continue)
}

fn skip_reason_text(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::NoImage => "Upload an image first.",
        SkipReason::AlreadyGenerating => "A generation is already running.",
        SkipReason::NeedsCredential => "Please select your API key again (/key <value>).",
    }
}

fn describe_view(view: &SessionView) -> String {
    let mut lines = vec![
        format!("status: {}", view.status.as_str()),
        format!("ratio: {}", view.ratio),
        format!(
            "credential: {}",
            match view.credential {
                CredentialState::Ready => "ready",
                CredentialState::NeedsCredential => "needs key",
            }
        ),
    ];
    match (&view.original_name, view.original_dimensions) {
        (Some(name), Some((width, height))) => {
            lines.push(format!("original: {name} ({width}x{height})"));
        }
        (Some(name), None) => lines.push(format!("original: {name}")),
        _ => lines.push("original: none".to_string()),
    }
    if let Some((width, height)) = view.preview_frame {
        lines.push(format!("frame: {width}x{height}"));
    }
    if view.generation_in_flight {
        lines.push("generation: in flight".to_string());
    }
    if let Some(uri) = &view.generated_image {
        lines.push(format!("result: {} chars of data URI", uri.len()));
    }
    if let Some(error) = &view.error {
        lines.push(format!("error: {error}"));
    }
    lines.join("\n")
}

/// Writes the current result. A path without an extension gets one from the
/// result's mime type.
fn save_result(session: &Session, out: &Path) -> Result<PathBuf> {
    let image = session
        .generated_image()
        .context("session has no generated image")?;
    let (mime_type, bytes) = decode_data_uri(&image.data_uri)?;
    let path = if out.extension().is_some() {
        out.to_path_buf()
    } else {
        out.with_extension(extension_for_mime(&mime_type))
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
