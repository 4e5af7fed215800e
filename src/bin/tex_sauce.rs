//! CLI binary for tex-sauce.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tex_sauce::config::AppConfig;
use tex_sauce::cue::{SoundCue, default_cue};
use tex_sauce::gemini::GeminiClient;
use tex_sauce::intake::{
    IncomingFile, IntakeReport, PageRasterizer, PdftoppmRasterizer, UnavailableRasterizer,
};
use tex_sauce::prompts::{Confirmation, ImportStrategy, PromptStore};
use tex_sauce::storage::{FileStore, KeyValueStore};
use tex_sauce::{GenerateOutcome, Orchestrator, Session, Settings, app_dirs, render};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// TeX Sauce: convert photos and scans of math into LaTeX.
#[derive(Parser)]
#[command(name = "tex-sauce", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Convert images or PDFs in one shot.
    Generate {
        /// Image or PDF files, in the order the prompt refers to them.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Template id to use instead of the selected one.
        #[arg(long)]
        prompt: Option<String>,
        /// Additional instructions appended to the prompt.
        #[arg(long)]
        extra: Option<String>,
        /// Also write the highlighted output as an HTML page.
        #[arg(long)]
        html: Option<PathBuf>,
        /// Print the output without terminal colors.
        #[arg(long)]
        plain: bool,
    },
    /// Show or change the API settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Manage prompt templates.
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },
    /// Interactive session (default).
    Shell,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings with the key masked.
    Show,
    /// Store new settings.
    Set {
        /// Gemini API key.
        #[arg(long)]
        api_key: String,
        /// Model name; keeps the current one when omitted.
        #[arg(long)]
        model: Option<String>,
        /// Play a sound when a generation completes.
        #[arg(long)]
        sound: Option<bool>,
    },
}

#[derive(Subcommand)]
enum PromptsAction {
    /// List templates; the selected one is starred.
    List,
    /// Print one template.
    Show { id: String },
    /// Add a template and select it.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        content: String,
    },
    /// Replace a template's name and content.
    Update {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        content: String,
    },
    /// Delete a template.
    Delete {
        id: String,
        /// Skip the confirmation question.
        #[arg(long)]
        yes: bool,
    },
    /// Select the template used for generation.
    Select { id: String },
    /// Write all templates to a JSON file.
    Export {
        /// Target directory.
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
    /// Load templates from a JSON file.
    Import {
        path: PathBuf,
        /// `replace` or `append`.
        #[arg(long)]
        strategy: ImportStrategy,
    },
}

/// Shared state for every command.
struct App {
    config: AppConfig,
    store: Arc<dyn KeyValueStore>,
    settings: Settings,
    prompts: PromptStore,
}

impl App {
    fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::load_or_default(&app_dirs::config_file())?,
        };
        let storage_path = app_dirs::storage_file();
        let store: Arc<dyn KeyValueStore> = Arc::new(
            FileStore::open(&storage_path)
                .with_context(|| format!("opening {}", storage_path.display()))?,
        );
        let settings = Settings::load(store.as_ref())?;
        let prompts = PromptStore::load(Arc::clone(&store))?;
        Ok(Self {
            config,
            store,
            settings,
            prompts,
        })
    }

    fn orchestrator(&self) -> Orchestrator {
        let rasterizer: Arc<dyn PageRasterizer> =
            match PdftoppmRasterizer::discover(self.config.intake.pdftoppm_path.as_deref()) {
                Ok(r) => {
                    info!(binary = %r.binary().display(), "using pdftoppm for PDFs");
                    Arc::new(r)
                }
                Err(e) => {
                    warn!("PDF input disabled: {e}");
                    Arc::new(UnavailableRasterizer::new(e.message()))
                }
            };
        let cue: Arc<dyn SoundCue> = Arc::from(default_cue());
        Orchestrator::new(
            Arc::new(GeminiClient::new(&self.config.api)),
            rasterizer,
            cue,
        )
    }

    fn print_output(&self, text: &str, plain: bool) {
        if plain {
            println!("{text}");
        } else {
            let nodes = render::render(
                text,
                &self.config.render.language,
                &self.config.render.theme,
            );
            println!("{}", render::to_ansi(&nodes));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging();
    let cli = Cli::parse();
    let mut app = App::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Shell) {
        Command::Generate {
            files,
            prompt,
            extra,
            html,
            plain,
        } => run_generate(&app, files, prompt, extra, html, plain).await,
        Command::Settings { action } => run_settings(&mut app, action),
        Command::Prompts { action } => run_prompts(&mut app, action),
        Command::Shell => run_shell(&mut app).await,
    }
}

/// Log to stderr and to a daily file under the data dir.
///
/// The returned guard must live until exit so buffered file lines are flushed.
fn init_logging() -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tex_sauce=info,warn"))
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let logs_dir = app_dirs::logs_dir();
    if std::fs::create_dir_all(&logs_dir).is_err() {
        tracing_subscriber::registry().with(stderr_layer).init();
        return None;
    }
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&logs_dir, "tex-sauce.log"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(filter());
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Some(guard)
}

async fn run_generate(
    app: &App,
    files: Vec<PathBuf>,
    prompt: Option<String>,
    extra: Option<String>,
    html: Option<PathBuf>,
    plain: bool,
) -> anyhow::Result<()> {
    let template = match prompt.as_deref() {
        Some(id) => Some(
            app.prompts
                .get(id)
                .with_context(|| format!("no prompt with id '{id}'"))?,
        ),
        None => app.prompts.selected(),
    };
    let mut session = Session::new(&app.config.intake, template);
    if let Some(extra) = extra.as_deref() {
        session.set_addendum(extra);
    }

    let orchestrator = app.orchestrator();
    let files = files.iter().map(IncomingFile::from_path).collect();
    let report = orchestrator.accept_files(&mut session, files).await;
    print_report(&report);

    match orchestrator.generate(&mut session, &app.settings).await {
        GenerateOutcome::Completed { text } => {
            app.print_output(&text, plain);
            if let Some(path) = html {
                write_html(app, &text, &path)?;
                eprintln!("HTML written to {}", path.display());
            }
            Ok(())
        }
        GenerateOutcome::Failed { auth_hint, .. } => {
            if auth_hint {
                eprintln!("The API key looks invalid. Check it with `tex-sauce settings set`.");
            }
            bail!("{}", session.output())
        }
        other => bail!(describe_refusal(&other)),
    }
}

fn write_html(app: &App, text: &str, path: &Path) -> anyhow::Result<()> {
    let nodes = render::render(text, &app.config.render.language, &app.config.render.theme);
    std::fs::write(path, render::html_page(&nodes, "TeX Sauce output"))
        .with_context(|| format!("writing {}", path.display()))
}

fn describe_refusal(outcome: &GenerateOutcome) -> &'static str {
    match outcome {
        GenerateOutcome::AlreadyRunning => "a generation is already running",
        GenerateOutcome::NeedsSettings => {
            "no API key configured; run `tex-sauce settings set --api-key <KEY>`"
        }
        GenerateOutcome::NoImages => "no images to send",
        GenerateOutcome::NoTemplate => "no prompt template selected",
        GenerateOutcome::Completed { .. } | GenerateOutcome::Failed { .. } => "",
    }
}

fn print_report(report: &IntakeReport) {
    for notice in &report.notices {
        eprintln!("{notice}");
    }
    if !report.added.is_empty() {
        eprintln!("{} image(s) added", report.added.len());
    }
}

fn run_settings(app: &mut App, action: SettingsAction) -> anyhow::Result<()> {
    match action {
        SettingsAction::Show => {
            let key = if app.settings.has_api_key() {
                app.settings.masked_api_key()
            } else {
                "(not set)".to_owned()
            };
            println!("api key: {key}");
            println!("model:   {}", app.settings.model);
            println!("sound:   {}", if app.settings.sound_enabled { "on" } else { "off" });
        }
        SettingsAction::Set {
            api_key,
            model,
            sound,
        } => {
            let model = model.unwrap_or_else(|| app.settings.model.clone());
            let sound = sound.unwrap_or(app.settings.sound_enabled);
            app.settings = Settings::save(app.store.as_ref(), &api_key, &model, sound)?;
            println!("Settings saved.");
        }
    }
    Ok(())
}

fn run_prompts(app: &mut App, action: PromptsAction) -> anyhow::Result<()> {
    let prompts = &mut app.prompts;
    match action {
        PromptsAction::List => {
            let selected = prompts.selected_id().map(str::to_owned);
            for template in prompts.templates() {
                let mark = if selected.as_deref() == Some(template.id.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!("{mark} {}  {}", template.id, template.name);
            }
        }
        PromptsAction::Show { id } => {
            let template = prompts
                .get(&id)
                .with_context(|| format!("no prompt with id '{id}'"))?;
            println!("# {}\n\n{}", template.name, template.content);
        }
        PromptsAction::Create { name, content } => {
            let template = prompts.create(&name, &content)?;
            println!("Created {}", template.id);
        }
        PromptsAction::Update { id, name, content } => {
            prompts.update(&id, &name, &content)?;
            println!("Updated {id}");
        }
        PromptsAction::Delete { id, yes } => {
            let confirmation = if yes || confirm(&format!("Delete prompt '{id}'?"))? {
                Confirmation::Confirmed
            } else {
                Confirmation::Declined
            };
            if prompts.delete(&id, confirmation)? {
                println!("Deleted {id}");
            } else {
                println!("Nothing deleted.");
            }
        }
        PromptsAction::Select { id } => {
            let template = prompts.select(&id)?;
            println!("Selected {}", template.name);
        }
        PromptsAction::Export { output } => {
            let path = prompts.export_to_dir(&output, chrono::Local::now().date_naive())?;
            println!("Exported to {}", path.display());
        }
        PromptsAction::Import { path, strategy } => {
            if strategy == ImportStrategy::Replace
                && !confirm("Replace all current prompts with the imported ones?")?
            {
                println!("Import cancelled.");
                return Ok(());
            }
            let document = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let count = prompts.import(&document, strategy)?;
            println!("Imported {count} prompt(s).");
        }
    }
    Ok(())
}

/// Ask a yes/no question on the terminal; anything but `y`/`yes` is no.
fn confirm(question: &str) -> anyhow::Result<bool> {
    use std::io::Write;

    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

const SHELL_HELP: &str = "\
commands:
  add <paths...>     add images or PDFs (starts a fresh batch after a result)
  remove <n|id>      remove a pending image
  images             list pending images
  prompt [id]        show or select the prompt template
  edit <text>        replace the prompt text (saved automatically)
  edit               same, reading several lines up to a lone `.`
  extra [text]       set or clear additional instructions
  generate           send the pending images
  regenerate         send them again with the current instructions
  output             print the last output
  help               show this help
  quit               leave";

async fn run_shell(app: &mut App) -> anyhow::Result<()> {
    println!("TeX Sauce v{}. Type `help` for commands.", env!("CARGO_PKG_VERSION"));
    if !app.settings.has_api_key() {
        println!("No API key yet: run `tex-sauce settings set --api-key <KEY>` first.");
    }

    let orchestrator = app.orchestrator();
    let mut session = Session::new(&app.config.intake, app.prompts.selected());
    let autosaver = app
        .prompts
        .autosaver(Duration::from_millis(app.config.prompts.autosave_debounce_ms));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt_marker(&session, &app.settings);
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "" => {}
            "help" => println!("{SHELL_HELP}"),
            "quit" | "exit" => break,
            "add" => {
                let files: Vec<IncomingFile> =
                    rest.split_whitespace().map(IncomingFile::from_path).collect();
                if files.is_empty() {
                    println!("usage: add <paths...>");
                    continue;
                }
                let report = orchestrator.accept_files(&mut session, files).await;
                print_report(&report);
            }
            "remove" => {
                let id = rest
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| session.images().get(i))
                    .map(|img| img.id.clone())
                    .unwrap_or_else(|| rest.to_owned());
                if !session.remove_image(&id) {
                    println!("no such image: {rest}");
                }
            }
            "images" => {
                if session.images().is_empty() {
                    println!("(no images)");
                }
                for (n, img) in session.images().iter().enumerate() {
                    println!("{}. {}  {} ({})", n + 1, img.id, img.source.name, img.mime_type);
                }
            }
            "prompt" if rest.is_empty() => match app.prompts.selected() {
                Some(t) => println!(
                    "[{}] {}\n{}",
                    t.id,
                    t.name,
                    session.display_prompt().unwrap_or_default()
                ),
                None => println!("(no prompt templates)"),
            },
            "prompt" => match app.prompts.select(rest) {
                Ok(template) => {
                    println!("Selected {}", template.name);
                    session.set_template(Some(template));
                }
                Err(e) => println!("{e}"),
            },
            "edit" => {
                if app.prompts.selected().is_none() {
                    println!("(no prompt template selected)");
                    continue;
                }
                let text = if rest.is_empty() {
                    println!("Enter the prompt text; finish with a line containing only `.`");
                    read_block(&mut lines).await?
                } else {
                    rest.to_owned()
                };
                app.prompts.edit_selected_content(&text);
                session.edit_display_prompt(&text);
                match app.prompts.snapshot() {
                    Ok(snapshot) => autosaver.schedule(snapshot),
                    Err(e) => warn!("could not snapshot prompts: {e}"),
                }
            }
            "extra" => session.set_addendum(rest),
            "generate" | "regenerate" => {
                let outcome = if command == "generate" {
                    orchestrator.generate(&mut session, &app.settings).await
                } else {
                    orchestrator.regenerate(&mut session, &app.settings).await
                };
                match outcome {
                    GenerateOutcome::Completed { text } => app.print_output(&text, false),
                    GenerateOutcome::Failed { auth_hint, .. } => {
                        println!("{}", session.output());
                        if auth_hint {
                            println!("The API key looks invalid. Update it with `tex-sauce settings set`.");
                        }
                    }
                    other => println!("{}", describe_refusal(&other)),
                }
            }
            "output" => {
                if session.copy_available() {
                    app.print_output(session.output(), false);
                } else if session.output().is_empty() {
                    println!("(no output yet)");
                } else {
                    println!("{}", session.output());
                }
            }
            other => println!("unknown command `{other}`; type `help`"),
        }
    }

    autosaver.shutdown().await;
    Ok(())
}

/// Collect lines until one that is just `.` (or end of input).
async fn read_block<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> std::io::Result<String> {
    let mut block = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim_end() == "." {
            break;
        }
        block.push(line);
    }
    Ok(block.join("\n"))
}

fn print_prompt_marker(session: &Session, settings: &Settings) {
    use std::io::Write;

    let ready = if session.can_generate(settings) { "ready" } else { "-" };
    print!("tex-sauce [{} img, {ready}]> ", session.images().len());
    let _ = std::io::stdout().flush();
}
