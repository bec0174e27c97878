use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use studio_core::codec::{data_url_to_file, extension_for_mime, ImageFile};
use studio_core::config::{data_dir_from_env, GatewayConfig};
use studio_core::gemini::GeminiClient;
use studio_core::prompts::STYLE_PRESETS;
use studio_core::protocol::{HistoryItem, Language, StyleTheme, Theme};
use studio_core::storage::{FileStore, Prefs};
use studio_core::studio::{Studio, StudioEvent};
use studio_core::suggestions::{SuggestionEvent, SuggestionImageState};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "tryon", about = "Virtual try-on studio")]
struct Args {
    /// Directory holding persisted state (defaults to $TRYON_DATA_DIR or ./.tryon).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    text_model: Option<String>,

    #[arg(long, global = true)]
    image_model: Option<String>,

    #[arg(long, global = true, value_name = "PATH")]
    api_key_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite the person photo with the clothing photo.
    TryOn {
        #[command(flatten)]
        uploads: Uploads,

        #[arg(long)]
        remove_background: Option<bool>,

        #[arg(long, value_parser = parse_style)]
        style: Option<StyleTheme>,

        /// Where to write the result (defaults to virtual-try-on.<ext>).
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Ask the stylist for outfit ideas and render one image per idea.
    Suggest {
        #[arg(long, required_unless_present = "preset", conflicts_with = "preset")]
        prompt: Option<String>,

        /// Index into the built-in style presets.
        #[arg(long)]
        preset: Option<usize>,

        #[arg(long)]
        colors: Option<String>,

        /// Use this suggestion's image as the clothing photo.
        #[arg(long)]
        pick: Option<usize>,

        /// Write every rendered suggestion into this directory.
        #[arg(long, value_name = "DIR")]
        save_dir: Option<PathBuf>,
    },
    #[command(subcommand)]
    History(HistoryCommand),
    #[command(subcommand)]
    Session(SessionCommand),
    /// Clear current uploads and result (history and saved session are kept).
    Reset,
    /// Show or change persisted preferences.
    Prefs {
        #[arg(long, value_parser = parse_theme, conflicts_with = "toggle_theme")]
        theme: Option<Theme>,

        #[arg(long)]
        toggle_theme: bool,

        #[arg(long, value_parser = parse_language)]
        language: Option<Language>,

        #[arg(long)]
        remove_background: Option<bool>,

        #[arg(long, value_parser = parse_style)]
        style: Option<StyleTheme>,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    List,
    Show { id: String },
    Delete { id: String },
    /// Write an entry's result image to disk.
    Export {
        id: String,
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    Save {
        #[command(flatten)]
        uploads: Uploads,
    },
    Load,
    Show,
}

#[derive(ClapArgs, Debug, Default)]
struct Uploads {
    #[arg(long, value_name = "PATH")]
    person: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    clothing: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut studio = open_studio(&args)?;

    match args.command {
        Command::TryOn {
            uploads,
            remove_background,
            style,
            out,
        } => {
            enter_editor(&mut studio, &uploads).await?;
            if let Some(on) = remove_background {
                studio.set_remove_background(on);
            }
            if let Some(style) = style {
                studio.set_style_theme(style);
            }

            let printer = spawn_progress(&mut studio);
            let outcome = studio.try_on().await;
            studio.unsubscribe();
            printer.await.ok();
            outcome?;

            let file = studio.share_result()?;
            let path = out.unwrap_or_else(|| PathBuf::from(&file.name));
            write_image(&path, &file)?;
            eprintln!("result written to {}", path.display());
        }

        Command::Suggest {
            prompt,
            preset,
            colors,
            pick,
            save_dir,
        } => {
            let prompt = match (prompt, preset) {
                (Some(p), _) => p,
                (None, Some(i)) => STYLE_PRESETS
                    .get(i)
                    .map(|p| p.to_string())
                    .ok_or_else(|| {
                        anyhow::anyhow!("preset {i} out of range (0..{})", STYLE_PRESETS.len())
                    })?,
                (None, None) => anyhow::bail!("missing --prompt or --preset"),
            };

            enter_editor(&mut studio, &Uploads::default()).await?;
            let printer = spawn_progress(&mut studio);
            let outcome = pick_while_rendering(&mut studio, &prompt, colors.as_deref(), pick).await;
            studio.unsubscribe();
            printer.await.ok();
            let picked = outcome?;

            let batch = studio.suggestions();
            for (id, s) in batch.suggestions().iter().enumerate() {
                let mark = match batch.state(id) {
                    SuggestionImageState::Ready(_) => "ready",
                    SuggestionImageState::Failed => "failed",
                    SuggestionImageState::Pending => "pending",
                    SuggestionImageState::NotStarted => "-",
                };
                println!("[{id}] {} ({mark})\n    {}", s.name, s.description);
            }

            if let Some(dir) = save_dir {
                std::fs::create_dir_all(&dir)?;
                for id in 0..batch.suggestions().len() {
                    if let Some(img) = batch.ready_image(id) {
                        write_image(&dir.join(&img.file.name), &img.file)?;
                    }
                }
                eprintln!("suggestion images written to {}", dir.display());
            }

            if let Some(id) = pick.filter(|_| !picked) {
                studio.select_suggestion(id)?;
            }
        }

        Command::History(cmd) => match cmd {
            HistoryCommand::List => {
                if studio.history().is_empty() {
                    eprintln!("history is empty");
                }
                for item in studio.history() {
                    print_history_item(item);
                }
            }
            HistoryCommand::Show { id } => {
                studio.view_history()?;
                let item = studio.open_history_item(&id)?;
                print_history_item(item);
                println!("{}", serde_json::to_string_pretty(item)?);
            }
            HistoryCommand::Delete { id } => {
                studio.view_history()?;
                studio.request_delete(&id)?;
                let removed = studio
                    .confirm_delete()
                    .ok_or_else(|| anyhow::anyhow!("history item {id} vanished"))?;
                eprintln!("deleted {}", removed.id);
            }
            HistoryCommand::Export { id, out } => {
                studio.view_history()?;
                let item = studio.open_history_item(&id)?;
                let file = data_url_to_file(&item.result_preview, "result")
                    .ok_or_else(|| anyhow::anyhow!("history item {id} has no readable image"))?;
                let path = out.unwrap_or_else(|| {
                    PathBuf::from(format!("{id}.{}", extension_for_mime(&file.mime_type)))
                });
                write_image(&path, &file)?;
                eprintln!("exported to {}", path.display());
            }
        },

        Command::Session(cmd) => match cmd {
            SessionCommand::Save { uploads } => {
                enter_editor(&mut studio, &uploads).await?;
                studio.save_session()?;
                eprintln!("session saved");
            }
            SessionCommand::Load => {
                studio.load_saved_session()?;
                print_editor(&studio);
            }
            SessionCommand::Show => match studio.saved_session() {
                Some(s) => {
                    println!("remove_background: {}", s.remove_background);
                    println!("style: {}", s.style_theme.as_str());
                    println!("person: {} chars", s.person_image.len());
                    println!("clothing: {} chars", s.clothing_image.len());
                }
                None => eprintln!("no saved session"),
            },
        },

        Command::Reset => {
            studio.reset();
            eprintln!("uploads and result cleared");
        }

        Command::Prefs {
            theme,
            toggle_theme,
            language,
            remove_background,
            style,
        } => {
            if let Some(t) = theme {
                studio.set_theme(t);
            }
            if toggle_theme {
                studio.toggle_theme();
            }
            if let Some(l) = language {
                studio.set_language(l);
            }
            if let Some(on) = remove_background {
                studio.set_remove_background(on);
            }
            if let Some(s) = style {
                studio.set_style_theme(s);
            }
            println!("theme: {:?}", studio.theme());
            println!("language: {}", studio.language().code());
            println!("remove_background: {}", studio.remove_background());
            println!("style: {}", studio.style_theme().as_str());
            println!("history entries: {}", studio.history().len());
            println!("saved session: {}", studio.can_load_saved_session());
        }
    }

    Ok(())
}

fn open_studio(args: &Args) -> anyhow::Result<Studio<GeminiClient>> {
    let mut config = GatewayConfig::from_env();
    if let Some(path) = args.api_key_file.as_deref() {
        let key = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read api key file {}: {e}", path.display()))?;
        config.api_key = Some(Zeroizing::new(key.trim().to_string()));
    }
    if let Some(m) = args.text_model.as_deref() {
        config.text_model = m.trim().to_string();
    }
    if let Some(m) = args.image_model.as_deref() {
        config.image_model = m.trim().to_string();
    }

    let data_dir = args.data_dir.clone().unwrap_or_else(data_dir_from_env);
    let store = FileStore::open(&data_dir)
        .map_err(|e| anyhow::anyhow!("failed to open data dir {}: {e}", data_dir.display()))?;

    let gateway = GeminiClient::new(config)?;
    tracing::debug!(
        data_dir = %store.dir().display(),
        config = ?gateway.config(),
        "opening studio"
    );
    Ok(Studio::open(gateway, Prefs::new(store)))
}

/// Moves to the editor, keeping restored uploads, then applies any new files.
async fn enter_editor(studio: &mut Studio<GeminiClient>, uploads: &Uploads) -> anyhow::Result<()> {
    if studio.can_resume() {
        studio.resume()?;
    } else {
        studio.start_new()?;
    }
    if let Some(path) = uploads.person.as_deref() {
        studio.upload_person(ImageFile::open(path).await?)?;
    }
    if let Some(path) = uploads.clothing.as_deref() {
        studio.upload_clothing(ImageFile::open(path).await?)?;
    }
    Ok(())
}

/// Runs a suggestion batch, selecting `pick` as soon as its tile is ready.
///
/// Returns whether the pick was applied before the batch finished.
async fn pick_while_rendering(
    studio: &mut Studio<GeminiClient>,
    prompt: &str,
    colors: Option<&str>,
    pick: Option<usize>,
) -> anyhow::Result<bool> {
    studio.start_suggestions(prompt, colors).await?;
    let mut picked = false;
    while let Some(event) = studio.next_suggestion().await {
        if let SuggestionEvent::Ready { id, .. } = event {
            if pick == Some(id) && !picked {
                studio.select_suggestion(id)?;
                picked = true;
                eprintln!(
                    "suggestion {id} is now the clothing photo ({} still rendering)",
                    studio.suggestions().pending_count()
                );
            }
        }
    }
    Ok(picked)
}

fn spawn_progress(studio: &mut Studio<GeminiClient>) -> tokio::task::JoinHandle<()> {
    let mut rx = studio.subscribe();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                StudioEvent::Loading { message, .. } => eprintln!("{message}"),
                StudioEvent::Suggestion(SuggestionEvent::Listed { count }) => {
                    eprintln!("{count} suggestion(s), rendering images...")
                }
                StudioEvent::Suggestion(SuggestionEvent::Ready { id, name, .. }) => {
                    eprintln!("  [{id}] {name}: ready")
                }
                StudioEvent::Suggestion(SuggestionEvent::Failed { id, name, error }) => {
                    eprintln!("  [{id}] {name}: failed ({error})")
                }
                StudioEvent::Error(msg) => eprintln!("error: {msg}"),
                StudioEvent::ViewChanged(view) => tracing::debug!(view = view.name(), "view"),
            }
        }
    })
}

fn print_editor(studio: &Studio<GeminiClient>) {
    let describe = |f: Option<&ImageFile>| {
        f.map(|f| format!("{} ({}, {} bytes)", f.name, f.mime_type, f.bytes.len()))
            .unwrap_or_else(|| "-".to_string())
    };
    println!("person: {}", describe(studio.person().map(|u| &u.file)));
    println!("clothing: {}", describe(studio.clothing().map(|u| &u.file)));
    println!("remove_background: {}", studio.remove_background());
    println!("style: {}", studio.style_theme().as_str());
}

fn print_history_item(item: &HistoryItem) {
    println!("{}  created_at_ms={}", item.id, item.created_at_ms);
}

fn write_image(path: &Path, file: &ImageFile) -> anyhow::Result<()> {
    std::fs::write(path, &file.bytes)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))
}

fn parse_style(s: &str) -> Result<StyleTheme, String> {
    StyleTheme::parse(s).ok_or_else(|| {
        let all: Vec<&str> = StyleTheme::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown style {s:?} (expected one of {})", all.join(", "))
    })
}

fn parse_language(s: &str) -> Result<Language, String> {
    Language::parse(s).ok_or_else(|| format!("unknown language {s:?} (en, es, pt, fr)"))
}

fn parse_theme(s: &str) -> Result<Theme, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "light" => Ok(Theme::Light),
        "dark" => Ok(Theme::Dark),
        _ => Err(format!("unknown theme {s:?} (light, dark)")),
    }
}
