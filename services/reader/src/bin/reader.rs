//! services/reader/src/bin/reader.rs

use archive_reader_core::{
    comments::count_replies, paginate, walk, ChapterPageData, CookieStore, HttpTransport,
    KeyValueStore, NavigationOutcome, Node, ReaderError, ReaderSession, SessionClient,
};
use clap::{Parser, Subcommand};
use reader_lib::{
    adapters::{JsonFileStore, PublicPageExtractor, ReqwestTransport},
    config::{Config, MARKERS_NESTING_NOTE},
    error::AppError,
    playback::speak_chapter,
    preferences::SettingsRepo,
    render::render_chapter_document,
    speech::{SpeechEngineFactory, SpeechProvider},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "reader", about = "Read archive works from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session cookies.
    Login {
        username: String,
        /// Falls back to ARCHIVE_PASSWORD.
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session.
    Logout,
    /// Print the logged-in user name.
    Whoami,
    /// Print a chapter, or write it as an HTML page.
    Read {
        url: String,
        /// Jump to this chapter of the work (1-based) after loading `url`.
        #[arg(long)]
        chapter: Option<usize>,
        /// Write a styled HTML document here instead of printing text.
        #[arg(long)]
        html: Option<PathBuf>,
        /// Highlight this paragraph (0-based) in the HTML output.
        #[arg(long)]
        highlight: Option<usize>,
    },
    /// Print one page of a chapter's comments.
    #[command(after_help = MARKERS_NESTING_NOTE)]
    Comments {
        url: String,
        /// 1-based page of root comments.
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Read a chapter aloud from a paragraph onwards.
    Speak {
        url: String,
        /// 0-based paragraph to start from.
        #[arg(long, default_value_t = 0)]
        from: usize,
        /// `local` or `gemini`; remembered for later runs.
        #[arg(long)]
        provider: Option<String>,
    },
    /// Show or change the typography used for HTML output.
    Prefs {
        #[arg(long)]
        font_size: Option<u32>,
        #[arg(long)]
        line_height: Option<u32>,
        #[arg(long)]
        padding: Option<u32>,
        #[arg(long)]
        paragraph_spacing: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded for {}", config.site.origin);

    // --- 2. Initialize Adapters ---
    let http: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(&config.user_agent, config.http_timeout)?);
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(&config.state_path));
    let cookies = CookieStore::new(store.clone());
    let client = Arc::new(SessionClient::new(http.clone(), cookies, config.site.clone()));
    let fallback = Arc::new(PublicPageExtractor::new(http.clone(), &config.site.origin));
    let reader = ReaderSession::new(client.clone(), fallback, config.comment_nesting);
    let settings = SettingsRepo::new(store);

    // --- 3. Run the Command ---
    match cli.command {
        Command::Login { username, password } => {
            let password = password
                .or_else(|| std::env::var("ARCHIVE_PASSWORD").ok())
                .ok_or_else(|| AppError::Internal("pass --password or set ARCHIVE_PASSWORD".to_string()))?;
            if !client.login(&username, &password).await? {
                return Err(ReaderError::AuthFailure.into());
            }
            match client.identity().await? {
                Some(name) => println!("Logged in as {}", name),
                None => println!("Logged in"),
            }
        }
        Command::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Command::Whoami => {
            let stored = client.cookies().session().await?;
            info!("{} cookies stored", stored.cookies.len());
            let logged_in = client.is_authenticated().await?;
            match client.identity().await? {
                Some(name) => println!("{}", name),
                None if logged_in => println!("(logged in, name unknown)"),
                None => println!("(not logged in)"),
            }
        }
        Command::Read {
            url,
            chapter,
            html,
            highlight,
        } => {
            open(&reader, &url).await?;
            if let Some(chapter) = chapter {
                let outcome = reader.go_to(chapter.saturating_sub(1)).await?;
                if outcome == NavigationOutcome::Unchanged {
                    warn!("Chapter {} is not part of this work", chapter);
                }
            }
            let state = reader.snapshot().await;
            match html {
                Some(path) => {
                    let prefs = settings.preferences().await?;
                    let page = ChapterPageData {
                        work_title: state.work_title,
                        chapter_title: state.chapter_title,
                        body_html: state.body_html,
                        sibling_chapters: state.chapters,
                    };
                    tokio::fs::write(&path, render_chapter_document(&page, &prefs, highlight)).await?;
                    println!("Wrote {}", path.display());
                }
                None => {
                    println!("{}\n{}\n", state.work_title, state.chapter_title);
                    for paragraph in &state.paragraphs {
                        println!("{}\n", paragraph);
                    }
                    if !state.chapters.is_empty() {
                        println!("-- chapter {} of {} --", state.index + 1, state.chapters.len());
                    }
                }
            }
        }
        Command::Comments { url, page } => {
            if let Some(note) = config.comment_nesting_warning() {
                warn!("{}", note);
            }
            let forest = match reader.try_load_comments(&url).await {
                Ok(forest) => forest,
                Err(e) => {
                    warn!("{}", e);
                    Vec::new()
                }
            };
            let shown = paginate(&forest, page.saturating_sub(1), config.comments_page_size);
            println!(
                "Page {} of {} ({} comments, {} replies)",
                page,
                shown.total_pages.max(1),
                shown.total_comments,
                count_replies(&forest)
            );
            for (depth, node) in walk(shown.comments) {
                print_comment(depth, node);
            }
        }
        Command::Speak { url, from, provider } => {
            let mut speech = settings.speech_settings(&config.speech).await?;
            if let Some(provider) = provider {
                speech.provider = provider
                    .parse::<SpeechProvider>()
                    .map_err(AppError::Internal)?;
                settings.save_speech_settings(&speech).await?;
            }

            open(&reader, &url).await?;
            let start = reader.set_speech_index(from).await;

            let mut factory = SpeechEngineFactory::new(
                http,
                config.gemini_model.clone(),
                config.audio_out_dir.clone(),
            );
            let engine = factory.engine(&speech).await.engine();

            let token = CancellationToken::new();
            let on_interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });
            let spoken = speak_chapter(&reader, engine, token).await?;
            info!("Spoke {} paragraphs starting at {}", spoken, start);
        }
        Command::Prefs {
            font_size,
            line_height,
            padding,
            paragraph_spacing,
        } => {
            let mut prefs = settings.preferences().await?;
            if let Some(v) = font_size {
                prefs.set_font_size(v);
            }
            if let Some(v) = line_height {
                prefs.set_line_height(v);
            }
            if let Some(v) = padding {
                prefs.set_padding(v);
            }
            if let Some(v) = paragraph_spacing {
                prefs.set_paragraph_spacing(v);
            }
            settings.save_preferences(&prefs).await?;
            println!(
                "font size {}px, line height {}px, padding {}px, paragraph spacing {}px",
                prefs.font_size, prefs.line_height, prefs.padding, prefs.paragraph_spacing
            );
        }
    }

    Ok(())
}

async fn open(reader: &ReaderSession, url: &str) -> Result<(), AppError> {
    match reader.open(url).await? {
        NavigationOutcome::Loaded(source) => info!("Loaded {} ({:?})", url, source),
        other => warn!("Loading {} ended as {:?}", url, other),
    }
    Ok(())
}

fn print_comment(depth: usize, node: Node<'_>) {
    let indent = "    ".repeat(depth);
    let author = node.author();
    match node {
        Node::Comment(comment) => println!(
            "{}{} ({}) on {}",
            indent, author.display_name, node.date_posted(), comment.chapter_title
        ),
        Node::Reply(_) => println!("{}{} ({})", indent, author.display_name, node.date_posted()),
    }
    for line in node.body_text().lines() {
        println!("{}  {}", indent, line);
    }
    println!();
}
