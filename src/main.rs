// Cerebro console: interactive front end for the client orchestration core.
//
// Wires the orchestrator, history engine, health monitor, and export
// manager together and maps typed commands onto them. Invalidation events
// and debounced search values are handled on the same loop as user input.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use cerebro_client::api::ApiClient;
use cerebro_client::config::{ClientConfig, ConfigOverrides};
use cerebro_client::export::{ExportManager, ExportOutcome};
use cerebro_client::health::{HealthMonitor, HealthSnapshot, IssueLog};
use cerebro_client::history::{Debouncer, HistoryEngine, DEFAULT_QUIET_MS};
use cerebro_client::models::PagedHistory;
use cerebro_client::session::{ChatRole, InvalidationEvent, SessionOrchestrator};

/// Cerebro - interactive console for the AI research backend
#[derive(Parser, Debug)]
#[command(name = "cerebro")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "CEREBRO_API_URL")]
    api_url: Option<String>,

    /// Bearer token sent on every request
    #[arg(long, env = "CEREBRO_API_TOKEN")]
    token: Option<String>,

    /// Run against canned fixtures without a backend
    #[arg(long, env = "CEREBRO_MOCK")]
    mock: bool,

    /// History page size
    #[arg(long)]
    page_size: Option<u32>,

    /// Directory export files are written into
    #[arg(long)]
    export_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = ClientConfig::load(ConfigOverrides {
        base_url: cli.api_url,
        token: cli.token,
        mock: cli.mock,
        page_size: cli.page_size,
        export_dir: cli.export_dir,
    });

    log::info!(
        "Cerebro console starting against {}{}",
        config.base_url,
        if config.mock { " (mock mode)" } else { "" }
    );

    let api = Arc::new(ApiClient::new(
        config.base_url.clone(),
        config.token.clone(),
        config.mock,
    ));
    let issues = IssueLog::new();
    let orchestrator = SessionOrchestrator::new(api.clone(), issues.clone());
    let mut history = HistoryEngine::new(api.clone(), config.page_size);
    let exporter = ExportManager::new(api.clone(), config.export_dir.clone());

    let (monitor, snapshot, refresh) = HealthMonitor::new(api.clone(), issues);
    tokio::spawn(monitor.run());

    let (invalidation_tx, mut invalidation_rx) = tokio::sync::mpsc::unbounded_channel();
    orchestrator.set_invalidation_sender(invalidation_tx);

    let (debouncer, mut search_rx) = Debouncer::new(Duration::from_millis(DEFAULT_QUIET_MS));

    println!("Cerebro research console. Type 'help' for commands.");
    prompt().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let quit = handle_command(
                    line.trim(),
                    &orchestrator,
                    &mut history,
                    &exporter,
                    &snapshot,
                    &debouncer,
                )
                .await;
                if quit {
                    break;
                }
                prompt().await?;
            }
            Some(event) = invalidation_rx.recv() => {
                match event {
                    InvalidationEvent::HistoryChanged => history.invalidate_after_mutation(),
                    InvalidationEvent::HealthRefresh => refresh.refresh(),
                }
            }
            Some(settled) = search_rx.recv() => {
                history.commit_search(&settled);
                match history.fetch_page().await {
                    Ok(page) => print_page(&page),
                    Err(e) => println!("History search failed: {}", e),
                }
                prompt().await?;
            }
        }
    }

    Ok(())
}

async fn prompt() -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"cerebro> ").await?;
    stdout.flush().await?;
    Ok(())
}

/// Dispatch one typed command. Returns true when the console should exit.
async fn handle_command(
    line: &str,
    orchestrator: &SessionOrchestrator,
    history: &mut HistoryEngine,
    exporter: &ExportManager,
    snapshot: &std::sync::Arc<std::sync::RwLock<HealthSnapshot>>,
    debouncer: &Debouncer,
) -> bool {
    let (command, rest) = match line.split_once(' ') {
        Some((head, tail)) => (head, tail.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "quit" | "exit" => return true,
        "help" => print_help(),

        "start" => match orchestrator.create_session(rest).await {
            Ok(session) => {
                println!("Session {} created: {}", session.session_id, session.outline.title);
                for sub in &session.outline.sub_topics {
                    println!("  [{}] {} - {}", sub.id, sub.title, sub.description);
                }
            }
            Err(e) => println!("Start failed: {}", e),
        },

        "refine" => match orchestrator.refine_session(rest).await {
            Ok(Some(response)) => println!("Deep-dive: {}", response.insight),
            Ok(None) => println!("A deep-dive for that sub-topic is already running."),
            Err(e) => println!("Refine failed: {}", e),
        },

        "finalize" => {
            let tags: Vec<String> = rest
                .split_whitespace()
                .map(|t| t.to_string())
                .collect();
            match orchestrator.finalize_session(&tags).await {
                Ok(Some(response)) => {
                    println!("Summary: {}", response.summary);
                    println!("Tags: {}", response.tags.join(", "));
                }
                Ok(None) => println!("Finalize is already running."),
                Err(e) => println!("Finalize failed: {}", e),
            }
        }

        "open" => match orchestrator.open_session(rest).await {
            Ok(Some(detail)) => {
                println!("Session {}: {}", detail.session_id, detail.outline.title);
                if let Some(summary) = &detail.summary {
                    println!("Summary: {}", summary);
                }
                if !detail.tags.is_empty() {
                    println!("Tags: {}", detail.tags.join(", "));
                }
                for refinement in &detail.refinements {
                    println!("  {} -> {}", refinement.subtopic, refinement.insight);
                }
            }
            Ok(None) => println!("A session detail fetch is already running."),
            Err(e) => println!("Open failed: {}", e),
        },

        "history" => match history.fetch_page().await {
            Ok(page) => print_page(&page),
            Err(e) => println!("History failed: {}", e),
        },

        "search" => {
            // Committed only after the value settles
            debouncer.submit(rest);
        }

        "filter" => {
            if rest.is_empty() {
                history.clear_categories();
                println!("Category filter cleared (All).");
            } else {
                history.toggle_category(rest);
                println!("Categories: {}", history.query().category_param());
            }
            match history.fetch_page().await {
                Ok(page) => print_page(&page),
                Err(e) => println!("History failed: {}", e),
            }
        }

        "next" | "prev" => {
            let moved = if command == "next" {
                history.next_page()
            } else {
                history.prev_page()
            };
            if moved {
                match history.fetch_page().await {
                    Ok(page) => print_page(&page),
                    Err(e) => println!("History failed: {}", e),
                }
            } else {
                println!("Already at the {} page.", if command == "next" { "last" } else { "first" });
            }
        }

        "categories" => match history.fetch_categories().await {
            Ok(list) => println!("{}", list.join(", ")),
            Err(e) => println!("Categories failed: {}", e),
        },

        "export" => {
            let (kind, arg) = match rest.split_once(' ') {
                Some((k, a)) => (k, a.trim()),
                None => (rest, ""),
            };
            match kind {
                "pdf" => {
                    let session_id = if arg.is_empty() {
                        orchestrator.active_session_id()
                    } else {
                        Some(arg.to_string())
                    };
                    match session_id {
                        Some(id) => match exporter.export_pdf(&id).await {
                            Ok(ExportOutcome::Server(path)) => {
                                println!("PDF exported to {}", path.display())
                            }
                            Ok(ExportOutcome::Skipped) => {
                                println!("A PDF export is already running.")
                            }
                            // PDF export has no local fallback path
                            Ok(ExportOutcome::LocalFallback(path)) => {
                                log::debug!("unexpected local PDF fallback at {}", path.display())
                            }
                            Err(e) => println!("PDF export failed: {}", e),
                        },
                        None => println!("No session to export. Use: export pdf <id>"),
                    }
                }
                "csv" => match exporter.export_csv(history.current_items()).await {
                    Ok(ExportOutcome::Server(path)) => {
                        println!("CSV exported to {}", path.display())
                    }
                    Ok(ExportOutcome::LocalFallback(path)) => {
                        println!("Server export unavailable; exported from local data to {}", path.display())
                    }
                    Ok(ExportOutcome::Skipped) => println!("A CSV export is already running."),
                    Err(e) => println!("CSV export failed: {}", e),
                },
                _ => println!("Usage: export pdf [id] | export csv"),
            }
        }

        "health" => {
            let current = snapshot.read().expect("health snapshot lock poisoned").clone();
            print_provider("backend", &current.backend);
            print_provider("llm", &current.llm);
            print_provider("airtable", &current.airtable);
            match current.checked_at {
                Some(at) => println!("checked at {}", at.format("%H:%M:%S UTC")),
                None => println!("no poll has completed yet"),
            }
        }

        "transcript" => {
            for message in orchestrator.transcript() {
                let who = match message.role {
                    ChatRole::User => "you",
                    ChatRole::Assistant => "cerebro",
                };
                println!("[{}] {}", who, message.text);
            }
        }

        _ => println!("Unknown command '{}'. Type 'help'.", command),
    }

    false
}

fn print_page(page: &PagedHistory) {
    if page.items.is_empty() {
        println!("No sessions found.");
    }
    for item in &page.items {
        let tags = if item.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", item.tags.join(", "))
        };
        println!(
            "{}  {}  {} ({}%){}",
            item.session_id,
            item.display_created_at(),
            item.outline.title,
            item.progress,
            tags
        );
    }
    println!("page {}/{} ({} total)", page.page, page.total_pages.max(1), page.total);
}

fn print_provider(name: &str, state: &cerebro_client::health::ProviderState) {
    match &state.note {
        Some(note) => println!("{:<9} {:<9} {}", name, state.status, note),
        None => println!("{:<9} {}", name, state.status),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  start <topic>        create a research session");
    println!("  refine <subtopic>    deep-dive one sub-topic of the active session");
    println!("  finalize [tags...]   commit summary and tags");
    println!("  open <id>            load a past session");
    println!("  history              show the current history page");
    println!("  search <text>        search history (debounced)");
    println!("  filter [category]    toggle a category filter; no arg clears to All");
    println!("  next / prev          page through history");
    println!("  categories           list known categories");
    println!("  export pdf [id]      export a session as PDF");
    println!("  export csv           export history as CSV (local fallback on failure)");
    println!("  health               show provider health");
    println!("  transcript           show the conversation so far");
    println!("  quit                 exit");
}
