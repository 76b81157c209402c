mod classify;
mod cli;
mod content_script;
pub mod dom;
mod fetcher;
mod preference;
mod storage;
mod theme;
mod toggle;
mod watch;

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use cli::Args;
use fetcher::Fetcher;
use serde::Serialize;

pub use classify::{ClassifierRules, Graphic, NO_INVERT_CLASS, ScanStats, effective_source};
pub use cli::Args as CliArgs;
pub use content_script::{InitError, Session, bootstrap, start, start_with_page};
pub use dom::{Document, MutationRecord, ReadyState};
pub use preference::{PreferenceStore, STORAGE_KEY, StorageError, StorageOp};
pub use storage::{JsonFileBackend, MemoryBackend, StorageBackend};
pub use theme::{ROOT_CLASS, apply_state, is_applied};
pub use toggle::{TOGGLE_BUTTON_ID, TOGGLE_LABEL, TOGGLE_WRAP_ID, ToggleControl};
pub use watch::DomWatcher;

/// Summary of one page session, written by `--report`.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub initialized: bool,
    pub dark_mode: bool,
    pub clicks_applied: u32,
    pub initial_scan: ScanStats,
    pub watched: ScanStats,
}

/// Replays one page lifetime: load, bootstrap, clicks, late insertions.
pub async fn run(args: Args) -> anyhow::Result<()> {
    let html = load_page(&args).await?;
    let doc = Document::parse(&html)?;

    let rules = ClassifierRules {
        min_dimension: args.min_icon_size,
        ..ClassifierRules::default()
    };
    let store: PreferenceStore<JsonFileBackend> = if args.no_storage {
        PreferenceStore::unavailable()
    } else {
        PreferenceStore::new(JsonFileBackend::new(&args.state))
    }
    .with_key(args.storage_key.clone());

    let session = content_script::start_with_page(doc.clone(), store, rules).await;
    doc.set_ready_state(ReadyState::Complete);

    let mut report = RunReport::default();
    let Some(mut session) = session else {
        if args.toggle > 0 {
            tracing::warn!(clicks = args.toggle, "no toggle control; skipping clicks");
        }
        inject_fragments(&doc, &args.inject)?;
        report.dark_mode = theme::is_applied(&doc);
        return finish(&doc, &args, &report);
    };

    for _ in 0..args.toggle {
        if session.click().await.is_some() {
            report.clicks_applied += 1;
        }
    }

    inject_fragments(&doc, &args.inject)?;
    session.pump();

    report.initialized = true;
    report.dark_mode = theme::is_applied(&doc);
    report.initial_scan = session.initial_scan();
    report.watched = session.watched();
    finish(&doc, &args, &report)
}

async fn load_page(args: &Args) -> anyhow::Result<String> {
    if let Some(url) = &args.url {
        let fetcher = Fetcher::new(&args.user_agent)?;
        return fetcher
            .get_text(url.clone())
            .await
            .with_context(|| format!("download page {}", url));
    }
    let Some(input) = &args.input else {
        anyhow::bail!("pass --input <file> or --url <url>");
    };
    std::fs::read_to_string(input).with_context(|| format!("read {}", input.display()))
}

fn inject_fragments(doc: &Document, paths: &[PathBuf]) -> anyhow::Result<()> {
    for path in paths {
        let fragment =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let added = doc
            .append_html(doc.body(), &fragment)
            .with_context(|| format!("insert {}", path.display()))?;
        tracing::debug!(path = %path.display(), nodes = added.len(), "injected fragment");
    }
    Ok(())
}

fn finish(doc: &Document, args: &Args, report: &RunReport) -> anyhow::Result<()> {
    let html = doc.serialize()?;
    match &args.out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
            }
            std::fs::write(out, html).with_context(|| format!("write {}", out.display()))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(html.as_bytes())
                .context("write page to stdout")?;
            stdout.flush().context("flush stdout")?;
        }
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(report).context("encode report")?;
        std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    }

    tracing::info!(
        dark_mode = report.dark_mode,
        clicks = report.clicks_applied,
        exempted = report.initial_scan.exempted + report.watched.exempted,
        "page session finished"
    );
    Ok(())
}
