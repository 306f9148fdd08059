use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wayfarer_core::model::{Mission, PageGraph, graph_path_for_persona};
use wayfarer_core::reasoning::{CannedReasoner, HttpReasoningService, ReasoningService};
use wayfarer_crawler::crawler::DiscoveryCrawler;
use wayfarer_crawler::fetch::FetchBrowser;
use wayfarer_runner::mission::{MissionRunner, apply_corrections};

/// Expand `~` and environment-style prefixes in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Per-persona graph files carry the persona between the stem and the
/// extension: `wayfarer-graph.admin.json`.
pub fn persona_graph_path(base: &Path, persona: Option<&str>) -> PathBuf {
    match persona {
        Some(persona) => {
            let stem = base
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("wayfarer-graph");
            let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("json");
            base.with_file_name(format!("{}.{}.{}", stem, persona, ext))
        }
        None => base.to_path_buf(),
    }
}

/// Color a report summary line by its status tag.
pub fn colorize_summary(line: &str) -> String {
    if line.contains("[PASS]") || line.ends_with("PASS") {
        line.green().to_string()
    } else if line.contains("[FAIL]") || line.ends_with("FAIL") {
        line.red().bold().to_string()
    } else if line.contains("[SKIP]") {
        line.bright_black().to_string()
    } else {
        line.to_string()
    }
}

fn reasoning_from_args(args: &ArgMatches) -> Arc<dyn ReasoningService> {
    let endpoint = args
        .get_one::<String>("reasoning-url")
        .cloned()
        .or_else(|| std::env::var("WAYFARER_REASONING_URL").ok());
    let model = args
        .get_one::<String>("reasoning-model")
        .cloned()
        .unwrap_or_else(|| "gpt-4o-mini".to_string());

    match endpoint {
        Some(endpoint) => match HttpReasoningService::new(endpoint, model) {
            Ok(service) => Arc::new(service),
            Err(e) => {
                eprintln!(
                    "{} reasoning service unavailable ({}), falling back to structural labels",
                    "!".yellow().bold(),
                    e
                );
                Arc::new(CannedReasoner::new(vec![]))
            }
        },
        // No endpoint configured: every reasoning call degrades to its
        // structural fallback.
        None => Arc::new(CannedReasoner::new(vec![])),
    }
}

pub async fn handle_crawl(args: &ArgMatches) {
    tracing_subscriber::fmt::init();

    let url = args.get_one::<Url>("url").unwrap();
    let depth = *args.get_one::<usize>("depth").unwrap_or(&3);
    let max_pages = *args.get_one::<usize>("max-pages").unwrap_or(&200);
    let allow_side_effects = args.get_flag("allow-side-effects");
    let persona = args.get_one::<String>("persona").map(String::as_str);
    let graph_path = persona_graph_path(
        &expand_path(args.get_one::<String>("graph").unwrap()),
        persona,
    );

    println!("Crawling {}", url.as_str().bright_white());
    println!("Max depth: {}", depth);
    if allow_side_effects {
        println!(
            "{}",
            "Side effects enabled: discovery may write to the target".yellow()
        );
    }
    println!();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Starting discovery...");

    let browser = match FetchBrowser::new() {
        Ok(browser) => Arc::new(browser),
        Err(e) => {
            spinner.finish_and_clear();
            eprintln!("{} could not start browser surface: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let spinner_clone = spinner.clone();
    let crawler = DiscoveryCrawler::new(browser, reasoning_from_args(args))
        .with_max_depth(depth)
        .with_max_pages(max_pages)
        .with_side_effects(allow_side_effects)
        .with_progress_callback(Arc::new(move |count, url| {
            spinner_clone.set_message(format!("{} pages discovered, visiting {}", count, url));
        }));

    match crawler.crawl(url.as_str()).await {
        Ok(graph) => {
            spinner.finish_and_clear();
            if let Err(e) = graph.save(&graph_path) {
                eprintln!("{} could not write graph: {}", "✗".red().bold(), e);
                std::process::exit(1);
            }
            let templates = graph.nodes.iter().filter(|n| n.is_template).count();
            println!("{} Discovery complete", "✓".green().bold());
            println!("  Nodes: {} ({} templates)", graph.nodes.len(), templates);
            println!("  Edges: {}", graph.edges.len());
            println!(
                "  Graph: {}",
                graph_path.display().to_string().bright_white()
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            eprintln!("{} Crawl failed: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}

pub async fn handle_run(args: &ArgMatches) {
    tracing_subscriber::fmt::init();

    let mission_path = args.get_one::<PathBuf>("mission").unwrap().clone();
    let persona = args.get_one::<String>("persona").map(String::as_str);
    let graph_base = expand_path(args.get_one::<String>("graph").unwrap());
    let graph_path = graph_path_for_persona(&graph_base, persona);
    let report_path = expand_path(args.get_one::<String>("report").unwrap());

    let mission = match Mission::load(&mission_path) {
        Ok(mission) => mission,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    let graph = match PageGraph::load(&graph_path) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let browser = match FetchBrowser::new() {
        Ok(browser) => Arc::new(browser),
        Err(e) => {
            eprintln!("{} could not start browser surface: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let mut runner = match MissionRunner::new(browser, reasoning_from_args(args), graph) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    if let Some(db_path) = args.get_one::<PathBuf>("db") {
        match wayfarer_core::db::Storage::open(db_path) {
            Ok(storage) => runner = runner.with_storage(storage),
            Err(e) => {
                // Storage is one layer of three; the run proceeds without it.
                eprintln!(
                    "{} storage unavailable ({}), database checks will be skipped",
                    "!".yellow().bold(),
                    e
                );
            }
        }
    }

    let outcome = match runner.run(&mission).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    // Learning write-back: corrections land in both artifacts.
    if !outcome.corrections.is_empty() {
        let mut graph = runner.graph().clone();
        let applied = apply_corrections(&mut graph, &outcome.corrections);
        if applied > 0 && graph.save(&graph_path).is_ok() {
            println!(
                "{} {} selector correction{} written back to the graph",
                "✓".green(),
                applied,
                if applied == 1 { "" } else { "s" }
            );
        }
        let mut mission = mission;
        mission
            .selector_corrections
            .extend(outcome.corrections.iter().cloned());
        let _ = mission.save(&mission_path);
    }

    if let Err(e) = outcome.report.write_to(&report_path) {
        eprintln!("{} could not write report: {}", "✗".red().bold(), e);
        std::process::exit(1);
    }

    println!();
    for line in outcome.report.summary_lines() {
        println!("  {}", colorize_summary(&line));
    }
    println!(
        "\n  Report: {}",
        report_path.display().to_string().bright_white()
    );

    if !outcome.report.overall_success {
        std::process::exit(1);
    }
}

pub fn handle_graph_show(args: &ArgMatches) {
    let graph_path = expand_path(args.get_one::<String>("graph").unwrap());
    let graph = match PageGraph::load(&graph_path) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "{} ({} nodes, {} edges)\n",
        graph_path.display().to_string().bright_white().bold(),
        graph.nodes.len(),
        graph.edges.len()
    );

    for node in &graph.nodes {
        let marker = if node.is_template { "▣" } else { "▢" };
        println!(
            "{} {} {}",
            marker.cyan(),
            node.id.bright_white().bold(),
            node.url.bright_black()
        );
        if !node.display_label.is_empty() {
            println!("    {}", node.display_label);
        }
        for api in &node.active_apis {
            println!("    {} {}", "api".blue(), api);
        }
        for component in &node.components {
            println!(
                "    {} {} {}",
                component.kind.as_str().green(),
                component.role,
                component.selector.bright_black()
            );
        }
    }

    if !graph.edges.is_empty() {
        println!();
        for edge in &graph.edges {
            println!(
                "  {} {} {}",
                edge.from,
                "->".bright_black(),
                edge.to
            );
        }
    }
}
