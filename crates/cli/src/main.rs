use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitup_core::orchestrator::{DecisionProvider, ReviewOrchestrator, ReviewStatus, RiskDecision};
use gitup_core::risk::SecurityRisk;
use gitup_core::store::ProjectStore;
use gitup_core::{GitAdapter, VcsAdapter};

#[derive(Parser)]
#[command(name = "gitup", about = "Catches secrets and sensitive files before they reach version control", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable detailed logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Project path (defaults to the current directory)
    #[arg(long, global = true)]
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the State Detector and create/populate the project store
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Print store presence, config summary, and compliance verdict
    Status,
    /// Run the State Detector and print its recommendation
    Analyze {
        #[arg(long)]
        detailed: bool,
        #[arg(long)]
        json: bool,
    },
    /// Run the Compliance Evaluator
    ComplianceCheck,
    /// Security review, dashboard, and configuration
    Security {
        #[command(subcommand)]
        action: SecurityAction,
    },
    /// Operate on the shadow ignore list and Decision Ledger
    Ignore {
        #[command(subcommand)]
        action: IgnoreAction,
    },
}

#[derive(Subcommand)]
enum SecurityAction {
    /// Run the Review Orchestrator
    Review {
        #[arg(long, conflicts_with = "no_interactive")]
        interactive: bool,
        #[arg(long)]
        no_interactive: bool,
    },
    /// Interactive security-level and global-exceptions configuration
    Config {
        #[arg(long)]
        level: Option<String>,
    },
    /// Render a compliance + risk summary
    Dashboard,
}

#[derive(Subcommand)]
enum IgnoreAction {
    /// Seed the shadow ignore file and its metadata
    Init,
    /// Print the decision ledger's statistics
    Status,
    /// Surface decisions due for review
    Review,
    /// Add a decision for a pattern
    Add {
        pattern: String,
        #[arg(long, default_value = "ignore_permanently")]
        decision: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Soft-delete a decision by id
    Remove { id: String },
    /// Print recent audit trail entries
    Audit,
    /// Refresh the ignore baseline and print the delta
    Update,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(if cli.verbose { "gitup=debug".parse()? } else { "gitup=info".parse()? }),
        )
        .with_target(false)
        .init();

    let root = cli
        .path
        .clone()
        .unwrap_or(std::env::current_dir().context("resolving current directory")?);
    let store = ProjectStore::new(&root);

    let exit_code = match cli.command {
        Commands::Init { force } => run_init(&store, force)?,
        Commands::Status => run_status(&store)?,
        Commands::Analyze { detailed, json } => run_analyze(&root, detailed, json)?,
        Commands::ComplianceCheck => run_compliance_check(&store)?,
        Commands::Security { action } => run_security(&store, action)?,
        Commands::Ignore { action } => run_ignore(&store, action)?,
    };

    std::process::exit(exit_code);
}

fn run_init(store: &ProjectStore, force: bool) -> Result<i32> {
    let analysis = gitup_core::state_detector::analyze(store.root(), &GitAdapter);
    store.initialize(analysis.recommended_security_level, force)?;

    let monitor = gitup_core::ignore_monitor::IgnoreMonitor::new(store.root(), store.store_dir());
    monitor.update_baseline()?;

    let ledger = gitup_core::decision_ledger::DecisionLedger::new(store.store_dir(), store.root());
    let detector = gitup_core::risk_detector::RiskDetector {
        root: store.root(),
        vcs: &GitAdapter,
        ignore_monitor: &monitor,
        ledger: &ledger,
        security_level: analysis.recommended_security_level,
    };
    let assessment = detector.scan()?;
    let enforcer = gitup_core::enforcer::Enforcer::new(store.store_dir());
    enforcer.save_violations(&assessment.blocking_violations, analysis.recommended_security_level)?;

    println!("Initialized {}", store.store_dir().display());
    println!("Recommended security level: {}", analysis.recommended_security_level);
    println!("Blocking violations: {}", assessment.blocking_violations.len());
    Ok(if assessment.blocking_violations.is_empty() { 0 } else { 1 })
}

fn run_status(store: &ProjectStore) -> Result<i32> {
    if !store.store_dir().join("config.yaml").exists() {
        println!("{} is not initialized (run `gitup init`)", store.root().display());
        return Ok(1);
    }
    let config = store.load_config()?;
    let state = store.load_state()?;
    println!("security level:      {}", config.security_level);
    println!("compliance status:   {}", state.compliance_status);
    println!("block on critical:   {}", config.block_on_critical);
    println!("block on high:       {}", config.block_on_high);
    println!("block on medium:     {}", config.block_on_medium);
    Ok(0)
}

fn run_analyze(root: &std::path::Path, detailed: bool, json: bool) -> Result<i32> {
    let analysis = gitup_core::state_detector::analyze(root, &GitAdapter);
    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(0);
    }
    println!("state:               {:?}", analysis.state);
    println!("risk tier:           {:?}", analysis.risk_tier);
    println!("recommended level:   {}", analysis.recommended_security_level);
    if detailed {
        println!("commit count:        {}", analysis.commit_count);
        println!("days since creation: {}", analysis.days_since_creation);
        println!("file count:          {}", analysis.file_count);
        println!("potential secrets:   {}", analysis.potential_secrets);
        for warning in &analysis.setup_warnings {
            println!("warning: {warning}");
        }
    }
    Ok(0)
}

fn run_compliance_check(store: &ProjectStore) -> Result<i32> {
    let monitor = gitup_core::ignore_monitor::IgnoreMonitor::new(store.root(), store.store_dir());
    let ledger = gitup_core::decision_ledger::DecisionLedger::new(store.store_dir(), store.root());
    let config = store.load_config()?;
    let detector = gitup_core::risk_detector::RiskDetector {
        root: store.root(),
        vcs: &GitAdapter,
        ignore_monitor: &monitor,
        ledger: &ledger,
        security_level: config.security_level,
    };
    let assessment = detector.scan()?;
    let evaluator = gitup_core::compliance::ComplianceEvaluator {
        root: store.root(),
        store_dir: store.store_dir(),
        vcs: &GitAdapter,
        ignore_monitor: &monitor,
        ledger: &ledger,
    };
    let report = evaluator.evaluate(&assessment)?;
    println!("verdict:             {}", report.verdict);
    println!("potential secrets:   {}", report.potential_secrets);
    println!("blocking violations: {}", report.blocking_violations);
    store.update_state(|s| s.compliance_status = report.verdict)?;
    Ok(if report.verdict == gitup_config::ComplianceVerdict::Compliant { 0 } else { 1 })
}

fn run_security(store: &ProjectStore, action: SecurityAction) -> Result<i32> {
    match action {
        SecurityAction::Review { interactive, no_interactive } => {
            let monitor = gitup_core::ignore_monitor::IgnoreMonitor::new(store.root(), store.store_dir());
            let ledger = gitup_core::decision_ledger::DecisionLedger::new(store.store_dir(), store.root());
            let enforcer = gitup_core::enforcer::Enforcer::new(store.store_dir());
            let config = store.load_config()?;
            let orchestrator = ReviewOrchestrator {
                root: store.root(),
                store_dir: store.store_dir(),
                vcs: &GitAdapter,
                ignore_monitor: &monitor,
                ledger: &ledger,
                enforcer: &enforcer,
                security_level: config.security_level,
            };
            let run_interactive = interactive || !no_interactive;
            let mut provider = StdinDecisionProvider;
            let outcome = if run_interactive {
                orchestrator.run(true, Some(&mut provider))?
            } else {
                orchestrator.run(false, None)?
            };
            print_review_outcome(&outcome);
            Ok(match outcome.status {
                ReviewStatus::Clean => 0,
                ReviewStatus::Completed => i32::from(!outcome.residual.is_empty()),
                ReviewStatus::ViolationsDetected => 1,
            })
        }
        SecurityAction::Config { level } => {
            if let Some(level) = level {
                let parsed: gitup_config::SecurityLevel = level.parse()?;
                store.update_config(|c| c.security_level = parsed)?;
                println!("security level set to {parsed}");
            } else {
                let config = store.load_config()?;
                println!("current security level: {}", config.security_level);
            }
            Ok(0)
        }
        SecurityAction::Dashboard => run_compliance_check(store),
    }
}

fn print_review_outcome(outcome: &gitup_core::orchestrator::ReviewOutcome) {
    println!("status:   {:?}", outcome.status);
    println!("resolved: {}", outcome.resolved_count);
    println!("skipped:  {}", outcome.skipped_count);
    println!("residual: {}", outcome.residual.len());
    for risk in &outcome.residual {
        println!("  [{:?}] {}", risk.risk_level, risk.file_path);
    }
}

fn run_ignore(store: &ProjectStore, action: IgnoreAction) -> Result<i32> {
    let ledger = gitup_core::decision_ledger::DecisionLedger::new(store.store_dir(), store.root());
    let monitor = gitup_core::ignore_monitor::IgnoreMonitor::new(store.root(), store.store_dir());

    match action {
        IgnoreAction::Init => {
            monitor.update_baseline()?;
            let shadow_path = store.store_dir().join("shadow_ignore");
            if !shadow_path.exists() {
                std::fs::write(&shadow_path, "# GitUp shadow ignore\n")?;
            }
            println!("initialized shadow ignore at {}", shadow_path.display());
            Ok(0)
        }
        IgnoreAction::Status => {
            let stats = ledger.statistics()?;
            println!("total decisions:    {}", stats.total_decisions);
            println!("expired:            {}", stats.expired_count);
            println!("due for review:     {}", stats.due_for_review_count);
            Ok(0)
        }
        IgnoreAction::Review => {
            let due = ledger.due_for_review()?;
            for decision in &due {
                println!("{} — {} ({})", decision.id, decision.pattern, decision.reason);
            }
            println!("{} decision(s) due for review", due.len());
            Ok(0)
        }
        IgnoreAction::Add { pattern, decision, reason } => {
            let kind = parse_decision_kind(&decision)?;
            let id = ledger.add(&pattern, kind, &reason, 1.0, None, None, vec![])?;
            println!("added decision {id} for {pattern}");
            Ok(0)
        }
        IgnoreAction::Remove { id } => {
            if ledger.delete(&id)? {
                println!("removed decision {id}");
                Ok(0)
            } else {
                println!("no such decision: {id}");
                Ok(1)
            }
        }
        IgnoreAction::Audit => {
            let report = serde_json::to_string_pretty(&ledger.statistics()?)?;
            println!("{report}");
            Ok(0)
        }
        IgnoreAction::Update => {
            let (changed, delta) = monitor.pre_operation_check()?;
            monitor.update_baseline()?;
            println!("changed: {changed}");
            println!("added patterns:   {}", delta.added_patterns.len());
            println!("removed patterns: {}", delta.removed_patterns.len());
            Ok(0)
        }
    }
}

fn parse_decision_kind(s: &str) -> Result<gitup_core::decision::DecisionKind> {
    use gitup_core::decision::DecisionKind::*;
    Ok(match s {
        "safe" => Safe,
        "ignore_permanently" => IgnorePermanently,
        "ignore_temporarily" => IgnoreTemporarily,
        "add_to_user_ignore" => AddToUserIgnore,
        "add_to_shadow_ignore" => AddToShadowIgnore,
        "remove_file" => RemoveFile,
        "encrypt_file" => EncryptFile,
        "review_later" => ReviewLater,
        "rename" => Rename,
        other => anyhow::bail!("unknown decision kind: {other}"),
    })
}

/// Reads decisions from stdin, one line per risk: a decision keyword, or
/// blank/`skip` to leave the risk unresolved.
struct StdinDecisionProvider;

impl DecisionProvider for StdinDecisionProvider {
    fn decide(&mut self, risk: &SecurityRisk) -> RiskDecision {
        println!("[{:?}] {} — {}", risk.risk_level, risk.file_path, risk.description);
        print!("decision (safe/ignore/temp/user-ignore/shadow-ignore/remove/encrypt/later/skip): ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return RiskDecision::Skip;
        }
        match line.trim() {
            "safe" => RiskDecision::Safe,
            "ignore" => RiskDecision::IgnorePermanently,
            "temp" => RiskDecision::IgnoreTemporarily {
                expires_at: (chrono::Utc::now() + chrono::Duration::days(30)).to_rfc3339(),
            },
            "user-ignore" => RiskDecision::AddToUserIgnore,
            "shadow-ignore" => RiskDecision::AddToShadowIgnore,
            "remove" => RiskDecision::RemoveFile,
            "encrypt" => RiskDecision::EncryptFile,
            "later" => RiskDecision::ReviewLater,
            _ => RiskDecision::Skip,
        }
    }

    fn confirm_delete(&mut self, risk: &SecurityRisk) -> bool {
        print!("really delete {}? (yes/no): ", risk.file_path);
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        line.trim() == "yes"
    }
}
