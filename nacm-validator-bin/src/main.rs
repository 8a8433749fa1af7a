//! CLI front-end for the NACM engine: single-request validation, batch
//! JSON-lines mode, and a `script`/`repl` pair that drives the runstack
//! interpreter as an operational test harness.
//!
//! ## Exit codes
//! - 0: access permitted
//! - 1: access denied
//! - 2: configuration or runtime error

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use nacm_validator::nacm::{AccessMode, EditOp, Engine, NacmCache, NacmConfig, NacmState};
use nacm_validator::runstack::RunstackContext;
use nacm_validator::value::{ValueData, ValueId, ValueNode, ValueTree};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(author, version, about = "NACM access control validator", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv); otherwise controlled by RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a single access request against a NACM configuration.
    Check {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        module: Option<String>,
        #[arg(short, long)]
        rpc: Option<String>,
        #[arg(short, long)]
        operation: OperationArg,
        #[arg(short, long)]
        path: Option<String>,
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Read JSON-lines requests from stdin, one decision per line on stdout.
    Batch {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run a runstack script file against a loaded configuration.
    Script {
        #[arg(short, long)]
        config: PathBuf,
        /// Path to a runstack script; reads stdin if omitted.
        script: Option<PathBuf>,
    },
    /// Interactive runstack shell for ad hoc NACM testing.
    Repl {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OperationArg {
    Read,
    Create,
    Update,
    Delete,
    Exec,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    ExitCode,
}

#[derive(Serialize, Deserialize)]
struct JsonRequest {
    user: String,
    module: Option<String>,
    rpc: Option<String>,
    operation: String,
    path: Option<String>,
}

#[derive(Serialize)]
struct JsonResult {
    decision: String,
    user: String,
    module: Option<String>,
    rpc: Option<String>,
    operation: String,
    path: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    match &cli.command {
        Command::Check { config, user, module, rpc, operation, path, format } => {
            let config = load_config(config);
            let permit = check_single(&config, user, module.as_deref(), rpc.as_deref(), *operation, path.as_deref());
            print_result(user, module.as_deref(), rpc.as_deref(), *operation, path.as_deref(), permit, *format);
            process::exit(if permit { 0 } else { 1 });
        }
        Command::Batch { config } => {
            let config = load_config(config);
            run_batch(&config);
        }
        Command::Script { config, script } => {
            let config = load_config(config);
            let body = match script {
                Some(p) => std::fs::read_to_string(p).unwrap_or_else(|e| {
                    eprintln!("error reading script {p:?}: {e}");
                    process::exit(2);
                }),
                None => {
                    let mut buf = String::new();
                    io::Read::read_to_string(&mut io::stdin(), &mut buf).ok();
                    buf
                }
            };
            run_script(&config, &body);
        }
        Command::Repl { config } => {
            let config = load_config(config);
            run_repl(&config);
        }
    }
}

fn install_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
}

fn load_config(path: &PathBuf) -> NacmConfig {
    let xml = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error reading config {path:?}: {e}");
        process::exit(2);
    });
    NacmConfig::from_xml(&xml).unwrap_or_else(|e| {
        eprintln!("error parsing NACM config: {e}");
        process::exit(2);
    })
}

/// Build a single-branch value tree from a slash-separated path, so CLI
/// requests have something concrete to run `val_*_allowed` against
/// without standing up a full datastore.
fn single_branch_tree(path: Option<&str>, module: &str) -> (ValueTree, ValueId, ValueId) {
    let mut tree = ValueTree::new();
    let root = tree.insert(ValueNode::new("", module, ValueData::Container), None);
    let Some(path) = path else { return (tree, root, root) };
    let mut current = root;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let name = segment.split(['[', '=']).next().unwrap_or(segment);
        current = tree.insert(ValueNode::new(name, module, ValueData::Leaf(String::new())), Some(current));
    }
    (tree, root, current)
}

fn check_single(config: &NacmConfig, user: &str, module: Option<&str>, rpc: Option<&str>, operation: OperationArg, path: Option<&str>) -> bool {
    let state = NacmState::new(AccessMode::Enforcing, None);
    let mut cache = NacmCache::build(config, 1).unwrap_or_else(|e| {
        eprintln!("error building NACM cache: {e}");
        process::exit(2);
    });
    let mut engine = Engine { config, state: &state, cache: &mut cache };
    let module = module.unwrap_or("*");

    match operation {
        OperationArg::Exec => engine.rpc_allowed(user, module, rpc.unwrap_or("*"), false, false),
        OperationArg::Read => {
            let (tree, root, target) = single_branch_tree(path, module);
            engine.val_read_allowed(user, &tree, root, target)
        }
        OperationArg::Create | OperationArg::Update | OperationArg::Delete => {
            let (tree, root, target) = single_branch_tree(path, module);
            let editop = match operation {
                OperationArg::Create => EditOp::Create,
                OperationArg::Update => EditOp::Merge,
                OperationArg::Delete => EditOp::Delete,
                _ => unreachable!(),
            };
            engine.val_write_allowed(user, &tree, root, target, editop)
        }
    }
}

fn print_result(user: &str, module: Option<&str>, rpc: Option<&str>, operation: OperationArg, path: Option<&str>, permit: bool, format: OutputFormat) {
    let decision = if permit { "permit" } else { "deny" };
    let op_name = operation_name(operation);
    match format {
        OutputFormat::Text => println!("{}", decision.to_uppercase()),
        OutputFormat::Json => {
            let result = JsonResult {
                decision: decision.to_string(),
                user: user.to_string(),
                module: module.map(str::to_string),
                rpc: rpc.map(str::to_string),
                operation: op_name.to_string(),
                path: path.map(str::to_string),
            };
            println!("{}", serde_json::to_string_pretty(&result).unwrap());
        }
        OutputFormat::ExitCode => {}
    }
}

fn operation_name(op: OperationArg) -> &'static str {
    match op {
        OperationArg::Read => "read",
        OperationArg::Create => "create",
        OperationArg::Update => "update",
        OperationArg::Delete => "delete",
        OperationArg::Exec => "exec",
    }
}

fn run_batch(config: &NacmConfig) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let req: JsonRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("invalid JSON: {e}");
                continue;
            }
        };
        let operation = match req.operation.as_str() {
            "read" => OperationArg::Read,
            "create" => OperationArg::Create,
            "update" => OperationArg::Update,
            "delete" => OperationArg::Delete,
            "exec" => OperationArg::Exec,
            other => {
                eprintln!("invalid operation {other:?}");
                continue;
            }
        };
        let permit = check_single(config, &req.user, req.module.as_deref(), req.rpc.as_deref(), operation, req.path.as_deref());
        let result = JsonResult {
            decision: if permit { "permit" } else { "deny" }.to_string(),
            user: req.user,
            module: req.module,
            rpc: req.rpc,
            operation: req.operation,
            path: req.path,
        };
        println!("{}", serde_json::to_string(&result).unwrap());
    }
}

/// Parse and run a single runstack line, treating `check user op [module]
/// [path]` as the one builtin command understood by this harness.
fn exec_line(config: &NacmConfig, text: &str) {
    let mut words = text.split_whitespace();
    match words.next() {
        Some("check") => {
            let (Some(user), Some(op)) = (words.next(), words.next()) else {
                eprintln!("usage: check <user> <read|create|update|delete|exec> [module] [path]");
                return;
            };
            let operation = match op {
                "read" => OperationArg::Read,
                "create" => OperationArg::Create,
                "update" => OperationArg::Update,
                "delete" => OperationArg::Delete,
                "exec" => OperationArg::Exec,
                other => {
                    eprintln!("unknown operation {other:?}");
                    return;
                }
            };
            let module = words.next();
            let path = words.next();
            let permit = check_single(config, user, module, None, operation, path);
            println!("{}", if permit { "PERMIT" } else { "DENY" });
        }
        Some("echo") => println!("{}", words.collect::<Vec<_>>().join(" ")),
        Some(other) => eprintln!("unknown command {other:?}"),
        None => {}
    }
}

fn run_script(config: &NacmConfig, body: &str) {
    let mut ctx = RunstackContext::new();
    if let Err(e) = ctx.push_script("script", body, vec![]) {
        eprintln!("error entering script: {e}");
        process::exit(2);
    }
    while let Ok(Some(line)) = ctx.next_line() {
        if ctx.should_execute() {
            exec_line(config, &line.text);
        }
    }
}

fn run_repl(config: &NacmConfig) {
    let mut ctx = RunstackContext::new();
    let stdin = io::stdin();
    loop {
        print!("nacm> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line == "quit" || line == "exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if ctx.should_execute() {
            exec_line(config, line);
        }
    }
}
