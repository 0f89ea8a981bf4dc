//! Academy command-line entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags and the command
//!   3. Load config
//!   4. Resolve effective log level (CLI `-v` flags > env > config)
//!   5. Init logger once
//!   6. Open the state store and run the command

use std::process;

use rand_core::{OsRng, RngCore};
use serde_json::Value;
use tracing::{info, warn};

use academy::app::AppContext;
use academy::auth::hash_password;
use academy::error::AppError;
use academy::router::Navigation;
use academy::{config, logger, pages};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let command = match build_command(args.command.as_deref(), &args.rest) {
        Ok(command) => command,
        Err(usage) => {
            eprintln!("{usage}");
            process::exit(2);
        }
    };

    // Hashing needs neither config nor state.
    if let Command::Hash { password } = &command {
        println!("{}", hash_password(password));
        return Ok(());
    }

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        academy = %config.academy_name,
        work_dir = %config.work_dir.display(),
        log_level = %effective_log_level,
        "config loaded"
    );

    let ctx = AppContext::open(config)?;
    let result = execute(&ctx, command);

    let failures = ctx.store().persist_failures();
    if failures > 0 {
        warn!(failures, "some writes were not persisted");
        eprintln!("warning: {failures} write(s) could not be saved");
    }
    result
}

enum Command {
    Login { username: String, password: String },
    Logout,
    Whoami,
    Open { page: String },
    Lesson { id: String },
    Get { path: String },
    Set { path: String, raw: String },
    Dump,
    Hash { password: String },
}

fn execute(ctx: &AppContext, command: Command) -> Result<(), AppError> {
    match command {
        Command::Login { username, password } => {
            let user = ctx.login(&username, &password)?;
            println!("✓ Signed in as {} <{}>", user.username, user.email);
            show_page(ctx, pages::DASHBOARD)
        }
        Command::Logout => {
            if !ctx.auth().is_logged_in() {
                println!("Not signed in.");
                return Ok(());
            }
            ctx.logout()?;
            println!("✓ Signed out");
            Ok(())
        }
        Command::Whoami => {
            match ctx.auth().current_user() {
                Some(user) => println!("{} <{}>", user.username, user.email),
                None => println!("Not signed in."),
            }
            Ok(())
        }
        Command::Open { page } => show_page(ctx, &page),
        Command::Lesson { id } => {
            let lesson = ctx.start_lesson(&id)?;
            println!("Starting lesson: {}", lesson.title);
            // Lessons are simulated: the score is drawn from 60..=100.
            let score = 60 + (OsRng.next_u32() % 41) as u8;
            let progress = ctx.complete_lesson(&id, score)?;
            println!(
                "✓ Lesson completed! Score: {score}% ({} lessons, {} points)",
                progress.completed_lessons, progress.total_points
            );
            show_page(ctx, pages::DASHBOARD)
        }
        Command::Get { path } => {
            match ctx.store().get(&path)? {
                Some(value) => println!("{}", pretty(&value)),
                None => println!("(not set)"),
            }
            Ok(())
        }
        Command::Set { path, raw } => {
            // Anything that is not valid JSON is stored as a string.
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            ctx.store().set(&path, value)?;
            println!("✓ {path} updated");
            Ok(())
        }
        Command::Dump => {
            println!("{}", pretty(&ctx.store().snapshot()));
            Ok(())
        }
        Command::Hash { password } => {
            println!("{}", hash_password(&password));
            Ok(())
        }
    }
}

fn show_page(ctx: &AppContext, page: &str) -> Result<(), AppError> {
    match ctx.navigate(page) {
        Navigation::Loaded { content, .. } => {
            println!("{content}");
            Ok(())
        }
        Navigation::NotFound { page } => Err(AppError::Page(format!(
            "no page named '{page}' (pages: {})",
            ctx.router().pages().join(", ")
        ))),
        Navigation::Blocked { page } => {
            Err(AppError::Auth(format!("sign in to open '{page}'")))
        }
        Navigation::Failed { error, .. } => Err(AppError::Page(error)),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

// ── CLI arg parsing ────────────────────────────────────────────────────────

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    command: Option<String>,
    rest: Vec<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut command = None;
    let mut rest = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--" => {
                rest.extend(iter);
                break;
            }
            "-h" | "--help" => {
                print_help();
                process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ if command.is_none() => command = Some(arg),
            _ => rest.push(arg),
        }
    }

    CliArgs {
        log_level: logger::level_for_verbosity(verbosity),
        config_path,
        command,
        rest,
    }
}

fn build_command(cmd: Option<&str>, rest: &[String]) -> Result<Command, String> {
    let arg = |i: usize, usage: &str| {
        rest.get(i).cloned().ok_or_else(|| format!("usage: academy {usage}"))
    };
    match cmd {
        None => Err("usage: academy [OPTIONS] <command>\n  run 'academy --help' for usage".into()),
        Some("login") => Ok(Command::Login {
            username: arg(0, "login <username> <password>")?,
            password: arg(1, "login <username> <password>")?,
        }),
        Some("logout") => Ok(Command::Logout),
        Some("whoami") => Ok(Command::Whoami),
        Some("open") => Ok(Command::Open { page: arg(0, "open <page>")? }),
        Some("lesson") => Ok(Command::Lesson { id: arg(0, "lesson <id>")? }),
        Some("get") => Ok(Command::Get { path: arg(0, "get <path>")? }),
        Some("set") => Ok(Command::Set {
            path: arg(0, "set <path> <json>")?,
            raw: arg(1, "set <path> <json>")?,
        }),
        Some("dump") => Ok(Command::Dump),
        Some("hash") => Ok(Command::Hash { password: arg(0, "hash <password>")? }),
        Some(other) => Err(format!("unknown command: {other}\n  run 'academy --help' for usage")),
    }
}

fn print_help() {
    println!("Usage: academy [OPTIONS] <command> [ARGS]");
    println!();
    println!("Commands:");
    println!("  login <username> <password>   sign in and show the dashboard");
    println!("  logout                        sign out");
    println!("  whoami                        show the signed-in user");
    println!("  open <page>                   open a page ({})", pages::PAGES.join(", "));
    let lessons: Vec<&str> = pages::LESSONS.iter().map(|l| l.id).collect();
    println!("  lesson <id>                   take a lesson ({})", lessons.join(", "));
    println!("  get <path>                    print the value at a dotted state path");
    println!("  set <path> <json>             write a value at a dotted state path");
    println!("  dump                          print the whole state document");
    println!("  hash <password>               print the credential digest for config");
    println!();
    println!("Options:");
    println!("  -h, --help                 Print help");
    println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
    println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
}
