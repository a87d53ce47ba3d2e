//! acidtree - transactional filesystem over a Git branch
//!
//! Command-line entry point. Each mutating command runs in its own
//! transaction and commits on success.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use acidtree::{CommitMetadata, Session, SessionConfig, TransactionError};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse simple command line args.
    let mut path = PathBuf::from(".");
    let mut branch: Option<String> = None;
    let mut message: Option<String> = None;
    let mut verbose = false;
    let mut command: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        if !command.is_empty() {
            command.push(args[i].clone());
            i += 1;
            continue;
        }
        match args[i].as_str() {
            "-r" | "--repo" => {
                i += 1;
                if i < args.len() {
                    path = PathBuf::from(&args[i]);
                }
            }
            "-b" | "--branch" => {
                i += 1;
                if i < args.len() {
                    branch = Some(args[i].clone());
                }
            }
            "-m" | "--message" => {
                i += 1;
                if i < args.len() {
                    message = Some(args[i].clone());
                }
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("acidtree v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                return ExitCode::FAILURE;
            }
            arg => command.push(arg.to_string()),
        }
        i += 1;
    }

    init_logging(verbose);

    if command.is_empty() {
        print_help();
        return ExitCode::FAILURE;
    }

    let mut config = SessionConfig::new(&path);
    if let Some(branch) = branch {
        config = config.head(branch);
    }

    let mut session = match Session::open_with_config(config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error opening repository: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&mut session, &command, message) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(e.as_ref());
            ExitCode::FAILURE
        }
    }
}

/// RUST_LOG wins; otherwise `-v` turns on debug output for this crate.
fn init_logging(verbose: bool) {
    let default = if verbose { "acidtree=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_help() {
    println!("acidtree - ACID transactions over a Git branch");
    println!();
    println!("Usage: acidtree [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("Options:");
    println!("  -r, --repo PATH        Repository path (default: .)");
    println!("  -b, --branch NAME      Branch to work on (default: HEAD)");
    println!("  -m, --message TEXT     Commit message for mutating commands");
    println!("  -v, --verbose          Enable debug logging");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
    println!();
    println!("Commands:");
    println!("  cat PATH               Print a file");
    println!("  put PATH               Replace a file with stdin");
    println!("  append PATH            Append stdin to a file");
    println!("  ls [PATH]              List a directory");
    println!("  mkdir [-p] PATH        Create a directory");
    println!("  rm PATH                Remove a file");
    println!("  rmdir PATH             Remove an empty directory");
    println!("  rmtree PATH            Remove a directory recursively");
    println!("  mv SRC DST             Move a file or directory");
    println!("  hash [PATH]            Print the object id of a path");
    println!("  log [N]                Show the last N commits as JSON lines");
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn run(session: &mut Session, command: &[String], message: Option<String>) -> CliResult {
    let name = command[0].as_str();
    let args = &command[1..];

    match (name, args) {
        ("cat", [path]) => {
            let data = session.read(path)?;
            io::stdout().write_all(&data)?;
            return Ok(());
        }
        ("ls", []) => print_list(session, "")?,
        ("ls", [path]) => print_list(session, path)?,
        ("hash", []) => println!("{}", session.hash("/")?),
        ("hash", [path]) => println!("{}", session.hash(path)?),
        ("log", []) => print_log(session, 10)?,
        ("log", [limit]) => print_log(session, limit.parse()?)?,
        ("put", [path]) => session.write(path, &read_stdin()?)?,
        ("append", [path]) => session.append(path, &read_stdin()?)?,
        ("mkdir", [path]) => session.mkdir(path)?,
        ("mkdir", [flag, path]) if flag == "-p" => session.mkdirs(path)?,
        ("rm", [path]) => session.remove(path)?,
        ("rmdir", [path]) => session.remove_dir(path)?,
        ("rmtree", [path]) => session.remove_tree(path)?,
        ("mv", [src, dst]) => session.rename(src, dst)?,
        _ => return Err(format!("invalid command: {}", command.join(" ")).into()),
    }

    if !is_mutating(name) {
        return Ok(());
    }
    let message = message.unwrap_or_else(|| format!("acidtree {}", command.join(" ")));
    match session.commit_with(&CommitMetadata::new().with_message(message))? {
        Some(commit) => println!("{}", commit),
        None => eprintln!("nothing to commit"),
    }
    Ok(())
}

fn is_mutating(command: &str) -> bool {
    matches!(
        command,
        "put" | "append" | "mkdir" | "rm" | "rmdir" | "rmtree" | "mv"
    )
}

fn read_stdin() -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    io::stdin().read_to_end(&mut data)?;
    Ok(data)
}

fn print_list(session: &mut Session, path: &str) -> CliResult {
    for name in session.list(path)? {
        println!("{}", name);
    }
    Ok(())
}

fn print_log(session: &Session, limit: usize) -> CliResult {
    for info in session.log(limit)? {
        let line = serde_json::json!({
            "id": info.id.to_string(),
            "parents": info.parent_ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "author": info.author_name,
            "email": info.author_email,
            "timestamp": info.timestamp,
            "message": info.summary(),
        });
        println!("{}", line);
    }
    Ok(())
}

fn report_error(e: &(dyn std::error::Error + 'static)) {
    match e.downcast_ref::<TransactionError>().and_then(|e| e.conflict_report()) {
        Some(report) => match serde_json::to_string(report) {
            Ok(json) => eprintln!("Conflict: {}", json),
            Err(_) => eprintln!("Conflict: {}", report),
        },
        None => eprintln!("Error: {}", e),
    }
}
