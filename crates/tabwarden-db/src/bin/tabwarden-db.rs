//! Standalone schema maintenance for a Tabwarden database file.
//!
//! The engine migrates its own store on startup; this binary exists for
//! inspecting and repairing a database without starting the engine.

use std::io::Write;

use tabwarden_db::{Config, Store, StoreError};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    std::process::exit(run_with_args(&args, &mut stdout, &mut stderr));
}

const DEFAULT_DB_PATH: &str = "tabwarden.db";

struct Invocation {
    db_path: String,
    command: Vec<String>,
}

fn run_with_args(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let invocation = parse_invocation(args);
    let command = invocation.command.first().map(|arg| arg.as_str());

    match command {
        None | Some("help") | Some("-h") | Some("--help") => {
            let _ = write_help(stdout);
            0
        }
        Some("version") => {
            let _ = writeln!(
                stdout,
                "{} {}",
                tabwarden_db::crate_label(),
                env!("CARGO_PKG_VERSION")
            );
            0
        }
        Some("migrate") => run_migrate(&invocation, stdout, stderr),
        Some("status") => run_status(&invocation, stdout, stderr),
        Some(other) => {
            let _ = writeln!(stderr, "unknown command: {other}");
            let _ = write_help(stderr);
            2
        }
    }
}

enum MigratePlan {
    Up,
    Down(i32),
    To(i32),
}

fn run_migrate(invocation: &Invocation, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    // Validate arguments before touching the database file.
    let plan = match invocation.command.get(1).map(|arg| arg.as_str()) {
        Some("up") => MigratePlan::Up,
        Some("down") => match invocation.command.get(2) {
            None => MigratePlan::Down(1),
            Some(raw) => match raw.parse::<i32>() {
                Ok(steps) if steps > 0 => MigratePlan::Down(steps),
                _ => {
                    let _ = writeln!(stderr, "invalid step count: {raw}");
                    return 2;
                }
            },
        },
        Some("to") => match invocation.command.get(2) {
            Some(raw) => match raw.parse::<i32>() {
                Ok(target) if target >= 0 => MigratePlan::To(target),
                _ => {
                    let _ = writeln!(stderr, "invalid target version: {raw}");
                    return 2;
                }
            },
            None => {
                let _ = writeln!(stderr, "migrate to requires a target version");
                return 2;
            }
        },
        _ => {
            let _ = writeln!(stderr, "usage: tabwarden-db migrate <up|down [steps]|to <version>>");
            return 2;
        }
    };

    let db = match open_store(&invocation.db_path) {
        Ok(db) => db,
        Err(err) => {
            let _ = writeln!(stderr, "open {}: {err}", invocation.db_path);
            return 1;
        }
    };

    match plan {
        MigratePlan::Up => match db.migrate_up() {
            Ok(applied) => {
                let _ = writeln!(stdout, "applied {applied} migration(s)");
                write_version_line(&db, stdout, stderr)
            }
            Err(err) => {
                let _ = writeln!(stderr, "migrate up: {err}");
                1
            }
        },
        MigratePlan::Down(steps) => match db.migrate_down(steps) {
            Ok(rolled_back) => {
                let _ = writeln!(stdout, "rolled back {rolled_back} migration(s)");
                write_version_line(&db, stdout, stderr)
            }
            Err(err) => {
                let _ = writeln!(stderr, "migrate down: {err}");
                1
            }
        },
        MigratePlan::To(target) => match db.migrate_to(target) {
            Ok(()) => write_version_line(&db, stdout, stderr),
            Err(err) => {
                let _ = writeln!(stderr, "migrate to {target}: {err}");
                1
            }
        },
    }
}

fn run_status(invocation: &Invocation, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let db = match open_store(&invocation.db_path) {
        Ok(db) => db,
        Err(err) => {
            let _ = writeln!(stderr, "open {}: {err}", invocation.db_path);
            return 1;
        }
    };

    let status = match db.migration_status() {
        Ok(status) => status,
        Err(err) => {
            let _ = writeln!(stderr, "migration status: {err}");
            return 1;
        }
    };

    let _ = writeln!(stdout, "database: {}", invocation.db_path);
    for entry in &status {
        let marker = if entry.applied { "x" } else { " " };
        if entry.applied {
            let _ = writeln!(
                stdout,
                "[{marker}] {:03} {} (applied {})",
                entry.version, entry.description, entry.applied_at
            );
        } else {
            let _ = writeln!(stdout, "[{marker}] {:03} {} (pending)", entry.version, entry.description);
        }
    }
    write_version_line(&db, stdout, stderr)
}

fn write_version_line(db: &Store, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    match db.schema_version() {
        Ok(version) => {
            let _ = writeln!(stdout, "schema version: {version}");
            0
        }
        Err(err) => {
            let _ = writeln!(stderr, "schema version: {err}");
            1
        }
    }
}

fn open_store(path: &str) -> Result<Store, StoreError> {
    Store::open(Config::new(path))
}

fn parse_invocation(args: &[String]) -> Invocation {
    let mut db_path = std::env::var("TABWARDEN_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let mut command = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--db" => {
                if let Some(value) = iter.next() {
                    db_path = value.clone();
                }
            }
            _ => command.push(arg.clone()),
        }
    }

    Invocation { db_path, command }
}

fn write_help(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "Schema maintenance for a Tabwarden database file.")?;
    writeln!(out)?;
    writeln!(out, "Usage:")?;
    writeln!(out, "  tabwarden-db [--db <path>] <command>")?;
    writeln!(out)?;
    writeln!(out, "Commands:")?;
    writeln!(out, "  migrate up              apply all pending migrations")?;
    writeln!(out, "  migrate down [steps]    roll back the newest migrations (default 1)")?;
    writeln!(out, "  migrate to <version>    migrate up or down to an exact version")?;
    writeln!(out, "  status                  list migrations and whether each is applied")?;
    writeln!(out, "  version                 print the binary version")?;
    writeln!(out)?;
    writeln!(out, "The database path defaults to $TABWARDEN_DB, then {DEFAULT_DB_PATH}.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    fn run(list: &[&str]) -> (i32, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_with_args(&args(list), &mut stdout, &mut stderr);
        (
            code,
            String::from_utf8_lossy(&stdout).to_string(),
            String::from_utf8_lossy(&stderr).to_string(),
        )
    }

    fn temp_db_path(tag: &str) -> PathBuf {
        let nanos = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_nanos(),
            Err(_) => 0,
        };
        let mut path = std::env::temp_dir();
        path.push(format!(
            "tabwarden-bin-{tag}-{nanos}-{}.sqlite",
            std::process::id()
        ));
        path
    }

    #[test]
    fn no_args_prints_help() {
        let (code, stdout, _) = run(&[]);
        assert_eq!(code, 0);
        assert!(stdout.contains("migrate up"));
        assert!(stdout.contains("tabwarden-db [--db <path>] <command>"));
    }

    #[test]
    fn unknown_command_fails_with_usage() {
        let (code, _, stderr) = run(&["vacuum"]);
        assert_eq!(code, 2);
        assert!(stderr.contains("unknown command: vacuum"));
    }

    #[test]
    fn version_prints_crate_label() {
        let (code, stdout, _) = run(&["version"]);
        assert_eq!(code, 0);
        assert!(stdout.starts_with("tabwarden-db "));
    }

    #[test]
    fn migrate_up_then_status_reports_applied() {
        let db_path = temp_db_path("migrate-up");
        let path_arg = db_path.display().to_string();

        let (code, stdout, stderr) = run(&["--db", &path_arg, "migrate", "up"]);
        assert_eq!(code, 0, "stderr: {stderr}");
        assert!(stdout.contains("applied 3 migration(s)"));
        assert!(stdout.contains("schema version: 3"));

        let (code, stdout, _) = run(&["--db", &path_arg, "status"]);
        assert_eq!(code, 0);
        assert!(stdout.contains("[x] 001 initial schema"));
        assert!(stdout.contains("[x] 002 snapshots"));
        assert!(stdout.contains("[x] 003 resources"));

        let _ = std::fs::remove_file(db_path);
    }

    #[test]
    fn migrate_down_rolls_back_one_step() {
        let db_path = temp_db_path("migrate-down");
        let path_arg = db_path.display().to_string();

        let (code, _, stderr) = run(&["--db", &path_arg, "migrate", "up"]);
        assert_eq!(code, 0, "stderr: {stderr}");

        let (code, stdout, _) = run(&["--db", &path_arg, "migrate", "down"]);
        assert_eq!(code, 0);
        assert!(stdout.contains("rolled back 1 migration(s)"));
        assert!(stdout.contains("schema version: 2"));

        let (code, stdout, _) = run(&["--db", &path_arg, "status"]);
        assert_eq!(code, 0);
        assert!(stdout.contains("[ ] 003 resources (pending)"));

        let _ = std::fs::remove_file(db_path);
    }

    #[test]
    fn migrate_to_reaches_exact_version() {
        let db_path = temp_db_path("migrate-to");
        let path_arg = db_path.display().to_string();

        let (code, stdout, stderr) = run(&["--db", &path_arg, "migrate", "to", "2"]);
        assert_eq!(code, 0, "stderr: {stderr}");
        assert!(stdout.contains("schema version: 2"));

        let (code, stdout, _) = run(&["--db", &path_arg, "migrate", "to", "0"]);
        assert_eq!(code, 0);
        assert!(stdout.contains("schema version: 0"));

        let _ = std::fs::remove_file(db_path);
    }

    #[test]
    fn migrate_rejects_bad_arguments() {
        let (code, _, stderr) = run(&["migrate", "sideways"]);
        assert_eq!(code, 2);
        assert!(stderr.contains("usage: tabwarden-db migrate"));

        let db_path = temp_db_path("bad-steps");
        let path_arg = db_path.display().to_string();
        let (code, _, stderr) = run(&["--db", &path_arg, "migrate", "down", "zero"]);
        assert_eq!(code, 2);
        assert!(stderr.contains("invalid step count: zero"));
        let _ = std::fs::remove_file(db_path);
    }
}
