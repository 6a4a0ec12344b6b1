use super::*;
use kdeal_core::SelectionPolicyKind;
use uuid::Uuid;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["kdeal", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli = Cli::try_parse_from(["kdeal", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_db_seed_command() {
    let cli = Cli::try_parse_from(["kdeal", "db", "seed"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Seed
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["kdeal"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn sync_run_defaults_to_configured_policy() {
    let cli = Cli::try_parse_from(["kdeal", "sync", "run"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Run {
                policy: None,
                dry_run: false,
                feed_file: None
            }
        })
    ));
}

#[test]
fn sync_run_accepts_policy_and_dry_run() {
    let cli = Cli::try_parse_from([
        "kdeal",
        "sync",
        "run",
        "--policy",
        "top-discount",
        "--dry-run",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Run {
                policy: Some(SelectionPolicyKind::TopDiscount),
                dry_run: true,
                ..
            }
        })
    ));
}

#[test]
fn sync_run_rejects_unknown_policy() {
    assert!(Cli::try_parse_from(["kdeal", "sync", "run", "--policy", "everything"]).is_err());
}

#[test]
fn sync_run_reads_a_feed_file() {
    let cli =
        Cli::try_parse_from(["kdeal", "sync", "run", "--feed-file", "saved/feed.csv.gz"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Run {
                feed_file: Some(ref path),
                ..
            }
        }) if path.ends_with("feed.csv.gz")
    ));
}

#[test]
fn sync_resume_takes_a_run_id() {
    let id = Uuid::new_v4();
    let cli = Cli::try_parse_from(["kdeal", "sync", "resume", &id.to_string()]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Resume { run_id }
        }) if run_id == id
    ));
}

#[test]
fn sync_cancel_rejects_a_malformed_id() {
    assert!(Cli::try_parse_from(["kdeal", "sync", "cancel", "not-a-uuid"]).is_err());
}

#[test]
fn sync_link_variants_parses() {
    let cli = Cli::try_parse_from(["kdeal", "sync", "link-variants"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::LinkVariants
        })
    ));
}

#[test]
fn sync_runs_defaults() {
    let cli = Cli::try_parse_from(["kdeal", "sync", "runs"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Runs {
                limit: 10,
                json: false
            }
        })
    ));
}

#[test]
fn sync_runs_with_limit_and_json() {
    let cli = Cli::try_parse_from(["kdeal", "sync", "runs", "--limit", "3", "--json"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Runs {
                limit: 3,
                json: true
            }
        })
    ));
}

#[test]
fn catalog_shuffle_preview_defaults() {
    let cli = Cli::try_parse_from(["kdeal", "catalog", "shuffle-preview"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Catalog {
            command: CatalogCommands::ShufflePreview {
                category: None,
                limit: 24,
                page: 1
            }
        })
    ));
}

#[test]
fn catalog_shuffle_preview_with_category() {
    let cli = Cli::try_parse_from([
        "kdeal",
        "catalog",
        "shuffle-preview",
        "--category",
        "mode",
        "--limit",
        "12",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Catalog {
            command: CatalogCommands::ShufflePreview {
                category: Some(ref c),
                limit: 12,
                ..
            }
        }) if c == "mode"
    ));
}
