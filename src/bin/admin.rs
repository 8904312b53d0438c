use std::collections::VecDeque;

use capsule_federation::auth::ApiKeyValidator;
use capsule_federation::domain::{ArtifactId, TrustLevel};
use capsule_federation::infra::Database;

fn print_help() {
    eprintln!(
        "\
capsule-admin

USAGE:
  capsule-admin <command> [options]

COMMANDS:
  migrate                         Run database migrations
  register-peer                   Add or update a federation peer
  revoke-peer                     Remove a federation peer
  list-peers                      List federation peers
  access-log                      Print the access history of an artifact
  generate-api-key                Print a fresh internal API key and its hash

COMMON OPTIONS:
  --database-url <url>            (defaults to env DATABASE_URL)

register-peer OPTIONS:
  --domain <domain>               (required)
  --trust <public|trusted|owner>  (default: trusted)
  --disabled                      (optional) Register with federation disabled

revoke-peer OPTIONS:
  --domain <domain>               (required)

access-log OPTIONS:
  --artifact-id <id>              (required)
"
    );
}

fn require_database_url(database_url: Option<String>) -> anyhow::Result<String> {
    database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (or pass --database-url)"))
}

fn take_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

async fn open_database(database_url: Option<String>) -> anyhow::Result<Database> {
    let database_url = require_database_url(database_url)?;
    let database = Database::connect(&database_url, 2).await?;
    database.migrate().await?;
    Ok(database)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    let mut database_url: Option<String> = None;
    let mut domain: Option<String> = None;
    let mut trust = TrustLevel::Trusted;
    let mut enabled = true;
    let mut artifact_id: Option<String> = None;

    while let Some(arg) = args.pop_front() {
        match arg.as_str() {
            "--database-url" => database_url = Some(take_value(&mut args, "--database-url")?),
            "--domain" if matches!(command.as_str(), "register-peer" | "revoke-peer") => {
                domain = Some(take_value(&mut args, "--domain")?);
            }
            "--trust" if command == "register-peer" => {
                trust = take_value(&mut args, "--trust")?
                    .parse()
                    .map_err(|e| anyhow::anyhow!("--trust: {e}"))?;
            }
            "--disabled" if command == "register-peer" => enabled = false,
            "--artifact-id" if command == "access-log" => {
                artifact_id = Some(take_value(&mut args, "--artifact-id")?);
            }
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            other => anyhow::bail!("unexpected argument: {other}"),
        }
    }

    match command.as_str() {
        "generate-api-key" => {
            let (key, key_hash) = ApiKeyValidator::generate_key();
            println!("key:    {key}");
            println!("sha256: {key_hash}");
            Ok(())
        }
        "migrate" => {
            open_database(database_url).await?;
            println!("ok: migrations applied");
            Ok(())
        }
        "register-peer" => {
            let domain = domain.ok_or_else(|| anyhow::anyhow!("--domain is required"))?;
            let stores = open_database(database_url).await?.stores();
            let peer = stores.peers.register(&domain, trust, enabled).await?;
            println!(
                "ok: {} trust={} federation_enabled={}",
                peer.domain,
                peer.trust_level.as_str(),
                peer.federation_enabled
            );
            Ok(())
        }
        "revoke-peer" => {
            let domain = domain.ok_or_else(|| anyhow::anyhow!("--domain is required"))?;
            let stores = open_database(database_url).await?.stores();
            if stores.peers.revoke(&domain).await? {
                println!("ok: {domain} revoked");
            } else {
                println!("ok: {domain} was not registered");
            }
            Ok(())
        }
        "list-peers" => {
            let stores = open_database(database_url).await?.stores();
            for peer in stores.peers.list().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    peer.domain,
                    peer.trust_level.as_str(),
                    if peer.federation_enabled { "enabled" } else { "disabled" },
                    peer.updated_at.to_rfc3339()
                );
            }
            Ok(())
        }
        "access-log" => {
            let artifact_id = artifact_id
                .map(ArtifactId::from)
                .ok_or_else(|| anyhow::anyhow!("--artifact-id is required"))?;
            let stores = open_database(database_url).await?.stores();
            for entry in stores.access_log.history(&artifact_id).await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    entry.timestamp.to_rfc3339(),
                    entry.requesting_domain,
                    entry.requesting_address.as_deref().unwrap_or("-"),
                    if entry.granted { "granted" } else { "denied" },
                    entry.denial_reason.map(|r| r.as_str()).unwrap_or("-")
                );
            }
            Ok(())
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
