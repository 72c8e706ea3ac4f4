use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use publisher::{
    MemoryScriptStore, PublisherConfig, PublisherState, build_admin_app, build_publisher_app,
    init_logging,
};
use script_host::RhaiScriptHost;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = match parse_cli_args() {
        Ok(CliAction::Run(cli)) => cli,
        Ok(CliAction::Help) => {
            print_cli_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("{}", binary_version_text());
            return Ok(());
        }
        Err(err) => {
            eprintln!("error: {err}\n");
            print_cli_help();
            return Err(err.into());
        }
    };

    init_logging()?;
    info!("{}", binary_version_text());

    let mut config = PublisherConfig::from_env()?;
    if let Some(addr) = cli.addr {
        config.addr = addr;
    }
    if let Some(addr) = cli.admin_addr {
        config.admin_addr = addr;
    }
    if let Some(path) = cli.store_path {
        config.store_path = Some(path);
    }
    if let Some(dir) = cli.scripts_dir {
        config.script_host.scripts_dir = dir;
    }

    let store = match config.store_path.as_deref() {
        Some(path) => MemoryScriptStore::load_from_path(config.resolution, path)?,
        None => MemoryScriptStore::new(config.resolution),
    };
    let runtime = Arc::new(RhaiScriptHost::new(config.script_host.clone()));
    info!(
        "script runtime ready scripts_dir={} resolution={:?} response_mode={:?}",
        config.script_host.scripts_dir.display(),
        config.resolution,
        config.response_mode
    );

    let (addr, admin_addr) = (config.addr, config.admin_addr);
    let state = PublisherState::new(config, Arc::new(store), runtime);
    let publisher_app = build_publisher_app(state.clone());
    let admin_app = build_admin_app(state);

    let publisher_listener = tokio::net::TcpListener::bind(addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr).await?;

    info!(
        "publisher listening on http://{}",
        publisher_listener.local_addr()?
    );
    info!(
        "admin endpoint listening on http://{}",
        admin_listener.local_addr()?
    );

    let publisher_server = axum::serve(publisher_listener, publisher_app);
    let admin_server = axum::serve(admin_listener, admin_app);

    tokio::select! {
        result = publisher_server => result?,
        result = admin_server => result?,
    }

    Ok(())
}

#[derive(Clone, Debug, Default)]
struct CliArgs {
    addr: Option<SocketAddr>,
    admin_addr: Option<SocketAddr>,
    store_path: Option<PathBuf>,
    scripts_dir: Option<PathBuf>,
}

enum CliAction {
    Run(CliArgs),
    Help,
    Version,
}

fn parse_cli_args() -> Result<CliAction, String> {
    let mut args = env::args().skip(1);
    let mut cli = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "-V" | "--version" => return Ok(CliAction::Version),
            "--addr" => {
                let value = next_arg_value("--addr", &mut args)?;
                cli.addr = Some(
                    value
                        .parse::<SocketAddr>()
                        .map_err(|_| format!("invalid --addr: {value}"))?,
                );
            }
            "--admin-addr" => {
                let value = next_arg_value("--admin-addr", &mut args)?;
                cli.admin_addr = Some(
                    value
                        .parse::<SocketAddr>()
                        .map_err(|_| format!("invalid --admin-addr: {value}"))?,
                );
            }
            "--store-path" => {
                cli.store_path = Some(PathBuf::from(next_arg_value("--store-path", &mut args)?));
            }
            "--scripts-dir" => {
                cli.scripts_dir = Some(PathBuf::from(next_arg_value("--scripts-dir", &mut args)?));
            }
            _ => {
                return Err(format!("unknown argument: {arg}"));
            }
        }
    }
    Ok(CliAction::Run(cli))
}

fn next_arg_value(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String, String> {
    let value = args
        .next()
        .ok_or_else(|| format!("missing value for {flag}"))?;
    if value.trim().is_empty() {
        return Err(format!("value for {flag} cannot be empty"));
    }
    Ok(value)
}

fn print_cli_help() {
    eprintln!(concat!(
        "Usage: cms-publisher [options]\n\n",
        "Options:\n",
        "  --addr <ADDR>          Public listen address (default: 0.0.0.0:8080)\n",
        "  --admin-addr <ADDR>    Admin endpoint listen address (default: 127.0.0.1:8081)\n",
        "  --store-path <PATH>    Script store snapshot (default: .cms-publisher/scripts.json)\n",
        "  --scripts-dir <DIR>    Directory of pre-deployed scripts (default: scripts)\n",
        "  -V, --version          Show version with git metadata\n",
        "  -h, --help             Show this help\n\n",
        "Every option can also be set through its PUBLISHER_* environment variable.\n"
    ));
}

fn binary_version_text() -> String {
    let binary = env!("CARGO_PKG_NAME");
    let git_tag = option_env!("CMS_BUILD_GIT_TAG").unwrap_or("untagged");
    let git_commit = option_env!("CMS_BUILD_GIT_COMMIT").unwrap_or("unknown");
    let git_dirty = option_env!("CMS_BUILD_GIT_DIRTY").unwrap_or("false");
    let dirty = matches!(git_dirty, "true" | "1" | "yes" | "dirty");

    if dirty {
        format!("{binary} {git_tag} (dirty commit: {git_commit})")
    } else {
        format!("{binary} {git_tag}")
    }
}
