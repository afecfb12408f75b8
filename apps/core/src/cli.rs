use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{self, Config};
use crate::core_service::ServiceError;
use crate::discovery::{DiscoveryProvider, FilesystemAppProvider};
use crate::logging;
use crate::model::PluginDescriptor;
use crate::package_manager::{InstallOptions, PackageManager, PackageManagerOptions};
use crate::plugin_store::LocalPlugins;
use crate::search::{ActionTarget, SearchEngine, SearchOptions};

#[derive(Parser, Debug)]
#[command(name = "hopper-core", version, about = "Plugin and search core of the hopper launcher")]
pub struct Cli {
    #[arg(short, long, value_name = "FILE", env = "HOPPER_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CliCommand {
    /// Install plugin packages and register them locally.
    Install {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long)]
        dev: bool,
    },
    Uninstall {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long)]
        dev: bool,
    },
    Update {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Reinstall a plugin when the registry has a newer version.
    Upgrade {
        name: String,
    },
    /// Installed package names from the plugin manifest.
    List,
    /// Print a plugin's descriptor, local copy first.
    Info {
        name: String,
        #[arg(long, value_name = "PLUGIN_JSON")]
        path: Option<PathBuf>,
    },
    Search {
        query: String,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        no_apps: bool,
    },
}

pub fn run(cli: Cli) -> Result<(), ServiceError> {
    let cfg = config::load(cli.config.as_deref())?;
    match logging::init(&cfg.log_dir) {
        Ok(path) => log::info!("logging to {}", path.display()),
        Err(err) => eprintln!("[hopper-core] file logging disabled: {err}"),
    }

    let manager = PackageManager::with_defaults(PackageManagerOptions::from(&cfg.plugins))?;
    match cli.command {
        CliCommand::Install { names, dev } => {
            let mut plugins = LocalPlugins::for_manager(&manager);
            for name in names {
                let mut descriptor = if dev {
                    PluginDescriptor::new(&name)
                } else {
                    manager.adapter_info(&name, None)?
                };
                descriptor.name = name;
                descriptor.dev_mode = dev;
                let installed = plugins.download(&manager, descriptor)?;
                println!("{} plugin(s) installed", installed.len());
            }
        }
        CliCommand::Uninstall { names, dev } => {
            let mut plugins = LocalPlugins::for_manager(&manager);
            for name in names {
                match plugins.find(&name) {
                    Some(plugin) => plugins.delete(&manager, &plugin)?,
                    None => manager.uninstall(&[name], InstallOptions { is_dev: dev }),
                }
            }
        }
        CliCommand::Update { names } => manager.update(&names),
        CliCommand::Upgrade { name } => {
            if manager.upgrade(&name)? {
                println!("{name} upgraded");
            } else {
                println!("{name} is up to date");
            }
        }
        CliCommand::List => {
            for name in manager.list()? {
                println!("{name}");
            }
        }
        CliCommand::Info { name, path } => {
            let descriptor = manager.adapter_info(&name, path.as_deref())?;
            match serde_json::to_string_pretty(&descriptor) {
                Ok(encoded) => println!("{encoded}"),
                Err(err) => eprintln!("[hopper-core] could not encode descriptor: {err}"),
            }
        }
        CliCommand::Search {
            query,
            strict,
            no_apps,
        } => search(&cfg, &manager, &query, strict, no_apps)?,
    }
    Ok(())
}

fn search(
    cfg: &Config,
    manager: &PackageManager,
    query: &str,
    strict: bool,
    no_apps: bool,
) -> Result<(), ServiceError> {
    let plugins = LocalPlugins::for_manager(manager);
    let mut engine = SearchEngine::new(
        Box::new(plugins.file().clone()),
        SearchOptions {
            match_cache_capacity: cfg.search.match_cache_capacity,
            plugin_cache_ttl: Duration::from_millis(cfg.search.plugin_cache_ttl_ms),
            incremental: false,
        },
    );
    if !no_apps {
        let mut provider =
            FilesystemAppProvider::from_config(&cfg.apps, cfg.search.icon_cache_capacity);
        engine.set_apps(provider.discover()?);
    }
    for option in engine.get_options_from_query(query, strict) {
        let origin = match &option.action {
            ActionTarget::OpenPlugin(launch) => launch.plugin.name.as_str(),
            ActionTarget::LaunchApp(app) => app.command.as_str(),
        };
        println!("{:>6}  {}  ({origin})", option.weight, option.name);
    }
    Ok(())
}
