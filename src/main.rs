use anyhow::{anyhow, Result};
mod app;
mod apply;
mod check;
mod config;
mod exec;
mod fetch;
mod install;
mod lock;

use std::io::Write;
use std::path::PathBuf;

use console::{style, Term};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use crate::app::DemoApp;
use crate::apply::Client;
use crate::check::{CheckOptions, OutputFormat};
use crate::config::Settings;
use crate::exec::SystemExecutor;
use crate::fetch::{Fetcher, HttpDownloader};
use crate::install::{InstallRequest, Installer};

#[derive(StructOpt, Debug)]
#[structopt(name = "meshdemo")]
/// Installs the Linkerd demo applications on a Kubernetes cluster
struct Opt {
    /// Kubernetes context to install into
    #[structopt(long, global = true)]
    context: Option<String>,

    /// Configuration file, defaults to ~/.meshdemo/config.yaml
    #[structopt(long, global = true, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Log debug output, including kubectl's
    #[structopt(short, long, global = true)]
    verbose: bool,

    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(StructOpt, Debug)]
enum Cmd {
    /// Checks the cluster and applies a demo app
    Install {
        /// emojivoto or booksapp
        #[structopt(long, default_value = "emojivoto")]
        app: DemoApp,

        /// Namespace the Linkerd control plane runs in
        #[structopt(long, default_value = "linkerd")]
        namespace: String,

        /// Don't run `linkerd check` first
        #[structopt(long)]
        skip_check: bool,
    },
    /// Deletes the resources of a demo app
    Delete {
        #[structopt(long, default_value = "emojivoto")]
        app: DemoApp,

        #[structopt(long, default_value = "linkerd")]
        namespace: String,
    },
    /// Prints the (possibly cached) manifest of a demo app
    Fetch {
        #[structopt(long, default_value = "emojivoto")]
        app: DemoApp,
    },
    /// Runs `linkerd check` against the cluster
    Check {
        #[structopt(long, default_value = "linkerd")]
        namespace: String,

        /// json, table or wide
        #[structopt(long, default_value = "json")]
        output: OutputFormat,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = match path {
        Some(path) => path,
        None => Settings::default_path()?,
    };

    Ok(Settings::load_from(&path)?)
}

fn fetcher(settings: &Settings) -> Result<Fetcher> {
    let downloader = HttpDownloader::new(settings.download_timeout())?;

    Ok(Fetcher::new(Box::new(downloader)).with_cache_period(settings.cache_period()))
}

fn installer<'a>(
    settings: &Settings,
    context: Option<String>,
    executor: &'a SystemExecutor,
) -> Result<Installer<'a>> {
    let context = context
        .or_else(|| settings.context.clone())
        .ok_or_else(|| anyhow!("no Kubernetes context, pass --context or set `context` in the config file"))?;

    Ok(Installer {
        client: Client::new(&context),
        fetcher: fetcher(settings)?,
        executor,
        cache_dir: settings.cache_dir(),
        kubectl: String::from(settings.kubectl()),
        linkerd: String::from(settings.linkerd()),
        check_options: CheckOptions::new(settings.linkerd_version()),
    })
}

fn install(installer: &Installer, request: InstallRequest) -> Result<()> {
    let mut out = Term::stdout();
    let mut err = Term::stderr();

    installer.execute_install(&request, &mut out, &mut err)?;

    let done = if request.delete { "deleted" } else { "installed" };
    writeln!(
        out,
        "{} {} {} in context {}",
        style("✔").green(),
        request.app,
        done,
        installer.client.context_name
    )?;
    Ok(())
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    init_tracing(opt.verbose);

    let settings = load_settings(opt.config)?;
    let executor = SystemExecutor::new(settings.command_timeout());

    match opt.cmd {
        Cmd::Install {
            app,
            namespace,
            skip_check,
        } => {
            let installer = installer(&settings, opt.context, &executor)?;
            install(
                &installer,
                InstallRequest {
                    app,
                    namespace,
                    delete: false,
                    skip_check,
                },
            )
        }
        Cmd::Delete { app, namespace } => {
            let installer = installer(&settings, opt.context, &executor)?;
            install(
                &installer,
                InstallRequest {
                    app,
                    namespace,
                    delete: true,
                    skip_check: true,
                },
            )
        }
        Cmd::Fetch { app } => {
            let manifest = fetcher(&settings)?
                .get_manifest(app.remote_url(), &app.local_file(&settings.cache_dir()))?;
            Term::stdout().write_all(manifest.as_bytes())?;
            Ok(())
        }
        Cmd::Check { namespace, output } => {
            let mut installer = installer(&settings, opt.context, &executor)?;
            installer.check_options.output = output;
            installer.pre_check(&namespace, &mut Term::stdout(), &mut Term::stderr())?;
            Ok(())
        }
    }
}
