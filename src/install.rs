//! Installing a demo app: fetch the manifest, check the cluster, apply.

use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::app::DemoApp;
use crate::apply::{Applier, ApplyError, Client};
use crate::check::{CheckError, CheckOptions, PreCheck};
use crate::exec::Executor;
use crate::fetch::{FetchError, Fetcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub app: DemoApp,
    pub namespace: String,
    pub delete: bool,
    pub skip_check: bool,
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("download of the {app} manifest failed")]
    Download {
        app: DemoApp,
        #[source]
        source: FetchError,
    },

    #[error("pre-check in namespace {namespace} failed")]
    Check {
        namespace: String,
        #[source]
        source: CheckError,
    },

    #[error("applying the {app} manifest failed")]
    Apply {
        app: DemoApp,
        #[source]
        source: ApplyError,
    },
}

pub struct Installer<'a> {
    pub client: Client,
    pub fetcher: Fetcher,
    pub executor: &'a dyn Executor,
    pub cache_dir: PathBuf,
    pub kubectl: String,
    pub linkerd: String,
    pub check_options: CheckOptions,
}

impl<'a> Installer<'a> {
    pub fn manifest(&self, app: DemoApp) -> Result<String, InstallError> {
        self.fetcher
            .get_manifest(app.remote_url(), &app.local_file(&self.cache_dir))
            .map_err(|source| InstallError::Download { app, source })
    }

    pub fn pre_check(
        &self,
        namespace: &str,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<String, InstallError> {
        PreCheck::new(&self.client, &self.linkerd, self.executor)
            .with_options(self.check_options.clone())
            .pre_check(namespace, out, err)
            .map_err(|source| InstallError::Check {
                namespace: String::from(namespace),
                source,
            })
    }

    pub fn execute_install(
        &self,
        request: &InstallRequest,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<(), InstallError> {
        let manifest = self.manifest(request.app)?;

        if !request.delete && !request.skip_check {
            info!(namespace = %request.namespace, "running pre-check");
            self.pre_check(&request.namespace, out, err)?;
        }

        let applier = Applier::new(&self.client, &self.kubectl, self.executor);
        let result = if request.delete {
            info!(app = %request.app, context = %self.client.context_name, "deleting");
            applier.delete(&manifest)
        } else {
            info!(app = %request.app, context = %self.client.context_name, "applying");
            applier.apply(&manifest)
        };

        result.map_err(|source| InstallError::Apply {
            app: request.app,
            source,
        })
    }
}
