//! `linkerd check` run against the cluster before anything gets applied.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use anyhow::anyhow;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::apply::Client;
use crate::exec::{Executor, Invocation};

pub const LINKERD_VERSION: &str = "stable-2.8.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
    Wide,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Json => "json",
            OutputFormat::Table => "table",
            OutputFormat::Wide => "wide",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            "wide" => Ok(OutputFormat::Wide),
            other => Err(anyhow!(
                "unknown output format {:?}, expected one of: json, table, wide",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    pub pre_install_only: bool,
    pub data_plane_only: bool,
    pub wait: bool,
    pub cni_enabled: bool,
    pub output: OutputFormat,
    pub version: String,
}

impl CheckOptions {
    pub fn new(version: &str) -> CheckOptions {
        CheckOptions {
            pre_install_only: false,
            data_plane_only: true,
            wait: false,
            cni_enabled: false,
            output: OutputFormat::Json,
            version: String::from(version),
        }
    }

    fn flags(&self) -> Vec<String> {
        let mut flags = vec![
            String::from("--output"),
            self.output.to_string(),
            String::from("--expected-version"),
            self.version.clone(),
        ];
        if self.pre_install_only {
            flags.push(String::from("--pre"));
        }
        if self.data_plane_only {
            flags.push(String::from("--proxy"));
        }
        if self.cni_enabled {
            flags.push(String::from("--linkerd-cni-enabled"));
        }
        flags.push(String::from(if self.wait { "--wait=5m" } else { "--wait=0s" }));
        flags
    }
}

impl Default for CheckOptions {
    fn default() -> CheckOptions {
        CheckOptions::new(LINKERD_VERSION)
    }
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("unable to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed: {output}")]
    Failed { command: String, output: String },
}

pub struct PreCheck<'a> {
    client: &'a Client,
    linkerd: String,
    options: CheckOptions,
    executor: &'a dyn Executor,
}

impl<'a> PreCheck<'a> {
    pub fn new(client: &'a Client, linkerd: &str, executor: &'a dyn Executor) -> PreCheck<'a> {
        PreCheck {
            client,
            linkerd: String::from(linkerd),
            options: CheckOptions::default(),
            executor,
        }
    }

    pub fn with_options(mut self, options: CheckOptions) -> PreCheck<'a> {
        self.options = options;
        self
    }

    fn invocation(&self, namespace: &str) -> Invocation {
        let mut inv = Invocation::new(&self.linkerd)
            .arg(self.client.context_arg())
            .arg("check")
            .arg("--linkerd-namespace")
            .arg(namespace);
        inv.args.extend(self.options.flags());
        inv
    }

    /// Runs the check for `namespace` and hands back its report untouched.
    /// The report goes to `out` and diagnostics to `err` as well.
    pub fn pre_check(
        &self,
        namespace: &str,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<String, CheckError> {
        let inv = self.invocation(namespace);
        let captured = self.executor.run(&inv, "").map_err(|source| {
            error!(command = %inv, cause = %source, "unable to run linkerd check");
            CheckError::Spawn {
                command: inv.to_string(),
                source,
            }
        })?;

        if let Err(e) = out.write_all(&captured.stdout) {
            debug!(error = %e, "unable to write the check report");
        }
        if let Err(e) = err.write_all(&captured.stderr) {
            debug!(error = %e, "unable to write check diagnostics");
        }

        if !captured.success() {
            let e = CheckError::Failed {
                command: inv.to_string(),
                output: captured.combined(),
            };
            error!("{}", e);
            return Err(e);
        }

        let report = String::from_utf8_lossy(&captured.stdout).into_owned();
        if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&report) {
            if let Some(success) = fields.get("success").and_then(Value::as_bool) {
                debug!(success, "linkerd check reported");
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::apply::Client;
    use crate::check::{CheckError, CheckOptions, OutputFormat, PreCheck};
    use crate::exec::fake::FakeExecutor;
    use std::io::{self, Write};

    const REPORT: &str = r#"{"success":true,"categories":[]}"#;

    #[test]
    fn test_default_options() {
        let options = CheckOptions::default();
        assert_eq!(options.output, OutputFormat::Json);
        assert_eq!(options.version, "stable-2.8.1");
        assert!(!options.pre_install_only);
        assert!(options.data_plane_only);
        assert!(!options.wait);
        assert!(!options.cni_enabled);
    }

    #[test]
    fn test_parse_output_format() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("wide".parse::<OutputFormat>().unwrap(), OutputFormat::Wide);
        assert_eq!(OutputFormat::Table.to_string(), "table");

        let err = "yaml".parse::<OutputFormat>().unwrap_err();
        assert!(err.to_string().contains("json, table, wide"));
    }

    #[test]
    fn test_sink_failure_keeps_report() {
        struct Closed;

        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();
        executor.exit(0, REPORT, "warming up\n");

        let check = PreCheck::new(&client, "linkerd", &executor);
        let report = check.pre_check("linkerd", &mut Closed, &mut Closed).unwrap();
        assert_eq!(report, REPORT);
    }

    #[test]
    fn test_invocation() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();
        executor.exit(0, REPORT, "");

        let check = PreCheck::new(&client, "linkerd", &executor);
        let (mut out, mut err) = (Vec::new(), Vec::new());
        check.pre_check("emojivoto", &mut out, &mut err).unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        let (inv, stdin) = &calls[0];
        assert_eq!(
            inv.to_string(),
            "linkerd --context=kind-mesh check --linkerd-namespace emojivoto \
             --output json --expected-version stable-2.8.1 --proxy --wait=0s"
        );
        assert_eq!(stdin, "");
    }

    #[test]
    fn test_report_is_passed_through() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();
        executor.exit(0, REPORT, "warming up\n");

        let check = PreCheck::new(&client, "linkerd", &executor);
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let report = check.pre_check("linkerd", &mut out, &mut err).unwrap();

        assert_eq!(report, REPORT);
        assert_eq!(out, REPORT.as_bytes());
        assert_eq!(err, b"warming up\n");
    }

    #[test]
    fn test_pre_install_flags() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();
        let options = CheckOptions {
            pre_install_only: true,
            data_plane_only: false,
            wait: true,
            cni_enabled: true,
            output: OutputFormat::Table,
            version: String::from("stable-2.9.0"),
        };

        let check = PreCheck::new(&client, "linkerd", &executor).with_options(options);
        check
            .pre_check("linkerd", &mut io::sink(), &mut io::sink())
            .unwrap();

        let (inv, _) = &executor.calls()[0];
        assert_eq!(
            &inv.args[4..],
            &[
                "--output",
                "table",
                "--expected-version",
                "stable-2.9.0",
                "--pre",
                "--linkerd-cni-enabled",
                "--wait=5m"
            ]
        );
    }

    #[test]
    fn test_failed_check() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();
        executor.exit(1, r#"{"success":false}"#, "control plane unreachable\n");

        let check = PreCheck::new(&client, "linkerd", &executor);
        let err = check
            .pre_check("linkerd", &mut io::sink(), &mut io::sink())
            .unwrap_err();

        match err {
            CheckError::Failed { output, .. } => {
                assert!(output.contains("control plane unreachable"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_spawn_failure() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();
        executor.respond(Err(io::Error::new(io::ErrorKind::NotFound, "no linkerd")));

        let check = PreCheck::new(&client, "linkerd", &executor);
        let err = check
            .pre_check("linkerd", &mut io::sink(), &mut io::sink())
            .unwrap_err();

        assert!(matches!(err, CheckError::Spawn { .. }));
    }
}
