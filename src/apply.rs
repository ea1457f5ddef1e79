//! Applies (or deletes) manifests by piping them into `kubectl`.

use std::io;

use thiserror::Error;
use tracing::{debug, error};

use crate::exec::{Executor, Invocation};

/// Connection settings for a single cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub context_name: String,
}

impl Client {
    pub fn new(context_name: &str) -> Client {
        Client {
            context_name: String::from(context_name),
        }
    }

    pub fn context_arg(&self) -> String {
        format!("--context={}", self.context_name)
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("unable to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {}: {output}", describe_exit(.code))]
    Exec {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => String::from("a signal"),
    }
}

pub struct Applier<'a> {
    client: &'a Client,
    kubectl: String,
    executor: &'a dyn Executor,
}

impl<'a> Applier<'a> {
    pub fn new(client: &'a Client, kubectl: &str, executor: &'a dyn Executor) -> Applier<'a> {
        Applier {
            client,
            kubectl: String::from(kubectl),
            executor,
        }
    }

    pub fn apply(&self, manifest: &str) -> Result<(), ApplyError> {
        self.run("apply", manifest)
    }

    pub fn delete(&self, manifest: &str) -> Result<(), ApplyError> {
        self.run("delete", manifest)
    }

    fn run(&self, verb: &str, manifest: &str) -> Result<(), ApplyError> {
        let inv = Invocation::new(&self.kubectl)
            .arg(self.client.context_arg())
            .args(&[verb, "-f", "-"]);

        let captured = self.executor.run(&inv, manifest).map_err(|source| {
            error!(command = %inv, cause = %source, "unable to run kubectl");
            ApplyError::Spawn {
                command: inv.to_string(),
                source,
            }
        })?;

        let output = captured.combined();
        debug!(command = %inv, "{}", output);

        if !captured.success() {
            let e = ApplyError::Exec {
                command: inv.to_string(),
                code: captured.code,
                output,
            };
            error!("{}", e);
            return Err(e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::apply::{ApplyError, Applier, Client};
    use crate::exec::fake::FakeExecutor;
    use crate::exec::Captured;
    use std::io;

    const MANIFEST: &str = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: emojivoto\n";

    #[test]
    fn test_apply_pipes_manifest() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();

        Applier::new(&client, "kubectl", &executor)
            .apply(MANIFEST)
            .unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        let (inv, stdin) = &calls[0];
        assert_eq!(inv.program, "kubectl");
        assert_eq!(inv.args, vec!["--context=kind-mesh", "apply", "-f", "-"]);
        assert_eq!(stdin, MANIFEST);
    }

    #[test]
    fn test_delete_keeps_context() {
        let client = Client::new("prod");
        let executor = FakeExecutor::new();

        Applier::new(&client, "/usr/local/bin/kubectl", &executor)
            .delete(MANIFEST)
            .unwrap();

        let (inv, _) = &executor.calls()[0];
        assert_eq!(inv.to_string(), "/usr/local/bin/kubectl --context=prod delete -f -");
    }

    #[test]
    fn test_empty_manifest_still_runs() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();

        Applier::new(&client, "kubectl", &executor).apply("").unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "");
        assert!(calls[0].0.args.contains(&String::from("--context=kind-mesh")));
    }

    #[test]
    fn test_non_zero_exit() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();
        executor.exit(1, "", "error: no objects passed to apply\n");

        let err = Applier::new(&client, "kubectl", &executor)
            .apply("")
            .unwrap_err();

        match &err {
            ApplyError::Exec { code, output, .. } => {
                assert_eq!(*code, Some(1));
                assert_eq!(output, "error: no objects passed to apply\n");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("exited with status 1"));
        assert!(message.contains("no objects passed"));
    }

    #[test]
    fn test_killed_by_signal() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();
        executor.respond(Ok(Captured {
            code: None,
            ..Default::default()
        }));

        let err = Applier::new(&client, "kubectl", &executor)
            .apply(MANIFEST)
            .unwrap_err();
        assert!(!err.to_string().is_empty());
        assert!(err.to_string().contains("a signal"));
    }

    #[test]
    fn test_spawn_failure() {
        let client = Client::new("kind-mesh");
        let executor = FakeExecutor::new();
        executor.respond(Err(io::Error::new(io::ErrorKind::NotFound, "kubectl")));

        let err = Applier::new(&client, "kubectl", &executor)
            .apply(MANIFEST)
            .unwrap_err();
        assert!(matches!(err, ApplyError::Spawn { .. }));
    }
}
