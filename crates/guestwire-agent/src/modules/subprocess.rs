//! `subprocess`: run commands in the guest.

use crate::args::Args;
use crate::config::Limits;
use crate::error::{GuestError, Result};
use crate::objects::{ModuleObject, NativeFunction};
use crate::value::{GuestObject, Kwargs, Value};
use guestwire_protocol::MethodDescriptor;
use std::process::Command;
use tracing::{debug, trace, warn};

/// Truncate a string to max bytes, preserving UTF-8 boundaries.
fn truncate_output(s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_string();
    truncated.push_str("\n... [output truncated]");
    truncated
}

/// Result of a finished command.
#[derive(Debug)]
pub struct CompletedProcess {
    args: Value,
    returncode: i64,
    stdout: String,
    stderr: String,
}

impl CompletedProcess {
    fn failure(&self) -> Option<GuestError> {
        (self.returncode != 0).then(|| {
            GuestError::raise_named(
                "CalledProcessError",
                format!(
                    "Command '{}' returned non-zero exit status {}.",
                    self.args.to_display(),
                    self.returncode
                ),
            )
        })
    }
}

impl GuestObject for CompletedProcess {
    fn class_name(&self) -> &str {
        "CompletedProcess"
    }

    fn module_name(&self) -> &str {
        "subprocess"
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        vec![MethodDescriptor::new(
            "check_returncode",
            Some("Raise CalledProcessError if the exit code is non-zero."),
        )]
    }

    fn attr_names(&self) -> Vec<String> {
        ["args", "returncode", "stdout", "stderr"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "args" => Ok(self.args.clone()),
            "returncode" => Ok(Value::Int(self.returncode)),
            "stdout" => Ok(Value::str(&self.stdout)),
            "stderr" => Ok(Value::str(&self.stderr)),
            _ => Err(GuestError::attribute_error(self.class_name(), name)),
        }
    }

    fn call_method(&self, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        match name {
            "check_returncode" => {
                Args::new(name, &args, &kwargs).check(0, &[])?;
                match self.failure() {
                    Some(err) => Err(err),
                    None => Ok(Value::None),
                }
            }
            _ => Err(GuestError::attribute_error(self.class_name(), name)),
        }
    }

    fn repr(&self) -> String {
        format!(
            "CompletedProcess(args={}, returncode={})",
            self.args.to_repr(),
            self.returncode
        )
    }
}

pub fn module(limits: Limits) -> ModuleObject {
    ModuleObject::new("subprocess", Some("Run commands in the guest."))
        .with(
            "run",
            NativeFunction::with_args(
                "run",
                "Run a command and return a CompletedProcess. With shell=True the command is a string passed to sh -c.",
                move |args| {
                    args.check(1, &["args", "shell", "check"])?;
                    let process = run(args, limits)?;
                    if args.flag(2, "check") {
                        if let Some(err) = process.failure() {
                            return Err(err);
                        }
                    }
                    Ok(Value::Object(std::sync::Arc::new(process)))
                },
            )
            .into_ref(),
        )
        .with(
            "check_output",
            NativeFunction::with_args(
                "check_output",
                "Run a command and return its stdout. Raises CalledProcessError on a non-zero exit.",
                move |args| {
                    args.check(1, &["args", "shell"])?;
                    let process = run(args, limits)?;
                    match process.failure() {
                        Some(err) => Err(err),
                        None => Ok(Value::Str(process.stdout)),
                    }
                },
            )
            .into_ref(),
        )
}

fn run(args: &Args<'_>, limits: Limits) -> Result<CompletedProcess> {
    let target = args.required(0, "args")?;
    let shell = args.flag(1, "shell");
    let mut command = build_command(target, shell)?;

    debug!(args = %target.to_display(), shell, "running command");
    let output = command.output().map_err(|e| {
        warn!(error = %e, args = %target.to_display(), "command execution failed");
        GuestError::os_error(&e, &target.to_display())
    })?;

    let returncode = output.status.code().map(i64::from).unwrap_or(-1);
    let stdout = truncate_output(
        String::from_utf8_lossy(&output.stdout).into_owned(),
        limits.max_output,
    );
    let stderr = truncate_output(
        String::from_utf8_lossy(&output.stderr).into_owned(),
        limits.max_output,
    );
    debug!(
        returncode,
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "command completed"
    );
    trace!(stdout = %stdout, stderr = %stderr, "command output");

    Ok(CompletedProcess {
        args: target.clone(),
        returncode,
        stdout,
        stderr,
    })
}

fn build_command(target: &Value, shell: bool) -> Result<Command> {
    let argv: Vec<String> = match target {
        Value::Str(cmd) if shell => vec!["sh".into(), "-c".into(), cmd.clone()],
        Value::Str(program) => vec![program.clone()],
        Value::List(items) | Value::Tuple(items) => {
            let argv = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        GuestError::type_error(format!(
                            "expected str in argument list, not {}",
                            item.type_name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if shell {
                vec!["sh".into(), "-c".into(), argv.join(" ")]
            } else {
                argv
            }
        }
        other => {
            return Err(GuestError::type_error(format!(
                "expected str or list of str, not {}",
                other.type_name()
            )))
        }
    };

    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| GuestError::value_error("empty command"))?;
    let mut command = Command::new(program);
    command.args(rest);
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits::default()
    }

    fn call(name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        module(limits()).call_method(name, args, kwargs)
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("hello".into(), 10), "hello");
        let out = truncate_output("héllo".into(), 2);
        assert!(out.starts_with('h'));
        assert!(out.ends_with("[output truncated]"));
    }

    #[test]
    fn test_run_list() {
        let result = call(
            "run",
            vec![Value::List(vec![Value::str("echo"), Value::str("hi")])],
            vec![],
        )
        .unwrap();
        let process = result.as_object().unwrap();
        assert_eq!(process.get_attr("returncode").unwrap(), Value::Int(0));
        assert_eq!(process.get_attr("stdout").unwrap(), Value::str("hi\n"));
    }

    #[test]
    fn test_run_shell_nonzero() {
        let result = call(
            "run",
            vec![Value::str("echo oops >&2; exit 3")],
            vec![("shell".into(), Value::Bool(true))],
        )
        .unwrap();
        let process = result.as_object().unwrap();
        assert_eq!(process.get_attr("returncode").unwrap(), Value::Int(3));
        assert_eq!(process.get_attr("stderr").unwrap(), Value::str("oops\n"));

        let err = process
            .call_method("check_returncode", vec![], vec![])
            .unwrap_err();
        assert!(err.to_string().starts_with("CalledProcessError"));
    }

    #[test]
    fn test_check_output() {
        let out = call(
            "check_output",
            vec![Value::str("printf abc")],
            vec![("shell".into(), Value::Bool(true))],
        )
        .unwrap();
        assert_eq!(out, Value::str("abc"));

        let err = call(
            "check_output",
            vec![Value::List(vec![Value::str("false")])],
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("non-zero exit status 1"));
    }

    #[test]
    fn test_missing_program() {
        let err = call(
            "run",
            vec![Value::List(vec![Value::str("/nonexistent/guestwire-bin")])],
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("FileNotFoundError"));
    }
}
