//! `os` and `os.path`.

use crate::args::Args;
use crate::error::{GuestError, Result};
use crate::objects::{ModuleObject, NativeFunction};
use crate::value::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub fn module() -> ModuleObject {
    ModuleObject::new("os", Some("Operating system interfaces."))
        .with("sep", "/")
        .with("name", "posix")
        .with(
            "getcwd",
            NativeFunction::with_args("getcwd", "Return the current working directory.", |args| {
                args.check(0, &[])?;
                let cwd = std::env::current_dir().map_err(|e| GuestError::os_error(&e, "."))?;
                Ok(Value::str(cwd.to_string_lossy()))
            })
            .into_ref(),
        )
        .with(
            "listdir",
            NativeFunction::with_args(
                "listdir",
                "Return the names of the entries in a directory, sorted.",
                |args| {
                    args.check(1, &["path"])?;
                    let path = args.opt_str(0, "path")?.unwrap_or(".");
                    let mut names = fs::read_dir(path)
                        .map_err(|e| GuestError::os_error(&e, path))?
                        .map(|entry| {
                            entry
                                .map(|e| e.file_name().to_string_lossy().into_owned())
                                .map_err(|e| GuestError::os_error(&e, path))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    names.sort();
                    Ok(Value::List(names.into_iter().map(Value::Str).collect()))
                },
            )
            .into_ref(),
        )
        .with(
            "getenv",
            NativeFunction::with_args(
                "getenv",
                "Return an environment variable, or default if it is unset.",
                |args| {
                    args.check(2, &["key", "default"])?;
                    let key = args.str(0, "key")?;
                    match std::env::var(key) {
                        Ok(value) => Ok(Value::Str(value)),
                        Err(_) => Ok(args.get(1, "default").cloned().unwrap_or(Value::None)),
                    }
                },
            )
            .into_ref(),
        )
        .with(
            "remove",
            NativeFunction::with_args("remove", "Remove a file.", |args| {
                args.check(1, &["path"])?;
                let path = args.str(0, "path")?;
                fs::remove_file(path).map_err(|e| GuestError::os_error(&e, path))?;
                Ok(Value::None)
            })
            .into_ref(),
        )
        .with(
            "mkdir",
            NativeFunction::with_args("mkdir", "Create a directory.", |args| {
                args.check(1, &["path"])?;
                let path = args.str(0, "path")?;
                fs::create_dir(path).map_err(|e| exists_error(&e, path))?;
                Ok(Value::None)
            })
            .into_ref(),
        )
        .with(
            "makedirs",
            NativeFunction::with_args(
                "makedirs",
                "Create a directory and any missing parents.",
                |args| {
                    args.check(2, &["name", "exist_ok"])?;
                    let path = args.str(0, "name")?;
                    if Path::new(path).is_dir() && !args.flag(1, "exist_ok") {
                        return Err(GuestError::raise_named(
                            "FileExistsError",
                            format!("File exists: '{path}'"),
                        ));
                    }
                    fs::create_dir_all(path).map_err(|e| exists_error(&e, path))?;
                    Ok(Value::None)
                },
            )
            .into_ref(),
        )
        .with(
            "rmdir",
            NativeFunction::with_args("rmdir", "Remove an empty directory.", |args| {
                args.check(1, &["path"])?;
                let path = args.str(0, "path")?;
                fs::remove_dir(path).map_err(|e| GuestError::os_error(&e, path))?;
                Ok(Value::None)
            })
            .into_ref(),
        )
        .with(
            "rename",
            NativeFunction::with_args("rename", "Rename a file or directory.", |args| {
                args.check(2, &["src", "dst"])?;
                let src = args.str(0, "src")?;
                let dst = args.str(1, "dst")?;
                fs::rename(src, dst).map_err(|e| GuestError::os_error(&e, src))?;
                Ok(Value::None)
            })
            .into_ref(),
        )
        .with(
            "getpid",
            NativeFunction::with_args("getpid", "Return the agent's process id.", |args| {
                args.check(0, &[])?;
                Ok(Value::Int(i64::from(std::process::id())))
            })
            .into_ref(),
        )
}

pub fn path_module() -> ModuleObject {
    ModuleObject::new("os.path", Some("Pathname manipulations."))
        .with(
            "join",
            NativeFunction::with_args(
                "join",
                "Join path components. An absolute component discards what came before it.",
                |args| {
                    args.check(usize::MAX, &[])?;
                    let mut parts = Vec::with_capacity(args.positional().len());
                    for (i, _) in args.positional().iter().enumerate() {
                        parts.push(args.str(i, "path")?);
                    }
                    Ok(Value::Str(join(&parts)))
                },
            )
            .into_ref(),
        )
        .with("exists", predicate("exists", "Whether the path exists.", Path::exists))
        .with("isfile", predicate("isfile", "Whether the path is a regular file.", Path::is_file))
        .with("isdir", predicate("isdir", "Whether the path is a directory.", Path::is_dir))
        .with(
            "basename",
            NativeFunction::with_args("basename", "Final component of a path.", |args| {
                args.check(1, &["p"])?;
                Ok(Value::str(basename(args.str(0, "p")?)))
            })
            .into_ref(),
        )
        .with(
            "dirname",
            NativeFunction::with_args("dirname", "Directory component of a path.", |args| {
                args.check(1, &["p"])?;
                Ok(Value::str(dirname(args.str(0, "p")?)))
            })
            .into_ref(),
        )
        .with(
            "getsize",
            NativeFunction::with_args("getsize", "Size of a file in bytes.", |args| {
                args.check(1, &["filename"])?;
                let path = args.str(0, "filename")?;
                let meta = fs::metadata(path).map_err(|e| GuestError::os_error(&e, path))?;
                Ok(Value::Int(meta.len() as i64))
            })
            .into_ref(),
        )
        .with(
            "abspath",
            NativeFunction::with_args("abspath", "Absolute, normalized version of a path.", |args| {
                args.check(1, &["path"])?;
                let path = args.str(0, "path")?;
                let base = std::env::current_dir().map_err(|e| GuestError::os_error(&e, "."))?;
                Ok(Value::str(normalize(&base.join(path)).to_string_lossy()))
            })
            .into_ref(),
        )
}

fn predicate(name: &str, doc: &'static str, test: fn(&Path) -> bool) -> Value {
    NativeFunction::with_args(name, doc, move |args| {
        args.check(1, &["path"])?;
        Ok(Value::Bool(test(Path::new(args.str(0, "path")?))))
    })
    .into_ref()
    .into()
}

fn exists_error(err: &std::io::Error, path: &str) -> GuestError {
    if err.kind() == std::io::ErrorKind::AlreadyExists {
        GuestError::raise_named("FileExistsError", format!("File exists: '{path}'"))
    } else {
        GuestError::os_error(err, path)
    }
}

fn join(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts {
        if part.starts_with('/') {
            out = part.to_string();
        } else if out.is_empty() || out.ends_with('/') {
            out.push_str(part);
        } else {
            out.push('/');
            out.push_str(part);
        }
    }
    out
}

fn basename(path: &str) -> &str {
    path.rfind('/').map_or(path, |i| &path[i + 1..])
}

fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => {
            let head = &path[..=i];
            let trimmed = head.trim_end_matches('/');
            if trimmed.is_empty() {
                head
            } else {
                trimmed
            }
        }
        None => "",
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
