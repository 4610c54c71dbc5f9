//! `shutil`.

use crate::error::GuestError;
use crate::objects::{ModuleObject, NativeFunction};
use crate::value::Value;
use std::fs;
use std::path::Path;

pub fn module() -> ModuleObject {
    ModuleObject::new("shutil", Some("High-level file operations."))
        .with(
            "copy",
            NativeFunction::with_args(
                "copy",
                "Copy a file. If dst is a directory the file keeps its name. Returns the destination.",
                |args| {
                    args.check(2, &["src", "dst"])?;
                    let src = args.str(0, "src")?;
                    let dst = args.str(1, "dst")?;
                    let target = match Path::new(src).file_name() {
                        Some(name) if Path::new(dst).is_dir() => Path::new(dst).join(name),
                        _ => Path::new(dst).to_path_buf(),
                    };
                    fs::copy(src, &target).map_err(|e| GuestError::os_error(&e, src))?;
                    Ok(Value::str(target.to_string_lossy()))
                },
            )
            .into_ref(),
        )
        .with(
            "rmtree",
            NativeFunction::with_args("rmtree", "Delete a directory tree.", |args| {
                args.check(1, &["path"])?;
                let path = args.str(0, "path")?;
                fs::remove_dir_all(path).map_err(|e| GuestError::os_error(&e, path))?;
                Ok(Value::None)
            })
            .into_ref(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::GuestObject;

    #[test]
    fn test_copy_into_directory_then_rmtree() {
        let shutil = module();
        let dir = std::env::temp_dir().join(format!("guestwire-shutil-{}", std::process::id()));
        fs::create_dir_all(dir.join("dest")).unwrap();
        let src = dir.join("a.txt");
        fs::write(&src, "payload").unwrap();

        let copied = shutil
            .call_method(
                "copy",
                vec![
                    Value::str(src.to_string_lossy()),
                    Value::str(dir.join("dest").to_string_lossy()),
                ],
                vec![],
            )
            .unwrap();
        let copied = copied.as_str().unwrap().to_string();
        assert!(copied.ends_with("dest/a.txt"));
        assert_eq!(fs::read_to_string(&copied).unwrap(), "payload");

        shutil
            .call_method("rmtree", vec![Value::str(dir.to_string_lossy())], vec![])
            .unwrap();
        assert!(!dir.exists());
    }
}
