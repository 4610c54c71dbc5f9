//! `sys`, `time` and `platform`.

use crate::error::GuestError;
use crate::objects::{ModuleObject, NativeFunction};
use crate::value::Value;
use guestwire_protocol::ExceptionKind;
use std::time::Duration;

pub fn sys_module() -> ModuleObject {
    ModuleObject::new("sys", Some("Interpreter parameters."))
        .with("platform", std::env::consts::OS)
        .with(
            "version",
            format!("guestwire-agent {}", env!("CARGO_PKG_VERSION")),
        )
        .with("maxsize", i64::MAX)
}

pub fn time_module() -> ModuleObject {
    ModuleObject::new("time", Some("Time access."))
        .with(
            "time",
            NativeFunction::with_args("time", "Seconds since the epoch as a float.", |args| {
                args.check(0, &[])?;
                let micros = chrono::Utc::now().timestamp_micros();
                Ok(Value::Float(micros as f64 / 1_000_000.0))
            })
            .into_ref(),
        )
        .with(
            "sleep",
            NativeFunction::with_args("sleep", "Suspend execution for the given seconds.", |args| {
                args.check(1, &["secs"])?;
                let secs = args.opt_float(0, "secs")?.unwrap_or(0.0);
                if secs.is_nan() {
                    return Err(GuestError::value_error("Invalid value NaN (not a number)"));
                }
                if secs < 0.0 {
                    return Err(GuestError::value_error(
                        "sleep length must be non-negative",
                    ));
                }
                let duration = Duration::try_from_secs_f64(secs).map_err(|_| {
                    GuestError::raise(ExceptionKind::OverflowError, "sleep length is too large")
                })?;
                std::thread::sleep(duration);
                Ok(Value::None)
            })
            .into_ref(),
        )
}

pub fn platform_module() -> ModuleObject {
    ModuleObject::new("platform", Some("Identify the underlying platform."))
        .with(
            "system",
            NativeFunction::with_args("system", "Operating system name, e.g. 'Linux'.", |args| {
                args.check(0, &[])?;
                Ok(Value::str(system_name()))
            })
            .into_ref(),
        )
        .with(
            "node",
            NativeFunction::with_args("node", "Network name of the machine.", |args| {
                args.check(0, &[])?;
                Ok(Value::Str(hostname()))
            })
            .into_ref(),
        )
        .with(
            "machine",
            NativeFunction::with_args("machine", "Machine type, e.g. 'x86_64'.", |args| {
                args.check(0, &[])?;
                Ok(Value::str(std::env::consts::ARCH))
            })
            .into_ref(),
        )
}

fn system_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

fn hostname() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .find_map(|path| std::fs::read_to_string(path).ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::GuestObject;

    #[test]
    fn test_sys_values() {
        let sys = sys_module();
        assert_eq!(sys.get_attr("maxsize").unwrap(), Value::Int(i64::MAX));
        assert_eq!(
            sys.get_attr("platform").unwrap(),
            Value::str(std::env::consts::OS)
        );
    }

    #[test]
    fn test_time_moves_forward() {
        let time = time_module();
        let before = time.call_method("time", vec![], vec![]).unwrap();
        time.call_method("sleep", vec![Value::Float(0.01)], vec![])
            .unwrap();
        let after = time.call_method("time", vec![], vec![]).unwrap();
        assert!(after.as_f64().unwrap() > before.as_f64().unwrap());

        let err = time
            .call_method("sleep", vec![Value::Int(-1)], vec![])
            .unwrap_err();
        assert!(err.to_string().starts_with("ValueError"));
    }

    #[test]
    fn test_sleep_rejects_unrepresentable_lengths() {
        let time = time_module();
        for secs in [1e30, f64::INFINITY] {
            let err = time
                .call_method("sleep", vec![Value::Float(secs)], vec![])
                .unwrap_err();
            assert!(err.is(ExceptionKind::OverflowError), "{secs}: {err}");
        }
        let err = time
            .call_method("sleep", vec![Value::Float(f64::NAN)], vec![])
            .unwrap_err();
        assert!(err.is(ExceptionKind::ValueError));
    }

    #[test]
    fn test_platform() {
        let platform = platform_module();
        let node = platform.call_method("node", vec![], vec![]).unwrap();
        assert!(!node.as_str().unwrap().is_empty());
        assert_eq!(
            platform.call_method("machine", vec![], vec![]).unwrap(),
            Value::str(std::env::consts::ARCH)
        );
    }
}
