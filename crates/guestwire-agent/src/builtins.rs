//! Functions available in every guest scope without an import.

use crate::args::Args;
use crate::config::Limits;
use crate::error::{GuestError, Result};
use crate::introspect;
use crate::objects::{FileObject, NativeFunction};
use crate::ops::{self, BinOp};
use crate::value::Value;
use guestwire_protocol::ExceptionKind;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Longest list `range()` will build.
const MAX_RANGE: i64 = 10_000_000;

/// Build the builtin namespace for one interpreter.
pub fn table(limits: Limits) -> HashMap<String, Value> {
    let functions = [
        native("len", "Return the number of items in a container.", |args| {
            args.check(1, &[])?;
            Ok(Value::Int(ops::length(args.required(0, "obj")?)? as i64))
        }),
        native("str", "Return the string form of an object.", |args| {
            args.check(1, &["object"])?;
            Ok(args
                .get(0, "object")
                .map(|v| Value::Str(v.to_display()))
                .unwrap_or_else(|| Value::str("")))
        }),
        native("repr", "Return the canonical string form of an object.", |args| {
            args.check(1, &[])?;
            Ok(Value::Str(args.required(0, "obj")?.to_repr()))
        }),
        native("int", "Convert a number or string to an integer.", |args| {
            args.check(1, &["x"])?;
            args.get(0, "x").map_or(Ok(Value::Int(0)), to_int)
        }),
        native("float", "Convert a number or string to a float.", |args| {
            args.check(1, &["x"])?;
            args.get(0, "x").map_or(Ok(Value::Float(0.0)), to_float)
        }),
        native("bool", "Truth value of an object.", |args| {
            args.check(1, &["x"])?;
            Ok(Value::Bool(args.get(0, "x").is_some_and(Value::truthy)))
        }),
        native("list", "Build a list from an iterable.", |args| {
            args.check(1, &["iterable"])?;
            Ok(Value::List(items(args)?))
        }),
        native("tuple", "Build a tuple from an iterable.", |args| {
            args.check(1, &["iterable"])?;
            Ok(Value::Tuple(items(args)?))
        }),
        native("set", "Build a set from an iterable.", |args| {
            args.check(1, &["iterable"])?;
            Ok(Value::Set(ops::set_from(items(args)?)?))
        }),
        native(
            "dict",
            "Build a dict from a mapping, an iterable of pairs or keyword arguments.",
            to_dict,
        ),
        native("abs", "Absolute value of a number.", |args| {
            args.check(1, &[])?;
            match args.required(0, "x")? {
                Value::Int(n) => n
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| GuestError::raise_named("OverflowError", "int too large")),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                other => Err(GuestError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }),
        native("min", "Smallest item of an iterable or of the arguments.", |args| {
            extreme(args, "min", Ordering::Less)
        }),
        native("max", "Largest item of an iterable or of the arguments.", |args| {
            extreme(args, "max", Ordering::Greater)
        }),
        native("sum", "Sum of the items of an iterable, plus start.", |args| {
            args.check(2, &["start"])?;
            let start = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
            ops::iterate(args.required(0, "iterable")?)?
                .iter()
                .try_fold(start, |acc, item| ops::binary(BinOp::Add, &acc, item))
        }),
        native("sorted", "Return a new sorted list.", |args| {
            args.check(1, &["reverse"])?;
            let mut items = ops::iterate(args.required(0, "iterable")?)?;
            sort(&mut items)?;
            if args.flag(usize::MAX, "reverse") {
                items.reverse();
            }
            Ok(Value::List(items))
        }),
        native("range", "List of integers from start to stop by step.", range),
        native("dir", "Sorted names of an object's attributes.", |args| {
            args.check(1, &[])?;
            let names = dir_names(args.required(0, "obj")?);
            Ok(Value::List(names.into_iter().map(Value::Str).collect()))
        }),
        native("callable", "Whether the object can be called.", |args| {
            args.check(1, &[])?;
            Ok(Value::Bool(ops::is_callable(args.required(0, "obj")?)))
        }),
        native(
            "getattr",
            "Get a named attribute. With a default, a missing attribute returns it instead of raising.",
            |args| {
                args.check(3, &[])?;
                let target = args.required(0, "object")?;
                let name = args.str(1, "name")?;
                match (ops::get_attribute(target, name), args.get(2, "default")) {
                    (Err(err), Some(default)) if err.is(ExceptionKind::AttributeError) => {
                        Ok(default.clone())
                    }
                    (result, _) => result,
                }
            },
        ),
        native("setattr", "Set a named attribute.", |args| {
            args.check(3, &[])?;
            let target = args.required(0, "obj")?;
            let name = args.str(1, "name")?;
            ops::set_attribute(target, name, args.required(2, "value")?.clone())?;
            Ok(Value::None)
        }),
        native("hasattr", "Whether the object has the named attribute.", |args| {
            args.check(2, &[])?;
            let target = args.required(0, "obj")?;
            let name = args.str(1, "name")?;
            match ops::get_attribute(target, name) {
                Ok(_) => Ok(Value::Bool(true)),
                Err(err) if err.is(ExceptionKind::AttributeError) => Ok(Value::Bool(false)),
                Err(err) => Err(err),
            }
        }),
        native("type", "Name of the object's type.", |args| {
            args.check(1, &[])?;
            Ok(Value::Str(args.required(0, "object")?.type_name()))
        }),
        native("print", "Write the arguments to the agent log.", |args| {
            args.check(usize::MAX, &["sep", "end"])?;
            let sep = args.opt_str(usize::MAX, "sep")?.unwrap_or(" ");
            let line = args
                .positional()
                .iter()
                .map(Value::to_display)
                .collect::<Vec<_>>()
                .join(sep);
            info!(target: "guest", "{line}");
            Ok(Value::None)
        }),
        native("open", "Open a file and return a stream.", move |args| {
            args.check(2, &["file", "mode"])?;
            let path = args.str(0, "file")?;
            let mode = args.opt_str(1, "mode")?.unwrap_or("r");
            let file = FileObject::open(path, mode, limits.max_read)?;
            Ok(Value::Object(Arc::new(file)))
        }),
    ];

    functions
        .into_iter()
        .map(|f| (f.name().to_string(), Value::Object(f.into_ref())))
        .collect()
}

fn native<F>(name: &str, doc: &'static str, func: F) -> NativeFunction
where
    F: Fn(&Args<'_>) -> Result<Value> + Send + Sync + 'static,
{
    NativeFunction::with_args(name, doc, func)
}

/// Names `dir()` reports for any value.
pub fn dir_names(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => introspect::dir_of(obj.as_ref()),
        data => {
            let mut names: Vec<String> = ops::data_method_names(data)
                .iter()
                .map(|s| s.to_string())
                .collect();
            names.sort();
            names
        }
    }
}

fn items(args: &Args<'_>) -> Result<Vec<Value>> {
    match args.get(0, "iterable") {
        Some(value) => ops::iterate(value),
        None => Ok(Vec::new()),
    }
}

fn to_int(value: &Value) -> Result<Value> {
    match value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Float(_) => Err(GuestError::value_error(
            "cannot convert float infinity or NaN to integer",
        )),
        Value::Str(s) => s.trim().replace('_', "").parse().map(Value::Int).map_err(|_| {
            GuestError::value_error(format!(
                "invalid literal for int() with base 10: {}",
                value.to_repr()
            ))
        }),
        other => Err(GuestError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: &Value) -> Result<Value> {
    match value {
        Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| {
            GuestError::value_error(format!(
                "could not convert string to float: {}",
                value.to_repr()
            ))
        }),
        other => other.as_f64().map(Value::Float).ok_or_else(|| {
            GuestError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn to_dict(args: &Args<'_>) -> Result<Value> {
    if args.positional().len() > 1 {
        return Err(GuestError::type_error("dict expected at most 1 argument"));
    }
    let mut entries = Vec::new();
    match args.positional().first() {
        None => {}
        Some(Value::Dict(source)) => entries = source.clone(),
        Some(iterable) => {
            for pair in ops::iterate(iterable)? {
                match ops::iterate(&pair)?.as_slice() {
                    [key, value] => ops::dict_insert(&mut entries, key.clone(), value.clone())?,
                    other => {
                        return Err(GuestError::value_error(format!(
                            "dictionary update sequence element has length {}; 2 is required",
                            other.len()
                        )))
                    }
                }
            }
        }
    }
    for (name, value) in args.kwargs() {
        ops::dict_insert(&mut entries, Value::str(name), value.clone())?;
    }
    Ok(Value::Dict(entries))
}

fn extreme(args: &Args<'_>, func: &str, wanted: Ordering) -> Result<Value> {
    args.check(usize::MAX, &["default"])?;
    let candidates = match args.positional() {
        [single] => ops::iterate(single)?,
        many => many.to_vec(),
    };
    let mut best: Option<Value> = None;
    for item in candidates {
        best = match best {
            Some(current) if ops::order(&item, &current)? != wanted => Some(current),
            _ => Some(item),
        };
    }
    match (best, args.get(usize::MAX, "default")) {
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(GuestError::value_error(format!(
            "{func}() arg is an empty sequence"
        ))),
    }
}

fn sort(items: &mut [Value]) -> Result<()> {
    let mut failure = None;
    items.sort_by(|a, b| {
        ops::order(a, b).unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        })
    });
    failure.map_or(Ok(()), Err)
}

fn range(args: &Args<'_>) -> Result<Value> {
    args.check(3, &[])?;
    let int = |index: usize, name: &str| -> Result<i64> {
        args.opt_int(index, name)?.ok_or_else(|| {
            GuestError::type_error(format!("range() missing required argument: '{name}'"))
        })
    };
    let (start, stop, step) = match args.positional().len() {
        0 | 1 => (0, int(0, "stop")?, 1),
        2 => (int(0, "start")?, int(1, "stop")?, 1),
        _ => (int(0, "start")?, int(1, "stop")?, int(2, "step")?),
    };
    if step == 0 {
        return Err(GuestError::value_error("range() arg 3 must not be zero"));
    }

    let span = if step > 0 {
        stop.saturating_sub(start)
    } else {
        start.saturating_sub(stop)
    };
    let count = if span <= 0 {
        0
    } else {
        (span - 1) / step.saturating_abs() + 1
    };
    if count > MAX_RANGE {
        return Err(GuestError::raise_named(
            "OverflowError",
            "range() result has too many items",
        ));
    }

    Ok(Value::List(
        (0..count).map(|i| Value::Int(start + i * step)).collect(),
    ))
}
