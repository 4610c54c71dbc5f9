//! Operations on guest values.
//!
//! Shared by the interpreter and the remote operations so that
//! `obj.attr` in guest code and a `getattr` request behave identically.

use crate::args::Args;
use crate::error::{GuestError, Result};
use crate::objects::BoundMethod;
use crate::value::{Kwargs, ObjectRef, Value};
use guestwire_protocol::ExceptionKind;
use std::cmp::Ordering;

/// Longest string or list that `*` repetition will build.
pub const MAX_REPEAT_LEN: usize = 10_000_000;

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }
}

// Attribute access

fn lists_method(obj: &ObjectRef, name: &str) -> bool {
    obj.methods().iter().any(|m| m.name == name)
}

/// `target.name`
pub fn get_attribute(target: &Value, name: &str) -> Result<Value> {
    match target {
        Value::Object(obj) => match obj.get_attr(name) {
            Ok(value) => Ok(value),
            Err(_) if lists_method(obj, name) => {
                Ok(Value::Object(BoundMethod::new(target.clone(), name).into_ref()))
            }
            Err(err) => Err(err),
        },
        data if data_method_names(data).contains(&name) => {
            Ok(Value::Object(BoundMethod::new(data.clone(), name).into_ref()))
        }
        data => Err(GuestError::attribute_error(&data.type_name(), name)),
    }
}

/// `target.name = value`
pub fn set_attribute(target: &Value, name: &str, value: Value) -> Result<()> {
    match target {
        Value::Object(obj) => obj.set_attr(name, value),
        data => Err(GuestError::attribute_error(&data.type_name(), name)),
    }
}

/// `del target.name`
pub fn del_attribute(target: &Value, name: &str) -> Result<()> {
    match target {
        Value::Object(obj) => obj.del_attr(name),
        data => Err(GuestError::attribute_error(&data.type_name(), name)),
    }
}

/// `callee(*args, **kwargs)`
pub fn call(callee: &Value, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
    match callee {
        Value::Object(obj) => obj.call(args, kwargs),
        other => Err(GuestError::type_error(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

/// `receiver.name(*args, **kwargs)`
///
/// `__enter__` always yields the receiver itself.
pub fn invoke_method(receiver: &Value, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
    match receiver {
        Value::Object(obj) if lists_method(obj, name) => {
            let result = obj.call_method(name, args, kwargs)?;
            if name == "__enter__" {
                Ok(receiver.clone())
            } else {
                Ok(result)
            }
        }
        Value::Object(obj) => {
            let attr = obj.get_attr(name)?;
            call(&attr, args, kwargs)
        }
        data => data_method(data, name, args, kwargs),
    }
}

/// Whether `value` can be called.
pub fn is_callable(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| obj.is_callable())
}

// Methods of data values

/// Methods available on a data value.
pub fn data_method_names(value: &Value) -> &'static [&'static str] {
    match value {
        Value::Str(_) => &[
            "count",
            "endswith",
            "find",
            "isdigit",
            "join",
            "lower",
            "lstrip",
            "replace",
            "rstrip",
            "split",
            "splitlines",
            "startswith",
            "strip",
            "upper",
        ],
        Value::List(_) => &["copy", "count", "index"],
        Value::Tuple(_) => &["count", "index"],
        Value::Set(_) => &["copy"],
        Value::Dict(_) => &["copy", "get", "items", "keys", "values"],
        _ => &[],
    }
}

fn data_method(receiver: &Value, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
    if !data_method_names(receiver).contains(&name) {
        return Err(GuestError::attribute_error(&receiver.type_name(), name));
    }
    let a = Args::new(name, &args, &kwargs);
    match receiver {
        Value::Str(s) => str_method(s, name, &a),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => match name {
            "copy" => Ok(receiver.clone()),
            "count" => {
                a.check(1, &["value"])?;
                let needle = a.required(0, "value")?;
                let n = items.iter().filter(|v| v.loose_eq(needle)).count();
                Ok(Value::Int(n as i64))
            }
            _ => {
                a.check(1, &["value"])?;
                let needle = a.required(0, "value")?;
                items
                    .iter()
                    .position(|v| v.loose_eq(needle))
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| {
                        GuestError::value_error(format!("{} is not in list", needle.to_repr()))
                    })
            }
        },
        Value::Dict(entries) => match name {
            "copy" => Ok(receiver.clone()),
            "get" => {
                a.check(2, &["key", "default"])?;
                let key = a.required(0, "key")?;
                Ok(dict_get(entries, key)
                    .cloned()
                    .or_else(|| a.get(1, "default").cloned())
                    .unwrap_or(Value::None))
            }
            "keys" => Ok(Value::List(entries.iter().map(|(k, _)| k.clone()).collect())),
            "values" => Ok(Value::List(entries.iter().map(|(_, v)| v.clone()).collect())),
            _ => Ok(Value::List(
                entries
                    .iter()
                    .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            )),
        },
        _ => Err(GuestError::attribute_error(&receiver.type_name(), name)),
    }
}

fn str_method(s: &str, name: &str, a: &Args<'_>) -> Result<Value> {
    let strs = |items: Vec<&str>| Value::List(items.into_iter().map(Value::from).collect());
    match name {
        "upper" => Ok(Value::str(s.to_uppercase())),
        "lower" => Ok(Value::str(s.to_lowercase())),
        "strip" | "lstrip" | "rstrip" => {
            a.check(1, &["chars"])?;
            let chars: Option<Vec<char>> = a.opt_str(0, "chars")?.map(|c| c.chars().collect());
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            Ok(Value::str(out))
        }
        "split" => {
            a.check(2, &["sep", "maxsplit"])?;
            let maxsplit = a.opt_int(1, "maxsplit")?.unwrap_or(-1);
            match a.opt_str(0, "sep")? {
                Some("") => Err(GuestError::value_error("empty separator")),
                Some(sep) if maxsplit >= 0 => {
                    Ok(strs(s.splitn(maxsplit as usize + 1, sep).collect()))
                }
                Some(sep) => Ok(strs(s.split(sep).collect())),
                None => Ok(strs(s.split_whitespace().collect())),
            }
        }
        "splitlines" => Ok(strs(s.lines().collect())),
        "join" => {
            a.check(1, &["iterable"])?;
            let parts = iterate(a.required(0, "iterable")?)?
                .into_iter()
                .map(|v| match v {
                    Value::Str(s) => Ok(s),
                    other => Err(GuestError::type_error(format!(
                        "sequence item: expected str instance, {} found",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Str(parts.join(s)))
        }
        "startswith" | "endswith" => {
            a.check(1, &["prefix"])?;
            let affix = a.str(0, "prefix")?;
            let hit = if name == "startswith" {
                s.starts_with(affix)
            } else {
                s.ends_with(affix)
            };
            Ok(Value::Bool(hit))
        }
        "replace" => {
            a.check(2, &["old", "new"])?;
            Ok(Value::str(s.replace(a.str(0, "old")?, a.str(1, "new")?)))
        }
        "find" => {
            a.check(1, &["sub"])?;
            let sub = a.str(0, "sub")?;
            let index = s
                .find(sub)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::Int(index))
        }
        "count" => {
            a.check(1, &["sub"])?;
            Ok(Value::Int(s.matches(a.str(0, "sub")?).count() as i64))
        }
        "isdigit" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
        )),
        _ => Err(GuestError::attribute_error("str", name)),
    }
}

// Arithmetic

enum Num {
    Int(i64),
    Float(f64),
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(n) => Some(Num::Int(*n)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn overflow() -> GuestError {
    GuestError::raise(ExceptionKind::OverflowError, "integer overflow")
}

fn unsupported(op: BinOp, a: &Value, b: &Value) -> GuestError {
    GuestError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

/// Checked length of `len` repeated `times` times.
fn repeated_len(len: usize, times: i64) -> Result<usize> {
    let times = usize::try_from(times.max(0)).map_err(|_| overflow())?;
    let total = len.checked_mul(times).ok_or_else(|| {
        GuestError::raise(
            ExceptionKind::OverflowError,
            "repeated sequence is too long",
        )
    })?;
    if total > MAX_REPEAT_LEN {
        return Err(GuestError::raise(
            ExceptionKind::MemoryError,
            format!("repeated sequence would have {total} items"),
        ));
    }
    Ok(total)
}

fn repeat(items: &[Value], times: i64) -> Result<Vec<Value>> {
    let total = repeated_len(items.len(), times)?;
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        out.extend_from_slice(items);
    }
    Ok(out)
}

/// `a <op> b`
pub fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => return Ok(Value::Str(format!("{x}{y}"))),
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            return Ok(Value::List([x.as_slice(), y.as_slice()].concat()))
        }
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            return Ok(Value::Tuple([x.as_slice(), y.as_slice()].concat()))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_i64().is_some() => {
            let times = n.as_i64().unwrap_or(0);
            repeated_len(s.len(), times)?;
            return Ok(Value::Str(s.repeat(times.max(0) as usize)));
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if n.as_i64().is_some() =>
        {
            return Ok(Value::List(repeat(items, n.as_i64().unwrap_or(0))?));
        }
        _ => {}
    }

    let (x, y) = match (num(a), num(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(unsupported(op, a, b)),
    };

    match (x, y) {
        (Num::Int(x), Num::Int(y)) => int_binary(op, x, y),
        (x, y) => {
            let x = match x {
                Num::Int(n) => n as f64,
                Num::Float(f) => f,
            };
            let y = match y {
                Num::Int(n) => n as f64,
                Num::Float(f) => f,
            };
            float_binary(op, x, y)
        }
    }
}

fn int_binary(op: BinOp, x: i64, y: i64) -> Result<Value> {
    let result = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinOp::Div => return float_binary(op, x as f64, y as f64),
        BinOp::FloorDiv | BinOp::Mod if y == 0 => {
            return Err(GuestError::zero_division(
                "integer division or modulo by zero",
            ))
        }
        BinOp::FloorDiv => {
            let q = x.checked_div(y).ok_or_else(overflow)?;
            if x % y != 0 && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }
    };
    Ok(Value::Int(result))
}

fn float_binary(op: BinOp, x: f64, y: f64) -> Result<Value> {
    let divides = matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod);
    if divides && y == 0.0 {
        return Err(GuestError::zero_division("division by zero"));
    }
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        BinOp::FloorDiv => (x / y).floor(),
        BinOp::Mod => x - y * (x / y).floor(),
    };
    Ok(Value::Float(result))
}

/// `-value`
pub fn negate(value: &Value) -> Result<Value> {
    match num(value) {
        Some(Num::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
        Some(Num::Float(f)) => Ok(Value::Float(-f)),
        None => Err(GuestError::type_error(format!(
            "bad operand type for unary -: '{}'",
            value.type_name()
        ))),
    }
}

// Comparison

/// Ordering used by `<`, `sorted()`, `min()` and `max()`.
pub fn order(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => {
            for (p, q) in x.iter().zip(y) {
                match order(p, q)? {
                    Ordering::Equal => continue,
                    other => return Ok(other),
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => match (num(a), num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(x.cmp(&y)),
            (Some(_), Some(_)) => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
            }
            _ => Err(GuestError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

/// `a <op> b` for comparison operators.
pub fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool> {
    Ok(match op {
        CmpOp::Eq => a.loose_eq(b),
        CmpOp::Ne => !a.loose_eq(b),
        CmpOp::Lt => order(a, b)? == Ordering::Less,
        CmpOp::Le => order(a, b)? != Ordering::Greater,
        CmpOp::Gt => order(a, b)? == Ordering::Greater,
        CmpOp::Ge => order(a, b)? != Ordering::Less,
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Is => is_same(a, b),
        CmpOp::IsNot => !is_same(a, b),
    })
}

fn is_same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Object(_), Value::Object(_)) => a == b,
        _ => false,
    }
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(GuestError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            Ok(items.iter().any(|v| v.loose_eq(item)))
        }
        Value::Dict(entries) => Ok(dict_get(entries, item).is_some()),
        Value::Object(obj) => Ok(obj.iterate()?.iter().any(|v| v.loose_eq(item))),
        other => Err(GuestError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

// Containers

/// Items produced by `for x in value`.
pub fn iterate(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(entries) => Ok(entries.iter().map(|(k, _)| k.clone()).collect()),
        Value::Object(obj) => obj.iterate(),
        other => Err(GuestError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/// Value stored under `key`.
pub fn dict_get<'a>(entries: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| k.loose_eq(key)).map(|(_, v)| v)
}

/// Insert or replace `key`. Keys must be scalars.
pub fn dict_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) -> Result<()> {
    if !key.is_scalar() {
        return Err(GuestError::type_error(format!(
            "unhashable type: '{}'",
            key.type_name()
        )));
    }
    match entries.iter_mut().find(|(k, _)| k.loose_eq(&key)) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
    Ok(())
}

/// Build set contents from `items`, dropping duplicates.
pub fn set_from(items: Vec<Value>) -> Result<Vec<Value>> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !item.is_scalar() && !matches!(item, Value::Tuple(_) | Value::Object(_)) {
            return Err(GuestError::type_error(format!(
                "unhashable type: '{}'",
                item.type_name()
            )));
        }
        if !out.iter().any(|v| v.loose_eq(&item)) {
            out.push(item);
        }
    }
    Ok(out)
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// `target[key]`
pub fn get_item(target: &Value, key: &Value) -> Result<Value> {
    match target {
        Value::List(items) | Value::Tuple(items) => {
            let index = key.as_i64().ok_or_else(|| {
                GuestError::type_error(format!(
                    "{} indices must be integers, not {}",
                    target.type_name(),
                    key.type_name()
                ))
            })?;
            normalize_index(index, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| {
                    GuestError::index_error(format!("{} index out of range", target.type_name()))
                })
        }
        Value::Str(s) => {
            let index = key.as_i64().ok_or_else(|| {
                GuestError::type_error(format!(
                    "string indices must be integers, not {}",
                    key.type_name()
                ))
            })?;
            let chars: Vec<char> = s.chars().collect();
            normalize_index(index, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| GuestError::index_error("string index out of range"))
        }
        Value::Dict(entries) => dict_get(entries, key)
            .cloned()
            .ok_or_else(|| GuestError::key_error(key.to_repr())),
        other => Err(GuestError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `target[start:stop]`
pub fn get_slice(target: &Value, start: Option<i64>, stop: Option<i64>) -> Result<Value> {
    let bounds = |len: usize| {
        let clamp = |i: i64| {
            let i = if i < 0 { i + len as i64 } else { i };
            i.clamp(0, len as i64) as usize
        };
        let lo = start.map(clamp).unwrap_or(0);
        let hi = stop.map(clamp).unwrap_or(len);
        (lo, hi.max(lo))
    };
    match target {
        Value::List(items) => {
            let (lo, hi) = bounds(items.len());
            Ok(Value::List(items[lo..hi].to_vec()))
        }
        Value::Tuple(items) => {
            let (lo, hi) = bounds(items.len());
            Ok(Value::Tuple(items[lo..hi].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (lo, hi) = bounds(chars.len());
            Ok(Value::Str(chars[lo..hi].iter().collect()))
        }
        other => Err(GuestError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `len(value)`
pub fn length(value: &Value) -> Result<usize> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.len()),
        Value::Dict(entries) => Ok(entries.len()),
        other => Err(GuestError::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}
