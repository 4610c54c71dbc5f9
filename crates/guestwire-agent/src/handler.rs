//! Request handler for guestwire-agent.
//!
//! Routes JSON-RPC requests to operations on the connection's
//! [`GuestSession`]. Arguments are unpacked against the session registry and
//! results are packed back through it.

use crate::builtins;
use crate::error::GuestError;
use crate::ops;
use crate::session::GuestSession;
use crate::value::Value;
use guestwire_protocol::{
    error_codes, methods, AttrParams, AttributeKind, CallAttrParams, CallParams, EvaluateParams,
    ExecuteParams, ImportParams, InspectParams, InvokeParams, ObjectParams, PingResult, Primitive,
    ReleaseParams, ReleaseResult, Request, Response, SetAttrParams, StaleReference, WireValue,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Why a request did not produce a result.
enum Failure {
    Params(serde_json::Error),
    Guest(GuestError),
    Encode(serde_json::Error),
}

impl From<GuestError> for Failure {
    fn from(err: GuestError) -> Self {
        Self::Guest(err)
    }
}

type Outcome = Result<Json, Failure>;

/// Handle a JSON-RPC request and return a response.
///
/// Supported methods are listed in [`guestwire_protocol::methods`].
pub fn handle_request(session: &GuestSession, req: Request) -> Response {
    debug!(method = %req.method, id = req.id, "handling request");
    trace!(params = ?req.params, "request params");
    let started = Instant::now();

    let Some(outcome) = dispatch(session, &req.method, req.params) else {
        warn!(method = %req.method, "unknown method");
        return Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("method not found: {}", req.method),
        );
    };

    let response = match outcome {
        Ok(result) => Response::success(req.id, result),
        Err(failure) => failure_response(req.id, failure),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.error.is_some() {
        debug!(id = req.id, elapsed_ms, error = ?response.error, "request failed");
    } else {
        debug!(id = req.id, elapsed_ms, "request succeeded");
        trace!(result = ?response.result, "response result");
    }
    response
}

fn dispatch(session: &GuestSession, method: &str, params: Json) -> Option<Outcome> {
    let outcome = match method {
        methods::PING => encode(&PingResult { pong: true }),
        methods::EXECUTE => params_then(params, |p| execute(session, p)),
        methods::EVALUATE => params_then(params, |p| evaluate(session, p)),
        methods::IMPORT => params_then(params, |p| import(session, p)),
        methods::INSPECT => params_then(params, |p| inspect(session, p)),
        methods::MODULES => {
            let names = session.interpreter().module_names();
            let list = Value::List(names.into_iter().map(Value::Str).collect());
            encode(&session.marshaller().pack(&list))
        }
        methods::INVOKE_MODULE => params_then(params, |p| invoke_module(session, p)),
        methods::INVOKE_BUILTIN => params_then(params, |p| invoke_builtin(session, p)),
        methods::GETATTR => params_then(params, |p| getattr(session, p)),
        methods::SETATTR => params_then(params, |p| setattr(session, p)),
        methods::DELATTR => params_then(params, |p| delattr(session, p)),
        methods::CALL => params_then(params, |p| call(session, p)),
        methods::CALLATTR => params_then(params, |p| callattr(session, p)),
        methods::DIR => params_then(params, |p: ObjectParams| {
            let target = session.marshaller().unpack(&p.object)?;
            let names = builtins::dir_names(&target);
            let list = Value::List(names.into_iter().map(Value::Str).collect());
            Ok(session.marshaller().pack(&list))
        }),
        methods::STR => params_then(params, |p: ObjectParams| {
            let target = session.marshaller().unpack(&p.object)?;
            Ok(WireValue::primitive(target.to_display()))
        }),
        methods::REPR => params_then(params, |p: ObjectParams| {
            let target = session.marshaller().unpack(&p.object)?;
            Ok(WireValue::primitive(target.to_repr()))
        }),
        methods::RELEASE => params_then(params, |p| Ok(release(session, p))),
        _ => return None,
    };
    Some(outcome)
}

/// Deserialize parameters, run `op`, serialize its result.
fn params_then<P, R, F>(params: Json, op: F) -> Outcome
where
    P: DeserializeOwned,
    R: Serialize,
    F: FnOnce(P) -> Result<R, GuestError>,
{
    let params = serde_json::from_value(params).map_err(Failure::Params)?;
    let result = op(params)?;
    encode(&result)
}

fn encode<T: Serialize>(value: &T) -> Outcome {
    serde_json::to_value(value).map_err(Failure::Encode)
}

fn failure_response(id: u64, failure: Failure) -> Response {
    match failure {
        Failure::Params(e) => {
            warn!(id, error = %e, "invalid params");
            Response::error(
                id,
                error_codes::INVALID_PARAMS,
                format!("invalid params: {e}"),
            )
        }
        Failure::Guest(err @ GuestError::Raised { .. }) => {
            debug!(id, error = %err, "guest exception");
            let data = err
                .to_remote_exception()
                .and_then(|exc| serde_json::to_value(exc).ok());
            Response::error_with_data(id, error_codes::REMOTE_EXCEPTION, err.to_string(), data)
        }
        Failure::Guest(GuestError::StaleReference(stale)) => {
            debug!(id, object_id = %stale.id, reason = %stale.reason, "stale reference");
            let data = serde_json::to_value(StaleReference::from(stale)).ok();
            Response::error_with_data(id, error_codes::STALE_REFERENCE, stale.to_string(), data)
        }
        Failure::Encode(e) => {
            warn!(id, error = %e, "failed to encode result");
            Response::error(id, error_codes::INTERNAL_ERROR, e.to_string())
        }
    }
}

fn execute(session: &GuestSession, p: ExecuteParams) -> Result<(), GuestError> {
    debug!(code_len = p.code.len(), "handling execute");
    session.interpreter().execute(&p.code)
}

fn evaluate(session: &GuestSession, p: EvaluateParams) -> Result<WireValue, GuestError> {
    debug!(expression = %p.expression, "handling evaluate");
    let value = session.interpreter().evaluate(&p.expression)?;
    Ok(session.marshaller().pack(&value))
}

fn import(session: &GuestSession, p: ImportParams) -> Result<(), GuestError> {
    debug!(module = %p.module, "handling import");
    session.interpreter().import(&p.module).map(|_| ())
}

/// Classify a dotted attribute path in one round trip.
fn inspect(session: &GuestSession, p: InspectParams) -> Result<AttributeKind, GuestError> {
    debug!(path = %p.path, "handling inspect");
    let value = session.interpreter().resolve(&p.path)?;
    Ok(match &value {
        Value::Object(obj) if obj.is_module() => AttributeKind::Module,
        v if ops::is_callable(v) => AttributeKind::Callable,
        v => AttributeKind::Value {
            value: session.marshaller().pack(v),
        },
    })
}

fn invoke_module(session: &GuestSession, p: InvokeParams) -> Result<WireValue, GuestError> {
    debug!(name = %p.name, args = p.args.len(), "handling invoke_module");
    let marshaller = session.marshaller();
    let target = session.interpreter().resolve(&p.name)?;
    let (args, kwargs) = marshaller.unpack_args(&p.args, &p.kwargs)?;
    let result = ops::call(&target, args, kwargs)?;
    Ok(marshaller.pack(&result))
}

fn invoke_builtin(session: &GuestSession, p: InvokeParams) -> Result<WireValue, GuestError> {
    debug!(name = %p.name, args = p.args.len(), "handling invoke_builtin");
    let marshaller = session.marshaller();
    let target = session
        .interpreter()
        .builtin(&p.name)
        .ok_or_else(|| GuestError::name_error(&p.name))?;
    let (args, kwargs) = marshaller.unpack_args(&p.args, &p.kwargs)?;
    let result = ops::call(&target, args, kwargs)?;
    Ok(marshaller.pack(&result))
}

fn getattr(session: &GuestSession, p: AttrParams) -> Result<WireValue, GuestError> {
    debug!(name = %p.name, "handling getattr");
    let marshaller = session.marshaller();
    let target = marshaller.unpack(&p.object)?;
    let value = ops::get_attribute(&target, &p.name)?;
    Ok(marshaller.pack(&value))
}

fn setattr(session: &GuestSession, p: SetAttrParams) -> Result<(), GuestError> {
    debug!(name = %p.name, "handling setattr");
    let marshaller = session.marshaller();
    let target = marshaller.unpack(&p.object)?;
    let value = marshaller.unpack(&p.value)?;
    ops::set_attribute(&target, &p.name, value)
}

fn delattr(session: &GuestSession, p: AttrParams) -> Result<(), GuestError> {
    debug!(name = %p.name, "handling delattr");
    let target = session.marshaller().unpack(&p.object)?;
    ops::del_attribute(&target, &p.name)
}

/// Call an object. A plain string names a guest global instead, which is
/// how teleported functions are invoked after their definition ran.
fn call(session: &GuestSession, p: CallParams) -> Result<WireValue, GuestError> {
    let marshaller = session.marshaller();
    let target = match &p.object {
        WireValue::Primitive {
            value: Primitive::Str(name),
        } => {
            debug!(name = %name, "handling call by name");
            session.interpreter().resolve(name)?
        }
        other => {
            debug!(kind = other.kind(), "handling call");
            marshaller.unpack(other)?
        }
    };
    let (args, kwargs) = marshaller.unpack_args(&p.args, &p.kwargs)?;
    let result = ops::call(&target, args, kwargs)?;
    Ok(marshaller.pack(&result))
}

fn callattr(session: &GuestSession, p: CallAttrParams) -> Result<WireValue, GuestError> {
    debug!(name = %p.name, args = p.args.len(), "handling callattr");
    let marshaller = session.marshaller();
    let target = marshaller.unpack(&p.object)?;
    let (args, kwargs) = marshaller.unpack_args(&p.args, &p.kwargs)?;
    let result = ops::invoke_method(&target, &p.name, args, kwargs)?;
    Ok(marshaller.pack(&result))
}

/// Drop one reference per id. Ids that no longer resolve are skipped.
fn release(session: &GuestSession, p: ReleaseParams) -> ReleaseResult {
    let mut released = 0;
    for id in &p.ids {
        match session.registry().release(id) {
            Ok(true) => released += 1,
            Ok(false) => {}
            Err(e) => debug!(error = %e, "ignoring release of stale reference"),
        }
    }
    debug!(requested = p.ids.len(), released, "handled release");
    ReleaseResult { released }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use guestwire_protocol::{ObjectDescriptor, RemoteException};
    use serde_json::json;

    fn session() -> GuestSession {
        GuestSession::new(Limits::default())
    }

    fn request(session: &GuestSession, method: &str, params: Json) -> Response {
        handle_request(session, Request::new(1, method, params))
    }

    fn result(response: Response) -> WireValue {
        assert!(!response.is_error(), "unexpected error: {:?}", response.error);
        serde_json::from_value(response.result.unwrap()).unwrap()
    }

    fn reference(session: &GuestSession, expression: &str) -> ObjectDescriptor {
        match result(request(session, methods::EVALUATE, json!({"expression": expression}))) {
            WireValue::Reference(d) | WireValue::Stream(d) => d,
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn test_ping() {
        let s = session();
        let resp = request(&s, methods::PING, Json::Null);
        assert_eq!(resp.result, Some(json!({"pong": true})));
    }

    #[test]
    fn test_evaluate_returns_primitive() {
        let s = session();
        let value = result(request(&s, methods::EVALUATE, json!({"expression": "1+1"})));
        assert_eq!(value, WireValue::primitive(2_i64));
    }

    #[test]
    fn test_execute_then_evaluate() {
        let s = session();
        let resp = request(&s, methods::EXECUTE, json!({"code": "x = [1, 2]"}));
        assert_eq!(resp.result, Some(Json::Null));
        let value = result(request(&s, methods::EVALUATE, json!({"expression": "x"})));
        assert!(matches!(value, WireValue::Sequence { .. }));
    }

    #[test]
    fn test_remote_exception() {
        let s = session();
        let resp = request(&s, methods::EVALUATE, json!({"expression": "1/0"}));
        let error = resp.error.unwrap();
        assert_eq!(error.code, error_codes::REMOTE_EXCEPTION);
        let exc: RemoteException = serde_json::from_value(error.data.unwrap()).unwrap();
        assert_eq!(exc.type_name, "ZeroDivisionError");
    }

    #[test]
    fn test_unknown_method_and_bad_params() {
        let s = session();
        let resp = request(&s, "nope", Json::Null);
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);

        let resp = request(&s, methods::EVALUATE, json!({"expr": "1"}));
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[test]
    fn test_module_attribute_protocol() {
        let s = session();
        request(&s, methods::IMPORT, json!({"module": "os"}));
        let os = reference(&s, "os");
        assert_eq!(os.class_name, "module");
        assert!(os.methods.iter().any(|m| m.name == "getcwd"));

        let object = WireValue::Reference(os.clone());
        let resp = request(
            &s,
            methods::SETATTR,
            json!({"object": object, "name": "marker", "value": WireValue::primitive(5_i64)}),
        );
        assert!(!resp.is_error());
        let value = result(request(&s, methods::GETATTR, json!({"object": object, "name": "marker"})));
        assert_eq!(value, WireValue::primitive(5_i64));

        request(&s, methods::DELATTR, json!({"object": object, "name": "marker"}));
        let resp = request(&s, methods::GETATTR, json!({"object": object, "name": "marker"}));
        assert_eq!(resp.error.unwrap().code, error_codes::REMOTE_EXCEPTION);
    }

    #[test]
    fn test_inspect_kinds() {
        let s = session();
        let kind = |path: &str| -> AttributeKind {
            let resp = request(&s, methods::INSPECT, json!({"path": path}));
            serde_json::from_value(resp.result.unwrap()).unwrap()
        };
        assert_eq!(kind("os.path"), AttributeKind::Module);
        assert_eq!(kind("os.getcwd"), AttributeKind::Callable);
        assert_eq!(
            kind("os.sep"),
            AttributeKind::Value {
                value: WireValue::primitive("/")
            }
        );
    }

    #[test]
    fn test_invoke_module_and_builtin() {
        let s = session();
        let value = result(request(
            &s,
            methods::INVOKE_MODULE,
            json!({"name": "os.path.join", "args": [WireValue::primitive("a"), WireValue::primitive("b")]}),
        ));
        assert_eq!(value, WireValue::primitive("a/b"));

        let value = result(request(
            &s,
            methods::INVOKE_BUILTIN,
            json!({"name": "len", "args": [WireValue::primitive("abcd")]}),
        ));
        assert_eq!(value, WireValue::primitive(4_i64));

        let resp = request(&s, methods::INVOKE_BUILTIN, json!({"name": "nonexistent"}));
        assert_eq!(resp.error.unwrap().code, error_codes::REMOTE_EXCEPTION);
    }

    #[test]
    fn test_call_by_global_name() {
        let s = session();
        request(&s, methods::EXECUTE, json!({"code": "def double(x):\n    return x * 2\n"}));
        let value = result(request(
            &s,
            methods::CALL,
            json!({"object": WireValue::primitive("double"), "args": [WireValue::primitive(21_i64)]}),
        ));
        assert_eq!(value, WireValue::primitive(42_i64));
    }

    #[test]
    fn test_dir_str_repr() {
        let s = session();
        request(&s, methods::IMPORT, json!({"module": "sys"}));
        let object = WireValue::Reference(reference(&s, "sys"));
        let value = result(request(&s, methods::STR, json!({"object": object})));
        assert_eq!(value, WireValue::primitive("<module 'sys'>"));
        let value = result(request(&s, methods::REPR, json!({"object": WireValue::primitive("x")})));
        assert_eq!(value, WireValue::primitive("'x'"));

        match result(request(&s, methods::DIR, json!({"object": object}))) {
            WireValue::Sequence { items, .. } => {
                assert!(items.contains(&WireValue::primitive("maxsize")))
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn test_release_and_stale_reference() {
        let s = session();
        request(&s, methods::IMPORT, json!({"module": "time"}));
        let time = reference(&s, "time");
        let again = reference(&s, "time");
        assert_eq!(time.id, again.id);

        let released = request(&s, methods::RELEASE, json!({"ids": [time.id]}));
        assert_eq!(released.result, Some(json!({"released": 0})));
        let released = request(&s, methods::RELEASE, json!({"ids": [time.id]}));
        assert_eq!(released.result, Some(json!({"released": 1})));

        let object = WireValue::Reference(time);
        let resp = request(&s, methods::GETATTR, json!({"object": object, "name": "time"}));
        let error = resp.error.unwrap();
        assert_eq!(error.code, error_codes::STALE_REFERENCE);
        let stale: StaleReference = serde_json::from_value(error.data.unwrap()).unwrap();
        assert_eq!(stale.reason, guestwire_protocol::StaleReason::Released);
    }

    #[test]
    fn test_references_do_not_cross_sessions() {
        let first = session();
        let second = session();
        request(&first, methods::IMPORT, json!({"module": "os"}));
        let object = WireValue::Reference(reference(&first, "os"));
        let resp = request(&second, methods::GETATTR, json!({"object": object, "name": "sep"}));
        assert_eq!(resp.error.unwrap().code, error_codes::STALE_REFERENCE);
    }
}
