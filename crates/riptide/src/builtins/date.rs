//! The `Date` subset: `now`, construction, UTC getters, `toISOString`.

use crate::{
    call::Vm,
    error::{RunError, RunResult},
    heap::{HeapData, HeapId},
    object::PropTable,
    types::date::{self as date_type, JsDate},
    value::{self, Value},
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.date_prototype;
    b.method(proto, "getTime", Builtin::DateGetTime);
    b.method(proto, "valueOf", Builtin::DateGetTime);
    b.method(proto, "getFullYear", Builtin::DateGetFullYear);
    b.method(proto, "getMonth", Builtin::DateGetMonth);
    b.method(proto, "getDate", Builtin::DateGetDate);
    b.method(proto, "getDay", Builtin::DateGetDay);
    b.method(proto, "getHours", Builtin::DateGetHours);
    b.method(proto, "getMinutes", Builtin::DateGetMinutes);
    b.method(proto, "getSeconds", Builtin::DateGetSeconds);
    b.method(proto, "getMilliseconds", Builtin::DateGetMilliseconds);
    b.method(proto, "toISOString", Builtin::DateToISOString);
    b.method(proto, "toJSON", Builtin::DateToISOString);
    b.method(proto, "toString", Builtin::DateToString);
}

pub(crate) fn install_globals(b: &mut RealmBuilder<'_>, global: HeapId) {
    let ctor = b.constructor("Date", Builtin::DateCtor, b.intrinsics.date_prototype);
    let Value::Ref(ctor_id) = &ctor else { unreachable!() };
    b.method(*ctor_id, "now", Builtin::DateNow);
    b.builtin_data(global, "Date", ctor);
}

pub(crate) fn date_now(vm: &mut Vm<'_>, this: Value, args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    args.finish(vm);
    Ok(Value::Number(date_type::now_ms()))
}

/// `Date()` without `new`: the current time as a string.
pub(crate) fn date_callable(vm: &mut Vm<'_>, this: Value, args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    args.finish(vm);
    let date = JsDate::new(date_type::now_ms(), PropTable::new(None));
    let rendered = date.to_iso_string().unwrap_or_else(|| "Invalid Date".to_owned());
    Ok(Value::str(vm.heap, &rendered))
}

pub(crate) fn date_construct(vm: &mut Vm<'_>, mut args: Args) -> RunResult<Value> {
    let ms = match args.len() {
        0 => date_type::now_ms(),
        1 => {
            let arg = args.take(0);
            if let Some(text) = arg.as_js_str(vm.heap, vm.interns) {
                let parsed = parse_date_string(text);
                arg.drop_with_heap(vm.heap);
                parsed
            } else {
                let n = value::to_number(vm, &arg);
                arg.drop_with_heap(vm.heap);
                n?
            }
        }
        n => {
            let mut parts = Vec::with_capacity(n);
            for i in 0..n {
                let part = args.take(i);
                let value = value::to_number(vm, &part);
                part.drop_with_heap(vm.heap);
                parts.push(value?);
            }
            date_type::ms_from_components(&parts)
        }
    };
    args.finish(vm);
    let proto = vm.realm.intrinsics.date_prototype;
    vm.heap.inc_ref(proto);
    let date = JsDate::new(ms, PropTable::new(Some(proto)));
    Ok(Value::Ref(vm.heap.alloc(HeapData::Date(date))))
}

/// ISO-8601 (and RFC-3339) parsing; anything else is an invalid date.
fn parse_date_string(text: &str) -> f64 {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    let trimmed = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return dt.and_utc().timestamp_millis() as f64;
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map_or(f64::NAN, |dt| dt.and_utc().timestamp_millis() as f64);
    }
    f64::NAN
}

fn this_date(vm: &Vm<'_>, this: &Value) -> RunResult<f64> {
    match this {
        Value::Ref(id) => match vm.heap.date(*id) {
            Some(date) => Ok(date.ms),
            None => Err(RunError::type_error("Date method called on a non-Date")),
        },
        _ => Err(RunError::type_error("Date method called on a non-Date")),
    }
}

pub(crate) fn dispatch(vm: &mut Vm<'_>, builtin: Builtin, this: Value, args: Args) -> RunResult<Value> {
    args.finish(vm);
    let ms = match this_date(vm, &this) {
        Ok(ms) => ms,
        Err(e) => {
            this.drop_with_heap(vm.heap);
            return Err(e);
        }
    };
    let Value::Ref(date_id) = &this else { unreachable!("date checked") };
    let date = vm.heap.date(*date_id).expect("date checked");
    let result = match builtin {
        Builtin::DateGetTime => Ok(Value::Number(ms)),
        Builtin::DateGetFullYear => Ok(Value::Number(date.get_full_year())),
        Builtin::DateGetMonth => Ok(Value::Number(date.get_month())),
        Builtin::DateGetDate => Ok(Value::Number(date.get_date())),
        Builtin::DateGetDay => Ok(Value::Number(date.get_day())),
        Builtin::DateGetHours => Ok(Value::Number(date.get_hours())),
        Builtin::DateGetMinutes => Ok(Value::Number(date.get_minutes())),
        Builtin::DateGetSeconds => Ok(Value::Number(date.get_seconds())),
        Builtin::DateGetMilliseconds => Ok(Value::Number(date.get_milliseconds())),
        Builtin::DateToISOString => match date.to_iso_string() {
            Some(s) => Ok(Value::str(vm.heap, &s)),
            None => Err(RunError::range_error("Invalid time value")),
        },
        Builtin::DateToString => {
            let rendered = date.to_iso_string().unwrap_or_else(|| "Invalid Date".to_owned());
            Ok(Value::str(vm.heap, &rendered))
        }
        _ => unreachable!("date dispatch covers every variant"),
    };
    this.drop_with_heap(vm.heap);
    result
}
