//! The `Math` namespace.

use rand::Rng;

use crate::{
    call::Vm,
    error::RunResult,
    heap::HeapId,
    value::{self, Value},
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install(b: &mut RealmBuilder<'_>, global: HeapId) {
    let math = b.namespace();
    b.builtin_data(math, "PI", Value::Number(std::f64::consts::PI));
    b.builtin_data(math, "E", Value::Number(std::f64::consts::E));
    b.builtin_data(math, "SQRT2", Value::Number(std::f64::consts::SQRT_2));
    b.builtin_data(math, "LN2", Value::Number(std::f64::consts::LN_2));
    b.builtin_data(math, "LN10", Value::Number(std::f64::consts::LN_10));
    b.method(math, "abs", Builtin::MathAbs);
    b.method(math, "floor", Builtin::MathFloor);
    b.method(math, "ceil", Builtin::MathCeil);
    b.method(math, "round", Builtin::MathRound);
    b.method(math, "trunc", Builtin::MathTrunc);
    b.method(math, "sign", Builtin::MathSign);
    b.method(math, "sqrt", Builtin::MathSqrt);
    b.method(math, "pow", Builtin::MathPow);
    b.method(math, "min", Builtin::MathMin);
    b.method(math, "max", Builtin::MathMax);
    b.method(math, "random", Builtin::MathRandom);
    b.method(math, "log", Builtin::MathLog);
    b.method(math, "exp", Builtin::MathExp);
    b.method(math, "sin", Builtin::MathSin);
    b.method(math, "cos", Builtin::MathCos);
    b.method(math, "tan", Builtin::MathTan);
    b.method(math, "atan", Builtin::MathAtan);
    b.method(math, "atan2", Builtin::MathAtan2);
    b.builtin_data(global, "Math", Value::Ref(math));
}

pub(crate) fn dispatch(vm: &mut Vm<'_>, builtin: Builtin, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let result = match builtin {
        Builtin::MathRandom => {
            args.finish(vm);
            return Ok(Value::Number(vm.rng.r#gen::<f64>()));
        }
        Builtin::MathMin | Builtin::MathMax => {
            let values = args.take_all();
            args.finish(vm);
            let mut acc = if matches!(builtin, Builtin::MathMin) { f64::INFINITY } else { f64::NEG_INFINITY };
            for value in &values {
                let n = match value::to_number(vm, value) {
                    Ok(n) => n,
                    Err(e) => {
                        vm.drop_values(values);
                        return Err(e);
                    }
                };
                if n.is_nan() {
                    acc = f64::NAN;
                } else if !acc.is_nan() {
                    acc = if matches!(builtin, Builtin::MathMin) { acc.min(n) } else { acc.max(n) };
                }
            }
            vm.drop_values(values);
            return Ok(Value::Number(acc));
        }
        Builtin::MathPow | Builtin::MathAtan2 => {
            let a = args.take(0);
            let b = args.take(1);
            args.finish(vm);
            let an = value::to_number(vm, &a);
            a.drop_with_heap(vm.heap);
            let bn = value::to_number(vm, &b);
            b.drop_with_heap(vm.heap);
            let (an, bn) = (an?, bn?);
            match builtin {
                Builtin::MathPow => an.powf(bn),
                _ => an.atan2(bn),
            }
        }
        _ => {
            let a = args.take(0);
            args.finish(vm);
            let n = value::to_number(vm, &a);
            a.drop_with_heap(vm.heap);
            let n = n?;
            match builtin {
                Builtin::MathAbs => n.abs(),
                Builtin::MathFloor => n.floor(),
                Builtin::MathCeil => n.ceil(),
                // JS rounds half toward +Infinity; Rust's round is
                // half-away-from-zero.
                Builtin::MathRound => (n + 0.5).floor(),
                Builtin::MathTrunc => n.trunc(),
                Builtin::MathSign => {
                    if n.is_nan() || n == 0.0 {
                        n
                    } else if n > 0.0 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                Builtin::MathSqrt => n.sqrt(),
                Builtin::MathLog => n.ln(),
                Builtin::MathExp => n.exp(),
                Builtin::MathSin => n.sin(),
                Builtin::MathCos => n.cos(),
                Builtin::MathTan => n.tan(),
                Builtin::MathAtan => n.atan(),
                _ => unreachable!("math dispatch covers every variant"),
            }
        }
    };
    Ok(Value::Number(result))
}
