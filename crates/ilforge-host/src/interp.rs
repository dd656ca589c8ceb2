//! Reference interpreter over decoded method bodies.
//!
//! One [`Machine`] runs one top-level invocation: it counts executed
//! instructions and nested calls against the module's [`HostOptions`]
//! limits. Frames are plain Rust recursion.
//!
//! [`HostOptions`]: crate::HostOptions

use std::cmp::Ordering;
use std::rc::Rc;

use tracing::{trace, warn};

use ilforge_core::{FieldRef, MetaEntry, MethodRef, OpCode, RawOperand, TypeRef};

use crate::assembly::ModuleInner;
use crate::error::{ExecError, ExecResult};
use crate::runtime::{RuntimeMethod, RuntimeType};
use crate::value::{ArrayData, BoxedValue, Value};

/* ─────────────────────────── Machine ─────────────────────────── */

pub(crate) struct Machine<'m> {
    module: &'m ModuleInner,
    steps: u64,
    depth: usize,
}

impl<'m> Machine<'m> {
    pub(crate) const fn new(module: &'m ModuleInner) -> Self { Self { module, steps: 0, depth: 0 } }

    /// Runs `method` with `args` (`this` first for instance methods).
    pub(crate) fn invoke(&mut self, method: &RuntimeMethod, mut args: Vec<Value>) -> ExecResult<Value> {
        let limit = self.module.options.max_call_depth;
        if self.depth >= limit {
            return Err(ExecError::CallDepth(limit));
        }
        let skip = usize::from(method.has_this());
        for (slot, param) in args.iter_mut().skip(skip).zip(&method.sig.params) {
            *slot = std::mem::replace(slot, Value::Void).narrow_to(param);
        }
        self.depth += 1;
        let result = self.run(method, args);
        self.depth -= 1;
        result
    }

    fn tick(&mut self) -> ExecResult<()> {
        self.steps += 1;
        let limit = self.module.options.max_steps;
        if self.steps > limit {
            return Err(ExecError::StepLimit(limit));
        }
        Ok(())
    }

    fn run(&mut self, method: &RuntimeMethod, args: Vec<Value>) -> ExecResult<Value> {
        let program = method.program();
        let locals = method.body.locals().iter().map(|slot| Value::default_for(&slot.ty)).collect();
        let mut frame = Frame { method, args, locals, stack: Vec::new(), at: 0 };
        let mut pc = 0usize;

        loop {
            let Some(instr) = program.get(pc) else {
                return Err(ExecError::FellOffEnd(method.qualified_name()));
            };
            self.tick()?;
            frame.at = instr.offset;
            trace!(method = %method.name, at = instr.offset, op = %instr.op, stack = frame.stack.len(), "exec");

            let op = instr.op;
            let mut next = pc + 1;
            match op {
                OpCode::Nop
                | OpCode::Unaligned
                | OpCode::Volatile
                | OpCode::Tailcall
                | OpCode::Constrained
                | OpCode::No
                | OpCode::Readonly => {}
                OpCode::Break => warn!(method = %method.qualified_name(), at = instr.offset, "break instruction ignored"),

                /* constants */
                OpCode::Ldnull => frame.push(Value::Null),
                OpCode::Ldc_I4_M1 => frame.push(Value::I32(-1)),
                OpCode::Ldc_I4_0 => frame.push(Value::I32(0)),
                OpCode::Ldc_I4_1 => frame.push(Value::I32(1)),
                OpCode::Ldc_I4_2 => frame.push(Value::I32(2)),
                OpCode::Ldc_I4_3 => frame.push(Value::I32(3)),
                OpCode::Ldc_I4_4 => frame.push(Value::I32(4)),
                OpCode::Ldc_I4_5 => frame.push(Value::I32(5)),
                OpCode::Ldc_I4_6 => frame.push(Value::I32(6)),
                OpCode::Ldc_I4_7 => frame.push(Value::I32(7)),
                OpCode::Ldc_I4_8 => frame.push(Value::I32(8)),
                OpCode::Ldc_I4_S | OpCode::Ldc_I4 | OpCode::Ldc_I8 | OpCode::Ldc_R4 | OpCode::Ldc_R8 => {
                    let value = match instr.operand {
                        RawOperand::I8(v) => Value::I32(i32::from(v)),
                        RawOperand::I32(v) => Value::I32(v),
                        RawOperand::I64(v) => Value::I64(v),
                        RawOperand::F32(v) => Value::F64(f64::from(v)),
                        RawOperand::F64(v) => Value::F64(v),
                        _ => return Err(frame.type_error(op, "malformed literal operand")),
                    };
                    frame.push(value);
                }
                OpCode::Ldstr => {
                    let MetaEntry::Str(text) = frame.entry(&instr.operand)? else {
                        return Err(frame.type_error(op, "token is not a string"));
                    };
                    let value = Value::from(text.as_str());
                    frame.push(value);
                }

                /* arguments and locals */
                OpCode::Ldarg_0 | OpCode::Ldarg_1 | OpCode::Ldarg_2 | OpCode::Ldarg_3 => {
                    let index = op.value() - OpCode::Ldarg_0.value();
                    frame.load_arg(op, index)?;
                }
                OpCode::Ldarg_S | OpCode::Ldarg => frame.load_arg(op, var(&instr.operand))?,
                OpCode::Starg_S | OpCode::Starg => frame.store_arg(op, var(&instr.operand))?,
                OpCode::Ldloc_0 | OpCode::Ldloc_1 | OpCode::Ldloc_2 | OpCode::Ldloc_3 => {
                    let index = op.value() - OpCode::Ldloc_0.value();
                    frame.load_local(op, index)?;
                }
                OpCode::Stloc_0 | OpCode::Stloc_1 | OpCode::Stloc_2 | OpCode::Stloc_3 => {
                    let index = op.value() - OpCode::Stloc_0.value();
                    frame.store_local(op, index)?;
                }
                OpCode::Ldloc_S | OpCode::Ldloc => frame.load_local(op, var(&instr.operand))?,
                OpCode::Stloc_S | OpCode::Stloc => frame.store_local(op, var(&instr.operand))?,

                /* stack */
                OpCode::Dup => {
                    let top = frame.peek()?.clone();
                    frame.push(top);
                }
                OpCode::Pop => {
                    frame.pop()?;
                }

                /* control flow */
                OpCode::Ret => {
                    if method.sig.returns_void() {
                        return Ok(Value::Void);
                    }
                    return frame.pop();
                }
                OpCode::Br | OpCode::Br_S => next = target(program, &instr.operand)?,
                OpCode::Leave | OpCode::Leave_S => {
                    frame.stack.clear();
                    next = target(program, &instr.operand)?;
                }
                OpCode::Brfalse | OpCode::Brfalse_S => {
                    if !frame.pop()?.is_truthy() {
                        next = target(program, &instr.operand)?;
                    }
                }
                OpCode::Brtrue | OpCode::Brtrue_S => {
                    if frame.pop()?.is_truthy() {
                        next = target(program, &instr.operand)?;
                    }
                }
                OpCode::Switch => {
                    let selector = frame.pop()?;
                    let Value::I32(selector) = selector else {
                        return Err(frame.type_error(op, format!("selector is {}", selector.type_name())));
                    };
                    if let RawOperand::Targets(targets) = &instr.operand {
                        // unsigned: negative selectors fall through
                        if let Some(&t) = usize::try_from(selector as u32).ok().and_then(|i| targets.get(i)) {
                            next = index_of(program, t)?;
                        }
                    }
                }
                OpCode::Ceq | OpCode::Cgt | OpCode::Cgt_Un | OpCode::Clt | OpCode::Clt_Un => {
                    let (a, b) = frame.pop2()?;
                    let cmp = match op {
                        OpCode::Ceq => Cmp::Eq,
                        OpCode::Cgt => Cmp::Gt,
                        OpCode::Cgt_Un => Cmp::GtUn,
                        OpCode::Clt => Cmp::Lt,
                        _ => Cmp::LtUn,
                    };
                    let holds = frame.compare(op, cmp, &a, &b)?;
                    frame.push(Value::from(holds));
                }

                /* arithmetic */
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Rem => {
                    frame.arith(op, arith_of(op), Mode::Wrap)?;
                }
                OpCode::Div_Un => frame.arith(op, Arith::Div, Mode::Unsigned)?,
                OpCode::Rem_Un => frame.arith(op, Arith::Rem, Mode::Unsigned)?,
                OpCode::Add_Ovf => frame.arith(op, Arith::Add, Mode::Checked)?,
                OpCode::Sub_Ovf => frame.arith(op, Arith::Sub, Mode::Checked)?,
                OpCode::Mul_Ovf => frame.arith(op, Arith::Mul, Mode::Checked)?,
                OpCode::Add_Ovf_Un => frame.arith(op, Arith::Add, Mode::CheckedUnsigned)?,
                OpCode::Sub_Ovf_Un => frame.arith(op, Arith::Sub, Mode::CheckedUnsigned)?,
                OpCode::Mul_Ovf_Un => frame.arith(op, Arith::Mul, Mode::CheckedUnsigned)?,
                OpCode::And | OpCode::Or | OpCode::Xor => {
                    let (a, b) = frame.pop2()?;
                    let Some(Operands::Int(x, y, w)) = operands(&a, &b) else {
                        return Err(frame.type_error(op, format!("{} and {}", a.type_name(), b.type_name())));
                    };
                    let r = match op {
                        OpCode::And => x & y,
                        OpCode::Or => x | y,
                        _ => x ^ y,
                    };
                    frame.push(w.wrap(i128::from(r)));
                }
                OpCode::Shl | OpCode::Shr | OpCode::Shr_Un => {
                    let (value, amount) = frame.pop2()?;
                    let amount = match amount {
                        Value::I32(n) => i64::from(n),
                        Value::NInt(n) => n,
                        other => return Err(frame.type_error(op, format!("shift amount is {}", other.type_name()))),
                    };
                    let Some((x, w)) = int_of(&value) else {
                        return Err(frame.type_error(op, format!("cannot shift {}", value.type_name())));
                    };
                    let n = (amount as u32) & (w.bits() - 1);
                    let r = match (op, w) {
                        (OpCode::Shl, _) => i128::from(x.wrapping_shl(n)),
                        (OpCode::Shr, Width::W32) => i128::from((x as i32) >> n),
                        (OpCode::Shr, _) => i128::from(x >> n),
                        (_, Width::W32) => i128::from((x as u32) >> n),
                        (_, _) => i128::from((x as u64) >> n),
                    };
                    frame.push(w.wrap(r));
                }
                OpCode::Neg => {
                    let value = frame.pop()?;
                    let r = match value {
                        Value::I32(v) => Value::I32(v.wrapping_neg()),
                        Value::I64(v) => Value::I64(v.wrapping_neg()),
                        Value::NInt(v) => Value::NInt(v.wrapping_neg()),
                        Value::F64(v) => Value::F64(-v),
                        other => return Err(frame.type_error(op, format!("cannot negate {}", other.type_name()))),
                    };
                    frame.push(r);
                }
                OpCode::Not => {
                    let value = frame.pop()?;
                    let r = match value {
                        Value::I32(v) => Value::I32(!v),
                        Value::I64(v) => Value::I64(!v),
                        Value::NInt(v) => Value::NInt(!v),
                        other => return Err(frame.type_error(op, format!("cannot complement {}", other.type_name()))),
                    };
                    frame.push(r);
                }
                OpCode::Ckfinite => {
                    if let Value::F64(v) = frame.peek()? {
                        if !v.is_finite() {
                            return Err(ExecError::NotFinite);
                        }
                    } else {
                        return Err(frame.type_error(op, "operand is not a float"));
                    }
                }

                /* conversions */
                OpCode::Conv_R4 | OpCode::Conv_R8 | OpCode::Conv_R_Un => {
                    let value = frame.pop()?;
                    let x = match (op, &value) {
                        (_, Value::F64(v)) => *v,
                        (OpCode::Conv_R_Un, Value::I32(v)) => f64::from(*v as u32),
                        (OpCode::Conv_R_Un, Value::I64(v) | Value::NInt(v)) => *v as u64 as f64,
                        (_, Value::I32(v)) => f64::from(*v),
                        (_, Value::I64(v) | Value::NInt(v)) => *v as f64,
                        _ => return Err(frame.type_error(op, format!("cannot convert {}", value.type_name()))),
                    };
                    let x = if op == OpCode::Conv_R4 { f64::from(x as f32) } else { x };
                    frame.push(Value::F64(x));
                }

                /* calls and objects */
                OpCode::Call | OpCode::Callvirt => {
                    let callee = frame.method_ref(&instr.operand)?.clone();
                    self.call(&mut frame, &callee, op == OpCode::Callvirt)?;
                }
                OpCode::Newobj => {
                    let ctor = frame.method_ref(&instr.operand)?.clone();
                    self.new_object(&mut frame, &ctor)?;
                }
                OpCode::Ldfld => {
                    let field = frame.field_ref(&instr.operand)?.clone();
                    let target = frame.pop()?;
                    let value = match target {
                        Value::Object(obj) => {
                            obj.field(&field.name).ok_or_else(|| ExecError::UnresolvedField(field.to_string()))?
                        }
                        Value::Null => return Err(ExecError::NullReference),
                        other => return Err(frame.type_error(op, format!("field access on {}", other.type_name()))),
                    };
                    frame.push(value);
                }
                OpCode::Stfld => {
                    let field = frame.field_ref(&instr.operand)?.clone();
                    let (target, value) = frame.pop2()?;
                    match target {
                        Value::Object(obj) => {
                            if !obj.set_field(&field.name, value.narrow_to(&field.ty)) {
                                return Err(ExecError::UnresolvedField(field.to_string()));
                            }
                        }
                        Value::Null => return Err(ExecError::NullReference),
                        other => return Err(frame.type_error(op, format!("field access on {}", other.type_name()))),
                    }
                }
                OpCode::Ldsfld => {
                    let field = frame.field_ref(&instr.operand)?.clone();
                    let owner = self.static_owner(&field)?;
                    let value = owner.get_static(&field.name).ok_or_else(|| ExecError::UnresolvedField(field.to_string()))?;
                    frame.push(value);
                }
                OpCode::Stsfld => {
                    let field = frame.field_ref(&instr.operand)?.clone();
                    let owner = self.static_owner(&field)?;
                    let value = frame.pop()?.narrow_to(&field.ty);
                    if !owner.set_static(&field.name, value) {
                        return Err(ExecError::UnresolvedField(field.to_string()));
                    }
                }

                /* arrays */
                OpCode::Newarr => {
                    let elem = frame.type_ref(&instr.operand)?.clone();
                    let len = frame.pop_index(op)?;
                    let len = usize::try_from(len).map_err(|_| ExecError::Overflow)?;
                    frame.push(Value::Array(Rc::new(ArrayData::new(elem, len))));
                }
                OpCode::Ldlen => {
                    let array = frame.pop_array(op)?;
                    let len = array.items.borrow().len();
                    frame.push(Value::NInt(i64::try_from(len).unwrap_or(i64::MAX)));
                }
                op if is_ldelem(op) => {
                    let index = frame.pop_index(op)?;
                    let array = frame.pop_array(op)?;
                    let items = array.items.borrow();
                    let value = element(&items, index)?.clone();
                    drop(items);
                    frame.push(value);
                }
                op if is_stelem(op) => {
                    let value = frame.pop()?;
                    let index = frame.pop_index(op)?;
                    let array = frame.pop_array(op)?;
                    let mut items = array.items.borrow_mut();
                    let len = items.len();
                    let slot = usize::try_from(index)
                        .ok()
                        .and_then(|i| items.get_mut(i))
                        .ok_or(ExecError::IndexOutOfRange { index, len })?;
                    *slot = value.narrow_to(&array.elem);
                }

                /* type tests and boxing */
                OpCode::Box => {
                    let ty = frame.type_ref(&instr.operand)?.clone();
                    let value = frame.pop()?;
                    let boxed = if ty.is_primitive() && !value.is_reference() {
                        Value::Boxed(Rc::new(BoxedValue { value: value.narrow_to(&ty), ty }))
                    } else {
                        value
                    };
                    frame.push(boxed);
                }
                OpCode::Unbox_Any => {
                    let ty = frame.type_ref(&instr.operand)?.clone();
                    let value = frame.pop()?;
                    let unboxed = if ty.is_primitive() {
                        match value {
                            Value::Boxed(b) if b.ty == ty => b.value.clone(),
                            Value::Null => return Err(ExecError::NullReference),
                            other => return Err(ExecError::InvalidCast { from: other.type_name(), to: ty.to_string() }),
                        }
                    } else {
                        self.cast(value, &ty)?
                    };
                    frame.push(unboxed);
                }
                OpCode::Castclass => {
                    let ty = frame.type_ref(&instr.operand)?.clone();
                    let value = frame.pop()?;
                    let value = self.cast(value, &ty)?;
                    frame.push(value);
                }
                OpCode::Isinst => {
                    let ty = frame.type_ref(&instr.operand)?.clone();
                    let value = frame.pop()?;
                    let result = if self.is_instance(&value, &ty) { value } else { Value::Null };
                    frame.push(result);
                }
                OpCode::Sizeof => {
                    let ty = frame.type_ref(&instr.operand)?;
                    let size = ty.size_of().ok_or(ExecError::Unsupported(op))?;
                    frame.push(Value::I32(i32::try_from(size).unwrap_or(i32::MAX)));
                }

                OpCode::Throw => {
                    let value = frame.pop()?;
                    if matches!(value, Value::Null) {
                        return Err(ExecError::NullReference);
                    }
                    return Err(ExecError::Thrown(value.to_string()));
                }

                other => {
                    if let Some(cmp) = branch_cmp(other) {
                        let (a, b) = frame.pop2()?;
                        if frame.compare(other, cmp, &a, &b)? {
                            next = target(program, &instr.operand)?;
                        }
                    } else if let Some((to, checked, unsigned_source)) = conversion_of(other) {
                        let value = frame.pop()?;
                        let converted = convert(&value, to, checked, unsigned_source)
                            .ok_or_else(|| frame.type_error(other, format!("cannot convert {}", value.type_name())))??;
                        frame.push(converted);
                    } else {
                        // pointers, typed references, EH regions, unmanaged memory, function pointers
                        return Err(ExecError::Unsupported(other));
                    }
                }
            }
            pc = next;
        }
    }

    fn call(&mut self, frame: &mut Frame<'_>, callee: &MethodRef, virtual_call: bool) -> ExecResult<()> {
        let args = frame.pop_n(callee.arg_count())?;
        let resolved = if virtual_call && callee.has_this {
            self.resolve_virtual(callee, args.first())?
        } else {
            self.resolve_direct(callee)
        };
        let result = match resolved {
            Some(method) => self.invoke(&method, args)?,
            None => {
                let key = format!("{}::{}", callee.owner, callee.name);
                let native = self.module.native(&key).ok_or_else(|| ExecError::UnresolvedMethod(callee.to_string()))?;
                native(&args)?
            }
        };
        if !callee.sig.returns_void() {
            frame.push(result);
        }
        Ok(())
    }

    fn resolve_type(&self, ty: &TypeRef) -> ExecResult<Rc<RuntimeType>> {
        match ty {
            TypeRef::Named(name) => self.module.resolve_type(name).ok_or_else(|| ExecError::UnresolvedType(name.clone())),
            other => Err(ExecError::UnresolvedType(other.to_string())),
        }
    }

    fn resolve_direct(&self, callee: &MethodRef) -> Option<Rc<RuntimeMethod>> {
        let owner = self.resolve_type(&callee.owner).ok()?;
        owner.find_method(&callee.name, &callee.sig.params, callee.has_this)
    }

    fn resolve_virtual(&self, callee: &MethodRef, receiver: Option<&Value>) -> ExecResult<Option<Rc<RuntimeMethod>>> {
        let object = match receiver {
            Some(Value::Object(object)) => object,
            Some(Value::Null) | None => return Err(ExecError::NullReference),
            Some(_) => return Ok(self.resolve_direct(callee)),
        };
        let ty = object.runtime_type();
        if let TypeRef::Named(owner) = &callee.owner {
            if let Some(contract) = ty.contract_named(owner) {
                let method = contract
                    .resolve_member(&callee.name, &callee.sig.params)
                    .ok()
                    .and_then(|member| ty.dispatch_slot(owner, member.slot()));
                return Ok(method);
            }
        }
        Ok(ty.find_method(&callee.name, &callee.sig.params, true).or_else(|| self.resolve_direct(callee)))
    }

    fn new_object(&mut self, frame: &mut Frame<'_>, ctor: &MethodRef) -> ExecResult<()> {
        let ty = self.resolve_type(&ctor.owner)?;
        if ty.is_abstract() {
            return Err(frame.type_error(OpCode::Newobj, format!("`{}` cannot be instantiated", ty.name())));
        }
        let params = frame.pop_n(ctor.sig.params.len())?;
        let object = ty.allocate();
        match ty.find_ctor(&ctor.sig.params) {
            Some(method) => {
                let mut args = Vec::with_capacity(params.len() + 1);
                args.push(Value::Object(Rc::clone(&object)));
                args.extend(params);
                self.invoke(&method, args)?;
            }
            None if params.is_empty() => {}
            None => return Err(ExecError::UnresolvedMethod(ctor.to_string())),
        }
        frame.push(Value::Object(object));
        Ok(())
    }

    fn static_owner(&self, field: &FieldRef) -> ExecResult<Rc<RuntimeType>> { self.resolve_type(&field.owner) }

    fn is_instance(&self, value: &Value, ty: &TypeRef) -> bool {
        match (value, ty) {
            (Value::Null | Value::Void, _) => false,
            (_, TypeRef::Object) => true,
            (Value::Str(_), TypeRef::String) => true,
            (Value::Object(obj), TypeRef::Named(name)) => {
                let rt = obj.runtime_type();
                rt.is_subtype_of(name) || rt.implements(name)
            }
            (Value::Array(arr), TypeRef::Array(elem)) => arr.elem == **elem || **elem == TypeRef::Object,
            (Value::Boxed(b), ty) => b.ty == *ty,
            _ => false,
        }
    }

    fn cast(&self, value: Value, ty: &TypeRef) -> ExecResult<Value> {
        if matches!(value, Value::Null) || self.is_instance(&value, ty) {
            Ok(value)
        } else {
            Err(ExecError::InvalidCast { from: value.type_name(), to: ty.to_string() })
        }
    }
}

/* ─────────────────────────── Frame ─────────────────────────── */

struct Frame<'a> {
    method: &'a RuntimeMethod,
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
    at: u32,
}

impl Frame<'_> {
    fn push(&mut self, value: Value) { self.stack.push(value); }

    fn pop(&mut self) -> ExecResult<Value> { self.stack.pop().ok_or(ExecError::StackUnderflow { at: self.at }) }

    fn peek(&self) -> ExecResult<&Value> { self.stack.last().ok_or(ExecError::StackUnderflow { at: self.at }) }

    /// Pops `(second, top)`.
    fn pop2(&mut self) -> ExecResult<(Value, Value)> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn pop_n(&mut self, n: usize) -> ExecResult<Vec<Value>> {
        let len = self.stack.len();
        if len < n {
            return Err(ExecError::StackUnderflow { at: self.at });
        }
        Ok(self.stack.split_off(len - n))
    }

    fn pop_index(&mut self, op: OpCode) -> ExecResult<i64> {
        match self.pop()? {
            Value::I32(i) => Ok(i64::from(i)),
            Value::NInt(i) => Ok(i),
            other => Err(self.type_error(op, format!("index is {}", other.type_name()))),
        }
    }

    fn pop_array(&mut self, op: OpCode) -> ExecResult<Rc<ArrayData>> {
        match self.pop()? {
            Value::Array(array) => Ok(array),
            Value::Null => Err(ExecError::NullReference),
            other => Err(self.type_error(op, format!("{} is not an array", other.type_name()))),
        }
    }

    fn type_error(&self, op: OpCode, detail: impl Into<String>) -> ExecError {
        ExecError::Type { op, at: self.at, detail: detail.into() }
    }

    fn load_arg(&mut self, op: OpCode, index: u16) -> ExecResult<()> {
        let value = self.args.get(usize::from(index)).cloned();
        let value = value.ok_or_else(|| self.type_error(op, format!("no argument {index}")))?;
        self.push(value);
        Ok(())
    }

    fn store_arg(&mut self, op: OpCode, index: u16) -> ExecResult<()> {
        let value = self.pop()?;
        let param = self.param_type(index).cloned();
        let value = match param {
            Some(ty) => value.narrow_to(&ty),
            None => value,
        };
        let at = self.at;
        let slot = self.args.get_mut(usize::from(index)).ok_or(ExecError::Type {
            op,
            at,
            detail: format!("no argument {index}"),
        })?;
        *slot = value;
        Ok(())
    }

    fn param_type(&self, index: u16) -> Option<&TypeRef> {
        let index = usize::from(index).checked_sub(usize::from(self.method.has_this()))?;
        self.method.sig.params.get(index)
    }

    fn load_local(&mut self, op: OpCode, index: u16) -> ExecResult<()> {
        let value = self.locals.get(usize::from(index)).cloned();
        let value = value.ok_or_else(|| self.type_error(op, format!("no local {index}")))?;
        self.push(value);
        Ok(())
    }

    fn store_local(&mut self, op: OpCode, index: u16) -> ExecResult<()> {
        let value = self.pop()?;
        let ty = self.method.body.locals().get(usize::from(index)).map(|slot| slot.ty.clone());
        let (Some(ty), Some(slot)) = (ty, self.locals.get_mut(usize::from(index))) else {
            return Err(ExecError::Type { op, at: self.at, detail: format!("no local {index}") });
        };
        *slot = value.narrow_to(&ty);
        Ok(())
    }

    fn entry(&self, operand: &RawOperand) -> ExecResult<&'_ MetaEntry> {
        match operand {
            RawOperand::Token(token) => Ok(self.method.body.resolve_token(*token)?),
            _ => Err(ExecError::Core(ilforge_core::CoreError::corrupted("token operand expected"))),
        }
    }

    fn method_ref(&self, operand: &RawOperand) -> ExecResult<&'_ MethodRef> {
        match self.entry(operand)? {
            MetaEntry::Method(m) => Ok(m),
            _ => Err(ExecError::Core(ilforge_core::CoreError::corrupted("method token expected"))),
        }
    }

    fn field_ref(&self, operand: &RawOperand) -> ExecResult<&'_ FieldRef> {
        match self.entry(operand)? {
            MetaEntry::Field(f) => Ok(f),
            _ => Err(ExecError::Core(ilforge_core::CoreError::corrupted("field token expected"))),
        }
    }

    fn type_ref(&self, operand: &RawOperand) -> ExecResult<&'_ TypeRef> {
        match self.entry(operand)? {
            MetaEntry::Type(t) => Ok(t),
            _ => Err(ExecError::Core(ilforge_core::CoreError::corrupted("type token expected"))),
        }
    }

    fn compare(&self, op: OpCode, cmp: Cmp, a: &Value, b: &Value) -> ExecResult<bool> {
        compare(cmp, a, b)
            .ok_or_else(|| self.type_error(op, format!("cannot compare {} with {}", a.type_name(), b.type_name())))
    }

    fn arith(&mut self, op: OpCode, arith: Arith, mode: Mode) -> ExecResult<()> {
        let (a, b) = self.pop2()?;
        let result = match operands(&a, &b) {
            Some(Operands::Int(x, y, w)) => int_arith(arith, x, y, w, mode)?,
            Some(Operands::Float(x, y)) if mode == Mode::Wrap => Value::F64(match arith {
                Arith::Add => x + y,
                Arith::Sub => x - y,
                Arith::Mul => x * y,
                Arith::Div => x / y,
                Arith::Rem => x % y,
            }),
            _ => return Err(self.type_error(op, format!("{} and {}", a.type_name(), b.type_name()))),
        };
        self.push(result);
        Ok(())
    }
}

fn var(operand: &RawOperand) -> u16 {
    match operand {
        RawOperand::Var(v) => *v,
        _ => u16::MAX,
    }
}

fn index_of(program: &[ilforge_core::Decoded], offset: u32) -> ExecResult<usize> {
    program.binary_search_by_key(&offset, |d| d.offset).map_err(|_| ExecError::BadBranch(offset))
}

fn target(program: &[ilforge_core::Decoded], operand: &RawOperand) -> ExecResult<usize> {
    match operand {
        RawOperand::Target(t) => index_of(program, *t),
        _ => Err(ExecError::BadBranch(u32::MAX)),
    }
}

fn element(items: &[Value], index: i64) -> ExecResult<&Value> {
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .ok_or(ExecError::IndexOutOfRange { index, len: items.len() })
}

const fn is_ldelem(op: OpCode) -> bool {
    matches!(
        op,
        OpCode::Ldelem
            | OpCode::Ldelem_I1
            | OpCode::Ldelem_U1
            | OpCode::Ldelem_I2
            | OpCode::Ldelem_U2
            | OpCode::Ldelem_I4
            | OpCode::Ldelem_U4
            | OpCode::Ldelem_I8
            | OpCode::Ldelem_I
            | OpCode::Ldelem_R4
            | OpCode::Ldelem_R8
            | OpCode::Ldelem_Ref
    )
}

const fn is_stelem(op: OpCode) -> bool {
    matches!(
        op,
        OpCode::Stelem
            | OpCode::Stelem_I
            | OpCode::Stelem_I1
            | OpCode::Stelem_I2
            | OpCode::Stelem_I4
            | OpCode::Stelem_I8
            | OpCode::Stelem_R4
            | OpCode::Stelem_R8
            | OpCode::Stelem_Ref
    )
}

/* ─────────────────────────── Arithmetic ─────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    W32,
    W64,
    Native,
}

impl Width {
    const fn bits(self) -> u32 {
        match self {
            Width::W32 => 32,
            Width::W64 | Width::Native => 64,
        }
    }

    fn wrap(self, v: i128) -> Value {
        match self {
            Width::W32 => Value::I32(v as i32),
            Width::W64 => Value::I64(v as i64),
            Width::Native => Value::NInt(v as i64),
        }
    }

    fn signed_range(self) -> (i128, i128) {
        match self {
            Width::W32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            Width::W64 | Width::Native => (i128::from(i64::MIN), i128::from(i64::MAX)),
        }
    }

    fn unsigned_max(self) -> i128 {
        match self {
            Width::W32 => i128::from(u32::MAX),
            Width::W64 | Width::Native => i128::from(u64::MAX),
        }
    }

    fn unsigned(self, v: i64) -> i128 {
        match self {
            Width::W32 => i128::from(v as u32),
            Width::W64 | Width::Native => i128::from(v as u64),
        }
    }
}

enum Operands {
    Int(i64, i64, Width),
    Float(f64, f64),
}

fn operands(a: &Value, b: &Value) -> Option<Operands> {
    Some(match (a, b) {
        (Value::I32(x), Value::I32(y)) => Operands::Int(i64::from(*x), i64::from(*y), Width::W32),
        (Value::I64(x), Value::I64(y)) => Operands::Int(*x, *y, Width::W64),
        (Value::NInt(x), Value::NInt(y)) => Operands::Int(*x, *y, Width::Native),
        (Value::NInt(x), Value::I32(y)) => Operands::Int(*x, i64::from(*y), Width::Native),
        (Value::I32(x), Value::NInt(y)) => Operands::Int(i64::from(*x), *y, Width::Native),
        (Value::F64(x), Value::F64(y)) => Operands::Float(*x, *y),
        _ => return None,
    })
}

fn int_of(value: &Value) -> Option<(i64, Width)> {
    match value {
        Value::I32(v) => Some((i64::from(*v), Width::W32)),
        Value::I64(v) => Some((*v, Width::W64)),
        Value::NInt(v) => Some((*v, Width::Native)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

const fn arith_of(op: OpCode) -> Arith {
    match op {
        OpCode::Sub => Arith::Sub,
        OpCode::Mul => Arith::Mul,
        OpCode::Div => Arith::Div,
        OpCode::Rem => Arith::Rem,
        _ => Arith::Add,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Two's complement wrap-around.
    Wrap,
    /// Operands read as unsigned (`div.un`, `rem.un`).
    Unsigned,
    /// Signed, overflow raises.
    Checked,
    /// Unsigned, overflow raises.
    CheckedUnsigned,
}

fn int_arith(arith: Arith, x: i64, y: i64, w: Width, mode: Mode) -> ExecResult<Value> {
    let unsigned = matches!(mode, Mode::Unsigned | Mode::CheckedUnsigned);
    let (a, b) = if unsigned { (w.unsigned(x), w.unsigned(y)) } else { (i128::from(x), i128::from(y)) };

    match arith {
        Arith::Div | Arith::Rem => {
            if b == 0 {
                return Err(ExecError::DivideByZero);
            }
            if !unsigned && a == w.signed_range().0 && b == -1 {
                return Err(ExecError::Overflow);
            }
            Ok(w.wrap(if arith == Arith::Div { a / b } else { a % b }))
        }
        Arith::Add | Arith::Sub | Arith::Mul => {
            let r = match arith {
                Arith::Add => a.checked_add(b),
                Arith::Sub => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            match mode {
                Mode::Wrap | Mode::Unsigned => {
                    let r = match arith {
                        Arith::Add => x.wrapping_add(y),
                        Arith::Sub => x.wrapping_sub(y),
                        _ => x.wrapping_mul(y),
                    };
                    Ok(w.wrap(i128::from(r)))
                }
                Mode::Checked => {
                    let (lo, hi) = w.signed_range();
                    r.filter(|r| (lo..=hi).contains(r)).map(|r| w.wrap(r)).ok_or(ExecError::Overflow)
                }
                Mode::CheckedUnsigned => {
                    r.filter(|r| (0..=w.unsigned_max()).contains(r)).map(|r| w.wrap(r)).ok_or(ExecError::Overflow)
                }
            }
        }
    }
}

/* ─────────────────────────── Comparison ─────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    NeUn,
    Ge,
    GeUn,
    Gt,
    GtUn,
    Le,
    LeUn,
    Lt,
    LtUn,
}

impl Cmp {
    const fn unsigned(self) -> bool { matches!(self, Cmp::NeUn | Cmp::GeUn | Cmp::GtUn | Cmp::LeUn | Cmp::LtUn) }

    /// `None` is an unordered float comparison.
    fn holds(self, ord: Option<Ordering>) -> bool {
        let Some(ord) = ord else { return self.unsigned() };
        match self {
            Cmp::Eq => ord == Ordering::Equal,
            Cmp::NeUn => ord != Ordering::Equal,
            Cmp::Ge | Cmp::GeUn => ord != Ordering::Less,
            Cmp::Gt | Cmp::GtUn => ord == Ordering::Greater,
            Cmp::Le | Cmp::LeUn => ord != Ordering::Greater,
            Cmp::Lt | Cmp::LtUn => ord == Ordering::Less,
        }
    }
}

const fn branch_cmp(op: OpCode) -> Option<Cmp> {
    Some(match op {
        OpCode::Beq | OpCode::Beq_S => Cmp::Eq,
        OpCode::Bne_Un | OpCode::Bne_Un_S => Cmp::NeUn,
        OpCode::Bge | OpCode::Bge_S => Cmp::Ge,
        OpCode::Bge_Un | OpCode::Bge_Un_S => Cmp::GeUn,
        OpCode::Bgt | OpCode::Bgt_S => Cmp::Gt,
        OpCode::Bgt_Un | OpCode::Bgt_Un_S => Cmp::GtUn,
        OpCode::Ble | OpCode::Ble_S => Cmp::Le,
        OpCode::Ble_Un | OpCode::Ble_Un_S => Cmp::LeUn,
        OpCode::Blt | OpCode::Blt_S => Cmp::Lt,
        OpCode::Blt_Un | OpCode::Blt_Un_S => Cmp::LtUn,
        _ => return None,
    })
}

fn compare(cmp: Cmp, a: &Value, b: &Value) -> Option<bool> {
    match operands(a, b) {
        Some(Operands::Int(x, y, w)) => {
            let ord = if cmp.unsigned() { w.unsigned(x).cmp(&w.unsigned(y)) } else { x.cmp(&y) };
            Some(cmp.holds(Some(ord)))
        }
        Some(Operands::Float(x, y)) => Some(cmp.holds(x.partial_cmp(&y))),
        None if a.is_reference() && b.is_reference() => match cmp {
            Cmp::Eq => Some(a.same_reference(b)),
            Cmp::NeUn => Some(!a.same_reference(b)),
            // `obj != null` idiom
            Cmp::GtUn => Some(!matches!(a, Value::Null) && matches!(b, Value::Null)),
            Cmp::LtUn => Some(matches!(a, Value::Null) && !matches!(b, Value::Null)),
            _ => None,
        },
        None => None,
    }
}

/* ─────────────────────────── Conversion ─────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntTarget {
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    I,
    U,
}

impl IntTarget {
    fn range(self) -> (i128, i128) {
        match self {
            IntTarget::I1 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            IntTarget::U1 => (0, i128::from(u8::MAX)),
            IntTarget::I2 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            IntTarget::U2 => (0, i128::from(u16::MAX)),
            IntTarget::I4 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            IntTarget::U4 => (0, i128::from(u32::MAX)),
            IntTarget::I8 | IntTarget::I => (i128::from(i64::MIN), i128::from(i64::MAX)),
            IntTarget::U8 | IntTarget::U => (0, i128::from(u64::MAX)),
        }
    }

    fn store(self, v: i128) -> Value {
        match self {
            IntTarget::I1 => Value::I32(i32::from(v as i8)),
            IntTarget::U1 => Value::I32(i32::from(v as u8)),
            IntTarget::I2 => Value::I32(i32::from(v as i16)),
            IntTarget::U2 => Value::I32(i32::from(v as u16)),
            IntTarget::I4 | IntTarget::U4 => Value::I32(v as u32 as i32),
            IntTarget::I8 | IntTarget::U8 => Value::I64(v as u64 as i64),
            IntTarget::I | IntTarget::U => Value::NInt(v as u64 as i64),
        }
    }
}

/// `(target, checked, source read as unsigned)`.
const fn conversion_of(op: OpCode) -> Option<(IntTarget, bool, bool)> {
    use IntTarget as T;
    Some(match op {
        OpCode::Conv_I1 => (T::I1, false, false),
        OpCode::Conv_U1 => (T::U1, false, false),
        OpCode::Conv_I2 => (T::I2, false, false),
        OpCode::Conv_U2 => (T::U2, false, false),
        OpCode::Conv_I4 => (T::I4, false, false),
        OpCode::Conv_U4 => (T::U4, false, false),
        OpCode::Conv_I8 => (T::I8, false, false),
        OpCode::Conv_U8 => (T::U8, false, false),
        OpCode::Conv_I => (T::I, false, false),
        OpCode::Conv_U => (T::U, false, false),
        OpCode::Conv_Ovf_I1 => (T::I1, true, false),
        OpCode::Conv_Ovf_U1 => (T::U1, true, false),
        OpCode::Conv_Ovf_I2 => (T::I2, true, false),
        OpCode::Conv_Ovf_U2 => (T::U2, true, false),
        OpCode::Conv_Ovf_I4 => (T::I4, true, false),
        OpCode::Conv_Ovf_U4 => (T::U4, true, false),
        OpCode::Conv_Ovf_I8 => (T::I8, true, false),
        OpCode::Conv_Ovf_U8 => (T::U8, true, false),
        OpCode::Conv_Ovf_I => (T::I, true, false),
        OpCode::Conv_Ovf_U => (T::U, true, false),
        OpCode::Conv_Ovf_I1_Un => (T::I1, true, true),
        OpCode::Conv_Ovf_U1_Un => (T::U1, true, true),
        OpCode::Conv_Ovf_I2_Un => (T::I2, true, true),
        OpCode::Conv_Ovf_U2_Un => (T::U2, true, true),
        OpCode::Conv_Ovf_I4_Un => (T::I4, true, true),
        OpCode::Conv_Ovf_U4_Un => (T::U4, true, true),
        OpCode::Conv_Ovf_I8_Un => (T::I8, true, true),
        OpCode::Conv_Ovf_U8_Un => (T::U8, true, true),
        OpCode::Conv_Ovf_I_Un => (T::I, true, true),
        OpCode::Conv_Ovf_U_Un => (T::U, true, true),
        _ => return None,
    })
}

/// `None` when `value` is not numeric.
fn convert(value: &Value, target: IntTarget, checked: bool, unsigned_source: bool) -> Option<ExecResult<Value>> {
    let n = match *value {
        Value::I32(v) if unsigned_source => i128::from(v as u32),
        Value::I32(v) => i128::from(v),
        Value::I64(v) | Value::NInt(v) if unsigned_source => i128::from(v as u64),
        Value::I64(v) | Value::NInt(v) => i128::from(v),
        Value::F64(f) => {
            if checked && f.is_nan() {
                return Some(Err(ExecError::Overflow));
            }
            f.trunc() as i128
        }
        _ => return None,
    };
    let (lo, hi) = target.range();
    if checked && !(lo..=hi).contains(&n) {
        return Some(Err(ExecError::Overflow));
    }
    Some(Ok(target.store(n)))
}
