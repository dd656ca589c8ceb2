//! Small text assembler producing a [`MethodBody`].
//!
//! One instruction per line, mnemonics as printed by the disassembler:
//!
//! ```text
//! .local int32            ; declares local 0
//!     ldarg.0
//!     brfalse.s zero
//!     ldarg.0
//!     ldc.i4.2
//!     mul
//!     ret
//! zero:
//!     ldc.i4.m1
//!     ret
//! ```
//!
//! Operands by kind:
//! - integers (decimal or `0x` hex), floats, argument/local indices;
//! - `"strings"` with `\n`, `\t`, `\"`, `\\` escapes;
//! - label names, `(a, b, c)` jump tables;
//! - types: `int32`, `string[]`, `My.Type`;
//! - methods: `[instance] Owner::name(T, ..., ...[, V]) [-> R]` (`.ctor` is always instance);
//! - fields: `[static] Owner::name : T`;
//! - `ldtoken`: `type T`, `field ...`, `method ...`;
//! - `calli`: `[cdecl|stdcall|...] (T, ...) -> R`.

use std::collections::HashMap;

use crate::bytecode::body::{Label, MethodBody, Operand};
use crate::bytecode::opcode::{OpCode, OperandKind};
use crate::meta::{CallConv, CallSite, FieldRef, MethodRef, Signature, Token, TypeRef};
use crate::{CoreError, CoreResult};

/// Assembles `source` into an open body (not yet sealed).
pub fn assemble(source: &str) -> CoreResult<MethodBody> {
    let mut asm = Assembler::default();
    for (idx, raw_line) in source.lines().enumerate() {
        asm.line = idx + 1;
        asm.feed(strip_comment(raw_line).trim())?;
    }
    asm.finish()
}

#[derive(Default)]
struct Assembler {
    body: MethodBody,
    line: usize,
    /// name → (label, line of first reference or definition)
    labels: HashMap<String, (Label, usize)>,
    marked: HashMap<String, usize>,
}

impl Assembler {
    fn err(&self, message: impl Into<String>) -> CoreError {
        CoreError::Asm { line: self.line, message: message.into() }
    }

    fn feed(&mut self, mut line: &str) -> CoreResult<()> {
        while let Some((name, rest)) = split_label(line) {
            if let Some(prev) = self.marked.get(name) {
                return Err(self.err(format!("label `{name}` already defined on line {prev}")));
            }
            let label = self.label(name);
            self.marked.insert(name.to_owned(), self.line);
            self.body.mark_label(label);
            line = rest.trim_start();
        }
        if line.is_empty() {
            return Ok(());
        }

        if let Some(rest) = line.strip_prefix(".local") {
            let mut parts = rest.split_whitespace();
            let ty_text = parts.next().ok_or_else(|| self.err("`.local` expects a type"))?;
            let ty = TypeRef::parse(ty_text).ok_or_else(|| self.err(format!("invalid type `{ty_text}`")))?;
            let pinned = match parts.next() {
                None => false,
                Some("pinned") => true,
                Some(other) => return Err(self.err(format!("unexpected `{other}` after local type"))),
            };
            self.body.declare_local(ty, pinned);
            return Ok(());
        }

        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, r)) => (m, r.trim()),
            None => (line, ""),
        };
        let op = OpCode::from_mnemonic(mnemonic)
            .ok_or_else(|| self.err(format!("unknown instruction `{mnemonic}`")))?;
        let operand = self.operand(op, rest)?;
        self.body.emit(op, operand);
        Ok(())
    }

    fn label(&mut self, name: &str) -> Label {
        if let Some((label, _)) = self.labels.get(name) {
            return *label;
        }
        let label = self.body.define_label();
        self.labels.insert(name.to_owned(), (label, self.line));
        label
    }

    fn operand(&mut self, op: OpCode, text: &str) -> CoreResult<Operand> {
        let kind = op.operand_kind();
        if kind == OperandKind::None {
            if !text.is_empty() {
                return Err(self.err(format!("`{op}` takes no operand")));
            }
            return Ok(Operand::None);
        }
        if text.is_empty() {
            return Err(self.err(format!("`{op}` expects a {kind:?} operand")));
        }
        let bad = |what: &str| self.err(format!("`{op}`: invalid {what} `{text}`"));
        Ok(match kind {
            OperandKind::None => Operand::None,
            OperandKind::ShortI8 => Operand::I8(int(text).ok_or_else(|| bad("int8"))?),
            OperandKind::U8 => Operand::U8(int(text).ok_or_else(|| bad("uint8"))?),
            OperandKind::Int32 => Operand::I32(int(text).ok_or_else(|| bad("int32"))?),
            OperandKind::Int64 => Operand::I64(int(text).ok_or_else(|| bad("int64"))?),
            OperandKind::Float32 => Operand::F32(text.parse().map_err(|_| bad("float32"))?),
            OperandKind::Float64 => Operand::F64(text.parse().map_err(|_| bad("float64"))?),
            OperandKind::ShortVar | OperandKind::Var => Operand::Var(int(text).ok_or_else(|| bad("index"))?),
            OperandKind::String => Operand::Str(parse_string_literal(text).ok_or_else(|| bad("string literal"))?),
            OperandKind::Type => Operand::Type(TypeRef::parse(text).ok_or_else(|| bad("type"))?),
            OperandKind::Field => Operand::Field(parse_field(text).ok_or_else(|| bad("field reference"))?),
            OperandKind::Method => Operand::Method(parse_method(text).ok_or_else(|| bad("method reference"))?),
            OperandKind::Sig => Operand::Sig(parse_call_site(text).ok_or_else(|| bad("call site"))?),
            OperandKind::Token => Operand::Token(parse_token(text).ok_or_else(|| bad("token"))?),
            OperandKind::ShortBranch | OperandKind::Branch => {
                if !is_label_name(text) {
                    return Err(bad("label"));
                }
                Operand::Target(self.label(text))
            }
            OperandKind::Switch => {
                let inner = text
                    .strip_prefix('(')
                    .and_then(|t| t.strip_suffix(')'))
                    .ok_or_else(|| bad("jump table"))?;
                let names: Vec<&str> = split_list(inner);
                if names.iter().any(|n| !is_label_name(n)) {
                    return Err(bad("jump table"));
                }
                Operand::Targets(names.into_iter().map(|n| self.label(n)).collect())
            }
        })
    }

    fn finish(self) -> CoreResult<MethodBody> {
        let mut missing: Vec<(&String, usize)> = self
            .labels
            .iter()
            .filter(|(name, _)| !self.marked.contains_key(*name))
            .map(|(name, (_, line))| (name, *line))
            .collect();
        missing.sort_by_key(|(_, line)| *line);
        if let Some((name, line)) = missing.first() {
            return Err(CoreError::Asm { line: *line, message: format!("undefined label `{name}`") });
        }
        Ok(self.body)
    }
}

/* ─────────────────────────── Lexing helpers ─────────────────────────── */

fn strip_comment(line: &str) -> &str {
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_str => escaped = true,
            '"' => in_str = !in_str,
            ';' if !in_str => return &line[..i],
            _ => {}
        }
    }
    line
}

fn is_label_name(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// `name: rest` → `(name, rest)`; `Owner::member` is not a label.
fn split_label(line: &str) -> Option<(&str, &str)> {
    let pos = line.find(':')?;
    let (name, rest) = (&line[..pos], &line[pos + 1..]);
    (is_label_name(name) && !rest.starts_with(':')).then_some((name, rest))
}

fn split_list(text: &str) -> Vec<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    text.split(',').map(str::trim).collect()
}

fn int<T: TryFrom<i128>>(text: &str) -> Option<T> {
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    T::try_from(if neg { -value } else { value }).ok()
}

fn parse_string_literal(input: &str) -> Option<String> {
    let inner = input.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            other => other,
        });
    }
    Some(out)
}

fn parse_types(list: &str) -> Option<Vec<TypeRef>> {
    split_list(list).into_iter().map(TypeRef::parse).collect()
}

/// `(T, U) -> R` or `(T, U)` (void).
fn parse_param_list(text: &str) -> Option<(Vec<TypeRef>, Vec<TypeRef>, TypeRef)> {
    let text = text.trim().strip_prefix('(')?;
    let close = text.find(')')?;
    let (params_text, after) = (&text[..close], text[close + 1..].trim());
    let ret = match after.strip_prefix("->") {
        Some(ret) => TypeRef::parse(ret)?,
        None if after.is_empty() => TypeRef::Void,
        None => return None,
    };
    let (fixed, varargs) = match params_text.split_once("...") {
        Some((fixed, var)) => (fixed.trim().trim_end_matches(','), var.trim().trim_start_matches(',')),
        None => (params_text, ""),
    };
    Some((parse_types(fixed)?, parse_types(varargs)?, ret))
}

/// `Owner::name` → `(owner, name)`, splitting at the last `::`.
fn split_member(text: &str) -> Option<(TypeRef, &str)> {
    let (owner, name) = text.trim().rsplit_once("::")?;
    if name.is_empty() {
        return None;
    }
    Some((TypeRef::parse(owner)?, name))
}

fn parse_method(text: &str) -> Option<MethodRef> {
    let (instance, text) = match text.trim().strip_prefix("instance ") {
        Some(rest) => (true, rest),
        None => (false, text.trim()),
    };
    let open = text.find('(')?;
    let (owner, name) = split_member(&text[..open])?;
    let (params, varargs, ret) = parse_param_list(&text[open..])?;
    let mut method = MethodRef::new_static(owner, name, ret, params);
    method.has_this = instance || method.is_ctor();
    method.varargs = varargs;
    Some(method)
}

fn parse_field(text: &str) -> Option<FieldRef> {
    let (is_static, text) = match text.trim().strip_prefix("static ") {
        Some(rest) => (true, rest),
        None => (false, text.trim()),
    };
    let (member, ty) = text.split_once(" : ")?;
    let (owner, name) = split_member(member)?;
    let ty = TypeRef::parse(ty)?;
    Some(FieldRef { owner, name: name.to_owned(), ty, is_static })
}

fn parse_call_site(text: &str) -> Option<CallSite> {
    let text = text.trim();
    let (conv, rest) = match text.split_once(char::is_whitespace) {
        Some((kw, rest)) if !kw.starts_with('(') => (CallConv::from_keyword(kw)?, rest),
        _ => (CallConv::Default, text),
    };
    let (params, varargs, ret) = parse_param_list(rest)?;
    if !varargs.is_empty() {
        return None;
    }
    Some(CallSite { conv, sig: Signature::new(ret, params) })
}

fn parse_token(text: &str) -> Option<Token> {
    let (kind, rest) = text.trim().split_once(char::is_whitespace)?;
    match kind {
        "type" => TypeRef::parse(rest).map(Token::Type),
        "field" => parse_field(rest).map(Token::Field),
        "method" => parse_method(rest).map(Token::Method),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::body::Instr;
    use pretty_assertions::assert_eq;

    #[test]
    fn assembles_labels_and_locals() {
        let src = r#"
            .local int32
            .local string pinned
                ldarg.0          ; selector
                switch (a, b)
                br.s done
            a:  ldstr "semi;colon"
                pop
            b:
            done: ret
        "#;
        let body = assemble(src).expect("assemble");
        assert_eq!(body.locals().len(), 2);
        assert!(body.locals()[1].pinned);
        let ops: Vec<OpCode> = body.instructions().iter().map(|i| i.op).collect();
        assert_eq!(ops, vec![OpCode::Ldarg_0, OpCode::Switch, OpCode::Br_S, OpCode::Ldstr, OpCode::Pop, OpCode::Ret]);
        assert_eq!(body.instructions()[3].operand, Operand::Str("semi;colon".into()));
        assert!(body.seal().is_ok());
    }

    #[test]
    fn parses_member_references() {
        let body = assemble(
            "call Math::Max(int32, int32) -> int32\n\
             newobj Point::.ctor(int32, int32)\n\
             ldsfld static Counter::total : int64\n\
             call Console::Printf(string, ..., int32)\n\
             ldtoken type string[]\n\
             calli cdecl (int32) -> void\n\
             ldc.i4 -0x10\n",
        )
        .expect("assemble");
        let instrs = body.instructions();
        let Operand::Method(max) = &instrs[0].operand else { panic!("method expected") };
        assert_eq!(max.to_string(), "Math::Max(int32, int32) -> int32");
        assert!(!max.has_this);
        let Operand::Method(ctor) = &instrs[1].operand else { panic!("method expected") };
        assert!(ctor.has_this && ctor.is_ctor());
        assert_eq!(
            instrs[2].operand,
            Operand::Field(FieldRef::new_static(TypeRef::named("Counter"), "total", TypeRef::I64))
        );
        let Operand::Method(printf) = &instrs[3].operand else { panic!("method expected") };
        assert_eq!(printf.varargs, vec![TypeRef::I32]);
        assert_eq!(instrs[4].operand, Operand::Token(Token::Type(TypeRef::array_of(TypeRef::String))));
        assert_eq!(
            instrs[5],
            Instr {
                op: OpCode::Calli,
                operand: Operand::Sig(CallSite { conv: CallConv::C, sig: Signature::new(TypeRef::Void, [TypeRef::I32]) })
            }
        );
        assert_eq!(instrs[6].operand, Operand::I32(-16));
    }

    #[test]
    fn reports_errors_with_lines() {
        let err = assemble("nop\nfrobnicate").unwrap_err();
        assert_eq!(err, CoreError::Asm { line: 2, message: "unknown instruction `frobnicate`".into() });

        let err = assemble("br nowhere\nret").unwrap_err();
        assert_eq!(err, CoreError::Asm { line: 1, message: "undefined label `nowhere`".into() });

        let err = assemble("x:\nx:").unwrap_err();
        assert!(matches!(err, CoreError::Asm { line: 2, .. }));

        assert!(assemble("ldc.i4.s 300").is_err());
        assert!(assemble("ret 1").is_err());
    }
}
