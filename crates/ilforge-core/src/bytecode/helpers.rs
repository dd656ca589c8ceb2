//! Structural validation of sealed bodies.

use std::collections::BTreeSet;

use crate::bytecode::opcode::OperandKind;
use crate::bytecode::sealed::{MetaEntry, RawOperand, SealedBody, TokenKind};
use crate::{CoreError, CoreResult};

/// Checks what can be checked without stack typing:
///
/// - the stream decodes completely;
/// - every branch and jump-table target lands on an instruction boundary;
/// - every token resolves to a row of the kind the opcode expects;
/// - local indices are declared and argument indices are below `arg_count`.
pub fn validate_body(body: &SealedBody, arg_count: u16) -> CoreResult<()> {
    let decoded = body.decode()?;
    let starts: BTreeSet<u32> = decoded.iter().map(|d| d.offset).collect();
    let local_count = body.locals().len();

    for instr in &decoded {
        let at = instr.offset;
        let invalid = |reason: String| CoreError::InvalidBody { at, reason };
        match &instr.operand {
            RawOperand::Target(t) if !starts.contains(t) => {
                return Err(invalid(format!("branch target IL_{t:04x} is not an instruction boundary")));
            }
            RawOperand::Targets(ts) => {
                if let Some(t) = ts.iter().find(|t| !starts.contains(t)) {
                    return Err(invalid(format!("switch target IL_{t:04x} is not an instruction boundary")));
                }
            }
            RawOperand::Token(token) => {
                let entry = body.resolve_token(*token)?;
                if !token_fits(instr.op.operand_kind(), entry) {
                    return Err(invalid(format!("`{}` cannot take a {:?} token", instr.op, entry.kind())));
                }
            }
            _ => {}
        }

        if let Some((index, is_local)) = var_use(instr) {
            if is_local && usize::from(index) >= local_count {
                return Err(invalid(format!("local {index} is not declared ({local_count} locals)")));
            }
            if !is_local && index >= arg_count {
                return Err(invalid(format!("argument {index} is out of range ({arg_count} arguments)")));
            }
        }
    }
    Ok(())
}

fn token_fits(kind: OperandKind, entry: &MetaEntry) -> bool {
    matches!(
        (kind, entry.kind()),
        (OperandKind::String, TokenKind::Str)
            | (OperandKind::Type, TokenKind::Type)
            | (OperandKind::Field, TokenKind::Field)
            | (OperandKind::Method, TokenKind::Method)
            | (OperandKind::Sig, TokenKind::Sig)
            | (OperandKind::Token, TokenKind::Type | TokenKind::Field | TokenKind::Method)
    )
}

/// `(index, is_local)` for every argument/local access, implicit forms included.
fn var_use(instr: &crate::bytecode::sealed::Decoded) -> Option<(u16, bool)> {
    use crate::bytecode::opcode::OpCode as Op;
    let explicit = match instr.operand {
        RawOperand::Var(v) => Some(v),
        _ => None,
    };
    match instr.op {
        Op::Ldarg_0 => Some((0, false)),
        Op::Ldarg_1 => Some((1, false)),
        Op::Ldarg_2 => Some((2, false)),
        Op::Ldarg_3 => Some((3, false)),
        Op::Ldloc_0 | Op::Stloc_0 => Some((0, true)),
        Op::Ldloc_1 | Op::Stloc_1 => Some((1, true)),
        Op::Ldloc_2 | Op::Stloc_2 => Some((2, true)),
        Op::Ldloc_3 | Op::Stloc_3 => Some((3, true)),
        Op::Ldarg_S | Op::Ldarga_S | Op::Starg_S | Op::Ldarg | Op::Ldarga | Op::Starg => explicit.map(|v| (v, false)),
        Op::Ldloc_S | Op::Ldloca_S | Op::Stloc_S | Op::Ldloc | Op::Ldloca | Op::Stloc => explicit.map(|v| (v, true)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::body::{MethodBody, Operand};
    use crate::bytecode::opcode::OpCode;
    use crate::meta::TypeRef;

    fn sealed(build: impl FnOnce(&mut MethodBody)) -> SealedBody {
        let mut body = MethodBody::new();
        build(&mut body);
        body.seal().expect("seal")
    }

    #[test]
    fn accepts_well_formed_body() {
        let body = sealed(|b| {
            b.declare_local(TypeRef::I32, false);
            b.emit(OpCode::Ldarg_1, Operand::None);
            b.emit(OpCode::Stloc_0, Operand::None);
            b.emit(OpCode::Ldloc_0, Operand::None);
            b.emit(OpCode::Ret, Operand::None);
        });
        assert!(validate_body(&body, 2).is_ok());
    }

    #[test]
    fn rejects_undeclared_local_and_argument() {
        let body = sealed(|b| {
            b.emit(OpCode::Ldloc_1, Operand::None);
            b.emit(OpCode::Ret, Operand::None);
        });
        assert!(matches!(validate_body(&body, 0), Err(CoreError::InvalidBody { at: 0, .. })));

        let body = sealed(|b| {
            b.emit(OpCode::Ldarg_S, Operand::Var(7));
            b.emit(OpCode::Ret, Operand::None);
        });
        assert!(validate_body(&body, 7).is_err());
        assert!(validate_body(&body, 8).is_ok());
    }

    #[test]
    fn rejects_mid_instruction_branch() {
        // br.s +1 lands inside ldc.i4
        let body = SealedBody::from_parts(
            MethodBody::new().id(),
            vec![0x2B, 0x01, 0x20, 0, 0, 0, 0, 0x2A],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(validate_body(&body, 0), Err(CoreError::InvalidBody { at: 0, .. })));
    }
}
