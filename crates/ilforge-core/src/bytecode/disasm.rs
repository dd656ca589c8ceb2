//! Textual disassembly of sealed bodies, in `IL_0000: opcode operand` form.

use core::fmt::Write;

use crate::bytecode::sealed::{Decoded, MetaEntry, RawOperand, SealedBody};
use crate::CoreResult;

/// Multi-line listing with a header, the local slots and every instruction.
pub fn disassemble_full(body: &SealedBody, title: &str) -> CoreResult<String> {
    let decoded = body.decode()?;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== {title} == (size={}, instrs={}, locals={}, tokens={}, crc=0x{:08x})",
        body.len(),
        decoded.len(),
        body.locals().len(),
        body.tokens().len(),
        body.checksum()
    );

    if !body.locals().is_empty() {
        let _ = writeln!(out, ";; locals");
        for (i, slot) in body.locals().iter().enumerate() {
            let pinned = if slot.pinned { " pinned" } else { "" };
            let _ = writeln!(out, "  [{i}] {}{pinned}", slot.ty);
        }
    }

    let _ = writeln!(out, ";; code");
    for instr in &decoded {
        let bytes = &body.code()[instr.offset as usize..instr.next() as usize];
        let hex: Vec<String> = bytes.iter().take(6).map(|b| format!("{b:02x}")).collect();
        let _ = writeln!(out, "{:<18} | {}", hex.join(" "), render(body, instr));
    }
    Ok(out)
}

/// One line per instruction, no header.
pub fn disassemble_compact(body: &SealedBody) -> CoreResult<String> {
    let mut out = String::new();
    for instr in body.decode()? {
        let _ = writeln!(out, "{}", render(body, &instr));
    }
    Ok(out)
}

/// Renders one instruction, resolving tokens against `body`.
pub fn render(body: &SealedBody, instr: &Decoded) -> String {
    let mut line = format!("IL_{:04x}: {}", instr.offset, instr.op.mnemonic());
    let operand = match &instr.operand {
        RawOperand::None => return line,
        RawOperand::I8(v) => v.to_string(),
        RawOperand::U8(v) => v.to_string(),
        RawOperand::I32(v) => v.to_string(),
        RawOperand::I64(v) => v.to_string(),
        RawOperand::F32(v) => format!("{v:?}"),
        RawOperand::F64(v) => format!("{v:?}"),
        RawOperand::Var(v) => v.to_string(),
        RawOperand::Target(t) => format!("IL_{t:04x}"),
        RawOperand::Targets(ts) => {
            let items: Vec<String> = ts.iter().map(|t| format!("IL_{t:04x}")).collect();
            format!("({})", items.join(", "))
        }
        RawOperand::Token(token) => match body.resolve_token(*token) {
            Ok(MetaEntry::Str(s)) => format!("{s:?}"),
            Ok(MetaEntry::Type(ty)) => ty.to_string(),
            Ok(MetaEntry::Field(f)) => f.to_string(),
            Ok(MetaEntry::Method(m)) => m.to_string(),
            Ok(MetaEntry::Sig(s)) => s.to_string(),
            Err(_) => format!("<bad token 0x{token:08x}>"),
        },
    };
    line.push(' ');
    line.push_str(&operand);
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::body::{MethodBody, Operand};
    use crate::bytecode::opcode::OpCode;
    use crate::meta::TypeRef;
    use pretty_assertions::assert_eq;

    #[test]
    fn compact_listing() {
        let mut body = MethodBody::new();
        let done = body.define_label();
        body.declare_local(TypeRef::I32, false);
        body.emit(OpCode::Ldstr, Operand::Str("hi".into()));
        body.emit(OpCode::Pop, Operand::None);
        body.emit(OpCode::Br_S, Operand::Target(done));
        body.mark_label(done);
        body.emit(OpCode::Ret, Operand::None);
        let sealed = body.seal().expect("seal");

        let text = disassemble_compact(&sealed).expect("disasm");
        assert_eq!(text, "IL_0000: ldstr \"hi\"\nIL_0005: pop\nIL_0006: br.s IL_0008\nIL_0008: ret\n");

        let full = disassemble_full(&sealed, "demo").expect("disasm");
        assert!(full.starts_with("== demo == (size=9, instrs=4, locals=1, tokens=1"));
        assert!(full.contains("  [0] int32\n"));
    }
}
