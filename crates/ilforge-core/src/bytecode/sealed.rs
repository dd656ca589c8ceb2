//! Encoded, immutable method body plus a decoder over its byte stream.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bytecode::body::{BodyId, Label, LocalSlot};
use crate::bytecode::opcode::{OpCode, OperandKind};
use crate::meta::{CallSite, FieldRef, MethodRef, TypeRef};
use crate::{ByteReader, CoreError, CoreResult};

/// Metadata table kind, stored in the high byte of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
    /// Type reference.
    Type = 0x01,
    /// Field reference.
    Field = 0x04,
    /// Method reference.
    Method = 0x0A,
    /// Stand-alone signature.
    Sig = 0x11,
    /// User string.
    Str = 0x70,
}

impl TokenKind {
    /// Builds a token: kind in the high byte, `index + 1` below.
    pub fn encode(kind: TokenKind, index: usize) -> u32 {
        let row = u32::try_from(index + 1).unwrap_or(0x00FF_FFFF) & 0x00FF_FFFF;
        (u32::from(kind as u8) << 24) | row
    }

    /// Splits a token into kind and zero-based index.
    pub fn decode(token: u32) -> Option<(TokenKind, usize)> {
        let kind = match token >> 24 {
            0x01 => TokenKind::Type,
            0x04 => TokenKind::Field,
            0x0A => TokenKind::Method,
            0x11 => TokenKind::Sig,
            0x70 => TokenKind::Str,
            _ => return None,
        };
        let row = (token & 0x00FF_FFFF) as usize;
        row.checked_sub(1).map(|index| (kind, index))
    }
}

/// One row of a body's metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MetaEntry {
    /// String literal.
    Str(String),
    /// Type reference.
    Type(TypeRef),
    /// Field reference.
    Field(FieldRef),
    /// Method reference.
    Method(MethodRef),
    /// Call-site signature.
    Sig(CallSite),
}

impl MetaEntry {
    /// Table kind of the row.
    pub const fn kind(&self) -> TokenKind {
        match self {
            MetaEntry::Str(_) => TokenKind::Str,
            MetaEntry::Type(_) => TokenKind::Type,
            MetaEntry::Field(_) => TokenKind::Field,
            MetaEntry::Method(_) => TokenKind::Method,
            MetaEntry::Sig(_) => TokenKind::Sig,
        }
    }
}

/// Sealed method body: code bytes, metadata rows, locals and label offsets.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SealedBody {
    id: BodyId,
    code: Vec<u8>,
    tokens: Vec<MetaEntry>,
    locals: Vec<LocalSlot>,
    labels: Vec<u32>,
}

impl SealedBody {
    pub(crate) fn from_parts(
        id: BodyId,
        code: Vec<u8>,
        tokens: Vec<MetaEntry>,
        locals: Vec<LocalSlot>,
        labels: Vec<u32>,
    ) -> Self {
        Self { id, code, tokens, locals, labels }
    }

    /// Identity of the body this was sealed from.
    pub const fn id(&self) -> BodyId { self.id }
    /// Encoded instruction stream.
    pub fn code(&self) -> &[u8] { &self.code }
    /// Code size in bytes.
    pub fn len(&self) -> usize { self.code.len() }
    /// True for an empty body.
    pub fn is_empty(&self) -> bool { self.code.is_empty() }
    /// Metadata rows referenced by tokens.
    pub fn tokens(&self) -> &[MetaEntry] { &self.tokens }
    /// Local slots.
    pub fn locals(&self) -> &[LocalSlot] { &self.locals }

    /// Byte offset a label was bound to.
    pub fn label_offset(&self, label: Label) -> Option<u32> {
        if label.body() != self.id {
            return None;
        }
        self.labels.get(label.index() as usize).copied()
    }

    /// CRC32 of the code bytes.
    pub fn checksum(&self) -> u32 { crc32fast::hash(&self.code) }

    /// Resolves a token against this body's table.
    pub fn resolve_token(&self, token: u32) -> CoreResult<&MetaEntry> {
        let (kind, index) = TokenKind::decode(token).ok_or(CoreError::InvalidToken { token })?;
        match self.tokens.get(index) {
            Some(entry) if entry.kind() == kind => Ok(entry),
            _ => Err(CoreError::InvalidToken { token }),
        }
    }

    /// Decodes the whole stream.
    pub fn decode(&self) -> CoreResult<Vec<Decoded>> { decode(&self.code) }
}

/// Operand as read back from the byte stream. Branch targets are absolute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RawOperand {
    /// No operand.
    None,
    /// Signed byte.
    I8(i8),
    /// Unsigned byte.
    U8(u8),
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Absolute branch target.
    Target(u32),
    /// Absolute jump-table targets.
    Targets(Vec<u32>),
    /// Argument or local index.
    Var(u16),
    /// Metadata token.
    Token(u32),
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Decoded {
    /// Byte offset of the opcode.
    pub offset: u32,
    /// Encoded size, operand included.
    pub size: u32,
    /// Opcode.
    pub op: OpCode,
    /// Operand.
    pub operand: RawOperand,
}

impl Decoded {
    /// Offset of the following instruction.
    pub const fn next(&self) -> u32 { self.offset + self.size }
}

/// Decodes a raw instruction stream.
pub fn decode(code: &[u8]) -> CoreResult<Vec<Decoded>> {
    let mut r = ByteReader::new(code);
    let mut out = Vec::new();
    while r.remaining() > 0 {
        let offset = offset_u32(r.offset());
        let first = r.read_u8()?;
        let value = if first == 0xFE { 0xFE00 | u16::from(r.read_u8()?) } else { u16::from(first) };
        let op = OpCode::from_value(value).ok_or(CoreError::UnknownOpcode { value, at: offset })?;
        let operand = match op.operand_kind() {
            OperandKind::None => RawOperand::None,
            OperandKind::ShortI8 => RawOperand::I8(r.read_i8()?),
            OperandKind::U8 => RawOperand::U8(r.read_u8()?),
            OperandKind::Int32 => RawOperand::I32(r.read_i32_le()?),
            OperandKind::Int64 => RawOperand::I64(r.read_i64_le()?),
            OperandKind::Float32 => RawOperand::F32(r.read_f32_le()?),
            OperandKind::Float64 => RawOperand::F64(r.read_f64_le()?),
            OperandKind::ShortVar => RawOperand::Var(u16::from(r.read_u8()?)),
            OperandKind::Var => RawOperand::Var(r.read_u16_le()?),
            OperandKind::ShortBranch => {
                let disp = i64::from(r.read_i8()?);
                RawOperand::Target(absolute(offset, r.offset(), disp)?)
            }
            OperandKind::Branch => {
                let disp = i64::from(r.read_i32_le()?);
                RawOperand::Target(absolute(offset, r.offset(), disp)?)
            }
            OperandKind::Switch => {
                let count = r.read_u32_le()? as usize;
                let mut disps = Vec::with_capacity(count.min(r.remaining() / 4));
                for _ in 0..count {
                    disps.push(i64::from(r.read_i32_le()?));
                }
                let end = r.offset();
                let targets = disps
                    .into_iter()
                    .map(|disp| absolute(offset, end, disp))
                    .collect::<CoreResult<Vec<_>>>()?;
                RawOperand::Targets(targets)
            }
            OperandKind::String
            | OperandKind::Type
            | OperandKind::Field
            | OperandKind::Method
            | OperandKind::Token
            | OperandKind::Sig => RawOperand::Token(r.read_u32_le()?),
        };
        out.push(Decoded { offset, size: offset_u32(r.offset()) - offset, op, operand });
    }
    Ok(out)
}

fn offset_u32(offset: usize) -> u32 { u32::try_from(offset).unwrap_or(u32::MAX) }

fn absolute(at: u32, next: usize, disp: i64) -> CoreResult<u32> {
    let target = i64::try_from(next).unwrap_or(i64::MAX) + disp;
    u32::try_from(target).map_err(|_| CoreError::InvalidBranch { at, target })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::body::{MethodBody, Operand};
    use crate::bytecode::helpers::validate_body;
    use crate::meta::MethodRef;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Step {
        Nop,
        Const(i32),
        Br(usize),
        BrS(usize),
        Mark(usize),
    }

    fn step(labels: usize) -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Nop),
            any::<i32>().prop_map(Step::Const),
            (0..labels).prop_map(Step::Br),
            (0..labels).prop_map(Step::BrS),
            (0..labels).prop_map(Step::Mark),
        ]
    }

    fn layout() -> impl Strategy<Value = (usize, Vec<Step>)> {
        (1usize..6).prop_flat_map(|labels| (Just(labels), prop::collection::vec(step(labels), 0..24)))
    }

    proptest! {
        #[test]
        fn branches_decode_to_their_label_offsets((count, steps) in layout()) {
            let mut body = MethodBody::new();
            let labels: Vec<_> = (0..count).map(|_| body.define_label()).collect();
            let mut emitted = Vec::new();
            for step in &steps {
                match *step {
                    Step::Nop => body.emit(OpCode::Nop, Operand::None),
                    Step::Const(v) => body.emit(OpCode::Ldc_I4, Operand::I32(v)),
                    Step::Br(i) => {
                        emitted.push((body.len(), labels[i]));
                        body.emit(OpCode::Br, Operand::Target(labels[i]));
                    }
                    Step::BrS(i) => {
                        emitted.push((body.len(), labels[i]));
                        body.emit(OpCode::Br_S, Operand::Target(labels[i]));
                    }
                    Step::Mark(i) => {
                        if !body.is_bound(labels[i]) {
                            body.mark_label(labels[i]);
                        }
                    }
                }
            }
            for &label in &labels {
                if !body.is_bound(label) {
                    body.mark_label(label);
                }
            }
            body.emit(OpCode::Ret, Operand::None);
            let instrs = body.len();

            let sealed = body.seal().expect("seal");
            let decoded = sealed.decode().expect("decode");
            prop_assert_eq!(decoded.len(), instrs);
            prop_assert_eq!(decoded.last().map(Decoded::next), Some(offset_u32(sealed.len())));
            for (at, label) in emitted {
                let target = sealed.label_offset(label).expect("bound label");
                prop_assert_eq!(&decoded[at].operand, &RawOperand::Target(target));
            }
            prop_assert!(validate_body(&sealed, 0).is_ok());
        }
    }

    #[test]
    fn token_encoding() {
        assert_eq!(TokenKind::encode(TokenKind::Method, 0), 0x0A00_0001);
        assert_eq!(TokenKind::decode(0x7000_0003), Some((TokenKind::Str, 2)));
        assert_eq!(TokenKind::decode(0x7000_0000), None);
        assert_eq!(TokenKind::decode(0x2200_0001), None);
    }

    #[test]
    fn decode_reads_back_operands() {
        let mut body = MethodBody::new();
        let end = body.define_label();
        let callee = MethodRef::new_static(TypeRef::named("Util"), "Twice", TypeRef::I32, [TypeRef::I32]);
        body.emit(OpCode::Ldarg_S, Operand::Var(4));
        body.emit(OpCode::Call, Operand::Method(callee.clone()));
        body.emit(OpCode::Ldc_R8, Operand::F64(2.5));
        body.emit(OpCode::Pop, Operand::None);
        body.emit(OpCode::Brfalse, Operand::Target(end));
        body.emit(OpCode::Ceq, Operand::None);
        body.mark_label(end);
        body.emit(OpCode::Ret, Operand::None);
        let sealed = body.seal().expect("seal");

        let decoded = sealed.decode().expect("decode");
        let ops: Vec<OpCode> = decoded.iter().map(|d| d.op).collect();
        assert_eq!(
            ops,
            vec![OpCode::Ldarg_S, OpCode::Call, OpCode::Ldc_R8, OpCode::Pop, OpCode::Brfalse, OpCode::Ceq, OpCode::Ret]
        );
        assert_eq!(decoded[0].operand, RawOperand::Var(4));
        assert_eq!(decoded[2].operand, RawOperand::F64(2.5));
        assert_eq!(decoded[4].operand, RawOperand::Target(decoded[6].offset));
        assert_eq!(decoded[5].size, 2);

        let RawOperand::Token(token) = decoded[1].operand else { panic!("token expected") };
        assert_eq!(sealed.resolve_token(token).expect("row"), &MetaEntry::Method(callee));
        assert!(sealed.resolve_token(0x7000_0001).is_err());
    }

    #[test]
    fn unknown_opcode_is_reported() {
        assert!(matches!(decode(&[0x24]), Err(CoreError::UnknownOpcode { value: 0x24, at: 0 })));
        assert!(matches!(decode(&[0x20, 0x01]), Err(CoreError::UnexpectedEof { .. })));
    }

    #[test]
    fn checksum_is_stable() {
        let mut a = MethodBody::new();
        a.emit(OpCode::Ret, Operand::None);
        let mut b = MethodBody::new();
        b.emit(OpCode::Ret, Operand::None);
        assert_eq!(a.seal().expect("a").checksum(), b.seal().expect("b").checksum());
    }
}
