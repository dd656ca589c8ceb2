//! Method body under construction: the append-only instruction sink.
//!
//! A [`MethodBody`] owns the instructions of exactly one method, the labels
//! created for it and its local slots. Structural defects (label misuse,
//! operand shape mismatches) do not interrupt emission; they are recorded
//! and reported by [`MethodBody::seal`], which also encodes the body.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bytecode::opcode::{OpCode, OperandKind};
use crate::bytecode::sealed::{MetaEntry, SealedBody, TokenKind};
use crate::meta::{CallSite, FieldRef, MethodRef, Token, TypeRef};
use crate::ByteWriter;

/* ─────────────────────────── Handles ─────────────────────────── */

static NEXT_BODY: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of a [`MethodBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(u32);

impl BodyId {
    fn fresh() -> Self { BodyId(NEXT_BODY.fetch_add(1, Ordering::Relaxed)) }

    /// Raw value.
    pub const fn get(self) -> u32 { self.0 }
}

/// Forward-reference placeholder for a position in one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Label {
    body: BodyId,
    index: u32,
}

impl Label {
    /// Body that created the label.
    pub const fn body(self) -> BodyId { self.body }
    /// Creation index within its body.
    pub const fn index(self) -> u32 { self.index }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "L{}", self.index) }
}

/// Handle to a declared local slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Local {
    body: BodyId,
    index: u16,
}

impl Local {
    /// Body that declared the local.
    pub const fn body(self) -> BodyId { self.body }
    /// Slot index, as used by `ldloc`/`stloc`.
    pub const fn index(self) -> u16 { self.index }
}

/// Declared local slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocalSlot {
    /// Slot type.
    pub ty: TypeRef,
    /// Excluded from relocation by the host memory manager.
    pub pinned: bool,
}

/* ─────────────────────────── Instructions ─────────────────────────── */

/// Inline operand of an emitted instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
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
    /// Branch target.
    Target(Label),
    /// Jump table, in table order.
    Targets(Vec<Label>),
    /// Argument or local index.
    Var(u16),
    /// String literal.
    Str(String),
    /// Type reference.
    Type(TypeRef),
    /// Field reference.
    Field(FieldRef),
    /// Method reference.
    Method(MethodRef),
    /// `ldtoken` handle.
    Token(Token),
    /// `calli` signature.
    Sig(CallSite),
}

impl Operand {
    /// True if this operand can be encoded for `kind`.
    pub fn fits(&self, kind: OperandKind) -> bool {
        matches!(
            (kind, self),
            (OperandKind::None, Operand::None)
                | (OperandKind::ShortI8, Operand::I8(_))
                | (OperandKind::U8, Operand::U8(_))
                | (OperandKind::Int32, Operand::I32(_))
                | (OperandKind::Int64, Operand::I64(_))
                | (OperandKind::Float32, Operand::F32(_))
                | (OperandKind::Float64, Operand::F64(_))
                | (OperandKind::ShortBranch | OperandKind::Branch, Operand::Target(_))
                | (OperandKind::Switch, Operand::Targets(_))
                | (OperandKind::ShortVar | OperandKind::Var, Operand::Var(_))
                | (OperandKind::String, Operand::Str(_))
                | (OperandKind::Type, Operand::Type(_))
                | (OperandKind::Field, Operand::Field(_))
                | (OperandKind::Method, Operand::Method(_))
                | (OperandKind::Token, Operand::Token(_))
                | (OperandKind::Sig, Operand::Sig(_))
        )
    }

    /// Labels referenced by this operand.
    pub fn labels(&self) -> &[Label] {
        match self {
            Operand::Target(label) => core::slice::from_ref(label),
            Operand::Targets(labels) => labels,
            _ => &[],
        }
    }
}

/// One emitted instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    /// Opcode.
    pub op: OpCode,
    /// Inline operand.
    pub operand: Operand,
}

/* ─────────────────────────── Errors ─────────────────────────── */

/// Structural defect found while building or sealing a body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    /// `mark_label` called twice for the same label.
    #[error("label {label} is already bound")]
    LabelRebound {
        /// Offending label.
        label: Label,
    },
    /// Label or local created by another body.
    #[error("{what} {label} belongs to another method body")]
    ForeignLabel {
        /// Offending label (for locals, the slot index).
        label: Label,
        /// `"label"` or `"local"`.
        what: &'static str,
    },
    /// Label still unbound at seal time.
    #[error("label {label} was never marked{}", .first_use.map(|i| format!(" (first used by instruction #{i})")).unwrap_or_default())]
    UnboundLabel {
        /// Offending label.
        label: Label,
        /// Index of the first instruction branching to it, if any.
        first_use: Option<usize>,
    },
    /// Operand shape does not match the opcode.
    #[error("instruction #{at}: `{op}` expects a {expected:?} operand")]
    OperandMismatch {
        /// Instruction index.
        at: usize,
        /// Opcode.
        op: OpCode,
        /// Operand shape the opcode requires.
        expected: OperandKind,
    },
    /// Index above 255 given to a one-byte-index opcode.
    #[error("instruction #{at}: `{op}` takes a one-byte index, got {index}")]
    ShortIndexOutOfRange {
        /// Instruction index.
        at: usize,
        /// Opcode.
        op: OpCode,
        /// Requested index.
        index: u16,
    },
    /// Short branch displacement does not fit in one signed byte.
    #[error("instruction #{at}: short branch to {label} needs displacement {displacement}")]
    BranchOutOfRange {
        /// Instruction index.
        at: usize,
        /// Target label.
        label: Label,
        /// Required displacement.
        displacement: i64,
    },
    /// More than 65535 locals.
    #[error("too many locals")]
    TooManyLocals,
}

/* ─────────────────────────── Sink ─────────────────────────── */

/// Append-only instruction sink for one method body.
///
/// A clone is a new body with a fresh identity: labels already emitted in it
/// are rebound to the copy, and handles taken from the original stay foreign
/// to it (and the other way round).
#[derive(Debug)]
pub struct MethodBody {
    id: BodyId,
    instrs: Vec<Instr>,
    /// Instruction index each label is bound to.
    labels: Vec<Option<usize>>,
    /// First instruction branching to each label.
    first_use: Vec<Option<usize>>,
    locals: Vec<LocalSlot>,
    errors: Vec<EmitError>,
}

impl Default for MethodBody {
    fn default() -> Self { Self::new() }
}

impl Clone for MethodBody {
    fn clone(&self) -> Self {
        let id = BodyId::fresh();
        let rebind = |label: &Label| Label { body: id, index: label.index };
        let instrs = self
            .instrs
            .iter()
            .map(|instr| {
                let operand = match &instr.operand {
                    Operand::Target(label) => Operand::Target(rebind(label)),
                    Operand::Targets(labels) => Operand::Targets(labels.iter().map(rebind).collect()),
                    other => other.clone(),
                };
                Instr { op: instr.op, operand }
            })
            .collect();
        Self {
            id,
            instrs,
            labels: self.labels.clone(),
            first_use: self.first_use.clone(),
            locals: self.locals.clone(),
            errors: self.errors.clone(),
        }
    }
}

impl MethodBody {
    /// Empty body with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: BodyId::fresh(),
            instrs: Vec::new(),
            labels: Vec::new(),
            first_use: Vec::new(),
            locals: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Identity of this body.
    pub const fn id(&self) -> BodyId { self.id }

    /// Emitted instructions.
    pub fn instructions(&self) -> &[Instr] { &self.instrs }

    /// Number of emitted instructions.
    pub fn len(&self) -> usize { self.instrs.len() }

    /// True when nothing was emitted.
    pub fn is_empty(&self) -> bool { self.instrs.is_empty() }

    /// Declared local slots.
    pub fn locals(&self) -> &[LocalSlot] { &self.locals }

    /// Number of labels created.
    pub fn label_count(&self) -> usize { self.labels.len() }

    /// Defects recorded so far.
    pub fn errors(&self) -> &[EmitError] { &self.errors }

    /// Appends one instruction.
    ///
    /// An operand that does not fit the opcode, a foreign label or an
    /// out-of-range short index is recorded as a deferred error and the
    /// instruction is dropped.
    pub fn emit(&mut self, op: OpCode, operand: Operand) {
        let at = self.instrs.len();
        let kind = op.operand_kind();
        if !operand.fits(kind) {
            self.errors.push(EmitError::OperandMismatch { at, op, expected: kind });
            return;
        }
        if let (OperandKind::ShortVar, Operand::Var(index)) = (kind, &operand) {
            if *index > u16::from(u8::MAX) {
                self.errors.push(EmitError::ShortIndexOutOfRange { at, op, index: *index });
                return;
            }
        }
        let labels = self.labels.len();
        if let Some(&label) = operand.labels().iter().find(|l| l.body != self.id || l.index as usize >= labels) {
            self.errors.push(EmitError::ForeignLabel { label, what: "label" });
            return;
        }
        for &label in operand.labels() {
            if let Some(slot) = self.first_use.get_mut(label.index as usize) {
                slot.get_or_insert(at);
            }
        }
        self.instrs.push(Instr { op, operand });
    }

    /// Creates an unbound label.
    pub fn define_label(&mut self) -> Label {
        let index = u32::try_from(self.labels.len()).unwrap_or(u32::MAX);
        self.labels.push(None);
        self.first_use.push(None);
        Label { body: self.id, index }
    }

    /// Binds `label` to the position of the next emitted instruction.
    pub fn mark_label(&mut self, label: Label) {
        let here = self.instrs.len();
        let slot = if label.body == self.id { self.labels.get_mut(label.index as usize) } else { None };
        match slot {
            None => self.errors.push(EmitError::ForeignLabel { label, what: "label" }),
            Some(Some(_)) => self.errors.push(EmitError::LabelRebound { label }),
            Some(slot @ None) => *slot = Some(here),
        }
    }

    /// True once `label` has been marked.
    pub fn is_bound(&self, label: Label) -> bool {
        label.body == self.id && matches!(self.labels.get(label.index as usize), Some(Some(_)))
    }

    /// Declares a local slot.
    pub fn declare_local(&mut self, ty: TypeRef, pinned: bool) -> Local {
        let Ok(index) = u16::try_from(self.locals.len()) else {
            if !self.errors.contains(&EmitError::TooManyLocals) {
                self.errors.push(EmitError::TooManyLocals);
            }
            return Local { body: self.id, index: u16::MAX };
        };
        self.locals.push(LocalSlot { ty, pinned });
        Local { body: self.id, index }
    }

    /// Slot behind a local handle, if it was declared here.
    pub fn local_slot(&self, local: Local) -> Option<&LocalSlot> {
        if local.body != self.id {
            return None;
        }
        self.locals.get(usize::from(local.index))
    }

    /// Checks that `local` was declared by this body, recording a defect otherwise.
    pub fn check_local(&mut self, local: Local) -> bool {
        if local.body == self.id {
            return true;
        }
        let label = Label { body: local.body, index: u32::from(local.index) };
        self.errors.push(EmitError::ForeignLabel { label, what: "local" });
        false
    }

    /// Validates labels and encodes the body.
    ///
    /// Fails with the first recorded defect, then with the first label left
    /// unbound, then with the first short branch whose displacement does not
    /// fit in a signed byte.
    pub fn seal(self) -> Result<SealedBody, EmitError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        let targets = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, bound)| {
                bound.ok_or(EmitError::UnboundLabel {
                    label: Label { body: self.id, index: u32::try_from(i).unwrap_or(u32::MAX) },
                    first_use: self.first_use[i],
                })
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let mut offsets = Vec::with_capacity(self.instrs.len() + 1);
        let mut pc = 0u32;
        for instr in &self.instrs {
            offsets.push(pc);
            pc += instr.op.encoded_size(switch_len(&instr.operand));
        }
        offsets.push(pc);
        let label_offsets: Vec<u32> = targets.iter().map(|&i| offsets[i]).collect();

        let mut tokens = TokenTable::default();
        let mut w = ByteWriter::new();
        for (at, instr) in self.instrs.iter().enumerate() {
            let next = i64::from(offsets[at + 1]);
            let value = instr.op.value();
            if instr.op.opcode_size() == 2 {
                w.write_u16_be(value);
            } else {
                w.write_u8(value.to_le_bytes()[0]);
            }
            match &instr.operand {
                Operand::None => {}
                Operand::I8(v) => w.write_i8(*v),
                Operand::U8(v) => w.write_u8(*v),
                Operand::I32(v) => w.write_i32_le(*v),
                Operand::I64(v) => w.write_i64_le(*v),
                Operand::F32(v) => w.write_f32_le(*v),
                Operand::F64(v) => w.write_f64_le(*v),
                Operand::Var(v) => {
                    if instr.op.operand_kind() == OperandKind::ShortVar {
                        w.write_u8(v.to_le_bytes()[0]);
                    } else {
                        w.write_u16_le(*v);
                    }
                }
                Operand::Target(label) => {
                    let displacement = i64::from(label_offsets[label.index as usize]) - next;
                    if instr.op.operand_kind() == OperandKind::ShortBranch {
                        let short = i8::try_from(displacement).map_err(|_| EmitError::BranchOutOfRange {
                            at,
                            label: *label,
                            displacement,
                        })?;
                        w.write_i8(short);
                    } else {
                        w.write_i32_le(displacement_i32(displacement));
                    }
                }
                Operand::Targets(labels) => {
                    w.write_u32_le(u32::try_from(labels.len()).unwrap_or(u32::MAX));
                    for label in labels {
                        let displacement = i64::from(label_offsets[label.index as usize]) - next;
                        w.write_i32_le(displacement_i32(displacement));
                    }
                }
                Operand::Str(s) => w.write_u32_le(tokens.intern(MetaEntry::Str(s.clone()))),
                Operand::Type(ty) => w.write_u32_le(tokens.intern(MetaEntry::Type(ty.clone()))),
                Operand::Field(f) => w.write_u32_le(tokens.intern(MetaEntry::Field(f.clone()))),
                Operand::Method(m) => w.write_u32_le(tokens.intern(MetaEntry::Method(m.clone()))),
                Operand::Sig(s) => w.write_u32_le(tokens.intern(MetaEntry::Sig(s.clone()))),
                Operand::Token(token) => {
                    let entry = match token {
                        Token::Type(ty) => MetaEntry::Type(ty.clone()),
                        Token::Field(f) => MetaEntry::Field(f.clone()),
                        Token::Method(m) => MetaEntry::Method(m.clone()),
                    };
                    w.write_u32_le(tokens.intern(entry));
                }
            }
        }

        Ok(SealedBody::from_parts(self.id, w.into_vec(), tokens.entries, self.locals, label_offsets))
    }
}

fn switch_len(operand: &Operand) -> u32 {
    match operand {
        Operand::Targets(labels) => u32::try_from(labels.len()).unwrap_or(u32::MAX),
        _ => 0,
    }
}

fn displacement_i32(displacement: i64) -> i32 {
    // Bodies are far smaller than 2 GiB; clamp rather than wrap.
    i32::try_from(displacement).unwrap_or(if displacement < 0 { i32::MIN } else { i32::MAX })
}

/// Deduplicating metadata table built while sealing.
#[derive(Default)]
struct TokenTable {
    entries: Vec<MetaEntry>,
}

impl TokenTable {
    fn intern(&mut self, entry: MetaEntry) -> u32 {
        let kind = entry.kind();
        let index = match self.entries.iter().position(|e| *e == entry) {
            Some(i) => i,
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        TokenKind::encode(kind, index)
    }
}
