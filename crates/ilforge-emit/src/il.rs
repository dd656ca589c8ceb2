//! Fluent instruction builder over a [`MethodBody`].
//!
//! Every emit method appends exactly one instruction and hands the builder
//! back, so a body reads as one chain:
//!
//! ```
//! use ilforge_emit::Il;
//! use ilforge_core::MethodBody;
//!
//! let mut body = MethodBody::new();
//! Il::new(&mut body).ldarg_1().dup().mul().ldc_i4_2().mul().ret();
//! assert_eq!(body.len(), 6);
//! ```
//!
//! One method per opcode is generated from [`ilforge_core::for_each_opcode!`];
//! the operand type follows the opcode's [`OperandKind`](ilforge_core::OperandKind).
//! Misuse (foreign labels, double marking, operands that do not fit) never
//! panics: it is recorded in the body and reported by [`MethodBody::seal`].

use ilforge_core::{CallSite, FieldRef, Label, Local, MethodBody, MethodRef, OpCode, Operand, StaticType, Token, TypeRef};

/* ─────────────────────────── Generated emitters ─────────────────────────── */

macro_rules! il_emitter {
    (None, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self) -> &mut Self { self.emit(OpCode::$v, Operand::None) }
    };
    (ShortI8, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, value: i8) -> &mut Self { self.emit(OpCode::$v, Operand::I8(value)) }
    };
    (U8, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, value: u8) -> &mut Self { self.emit(OpCode::$v, Operand::U8(value)) }
    };
    (Int32, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, value: i32) -> &mut Self { self.emit(OpCode::$v, Operand::I32(value)) }
    };
    (Int64, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, value: i64) -> &mut Self { self.emit(OpCode::$v, Operand::I64(value)) }
    };
    (Float32, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, value: f32) -> &mut Self { self.emit(OpCode::$v, Operand::F32(value)) }
    };
    (Float64, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, value: f64) -> &mut Self { self.emit(OpCode::$v, Operand::F64(value)) }
    };
    (ShortBranch, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, target: Label) -> &mut Self { self.emit(OpCode::$v, Operand::Target(target)) }
    };
    (Branch, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, target: Label) -> &mut Self { self.emit(OpCode::$v, Operand::Target(target)) }
    };
    (Switch, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc, " Targets keep the supplied order.")]
        pub fn $m(&mut self, targets: &[Label]) -> &mut Self { self.emit(OpCode::$v, Operand::Targets(targets.to_vec())) }
    };
    (ShortVar, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, index: u8) -> &mut Self { self.emit(OpCode::$v, Operand::Var(u16::from(index))) }
    };
    (Var, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, index: u16) -> &mut Self { self.emit(OpCode::$v, Operand::Var(index)) }
    };
    (String, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, text: impl Into<String>) -> &mut Self { self.emit(OpCode::$v, Operand::Str(text.into())) }
    };
    (Type, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, ty: TypeRef) -> &mut Self { self.emit(OpCode::$v, Operand::Type(ty)) }
    };
    (Field, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, field: &FieldRef) -> &mut Self { self.emit(OpCode::$v, Operand::Field(field.clone())) }
    };
    (Method, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, method: &MethodRef) -> &mut Self { self.emit(OpCode::$v, Operand::Method(method.clone())) }
    };
    (Token, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, token: Token) -> &mut Self { self.emit(OpCode::$v, Operand::Token(token)) }
    };
    (Sig, $v:ident, $m:ident, $mn:literal, $doc:literal) => {
        #[doc = concat!("`", $mn, "` : ", $doc)]
        pub fn $m(&mut self, site: &CallSite) -> &mut Self { self.emit(OpCode::$v, Operand::Sig(site.clone())) }
    };
}

macro_rules! il_emitters {
    ($( ($variant:ident, $method:ident, $mnemonic:literal, $code:literal, $kind:ident, $doc:literal) )*) => {
        $( il_emitter!($kind, $variant, $method, $mnemonic, $doc); )*
    };
}

/// `*_of::<T>()` forms of the type-operand opcodes.
macro_rules! type_of_emitters {
    ($( $of:ident => $op:ident ),* $(,)?) => {
        $(
            #[doc = concat!("[`", stringify!($op), "`](Self::", stringify!($op), ") on the type mapped from `T`.")]
            pub fn $of<T: StaticType>(&mut self) -> &mut Self { self.$op(T::type_ref()) }
        )*
    };
}

/* ─────────────────────────── Builder ─────────────────────────── */

const LDARG: [OpCode; 4] = [OpCode::Ldarg_0, OpCode::Ldarg_1, OpCode::Ldarg_2, OpCode::Ldarg_3];
const LDLOC: [OpCode; 4] = [OpCode::Ldloc_0, OpCode::Ldloc_1, OpCode::Ldloc_2, OpCode::Ldloc_3];
const STLOC: [OpCode; 4] = [OpCode::Stloc_0, OpCode::Stloc_1, OpCode::Stloc_2, OpCode::Stloc_3];
const LDC_I4: [OpCode; 10] = [
    OpCode::Ldc_I4_M1,
    OpCode::Ldc_I4_0,
    OpCode::Ldc_I4_1,
    OpCode::Ldc_I4_2,
    OpCode::Ldc_I4_3,
    OpCode::Ldc_I4_4,
    OpCode::Ldc_I4_5,
    OpCode::Ldc_I4_6,
    OpCode::Ldc_I4_7,
    OpCode::Ldc_I4_8,
];

/// Chainable emitter bound to one method body.
#[derive(Debug)]
pub struct Il<'a> {
    body: &'a mut MethodBody,
}

impl<'a> From<&'a mut MethodBody> for Il<'a> {
    fn from(body: &'a mut MethodBody) -> Self { Self::new(body) }
}

impl<'a> Il<'a> {
    /// Wraps a body.
    pub fn new(body: &'a mut MethodBody) -> Self { Self { body } }

    /// The body being written.
    pub fn body(&self) -> &MethodBody { self.body }

    /// Appends one instruction.
    pub fn emit(&mut self, op: OpCode, operand: Operand) -> &mut Self {
        self.body.emit(op, operand);
        self
    }

    /* ───── labels ───── */

    /// Creates an unbound label.
    pub fn define_label(&mut self) -> Label { self.body.define_label() }

    /// Binds `label` to the next instruction.
    pub fn mark_label(&mut self, label: Label) -> &mut Self {
        self.body.mark_label(label);
        self
    }

    /// Creates a label bound to the next instruction.
    pub fn mark_fresh_label(&mut self) -> (&mut Self, Label) {
        let label = self.body.define_label();
        self.body.mark_label(label);
        (self, label)
    }

    /// True once `label` has been marked.
    pub fn is_bound(&self, label: Label) -> bool { self.body.is_bound(label) }

    /// Emits a branch to a new, still unbound label and returns the label.
    ///
    /// ```
    /// # use ilforge_emit::Il;
    /// # use ilforge_core::MethodBody;
    /// let mut body = MethodBody::new();
    /// let mut il = Il::new(&mut body);
    /// let (il, skip) = il.ldarg_0().branch_fresh(Il::brfalse_s);
    /// il.ldc_i4_1().pop().mark_label(skip).ret();
    /// assert!(body.seal().is_ok());
    /// ```
    pub fn branch_fresh<F>(&mut self, branch: F) -> (&mut Self, Label)
    where
        F: FnOnce(&mut Self, Label) -> &mut Self,
    {
        let label = self.body.define_label();
        (branch(self, label), label)
    }

    /// `switch` over `N` new labels, returned in table order.
    pub fn switch_fresh<const N: usize>(&mut self) -> (&mut Self, [Label; N]) {
        let labels: [Label; N] = std::array::from_fn(|_| self.body.define_label());
        self.switch(&labels);
        (self, labels)
    }

    /* ───── locals ───── */

    /// Declares a local slot.
    pub fn declare_local(&mut self, ty: TypeRef) -> (&mut Self, Local) { self.declare_local_pinned(ty, false) }

    /// Declares a local slot, optionally pinned.
    pub fn declare_local_pinned(&mut self, ty: TypeRef, pinned: bool) -> (&mut Self, Local) {
        let local = self.body.declare_local(ty, pinned);
        (self, local)
    }

    /// Declares a local of the type mapped from `T`.
    pub fn declare_local_of<T: StaticType>(&mut self) -> (&mut Self, Local) { self.declare_local(T::type_ref()) }

    /// Declares a local of the type mapped from `T`, optionally pinned.
    pub fn declare_local_of_pinned<T: StaticType>(&mut self, pinned: bool) -> (&mut Self, Local) {
        self.declare_local_pinned(T::type_ref(), pinned)
    }

    /* ───── short-form selection ───── */

    fn var_form(&mut self, index: u16, fixed: &[OpCode], short: OpCode, long: OpCode) -> &mut Self {
        if let Some(&op) = fixed.get(usize::from(index)) {
            return self.emit(op, Operand::None);
        }
        let op = if index <= u16::from(u8::MAX) { short } else { long };
        self.emit(op, Operand::Var(index))
    }

    fn local_form(&mut self, local: Local, fixed: &[OpCode], short: OpCode, long: OpCode) -> &mut Self {
        if !self.body.check_local(local) {
            return self;
        }
        self.var_form(local.index(), fixed, short, long)
    }

    /// Loads argument `index` with the smallest encoding.
    pub fn ldarg_x(&mut self, index: u16) -> &mut Self { self.var_form(index, &LDARG, OpCode::Ldarg_S, OpCode::Ldarg) }

    /// Stores into argument `index` with the smallest encoding.
    pub fn starg_x(&mut self, index: u16) -> &mut Self { self.var_form(index, &[], OpCode::Starg_S, OpCode::Starg) }

    /// Loads the address of argument `index` with the smallest encoding.
    pub fn ldarga_x(&mut self, index: u16) -> &mut Self { self.var_form(index, &[], OpCode::Ldarga_S, OpCode::Ldarga) }

    /// Loads local `index` with the smallest encoding.
    pub fn ldloc_x(&mut self, index: u16) -> &mut Self { self.var_form(index, &LDLOC, OpCode::Ldloc_S, OpCode::Ldloc) }

    /// Stores into local `index` with the smallest encoding.
    pub fn stloc_x(&mut self, index: u16) -> &mut Self { self.var_form(index, &STLOC, OpCode::Stloc_S, OpCode::Stloc) }

    /// Loads the address of local `index` with the smallest encoding.
    pub fn ldloca_x(&mut self, index: u16) -> &mut Self { self.var_form(index, &[], OpCode::Ldloca_S, OpCode::Ldloca) }

    /// [`ldloc_x`](Self::ldloc_x) on a declared local.
    pub fn ldloc_local(&mut self, local: Local) -> &mut Self {
        self.local_form(local, &LDLOC, OpCode::Ldloc_S, OpCode::Ldloc)
    }

    /// [`stloc_x`](Self::stloc_x) on a declared local.
    pub fn stloc_local(&mut self, local: Local) -> &mut Self {
        self.local_form(local, &STLOC, OpCode::Stloc_S, OpCode::Stloc)
    }

    /// [`ldloca_x`](Self::ldloca_x) on a declared local.
    pub fn ldloca_local(&mut self, local: Local) -> &mut Self {
        self.local_form(local, &[], OpCode::Ldloca_S, OpCode::Ldloca)
    }

    /// Pushes an `int32` constant with the smallest encoding.
    pub fn ldc_i4_x(&mut self, value: i32) -> &mut Self {
        if let Some(&op) = value.checked_add(1).and_then(|i| usize::try_from(i).ok()).and_then(|i| LDC_I4.get(i)) {
            return self.emit(op, Operand::None);
        }
        match i8::try_from(value) {
            Ok(short) => self.ldc_i4_s(short),
            Err(_) => self.ldc_i4(value),
        }
    }

    /* ───── calls ───── */

    /// `call` to a variadic method, recording the extra argument types.
    pub fn call_varargs(&mut self, method: &MethodRef, varargs: &[TypeRef]) -> &mut Self {
        let mut site = method.clone();
        site.varargs = varargs.to_vec();
        self.emit(OpCode::Call, Operand::Method(site))
    }

    /* ───── typed operands ───── */

    type_of_emitters! {
        box_of => box_,
        unbox_of => unbox,
        unbox_any_of => unbox_any,
        castclass_of => castclass,
        isinst_of => isinst,
        newarr_of => newarr,
        sizeof_of => sizeof,
        initobj_of => initobj,
        ldobj_of => ldobj,
        stobj_of => stobj,
        cpobj_of => cpobj,
        ldelem_of => ldelem,
        stelem_of => stelem,
        ldelema_of => ldelema,
        mkrefany_of => mkrefany,
        refanyval_of => refanyval,
        constrained_of => constrained,
    }

    /* ───── one method per opcode ───── */

    ilforge_core::for_each_opcode!(il_emitters);
}
