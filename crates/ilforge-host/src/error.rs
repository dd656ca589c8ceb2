//! Host and execution errors.

use ilforge_core::{CoreError, OpCode};
use thiserror::Error;

/// Result alias for type construction and invocation.
pub type HostResult<T> = Result<T, HostError>;

/// Result alias for the interpreter.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors raised while building, materializing or invoking types.
#[derive(Debug, Error)]
pub enum HostError {
    /// The type was already materialized and refuses further changes.
    #[error("type `{ty}` is already materialized")]
    AlreadyMaterialized {
        /// Type name.
        ty: String,
    },
    /// A module with this name already exists in the assembly.
    #[error("module `{0}` is already defined in this assembly")]
    DuplicateModule(String),
    /// A type with this name already exists in the module.
    #[error("type `{0}` is already defined in this module")]
    DuplicateType(String),
    /// A method with the same name and parameters already exists.
    #[error("method `{ty}::{method}` is already defined")]
    DuplicateMethod {
        /// Type name.
        ty: String,
        /// Method name.
        method: String,
    },
    /// A field with this name already exists.
    #[error("field `{ty}::{field}` is already defined")]
    DuplicateField {
        /// Type name.
        ty: String,
        /// Field name.
        field: String,
    },
    /// No contract member matches the name and parameter types.
    #[error("contract `{contract}` has no member `{name}({params})`")]
    MemberNotFound {
        /// Contract name.
        contract: String,
        /// Requested member name.
        name: String,
        /// Requested parameter types, comma separated.
        params: String,
    },
    /// The type does not list the contract among its implemented contracts.
    #[error("type `{ty}` does not implement contract `{contract}`")]
    ContractNotImplemented {
        /// Type name.
        ty: String,
        /// Contract name.
        contract: String,
    },
    /// Implementation and contract member signatures differ.
    #[error("`{ty}::{method}` has signature {found}, contract expects {expected}")]
    SignatureMismatch {
        /// Type name.
        ty: String,
        /// Method name.
        method: String,
        /// Contract member signature.
        expected: String,
        /// Declared signature.
        found: String,
    },
    /// A contract member has no implementation at materialization.
    #[error("type `{ty}` does not implement `{contract}::{member}`")]
    MissingImplementation {
        /// Type name.
        ty: String,
        /// Contract name.
        contract: String,
        /// Member display.
        member: String,
    },
    /// The contract slot already has an implementation.
    #[error("`{contract}::{member}` is already implemented on `{ty}`")]
    SlotAlreadyBound {
        /// Type name.
        ty: String,
        /// Contract name.
        contract: String,
        /// Member display.
        member: String,
    },
    /// A method body failed to seal or to validate.
    #[error("invalid body for `{ty}::{method}`: {source}")]
    InvalidBody {
        /// Type name.
        ty: String,
        /// Method name.
        method: String,
        /// Underlying defect.
        #[source]
        source: CoreError,
    },
    /// The method body was already sealed.
    #[error("body of `{ty}::{method}` is already sealed")]
    BodySealed {
        /// Type name.
        ty: String,
        /// Method name.
        method: String,
    },
    /// Unknown method handle or name.
    #[error("type `{ty}` has no method `{method}`")]
    UnknownMethod {
        /// Type name.
        ty: String,
        /// Method name or handle.
        method: String,
    },
    /// Interfaces and abstract types have no instances.
    #[error("type `{0}` cannot be instantiated")]
    NotInstantiable(String),
    /// Execution failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Errors raised by the reference interpreter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    /// Pop from an empty evaluation stack.
    #[error("evaluation stack underflow at IL_{at:04x}")]
    StackUnderflow {
        /// Instruction offset.
        at: u32,
    },
    /// Operand values of the wrong kind.
    #[error("`{op}` at IL_{at:04x}: {detail}")]
    Type {
        /// Opcode.
        op: OpCode,
        /// Instruction offset.
        at: u32,
        /// What was found.
        detail: String,
    },
    /// Value conversion at the call boundary failed.
    #[error("cannot convert {found} to {expected}")]
    Conversion {
        /// Target type.
        expected: String,
        /// Value found.
        found: String,
    },
    /// Integer division by zero.
    #[error("attempted to divide by zero")]
    DivideByZero,
    /// Checked arithmetic or conversion overflowed.
    #[error("arithmetic operation resulted in an overflow")]
    Overflow,
    /// `ckfinite` on NaN or infinity.
    #[error("value is not a finite number")]
    NotFinite,
    /// Member access on null.
    #[error("object reference not set to an instance of an object")]
    NullReference,
    /// Array index outside the bounds.
    #[error("index {index} is outside the bounds of the array (length {len})")]
    IndexOutOfRange {
        /// Requested index.
        index: i64,
        /// Array length.
        len: usize,
    },
    /// `castclass` / `unbox.any` on an incompatible value.
    #[error("unable to cast {from} to {to}")]
    InvalidCast {
        /// Runtime type of the value.
        from: String,
        /// Target type.
        to: String,
    },
    /// `throw` reached the top of the call stack.
    #[error("unhandled exception: {0}")]
    Thrown(String),
    /// Opcode outside what the interpreter executes.
    #[error("`{0}` is not supported by the reference interpreter")]
    Unsupported(OpCode),
    /// Call target could not be resolved.
    #[error("cannot resolve method `{0}`")]
    UnresolvedMethod(String),
    /// Field could not be resolved.
    #[error("cannot resolve field `{0}`")]
    UnresolvedField(String),
    /// Type could not be resolved.
    #[error("cannot resolve type `{0}`")]
    UnresolvedType(String),
    /// Wrong number of arguments at the call boundary.
    #[error("`{method}` takes {expected} arguments, got {got}")]
    ArgCount {
        /// Method name.
        method: String,
        /// Declared count.
        expected: usize,
        /// Supplied count.
        got: usize,
    },
    /// Branch to an offset that is not an instruction.
    #[error("branch to IL_{0:04x} does not land on an instruction")]
    BadBranch(u32),
    /// Control ran past the last instruction.
    #[error("execution ran past the end of `{0}`")]
    FellOffEnd(String),
    /// `max_steps` exhausted.
    #[error("step limit of {0} instructions exceeded")]
    StepLimit(u64),
    /// `max_call_depth` exhausted.
    #[error("call depth limit of {0} exceeded")]
    CallDepth(usize),
    /// Native function failure.
    #[error("native `{name}` failed: {message}")]
    Native {
        /// Native name.
        name: String,
        /// Message.
        message: String,
    },
    /// Token or decoding failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}
